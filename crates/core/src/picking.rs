use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

const EPSILON: f32 = 1e-6;

/// A ray `origin + t * direction`, `t >= 0`.
///
/// `new` normalizes the direction; `transform` keeps the parameter of the
/// source ray so distances along a transformed ray stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    pub fn transform(&self, matrix: Mat4) -> Self {
        Self {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickSettings {
    pub vertex_radius: f32,
    pub edge_radius: f32,
}

impl Default for PickSettings {
    fn default() -> Self {
        Self {
            vertex_radius: 0.05,
            edge_radius: 0.03,
        }
    }
}

/// Ray parameter of the point on the ray closest to `point`, if that point is
/// within `radius`.
pub fn ray_point(ray: &Ray, point: Vec3, radius: f32) -> Option<f32> {
    let len_sq = ray.direction.length_squared();
    if len_sq < EPSILON {
        return None;
    }
    let t = (point - ray.origin).dot(ray.direction) / len_sq;
    if t < 0.0 {
        return None;
    }
    (ray.at(t).distance(point) <= radius).then_some(t)
}

/// Closest approach between the ray and segment `a..b`.
pub fn ray_segment(ray: &Ray, a: Vec3, b: Vec3, radius: f32) -> Option<f32> {
    let d1 = b - a;
    let d2 = ray.direction;
    let r = a - ray.origin;
    let a_ = d1.dot(d1);
    let e = d2.dot(d2);
    if e < EPSILON {
        return None;
    }
    if a_ < EPSILON {
        return ray_point(ray, a, radius);
    }
    let b_ = d1.dot(d2);
    let c = d1.dot(r);
    let f = d2.dot(r);
    let denom = a_ * e - b_ * b_;

    let mut s = if denom.abs() > EPSILON {
        ((b_ * f - c * e) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut t = (b_ * s + f) / e;
    if t < 0.0 {
        t = 0.0;
        s = (-c / a_).clamp(0.0, 1.0);
    }
    let on_segment = a + d1 * s;
    (ray.at(t).distance(on_segment) <= radius).then_some(t)
}

/// Möller-Trumbore; hits from either side count.
pub fn ray_triangle(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);
    if a.abs() < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    (t >= EPSILON).then_some(t)
}

/// Nearest hit over a fan triangulation; assumes a planar convex polygon.
pub fn ray_polygon(ray: &Ray, points: &[Vec3]) -> Option<f32> {
    let (&first, rest) = points.split_first()?;
    rest.windows(2)
        .filter_map(|pair| ray_triangle(ray, first, pair[0], pair[1]))
        .min_by(f32::total_cmp)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn down_z() -> Ray {
        Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -2.0))
    }

    #[test]
    fn point_within_radius_is_hit() {
        let ray = down_z();
        assert_relative_eq!(ray_point(&ray, Vec3::new(0.01, 0.0, 1.0), 0.05).unwrap(), 4.0);
        assert!(ray_point(&ray, Vec3::new(0.2, 0.0, 1.0), 0.05).is_none());
        assert!(ray_point(&ray, Vec3::new(0.0, 0.0, 6.0), 0.05).is_none());
    }

    #[test]
    fn segment_crossing_the_ray() {
        let ray = down_z();
        let t = ray_segment(&ray, Vec3::new(-1.0, 0.02, 2.0), Vec3::new(1.0, 0.02, 2.0), 0.05);
        assert_relative_eq!(t.unwrap(), 3.0, epsilon = 1e-5);
        assert!(ray_segment(&ray, Vec3::new(0.5, 0.0, 2.0), Vec3::new(1.0, 0.0, 2.0), 0.05).is_none());
    }

    #[test]
    fn quad_is_hit_through_either_triangle() {
        let ray = Ray::new(Vec3::new(0.75, 0.25, 3.0), Vec3::NEG_Z);
        let quad = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert_relative_eq!(ray_polygon(&ray, &quad).unwrap(), 3.0);
        let miss = Ray::new(Vec3::new(2.0, 0.5, 3.0), Vec3::NEG_Z);
        assert!(ray_polygon(&miss, &quad).is_none());
        let behind = Ray::new(Vec3::new(0.5, 0.5, 3.0), Vec3::Z);
        assert!(ray_polygon(&behind, &quad).is_none());
    }

    #[test]
    fn transformed_ray_keeps_parameter() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
        let to_local = Mat4::from_scale(Vec3::splat(2.0)).inverse();
        let local = ray.transform(to_local);
        let t = ray_triangle(
            &local,
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        )
        .unwrap();
        // local z=1 is world z=2
        assert_relative_eq!(t, 8.0, epsilon = 1e-5);
    }
}
