use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use serde::Serialize;

use crate::kernel::PolyMesh;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

/// Triangulated, world-space geometry ready for a renderer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl SceneMesh {
    /// Fan-triangulates every live face; isolated vertices are left out.
    pub fn from_poly(mesh: &PolyMesh, to_world: Mat4) -> Self {
        let mut remap = BTreeMap::new();
        let mut positions = Vec::new();
        let mut indices = Vec::new();

        for face in mesh.faces() {
            let mut ring = Vec::new();
            for vh in mesh.face_vertices(face) {
                let index = match remap.get(&vh) {
                    Some(&index) => index,
                    None => {
                        let Some(p) = mesh.position(vh) else {
                            continue;
                        };
                        let index = positions.len() as u32;
                        positions.push(to_world.transform_point3(p).to_array());
                        remap.insert(vh, index);
                        index
                    }
                };
                ring.push(index);
            }
            for i in 1..ring.len().saturating_sub(1) {
                indices.extend_from_slice(&[ring[0], ring[i], ring[i + 1]]);
            }
        }

        let normals = compute_normals(&positions, &indices);
        Self {
            positions,
            normals,
            indices,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Option<Aabb> {
        let mut iter = self.positions.iter();
        let first = iter.next()?;
        let mut min = *first;
        let mut max = *first;

        for p in iter {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }

        Some(Aabb { min, max })
    }

    pub fn append(&mut self, other: &SceneMesh) {
        let offset = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices
            .extend(other.indices.iter().map(|i| i + offset));
    }
}

/// Area-weighted vertex normals; unreferenced vertices point up.
fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accum = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let p0 = Vec3::from(positions[i0]);
        let p1 = Vec3::from(positions[i1]);
        let p2 = Vec3::from(positions[i2]);
        let normal = (p1 - p0).cross(p2 - p0);
        accum[i0] += normal;
        accum[i1] += normal;
        accum[i2] += normal;
    }

    accum
        .into_iter()
        .map(|n| {
            let len = n.length();
            if len > 0.0 {
                (n / len).to_array()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneSnapshot {
    pub mesh: SceneMesh,
    pub base_color: [f32; 3],
    pub instances: Vec<String>,
}

impl SceneSnapshot {
    pub fn bounds(&self) -> Option<Aabb> {
        self.mesh.bounds()
    }
}
