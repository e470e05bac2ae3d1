//! Slider-driven parameters: scalar expressions, point and face definitions,
//! and the procedural primitives a generator can be built from.

use std::collections::BTreeSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::arena::PointId;
use crate::error::MeshError;
use crate::graph::NodeId;
use crate::indexed::{FacePoints, IndexedMesh};
use crate::slider::SliderBank;

const MAX_GRID_DIVISIONS: u32 = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarExpr {
    Const(f32),
    Slider(String),
    Neg(Box<ScalarExpr>),
    Add(Box<ScalarExpr>, Box<ScalarExpr>),
    Sub(Box<ScalarExpr>, Box<ScalarExpr>),
    Mul(Box<ScalarExpr>, Box<ScalarExpr>),
    Div(Box<ScalarExpr>, Box<ScalarExpr>),
}

impl From<f32> for ScalarExpr {
    fn from(value: f32) -> Self {
        ScalarExpr::Const(value)
    }
}

impl ScalarExpr {
    pub fn slider(name: impl Into<String>) -> Self {
        ScalarExpr::Slider(name.into())
    }

    pub fn add(a: impl Into<ScalarExpr>, b: impl Into<ScalarExpr>) -> Self {
        ScalarExpr::Add(Box::new(a.into()), Box::new(b.into()))
    }

    pub fn mul(a: impl Into<ScalarExpr>, b: impl Into<ScalarExpr>) -> Self {
        ScalarExpr::Mul(Box::new(a.into()), Box::new(b.into()))
    }

    pub fn collect_sliders(&self, out: &mut BTreeSet<String>) {
        match self {
            ScalarExpr::Const(_) => {}
            ScalarExpr::Slider(name) => {
                out.insert(name.clone());
            }
            ScalarExpr::Neg(inner) => inner.collect_sliders(out),
            ScalarExpr::Add(a, b)
            | ScalarExpr::Sub(a, b)
            | ScalarExpr::Mul(a, b)
            | ScalarExpr::Div(a, b) => {
                a.collect_sliders(out);
                b.collect_sliders(out);
            }
        }
    }

    /// A missing slider reads as zero.
    pub fn eval(&self, bank: &SliderBank) -> f32 {
        match self {
            ScalarExpr::Const(value) => *value,
            ScalarExpr::Slider(name) => bank.value(name).unwrap_or_else(|| {
                tracing::warn!(slider = %name, "unknown slider reads as 0");
                0.0
            }),
            ScalarExpr::Neg(inner) => -inner.eval(bank),
            ScalarExpr::Add(a, b) => a.eval(bank) + b.eval(bank),
            ScalarExpr::Sub(a, b) => a.eval(bank) - b.eval(bank),
            ScalarExpr::Mul(a, b) => a.eval(bank) * b.eval(bank),
            ScalarExpr::Div(a, b) => a.eval(bank) / b.eval(bank),
        }
    }
}

/// Non-finite coordinates (a division by zero, say) read as zero.
fn eval3(exprs: &[ScalarExpr; 3], bank: &SliderBank) -> Vec3 {
    let value = Vec3::new(exprs[0].eval(bank), exprs[1].eval(bank), exprs[2].eval(bank));
    if value.is_finite() {
        return value;
    }
    tracing::warn!(?value, "non-finite coordinate reads as 0");
    Vec3::from_array(value.to_array().map(|c| if c.is_finite() { c } else { 0.0 }))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDef {
    pub name: String,
    pub position: [ScalarExpr; 3],
}

impl PointDef {
    pub fn new(name: impl Into<String>, position: [ScalarExpr; 3]) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }

    pub fn fixed(name: impl Into<String>, position: [f32; 3]) -> Self {
        Self::new(name, position.map(ScalarExpr::Const))
    }

    pub fn sliders(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for expr in &self.position {
            expr.collect_sliders(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDef {
    pub name: String,
    pub points: Vec<String>,
}

impl FaceDef {
    pub fn new<I, S>(name: impl Into<String>, points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            points: points.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointEntity {
    pub(crate) def: PointDef,
    pub(crate) node: NodeId,
    pub(crate) position: Vec3,
}

impl PointEntity {
    pub(crate) fn new(def: PointDef, node: NodeId) -> Self {
        Self {
            def,
            node,
            position: Vec3::ZERO,
        }
    }

    pub(crate) fn recompute(&mut self, bank: &SliderBank) {
        self.position = eval3(&self.def.position, bank);
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

#[derive(Debug, Clone)]
pub struct FaceEntity {
    pub(crate) def: FaceDef,
    pub(crate) node: NodeId,
    pub(crate) points: Vec<PointId>,
}

impl FaceEntity {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn points(&self) -> &[PointId] {
        &self.points
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Primitive {
    Box {
        size: [ScalarExpr; 3],
    },
    Grid {
        size: [ScalarExpr; 2],
        divisions: [ScalarExpr; 2],
    },
}

impl Primitive {
    pub fn sliders(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let exprs: Vec<&ScalarExpr> = match self {
            Primitive::Box { size } => size.iter().collect(),
            Primitive::Grid { size, divisions } => size.iter().chain(divisions.iter()).collect(),
        };
        for expr in exprs {
            expr.collect_sliders(&mut out);
        }
        out
    }

    pub(crate) fn build(&self, bank: &SliderBank, mesh: &mut IndexedMesh) -> Result<(), MeshError> {
        match self {
            Primitive::Box { size } => {
                let half = eval3(size, bank) * 0.5;
                build_box(half, mesh)
            }
            Primitive::Grid { size, divisions } => {
                let width = size[0].eval(bank).max(0.0);
                let depth = size[1].eval(bank).max(0.0);
                let div = |expr: &ScalarExpr| {
                    (expr.eval(bank).max(1.0) as u32).min(MAX_GRID_DIVISIONS)
                };
                build_grid([width, depth], [div(&divisions[0]), div(&divisions[1])], mesh)
            }
        }
    }
}

const BOX_FACES: [(&str, [usize; 4]); 6] = [
    ("back", [0, 3, 2, 1]),
    ("front", [4, 5, 6, 7]),
    ("bottom", [0, 1, 5, 4]),
    ("top", [2, 3, 7, 6]),
    ("right", [1, 2, 6, 5]),
    ("left", [3, 0, 4, 7]),
];

fn build_box(half: Vec3, mesh: &mut IndexedMesh) -> Result<(), MeshError> {
    let corners = [
        [-half.x, -half.y, -half.z],
        [half.x, -half.y, -half.z],
        [half.x, half.y, -half.z],
        [-half.x, half.y, -half.z],
        [-half.x, -half.y, half.z],
        [half.x, -half.y, half.z],
        [half.x, half.y, half.z],
        [-half.x, half.y, half.z],
    ];
    for (i, corner) in corners.into_iter().enumerate() {
        mesh.add_vertex(&format!("v{i}"), Vec3::from(corner));
    }
    for (name, quad) in BOX_FACES {
        mesh.add_face(name, FacePoints::names(quad.map(|i| format!("v{i}"))))?;
    }
    Ok(())
}

fn build_grid(size: [f32; 2], divisions: [u32; 2], mesh: &mut IndexedMesh) -> Result<(), MeshError> {
    let [div_x, div_z] = divisions;
    let step_x = size[0] / div_x as f32;
    let step_z = size[1] / div_z as f32;
    let origin_x = -size[0] * 0.5;
    let origin_z = -size[1] * 0.5;
    let vertex = |x: u32, z: u32| format!("v{x}_{z}");

    for z in 0..=div_z {
        for x in 0..=div_x {
            let position = Vec3::new(origin_x + x as f32 * step_x, 0.0, origin_z + z as f32 * step_z);
            mesh.add_vertex(&vertex(x, z), position);
        }
    }
    for z in 0..div_z {
        for x in 0..div_x {
            let quad = [vertex(x, z), vertex(x, z + 1), vertex(x + 1, z + 1), vertex(x + 1, z)];
            mesh.add_face(&format!("f{x}_{z}"), FacePoints::names(quad))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::graph::FlowGraph;
    use crate::indexed::IndexMode;
    use crate::slider::SliderSpec;

    fn bank() -> SliderBank {
        let mut graph: FlowGraph<()> = FlowGraph::new();
        let mut bank = SliderBank::new();
        bank.add_slider(&mut graph, "w", SliderSpec::new(2.0, 0.0, 10.0, 0.5), None, ())
            .unwrap();
        bank
    }

    #[test]
    fn expressions_read_sliders() {
        let bank = bank();
        let expr = ScalarExpr::add(ScalarExpr::mul(ScalarExpr::slider("w"), 3.0_f32), 1.0_f32);
        assert_relative_eq!(expr.eval(&bank), 7.0);
        assert_relative_eq!(ScalarExpr::slider("missing").eval(&bank), 0.0);
        let mut names = BTreeSet::new();
        expr.collect_sliders(&mut names);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["w"]);
    }

    #[test]
    fn expressions_deserialize_from_json() {
        let expr: ScalarExpr =
            serde_json::from_str(r#"{"add": [{"slider": "w"}, {"const": 0.5}]}"#).unwrap();
        assert_relative_eq!(expr.eval(&bank()), 2.5);
    }

    #[test]
    fn box_is_closed_and_sized_by_sliders() {
        let bank = bank();
        let mut mesh = IndexedMesh::new(IndexMode::Authoritative);
        Primitive::Box {
            size: [ScalarExpr::slider("w"), ScalarExpr::Const(1.0), ScalarExpr::Const(1.0)],
        }
        .build(&bank, &mut mesh)
        .unwrap();
        assert_eq!(mesh.mesh().n_vertices(), 8);
        assert_eq!(mesh.mesh().n_faces(), 6);
        assert_eq!(mesh.mesh().n_edges(), 12);
        assert_relative_eq!(mesh.vertex_position("v6").unwrap().x, 1.0);
        assert!(mesh
            .mesh()
            .vertices()
            .all(|vh| !mesh.mesh().is_boundary_vertex(vh)));
    }

    #[test]
    fn grid_has_expected_counts() {
        let bank = bank();
        let mut mesh = IndexedMesh::new(IndexMode::Authoritative);
        Primitive::Grid {
            size: [ScalarExpr::Const(2.0), ScalarExpr::Const(2.0)],
            divisions: [ScalarExpr::Const(2.0), ScalarExpr::Const(3.0)],
        }
        .build(&bank, &mut mesh)
        .unwrap();
        assert_eq!(mesh.mesh().n_vertices(), 3 * 4);
        assert_eq!(mesh.mesh().n_faces(), 2 * 3);
        assert!(mesh.face("f1_2").is_some());
    }
}
