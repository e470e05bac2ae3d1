//! World-space union of instance meshes, welded into one data mesh.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::instance::MeshInstance;
use crate::kernel::{FaceHandle, PolyMesh, VertexHandle};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    pub weld_distance: f32,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            weld_distance: 1e-4,
        }
    }
}

pub struct MergeInput<'a> {
    pub instance: &'a MeshInstance,
    pub to_world: Mat4,
}

#[derive(Debug, Clone, Default)]
pub struct MergedMesh {
    pub mesh: PolyMesh,
    pub vertex_names: BTreeMap<String, VertexHandle>,
    pub face_names: BTreeMap<String, FaceHandle>,
    pub skipped_faces: Vec<String>,
}

#[derive(Default)]
struct Welder {
    points: Vec<(Vec3, VertexHandle)>,
}

impl Welder {
    fn weld(&mut self, mesh: &mut PolyMesh, position: Vec3, distance: f32) -> VertexHandle {
        if let Some(&(_, vh)) = self
            .points
            .iter()
            .find(|(existing, _)| existing.distance(position) <= distance)
        {
            return vh;
        }
        let vh = mesh.add_vertex(position);
        self.points.push((position, vh));
        vh
    }
}

/// Names come out path-qualified. Faces that collapse under welding or
/// would make the result non-manifold are skipped and reported.
pub fn merge_instances(inputs: &[MergeInput<'_>], settings: &MergeSettings, selected_only: bool) -> MergedMesh {
    let mut out = MergedMesh::default();
    let mut welder = Welder::default();
    let mut tuples: BTreeMap<Vec<VertexHandle>, FaceHandle> = BTreeMap::new();

    for input in inputs {
        let instance = input.instance;
        let source = instance.mesh();
        let kernel = source.mesh();
        let mut remap: BTreeMap<VertexHandle, VertexHandle> = BTreeMap::new();

        for face in kernel.faces() {
            if selected_only && !instance.selected_face_handles().contains(&face) {
                continue;
            }
            let mut ring = Vec::new();
            for vh in kernel.face_vertices(face) {
                let merged = match remap.get(&vh) {
                    Some(&merged) => merged,
                    None => {
                        let Some(p) = kernel.position(vh) else {
                            continue;
                        };
                        let world = input.to_world.transform_point3(p);
                        let merged = welder.weld(&mut out.mesh, world, settings.weld_distance);
                        remap.insert(vh, merged);
                        for name in source.vertex_index().names(vh) {
                            out.vertex_names
                                .insert(format!("{}.{}", instance.path(), name), merged);
                        }
                        merged
                    }
                };
                ring.push(merged);
            }

            let names: Vec<String> = source
                .face_index()
                .names(face)
                .iter()
                .map(|name| format!("{}.{}", instance.path(), name))
                .collect();
            let merged_face = match tuples.get(&ring) {
                Some(&existing) => Some(existing),
                None => match out.mesh.add_face(&ring) {
                    Ok(fh) => {
                        tuples.insert(ring, fh);
                        Some(fh)
                    }
                    Err(err) => {
                        tracing::warn!(face = ?names.first(), %err, "face skipped while merging");
                        None
                    }
                },
            };
            match merged_face {
                Some(fh) => {
                    for name in names {
                        out.face_names.insert(name, fh);
                    }
                }
                None => out.skipped_faces.extend(names),
            }
        }
    }
    out
}
