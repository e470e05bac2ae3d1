use glam::{Mat4, Vec3};
use serde::Serialize;

use crate::arena::InstanceId;
use crate::graph::NodeId;
use crate::instance::MeshInstance;
use crate::kernel::VertexHandle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VertexResolution {
    Unresolved,
    Resolved {
        handle: VertexHandle,
        local: Vec3,
        world: Vec3,
    },
}

impl VertexResolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, VertexResolution::Resolved { .. })
    }

    pub fn world(&self) -> Option<Vec3> {
        match self {
            VertexResolution::Resolved { world, .. } => Some(*world),
            VertexResolution::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexInfo {
    pub name: String,
    pub resolution: VertexResolution,
}

/// Projects one named vertex of an instance.
#[derive(Debug, Clone)]
pub struct VertexSelector {
    pub(crate) target: String,
    pub(crate) node: NodeId,
    pub(crate) instance: InstanceId,
    pub(crate) instance_path: String,
    pub(crate) value: VertexInfo,
}

impl VertexSelector {
    pub(crate) fn new(
        target: &str,
        output: &str,
        node: NodeId,
        instance: InstanceId,
        instance_path: &str,
    ) -> Self {
        Self {
            target: target.to_string(),
            node,
            instance,
            instance_path: instance_path.to_string(),
            value: VertexInfo {
                name: output.to_string(),
                resolution: VertexResolution::Unresolved,
            },
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn path(&self) -> String {
        format!("{}.{}", self.instance_path, self.target)
    }

    /// Last resolved value; read through the scene to get a fresh one.
    pub fn value(&self) -> &VertexInfo {
        &self.value
    }

    pub(crate) fn clear(&mut self) {
        self.value.resolution = VertexResolution::Unresolved;
    }

    pub(crate) fn resolve(&mut self, instance: &MeshInstance, to_world: Mat4) {
        let mesh = instance.mesh();
        self.value.resolution = match mesh
            .vertex(&self.target)
            .and_then(|vh| Some((vh, mesh.mesh().position(vh)?)))
        {
            Some((handle, local)) => VertexResolution::Resolved {
                handle,
                local,
                world: to_world.transform_point3(local),
            },
            None => {
                tracing::debug!(target_vertex = %self.target, path = %self.path(), "selector unresolved");
                VertexResolution::Unresolved
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::arena::{GeneratorId, PlacementId};
    use crate::graph::FlowGraph;
    use crate::indexed::{IndexMode, IndexedMesh};

    #[test]
    fn resolves_against_the_current_copy() {
        let mut graph: FlowGraph<()> = FlowGraph::new();
        let node = graph.add_node((), &[]).unwrap();
        let mut source = IndexedMesh::new(IndexMode::Authoritative);
        source.add_vertex("tip", Vec3::new(0.0, 1.0, 0.0));
        let mut instance = MeshInstance::new(GeneratorId(0), PlacementId(0), node, "root.cone".into());
        instance.copy_from_generator(&source).unwrap();

        let mut selector = VertexSelector::new("tip", "apex", node, InstanceId(0), instance.path());
        assert_eq!(selector.path(), "root.cone.tip");
        selector.resolve(&instance, Mat4::from_translation(Vec3::X));
        assert_eq!(selector.value().name, "apex");
        let world = selector.value().resolution.world().unwrap();
        assert_relative_eq!(world.x, 1.0);
        assert_relative_eq!(world.y, 1.0);

        instance
            .copy_from_generator(&IndexedMesh::new(IndexMode::Authoritative))
            .unwrap();
        selector.resolve(&instance, Mat4::IDENTITY);
        assert_eq!(selector.value().resolution, VertexResolution::Unresolved);
    }
}
