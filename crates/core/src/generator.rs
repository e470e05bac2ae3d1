use std::collections::{BTreeMap, BTreeSet};

use glam::{Mat4, Vec3};

use crate::arena::{Arena, FaceId, InstanceId, PointId};
use crate::command::{Arg, Command, CommandDocument, CommandId, SyncOutcome};
use crate::draw::{DebugDraw, DrawSettings};
use crate::error::MeshError;
use crate::graph::NodeId;
use crate::indexed::{FacePoints, IndexMode, IndexedMesh};
use crate::kernel::{FaceHandle, PolyMesh, VertexHandle};
use crate::params::{FaceEntity, PointEntity, Primitive};
use crate::slider::SliderBank;

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorSource {
    /// Declared faces, in input order.
    Faces(Vec<FaceId>),
    Primitive(Primitive),
    /// Filled imperatively; rebuilds keep whatever is there.
    Data,
}

#[derive(Debug, Clone)]
pub struct MeshGenerator {
    pub(crate) name: String,
    pub(crate) node: NodeId,
    pub(crate) command: Option<CommandId>,
    pub(crate) source: GeneratorSource,
    pub(crate) mesh: IndexedMesh,
    pub(crate) instances: BTreeSet<InstanceId>,
}

impl MeshGenerator {
    pub(crate) fn new(name: &str, node: NodeId, source: GeneratorSource) -> Self {
        Self {
            name: name.to_string(),
            node,
            command: None,
            source,
            mesh: IndexedMesh::new(IndexMode::Authoritative),
            instances: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn command(&self) -> Option<CommandId> {
        self.command
    }

    pub fn set_command(&mut self, command: Option<CommandId>) {
        self.command = command;
    }

    pub fn source(&self) -> &GeneratorSource {
        &self.source
    }

    pub fn mesh(&self) -> &IndexedMesh {
        &self.mesh
    }

    pub fn instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.iter().copied()
    }

    pub fn add_vertex(&mut self, name: &str, position: Vec3) -> VertexHandle {
        self.mesh.add_vertex(name, position)
    }

    pub fn has_vertex(&self, name: &str) -> bool {
        self.mesh.has_vertex(name)
    }

    pub fn vertex_position(&self, name: &str) -> Option<Vec3> {
        self.mesh.vertex_position(name)
    }

    pub fn add_face(&mut self, name: &str, points: FacePoints) -> Result<Option<FaceHandle>, MeshError> {
        self.mesh.add_face(name, points)
    }

    pub fn add_line_strip(&mut self, name: &str, points: &[VertexHandle]) -> Result<(), MeshError> {
        self.mesh.add_line_strip(name, points)
    }

    pub fn clear_mesh(&mut self) {
        self.mesh.clear();
    }

    pub fn set_from_data(
        &mut self,
        mesh: PolyMesh,
        vertex_names: BTreeMap<String, VertexHandle>,
        face_names: BTreeMap<String, FaceHandle>,
    ) -> Result<(), MeshError> {
        self.mesh.set_from_data(mesh, vertex_names, face_names)
    }

    pub(crate) fn rebuild(
        &mut self,
        faces: &Arena<FaceId, FaceEntity>,
        points: &Arena<PointId, PointEntity>,
        bank: &SliderBank,
    ) -> Result<(), MeshError> {
        match &self.source {
            GeneratorSource::Data => Ok(()),
            GeneratorSource::Primitive(primitive) => {
                self.mesh.clear();
                primitive.build(bank, &mut self.mesh)
            }
            GeneratorSource::Faces(face_ids) => {
                self.mesh.clear();
                for &face_id in face_ids {
                    let Some(face) = faces.get(face_id) else {
                        continue;
                    };
                    let mut names = Vec::with_capacity(face.points.len());
                    for &point_id in &face.points {
                        let Some(point) = points.get(point_id) else {
                            continue;
                        };
                        if !self.mesh.has_vertex(point.name()) {
                            self.mesh.add_vertex(point.name(), point.position());
                        }
                        names.push(point.name().to_string());
                    }
                    self.mesh.add_face(face.name(), FacePoints::Names(names))?;
                }
                tracing::debug!(
                    generator = %self.name,
                    faces = self.mesh.mesh().n_faces(),
                    "generator rebuilt"
                );
                Ok(())
            }
        }
    }

    /// Points and faces in name order, so equal meshes produce equal commands.
    pub fn to_command(&self) -> Command {
        let points = self
            .mesh
            .vertex_index()
            .iter()
            .filter_map(|(name, vh)| {
                let position = self.mesh.mesh().position(vh)?;
                Some(Arg::List(vec![
                    Arg::Ident(name.to_string()),
                    Arg::Vector(position.to_array()),
                ]))
            })
            .collect();
        let faces = self
            .mesh
            .face_index()
            .iter()
            .map(|(name, fh)| {
                let vertices = self
                    .mesh
                    .face_vertex_names(fh)
                    .into_iter()
                    .map(Arg::Ident)
                    .collect();
                Arg::List(vec![Arg::Ident(name.to_string()), Arg::List(vertices)])
            })
            .collect();

        let mut command = Command::new("mesh", &self.name)
            .with_arg("points", Arg::List(points))
            .with_arg("faces", Arg::List(faces));
        if !self.mesh.line_strips().is_empty() {
            let strips = self
                .mesh
                .line_strips()
                .iter()
                .map(|strip| {
                    let names = strip
                        .points
                        .iter()
                        .filter_map(|&vh| self.mesh.vertex_name(vh))
                        .map(|name| Arg::Ident(name.to_string()))
                        .collect();
                    Arg::List(vec![Arg::Ident(strip.name.clone()), Arg::List(names)])
                })
                .collect();
            command = command.with_arg("line_strips", Arg::List(strips));
        }
        command
    }

    pub fn sync_to_ast(&mut self, doc: &mut CommandDocument, create_new: bool) -> SyncOutcome {
        let outcome = doc.write(self.command, create_new, self.to_command());
        self.command = Some(outcome.command);
        outcome
    }

    pub fn draw(&self, sink: &mut dyn DebugDraw, to_world: Mat4, settings: &DrawSettings) {
        let kernel = self.mesh.mesh();
        for strip in self.mesh.line_strips() {
            let points: Vec<Vec3> = strip
                .points
                .iter()
                .filter_map(|&vh| kernel.position(vh))
                .map(|p| to_world.transform_point3(p))
                .collect();
            sink.line_strip(&points, settings.line_strip_color);
        }
        for face in kernel.faces() {
            let mut outline: Vec<Vec3> = kernel
                .face_positions(face)
                .into_iter()
                .map(|p| to_world.transform_point3(p))
                .collect();
            if let Some(&first) = outline.first() {
                outline.push(first);
            }
            sink.line_strip(&outline, settings.edge_color);
        }
    }
}
