//! Per-placement copy of a generator's mesh.
//!
//! Selections are stored by handle only; names and paths are derived when
//! asked for, so the two can never disagree. `copy_from_generator` is the one
//! place where local state is reconciled with a new generator mesh.

use std::collections::BTreeSet;

use glam::{Mat4, Vec3};

use crate::arena::{GeneratorId, PlacementId};
use crate::command::{Arg, Command, CommandDocument, CommandId, SyncOutcome};
use crate::draw::{DebugDraw, DrawSettings};
use crate::error::MeshError;
use crate::graph::NodeId;
use crate::indexed::{IndexMode, IndexedMesh};
use crate::kernel::{EdgeHandle, FaceHandle, VertexHandle};
use crate::picking::{ray_point, ray_polygon, ray_segment, PickSettings, Ray};

#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    pub(crate) generator: GeneratorId,
    pub(crate) placement: PlacementId,
    pub(crate) node: NodeId,
    pub(crate) path: String,
    pub(crate) command: Option<CommandId>,
    mesh: IndexedMesh,
    faces_to_delete: BTreeSet<String>,
    selected_vertices: BTreeSet<VertexHandle>,
    selected_edges: BTreeSet<EdgeHandle>,
    selected_faces: BTreeSet<FaceHandle>,
}

impl MeshInstance {
    pub(crate) fn new(generator: GeneratorId, placement: PlacementId, node: NodeId, path: String) -> Self {
        Self {
            generator,
            placement,
            node,
            path,
            command: None,
            mesh: IndexedMesh::new(IndexMode::DerivedCopy),
            faces_to_delete: BTreeSet::new(),
            selected_vertices: BTreeSet::new(),
            selected_edges: BTreeSet::new(),
            selected_faces: BTreeSet::new(),
        }
    }

    pub fn generator(&self) -> GeneratorId {
        self.generator
    }

    pub fn placement(&self) -> PlacementId {
        self.placement
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn command(&self) -> Option<CommandId> {
        self.command
    }

    pub fn mesh(&self) -> &IndexedMesh {
        &self.mesh
    }

    pub fn faces_to_delete(&self) -> &BTreeSet<String> {
        &self.faces_to_delete
    }

    fn qualify(&self, name: &str) -> String {
        format!("{}.{}", self.path, name)
    }

    /// Replaces the local mesh with a fresh copy of `source`, re-applies
    /// pending deletions and carries selections over by name.
    pub fn copy_from_generator(&mut self, source: &IndexedMesh) -> Result<(), MeshError> {
        let vertex_names: Vec<String> = self
            .selected_vertices
            .iter()
            .flat_map(|&vh| self.mesh.vertex_index().names(vh).iter().cloned())
            .collect();
        let edge_names: Vec<[String; 2]> = self
            .selected_edges
            .iter()
            .filter_map(|&eh| self.mesh.edge_name(eh))
            .collect();
        let face_names: Vec<String> = self
            .selected_faces
            .iter()
            .flat_map(|&fh| self.mesh.face_index().names(fh).iter().cloned())
            .collect();

        self.mesh = source.derive_copy();
        for name in &self.faces_to_delete {
            self.mesh.remove_face(name)?;
        }

        self.selected_vertices = vertex_names
            .iter()
            .filter_map(|name| self.mesh.vertex(name))
            .collect();
        self.selected_edges = edge_names
            .iter()
            .filter_map(|[a, b]| self.mesh.edge(a, b))
            .collect();
        self.selected_faces = face_names
            .iter()
            .filter_map(|name| self.mesh.face(name))
            .collect();
        Ok(())
    }

    /// Removes the named faces from this copy only and remembers them for
    /// later copies. Returns the sorted names of the vertices around the
    /// resulting hole.
    pub fn remove_face<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<String>, MeshError> {
        let mut rim = BTreeSet::new();
        for name in names {
            let name: &str = name.as_ref();
            self.faces_to_delete.insert(name.to_string());
            let face = self.mesh.face(name);
            let Some(boundary) = self.mesh.remove_face(name)? else {
                continue;
            };
            if let Some(face) = face {
                self.selected_faces.remove(&face);
            }
            rim.extend(boundary);
        }
        let kernel = self.mesh.mesh();
        self.selected_edges.retain(|&eh| kernel.is_valid_edge(eh));
        Ok(rim
            .into_iter()
            .filter(|&vh| kernel.is_valid_vertex(vh))
            .filter_map(|vh| self.mesh.vertex_name(vh).map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    /// Forgets pending deletions; the faces come back on the next copy.
    pub fn restore_faces<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let mut restored = 0;
        for name in names {
            let name: &str = name.as_ref();
            if self.faces_to_delete.remove(name) {
                restored += 1;
            }
        }
        restored
    }

    pub fn mark_vert_as_selected<I, S>(&mut self, names: I, selected: bool)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let Some(vh) = self.mesh.vertex(name.as_ref()) else {
                continue;
            };
            if selected {
                self.selected_vertices.insert(vh);
            } else {
                self.selected_vertices.remove(&vh);
            }
        }
    }

    pub fn mark_face_as_selected<I, S>(&mut self, names: I, selected: bool)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let Some(fh) = self.mesh.face(name.as_ref()) else {
                continue;
            };
            if selected {
                self.selected_faces.insert(fh);
            } else {
                self.selected_faces.remove(&fh);
            }
        }
    }

    /// Edges are named by their two endpoint vertices, in either order.
    pub fn mark_edge_as_selected<I, S>(&mut self, edges: I, selected: bool)
    where
        I: IntoIterator<Item = [S; 2]>,
        S: AsRef<str>,
    {
        for [a, b] in edges {
            let Some(eh) = self.mesh.edge(a.as_ref(), b.as_ref()) else {
                continue;
            };
            if selected {
                self.selected_edges.insert(eh);
            } else {
                self.selected_edges.remove(&eh);
            }
        }
    }

    pub fn deselect_all(&mut self) {
        self.selected_vertices.clear();
        self.selected_edges.clear();
        self.selected_faces.clear();
    }

    pub fn selected_vertex_handles(&self) -> &BTreeSet<VertexHandle> {
        &self.selected_vertices
    }

    pub fn selected_edge_handles(&self) -> &BTreeSet<EdgeHandle> {
        &self.selected_edges
    }

    pub fn selected_face_handles(&self) -> &BTreeSet<FaceHandle> {
        &self.selected_faces
    }

    /// Every name (aliases included) bound to a selected vertex.
    pub fn selected_vertex_names(&self) -> BTreeSet<String> {
        self.selected_vertices
            .iter()
            .flat_map(|&vh| self.mesh.vertex_index().names(vh).iter().cloned())
            .collect()
    }

    pub fn selected_vertex_paths(&self) -> BTreeSet<String> {
        self.selected_vertex_names()
            .iter()
            .map(|name| self.qualify(name))
            .collect()
    }

    pub fn selected_face_names(&self) -> BTreeSet<String> {
        self.selected_faces
            .iter()
            .flat_map(|&fh| self.mesh.face_index().names(fh).iter().cloned())
            .collect()
    }

    pub fn selected_face_paths(&self) -> BTreeSet<String> {
        self.selected_face_names()
            .iter()
            .map(|name| self.qualify(name))
            .collect()
    }

    pub fn selected_edge_names(&self) -> BTreeSet<[String; 2]> {
        self.selected_edges
            .iter()
            .filter_map(|&eh| self.mesh.edge_name(eh))
            .collect()
    }

    pub fn selected_edge_paths(&self) -> BTreeSet<[String; 2]> {
        self.selected_edge_names()
            .into_iter()
            .map(|[a, b]| [self.qualify(&a), self.qualify(&b)])
            .collect()
    }

    /// Sorted, deduplicated names of the vertices bounding the named faces.
    pub fn face_vertex_names<S: AsRef<str>>(&self, faces: &[S]) -> Vec<String> {
        faces
            .iter()
            .filter_map(|name| self.mesh.face(name.as_ref()))
            .flat_map(|fh| self.mesh.face_vertex_names(fh))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// `ray` is in this instance's local space.
    pub fn pick_vertices(&self, ray: &Ray, settings: &PickSettings) -> Vec<(f32, String)> {
        let kernel = self.mesh.mesh();
        let mut hits: Vec<(f32, String)> = kernel
            .vertices()
            .filter_map(|vh| {
                let name = self.mesh.vertex_name(vh)?;
                let t = ray_point(ray, kernel.position(vh)?, settings.vertex_radius)?;
                Some((t, name.to_string()))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits
    }

    pub fn pick_faces(&self, ray: &Ray) -> Vec<(f32, String)> {
        let kernel = self.mesh.mesh();
        let mut hits: Vec<(f32, String)> = kernel
            .faces()
            .filter_map(|fh| {
                let name = self.mesh.face_name(fh)?;
                let t = ray_polygon(ray, &kernel.face_positions(fh))?;
                Some((t, name.to_string()))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits
    }

    pub fn pick_edges(&self, ray: &Ray, settings: &PickSettings) -> Vec<(f32, [String; 2])> {
        let kernel = self.mesh.mesh();
        let mut hits: Vec<(f32, [String; 2])> = kernel
            .edges()
            .filter_map(|eh| {
                let [a, b] = kernel.edge_vertices(eh)?;
                let names = self.mesh.edge_name(eh)?;
                let t = ray_segment(
                    ray,
                    kernel.position(a)?,
                    kernel.position(b)?,
                    settings.edge_radius,
                )?;
                Some((t, names))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits
    }

    pub fn draw(&self, sink: &mut dyn DebugDraw, to_world: Mat4, settings: &DrawSettings) {
        let kernel = self.mesh.mesh();
        let world = |vh: VertexHandle| kernel.position(vh).map(|p| to_world.transform_point3(p));

        for strip in self.mesh.line_strips() {
            let points: Vec<Vec3> = strip.points.iter().copied().filter_map(world).collect();
            sink.line_strip(&points, settings.line_strip_color);
        }
        for eh in kernel.edges() {
            let Some([a, b]) = kernel.edge_vertices(eh) else {
                continue;
            };
            let (Some(pa), Some(pb)) = (world(a), world(b)) else {
                continue;
            };
            let color = if self.selected_edges.contains(&eh) {
                settings.selected_color
            } else {
                settings.edge_color
            };
            sink.line_strip(&[pa, pb], color);
        }
        for &fh in &self.selected_faces {
            let mut outline: Vec<Vec3> = kernel
                .face_vertices(fh)
                .into_iter()
                .filter_map(world)
                .collect();
            if let Some(&first) = outline.first() {
                outline.push(first);
            }
            sink.line_strip(&outline, settings.selected_color);
        }
        for vh in kernel.vertices() {
            let selected = self.selected_vertices.contains(&vh);
            if !selected && !settings.show_vertices {
                continue;
            }
            if let Some(p) = world(vh) {
                let color = if selected {
                    settings.selected_color
                } else {
                    settings.edge_color
                };
                sink.point(p, color);
            }
        }
    }

    /// Pending deletions as path-qualified face names in a `delete` command.
    pub fn sync_to_ast(&mut self, doc: &mut CommandDocument) -> SyncOutcome {
        let faces = self
            .faces_to_delete
            .iter()
            .map(|name| Arg::Ident(self.qualify(name)))
            .collect();
        let command = Command::new("delete", &self.path).with_arg("faces", Arg::List(faces));
        let outcome = doc.write(self.command, false, command);
        self.command = Some(outcome.command);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::RecordingDraw;
    use crate::graph::FlowGraph;
    use crate::indexed::FacePoints;

    /// Two quads sharing edge b-e:
    ///
    /// ```text
    /// d---c---f
    /// |   |   |
    /// a---b---e
    /// ```
    fn strip() -> IndexedMesh {
        let mut mesh = IndexedMesh::new(IndexMode::Authoritative);
        mesh.add_vertex("a", Vec3::new(0.0, 0.0, 0.0));
        mesh.add_vertex("b", Vec3::new(1.0, 0.0, 0.0));
        mesh.add_vertex("c", Vec3::new(1.0, 1.0, 0.0));
        mesh.add_vertex("d", Vec3::new(0.0, 1.0, 0.0));
        mesh.add_vertex("e", Vec3::new(2.0, 0.0, 0.0));
        mesh.add_vertex("f", Vec3::new(2.0, 1.0, 0.0));
        mesh.add_face("left", FacePoints::names(["a", "b", "c", "d"]))
            .unwrap();
        mesh.add_face("right", FacePoints::names(["b", "e", "f", "c"]))
            .unwrap();
        mesh
    }

    fn instance(source: &IndexedMesh) -> MeshInstance {
        let mut graph: FlowGraph<()> = FlowGraph::new();
        let node = graph.add_node((), &[]).unwrap();
        let mut instance = MeshInstance::new(GeneratorId(0), PlacementId(0), node, "root.strip".into());
        instance.copy_from_generator(source).unwrap();
        instance
    }

    fn assert_selection_consistent(instance: &MeshInstance) {
        for name in instance.selected_vertex_names() {
            let vh = instance.mesh().vertex(&name).unwrap();
            assert!(instance.selected_vertex_handles().contains(&vh));
        }
        for &vh in instance.selected_vertex_handles() {
            assert!(instance.mesh().vertex_name(vh).is_some());
        }
        for name in instance.selected_face_names() {
            let fh = instance.mesh().face(&name).unwrap();
            assert!(instance.selected_face_handles().contains(&fh));
        }
        for &fh in instance.selected_face_handles() {
            assert!(instance.mesh().face_name(fh).is_some());
        }
        for [a, b] in instance.selected_edge_names() {
            let eh = instance.mesh().edge(&a, &b).unwrap();
            assert!(instance.selected_edge_handles().contains(&eh));
        }
        for &eh in instance.selected_edge_handles() {
            assert!(instance.mesh().mesh().is_valid_edge(eh));
            assert!(instance.mesh().edge_name(eh).is_some());
        }
    }

    #[test]
    fn copy_is_idempotent() {
        let source = strip();
        let mut instance = instance(&source);
        instance.mark_vert_as_selected(["a", "c"], true);
        instance.mark_face_as_selected(["right"], true);
        instance.mark_edge_as_selected([["b", "c"]], true);
        instance.remove_face(&["left"]).unwrap();

        instance.copy_from_generator(&source).unwrap();
        let once = instance.clone();
        instance.copy_from_generator(&source).unwrap();
        assert_eq!(instance, once);
        assert_selection_consistent(&instance);
    }

    #[test]
    fn remove_face_returns_rim_and_leaves_source_alone() {
        let source = strip();
        let mut instance = instance(&source);
        let rim = instance.remove_face(&["left", "missing"]).unwrap();
        assert_eq!(rim, vec!["a", "b", "c", "d"]);
        assert!(instance.mesh().face("left").is_none());
        assert!(source.face("left").is_some());
        assert_eq!(instance.mesh().mesh().n_faces(), 1);
        assert!(instance.faces_to_delete().contains("missing"));
        // shared edge survives with the other face
        assert!(instance.mesh().edge("b", "c").is_some());
        assert!(instance.mesh().edge("a", "b").is_none());
    }

    #[test]
    fn deletion_persists_across_generator_changes() {
        let mut source = strip();
        let mut instance = instance(&source);
        instance.remove_face(&["left"]).unwrap();

        source.add_vertex("g", Vec3::new(3.0, 0.0, 0.0));
        source
            .add_face("far", FacePoints::names(["e", "g", "f"]))
            .unwrap();
        instance.copy_from_generator(&source).unwrap();
        assert!(instance.mesh().face("left").is_none());
        assert!(instance.mesh().face("far").is_some());
        assert_eq!(instance.mesh().mesh().n_faces(), 2);
    }

    #[test]
    fn restored_faces_return_on_next_copy() {
        let source = strip();
        let mut instance = instance(&source);
        instance.remove_face(&["left"]).unwrap();
        assert_eq!(instance.restore_faces(&["left", "nope"]), 1);
        assert!(instance.mesh().face("left").is_none());
        instance.copy_from_generator(&source).unwrap();
        assert!(instance.mesh().face("left").is_some());
    }

    #[test]
    fn selections_follow_names_through_a_copy() {
        let source = strip();
        let mut instance = instance(&source);
        instance.mark_vert_as_selected(["a", "zz"], true);
        instance.mark_face_as_selected(["left", "right"], true);
        instance.mark_edge_as_selected([["b", "c"], ["a", "b"]], true);
        assert_eq!(instance.selected_vertex_names().len(), 1);
        assert_selection_consistent(&instance);

        let mut rebuilt = IndexedMesh::new(IndexMode::Authoritative);
        rebuilt.add_vertex("x", Vec3::ZERO);
        rebuilt.add_vertex("b", Vec3::new(1.0, 0.0, 0.0));
        rebuilt.add_vertex("e", Vec3::new(2.0, 0.0, 0.0));
        rebuilt.add_vertex("f", Vec3::new(2.0, 1.0, 0.0));
        rebuilt.add_vertex("c", Vec3::new(1.0, 1.0, 0.0));
        rebuilt.add_vertex("a", Vec3::new(-1.0, 0.0, 0.0));
        rebuilt
            .add_face("right", FacePoints::names(["b", "e", "f", "c"]))
            .unwrap();
        instance.copy_from_generator(&rebuilt).unwrap();

        assert_eq!(
            instance.selected_vertex_names().into_iter().collect::<Vec<_>>(),
            vec!["a"]
        );
        assert_eq!(
            instance.selected_face_names().into_iter().collect::<Vec<_>>(),
            vec!["right"]
        );
        assert_eq!(
            instance.selected_vertex_paths().into_iter().collect::<Vec<_>>(),
            vec!["root.strip.a"]
        );
        assert_eq!(instance.selected_edge_handles().len(), 1);
        assert_selection_consistent(&instance);
    }

    #[test]
    fn deselecting_and_deselect_all() {
        let source = strip();
        let mut instance = instance(&source);
        instance.mark_vert_as_selected(["a", "b"], true);
        instance.mark_vert_as_selected(["a"], false);
        assert_eq!(
            instance.selected_vertex_names().into_iter().collect::<Vec<_>>(),
            vec!["b"]
        );
        instance.mark_edge_as_selected([["c", "b"]], true);
        assert_eq!(
            instance.selected_edge_paths().into_iter().collect::<Vec<_>>().len(),
            1
        );
        instance.mark_face_as_selected(["left"], true);
        instance.deselect_all();
        assert!(instance.selected_vertex_handles().is_empty());
        assert!(instance.selected_edge_handles().is_empty());
        assert!(instance.selected_face_handles().is_empty());
    }

    #[test]
    fn removing_a_selected_face_drops_it_from_selection() {
        let source = strip();
        let mut instance = instance(&source);
        instance.mark_face_as_selected(["left"], true);
        instance.mark_edge_as_selected([["a", "b"]], true);
        instance.remove_face(&["left"]).unwrap();
        assert!(instance.selected_face_handles().is_empty());
        assert!(instance.selected_edge_handles().is_empty());
        assert_selection_consistent(&instance);
    }

    #[test]
    fn pick_faces_orders_by_distance() {
        let mut mesh = IndexedMesh::new(IndexMode::Authoritative);
        for (i, z) in [4.0_f32, 1.0, 2.5].into_iter().enumerate() {
            let names = [0, 1, 2].map(|k| format!("p{i}_{k}"));
            mesh.add_vertex(&names[0], Vec3::new(-1.0, -1.0, -z));
            mesh.add_vertex(&names[1], Vec3::new(1.0, -1.0, -z));
            mesh.add_vertex(&names[2], Vec3::new(0.0, 1.0, -z));
            mesh.add_face(&format!("f{i}"), FacePoints::names(names))
                .unwrap();
        }
        let instance = instance(&mesh);
        let hits = instance.pick_faces(&Ray::new(Vec3::ZERO, Vec3::NEG_Z));
        let names: Vec<&str> = hits.iter().map(|(_, name)| name.as_str()).collect();
        assert_eq!(names, vec!["f1", "f2", "f0"]);
        assert_eq!(
            hits.iter().map(|(t, _)| *t).collect::<Vec<_>>(),
            vec![1.0, 2.5, 4.0]
        );
        assert!(instance
            .pick_faces(&Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::NEG_Z))
            .is_empty());
    }

    #[test]
    fn pick_vertices_and_edges() {
        let source = strip();
        let instance = instance(&source);
        let settings = PickSettings::default();
        let ray = Ray::new(Vec3::new(1.0, 0.0, 5.0), Vec3::NEG_Z);
        let vertices = instance.pick_vertices(&ray, &settings);
        assert_eq!(vertices.len(), 1);
        assert_eq!(vertices[0].1, "b");

        let ray = Ray::new(Vec3::new(1.5, 0.0, 5.0), Vec3::NEG_Z);
        let edges = instance.pick_edges(&ray, &settings);
        assert_eq!(edges.len(), 1);
        let [a, b] = &edges[0].1;
        let mut ends = [a.as_str(), b.as_str()];
        ends.sort();
        assert_eq!(ends, ["b", "e"]);
    }

    #[test]
    fn sync_writes_qualified_deletions_once() {
        let source = strip();
        let mut instance = instance(&source);
        instance.remove_face(&["left"]).unwrap();
        let mut doc = CommandDocument::new();
        let first = instance.sync_to_ast(&mut doc);
        assert!(first.changed);
        assert!(!instance.sync_to_ast(&mut doc).changed);
        assert_eq!(
            doc.get(first.command).unwrap().arg("faces"),
            Some(&Arg::List(vec![Arg::Ident("root.strip.left".into())]))
        );
    }

    #[test]
    fn draw_highlights_selection() {
        let source = strip();
        let mut instance = instance(&source);
        instance.mark_edge_as_selected([["a", "b"]], true);
        instance.mark_vert_as_selected(["f"], true);
        let settings = DrawSettings::default();
        let mut sink = RecordingDraw::new();
        instance.draw(&mut sink, Mat4::IDENTITY, &settings);
        assert_eq!(sink.segment_count(), 7);
        assert_eq!(sink.count_color(settings.selected_color), 1);
        assert_eq!(sink.points.len(), 1);
    }
}
