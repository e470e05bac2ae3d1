//! Kernel mesh plus the name bookkeeping shared by generators and instances.

use std::collections::BTreeMap;

use glam::Vec3;

use crate::error::MeshError;
use crate::kernel::{EdgeHandle, FaceHandle, PolyMesh, VertexHandle};

/// Authoritative meshes own the definition and only grow or clear; derived
/// copies belong to one instance and may lose faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Authoritative,
    DerivedCopy,
}

/// Name → handle map with an inverse listing every name bound to a handle.
///
/// Several names may alias one handle; the first bound name is the primary.
#[derive(Debug, Clone, PartialEq)]
pub struct NameIndex<H> {
    forward: BTreeMap<String, H>,
    inverse: BTreeMap<H, Vec<String>>,
}

impl<H> Default for NameIndex<H> {
    fn default() -> Self {
        Self {
            forward: BTreeMap::new(),
            inverse: BTreeMap::new(),
        }
    }
}

impl<H: Copy + Ord> NameIndex<H> {
    pub fn get(&self, name: &str) -> Option<H> {
        self.forward.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.forward.contains_key(name)
    }

    pub fn names(&self, handle: H) -> &[String] {
        self.inverse.get(&handle).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn primary_name(&self, handle: H) -> Option<&str> {
        self.names(handle).first().map(String::as_str)
    }

    /// Binds `name` to `handle`, returning the handle it was bound to before.
    pub fn bind(&mut self, name: &str, handle: H) -> Option<H> {
        let previous = self.unbind_name(name);
        self.forward.insert(name.to_string(), handle);
        self.inverse.entry(handle).or_default().push(name.to_string());
        previous
    }

    pub fn unbind_name(&mut self, name: &str) -> Option<H> {
        let handle = self.forward.remove(name)?;
        if let Some(names) = self.inverse.get_mut(&handle) {
            names.retain(|existing| existing != name);
            if names.is_empty() {
                self.inverse.remove(&handle);
            }
        }
        Some(handle)
    }

    pub fn unbind_handle(&mut self, handle: H) -> Vec<String> {
        let names = self.inverse.remove(&handle).unwrap_or_default();
        for name in &names {
            self.forward.remove(name);
        }
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, H)> + '_ {
        self.forward.iter().map(|(name, &handle)| (name.as_str(), handle))
    }

    pub fn handles(&self) -> impl Iterator<Item = H> + '_ {
        self.inverse.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.inverse.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FacePoints {
    Names(Vec<String>),
    Handles(Vec<VertexHandle>),
}

impl FacePoints {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Names(names.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineStrip {
    pub name: String,
    pub points: Vec<VertexHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMesh {
    mode: IndexMode,
    mesh: PolyMesh,
    vertices: NameIndex<VertexHandle>,
    faces: NameIndex<FaceHandle>,
    face_tuples: BTreeMap<Vec<VertexHandle>, FaceHandle>,
    line_strips: Vec<LineStrip>,
}

impl IndexedMesh {
    pub fn new(mode: IndexMode) -> Self {
        Self {
            mode,
            mesh: PolyMesh::new(),
            vertices: NameIndex::default(),
            faces: NameIndex::default(),
            face_tuples: BTreeMap::new(),
            line_strips: Vec::new(),
        }
    }

    pub fn mode(&self) -> IndexMode {
        self.mode
    }

    pub fn mesh(&self) -> &PolyMesh {
        &self.mesh
    }

    pub fn vertex_index(&self) -> &NameIndex<VertexHandle> {
        &self.vertices
    }

    pub fn face_index(&self) -> &NameIndex<FaceHandle> {
        &self.faces
    }

    pub fn line_strips(&self) -> &[LineStrip] {
        &self.line_strips
    }

    /// Deep copy owned by an instance. Handles coincide with the source at
    /// copy time but callers must resolve through names.
    pub fn derive_copy(&self) -> Self {
        Self {
            mode: IndexMode::DerivedCopy,
            ..self.clone()
        }
    }

    /// A duplicate name is rebound to the new vertex; the old vertex stays in
    /// the kernel without a name.
    pub fn add_vertex(&mut self, name: &str, position: Vec3) -> VertexHandle {
        let handle = self.mesh.add_vertex(position);
        if let Some(previous) = self.vertices.bind(name, handle) {
            tracing::debug!(name, ?previous, "vertex name rebound");
        }
        handle
    }

    pub fn has_vertex(&self, name: &str) -> bool {
        self.vertices.contains(name)
    }

    pub fn vertex(&self, name: &str) -> Option<VertexHandle> {
        self.vertices.get(name)
    }

    pub fn face(&self, name: &str) -> Option<FaceHandle> {
        self.faces.get(name)
    }

    pub fn vertex_position(&self, name: &str) -> Option<Vec3> {
        self.vertices
            .get(name)
            .and_then(|handle| self.mesh.position(handle))
    }

    pub fn vertex_name(&self, handle: VertexHandle) -> Option<&str> {
        self.vertices.primary_name(handle)
    }

    pub fn face_name(&self, handle: FaceHandle) -> Option<&str> {
        self.faces.primary_name(handle)
    }

    /// Both endpoint names; `None` when either endpoint is unnamed.
    pub fn edge_name(&self, edge: EdgeHandle) -> Option<[String; 2]> {
        let [a, b] = self.mesh.edge_vertices(edge)?;
        Some([
            self.vertex_name(a)?.to_string(),
            self.vertex_name(b)?.to_string(),
        ])
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<EdgeHandle> {
        self.mesh.find_edge(self.vertices.get(a)?, self.vertices.get(b)?)
    }

    /// Returns `Ok(None)` when a vertex name does not resolve.
    pub fn add_face(
        &mut self,
        name: &str,
        points: FacePoints,
    ) -> Result<Option<FaceHandle>, MeshError> {
        let handles = match points {
            FacePoints::Handles(handles) => handles,
            FacePoints::Names(names) => {
                let mut handles = Vec::with_capacity(names.len());
                for vertex in &names {
                    match self.vertices.get(vertex) {
                        Some(handle) => handles.push(handle),
                        None => {
                            tracing::warn!(face = name, vertex = %vertex, "face skipped: unknown vertex");
                            return Ok(None);
                        }
                    }
                }
                handles
            }
        };

        let existing_name = self.faces.get(name);
        if let Some(&face) = self.face_tuples.get(&handles) {
            match existing_name {
                Some(existing) if existing != face => {
                    return Err(MeshError::FaceNameConflict {
                        name: name.to_string(),
                        existing,
                    })
                }
                Some(_) => {}
                None => {
                    self.faces.bind(name, face);
                }
            }
            return Ok(Some(face));
        }
        if let Some(existing) = existing_name {
            return Err(MeshError::FaceNameConflict {
                name: name.to_string(),
                existing,
            });
        }

        let face = self.mesh.add_face(&handles)?;
        self.face_tuples.insert(handles, face);
        self.faces.bind(name, face);
        Ok(Some(face))
    }

    pub fn add_line_strip(&mut self, name: &str, points: &[VertexHandle]) -> Result<(), MeshError> {
        if let Some(&bad) = points.iter().find(|&&vh| !self.mesh.is_valid_vertex(vh)) {
            return Err(MeshError::DanglingHandle {
                name: format!("{name}:{}", bad.0),
            });
        }
        self.line_strips.push(LineStrip {
            name: name.to_string(),
            points: points.to_vec(),
        });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.mesh.clear();
        self.vertices.clear();
        self.faces.clear();
        self.face_tuples.clear();
        self.line_strips.clear();
    }

    /// Replaces everything at once; on error nothing changes.
    pub fn set_from_data(
        &mut self,
        mesh: PolyMesh,
        vertex_names: BTreeMap<String, VertexHandle>,
        face_names: BTreeMap<String, FaceHandle>,
    ) -> Result<(), MeshError> {
        if let Some((name, _)) = vertex_names
            .iter()
            .find(|(_, &handle)| !mesh.is_valid_vertex(handle))
        {
            return Err(MeshError::DanglingHandle { name: name.clone() });
        }
        if let Some((name, _)) = face_names
            .iter()
            .find(|(_, &handle)| !mesh.is_valid_face(handle))
        {
            return Err(MeshError::DanglingHandle { name: name.clone() });
        }

        let mut vertices = NameIndex::default();
        for (name, handle) in vertex_names {
            vertices.bind(&name, handle);
        }
        let mut faces = NameIndex::default();
        for (name, handle) in face_names {
            faces.bind(&name, handle);
        }
        let face_tuples: BTreeMap<_, _> = mesh
            .faces()
            .map(|face| (mesh.face_vertices(face), face))
            .collect();

        self.mesh = mesh;
        self.vertices = vertices;
        self.faces = faces;
        self.face_tuples = face_tuples;
        self.line_strips.clear();
        Ok(())
    }

    /// Removes a named face (and all its aliases) from a derived copy and
    /// returns its boundary vertices. `Ok(None)` when the name is unknown.
    pub fn remove_face(&mut self, name: &str) -> Result<Option<Vec<VertexHandle>>, MeshError> {
        if self.mode == IndexMode::Authoritative {
            return Err(MeshError::ReadOnly);
        }
        let Some(face) = self.faces.get(name) else {
            return Ok(None);
        };
        let boundary = self.mesh.face_vertices(face);
        self.mesh.delete_face(face)?;
        self.faces.unbind_handle(face);
        self.face_tuples.remove(&boundary);
        Ok(Some(boundary))
    }

    /// Primary vertex names of a face in boundary order.
    pub fn face_vertex_names(&self, face: FaceHandle) -> Vec<String> {
        self.mesh
            .face_vertices(face)
            .into_iter()
            .filter_map(|vh| self.vertex_name(vh).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(mode: IndexMode) -> IndexedMesh {
        let mut mesh = IndexedMesh::new(mode);
        mesh.add_vertex("a", Vec3::new(0.0, 0.0, 0.0));
        mesh.add_vertex("b", Vec3::new(1.0, 0.0, 0.0));
        mesh.add_vertex("c", Vec3::new(1.0, 1.0, 0.0));
        mesh.add_vertex("d", Vec3::new(0.0, 1.0, 0.0));
        mesh.add_face("f", FacePoints::names(["a", "b", "c", "d"]))
            .unwrap();
        mesh
    }

    #[test]
    fn same_tuple_under_two_names_is_one_face() {
        let mut mesh = square(IndexMode::Authoritative);
        let alias = mesh
            .add_face("g", FacePoints::names(["a", "b", "c", "d"]))
            .unwrap();
        assert_eq!(alias, mesh.face("f"));
        assert_eq!(mesh.mesh().n_faces(), 1);
        let face = mesh.face("g").unwrap();
        assert_eq!(mesh.face_index().names(face), ["f", "g"]);
        assert_eq!(mesh.face_name(face), Some("f"));
    }

    #[test]
    fn rotated_tuple_is_not_deduplicated() {
        let mut mesh = square(IndexMode::Authoritative);
        let err = mesh
            .add_face("g", FacePoints::names(["b", "c", "d", "a"]))
            .unwrap_err();
        assert!(matches!(err, MeshError::Topology(_)));
    }

    #[test]
    fn face_name_bound_to_other_geometry_is_a_conflict() {
        let mut mesh = square(IndexMode::Authoritative);
        mesh.add_vertex("e", Vec3::new(2.0, 0.0, 0.0));
        let err = mesh
            .add_face("f", FacePoints::names(["b", "e", "c"]))
            .unwrap_err();
        assert!(matches!(err, MeshError::FaceNameConflict { .. }));
        assert_eq!(mesh.mesh().n_faces(), 1);
    }

    #[test]
    fn unknown_vertex_skips_face() {
        let mut mesh = square(IndexMode::Authoritative);
        let face = mesh
            .add_face("g", FacePoints::names(["a", "b", "zz"]))
            .unwrap();
        assert_eq!(face, None);
        assert!(mesh.face("g").is_none());
    }

    #[test]
    fn duplicate_vertex_name_rebinds_without_deleting() {
        let mut mesh = square(IndexMode::Authoritative);
        let old = mesh.vertex("a").unwrap();
        let new = mesh.add_vertex("a", Vec3::new(5.0, 0.0, 0.0));
        assert_ne!(old, new);
        assert_eq!(mesh.vertex("a"), Some(new));
        assert_eq!(mesh.vertex_name(old), None);
        assert_eq!(mesh.mesh().n_vertices(), 5);
    }

    #[test]
    fn authoritative_mesh_refuses_removal() {
        let mut mesh = square(IndexMode::Authoritative);
        assert_eq!(mesh.remove_face("f"), Err(MeshError::ReadOnly));
        let mut copy = mesh.derive_copy();
        let boundary = copy.remove_face("f").unwrap().unwrap();
        assert_eq!(boundary.len(), 4);
        assert!(copy.face("f").is_none());
        assert!(mesh.face("f").is_some());
        assert_eq!(copy.remove_face("f"), Ok(None));
    }

    #[test]
    fn set_from_data_rejects_dangling_handles() {
        let mut mesh = square(IndexMode::Authoritative);
        let before = mesh.clone();
        let names = BTreeMap::from([("x".to_string(), VertexHandle(7))]);
        let err = mesh
            .set_from_data(PolyMesh::new(), names, BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, MeshError::DanglingHandle { name: "x".into() });
        assert_eq!(mesh, before);
    }

    #[test]
    fn clear_resets_every_index() {
        let mut mesh = square(IndexMode::Authoritative);
        let a = mesh.vertex("a").unwrap();
        mesh.add_line_strip("rim", &[a]).unwrap();
        mesh.clear();
        assert!(mesh.vertex_index().is_empty());
        assert!(mesh.face_index().is_empty());
        assert!(mesh.line_strips().is_empty());
        assert_eq!(mesh.mesh().n_vertices(), 0);
    }
}
