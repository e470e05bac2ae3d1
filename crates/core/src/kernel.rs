//! Half-edge polygon mesh with stable, index-based handles.
//!
//! Deleted elements are only flagged; handles stay valid (and are never
//! reused) until [`PolyMesh::clear`].

use std::collections::BTreeMap;

use glam::Vec3;
use thiserror::Error;

use crate::arena::{arena_id, ArenaId};

arena_id!(VertexHandle);
arena_id!(HalfedgeHandle);
arena_id!(EdgeHandle);
arena_id!(FaceHandle);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("face needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),

    #[error("invalid vertex reference: {0:?}")]
    InvalidVertex(VertexHandle),

    #[error("vertex {0:?} appears more than once in one face")]
    RepeatedVertex(VertexHandle),

    #[error("complex edge {from:?} -> {to:?} already bounds another face")]
    ComplexEdge { from: VertexHandle, to: VertexHandle },

    #[error("invalid face reference: {0:?}")]
    InvalidFace(FaceHandle),
}

#[derive(Debug, Clone, PartialEq)]
struct VertexData {
    position: Vec3,
    deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HalfedgeData {
    to: VertexHandle,
    face: Option<FaceHandle>,
    next: Option<HalfedgeHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FaceData {
    halfedge: HalfedgeHandle,
    deleted: bool,
}

/// Edge `e` owns half-edges `2e` and `2e + 1`, pointing in opposite directions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyMesh {
    vertices: Vec<VertexData>,
    halfedges: Vec<HalfedgeData>,
    edge_deleted: Vec<bool>,
    faces: Vec<FaceData>,
    directed: BTreeMap<(VertexHandle, VertexHandle), HalfedgeHandle>,
}

impl PolyMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, position: Vec3) -> VertexHandle {
        let handle = VertexHandle::from_index(self.vertices.len());
        self.vertices.push(VertexData {
            position,
            deleted: false,
        });
        handle
    }

    pub fn add_face(&mut self, vertices: &[VertexHandle]) -> Result<FaceHandle, TopologyError> {
        if vertices.len() < 3 {
            return Err(TopologyError::TooFewVertices(vertices.len()));
        }
        for (i, &vh) in vertices.iter().enumerate() {
            if !self.is_valid_vertex(vh) {
                return Err(TopologyError::InvalidVertex(vh));
            }
            if vertices[..i].contains(&vh) {
                return Err(TopologyError::RepeatedVertex(vh));
            }
        }

        let n = vertices.len();
        for i in 0..n {
            let (from, to) = (vertices[i], vertices[(i + 1) % n]);
            if let Some(&he) = self.directed.get(&(from, to)) {
                if self.halfedges[he.index()].face.is_some() {
                    return Err(TopologyError::ComplexEdge { from, to });
                }
            }
        }

        let face = FaceHandle::from_index(self.faces.len());
        let ring: Vec<HalfedgeHandle> = (0..n)
            .map(|i| self.find_or_create_halfedge(vertices[i], vertices[(i + 1) % n]))
            .collect();
        for (i, &he) in ring.iter().enumerate() {
            let data = &mut self.halfedges[he.index()];
            data.face = Some(face);
            data.next = Some(ring[(i + 1) % n]);
        }
        self.faces.push(FaceData {
            halfedge: ring[0],
            deleted: false,
        });
        Ok(face)
    }

    fn find_or_create_halfedge(&mut self, from: VertexHandle, to: VertexHandle) -> HalfedgeHandle {
        if let Some(&he) = self.directed.get(&(from, to)) {
            return he;
        }
        let edge = self.edge_deleted.len();
        self.edge_deleted.push(false);
        let forward = HalfedgeHandle::from_index(edge * 2);
        let backward = HalfedgeHandle::from_index(edge * 2 + 1);
        self.halfedges.push(HalfedgeData {
            to,
            face: None,
            next: None,
        });
        self.halfedges.push(HalfedgeData {
            to: from,
            face: None,
            next: None,
        });
        self.directed.insert((from, to), forward);
        self.directed.insert((to, from), backward);
        forward
    }

    /// Removes the face; edges left without any face go with it, vertices stay.
    pub fn delete_face(&mut self, face: FaceHandle) -> Result<(), TopologyError> {
        if !self.is_valid_face(face) {
            return Err(TopologyError::InvalidFace(face));
        }
        let ring = self.face_halfedges(face);
        for &he in &ring {
            let data = &mut self.halfedges[he.index()];
            data.face = None;
            data.next = None;
        }
        self.faces[face.index()].deleted = true;

        for he in ring {
            let twin = opposite(he);
            if self.halfedges[twin.index()].face.is_some() {
                continue;
            }
            let edge = he.index() / 2;
            if self.edge_deleted[edge] {
                continue;
            }
            self.edge_deleted[edge] = true;
            let from = self.from_vertex(he);
            let to = self.halfedges[he.index()].to;
            self.directed.remove(&(from, to));
            self.directed.remove(&(to, from));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_valid_vertex(&self, vh: VertexHandle) -> bool {
        self.vertices
            .get(vh.index())
            .is_some_and(|vertex| !vertex.deleted)
    }

    pub fn is_valid_face(&self, fh: FaceHandle) -> bool {
        self.faces.get(fh.index()).is_some_and(|face| !face.deleted)
    }

    pub fn is_valid_edge(&self, eh: EdgeHandle) -> bool {
        self.edge_deleted.get(eh.index()).is_some_and(|deleted| !deleted)
    }

    pub fn n_vertices(&self) -> usize {
        self.vertices().count()
    }

    pub fn n_faces(&self) -> usize {
        self.faces().count()
    }

    pub fn n_edges(&self) -> usize {
        self.edges().count()
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexHandle> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, vertex)| !vertex.deleted)
            .map(|(index, _)| VertexHandle::from_index(index))
    }

    pub fn faces(&self) -> impl Iterator<Item = FaceHandle> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, face)| !face.deleted)
            .map(|(index, _)| FaceHandle::from_index(index))
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeHandle> + '_ {
        self.edge_deleted
            .iter()
            .enumerate()
            .filter(|(_, deleted)| !**deleted)
            .map(|(index, _)| EdgeHandle::from_index(index))
    }

    pub fn position(&self, vh: VertexHandle) -> Option<Vec3> {
        self.vertices
            .get(vh.index())
            .filter(|vertex| !vertex.deleted)
            .map(|vertex| vertex.position)
    }

    pub fn set_position(&mut self, vh: VertexHandle, position: Vec3) -> bool {
        match self.vertices.get_mut(vh.index()) {
            Some(vertex) if !vertex.deleted => {
                vertex.position = position;
                true
            }
            _ => false,
        }
    }

    fn from_vertex(&self, he: HalfedgeHandle) -> VertexHandle {
        self.halfedges[opposite(he).index()].to
    }

    fn face_halfedges(&self, face: FaceHandle) -> Vec<HalfedgeHandle> {
        let Some(data) = self.faces.get(face.index()).filter(|face| !face.deleted) else {
            return Vec::new();
        };
        let mut ring = vec![data.halfedge];
        let mut current = data.halfedge;
        while let Some(next) = self.halfedges[current.index()].next {
            if next == data.halfedge || ring.len() > self.halfedges.len() {
                break;
            }
            ring.push(next);
            current = next;
        }
        ring
    }

    /// Boundary vertices in declaration order, starting at the first declared vertex.
    pub fn face_vertices(&self, face: FaceHandle) -> Vec<VertexHandle> {
        self.face_halfedges(face)
            .into_iter()
            .map(|he| self.from_vertex(he))
            .collect()
    }

    pub fn face_positions(&self, face: FaceHandle) -> Vec<Vec3> {
        self.face_vertices(face)
            .into_iter()
            .filter_map(|vh| self.position(vh))
            .collect()
    }

    /// Newell normal; zero for degenerate faces.
    pub fn face_normal(&self, face: FaceHandle) -> Vec3 {
        let points = self.face_positions(face);
        let mut normal = Vec3::ZERO;
        for (i, current) in points.iter().enumerate() {
            let next = points[(i + 1) % points.len()];
            normal.x += (current.y - next.y) * (current.z + next.z);
            normal.y += (current.z - next.z) * (current.x + next.x);
            normal.z += (current.x - next.x) * (current.y + next.y);
        }
        normal.normalize_or_zero()
    }

    pub fn edge_vertices(&self, edge: EdgeHandle) -> Option<[VertexHandle; 2]> {
        if !self.is_valid_edge(edge) {
            return None;
        }
        let forward = HalfedgeHandle::from_index(edge.index() * 2);
        Some([self.from_vertex(forward), self.halfedges[forward.index()].to])
    }

    pub fn find_edge(&self, a: VertexHandle, b: VertexHandle) -> Option<EdgeHandle> {
        self.directed
            .get(&(a, b))
            .map(|he| EdgeHandle::from_index(he.index() / 2))
    }

    fn outgoing(&self, vh: VertexHandle) -> impl Iterator<Item = HalfedgeHandle> + '_ {
        let lower = (vh, VertexHandle(0));
        let upper = (vh, VertexHandle(u32::MAX));
        self.directed.range(lower..=upper).map(|(_, &he)| he)
    }

    pub fn vertex_faces(&self, vh: VertexHandle) -> Vec<FaceHandle> {
        let mut faces: Vec<FaceHandle> = self
            .outgoing(vh)
            .filter_map(|he| self.halfedges[he.index()].face)
            .collect();
        faces.sort();
        faces.dedup();
        faces
    }

    /// Isolated vertices count as boundary vertices.
    pub fn is_boundary_vertex(&self, vh: VertexHandle) -> bool {
        let mut outgoing = self.outgoing(vh).peekable();
        if outgoing.peek().is_none() {
            return true;
        }
        outgoing.any(|he| {
            self.halfedges[he.index()].face.is_none()
                || self.halfedges[opposite(he).index()].face.is_none()
        })
    }
}

fn opposite(he: HalfedgeHandle) -> HalfedgeHandle {
    HalfedgeHandle(he.0 ^ 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_pair() -> (PolyMesh, Vec<VertexHandle>, FaceHandle, FaceHandle) {
        let mut mesh = PolyMesh::new();
        let v: Vec<_> = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 1.0, 0.0],
        ]
        .into_iter()
        .map(|p| mesh.add_vertex(Vec3::from(p)))
        .collect();
        let left = mesh.add_face(&[v[0], v[1], v[2], v[3]]).unwrap();
        let right = mesh.add_face(&[v[1], v[4], v[5], v[2]]).unwrap();
        (mesh, v, left, right)
    }

    #[test]
    fn shared_edge_is_counted_once() {
        let (mesh, v, left, right) = quad_pair();
        assert_eq!(mesh.n_faces(), 2);
        assert_eq!(mesh.n_edges(), 7);
        assert_eq!(mesh.face_vertices(left), vec![v[0], v[1], v[2], v[3]]);
        assert_eq!(mesh.face_vertices(right), vec![v[1], v[4], v[5], v[2]]);
        assert_eq!(mesh.find_edge(v[1], v[2]), mesh.find_edge(v[2], v[1]));
        assert_eq!(mesh.vertex_faces(v[1]), vec![left, right]);
    }

    #[test]
    fn rejects_complex_edges_and_bad_input() {
        let (mut mesh, v, _, _) = quad_pair();
        assert_eq!(
            mesh.add_face(&[v[0], v[1], v[3]]),
            Err(TopologyError::ComplexEdge {
                from: v[0],
                to: v[1]
            })
        );
        assert_eq!(
            mesh.add_face(&[v[0], v[1]]),
            Err(TopologyError::TooFewVertices(2))
        );
        assert_eq!(
            mesh.add_face(&[v[3], v[2], v[3]]),
            Err(TopologyError::RepeatedVertex(v[3]))
        );
        assert_eq!(
            mesh.add_face(&[v[3], v[2], VertexHandle(99)]),
            Err(TopologyError::InvalidVertex(VertexHandle(99)))
        );
    }

    #[test]
    fn delete_face_keeps_vertices_and_shared_edges() {
        let (mut mesh, v, left, right) = quad_pair();
        mesh.delete_face(right).unwrap();
        assert_eq!(mesh.n_faces(), 1);
        assert_eq!(mesh.n_vertices(), 6);
        assert_eq!(mesh.n_edges(), 4);
        assert!(mesh.find_edge(v[1], v[2]).is_some());
        assert!(mesh.find_edge(v[4], v[5]).is_none());
        assert!(mesh.is_boundary_vertex(v[4]));
        assert_eq!(mesh.faces().collect::<Vec<_>>(), vec![left]);
        assert_eq!(
            mesh.delete_face(right),
            Err(TopologyError::InvalidFace(right))
        );
        // the freed edge slot can be bounded again
        assert!(mesh.add_face(&[v[1], v[4], v[5], v[2]]).is_ok());
    }

    #[test]
    fn normal_follows_winding() {
        let (mesh, _, left, _) = quad_pair();
        let normal = mesh.face_normal(left);
        assert!((normal.z - 1.0).abs() < 1e-6);
    }
}
