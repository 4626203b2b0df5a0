//! Topological naming: stable 1-based integer IDs for every sub-entity of a
//! shape.
//!
//! The maps are rebuilt from scratch whenever a feature's shape is set, in a
//! fixed traversal: solids, their shells, faces, wires, edges, vertices;
//! then free shells, free faces, free wires, free edges and free vertices in
//! that order. IDs therefore depend only on the shape content, never on
//! build history or allocation order.

use cad_base::CadError;
use cad_kernel::topo::points_close;
use cad_kernel::{Edge, Face, Pnt, Shape, Shell, Solid, Wire};

pub type FeatureId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Solid,
    Shell,
    Face,
    Wire,
    Edge,
    Vertex,
}

impl EntityKind {
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Solid => "solid",
            EntityKind::Shell => "shell",
            EntityKind::Face => "face",
            EntityKind::Wire => "wire",
            EntityKind::Edge => "edge",
            EntityKind::Vertex => "vertex",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TopoMaps {
    pub solids: Vec<Solid>,
    pub shells: Vec<Shell>,
    pub faces: Vec<Face>,
    pub wires: Vec<Wire>,
    pub edges: Vec<Edge>,
    pub vertices: Vec<Pnt>,
}

impl TopoMaps {
    pub fn from_shape(shape: &Shape) -> Self {
        let mut maps = TopoMaps::default();

        for solid in shape.solids() {
            maps.add_solid(solid);
        }
        let mut shells = Vec::new();
        shape.collect_free_shells(&mut shells);
        for shell in shells {
            maps.add_shell(shell);
        }
        let mut faces = Vec::new();
        shape.collect_free_faces(&mut faces);
        for face in faces {
            maps.add_face(face);
        }
        let mut wires = Vec::new();
        shape.collect_free_wires(&mut wires);
        for wire in wires {
            maps.add_wire(wire);
        }
        let mut edges = Vec::new();
        shape.collect_free_edges(&mut edges);
        for edge in edges {
            maps.add_edge(edge);
        }
        let mut vertices = Vec::new();
        shape.collect_free_vertices(&mut vertices);
        for v in vertices {
            maps.add_vertex(&v);
        }

        maps
    }

    fn add_solid(&mut self, solid: &Solid) {
        if self.solids.iter().any(|s| s.approx_eq(solid)) {
            return;
        }
        self.solids.push(solid.clone());
        for shell in &solid.shells {
            self.add_shell(shell);
        }
    }

    fn add_shell(&mut self, shell: &Shell) {
        if self.shells.iter().any(|s| s.approx_eq(shell)) {
            return;
        }
        self.shells.push(shell.clone());
        for face in &shell.faces {
            self.add_face(face);
        }
    }

    fn add_face(&mut self, face: &Face) {
        if self.faces.iter().any(|f| f.approx_eq(face)) {
            return;
        }
        self.faces.push(face.clone());
        for wire in &face.wires {
            self.add_wire(wire);
        }
    }

    fn add_wire(&mut self, wire: &Wire) {
        if self.wires.iter().any(|w| w.approx_eq(wire)) {
            return;
        }
        self.wires.push(wire.clone());
        for edge in &wire.edges {
            self.add_edge(edge);
        }
    }

    fn add_edge(&mut self, edge: &Edge) {
        if self.edges.iter().any(|e| e.approx_eq(edge)) {
            return;
        }
        self.edges.push(edge.clone());
        self.add_vertex(&edge.first);
        self.add_vertex(&edge.last);
    }

    fn add_vertex(&mut self, p: &Pnt) {
        if self.vertices.iter().any(|q| points_close(q, p)) {
            return;
        }
        self.vertices.push(*p);
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Solid => self.solids.len(),
            EntityKind::Shell => self.shells.len(),
            EntityKind::Face => self.faces.len(),
            EntityKind::Wire => self.wires.len(),
            EntityKind::Edge => self.edges.len(),
            EntityKind::Vertex => self.vertices.len(),
        }
    }

    fn check(&self, kind: EntityKind, id: FeatureId) -> Result<usize, CadError> {
        let count = self.count(kind);
        if id == 0 || id > count {
            return Err(CadError::MissingEntity {
                kind: kind.name(),
                id,
                count,
            });
        }
        Ok(id - 1)
    }

    pub fn vertex(&self, id: FeatureId) -> Result<&Pnt, CadError> {
        Ok(&self.vertices[self.check(EntityKind::Vertex, id)?])
    }

    pub fn edge(&self, id: FeatureId) -> Result<&Edge, CadError> {
        Ok(&self.edges[self.check(EntityKind::Edge, id)?])
    }

    pub fn wire(&self, id: FeatureId) -> Result<&Wire, CadError> {
        Ok(&self.wires[self.check(EntityKind::Wire, id)?])
    }

    pub fn face(&self, id: FeatureId) -> Result<&Face, CadError> {
        Ok(&self.faces[self.check(EntityKind::Face, id)?])
    }

    pub fn shell(&self, id: FeatureId) -> Result<&Shell, CadError> {
        Ok(&self.shells[self.check(EntityKind::Shell, id)?])
    }

    pub fn solid(&self, id: FeatureId) -> Result<&Solid, CadError> {
        Ok(&self.solids[self.check(EntityKind::Solid, id)?])
    }

    pub fn index_of_vertex(&self, p: &Pnt) -> Option<FeatureId> {
        self.vertices
            .iter()
            .position(|q| points_close(q, p))
            .map(|i| i + 1)
    }

    pub fn index_of_edge(&self, e: &Edge) -> Option<FeatureId> {
        self.edges.iter().position(|q| q.approx_eq(e)).map(|i| i + 1)
    }

    pub fn index_of_face(&self, f: &Face) -> Option<FeatureId> {
        self.faces.iter().position(|q| q.approx_eq(f)).map(|i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_kernel::geom::vec3;
    use cad_kernel::primitives::box_solid;

    fn cube() -> Shape {
        Shape::Solid(
            box_solid(
                Pnt::origin(),
                vec3(2.0, 0.0, 0.0),
                vec3(0.0, 3.0, 0.0),
                vec3(0.0, 0.0, 4.0),
            )
            .unwrap(),
        )
    }

    #[test]
    fn cube_map_counts() {
        let maps = TopoMaps::from_shape(&cube());
        assert_eq!(maps.count(EntityKind::Solid), 1);
        assert_eq!(maps.count(EntityKind::Shell), 1);
        assert_eq!(maps.count(EntityKind::Face), 6);
        assert_eq!(maps.count(EntityKind::Wire), 6);
        assert_eq!(maps.count(EntityKind::Edge), 12);
        assert_eq!(maps.count(EntityKind::Vertex), 8);
    }

    #[test]
    fn ids_are_one_based_and_bounds_checked() {
        let maps = TopoMaps::from_shape(&cube());
        assert!(maps.vertex(1).is_ok());
        assert!(maps.vertex(8).is_ok());
        assert!(matches!(
            maps.vertex(0),
            Err(CadError::MissingEntity { .. })
        ));
        assert!(matches!(
            maps.vertex(9),
            Err(CadError::MissingEntity { .. })
        ));
    }

    #[test]
    fn naming_is_deterministic_across_rebuilds() {
        let a = TopoMaps::from_shape(&cube());
        let b = TopoMaps::from_shape(&cube());
        assert_eq!(a.vertices, b.vertices);
        for (ea, eb) in a.edges.iter().zip(b.edges.iter()) {
            assert!(ea.approx_eq(eb));
        }
    }

    #[test]
    fn free_entities_follow_solid_entities() {
        let free_vertex = Pnt::new(9.0, 9.0, 9.0);
        let shape = Shape::Compound(vec![Shape::Vertex(free_vertex), cube()]);
        let maps = TopoMaps::from_shape(&shape);
        // The free vertex is appended after the 8 cube vertices.
        assert_eq!(maps.count(EntityKind::Vertex), 9);
        assert_eq!(maps.index_of_vertex(&free_vertex), Some(9));
    }
}
