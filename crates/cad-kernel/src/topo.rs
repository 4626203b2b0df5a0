//! Boundary-representation topology values.
//!
//! Shapes are plain value trees: a compound owns shapes, a solid owns
//! shells, a shell owns faces, and so on down to vertices. Entity identity
//! is geometric (coordinates within `TOL`), not referential, which is what
//! makes the downstream topological naming deterministic.

use serde::{Deserialize, Serialize};

use crate::geom::{Ax1, Dir, Pnt, Trsf, TOL};

/// Edge geometry classification surfaced by selection queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveKind {
    Line,
    Circle,
    BSpline,
}

/// Face geometry classification surfaced by selection queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceKind {
    Plane,
    Cylinder,
    Sphere,
    Torus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Curve {
    Line,
    /// Circular arc; a full circle when the edge endpoints coincide.
    Arc {
        center: Pnt,
        normal: Dir,
        radius: f64,
    },
    /// Interpolating spline through the given poles.
    BSpline { poles: Vec<Pnt> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub first: Pnt,
    pub last: Pnt,
    pub curve: Curve,
}

impl Edge {
    pub fn line(first: Pnt, last: Pnt) -> Self {
        Self {
            first,
            last,
            curve: Curve::Line,
        }
    }

    pub fn full_circle(center: Pnt, normal: Dir, radius: f64, start: Pnt) -> Self {
        Self {
            first: start,
            last: start,
            curve: Curve::Arc {
                center,
                normal,
                radius,
            },
        }
    }

    pub fn curve_kind(&self) -> CurveKind {
        match self.curve {
            Curve::Line => CurveKind::Line,
            Curve::Arc { .. } => CurveKind::Circle,
            Curve::BSpline { .. } => CurveKind::BSpline,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        match &self.curve {
            Curve::Line => (self.last - self.first).norm() < TOL,
            Curve::Arc { radius, .. } => *radius < TOL,
            Curve::BSpline { poles } => {
                poles.len() < 2
                    || poles
                        .windows(2)
                        .all(|w| (w[1] - w[0]).norm() < TOL)
            }
        }
    }

    /// Polyline length for splines, analytic length otherwise.
    pub fn length(&self) -> f64 {
        match &self.curve {
            Curve::Line => (self.last - self.first).norm(),
            Curve::Arc { radius, .. } => self.arc_sweep() * radius,
            Curve::BSpline { poles } => poles.windows(2).map(|w| (w[1] - w[0]).norm()).sum(),
        }
    }

    /// Swept angle of an arc edge (2π for a full circle).
    pub fn arc_sweep(&self) -> f64 {
        match &self.curve {
            Curve::Arc { center, radius, .. } => {
                if (self.last - self.first).norm() < TOL {
                    std::f64::consts::TAU
                } else {
                    let a = (self.first - center) / *radius;
                    let b = (self.last - center) / *radius;
                    a.dot(&b).clamp(-1.0, 1.0).acos()
                }
            }
            _ => 0.0,
        }
    }

    pub fn approx_eq(&self, other: &Edge) -> bool {
        let ends_match = (points_close(&self.first, &other.first)
            && points_close(&self.last, &other.last))
            || (points_close(&self.first, &other.last)
                && points_close(&self.last, &other.first));
        ends_match && self.curve_kind() == other.curve_kind() && {
            match (&self.curve, &other.curve) {
                (
                    Curve::Arc {
                        center: c1,
                        radius: r1,
                        ..
                    },
                    Curve::Arc {
                        center: c2,
                        radius: r2,
                        ..
                    },
                ) => points_close(c1, c2) && (r1 - r2).abs() < TOL,
                _ => true,
            }
        }
    }

    pub fn transformed(&self, t: &Trsf) -> Edge {
        let curve = match &self.curve {
            Curve::Line => Curve::Line,
            Curve::Arc {
                center,
                normal,
                radius,
            } => Curve::Arc {
                center: t.apply_pnt(center),
                normal: t.apply_dir(normal),
                radius: *radius,
            },
            Curve::BSpline { poles } => Curve::BSpline {
                poles: poles.iter().map(|p| t.apply_pnt(p)).collect(),
            },
        };
        Edge {
            first: t.apply_pnt(&self.first),
            last: t.apply_pnt(&self.last),
            curve,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    pub edges: Vec<Edge>,
}

impl Wire {
    pub fn new(edges: Vec<Edge>) -> Self {
        Self { edges }
    }

    pub fn is_closed(&self) -> bool {
        match (self.edges.first(), self.edges.last()) {
            (Some(first), Some(last)) => points_close(&first.first, &last.last),
            _ => false,
        }
    }

    pub fn length(&self) -> f64 {
        self.edges.iter().map(Edge::length).sum()
    }

    pub fn approx_eq(&self, other: &Wire) -> bool {
        self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .all(|e| other.edges.iter().any(|o| e.approx_eq(o)))
    }

    pub fn transformed(&self, t: &Trsf) -> Wire {
        Wire {
            edges: self.edges.iter().map(|e| e.transformed(t)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Surface {
    Plane { origin: Pnt, normal: Dir },
    Cylinder { axis: Ax1, radius: f64, height: f64 },
    Sphere { center: Pnt, radius: f64 },
    Torus { axis: Ax1, major: f64, minor: f64 },
}

impl Surface {
    pub fn kind(&self) -> SurfaceKind {
        match self {
            Surface::Plane { .. } => SurfaceKind::Plane,
            Surface::Cylinder { .. } => SurfaceKind::Cylinder,
            Surface::Sphere { .. } => SurfaceKind::Sphere,
            Surface::Torus { .. } => SurfaceKind::Torus,
        }
    }

    pub fn transformed(&self, t: &Trsf) -> Surface {
        match self {
            Surface::Plane { origin, normal } => Surface::Plane {
                origin: t.apply_pnt(origin),
                normal: t.apply_dir(normal),
            },
            Surface::Cylinder {
                axis,
                radius,
                height,
            } => Surface::Cylinder {
                axis: t.apply_ax1(axis),
                radius: *radius,
                height: *height,
            },
            Surface::Sphere { center, radius } => Surface::Sphere {
                center: t.apply_pnt(center),
                radius: *radius,
            },
            Surface::Torus { axis, major, minor } => Surface::Torus {
                axis: t.apply_ax1(axis),
                major: *major,
                minor: *minor,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub surface: Surface,
    /// Bounding wires; empty for closed surfaces (sphere, torus, lateral
    /// cylinder built from a full circle).
    pub wires: Vec<Wire>,
}

impl Face {
    pub fn planar(origin: Pnt, normal: Dir, outer: Wire) -> Self {
        Self {
            surface: Surface::Plane { origin, normal },
            wires: vec![outer],
        }
    }

    pub fn outer_wire(&self) -> Option<&Wire> {
        self.wires.first()
    }

    pub fn approx_eq(&self, other: &Face) -> bool {
        self.surface.kind() == other.surface.kind()
            && self.wires.len() == other.wires.len()
            && self
                .wires
                .iter()
                .zip(other.wires.iter())
                .all(|(a, b)| a.approx_eq(b))
    }

    pub fn transformed(&self, t: &Trsf) -> Face {
        Face {
            surface: self.surface.transformed(t),
            wires: self.wires.iter().map(|w| w.transformed(t)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    pub faces: Vec<Face>,
}

impl Shell {
    pub fn approx_eq(&self, other: &Shell) -> bool {
        self.faces.len() == other.faces.len()
            && self
                .faces
                .iter()
                .all(|f| other.faces.iter().any(|o| f.approx_eq(o)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solid {
    pub shells: Vec<Shell>,
}

impl Solid {
    pub fn from_faces(faces: Vec<Face>) -> Self {
        Self {
            shells: vec![Shell { faces }],
        }
    }

    pub fn faces(&self) -> impl Iterator<Item = &Face> {
        self.shells.iter().flat_map(|s| s.faces.iter())
    }

    pub fn approx_eq(&self, other: &Solid) -> bool {
        self.shells.len() == other.shells.len()
            && self
                .shells
                .iter()
                .all(|s| other.shells.iter().any(|o| s.approx_eq(o)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Vertex(Pnt),
    Edge(Edge),
    Wire(Wire),
    Face(Face),
    Shell(Shell),
    Solid(Solid),
    Compound(Vec<Shape>),
}

impl Shape {
    pub fn empty_compound() -> Self {
        Shape::Compound(Vec::new())
    }

    pub fn is_single_edge(&self) -> bool {
        matches!(self, Shape::Edge(_))
    }

    pub fn is_single_face(&self) -> bool {
        matches!(self, Shape::Face(_))
    }

    pub fn is_single_wire(&self) -> bool {
        matches!(self, Shape::Wire(_))
    }

    pub fn is_single_open_wire(&self) -> bool {
        matches!(self, Shape::Wire(w) if !w.is_closed())
    }

    pub fn is_single_closed_wire(&self) -> bool {
        matches!(self, Shape::Wire(w) if w.is_closed())
    }

    pub fn is_single_volume(&self) -> bool {
        matches!(self, Shape::Solid(_))
    }

    pub fn transformed(&self, t: &Trsf) -> Shape {
        match self {
            Shape::Vertex(p) => Shape::Vertex(t.apply_pnt(p)),
            Shape::Edge(e) => Shape::Edge(e.transformed(t)),
            Shape::Wire(w) => Shape::Wire(w.transformed(t)),
            Shape::Face(f) => Shape::Face(f.transformed(t)),
            Shape::Shell(s) => Shape::Shell(Shell {
                faces: s.faces.iter().map(|f| f.transformed(t)).collect(),
            }),
            Shape::Solid(s) => Shape::Solid(Solid {
                shells: s
                    .shells
                    .iter()
                    .map(|sh| Shell {
                        faces: sh.faces.iter().map(|f| f.transformed(t)).collect(),
                    })
                    .collect(),
            }),
            Shape::Compound(children) => {
                Shape::Compound(children.iter().map(|c| c.transformed(t)).collect())
            }
        }
    }

    pub fn collect_solids<'a>(&'a self, out: &mut Vec<&'a Solid>) {
        match self {
            Shape::Solid(s) => out.push(s),
            Shape::Compound(children) => {
                for c in children {
                    c.collect_solids(out);
                }
            }
            _ => {}
        }
    }

    pub fn solids(&self) -> Vec<&Solid> {
        let mut out = Vec::new();
        self.collect_solids(&mut out);
        out
    }

    /// Shells that are not part of any solid.
    pub fn collect_free_shells<'a>(&'a self, out: &mut Vec<&'a Shell>) {
        match self {
            Shape::Shell(s) => out.push(s),
            Shape::Compound(children) => {
                for c in children {
                    c.collect_free_shells(out);
                }
            }
            _ => {}
        }
    }

    /// Faces outside any shell.
    pub fn collect_free_faces<'a>(&'a self, out: &mut Vec<&'a Face>) {
        match self {
            Shape::Face(f) => out.push(f),
            Shape::Compound(children) => {
                for c in children {
                    c.collect_free_faces(out);
                }
            }
            _ => {}
        }
    }

    /// Wires outside any face.
    pub fn collect_free_wires<'a>(&'a self, out: &mut Vec<&'a Wire>) {
        match self {
            Shape::Wire(w) => out.push(w),
            Shape::Compound(children) => {
                for c in children {
                    c.collect_free_wires(out);
                }
            }
            _ => {}
        }
    }

    /// Edges outside any wire.
    pub fn collect_free_edges<'a>(&'a self, out: &mut Vec<&'a Edge>) {
        match self {
            Shape::Edge(e) => out.push(e),
            Shape::Compound(children) => {
                for c in children {
                    c.collect_free_edges(out);
                }
            }
            _ => {}
        }
    }

    /// Vertices outside any edge.
    pub fn collect_free_vertices(&self, out: &mut Vec<Pnt>) {
        match self {
            Shape::Vertex(p) => out.push(*p),
            Shape::Compound(children) => {
                for c in children {
                    c.collect_free_vertices(out);
                }
            }
            _ => {}
        }
    }

    /// Every edge in the shape, including edges of faces and solids.
    pub fn collect_all_edges<'a>(&'a self, out: &mut Vec<&'a Edge>) {
        match self {
            Shape::Edge(e) => out.push(e),
            Shape::Wire(w) => out.extend(w.edges.iter()),
            Shape::Face(f) => {
                for w in &f.wires {
                    out.extend(w.edges.iter());
                }
            }
            Shape::Shell(s) => {
                for f in &s.faces {
                    for w in &f.wires {
                        out.extend(w.edges.iter());
                    }
                }
            }
            Shape::Solid(s) => {
                for f in s.faces() {
                    for w in &f.wires {
                        out.extend(w.edges.iter());
                    }
                }
            }
            Shape::Compound(children) => {
                for c in children {
                    c.collect_all_edges(out);
                }
            }
            Shape::Vertex(_) => {}
        }
    }
}

pub fn points_close(a: &Pnt, b: &Pnt) -> bool {
    (a - b).norm() < 1e-7
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pnt, vec3};
    use nalgebra::Unit;

    #[test]
    fn full_circle_edge_has_tau_sweep() {
        let e = Edge::full_circle(
            Pnt::origin(),
            Unit::new_normalize(vec3(0.0, 0.0, 1.0)),
            2.0,
            pnt(2.0, 0.0, 0.0),
        );
        assert_eq!(e.curve_kind(), CurveKind::Circle);
        assert!((e.length() - std::f64::consts::TAU * 2.0).abs() < 1e-12);
    }

    #[test]
    fn edge_equality_ignores_orientation() {
        let a = Edge::line(pnt(0.0, 0.0, 0.0), pnt(1.0, 0.0, 0.0));
        let b = Edge::line(pnt(1.0, 0.0, 0.0), pnt(0.0, 0.0, 0.0));
        assert!(a.approx_eq(&b));
    }

    #[test]
    fn degenerate_line_edge_is_detected() {
        let e = Edge::line(pnt(1.0, 1.0, 1.0), pnt(1.0, 1.0, 1.0));
        assert!(e.is_degenerate());
    }

    #[test]
    fn solids_are_collected_through_nested_compounds() {
        let solid = Solid::from_faces(vec![]);
        let shape = Shape::Compound(vec![
            Shape::Compound(vec![Shape::Solid(solid.clone())]),
            Shape::Solid(solid),
            Shape::Vertex(Pnt::origin()),
        ]);
        assert_eq!(shape.solids().len(), 2);
    }
}
