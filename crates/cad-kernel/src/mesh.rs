//! Tessellation: faces to triangles, edges to polylines.
//!
//! All derived metrics (volume, area, bounding boxes, STL, occlusion tests)
//! run over these meshes. Segment counts are a deterministic function of the
//! deflection, so equal inputs tessellate equally.

use crate::geom::{Dir, Pnt, Vec3, TOL};
use crate::topo::{Curve, Edge, Face, Shape, Solid, Surface, Wire};
use crate::KernelError;

#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    pub positions: Vec<Pnt>,
    pub triangles: Vec<[usize; 3]>,
}

impl TriMesh {
    pub fn push_triangle(&mut self, a: Pnt, b: Pnt, c: Pnt) {
        let base = self.positions.len();
        self.positions.extend([a, b, c]);
        self.triangles.push([base, base + 1, base + 2]);
    }

    pub fn append(&mut self, other: TriMesh) {
        let base = self.positions.len();
        self.positions.extend(other.positions);
        self.triangles
            .extend(other.triangles.into_iter().map(|t| t.map(|i| i + base)));
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Number of segments approximating a circle of radius `r` so that the
/// sagitta stays below `deflection`.
pub fn circle_segments(r: f64, deflection: f64) -> usize {
    let d = deflection.max(1e-12).min(0.5 * r.max(1e-12));
    let theta = 2.0 * (1.0 - d / r).clamp(-1.0, 1.0).acos();
    if theta <= 0.0 {
        return 64;
    }
    ((std::f64::consts::TAU / theta).ceil() as usize).max(6)
}

/// Sample an edge into a polyline from `first` to `last`.
pub fn discretize_edge(e: &Edge, deflection: f64) -> Vec<Pnt> {
    match &e.curve {
        Curve::Line => vec![e.first, e.last],
        Curve::Arc {
            center,
            normal,
            radius,
        } => {
            let sweep = e.arc_sweep();
            let full = (e.last - e.first).norm() < TOL;
            let u = (e.first - center) / *radius;
            let v = normal.cross(&u);
            let n_full = circle_segments(*radius, deflection);
            let n = ((n_full as f64) * sweep / std::f64::consts::TAU).ceil() as usize;
            let n = n.max(2);
            let mut pts = Vec::with_capacity(n + 1);
            for i in 0..=n {
                let t = sweep * i as f64 / n as f64;
                pts.push(center + (u * t.cos() + v * t.sin()) * *radius);
            }
            if !full {
                // Force the exact endpoint against accumulated roundoff.
                *pts.last_mut().unwrap() = e.last;
            }
            pts
        }
        Curve::BSpline { poles } => poles.clone(),
    }
}

/// Chain the discretized edges of a wire into one polyline. Edge orientation
/// is fixed up on the fly; the closing duplicate point of a closed wire is
/// dropped.
pub fn wire_points(w: &Wire, deflection: f64) -> Vec<Pnt> {
    let mut pts: Vec<Pnt> = Vec::new();
    for e in &w.edges {
        let mut seg = discretize_edge(e, deflection);
        if let Some(tail) = pts.last() {
            let d_fwd = (seg[0] - tail).norm();
            let d_rev = (seg[seg.len() - 1] - tail).norm();
            if d_rev < d_fwd {
                seg.reverse();
            }
            if (seg[0] - tail).norm() < 1e-7 {
                seg.remove(0);
            }
        }
        pts.extend(seg);
    }
    if pts.len() > 1 && (pts[0] - pts[pts.len() - 1]).norm() < 1e-7 {
        pts.pop();
    }
    pts
}

/// Ear-clipping triangulation of a simple polygon given in 2D. Returns index
/// triples into the input slice, counter-clockwise.
pub fn ear_clip(pts: &[(f64, f64)]) -> Vec<[usize; 3]> {
    let n = pts.len();
    if n < 3 {
        return Vec::new();
    }
    let signed_area: f64 = (0..n)
        .map(|i| {
            let (x0, y0) = pts[i];
            let (x1, y1) = pts[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum::<f64>()
        * 0.5;

    let mut order: Vec<usize> = (0..n).collect();
    if signed_area < 0.0 {
        order.reverse();
    }

    let cross = |a: usize, b: usize, c: usize| -> f64 {
        let (ax, ay) = pts[a];
        let (bx, by) = pts[b];
        let (cx, cy) = pts[c];
        (bx - ax) * (cy - ay) - (by - ay) * (cx - ax)
    };
    let inside = |a: usize, b: usize, c: usize, p: usize| -> bool {
        let d1 = cross(a, b, p);
        let d2 = cross(b, c, p);
        let d3 = cross(c, a, p);
        d1 > 0.0 && d2 > 0.0 && d3 > 0.0
    };

    let mut tris = Vec::with_capacity(n - 2);
    let mut ring = order;
    let mut guard = 0usize;
    while ring.len() > 3 {
        let m = ring.len();
        let mut clipped = false;
        for k in 0..m {
            let a = ring[(k + m - 1) % m];
            let b = ring[k];
            let c = ring[(k + 1) % m];
            if cross(a, b, c) <= 1e-14 {
                continue;
            }
            let has_inside = ring
                .iter()
                .any(|&p| p != a && p != b && p != c && inside(a, b, c, p));
            if !has_inside {
                tris.push([a, b, c]);
                ring.remove(k);
                clipped = true;
                break;
            }
        }
        if !clipped {
            // Degenerate ring; fall back to a fan so callers always get a
            // full cover.
            for k in 1..ring.len() - 1 {
                tris.push([ring[0], ring[k], ring[k + 1]]);
            }
            return tris;
        }
        guard += 1;
        if guard > 4 * n {
            break;
        }
    }
    if ring.len() == 3 {
        tris.push([ring[0], ring[1], ring[2]]);
    }
    tris
}

/// Orthonormal in-plane basis for a polygon with the given normal.
fn plane_basis(normal: &Dir) -> (Vec3, Vec3) {
    let n = normal.as_ref();
    let mut u = Vec3::y().cross(n);
    if u.norm() < 1e-6 {
        u = Vec3::x().cross(n);
    }
    let u = u.normalize();
    let v = n.cross(&u);
    (u, v)
}

/// Triangulate one face into `mesh`, oriented along the face normal where
/// the surface defines one.
pub fn tessellate_face(face: &Face, deflection: f64, mesh: &mut TriMesh) -> Result<(), KernelError> {
    match &face.surface {
        Surface::Plane { origin, normal } => {
            let outer = face
                .outer_wire()
                .ok_or_else(|| KernelError::op("tessellate", "planar face without wire"))?;
            if face.wires.len() > 1 {
                return Err(KernelError::Unsupported(
                    "planar face with holes".into(),
                ));
            }
            let pts = wire_points(outer, deflection);
            if pts.len() < 3 {
                return Ok(());
            }
            let (u, v) = plane_basis(normal);
            let flat: Vec<(f64, f64)> = pts
                .iter()
                .map(|p| ((p - origin).dot(&u), (p - origin).dot(&v)))
                .collect();
            for [a, b, c] in ear_clip(&flat) {
                mesh.push_triangle(pts[a], pts[b], pts[c]);
            }
            Ok(())
        }
        Surface::Cylinder {
            axis,
            radius,
            height,
        } => {
            let n = circle_segments(*radius, deflection);
            let (u, v) = plane_basis(&axis.dir);
            let top = axis.dir.as_ref() * *height;
            for i in 0..n {
                let t0 = std::f64::consts::TAU * i as f64 / n as f64;
                let t1 = std::f64::consts::TAU * (i + 1) as f64 / n as f64;
                let p0 = axis.origin + (u * t0.cos() + v * t0.sin()) * *radius;
                let p1 = axis.origin + (u * t1.cos() + v * t1.sin()) * *radius;
                mesh.push_triangle(p0, p1, p1 + top);
                mesh.push_triangle(p0, p1 + top, p0 + top);
            }
            Ok(())
        }
        Surface::Sphere { center, radius } => {
            let n = circle_segments(*radius, deflection);
            let stacks = (n / 2).max(3);
            for si in 0..stacks {
                let ph0 = std::f64::consts::PI * si as f64 / stacks as f64;
                let ph1 = std::f64::consts::PI * (si + 1) as f64 / stacks as f64;
                for i in 0..n {
                    let t0 = std::f64::consts::TAU * i as f64 / n as f64;
                    let t1 = std::f64::consts::TAU * (i + 1) as f64 / n as f64;
                    let at = |ph: f64, th: f64| {
                        center
                            + Vec3::new(
                                ph.sin() * th.cos(),
                                ph.sin() * th.sin(),
                                ph.cos(),
                            ) * *radius
                    };
                    let (a, b, c, d) = (at(ph0, t0), at(ph0, t1), at(ph1, t1), at(ph1, t0));
                    mesh.push_triangle(a, c, b);
                    mesh.push_triangle(a, d, c);
                }
            }
            Ok(())
        }
        Surface::Torus { axis, major, minor } => {
            let n = circle_segments(*major + *minor, deflection);
            let m = circle_segments(*minor, deflection);
            let (u, v) = plane_basis(&axis.dir);
            let at = |th: f64, ph: f64| {
                let ring = u * th.cos() + v * th.sin();
                axis.origin
                    + ring * (*major + *minor * ph.cos())
                    + axis.dir.as_ref() * (*minor * ph.sin())
            };
            for i in 0..n {
                let t0 = std::f64::consts::TAU * i as f64 / n as f64;
                let t1 = std::f64::consts::TAU * (i + 1) as f64 / n as f64;
                for j in 0..m {
                    let p0 = std::f64::consts::TAU * j as f64 / m as f64;
                    let p1 = std::f64::consts::TAU * (j + 1) as f64 / m as f64;
                    let (a, b, c, d) = (at(t0, p0), at(t1, p0), at(t1, p1), at(t0, p1));
                    mesh.push_triangle(a, b, c);
                    mesh.push_triangle(a, c, d);
                }
            }
            Ok(())
        }
    }
}

pub fn tessellate_solid(solid: &Solid, deflection: f64) -> Result<TriMesh, KernelError> {
    let mut mesh = TriMesh::default();
    for f in solid.faces() {
        tessellate_face(f, deflection, &mut mesh)?;
    }
    Ok(mesh)
}

/// Tessellate every face in the shape (solids, free shells, free faces).
pub fn tessellate(shape: &Shape, deflection: f64) -> Result<TriMesh, KernelError> {
    let mut mesh = TriMesh::default();
    tessellate_into(shape, deflection, &mut mesh)?;
    Ok(mesh)
}

fn tessellate_into(
    shape: &Shape,
    deflection: f64,
    mesh: &mut TriMesh,
) -> Result<(), KernelError> {
    match shape {
        Shape::Face(f) => tessellate_face(f, deflection, mesh),
        Shape::Shell(s) => {
            for f in &s.faces {
                tessellate_face(f, deflection, mesh)?;
            }
            Ok(())
        }
        Shape::Solid(s) => {
            for f in s.faces() {
                tessellate_face(f, deflection, mesh)?;
            }
            Ok(())
        }
        Shape::Compound(children) => {
            for c in children {
                tessellate_into(c, deflection, mesh)?;
            }
            Ok(())
        }
        Shape::Vertex(_) | Shape::Edge(_) | Shape::Wire(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::pnt;
    use nalgebra::Unit;

    #[test]
    fn square_polygon_clips_into_two_triangles() {
        let pts = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let tris = ear_clip(&pts);
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn concave_polygon_is_covered() {
        // L-shape, area 3.
        let pts = [
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 1.0),
            (1.0, 1.0),
            (1.0, 2.0),
            (0.0, 2.0),
        ];
        let tris = ear_clip(&pts);
        let area: f64 = tris
            .iter()
            .map(|&[a, b, c]| {
                let (ax, ay) = pts[a];
                let (bx, by) = pts[b];
                let (cx, cy) = pts[c];
                0.5 * ((bx - ax) * (cy - ay) - (by - ay) * (cx - ax)).abs()
            })
            .sum();
        assert!((area - 3.0).abs() < 1e-12, "area = {area}");
    }

    #[test]
    fn line_edge_discretizes_to_endpoints() {
        let e = Edge::line(pnt(0.0, 0.0, 0.0), pnt(10.0, 0.0, 0.0));
        let pts = discretize_edge(&e, 0.01);
        assert_eq!(pts.len(), 2);
    }

    #[test]
    fn circle_polyline_length_approaches_circumference() {
        let e = Edge::full_circle(
            Pnt::origin(),
            Unit::new_normalize(Vec3::z()),
            1.0,
            pnt(1.0, 0.0, 0.0),
        );
        let pts = discretize_edge(&e, 1e-3);
        let len: f64 = pts.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
        assert!(
            (len - std::f64::consts::TAU).abs() < 1e-2,
            "polyline length {len}"
        );
    }
}
