//! Hidden-line view projection.
//!
//! Edges are discretized and classified per segment: a segment is hidden
//! when the ray from its midpoint toward the viewer passes through the
//! shape's tessellation. Results are projected into the view plane, matching
//! what a drawing exporter needs.

use crate::boolean::{halfspace_clip, section_with_plane};
use crate::geom::{Ax3, Pnt, Vec3};
use crate::mesh::{discretize_edge, tessellate, TriMesh};
use crate::topo::{Edge, Shape};
use crate::KernelError;

#[derive(Debug, Clone)]
pub struct ViewResult {
    /// Projected edges facing the viewer.
    pub visible: Shape,
    /// Projected edges occluded by the shape itself.
    pub hidden: Shape,
    /// Cross-section faces when a section view was requested.
    pub cross_section: Option<Shape>,
}

fn ray_hits_mesh(mesh: &TriMesh, origin: &Pnt, dir: &Vec3) -> bool {
    const EPS: f64 = 1e-7;
    for &[ia, ib, ic] in &mesh.triangles {
        let (a, b, c) = (
            mesh.positions[ia],
            mesh.positions[ib],
            mesh.positions[ic],
        );
        let e1 = b - a;
        let e2 = c - a;
        let p = dir.cross(&e2);
        let det = e1.dot(&p);
        if det.abs() < 1e-14 {
            continue;
        }
        let inv = 1.0 / det;
        let s = origin - a;
        let u = s.dot(&p) * inv;
        if !(-1e-9..=1.0 + 1e-9).contains(&u) {
            continue;
        }
        let q = s.cross(&e1);
        let v = dir.dot(&q) * inv;
        if v < -1e-9 || u + v > 1.0 + 1e-9 {
            continue;
        }
        let t = e2.dot(&q) * inv;
        if t > EPS {
            return true;
        }
    }
    false
}

/// Project the shape onto the plane `(p0, n)`, viewer looking along `n`.
pub fn create_view(
    shape: &Shape,
    p0: &Pnt,
    n: &Vec3,
    with_section: bool,
    deflection: f64,
) -> Result<ViewResult, KernelError> {
    let dir = n.normalize();
    let plane = Ax3::from_normal(*p0, dir);

    let (working, cross_section) = if with_section {
        let xsec = section_with_plane(shape, &plane)?;
        // Remove the half between the viewer and the section plane.
        let back_plane = Ax3::from_normal(*p0, -dir);
        (halfspace_clip(shape, &back_plane)?, Some(xsec))
    } else {
        (shape.clone(), None)
    };

    let mesh = tessellate(&working, deflection)?;
    let project = |p: &Pnt| -> Pnt { p - dir * (p - p0).dot(&dir) };

    let mut edges = Vec::new();
    working.collect_all_edges(&mut edges);

    let mut visible: Vec<Shape> = Vec::new();
    let mut hidden: Vec<Shape> = Vec::new();
    let toward_viewer = -dir;
    for e in edges {
        let pts = discretize_edge(e, deflection);
        for w in pts.windows(2) {
            let mid = Pnt::from((w[0].coords + w[1].coords) * 0.5);
            let seg = Edge::line(project(&w[0]), project(&w[1]));
            if seg.is_degenerate() {
                continue;
            }
            if ray_hits_mesh(&mesh, &mid, &toward_viewer) {
                hidden.push(Shape::Edge(seg));
            } else {
                visible.push(Shape::Edge(seg));
            }
        }
    }

    Ok(ViewResult {
        visible: Shape::Compound(visible),
        hidden: Shape::Compound(hidden),
        cross_section,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pnt, vec3};
    use crate::primitives::box_solid;

    #[test]
    fn box_view_has_both_visible_and_hidden_edges() {
        let s = Shape::Solid(
            box_solid(
                Pnt::origin(),
                vec3(1.0, 0.0, 0.0),
                vec3(0.0, 1.0, 0.0),
                vec3(0.0, 0.0, 1.0),
            )
            .unwrap(),
        );
        let view = create_view(&s, &pnt(0.5, 0.5, -2.0), &vec3(0.0, 0.0, 1.0), false, 1e-3)
            .unwrap();
        let count = |shape: &Shape| match shape {
            Shape::Compound(v) => v.len(),
            _ => 0,
        };
        // Front face edges are visible; the back face is occluded.
        assert!(count(&view.visible) >= 4, "visible {}", count(&view.visible));
        assert!(count(&view.hidden) >= 4, "hidden {}", count(&view.hidden));
        assert!(view.cross_section.is_none());
    }

    #[test]
    fn projected_edges_lie_in_the_view_plane() {
        let s = Shape::Solid(
            box_solid(
                Pnt::origin(),
                vec3(1.0, 0.0, 0.0),
                vec3(0.0, 1.0, 0.0),
                vec3(0.0, 0.0, 1.0),
            )
            .unwrap(),
        );
        let p0 = pnt(0.0, 0.0, -3.0);
        let view = create_view(&s, &p0, &vec3(0.0, 0.0, 1.0), false, 1e-3).unwrap();
        if let Shape::Compound(edges) = &view.visible {
            for e in edges {
                if let Shape::Edge(e) = e {
                    assert!((e.first.z + 3.0).abs() < 1e-9);
                    assert!((e.last.z + 3.0).abs() < 1e-9);
                }
            }
        }
    }
}
