//! Boolean operations by half-space clipping.
//!
//! Solids are handled through their planar boundary polygons. Cut and common
//! decompose the tool into its face half-spaces, which is exact for convex
//! tools; fuse combines the first operand with the pieces of the second that
//! lie outside it, so disjoint volumes add exactly. Curved boundary faces
//! are not supported by these operations.

use nalgebra::Unit;

use crate::geom::{Ax3, Dir, Pnt, Vec3};
use crate::mesh::{discretize_edge, wire_points};
use crate::props::bounding_box;
use crate::topo::{Edge, Face, Shape, Solid, Surface, Wire};
use crate::KernelError;

const CLIP_TOL: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Polygon {
    pts: Vec<Pnt>,
    normal: Dir,
}

impl Polygon {
    fn to_face(&self) -> Face {
        let n = self.pts.len();
        let edges = (0..n)
            .map(|i| Edge::line(self.pts[i], self.pts[(i + 1) % n]))
            .collect();
        Face {
            surface: Surface::Plane {
                origin: self.pts[0],
                normal: self.normal,
            },
            wires: vec![Wire::new(edges)],
        }
    }
}

fn solid_polygons(s: &Solid) -> Result<Vec<Polygon>, KernelError> {
    let mut out = Vec::new();
    for f in s.faces() {
        match &f.surface {
            Surface::Plane { normal, .. } => {
                let outer = f.outer_wire().ok_or_else(|| {
                    KernelError::op("boolean", "planar face without boundary wire")
                })?;
                let pts = wire_points(outer, 1e-4);
                if pts.len() >= 3 {
                    out.push(Polygon {
                        pts,
                        normal: *normal,
                    });
                }
            }
            other => {
                return Err(KernelError::Unsupported(format!(
                    "boolean operation on {:?} face",
                    other.kind()
                )))
            }
        }
    }
    Ok(out)
}

fn polygons_to_solid(polys: Vec<Polygon>) -> Solid {
    Solid::from_faces(polys.iter().map(Polygon::to_face).collect())
}

/// Outward face half-spaces of a convex tool solid.
fn tool_planes(s: &Solid) -> Result<Vec<(Pnt, Dir)>, KernelError> {
    Ok(solid_polygons(s)?
        .into_iter()
        .map(|p| (p.pts[0], p.normal))
        .collect())
}

/// Clip the polygon set against the half-space `dot(x - o, n) <= 0`.
/// Returns `None` when nothing remains. Newly cut boundaries are closed with
/// a cap polygon whose outward normal is `n`.
fn clip_polygons(polys: &[Polygon], o: &Pnt, n: &Dir) -> Option<Vec<Polygon>> {
    let dist = |p: &Pnt| (p - o).dot(n.as_ref());
    let mut kept: Vec<Polygon> = Vec::new();
    let mut section: Vec<Pnt> = Vec::new();
    let mut any_clipped = false;

    for poly in polys {
        let m = poly.pts.len();
        let mut out: Vec<Pnt> = Vec::new();
        for i in 0..m {
            let cur = poly.pts[i];
            let next = poly.pts[(i + 1) % m];
            let dc = dist(&cur);
            let dn = dist(&next);
            if dc <= CLIP_TOL {
                out.push(cur);
                if dc.abs() <= CLIP_TOL {
                    section.push(cur);
                }
            }
            if (dc < -CLIP_TOL && dn > CLIP_TOL) || (dc > CLIP_TOL && dn < -CLIP_TOL) {
                let t = dc / (dc - dn);
                let x = cur + (next - cur) * t;
                out.push(x);
                section.push(x);
                any_clipped = true;
            }
        }
        if out.len() >= 3 {
            if out.len() < m || any_clipped {
                kept.push(Polygon {
                    pts: out,
                    normal: poly.normal,
                });
            } else {
                kept.push(poly.clone());
            }
        } else if !out.is_empty() {
            any_clipped = true;
        } else if m > 0 {
            any_clipped = true;
        }
    }

    if kept.is_empty() {
        return None;
    }
    if !any_clipped {
        return Some(kept);
    }

    // Close the cut with a cap polygon.
    if section.len() >= 3 {
        let mut centroid = Vec3::zeros();
        for p in &section {
            centroid += p.coords;
        }
        let centroid = Pnt::from(centroid / section.len() as f64);
        let nn = n.as_ref();
        let mut u = Vec3::y().cross(nn);
        if u.norm() < 1e-6 {
            u = Vec3::x().cross(nn);
        }
        let u = u.normalize();
        let v = nn.cross(&u);
        let mut angled: Vec<(f64, Pnt)> = section
            .iter()
            .map(|p| {
                let r = p - centroid;
                (r.dot(&v).atan2(r.dot(&u)), *p)
            })
            .collect();
        angled.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut cap: Vec<Pnt> = Vec::new();
        for (_, p) in angled {
            if cap.iter().all(|q| (p - q).norm() > 1e-7) {
                cap.push(p);
            }
        }
        if cap.len() >= 3 {
            // Wind the cap so its outward normal is n.
            let a = cap[1] - cap[0];
            let b = cap[2] - cap[0];
            if a.cross(&b).dot(nn) < 0.0 {
                cap.reverse();
            }
            kept.push(Polygon {
                pts: cap,
                normal: *n,
            });
        }
    }
    Some(kept)
}

fn flip(n: &Dir) -> Dir {
    Unit::new_unchecked(-n.into_inner())
}

/// Intersection of one solid with a convex tool solid.
fn common_solid(a: &Solid, tool: &Solid) -> Result<Option<Solid>, KernelError> {
    let mut polys = solid_polygons(a)?;
    for (o, n) in tool_planes(tool)? {
        match clip_polygons(&polys, &o, &n) {
            Some(next) => polys = next,
            None => return Ok(None),
        }
    }
    Ok(Some(polygons_to_solid(polys)))
}

/// Pieces of `a` outside the convex tool solid.
fn cut_solid(a: &Solid, tool: &Solid) -> Result<Vec<Solid>, KernelError> {
    let planes = tool_planes(tool)?;
    let mut pieces = Vec::new();
    let mut inside_so_far = Some(solid_polygons(a)?);
    for (o, n) in &planes {
        let Some(current) = inside_so_far.take() else { break };
        // Piece outside this plane (and inside all previous ones).
        if let Some(outside) = clip_polygons(&current, o, &flip(n)) {
            pieces.push(polygons_to_solid(outside));
        }
        inside_so_far = clip_polygons(&current, o, n);
    }
    Ok(pieces)
}

fn collect_result(mut solids: Vec<Solid>) -> Shape {
    if solids.len() == 1 {
        Shape::Solid(solids.pop().unwrap())
    } else {
        Shape::Compound(solids.into_iter().map(Shape::Solid).collect())
    }
}

fn boxes_disjoint(a: &Shape, b: &Shape) -> bool {
    match (bounding_box(a, 1e-3), bounding_box(b, 1e-3)) {
        (Ok((amin, amax)), Ok((bmin, bmax))) => (0..3).any(|i| {
            amax[i] < bmin[i] - CLIP_TOL || bmax[i] < amin[i] - CLIP_TOL
        }),
        _ => false,
    }
}

/// Union of two shapes: the solids of `a` plus the pieces of `b` outside
/// `a`. Disjoint operands short-circuit to a compound.
pub fn fuse(a: &Shape, b: &Shape) -> Result<Shape, KernelError> {
    let a_solids: Vec<Solid> = a.solids().into_iter().cloned().collect();
    let b_solids: Vec<Solid> = b.solids().into_iter().cloned().collect();
    if a_solids.is_empty() && b_solids.is_empty() {
        return Err(KernelError::op("fuse", "no solids in either operand"));
    }
    if boxes_disjoint(a, b) {
        let mut all = a_solids;
        all.extend(b_solids);
        return Ok(collect_result(all));
    }
    let mut result = a_solids.clone();
    for bs in &b_solids {
        let mut pieces = vec![bs.clone()];
        for tool in &a_solids {
            let mut next = Vec::new();
            for piece in &pieces {
                next.extend(cut_solid(piece, tool)?);
            }
            pieces = next;
        }
        result.extend(pieces);
    }
    Ok(collect_result(result))
}

/// Common volume of `a` with the convex solids of `b`.
pub fn common(a: &Shape, b: &Shape) -> Result<Shape, KernelError> {
    let a_solids = a.solids();
    let b_solids = b.solids();
    if a_solids.is_empty() || b_solids.is_empty() {
        return Err(KernelError::op("common", "both operands need solids"));
    }
    if boxes_disjoint(a, b) {
        return Ok(Shape::empty_compound());
    }
    let mut out = Vec::new();
    for sa in &a_solids {
        for tool in &b_solids {
            if let Some(piece) = common_solid(sa, tool)? {
                out.push(piece);
            }
        }
    }
    if out.is_empty() {
        Ok(Shape::empty_compound())
    } else {
        Ok(collect_result(out))
    }
}

/// `a` minus the solids of `b`.
pub fn cut(a: &Shape, b: &Shape) -> Result<Shape, KernelError> {
    let a_solids = a.solids();
    if a_solids.is_empty() {
        return Err(KernelError::op("cut", "first operand has no solids"));
    }
    let b_solids = b.solids();
    if b_solids.is_empty() || boxes_disjoint(a, b) {
        return Ok(collect_result(a_solids.into_iter().cloned().collect()));
    }
    let mut pieces: Vec<Solid> = a_solids.into_iter().cloned().collect();
    for tool in &b_solids {
        let mut next = Vec::new();
        for piece in &pieces {
            next.extend(cut_solid(piece, tool)?);
        }
        pieces = next;
    }
    if pieces.is_empty() {
        Ok(Shape::empty_compound())
    } else {
        Ok(collect_result(pieces))
    }
}

/// Planar cross-sections of all solids: a compound of section faces.
pub fn section_with_plane(a: &Shape, plane: &Ax3) -> Result<Shape, KernelError> {
    let mut faces = Vec::new();
    for solid in a.solids() {
        let polys = solid_polygons(solid)?;
        if let Some(clipped) = clip_polygons(&polys, &plane.origin, &plane.normal) {
            // The cap introduced by the clip is the cross-section.
            for poly in &clipped {
                let on_plane = poly
                    .pts
                    .iter()
                    .all(|p| plane.signed_distance(p).abs() < 1e-7);
                if on_plane {
                    faces.push(Shape::Face(poly.to_face()));
                }
            }
        }
    }
    Ok(Shape::Compound(faces))
}

/// Remove the half-space on the positive side of the plane.
pub fn halfspace_clip(a: &Shape, plane: &Ax3) -> Result<Shape, KernelError> {
    let mut out = Vec::new();
    for solid in a.solids() {
        let polys = solid_polygons(solid)?;
        if let Some(kept) = clip_polygons(&polys, &plane.origin, &plane.normal) {
            out.push(polygons_to_solid(kept));
        }
    }
    if out.is_empty() {
        Ok(Shape::empty_compound())
    } else {
        Ok(collect_result(out))
    }
}

/// Intersection points of the shape's edges with a plane.
pub fn curve_plane_intersections(a: &Shape, plane: &Ax3) -> Result<Vec<Pnt>, KernelError> {
    let mut edges = Vec::new();
    a.collect_all_edges(&mut edges);
    if edges.is_empty() {
        return Err(KernelError::op(
            "curve_plane_intersections",
            "shape has no edges",
        ));
    }
    let mut out: Vec<Pnt> = Vec::new();
    for e in edges {
        let pts = discretize_edge(e, 1e-6);
        for w in pts.windows(2) {
            let d0 = plane.signed_distance(&w[0]);
            let d1 = plane.signed_distance(&w[1]);
            if d0.abs() < 1e-9 {
                push_unique(&mut out, w[0]);
            }
            if (d0 < -1e-9 && d1 > 1e-9) || (d0 > 1e-9 && d1 < -1e-9) {
                let t = d0 / (d0 - d1);
                push_unique(&mut out, w[0] + (w[1] - w[0]) * t);
            }
        }
        let last = pts[pts.len() - 1];
        if plane.signed_distance(&last).abs() < 1e-9 {
            push_unique(&mut out, last);
        }
    }
    Ok(out)
}

fn push_unique(out: &mut Vec<Pnt>, p: Pnt) {
    if out.iter().all(|q| (p - q).norm() > 1e-7) {
        out.push(p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pnt, vec3};
    use crate::primitives::box_solid;
    use crate::props::{volume, PROP_DEFLECTION};

    fn unit_box_at(x: f64) -> Shape {
        Shape::Solid(
            box_solid(
                pnt(x, 0.0, 0.0),
                vec3(1.0, 0.0, 0.0),
                vec3(0.0, 1.0, 0.0),
                vec3(0.0, 0.0, 1.0),
            )
            .unwrap(),
        )
    }

    #[test]
    fn disjoint_fuse_adds_volumes() {
        let a = unit_box_at(0.0);
        let b = unit_box_at(5.0);
        let u = fuse(&a, &b).unwrap();
        let v = volume(&u, PROP_DEFLECTION).unwrap();
        assert!((v - 2.0).abs() < 1e-9, "volume {v}");
    }

    #[test]
    fn overlapping_fuse_counts_overlap_once() {
        let a = unit_box_at(0.0);
        let b = unit_box_at(0.5);
        let u = fuse(&a, &b).unwrap();
        let v = volume(&u, PROP_DEFLECTION).unwrap();
        assert!((v - 1.5).abs() < 1e-9, "volume {v}");
    }

    #[test]
    fn disjoint_common_is_empty() {
        let a = unit_box_at(0.0);
        let b = unit_box_at(5.0);
        let c = common(&a, &b).unwrap();
        let v = volume(&c, PROP_DEFLECTION).unwrap();
        assert!(v.abs() < 1e-12, "volume {v}");
    }

    #[test]
    fn overlapping_common_volume() {
        let a = unit_box_at(0.0);
        let b = unit_box_at(0.25);
        let c = common(&a, &b).unwrap();
        let v = volume(&c, PROP_DEFLECTION).unwrap();
        assert!((v - 0.75).abs() < 1e-9, "volume {v}");
    }

    #[test]
    fn self_cut_is_empty() {
        let a = unit_box_at(0.0);
        let c = cut(&a, &a).unwrap();
        let v = volume(&c, PROP_DEFLECTION).unwrap();
        assert!(v.abs() < 1e-12, "volume {v}");
    }

    #[test]
    fn half_cut_keeps_half_the_volume() {
        let a = unit_box_at(0.0);
        let tool = Shape::Solid(
            box_solid(
                pnt(0.5, -1.0, -1.0),
                vec3(5.0, 0.0, 0.0),
                vec3(0.0, 5.0, 0.0),
                vec3(0.0, 0.0, 5.0),
            )
            .unwrap(),
        );
        let c = cut(&a, &tool).unwrap();
        let v = volume(&c, PROP_DEFLECTION).unwrap();
        assert!((v - 0.5).abs() < 1e-9, "volume {v}");
    }

    #[test]
    fn section_of_box_is_unit_square() {
        let a = unit_box_at(0.0);
        let plane = Ax3::from_normal(pnt(0.5, 0.5, 0.5), vec3(1.0, 0.0, 0.0));
        let s = section_with_plane(&a, &plane).unwrap();
        let area = crate::props::surface_area(&s, PROP_DEFLECTION).unwrap();
        assert!((area - 1.0).abs() < 1e-9, "area {area}");
    }

    #[test]
    fn halfspace_clip_halves_the_box() {
        let a = unit_box_at(0.0);
        let plane = Ax3::from_normal(pnt(0.0, 0.0, 0.5), vec3(0.0, 0.0, 1.0));
        let clipped = halfspace_clip(&a, &plane).unwrap();
        let v = volume(&clipped, PROP_DEFLECTION).unwrap();
        assert!((v - 0.5).abs() < 1e-9, "volume {v}");
    }

    #[test]
    fn line_edge_plane_intersection() {
        let e = Shape::Edge(Edge::line(pnt(0.0, 0.0, -1.0), pnt(0.0, 0.0, 1.0)));
        let plane = Ax3::from_normal(Pnt::origin(), vec3(0.0, 0.0, 1.0));
        let pts = curve_plane_intersections(&e, &plane).unwrap();
        assert_eq!(pts.len(), 1);
        assert!((pts[0] - Pnt::origin()).norm() < 1e-9);
    }
}
