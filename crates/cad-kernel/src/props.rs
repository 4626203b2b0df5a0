//! Global properties: volume, area, centres of gravity, inertia, bounding
//! boxes and point distances. Everything is evaluated over the tessellation
//! via the divergence theorem, so results hold for any closed face set the
//! booleans produce.

use nalgebra::Matrix3;

use crate::geom::{Pnt, Vec3};
use crate::mesh::{discretize_edge, tessellate, tessellate_solid, TriMesh};
use crate::topo::Shape;
use crate::KernelError;

/// Default deflection for property evaluation.
pub const PROP_DEFLECTION: f64 = 1e-4;

fn signed_volume(mesh: &TriMesh) -> f64 {
    mesh.triangles
        .iter()
        .map(|&[a, b, c]| {
            let (p0, p1, p2) = (
                mesh.positions[a].coords,
                mesh.positions[b].coords,
                mesh.positions[c].coords,
            );
            p0.dot(&p1.cross(&p2)) / 6.0
        })
        .sum()
}

/// Total volume of all solids in the shape; zero when there are none.
pub fn volume(shape: &Shape, deflection: f64) -> Result<f64, KernelError> {
    let mut total = 0.0;
    for solid in shape.solids() {
        let mesh = tessellate_solid(solid, deflection)?;
        total += signed_volume(&mesh).abs();
    }
    Ok(total)
}

/// Total area of every face in the shape (solid boundaries and free faces).
pub fn surface_area(shape: &Shape, deflection: f64) -> Result<f64, KernelError> {
    let mesh = tessellate(shape, deflection)?;
    Ok(mesh
        .triangles
        .iter()
        .map(|&[a, b, c]| {
            let (p0, p1, p2) = (mesh.positions[a], mesh.positions[b], mesh.positions[c]);
            0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
        })
        .sum())
}

/// Volume centroid; falls back to the surface centroid for shapes without
/// solids.
pub fn center_of_gravity(shape: &Shape, deflection: f64) -> Result<Pnt, KernelError> {
    let solids = shape.solids();
    if solids.is_empty() {
        return surface_center_of_gravity(shape, deflection);
    }
    let mut v_total = 0.0;
    let mut c_total = Vec3::zeros();
    for solid in solids {
        let mesh = tessellate_solid(solid, deflection)?;
        for &[a, b, c] in &mesh.triangles {
            let (p0, p1, p2) = (
                mesh.positions[a].coords,
                mesh.positions[b].coords,
                mesh.positions[c].coords,
            );
            let v = p0.dot(&p1.cross(&p2)) / 6.0;
            let centroid = (p0 + p1 + p2) / 4.0;
            v_total += v;
            c_total += centroid * v;
        }
    }
    if v_total.abs() < 1e-30 {
        return Err(KernelError::op("center_of_gravity", "zero total volume"));
    }
    Ok(Pnt::from(c_total / v_total))
}

/// Area centroid of all faces.
pub fn surface_center_of_gravity(shape: &Shape, deflection: f64) -> Result<Pnt, KernelError> {
    let mesh = tessellate(shape, deflection)?;
    let mut a_total = 0.0;
    let mut c_total = Vec3::zeros();
    for &[a, b, c] in &mesh.triangles {
        let (p0, p1, p2) = (mesh.positions[a], mesh.positions[b], mesh.positions[c]);
        let area = 0.5 * (p1 - p0).cross(&(p2 - p0)).norm();
        let centroid = (p0.coords + p1.coords + p2.coords) / 3.0;
        a_total += area;
        c_total += centroid * area;
    }
    if a_total < 1e-30 {
        return Err(KernelError::op(
            "surface_center_of_gravity",
            "shape has no faces",
        ));
    }
    Ok(Pnt::from(c_total / a_total))
}

/// Inertia tensor of the solid volume about its centre of gravity, for unit
/// density.
pub fn inertia(shape: &Shape, deflection: f64) -> Result<Matrix3<f64>, KernelError> {
    let solids = shape.solids();
    if solids.is_empty() {
        return Err(KernelError::op("inertia", "shape has no solids"));
    }
    let mut covariance = Matrix3::zeros();
    let mut v_total = 0.0;
    let mut c_total = Vec3::zeros();
    for solid in solids {
        let mesh = tessellate_solid(solid, deflection)?;
        for &[a, b, c] in &mesh.triangles {
            let (p0, p1, p2) = (
                mesh.positions[a].coords,
                mesh.positions[b].coords,
                mesh.positions[c].coords,
            );
            let v = p0.dot(&p1.cross(&p2)) / 6.0;
            let s = p0 + p1 + p2;
            // Second moment of a tetrahedron with one vertex at the origin.
            let m = p0 * p0.transpose()
                + p1 * p1.transpose()
                + p2 * p2.transpose()
                + s * s.transpose();
            covariance += m * (v / 20.0);
            v_total += v;
            c_total += (s / 4.0) * v;
        }
    }
    if v_total.abs() < 1e-30 {
        return Err(KernelError::op("inertia", "zero total volume"));
    }
    let sign = v_total.signum();
    let cog = c_total / v_total;
    // Shift the covariance to the centroid, then convert to inertia.
    let covariance = covariance * sign - (cog * cog.transpose()) * v_total.abs();
    let j = Matrix3::identity() * covariance.trace() - covariance;
    Ok(j)
}

/// Corner points of every B-rep edge plus free vertices.
pub fn brep_vertices(shape: &Shape) -> Vec<Pnt> {
    let mut edges = Vec::new();
    shape.collect_all_edges(&mut edges);
    let mut out: Vec<Pnt> = Vec::new();
    for e in edges {
        out.push(e.first);
        out.push(e.last);
    }
    shape.collect_free_vertices(&mut out);
    out
}

/// Axis-aligned bounding box over tessellation, edge polylines and vertices.
pub fn bounding_box(shape: &Shape, deflection: f64) -> Result<(Pnt, Pnt), KernelError> {
    let mut min = Pnt::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut max = Pnt::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    let mut grow = |p: &Pnt| {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    };
    let mesh = tessellate(shape, deflection)?;
    for p in &mesh.positions {
        grow(p);
    }
    let mut edges = Vec::new();
    shape.collect_all_edges(&mut edges);
    for e in edges {
        for p in discretize_edge(e, deflection) {
            grow(&p);
        }
    }
    let mut free = Vec::new();
    shape.collect_free_vertices(&mut free);
    for p in &free {
        grow(p);
    }
    if min.x > max.x {
        return Err(KernelError::op("bounding_box", "shape is empty"));
    }
    Ok((min, max))
}

fn point_segment_distance(p: &Pnt, a: &Pnt, b: &Pnt) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < 1e-30 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

fn point_triangle_distance(p: &Pnt, a: &Pnt, b: &Pnt, c: &Pnt) -> f64 {
    let n = (b - a).cross(&(c - a));
    let n2 = n.norm_squared();
    if n2 < 1e-30 {
        return point_segment_distance(p, a, b)
            .min(point_segment_distance(p, b, c))
            .min(point_segment_distance(p, c, a));
    }
    let n = n / n2.sqrt();
    let dist = (p - a).dot(&n);
    let proj = p - n * dist;
    // Inside test via same-side signs.
    let inside = [(a, b), (b, c), (c, a)].iter().all(|(u, v)| {
        let edge = *v - *u;
        edge.cross(&(proj - *u)).dot(&n) >= -1e-12
    });
    if inside {
        dist.abs()
    } else {
        point_segment_distance(p, a, b)
            .min(point_segment_distance(p, b, c))
            .min(point_segment_distance(p, c, a))
    }
}

/// Minimum distance from `p` to the shape (faces, edges and vertices).
pub fn min_distance(shape: &Shape, p: &Pnt, deflection: f64) -> Result<f64, KernelError> {
    let mut best = f64::INFINITY;
    let mesh = tessellate(shape, deflection)?;
    for &[a, b, c] in &mesh.triangles {
        best = best.min(point_triangle_distance(
            p,
            &mesh.positions[a],
            &mesh.positions[b],
            &mesh.positions[c],
        ));
    }
    let mut edges = Vec::new();
    shape.collect_all_edges(&mut edges);
    for e in edges {
        let pts = discretize_edge(e, deflection);
        for w in pts.windows(2) {
            best = best.min(point_segment_distance(p, &w[0], &w[1]));
        }
    }
    let mut free = Vec::new();
    shape.collect_free_vertices(&mut free);
    for v in &free {
        best = best.min((p - v).norm());
    }
    if best.is_infinite() {
        return Err(KernelError::op("min_distance", "shape is empty"));
    }
    Ok(best)
}

/// Largest distance from `p` to any B-rep vertex.
pub fn max_vertex_distance(shape: &Shape, p: &Pnt) -> Result<f64, KernelError> {
    let vertices = brep_vertices(shape);
    vertices
        .iter()
        .map(|v| (p - v).norm())
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
        .ok_or_else(|| KernelError::op("max_vertex_distance", "shape has no vertices"))
}

/// Largest distance from `p` to a face; evaluated over the tessellation.
pub fn max_face_distance(shape: &Shape, p: &Pnt, deflection: f64) -> Result<f64, KernelError> {
    let mesh = tessellate(shape, deflection)?;
    mesh.positions
        .iter()
        .map(|v| (p - v).norm())
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
        .ok_or_else(|| KernelError::op("max_face_distance", "shape has no faces"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pnt, vec3};
    use crate::primitives::{box_solid, cylinder, sphere};

    fn cube_2_3_4() -> Shape {
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
    fn box_volume_and_area_are_exact() {
        let s = cube_2_3_4();
        let v = volume(&s, PROP_DEFLECTION).unwrap();
        assert!((v - 24.0).abs() < 1e-9, "volume {v}");
        let a = surface_area(&s, PROP_DEFLECTION).unwrap();
        assert!((a - 52.0).abs() < 1e-9, "area {a}");
    }

    #[test]
    fn box_cog_is_the_center() {
        let s = cube_2_3_4();
        let c = center_of_gravity(&s, PROP_DEFLECTION).unwrap();
        assert!((c - pnt(1.0, 1.5, 2.0)).norm() < 1e-9, "cog {c:?}");
    }

    #[test]
    fn cylinder_volume_close_to_analytic() {
        let s = Shape::Solid(cylinder(Pnt::origin(), vec3(0.0, 0.0, 1.0), 1.0, 2.0).unwrap());
        let v = volume(&s, 1e-4).unwrap();
        let exact = std::f64::consts::PI * 2.0;
        assert!((v - exact).abs() / exact < 1e-3, "volume {v} vs {exact}");
    }

    #[test]
    fn sphere_volume_close_to_analytic() {
        let s = Shape::Solid(sphere(Pnt::origin(), 1.0).unwrap());
        let v = volume(&s, 1e-4).unwrap();
        let exact = 4.0 / 3.0 * std::f64::consts::PI;
        assert!((v - exact).abs() / exact < 1e-3, "volume {v} vs {exact}");
    }

    #[test]
    fn bounding_box_covers_the_box() {
        let s = cube_2_3_4();
        let (min, max) = bounding_box(&s, PROP_DEFLECTION).unwrap();
        assert!((min - Pnt::origin()).norm() < 1e-9);
        assert!((max - pnt(2.0, 3.0, 4.0)).norm() < 1e-9);
    }

    #[test]
    fn min_distance_from_outside_point() {
        let s = cube_2_3_4();
        let d = min_distance(&s, &pnt(4.0, 1.5, 2.0), PROP_DEFLECTION).unwrap();
        assert!((d - 2.0).abs() < 1e-9, "distance {d}");
    }

    #[test]
    fn box_inertia_matches_cuboid_formula() {
        let s = cube_2_3_4();
        let j = inertia(&s, PROP_DEFLECTION).unwrap();
        // Solid cuboid about its center: Ixx = m (b^2 + c^2) / 12.
        let m = 24.0;
        let (a, b, c) = (2.0, 3.0, 4.0);
        assert!((j[(0, 0)] - m * (b * b + c * c) / 12.0).abs() < 1e-6);
        assert!((j[(1, 1)] - m * (a * a + c * c) / 12.0).abs() < 1e-6);
        assert!((j[(2, 2)] - m * (a * a + b * b) / 12.0).abs() < 1e-6);
    }
}
