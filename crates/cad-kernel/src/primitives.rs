//! Primitive shape builders.

use nalgebra::Unit;

use crate::geom::{Ax1, Pnt, Vec3, TOL};
use crate::mesh::wire_points;
use crate::topo::{Edge, Face, Shape, Solid, Surface, Wire};
use crate::KernelError;

fn quad_wire(a: Pnt, b: Pnt, c: Pnt, d: Pnt) -> Wire {
    Wire::new(vec![
        Edge::line(a, b),
        Edge::line(b, c),
        Edge::line(c, d),
        Edge::line(d, a),
    ])
}

fn quad_face_from_corners(a: Pnt, b: Pnt, c: Pnt, d: Pnt) -> Face {
    let normal = Unit::new_normalize((b - a).cross(&(c - a)));
    Face {
        surface: Surface::Plane { origin: a, normal },
        wires: vec![quad_wire(a, b, c, d)],
    }
}

fn tri_face_from_corners(a: Pnt, b: Pnt, c: Pnt) -> Face {
    let normal = Unit::new_normalize((b - a).cross(&(c - a)));
    Face {
        surface: Surface::Plane { origin: a, normal },
        wires: vec![Wire::new(vec![
            Edge::line(a, b),
            Edge::line(b, c),
            Edge::line(c, a),
        ])],
    }
}

/// Parallelepiped spanned by three edge vectors at `p0`.
pub fn box_solid(p0: Pnt, l: Vec3, w: Vec3, h: Vec3) -> Result<Solid, KernelError> {
    let det = l.cross(&w).dot(&h);
    if det.abs() < TOL {
        return Err(KernelError::op("box", "spanning vectors are coplanar"));
    }
    // Normalize to a right-handed triple so the windings below face outward.
    let (w, h) = if det > 0.0 { (w, h) } else { (h, w) };

    let faces = vec![
        // bottom (outward -h)
        quad_face_from_corners(p0, p0 + w, p0 + l + w, p0 + l),
        // top (outward +h)
        quad_face_from_corners(p0 + h, p0 + h + l, p0 + h + l + w, p0 + h + w),
        // front (outward -w)
        quad_face_from_corners(p0, p0 + l, p0 + l + h, p0 + h),
        // back (outward +w)
        quad_face_from_corners(p0 + w, p0 + w + h, p0 + w + h + l, p0 + w + l),
        // left (outward -l)
        quad_face_from_corners(p0, p0 + h, p0 + h + w, p0 + w),
        // right (outward +l)
        quad_face_from_corners(p0 + l, p0 + l + w, p0 + l + w + h, p0 + l + h),
    ];
    Ok(Solid::from_faces(faces))
}

/// Planar parallelogram face spanned by `ex` and `ey` at `p0`.
pub fn quad_face(p0: Pnt, ex: Vec3, ey: Vec3) -> Result<Face, KernelError> {
    if ex.cross(&ey).norm() < TOL {
        return Err(KernelError::op("quad", "spanning vectors are parallel"));
    }
    Ok(quad_face_from_corners(p0, p0 + ex, p0 + ex + ey, p0 + ey))
}

/// Planar face bounded by an arbitrary closed wire. The face normal comes
/// from Newell's method over the wire polygon.
pub fn planar_face(wire: Wire) -> Result<Face, KernelError> {
    if !wire.is_closed() {
        return Err(KernelError::op("planar_face", "wire is not closed"));
    }
    let pts = wire_points(&wire, 1e-3);
    if pts.len() < 3 {
        return Err(KernelError::op("planar_face", "wire has fewer than 3 points"));
    }
    let mut n = Vec3::zeros();
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    if n.norm() < TOL {
        return Err(KernelError::op("planar_face", "degenerate wire polygon"));
    }
    Ok(Face {
        surface: Surface::Plane {
            origin: pts[0],
            normal: Unit::new_normalize(n),
        },
        wires: vec![wire],
    })
}

/// Right circular cylinder from `p0` along `dir`.
pub fn cylinder(p0: Pnt, dir: Vec3, radius: f64, height: f64) -> Result<Solid, KernelError> {
    if radius <= 0.0 || height <= 0.0 {
        return Err(KernelError::op("cylinder", "radius and height must be positive"));
    }
    let axis = Ax1::new(p0, dir);
    let d = axis.dir;
    let mut u = Vec3::y().cross(d.as_ref());
    if u.norm() < 1e-6 {
        u = Vec3::x().cross(d.as_ref());
    }
    let u = u.normalize();
    let top_center = p0 + d.as_ref() * height;

    let bottom = Face {
        surface: Surface::Plane {
            origin: p0,
            normal: Unit::new_normalize(-d.into_inner()),
        },
        wires: vec![Wire::new(vec![Edge::full_circle(
            p0,
            d,
            radius,
            p0 + u * radius,
        )])],
    };
    let top = Face {
        surface: Surface::Plane {
            origin: top_center,
            normal: d,
        },
        wires: vec![Wire::new(vec![Edge::full_circle(
            top_center,
            d,
            radius,
            top_center + u * radius,
        )])],
    };
    let lateral = Face {
        surface: Surface::Cylinder {
            axis,
            radius,
            height,
        },
        wires: vec![],
    };
    Ok(Solid::from_faces(vec![bottom, top, lateral]))
}

pub fn sphere(center: Pnt, radius: f64) -> Result<Solid, KernelError> {
    if radius <= 0.0 {
        return Err(KernelError::op("sphere", "radius must be positive"));
    }
    Ok(Solid::from_faces(vec![Face {
        surface: Surface::Sphere { center, radius },
        wires: vec![],
    }]))
}

pub fn torus(center: Pnt, dir: Vec3, major: f64, minor: f64) -> Result<Solid, KernelError> {
    if major <= 0.0 || minor <= 0.0 || minor >= major {
        return Err(KernelError::op(
            "torus",
            "requires 0 < minor radius < major radius",
        ));
    }
    Ok(Solid::from_faces(vec![Face {
        surface: Surface::Torus {
            axis: Ax1::new(center, dir),
            major,
            minor,
        },
        wires: vec![],
    }]))
}

/// Polygon boundary of a planar face, ordered counter-clockwise around the
/// extrusion direction `v`.
fn base_polygon_ccw(face: &Face, v: &Vec3) -> Result<Vec<Pnt>, KernelError> {
    let outer = face
        .outer_wire()
        .ok_or_else(|| KernelError::op("prism", "base face has no wire"))?;
    let mut pts = wire_points(outer, 1e-3);
    if pts.len() < 3 {
        return Err(KernelError::op("prism", "base polygon degenerate"));
    }
    let mut n = Vec3::zeros();
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        n += (a.coords).cross(&b.coords);
    }
    if n.dot(v) < 0.0 {
        pts.reverse();
    }
    Ok(pts)
}

/// Linear extrusion of a planar face along `v`. A face bounded by a single
/// full circle extrudes into a cylinder.
pub fn prism(face: &Face, v: Vec3) -> Result<Solid, KernelError> {
    if v.norm() < TOL {
        return Err(KernelError::op("prism", "zero extrusion vector"));
    }
    if let Some(outer) = face.outer_wire() {
        if outer.edges.len() == 1 {
            if let crate::topo::Curve::Arc { center, radius, .. } = &outer.edges[0].curve {
                if (outer.edges[0].last - outer.edges[0].first).norm() < TOL {
                    return cylinder(*center, v, *radius, v.norm());
                }
            }
        }
    }

    let pts = base_polygon_ccw(face, &v)?;
    let vhat = Unit::new_normalize(v);
    let n = pts.len();
    let mut faces = Vec::with_capacity(n + 2);

    // Bottom cap: reverse winding so it faces away from the extrusion.
    let mut bottom_pts: Vec<Pnt> = pts.clone();
    bottom_pts.reverse();
    let bottom_wire = Wire::new(
        (0..n)
            .map(|i| Edge::line(bottom_pts[i], bottom_pts[(i + 1) % n]))
            .collect(),
    );
    faces.push(Face {
        surface: Surface::Plane {
            origin: bottom_pts[0],
            normal: Unit::new_normalize(-vhat.into_inner()),
        },
        wires: vec![bottom_wire],
    });

    // Top cap.
    let top_pts: Vec<Pnt> = pts.iter().map(|p| p + v).collect();
    let top_wire = Wire::new(
        (0..n)
            .map(|i| Edge::line(top_pts[i], top_pts[(i + 1) % n]))
            .collect(),
    );
    faces.push(Face {
        surface: Surface::Plane {
            origin: top_pts[0],
            normal: vhat,
        },
        wires: vec![top_wire],
    });

    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        faces.push(quad_face_from_corners(a, b, b + v, a + v));
    }
    Ok(Solid::from_faces(faces))
}

/// Revolution of a planar profile about an axis. Partial angles get start
/// and end caps; curved flanks are emitted as planar triangles.
pub fn revolve(
    face: &Face,
    axis: &Ax1,
    angle: f64,
    deflection: f64,
) -> Result<Solid, KernelError> {
    if angle.abs() < TOL {
        return Err(KernelError::op("revolve", "zero revolution angle"));
    }
    let angle = angle.clamp(-std::f64::consts::TAU, std::f64::consts::TAU);
    let outer = face
        .outer_wire()
        .ok_or_else(|| KernelError::op("revolve", "profile face has no wire"))?;
    let pts = wire_points(outer, deflection);
    if pts.len() < 3 {
        return Err(KernelError::op("revolve", "profile polygon degenerate"));
    }
    let max_r = pts
        .iter()
        .map(|p| axis.distance_to(p))
        .fold(0.0_f64, f64::max);
    let full_steps = crate::mesh::circle_segments(max_r.max(TOL), deflection);
    let steps = ((full_steps as f64 * angle.abs() / std::f64::consts::TAU).ceil() as usize).max(2);

    let full_turn = (angle.abs() - std::f64::consts::TAU).abs() < 1e-9;
    let rings: Vec<Vec<Pnt>> = (0..=steps)
        .map(|k| {
            let t = crate::geom::Trsf::rotation(axis, angle * k as f64 / steps as f64);
            pts.iter().map(|p| t.apply_pnt(p)).collect()
        })
        .collect();

    let n = pts.len();
    let mut faces = Vec::new();
    for k in 0..steps {
        let (ra, rb) = (&rings[k], &rings[k + 1]);
        for i in 0..n {
            let j = (i + 1) % n;
            let (a, b, c, d) = (ra[i], ra[j], rb[j], rb[i]);
            if (a - d).norm() > TOL && (b - c).norm() > TOL {
                faces.push(tri_face_from_corners(a, b, c));
                faces.push(tri_face_from_corners(a, c, d));
            } else if (a - d).norm() > TOL {
                faces.push(tri_face_from_corners(a, b, d));
            } else if (b - c).norm() > TOL {
                faces.push(tri_face_from_corners(a, b, c));
            }
        }
    }
    if !full_turn {
        faces.push(face.clone());
        let end = crate::geom::Trsf::rotation(axis, angle);
        faces.push(face.transformed(&end));
    }
    Ok(Solid::from_faces(faces))
}

/// Sweep of a planar profile along a polyline path (translation only).
pub fn sweep(face: &Face, path: &[Pnt]) -> Result<Shape, KernelError> {
    if path.len() < 2 {
        return Err(KernelError::op("sweep", "path needs at least two points"));
    }
    let mut parts = Vec::with_capacity(path.len() - 1);
    for seg in path.windows(2) {
        let v = seg[1] - seg[0];
        if v.norm() < TOL {
            continue;
        }
        let offset = seg[0] - path[0];
        let moved = face.transformed(&crate::geom::Trsf::translation(offset));
        parts.push(Shape::Solid(prism(&moved, v)?));
    }
    if parts.is_empty() {
        return Err(KernelError::op("sweep", "path is degenerate"));
    }
    if parts.len() == 1 {
        Ok(parts.pop().unwrap())
    } else {
        Ok(Shape::Compound(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pnt, vec3};

    #[test]
    fn box_has_expected_entity_counts() {
        let b = box_solid(
            Pnt::origin(),
            vec3(2.0, 0.0, 0.0),
            vec3(0.0, 3.0, 0.0),
            vec3(0.0, 0.0, 4.0),
        )
        .unwrap();
        assert_eq!(b.shells.len(), 1);
        assert_eq!(b.faces().count(), 6);
    }

    #[test]
    fn coplanar_box_vectors_are_rejected() {
        assert!(box_solid(
            Pnt::origin(),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 1.0, 0.0),
        )
        .is_err());
    }

    #[test]
    fn circle_face_prism_becomes_a_cylinder() {
        let circle = Face {
            surface: Surface::Plane {
                origin: Pnt::origin(),
                normal: Unit::new_normalize(vec3(0.0, 0.0, 1.0)),
            },
            wires: vec![Wire::new(vec![Edge::full_circle(
                Pnt::origin(),
                Unit::new_normalize(vec3(0.0, 0.0, 1.0)),
                1.0,
                pnt(1.0, 0.0, 0.0),
            )])],
        };
        let s = prism(&circle, vec3(0.0, 0.0, 2.0)).unwrap();
        assert!(s
            .faces()
            .any(|f| matches!(f.surface, Surface::Cylinder { .. })));
    }

    #[test]
    fn sweep_along_two_segments_yields_two_solids() {
        let f = quad_face(Pnt::origin(), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)).unwrap();
        let s = sweep(
            &f,
            &[pnt(0.0, 0.0, 0.0), pnt(0.0, 0.0, 1.0), pnt(0.0, 0.0, 2.5)],
        )
        .unwrap();
        assert_eq!(s.solids().len(), 2);
    }
}
