//! Points, directions, reference frames and transforms.

use nalgebra::{Matrix3, Point3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub type Pnt = Point3<f64>;
pub type Vec3 = Vector3<f64>;
pub type Dir = Unit<Vector3<f64>>;

/// Coincidence tolerance for vertex identity and clipping decisions.
pub const TOL: f64 = 1e-9;

/// An oriented line: axis of a cylinder, datum axis, revolution axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ax1 {
    pub origin: Pnt,
    pub dir: Dir,
}

impl Ax1 {
    pub fn new(origin: Pnt, dir: Vec3) -> Self {
        Self {
            origin,
            dir: Unit::new_normalize(dir),
        }
    }

    /// Perpendicular offset of `p` from the axis line.
    pub fn distance_to(&self, p: &Pnt) -> f64 {
        let r = p - self.origin;
        (r - self.dir.as_ref() * r.dot(self.dir.as_ref())).norm()
    }
}

/// A placed plane: origin, normal and an in-plane x direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ax3 {
    pub origin: Pnt,
    pub normal: Dir,
    pub x_dir: Dir,
}

impl Ax3 {
    /// Construct from origin and normal; the in-plane x direction is chosen
    /// deterministically from the global axes.
    pub fn from_normal(origin: Pnt, normal: Vec3) -> Self {
        let n = Unit::new_normalize(normal);
        let mut x = Vector3::y().cross(n.as_ref());
        if x.norm() < 1e-6 {
            x = Vector3::x().cross(n.as_ref());
        }
        Self {
            origin,
            normal: n,
            x_dir: Unit::new_normalize(x),
        }
    }

    pub fn with_x_dir(origin: Pnt, normal: Vec3, x_hint: Vec3) -> Self {
        let n = Unit::new_normalize(normal);
        // Project the hint into the plane.
        let x = x_hint - n.as_ref() * x_hint.dot(n.as_ref());
        Self {
            origin,
            normal: n,
            x_dir: Unit::new_normalize(x),
        }
    }

    pub fn y_dir(&self) -> Dir {
        Unit::new_normalize(self.normal.cross(self.x_dir.as_ref()))
    }

    /// Signed distance of `p` from the plane, positive on the normal side.
    pub fn signed_distance(&self, p: &Pnt) -> f64 {
        (p - self.origin).dot(self.normal.as_ref())
    }
}

/// Affine transform with an orthogonal linear part: rotations, translations
/// and reflections (mirror), but no scaling or shear.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trsf {
    pub linear: Matrix3<f64>,
    pub translation: Vec3,
}

impl Trsf {
    pub fn identity() -> Self {
        Self {
            linear: Matrix3::identity(),
            translation: Vec3::zeros(),
        }
    }

    pub fn translation(v: Vec3) -> Self {
        Self {
            linear: Matrix3::identity(),
            translation: v,
        }
    }

    /// Rotation by `angle` radians about an axis through `axis.origin`.
    pub fn rotation(axis: &Ax1, angle: f64) -> Self {
        let r = UnitQuaternion::from_axis_angle(&axis.dir, angle).to_rotation_matrix();
        let linear = *r.matrix();
        let o = axis.origin.coords;
        Self {
            translation: o - linear * o,
            linear,
        }
    }

    /// Reflection across the given plane.
    pub fn mirror(plane: &Ax3) -> Self {
        let n = plane.normal.into_inner();
        let linear = Matrix3::identity() - 2.0 * n * n.transpose();
        let o = plane.origin.coords;
        Self {
            translation: o - linear * o,
            linear,
        }
    }

    /// Rotation from a (not necessarily unit) quaternion plus translation.
    /// A near-zero quaternion decodes to the identity rotation so that an
    /// all-zero parameter vector is a valid pose.
    pub fn from_quaternion(qx: f64, qy: f64, qz: f64, qw: f64, t: Vec3) -> Self {
        let norm = (qx * qx + qy * qy + qz * qz + qw * qw).sqrt();
        let linear = if norm < 1e-12 {
            Matrix3::identity()
        } else {
            let q = UnitQuaternion::from_quaternion(
                nalgebra::Quaternion::new(qw / norm, qx / norm, qy / norm, qz / norm),
            );
            *q.to_rotation_matrix().matrix()
        };
        Self {
            linear,
            translation: t,
        }
    }

    /// `self` applied first, `next` applied to the result.
    pub fn then(&self, next: &Trsf) -> Trsf {
        Trsf {
            linear: next.linear * self.linear,
            translation: next.linear * self.translation + next.translation,
        }
    }

    pub fn inverse(&self) -> Trsf {
        // Orthogonal linear part: inverse is the transpose.
        let inv = self.linear.transpose();
        Trsf {
            linear: inv,
            translation: -(inv * self.translation),
        }
    }

    pub fn apply_pnt(&self, p: &Pnt) -> Pnt {
        Pnt::from(self.linear * p.coords + self.translation)
    }

    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        self.linear * v
    }

    pub fn apply_dir(&self, d: &Dir) -> Dir {
        Unit::new_normalize(self.linear * d.into_inner())
    }

    pub fn apply_ax1(&self, ax: &Ax1) -> Ax1 {
        Ax1 {
            origin: self.apply_pnt(&ax.origin),
            dir: self.apply_dir(&ax.dir),
        }
    }

    pub fn apply_ax3(&self, pl: &Ax3) -> Ax3 {
        Ax3 {
            origin: self.apply_pnt(&pl.origin),
            normal: self.apply_dir(&pl.normal),
            x_dir: self.apply_dir(&pl.x_dir),
        }
    }

    /// True for proper rigid motions (no reflection).
    pub fn is_rigid(&self) -> bool {
        (self.linear.determinant() - 1.0).abs() < 1e-9
    }
}

pub fn pnt(x: f64, y: f64, z: f64) -> Pnt {
    Pnt::new(x, y, z)
}

pub fn vec3(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_about_offset_axis_fixes_the_axis() {
        let ax = Ax1::new(pnt(1.0, 2.0, 3.0), vec3(0.0, 0.0, 1.0));
        let t = Trsf::rotation(&ax, 1.0);
        let moved = t.apply_pnt(&ax.origin);
        assert!((moved - ax.origin).norm() < 1e-12);
        assert!(t.is_rigid());
    }

    #[test]
    fn mirror_is_an_involution() {
        let pl = Ax3::from_normal(pnt(0.0, 1.0, 0.0), vec3(0.0, 1.0, 0.0));
        let m = Trsf::mirror(&pl);
        assert!(!m.is_rigid());
        let p = pnt(3.0, 5.0, -1.0);
        let back = m.apply_pnt(&m.apply_pnt(&p));
        assert!((back - p).norm() < 1e-12);
        // Reflection across y=1 maps y=5 to y=-3.
        assert!((m.apply_pnt(&p).y + 3.0).abs() < 1e-12);
    }

    #[test]
    fn zero_quaternion_decodes_to_identity_rotation() {
        let t = Trsf::from_quaternion(0.0, 0.0, 0.0, 0.0, vec3(1.0, 0.0, 0.0));
        assert_eq!(t.linear, Matrix3::identity());
    }

    #[test]
    fn composition_order_is_first_then_next() {
        let t1 = Trsf::translation(vec3(1.0, 0.0, 0.0));
        let ax = Ax1::new(Pnt::origin(), vec3(0.0, 0.0, 1.0));
        let t2 = Trsf::rotation(&ax, std::f64::consts::FRAC_PI_2);
        let combined = t1.then(&t2);
        let p = combined.apply_pnt(&Pnt::origin());
        // Translate to (1,0,0), then rotate 90 deg about z: (0,1,0).
        assert!((p - pnt(0.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn inverse_round_trips() {
        let ax = Ax1::new(pnt(0.5, 0.0, 0.0), vec3(1.0, 1.0, 0.0));
        let t = Trsf::rotation(&ax, 0.7).then(&Trsf::translation(vec3(2.0, -1.0, 4.0)));
        let p = pnt(1.0, 2.0, 3.0);
        let back = t.inverse().apply_pnt(&t.apply_pnt(&p));
        assert!((back - p).norm() < 1e-10);
    }
}
