//! Analytic primitives: box, quad, cylinder, sphere, torus, extrusion,
//! revolution, sweep.

use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::primitives as kprim;
use cad_kernel::{Ax1, Pnt, Shape};

use crate::feature::{Feature, FeatureCore, FeatureExt, FeatureRef, ShapeBundle};
use crate::params::{Scalar, ScalarRef, Vector, VectorRef};

/// Parallelepiped spanned by three edge vectors.
pub struct Cuboid {
    core: FeatureCore,
    p0: VectorRef,
    l: VectorRef,
    w: VectorRef,
    h: VectorRef,
}

impl Cuboid {
    pub fn create(p0: VectorRef, l: VectorRef, w: VectorRef, h: VectorRef) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            p0,
            l,
            w,
            h,
        })
    }
}

impl Feature for Cuboid {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Box"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        self.p0.hash_into(h);
        self.l.hash_into(h);
        self.w.hash_into(h);
        self.h.hash_into(h);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let p0 = Pnt::from(self.p0.value()?);
        let solid = kprim::box_solid(p0, self.l.value()?, self.w.value()?, self.h.value()?)
            .map_err(|e| CadError::geometry("Box", "box_solid", e.to_string()))?;
        let mut bundle = ShapeBundle::new(Shape::Solid(solid));
        bundle.ref_points.insert("p0".into(), p0);
        Ok(bundle)
    }
}

/// Planar parallelogram face.
pub struct Quad {
    core: FeatureCore,
    p0: VectorRef,
    ex: VectorRef,
    ey: VectorRef,
}

impl Quad {
    pub fn create(p0: VectorRef, ex: VectorRef, ey: VectorRef) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            p0,
            ex,
            ey,
        })
    }
}

impl Feature for Quad {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Quad"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        self.p0.hash_into(h);
        self.ex.hash_into(h);
        self.ey.hash_into(h);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let face = kprim::quad_face(
            Pnt::from(self.p0.value()?),
            self.ex.value()?,
            self.ey.value()?,
        )
        .map_err(|e| CadError::geometry("Quad", "quad_face", e.to_string()))?;
        Ok(ShapeBundle::new(Shape::Face(face)))
    }
}

pub struct Cylinder {
    core: FeatureCore,
    p0: VectorRef,
    /// Axis vector; its length is the cylinder height.
    axis: VectorRef,
    radius: ScalarRef,
}

impl Cylinder {
    pub fn create(p0: VectorRef, axis: VectorRef, radius: ScalarRef) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            p0,
            axis,
            radius,
        })
    }
}

impl Feature for Cylinder {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Cylinder"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        self.p0.hash_into(h);
        self.axis.hash_into(h);
        self.radius.hash_into(h);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let axis = self.axis.value()?;
        let solid = kprim::cylinder(
            Pnt::from(self.p0.value()?),
            axis,
            self.radius.value()?,
            axis.norm(),
        )
        .map_err(|e| CadError::geometry("Cylinder", "cylinder", e.to_string()))?;
        Ok(ShapeBundle::new(Shape::Solid(solid)))
    }
}

pub struct Sphere {
    core: FeatureCore,
    center: VectorRef,
    radius: ScalarRef,
}

impl Sphere {
    pub fn create(center: VectorRef, radius: ScalarRef) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            center,
            radius,
        })
    }
}

impl Feature for Sphere {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Sphere"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        self.center.hash_into(h);
        self.radius.hash_into(h);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let solid = kprim::sphere(Pnt::from(self.center.value()?), self.radius.value()?)
            .map_err(|e| CadError::geometry("Sphere", "sphere", e.to_string()))?;
        Ok(ShapeBundle::new(Shape::Solid(solid)))
    }
}

pub struct Torus {
    core: FeatureCore,
    center: VectorRef,
    axis: VectorRef,
    r_major: ScalarRef,
    r_minor: ScalarRef,
}

impl Torus {
    pub fn create(
        center: VectorRef,
        axis: VectorRef,
        r_major: ScalarRef,
        r_minor: ScalarRef,
    ) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            center,
            axis,
            r_major,
            r_minor,
        })
    }
}

impl Feature for Torus {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Torus"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        self.center.hash_into(h);
        self.axis.hash_into(h);
        self.r_major.hash_into(h);
        self.r_minor.hash_into(h);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let solid = kprim::torus(
            Pnt::from(self.center.value()?),
            self.axis.value()?,
            self.r_major.value()?,
            self.r_minor.value()?,
        )
        .map_err(|e| CadError::geometry("Torus", "torus", e.to_string()))?;
        Ok(ShapeBundle::new(Shape::Solid(solid)))
    }
}

/// Linear extrusion of a single-face base feature.
pub struct Extrusion {
    core: FeatureCore,
    base: FeatureRef,
    dir: VectorRef,
}

impl Extrusion {
    pub fn create(base: FeatureRef, dir: VectorRef) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            base,
            dir,
        });
        me.core
            .set_symbol_name(format!("extrusion({})", me.base.display_name()));
        me
    }
}

impl Feature for Extrusion {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Extrusion"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.base.hash_id());
        self.dir.hash_into(h);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let base = self.base.built()?;
        let face = match &base.shape {
            Shape::Face(f) => f.clone(),
            _ => {
                return Err(CadError::ShapeKind {
                    node: self.display_name(),
                    expected: "single face",
                })
            }
        };
        let solid = kprim::prism(&face, self.dir.value()?)
            .map_err(|e| CadError::geometry("Extrusion", "prism", e.to_string()))?;
        self.base.core().unset_leaf();
        let mut bundle = ShapeBundle::new(Shape::Solid(solid));
        bundle.copy_datums(&base, "", &self.display_name())?;
        Ok(bundle)
    }
}

/// Revolution of a single-face base feature about an axis.
pub struct Revolution {
    core: FeatureCore,
    base: FeatureRef,
    p0: VectorRef,
    axis: VectorRef,
    angle: ScalarRef,
}

impl Revolution {
    pub fn create(
        base: FeatureRef,
        p0: VectorRef,
        axis: VectorRef,
        angle: ScalarRef,
    ) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            base,
            p0,
            axis,
            angle,
        })
    }
}

impl Feature for Revolution {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Revolution"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.base.hash_id());
        self.p0.hash_into(h);
        self.axis.hash_into(h);
        self.angle.hash_into(h);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let base = self.base.built()?;
        let face = match &base.shape {
            Shape::Face(f) => f.clone(),
            _ => {
                return Err(CadError::ShapeKind {
                    node: self.display_name(),
                    expected: "single face",
                })
            }
        };
        let axis = Ax1::new(Pnt::from(self.p0.value()?), self.axis.value()?);
        let solid = kprim::revolve(&face, &axis, self.angle.value()?, 1e-4)
            .map_err(|e| CadError::geometry("Revolution", "revolve", e.to_string()))?;
        self.base.core().unset_leaf();
        Ok(ShapeBundle::new(Shape::Solid(solid)))
    }
}

/// Sweep of a single-face base feature along a polyline of points.
pub struct Sweep {
    core: FeatureCore,
    base: FeatureRef,
    path: Vec<VectorRef>,
}

impl Sweep {
    pub fn create(base: FeatureRef, path: Vec<VectorRef>) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            base,
            path,
        })
    }
}

impl Feature for Sweep {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Sweep"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.base.hash_id());
        h.add_u64(self.path.len() as u64);
        for p in &self.path {
            p.hash_into(h);
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let base = self.base.built()?;
        let face = match &base.shape {
            Shape::Face(f) => f.clone(),
            _ => {
                return Err(CadError::ShapeKind {
                    node: self.display_name(),
                    expected: "single face",
                })
            }
        };
        let mut pts = Vec::with_capacity(self.path.len());
        for p in &self.path {
            pts.push(Pnt::from(p.value()?));
        }
        let shape = kprim::sweep(&face, &pts)
            .map_err(|e| CadError::geometry("Sweep", "sweep", e.to_string()))?;
        self.base.core().unset_leaf();
        Ok(ShapeBundle::new(shape))
    }
}
