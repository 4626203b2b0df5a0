//! Rigid re-embedding features: transform and mirror.
//!
//! Both propagate named outputs by wrapping them under the transform rather
//! than mutating the originals, so downstream users of the base feature
//! keep seeing unchanged coordinates.

use std::cell::RefCell;
use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::{Ax1, Ax3, Pnt, Trsf, Vec3};

use crate::datum::{DatumExt, DatumRef};
use crate::feature::{Feature, FeatureCore, FeatureExt, FeatureRef, ShapeBundle};
use crate::params::{Scalar, ScalarRef, Vector, VectorRef};

enum TrsfSpec {
    Translate(VectorRef),
    Rotate {
        origin: VectorRef,
        axis: VectorRef,
        angle: ScalarRef,
    },
    Fixed(Trsf),
}

pub struct Transform {
    core: FeatureCore,
    base: FeatureRef,
    spec: TrsfSpec,
    computed: RefCell<Option<Trsf>>,
}

impl Transform {
    fn new(base: FeatureRef, spec: TrsfSpec) -> Rc<Self> {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            base,
            spec,
            computed: RefCell::new(None),
        });
        me.core
            .set_symbol_name(format!("moved({})", me.base.display_name()));
        me
    }

    pub fn create_translate(base: FeatureRef, delta: VectorRef) -> FeatureRef {
        Self::new(base, TrsfSpec::Translate(delta))
    }

    pub fn create_rotate(
        base: FeatureRef,
        origin: VectorRef,
        axis: VectorRef,
        angle: ScalarRef,
    ) -> FeatureRef {
        Self::new(
            base,
            TrsfSpec::Rotate {
                origin,
                axis,
                angle,
            },
        )
    }

    pub fn with_trsf(base: FeatureRef, trsf: Trsf) -> FeatureRef {
        Self::new(base, TrsfSpec::Fixed(trsf))
    }

    fn compute(&self) -> Result<Trsf, CadError> {
        Ok(match &self.spec {
            TrsfSpec::Translate(delta) => Trsf::translation(delta.value()?),
            TrsfSpec::Rotate {
                origin,
                axis,
                angle,
            } => {
                let dir = axis.value()?;
                if dir.norm() < 1e-12 {
                    return Err(CadError::invalid("Transform", "zero rotation axis"));
                }
                Trsf::rotation(
                    &Ax1::new(Pnt::from(origin.value()?), dir),
                    angle.value()?,
                )
            }
            TrsfSpec::Fixed(t) => *t,
        })
    }
}

impl Feature for Transform {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Transform"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.base.hash_id());
        match &self.spec {
            TrsfSpec::Translate(delta) => {
                h.add_str("translate");
                delta.hash_into(h);
            }
            TrsfSpec::Rotate {
                origin,
                axis,
                angle,
            } => {
                h.add_str("rotate");
                origin.hash_into(h);
                axis.hash_into(h);
                angle.hash_into(h);
            }
            TrsfSpec::Fixed(t) => {
                h.add_str("fixed");
                for v in t.linear.iter() {
                    h.add_f64(*v);
                }
                for v in t.translation.iter() {
                    h.add_f64(*v);
                }
            }
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let t = self.compute()?;
        *self.computed.borrow_mut() = Some(t);
        let base = self.base.built()?;
        self.base.core().unset_leaf();
        let mut bundle = ShapeBundle::new(base.shape.transformed(&t));
        bundle.copy_datums_transformed(&base, &t, "", &self.display_name())?;
        Ok(bundle)
    }

    fn is_transformation(&self) -> bool {
        true
    }

    fn transformation(&self) -> Result<Option<Trsf>, CadError> {
        self.ensure_built()?;
        Ok(*self.computed.borrow())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorShortcut {
    FlipX,
    FlipY,
    FlipXY,
}

enum MirrorSpec {
    Datum(DatumRef),
    Shortcut(MirrorShortcut),
}

/// Reflection over a datum plane or a principal plane.
pub struct Mirror {
    core: FeatureCore,
    base: FeatureRef,
    spec: MirrorSpec,
    computed: RefCell<Option<Trsf>>,
}

impl Mirror {
    pub fn create(base: FeatureRef, plane: DatumRef) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            base,
            spec: MirrorSpec::Datum(plane),
            computed: RefCell::new(None),
        });
        me.core
            .set_symbol_name(format!("mirrored({})", me.base.display_name()));
        me
    }

    pub fn create_shortcut(base: FeatureRef, shortcut: MirrorShortcut) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            base,
            spec: MirrorSpec::Shortcut(shortcut),
            computed: RefCell::new(None),
        });
        me.core
            .set_symbol_name(format!("{:?}({})", shortcut, me.base.display_name()));
        me
    }
}

impl Feature for Mirror {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Mirror"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.base.hash_id());
        match &self.spec {
            MirrorSpec::Datum(pl) => h.add_hash(pl.hash_id()),
            MirrorSpec::Shortcut(s) => h.add_i64(*s as i64),
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let plane = match &self.spec {
            MirrorSpec::Datum(pl) => {
                if !pl.provides_plane() {
                    return Err(CadError::invalid(
                        self.display_name(),
                        "planar reference required",
                    ));
                }
                pl.plane()?
            }
            MirrorSpec::Shortcut(s) => {
                let normal = match s {
                    MirrorShortcut::FlipX => Vec3::new(1.0, 0.0, 0.0),
                    MirrorShortcut::FlipY => Vec3::new(0.0, 1.0, 0.0),
                    MirrorShortcut::FlipXY => Vec3::new(1.0, 1.0, 0.0),
                };
                Ax3::from_normal(Pnt::origin(), normal)
            }
        };
        let t = Trsf::mirror(&plane);
        *self.computed.borrow_mut() = Some(t);
        let base = self.base.built()?;
        self.base.core().unset_leaf();
        // The reflection flips wire windings; face tessellation re-orients
        // along the stored surface normals, which the transform reflects as
        // well, so no separate fixing pass is needed here.
        let mut bundle = ShapeBundle::new(base.shape.transformed(&t));
        bundle.copy_datums_transformed(&base, &t, "", &self.display_name())?;
        Ok(bundle)
    }

    fn is_transformation(&self) -> bool {
        true
    }

    fn transformation(&self) -> Result<Option<Trsf>, CadError> {
        self.ensure_built()?;
        Ok(*self.computed.borrow())
    }
}
