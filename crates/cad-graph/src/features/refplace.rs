//! Constraint-based placement.
//!
//! A base feature is positioned by minimizing the summed residuals of a set
//! of geometric conditions over a 7-component parameter vector: translation
//! plus an unnormalized quaternion. The quaternion is normalized inside the
//! decoder; a near-zero quaternion decodes to the identity rotation, which
//! makes the all-zero start vector a valid pose.

use std::cell::RefCell;
use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::{Pnt, Trsf, Vec3};
use cad_numerics::{minimize_nelder_mead, MinimizeOptions};
use nalgebra::DVector;
use tracing::info;

use crate::datum::{DatumExt, DatumRef};
use crate::feature::{Feature, FeatureCore, FeatureExt, FeatureRef, ShapeBundle};
use crate::params::{Scalar, ScalarRef, Vector, VectorRef};

fn trsf_from_vector(x: &DVector<f64>) -> Trsf {
    Trsf::from_quaternion(x[3], x[4], x[5], x[6], Vec3::new(x[0], x[1], x[2]))
}

fn angle_between(a: &Vec3, b: &Vec3) -> f64 {
    let na = a.norm();
    let nb = b.norm();
    if na < 1e-30 || nb < 1e-30 {
        return 0.0;
    }
    (a.dot(b) / (na * nb)).clamp(-1.0, 1.0).acos()
}

/// A placement condition: a non-negative residual over a candidate pose;
/// zero means the condition holds.
pub trait Condition {
    fn residual(&self, tr: &Trsf) -> Result<f64, CadError>;

    /// Contribution to the owning feature's content hash. Conditions are
    /// part of the feature identity, otherwise two placements of the same
    /// base could collide in the cache.
    fn hash_into(&self, h: &mut HashAccumulator);
}

pub type ConditionRef = Rc<dyn Condition>;

pub struct CoincidentPoint {
    pub p_org: VectorRef,
    pub p_targ: VectorRef,
}

impl Condition for CoincidentPoint {
    fn residual(&self, tr: &Trsf) -> Result<f64, CadError> {
        let p = tr.apply_pnt(&Pnt::from(self.p_org.value()?));
        let t = Pnt::from(self.p_targ.value()?);
        Ok((p - t).norm_squared())
    }

    fn hash_into(&self, h: &mut HashAccumulator) {
        h.add_str("coincident");
        self.p_org.hash_into(h);
        self.p_targ.hash_into(h);
    }
}

pub struct ParallelAxis {
    pub dir_org: VectorRef,
    pub dir_targ: VectorRef,
}

impl Condition for ParallelAxis {
    fn residual(&self, tr: &Trsf) -> Result<f64, CadError> {
        let d = tr.apply_vec(&self.dir_org.value()?);
        Ok(angle_between(&d, &self.dir_targ.value()?).powi(2))
    }

    fn hash_into(&self, h: &mut HashAccumulator) {
        h.add_str("parallel");
        self.dir_org.hash_into(h);
        self.dir_targ.hash_into(h);
    }
}

pub struct AlignedPlanes {
    pub pl_org: DatumRef,
    pub pl_targ: DatumRef,
    pub inverted: bool,
}

impl Condition for AlignedPlanes {
    fn residual(&self, tr: &Trsf) -> Result<f64, CadError> {
        let pl = tr.apply_ax3(&self.pl_org.plane()?);
        let targ = self.pl_targ.plane()?;
        let align = pl.normal.as_ref().dot(targ.normal.as_ref());
        let dist = targ.signed_distance(&pl.origin);
        let misalignment = if self.inverted {
            1.0 + align
        } else {
            1.0 - align
        };
        Ok(misalignment.powi(2) + dist * dist)
    }

    fn hash_into(&self, h: &mut HashAccumulator) {
        h.add_str("aligned");
        h.add_hash(self.pl_org.hash_id());
        h.add_hash(self.pl_targ.hash_id());
        h.add_bool(self.inverted);
    }
}

pub struct InclinedPlanes {
    pub pl_org: DatumRef,
    pub pl_targ: DatumRef,
    pub angle: ScalarRef,
}

impl Condition for InclinedPlanes {
    fn residual(&self, tr: &Trsf) -> Result<f64, CadError> {
        let pl = tr.apply_ax3(&self.pl_org.plane()?);
        let targ = self.pl_targ.plane()?;
        let a = angle_between(&pl.normal.into_inner(), &targ.normal.into_inner());
        Ok((a - self.angle.value()?).powi(2))
    }

    fn hash_into(&self, h: &mut HashAccumulator) {
        h.add_str("inclined");
        h.add_hash(self.pl_org.hash_id());
        h.add_hash(self.pl_targ.hash_id());
        self.angle.hash_into(h);
    }
}

pub struct Coaxial {
    pub ax_org: DatumRef,
    pub ax_targ: DatumRef,
    pub inverted: bool,
}

impl Condition for Coaxial {
    fn residual(&self, tr: &Trsf) -> Result<f64, CadError> {
        let ao = tr.apply_ax1(&self.ax_org.axis()?);
        let at = self.ax_targ.axis()?;
        let fac = if self.inverted { -1.0 } else { 1.0 };
        let angle = angle_between(&ao.dir.into_inner(), &(at.dir.into_inner() * fac));
        let r = ao.origin - at.origin;
        let off = r - at.dir.as_ref() * r.dot(at.dir.as_ref());
        Ok(angle * angle + off.norm_squared())
    }

    fn hash_into(&self, h: &mut HashAccumulator) {
        h.add_str("coaxial");
        h.add_hash(self.ax_org.hash_id());
        h.add_hash(self.ax_targ.hash_id());
        h.add_bool(self.inverted);
    }
}

pub struct PointInPlane {
    pub p_org: VectorRef,
    pub pl_targ: DatumRef,
}

impl Condition for PointInPlane {
    fn residual(&self, tr: &Trsf) -> Result<f64, CadError> {
        let p = tr.apply_pnt(&Pnt::from(self.p_org.value()?));
        let d = self.pl_targ.plane()?.signed_distance(&p);
        Ok(d * d)
    }

    fn hash_into(&self, h: &mut HashAccumulator) {
        h.add_str("inplane");
        self.p_org.hash_into(h);
        h.add_hash(self.pl_targ.hash_id());
    }
}

pub struct PointOnAxis {
    pub p_org: VectorRef,
    pub ax_targ: DatumRef,
}

impl Condition for PointOnAxis {
    fn residual(&self, tr: &Trsf) -> Result<f64, CadError> {
        let p = tr.apply_pnt(&Pnt::from(self.p_org.value()?));
        let d = self.ax_targ.axis()?.distance_to(&p);
        Ok(d * d)
    }

    fn hash_into(&self, h: &mut HashAccumulator) {
        h.add_str("onaxis");
        self.p_org.hash_into(h);
        h.add_hash(self.ax_targ.hash_id());
    }
}

pub struct RefPlace {
    core: FeatureCore,
    base: FeatureRef,
    conditions: Vec<ConditionRef>,
    fixed: Option<Trsf>,
    solved: RefCell<Option<Trsf>>,
}

impl RefPlace {
    pub fn create(base: FeatureRef, conditions: Vec<ConditionRef>) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            base,
            conditions,
            fixed: None,
            solved: RefCell::new(None),
        });
        me.core
            .set_symbol_name(format!("placed({})", me.base.display_name()));
        me
    }

    /// Place with an explicitly given transform instead of solving.
    pub fn create_fixed(base: FeatureRef, trsf: Trsf) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            base,
            conditions: Vec::new(),
            fixed: Some(trsf),
            solved: RefCell::new(None),
        });
        me.core
            .set_symbol_name(format!("placed({})", me.base.display_name()));
        me
    }

    fn solve(&self) -> Result<Trsf, CadError> {
        let name = self.display_name();
        // Surface input errors (unbuilt datums, wrong capabilities) before
        // entering the minimizer.
        for c in &self.conditions {
            c.residual(&Trsf::identity())?;
        }
        let objective = |x: &DVector<f64>| -> f64 {
            let tr = trsf_from_vector(x);
            self.conditions
                .iter()
                .map(|c| c.residual(&tr).unwrap_or(f64::INFINITY))
                .sum()
        };
        let x0 = DVector::zeros(7);
        let opts = MinimizeOptions {
            steps: Some(DVector::from_vec(vec![
                1000.0, 1000.0, 1000.0, 1.0, 0.5, 0.5, 0.5,
            ])),
            tol: 1e-6,
            max_iter: 10_000,
        };
        let best = minimize_nelder_mead(&objective, &x0, &opts)
            .map_err(|e| CadError::Numerics(format!("{name}: placement solve failed: {e}")))?;
        let residual = objective(&best);
        info!(
            target: "graph.placement",
            node = %name,
            residual,
            "placement_solved"
        );
        Ok(trsf_from_vector(&best))
    }
}

impl Feature for RefPlace {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "RefPlace"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.base.hash_id());
        h.add_u64(self.conditions.len() as u64);
        for c in &self.conditions {
            c.hash_into(h);
        }
        if let Some(t) = &self.fixed {
            h.add_str("fixed");
            for v in t.linear.iter() {
                h.add_f64(*v);
            }
            for v in t.translation.iter() {
                h.add_f64(*v);
            }
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let name = self.display_name();
        if self.fixed.is_none() && self.conditions.is_empty() {
            return Err(CadError::invalid(
                name,
                "at least one condition has to be provided",
            ));
        }

        // No cache consultation here: the solved pose belongs to the node's
        // outputs and is not part of the persisted record.
        let t = match self.fixed {
            Some(t) => t,
            None => self.solve()?,
        };
        *self.solved.borrow_mut() = Some(t);

        let base = self.base.built()?;
        self.base.core().unset_leaf();
        let mut bundle = ShapeBundle::new(base.shape.transformed(&t));
        bundle.copy_datums_transformed(&base, &t, "", &name)?;
        Ok(bundle)
    }

    fn is_transformation(&self) -> bool {
        true
    }

    fn transformation(&self) -> Result<Option<Trsf>, CadError> {
        self.ensure_built()?;
        let solved = *self.solved.borrow();
        Ok(solved.or(self.fixed))
    }
}
