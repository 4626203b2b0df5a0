//! Remove the half-space on one side of a plane.
//!
//! The cut tool is a finite prism ("air space") sized from the model
//! bounding box. The prism and, best-effort, the cut surface are published
//! as named sub-features.

use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::boolean as kbool;
use cad_kernel::primitives::{prism, quad_face};
use cad_kernel::{Ax3, Pnt, Shape, Vec3};
use tracing::{debug, warn};

use crate::datum::{DatumExt, DatumRef};
use crate::feature::{
    bundle_from_record, cache_lookup, cache_store, record_from_bundle, Feature, FeatureCore,
    FeatureExt, FeatureRef, ShapeBundle, ShapeFeature,
};
use crate::params::{Vector, VectorRef};

enum PlaneSpec {
    PointNormal { p0: VectorRef, n: VectorRef },
    Datum { plane: DatumRef, inverted: bool },
}

pub struct Cutaway {
    core: FeatureCore,
    model: FeatureRef,
    spec: PlaneSpec,
}

impl Cutaway {
    pub fn create(model: FeatureRef, p0: VectorRef, n: VectorRef) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            model,
            spec: PlaneSpec::PointNormal { p0, n },
        });
        me.core
            .set_symbol_name(format!("cutaway({})", me.model.display_name()));
        me
    }

    pub fn create_plane(model: FeatureRef, plane: DatumRef, inverted: bool) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            model,
            spec: PlaneSpec::Datum { plane, inverted },
        });
        me.core
            .set_symbol_name(format!("cutaway({})", me.model.display_name()));
        me
    }

    fn resolve_plane(&self) -> Result<(Pnt, Vec3), CadError> {
        match &self.spec {
            PlaneSpec::PointNormal { p0, n } => {
                Ok((Pnt::from(p0.value()?), n.value()?))
            }
            PlaneSpec::Datum { plane, inverted } => {
                if !plane.provides_plane() {
                    return Err(CadError::invalid(
                        self.display_name(),
                        "given datum does not provide a planar reference",
                    ));
                }
                let pl = plane.plane()?;
                let mut n = pl.normal.into_inner();
                if *inverted {
                    n = -n;
                }
                Ok((pl.origin, n))
            }
        }
    }
}

impl Feature for Cutaway {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Cutaway"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.model.hash_id());
        match &self.spec {
            PlaneSpec::PointNormal { p0, n } => {
                p0.hash_into(h);
                n.hash_into(h);
            }
            PlaneSpec::Datum { plane, inverted } => {
                h.add_hash(plane.hash_id());
                h.add_bool(*inverted);
            }
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let name = self.display_name();
        let hash = self.hash_id();
        if let Some(record) = cache_lookup(hash) {
            debug!(target: "graph.cache", node = %name, hash = %hash, "cache_hit");
            self.model.core().unset_leaf();
            return Ok(bundle_from_record(&self.core, record));
        }

        let (p0, n_raw) = self.resolve_plane()?;
        if n_raw.norm() < 1e-12 {
            return Err(CadError::invalid(&name, "zero cut-plane normal"));
        }
        let n = n_raw.normalize();

        let (bb_min, bb_max) = self.model.model_bnd_box(0.1)?;
        let diag = (bb_max - bb_min).norm();
        let l = 10.0 * diag;

        let mut ex = n.cross(&Vec3::new(1.0, 0.0, 0.0));
        if ex.norm() < 1e-8 {
            ex = n.cross(&Vec3::new(0.0, 1.0, 0.0));
        }
        let ex = ex.normalize();
        let ey = n.cross(&ex).normalize();

        let quad = quad_face(p0 - (ex + ey) * (0.5 * l), ex * l, ey * l)
            .map_err(|e| CadError::geometry(&name, "quad_face", e.to_string()))?;
        let airspace = prism(&quad, n * l)
            .map_err(|e| CadError::geometry(&name, "prism", e.to_string()))?;
        let airspace = Shape::Solid(airspace);

        let model = self.model.built()?;
        let cut = kbool::cut(&model.shape, &airspace)
            .map_err(|e| CadError::geometry(&name, "cut", e.to_string()))?;

        let mut bundle = ShapeBundle::new(cut);
        bundle.ref_points.insert("p0".into(), p0);
        bundle.ref_vectors.insert("n".into(), n);
        bundle
            .subshapes
            .insert("AirSpace".into(), ShapeFeature::create(airspace));
        match kbool::section_with_plane(&model.shape, &Ax3::from_normal(p0, n)) {
            Ok(xsec) => {
                bundle
                    .subshapes
                    .insert("CutSurface".into(), ShapeFeature::create(xsec));
            }
            Err(e) => {
                warn!(target: "graph.build", node = %name, error = %e, "cut_surface_failed");
            }
        }

        self.model.core().unset_leaf();
        cache_store(hash, &record_from_bundle(&self.core, &bundle));
        Ok(bundle)
    }
}
