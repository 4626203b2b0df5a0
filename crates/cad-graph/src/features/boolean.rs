//! Boolean operations between features: union, intersection, cut.
//!
//! The two-operand forms consult the on-disk cache before doing geometric
//! work. Union and intersection hash their operands order-independently so
//! that `a | b` and `b | a` share one cache entry.

use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::boolean as kbool;
use cad_kernel::{Shape, Solid};
use tracing::debug;

use crate::datum::{DatumExt, DatumRef};
use crate::feature::{
    bundle_from_record, cache_lookup, cache_store, record_from_bundle, Feature, FeatureCore,
    FeatureExt, FeatureRef, ShapeBundle,
};

fn commutative_input_hash(h: &mut HashAccumulator, a: &FeatureRef, b: &FeatureRef) {
    let (ha, hb) = (a.hash_id(), b.hash_id());
    let (lo, hi) = if ha <= hb { (ha, hb) } else { (hb, ha) };
    h.add_hash(lo);
    h.add_hash(hi);
}

/// Fuse of two features, or the pairwise merge of all solids of one.
pub struct BooleanUnion {
    core: FeatureCore,
    m1: FeatureRef,
    m2: Option<FeatureRef>,
}

impl BooleanUnion {
    pub fn create(m1: FeatureRef, m2: FeatureRef) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            m1,
            m2: Some(m2),
        });
        me.core.set_symbol_name(format!(
            "({} | {})",
            me.m1.display_name(),
            me.m2.as_ref().unwrap().display_name()
        ));
        me
    }

    pub fn create_merge(m1: FeatureRef) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            m1,
            m2: None,
        });
        me.core
            .set_symbol_name(format!("merged({})", me.m1.display_name()));
        me
    }
}

impl Feature for BooleanUnion {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "BooleanUnion"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        match &self.m2 {
            Some(m2) => commutative_input_hash(h, &self.m1, m2),
            None => {
                h.add_str("merge");
                h.add_hash(self.m1.hash_id());
            }
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let name = self.display_name();
        match &self.m2 {
            Some(m2) => {
                let hash = self.hash_id();
                let bundle = if let Some(record) = cache_lookup(hash) {
                    debug!(target: "graph.cache", node = %name, hash = %hash, "cache_hit");
                    bundle_from_record(&self.core, record)
                } else {
                    let b1 = self.m1.built()?;
                    let b2 = m2.built()?;
                    let fused = kbool::fuse(&b1.shape, &b2.shape)
                        .map_err(|e| CadError::geometry(&name, "fuse", e.to_string()))?;
                    let mut bundle = ShapeBundle::new(fused);
                    bundle.copy_datums(&b1, "m1_", &name)?;
                    bundle.copy_datums(&b2, "m2_", &name)?;
                    cache_store(hash, &record_from_bundle(&self.core, &bundle));
                    bundle
                };
                self.m1.core().unset_leaf();
                m2.core().unset_leaf();
                Ok(bundle)
            }
            None => {
                let b1 = self.m1.built()?;
                let solids: Vec<&Solid> = b1.shape.solids();
                if solids.is_empty() {
                    return Err(CadError::invalid(
                        name,
                        "no valid base feature for the merge operation",
                    ));
                }
                let mut acc = Shape::Solid(solids[0].clone());
                for s in &solids[1..] {
                    acc = kbool::fuse(&acc, &Shape::Solid((*s).clone()))
                        .map_err(|e| CadError::geometry(&name, "fuse", e.to_string()))?;
                }
                self.m1.core().unset_leaf();
                let mut bundle = ShapeBundle::new(acc);
                bundle.copy_datums(&b1, "", &name)?;
                Ok(bundle)
            }
        }
    }
}

/// Common part of two features, or of one feature with a datum plane. A
/// wire or edge first operand intersected with a plane yields the curve's
/// intersection points.
pub struct BooleanIntersection {
    core: FeatureCore,
    m1: FeatureRef,
    m2: Option<FeatureRef>,
    m2pl: Option<DatumRef>,
}

impl BooleanIntersection {
    pub fn create(m1: FeatureRef, m2: FeatureRef) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            m1,
            m2: Some(m2),
            m2pl: None,
        });
        me.core.set_symbol_name(format!(
            "({} & {})",
            me.m1.display_name(),
            me.m2.as_ref().unwrap().display_name()
        ));
        me
    }

    pub fn create_plane(m1: FeatureRef, plane: DatumRef) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            m1,
            m2: None,
            m2pl: Some(plane),
        });
        me.core
            .set_symbol_name(format!("({} & datum)", me.m1.display_name()));
        me
    }
}

impl Feature for BooleanIntersection {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "BooleanIntersection"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        match (&self.m2, &self.m2pl) {
            (Some(m2), _) => commutative_input_hash(h, &self.m1, m2),
            (None, Some(pl)) => {
                h.add_hash(self.m1.hash_id());
                h.add_hash(pl.hash_id());
            }
            (None, None) => h.add_hash(self.m1.hash_id()),
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let name = self.display_name();
        let hash = self.hash_id();
        if let Some(record) = cache_lookup(hash) {
            debug!(target: "graph.cache", node = %name, hash = %hash, "cache_hit");
            self.m1.core().unset_leaf();
            if let Some(m2) = &self.m2 {
                m2.core().unset_leaf();
            }
            return Ok(bundle_from_record(&self.core, record));
        }

        let b1 = self.m1.built()?;
        let bundle = if let Some(m2) = &self.m2 {
            let b2 = m2.built()?;
            let shape = kbool::common(&b1.shape, &b2.shape)
                .map_err(|e| CadError::geometry(&name, "common", e.to_string()))?;
            m2.core().unset_leaf();
            ShapeBundle::new(shape)
        } else {
            let pl = self.m2pl.as_ref().expect("intersection without an operand");
            if !pl.provides_plane() {
                return Err(CadError::invalid(
                    name,
                    "given reference does not provide a planar reference",
                ));
            }
            let plane = pl.plane()?;
            if b1.shape.is_single_wire() || b1.shape.is_single_edge() {
                let pts = kbool::curve_plane_intersections(&b1.shape, &plane)
                    .map_err(|e| CadError::geometry(&name, "curve_plane_intersection", e.to_string()))?;
                ShapeBundle::new(Shape::Compound(
                    pts.into_iter().map(Shape::Vertex).collect(),
                ))
            } else {
                let shape = kbool::section_with_plane(&b1.shape, &plane)
                    .map_err(|e| CadError::geometry(&name, "section", e.to_string()))?;
                ShapeBundle::new(shape)
            }
        };
        self.m1.core().unset_leaf();
        cache_store(hash, &record_from_bundle(&self.core, &bundle));
        Ok(bundle)
    }
}

/// Subtract the second feature from the first.
pub struct BooleanCut {
    core: FeatureCore,
    m1: FeatureRef,
    m2: FeatureRef,
}

impl BooleanCut {
    pub fn create(m1: FeatureRef, m2: FeatureRef) -> FeatureRef {
        let me = Rc::new(Self {
            core: FeatureCore::new(),
            m1,
            m2,
        });
        me.core.set_symbol_name(format!(
            "({} - {})",
            me.m1.display_name(),
            me.m2.display_name()
        ));
        me
    }
}

impl Feature for BooleanCut {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "BooleanCut"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        // Order matters for subtraction.
        h.add_hash(self.m1.hash_id());
        h.add_hash(self.m2.hash_id());
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let name = self.display_name();
        let hash = self.hash_id();
        let bundle = if let Some(record) = cache_lookup(hash) {
            debug!(target: "graph.cache", node = %name, hash = %hash, "cache_hit");
            bundle_from_record(&self.core, record)
        } else {
            let b1 = self.m1.built()?;
            let b2 = self.m2.built()?;
            let shape = kbool::cut(&b1.shape, &b2.shape)
                .map_err(|e| CadError::geometry(&name, "cut", e.to_string()))?;
            let mut bundle = ShapeBundle::new(shape);
            bundle.copy_datums(&b1, "", &name)?;
            cache_store(hash, &record_from_bundle(&self.core, &bundle));
            bundle
        };
        self.m1.core().unset_leaf();
        self.m2.core().unset_leaf();
        Ok(bundle)
    }
}
