//! Zero-copy container binding named components.
//!
//! The compound publishes every component as a named sub-feature and
//! aggregates mass properties over them: its own mass and centre of gravity
//! are the mass-weighted sums of the children.

use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::{Pnt, Shape, Vec3};

use crate::feature::{Feature, FeatureCore, FeatureExt, FeatureRef, ShapeBundle};

pub struct Compound {
    core: FeatureCore,
    components: Vec<(String, FeatureRef)>,
}

impl Compound {
    pub fn create(components: Vec<(String, FeatureRef)>) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            components,
        })
    }

    /// Components named `component1`, `component2`, ... in order.
    pub fn create_unnamed(components: Vec<FeatureRef>) -> FeatureRef {
        Self::create(
            components
                .into_iter()
                .enumerate()
                .map(|(i, c)| (format!("component{}", i + 1), c))
                .collect(),
        )
    }
}

impl Feature for Compound {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Compound"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_u64(self.components.len() as u64);
        for (name, c) in &self.components {
            h.add_str(name);
            h.add_hash(c.hash_id());
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        if self.components.is_empty() {
            return Err(CadError::invalid("Compound", "no components given"));
        }
        let name = self.display_name();
        let mut shapes = Vec::with_capacity(self.components.len());
        let mut total_mass = 0.0;
        let mut weighted_cog = Vec3::zeros();
        for (_, c) in &self.components {
            shapes.push(c.shape()?);
            let m = c.mass()?;
            total_mass += m;
            if m > 0.0 {
                weighted_cog += c.model_cog()?.coords * m;
            }
            c.core().unset_leaf();
        }
        if total_mass > 0.0 {
            self.core.set_mass_explicitly(total_mass);
            self.core
                .set_cog_explicitly(Pnt::from(weighted_cog / total_mass));
        }

        let mut bundle = ShapeBundle::new(Shape::Compound(shapes));
        for (cname, c) in &self.components {
            if bundle.subshapes.contains_key(cname) {
                return Err(CadError::invalid(
                    &name,
                    format!("component \"{cname}\" bound twice"),
                ));
            }
            bundle.subshapes.insert(cname.clone(), c.clone());
        }
        Ok(bundle)
    }
}
