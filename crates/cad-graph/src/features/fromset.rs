//! Materialize a selection as a feature of its own: the selected entity for
//! a singleton set, a compound otherwise.

use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::Shape;

use crate::feature::{Feature, FeatureCore, FeatureExt, FeatureRef, ShapeBundle};
use crate::featureset::FeatureSetRef;
use crate::topomaps::EntityKind;

pub struct ShapeFromSet {
    core: FeatureCore,
    set: FeatureSetRef,
}

impl ShapeFromSet {
    pub fn create(set: FeatureSetRef) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            set,
        })
    }
}

impl Feature for ShapeFromSet {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "ShapeFromSet"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.set.owner().hash_id());
        h.add_str(self.set.kind().name());
        for &id in self.set.data() {
            h.add_u64(id as u64);
        }
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        if self.set.size() == 0 {
            return Err(CadError::invalid(
                "ShapeFromSet",
                "selection holds no entities",
            ));
        }
        let owner = self.set.owner();
        let bundle = owner.built()?;
        let mut entities = Vec::with_capacity(self.set.size());
        for &id in self.set.data() {
            let entity = match self.set.kind() {
                EntityKind::Vertex => Shape::Vertex(*bundle.maps.vertex(id)?),
                EntityKind::Edge => Shape::Edge(bundle.maps.edge(id)?.clone()),
                EntityKind::Wire => Shape::Wire(bundle.maps.wire(id)?.clone()),
                EntityKind::Face => Shape::Face(bundle.maps.face(id)?.clone()),
                EntityKind::Shell => Shape::Shell(bundle.maps.shell(id)?.clone()),
                EntityKind::Solid => Shape::Solid(bundle.maps.solid(id)?.clone()),
            };
            entities.push(entity);
        }
        let shape = if entities.len() == 1 {
            entities.pop().unwrap()
        } else {
            Shape::Compound(entities)
        };
        Ok(ShapeBundle::new(shape))
    }
}
