//! Model container and postprocessing layer.
//!
//! A `Model` binds identifiers to graph nodes in disjoint namespaces. It is
//! itself a lazy node: a model constructed from script text defers to the
//! `ScriptCompiler` collaborator on first access, so a whole script
//! evaluates only when something in it is needed.

pub mod actions;
pub mod dxf;
pub mod export;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cad_base::{BuildGuard, CadError, HashAccumulator, HashId};
use cad_graph::datum::DatumRef;
use cad_graph::featureset::FeatureSetRef;
use cad_graph::{FeatureRef, ScalarRef, VectorRef};
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

pub use actions::{ExportEMesh, ExportShape, ExportStl, ExportView, PostprocAction, PostprocActionRef};

/// Collaborator seam: turns a textual model definition into bindings on a
/// `Model`. The core ships without an implementation.
pub trait ScriptCompiler {
    fn populate(&self, model: &Model, source: &str) -> Result<(), CadError>;
}

#[derive(Default)]
struct Tables {
    scalars: IndexMap<String, ScalarRef>,
    vectors: IndexMap<String, VectorRef>,
    datums: IndexMap<String, DatumRef>,
    modelsteps: IndexMap<String, FeatureRef>,
    components: IndexSet<String>,
    vertex_sets: IndexMap<String, FeatureSetRef>,
    edge_sets: IndexMap<String, FeatureSetRef>,
    face_sets: IndexMap<String, FeatureSetRef>,
    solid_sets: IndexMap<String, FeatureSetRef>,
    models: IndexMap<String, Rc<Model>>,
    postproc: IndexMap<String, PostprocActionRef>,
}

pub struct Model {
    guard: BuildGuard,
    name: String,
    script: Option<(String, Rc<dyn ScriptCompiler>)>,
    tables: RefCell<Tables>,
    unnamed_counter: Cell<usize>,
}

macro_rules! table_accessors {
    ($add:ident, $add_if:ident, $lookup:ident, $symbols:ident, $all:ident,
     $table:ident, $ty:ty, $what:literal) => {
        pub fn $add(&self, name: impl Into<String>, value: $ty) {
            self.tables.borrow_mut().$table.insert(name.into(), value);
        }

        pub fn $add_if(&self, name: impl Into<String>, value: $ty) {
            let mut tables = self.tables.borrow_mut();
            let name = name.into();
            if !tables.$table.contains_key(&name) {
                tables.$table.insert(name, value);
            }
        }

        pub fn $lookup(&self, name: &str) -> Result<$ty, CadError> {
            self.ensure_populated()?;
            self.tables
                .borrow()
                .$table
                .get(name)
                .cloned()
                .ok_or_else(|| CadError::Lookup {
                    namespace: $what,
                    name: name.to_string(),
                })
        }

        pub fn $symbols(&self) -> Result<Vec<String>, CadError> {
            self.ensure_populated()?;
            Ok(self.tables.borrow().$table.keys().cloned().collect())
        }

        pub fn $all(&self) -> Result<IndexMap<String, $ty>, CadError> {
            self.ensure_populated()?;
            Ok(self.tables.borrow().$table.clone())
        }
    };
}

impl Model {
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            guard: BuildGuard::new(),
            name: name.into(),
            script: None,
            tables: RefCell::new(Tables::default()),
            unnamed_counter: Cell::new(0),
        })
    }

    /// A model whose bindings come from script text, compiled on first
    /// access.
    pub fn from_script(
        name: impl Into<String>,
        source: impl Into<String>,
        compiler: Rc<dyn ScriptCompiler>,
    ) -> Rc<Self> {
        Rc::new(Self {
            guard: BuildGuard::new(),
            name: name.into(),
            script: Some((source.into(), compiler)),
            tables: RefCell::new(Tables::default()),
            unnamed_counter: Cell::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash_id(&self) -> HashId {
        self.guard.hash_with(|| {
            let mut h = HashAccumulator::new();
            h.add_str("Model");
            h.add_str(&self.name);
            if let Some((source, _)) = &self.script {
                h.add_str(source);
            }
            h.finish()
        })
    }

    /// Run the deferred script compilation, once.
    pub fn ensure_populated(&self) -> Result<(), CadError> {
        self.guard.ensure(&self.name, || {
            if let Some((source, compiler)) = &self.script {
                debug!(target: "model", model = %self.name, bytes = source.len(), "script_compile");
                compiler.populate(self, source)?;
            }
            Ok(())
        })
    }

    table_accessors!(
        add_scalar,
        add_scalar_if_not_present,
        lookup_scalar,
        scalar_symbols,
        scalars,
        scalars,
        ScalarRef,
        "scalar"
    );
    table_accessors!(
        add_vector,
        add_vector_if_not_present,
        lookup_vector,
        vector_symbols,
        vectors,
        vectors,
        VectorRef,
        "vector"
    );
    table_accessors!(
        add_datum,
        add_datum_if_not_present,
        lookup_datum,
        datum_symbols,
        datums,
        datums,
        DatumRef,
        "datum"
    );
    table_accessors!(
        add_modelstep,
        add_modelstep_if_not_present,
        lookup_modelstep,
        modelstep_symbols,
        modelsteps,
        modelsteps,
        FeatureRef,
        "model step"
    );
    table_accessors!(
        add_vertex_feature,
        add_vertex_feature_if_not_present,
        lookup_vertex_feature,
        vertex_feature_symbols,
        vertex_features,
        vertex_sets,
        FeatureSetRef,
        "vertex selection"
    );
    table_accessors!(
        add_edge_feature,
        add_edge_feature_if_not_present,
        lookup_edge_feature,
        edge_feature_symbols,
        edge_features,
        edge_sets,
        FeatureSetRef,
        "edge selection"
    );
    table_accessors!(
        add_face_feature,
        add_face_feature_if_not_present,
        lookup_face_feature,
        face_feature_symbols,
        face_features,
        face_sets,
        FeatureSetRef,
        "face selection"
    );
    table_accessors!(
        add_solid_feature,
        add_solid_feature_if_not_present,
        lookup_solid_feature,
        solid_feature_symbols,
        solid_features,
        solid_sets,
        FeatureSetRef,
        "solid selection"
    );
    table_accessors!(
        add_model,
        add_model_if_not_present,
        lookup_model,
        model_symbols,
        models,
        models,
        Rc<Model>,
        "submodel"
    );
    table_accessors!(
        add_postproc_action,
        add_postproc_action_if_not_present,
        lookup_postproc_action,
        postproc_action_symbols,
        postproc_actions,
        postproc,
        PostprocActionRef,
        "postprocessing action"
    );

    pub fn remove_scalar(&self, name: &str) {
        self.tables.borrow_mut().scalars.shift_remove(name);
    }

    /// A model step additionally marked as a visible component.
    pub fn add_component(&self, name: impl Into<String>, value: FeatureRef) {
        let name = name.into();
        self.tables.borrow_mut().components.insert(name.clone());
        self.add_modelstep(name, value);
    }

    pub fn components(&self) -> Result<Vec<String>, CadError> {
        self.ensure_populated()?;
        Ok(self.tables.borrow().components.iter().cloned().collect())
    }

    pub fn add_postproc_action_unnamed(&self, value: PostprocActionRef) -> String {
        let n = self.unnamed_counter.get() + 1;
        self.unnamed_counter.set(n);
        let name = format!("action{n}");
        self.add_postproc_action(name.clone(), value);
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_graph::scalar_const;
    use cad_graph::Scalar;

    #[test]
    fn lookup_after_add_and_miss_error() {
        let m = Model::new("m");
        m.add_scalar("a", scalar_const(1.5));
        assert_eq!(m.lookup_scalar("a").unwrap().value().unwrap(), 1.5);
        let err = m.lookup_scalar("b").unwrap_err();
        assert!(matches!(err, CadError::Lookup { namespace: "scalar", .. }));
    }

    #[test]
    fn add_if_not_present_keeps_the_first_binding() {
        let m = Model::new("m");
        m.add_scalar("a", scalar_const(1.0));
        m.add_scalar_if_not_present("a", scalar_const(2.0));
        assert_eq!(m.lookup_scalar("a").unwrap().value().unwrap(), 1.0);
        m.add_scalar("a", scalar_const(3.0));
        assert_eq!(m.lookup_scalar("a").unwrap().value().unwrap(), 3.0);
    }

    #[test]
    fn remove_scalar_forgets_the_binding() {
        let m = Model::new("m");
        m.add_scalar("a", scalar_const(1.0));
        m.remove_scalar("a");
        assert!(m.lookup_scalar("a").is_err());
    }

    #[test]
    fn symbols_keep_insertion_order() {
        let m = Model::new("m");
        m.add_scalar("z", scalar_const(1.0));
        m.add_scalar("a", scalar_const(2.0));
        assert_eq!(m.scalar_symbols().unwrap(), vec!["z", "a"]);
    }

    #[test]
    fn script_model_compiles_on_first_access() {
        struct FakeCompiler;
        impl ScriptCompiler for FakeCompiler {
            fn populate(&self, model: &Model, source: &str) -> Result<(), CadError> {
                model.add_scalar(source.trim(), scalar_const(42.0));
                Ok(())
            }
        }
        let m = Model::from_script("m", "x", Rc::new(FakeCompiler));
        assert_eq!(m.lookup_scalar("x").unwrap().value().unwrap(), 42.0);
    }

    #[test]
    fn failing_script_surfaces_on_lookup() {
        struct Broken;
        impl ScriptCompiler for Broken {
            fn populate(&self, _model: &Model, _source: &str) -> Result<(), CadError> {
                Err(CadError::invalid("script", "syntax error"))
            }
        }
        let m = Model::from_script("m", "bad", Rc::new(Broken));
        assert!(m.lookup_scalar("x").is_err());
        // Second access reports the latched failure.
        assert!(matches!(
            m.lookup_scalar("x").unwrap_err(),
            CadError::BuildFailed { .. }
        ));
    }

    #[test]
    fn unnamed_actions_get_sequential_names() {
        struct Nop;
        impl PostprocAction for Nop {
            fn type_name(&self) -> &'static str {
                "Nop"
            }
            fn execute(&self) -> Result<(), CadError> {
                Ok(())
            }
        }
        let m = Model::new("m");
        assert_eq!(m.add_postproc_action_unnamed(Rc::new(Nop)), "action1");
        assert_eq!(m.add_postproc_action_unnamed(Rc::new(Nop)), "action2");
        assert_eq!(m.postproc_action_symbols().unwrap().len(), 2);
    }
}
