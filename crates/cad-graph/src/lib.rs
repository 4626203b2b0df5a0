//! Parametric CAD feature graph: lazy, content-addressed nodes producing
//! shapes, topological name tables, datums and numeric outputs on demand.
//!
//! Nodes come in three families sharing the same build-once protocol:
//! parameter suppliers (`params`), datums (`datum`) and features
//! (`feature`, `features`). Selections and the filter algebra live in
//! `featureset`/`filter`; built shapes are memoized on disk through the
//! process cache handle.

pub mod cache_handle;
pub mod datum;
pub mod feature;
pub mod features;
pub mod featureset;
pub mod filter;
pub mod params;
pub mod topomaps;

pub use datum::{Datum, DatumExt, DatumRef};
pub use feature::{Feature, FeatureCore, FeatureExt, FeatureRef, ShapeBundle, ShapeFeature};
pub use featureset::{FeatureSet, FeatureSetData, FeatureSetRef};
pub use filter::{Filter, QueryCompiler};
pub use params::{scalar_const, vector_const, Scalar, ScalarRef, Vector, VectorRef};
pub use topomaps::{EntityKind, FeatureId, TopoMaps};
