//! Foundation types shared by every node of the CAD graph: content-hash
//! identity, the lazy build latch, and the common error type.

pub mod build;
pub mod error;
pub mod hash;

pub use build::{BuildGuard, BuildState};
pub use error::CadError;
pub use hash::{HashAccumulator, HashId};
