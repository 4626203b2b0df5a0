//! Error taxonomy for the CAD graph.
//!
//! Errors propagate upward to the nearest accessor caller; nodes never
//! attempt local recovery. The variants mirror the failure classes a script
//! runner needs to distinguish: bad inputs, failed geometry, stale IDs,
//! cache I/O, and the fatal build-recursion case.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CadError {
    /// Missing file, unknown extension, unsupported datum capability,
    /// empty condition list and the like.
    #[error("{node}: {reason}")]
    InvalidInput { node: String, reason: String },

    /// A geometry-backend operation did not converge or produced an invalid
    /// result.
    #[error("{node}: {op} failed: {detail}")]
    Geometry {
        node: String,
        op: String,
        detail: String,
    },

    /// An accessor was called with an ID that is not present in the named
    /// entity map.
    #[error("no {kind} with id {id} (map holds {count} entries)")]
    MissingEntity {
        kind: &'static str,
        id: usize,
        count: usize,
    },

    /// A single-face/single-edge/single-wire assertion was violated.
    #[error("{node}: {expected} required, shape does not qualify")]
    ShapeKind {
        node: String,
        expected: &'static str,
    },

    #[error("cache I/O on {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cache file exists but cannot be decoded; callers treat the entry as
    /// absent and rebuild.
    #[error("cache record {}: {detail}", path.display())]
    CacheRecord { path: PathBuf, detail: String },

    /// `Building` re-entered on the same node. Indicates a cycle, which the
    /// construction rules are supposed to make impossible; fatal.
    #[error("recursion during build of {node}")]
    BuildRecursion { node: String },

    /// Access to a node whose build already failed.
    #[error("build of {node} failed previously")]
    BuildFailed { node: String },

    /// Identifier lookup miss in a model namespace.
    #[error("no {namespace} named \"{name}\"")]
    Lookup { namespace: &'static str, name: String },

    #[error("{0}")]
    Numerics(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CadError {
    pub fn invalid(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn geometry(
        node: impl Into<String>,
        op: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Geometry {
            node: node.into(),
            op: op.into(),
            detail: detail.into(),
        }
    }
}
