//! Faceted geometry backend for the CAD feature graph.
//!
//! This crate is the reference implementation of the backend contract the
//! feature graph builds against: topology values, rigid transforms (and
//! reflections), primitive builders, booleans, tessellation-based global
//! properties, view projection and shape I/O. Polyhedral work is exact;
//! curved surfaces carry analytic parameters and are evaluated through
//! deterministic tessellation. An exact kernel can replace this crate behind
//! the same surface.

pub mod boolean;
pub mod geom;
pub mod io;
pub mod mesh;
pub mod primitives;
pub mod project;
pub mod props;
pub mod topo;

pub use geom::{Ax1, Ax3, Dir, Pnt, Trsf, Vec3, TOL};
pub use topo::{Curve, CurveKind, Edge, Face, Shape, Shell, Solid, Surface, SurfaceKind, Wire};

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("{op}: {detail}")]
    Operation { op: &'static str, detail: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("format not supported by this kernel: {0}")]
    UnsupportedFormat(String),

    #[error("serialization: {0}")]
    Serde(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KernelError {
    pub fn op(op: &'static str, detail: impl Into<String>) -> Self {
        Self::Operation {
            op,
            detail: detail.into(),
        }
    }
}
