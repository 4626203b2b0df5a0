//! Numerical utilities backing the CAD graph: bracketed 1-D root finding,
//! downhill-simplex minimization, nonlinear regression, spline
//! interpolation with clamped extrapolation, and moving-average smoothing.
//!
//! Failure diagnostics carry the supplied data sizes (and, where it helps,
//! the samples) so a failed fit can be reproduced from the log alone.

pub mod interpolate;
pub mod minimize;
pub mod regression;
pub mod smooth;
pub mod solve;

pub use interpolate::{Interpolator, OutOfBounds};
pub use minimize::{minimize_nelder_mead, MinimizeOptions};
pub use regression::{nonlinear_regression, RegressionModel};
pub use smooth::{filter_duplicates, moving_average, sorted_by_col};
pub use solve::solve_bisection;

#[derive(Debug, thiserror::Error)]
pub enum NumericsError {
    #[error("no sign change on bracket [{a}, {b}]: f(a)={fa}, f(b)={fb}")]
    NoBracket { a: f64, b: f64, fa: f64, fb: f64 },

    #[error("{context}: needs at least {required} {what}, got {got}")]
    TooFewSamples {
        context: &'static str,
        what: &'static str,
        required: usize,
        got: usize,
    },

    #[error("{context}: {detail}")]
    BadInput {
        context: &'static str,
        detail: String,
    },
}
