//! Nonlinear least-squares regression over a user-supplied model.

use nalgebra::DVector;

use crate::minimize::{minimize_nelder_mead, MinimizeOptions};
use crate::NumericsError;

/// A parametric model `y = g(x; p)` with a fixed parameter count.
pub trait RegressionModel {
    fn parameter_count(&self) -> usize;
    fn initial_parameters(&self) -> DVector<f64>;
    fn evaluate(&self, params: &DVector<f64>, x: f64) -> f64;
}

/// Fit `model` to weighted samples by minimizing the sum of squared
/// residuals. Returns `(parameters, residual_sum)`.
pub fn nonlinear_regression(
    model: &dyn RegressionModel,
    x: &[f64],
    y: &[f64],
    weights: Option<&[f64]>,
) -> Result<(DVector<f64>, f64), NumericsError> {
    if x.len() != y.len() {
        return Err(NumericsError::BadInput {
            context: "nonlinear_regression",
            detail: format!("{} x samples vs {} y samples", x.len(), y.len()),
        });
    }
    if x.is_empty() {
        return Err(NumericsError::TooFewSamples {
            context: "nonlinear_regression",
            what: "samples",
            required: 1,
            got: 0,
        });
    }
    if let Some(w) = weights {
        if w.len() != x.len() {
            return Err(NumericsError::BadInput {
                context: "nonlinear_regression",
                detail: format!("{} weights for {} samples", w.len(), x.len()),
            });
        }
    }

    let objective = |p: &DVector<f64>| -> f64 {
        let mut q = 0.0;
        for (i, (&xi, &yi)) in x.iter().zip(y.iter()).enumerate() {
            let w = weights.map_or(1.0, |w| w[i]);
            let r = model.evaluate(p, xi) - yi;
            q += w * r * r;
        }
        q
    };

    let p0 = model.initial_parameters();
    if p0.len() != model.parameter_count() {
        return Err(NumericsError::BadInput {
            context: "nonlinear_regression",
            detail: format!(
                "initial vector has {} entries for {} parameters",
                p0.len(),
                model.parameter_count()
            ),
        });
    }

    let opts = MinimizeOptions {
        tol: 1e-10,
        ..Default::default()
    };
    let best = minimize_nelder_mead(&objective, &p0, &opts)?;
    let q = objective(&best);
    Ok((best, q))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line;

    impl RegressionModel for Line {
        fn parameter_count(&self) -> usize {
            2
        }
        fn initial_parameters(&self) -> DVector<f64> {
            DVector::from_vec(vec![0.0, 0.0])
        }
        fn evaluate(&self, p: &DVector<f64>, x: f64) -> f64 {
            p[0] + p[1] * x
        }
    }

    #[test]
    fn recovers_exact_line() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&x| 3.0 + 2.0 * x).collect();
        let (p, q) = nonlinear_regression(&Line, &x, &y, None).unwrap();
        assert!((p[0] - 3.0).abs() < 1e-3, "intercept {}", p[0]);
        assert!((p[1] - 2.0).abs() < 1e-3, "slope {}", p[1]);
        assert!(q < 1e-6, "residual {q}");
    }

    #[test]
    fn zero_weight_ignores_outlier() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![1.0, 2.0, 3.0, 100.0];
        let w = vec![1.0, 1.0, 1.0, 0.0];
        let (p, _) = nonlinear_regression(&Line, &x, &y, Some(&w)).unwrap();
        assert!((p[0] - 1.0).abs() < 1e-3);
        assert!((p[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn sample_count_mismatch_is_rejected() {
        assert!(nonlinear_regression(&Line, &[1.0], &[1.0, 2.0], None).is_err());
    }
}
