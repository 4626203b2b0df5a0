//! Unconstrained N-D minimization by downhill simplex (Nelder–Mead).

use nalgebra::DVector;
use tracing::warn;

use crate::NumericsError;

pub struct MinimizeOptions {
    /// Per-dimension offsets spanning the initial simplex. Length must match
    /// the start vector; defaults to 0.1 in every dimension.
    pub steps: Option<DVector<f64>>,
    /// Convergence threshold on the simplex size (mean vertex distance from
    /// the centroid).
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            steps: None,
            tol: 1e-6,
            max_iter: 10_000,
        }
    }
}

fn simplex_size(vertices: &[DVector<f64>]) -> f64 {
    let n = vertices.len();
    let dim = vertices[0].len();
    let mut centroid = DVector::zeros(dim);
    for v in vertices {
        centroid += v;
    }
    centroid /= n as f64;
    vertices.iter().map(|v| (v - &centroid).norm()).sum::<f64>() / n as f64
}

/// Minimize `f` starting from `x0`. Returns the best vertex found. Hitting
/// the iteration cap is reported as a warning, not an error; the caller gets
/// the best-so-far point either way.
pub fn minimize_nelder_mead(
    f: impl Fn(&DVector<f64>) -> f64,
    x0: &DVector<f64>,
    opts: &MinimizeOptions,
) -> Result<DVector<f64>, NumericsError> {
    let n = x0.len();
    if n == 0 {
        return Err(NumericsError::BadInput {
            context: "minimize_nelder_mead",
            detail: "empty start vector".into(),
        });
    }
    if let Some(steps) = &opts.steps {
        if steps.len() != n {
            return Err(NumericsError::BadInput {
                context: "minimize_nelder_mead",
                detail: format!("{} steps for {} dimensions", steps.len(), n),
            });
        }
    }

    // Standard reflection/expansion/contraction/shrink coefficients.
    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    let mut vertices: Vec<DVector<f64>> = Vec::with_capacity(n + 1);
    vertices.push(x0.clone());
    for i in 0..n {
        let mut v = x0.clone();
        v[i] += opts.steps.as_ref().map_or(0.1, |s| s[i]);
        vertices.push(v);
    }
    let mut values: Vec<f64> = vertices.iter().map(&f).collect();

    let mut iter = 0;
    loop {
        // Order vertices by objective value.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let sorted: Vec<DVector<f64>> = order.iter().map(|&i| vertices[i].clone()).collect();
        let sorted_vals: Vec<f64> = order.iter().map(|&i| values[i]).collect();
        vertices = sorted;
        values = sorted_vals;

        if simplex_size(&vertices) <= opts.tol {
            break;
        }
        if iter >= opts.max_iter {
            warn!(
                target: "numerics.minimize",
                iterations = iter,
                best = values[0],
                "iteration_cap_reached"
            );
            break;
        }
        iter += 1;

        // Centroid of all but the worst vertex.
        let mut centroid = DVector::zeros(n);
        for v in vertices.iter().take(n) {
            centroid += v;
        }
        centroid /= n as f64;

        let worst = vertices[n].clone();
        let reflected = &centroid + (&centroid - &worst) * ALPHA;
        let fr = f(&reflected);

        if fr < values[0] {
            let expanded = &centroid + (&reflected - &centroid) * GAMMA;
            let fe = f(&expanded);
            if fe < fr {
                vertices[n] = expanded;
                values[n] = fe;
            } else {
                vertices[n] = reflected;
                values[n] = fr;
            }
        } else if fr < values[n - 1] {
            vertices[n] = reflected;
            values[n] = fr;
        } else {
            let contracted = if fr < values[n] {
                &centroid + (&reflected - &centroid) * RHO
            } else {
                &centroid + (&worst - &centroid) * RHO
            };
            let fc = f(&contracted);
            if fc < values[n].min(fr) {
                vertices[n] = contracted;
                values[n] = fc;
            } else {
                // Shrink toward the best vertex.
                let best = vertices[0].clone();
                for i in 1..=n {
                    let shrunk = &best + (&vertices[i] - &best) * SIGMA;
                    vertices[i] = shrunk;
                    values[i] = f(&vertices[i]);
                }
            }
        }
    }

    Ok(vertices[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_bowl_converges_to_center() {
        let x0 = DVector::from_vec(vec![5.0, -3.0]);
        let x = minimize_nelder_mead(
            |x| (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2),
            &x0,
            &MinimizeOptions::default(),
        )
        .unwrap();
        assert!((x[0] - 1.0).abs() < 1e-3, "x0 = {}", x[0]);
        assert!((x[1] + 2.0).abs() < 1e-3, "x1 = {}", x[1]);
    }

    #[test]
    fn custom_steps_are_honored() {
        let x0 = DVector::from_vec(vec![0.0]);
        let opts = MinimizeOptions {
            steps: Some(DVector::from_vec(vec![100.0])),
            ..Default::default()
        };
        let x = minimize_nelder_mead(|x| (x[0] - 40.0).powi(2), &x0, &opts).unwrap();
        assert!((x[0] - 40.0).abs() < 1e-2, "x = {}", x[0]);
    }

    #[test]
    fn step_dimension_mismatch_is_rejected() {
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let opts = MinimizeOptions {
            steps: Some(DVector::from_vec(vec![1.0])),
            ..Default::default()
        };
        assert!(minimize_nelder_mead(|x| x.norm_squared(), &x0, &opts).is_err());
    }
}
