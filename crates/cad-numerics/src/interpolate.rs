//! Cubic-spline interpolation over monotone samples.
//!
//! Input is a matrix whose first column is x and whose remaining columns are
//! interpolated independently. Rows are sorted and deduplicated before the
//! splines are built. Queries outside the sample range clamp to the boundary
//! value and report which side was exceeded. Datasets with only two rows fall
//! back to linear interpolation, as does the explicit linear mode.

use nalgebra::{DMatrix, DVector};

use crate::smooth::{filter_duplicates, sorted_by_col};
use crate::NumericsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfBounds {
    Inbound,
    BelowRange,
    AboveRange,
}

pub struct Interpolator {
    /// Sorted, deduplicated samples; column 0 is x.
    xy: DMatrix<f64>,
    /// Second derivatives per y column (all zero in linear mode).
    second: Vec<DVector<f64>>,
}

impl Interpolator {
    pub fn new(samples: &DMatrix<f64>, force_linear: bool) -> Result<Self, NumericsError> {
        if samples.ncols() < 2 {
            return Err(NumericsError::TooFewSamples {
                context: "Interpolator",
                what: "columns",
                required: 2,
                got: samples.ncols(),
            });
        }
        if samples.nrows() < 2 {
            return Err(NumericsError::TooFewSamples {
                context: "Interpolator",
                what: "rows",
                required: 2,
                got: samples.nrows(),
            });
        }
        let xy = filter_duplicates(&sorted_by_col(samples, 0));
        if xy.nrows() < 2 {
            return Err(NumericsError::BadInput {
                context: "Interpolator",
                detail: format!(
                    "only {} distinct rows after deduplication of {} samples",
                    xy.nrows(),
                    samples.nrows()
                ),
            });
        }

        let linear = force_linear || xy.nrows() == 2;
        let n = xy.nrows();
        let ncol = xy.ncols() - 1;
        let mut second = Vec::with_capacity(ncol);
        for c in 0..ncol {
            if linear {
                second.push(DVector::zeros(n));
            } else {
                second.push(natural_spline_second_derivatives(&xy, c + 1));
            }
        }
        Ok(Self { xy, second })
    }

    pub fn from_columns(
        x: &DVector<f64>,
        y: &DVector<f64>,
        force_linear: bool,
    ) -> Result<Self, NumericsError> {
        if x.len() != y.len() {
            return Err(NumericsError::BadInput {
                context: "Interpolator",
                detail: format!(
                    "number of data points in x ({}) and y ({}) differs",
                    x.len(),
                    y.len()
                ),
            });
        }
        let mut xy = DMatrix::zeros(x.len(), 2);
        xy.set_column(0, x);
        xy.set_column(1, y);
        Self::new(&xy, force_linear)
    }

    pub fn column_count(&self) -> usize {
        self.xy.ncols() - 1
    }

    pub fn x_first(&self) -> f64 {
        self.xy[(0, 0)]
    }

    pub fn x_last(&self) -> f64 {
        self.xy[(self.xy.nrows() - 1, 0)]
    }

    fn check_col(&self, col: usize) -> Result<(), NumericsError> {
        if col >= self.column_count() {
            return Err(NumericsError::BadInput {
                context: "Interpolator",
                detail: format!(
                    "requested column {} of {} interpolated columns",
                    col,
                    self.column_count()
                ),
            });
        }
        Ok(())
    }

    /// Index of the segment containing x (x must be inside the range).
    fn segment(&self, x: f64) -> usize {
        let n = self.xy.nrows();
        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.xy[(mid, 0)] <= x {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn eval_segment(&self, seg: usize, col: usize, x: f64) -> f64 {
        let x0 = self.xy[(seg, 0)];
        let x1 = self.xy[(seg + 1, 0)];
        let y0 = self.xy[(seg, col + 1)];
        let y1 = self.xy[(seg + 1, col + 1)];
        let m0 = self.second[col][seg];
        let m1 = self.second[col][seg + 1];
        let h = x1 - x0;
        let a = (x1 - x) / h;
        let b = (x - x0) / h;
        a * y0 + b * y1 + ((a * a * a - a) * m0 + (b * b * b - b) * m1) * h * h / 6.0
    }

    fn deriv_segment(&self, seg: usize, col: usize, x: f64) -> f64 {
        let x0 = self.xy[(seg, 0)];
        let x1 = self.xy[(seg + 1, 0)];
        let y0 = self.xy[(seg, col + 1)];
        let y1 = self.xy[(seg + 1, col + 1)];
        let m0 = self.second[col][seg];
        let m1 = self.second[col][seg + 1];
        let h = x1 - x0;
        let a = (x1 - x) / h;
        let b = (x - x0) / h;
        (y1 - y0) / h - (3.0 * a * a - 1.0) / 6.0 * h * m0 + (3.0 * b * b - 1.0) / 6.0 * h * m1
    }

    /// Antiderivative within segment `seg` from the segment start to x.
    fn integral_from_segment_start(&self, seg: usize, col: usize, x: f64) -> f64 {
        let x0 = self.xy[(seg, 0)];
        let x1 = self.xy[(seg + 1, 0)];
        let y0 = self.xy[(seg, col + 1)];
        let y1 = self.xy[(seg + 1, col + 1)];
        let m0 = self.second[col][seg];
        let m1 = self.second[col][seg + 1];
        let h = x1 - x0;
        let b = (x - x0) / h;
        let ac = 1.0 - b; // complement at the query point
        let lin = y0 * (b - 0.5 * b * b) + y1 * 0.5 * b * b;
        let cubic_m0 = (1.0 - ac.powi(4)) / 4.0 - (1.0 - ac * ac) / 2.0;
        let cubic_m1 = b.powi(4) / 4.0 - b * b / 2.0;
        h * (lin + h * h / 6.0 * (cubic_m0 * m0 + cubic_m1 * m1))
    }

    /// Interpolated value with out-of-bounds reporting.
    pub fn y(&self, x: f64, col: usize) -> Result<(f64, OutOfBounds), NumericsError> {
        self.check_col(col)?;
        let n = self.xy.nrows();
        if x < self.x_first() {
            return Ok((self.xy[(0, col + 1)], OutOfBounds::BelowRange));
        }
        if x > self.x_last() {
            return Ok((self.xy[(n - 1, col + 1)], OutOfBounds::AboveRange));
        }
        let seg = self.segment(x);
        Ok((self.eval_segment(seg, col, x), OutOfBounds::Inbound))
    }

    /// First derivative; out-of-range queries return the boundary slope.
    pub fn dydx(&self, x: f64, col: usize) -> Result<(f64, OutOfBounds), NumericsError> {
        self.check_col(col)?;
        if x < self.x_first() {
            return Ok((
                self.deriv_segment(0, col, self.x_first()),
                OutOfBounds::BelowRange,
            ));
        }
        if x > self.x_last() {
            let n = self.xy.nrows();
            return Ok((
                self.deriv_segment(n - 2, col, self.x_last()),
                OutOfBounds::AboveRange,
            ));
        }
        let seg = self.segment(x);
        Ok((self.deriv_segment(seg, col, x), OutOfBounds::Inbound))
    }

    /// All columns at once.
    pub fn values_at(&self, x: f64) -> Result<(DVector<f64>, OutOfBounds), NumericsError> {
        let mut out = DVector::zeros(self.column_count());
        let mut oob = OutOfBounds::Inbound;
        for c in 0..self.column_count() {
            let (v, o) = self.y(x, c)?;
            out[c] = v;
            if o != OutOfBounds::Inbound {
                oob = o;
            }
        }
        Ok((out, oob))
    }

    /// Definite integral of column `col` over `[a, b]`. Sections outside the
    /// sample range contribute the clamped boundary value times their length.
    pub fn integrate(&self, a: f64, b: f64, col: usize) -> Result<f64, NumericsError> {
        self.check_col(col)?;
        if b < a {
            return Ok(-self.integrate(b, a, col)?);
        }
        let n = self.xy.nrows();
        let lo = self.x_first();
        let hi = self.x_last();
        let mut total = 0.0;
        if a < lo {
            total += (lo.min(b) - a) * self.xy[(0, col + 1)];
        }
        if b > hi {
            total += (b - hi.max(a)) * self.xy[(n - 1, col + 1)];
        }
        let ca = a.clamp(lo, hi);
        let cb = b.clamp(lo, hi);
        if cb > ca {
            let sa = self.segment(ca);
            let sb = self.segment(cb);
            if sa == sb {
                total += self.integral_from_segment_start(sa, col, cb)
                    - self.integral_from_segment_start(sa, col, ca);
            } else {
                total += self.integral_from_segment_start(sa, col, self.xy[(sa + 1, 0)])
                    - self.integral_from_segment_start(sa, col, ca);
                for seg in sa + 1..sb {
                    total += self.integral_from_segment_start(seg, col, self.xy[(seg + 1, 0)]);
                }
                total += self.integral_from_segment_start(sb, col, cb);
            }
        }
        Ok(total)
    }
}

/// Natural spline second derivatives for column `col` (absolute column index
/// into the sample matrix), via the tridiagonal Thomas algorithm.
fn natural_spline_second_derivatives(xy: &DMatrix<f64>, col: usize) -> DVector<f64> {
    let n = xy.nrows();
    let mut m = DVector::zeros(n);
    if n < 3 {
        return m;
    }
    let inner = n - 2;
    let mut diag = vec![0.0; inner];
    let mut upper = vec![0.0; inner];
    let mut lower = vec![0.0; inner];
    let mut rhs = vec![0.0; inner];
    for i in 1..n - 1 {
        let h0 = xy[(i, 0)] - xy[(i - 1, 0)];
        let h1 = xy[(i + 1, 0)] - xy[(i, 0)];
        lower[i - 1] = h0 / 6.0;
        diag[i - 1] = (h0 + h1) / 3.0;
        upper[i - 1] = h1 / 6.0;
        rhs[i - 1] = (xy[(i + 1, col)] - xy[(i, col)]) / h1
            - (xy[(i, col)] - xy[(i - 1, col)]) / h0;
    }
    // Forward sweep.
    for i in 1..inner {
        let w = lower[i] / diag[i - 1];
        diag[i] -= w * upper[i - 1];
        rhs[i] -= w * rhs[i - 1];
    }
    // Back substitution.
    let mut sol = vec![0.0; inner];
    sol[inner - 1] = rhs[inner - 1] / diag[inner - 1];
    for i in (0..inner - 1).rev() {
        sol[i] = (rhs[i] - upper[i] * sol[i + 1]) / diag[i];
    }
    for i in 0..inner {
        m[i + 1] = sol[i];
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_samples(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, 2, |r, c| {
            let x = r as f64 / (n - 1) as f64 * std::f64::consts::PI;
            if c == 0 {
                x
            } else {
                x.sin()
            }
        })
    }

    #[test]
    fn knots_reproduce_exactly() {
        let data = sine_samples(9);
        let ip = Interpolator::new(&data, false).unwrap();
        for r in 0..data.nrows() {
            let (v, oob) = ip.y(data[(r, 0)], 0).unwrap();
            assert_eq!(oob, OutOfBounds::Inbound);
            assert!((v - data[(r, 1)]).abs() < 1e-12, "knot {r}: {v}");
        }
    }

    #[test]
    fn out_of_range_clamps_and_flags() {
        let data = sine_samples(5);
        let ip = Interpolator::new(&data, false).unwrap();
        let (below, oob) = ip.y(-1.0, 0).unwrap();
        assert_eq!(oob, OutOfBounds::BelowRange);
        assert_eq!(below, data[(0, 1)]);
        let (above, oob) = ip.y(10.0, 0).unwrap();
        assert_eq!(oob, OutOfBounds::AboveRange);
        assert_eq!(above, data[(4, 1)]);
    }

    #[test]
    fn two_rows_interpolate_linearly() {
        let data = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 2.0, 5.0]);
        let ip = Interpolator::new(&data, false).unwrap();
        let (mid, _) = ip.y(1.0, 0).unwrap();
        assert!((mid - 3.0).abs() < 1e-12);
    }

    #[test]
    fn unsorted_input_is_conditioned() {
        let data = DMatrix::from_row_slice(4, 2, &[2.0, 4.0, 0.0, 0.0, 1.0, 2.0, 1.0, 2.0]);
        let ip = Interpolator::new(&data, true).unwrap();
        let (v, _) = ip.y(0.5, 0).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn spline_tracks_smooth_function_between_knots() {
        let data = sine_samples(17);
        let ip = Interpolator::new(&data, false).unwrap();
        let x = 1.0;
        let (v, _) = ip.y(x, 0).unwrap();
        assert!((v - x.sin()).abs() < 1e-3, "sin(1) ~ {v}");
        let (d, _) = ip.dydx(x, 0).unwrap();
        assert!((d - x.cos()).abs() < 1e-2, "cos(1) ~ {d}");
    }

    #[test]
    fn integral_of_constant_column() {
        let data = DMatrix::from_row_slice(3, 2, &[0.0, 2.0, 1.0, 2.0, 2.0, 2.0]);
        let ip = Interpolator::new(&data, false).unwrap();
        let integral = ip.integrate(0.0, 2.0, 0).unwrap();
        assert!((integral - 4.0).abs() < 1e-10, "integral {integral}");
        // Constant extension outside the range.
        let extended = ip.integrate(-1.0, 3.0, 0).unwrap();
        assert!((extended - 8.0).abs() < 1e-10, "extended {extended}");
    }

    #[test]
    fn single_row_is_rejected() {
        let data = DMatrix::from_row_slice(1, 2, &[0.0, 1.0]);
        assert!(Interpolator::new(&data, false).is_err());
    }
}
