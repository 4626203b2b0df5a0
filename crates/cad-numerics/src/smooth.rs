//! Time-series smoothing and sample-matrix conditioning helpers.

use nalgebra::DMatrix;

use crate::NumericsError;

/// Rows reordered so column `c` ascends.
pub fn sorted_by_col(m: &DMatrix<f64>, c: usize) -> DMatrix<f64> {
    let mut order: Vec<usize> = (0..m.nrows()).collect();
    order.sort_by(|&a, &b| m[(a, c)].total_cmp(&m[(b, c)]));
    let mut out = DMatrix::zeros(m.nrows(), m.ncols());
    for (dst, &src) in order.iter().enumerate() {
        out.set_row(dst, &m.row(src));
    }
    out
}

/// Drop rows that repeat their predecessor (within 1e-8 over all columns).
pub fn filter_duplicates(m: &DMatrix<f64>) -> DMatrix<f64> {
    if m.nrows() == 0 {
        return m.clone();
    }
    let mut keep: Vec<usize> = vec![0];
    for r in 1..m.nrows() {
        let prev = *keep.last().unwrap();
        let dist: f64 = (m.row(r) - m.row(prev)).norm();
        if dist > 1e-8 {
            keep.push(r);
        }
    }
    let mut out = DMatrix::zeros(keep.len(), m.ncols());
    for (dst, &src) in keep.iter().enumerate() {
        out.set_row(dst, &m.row(src));
    }
    out
}

/// Moving average over a time series whose first column is time.
///
/// `fraction` sets the window as a fraction of the total time span;
/// `center_window` centers the window on the output sample instead of
/// trailing it. Non-uniform sampling is handled by trapezoidal averaging
/// within the window; empty windows fall back to the closest row.
pub fn moving_average(
    time_profs: &DMatrix<f64>,
    fraction: f64,
    center_window: bool,
) -> Result<DMatrix<f64>, NumericsError> {
    if time_profs.ncols() < 2 {
        return Err(NumericsError::TooFewSamples {
            context: "moving_average",
            what: "columns",
            required: 2,
            got: time_profs.ncols(),
        });
    }
    if time_profs.nrows() <= 1 {
        return Ok(time_profs.clone());
    }

    let n_raw = time_profs.nrows();
    let times = time_profs.column(0);
    let x0 = times.min();
    let dx_raw = times.max() - x0;
    let window = fraction * dx_raw;
    let avgdx = dx_raw / n_raw as f64;

    let n_avg = n_raw.min(((dx_raw - window) / avgdx).max(2.0) as usize);
    let window_ofs = if center_window { window / 2.0 } else { window };

    let mut result = DMatrix::zeros(n_avg, time_profs.ncols());
    for i in 0..n_avg {
        let x = x0 + window_ofs + i as f64 * avgdx;
        let from = x - window_ofs;
        let to = from + window;
        result[(i, 0)] = x;

        let selected: Vec<usize> = (0..n_raw)
            .filter(|&r| times[r] >= from && times[r] <= to)
            .collect();

        if selected.is_empty() {
            // Nothing in the window: take the closest row.
            let mid = 0.5 * (from + to);
            let closest = (0..n_raw)
                .min_by(|&a, &b| {
                    (times[a] - mid).abs().total_cmp(&(times[b] - mid).abs())
                })
                .unwrap();
            for j in 1..time_profs.ncols() {
                result[(i, j)] = time_profs[(closest, j)];
            }
        } else if selected.len() == 1 {
            for j in 1..time_profs.ncols() {
                result[(i, j)] = time_profs[(selected[0], j)];
            }
        } else {
            let span = times[*selected.last().unwrap()] - times[selected[0]];
            for j in 1..time_profs.ncols() {
                let mut integral = 0.0;
                for k in 1..selected.len() {
                    let (ra, rb) = (selected[k - 1], selected[k]);
                    integral += 0.5 * (time_profs[(rb, j)] + time_profs[(ra, j)])
                        * (times[rb] - times[ra]);
                }
                result[(i, j)] = integral / span;
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_orders_rows_by_key_column() {
        let m = DMatrix::from_row_slice(3, 2, &[2.0, 20.0, 0.0, 0.0, 1.0, 10.0]);
        let s = sorted_by_col(&m, 0);
        assert_eq!(s[(0, 0)], 0.0);
        assert_eq!(s[(1, 1)], 10.0);
        assert_eq!(s[(2, 1)], 20.0);
    }

    #[test]
    fn duplicate_rows_are_dropped() {
        let m = DMatrix::from_row_slice(4, 2, &[0.0, 1.0, 0.0, 1.0, 1.0, 2.0, 1.0, 2.0]);
        let f = filter_duplicates(&m);
        assert_eq!(f.nrows(), 2);
    }

    #[test]
    fn constant_series_averages_to_itself() {
        let m = DMatrix::from_fn(20, 2, |r, c| if c == 0 { r as f64 } else { 7.0 });
        let avg = moving_average(&m, 0.2, true).unwrap();
        for i in 0..avg.nrows() {
            assert!((avg[(i, 1)] - 7.0).abs() < 1e-9, "row {i}: {}", avg[(i, 1)]);
        }
    }

    #[test]
    fn single_row_passes_through() {
        let m = DMatrix::from_row_slice(1, 2, &[0.0, 3.0]);
        let avg = moving_average(&m, 0.5, false).unwrap();
        assert_eq!(avg, m);
    }

    #[test]
    fn missing_value_columns_are_rejected() {
        let m = DMatrix::from_row_slice(3, 1, &[0.0, 1.0, 2.0]);
        assert!(moving_average(&m, 0.5, false).is_err());
    }
}
