//! 1-D root finding on a bracket.

use crate::NumericsError;

/// Bisection on `[a, b]`. Converges when the bracket shrinks below
/// `abs_tol + rel_tol * |x|`. Fails immediately when the function has the
/// same sign at both ends.
pub fn solve_bisection(
    f: impl Fn(f64) -> f64,
    a: f64,
    b: f64,
    abs_tol: f64,
    rel_tol: f64,
) -> Result<f64, NumericsError> {
    let (mut lo, mut hi) = if a <= b { (a, b) } else { (b, a) };
    let mut flo = f(lo);
    let fhi = f(hi);

    if flo == 0.0 {
        return Ok(lo);
    }
    if fhi == 0.0 {
        return Ok(hi);
    }
    if flo.signum() == fhi.signum() {
        return Err(NumericsError::NoBracket {
            a: lo,
            b: hi,
            fa: flo,
            fb: fhi,
        });
    }

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        let fmid = f(mid);
        if fmid == 0.0 {
            return Ok(mid);
        }
        if fmid.signum() == flo.signum() {
            lo = mid;
            flo = fmid;
        } else {
            hi = mid;
        }
        if (hi - lo) <= abs_tol + rel_tol * mid.abs() {
            break;
        }
    }
    Ok(0.5 * (lo + hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_sqrt_two() {
        let x = solve_bisection(|x| x * x - 2.0, 0.0, 2.0, 1e-12, 1e-12).unwrap();
        assert!((x - 2.0_f64.sqrt()).abs() < 1e-10, "x = {x}");
    }

    #[test]
    fn exact_root_at_bracket_end() {
        let x = solve_bisection(|x| x, 0.0, 1.0, 1e-12, 1e-12).unwrap();
        assert_eq!(x, 0.0);
    }

    #[test]
    fn equal_signs_fail_with_diagnostic() {
        let err = solve_bisection(|x| x * x + 1.0, -1.0, 1.0, 1e-9, 1e-9).unwrap_err();
        match err {
            NumericsError::NoBracket { fa, fb, .. } => {
                assert!(fa > 0.0 && fb > 0.0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn reversed_bracket_is_accepted() {
        let x = solve_bisection(|x| x - 0.25, 1.0, 0.0, 1e-12, 1e-12).unwrap();
        assert!((x - 0.25).abs() < 1e-10);
    }
}
