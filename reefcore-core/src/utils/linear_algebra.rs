//! Linear algebra utilities.

use crate::errors::{ReefError, ReefResult};

const PIVOT_TOLERANCE: f64 = 1e-15;

/// Solve the tridiagonal system $Ax = d$ with the Thomas algorithm.
///
/// The matrix A has the form:
/// ```text
/// | b[0]  c[0]   0     0    ...   0   |
/// | a[1]  b[1]  c[1]   0    ...   0   |
/// |  0    a[2]  b[2]  c[2]  ...   0   |
/// | ...   ...   ...   ...   ...  ... |
/// |  0     0     0   a[n-1] b[n-1]   |
/// ```
///
/// `a[0]` and `c[n-1]` are ignored.
/// An empty system yields an empty solution.
///
/// # Errors
/// [`ReefError::SingularSystem`] if a zero pivot is met during the forward sweep,
/// [`ReefError::Error`] if the coefficient slices have inconsistent lengths.
///
/// # Example
/// ```
/// use reefcore_core::utils::linear_algebra::thomas_solve;
///
/// let a = vec![0.0, -1.0, -1.0];
/// let b = vec![2.0, 2.0, 2.0];
/// let c = vec![-1.0, -1.0, 0.0];
/// let d = vec![1.0, 0.0, 1.0];
///
/// let x = thomas_solve(&a, &b, &c, &d).unwrap();
/// assert!((x[0] - 1.0).abs() < 1e-10);
/// assert!((x[1] - 1.0).abs() < 1e-10);
/// assert!((x[2] - 1.0).abs() < 1e-10);
/// ```
pub fn thomas_solve(a: &[f64], b: &[f64], c: &[f64], d: &[f64]) -> ReefResult<Vec<f64>> {
    let n = b.len();
    if a.len() != n || c.len() != n || d.len() != n {
        return Err(ReefError::Error(format!(
            "tridiagonal coefficients must share a length (a={}, b={}, c={}, d={})",
            a.len(),
            n,
            c.len(),
            d.len()
        )));
    }
    if n == 0 {
        return Ok(vec![]);
    }

    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];

    if b[0].abs() <= PIVOT_TOLERANCE {
        return Err(ReefError::SingularSystem { row: 0 });
    }
    c_prime[0] = c[0] / b[0];
    d_prime[0] = d[0] / b[0];

    for i in 1..n {
        let denom = b[i] - a[i] * c_prime[i - 1];
        if denom.abs() <= PIVOT_TOLERANCE {
            return Err(ReefError::SingularSystem { row: i });
        }
        if i < n - 1 {
            c_prime[i] = c[i] / denom;
        }
        d_prime[i] = (d[i] - a[i] * d_prime[i - 1]) / denom;
    }

    let mut x = d_prime;
    for i in (0..n - 1).rev() {
        x[i] -= c_prime[i] * x[i + 1];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_thomas_diagonal() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![2.0, 4.0, 5.0];
        let c = vec![0.0, 0.0, 0.0];
        let d = vec![2.0, 8.0, 10.0];

        let x = thomas_solve(&a, &b, &c, &d).unwrap();
        assert_eq!(x, vec![1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_thomas_matches_dense_solution() {
        // 4x4 system with a known solution of [1, -1, 2, 0.5]
        let a = vec![0.0, 1.0, 1.0, 1.0];
        let b = vec![4.0, 4.0, 4.0, 4.0];
        let c = vec![1.0, 1.0, 1.0, 0.0];
        let expected = [1.0, -1.0, 2.0, 0.5];
        let d: Vec<f64> = (0..4)
            .map(|i| {
                let lower = if i > 0 { a[i] * expected[i - 1] } else { 0.0 };
                let upper = if i < 3 { c[i] * expected[i + 1] } else { 0.0 };
                lower + b[i] * expected[i] + upper
            })
            .collect();

        let x = thomas_solve(&a, &b, &c, &d).unwrap();
        for (xi, ei) in x.iter().zip(expected.iter()) {
            assert_relative_eq!(*xi, *ei, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_thomas_zero_pivot() {
        let res = thomas_solve(&[0.0, 1.0], &[0.0, 1.0], &[1.0, 0.0], &[1.0, 1.0]);
        assert!(matches!(res, Err(ReefError::SingularSystem { row: 0 })));
    }

    #[test]
    fn test_thomas_length_mismatch() {
        assert!(thomas_solve(&[0.0], &[1.0, 1.0], &[0.0, 0.0], &[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_thomas_empty() {
        assert!(thomas_solve(&[], &[], &[], &[]).unwrap().is_empty());
    }
}
