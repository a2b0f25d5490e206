//! Linear solve primitives used by the coefficient solver.
//!
//! Dense work goes through `ndarray-linalg` (LAPACK); sparse LU goes through
//! `faer`. The policy of which one to try first lives in `solve_system`.

use crate::errors::BuildError;
use crate::matrix::SparseMatrix;
use faer::Mat;
use faer::linalg::solvers::Solve;
use ndarray::{Array1, Array2};
use ndarray_linalg::{Diag, Inverse, QR, SolveTriangular, UPLO};

/// Systems with fewer equations than this are always solved densely.
pub const MAX_DENSE_EQUATIONS: usize = 100;

/// A pivot of `R` smaller than this, relative to the largest pivot, marks the
/// system as rank deficient.
const RANK_TOLERANCE: f64 = 1e-12;

/// Largest relative residual `‖Ax - b‖ / ‖b‖` accepted from the sparse solver.
const SPARSE_RESIDUAL_TOLERANCE: f64 = 1e-8;

/// Solves `A x = b`, choosing the dense or sparse path from the system size.
///
/// Small systems are solved densely. Larger systems try a sparse LU first and
/// fall back to the dense solver if the sparse solve fails; a dense failure is
/// final.
pub fn solve_system(lhs: &SparseMatrix, rhs: &Array1<f64>) -> Result<Array1<f64>, BuildError> {
    if lhs.nrows() != rhs.len() {
        return Err(BuildError::SolveFailure(format!(
            "system has {} equations but the right-hand side has {} entries",
            lhs.nrows(),
            rhs.len()
        )));
    }

    if lhs.nrows() >= MAX_DENSE_EQUATIONS {
        log::debug!(
            "Computing B-spline coefficients with the sparse solver ({} equations, {} nonzeros)",
            lhs.nrows(),
            lhs.nnz()
        );
        match sparse_lu_solve(lhs, rhs) {
            Ok(solution) => return Ok(solution),
            Err(reason) => {
                log::warn!("Sparse solve failed ({reason}); falling back to the dense solver");
            }
        }
    }

    log::debug!(
        "Computing B-spline coefficients with the dense solver ({}x{})",
        lhs.nrows(),
        lhs.ncols()
    );
    dense_solve(&lhs.to_dense(), rhs)
}

/// Least-squares solve of `A x = b` through a Householder QR factorization.
///
/// Requires at least as many rows as columns and a full-rank `A`.
pub fn dense_solve(lhs: &Array2<f64>, rhs: &Array1<f64>) -> Result<Array1<f64>, BuildError> {
    let (nrows, ncols) = lhs.dim();
    if nrows < ncols {
        return Err(BuildError::SolveFailure(format!(
            "underdetermined system: {nrows} equations for {ncols} unknowns"
        )));
    }

    let (q, r) = lhs
        .qr()
        .map_err(|e| BuildError::SolveFailure(format!("QR factorization failed: {e}")))?;

    let pivots = r.diag().mapv(f64::abs);
    let largest = pivots.fold(0.0_f64, |acc, &p| acc.max(p));
    if !(largest > 0.0) || pivots.iter().any(|&p| p <= RANK_TOLERANCE * largest) {
        return Err(BuildError::SolveFailure(
            "system matrix is rank deficient".to_string(),
        ));
    }

    let qtb = q.t().dot(rhs);
    let solution = r
        .solve_triangular(UPLO::Upper, Diag::NonUnit, &qtb)
        .map_err(|e| BuildError::SolveFailure(format!("triangular solve failed: {e}")))?;

    if solution.iter().any(|v| !v.is_finite()) {
        return Err(BuildError::SolveFailure(
            "dense solve produced non-finite coefficients".to_string(),
        ));
    }
    Ok(solution)
}

/// Sparse LU solve of a square system. The error is a human-readable reason.
pub fn sparse_lu_solve(lhs: &SparseMatrix, rhs: &Array1<f64>) -> Result<Array1<f64>, String> {
    let n = lhs.nrows();
    if n != lhs.ncols() {
        return Err(format!("{}x{} system is not square", n, lhs.ncols()));
    }

    let lu = lhs
        .as_faer()
        .as_ref()
        .sp_lu()
        .map_err(|e| format!("LU factorization failed: {e:?}"))?;

    let b = Mat::from_fn(n, 1, |i, _| rhs[i]);
    let x = lu.solve(b.as_ref());
    let solution = Array1::from_shape_fn(n, |i| x[(i, 0)]);

    if solution.iter().any(|v| !v.is_finite()) {
        return Err("LU solve produced non-finite values".to_string());
    }

    let residual = (&lhs.dot(&solution) - rhs).mapv(|v| v * v).sum().sqrt();
    let scale = rhs.mapv(|v| v * v).sum().sqrt().max(f64::MIN_POSITIVE);
    if residual / scale > SPARSE_RESIDUAL_TOLERANCE {
        return Err(format!("relative residual {:.3e} too large", residual / scale));
    }
    Ok(solution)
}

/// Dense inverse of a square matrix.
pub fn dense_inverse(matrix: &Array2<f64>) -> Result<Array2<f64>, BuildError> {
    matrix
        .inv()
        .map_err(|e| BuildError::SolveFailure(format!("matrix inversion failed: {e}")))
}

pub fn trace(matrix: &Array2<f64>) -> f64 {
    matrix.diag().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::TripletBuilder;
    use ndarray::array;

    fn tridiagonal(n: usize) -> SparseMatrix {
        let mut builder = TripletBuilder::new(n, n);
        for i in 0..n {
            builder.push(i, i, 4.0);
            if i + 1 < n {
                builder.push(i, i + 1, -1.0);
                builder.push(i + 1, i, -1.0);
            }
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_dense_solve_square() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = dense_solve(&a, &b).unwrap();
        assert!(a.dot(&x).abs_diff_eq(&b, 1e-10));
    }

    #[test]
    fn test_dense_solve_least_squares() {
        // Fit a line through three collinear points.
        let a = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let b = array![1.0, 3.0, 5.0];
        let x = dense_solve(&a, &b).unwrap();
        assert!(x.abs_diff_eq(&array![1.0, 2.0], 1e-10));
    }

    #[test]
    fn test_dense_solve_rejects_singular_and_underdetermined() {
        let singular = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(
            dense_solve(&singular, &array![1.0, 2.0]),
            Err(BuildError::SolveFailure(_))
        ));

        let wide = array![[1.0, 2.0, 3.0]];
        assert!(matches!(
            dense_solve(&wide, &array![1.0]),
            Err(BuildError::SolveFailure(_))
        ));
    }

    #[test]
    fn test_sparse_and_dense_paths_agree() {
        let n = MAX_DENSE_EQUATIONS + 20;
        let a = tridiagonal(n);
        let b = Array1::from_shape_fn(n, |i| (i as f64 * 0.1).sin());

        let sparse = sparse_lu_solve(&a, &b).unwrap();
        let dense = dense_solve(&a.to_dense(), &b).unwrap();
        assert!(sparse.abs_diff_eq(&dense, 1e-10));

        let dispatched = solve_system(&a, &b).unwrap();
        assert!(a.dot(&dispatched).abs_diff_eq(&b, 1e-10));
    }

    #[test]
    fn test_sparse_solve_rejects_rectangular() {
        let mut builder = TripletBuilder::new(3, 2);
        builder.push(0, 0, 1.0);
        builder.push(2, 1, 1.0);
        let a = builder.build().unwrap();
        assert!(sparse_lu_solve(&a, &array![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_inverse_and_trace() {
        let a = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = dense_inverse(&a).unwrap();
        assert!(a.dot(&inv).abs_diff_eq(&Array2::eye(2), 1e-10));
        assert!((trace(&a) - 10.0).abs() < 1e-12);
    }
}
