//! Dense linear algebra helpers for the surrogate model.
//!
//! Matrices live as `ndarray::Array2<f64>` throughout the crate; factorizations
//! are delegated to `nalgebra`, which provides a checked Cholesky decomposition.
//! Every inversion used for conditioning goes through [`regularized_inverse`],
//! which adds a diagonal jitter before factorizing and reports a
//! [`PlumeError::NumericalInstability`] instead of returning a garbage inverse.

use ndarray::{Array1, Array2, ArrayView2};
use nalgebra::linalg::Cholesky;
use nalgebra::DMatrix;

use crate::error::{PlumeError, Result};

/// Extra diagonal jitter added on top of the noise variance before inversion
pub const REGULARIZATION_EPS: f64 = 1e-8;

pub fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn ensure_square(a: ArrayView2<f64>, what: &str) -> Result<usize> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(PlumeError::shape(
            format!("square {}", what),
            format!("{}x{}", rows, cols),
        ));
    }
    Ok(rows)
}

/// Add `jitter` to every diagonal entry in place
pub fn add_diagonal(a: &mut Array2<f64>, jitter: f64) {
    let n = a.nrows().min(a.ncols());
    for i in 0..n {
        a[[i, i]] += jitter;
    }
}

/// Replace `a` with `(a + aᵗ) / 2` to remove round-off asymmetry
pub fn symmetrize(a: &mut Array2<f64>) {
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (a[[i, j]] + a[[j, i]]);
            a[[i, j]] = avg;
            a[[j, i]] = avg;
        }
    }
}

fn factorize(a: ArrayView2<f64>, what: &str) -> Result<Cholesky<f64, nalgebra::Dyn>> {
    Cholesky::new(to_dmatrix(a)).ok_or_else(|| {
        PlumeError::NumericalInstability(format!(
            "{} ({}x{}) is not positive definite",
            what,
            a.nrows(),
            a.ncols()
        ))
    })
}

/// Lower-triangular Cholesky factor `L` with `L Lᵗ = a`
pub fn cholesky_lower(a: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n = ensure_square(a, "matrix for Cholesky")?;
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    let chol = factorize(a, "matrix")?;
    Ok(to_array2(&chol.l()))
}

/// Inverse of a symmetric positive-definite matrix via its Cholesky factor
pub fn pd_inverse(a: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n = ensure_square(a, "matrix for inversion")?;
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    let chol = factorize(a, "matrix")?;
    let mut inv = to_array2(&chol.inverse());
    symmetrize(&mut inv);
    Ok(inv)
}

/// `(a + jitter·I)^{-1}`
pub fn regularized_inverse(a: ArrayView2<f64>, jitter: f64) -> Result<Array2<f64>> {
    let mut reg = a.to_owned();
    add_diagonal(&mut reg, jitter);
    pd_inverse(reg.view())
}

/// Solve `a x = b` for symmetric positive-definite `a`
pub fn pd_solve(a: ArrayView2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = ensure_square(a, "system matrix")?;
    if b.len() != n {
        return Err(PlumeError::shape(
            format!("right-hand side of length {}", n),
            format!("length {}", b.len()),
        ));
    }
    if n == 0 {
        return Ok(Array1::zeros(0));
    }
    let chol = factorize(a, "system matrix")?;
    let rhs = nalgebra::DVector::from_iterator(n, b.iter().copied());
    let x = chol.solve(&rhs);
    Ok(Array1::from_iter(x.iter().copied()))
}

/// `log det(a)` of a positive-definite matrix
pub fn log_det_pd(a: ArrayView2<f64>) -> Result<f64> {
    let n = ensure_square(a, "matrix for determinant")?;
    if n == 0 {
        return Ok(0.0);
    }
    let chol = factorize(a, "matrix")?;
    let l = chol.l();
    Ok(2.0 * (0..n).map(|i| l[(i, i)].ln()).sum::<f64>())
}

/// Spectral condition number of a symmetric matrix.
///
/// Returns `f64::INFINITY` when the smallest eigenvalue is not strictly positive.
pub fn condition_estimate(a: ArrayView2<f64>) -> Result<f64> {
    let n = ensure_square(a, "matrix for conditioning")?;
    if n == 0 {
        return Ok(1.0);
    }
    let eigenvalues = to_dmatrix(a).symmetric_eigenvalues();
    let max = eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    if !(min > 0.0) || !max.is_finite() {
        return Ok(f64::INFINITY);
    }
    Ok(max / min)
}
