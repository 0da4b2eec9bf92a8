//! # Kernel Module
//!
//! Stationary covariance function used by the surrogate model. Only the
//! radial-basis family is supported; asking for anything else is a
//! configuration error surfaced at construction.
//!
//! Hyperparameters can be persisted as a flat vector `[lengthscale, variance]`
//! and trained through a pluggable [`training::HyperparameterOptimizer`].

pub mod training;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Serialize, Deserialize};
use std::fs;
use std::path::Path;

use crate::error::{PlumeError, Result};
use crate::types::DOMAIN_DIM;

pub use training::{GridSearchOptimizer, HyperparameterOptimizer};

/// Supported kernel families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelKind {
    Rbf,
}

impl KernelKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rbf" => Ok(KernelKind::Rbf),
            other => Err(PlumeError::configuration(
                "kernel".to_string(),
                format!("kernel type must be 'rbf', got '{}'", other),
            )),
        }
    }
}

/// Squared-exponential kernel `k(a, b) = σ² exp(-|a - b|² / 2ℓ²)` with
/// additive observation noise variance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RbfKernel {
    pub lengthscale: f64,
    pub variance: f64,
    pub noise: f64,
}

impl RbfKernel {
    pub fn new(lengthscale: f64, variance: f64, noise: f64) -> Result<Self> {
        validate_params(lengthscale, variance)?;
        if !(noise >= 0.0) {
            return Err(PlumeError::configuration(
                "noise".to_string(),
                format!("must be non-negative, got {}", noise),
            ));
        }
        Ok(RbfKernel { lengthscale, variance, noise })
    }

    /// Build a kernel from a family name and domain dimension
    pub fn from_kind(
        kind: &str,
        dimension: usize,
        lengthscale: f64,
        variance: f64,
        noise: f64,
    ) -> Result<Self> {
        KernelKind::from_name(kind)?;
        if dimension != DOMAIN_DIM {
            return Err(PlumeError::configuration(
                "dimension".to_string(),
                format!("environment must have dimension {}, got {}", DOMAIN_DIM, dimension),
            ));
        }
        RbfKernel::new(lengthscale, variance, noise)
    }

    pub fn kind(&self) -> KernelKind {
        KernelKind::Rbf
    }

    /// Covariance between two single points
    pub fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let sq_dist: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
        self.variance * (-0.5 * sq_dist / (self.lengthscale * self.lengthscale)).exp()
    }

    /// Cross-covariance matrix `K(A, B)` of shape `|A| x |B|`
    pub fn gram(&self, a: ArrayView2<f64>, b: ArrayView2<f64>) -> Result<Array2<f64>> {
        if a.ncols() != b.ncols() {
            return Err(PlumeError::shape(
                format!("{} input columns", a.ncols()),
                format!("{} input columns", b.ncols()),
            ));
        }
        let mut k = Array2::zeros((a.nrows(), b.nrows()));
        for (i, row_a) in a.outer_iter().enumerate() {
            for (j, row_b) in b.outer_iter().enumerate() {
                k[[i, j]] = self.eval(row_a, row_b);
            }
        }
        Ok(k)
    }

    /// Symmetric covariance matrix `K(A, A)`
    pub fn gram_sym(&self, a: ArrayView2<f64>) -> Array2<f64> {
        let n = a.nrows();
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            k[[i, i]] = self.variance;
            for j in (i + 1)..n {
                let v = self.eval(a.row(i), a.row(j));
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
        }
        k
    }

    /// Diagonal of `K(A, A)`; constant for a stationary kernel
    pub fn diag(&self, a: ArrayView2<f64>) -> Array1<f64> {
        Array1::from_elem(a.nrows(), self.variance)
    }

    /// Flat hyperparameter vector `[lengthscale, variance]`
    pub fn params(&self) -> [f64; 2] {
        [self.lengthscale, self.variance]
    }

    pub fn set_params(&mut self, params: [f64; 2]) -> Result<()> {
        validate_params(params[0], params[1])?;
        self.lengthscale = params[0];
        self.variance = params[1];
        Ok(())
    }

    /// Write the hyperparameter vector, creating the file if needed
    pub fn save_params<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string(&self.params().to_vec())?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// Replace the hyperparameters with the vector stored at `path`
    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PlumeError::NotFound(format!(
                "kernel parameter file {}",
                path.display()
            )));
        }
        let data = fs::read_to_string(path)?;
        let values: Vec<f64> = serde_json::from_str(&data)?;
        if values.len() != 2 {
            return Err(PlumeError::shape(
                "2 kernel parameters".to_string(),
                format!("{} values", values.len()),
            ));
        }
        tracing::info!(path = %path.display(), "loading kernel parameters from file");
        self.set_params([values[0], values[1]])
    }
}

fn validate_params(lengthscale: f64, variance: f64) -> Result<()> {
    if !(lengthscale > 0.0) || !lengthscale.is_finite() {
        return Err(PlumeError::configuration(
            "lengthscale".to_string(),
            format!("must be positive, got {}", lengthscale),
        ));
    }
    if !(variance > 0.0) || !variance.is_finite() {
        return Err(PlumeError::configuration(
            "variance".to_string(),
            format!("must be positive, got {}", variance),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unknown_kernel_rejected() {
        assert!(RbfKernel::from_kind("rbf", 2, 1.0, 1.0, 0.1).is_ok());
        assert!(matches!(
            RbfKernel::from_kind("matern", 2, 1.0, 1.0, 0.1),
            Err(PlumeError::Configuration { .. })
        ));
        assert!(matches!(
            RbfKernel::from_kind("rbf", 3, 1.0, 1.0, 0.1),
            Err(PlumeError::Configuration { .. })
        ));
    }

    #[test]
    fn test_gram_is_symmetric_with_variance_diagonal() {
        let kernel = RbfKernel::new(1.5, 4.0, 0.0).unwrap();
        let x = array![[0.0, 0.0], [1.0, 0.5], [-2.0, 3.0]];
        let k = kernel.gram_sym(x.view());
        let k_cross = kernel.gram(x.view(), x.view()).unwrap();
        for i in 0..3 {
            assert_eq!(k[[i, i]], 4.0);
            for j in 0..3 {
                assert!((k[[i, j]] - k[[j, i]]).abs() < 1e-15);
                assert!((k[[i, j]] - k_cross[[i, j]]).abs() < 1e-15);
            }
        }
    }

    #[test]
    fn test_empty_and_single_point_sets() {
        let kernel = RbfKernel::new(1.0, 2.0, 0.1).unwrap();
        let empty = Array2::<f64>::zeros((0, 2));
        let one = array![[1.0, 1.0]];
        assert_eq!(kernel.gram(empty.view(), one.view()).unwrap().dim(), (0, 1));
        assert_eq!(kernel.gram_sym(empty.view()).dim(), (0, 0));
        assert_eq!(kernel.diag(one.view()), array![2.0]);
    }

    #[test]
    fn test_mismatched_columns_is_shape_error() {
        let kernel = RbfKernel::new(1.0, 1.0, 0.0).unwrap();
        let a = array![[0.0, 0.0]];
        let b = array![[0.0, 0.0, 0.0]];
        assert!(matches!(kernel.gram(a.view(), b.view()), Err(PlumeError::Shape { .. })));
    }

    #[test]
    fn test_rejects_non_positive_params() {
        assert!(RbfKernel::new(0.0, 1.0, 0.0).is_err());
        assert!(RbfKernel::new(1.0, -1.0, 0.0).is_err());
        assert!(RbfKernel::new(1.0, 1.0, -0.1).is_err());
    }
}
