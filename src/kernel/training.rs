use ndarray::{Array1, ArrayView1, ArrayView2};

use super::RbfKernel;
use crate::error::{PlumeError, Result};
use crate::linalg::{self, REGULARIZATION_EPS};

/// Black-box fitting of kernel hyperparameters to observed data.
///
/// The noise variance is held fixed; only `[lengthscale, variance]` are fitted.
pub trait HyperparameterOptimizer {
    fn optimize(
        &self,
        kernel: &RbfKernel,
        inputs: ArrayView2<f64>,
        values: ArrayView1<f64>,
    ) -> Result<[f64; 2]>;
}

/// Log marginal likelihood of `values` under a zero-mean GP with `kernel`
pub fn log_marginal_likelihood(
    kernel: &RbfKernel,
    inputs: ArrayView2<f64>,
    values: ArrayView1<f64>,
) -> Result<f64> {
    let n = inputs.nrows();
    if n == 0 {
        return Err(PlumeError::InsufficientData(
            "log marginal likelihood needs at least one observation".into(),
        ));
    }
    let mut ky = kernel.gram_sym(inputs);
    linalg::add_diagonal(&mut ky, kernel.noise + REGULARIZATION_EPS);
    let y: Array1<f64> = values.to_owned();
    let alpha = linalg::pd_solve(ky.view(), &y)?;
    let log_det = linalg::log_det_pd(ky.view())?;
    Ok(-0.5 * y.dot(&alpha) - 0.5 * log_det - 0.5 * n as f64 * (2.0 * std::f64::consts::PI).ln())
}

/// Exhaustive search over a log-spaced `(lengthscale, variance)` grid
#[derive(Clone, Debug)]
pub struct GridSearchOptimizer {
    pub lengthscales: Vec<f64>,
    pub variances: Vec<f64>,
}

impl GridSearchOptimizer {
    pub fn new(lengthscales: Vec<f64>, variances: Vec<f64>) -> Self {
        GridSearchOptimizer { lengthscales, variances }
    }
}

impl Default for GridSearchOptimizer {
    fn default() -> Self {
        GridSearchOptimizer::new(logspace(0.5, 20.0, 12), logspace(1.0, 500.0, 12))
    }
}

fn logspace(low: f64, high: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![low];
    }
    let (a, b) = (low.ln(), high.ln());
    (0..n)
        .map(|i| (a + (b - a) * i as f64 / (n - 1) as f64).exp())
        .collect()
}

impl HyperparameterOptimizer for GridSearchOptimizer {
    fn optimize(
        &self,
        kernel: &RbfKernel,
        inputs: ArrayView2<f64>,
        values: ArrayView1<f64>,
    ) -> Result<[f64; 2]> {
        if inputs.nrows() == 0 {
            return Err(PlumeError::InsufficientData(
                "cannot train kernel without observations".into(),
            ));
        }

        let mut best: Option<([f64; 2], f64)> = None;
        let mut candidate = kernel.clone();
        for &lengthscale in &self.lengthscales {
            for &variance in &self.variances {
                candidate.lengthscale = lengthscale;
                candidate.variance = variance;
                // Candidates that fail to factorize are skipped
                let Ok(lml) = log_marginal_likelihood(&candidate, inputs, values) else {
                    continue;
                };
                if best.map_or(true, |(_, b)| lml > b) {
                    best = Some(([lengthscale, variance], lml));
                }
            }
        }

        best.map(|(params, lml)| {
            tracing::debug!(lengthscale = params[0], variance = params[1], lml, "grid search finished");
            params
        })
        .ok_or_else(|| {
            PlumeError::NumericalInstability("no grid candidate produced a finite likelihood".into())
        })
    }
}
