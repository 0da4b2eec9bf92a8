//! # Online Gaussian Process Module
//!
//! [`OnlineGp`] is the agent's surrogate model of the unknown field. It keeps
//! the inverse of the regularized Gram matrix `(K + noise·I)^{-1}` (the
//! "Woodbury inverse") and the vector `W·y` so that posterior queries never
//! re-solve the full system.
//!
//! New observations are folded in with the block-matrix (Schur complement)
//! identity: only a `|new| x |new|` matrix is factorized per update. When the
//! Schur complement is badly conditioned the model refactorizes the full
//! Gram matrix instead.
//!
//! Derived quantities (posterior mean and covariance at the training inputs,
//! the Cholesky factor of the Woodbury inverse, the Gram matrix itself) are
//! held in [`Cached`] slots and reset on every mutation.

pub mod cache;

use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Serialize, Deserialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::debug::numerical_check::{self, NumericalIssue};
use crate::error::{PlumeError, Result};
use crate::kernel::{HyperparameterOptimizer, RbfKernel};
use crate::linalg::{self, REGULARIZATION_EPS};
use crate::types::{points_to_array, Extent, Point, DOMAIN_DIM};

pub use cache::Cached;

/// Schur complements with a larger spectral condition number trigger a
/// full batch refactorization.
pub const DEFAULT_CONDITION_THRESHOLD: f64 = 1e12;

/// How new observations are folded into the Woodbury inverse
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStrategy {
    /// Block-matrix update; cost scales with the size of the new block
    Incremental,
    /// Refactorize the full regularized Gram matrix
    Batch,
}

/// Counters for how the posterior has been rebuilt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub incremental: usize,
    pub batch: usize,
    pub fallbacks: usize,
}

/// Incrementally updated Gaussian-process regressor over the 2-D domain
#[derive(Clone, Debug)]
pub struct OnlineGp {
    kernel: RbfKernel,
    inputs: Array2<f64>,
    values: Array1<f64>,
    woodbury_inv: Array2<f64>,
    woodbury_vector: Array1<f64>,
    gram: Cached<Array2<f64>>,
    mean: Cached<Array1<f64>>,
    covariance: Cached<Array2<f64>>,
    woodbury_chol: Cached<Array2<f64>>,
    condition_threshold: f64,
    stats: UpdateStats,
}

/// Serializable checkpoint of a model: kernel plus raw observations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpSnapshot {
    pub kernel: RbfKernel,
    pub inputs: Array2<f64>,
    pub values: Array1<f64>,
    pub condition_threshold: f64,
}

impl OnlineGp {
    /// Create an empty model that predicts the prior everywhere
    pub fn new(kernel: RbfKernel) -> Self {
        OnlineGp {
            kernel,
            inputs: Array2::zeros((0, DOMAIN_DIM)),
            values: Array1::zeros(0),
            woodbury_inv: Array2::zeros((0, 0)),
            woodbury_vector: Array1::zeros(0),
            gram: Cached::Unknown,
            mean: Cached::Unknown,
            covariance: Cached::Unknown,
            woodbury_chol: Cached::Unknown,
            condition_threshold: DEFAULT_CONDITION_THRESHOLD,
            stats: UpdateStats::default(),
        }
    }

    pub fn with_condition_threshold(mut self, threshold: f64) -> Self {
        self.condition_threshold = threshold;
        self
    }

    pub fn kernel(&self) -> &RbfKernel {
        &self.kernel
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn inputs(&self) -> ArrayView2<f64> {
        self.inputs.view()
    }

    pub fn values(&self) -> ArrayView1<f64> {
        self.values.view()
    }

    pub fn woodbury_inv(&self) -> ArrayView2<f64> {
        self.woodbury_inv.view()
    }

    pub fn woodbury_vector(&self) -> ArrayView1<f64> {
        self.woodbury_vector.view()
    }

    pub fn stats(&self) -> UpdateStats {
        self.stats
    }

    fn jitter(&self) -> f64 {
        self.kernel.noise + REGULARIZATION_EPS
    }

    fn check_query(&self, query: ArrayView2<f64>) -> Result<()> {
        if query.nrows() == 0 {
            return Err(PlumeError::shape("at least one query point", "0 points"));
        }
        if query.ncols() != DOMAIN_DIM {
            return Err(PlumeError::shape(
                format!("{} query columns", DOMAIN_DIM),
                format!("{} query columns", query.ncols()),
            ));
        }
        Ok(())
    }

    fn check_data(inputs: ArrayView2<f64>, values: ArrayView1<f64>) -> Result<()> {
        if inputs.ncols() != DOMAIN_DIM {
            return Err(PlumeError::shape(
                format!("{} input columns", DOMAIN_DIM),
                format!("{} input columns", inputs.ncols()),
            ));
        }
        if inputs.nrows() != values.len() {
            return Err(PlumeError::shape(
                format!("{} observed values", inputs.nrows()),
                format!("{} observed values", values.len()),
            ));
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        self.mean.invalidate();
        self.covariance.invalidate();
        self.woodbury_chol.invalidate();
    }

    /// Posterior mean and marginal variance at `query` (`N x 2`).
    ///
    /// With no observations this is the prior: zero mean and the kernel
    /// variance, with or without `include_noise`. Otherwise `include_noise`
    /// adds the observation noise to the variance.
    pub fn predict(&self, query: ArrayView2<f64>, include_noise: bool) -> Result<(Array1<f64>, Array1<f64>)> {
        self.check_query(query)?;
        let m = query.nrows();

        if self.is_empty() {
            return Ok((Array1::zeros(m), Array1::from_elem(m, self.kernel.variance)));
        }
        let noise = if include_noise { self.kernel.noise } else { 0.0 };

        let kx = self.kernel.gram(self.inputs.view(), query)?;
        let mean = kx.t().dot(&self.woodbury_vector);

        // diag(Kxᵗ W Kx) without forming the full m x m product
        let w_kx = self.woodbury_inv.dot(&kx);
        let reduction = (&w_kx * &kx).sum_axis(Axis(0));
        let mut variance = self.kernel.diag(query) - reduction;
        numerical_check::clamp_variances(&mut variance);
        variance += noise;

        Ok((mean, variance))
    }

    /// Posterior mean and full covariance at `query`
    pub fn predict_full(&self, query: ArrayView2<f64>, include_noise: bool) -> Result<(Array1<f64>, Array2<f64>)> {
        self.check_query(query)?;
        let m = query.nrows();
        let kxx = self.kernel.gram_sym(query);

        let (mean, mut covariance) = if self.is_empty() {
            (Array1::zeros(m), kxx)
        } else {
            let kx = self.kernel.gram(self.inputs.view(), query)?;
            let mean = kx.t().dot(&self.woodbury_vector);
            let covariance = kxx - kx.t().dot(&self.woodbury_inv.dot(&kx));
            (mean, covariance)
        };
        linalg::symmetrize(&mut covariance);
        if include_noise {
            linalg::add_diagonal(&mut covariance, self.kernel.noise);
        }
        Ok((mean, covariance))
    }

    /// Build the posterior from scratch from the first batch of data
    pub fn initialize(&mut self, inputs: ArrayView2<f64>, values: ArrayView1<f64>) -> Result<()> {
        Self::check_data(inputs, values)?;
        if !self.is_empty() {
            return Err(PlumeError::configuration(
                "initialize",
                "model already holds observations; use incorporate",
            ));
        }
        if inputs.nrows() == 0 {
            return Ok(());
        }

        let gram = self.kernel.gram_sym(inputs);
        let woodbury_inv = linalg::regularized_inverse(gram.view(), self.jitter())?;

        self.inputs = inputs.to_owned();
        self.values = values.to_owned();
        self.woodbury_vector = woodbury_inv.dot(&self.values);
        self.woodbury_inv = woodbury_inv;
        self.gram.set(gram);
        self.invalidate();
        self.stats.batch += 1;
        tracing::debug!(points = self.len(), "initialized surrogate model");
        Ok(())
    }

    /// Append observations and update the posterior.
    ///
    /// On an empty model this is [`OnlineGp::initialize`]. The model is left
    /// untouched if the update fails.
    pub fn incorporate(
        &mut self,
        inputs: ArrayView2<f64>,
        values: ArrayView1<f64>,
        strategy: UpdateStrategy,
    ) -> Result<()> {
        Self::check_data(inputs, values)?;
        if self.is_empty() {
            return self.initialize(inputs, values);
        }
        if inputs.nrows() == 0 {
            return Ok(());
        }

        let all_inputs = concatenate(Axis(0), &[self.inputs.view(), inputs.view()])
            .map_err(|e| PlumeError::shape("stackable inputs".to_string(), e.to_string()))?;
        let all_values = concatenate(Axis(0), &[self.values.view(), values.view()])
            .map_err(|e| PlumeError::shape("stackable values".to_string(), e.to_string()))?;

        let cross = self.kernel.gram(self.inputs.view(), inputs)?;
        let block = self.kernel.gram_sym(inputs);

        let woodbury_inv = match strategy {
            UpdateStrategy::Incremental => match self.block_update(&cross, &block)? {
                Some(w) => {
                    self.stats.incremental += 1;
                    w
                }
                None => {
                    self.stats.fallbacks += 1;
                    self.stats.batch += 1;
                    tracing::warn!(
                        points = all_inputs.nrows(),
                        "Schur complement ill-conditioned, refactorizing full Gram matrix"
                    );
                    self.batch_inverse(all_inputs.view())?
                }
            },
            UpdateStrategy::Batch => {
                self.stats.batch += 1;
                self.batch_inverse(all_inputs.view())?
            }
        };

        if let Some(old_gram) = self.gram.get() {
            let extended = assemble_blocks(old_gram, &cross, &block);
            self.gram.set(extended);
        }

        self.inputs = all_inputs;
        self.values = all_values;
        self.woodbury_vector = woodbury_inv.dot(&self.values);
        self.woodbury_inv = woodbury_inv;
        self.invalidate();
        tracing::debug!(points = self.len(), ?strategy, "incorporated observations");
        Ok(())
    }

    /// `initialize` on first use, incremental `incorporate` afterwards
    pub fn add_data(&mut self, inputs: ArrayView2<f64>, values: ArrayView1<f64>) -> Result<()> {
        if self.is_empty() {
            self.initialize(inputs, values)
        } else {
            self.incorporate(inputs, values, UpdateStrategy::Incremental)
        }
    }

    /// Fold a new block into the Woodbury inverse via the Schur complement.
    ///
    /// Returns `None` when the complement fails the conditioning check.
    fn block_update(&self, cross: &Array2<f64>, block: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        let p_inv = &self.woodbury_inv;
        let p_q = p_inv.dot(cross);

        let mut schur = block - &cross.t().dot(&p_q);
        linalg::add_diagonal(&mut schur, self.jitter());
        linalg::symmetrize(&mut schur);

        if !numerical_check::is_finite(schur.view()) {
            return Ok(None);
        }
        let condition = linalg::condition_estimate(schur.view())?;
        if condition > self.condition_threshold {
            tracing::debug!(condition, threshold = self.condition_threshold, "rejecting block update");
            return Ok(None);
        }
        let m_inv = match linalg::pd_inverse(schur.view()) {
            Ok(m_inv) => m_inv,
            Err(PlumeError::NumericalInstability(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let p_q_m = p_q.dot(&m_inv);
        let top_left = p_inv + &p_q_m.dot(&p_q.t());
        let top_right = p_q_m.mapv(|v| -v);
        let mut updated = assemble_blocks(&top_left, &top_right, &m_inv);
        linalg::symmetrize(&mut updated);

        if !numerical_check::is_finite(updated.view()) {
            return Ok(None);
        }
        Ok(Some(updated))
    }

    fn batch_inverse(&self, inputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        let gram = self.kernel.gram_sym(inputs);
        let inverse = linalg::regularized_inverse(gram.view(), self.jitter())?;
        let non_finite = numerical_check::check_matrix("woodbury_inv", inverse.view())
            .into_iter()
            .any(|issue| matches!(issue, NumericalIssue::NaN { .. } | NumericalIssue::Infinity { .. }));
        if non_finite {
            return Err(PlumeError::NumericalInstability(
                "refactorized Woodbury inverse has non-finite entries".into(),
            ));
        }
        Ok(inverse)
    }

    /// Discard the maintained inverse and refactorize from the stored data
    pub fn refactorize(&mut self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let woodbury_inv = self.batch_inverse(self.inputs.view())?;
        self.woodbury_vector = woodbury_inv.dot(&self.values);
        self.woodbury_inv = woodbury_inv;
        self.gram.invalidate();
        self.invalidate();
        self.stats.batch += 1;
        Ok(())
    }

    /// Kernel matrix over the observed inputs
    pub fn gram(&mut self) -> &Array2<f64> {
        let (kernel, inputs) = (&self.kernel, &self.inputs);
        self.gram.get_or_compute(|| kernel.gram_sym(inputs.view()))
    }

    /// Posterior mean at the observed inputs, `K·v`
    pub fn posterior_mean(&mut self) -> Result<&Array1<f64>> {
        if self.is_empty() {
            return Err(PlumeError::InsufficientData("posterior mean of an empty model".into()));
        }
        let (kernel, inputs) = (&self.kernel, &self.inputs);
        let gram = self.gram.get_or_compute(|| kernel.gram_sym(inputs.view()));
        let vector = &self.woodbury_vector;
        Ok(self.mean.get_or_compute(|| gram.dot(vector)))
    }

    /// Posterior covariance at the observed inputs, `K - K W K`
    pub fn posterior_covariance(&mut self) -> Result<&Array2<f64>> {
        if self.is_empty() {
            return Err(PlumeError::InsufficientData("posterior covariance of an empty model".into()));
        }
        let (kernel, inputs) = (&self.kernel, &self.inputs);
        let gram = self.gram.get_or_compute(|| kernel.gram_sym(inputs.view()));
        let w = &self.woodbury_inv;
        Ok(self.covariance.get_or_compute(|| {
            let mut cov = gram - &gram.dot(w).dot(gram);
            linalg::symmetrize(&mut cov);
            cov
        }))
    }

    /// Lower Cholesky factor of the Woodbury inverse
    pub fn woodbury_chol(&mut self) -> Result<&Array2<f64>> {
        if self.is_empty() {
            return Err(PlumeError::InsufficientData("no Woodbury inverse without observations".into()));
        }
        let w = &self.woodbury_inv;
        self.woodbury_chol.get_or_try_compute(|| linalg::cholesky_lower(w.view()))
    }

    /// Draw `count` joint samples of the latent field at `query`.
    ///
    /// Returns an array of shape `count x |query|`. With `full_cov = false`
    /// the points are sampled independently from their marginals.
    pub fn sample_posterior<R: Rng + ?Sized>(
        &self,
        query: ArrayView2<f64>,
        count: usize,
        full_cov: bool,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        if self.is_empty() {
            return Err(PlumeError::InsufficientData(
                "posterior sampling requires at least one observation".into(),
            ));
        }
        self.sample_predictive(query, count, full_cov, rng)
    }

    /// Like [`OnlineGp::sample_posterior`] but falls back to the prior on an
    /// empty model.
    pub fn sample_predictive<R: Rng + ?Sized>(
        &self,
        query: ArrayView2<f64>,
        count: usize,
        full_cov: bool,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        self.check_query(query)?;
        let m = query.nrows();
        let z = Array2::<f64>::random_using((count, m), StandardNormal, rng);

        let mut samples = if full_cov {
            let (mean, mut covariance) = self.predict_full(query, true)?;
            linalg::add_diagonal(&mut covariance, REGULARIZATION_EPS * self.kernel.variance.max(1.0));
            let l = linalg::cholesky_lower(covariance.view())?;
            let mut samples = z.dot(&l.t());
            samples += &mean;
            samples
        } else {
            let (mean, variance) = self.predict(query, true)?;
            let std = variance.mapv(f64::sqrt);
            let mut samples = z * &std;
            samples += &mean;
            samples
        };
        if !numerical_check::is_finite(samples.view()) {
            return Err(PlumeError::NumericalInstability(
                "posterior samples contain non-finite values".into(),
            ));
        }
        Ok(samples)
    }

    /// Location and value of the largest posterior mean on a regular grid
    pub fn predict_max(&self, extent: &Extent, resolution: usize) -> Result<(Point, f64)> {
        if self.is_empty() {
            return Ok(([0.0, 0.0], 0.0));
        }
        let grid = extent.grid(resolution, resolution);
        let query = points_to_array(&grid);
        let (mean, _) = self.predict(query.view(), false)?;
        let (idx, value) = mean
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        Ok((grid[idx], value))
    }

    /// Replace kernel hyperparameters and rebuild the posterior
    pub fn set_kernel_params(&mut self, params: [f64; 2]) -> Result<()> {
        self.kernel.set_params(params)?;
        self.gram.invalidate();
        self.invalidate();
        self.refactorize()
    }

    /// Fit kernel hyperparameters to the stored observations, optionally
    /// persisting them to `kernel_file`.
    pub fn train_kernel<O: HyperparameterOptimizer + ?Sized>(
        &mut self,
        optimizer: &O,
        kernel_file: Option<&Path>,
    ) -> Result<()> {
        if self.is_empty() {
            return Err(PlumeError::InsufficientData(
                "failed to train kernel: no training data".into(),
            ));
        }
        tracing::info!(points = self.len(), "optimizing kernel parameters given data");
        let params = optimizer.optimize(&self.kernel, self.inputs.view(), self.values.view())?;
        self.set_kernel_params(params)?;
        if let Some(path) = kernel_file {
            self.kernel.save_params(path)?;
        }
        Ok(())
    }

    /// Load kernel hyperparameters from file and rebuild the posterior
    pub fn load_kernel<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let mut kernel = self.kernel.clone();
        kernel.load_params(path)?;
        self.set_kernel_params(kernel.params())
    }

    /// Write all observations as a space-delimited `x y z` table
    pub fn save_observations<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = fs::File::create(path)?;
        for (x, z) in self.inputs.outer_iter().zip(self.values.iter()) {
            writeln!(file, "{} {} {}", x[0], x[1], z)?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> GpSnapshot {
        GpSnapshot {
            kernel: self.kernel.clone(),
            inputs: self.inputs.clone(),
            values: self.values.clone(),
            condition_threshold: self.condition_threshold,
        }
    }

    /// Rebuild a model from a snapshot with a single batch factorization
    pub fn from_snapshot(snapshot: GpSnapshot) -> Result<Self> {
        let mut gp = OnlineGp::new(snapshot.kernel).with_condition_threshold(snapshot.condition_threshold);
        gp.initialize(snapshot.inputs.view(), snapshot.values.view())?;
        Ok(gp)
    }

    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(&self.snapshot())?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PlumeError::NotFound(format!("model checkpoint {}", path.display())));
        }
        let bytes = fs::read(path)?;
        let snapshot: GpSnapshot = bincode::deserialize(&bytes)?;
        OnlineGp::from_snapshot(snapshot)
    }
}

/// Assemble the symmetric block matrix `[[a, b], [bᵗ, d]]`
fn assemble_blocks(a: &Array2<f64>, b: &Array2<f64>, d: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let m = d.nrows();
    let mut out = Array2::zeros((n + m, n + m));
    out.slice_mut(s![..n, ..n]).assign(a);
    out.slice_mut(s![..n, n..]).assign(b);
    out.slice_mut(s![n.., ..n]).assign(&b.t());
    out.slice_mut(s![n.., n..]).assign(d);
    out
}
