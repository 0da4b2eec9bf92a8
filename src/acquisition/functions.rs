use ndarray::ArrayView2;

use super::{Acquisition, AcquisitionParams};
use crate::error::{PlumeError, Result};
use crate::gp::OnlineGp;
use crate::linalg;
use crate::types::euclidean;

/// Smallest standard deviation treated as non-degenerate
const MIN_STD: f64 = 1e-12;

/// Standard normal PDF.
fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF (Hart rational approximation).
fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let abs_x = x.abs();
    let t = 1.0 / (1.0 + 0.231_641_9 * abs_x);
    let poly = t * (0.319_381_530
        + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let cdf = 1.0 - norm_pdf(abs_x) * poly;

    if x >= 0.0 { cdf } else { 1.0 - cdf }
}

fn wrong_params(rule: &str, params: &AcquisitionParams) -> PlumeError {
    PlumeError::configuration(
        rule.to_string(),
        format!("unexpected acquisition parameters {:?}", params),
    )
}

/// `Σ μ + sqrt(β_t)·σ` with the GP-UCB schedule
/// `β_t = 2 ln(d·π²(t+1)² / 6δ)`.
#[derive(Clone, Debug)]
pub struct UpperConfidenceBound {
    pub delta: f64,
    pub d: f64,
}

impl Default for UpperConfidenceBound {
    fn default() -> Self {
        UpperConfidenceBound { delta: 0.9, d: 20.0 }
    }
}

impl UpperConfidenceBound {
    pub fn beta(&self, epoch: usize) -> f64 {
        let t = (epoch + 1) as f64;
        let pit = std::f64::consts::PI.powi(2) * t * t / 6.0;
        2.0 * (self.d * pit / self.delta).ln()
    }
}

impl Acquisition for UpperConfidenceBound {
    fn score(&self, epoch: usize, points: ArrayView2<f64>, model: &OnlineGp, _params: &AcquisitionParams) -> Result<f64> {
        let (mean, variance) = model.predict(points, false)?;
        let scale = self.beta(epoch).sqrt();
        Ok(mean.sum() + scale * variance.mapv(f64::sqrt).sum())
    }

    fn name(&self) -> &'static str {
        "mean"
    }
}

/// Mutual information between the field and noisy samples at the points:
/// `½ log det(I + Σ / noise)` for the joint posterior covariance `Σ`.
#[derive(Clone, Copy, Debug, Default)]
pub struct InformationGain;

impl Acquisition for InformationGain {
    fn score(&self, _epoch: usize, points: ArrayView2<f64>, model: &OnlineGp, _params: &AcquisitionParams) -> Result<f64> {
        let (_, covariance) = model.predict_full(points, false)?;
        let noise = model.kernel().noise.max(linalg::REGULARIZATION_EPS);
        let mut scaled = covariance / noise;
        linalg::add_diagonal(&mut scaled, 1.0);
        Ok(0.5 * linalg::log_det_pd(scaled.view())?)
    }

    fn name(&self) -> &'static str {
        "info_gain"
    }
}

/// Sum over points of the expected improvement above the running best
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpectedImprovement;

impl Acquisition for ExpectedImprovement {
    fn score(&self, _epoch: usize, points: ArrayView2<f64>, model: &OnlineGp, params: &AcquisitionParams) -> Result<f64> {
        let best = match params {
            AcquisitionParams::RunningBest(values) => {
                values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }
            other => return Err(wrong_params(self.name(), other)),
        };
        let (mean, variance) = model.predict(points, false)?;
        let score = mean
            .iter()
            .zip(variance.iter())
            .map(|(&mu, &var)| {
                let std = var.sqrt();
                if !best.is_finite() {
                    return mu.max(0.0);
                }
                if std < MIN_STD {
                    return (mu - best).max(0.0);
                }
                let z = (mu - best) / std;
                ((mu - best) * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
            })
            .sum();
        Ok(score)
    }

    fn name(&self) -> &'static str {
        "exp_improve"
    }
}

/// Max-value entropy search: expected reduction in the entropy of the
/// field maximum, averaged over sampled maximum values.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaxValueEntropySearch;

impl Acquisition for MaxValueEntropySearch {
    fn score(&self, _epoch: usize, points: ArrayView2<f64>, model: &OnlineGp, params: &AcquisitionParams) -> Result<f64> {
        let belief = match params {
            AcquisitionParams::MaxBelief(belief) => belief,
            other => return Err(wrong_params(self.name(), other)),
        };
        if belief.max_values.is_empty() {
            return Ok(0.0);
        }
        let (mean, variance) = model.predict(points, false)?;
        let n = belief.max_values.len() as f64;
        let mut total = 0.0;
        for (&mu, &var) in mean.iter().zip(variance.iter()) {
            let std = var.sqrt().max(MIN_STD);
            let mut point_score = 0.0;
            for &max_value in &belief.max_values {
                let gamma = (max_value - mu) / std;
                let cdf = norm_cdf(gamma).max(1e-12);
                point_score += gamma * norm_pdf(gamma) / (2.0 * cdf) - cdf.ln();
            }
            total += point_score / n;
        }
        Ok(total)
    }

    fn name(&self) -> &'static str {
        "mes"
    }
}

fn near_any(point: &[f64; 2], locations: &[[f64; 2]], radius: f64) -> bool {
    locations.iter().any(|loc| euclidean(point, loc) <= radius)
}

/// Number of sample points within `radius` of a sampled maximum location
#[derive(Clone, Copy, Debug, Default)]
pub struct NaiveHotspot;

impl Acquisition for NaiveHotspot {
    fn score(&self, _epoch: usize, points: ArrayView2<f64>, _model: &OnlineGp, params: &AcquisitionParams) -> Result<f64> {
        let (belief, radius) = match params {
            AcquisitionParams::Heuristic { belief, radius } => (belief, *radius),
            other => return Err(wrong_params(self.name(), other)),
        };
        let count = points
            .outer_iter()
            .filter(|row| near_any(&[row[0], row[1]], &belief.max_locations, radius))
            .count();
        Ok(count as f64)
    }

    fn name(&self) -> &'static str {
        "naive"
    }
}

/// Posterior mean summed over sample points near a sampled maximum location
#[derive(Clone, Copy, Debug, Default)]
pub struct NaiveHotspotValue;

impl Acquisition for NaiveHotspotValue {
    fn score(&self, _epoch: usize, points: ArrayView2<f64>, model: &OnlineGp, params: &AcquisitionParams) -> Result<f64> {
        let (belief, radius) = match params {
            AcquisitionParams::Heuristic { belief, radius } => (belief, *radius),
            other => return Err(wrong_params(self.name(), other)),
        };
        let (mean, _) = model.predict(points, false)?;
        let score = points
            .outer_iter()
            .zip(mean.iter())
            .filter(|(row, _)| near_any(&[row[0], row[1]], &belief.max_locations, radius))
            .map(|(_, &mu)| mu)
            .sum();
        Ok(score)
    }

    fn name(&self) -> &'static str {
        "naive_value"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_cdf_reference_values() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-4);
        assert!((norm_cdf(-1.0) - 0.158_655).abs() < 1e-5);
        assert_eq!(norm_cdf(-9.0), 0.0);
    }

    #[test]
    fn test_beta_grows_with_epoch() {
        let ucb = UpperConfidenceBound::default();
        assert!(ucb.beta(10) > ucb.beta(0));
        assert!(ucb.beta(0) > 0.0);
    }
}
