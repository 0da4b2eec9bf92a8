//! Field oracles: the unknown scalar field the agent samples.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Serialize, Deserialize};

use crate::error::{PlumeError, Result};
use crate::types::{euclidean, Extent, Point};

/// Resolution of the grid used to locate the true maximum
const MAX_SEARCH_RESOLUTION: usize = 100;

/// Source of (possibly noisy) field measurements
pub trait FieldOracle {
    fn sample(&mut self, points: &[Point]) -> Vec<f64>;

    /// Location and value of the true maximum, when known
    fn true_max(&self) -> Option<(Point, f64)> {
        None
    }

    /// Noise-free field value, when known
    fn true_value(&self, _point: &Point) -> Option<f64> {
        None
    }
}

/// One isotropic Gaussian bump
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bump {
    pub center: Point,
    pub amplitude: f64,
    pub width: f64,
}

impl Bump {
    fn value(&self, p: &Point) -> f64 {
        let d = euclidean(&self.center, p);
        self.amplitude * (-d * d / (2.0 * self.width * self.width)).exp()
    }
}

/// Sum of Gaussian bumps plus i.i.d. Gaussian observation noise.
///
/// Sampling is deterministic for a fixed seed.
#[derive(Clone, Debug)]
pub struct GaussianBumpField {
    bumps: Vec<Bump>,
    extent: Extent,
    noise: Option<Normal<f64>>,
    rng: StdRng,
    max: (Point, f64),
}

impl GaussianBumpField {
    pub fn new(bumps: Vec<Bump>, extent: Extent, noise_std: f64, seed: u64) -> Result<Self> {
        if bumps.is_empty() {
            return Err(PlumeError::configuration("bumps", "field needs at least one bump"));
        }
        let noise = if noise_std > 0.0 {
            let normal = Normal::new(0.0, noise_std)
                .map_err(|e| PlumeError::configuration("noise_std".to_string(), e.to_string()))?;
            Some(normal)
        } else {
            None
        };
        let max = locate_max(&bumps, &extent);
        Ok(GaussianBumpField { bumps, extent, noise, rng: StdRng::seed_from_u64(seed), max })
    }

    /// Random field of `n_bumps` bumps placed inside `extent`
    pub fn random(extent: Extent, n_bumps: usize, noise_std: f64, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let span = (extent.x_max - extent.x_min).min(extent.y_max - extent.y_min);
        let bumps = (0..n_bumps.max(1))
            .map(|_| Bump {
                center: [
                    rng.gen_range(extent.x_min..=extent.x_max),
                    rng.gen_range(extent.y_min..=extent.y_max),
                ],
                amplitude: rng.gen_range(5.0..=50.0),
                width: rng.gen_range(0.05..=0.2) * span,
            })
            .collect();
        // offset so the noise stream differs from the layout stream
        GaussianBumpField::new(bumps, extent, noise_std, seed.wrapping_add(1))
    }

    pub fn bumps(&self) -> &[Bump] {
        &self.bumps
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    pub fn value(&self, p: &Point) -> f64 {
        self.bumps.iter().map(|b| b.value(p)).sum()
    }
}

fn locate_max(bumps: &[Bump], extent: &Extent) -> (Point, f64) {
    let field_value = |p: &Point| bumps.iter().map(|b| b.value(p)).sum::<f64>();
    extent
        .grid(MAX_SEARCH_RESOLUTION, MAX_SEARCH_RESOLUTION)
        .into_iter()
        .chain(bumps.iter().map(|b| b.center).filter(|c| extent.contains(c)))
        .map(|p| (p, field_value(&p)))
        .fold(([0.0, 0.0], f64::NEG_INFINITY), |best, cand| if cand.1 > best.1 { cand } else { best })
}

impl FieldOracle for GaussianBumpField {
    fn sample(&mut self, points: &[Point]) -> Vec<f64> {
        let GaussianBumpField { bumps, noise, rng, .. } = self;
        points
            .iter()
            .map(|p| {
                let clean: f64 = bumps.iter().map(|b| b.value(p)).sum();
                match noise {
                    Some(normal) => clean + normal.sample(&mut *rng),
                    None => clean,
                }
            })
            .collect()
    }

    fn true_max(&self) -> Option<(Point, f64)> {
        Some(self.max)
    }

    fn true_value(&self, point: &Point) -> Option<f64> {
        Some(self.value(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_bump() -> GaussianBumpField {
        let bump = Bump { center: [2.0, -3.0], amplitude: 10.0, width: 1.5 };
        GaussianBumpField::new(vec![bump], Extent::default(), 0.0, 0).unwrap()
    }

    #[test]
    fn test_noiseless_samples_match_true_value() {
        let mut field = single_bump();
        let points = [[2.0, -3.0], [0.0, 0.0]];
        let samples = field.sample(&points);
        assert!((samples[0] - 10.0).abs() < 1e-12);
        assert_eq!(Some(samples[1]), field.true_value(&points[1]));
    }

    #[test]
    fn test_true_max_at_bump_center() {
        let field = single_bump();
        let (loc, value) = field.true_max().unwrap();
        assert_eq!(loc, [2.0, -3.0]);
        assert!((value - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let mut a = GaussianBumpField::random(Extent::default(), 3, 0.5, 42).unwrap();
        let mut b = GaussianBumpField::random(Extent::default(), 3, 0.5, 42).unwrap();
        let points = [[1.0, 1.0], [-4.0, 2.5]];
        assert_eq!(a.sample(&points), b.sample(&points));
        assert_eq!(a.bumps(), b.bumps());
    }
}
