//! # Paths Module
//!
//! Candidate path generation. A [`PathSource`] turns the agent's pose into a
//! [`PathSet`]: for every candidate, the points the sensor will sample and
//! the geometric path the agent will drive.

use std::f64::consts::FRAC_PI_2;

use crate::error::{PlumeError, Result};
use crate::types::{Extent, GeometricPath, PathSet, Point, Pose};

/// Produces admissible future paths from a pose
pub trait PathSource {
    fn path_set(&self, pose: &Pose) -> PathSet;

    /// Travel cost of a path; never negative
    fn path_cost(&self, path: &GeometricPath) -> f64 {
        path.length()
    }
}

/// Straight rays fanned over `±π/2` around the current heading.
///
/// Each ray is `horizon_length` long and sampled every `sample_step`. A ray
/// is cut short where it leaves the extent and dropped if nothing of it
/// remains.
#[derive(Clone, Debug)]
pub struct RayFanPaths {
    frontier_size: usize,
    horizon_length: f64,
    sample_step: f64,
    extent: Extent,
}

impl RayFanPaths {
    pub fn new(frontier_size: usize, horizon_length: f64, sample_step: f64, extent: Extent) -> Result<Self> {
        if frontier_size == 0 {
            return Err(PlumeError::configuration("frontier_size", "must be at least 1"));
        }
        if !(sample_step > 0.0) {
            return Err(PlumeError::configuration("sample_step", "must be positive"));
        }
        if !(horizon_length >= sample_step) {
            return Err(PlumeError::configuration(
                "horizon_length",
                "must be at least one sample step",
            ));
        }
        if extent.is_empty() {
            return Err(PlumeError::configuration("extent", "extent has no area"));
        }
        Ok(RayFanPaths { frontier_size, horizon_length, sample_step, extent })
    }

    fn headings(&self, pose: &Pose) -> Vec<f64> {
        if self.frontier_size == 1 {
            return vec![pose.heading];
        }
        let step = 2.0 * FRAC_PI_2 / (self.frontier_size - 1) as f64;
        (0..self.frontier_size)
            .map(|i| pose.heading - FRAC_PI_2 + step * i as f64)
            .collect()
    }

    fn ray(&self, pose: &Pose, heading: f64) -> Option<(Vec<Point>, GeometricPath)> {
        let steps = (self.horizon_length / self.sample_step + 1e-9).floor() as usize;
        let (dx, dy) = (heading.cos(), heading.sin());

        let mut points = Vec::with_capacity(steps);
        let mut waypoints = vec![*pose];
        for k in 1..=steps {
            let d = self.sample_step * k as f64;
            let p = [pose.x + d * dx, pose.y + d * dy];
            if !self.extent.contains(&p) {
                break;
            }
            points.push(p);
            waypoints.push(Pose::new(p[0], p[1], heading));
        }

        if points.is_empty() {
            None
        } else {
            Some((points, GeometricPath::new(waypoints)))
        }
    }
}

impl PathSource for RayFanPaths {
    fn path_set(&self, pose: &Pose) -> PathSet {
        let mut set = PathSet::new();
        for (id, heading) in self.headings(pose).into_iter().enumerate() {
            if let Some((points, path)) = self.ray(pose, heading) {
                set.insert(id, points, path);
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_from_center() {
        let source = RayFanPaths::new(5, 2.0, 0.5, Extent::default()).unwrap();
        let set = source.path_set(&Pose::default());
        assert_eq!(set.len(), 5);
        for (id, points) in &set.sampling {
            assert_eq!(points.len(), 4);
            let path = &set.geometric[id];
            assert_eq!(path.waypoints.len(), 5);
            assert!((source.path_cost(path) - 2.0).abs() < 1e-9);
        }
        // middle ray follows the heading
        let mid = &set.sampling[&2];
        assert!((mid[3][0] - 2.0).abs() < 1e-9 && mid[3][1].abs() < 1e-9);
    }

    #[test]
    fn test_rays_clipped_at_boundary() {
        let source = RayFanPaths::new(3, 4.0, 1.0, Extent::default()).unwrap();
        let set = source.path_set(&Pose::new(9.5, 0.0, 0.0));
        // the forward ray leaves immediately, the side rays survive
        assert_eq!(set.len(), 2);
        assert!(!set.sampling.contains_key(&1));
        for points in set.sampling.values() {
            assert!(points.iter().all(|p| Extent::default().contains(p)));
        }
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(RayFanPaths::new(0, 5.0, 0.5, Extent::default()).is_err());
        assert!(RayFanPaths::new(3, 5.0, 0.0, Extent::default()).is_err());
        assert!(RayFanPaths::new(3, 0.1, 0.5, Extent::default()).is_err());
    }
}
