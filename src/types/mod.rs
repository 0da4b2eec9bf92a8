use ndarray::Array2;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// A location in the 2-D survey domain
pub type Point = [f64; 2];

/// Identifier of a candidate path within one path set
pub type PathId = usize;

/// Dimension of the survey domain
pub const DOMAIN_DIM: usize = 2;

/// Rectangular domain bounds `(x_min, x_max, y_min, y_max)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Extent {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Extent { x_min, x_max, y_min, y_max }
    }

    pub fn contains(&self, p: &Point) -> bool {
        p[0] >= self.x_min && p[0] <= self.x_max && p[1] >= self.y_min && p[1] <= self.y_max
    }

    pub fn is_empty(&self) -> bool {
        !(self.x_max > self.x_min && self.y_max > self.y_min)
    }

    /// Regular `nx * ny` grid over the extent, row-major in y
    pub fn grid(&self, nx: usize, ny: usize) -> Vec<Point> {
        let xs = linspace(self.x_min, self.x_max, nx);
        let ys = linspace(self.y_min, self.y_max, ny);
        let mut points = Vec::with_capacity(nx * ny);
        for &y in &ys {
            for &x in &xs {
                points.push([x, y]);
            }
        }
        points
    }
}

impl Default for Extent {
    fn default() -> Self {
        Extent::new(-10.0, 10.0, -10.0, 10.0)
    }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Agent pose: 2-D position plus heading in radians
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Pose { x, y, heading }
    }

    pub fn position(&self) -> Point {
        [self.x, self.y]
    }

    pub fn distance_to(&self, other: &Pose) -> f64 {
        euclidean(&self.position(), &other.position())
    }
}

/// Geometric representation of a candidate path, used for cost and bookkeeping
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometricPath {
    pub waypoints: Vec<Pose>,
}

impl GeometricPath {
    pub fn new(waypoints: Vec<Pose>) -> Self {
        GeometricPath { waypoints }
    }

    /// Sum of Euclidean gaps between consecutive waypoints
    pub fn length(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    pub fn end(&self) -> Option<&Pose> {
        self.waypoints.last()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// Candidate paths keyed by id: sampling points and geometry
#[derive(Clone, Debug, Default)]
pub struct PathSet {
    pub sampling: BTreeMap<PathId, Vec<Point>>,
    pub geometric: BTreeMap<PathId, GeometricPath>,
}

impl PathSet {
    pub fn new() -> Self {
        PathSet::default()
    }

    pub fn insert(&mut self, id: PathId, points: Vec<Point>, path: GeometricPath) {
        self.sampling.insert(id, points);
        self.geometric.insert(id, path);
    }

    pub fn len(&self) -> usize {
        self.sampling.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sampling.is_empty()
    }
}

pub fn euclidean(a: &Point, b: &Point) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Stack points into an `N x 2` array
pub fn points_to_array(points: &[Point]) -> Array2<f64> {
    let mut array = Array2::zeros((points.len(), DOMAIN_DIM));
    for (i, p) in points.iter().enumerate() {
        array[[i, 0]] = p[0];
        array[[i, 1]] = p[1];
    }
    array
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometric_path_length() {
        let path = GeometricPath::new(vec![
            Pose::new(0.0, 0.0, 0.0),
            Pose::new(3.0, 4.0, 0.0),
            Pose::new(3.0, 5.0, 0.0),
        ]);
        assert!((path.length() - 6.0).abs() < 1e-12);
        assert_eq!(path.end(), Some(&Pose::new(3.0, 5.0, 0.0)));
        assert_eq!(GeometricPath::default().length(), 0.0);
    }

    #[test]
    fn test_extent_grid() {
        let extent = Extent::new(0.0, 1.0, 0.0, 2.0);
        let grid = extent.grid(2, 3);
        assert_eq!(grid.len(), 6);
        assert_eq!(grid[0], [0.0, 0.0]);
        assert_eq!(grid[5], [1.0, 2.0]);
        assert!(grid.iter().all(|p| extent.contains(p)));
    }

    #[test]
    fn test_points_to_array() {
        let array = points_to_array(&[[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(array.dim(), (2, 2));
        assert_eq!(array[[1, 0]], 3.0);
        assert_eq!(points_to_array(&[]).dim(), (0, 2));
    }
}
