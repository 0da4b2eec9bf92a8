use ndarray::ArrayView2;

/// Types of numerical issues
#[derive(Debug, Clone, PartialEq)]
pub enum NumericalIssue {
    NaN { count: usize },
    Infinity { count: usize },
    Asymmetry { max_gap: f64 },
    NegativeDiagonal { count: usize },
}

/// Scan a covariance-like matrix for non-finite entries, asymmetry and
/// negative diagonal entries.
pub fn check_matrix(name: &str, matrix: ArrayView2<f64>) -> Vec<NumericalIssue> {
    let mut issues = Vec::new();

    let mut nan_count = 0;
    let mut inf_count = 0;
    for &value in matrix.iter() {
        if value.is_nan() {
            nan_count += 1;
        } else if value.is_infinite() {
            inf_count += 1;
        }
    }

    if nan_count > 0 {
        issues.push(NumericalIssue::NaN { count: nan_count });
        tracing::warn!(matrix = name, count = nan_count, "found NaN entries");
    }
    if inf_count > 0 {
        issues.push(NumericalIssue::Infinity { count: inf_count });
        tracing::warn!(matrix = name, count = inf_count, "found infinite entries");
    }

    if matrix.is_square() {
        let gap = max_asymmetry(matrix);
        if gap > SYMMETRY_TOLERANCE {
            issues.push(NumericalIssue::Asymmetry { max_gap: gap });
            tracing::warn!(matrix = name, max_gap = gap, "matrix is not symmetric");
        }

        let negative = matrix.diag().iter().filter(|&&d| d < 0.0).count();
        if negative > 0 {
            issues.push(NumericalIssue::NegativeDiagonal { count: negative });
            tracing::warn!(matrix = name, count = negative, "negative diagonal entries");
        }
    }

    issues
}

const SYMMETRY_TOLERANCE: f64 = 1e-6;

/// Largest `|a_ij - a_ji|`, scaled by the largest absolute entry
pub fn max_asymmetry(matrix: ArrayView2<f64>) -> f64 {
    let n = matrix.nrows();
    let scale = matrix.iter().fold(0.0f64, |m, &x| m.max(x.abs())).max(1.0);
    let mut gap = 0.0f64;
    for i in 0..n {
        for j in (i + 1)..n {
            gap = gap.max((matrix[[i, j]] - matrix[[j, i]]).abs());
        }
    }
    gap / scale
}

/// Check if every entry is finite
pub fn is_finite(matrix: ArrayView2<f64>) -> bool {
    matrix.iter().all(|x| x.is_finite())
}

/// Clamp tiny negative predictive variances produced by round-off to zero
pub fn clamp_variances(variances: &mut ndarray::Array1<f64>) {
    variances.mapv_inplace(|v| if v < 0.0 { 0.0 } else { v });
}

/// Largest entrywise deviation of `product` from the identity.
#[cfg(test)]
pub fn identity_residual(product: ArrayView2<f64>) -> f64 {
    let mut worst = 0.0f64;
    for ((i, j), &value) in product.indexed_iter() {
        let expected = if i == j { 1.0 } else { 0.0 };
        worst = worst.max((value - expected).abs());
    }
    worst
}
