//! Per-column standardization (zero mean, unit variance)

use ndarray::{Array1, Array2, Axis};

/// Standard scaler fitted on a feature matrix.
///
/// Uses the population standard deviation. Columns with zero variance get
/// a scale of 1 so that transforming them yields zeros instead of NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> Self {
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(features.ncols()));
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });

        Self { mean, scale }
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.mean) / &self.scale
    }

    /// Map standardized rows back to original units
    pub fn inverse_transform(&self, features: &Array2<f64>) -> Array2<f64> {
        features * &self.scale + &self.mean
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform() {
        let raw = array![[1.0, 10.0], [3.0, 10.0]];
        let scaler = StandardScaler::fit(&raw);

        assert_eq!(scaler.mean().to_vec(), vec![2.0, 10.0]);
        assert_eq!(scaler.scale().to_vec(), vec![1.0, 1.0]);

        let scaled = scaler.transform(&raw);
        assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_inverse_transform_roundtrip() {
        let raw = array![[1.0, 100.0], [5.0, 300.0], [9.0, 200.0]];
        let scaler = StandardScaler::fit(&raw);
        let restored = scaler.inverse_transform(&scaler.transform(&raw));

        for (a, b) in raw.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
