//! K-Means cluster model over a named feature subset

use crate::cleaning::finite_mean;
use crate::data::FeatureTable;
use crate::error::{Error, Result};
use crate::scaler::StandardScaler;
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

/// K-Means fitting parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Maximum iterations per run
    pub max_iters: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    /// Number of k-means++ restarts; the lowest-inertia run wins
    pub n_runs: usize,
    /// Seed for centroid initialization
    pub seed: u64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            max_iters: 300,
            tolerance: 1e-4,
            n_runs: 10,
            seed: 42,
        }
    }
}

/// Centroid expressed in original (unscaled) units, labelled by column
#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    columns: Vec<String>,
    values: Array1<f64>,
}

impl Centroid {
    pub fn new<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        values: impl Into<Array1<f64>>,
    ) -> Result<Self> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let values = values.into();
        if columns.len() != values.len() {
            return Err(Error::DimensionMismatch {
                expected: columns.len(),
                found: values.len(),
                detail: "centroid values vs column names".to_string(),
            });
        }
        Ok(Self { columns, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Coordinate for `column`, if the centroid was fitted on it
    pub fn value(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }
}

/// One cluster described in original units
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterProfile {
    pub label: usize,
    pub size: usize,
    pub centroid: Centroid,
}

/// Spread of one column inside one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub column: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sum: f64,
}

/// Per-column statistics of one non-empty cluster, original units
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStatistics {
    pub label: usize,
    pub size: usize,
    pub columns: Vec<ColumnStats>,
}

/// Fitted K-Means model.
///
/// Centroids are kept in standardized space alongside the scaler that
/// produced it; centroid column order always equals `feature_columns`.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    n_clusters: usize,
    feature_columns: Vec<String>,
    scaler: StandardScaler,
    /// Fit-time column means used for missing cells, original units
    fill_values: Array1<f64>,
    /// Cluster centroids in standardized space
    centroids: Array2<f64>,
    /// Cluster assignment per table row
    labels: Array1<usize>,
    /// Within-cluster sum of squares in standardized space
    inertia: f64,
}

impl ClusterModel {
    /// Fit K-Means on `feature_columns` of `table`.
    ///
    /// Missing values are imputed with the column mean before standardizing.
    /// A column without any finite value fails with [`Error::MissingData`].
    pub fn fit<S: AsRef<str>>(
        table: &FeatureTable,
        feature_columns: &[S],
        n_clusters: usize,
        params: &FitParams,
    ) -> Result<Self> {
        if feature_columns.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one feature column is required".to_string(),
            ));
        }
        if n_clusters == 0 {
            return Err(Error::InvalidParameter(
                "number of clusters must be at least 1".to_string(),
            ));
        }
        if table.len() < n_clusters {
            return Err(Error::InvalidParameter(format!(
                "number of rows ({}) must be at least equal to number of clusters ({})",
                table.len(),
                n_clusters
            )));
        }

        let feature_columns: Vec<String> = feature_columns
            .iter()
            .map(|c| c.as_ref().to_string())
            .collect();
        let (raw, fill_values) = imputed_features(table, &feature_columns)?;

        let spread = raw.std_axis(Axis(0), 0.0);
        for (name, &std) in feature_columns.iter().zip(spread.iter()) {
            if std <= f64::EPSILON {
                warn!("Column '{name}' has zero variance and does not separate clusters");
            }
        }
        let scaler = StandardScaler::fit(&raw);
        let features = scaler.transform(&raw);

        debug!(
            "Fitting K-Means: k={}, columns={:?}, rows={}",
            n_clusters,
            feature_columns,
            features.nrows()
        );
        let dataset = DatasetBase::from(features.clone());
        let rng = StdRng::seed_from_u64(params.seed);
        let model = KMeans::params_with(n_clusters, rng, L2Dist)
            .max_n_iterations(params.max_iters)
            .tolerance(params.tolerance)
            .n_runs(params.n_runs)
            .fit(&dataset)?;

        let labels: Array1<usize> = model.predict(&features);
        let centroids = member_means(&features, &labels, model.centroids());
        let inertia = compute_inertia(&features, &labels, &centroids);

        let fitted = Self {
            n_clusters,
            feature_columns,
            scaler,
            fill_values,
            centroids,
            labels,
            inertia,
        };
        info!(
            "Fitted {} clusters on {:?} (inertia {:.4})",
            n_clusters, fitted.feature_columns, fitted.inertia
        );
        Ok(fitted)
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn labels(&self) -> &Array1<usize> {
        &self.labels
    }

    /// Centroids in standardized space, `(k, d)`
    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Value substituted for a missing `column` cell: its mean over the
    /// rows the model was fitted on
    pub fn fill_value(&self, column: &str) -> Option<f64> {
        self.feature_columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.fill_values[i])
    }

    /// Centroids mapped back to original units, `(k, d)`
    pub fn centroids_original(&self) -> Array2<f64> {
        self.scaler.inverse_transform(&self.centroids)
    }

    /// Original-unit centroid of cluster `index`
    pub fn centroid(&self, index: usize) -> Result<Centroid> {
        if index >= self.n_clusters {
            return Err(Error::InvalidParameter(format!(
                "cluster index {} out of range for {} clusters",
                index, self.n_clusters
            )));
        }
        let original = self.centroids_original();
        Centroid::new(self.feature_columns.iter().cloned(), original.row(index).to_owned())
    }

    /// Nearest cluster for a feature vector given in original units, in
    /// `feature_columns` order
    pub fn predict(&self, features: &[f64]) -> Result<usize> {
        if features.len() != self.feature_columns.len() {
            return Err(Error::DimensionMismatch {
                expected: self.feature_columns.len(),
                found: features.len(),
                detail: "feature vector length".to_string(),
            });
        }

        let raw = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| Error::InvalidParameter(e.to_string()))?;
        let scaled = self.scaler.transform(&raw);
        let point = scaled.row(0);

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;
        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(&point, &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        Ok(closest_cluster)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Per-cluster size and centroid in original units
    pub fn describe(&self) -> Vec<ClusterProfile> {
        let original = self.centroids_original();
        self.cluster_sizes()
            .into_iter()
            .enumerate()
            .map(|(label, size)| ClusterProfile {
                label,
                size,
                centroid: Centroid {
                    columns: self.feature_columns.clone(),
                    values: original.row(label).to_owned(),
                },
            })
            .collect()
    }

    /// Inertia for every k in `1..=max_k`, for choosing k by the elbow.
    ///
    /// Each point is a full fit with the same `params`.
    pub fn inertia_curve<S: AsRef<str>>(
        table: &FeatureTable,
        feature_columns: &[S],
        max_k: usize,
        params: &FitParams,
    ) -> Result<Vec<(usize, f64)>> {
        if max_k == 0 {
            return Err(Error::InvalidParameter("max_k must be at least 1".to_string()));
        }
        (1..=max_k)
            .map(|k| {
                Self::fit(table, feature_columns, k, params).map(|model| (k, model.inertia))
            })
            .collect()
    }

    /// Min, max, mean and sum of every feature column per cluster, computed
    /// on the rows of the table the model was fitted on. Missing cells count
    /// as their fit-time fill value; empty clusters are left out.
    pub fn cluster_statistics(&self, table: &FeatureTable) -> Result<Vec<ClusterStatistics>> {
        if table.len() != self.labels.len() {
            return Err(Error::DimensionMismatch {
                expected: self.labels.len(),
                found: table.len(),
                detail: "table rows vs fitted labels".to_string(),
            });
        }
        let mut raw = table.select(&self.feature_columns)?;
        for (mut column, &fill) in raw.columns_mut().into_iter().zip(&self.fill_values) {
            column.mapv_inplace(|v| if v.is_finite() { v } else { fill });
        }

        let mut statistics = Vec::new();
        for label in 0..self.n_clusters {
            let members: Vec<usize> = self
                .labels
                .iter()
                .enumerate()
                .filter(|&(_, &l)| l == label)
                .map(|(row, _)| row)
                .collect();
            if members.is_empty() {
                continue;
            }

            let rows = raw.select(Axis(0), &members);
            let columns = self
                .feature_columns
                .iter()
                .zip(rows.columns())
                .map(|(name, values)| {
                    let sum = values.sum();
                    ColumnStats {
                        column: name.clone(),
                        min: values.fold(f64::INFINITY, |a, &b| a.min(b)),
                        max: values.fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
                        mean: sum / members.len() as f64,
                        sum,
                    }
                })
                .collect();
            statistics.push(ClusterStatistics {
                label,
                size: members.len(),
                columns,
            });
        }
        Ok(statistics)
    }

    /// Mean silhouette coefficient over the first `sample_size` rows of the
    /// table the model was fitted on
    pub fn silhouette_sample(&self, table: &FeatureTable, sample_size: usize) -> Result<f64> {
        if table.len() != self.labels.len() {
            return Err(Error::DimensionMismatch {
                expected: self.labels.len(),
                found: table.len(),
                detail: "table rows vs fitted labels".to_string(),
            });
        }
        let (raw, _) = imputed_features(table, &self.feature_columns)?;
        let features = self.scaler.transform(&raw);

        let n_samples = features.nrows().min(sample_size);
        if n_samples < 2 {
            return Ok(0.0);
        }

        let mut silhouette_sum = 0.0;
        for i in 0..n_samples {
            let point = features.row(i);
            let cluster_label = self.labels[i];

            let mut same_cluster_distances = Vec::new();
            let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }
                let distance = euclidean_distance(&point, &features.row(j));
                let other_label = self.labels[j];
                if other_label == cluster_label {
                    same_cluster_distances.push(distance);
                } else if other_label < self.n_clusters {
                    other_cluster_distances[other_label].push(distance);
                }
            }

            let a_i = if same_cluster_distances.is_empty() {
                0.0
            } else {
                same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64
            };

            let b_i = other_cluster_distances
                .iter()
                .filter(|distances| !distances.is_empty())
                .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
                .fold(f64::INFINITY, f64::min);

            let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };
            silhouette_sum += silhouette_i;
        }

        Ok(silhouette_sum / n_samples as f64)
    }
}

/// Select `columns` and replace non-finite cells with the column mean.
///
/// Returns the matrix together with the mean used for each column.
fn imputed_features(
    table: &FeatureTable,
    columns: &[String],
) -> Result<(Array2<f64>, Array1<f64>)> {
    if let Some(absent) = columns.iter().find(|name| !table.has_column(name)) {
        return Err(Error::missing(absent.as_str()));
    }
    let mut raw = table.select(columns)?;
    let mut means = Array1::zeros(columns.len());
    let cells = raw.columns_mut().into_iter().zip(columns).zip(&mut means);
    for ((mut column, name), fill) in cells {
        let mean = finite_mean(&column.to_owned()).ok_or_else(|| Error::missing(name))?;
        column.mapv_inplace(|v| if v.is_finite() { v } else { mean });
        *fill = mean;
    }
    Ok((raw, means))
}

/// Mean of each cluster's member rows. A cluster without members keeps its
/// `fallback` centroid.
fn member_means(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    fallback: &Array2<f64>,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(fallback.raw_dim());
    let mut counts = vec![0usize; fallback.nrows()];

    for (row, &cluster) in features.outer_iter().zip(labels.iter()) {
        if cluster < counts.len() {
            let mut sum = sums.row_mut(cluster);
            sum += &row;
            counts[cluster] += 1;
        }
    }

    for (cluster, &count) in counts.iter().enumerate() {
        let mut centroid = sums.row_mut(cluster);
        if count == 0 {
            warn!("Cluster {cluster} has no members, keeping its k-means centroid");
            centroid.assign(&fallback.row(cluster));
        } else {
            centroid /= count as f64;
        }
    }
    sums
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| euclidean_distance(&features.row(i), &centroids.row(cluster)).powi(2))
        .sum()
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_table() -> FeatureTable {
        FeatureTable::new(["s1", "s2", "s3", "s4", "s5", "s6"])
            .with_column("duration", vec![1.0, 1.2, 0.8, 10.0, 10.5, 9.5])
            .unwrap()
            .with_column("volume", vec![100.0, 110.0, 90.0, 1000.0, 1050.0, 950.0])
            .unwrap()
    }

    #[test]
    fn test_fit_assigns_every_row() {
        let table = create_test_table();
        for k in 1..=4 {
            let model =
                ClusterModel::fit(&table, &["duration", "volume"], k, &FitParams::default())
                    .unwrap();

            assert_eq!(model.n_clusters(), k);
            assert_eq!(model.labels().len(), 6);
            assert!(model.labels().iter().all(|&label| label < k));
            assert_eq!(model.centroids().shape(), &[k, 2]);
            assert_eq!(model.cluster_sizes().iter().sum::<usize>(), 6);
        }
    }

    #[test]
    fn test_separates_obvious_groups() {
        let table = create_test_table();
        let model =
            ClusterModel::fit(&table, &["duration", "volume"], 2, &FitParams::default()).unwrap();

        let labels = model.labels();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_fit_is_reproducible_with_seed() {
        let table = create_test_table();
        let params = FitParams::default();
        let first = ClusterModel::fit(&table, &["duration", "volume"], 3, &params).unwrap();
        let second = ClusterModel::fit(&table, &["duration", "volume"], 3, &params).unwrap();

        assert_eq!(first.labels(), second.labels());
        assert_eq!(first.centroids(), second.centroids());
    }

    #[test]
    fn test_centroid_in_original_units() {
        let table = create_test_table();
        let model =
            ClusterModel::fit(&table, &["duration", "volume"], 2, &FitParams::default()).unwrap();

        let low = model.labels()[0];
        let centroid = model.centroid(low).unwrap();
        assert_eq!(centroid.columns(), &["duration", "volume"]);
        assert!((centroid.value("duration").unwrap() - 1.0).abs() < 1e-9);
        assert!((centroid.value("volume").unwrap() - 100.0).abs() < 1e-9);

        assert!(model.centroid(2).is_err());
    }

    #[test]
    fn test_centroids_are_member_means() {
        let table = FeatureTable::new(["a", "b", "c", "d"])
            .with_column("duration", vec![1.0, 2.0, 10.0, 11.0])
            .unwrap();
        let model = ClusterModel::fit(&table, &["duration"], 2, &FitParams::default()).unwrap();

        let low = model.centroid(model.labels()[0]).unwrap();
        let high = model.centroid(model.labels()[3]).unwrap();
        assert!((low.value("duration").unwrap() - 1.5).abs() < 1e-12);
        assert!((high.value("duration").unwrap() - 10.5).abs() < 1e-12);

        // Four points, each 0.5 from its centroid, in standardized units
        let scale = model.scaler().scale()[0];
        let expected = 4.0 * (0.5 / scale).powi(2);
        assert!((model.inertia() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_inertia_curve_does_not_increase() {
        let table = create_test_table();
        let curve =
            ClusterModel::inertia_curve(&table, &["duration", "volume"], 4, &FitParams::default())
                .unwrap();

        assert_eq!(curve.iter().map(|&(k, _)| k).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        for pair in curve.windows(2) {
            assert!(pair[1].1 <= pair[0].1 + 1e-9, "{:?}", curve);
        }
        // The elbow sits at the two obvious groups
        assert!(curve[1].1 < curve[0].1 * 0.1);

        assert!(matches!(
            ClusterModel::inertia_curve(&table, &["duration"], 0, &FitParams::default()),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_cluster_statistics() {
        let table = create_test_table();
        let model =
            ClusterModel::fit(&table, &["duration", "volume"], 2, &FitParams::default()).unwrap();

        let statistics = model.cluster_statistics(&table).unwrap();
        assert_eq!(statistics.len(), 2);

        let low = statistics
            .iter()
            .find(|s| s.label == model.labels()[0])
            .unwrap();
        assert_eq!(low.size, 3);
        let volume = &low.columns[1];
        assert_eq!(volume.column, "volume");
        assert_eq!(volume.min, 90.0);
        assert_eq!(volume.max, 110.0);
        assert_eq!(volume.sum, 300.0);
        assert!((volume.mean - 100.0).abs() < 1e-12);

        let shorter = FeatureTable::new(["s1"]).with_column("duration", vec![1.0]).unwrap();
        assert!(model.cluster_statistics(&shorter).is_err());
    }

    #[test]
    fn test_missing_values_are_imputed() {
        let table = create_test_table()
            .with_column("sparse", vec![1.0, f64::NAN, 3.0, f64::NAN, 5.0, 6.0])
            .unwrap();
        let model =
            ClusterModel::fit(&table, &["duration", "sparse"], 2, &FitParams::default()).unwrap();
        assert!(model.centroids().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_all_missing_column_fails() {
        let table = create_test_table()
            .with_column("empty", vec![f64::NAN; 6])
            .unwrap();
        let result = ClusterModel::fit(&table, &["duration", "empty"], 2, &FitParams::default());
        assert!(matches!(result, Err(Error::MissingData { column }) if column == "empty"));
    }

    #[test]
    fn test_invalid_cluster_count() {
        let table = create_test_table();
        let params = FitParams::default();

        assert!(ClusterModel::fit(&table, &["duration"], 0, &params).is_err());
        assert!(ClusterModel::fit(&table, &["duration"], 7, &params).is_err());
        assert!(matches!(
            ClusterModel::fit(&table, &["unknown"], 2, &params),
            Err(Error::MissingData { column }) if column == "unknown"
        ));
    }

    #[test]
    fn test_predict() {
        let table = create_test_table();
        let model =
            ClusterModel::fit(&table, &["duration", "volume"], 2, &FitParams::default()).unwrap();

        assert_eq!(model.predict(&[1.1, 105.0]).unwrap(), model.labels()[0]);
        assert_eq!(model.predict(&[10.2, 1020.0]).unwrap(), model.labels()[3]);
        assert!(matches!(
            model.predict(&[1.0]),
            Err(Error::DimensionMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_silhouette_for_separated_groups() {
        let table = create_test_table();
        let model =
            ClusterModel::fit(&table, &["duration", "volume"], 2, &FitParams::default()).unwrap();

        let silhouette = model.silhouette_sample(&table, 100).unwrap();
        assert!(silhouette > 0.8);
    }

    #[test]
    fn test_describe() {
        let table = create_test_table();
        let model =
            ClusterModel::fit(&table, &["duration", "volume"], 2, &FitParams::default()).unwrap();

        let profiles = model.describe();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles.iter().map(|p| p.size).sum::<usize>(), 6);
    }
}
