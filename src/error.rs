//! Error types for the scoring pipeline

use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the pipeline stages.
///
/// Every stage either succeeds completely or returns one of these; there is
/// no partial-result mode.
#[derive(Error, Debug)]
pub enum Error {
    /// A required feature column is absent or has no usable value
    #[error("missing data in column '{column}'")]
    MissingData { column: String },

    /// Feature vector and centroid disagree on length or column set
    #[error("dimension mismatch: expected {expected}, found {found} ({detail})")]
    DimensionMismatch {
        expected: usize,
        found: usize,
        detail: String,
    },

    /// Prediction requested before the regression model was fitted
    #[error("satisfaction model is not trained; call fit() first")]
    NotTrained,

    /// Ranking or aggregation requested on a column that does not exist
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    /// Out-of-range cluster count, reference index or row count
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    #[error("k-means fit failed: {0}")]
    KMeans(#[from] linfa_clustering::KMeansError),

    #[error("linear regression failed: {0}")]
    Regression(#[from] linfa_linear::LinearError<f64>),

    #[error("metric computation failed: {0}")]
    Linfa(#[from] linfa::Error),

    #[error("data frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn missing(column: impl Into<String>) -> Self {
        Error::MissingData {
            column: column.into(),
        }
    }
}
