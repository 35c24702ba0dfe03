//! xdrforge: subscriber engagement, experience and satisfaction scoring
//!
//! Subscribers are clustered independently on engagement and experience
//! features; each subscriber is scored by its distance to a reference
//! centroid of each model, the two scores are fused into a satisfaction
//! score, a regression is fitted on it and subscribers are re-clustered on
//! the score plane.

pub mod cleaning;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod predictor;
pub mod satisfaction;
pub mod scaler;
pub mod score;
pub mod segments;

// Re-export public items for easier access
pub use cleaning::{clean, CleaningOptions};
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::{aggregate_sessions, load_sessions, FeatureSource, FeatureTable};
pub use error::{Error, Result};
pub use model::{Centroid, ClusterModel, ClusterStatistics, ColumnStats, FitParams};
pub use pipeline::{fit_cluster_models, prepare_features, run_pipeline, PipelineReport};
pub use predictor::{RegressionReport, SatisfactionPredictor};
pub use satisfaction::{SatisfactionAggregator, SatisfactionTable, SubscriberScore};
pub use scaler::StandardScaler;
pub use score::{score, CentroidScorer, EngagementExperienceScorer, ScoreTable};
pub use segments::{ClusterSummary, SatisfactionClusterer};
