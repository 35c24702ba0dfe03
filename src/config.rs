//! Pipeline configuration loaded from TOML and overridden from the CLI

use crate::cleaning::CleaningOptions;
use crate::data::{
    RTT_DL, RTT_UL, SESSION_DURATION, TCP_RETRANS_DL, TCP_RETRANS_UL, THROUGHPUT_DL,
    THROUGHPUT_UL, TOTAL_DL_BYTES, TOTAL_UL_BYTES,
};
use crate::error::{Error, Result};
use crate::model::FitParams;
use serde::Deserialize;
use std::path::Path;

/// Settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub engagement_features: Vec<String>,
    pub experience_features: Vec<String>,
    pub engagement_clusters: usize,
    pub experience_clusters: usize,
    pub satisfaction_clusters: usize,
    /// Cluster index treated as "least engaged"; used verbatim
    pub engagement_reference: usize,
    /// Cluster index treated as "worst experience"; used verbatim
    pub experience_reference: usize,
    pub top_n: usize,
    pub seed: u64,
    pub max_iters: u64,
    pub tolerance: f64,
    pub n_runs: usize,
    /// Fit the engagement and experience models concurrently
    pub parallel: bool,
    pub cleaning: CleaningOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let fit = FitParams::default();
        Self {
            engagement_features: [SESSION_DURATION, TOTAL_DL_BYTES, TOTAL_UL_BYTES]
                .map(String::from)
                .to_vec(),
            experience_features: [
                RTT_DL,
                RTT_UL,
                THROUGHPUT_DL,
                THROUGHPUT_UL,
                TCP_RETRANS_DL,
                TCP_RETRANS_UL,
            ]
            .map(String::from)
            .to_vec(),
            engagement_clusters: 3,
            experience_clusters: 3,
            satisfaction_clusters: 2,
            engagement_reference: 0,
            experience_reference: 0,
            top_n: 10,
            seed: fit.seed,
            max_iters: fit.max_iters,
            tolerance: fit.tolerance,
            n_runs: fit.n_runs,
            parallel: true,
            cleaning: CleaningOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a TOML file; absent keys keep their defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn fit_params(&self) -> FitParams {
        FitParams {
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            n_runs: self.n_runs,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engagement_features.is_empty() || self.experience_features.is_empty() {
            return Err(Error::Config("feature lists must not be empty".to_string()));
        }
        for (name, k) in [
            ("engagement_clusters", self.engagement_clusters),
            ("experience_clusters", self.experience_clusters),
            ("satisfaction_clusters", self.satisfaction_clusters),
        ] {
            if k == 0 {
                return Err(Error::Config(format!("{name} must be at least 1")));
            }
        }
        if self.engagement_reference >= self.engagement_clusters {
            return Err(Error::Config(format!(
                "engagement_reference {} out of range for {} clusters",
                self.engagement_reference, self.engagement_clusters
            )));
        }
        if self.experience_reference >= self.experience_clusters {
            return Err(Error::Config(format!(
                "experience_reference {} out of range for {} clusters",
                self.experience_reference, self.experience_clusters
            )));
        }
        if self.n_runs == 0 || self.max_iters == 0 {
            return Err(Error::Config("n_runs and max_iters must be positive".to_string()));
        }
        if !(self.tolerance > 0.0) {
            return Err(Error::Config("tolerance must be positive".to_string()));
        }
        let q = self.cleaning.cap_quantile;
        if !(q > 0.0 && q <= 1.0) {
            return Err(Error::Config(format!("cap_quantile must be in (0, 1], got {q}")));
        }
        Ok(())
    }
}
