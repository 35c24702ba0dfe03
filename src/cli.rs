//! Command-line interface definitions and argument parsing

use crate::config::PipelineConfig;
use clap::Parser;

/// Subscriber satisfaction scoring over telecom xDR sessions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the session-level xDR CSV file
    #[arg(short, long, default_value = "xdr_sessions.csv")]
    pub input: String,

    /// Optional TOML file with pipeline settings
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output path for the per-subscriber score table
    #[arg(short, long)]
    pub output: Option<String>,

    /// Number of engagement clusters
    #[arg(long)]
    pub engagement_k: Option<usize>,

    /// Number of experience clusters
    #[arg(long)]
    pub experience_k: Option<usize>,

    /// Number of satisfaction clusters
    #[arg(long)]
    pub satisfaction_k: Option<usize>,

    /// Engagement cluster index used as the "least engaged" anchor
    #[arg(long)]
    pub engagement_ref: Option<usize>,

    /// Experience cluster index used as the "worst experience" anchor
    #[arg(long)]
    pub experience_ref: Option<usize>,

    /// Number of most satisfied subscribers to print
    #[arg(short = 'n', long)]
    pub top_n: Option<usize>,

    /// Seed for clustering and the train/test split
    #[arg(long)]
    pub seed: Option<u64>,

    /// Prediction mode: engagement and experience scores as "e,x"
    /// Example: --predict "50,45"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Fit the engagement and experience models one after the other
    #[arg(long)]
    pub sequential: bool,

    /// Input is already clean; skip imputation, capping and unit conversion
    #[arg(long)]
    pub no_clean: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse engagement and experience scores from the predict string
    /// Expected format: "engagement,experience"
    pub fn parse_prediction_scores(&self) -> anyhow::Result<Option<(f64, f64)>> {
        if let Some(ref predict_str) = self.predict {
            let parts: Vec<&str> = predict_str.split(',').collect();
            if parts.len() != 2 {
                anyhow::bail!("Predict values must be in format 'engagement,experience'");
            }

            let engagement: f64 = parts[0]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid engagement score: {}", parts[0]))?;
            let experience: f64 = parts[1]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid experience score: {}", parts[1]))?;

            Ok(Some((engagement, experience)))
        } else {
            Ok(None)
        }
    }

    /// Apply command-line overrides on top of `config`
    pub fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(k) = self.engagement_k {
            config.engagement_clusters = k;
        }
        if let Some(k) = self.experience_k {
            config.experience_clusters = k;
        }
        if let Some(k) = self.satisfaction_k {
            config.satisfaction_clusters = k;
        }
        if let Some(index) = self.engagement_ref {
            config.engagement_reference = index;
        }
        if let Some(index) = self.experience_ref {
            config.experience_reference = index;
        }
        if let Some(n) = self.top_n {
            config.top_n = n;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.sequential {
            config.parallel = false;
        }
        if self.no_clean {
            config.cleaning.enabled = false;
        }
        config
    }
}
