//! End-to-end scoring pipeline

use crate::cleaning::clean;
use crate::config::PipelineConfig;
use crate::data::{aggregate_sessions, FeatureTable};
use crate::error::Result;
use crate::model::ClusterModel;
use crate::predictor::{RegressionReport, SatisfactionPredictor};
use crate::satisfaction::{SatisfactionAggregator, SatisfactionTable, SubscriberScore};
use crate::score::EngagementExperienceScorer;
use crate::segments::{ClusterSummary, SatisfactionClusterer};
use log::{debug, info};

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub engagement_model: ClusterModel,
    pub experience_model: ClusterModel,
    /// Scores with satisfaction cluster labels attached
    pub scores: SatisfactionTable,
    pub top: Vec<SubscriberScore>,
    pub predictor: SatisfactionPredictor,
    pub regression: RegressionReport,
    pub satisfaction_model: ClusterModel,
    pub cluster_summaries: Vec<ClusterSummary>,
}

/// Clean session rows (when enabled) and fold them into one row per
/// subscriber
pub fn prepare_features(sessions: FeatureTable, config: &PipelineConfig) -> Result<FeatureTable> {
    let cleaned = clean(sessions, &config.cleaning)?;
    aggregate_sessions(&cleaned)
}

/// Fit the engagement and experience models.
///
/// Each fit seeds its own RNG, so the parallel and sequential paths give
/// identical models.
pub fn fit_cluster_models(
    table: &FeatureTable,
    config: &PipelineConfig,
) -> Result<(ClusterModel, ClusterModel)> {
    let params = config.fit_params();
    let engagement = || {
        ClusterModel::fit(
            table,
            &config.engagement_features,
            config.engagement_clusters,
            &params,
        )
    };
    let experience = || {
        ClusterModel::fit(
            table,
            &config.experience_features,
            config.experience_clusters,
            &params,
        )
    };

    let (engagement, experience) = if config.parallel {
        debug!("Fitting engagement and experience models in parallel");
        rayon::join(engagement, experience)
    } else {
        (engagement(), experience())
    };
    Ok((engagement?, experience?))
}

/// Run every stage on a per-subscriber feature table
pub fn run_pipeline(table: &FeatureTable, config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate()?;
    info!("Running satisfaction pipeline on {} subscribers", table.len());

    let (engagement_model, experience_model) = fit_cluster_models(table, config)?;

    let scorer = EngagementExperienceScorer::new(
        &engagement_model,
        config.engagement_reference,
        &experience_model,
        config.experience_reference,
    )?;
    let scores = scorer.score_table(table)?;
    let satisfaction = SatisfactionAggregator::aggregate(&scores)?;
    let top = SatisfactionAggregator::top_n(&satisfaction, config.top_n);

    let mut predictor = SatisfactionPredictor::new(config.seed);
    let regression = predictor.fit(&satisfaction)?;

    let clusters = SatisfactionClusterer::new(config.fit_params())
        .fit(&satisfaction, config.satisfaction_clusters)?;
    let cluster_summaries = SatisfactionClusterer::aggregate_by_cluster(&clusters.table)?;

    info!("Pipeline complete");
    Ok(PipelineReport {
        engagement_model,
        experience_model,
        scores: clusters.table,
        top,
        predictor,
        regression,
        satisfaction_model: clusters.model,
        cluster_summaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        RTT_DL, RTT_UL, SESSION_DURATION, TCP_RETRANS_DL, TCP_RETRANS_UL, THROUGHPUT_DL,
        THROUGHPUT_UL, TOTAL_DL_BYTES, TOTAL_UL_BYTES,
    };

    fn create_test_table(n: usize) -> FeatureTable {
        let ids: Vec<String> = (0..n).map(|i| format!("{}", 33600000000u64 + i as u64)).collect();
        let wave = |scale: f64, period: f64, offset: f64| -> Vec<f64> {
            (0..n)
                .map(|i| offset + scale * ((i as f64 * period) % 17.0))
                .collect()
        };

        FeatureTable::new(ids)
            .with_column(SESSION_DURATION, wave(1000.0, 1.3, 500.0))
            .unwrap()
            .with_column(TOTAL_DL_BYTES, wave(40.0, 2.9, 10.0))
            .unwrap()
            .with_column(TOTAL_UL_BYTES, wave(3.0, 3.7, 1.0))
            .unwrap()
            .with_column(RTT_DL, wave(5.0, 1.9, 20.0))
            .unwrap()
            .with_column(RTT_UL, wave(1.0, 2.3, 2.0))
            .unwrap()
            .with_column(THROUGHPUT_DL, wave(2.0, 4.1, 0.5))
            .unwrap()
            .with_column(THROUGHPUT_UL, wave(0.4, 5.3, 0.1))
            .unwrap()
            .with_column(TCP_RETRANS_DL, wave(0.7, 1.1, 0.0))
            .unwrap()
            .with_column(TCP_RETRANS_UL, wave(0.2, 6.7, 0.0))
            .unwrap()
    }

    #[test]
    fn test_run_pipeline() {
        let table = create_test_table(40);
        let report = run_pipeline(&table, &PipelineConfig::default()).unwrap();

        assert_eq!(report.scores.len(), 40);
        assert_eq!(report.top.len(), 10);
        assert!(report.scores.engagement_score().iter().all(|&s| s >= 0.0));
        assert!(report.scores.experience_score().iter().all(|&s| s >= 0.0));
        assert!(report.predictor.is_trained());
        assert!(report.regression.r2 > 0.99);
        assert_eq!(
            report.cluster_summaries.iter().map(|s| s.size).sum::<usize>(),
            40
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let table = create_test_table(30);
        let parallel = PipelineConfig::default();
        let sequential = PipelineConfig {
            parallel: false,
            ..PipelineConfig::default()
        };

        let a = run_pipeline(&table, &parallel).unwrap();
        let b = run_pipeline(&table, &sequential).unwrap();

        assert_eq!(a.scores, b.scores);
        assert_eq!(a.engagement_model.centroids(), b.engagement_model.centroids());
        assert_eq!(a.experience_model.labels(), b.experience_model.labels());
    }

    #[test]
    fn test_missing_cell_is_imputed_for_fit_and_scoring() {
        let mut rtt_ul: Vec<f64> = (0..20).map(|i| 2.0 + (i % 5) as f64).collect();
        rtt_ul[3] = f64::NAN;
        let table = create_test_table(20).with_column(RTT_UL, rtt_ul).unwrap();

        let report = run_pipeline(&table, &PipelineConfig::default()).unwrap();
        assert!(report.scores.experience_score().iter().all(|s| s.is_finite()));
        assert!(report.experience_model.fill_value(RTT_UL).unwrap().is_finite());
    }

    #[test]
    fn test_unknown_feature_fails_fast() {
        let table = create_test_table(20);
        let config = PipelineConfig {
            engagement_features: vec!["social_media_dl".to_string()],
            ..PipelineConfig::default()
        };
        assert!(run_pipeline(&table, &config).is_err());
    }
}
