//! Re-clustering subscribers on the (engagement, experience) score plane

use crate::data::FeatureTable;
use crate::error::{Error, Result};
use crate::model::{ClusterModel, FitParams};
use crate::satisfaction::{SatisfactionTable, CLUSTER_LABEL, ENGAGEMENT_SCORE, EXPERIENCE_SCORE};
use log::info;
use std::collections::BTreeMap;

/// Mean scores of one satisfaction cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub label: usize,
    pub size: usize,
    pub mean_satisfaction: f64,
    pub mean_experience: f64,
}

/// Labelled table together with the model that produced the labels
#[derive(Debug, Clone)]
pub struct SatisfactionClusters {
    pub table: SatisfactionTable,
    pub model: ClusterModel,
}

/// Groups subscribers by k-means over their standardized score pair
#[derive(Debug, Clone, Default)]
pub struct SatisfactionClusterer {
    params: FitParams,
}

impl SatisfactionClusterer {
    pub fn new(params: FitParams) -> Self {
        Self { params }
    }

    pub fn fit(
        &self,
        table: &SatisfactionTable,
        n_clusters: usize,
    ) -> Result<SatisfactionClusters> {
        let features = FeatureTable::new(table.subscriber_ids().iter().cloned())
            .with_column(ENGAGEMENT_SCORE, table.engagement_score().clone())?
            .with_column(EXPERIENCE_SCORE, table.experience_score().clone())?;

        let model = ClusterModel::fit(
            &features,
            &[ENGAGEMENT_SCORE, EXPERIENCE_SCORE],
            n_clusters,
            &self.params,
        )?;
        let labelled = table.clone().with_cluster_labels(model.labels().clone())?;

        info!("Satisfaction clusters: sizes {:?}", model.cluster_sizes());
        Ok(SatisfactionClusters {
            table: labelled,
            model,
        })
    }

    /// Mean satisfaction and experience per label present, ascending label
    pub fn aggregate_by_cluster(table: &SatisfactionTable) -> Result<Vec<ClusterSummary>> {
        let labels = table
            .cluster_labels()
            .ok_or_else(|| Error::missing(CLUSTER_LABEL))?;

        let mut groups: BTreeMap<usize, (usize, f64, f64)> = BTreeMap::new();
        for ((&label, &satisfaction), &experience) in labels
            .iter()
            .zip(table.satisfaction_score())
            .zip(table.experience_score())
        {
            let entry = groups.entry(label).or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += satisfaction;
            entry.2 += experience;
        }

        Ok(groups
            .into_iter()
            .map(|(label, (size, satisfaction, experience))| ClusterSummary {
                label,
                size,
                mean_satisfaction: satisfaction / size as f64,
                mean_experience: experience / size as f64,
            })
            .collect())
    }
}
