//! Distance-to-reference-centroid scoring

use crate::data::{FeatureSource, FeatureTable};
use crate::error::{Error, Result};
use crate::model::{Centroid, ClusterModel};
use log::{debug, info};
use ndarray::Array1;
use std::collections::HashSet;

/// Euclidean distance from `features` to `centroid` over `feature_columns`.
///
/// Both sides are looked up by column name, so any permutation of
/// `feature_columns` gives the same result. The column set must match the
/// centroid exactly; nothing is truncated or padded. A non-finite feature
/// value fails with [`Error::MissingData`].
pub fn score<F, S>(features: &F, centroid: &Centroid, feature_columns: &[S]) -> Result<f64>
where
    F: FeatureSource + ?Sized,
    S: AsRef<str>,
{
    let mismatch = |detail: String| Error::DimensionMismatch {
        expected: centroid.len(),
        found: feature_columns.len(),
        detail,
    };

    if feature_columns.len() != centroid.len() {
        return Err(mismatch("feature column count".to_string()));
    }
    let distinct: HashSet<&str> = feature_columns.iter().map(|c| c.as_ref()).collect();
    if distinct.len() != feature_columns.len() {
        return Err(mismatch("duplicate feature column".to_string()));
    }

    let mut sum = 0.0;
    for column in feature_columns {
        let column = column.as_ref();
        let reference = centroid
            .value(column)
            .ok_or_else(|| mismatch(format!("centroid has no column '{column}'")))?;
        let value = features
            .feature(column)
            .ok_or_else(|| mismatch(format!("subscriber has no column '{column}'")))?;
        if !value.is_finite() {
            return Err(Error::missing(column));
        }
        sum += (value - reference).powi(2);
    }

    Ok(sum.sqrt())
}

/// Feature lookup that fills missing cells with the model's fit-time means
struct Imputed<'s, F: ?Sized> {
    features: &'s F,
    model: &'s ClusterModel,
}

impl<F: FeatureSource + ?Sized> FeatureSource for Imputed<'_, F> {
    fn feature(&self, column: &str) -> Option<f64> {
        let value = self.features.feature(column)?;
        if value.is_finite() {
            Some(value)
        } else {
            self.model.fill_value(column)
        }
    }
}

/// Scores subscribers against one reference cluster of a fitted model.
///
/// Missing cells are imputed the same way the model imputed them at fit
/// time; absent columns still fail.
#[derive(Debug, Clone)]
pub struct CentroidScorer<'a> {
    model: &'a ClusterModel,
    reference: usize,
    centroid: Centroid,
}

impl<'a> CentroidScorer<'a> {
    /// `reference` is used verbatim as the anchor cluster index
    pub fn new(model: &'a ClusterModel, reference: usize) -> Result<Self> {
        let centroid = model.centroid(reference)?;
        debug!(
            "Reference cluster {} centroid over {:?}: {:?}",
            reference,
            centroid.columns(),
            centroid.values()
        );
        Ok(Self {
            model,
            reference,
            centroid,
        })
    }

    pub fn reference(&self) -> usize {
        self.reference
    }

    pub fn centroid(&self) -> &Centroid {
        &self.centroid
    }

    pub fn score<F: FeatureSource + ?Sized>(&self, features: &F) -> Result<f64> {
        let imputed = Imputed {
            features,
            model: self.model,
        };
        score(&imputed, &self.centroid, self.model.feature_columns())
    }

    /// Score every row of `table`
    pub fn score_table(&self, table: &FeatureTable) -> Result<Array1<f64>> {
        (0..table.len())
            .map(|row| self.score(&table.row(row)))
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from)
    }
}

/// Per-subscriber engagement and experience scores
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    pub subscriber_ids: Vec<String>,
    pub engagement_score: Array1<f64>,
    pub experience_score: Array1<f64>,
}

impl ScoreTable {
    pub fn new(
        subscriber_ids: Vec<String>,
        engagement_score: impl Into<Array1<f64>>,
        experience_score: impl Into<Array1<f64>>,
    ) -> Result<Self> {
        let engagement_score = engagement_score.into();
        let experience_score = experience_score.into();
        for (name, len) in [
            ("engagement_score", engagement_score.len()),
            ("experience_score", experience_score.len()),
        ] {
            if len != subscriber_ids.len() {
                return Err(Error::DimensionMismatch {
                    expected: subscriber_ids.len(),
                    found: len,
                    detail: format!("{name} length"),
                });
            }
        }
        Ok(Self {
            subscriber_ids,
            engagement_score,
            experience_score,
        })
    }

    pub fn len(&self) -> usize {
        self.subscriber_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriber_ids.is_empty()
    }
}

/// Combines the engagement and experience models into one scoring pass
#[derive(Debug, Clone)]
pub struct EngagementExperienceScorer<'a> {
    engagement: CentroidScorer<'a>,
    experience: CentroidScorer<'a>,
}

impl<'a> EngagementExperienceScorer<'a> {
    pub fn new(
        engagement_model: &'a ClusterModel,
        engagement_reference: usize,
        experience_model: &'a ClusterModel,
        experience_reference: usize,
    ) -> Result<Self> {
        Ok(Self {
            engagement: CentroidScorer::new(engagement_model, engagement_reference)?,
            experience: CentroidScorer::new(experience_model, experience_reference)?,
        })
    }

    pub fn engagement(&self) -> &CentroidScorer<'a> {
        &self.engagement
    }

    pub fn experience(&self) -> &CentroidScorer<'a> {
        &self.experience
    }

    /// Score every subscriber of `table` on both axes
    pub fn score_table(&self, table: &FeatureTable) -> Result<ScoreTable> {
        let engagement = self.engagement.score_table(table)?;
        let experience = self.experience.score_table(table)?;
        info!("Scored {} subscribers", table.len());
        ScoreTable::new(table.subscriber_ids().to_vec(), engagement, experience)
    }
}
