//! Satisfaction score fusion and ranking

use crate::error::{Error, Result};
use crate::score::ScoreTable;
use log::debug;
use ndarray::Array1;

pub const ENGAGEMENT_SCORE: &str = "engagement_score";
pub const EXPERIENCE_SCORE: &str = "experience_score";
pub const SATISFACTION_SCORE: &str = "satisfaction_score";
pub const CLUSTER_LABEL: &str = "cluster_label";

/// Metrics accepted by [`SatisfactionAggregator::rank_by`]
pub const RANKABLE_METRICS: [&str; 3] = [ENGAGEMENT_SCORE, EXPERIENCE_SCORE, SATISFACTION_SCORE];

/// One output row
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberScore {
    pub subscriber_id: String,
    pub engagement_score: f64,
    pub experience_score: f64,
    pub satisfaction_score: f64,
    pub cluster_label: Option<usize>,
}

/// Scores plus the fused satisfaction column and, once clustered, a label
/// per subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct SatisfactionTable {
    subscriber_ids: Vec<String>,
    engagement_score: Array1<f64>,
    experience_score: Array1<f64>,
    satisfaction_score: Array1<f64>,
    cluster_labels: Option<Array1<usize>>,
}

impl SatisfactionTable {
    pub fn len(&self) -> usize {
        self.subscriber_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriber_ids.is_empty()
    }

    pub fn subscriber_ids(&self) -> &[String] {
        &self.subscriber_ids
    }

    pub fn engagement_score(&self) -> &Array1<f64> {
        &self.engagement_score
    }

    pub fn experience_score(&self) -> &Array1<f64> {
        &self.experience_score
    }

    pub fn satisfaction_score(&self) -> &Array1<f64> {
        &self.satisfaction_score
    }

    pub fn cluster_labels(&self) -> Option<&Array1<usize>> {
        self.cluster_labels.as_ref()
    }

    /// Score column by name
    pub fn metric(&self, name: &str) -> Result<&Array1<f64>> {
        match name {
            ENGAGEMENT_SCORE => Ok(&self.engagement_score),
            EXPERIENCE_SCORE => Ok(&self.experience_score),
            SATISFACTION_SCORE => Ok(&self.satisfaction_score),
            other => Err(Error::UnknownMetric(other.to_string())),
        }
    }

    /// Attach one cluster label per row, replacing existing labels
    pub fn with_cluster_labels(mut self, labels: Array1<usize>) -> Result<Self> {
        if labels.len() != self.len() {
            return Err(Error::DimensionMismatch {
                expected: self.len(),
                found: labels.len(),
                detail: "cluster labels".to_string(),
            });
        }
        self.cluster_labels = Some(labels);
        Ok(self)
    }

    /// The two input score columns, without the derived ones
    pub fn scores(&self) -> ScoreTable {
        ScoreTable {
            subscriber_ids: self.subscriber_ids.clone(),
            engagement_score: self.engagement_score.clone(),
            experience_score: self.experience_score.clone(),
        }
    }

    pub fn row(&self, index: usize) -> SubscriberScore {
        SubscriberScore {
            subscriber_id: self.subscriber_ids[index].clone(),
            engagement_score: self.engagement_score[index],
            experience_score: self.experience_score[index],
            satisfaction_score: self.satisfaction_score[index],
            cluster_label: self.cluster_labels.as_ref().map(|labels| labels[index]),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = SubscriberScore> + '_ {
        (0..self.len()).map(|index| self.row(index))
    }
}

/// Fuses engagement and experience into satisfaction and ranks the result
#[derive(Debug, Clone, Copy, Default)]
pub struct SatisfactionAggregator;

impl SatisfactionAggregator {
    /// satisfaction = (engagement + experience) / 2 for every row.
    ///
    /// Always builds a fresh table, so repeated calls give identical output.
    pub fn aggregate(scores: &ScoreTable) -> Result<SatisfactionTable> {
        let scores = ScoreTable::new(
            scores.subscriber_ids.clone(),
            scores.engagement_score.clone(),
            scores.experience_score.clone(),
        )?;
        let satisfaction_score = (&scores.engagement_score + &scores.experience_score) / 2.0;

        debug!("Aggregated satisfaction for {} subscribers", scores.len());
        Ok(SatisfactionTable {
            subscriber_ids: scores.subscriber_ids,
            engagement_score: scores.engagement_score,
            experience_score: scores.experience_score,
            satisfaction_score,
            cluster_labels: None,
        })
    }

    /// The `n` most satisfied subscribers, highest first
    pub fn top_n(table: &SatisfactionTable, n: usize) -> Vec<SubscriberScore> {
        ranked(&table.satisfaction_score, n)
            .into_iter()
            .map(|index| table.row(index))
            .collect()
    }

    /// The `n` highest rows by any score column
    pub fn rank_by(
        table: &SatisfactionTable,
        metric: &str,
        n: usize,
    ) -> Result<Vec<SubscriberScore>> {
        let values = table.metric(metric)?;
        Ok(ranked(values, n)
            .into_iter()
            .map(|index| table.row(index))
            .collect())
    }
}

/// Indices of the `n` largest values, descending; ties keep row order
fn ranked(values: &Array1<f64>, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order.truncate(n.min(values.len()));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(ids: &[&str], engagement: Vec<f64>, experience: Vec<f64>) -> ScoreTable {
        ScoreTable::new(ids.iter().map(|s| s.to_string()).collect(), engagement, experience)
            .unwrap()
    }

    #[test]
    fn test_satisfaction_is_mean() {
        let input = scores(&["a", "b", "c"], vec![1.5, 0.0, 7.3], vec![2.25, 9.1, 0.7]);
        let table = SatisfactionAggregator::aggregate(&input).unwrap();

        for row in table.rows() {
            let expected = (row.engagement_score + row.experience_score) / 2.0;
            assert!((row.satisfaction_score - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_top_n_scenario() {
        let input = scores(&["A", "B"], vec![10.0, 30.0], vec![20.0, 10.0]);
        let table = SatisfactionAggregator::aggregate(&input).unwrap();

        assert_eq!(table.satisfaction_score().to_vec(), vec![15.0, 20.0]);
        let top = SatisfactionAggregator::top_n(&table, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].subscriber_id, "B");
    }

    #[test]
    fn test_top_n_sorted_descending_and_clamped() {
        let input = scores(
            &["a", "b", "c", "d", "e"],
            vec![3.0, 9.0, 1.0, 5.0, 9.0],
            vec![3.0, 1.0, 1.0, 7.0, 1.0],
        );
        let table = SatisfactionAggregator::aggregate(&input).unwrap();
        let top = SatisfactionAggregator::top_n(&table, 50);

        assert_eq!(top.len(), 5);
        for pair in top.windows(2) {
            assert!(pair[0].satisfaction_score >= pair[1].satisfaction_score);
        }
        // b and e tie at 5.0 and keep their original order
        let ids: Vec<&str> = top.iter().map(|r| r.subscriber_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "e", "a", "c"]);
    }

    #[test]
    fn test_top_n_zero_and_empty() {
        let input = scores(&["a"], vec![1.0], vec![1.0]);
        let table = SatisfactionAggregator::aggregate(&input).unwrap();
        assert!(SatisfactionAggregator::top_n(&table, 0).is_empty());

        let empty = SatisfactionAggregator::aggregate(&scores(&[], vec![], vec![])).unwrap();
        assert!(SatisfactionAggregator::top_n(&empty, 3).is_empty());
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let input = scores(&["a", "b"], vec![1.0, 2.0], vec![3.0, 5.0]);
        let first = SatisfactionAggregator::aggregate(&input).unwrap();
        let second = SatisfactionAggregator::aggregate(&input).unwrap();
        assert_eq!(first, second);

        let again = SatisfactionAggregator::aggregate(&first.scores()).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_rank_by_metric() {
        let input = scores(&["a", "b", "c"], vec![1.0, 5.0, 3.0], vec![9.0, 0.0, 4.0]);
        let table = SatisfactionAggregator::aggregate(&input).unwrap();

        let by_experience = SatisfactionAggregator::rank_by(&table, EXPERIENCE_SCORE, 2).unwrap();
        assert_eq!(by_experience[0].subscriber_id, "a");
        assert_eq!(by_experience[1].subscriber_id, "c");

        let result = SatisfactionAggregator::rank_by(&table, "throughput", 2);
        assert!(matches!(result, Err(Error::UnknownMetric(name)) if name == "throughput"));
    }

    #[test]
    fn test_cluster_labels_length_checked() {
        let input = scores(&["a", "b"], vec![1.0, 2.0], vec![3.0, 5.0]);
        let table = SatisfactionAggregator::aggregate(&input).unwrap();

        assert!(table.clone().with_cluster_labels(Array1::from(vec![0])).is_err());
        let labelled = table.with_cluster_labels(Array1::from(vec![1, 0])).unwrap();
        assert_eq!(labelled.row(0).cluster_label, Some(1));
    }
}
