//! Writing the per-subscriber output table

use crate::data::SUBSCRIBER_ID;
use crate::error::Result;
use crate::satisfaction::{
    SatisfactionTable, CLUSTER_LABEL, ENGAGEMENT_SCORE, EXPERIENCE_SCORE, SATISFACTION_SCORE,
};
use log::info;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Convert the output table to a Polars `DataFrame`.
///
/// `cluster_label` is only present once the table has been clustered.
pub fn to_dataframe(table: &SatisfactionTable) -> Result<DataFrame> {
    let mut columns = vec![
        Series::new(SUBSCRIBER_ID, table.subscriber_ids().to_vec()),
        Series::new(ENGAGEMENT_SCORE, table.engagement_score().to_vec()),
        Series::new(EXPERIENCE_SCORE, table.experience_score().to_vec()),
        Series::new(SATISFACTION_SCORE, table.satisfaction_score().to_vec()),
    ];
    if let Some(labels) = table.cluster_labels() {
        let labels: Vec<u32> = labels.iter().map(|&label| label as u32).collect();
        columns.push(Series::new(CLUSTER_LABEL, labels));
    }
    Ok(DataFrame::new(columns)?)
}

/// Write the table as CSV, replacing any existing file at `path`
pub fn write_csv<P: AsRef<Path>>(table: &SatisfactionTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut df = to_dataframe(table)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;

    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satisfaction::SatisfactionAggregator;
    use crate::score::ScoreTable;
    use ndarray::Array1;

    fn create_test_table() -> SatisfactionTable {
        let scores = ScoreTable::new(
            vec!["a".to_string(), "b".to_string()],
            vec![1.0, 3.0],
            vec![2.0, 5.0],
        )
        .unwrap();
        SatisfactionAggregator::aggregate(&scores).unwrap()
    }

    #[test]
    fn test_to_dataframe_columns() {
        let table = create_test_table();
        let df = to_dataframe(&table).unwrap();
        assert_eq!(
            df.get_column_names(),
            vec![SUBSCRIBER_ID, ENGAGEMENT_SCORE, EXPERIENCE_SCORE, SATISFACTION_SCORE]
        );

        let labelled = table
            .with_cluster_labels(Array1::from(vec![0, 1]))
            .unwrap();
        let df = to_dataframe(&labelled).unwrap();
        assert_eq!(df.width(), 5);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_write_csv_replaces_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "stale content\n").unwrap();

        write_csv(&create_test_table(), file.path()).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        assert!(written.starts_with("subscriber_id,engagement_score"));
        assert!(!written.contains("stale"));
        assert_eq!(written.lines().count(), 3);
    }
}
