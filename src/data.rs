//! Subscriber feature table and xDR session loading using Polars

use crate::error::{Error, Result};
use log::{debug, info};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;

/// Key column, never used as a feature
pub const SUBSCRIBER_ID: &str = "subscriber_id";
pub const SESSION_DURATION: &str = "session_duration";
pub const TOTAL_DL_BYTES: &str = "total_dl_bytes";
pub const TOTAL_UL_BYTES: &str = "total_ul_bytes";
pub const RTT_DL: &str = "rtt_dl";
pub const RTT_UL: &str = "rtt_ul";
pub const THROUGHPUT_DL: &str = "throughput_dl";
pub const THROUGHPUT_UL: &str = "throughput_ul";
pub const TCP_RETRANS_DL: &str = "tcp_retrans_dl";
pub const TCP_RETRANS_UL: &str = "tcp_retrans_ul";
/// Number of sessions folded into a subscriber row by [`aggregate_sessions`]
pub const SESSIONS: &str = "sessions";

/// Numeric columns every session file must provide
pub const SESSION_COLUMNS: [&str; 9] = [
    SESSION_DURATION,
    TOTAL_DL_BYTES,
    TOTAL_UL_BYTES,
    RTT_DL,
    RTT_UL,
    THROUGHPUT_DL,
    THROUGHPUT_UL,
    TCP_RETRANS_DL,
    TCP_RETRANS_UL,
];

/// Columns summed per subscriber; every other column is averaged
const SUMMED_COLUMNS: [&str; 3] = [SESSION_DURATION, TOTAL_DL_BYTES, TOTAL_UL_BYTES];

/// Named-column lookup used by the scorers.
///
/// Returning `None` means the column is not present at all; a present but
/// missing value is reported as `Some(NaN)`.
pub trait FeatureSource {
    fn feature(&self, column: &str) -> Option<f64>;
}

impl FeatureSource for HashMap<String, f64> {
    fn feature(&self, column: &str) -> Option<f64> {
        self.get(column).copied()
    }
}

impl FeatureSource for HashMap<&str, f64> {
    fn feature(&self, column: &str) -> Option<f64> {
        self.get(column).copied()
    }
}

/// Rectangular table of named `f64` columns keyed by subscriber id.
///
/// Missing values are stored as `NaN`. Column order is insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    subscriber_ids: Vec<String>,
    columns: Vec<(String, Array1<f64>)>,
}

impl FeatureTable {
    /// Empty table over the given subscriber ids
    pub fn new<I, S>(subscriber_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subscriber_ids: subscriber_ids.into_iter().map(Into::into).collect(),
            columns: Vec::new(),
        }
    }

    /// Add a column, replacing any existing column of the same name
    pub fn with_column(mut self, name: &str, values: impl Into<Array1<f64>>) -> Result<Self> {
        let values = values.into();
        if values.len() != self.len() {
            return Err(Error::DimensionMismatch {
                expected: self.len(),
                found: values.len(),
                detail: format!("column '{name}' length"),
            });
        }
        match self.columns.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, column)) => *column = values,
            None => self.columns.push((name.to_string(), values)),
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.subscriber_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriber_ids.is_empty()
    }

    pub fn subscriber_ids(&self) -> &[String] {
        &self.subscriber_ids
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(existing, _)| existing == name)
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Result<&Array1<f64>> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, values)| values)
            .ok_or_else(|| Error::UnknownMetric(name.to_string()))
    }

    pub(crate) fn columns_mut(&mut self) -> impl Iterator<Item = (&str, &mut Array1<f64>)> {
        self.columns
            .iter_mut()
            .map(|(name, values)| (name.as_str(), values))
    }

    /// Build a `(rows, columns.len())` matrix with columns in exactly the
    /// requested order
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Result<Array2<f64>> {
        let selected = columns
            .iter()
            .map(|name| self.column(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Array2::from_shape_fn(
            (self.len(), selected.len()),
            |(row, col)| selected[col][row],
        ))
    }

    /// Borrowed view of one subscriber row
    pub fn row(&self, index: usize) -> RowView<'_> {
        RowView { table: self, index }
    }
}

/// One row of a [`FeatureTable`], addressable by column name
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a FeatureTable,
    index: usize,
}

impl RowView<'_> {
    pub fn subscriber_id(&self) -> &str {
        &self.table.subscriber_ids[self.index]
    }
}

impl FeatureSource for RowView<'_> {
    fn feature(&self, column: &str) -> Option<f64> {
        self.table
            .column(column)
            .ok()
            .and_then(|values| values.get(self.index).copied())
    }
}

/// Load a session-level xDR CSV into a [`FeatureTable`].
///
/// Rows without a subscriber id are dropped. Null numeric cells become
/// `NaN` and are left for the cleaning stage.
pub fn load_sessions<P: AsRef<Path>>(path: P) -> Result<FeatureTable> {
    let path = path.as_ref();
    debug!("Loading sessions from {}", path.display());

    let df = LazyCsvReader::new(path).has_header(true).finish()?.collect()?;

    let available = df.get_column_names();
    for required in std::iter::once(SUBSCRIBER_ID).chain(SESSION_COLUMNS) {
        if !available.contains(&required) {
            return Err(Error::missing(required));
        }
    }

    let df = df
        .lazy()
        .filter(col(SUBSCRIBER_ID).is_not_null())
        .collect()?;

    let subscriber_ids: Vec<String> = df
        .column(SUBSCRIBER_ID)?
        .cast(&DataType::String)?
        .str()?
        .into_no_null_iter()
        .map(str::to_string)
        .collect();

    let mut table = FeatureTable::new(subscriber_ids);
    for name in SESSION_COLUMNS {
        let values: Vec<f64> = df
            .column(name)?
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect();
        table = table.with_column(name, values)?;
    }

    info!("Loaded {} sessions from {}", table.len(), path.display());
    Ok(table)
}

/// Fold session rows into one row per subscriber, in first-appearance order.
///
/// Duration and byte totals are summed, all other columns are averaged.
/// `NaN` cells are skipped; a group with no finite value stays `NaN`.
pub fn aggregate_sessions(sessions: &FeatureTable) -> Result<FeatureTable> {
    let mut group_of: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut ids: Vec<String> = Vec::new();

    for (row, id) in sessions.subscriber_ids().iter().enumerate() {
        let group = *group_of.entry(id.as_str()).or_insert_with(|| {
            ids.push(id.clone());
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(row);
    }

    let counts: Vec<f64> = groups.iter().map(|rows| rows.len() as f64).collect();
    let mut table = FeatureTable::new(ids).with_column(SESSIONS, counts)?;

    for (name, values) in &sessions.columns {
        let summed = SUMMED_COLUMNS.contains(&name.as_str());
        let folded: Vec<f64> = groups
            .iter()
            .map(|rows| {
                let finite: Vec<f64> = rows
                    .iter()
                    .map(|&row| values[row])
                    .filter(|value| value.is_finite())
                    .collect();
                if finite.is_empty() {
                    f64::NAN
                } else if summed {
                    finite.iter().sum()
                } else {
                    finite.iter().sum::<f64>() / finite.len() as f64
                }
            })
            .collect();
        table = table.with_column(name, folded)?;
    }

    debug!(
        "Aggregated {} sessions into {} subscribers",
        sessions.len(),
        table.len()
    );
    Ok(table)
}
