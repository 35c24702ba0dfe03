//! Session cleaning: unit normalization, mean imputation and outlier capping

use crate::data::{
    FeatureTable, TCP_RETRANS_DL, TCP_RETRANS_UL, THROUGHPUT_DL, THROUGHPUT_UL, TOTAL_DL_BYTES,
    TOTAL_UL_BYTES,
};
use crate::error::{Error, Result};
use log::{debug, warn};
use ndarray::Array1;
use serde::Deserialize;

const BYTE_COLUMNS: [&str; 4] = [TOTAL_DL_BYTES, TOTAL_UL_BYTES, TCP_RETRANS_DL, TCP_RETRANS_UL];
const KBPS_COLUMNS: [&str; 2] = [THROUGHPUT_DL, THROUGHPUT_UL];

/// Options for [`clean`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CleaningOptions {
    /// Skip cleaning entirely when the input is already clean
    pub enabled: bool,
    /// Convert byte columns to megabytes and kbps columns to MB/s
    pub convert_units: bool,
    /// Values strictly above this quantile are replaced by the column mean
    pub cap_quantile: f64,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            convert_units: true,
            cap_quantile: 0.99,
        }
    }
}

/// Clean every column of `table`.
///
/// Fails with [`Error::MissingData`] when a column has no finite value,
/// since its mean is undefined.
pub fn clean(mut table: FeatureTable, options: &CleaningOptions) -> Result<FeatureTable> {
    if !options.enabled {
        return Ok(table);
    }
    if !(options.cap_quantile > 0.0 && options.cap_quantile <= 1.0) {
        return Err(Error::InvalidParameter(format!(
            "cap quantile must be in (0, 1], got {}",
            options.cap_quantile
        )));
    }

    for (name, values) in table.columns_mut() {
        if options.convert_units {
            if BYTE_COLUMNS.contains(&name) {
                values.mapv_inplace(|v| v / 1_000_000.0);
            } else if KBPS_COLUMNS.contains(&name) {
                values.mapv_inplace(|v| v / 8.0 / 1_000.0);
            }
        }

        let mean = finite_mean(values).ok_or_else(|| Error::missing(name))?;
        let missing = values.iter().filter(|v| !v.is_finite()).count();
        if missing > 0 {
            debug!("Imputing {missing} missing values in '{name}' with {mean:.4}");
            values.mapv_inplace(|v| if v.is_finite() { v } else { mean });
        }

        let cap = quantile(values, options.cap_quantile);
        let capped = values.iter().filter(|&&v| v > cap).count();
        if capped > 0 {
            debug!("Replacing {capped} values above {cap:.4} in '{name}' with the mean");
            values.mapv_inplace(|v| if v > cap { mean } else { v });
        }
        if capped * 10 > values.len() {
            warn!("Column '{name}' had {capped} of {} values capped", values.len());
        }
    }

    Ok(table)
}

/// Mean over the finite entries, `None` if there are none
pub fn finite_mean(values: &Array1<f64>) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Quantile with linear interpolation between closest ranks
fn quantile(values: &Array1<f64>, q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}
