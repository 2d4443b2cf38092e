use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::CleanFrame;

/// Distribution of one numeric column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericProfile {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Values outside the 1.5 x IQR fences
    pub outliers: usize,
}

/// Audit snapshot of a cleaned frame. Computed whether or not the frame
/// passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub dataset: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub null_counts: BTreeMap<String, usize>,
    /// Cells that hold a missing marker because coercion failed
    pub coercion_failures: BTreeMap<String, usize>,
    pub sample_rows: Vec<Vec<String>>,
    pub numeric_profiles: BTreeMap<String, NumericProfile>,
}

impl QualitySummary {
    pub fn total_nulls(&self) -> usize {
        self.null_counts.values().sum()
    }
}

/// Linear interpolation between closest ranks
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn profile(mut values: Vec<f64>) -> NumericProfile {
    if values.is_empty() {
        return NumericProfile {
            count: 0,
            min: None,
            max: None,
            mean: None,
            outliers: 0,
        };
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let q1 = quantile(&values, 0.25);
    let q3 = quantile(&values, 0.75);
    let iqr = q3 - q1;
    let (low, high) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    NumericProfile {
        count: values.len(),
        min: values.first().copied(),
        max: values.last().copied(),
        mean: Some(values.iter().sum::<f64>() / values.len() as f64),
        outliers: values.iter().filter(|&&v| v < low || v > high).count(),
    }
}

/// Row count, per-column null counts, column inventory, the first
/// `sample_rows` rows and numeric profiles.
pub fn summarize(frame: &CleanFrame, sample_rows: usize) -> QualitySummary {
    let columns = frame.column_names();
    let mut null_counts = BTreeMap::new();
    let mut coercion_failures = BTreeMap::new();
    let mut numeric_profiles = BTreeMap::new();

    for (idx, column) in frame.columns().iter().enumerate() {
        let cells = frame.rows().iter().map(|row| &row[idx]);
        null_counts.insert(column.name.clone(), cells.clone().filter(|v| v.is_missing()).count());
        coercion_failures.insert(column.name.clone(), cells.clone().filter(|v| v.is_invalid()).count());
        if column.kind.is_numeric() {
            numeric_profiles.insert(column.name.clone(), profile(cells.filter_map(|v| v.as_f64()).collect()));
        }
    }

    QualitySummary {
        dataset: frame.dataset().to_string(),
        row_count: frame.len(),
        columns,
        null_counts,
        coercion_failures,
        sample_rows: frame
            .rows()
            .iter()
            .take(sample_rows)
            .map(|row| row.iter().map(|v| v.describe()).collect())
            .collect(),
        numeric_profiles,
    }
}
