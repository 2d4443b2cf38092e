//! Run artifacts written next to the exported tables: a JSON run report and
//! a Markdown data-quality report.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::pipeline::orchestrator::{BatchResult, DatasetOutcome, DatasetState};
use crate::pipeline::summary::QualitySummary;
use crate::pipeline::validate::ValidationReport;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_run_report(result: &BatchResult, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, result)?;
    info!(path = %path.display(), "wrote run report");
    Ok(())
}

pub fn write_quality_report(result: &BatchResult, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, render_quality_report(result))?;
    info!(path = %path.display(), "wrote data quality report");
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

/// Pipes would break the table layout
fn cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn render_validation(out: &mut String, report: &ValidationReport) {
    if report.passed() {
        let _ = writeln!(out, "Validation: passed ({} rows checked)\n", report.rows_checked());
        return;
    }
    let _ = writeln!(out, "Validation: **failed** ({} rows checked)\n", report.rows_checked());
    let _ = writeln!(out, "| Column | Rule | Count | Example |");
    let _ = writeln!(out, "|---|---|---|---|");
    for v in report.violations() {
        let _ = writeln!(out, "| {} | {} | {} | {} |", cell(&v.column), v.rule.as_str(), v.count, cell(&v.example));
    }
    out.push('\n');
}

fn render_summary(out: &mut String, summary: &QualitySummary) {
    let _ = writeln!(out, "Rows: {}\n", summary.row_count);
    let _ = writeln!(out, "| Column | Nulls | Coercion failures |");
    let _ = writeln!(out, "|---|---|---|");
    for column in &summary.columns {
        let nulls = summary.null_counts.get(column).copied().unwrap_or_default();
        let failures = summary.coercion_failures.get(column).copied().unwrap_or_default();
        let _ = writeln!(out, "| {} | {} | {} |", cell(column), nulls, failures);
    }
    out.push('\n');

    if !summary.numeric_profiles.is_empty() {
        let _ = writeln!(out, "| Column | Count | Min | Max | Mean | Outliers |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        for (column, p) in &summary.numeric_profiles {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                cell(column),
                p.count,
                fmt_opt(p.min),
                fmt_opt(p.max),
                fmt_opt(p.mean),
                p.outliers
            );
        }
        out.push('\n');
    }

    if !summary.sample_rows.is_empty() {
        let _ = writeln!(out, "Sample rows:\n");
        let _ = writeln!(out, "| {} |", summary.columns.iter().map(|c| cell(c)).collect::<Vec<_>>().join(" | "));
        let _ = writeln!(out, "|{}", "---|".repeat(summary.columns.len()));
        for row in &summary.sample_rows {
            let _ = writeln!(out, "| {} |", row.iter().map(|c| cell(c)).collect::<Vec<_>>().join(" | "));
        }
        out.push('\n');
    }
}

fn render_outcome(out: &mut String, outcome: &DatasetOutcome) {
    let _ = writeln!(out, "## {} (`{}`)\n", outcome.label, outcome.key);
    let _ = writeln!(out, "State: `{}`\n", outcome.state.label());
    if let DatasetState::Failed { cause, .. } = &outcome.state {
        let _ = writeln!(out, "Cause: {}\n", cause);
    }
    if let Some(report) = &outcome.report {
        render_validation(out, report);
    }
    if let Some(summary) = &outcome.summary {
        render_summary(out, summary);
    }
}

pub fn render_quality_report(result: &BatchResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Data Quality Report\n");
    let _ = writeln!(out, "Run `{}`, finished {}\n", result.run_id, result.finished_at.to_rfc3339());
    if result.aborted {
        let _ = writeln!(out, "The run was stopped early; PENDING datasets were not processed.\n");
    }

    let _ = writeln!(out, "| Dataset | State | Rows | Validation |");
    let _ = writeln!(out, "|---|---|---|---|");
    for outcome in result.outcomes.values() {
        let rows = outcome
            .summary
            .as_ref()
            .map(|s| s.row_count.to_string())
            .unwrap_or_else(|| "-".to_string());
        let validation = match &outcome.report {
            Some(r) if r.passed() => "passed".to_string(),
            Some(r) => format!("{} violations", r.violations().len()),
            None => "-".to_string(),
        };
        let _ = writeln!(out, "| {} | {} | {} | {} |", outcome.key, outcome.state.label(), rows, validation);
    }
    out.push('\n');

    for outcome in result.outcomes.values() {
        render_outcome(&mut out, outcome);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CleanColumn, CleanFrame, SemanticType, Value};
    use crate::pipeline::orchestrator::Stage;
    use crate::pipeline::summary::summarize;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn result() -> BatchResult {
        let frame = CleanFrame::new(
            "mat_annual",
            vec![
                CleanColumn::new("County", SemanticType::Categorical),
                CleanColumn::new("Beneficiaries", SemanticType::Integer),
            ],
            vec![
                vec![Value::text("Calaveras"), Value::Integer(12)],
                vec![Value::text("Statewide"), Value::absent()],
            ],
        );
        let done = DatasetOutcome {
            key: "mat_annual".into(),
            label: "MAT annual".into(),
            state: DatasetState::Done,
            summary: Some(summarize(&frame, 5)),
            fingerprint: Some(frame.fingerprint()),
            frame: Some(frame),
            report: None,
        };
        let failed = DatasetOutcome {
            key: "lanterman".into(),
            label: "Lanterman-Petris-Short".into(),
            state: DatasetState::Failed {
                stage: Stage::Loaded,
                cause: "file not found".into(),
            },
            frame: None,
            report: None,
            summary: None,
            fingerprint: None,
        };
        BatchResult {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            aborted: false,
            outcomes: BTreeMap::from([("mat_annual".to_string(), done), ("lanterman".to_string(), failed)]),
        }
    }

    #[test]
    fn quality_report_lists_states_and_causes() {
        let text = render_quality_report(&result());
        assert!(text.contains("| lanterman | FAILED(LOADED) | - | - |"));
        assert!(text.contains("| mat_annual | DONE | 2 | - |"));
        assert!(text.contains("Cause: file not found"));
        assert!(text.contains("| Beneficiaries | 1 | 0 |"));
    }

    #[test]
    fn run_report_is_json_with_flattened_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("run_report.json");
        write_run_report(&result(), &path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let lanterman = &json["outcomes"]["lanterman"];
        assert_eq!(lanterman["state"], "FAILED");
        assert_eq!(lanterman["stage"], "LOADED");
        assert_eq!(json["outcomes"]["mat_annual"]["summary"]["row_count"], 2);
        assert!(json["outcomes"]["mat_annual"].get("frame").is_none());
    }
}
