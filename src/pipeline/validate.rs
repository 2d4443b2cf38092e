//! Contract checks over a cleaned frame.
//!
//! Data-quality problems never raise: they are aggregated into a
//! [`ValidationReport`]. Only a structural mismatch between frame and spec
//! (which means a cleaning rule is broken) is an error.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::instrument;

use crate::domain::{CleanFrame, Missing, Value};
use crate::error::{EtlError, Result};
use crate::pipeline::schema::{Constraint, DatasetSpec};

/// Which contract a cell broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Type,
    /// A non-nullable cell lost its value to a failed coercion
    Coercion,
    NotNull,
    AllowedValues,
    Range,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Type => "type",
            Rule::Coercion => "coercion",
            Rule::NotNull => "not_null",
            Rule::AllowedValues => "allowed_values",
            Rule::Range => "range",
        }
    }
}

/// One (column, rule) pair with every offending cell folded in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub column: String,
    pub rule: Rule,
    pub count: usize,
    /// First offending value rendered as text
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    dataset: String,
    passed: bool,
    rows_checked: usize,
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn rows_checked(&self) -> usize {
        self.rows_checked
    }

    /// Ordered by column declaration, then rule
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn violation(&self, column: &str, rule: Rule) -> Option<&Violation> {
        self.violations.iter().find(|v| v.column == column && v.rule == rule)
    }

    /// Total offending cells across all entries
    pub fn violating_cells(&self) -> usize {
        self.violations.iter().map(|v| v.count).sum()
    }
}

pub trait Validator: Send + Sync {
    fn validate(&self, frame: &CleanFrame, spec: &DatasetSpec) -> Result<ValidationReport>;
}

/// Checks type conformance, nullability and declared constraints
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    fn check_structure(frame: &CleanFrame, spec: &DatasetSpec) -> Result<()> {
        if frame.dataset() != spec.key() {
            return Err(EtlError::config(format!(
                "frame for '{}' validated against spec '{}'",
                frame.dataset(),
                spec.key()
            )));
        }
        let declared: Vec<_> = spec.columns().iter().map(|c| (c.name(), c.kind())).collect();
        let actual: Vec<_> = frame.columns().iter().map(|c| (c.name.as_str(), c.kind)).collect();
        if declared != actual {
            return Err(EtlError::config(format!(
                "columns of '{}' do not match its spec: expected {:?}, found {:?}",
                spec.key(),
                declared,
                actual
            )));
        }
        Ok(())
    }
}

fn check_cell(value: &Value, nullable: bool, kind: crate::domain::SemanticType, constraint: Option<&Constraint>) -> Option<Rule> {
    match value {
        Value::Missing(Missing::Invalid(_)) if !nullable => Some(Rule::Coercion),
        Value::Missing(Missing::Absent) if !nullable => Some(Rule::NotNull),
        Value::Missing(_) => None,
        present if !kind.conforms(present) => Some(Rule::Type),
        present => match constraint {
            Some(Constraint::AllowedValues(allowed)) => {
                let text = present.to_string();
                (!allowed.iter().any(|a| *a == text)).then_some(Rule::AllowedValues)
            }
            Some(Constraint::Range { min, max }) => {
                let n = present.as_f64()?;
                let below = min.is_some_and(|m| n < m);
                let above = max.is_some_and(|m| n > m);
                (below || above).then_some(Rule::Range)
            }
            None => None,
        },
    }
}

impl Validator for SchemaValidator {
    #[instrument(skip_all, fields(dataset = %spec.key()))]
    fn validate(&self, frame: &CleanFrame, spec: &DatasetSpec) -> Result<ValidationReport> {
        Self::check_structure(frame, spec)?;

        let mut found: BTreeMap<(usize, Rule), (usize, String)> = BTreeMap::new();
        for row in frame.rows() {
            for (idx, (cell, column)) in row.iter().zip(spec.columns()).enumerate() {
                if let Some(rule) = check_cell(cell, column.nullable(), column.kind(), column.constraint()) {
                    found
                        .entry((idx, rule))
                        .and_modify(|(count, _)| *count += 1)
                        .or_insert_with(|| (1, cell.describe()));
                }
            }
        }

        let violations: Vec<Violation> = found
            .into_iter()
            .map(|((idx, rule), (count, example))| Violation {
                column: spec.columns()[idx].name().to_string(),
                rule,
                count,
                example,
            })
            .collect();

        Ok(ValidationReport {
            dataset: spec.key().to_string(),
            passed: violations.is_empty(),
            rows_checked: frame.len(),
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CleanColumn, SemanticType};
    use crate::pipeline::schema::ColumnSpec;

    fn spec() -> DatasetSpec {
        DatasetSpec::builder("d", "d")
            .column(ColumnSpec::categorical("Type").not_null().allowed(&["Adult", "Child"]))
            .column(ColumnSpec::numeric("Count").not_null().non_negative())
            .column(ColumnSpec::numeric("Rate"))
            .build()
            .unwrap()
    }

    fn frame(rows: Vec<Vec<Value>>) -> CleanFrame {
        CleanFrame::new(
            "d",
            vec![
                CleanColumn::new("Type", SemanticType::Categorical),
                CleanColumn::new("Count", SemanticType::Numeric),
                CleanColumn::new("Rate", SemanticType::Numeric),
            ],
            rows,
        )
    }

    #[test]
    fn clean_frame_passes() {
        let report = SchemaValidator
            .validate(&frame(vec![vec!["Adult".into(), 3.0.into(), Value::absent()]]), &spec())
            .unwrap();
        assert!(report.passed());
        assert_eq!(report.rows_checked(), 1);
    }

    #[test]
    fn empty_frame_passes() {
        let report = SchemaValidator.validate(&frame(vec![]), &spec()).unwrap();
        assert!(report.passed());
        assert!(report.violations().is_empty());
    }

    #[test]
    fn violations_aggregate_per_column_and_rule() {
        let rows = vec![
            vec!["Teen".into(), Value::Number(-1.0), Value::invalid("n/a")],
            vec!["Senior".into(), Value::Number(-2.0), 1.0.into()],
            vec!["Adult".into(), Value::invalid("*"), 1.0.into()],
            vec!["Adult".into(), Value::absent(), 1.0.into()],
        ];
        let report = SchemaValidator.validate(&frame(rows), &spec()).unwrap();
        assert!(!report.passed());

        let rules: Vec<_> = report.violations().iter().map(|v| (v.column.as_str(), v.rule, v.count)).collect();
        assert_eq!(
            rules,
            vec![
                ("Type", Rule::AllowedValues, 2),
                ("Count", Rule::Coercion, 1),
                ("Count", Rule::NotNull, 1),
                ("Count", Rule::Range, 2),
            ]
        );
        assert_eq!(report.violation("Type", Rule::AllowedValues).unwrap().example, "Teen");
        assert_eq!(report.violation("Count", Rule::Coercion).unwrap().example, "*");
        assert_eq!(report.violation("Count", Rule::NotNull).unwrap().example, "<missing>");
        assert_eq!(report.violating_cells(), 6);
    }

    #[test]
    fn wrong_type_is_reported() {
        let rows = vec![vec!["Adult".into(), Value::text("3"), Value::absent()]];
        let report = SchemaValidator.validate(&frame(rows), &spec()).unwrap();
        assert_eq!(report.violation("Count", Rule::Type).unwrap().count, 1);
    }

    #[test]
    fn column_set_mismatch_is_a_configuration_error() {
        let bad = CleanFrame::new("d", vec![CleanColumn::new("Type", SemanticType::Categorical)], vec![]);
        let err = SchemaValidator.validate(&bad, &spec()).unwrap_err();
        assert!(err.is_fatal());
    }
}
