//! The ordered cleaning steps shared by every strategy.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use super::coerce::coerce;
use crate::domain::{CleanColumn, CleanFrame, RawFrame, SemanticType, Value};
use crate::error::{EtlError, Result};
use crate::pipeline::schema::{Aggregation, CanonicalLabel, CoercionHint, DatasetSpec, GeographyScope};

/// Working table threaded through the steps. Columns carry their contracted
/// types from the moment they are selected.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<CleanColumn>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn columns(&self) -> &[CleanColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of a column, or a configuration error naming the missing column
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self
            .index(name)
            .ok_or_else(|| EtlError::config(format!("cleaning step needs column '{name}'")))?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Append a derived column declared by `spec`
    pub fn add_derived(&mut self, spec: &DatasetSpec, name: &str, values: Vec<Value>) -> Result<()> {
        let column = spec
            .column(name)
            .filter(|c| c.is_derived())
            .ok_or_else(|| EtlError::config(format!("'{name}' is not a derived column of '{}'", spec.key())))?;
        if self.index(name).is_some() {
            return Err(EtlError::config(format!("derived column '{name}' computed twice")));
        }
        if values.len() != self.rows.len() {
            return Err(EtlError::config(format!(
                "derived column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(CleanColumn::new(name, column.kind()));
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Header comparison key: BOM stripped, whitespace (including line breaks)
/// collapsed, lowercased.
pub fn normalize_header(header: &str) -> String {
    collapse_whitespace(header.trim_start_matches('\u{feff}')).to_lowercase()
}

/// Step 1: map raw headers onto the declared source columns. Undeclared raw
/// columns are dropped here.
pub fn select_columns(raw: RawFrame, spec: &DatasetSpec) -> Result<Table> {
    let (raw_columns, raw_rows) = raw.into_parts();
    let headers: Vec<String> = raw_columns.iter().map(|h| normalize_header(h)).collect();

    let mut columns = Vec::new();
    let mut sources = Vec::new();
    for column in spec.source_columns() {
        let found = std::iter::once(column.name())
            .chain(column.aliases().iter().map(|a| a.as_str()))
            .map(normalize_header)
            .find_map(|wanted| headers.iter().position(|h| *h == wanted));
        if found.is_none() && column.required() {
            return Err(EtlError::SchemaMismatch {
                dataset: spec.key().to_string(),
                column: column.name().to_string(),
            });
        }
        columns.push(CleanColumn::new(column.name(), column.kind()));
        sources.push(found);
    }

    let rows: Vec<Vec<Value>> = raw_rows
        .into_iter()
        .map(|mut row| {
            sources
                .iter()
                .map(|source| match source {
                    Some(idx) if *idx < row.len() => std::mem::replace(&mut row[*idx], Value::absent()),
                    _ => Value::absent(),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(Table { columns, rows })
}

/// Step 2: coerce every selected cell. Returns the number of cells that
/// could not be coerced.
pub fn coerce_columns(table: &mut Table, spec: &DatasetSpec) -> usize {
    let hints: Vec<_> = table
        .columns
        .iter()
        .map(|c| spec.column(&c.name).map(|s| s.coercion()).unwrap_or(CoercionHint::Plain))
        .collect();

    let mut failures = 0;
    for row in &mut table.rows {
        for ((cell, column), hint) in row.iter_mut().zip(&table.columns).zip(&hints) {
            let was_invalid = cell.is_invalid();
            *cell = coerce(cell, column.kind, *hint);
            if cell.is_invalid() && !was_invalid {
                failures += 1;
            }
        }
    }
    failures
}

fn scope_label(value: &str, scope: &GeographyScope) -> Option<String> {
    let value = collapse_whitespace(value);
    let target = scope.target_county.trim();
    if value.eq_ignore_ascii_case(target) || value.eq_ignore_ascii_case(&format!("{target} County")) {
        return Some(target.to_string());
    }
    scope
        .statewide_markers
        .iter()
        .map(|m| m.trim())
        .find(|m| value.eq_ignore_ascii_case(m))
        .map(str::to_string)
}

/// Step 3: keep target-county and statewide rows, rewriting the geography
/// value to its canonical spelling. Returns the number of rows dropped.
pub fn filter_scope(table: &mut Table, spec: &DatasetSpec) -> usize {
    let Some(scope) = spec.geography() else {
        return 0;
    };
    let Some(idx) = table.index(&scope.column) else {
        return 0;
    };

    let before = table.rows.len();
    table.rows.retain_mut(|row| {
        let label = match &row[idx] {
            Value::Text(s) => scope_label(s, scope),
            _ => None,
        };
        match label {
            Some(label) => {
                row[idx] = Value::Text(label);
                true
            }
            None => false,
        }
    });
    before - table.rows.len()
}

/// Step 4: drop rollup rows. Returns the number of rows removed.
pub fn drop_rollups(table: &mut Table, spec: &DatasetSpec) -> usize {
    let before = table.rows.len();
    for sentinel in spec.rollups() {
        let Some(idx) = table.index(&sentinel.column) else {
            continue;
        };
        table.rows.retain(|row| match &row[idx] {
            Value::Text(s) => {
                let s = s.trim();
                !sentinel.values.iter().any(|v| v.trim().eq_ignore_ascii_case(s))
            }
            _ => true,
        });
    }
    before - table.rows.len()
}

pub fn canonical_category(label: &str, canonical: &[CanonicalLabel]) -> String {
    let collapsed = collapse_whitespace(label);
    let lower = collapsed.to_lowercase();
    canonical
        .iter()
        .find(|c| lower.starts_with(&c.prefix.to_lowercase()))
        .map(|c| c.canonical.clone())
        .unwrap_or(collapsed)
}

struct Group {
    row: Vec<Value>,
    members: usize,
    present: Vec<Vec<f64>>,
    /// First missing marker seen per measure, an `Invalid` one winning over `Absent`
    missing: Vec<Option<Value>>,
}

/// Step 5: merge rows that differ only by category spelling. Returns the
/// number of rows merged away.
pub fn merge_duplicates(table: &mut Table, spec: &DatasetSpec) -> Result<usize> {
    let Some(rule) = spec.dedup() else {
        return Ok(0);
    };
    let category = table
        .index(&rule.category_column)
        .ok_or_else(|| EtlError::config(format!("dedup category '{}' not selected", rule.category_column)))?;
    let measures = rule
        .measures
        .iter()
        .map(|(name, agg)| {
            table
                .index(name)
                .map(|idx| (idx, *agg))
                .ok_or_else(|| EtlError::config(format!("dedup measure '{name}' not selected")))
        })
        .collect::<Result<Vec<_>>>()?;

    let before = table.rows.len();
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for mut row in std::mem::take(&mut table.rows) {
        if let Value::Text(label) = &row[category] {
            row[category] = Value::Text(canonical_category(label, &rule.canonical_labels));
        }

        let key = row
            .iter()
            .enumerate()
            .filter(|(i, _)| !measures.iter().any(|(m, _)| m == i))
            .map(|(i, v)| if i == category { v.group_key().to_lowercase() } else { v.group_key() })
            .collect::<Vec<_>>()
            .join("\u{1f}");

        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                row: row.clone(),
                members: 0,
                present: vec![Vec::new(); measures.len()],
                missing: vec![None; measures.len()],
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        group.members += 1;
        for ((values, missing), (idx, _)) in group.present.iter_mut().zip(group.missing.iter_mut()).zip(&measures) {
            let value = &row[*idx];
            if let Some(n) = value.as_f64() {
                values.push(n);
            } else if value.is_missing() && !missing.as_ref().is_some_and(Value::is_invalid) {
                *missing = Some(value.clone());
            }
        }
    }

    table.rows = groups
        .into_iter()
        .map(|group| {
            let mut row = group.row;
            if group.members > 1 {
                for ((values, missing), (idx, agg)) in group.present.iter().zip(group.missing).zip(&measures) {
                    // A partial total would look complete, so the gap wins
                    if let Some(marker) = missing {
                        row[*idx] = marker;
                        continue;
                    }
                    if values.is_empty() {
                        continue;
                    }
                    let total: f64 = values.iter().sum();
                    let merged = match agg {
                        Aggregation::Sum => total,
                        Aggregation::Mean => total / values.len() as f64,
                    };
                    row[*idx] = match table.columns[*idx].kind {
                        SemanticType::Integer => Value::Integer(merged.round() as i64),
                        _ => Value::Number(merged),
                    };
                }
            }
            row
        })
        .collect();

    let merged = before - table.rows.len();
    if merged > 0 {
        debug!(dataset = spec.key(), merged, "merged duplicate category rows");
    }
    Ok(merged)
}

/// Final step: check the column set against the spec, put columns in
/// declaration order and sort rows deterministically.
pub fn assemble(table: Table, spec: &DatasetSpec) -> Result<CleanFrame> {
    for column in &table.columns {
        if spec.column(&column.name).is_none() {
            return Err(EtlError::config(format!(
                "column '{}' is not declared for '{}'",
                column.name,
                spec.key()
            )));
        }
    }

    let mut positions = Vec::with_capacity(spec.columns().len());
    for column in spec.columns() {
        let idx = table.index(column.name()).ok_or_else(|| {
            EtlError::config(format!(
                "column '{}' of '{}' was not produced by rule '{}'",
                column.name(),
                spec.key(),
                spec.rule()
            ))
        })?;
        if table.columns[idx].kind != column.kind() {
            return Err(EtlError::config(format!(
                "column '{}' produced as {} but declared {}",
                column.name(),
                table.columns[idx].kind,
                column.kind()
            )));
        }
        positions.push(idx);
    }

    let columns: Vec<CleanColumn> = spec
        .columns()
        .iter()
        .map(|c| CleanColumn::new(c.name(), c.kind()))
        .collect();
    let mut rows: Vec<Vec<Value>> = table
        .rows
        .into_iter()
        .map(|mut row| {
            positions
                .iter()
                .map(|&idx| std::mem::replace(&mut row[idx], Value::absent()))
                .collect()
        })
        .collect();

    let mut order: Vec<usize> = spec
        .sort_key()
        .iter()
        .filter_map(|name| spec.column_index(name))
        .collect();
    for idx in 0..columns.len() {
        if !order.contains(&idx) {
            order.push(idx);
        }
    }
    rows.sort_by(|a, b| {
        order
            .iter()
            .map(|&i| a[i].total_cmp(&b[i]))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    Ok(CleanFrame::new(spec.key(), columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::{ColumnSpec, DedupRule};

    fn raw(columns: &[&str], rows: &[&[&str]]) -> RawFrame {
        RawFrame::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Value::text(*v)).collect())
                .collect(),
        )
    }

    fn grievances() -> DatasetSpec {
        DatasetSpec::builder("grievances", "Grievances")
            .column(ColumnSpec::categorical("Geography").not_null())
            .column(ColumnSpec::categorical("Category"))
            .column(ColumnSpec::numeric("Count").non_negative())
            .geography("Geography", "Calaveras", &["State"])
            .rollup("Category", &["All"])
            .dedup(DedupRule {
                category_column: "Category".into(),
                canonical_labels: vec![CanonicalLabel::new("Other", "Other")],
                measures: vec![("Count".into(), Aggregation::Sum)],
            })
            .sort_by(&["Geography", "Category"])
            .build()
            .unwrap()
    }

    #[test]
    fn headers_match_after_normalization() {
        let frame = raw(&["\u{feff}geography", "Category\n", "COUNT", "Extra"], &[&["Calaveras", "Housing", "3", "x"]]);
        let table = select_columns(frame, &grievances()).unwrap();
        assert_eq!(table.columns().len(), 3);
        assert_eq!(table.rows()[0][2], Value::text("3"));
    }

    #[test]
    fn missing_required_column_is_a_schema_mismatch() {
        let frame = raw(&["Geography", "Count"], &[]);
        let err = select_columns(frame, &grievances()).unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch { ref column, .. } if column == "Category"));
    }

    #[test]
    fn optional_column_fills_with_missing() {
        let spec = DatasetSpec::builder("d", "d")
            .column(ColumnSpec::categorical("a"))
            .column(ColumnSpec::categorical("b").optional())
            .build()
            .unwrap();
        let table = select_columns(raw(&["a"], &[&["x"]]), &spec).unwrap();
        assert!(table.rows()[0][1].is_missing());
    }

    #[test]
    fn scope_filter_canonicalizes_county_spelling() {
        let spec = grievances();
        let mut table = select_columns(
            raw(
                &["Geography", "Category", "Count"],
                &[
                    &["CALAVERAS COUNTY", "Housing", "1"],
                    &["Amador", "Housing", "2"],
                    &["state", "Housing", "3"],
                    &["", "Housing", "4"],
                ],
            ),
            &spec,
        )
        .unwrap();
        coerce_columns(&mut table, &spec);
        assert_eq!(filter_scope(&mut table, &spec), 2);
        let geo: Vec<_> = table.column("Geography").unwrap().into_iter().cloned().collect();
        assert_eq!(geo, vec![Value::text("Calaveras"), Value::text("State")]);

        // A second pass changes nothing
        let snapshot = table.clone();
        assert_eq!(filter_scope(&mut table, &spec), 0);
        assert_eq!(table, snapshot);
    }

    #[test]
    fn rollups_are_removed_before_merging() {
        let spec = grievances();
        let mut table = select_columns(
            raw(
                &["Geography", "Category", "Count"],
                &[
                    &["Calaveras", "All", "500"],
                    &["Calaveras", "Housing", "120"],
                    &["Calaveras", "Housing", "30"],
                ],
            ),
            &spec,
        )
        .unwrap();
        coerce_columns(&mut table, &spec);
        assert_eq!(drop_rollups(&mut table, &spec), 1);
        assert_eq!(merge_duplicates(&mut table, &spec).unwrap(), 1);
        assert_eq!(table.rows(), &[vec![Value::text("Calaveras"), Value::text("Housing"), Value::Number(150.0)]]);
    }

    #[test]
    fn merged_group_keeps_an_unparseable_member_as_invalid() {
        let spec = grievances();
        let mut table = select_columns(
            raw(
                &["Geography", "Category", "Count"],
                &[
                    &["Calaveras", "Housing", "120"],
                    &["Calaveras", "housing", ""],
                    &["Calaveras", "Housing", "n/a"],
                    &["Calaveras", "Access", "5"],
                ],
            ),
            &spec,
        )
        .unwrap();
        assert_eq!(coerce_columns(&mut table, &spec), 1);
        assert_eq!(merge_duplicates(&mut table, &spec).unwrap(), 2);
        assert_eq!(table.rows()[0][2], Value::invalid("n/a"));
        assert_eq!(table.rows()[1][2], Value::Number(5.0));
    }

    #[test]
    fn other_labels_collapse_and_keep_missing_when_nothing_is_present() {
        let spec = grievances();
        let mut table = select_columns(
            raw(
                &["Geography", "Category", "Count"],
                &[
                    &["Calaveras", "Other  (specify)", ""],
                    &["Calaveras", "other", ""],
                ],
            ),
            &spec,
        )
        .unwrap();
        coerce_columns(&mut table, &spec);
        merge_duplicates(&mut table, &spec).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0][1], Value::text("Other"));
        assert!(table.rows()[0][2].is_missing());
    }

    #[test]
    fn coercion_failures_are_counted_not_dropped() {
        let spec = grievances();
        let mut table = select_columns(
            raw(&["Geography", "Category", "Count"], &[&["Calaveras", "A", "n/a"], &["Calaveras", "B", "1"]]),
            &spec,
        )
        .unwrap();
        assert_eq!(coerce_columns(&mut table, &spec), 1);
        assert_eq!(table.len(), 2);
        assert!(table.rows()[0][2].is_invalid());
    }

    #[test]
    fn assemble_sorts_by_natural_key() {
        let spec = grievances();
        let mut table = select_columns(
            raw(
                &["Geography", "Category", "Count"],
                &[&["State", "B", "1"], &["Calaveras", "B", "2"], &["Calaveras", "A", "3"]],
            ),
            &spec,
        )
        .unwrap();
        coerce_columns(&mut table, &spec);
        let frame = assemble(table, &spec).unwrap();
        let order: Vec<_> = frame.rows().iter().map(|r| r[2].clone()).collect();
        assert_eq!(order, vec![Value::Number(3.0), Value::Number(2.0), Value::Number(1.0)]);
    }

    #[test]
    fn assemble_rejects_missing_derived_column() {
        let spec = DatasetSpec::builder("d", "d")
            .column(ColumnSpec::categorical("a"))
            .column(ColumnSpec::numeric("b").derived())
            .build()
            .unwrap();
        let table = select_columns(raw(&["a"], &[&["x"]]), &spec).unwrap();
        assert!(assemble(table, &spec).unwrap_err().is_fatal());
    }

    #[test]
    fn add_derived_rejects_undeclared_names() {
        let spec = grievances();
        let mut table = select_columns(raw(&["Geography", "Category", "Count"], &[]), &spec).unwrap();
        assert!(table.add_derived(&spec, "Rate", vec![]).is_err());
    }
}
