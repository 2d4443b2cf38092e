use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::app::ports::Exporter;
use crate::constants::DEFAULT_SQLITE_FILE;
use crate::domain::{CleanFrame, SemanticType, Value};
use crate::error::Result;

/// Writes every frame into one SQLite database, one table per dataset key.
/// Tables are dropped and recreated on each export.
pub struct SqliteExporter {
    path: PathBuf,
}

impl SqliteExporter {
    /// `<dir>/output_data.sqlite`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(DEFAULT_SQLITE_FILE),
        }
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_type(kind: SemanticType) -> &'static str {
    match kind {
        SemanticType::Categorical | SemanticType::Identifier | SemanticType::Date => "TEXT",
        SemanticType::Numeric => "REAL",
        SemanticType::Integer | SemanticType::Flag => "INTEGER",
    }
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Number(n) => SqlValue::Real(*n),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Flag(b) => SqlValue::Integer(i64::from(*b)),
        Value::Missing(_) => SqlValue::Null,
    }
}

fn write_table(conn: &mut Connection, key: &str, frame: &CleanFrame) -> Result<()> {
    let table = quote(key);
    let definitions: Vec<String> = frame
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote(&c.name), column_type(c.kind)))
        .collect();
    let placeholders = vec!["?"; frame.columns().len()].join(", ");

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} ({});",
        definitions.join(", ")
    ))?;
    {
        let mut insert = tx.prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))?;
        for row in frame.rows() {
            insert.execute(params_from_iter(row.iter().map(sql_value)))?;
        }
    }
    tx.commit()?;
    Ok(())
}

impl Exporter for SqliteExporter {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn export(&self, frames: &BTreeMap<&str, &CleanFrame>) -> Result<Vec<PathBuf>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(&self.path)?;
        for (key, frame) in frames {
            write_table(&mut conn, key, frame)?;
            debug!(dataset = *key, rows = frame.len(), "wrote sqlite table");
        }
        Ok(vec![self.path.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CleanColumn;
    use chrono::NaiveDate;

    #[test]
    fn writes_one_table_per_dataset_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let frame = CleanFrame::new(
            "foster_care",
            vec![
                CleanColumn::new("Measure number", SemanticType::Categorical),
                CleanColumn::new("Rate", SemanticType::Numeric),
                CleanColumn::new("Period", SemanticType::Date),
                CleanColumn::new("OneYearChangeFlag", SemanticType::Flag),
            ],
            vec![
                vec![
                    Value::text("3-P1"),
                    Value::Number(0.4211),
                    Value::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
                    Value::Flag(true),
                ],
                vec![Value::text("3-P2"), Value::absent(), Value::absent(), Value::Flag(false)],
            ],
        );
        let frames = BTreeMap::from([("foster_care", &frame)]);
        let exporter = SqliteExporter::new(dir.path());

        // exporting twice replaces the table instead of appending
        exporter.export(&frames).unwrap();
        let paths = exporter.export(&frames).unwrap();

        let conn = Connection::open(&paths[0]).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM \"foster_care\"", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
        let nulls: i64 = conn
            .query_row("SELECT COUNT(*) FROM \"foster_care\" WHERE \"Rate\" IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nulls, 1);
        let period: String = conn
            .query_row("SELECT \"Period\" FROM \"foster_care\" WHERE \"OneYearChangeFlag\" = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(period, "2023-01-01");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote("Measure number"), "\"Measure number\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
