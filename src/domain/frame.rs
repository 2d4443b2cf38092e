use serde::Serialize;
use sha2::{Digest, Sha256};

use super::value::{SemanticType, Value};

/// A table as handed over by a loader: named columns, cells of uncertain type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RawFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a frame from rows, padding short rows with missing markers and
    /// truncating long ones so every row matches the header width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row);
        }
        frame
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::absent());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
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

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanColumn {
    pub name: String,
    pub kind: SemanticType,
}

impl CleanColumn {
    pub fn new(name: impl Into<String>, kind: SemanticType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A table whose columns carry their contracted types. Produced by the
/// cleaning rules, consumed by the validator, summarizer and exporters.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanFrame {
    dataset: String,
    columns: Vec<CleanColumn>,
    rows: Vec<Vec<Value>>,
}

impl CleanFrame {
    pub fn new(dataset: impl Into<String>, columns: Vec<CleanColumn>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            dataset: dataset.into(),
            columns,
            rows,
        }
    }

    pub fn empty(dataset: impl Into<String>, columns: Vec<CleanColumn>) -> Self {
        Self::new(dataset, columns, Vec::new())
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn columns(&self) -> &[CleanColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
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

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// All values of one column, in row order
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// SHA-256 over the header and every rendered cell. Two runs over unchanged
    /// input must produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dataset.as_bytes());
        for column in &self.columns {
            hasher.update([0x1f]);
            hasher.update(column.name.as_bytes());
            hasher.update(column.kind.as_str().as_bytes());
        }
        for row in &self.rows {
            hasher.update([0x1e]);
            for cell in row {
                hasher.update([0x1f]);
                hasher.update(cell.group_key().as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_rows_are_padded_to_header_width() {
        let frame = RawFrame::from_rows(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![Value::text("1")], vec![Value::text("1"), Value::text("2"), Value::text("3"), Value::text("4")]],
        );
        assert_eq!(frame.rows()[0].len(), 3);
        assert!(frame.rows()[0][2].is_missing());
        assert_eq!(frame.rows()[1].len(), 3);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let columns = vec![CleanColumn::new("count", SemanticType::Numeric)];
        let a = CleanFrame::new("d", columns.clone(), vec![vec![Value::Number(1.0)]]);
        let b = CleanFrame::new("d", columns.clone(), vec![vec![Value::Number(1.0)]]);
        let c = CleanFrame::new("d", columns, vec![vec![Value::Number(2.0)]]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
