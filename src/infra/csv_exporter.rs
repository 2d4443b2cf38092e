use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::app::ports::Exporter;
use crate::domain::CleanFrame;
use crate::error::Result;

/// One `<key>.csv` per dataset. Missing cells are written as empty fields.
pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Exporter for CsvExporter {
    fn name(&self) -> &str {
        "csv"
    }

    fn export(&self, frames: &BTreeMap<&str, &CleanFrame>) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)?;
        let mut written = Vec::with_capacity(frames.len());

        for (key, frame) in frames {
            let path = self.dir.join(format!("{key}.csv"));
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(frame.columns().iter().map(|c| c.name.as_str()))?;
            for row in frame.rows() {
                writer.write_record(row.iter().map(|v| v.to_string()))?;
            }
            writer.flush()?;
            debug!(dataset = *key, path = %path.display(), rows = frame.len(), "wrote csv");
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CleanColumn, SemanticType, Value};

    #[test]
    fn writes_header_and_rows_with_blank_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
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
        let frames = BTreeMap::from([("mat_annual", &frame)]);

        let paths = CsvExporter::new(dir.path()).export(&frames).unwrap();
        assert_eq!(paths, vec![dir.path().join("mat_annual.csv")]);
        let text = fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(text, "County,Beneficiaries\nCalaveras,12\nStatewide,\n");
    }
}
