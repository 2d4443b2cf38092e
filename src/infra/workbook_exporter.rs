use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::debug;

use crate::app::ports::Exporter;
use crate::constants::DEFAULT_WORKBOOK_FILE;
use crate::domain::{CleanFrame, Value};
use crate::error::Result;

/// Excel's limits on sheet names and cell text
const SHEET_NAME_MAX: usize = 31;
const CELL_TEXT_MAX: usize = 32_767;

/// Control characters the XML behind a worksheet cannot hold
static ILLEGAL_XML: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").unwrap());

/// One workbook with a sheet per dataset key
pub struct WorkbookExporter {
    path: PathBuf,
}

impl WorkbookExporter {
    /// `<dir>/behavioral_health_dashboard_data.xlsx`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(DEFAULT_WORKBOOK_FILE),
        }
    }
}

/// Strip characters Excel rejects in sheet names and keep the name unique
/// within the workbook after truncation.
pub fn sheet_name(key: &str, taken: &mut HashSet<String>) -> String {
    let cleaned: String = key
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    let base: String = cleaned.chars().take(SHEET_NAME_MAX).collect();
    let mut name = base.clone();
    let mut n = 2;
    while !taken.insert(name.to_lowercase()) {
        let suffix = format!("~{n}");
        name = base.chars().take(SHEET_NAME_MAX - suffix.len()).collect::<String>() + &suffix;
        n += 1;
    }
    name
}

fn cell_text(s: &str) -> String {
    ILLEGAL_XML.replace_all(s, "").chars().take(CELL_TEXT_MAX).collect()
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<()> {
    match value {
        Value::Number(n) => sheet.write_number(row, col, *n)?,
        Value::Integer(i) => sheet.write_number(row, col, *i as f64)?,
        Value::Flag(b) => sheet.write_boolean(row, col, *b)?,
        Value::Missing(_) => return Ok(()),
        other => sheet.write_string(row, col, cell_text(&other.to_string()))?,
    };
    Ok(())
}

impl Exporter for WorkbookExporter {
    fn name(&self) -> &str {
        "xlsx"
    }

    fn export(&self, frames: &BTreeMap<&str, &CleanFrame>) -> Result<Vec<PathBuf>> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut workbook = Workbook::new();
        let mut taken = HashSet::new();

        for (key, frame) in frames {
            let sheet = workbook.add_worksheet();
            sheet.set_name(sheet_name(key, &mut taken))?;
            for (col, column) in frame.columns().iter().enumerate() {
                sheet.write_string(0, col as u16, cell_text(&column.name))?;
            }
            for (r, row) in frame.rows().iter().enumerate() {
                for (col, value) in row.iter().enumerate() {
                    write_cell(sheet, r as u32 + 1, col as u16, value)?;
                }
            }
            debug!(dataset = *key, rows = frame.len(), "wrote worksheet");
        }

        // An empty workbook is not a valid file
        if frames.is_empty() {
            workbook.add_worksheet();
        }
        workbook.save(&self.path)?;
        Ok(vec![self.path.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CleanColumn, SemanticType};
    use calamine::{open_workbook, Data, Reader, Xlsx};

    #[test]
    fn long_keys_are_truncated_without_colliding() {
        let mut taken = HashSet::new();
        let first = sheet_name("sud_recovery_facilities_geojson_points", &mut taken);
        let second = sheet_name("sud_recovery_facilities_geojson_polygons", &mut taken);
        assert_eq!(first, "sud_recovery_facilities_geojson");
        assert_eq!(first.chars().count(), 31);
        assert_eq!(second, "sud_recovery_facilities_geojs~2");
        assert_eq!(sheet_name("a/b:c", &mut taken), "abc");
    }

    #[test]
    fn control_characters_are_stripped_from_text() {
        assert_eq!(cell_text("Hope\u{0}House\u{b}\tNorth"), "HopeHouse\tNorth");
    }

    #[test]
    fn writes_one_sheet_per_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let mat = CleanFrame::new(
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
        let empty = CleanFrame::new("crisis_services", vec![CleanColumn::new("County", SemanticType::Categorical)], vec![]);
        let frames = BTreeMap::from([("mat_annual", &mat), ("crisis_services", &empty)]);

        let paths = WorkbookExporter::new(dir.path()).export(&frames).unwrap();
        assert_eq!(paths, vec![dir.path().join(DEFAULT_WORKBOOK_FILE)]);

        let mut workbook: Xlsx<_> = open_workbook(&paths[0]).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["crisis_services", "mat_annual"]);
        let range = workbook.worksheet_range("mat_annual").unwrap();
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("Beneficiaries".into())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::Float(12.0)));
        assert_eq!(range.get_value((2, 0)), Some(&Data::String("Statewide".into())));
        let header_only = workbook.worksheet_range("crisis_services").unwrap();
        assert_eq!(header_only.height(), 1);
    }
}
