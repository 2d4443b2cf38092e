use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, DataType, Reader, Xlsx};
use serde_json::Value as Json;
use tracing::debug;

use crate::app::ports::Loader;
use crate::config::SourceConfig;
use crate::domain::{RawFrame, Value};
use crate::error::{EtlError, Result};

/// Reads raw frames from the files named in `[sources.<key>]`
pub struct FileLoader {
    base_dir: PathBuf,
    sources: BTreeMap<String, SourceConfig>,
}

impl FileLoader {
    pub fn new(base_dir: impl Into<PathBuf>, sources: BTreeMap<String, SourceConfig>) -> Self {
        Self {
            base_dir: base_dir.into(),
            sources,
        }
    }
}

impl Loader for FileLoader {
    fn load(&self, dataset: &str) -> Result<RawFrame> {
        let source = self
            .sources
            .get(dataset)
            .ok_or_else(|| EtlError::load(dataset, "no source configured"))?;
        let location = source.path.trim();
        for prefix in ["manual:", "restricted:"] {
            if let Some(rest) = location.strip_prefix(prefix) {
                return Err(EtlError::load(
                    dataset,
                    format!("source must be downloaded by hand ({}{})", prefix, rest.trim()),
                ));
            }
        }

        let path = self.base_dir.join(location);
        if !path.is_file() {
            return Err(EtlError::load(dataset, format!("file not found: {}", path.display())));
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let frame = match extension.as_str() {
            "csv" | "txt" => read_csv(&path, source.skip_rows),
            "geojson" | "json" => read_geojson(&path),
            "xlsx" => read_xlsx(&path, source.skip_rows),
            other => Err(EtlError::load(dataset, format!("unsupported source format '{other}'"))),
        }
        .map_err(|e| match e {
            EtlError::Load { .. } => e,
            other => EtlError::load(dataset, other.to_string()),
        })?;

        debug!(dataset, path = %path.display(), rows = frame.len(), "loaded raw frame");
        Ok(frame)
    }
}

/// The header is the first record after `skip_rows`. Cells that are not
/// valid UTF-8 are decoded lossily.
pub fn read_csv(path: &Path, skip_rows: usize) -> Result<RawFrame> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(File::open(path)?);

    let mut records = reader.byte_records().skip(skip_rows);
    let columns: Vec<String> = match records.next() {
        Some(header) => header?
            .iter()
            .map(|cell| String::from_utf8_lossy(cell).trim().to_string())
            .collect(),
        None => return Ok(RawFrame::default()),
    };

    let mut frame = RawFrame::new(columns);
    for record in records {
        let record = record?;
        frame.push_row(
            record
                .iter()
                .map(|cell| Value::Text(String::from_utf8_lossy(cell).into_owned()))
                .collect(),
        );
    }
    Ok(frame)
}

fn xlsx_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::absent(),
        Data::String(s) => Value::Text(s.clone()),
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => Value::Number(*f),
        Data::Bool(b) => Value::Flag(*b),
        Data::DateTime(_) => cell.as_date().map(Value::Date).unwrap_or_else(|| Value::Text(cell.to_string())),
        Data::Error(e) => Value::invalid(e.to_string()),
        other => Value::Text(other.to_string()),
    }
}

/// First worksheet only. The header is the first row after `skip_rows`;
/// banner rows above it are left for the cleaning rule to strip.
pub fn read_xlsx(path: &Path, skip_rows: usize) -> Result<RawFrame> {
    let invalid = |e: calamine::XlsxError| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string());
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(invalid)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "workbook has no worksheet"))?
        .map_err(invalid)?;

    let mut rows = range.rows().skip(skip_rows);
    let columns: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string().trim().to_string(),
            })
            .collect(),
        None => return Ok(RawFrame::default()),
    };

    let mut frame = RawFrame::new(columns);
    for row in rows {
        frame.push_row(row.iter().map(xlsx_cell).collect());
    }
    Ok(frame)
}

fn json_cell(value: &Json) -> Value {
    match value {
        Json::Null => Value::absent(),
        Json::Bool(b) => Value::Flag(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map(Value::Number).unwrap_or_else(|| Value::text(n.to_string())),
        },
        Json::String(s) => Value::text(s.as_str()),
        other => Value::Text(other.to_string()),
    }
}

/// Feature properties become columns; geometry is flattened into
/// `geometry_type` and `geometry_coordinates` (JSON text).
pub fn read_geojson(path: &Path) -> Result<RawFrame> {
    let document: Json = serde_json::from_reader(File::open(path)?)?;
    let features = document
        .get("features")
        .and_then(|f| f.as_array())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "GeoJSON has no features array"))?;

    let mut columns: Vec<String> = Vec::new();
    for feature in features {
        if let Some(props) = feature.get("properties").and_then(|p| p.as_object()) {
            for key in props.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns.push("geometry_type".into());
    columns.push("geometry_coordinates".into());

    let mut frame = RawFrame::new(columns.clone());
    for feature in features {
        let props = feature.get("properties").and_then(|p| p.as_object());
        let geometry = feature.get("geometry").filter(|g| !g.is_null());
        let row = columns
            .iter()
            .map(|column| match column.as_str() {
                "geometry_type" => geometry
                    .and_then(|g| g.get("type"))
                    .map(json_cell)
                    .unwrap_or_else(Value::absent),
                "geometry_coordinates" => geometry
                    .and_then(|g| g.get("coordinates"))
                    .map(|c| Value::Text(c.to_string()))
                    .unwrap_or_else(Value::absent),
                key => props.and_then(|p| p.get(key)).map(json_cell).unwrap_or_else(Value::absent),
            })
            .collect();
        frame.push_row(row);
    }
    Ok(frame)
}
