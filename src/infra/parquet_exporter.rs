use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use parquet::basic::{Compression, LogicalType, Repetition, Type as PhysicalType, ZstdLevel};
use parquet::data_type::{BoolType, ByteArray, ByteArrayType, DoubleType, Int32Type, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::{Type, TypePtr};
use tracing::debug;

use crate::app::ports::Exporter;
use crate::domain::{CleanColumn, CleanFrame, SemanticType, Value};
use crate::error::Result;

/// One `<key>.parquet` per dataset with typed, nullable columns
pub struct ParquetExporter {
    dir: PathBuf,
}

impl ParquetExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn field(column: &CleanColumn) -> Result<TypePtr> {
    let (physical, logical) = match column.kind {
        SemanticType::Categorical | SemanticType::Identifier => (PhysicalType::BYTE_ARRAY, Some(LogicalType::String)),
        SemanticType::Numeric => (PhysicalType::DOUBLE, None),
        SemanticType::Integer => (PhysicalType::INT64, None),
        SemanticType::Date => (PhysicalType::INT32, Some(LogicalType::Date)),
        SemanticType::Flag => (PhysicalType::BOOLEAN, None),
    };
    let built = Type::primitive_type_builder(&column.name, physical)
        .with_repetition(Repetition::OPTIONAL)
        .with_logical_type(logical)
        .build()?;
    Ok(Arc::new(built))
}

fn build_schema(frame: &CleanFrame) -> Result<TypePtr> {
    let fields = frame.columns().iter().map(field).collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Type::group_type_builder("schema").with_fields(fields).build()?))
}

/// Present values plus definition levels (1 = present, 0 = null)
fn split<T>(cells: impl Iterator<Item = Option<T>>) -> (Vec<T>, Vec<i16>) {
    let mut values = Vec::new();
    let mut levels = Vec::new();
    for cell in cells {
        match cell {
            Some(v) => {
                values.push(v);
                levels.push(1);
            }
            None => levels.push(0),
        }
    }
    (values, levels)
}

fn days_since_epoch(date: &NaiveDate) -> i32 {
    // NaiveDate::default() is 1970-01-01
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

fn write_frame(frame: &CleanFrame, path: &std::path::Path) -> Result<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();
    let mut writer = SerializedFileWriter::new(File::create(path)?, build_schema(frame)?, Arc::new(props))?;

    if !frame.is_empty() {
        let mut row_group = writer.next_row_group()?;
        let mut idx = 0;
        while let Some(mut column) = row_group.next_column()? {
            let cells = frame.rows().iter().map(|row| &row[idx]);
            match frame.columns()[idx].kind {
                SemanticType::Categorical | SemanticType::Identifier => {
                    let (values, defs) = split(cells.map(|v| match v {
                        Value::Text(s) => Some(ByteArray::from(s.as_str())),
                        _ => None,
                    }));
                    column.typed::<ByteArrayType>().write_batch(&values, Some(defs.as_slice()), None)?;
                }
                SemanticType::Numeric => {
                    let (values, defs) = split(cells.map(|v| match v {
                        Value::Number(n) => Some(*n),
                        _ => None,
                    }));
                    column.typed::<DoubleType>().write_batch(&values, Some(defs.as_slice()), None)?;
                }
                SemanticType::Integer => {
                    let (values, defs) = split(cells.map(|v| match v {
                        Value::Integer(i) => Some(*i),
                        _ => None,
                    }));
                    column.typed::<Int64Type>().write_batch(&values, Some(defs.as_slice()), None)?;
                }
                SemanticType::Date => {
                    let (values, defs) = split(cells.map(|v| match v {
                        Value::Date(d) => Some(days_since_epoch(d)),
                        _ => None,
                    }));
                    column.typed::<Int32Type>().write_batch(&values, Some(defs.as_slice()), None)?;
                }
                SemanticType::Flag => {
                    let (values, defs) = split(cells.map(|v| match v {
                        Value::Flag(b) => Some(*b),
                        _ => None,
                    }));
                    column.typed::<BoolType>().write_batch(&values, Some(defs.as_slice()), None)?;
                }
            }
            column.close()?;
            idx += 1;
        }
        row_group.close()?;
    }
    writer.close()?;
    Ok(())
}

impl Exporter for ParquetExporter {
    fn name(&self) -> &str {
        "parquet"
    }

    fn export(&self, frames: &BTreeMap<&str, &CleanFrame>) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)?;
        let mut written = Vec::with_capacity(frames.len());
        for (key, frame) in frames {
            let path = self.dir.join(format!("{key}.parquet"));
            write_frame(frame, &path)?;
            debug!(dataset = *key, path = %path.display(), rows = frame.len(), "wrote parquet");
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::file::reader::{FileReader, SerializedFileReader};

    fn frame(rows: Vec<Vec<Value>>) -> CleanFrame {
        CleanFrame::new(
            "sud_facilities",
            vec![
                CleanColumn::new("Facility_Name", SemanticType::Categorical),
                CleanColumn::new("Total_Capacity", SemanticType::Integer),
                CleanColumn::new("Capacity_Utilization", SemanticType::Numeric),
                CleanColumn::new("Expiration_Date", SemanticType::Date),
                CleanColumn::new("Large_Facility", SemanticType::Flag),
            ],
            rows,
        )
    }

    #[test]
    fn writes_typed_nullable_columns() {
        let dir = tempfile::tempdir().unwrap();
        let full = frame(vec![
            vec![
                Value::text("Hope House"),
                Value::Integer(60),
                Value::Number(0.75),
                Value::Date(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()),
                Value::Flag(true),
            ],
            vec![
                Value::text("Second Step"),
                Value::absent(),
                Value::absent(),
                Value::absent(),
                Value::absent(),
            ],
        ]);
        let empty = frame(Vec::new());
        let frames = BTreeMap::from([("full", &full), ("empty", &empty)]);

        let paths = ParquetExporter::new(dir.path()).export(&frames).unwrap();
        assert_eq!(paths.len(), 2);

        let reader = SerializedFileReader::new(File::open(dir.path().join("full.parquet")).unwrap()).unwrap();
        let meta = reader.metadata().file_metadata();
        assert_eq!(meta.num_rows(), 2);
        assert_eq!(meta.schema_descr().num_columns(), 5);
        assert_eq!(meta.schema_descr().column(3).physical_type(), PhysicalType::INT32);

        let reader = SerializedFileReader::new(File::open(dir.path().join("empty.parquet")).unwrap()).unwrap();
        assert_eq!(reader.metadata().file_metadata().num_rows(), 0);
    }

    #[test]
    fn dates_are_days_since_epoch() {
        assert_eq!(days_since_epoch(&NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
        assert_eq!(days_since_epoch(&NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()), -1);
    }
}
