use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{error, info};

use crate::app::ports::Exporter;
use crate::config::ExportFormat;
use crate::domain::CleanFrame;
use crate::infra::csv_exporter::CsvExporter;
use crate::infra::parquet_exporter::ParquetExporter;
use crate::infra::sqlite_exporter::SqliteExporter;
use crate::infra::workbook_exporter::WorkbookExporter;

/// What one publish pass wrote, and which exporters failed
#[derive(Debug, Default)]
pub struct PublishResult {
    pub written: Vec<PathBuf>,
    /// exporter name -> error text
    pub failures: BTreeMap<String, String>,
}

impl PublishResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Use case for handing cleaned frames to every configured exporter
pub struct PublishUseCase {
    exporters: Vec<Box<dyn Exporter>>,
}

impl PublishUseCase {
    pub fn new(exporters: Vec<Box<dyn Exporter>>) -> Self {
        Self { exporters }
    }

    /// One exporter per requested format, all writing into `dir`
    pub fn for_formats(dir: impl Into<PathBuf>, formats: &[ExportFormat]) -> Self {
        let dir = dir.into();
        let mut exporters: Vec<Box<dyn Exporter>> = Vec::new();
        for format in formats {
            if exporters.iter().any(|e| e.name() == format_name(*format)) {
                continue;
            }
            let exporter: Box<dyn Exporter> = match format {
                ExportFormat::Csv => Box::new(CsvExporter::new(dir.clone())),
                ExportFormat::Parquet => Box::new(ParquetExporter::new(dir.clone())),
                ExportFormat::Sqlite => Box::new(SqliteExporter::new(dir.clone())),
                ExportFormat::Xlsx => Box::new(WorkbookExporter::new(dir.clone())),
            };
            exporters.push(exporter);
        }
        Self { exporters }
    }

    pub fn exporter_names(&self) -> Vec<&str> {
        self.exporters.iter().map(|e| e.name()).collect()
    }

    /// Run every exporter. A failing exporter is recorded and the rest still run.
    pub fn publish(&self, frames: &BTreeMap<&str, &CleanFrame>) -> PublishResult {
        let mut result = PublishResult::default();
        for exporter in &self.exporters {
            let name = exporter.name();
            match exporter.export(frames) {
                Ok(paths) => {
                    crate::observability::metrics::export::success(name);
                    info!(exporter = name, files = paths.len(), "export complete");
                    result.written.extend(paths);
                }
                Err(e) => {
                    crate::observability::metrics::export::error(name);
                    error!(exporter = name, error = %e, "export failed");
                    result.failures.insert(name.to_string(), e.to_string());
                }
            }
        }
        result
    }
}

fn format_name(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Csv => "csv",
        ExportFormat::Parquet => "parquet",
        ExportFormat::Sqlite => "sqlite",
        ExportFormat::Xlsx => "xlsx",
    }
}
