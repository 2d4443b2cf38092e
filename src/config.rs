use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::constants::*;
use crate::error::{EtlError, Result};
use crate::pipeline::schema::CatalogSettings;

/// Contents of `config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
    /// dataset key -> where its raw file lives
    pub sources: BTreeMap<String, SourceConfig>,
    /// dataset key -> categorical column -> rollup sentinel labels
    pub rollups: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub target_county: String,
    /// Extra labels treated as statewide comparison rows in every dataset
    pub statewide_markers: Vec<String>,
    pub sample_rows: usize,
    /// Datasets to run; empty means every registered dataset
    pub datasets: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_county: DEFAULT_TARGET_COUNTY.to_string(),
            statewide_markers: Vec::new(),
            sample_rows: DEFAULT_SAMPLE_ROWS,
            datasets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Parquet,
    Sqlite,
    Xlsx,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub formats: Vec<ExportFormat>,
    /// JSON run report file name, inside `dir`
    pub report: String,
    /// Markdown data-quality report file name, inside `dir`
    pub quality_report: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            formats: vec![ExportFormat::Csv, ExportFormat::Parquet, ExportFormat::Sqlite, ExportFormat::Xlsx],
            report: DEFAULT_REPORT_FILE.to_string(),
            quality_report: DEFAULT_QUALITY_REPORT_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Relative to the config file's directory. `manual:` and `restricted:`
    /// prefixes mark sources that must be fetched by hand.
    pub path: String,
    /// Rows to discard above the header row
    #[serde(default)]
    pub skip_rows: usize,
}

impl Config {
    /// Read the config file. A missing file yields defaults; a malformed one
    /// is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| EtlError::config(format!("Failed to read config file '{}': {}", path.display(), e)))?;
        Self::parse(&content).map_err(|e| match e {
            EtlError::Configuration(msg) => EtlError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| EtlError::config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.pipeline.target_county.trim().is_empty() {
            return Err(EtlError::config("pipeline.target_county must not be empty"));
        }
        if self.output.report.trim().is_empty() || self.output.quality_report.trim().is_empty() {
            return Err(EtlError::config("output report file names must not be empty"));
        }
        Ok(())
    }

    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            target_county: self.pipeline.target_county.trim().to_string(),
            statewide_markers: self.pipeline.statewide_markers.clone(),
            rollup_overrides: self.rollups.clone(),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.report)
    }

    pub fn quality_report_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.quality_report)
    }
}
