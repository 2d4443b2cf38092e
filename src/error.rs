use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    /// Bad or missing dataset contract. Fatal for the whole batch.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load dataset '{dataset}': {reason}")]
    Load { dataset: String, reason: String },

    #[error("Dataset '{dataset}' is missing required column '{column}'")]
    SchemaMismatch { dataset: String, column: String },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Workbook error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),
}

impl EtlError {
    pub fn config(message: impl Into<String>) -> Self {
        EtlError::Configuration(message.into())
    }

    pub fn load(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        EtlError::Load {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }

    /// Configuration errors abort the batch; everything else is scoped to one dataset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EtlError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
