use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::{CleanFrame, RawFrame};
use crate::error::Result;

/// Source of raw frames, addressed by dataset key
pub trait Loader: Send + Sync {
    /// Fails with `EtlError::Load` when the dataset cannot be read
    fn load(&self, dataset: &str) -> Result<RawFrame>;
}

/// Serializes cleaned frames. Exporters write what they are given and do no
/// coercion of their own.
pub trait Exporter: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the paths written
    fn export(&self, frames: &BTreeMap<&str, &CleanFrame>) -> Result<Vec<PathBuf>>;
}
