use std::collections::HashMap;
use std::sync::Mutex;

use crate::app::ports::Loader;
use crate::domain::RawFrame;
use crate::error::{EtlError, Result};

/// Serves frames held in memory. Useful for embedding and tests.
#[derive(Default)]
pub struct InMemoryLoader {
    frames: HashMap<String, RawFrame>,
    failures: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(mut self, dataset: &str, frame: RawFrame) -> Self {
        self.frames.insert(dataset.to_string(), frame);
        self
    }

    /// Make loading `dataset` fail with `reason`
    pub fn with_failure(mut self, dataset: &str, reason: &str) -> Self {
        self.failures.insert(dataset.to_string(), reason.to_string());
        self
    }

    /// Dataset keys requested so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Loader for InMemoryLoader {
    fn load(&self, dataset: &str) -> Result<RawFrame> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(dataset.to_string());
        }
        if let Some(reason) = self.failures.get(dataset) {
            return Err(EtlError::load(dataset, reason.clone()));
        }
        self.frames
            .get(dataset)
            .cloned()
            .ok_or_else(|| EtlError::load(dataset, "no frame registered"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_registered_frames_and_records_calls() {
        let loader = InMemoryLoader::new()
            .with_frame("a", RawFrame::new(vec!["x".into()]))
            .with_failure("b", "disk on fire");
        assert!(loader.load("a").is_ok());
        assert!(matches!(loader.load("b"), Err(EtlError::Load { .. })));
        assert!(loader.load("c").is_err());
        assert_eq!(loader.calls(), vec!["a", "b", "c"]);
    }
}
