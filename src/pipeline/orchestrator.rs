//! Drives every configured dataset through load, clean, validate and
//! summarize, isolating per-dataset failures.

use std::collections::{BTreeMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::app::ports::Loader;
use crate::constants::DEFAULT_SAMPLE_ROWS;
use crate::domain::CleanFrame;
use crate::error::{EtlError, Result};
use crate::observability::metrics::{self, MetricName};
use crate::pipeline::cleaning::CleaningRegistry;
use crate::pipeline::schema::{DatasetSpec, SchemaRegistry};
use crate::pipeline::summary::{summarize, QualitySummary};
use crate::pipeline::validate::{SchemaValidator, ValidationReport, Validator};

/// Stage a dataset was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Loaded,
    Cleaned,
    Validated,
    Summarized,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Loaded => "LOADED",
            Stage::Cleaned => "CLEANED",
            Stage::Validated => "VALIDATED",
            Stage::Summarized => "SUMMARIZED",
        }
    }
}

/// PENDING -> LOADED -> CLEANED -> VALIDATED -> SUMMARIZED -> DONE, with
/// FAILED reachable from any non-terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetState {
    Pending,
    Loaded,
    Cleaned,
    Validated,
    Summarized,
    Done,
    Failed { stage: Stage, cause: String },
}

impl DatasetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DatasetState::Done | DatasetState::Failed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DatasetState::Failed { .. })
    }

    /// `DONE`, `PENDING`, `FAILED(LOADED)` ...
    pub fn label(&self) -> String {
        match self {
            DatasetState::Pending => "PENDING".into(),
            DatasetState::Loaded => "LOADED".into(),
            DatasetState::Cleaned => "CLEANED".into(),
            DatasetState::Validated => "VALIDATED".into(),
            DatasetState::Summarized => "SUMMARIZED".into(),
            DatasetState::Done => "DONE".into(),
            DatasetState::Failed { stage, .. } => format!("FAILED({})", stage.as_str()),
        }
    }
}

impl From<Stage> for DatasetState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Loaded => DatasetState::Loaded,
            Stage::Cleaned => DatasetState::Cleaned,
            Stage::Validated => DatasetState::Validated,
            Stage::Summarized => DatasetState::Summarized,
        }
    }
}

/// Everything one dataset pass produced
#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutcome {
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub state: DatasetState,
    #[serde(skip)]
    pub frame: Option<CleanFrame>,
    pub report: Option<ValidationReport>,
    pub summary: Option<QualitySummary>,
    pub fingerprint: Option<String>,
}

impl DatasetOutcome {
    fn pending(spec: &DatasetSpec) -> Self {
        Self {
            key: spec.key().to_string(),
            label: spec.label().to_string(),
            state: DatasetState::Pending,
            frame: None,
            report: None,
            summary: None,
            fingerprint: None,
        }
    }

    fn advance(&mut self, state: DatasetState) {
        tracing::debug!(dataset = %self.key, from = %self.state.label(), to = %state.label(), "state change");
        self.state = state;
    }

    fn fail(&mut self, stage: Stage, error: &EtlError) {
        warn!(dataset = %self.key, stage = stage.as_str(), error = %error, "dataset failed");
        self.advance(DatasetState::Failed {
            stage,
            cause: error.to_string(),
        });
    }
}

/// Outcome of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The caller stopped the batch before every dataset was processed
    pub aborted: bool,
    pub outcomes: BTreeMap<String, DatasetOutcome>,
}

impl BatchResult {
    pub fn get(&self, key: &str) -> Option<&DatasetOutcome> {
        self.outcomes.get(key)
    }

    pub fn state(&self, key: &str) -> Option<&DatasetState> {
        self.outcomes.get(key).map(|o| &o.state)
    }

    /// Keys to re-run with `--datasets`
    pub fn failed_keys(&self) -> Vec<&str> {
        self.outcomes
            .values()
            .filter(|o| o.state.is_failed())
            .map(|o| o.key.as_str())
            .collect()
    }

    pub fn done_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.state == DatasetState::Done).count()
    }

    /// Cleaned frames of every dataset that reached DONE, for the exporters
    pub fn frames(&self) -> BTreeMap<&str, &CleanFrame> {
        self.outcomes
            .values()
            .filter(|o| o.state == DatasetState::Done)
            .filter_map(|o| o.frame.as_ref().map(|f| (o.key.as_str(), f)))
            .collect()
    }
}

pub struct Orchestrator {
    schemas: Arc<SchemaRegistry>,
    cleaning: CleaningRegistry,
    loader: Box<dyn Loader>,
    validator: Box<dyn Validator>,
    sample_rows: usize,
}

impl Orchestrator {
    /// Fails when a registered spec names a rule the cleaning registry cannot run
    pub fn new(schemas: Arc<SchemaRegistry>, cleaning: CleaningRegistry, loader: Box<dyn Loader>) -> Result<Self> {
        cleaning.ensure_covers(&schemas)?;
        Ok(Self {
            schemas,
            cleaning,
            loader,
            validator: Box::new(SchemaValidator),
            sample_rows: DEFAULT_SAMPLE_ROWS,
        })
    }

    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Run every registered dataset in registration order
    pub fn run_all(&self) -> Result<BatchResult> {
        let keys: Vec<String> = self.schemas.keys().map(str::to_string).collect();
        self.run(&keys)
    }

    pub fn run<S: AsRef<str>>(&self, keys: &[S]) -> Result<BatchResult> {
        self.run_with(keys, |_| ControlFlow::Continue(()))
    }

    /// Run the given datasets, calling `on_dataset` after each one reaches a
    /// terminal state. Returning `Break` stops the batch; datasets not yet
    /// processed stay PENDING.
    pub fn run_with<S, F>(&self, keys: &[S], mut on_dataset: F) -> Result<BatchResult>
    where
        S: AsRef<str>,
        F: FnMut(&DatasetOutcome) -> ControlFlow<()>,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("run", %run_id);
        let _enter = span.enter();
        let _timing = metrics::time_operation(MetricName::RunDuration);

        let mut seen = HashSet::new();
        let mut specs = Vec::new();
        for key in keys {
            let key = key.as_ref();
            if seen.insert(key.to_string()) {
                specs.push(self.schemas.get(key)?);
            }
        }

        let mut outcomes: BTreeMap<String, DatasetOutcome> = specs
            .iter()
            .map(|spec| (spec.key().to_string(), DatasetOutcome::pending(spec)))
            .collect();
        info!(datasets = specs.len(), "starting run");

        let mut aborted = false;
        for spec in &specs {
            let mut outcome = DatasetOutcome::pending(spec);
            self.process(spec, &mut outcome)?;

            match &outcome.state {
                DatasetState::Done => metrics::run::dataset_done(spec.key()),
                DatasetState::Failed { stage, .. } => metrics::run::dataset_failed(spec.key(), stage.as_str()),
                _ => {}
            }

            let flow = on_dataset(&outcome);
            outcomes.insert(spec.key().to_string(), outcome);
            if flow.is_break() {
                info!(after = spec.key(), "run stopped by caller");
                aborted = true;
                break;
            }
        }

        let result = BatchResult {
            run_id,
            started_at,
            finished_at: Utc::now(),
            aborted,
            outcomes,
        };
        info!(
            done = result.done_count(),
            failed = result.failed_keys().len(),
            "run finished"
        );
        Ok(result)
    }

    /// Record a stage result on the outcome. Configuration errors propagate
    /// and abort the batch; anything else fails only this dataset.
    fn settle<T>(outcome: &mut DatasetOutcome, stage: Stage, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => {
                outcome.advance(stage.into());
                Ok(Some(value))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                outcome.fail(stage, &e);
                Ok(None)
            }
        }
    }

    fn process(&self, spec: &DatasetSpec, outcome: &mut DatasetOutcome) -> Result<()> {
        let key = spec.key();
        let span = info_span!("dataset", dataset = key);
        let _enter = span.enter();

        let loaded = self.loader.load(key);
        match &loaded {
            Ok(raw) => metrics::load::success(key, raw.len()),
            Err(_) => metrics::load::error(key),
        }
        let Some(raw) = Self::settle(outcome, Stage::Loaded, loaded)? else {
            return Ok(());
        };

        let Some(frame) = Self::settle(outcome, Stage::Cleaned, self.cleaning.clean(raw, spec))? else {
            return Ok(());
        };

        let validated = self.validator.validate(&frame, spec);
        let summary = summarize(&frame, self.sample_rows);
        let Some(report) = Self::settle(outcome, Stage::Validated, validated)? else {
            outcome.summary = Some(summary);
            return Ok(());
        };
        metrics::validate::outcome(key, report.passed(), report.violating_cells());
        if !report.passed() {
            info!(violations = report.violations().len(), "validation found contract violations");
        }
        outcome.advance(DatasetState::Summarized);

        outcome.fingerprint = Some(frame.fingerprint());
        outcome.report = Some(report);
        outcome.summary = Some(summary);
        outcome.frame = Some(frame);
        outcome.advance(DatasetState::Done);
        info!(rows = outcome.summary.as_ref().map(|s| s.row_count).unwrap_or_default(), "dataset done");
        Ok(())
    }
}
