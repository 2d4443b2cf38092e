//! Cleaning rule set: turns a loaded [`RawFrame`] into a [`CleanFrame`] that
//! matches its dataset spec.
//!
//! Every strategy runs the same ordered steps (see [`steps`]); strategies only
//! differ in how they prepare the raw frame and which derived columns they
//! compute.

pub mod coerce;
pub mod registry;
pub mod steps;
pub mod strategies;

use tracing::{debug, info, instrument};

use crate::domain::{CleanFrame, RawFrame};
use crate::error::Result;
use crate::observability::metrics::{self, MetricName};
use crate::pipeline::schema::DatasetSpec;

pub use registry::CleaningRegistry;
pub use steps::Table;

/// A dataset-specific cleaning strategy
pub trait CleaningStrategy: Send + Sync {
    /// Rule reference this strategy is registered under
    fn name(&self) -> &str;

    /// Derived columns this strategy knows how to compute
    fn derives(&self) -> &[&'static str] {
        &[]
    }

    /// Reshape the raw frame before column normalization
    fn prepare(&self, raw: RawFrame, _spec: &DatasetSpec) -> Result<RawFrame> {
        Ok(raw)
    }

    /// Append derived columns once rows are scoped and merged
    fn derive(&self, _table: &mut Table, _spec: &DatasetSpec) -> Result<()> {
        Ok(())
    }

    fn clean(&self, raw: RawFrame, spec: &DatasetSpec) -> Result<CleanFrame> {
        run_steps(self, raw, spec)
    }
}

/// The shared step sequence
#[instrument(skip_all, fields(dataset = %spec.key(), rule = %spec.rule()))]
pub fn run_steps<S: CleaningStrategy + ?Sized>(strategy: &S, raw: RawFrame, spec: &DatasetSpec) -> Result<CleanFrame> {
    let dataset = spec.key();
    let _timing = metrics::time_operation(MetricName::CleanDuration).with_dataset(dataset);
    let rows_in = raw.len();

    let raw = strategy.prepare(raw, spec)?;
    let mut table = steps::select_columns(raw, spec)?;
    let coercion_failures = steps::coerce_columns(&mut table, spec);
    let filtered_out = steps::filter_scope(&mut table, spec);
    let rollups_removed = steps::drop_rollups(&mut table, spec);
    let merged = steps::merge_duplicates(&mut table, spec)?;
    strategy.derive(&mut table, spec)?;
    let frame = steps::assemble(table, spec)?;

    metrics::clean::coercion_failures(dataset, coercion_failures);
    metrics::clean::filtered_out(dataset, filtered_out);
    metrics::clean::rollups_removed(dataset, rollups_removed);
    metrics::clean::rows_merged(dataset, merged);
    metrics::clean::rows_out(dataset, frame.len());

    if coercion_failures > 0 {
        info!(dataset, coercion_failures, "values could not be coerced and were marked missing");
    }
    debug!(
        dataset,
        rule = strategy.name(),
        rows_in,
        filtered_out,
        rollups_removed,
        merged,
        rows_out = frame.len(),
        "cleaned"
    );
    Ok(frame)
}
