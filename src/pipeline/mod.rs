// Dataset processing: contracts, cleaning, validation, summaries and the
// orchestrator that runs them in order

pub mod cleaning;
pub mod orchestrator;
pub mod schema;
pub mod summary;
pub mod validate;

pub use cleaning::{CleaningRegistry, CleaningStrategy};
pub use orchestrator::{BatchResult, DatasetOutcome, DatasetState, Orchestrator, Stage};
pub use schema::{DatasetSpec, SchemaRegistry};
pub use summary::{summarize, QualitySummary};
pub use validate::{SchemaValidator, ValidationReport, Validator};
