// Table and cell shapes shared by every pipeline stage

pub mod frame;
pub mod value;

pub use frame::{CleanColumn, CleanFrame, RawFrame};
pub use value::{Missing, SemanticType, Value};
