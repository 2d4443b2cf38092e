pub mod constants;
pub mod config;
pub mod error;
pub mod pipeline;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

// Table and cell shapes shared across layers
pub mod domain;

pub mod observability;
