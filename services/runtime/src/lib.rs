//! Chainflow Runtime
//!
//! Composes connector pipelines from the environment-backed configuration,
//! operates their dispatch and health-reporting routines, and handles
//! graceful termination on interrupt and terminate signals.

pub mod pipeline;
pub mod supervisor;

pub use pipeline::{Pipeline, PipelineAggregator};
pub use supervisor::Supervisor;
