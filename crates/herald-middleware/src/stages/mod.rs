//! Built-in global pipelines.
//!
//! - [`logging`] - Log request start, finish and failure
//! - [`performance`] - Warn when the rest of the chain is slow
//! - [`validation`] - Run registered validators before request handlers

pub mod logging;
pub mod performance;
pub mod validation;

pub use logging::{LogMode, LoggingPipeline};
pub use performance::{ExecutionTime, PerformancePipeline};
pub use validation::{ValidationPipeline, Validator, Validators};
