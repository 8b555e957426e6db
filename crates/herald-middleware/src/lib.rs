//! # Herald Middleware
//!
//! Pipeline composition for the Herald mediator.
//!
//! Every dispatch, local or distributed, runs through a [`Chain`] of
//! pipelines wrapped around the resolved handler:
//!
//! ```text
//! send(request) → Global[0] → … → Global[n] → Scoped[0] → … → Handler
//!                                                               ↓
//! outcome      ← Global[0] ← … ← Global[n] ← Scoped[0] ← … ←───┘
//! ```
//!
//! ## Key Types
//!
//! - [`Pipeline`] - Type-erased stage wrapping the rest of the chain
//! - [`RequestPipeline`] - Stage bound to one request type, adapted by [`Scoped`]
//! - [`Next`] - Callback running the rest of the chain
//! - [`Chain`] - Immutable, ordered set of stages
//! - [`PipelineContext`] - Mutable state shared by the stages of one dispatch
//!
//! ## Built-in Stages
//!
//! | Stage | Pipeline | Purpose |
//! |-------|----------|---------|
//! | logging | [`stages::LoggingPipeline`] | Log start, finish and failure |
//! | performance | [`stages::PerformancePipeline`] | Warn on slow dispatches |
//! | validation | [`stages::ValidationPipeline`] | Reject invalid requests (request handlers only) |

#![doc(html_root_url = "https://docs.rs/herald-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod typed;

pub use context::PipelineContext;
pub use middleware::{downcast_output, BoxFuture, BoxedOutput, Next, Outcome, Pipeline, Terminal};
pub use pipeline::{BoxedPipeline, Chain, ChainBuilder};
pub use stages::LogMode;
pub use typed::{RequestPipeline, Scoped, TypedNext};
