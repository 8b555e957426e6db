//! # Herald Core
//!
//! Core types and traits for the Herald mediator.
//!
//! This crate provides the foundational types used throughout Herald:
//!
//! - [`Request`] - A message type with exactly one output type
//! - [`RequestHandler`] / [`ResponseHandler`] - Handler traits
//! - [`RequestContext`] - Per-dispatch context (request id, credential, cancellation)
//! - [`ServiceMap`] - Registry entry describing a handler
//! - [`HeraldError`] - Standard error type
//! - [`di`] - Service container and handler providers
//! - [`codec`] - JSON payload codec

#![doc(html_root_url = "https://docs.rs/herald-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod codec;
mod context;
pub mod di;
mod error;
mod handler;
mod request;
mod service_map;

pub use context::{Origin, RequestContext, RequestId};
pub use error::{HeraldError, HeraldResult};
pub use handler::{
    handler_fn, response_handler_fn, FnHandler, FnResponseHandler, RequestHandler,
    ResponseHandler,
};
pub use request::{short_type_name, BoxedRequest, ErasedRequest, Request};
pub use service_map::{HandlerKind, Lifetime, ServiceMap};
