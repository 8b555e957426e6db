//! Service map entries describing registered handlers.
//!
//! A [`ServiceMap`] is built once per registered handler at startup and is
//! read-only afterwards. The queuing layer uses it to decide which streams a
//! process consumes, and the dispatcher uses it to resolve handlers.

use crate::request::{short_type_name, Request};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a handler plays for its request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Handles a request and produces its output.
    Request,
    /// Processes the reply to a previously published request.
    Response,
}

impl HandlerKind {
    /// Number of arguments the handler receives besides the context.
    #[must_use]
    pub const fn arity(self) -> u8 {
        match self {
            Self::Request => 1,
            Self::Response => 3,
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

/// How handler instances are created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// One instance shared by every dispatch.
    #[default]
    Singleton,
    /// A fresh instance is built for every dispatch.
    Transient,
}

/// Registry entry for one handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceMap {
    request_type: &'static str,
    output_type: &'static str,
    kind: HandlerKind,
    handler_type: &'static str,
    lifetime: Lifetime,
}

impl ServiceMap {
    /// Builds the entry for handler `H` serving request `R`.
    #[must_use]
    pub fn of<R: Request, H: ?Sized>(kind: HandlerKind, lifetime: Lifetime) -> Self {
        Self {
            request_type: R::type_identity(),
            output_type: R::output_identity(),
            kind,
            handler_type: short_type_name::<H>(),
            lifetime,
        }
    }

    /// Type identity of the request.
    #[must_use]
    pub const fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Type identity of the request's output.
    #[must_use]
    pub const fn output_type(&self) -> &'static str {
        self.output_type
    }

    /// The handler kind.
    #[must_use]
    pub const fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Short type name of the handler.
    #[must_use]
    pub const fn handler_type(&self) -> &'static str {
        self.handler_type
    }

    /// The handler lifetime.
    #[must_use]
    pub const fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Number of handler arguments besides the context.
    #[must_use]
    pub const fn arity(&self) -> u8 {
        self.kind.arity()
    }
}
