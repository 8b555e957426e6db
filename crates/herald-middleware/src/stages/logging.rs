//! Request logging pipeline.
//!
//! Logs the start of every dispatch and its completion at `info`, and
//! failures at `error`. Failures are returned unchanged.

use crate::{
    context::PipelineContext,
    middleware::{BoxFuture, Next, Outcome, Pipeline},
};
use herald_core::BoxedRequest;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which events the [`LoggingPipeline`] records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// Log nothing.
    None,
    /// Log incoming requests only.
    Request,
    /// Log completions only.
    Response,
    /// Log requests and completions.
    #[default]
    Both,
}

impl LogMode {
    /// Returns `true` if incoming requests are logged.
    #[must_use]
    pub const fn logs_request(self) -> bool {
        matches!(self, Self::Request | Self::Both)
    }

    /// Returns `true` if completions are logged.
    #[must_use]
    pub const fn logs_response(self) -> bool {
        matches!(self, Self::Response | Self::Both)
    }
}

impl FromStr for LogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "request" => Ok(Self::Request),
            "response" => Ok(Self::Response),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown log mode '{other}'")),
        }
    }
}

/// Logs every dispatch that passes through the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPipeline {
    mode: LogMode,
}

impl LoggingPipeline {
    /// Creates a logging pipeline with the given mode.
    #[must_use]
    pub const fn new(mode: LogMode) -> Self {
        Self { mode }
    }

    /// Returns the configured mode.
    #[must_use]
    pub const fn mode(&self) -> LogMode {
        self.mode
    }
}

impl Pipeline for LoggingPipeline {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: BoxedRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if self.mode.logs_request() {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    service_type = ctx.service_type(),
                    target = %ctx.target(),
                    request = ?request,
                    "handling request"
                );
            }

            let outcome = next.run(ctx, request).await;
            let duration_ms = ctx.elapsed().as_millis() as u64;

            match &outcome {
                Ok(output) if self.mode.logs_response() => {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        service_type = ctx.service_type(),
                        has_output = output.is_some(),
                        duration_ms,
                        "request handled"
                    );
                }
                Err(error) if self.mode != LogMode::None => {
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        service_type = ctx.service_type(),
                        duration_ms,
                        error = %error,
                        "request failed"
                    );
                }
                _ => {}
            }

            outcome
        })
    }
}
