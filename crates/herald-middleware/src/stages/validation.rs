//! Request validation pipeline.
//!
//! Validators are registered per request type in a [`Validators`] registry.
//! The [`ValidationPipeline`] runs every validator registered for the
//! incoming request type and short-circuits with
//! [`HeraldError::Validation`] when any of them reports a failure. Request
//! types without validators pass through untouched.
//!
//! Replies are never validated: the pipeline is left out of chains that end
//! in a response handler.
//!
//! # Example
//!
//! ```
//! use herald_core::Request;
//! use herald_middleware::stages::{ValidationPipeline, Validators};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct CreateOrder {
//!     quantity: u32,
//! }
//!
//! impl Request for CreateOrder {
//!     type Output = u64;
//! }
//!
//! let mut validators = Validators::new();
//! validators.register::<CreateOrder, _>(|order: &CreateOrder| {
//!     if order.quantity == 0 {
//!         Err(vec!["quantity must be positive".to_string()])
//!     } else {
//!         Ok(())
//!     }
//! });
//!
//! let pipeline = ValidationPipeline::new(validators);
//! # let _ = pipeline;
//! ```

use crate::{
    context::PipelineContext,
    middleware::{BoxFuture, Next, Outcome, Pipeline},
};
use herald_core::{BoxedRequest, ErasedRequest, HandlerKind, HeraldError, HeraldResult, Request};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Validates requests of type `R`.
///
/// Returns the list of failure messages when the request is invalid.
pub trait Validator<R: Request>: Send + Sync + 'static {
    /// Validates one request.
    fn validate(&self, request: &R) -> Result<(), Vec<String>>;
}

impl<R, F> Validator<R> for F
where
    R: Request,
    F: Fn(&R) -> Result<(), Vec<String>> + Send + Sync + 'static,
{
    fn validate(&self, request: &R) -> Result<(), Vec<String>> {
        self(request)
    }
}

trait ErasedValidator: Send + Sync {
    fn validate(&self, request: &dyn Any) -> Result<(), Vec<String>>;
}

struct TypedValidator<R, V> {
    validator: V,
    _request: PhantomData<fn(R)>,
}

impl<R, V> ErasedValidator for TypedValidator<R, V>
where
    R: Request,
    V: Validator<R>,
{
    fn validate(&self, request: &dyn Any) -> Result<(), Vec<String>> {
        match request.downcast_ref::<R>() {
            Some(request) => self.validator.validate(request),
            None => Ok(()),
        }
    }
}

/// Validators keyed by request type.
#[derive(Default, Clone)]
pub struct Validators {
    by_type: HashMap<TypeId, Vec<Arc<dyn ErasedValidator>>>,
}

impl Validators {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a validator for request type `R`.
    ///
    /// Several validators may be registered for the same type; all of them
    /// run and their failures are combined.
    pub fn register<R, V>(&mut self, validator: V)
    where
        R: Request,
        V: Validator<R>,
    {
        self.by_type
            .entry(TypeId::of::<R>())
            .or_default()
            .push(Arc::new(TypedValidator {
                validator,
                _request: PhantomData,
            }));
    }

    /// Returns `true` if at least one validator is registered for `R`.
    #[must_use]
    pub fn contains<R: Request>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<R>())
    }

    /// Returns the number of request types with validators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Returns `true` if no validators are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Runs every validator registered for the request's type.
    pub fn validate(&self, request: &dyn ErasedRequest) -> HeraldResult<()> {
        let Some(validators) = self.by_type.get(&request.request_type_id()) else {
            return Ok(());
        };

        let failures: Vec<String> = validators
            .iter()
            .filter_map(|v| v.validate(request.as_any()).err())
            .flatten()
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HeraldError::validation_with_failures(
                format!("{} is invalid", request.identity()),
                failures,
            ))
        }
    }
}

impl fmt::Debug for Validators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validators")
            .field("request_types", &self.by_type.len())
            .finish()
    }
}

/// Rejects invalid requests before they reach the handler.
#[derive(Debug, Clone, Default)]
pub struct ValidationPipeline {
    validators: Arc<Validators>,
}

impl ValidationPipeline {
    /// Creates a validation pipeline over the given registry.
    #[must_use]
    pub fn new(validators: Validators) -> Self {
        Self {
            validators: Arc::new(validators),
        }
    }

    /// Returns the validator registry.
    #[must_use]
    pub fn validators(&self) -> &Validators {
        &self.validators
    }
}

impl Pipeline for ValidationPipeline {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn applies_to(&self, kind: HandlerKind) -> bool {
        kind == HandlerKind::Request
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: BoxedRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if let Err(error) = self.validators.validate(&*request) {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    service_type = ctx.service_type(),
                    error = %error,
                    "request rejected by validation"
                );
                return Err(error);
            }
            next.run(ctx, request).await
        })
    }
}
