//! The [`Request`] trait and its type-erased form.
//!
//! Every message dispatched through Herald is a value of a concrete type
//! implementing [`Request`]. The type declares exactly one output type and a
//! stable string identity used for stream keys and envelope type fields.

use crate::error::{HeraldError, HeraldResult};
use serde::{de::DeserializeOwned, Serialize};
use std::any::{Any, TypeId};
use std::fmt;

/// A message with exactly one output type.
///
/// # Example
///
/// ```
/// use herald_core::Request;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Ping {
///     message: String,
/// }
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Pong {
///     message: String,
/// }
///
/// impl Request for Ping {
///     type Output = Pong;
/// }
///
/// assert_eq!(Ping::type_identity(), "Ping");
/// assert_eq!(Ping::output_identity(), "Pong");
/// ```
pub trait Request: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// The value a request handler produces for this request.
    type Output: Serialize + DeserializeOwned + fmt::Debug + Send + 'static;

    /// Stable identity of the request type.
    ///
    /// Defaults to the unqualified type name. Override it when two request
    /// types in different modules share a name, or to keep stream keys
    /// stable across renames.
    fn type_identity() -> &'static str {
        short_type_name::<Self>()
    }

    /// Stable identity of the output type, written as `payload_type` on replies.
    fn output_identity() -> &'static str {
        short_type_name::<Self::Output>()
    }
}

/// Returns the unqualified name of `T`, without module path or generic arguments.
///
/// ```
/// use herald_core::short_type_name;
///
/// assert_eq!(short_type_name::<String>(), "String");
/// assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
/// ```
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A request whose concrete type has been erased.
///
/// Pipelines operate on erased requests so one pipeline instance can wrap
/// handlers of every request type.
pub trait ErasedRequest: Send + Sync + fmt::Debug + 'static {
    /// Type identity of the concrete request.
    fn identity(&self) -> &'static str;

    /// `TypeId` of the concrete request.
    fn request_type_id(&self) -> TypeId;

    /// Borrows the request as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrows the request as [`Any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Converts the boxed request into a boxed [`Any`].
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<R: Request> ErasedRequest for R {
    fn identity(&self) -> &'static str {
        R::type_identity()
    }

    fn request_type_id(&self) -> TypeId {
        TypeId::of::<R>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// A boxed, type-erased request.
pub type BoxedRequest = Box<dyn ErasedRequest>;

impl dyn ErasedRequest {
    /// Recovers the concrete request.
    pub fn downcast<R: Request>(self: Box<Self>) -> HeraldResult<R> {
        let found = self.identity();
        self.into_any()
            .downcast::<R>()
            .map(|request| *request)
            .map_err(|_| HeraldError::type_mismatch(R::type_identity(), found))
    }

    /// Borrows the concrete request, if it is an `R`.
    #[must_use]
    pub fn downcast_ref<R: Request>(&self) -> Option<&R> {
        self.as_any().downcast_ref::<R>()
    }

    /// Mutably borrows the concrete request, if it is an `R`.
    pub fn downcast_mut<R: Request>(&mut self) -> Option<&mut R> {
        self.as_any_mut().downcast_mut::<R>()
    }
}
