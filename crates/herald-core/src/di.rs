//! Service container and handler providers.
//!
//! Shared services are registered in a [`Container`] at startup. Handlers
//! are registered through a [`HandlerProvider`], which either holds one
//! shared instance or builds a fresh instance from the container on every
//! dispatch.
//!
//! # Example
//!
//! ```rust
//! use herald_core::di::{Container, HandlerProvider};
//! use std::sync::Arc;
//!
//! struct Inventory {
//!     warehouse: String,
//! }
//!
//! struct ReserveHandler {
//!     inventory: Arc<Inventory>,
//! }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Inventory { warehouse: "north".to_string() }));
//!
//! let provider = HandlerProvider::transient(|c: &Container| {
//!     Ok(ReserveHandler { inventory: c.resolve_required()? })
//! });
//!
//! let handler = provider.resolve(&container).unwrap();
//! assert_eq!(handler.inventory.warehouse, "north");
//! ```

use crate::error::HeraldResult;
use crate::service_map::Lifetime;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error when a dependency cannot be resolved.
#[derive(Debug, Clone, Error)]
#[error("failed to inject {type_name}: {reason}")]
pub struct InjectionError {
    /// The type name that could not be resolved.
    pub type_name: &'static str,
    /// The reason for the failure.
    pub reason: String,
}

impl InjectionError {
    /// Creates a new injection error for a missing service.
    pub fn not_registered<T>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            reason: "service not registered".to_string(),
        }
    }
}

/// A container of shared services keyed by type.
///
/// The container is `Send + Sync` and is shared by every dispatch once the
/// mediator is built.
#[derive(Default)]
pub struct Container {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any earlier service of the same type.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }

    /// Resolves a service from the container.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|s| s.clone().downcast::<T>().ok())
    }

    /// Resolves a service or returns an error.
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectionError> {
        self.resolve().ok_or_else(InjectionError::not_registered::<T>)
    }

    /// Checks if a service is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.services.len())
            .finish()
    }
}

/// Builds a handler from the container.
pub type HandlerFactory<H> = Arc<dyn Fn(&Container) -> HeraldResult<H> + Send + Sync>;

/// Supplies handler instances according to their [`Lifetime`].
pub enum HandlerProvider<H> {
    /// One instance shared by every dispatch.
    Singleton(Arc<H>),
    /// A factory invoked on every dispatch.
    Transient(HandlerFactory<H>),
}

impl<H: Send + Sync + 'static> HandlerProvider<H> {
    /// Wraps a shared instance.
    pub fn singleton(handler: H) -> Self {
        Self::Singleton(Arc::new(handler))
    }

    /// Wraps a factory invoked per dispatch.
    pub fn transient<F>(factory: F) -> Self
    where
        F: Fn(&Container) -> HeraldResult<H> + Send + Sync + 'static,
    {
        Self::Transient(Arc::new(factory))
    }

    /// Returns the lifetime of the handlers this provider yields.
    #[must_use]
    pub const fn lifetime(&self) -> Lifetime {
        match self {
            Self::Singleton(_) => Lifetime::Singleton,
            Self::Transient(_) => Lifetime::Transient,
        }
    }

    /// Resolves a handler instance.
    pub fn resolve(&self, container: &Container) -> HeraldResult<Arc<H>> {
        match self {
            Self::Singleton(handler) => Ok(Arc::clone(handler)),
            Self::Transient(factory) => factory(container).map(Arc::new),
        }
    }
}

impl<H> Clone for HandlerProvider<H> {
    fn clone(&self) -> Self {
        match self {
            Self::Singleton(handler) => Self::Singleton(Arc::clone(handler)),
            Self::Transient(factory) => Self::Transient(Arc::clone(factory)),
        }
    }
}

impl<H> fmt::Debug for HandlerProvider<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton(_) => f.write_str("HandlerProvider::Singleton"),
            Self::Transient(_) => f.write_str("HandlerProvider::Transient"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeraldError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestService {
        value: String,
    }

    impl TestService {
        fn new(value: &str) -> Self {
            Self {
                value: value.to_string(),
            }
        }
    }

    #[test]
    fn test_container_register_and_resolve() {
        let mut container = Container::new();
        container.register(Arc::new(TestService::new("hello")));

        let service: Option<Arc<TestService>> = container.resolve();
        assert_eq!(service.unwrap().value, "hello");
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_container_resolve_required_missing() {
        let container = Container::new();
        let err = container.resolve_required::<TestService>().unwrap_err();
        assert!(err.to_string().contains("TestService"));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_container_contains() {
        let mut container = Container::new();
        assert!(!container.contains::<TestService>());

        container.register(Arc::new(TestService::new("test")));
        assert!(container.contains::<TestService>());
    }

    #[test]
    fn test_singleton_provider_shares_instance() {
        let provider = HandlerProvider::singleton(TestService::new("one"));
        let container = Container::new();

        let a = provider.resolve(&container).unwrap();
        let b = provider.resolve(&container).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.lifetime(), Lifetime::Singleton);
    }

    #[test]
    fn test_transient_provider_builds_per_resolve() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let provider = HandlerProvider::transient(move |_: &Container| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(TestService::new("fresh"))
        });
        let container = Container::new();

        let a = provider.resolve(&container).unwrap();
        let b = provider.resolve(&container).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(provider.lifetime(), Lifetime::Transient);
    }

    #[test]
    fn test_transient_provider_propagates_injection_error() {
        struct NeedsService {
            _service: Arc<TestService>,
        }

        let provider = HandlerProvider::transient(|c: &Container| {
            Ok(NeedsService {
                _service: c.resolve_required()?,
            })
        });

        let err = provider.resolve(&Container::new()).err().unwrap();
        assert!(matches!(err, HeraldError::Internal { .. }));
    }
}
