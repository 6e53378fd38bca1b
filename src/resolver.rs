use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use crate::error::CourierError;

/// Capability resolution contract consumed by the context facade.
///
/// Implemented by the host's dependency container; the bridging layer only
/// ever reads through it. Resolution failure is `None` by contract, never an
/// error: whether a capability exists is the resolver's business, and this
/// crate passes the answer through untranslated.
pub trait Resolver: Send + Sync {
    /// Resolve a capability by its type identifier
    fn resolve_raw(&self, capability: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

impl dyn Resolver {
    /// Typed front over [`resolve_raw`](Resolver::resolve_raw)
    pub fn try_resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve_raw(TypeId::of::<T>())
            .and_then(|entry| entry.downcast::<T>().ok())
    }
}

/// Type-map resolver holding one shared instance per capability type.
///
/// ```rust
/// use std::sync::Arc;
/// use courier::resolver::{BasicResolver, Resolver};
///
/// struct RateLimiter {
///     burst: u32,
/// }
///
/// let mut resolver = BasicResolver::new();
/// resolver.register(RateLimiter { burst: 10 });
///
/// let resolver: Arc<dyn Resolver> = Arc::new(resolver);
/// assert_eq!(resolver.try_resolve::<RateLimiter>().map(|r| r.burst), Some(10));
/// ```
#[derive(Default)]
pub struct BasicResolver {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl BasicResolver {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register an instance under its concrete type
    pub fn register<T: Any + Send + Sync>(&mut self, instance: T) {
        self.register_arc(Arc::new(instance));
    }

    /// Register an already-shared instance under its concrete type
    pub fn register_arc<T: Any + Send + Sync>(&mut self, instance: Arc<T>) {
        trace!("registering capability {}", std::any::type_name::<T>());
        self.entries.insert(TypeId::of::<T>(), instance);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Resolver for BasicResolver {
    fn resolve_raw(&self, capability: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.entries.get(&capability).cloned()
    }
}

static GLOBAL_RESOLVER: OnceLock<Arc<dyn Resolver>> = OnceLock::new();

/// Register the process-wide default resolver.
///
/// Contexts constructed without a per-instance override fall back to this
/// instance. Single-set with process lifetime; a second registration fails
/// rather than silently swapping the container out from under live contexts.
pub fn set_global_resolver(resolver: Arc<dyn Resolver>) -> Result<(), CourierError> {
    debug!("registering process-wide default resolver");
    GLOBAL_RESOLVER
        .set(resolver)
        .map_err(|_| CourierError::GlobalResolverAlreadySet)
}

/// The process-wide default resolver, or a shared empty resolver if none was
/// registered. Never `None`, so the facade's fallback chain stays total.
pub fn global_resolver() -> Arc<dyn Resolver> {
    static EMPTY: OnceLock<Arc<dyn Resolver>> = OnceLock::new();
    GLOBAL_RESOLVER
        .get()
        .cloned()
        .unwrap_or_else(|| EMPTY.get_or_init(|| Arc::new(BasicResolver::new())).clone())
}
