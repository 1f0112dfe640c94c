use std::fmt;
use std::sync::{Arc, OnceLock};

/// Identity of a controller or serializer declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(Arc<str>);

impl TargetId {
    /// Identify a target by its Rust type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Arc::from(std::any::type_name::<T>()))
    }

    /// Identify a target by an explicit name, e.g. one declared in configuration.
    pub fn named(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference to another target that is resolved on first use and cached.
///
/// Serializers that reference each other (`articles -> author -> articles`)
/// can be declared in any order because the closure only runs once a
/// document is actually rendered.
#[derive(Clone)]
pub struct DeferredTarget {
    resolver: Arc<dyn Fn() -> TargetId + Send + Sync>,
    resolved: Arc<OnceLock<TargetId>>,
}

impl DeferredTarget {
    pub fn new(resolver: impl Fn() -> TargetId + Send + Sync + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
            resolved: Arc::new(OnceLock::new()),
        }
    }

    /// A reference whose target is already known.
    pub fn resolved(target: TargetId) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(target.clone());
        Self {
            resolver: Arc::new(move || target.clone()),
            resolved: Arc::new(cell),
        }
    }

    pub fn get(&self) -> &TargetId {
        self.resolved.get_or_init(|| (self.resolver)())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl fmt::Debug for DeferredTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved.get() {
            Some(target) => f.debug_tuple("DeferredTarget").field(target).finish(),
            None => f.write_str("DeferredTarget(<unresolved>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ArticleSerializer;

    #[test]
    fn type_and_named_targets() {
        assert_eq!(TargetId::of::<ArticleSerializer>(), TargetId::of::<ArticleSerializer>());
        assert_ne!(TargetId::of::<ArticleSerializer>(), TargetId::of::<String>());
        assert_eq!(TargetId::named("articles").to_string(), "articles");
    }

    #[test]
    fn deferred_target_resolves_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let deferred = DeferredTarget::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            TargetId::named("people")
        });
        assert!(!deferred.is_resolved());
        assert_eq!(format!("{deferred:?}"), "DeferredTarget(<unresolved>)");

        let clone = deferred.clone();
        assert_eq!(deferred.get().as_str(), "people");
        assert_eq!(clone.get().as_str(), "people");
        assert!(clone.is_resolved());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pre_resolved_target() {
        let deferred = DeferredTarget::resolved(TargetId::named("tags"));
        assert!(deferred.is_resolved());
        assert_eq!(deferred.get().as_str(), "tags");
    }
}
