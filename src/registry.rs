//! Alias-based resolution of registered filters and assigners, and the
//! per-context-type binding cache.
//!
//! Registered implementations are assumed stateless and static for the
//! engine's lifetime, so resolution results and contextual bindings are
//! memoized. Both caches are owned by the engine instance; independent
//! engines never share resolved bindings.
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{Error, Result};

/// An application-supplied context object, opaque to the engine.
///
/// Filters and assigners that declare support for the context's concrete
/// type get it back downcast; everyone else never sees it.
pub type AppContext = dyn std::any::Any + Send + Sync;

const LOCK_MSG: &str = "thread holding registry lock should not panic";

/// A named registration of a filter or assigner implementation, together
/// with the app-context types it declared support for.
///
/// Construct through [`FilterRegistration`](crate::FilterRegistration) or
/// [`AssignerRegistration`](crate::AssignerRegistration).
pub struct Registration<T: ?Sized, E: ?Sized> {
    pub(crate) alias: String,
    pub(crate) implementation: Arc<T>,
    pub(crate) bindings: Vec<ContextBinding<E>>,
}

impl<T: ?Sized, E: ?Sized> Registration<T, E> {
    /// The alias this implementation was registered under.
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// A declared (context type, type-erased evaluator) pair.
pub struct ContextBinding<E: ?Sized> {
    pub(crate) context_type: TypeId,
    pub(crate) evaluator: Arc<E>,
}

impl<E: ?Sized> Clone for ContextBinding<E> {
    fn clone(&self) -> Self {
        ContextBinding {
            context_type: self.context_type,
            evaluator: Arc::clone(&self.evaluator),
        }
    }
}

/// Registrations plus the memoization layer in front of them.
///
/// Lookups are race-tolerant get-or-compute: concurrent first lookups for a
/// key may both compute, but the first write wins and recomputation is
/// deterministic because the registration list is immutable.
pub(crate) struct Registry<T: ?Sized, E: ?Sized> {
    entries: Vec<Registration<T, E>>,
    resolutions: RwLock<HashMap<String, Option<usize>>>,
    bindings: RwLock<HashMap<(usize, TypeId), Option<Arc<E>>>>,
}

impl<T: ?Sized, E: ?Sized> Registry<T, E> {
    pub(crate) fn new(entries: Vec<Registration<T, E>>) -> Self {
        Registry {
            entries,
            resolutions: RwLock::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a configured name to a registration index.
    ///
    /// A name containing a namespace separator must match a full alias
    /// exactly; an unqualified name matches on the alias's final path
    /// segment. Both comparisons ignore ASCII case. More than one match is
    /// [`Error::AmbiguousFilter`]; no match is `Ok(None)` and the caller
    /// decides fatality.
    pub(crate) fn resolve(&self, name: &str) -> Result<Option<usize>> {
        if let Some(&resolution) = self.resolutions.read().expect(LOCK_MSG).get(name) {
            return Ok(resolution);
        }

        let mut matches = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| alias_matches(&entry.alias, name))
            .map(|(index, _)| index);

        let resolution = matches.next();

        if matches.next().is_some() {
            return Err(Error::AmbiguousFilter {
                name: name.to_owned(),
            });
        }

        let mut cache = self.resolutions.write().expect(LOCK_MSG);
        Ok(*cache.entry(name.to_owned()).or_insert(resolution))
    }

    pub(crate) fn get(&self, index: usize) -> &Registration<T, E> {
        &self.entries[index]
    }

    /// Look up the evaluator the registration bound to `context_type`, if
    /// any. When an implementation declares several compatible context
    /// types, the first declared match wins.
    pub(crate) fn bind(&self, index: usize, context_type: TypeId) -> Option<Arc<E>> {
        if let Some(bound) = self.bindings.read().expect(LOCK_MSG).get(&(index, context_type)) {
            return bound.clone();
        }

        let computed = self.entries[index]
            .bindings
            .iter()
            .find(|binding| binding.context_type == context_type)
            .map(|binding| Arc::clone(&binding.evaluator));

        let mut cache = self.bindings.write().expect(LOCK_MSG);
        cache.entry((index, context_type)).or_insert(computed).clone()
    }
}

fn alias_matches(alias: &str, configured: &str) -> bool {
    if configured.contains('.') {
        // The configured name is namespaced. It must be an exact match.
        alias.eq_ignore_ascii_case(configured)
    } else {
        // An unqualified name matches the simple name of the alias, e.g.
        // 'MyFilter' for 'MyOrg.MyProduct.MyFilter'.
        let simple = alias.rsplit('.').next().unwrap_or(alias);
        simple.eq_ignore_ascii_case(configured)
    }
}
