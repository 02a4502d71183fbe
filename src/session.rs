//! Session caches: per-session feature-state collaborators.
use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;

use crate::provider::BoxError;

/// A per-session feature-state store consulted before evaluation and updated
/// after it.
///
/// All registered caches are consulted in order on read (first hit wins) and
/// written in order after every evaluation. A failing collaborator is logged
/// and skipped; it never aborts the evaluation or the remaining writes.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Look up a previously stored state for the feature.
    async fn get(&self, feature: &str) -> std::result::Result<Option<bool>, BoxError>;

    /// Store the evaluated state for the feature.
    async fn set(&self, feature: &str, enabled: bool) -> std::result::Result<(), BoxError>;
}

/// A `SessionCache` backed by an in-memory map.
#[derive(Default)]
pub struct InMemorySessionCache {
    flags: RwLock<HashMap<String, bool>>,
}

impl InMemorySessionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        InMemorySessionCache::default()
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, feature: &str) -> std::result::Result<Option<bool>, BoxError> {
        let flags = self
            .flags
            .read()
            .expect("thread holding session cache lock should not panic");
        Ok(flags.get(feature).copied())
    }

    async fn set(&self, feature: &str, enabled: bool) -> std::result::Result<(), BoxError> {
        let mut flags = self
            .flags
            .write()
            .expect("thread holding session cache lock should not panic");
        flags.insert(feature.to_owned(), enabled);
        Ok(())
    }
}
