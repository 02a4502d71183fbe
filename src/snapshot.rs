//! Scope-bound memoization of feature state.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::de::DeserializeOwned;

use crate::{manager::FeatureManager, registry::AppContext, Result};

const LOCK_MSG: &str = "thread holding snapshot lock should not panic";

/// A view of feature state that stays consistent across one logical unit of
/// work (e.g. one request).
///
/// The first `is_enabled`/`get_variant` call for a feature performs the real
/// evaluation; every later call for that feature returns the memoized result
/// without re-invoking filters, providers, or assigners — even if underlying
/// definitions or filter outcomes would otherwise change mid-scope. Results
/// are keyed by feature name.
///
/// Each scope must own its own snapshot; a snapshot is not meant to be
/// shared across units of work.
pub struct FeatureManagerSnapshot {
    manager: Arc<FeatureManager>,
    flags: Mutex<HashMap<String, bool>>,
    variants: Mutex<HashMap<String, serde_json::Value>>,
}

impl FeatureManagerSnapshot {
    /// Create a snapshot over the given manager.
    pub fn new(manager: Arc<FeatureManager>) -> Self {
        FeatureManagerSnapshot {
            manager,
            flags: Mutex::new(HashMap::new()),
            variants: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a feature is enabled, memoized for this scope.
    pub async fn is_enabled(&self, feature: &str) -> Result<bool> {
        if let Some(&enabled) = self.flags.lock().expect(LOCK_MSG).get(feature) {
            return Ok(enabled);
        }

        let enabled = self.manager.is_enabled(feature).await?;

        let mut flags = self.flags.lock().expect(LOCK_MSG);
        Ok(*flags.entry(feature.to_owned()).or_insert(enabled))
    }

    /// Check whether a feature is enabled with an app context, memoized for
    /// this scope.
    ///
    /// Memoization is keyed by feature name alone: a feature first evaluated
    /// with one context keeps that result for the rest of the scope.
    pub async fn is_enabled_for(&self, feature: &str, app_context: &AppContext) -> Result<bool> {
        if let Some(&enabled) = self.flags.lock().expect(LOCK_MSG).get(feature) {
            return Ok(enabled);
        }

        let enabled = self.manager.is_enabled_for(feature, app_context).await?;

        let mut flags = self.flags.lock().expect(LOCK_MSG);
        Ok(*flags.entry(feature.to_owned()).or_insert(enabled))
    }

    /// Get the feature's variant configuration, memoized for this scope.
    ///
    /// The materialized configuration value is what is memoized; it
    /// deserializes into `T` on every call, which is deterministic, so every
    /// call observes the same variant.
    pub async fn get_variant<T>(&self, feature: &str, app_context: &AppContext) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let cached = self.variants.lock().expect(LOCK_MSG).get(feature).cloned();

        let value = match cached {
            Some(value) => value,
            None => {
                let value = self.manager.variant_value(feature, app_context).await?;
                let mut variants = self.variants.lock().expect(LOCK_MSG);
                variants.entry(feature.to_owned()).or_insert(value).clone()
            }
        };

        match value {
            serde_json::Value::Null => Ok(T::default()),
            value => Ok(serde_json::from_value(value)?),
        }
    }
}
