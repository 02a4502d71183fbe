//! Upstream collaborators: definition and variant providers.
use std::{
    collections::HashMap,
    sync::RwLock,
};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use crate::definition::{FeatureDefinition, FeatureVariant};

/// Errors surfaced by provider and session-cache implementations. The engine
/// propagates them verbatim inside [`Error::Provider`](crate::Error).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Supplies feature definitions to the engine.
///
/// Definitions are requested fresh on every evaluation and never cached by
/// the engine, so an implementation is free to hot-reload them. Fetches may
/// suspend on I/O; dropping the evaluation future cancels them.
#[async_trait]
pub trait DefinitionProvider: Send + Sync {
    /// Retrieve the definition for a feature. `Ok(None)` means the feature
    /// is unknown, which the engine treats as disabled, not as an error.
    async fn get_definition(
        &self,
        name: &str,
    ) -> std::result::Result<Option<FeatureDefinition>, BoxError>;

    /// Enumerate all known definitions lazily. The sequence may be
    /// unbounded.
    fn list_definitions(
        &self,
    ) -> BoxStream<'_, std::result::Result<FeatureDefinition, BoxError>>;
}

/// Materializes a variant's configuration payload.
///
/// The engine delegates here so variant payloads can live outside the
/// definition document (a configuration service, a file, a database row).
/// Materialization may suspend on I/O.
#[async_trait]
pub trait VariantProvider: Send + Sync {
    /// Produce the configuration value for the chosen variant.
    async fn materialize(
        &self,
        definition: &FeatureDefinition,
        variant: &FeatureVariant,
    ) -> std::result::Result<serde_json::Value, BoxError>;
}

/// A `DefinitionProvider` backed by an in-memory map.
///
/// Writers may replace definitions at any time while evaluations are in
/// flight; each evaluation sees whatever was stored when it fetched.
#[derive(Default)]
pub struct InMemoryDefinitionProvider {
    definitions: RwLock<HashMap<String, FeatureDefinition>>,
}

const LOCK_MSG: &str = "thread holding definitions lock should not panic";

impl InMemoryDefinitionProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        InMemoryDefinitionProvider::default()
    }

    /// Insert or replace a definition, keyed by its name.
    pub fn set_definition(&self, definition: FeatureDefinition) {
        self.definitions
            .write()
            .expect(LOCK_MSG)
            .insert(definition.name.clone(), definition);
    }

    /// Remove a definition, returning the previous one.
    pub fn remove_definition(&self, name: &str) -> Option<FeatureDefinition> {
        self.definitions.write().expect(LOCK_MSG).remove(name)
    }
}

#[async_trait]
impl DefinitionProvider for InMemoryDefinitionProvider {
    async fn get_definition(
        &self,
        name: &str,
    ) -> std::result::Result<Option<FeatureDefinition>, BoxError> {
        Ok(self.definitions.read().expect(LOCK_MSG).get(name).cloned())
    }

    fn list_definitions(
        &self,
    ) -> BoxStream<'_, std::result::Result<FeatureDefinition, BoxError>> {
        let definitions: Vec<_> = self
            .definitions
            .read()
            .expect(LOCK_MSG)
            .values()
            .cloned()
            .collect();
        Box::pin(stream::iter(definitions.into_iter().map(Ok)))
    }
}

/// A `VariantProvider` that serves the configuration payload embedded in the
/// variant itself.
pub struct EmbeddedVariantProvider;

#[async_trait]
impl VariantProvider for EmbeddedVariantProvider {
    async fn materialize(
        &self,
        _definition: &FeatureDefinition,
        variant: &FeatureVariant,
    ) -> std::result::Result<serde_json::Value, BoxError> {
        Ok(variant.configuration.clone())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use crate::definition::FeatureDefinition;

    use super::{DefinitionProvider, InMemoryDefinitionProvider};

    fn definition(name: &str) -> FeatureDefinition {
        FeatureDefinition {
            name: name.to_owned(),
            enabled_for: vec![],
            assigner: None,
            variants: vec![],
        }
    }

    #[tokio::test]
    async fn definitions_can_be_replaced_at_runtime() {
        let provider = InMemoryDefinitionProvider::new();
        assert!(provider.get_definition("f").await.unwrap().is_none());

        provider.set_definition(definition("f"));
        assert!(provider.get_definition("f").await.unwrap().is_some());

        provider.remove_definition("f");
        assert!(provider.get_definition("f").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_definitions_enumerates_everything() {
        let provider = InMemoryDefinitionProvider::new();
        provider.set_definition(definition("a"));
        provider.set_definition(definition("b"));

        let mut names: Vec<String> = provider
            .list_definitions()
            .map(|definition| definition.unwrap().name)
            .collect()
            .await;
        names.sort();

        assert_eq!(names, vec!["a", "b"]);
    }
}
