//! The feature evaluation engine.
use std::{any::Any, sync::Arc};

use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;

use crate::{
    assigners::{AssignerRegistration, AssignerRegistry, AssignmentContext},
    bucketing::{Bucketer, Md5Bucketer},
    builtin::TargetingAssigner,
    definition::FeatureDefinition,
    filters::{FilterContext, FilterRegistration, FilterRegistry},
    provider::{DefinitionProvider, EmbeddedVariantProvider, VariantProvider},
    registry::AppContext,
    session::SessionCache,
    targeting::TargetingContext,
    variants::select_variant,
    Error, Result,
};

const ALWAYS_ON: &str = "AlwaysOn";
const TARGETING_ALIAS: &str = "Targeting";

/// What to do when a configured filter or assigner name has no registered
/// implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingFilterPolicy {
    /// Fail the enclosing evaluation with [`Error::MissingFilter`].
    #[default]
    Fail,
    /// Log a warning and treat the filter as non-matching, continuing with
    /// the remaining filters.
    Ignore,
}

/// Configuration for [`FeatureManager`].
///
/// # Examples
/// ```
/// use flagwise::{InMemoryDefinitionProvider, ManagerConfig};
///
/// let manager = ManagerConfig::new(InMemoryDefinitionProvider::new()).to_manager();
/// ```
pub struct ManagerConfig {
    provider: Arc<dyn DefinitionProvider>,
    variant_provider: Arc<dyn VariantProvider>,
    bucketer: Arc<dyn Bucketer>,
    filters: Vec<FilterRegistration>,
    assigners: Vec<AssignerRegistration>,
    session_caches: Vec<Arc<dyn SessionCache>>,
    missing_filter_policy: MissingFilterPolicy,
}

impl ManagerConfig {
    /// Create a configuration around the given definition provider.
    pub fn new(provider: impl DefinitionProvider + 'static) -> Self {
        ManagerConfig {
            provider: Arc::new(provider),
            variant_provider: Arc::new(EmbeddedVariantProvider),
            bucketer: Arc::new(Md5Bucketer),
            filters: Vec::new(),
            assigners: Vec::new(),
            session_caches: Vec::new(),
            missing_filter_policy: MissingFilterPolicy::default(),
        }
    }

    /// Register a feature filter.
    ///
    /// Filter aliases may be namespaced with `'.'` separators. A configured
    /// name containing a separator must match a full alias exactly; an
    /// unqualified name matches on the alias's final segment, so a feature
    /// configured with `"MyFilter"` resolves a filter registered as
    /// `"MyOrg.MyProduct.MyFilter"`.
    pub fn filter(mut self, registration: FilterRegistration) -> Self {
        self.filters.push(registration);
        self
    }

    /// Register a variant assigner.
    pub fn assigner(mut self, registration: AssignerRegistration) -> Self {
        self.assigners.push(registration);
        self
    }

    /// Append a session cache. Caches are consulted in registration order.
    pub fn session_cache(mut self, cache: impl SessionCache + 'static) -> Self {
        self.session_caches.push(Arc::new(cache));
        self
    }

    /// Replace the variant provider (defaults to
    /// [`EmbeddedVariantProvider`]).
    pub fn variant_provider(mut self, provider: impl VariantProvider + 'static) -> Self {
        self.variant_provider = Arc::new(provider);
        self
    }

    /// Replace the bucketer used for rollout decisions (defaults to
    /// [`Md5Bucketer`]).
    pub fn bucketer(mut self, bucketer: impl Bucketer + 'static) -> Self {
        self.bucketer = Arc::new(bucketer);
        self
    }

    /// Set the missing-filter policy (defaults to
    /// [`MissingFilterPolicy::Fail`]).
    pub fn missing_filter_policy(mut self, policy: MissingFilterPolicy) -> Self {
        self.missing_filter_policy = policy;
        self
    }

    /// Create a [`FeatureManager`] using this configuration.
    pub fn to_manager(self) -> FeatureManager {
        let mut assigners = self.assigners;

        // The built-in targeting assigner answers to "Targeting" unless a
        // user registration claims that name.
        let claimed = assigners.iter().any(|registration| {
            let simple = registration
                .alias()
                .rsplit('.')
                .next()
                .unwrap_or_default();
            simple.eq_ignore_ascii_case(TARGETING_ALIAS)
        });
        if !claimed {
            assigners.push(AssignerRegistration::contextual::<TargetingContext, _>(
                TARGETING_ALIAS,
                Arc::new(TargetingAssigner::with_bucketer(Arc::clone(&self.bucketer))),
            ));
        }

        FeatureManager {
            definitions: self.provider,
            variants: self.variant_provider,
            bucketer: self.bucketer,
            filters: FilterRegistry::new(self.filters),
            assigners: AssignerRegistry::new(assigners),
            session_caches: self.session_caches,
            missing_filter_policy: self.missing_filter_policy,
        }
    }
}

/// Evaluates whether features are enabled and which variant they serve.
///
/// The manager is a long-lived object, safely callable concurrently from
/// many tasks; share it via [`Arc`]. Registered filters and assigners are
/// static for its lifetime and their resolution is memoized per instance.
///
/// # Examples
/// ```
/// use flagwise::{InMemoryDefinitionProvider, ManagerConfig};
///
/// let provider = InMemoryDefinitionProvider::new();
/// let manager = ManagerConfig::new(provider).to_manager();
///
/// # futures::executor::block_on(async {
/// // Unknown features evaluate as disabled.
/// assert!(!manager.is_enabled("new-checkout").await.unwrap());
/// # });
/// ```
pub struct FeatureManager {
    definitions: Arc<dyn DefinitionProvider>,
    variants: Arc<dyn VariantProvider>,
    bucketer: Arc<dyn Bucketer>,
    filters: FilterRegistry,
    assigners: AssignerRegistry,
    session_caches: Vec<Arc<dyn SessionCache>>,
    missing_filter_policy: MissingFilterPolicy,
}

impl FeatureManager {
    /// Check whether a feature is enabled.
    pub async fn is_enabled(&self, feature: &str) -> Result<bool> {
        self.is_enabled_inner(feature, None).await
    }

    /// Check whether a feature is enabled, making an application-supplied
    /// context available to filters that declared support for its type.
    pub async fn is_enabled_for(&self, feature: &str, app_context: &AppContext) -> Result<bool> {
        self.is_enabled_inner(feature, Some(app_context)).await
    }

    /// Get the variant configuration a caller should be served, deserialized
    /// into `T`.
    ///
    /// An unknown feature, or a feature without a matching variant, yields
    /// `T::default()`. For targeting-based assignment pass a
    /// [`TargetingContext`] as the app context.
    pub async fn get_variant<T>(&self, feature: &str, app_context: &AppContext) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.variant_value(feature, app_context).await? {
            serde_json::Value::Null => Ok(T::default()),
            value => Ok(serde_json::from_value(value)?),
        }
    }

    /// Enumerate the names of all features known to the definition provider.
    ///
    /// The stream is produced directly from the provider's enumeration and
    /// is not cached at this layer.
    pub fn feature_names(&self) -> BoxStream<'_, Result<String>> {
        Box::pin(
            self.definitions
                .list_definitions()
                .map(|definition| match definition {
                    Ok(definition) => Ok(definition.name),
                    Err(err) => Err(Error::from(err)),
                }),
        )
    }

    async fn is_enabled_inner(
        &self,
        feature: &str,
        app_context: Option<&AppContext>,
    ) -> Result<bool> {
        for cache in &self.session_caches {
            match cache.get(feature).await {
                Ok(Some(enabled)) => {
                    log::trace!(target: "flagwise", feature, enabled; "session cache hit");
                    return Ok(enabled);
                }
                Ok(None) => {}
                Err(err) => {
                    log::warn!(target: "flagwise", feature; "session cache read failed: {}", err);
                }
            }
        }

        let definition = self.definitions.get_definition(feature).await?;

        let enabled = match &definition {
            None => {
                log::debug!(target: "flagwise", feature; "unknown feature evaluates as disabled");
                false
            }
            Some(definition) => {
                // A feature that is always on skips filter evaluation
                // entirely.
                if definition
                    .enabled_for
                    .iter()
                    .any(|config| config.name.eq_ignore_ascii_case(ALWAYS_ON))
                {
                    true
                } else {
                    self.evaluate_filters(feature, definition, app_context)
                        .await?
                }
            }
        };

        for cache in &self.session_caches {
            if let Err(err) = cache.set(feature, enabled).await {
                log::warn!(target: "flagwise", feature; "session cache write failed: {}", err);
            }
        }

        log::trace!(target: "flagwise", feature, enabled; "evaluated feature");
        Ok(enabled)
    }

    /// Evaluate the feature's filters strictly in order, short-circuiting on
    /// the first match. Filters are never evaluated in parallel: later
    /// filters may legitimately be skipped.
    async fn evaluate_filters(
        &self,
        feature: &str,
        definition: &FeatureDefinition,
        app_context: Option<&AppContext>,
    ) -> Result<bool> {
        for config in &definition.enabled_for {
            let Some(index) = self.filters.resolve(&config.name)? else {
                match self.missing_filter_policy {
                    MissingFilterPolicy::Fail => {
                        return Err(Error::MissingFilter {
                            name: config.name.clone(),
                        });
                    }
                    MissingFilterPolicy::Ignore => {
                        let filter = config.name.as_str();
                        log::warn!(target: "flagwise",
                                   feature,
                                   filter;
                                   "feature filter is not registered; treating as non-matching");
                        continue;
                    }
                }
            };

            let context = FilterContext {
                feature_name: feature.to_owned(),
                parameters: config.parameters.clone(),
            };

            // Contextual dispatch first when an app context was supplied and
            // the filter declared support for its type; plain evaluation
            // otherwise.
            let matched = match app_context {
                Some(app_context) => match self.filters.bind(index, app_context.type_id()) {
                    Some(bound) => bound.evaluate_erased(&context, app_context).await?,
                    None => {
                        self.filters
                            .get(index)
                            .implementation
                            .evaluate(&context)
                            .await?
                    }
                },
                None => {
                    self.filters
                        .get(index)
                        .implementation
                        .evaluate(&context)
                        .await?
                }
            };

            if matched {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Resolve the variant a caller should be served and materialize its
    /// configuration. `Value::Null` means no variant.
    pub(crate) async fn variant_value(
        &self,
        feature: &str,
        app_context: &AppContext,
    ) -> Result<serde_json::Value> {
        let Some(definition) = self.definitions.get_definition(feature).await? else {
            log::debug!(target: "flagwise", feature; "unknown feature has no variant");
            return Ok(serde_json::Value::Null);
        };

        let assigner = definition.assigner.clone();
        let context = AssignmentContext { definition };

        let variant = match &assigner {
            Some(name) => match self.assigners.resolve(name)? {
                Some(index) => match self.assigners.bind(index, app_context.type_id()) {
                    Some(bound) => bound.assign_erased(&context, app_context).await?,
                    None => {
                        self.assigners
                            .get(index)
                            .implementation
                            .assign(&context)
                            .await?
                    }
                },
                None => match self.missing_filter_policy {
                    MissingFilterPolicy::Fail => {
                        return Err(Error::MissingFilter { name: name.clone() });
                    }
                    MissingFilterPolicy::Ignore => {
                        let assigner = name.as_str();
                        log::warn!(target: "flagwise",
                                   feature,
                                   assigner;
                                   "variant assigner is not registered; serving no variant");
                        None
                    }
                },
            },
            // No assigner named: built-in targeting selection over a
            // targeting context.
            None => match app_context.downcast_ref::<TargetingContext>() {
                Some(targeting) => {
                    select_variant(&context.definition, targeting, self.bucketer.as_ref())?
                        .cloned()
                }
                None => {
                    log::warn!(target: "flagwise",
                               feature;
                               "variant requested without a targeting context; serving no variant");
                    None
                }
            },
        };

        let Some(variant) = variant else {
            return Ok(serde_json::Value::Null);
        };

        log::trace!(target: "flagwise",
                    feature,
                    variant = variant.name.as_str();
                    "assigned variant");

        let value = self.variants.materialize(&context.definition, &variant).await?;
        Ok(value)
    }
}
