//! Built-in feature filters and variant assigners.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;

use crate::{
    assigners::{AssignmentContext, ContextualVariantAssigner, VariantAssigner},
    bucketing::{Bucketer, Md5Bucketer},
    definition::FeatureVariant,
    filters::{ContextualFeatureFilter, FeatureFilter, FilterContext},
    targeting::{is_targeted, Audience, TargetingContext},
    variants::select_variant,
    Result,
};

/// Enables a feature for the audience configured in the filter parameters.
///
/// Contextual on [`TargetingContext`]: register with
/// `FilterRegistration::contextual::<TargetingContext, _>(...)` and pass the
/// caller's context to
/// [`FeatureManager::is_enabled_for`](crate::FeatureManager::is_enabled_for).
/// Without an app context there is nobody to target, so the plain evaluation
/// never matches.
pub struct TargetingFilter {
    bucketer: Arc<dyn Bucketer>,
    ignore_case: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetingFilterSettings {
    #[serde(default)]
    audience: Audience,
}

impl TargetingFilter {
    /// Create a filter with the default bucketer and case-insensitive
    /// matching.
    pub fn new() -> Self {
        TargetingFilter::default()
    }

    /// Match user ids and group names case-sensitively.
    pub fn case_sensitive(mut self) -> Self {
        self.ignore_case = false;
        self
    }

    /// Use a custom bucketer.
    pub fn with_bucketer(bucketer: Arc<dyn Bucketer>) -> Self {
        TargetingFilter {
            bucketer,
            ignore_case: true,
        }
    }
}

impl Default for TargetingFilter {
    fn default() -> Self {
        TargetingFilter {
            bucketer: Arc::new(Md5Bucketer),
            ignore_case: true,
        }
    }
}

#[async_trait]
impl FeatureFilter for TargetingFilter {
    async fn evaluate(&self, context: &FilterContext) -> Result<bool> {
        let feature = &context.feature_name;
        log::warn!(target: "flagwise",
                   feature;
                   "targeting filter evaluated without a targeting context; nothing to target");
        Ok(false)
    }
}

#[async_trait]
impl ContextualFeatureFilter<TargetingContext> for TargetingFilter {
    async fn evaluate_for(
        &self,
        context: &FilterContext,
        app_context: &TargetingContext,
    ) -> Result<bool> {
        let settings: TargetingFilterSettings = match context.parameters.parse() {
            Ok(settings) => settings,
            Err(err) => {
                let feature = &context.feature_name;
                log::warn!(target: "flagwise",
                           feature,
                           parameters:serde = &context.parameters;
                           "unparseable targeting filter parameters: {}", err);
                return Ok(false);
            }
        };

        is_targeted(
            &settings.audience,
            app_context,
            self.ignore_case,
            &context.feature_name,
            self.bucketer.as_ref(),
        )
    }
}

/// Enables a feature for a random percentage of evaluations.
///
/// Parameters: `{ "value": 50.0 }`. Deliberately non-sticky; use
/// [`TargetingFilter`] for stable per-user rollout.
pub struct PercentageFilter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PercentageFilterSettings {
    #[serde(default)]
    value: f64,
}

#[async_trait]
impl FeatureFilter for PercentageFilter {
    async fn evaluate(&self, context: &FilterContext) -> Result<bool> {
        let settings: PercentageFilterSettings = match context.parameters.parse() {
            Ok(settings) => settings,
            Err(err) => {
                let feature = &context.feature_name;
                log::warn!(target: "flagwise",
                           feature;
                           "unparseable percentage filter parameters: {}", err);
                return Ok(false);
            }
        };

        let roll = rand::thread_rng().gen_range(0.0..100.0);
        Ok(roll < settings.value)
    }
}

/// Enables a feature inside a configured time window.
///
/// Parameters: `{ "start": "2024-06-01T00:00:00Z", "end": "..." }`, both
/// optional RFC 3339 timestamps; an absent bound is open.
pub struct TimeWindowFilter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeWindowFilterSettings {
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
}

#[async_trait]
impl FeatureFilter for TimeWindowFilter {
    async fn evaluate(&self, context: &FilterContext) -> Result<bool> {
        let settings: TimeWindowFilterSettings = match context.parameters.parse() {
            Ok(settings) => settings,
            Err(err) => {
                let feature = &context.feature_name;
                log::warn!(target: "flagwise",
                           feature;
                           "unparseable time window filter parameters: {}", err);
                return Ok(false);
            }
        };

        let now = Utc::now();
        let forbidden = matches!(settings.start, Some(t) if now < t)
            || matches!(settings.end, Some(t) if now > t);
        Ok(!forbidden)
    }
}

/// The built-in variant assigner: targeting-based cumulative-slice
/// selection.
///
/// Contextual on [`TargetingContext`]. Registered automatically under the
/// alias `"Targeting"` unless a user registration claims that name; also
/// used directly for definitions that name no assigner.
pub struct TargetingAssigner {
    bucketer: Arc<dyn Bucketer>,
}

impl TargetingAssigner {
    /// Create an assigner with the default bucketer.
    pub fn new() -> Self {
        TargetingAssigner::default()
    }

    /// Use a custom bucketer.
    pub fn with_bucketer(bucketer: Arc<dyn Bucketer>) -> Self {
        TargetingAssigner { bucketer }
    }
}

impl Default for TargetingAssigner {
    fn default() -> Self {
        TargetingAssigner {
            bucketer: Arc::new(Md5Bucketer),
        }
    }
}

#[async_trait]
impl VariantAssigner for TargetingAssigner {
    async fn assign(&self, context: &AssignmentContext) -> Result<Option<FeatureVariant>> {
        let feature = &context.definition.name;
        log::warn!(target: "flagwise",
                   feature;
                   "targeting assigner invoked without a targeting context; no variant assigned");
        Ok(None)
    }
}

#[async_trait]
impl ContextualVariantAssigner<TargetingContext> for TargetingAssigner {
    async fn assign_for(
        &self,
        context: &AssignmentContext,
        app_context: &TargetingContext,
    ) -> Result<Option<FeatureVariant>> {
        let variant = select_variant(&context.definition, app_context, self.bucketer.as_ref())?;
        Ok(variant.cloned())
    }
}

/// Assigns variants randomly, weighted by each variant's declared default
/// rollout percentage.
pub struct PercentageAssigner;

#[async_trait]
impl VariantAssigner for PercentageAssigner {
    async fn assign(&self, context: &AssignmentContext) -> Result<Option<FeatureVariant>> {
        let mut roll = rand::thread_rng().gen_range(0.0..100.0);

        for variant in &context.definition.variants {
            roll -= variant.audience.default_rollout_percentage;
            if roll < 0.0 {
                return Ok(Some(variant.clone()));
            }
        }

        Ok(None)
    }
}
