use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use flagwise::{
    AssignerRegistration, AssignmentContext, Bucketer, ContextualVariantAssigner, Error,
    FeatureDefinition, FeatureVariant, FilterRegistration, InMemoryDefinitionProvider,
    ManagerConfig, MissingFilterPolicy, PercentageFilter, Result, TargetingContext,
    TargetingFilter, VariantAssigner,
};

/// Maps every context id to the same bucket.
struct FixedBucketer(f64);

impl Bucketer for FixedBucketer {
    fn bucket(&self, _context_id: &str) -> f64 {
        self.0
    }
}

fn definition(value: serde_json::Value) -> FeatureDefinition {
    serde_json::from_value(value).unwrap()
}

fn provider_with(definitions: Vec<serde_json::Value>) -> InMemoryDefinitionProvider {
    let provider = InMemoryDefinitionProvider::new();
    for value in definitions {
        provider.set_definition(definition(value));
    }
    provider
}

#[derive(Debug, Default, Deserialize, PartialEq)]
struct CheckoutSettings {
    layout: String,
    #[serde(default)]
    discount: f64,
}

#[tokio::test]
async fn targets_users_and_groups_end_to_end() {
    let provider = provider_with(vec![json!({
        "name": "beta-dashboard",
        "enabledFor": [{
            "name": "Targeting",
            "parameters": {
                "audience": {
                    "users": ["alice"],
                    "groups": [{"name": "ring0", "rolloutPercentage": 100.0}],
                    "defaultRolloutPercentage": 0.0
                }
            }
        }]
    })]);

    let manager = ManagerConfig::new(provider)
        .filter(FilterRegistration::contextual::<TargetingContext, _>(
            "Targeting",
            Arc::new(TargetingFilter::new()),
        ))
        .to_manager();

    let alice = TargetingContext::new("Alice");
    assert!(manager.is_enabled_for("beta-dashboard", &alice).await.unwrap());

    let insider = TargetingContext::new("bob").group("ring0");
    assert!(manager.is_enabled_for("beta-dashboard", &insider).await.unwrap());

    let outsider = TargetingContext::new("carol");
    assert!(!manager.is_enabled_for("beta-dashboard", &outsider).await.unwrap());

    // Without any app context the targeting filter has nobody to target.
    assert!(!manager.is_enabled("beta-dashboard").await.unwrap());
}

#[tokio::test]
async fn serves_variants_from_sequential_rollout_slices() {
    let feature = json!({
        "name": "checkout",
        "enabledFor": [{"name": "AlwaysOn"}],
        "variants": [
            {
                "name": "compact",
                "audience": {"defaultRolloutPercentage": 30.0},
                "configuration": {"layout": "compact"}
            },
            {
                "name": "wide",
                "audience": {"defaultRolloutPercentage": 40.0},
                "configuration": {"layout": "wide", "discount": 5.0}
            },
            {
                "name": "classic",
                "isDefault": true,
                "audience": {"defaultRolloutPercentage": 100.0},
                "configuration": {"layout": "classic"}
            }
        ]
    });

    let variant_at = |bucket: f64| {
        let feature = feature.clone();
        async move {
            let manager = ManagerConfig::new(provider_with(vec![feature]))
                .bucketer(FixedBucketer(bucket))
                .to_manager();
            manager
                .get_variant::<CheckoutSettings>("checkout", &TargetingContext::new("bob"))
                .await
                .unwrap()
        }
    };

    assert_eq!(variant_at(10.0).await.layout, "compact");
    assert_eq!(variant_at(50.0).await.layout, "wide");
    assert_eq!(variant_at(50.0).await.discount, 5.0);
    assert_eq!(variant_at(90.0).await.layout, "classic");
}

#[tokio::test]
async fn group_slices_accumulate_across_variants() {
    let feature = json!({
        "name": "search",
        "variants": [
            {
                "name": "first",
                "audience": {"groups": [{"name": "beta", "rolloutPercentage": 50.0}]},
                "configuration": {"layout": "first"}
            },
            {
                "name": "second",
                "audience": {"groups": [{"name": "beta", "rolloutPercentage": 50.0}]},
                "configuration": {"layout": "second"}
            }
        ]
    });

    let variant_at = |bucket: f64| {
        let feature = feature.clone();
        async move {
            let manager = ManagerConfig::new(provider_with(vec![feature]))
                .bucketer(FixedBucketer(bucket))
                .to_manager();
            let context = TargetingContext::new("bob").group("beta");
            manager
                .get_variant::<CheckoutSettings>("search", &context)
                .await
                .unwrap()
        }
    };

    assert_eq!(variant_at(30.0).await.layout, "first");
    assert_eq!(variant_at(70.0).await.layout, "second");

    // Outside the group there is no matching slice and no default variant.
    let manager = ManagerConfig::new(provider_with(vec![feature.clone()]))
        .bucketer(FixedBucketer(70.0))
        .to_manager();
    let outsider = TargetingContext::new("bob");
    let settings = manager
        .get_variant::<CheckoutSettings>("search", &outsider)
        .await
        .unwrap();
    assert_eq!(settings, CheckoutSettings::default());
}

#[tokio::test]
async fn unknown_features_fail_closed() {
    let manager = ManagerConfig::new(InMemoryDefinitionProvider::new()).to_manager();

    assert!(!manager.is_enabled("DoesNotExist").await.unwrap());

    let settings = manager
        .get_variant::<CheckoutSettings>("DoesNotExist", &TargetingContext::new("bob"))
        .await
        .unwrap();
    assert_eq!(settings, CheckoutSettings::default());

    let names: Vec<String> = manager
        .feature_names()
        .map(|name| name.unwrap())
        .collect()
        .await;
    assert!(!names.contains(&"DoesNotExist".to_owned()));
}

#[tokio::test]
async fn feature_names_come_from_the_provider() {
    let provider = provider_with(vec![
        json!({"name": "one"}),
        json!({"name": "two"}),
    ]);
    let manager = ManagerConfig::new(provider).to_manager();

    let mut names: Vec<String> = manager
        .feature_names()
        .map(|name| name.unwrap())
        .collect()
        .await;
    names.sort();

    assert_eq!(names, vec!["one", "two"]);
}

#[tokio::test]
async fn definitions_hot_reload_between_evaluations() {
    let provider = Arc::new(InMemoryDefinitionProvider::new());
    provider.set_definition(definition(json!({"name": "f"})));

    struct SharedProvider(Arc<InMemoryDefinitionProvider>);

    #[async_trait]
    impl flagwise::DefinitionProvider for SharedProvider {
        async fn get_definition(
            &self,
            name: &str,
        ) -> std::result::Result<Option<FeatureDefinition>, flagwise::BoxError> {
            self.0.get_definition(name).await
        }

        fn list_definitions(
            &self,
        ) -> futures::stream::BoxStream<
            '_,
            std::result::Result<FeatureDefinition, flagwise::BoxError>,
        > {
            self.0.list_definitions()
        }
    }

    let manager = ManagerConfig::new(SharedProvider(provider.clone())).to_manager();
    assert!(!manager.is_enabled("f").await.unwrap());

    provider.set_definition(definition(json!({
        "name": "f",
        "enabledFor": [{"name": "AlwaysOn"}]
    })));
    assert!(manager.is_enabled("f").await.unwrap());
}

#[tokio::test]
async fn namespaced_filters_resolve_end_to_end() {
    let provider = provider_with(vec![
        json!({"name": "by-short-name", "enabledFor": [{"name": "Percentage", "parameters": {"value": 100.0}}]}),
        json!({"name": "by-full-name", "enabledFor": [{"name": "MyOrg.Rollout.Percentage", "parameters": {"value": 100.0}}]}),
        json!({"name": "by-wrong-namespace", "enabledFor": [{"name": "Other.Percentage"}]}),
    ]);

    let manager = ManagerConfig::new(provider)
        .filter(FilterRegistration::new(
            "MyOrg.Rollout.Percentage",
            PercentageFilter,
        ))
        .to_manager();

    assert!(manager.is_enabled("by-short-name").await.unwrap());
    assert!(manager.is_enabled("by-full-name").await.unwrap());
    assert!(matches!(
        manager.is_enabled("by-wrong-namespace").await,
        Err(Error::MissingFilter { name }) if name == "Other.Percentage"
    ));
}

#[tokio::test]
async fn snapshot_gives_one_consistent_answer_per_feature() {
    let provider = provider_with(vec![json!({
        "name": "coin-flip",
        "enabledFor": [{"name": "Percentage", "parameters": {"value": 50.0}}]
    })]);

    let manager = Arc::new(
        ManagerConfig::new(provider)
            .filter(FilterRegistration::new("Percentage", PercentageFilter))
            .to_manager(),
    );

    // The percentage filter is non-deterministic, but within one snapshot
    // every check observes the first answer.
    for _ in 0..10 {
        let snapshot = flagwise::FeatureManagerSnapshot::new(manager.clone());
        let first = snapshot.is_enabled("coin-flip").await.unwrap();
        for _ in 0..5 {
            assert_eq!(snapshot.is_enabled("coin-flip").await.unwrap(), first);
        }
    }
}

#[tokio::test]
async fn custom_assigners_are_resolved_by_name() {
    struct RegionAssigner;

    #[async_trait]
    impl VariantAssigner for RegionAssigner {
        async fn assign(&self, _context: &AssignmentContext) -> Result<Option<FeatureVariant>> {
            Ok(None)
        }
    }

    struct Region(&'static str);

    #[async_trait]
    impl ContextualVariantAssigner<Region> for RegionAssigner {
        async fn assign_for(
            &self,
            context: &AssignmentContext,
            region: &Region,
        ) -> Result<Option<FeatureVariant>> {
            Ok(context
                .definition
                .variants
                .iter()
                .find(|variant| variant.name == region.0)
                .cloned())
        }
    }

    let provider = provider_with(vec![json!({
        "name": "greeting",
        "assigner": "Region",
        "variants": [
            {"name": "emea", "configuration": {"layout": "emea"}},
            {"name": "apac", "configuration": {"layout": "apac"}}
        ]
    })]);

    let manager = ManagerConfig::new(provider)
        .assigner(AssignerRegistration::contextual::<Region, _>(
            "Region",
            Arc::new(RegionAssigner),
        ))
        .to_manager();

    let settings = manager
        .get_variant::<CheckoutSettings>("greeting", &Region("apac"))
        .await
        .unwrap();
    assert_eq!(settings.layout, "apac");

    // A context the assigner declared no support for falls back to the
    // plain assignment, which serves nothing.
    let settings = manager
        .get_variant::<CheckoutSettings>("greeting", &TargetingContext::new("bob"))
        .await
        .unwrap();
    assert_eq!(settings, CheckoutSettings::default());
}

#[tokio::test]
async fn missing_assigner_follows_the_missing_filter_policy() {
    let feature = json!({
        "name": "greeting",
        "assigner": "Nope",
        "variants": [{"name": "only", "configuration": {"layout": "only"}}]
    });

    let strict = ManagerConfig::new(provider_with(vec![feature.clone()])).to_manager();
    assert!(matches!(
        strict
            .get_variant::<CheckoutSettings>("greeting", &TargetingContext::new("bob"))
            .await,
        Err(Error::MissingFilter { name }) if name == "Nope"
    ));

    let tolerant = ManagerConfig::new(provider_with(vec![feature]))
        .missing_filter_policy(MissingFilterPolicy::Ignore)
        .to_manager();
    let settings = tolerant
        .get_variant::<CheckoutSettings>("greeting", &TargetingContext::new("bob"))
        .await
        .unwrap();
    assert_eq!(settings, CheckoutSettings::default());
}

#[tokio::test]
async fn invalid_audiences_are_rejected_not_clamped() {
    let provider = provider_with(vec![json!({
        "name": "broken",
        "enabledFor": [{
            "name": "Targeting",
            "parameters": {"audience": {"defaultRolloutPercentage": 150.0}}
        }]
    })]);

    let manager = ManagerConfig::new(provider)
        .filter(FilterRegistration::contextual::<TargetingContext, _>(
            "Targeting",
            Arc::new(TargetingFilter::new()),
        ))
        .to_manager();

    assert!(matches!(
        manager
            .is_enabled_for("broken", &TargetingContext::new("bob"))
            .await,
        Err(Error::InvalidAudience { .. })
    ));
}
