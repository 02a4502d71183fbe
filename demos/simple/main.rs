use std::sync::Arc;

use flagwise::{
    FilterRegistration, InMemoryDefinitionProvider, ManagerConfig, TargetingContext,
    TargetingFilter,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    // In a real application the provider would be backed by your
    // configuration system; definitions can be replaced at runtime.
    let provider = InMemoryDefinitionProvider::new();
    provider.set_definition(
        serde_json::from_value(serde_json::json!({
            "name": "new-checkout",
            "enabledFor": [{
                "name": "Targeting",
                "parameters": {
                    "audience": {
                        "users": ["alice"],
                        "groups": [{"name": "beta", "rolloutPercentage": 50.0}],
                        "defaultRolloutPercentage": 10.0
                    }
                }
            }],
            "variants": [
                {
                    "name": "wide",
                    "audience": {"defaultRolloutPercentage": 50.0},
                    "configuration": {"layout": "wide"}
                },
                {
                    "name": "classic",
                    "isDefault": true,
                    "audience": {"defaultRolloutPercentage": 100.0},
                    "configuration": {"layout": "classic"}
                }
            ]
        }))
        .unwrap(),
    );

    let manager = ManagerConfig::new(provider)
        .filter(FilterRegistration::contextual::<TargetingContext, _>(
            "Targeting",
            Arc::new(TargetingFilter::new()),
        ))
        .to_manager();

    for user in ["alice", "bob", "carol", "dave"] {
        let context = TargetingContext::new(user).group("beta");

        let enabled = manager
            .is_enabled_for("new-checkout", &context)
            .await
            .unwrap_or(false);

        let layout: serde_json::Value = manager
            .get_variant("new-checkout", &context)
            .await
            .unwrap_or_default();

        println!("{user}: enabled={enabled} layout={layout}");
    }
}
