//! Variant selection.
//!
//! Variants share one rollout space per feature: each variant's audience is
//! rewritten into an *effective* audience whose thresholds accumulate across
//! the declaration order, so a context deterministically lands in exactly one
//! slice instead of every variant independently re-rolling the same
//! identifier.
use std::collections::HashMap;

use crate::{
    bucketing::Bucketer,
    definition::{FeatureDefinition, FeatureVariant},
    targeting::{is_targeted_unchecked, validate_audience, Audience, GroupRollout, TargetingContext},
    Result,
};

/// Walk the definition's variants in declaration order and return the first
/// one whose effective audience matches, or the first variant flagged
/// default, or `None`.
///
/// Group percentages accumulate per group name, clamped at 100. The default
/// rollout percentage accumulates unclamped; once the running total passes
/// 100, every later variant's default slice is unreachable, which makes
/// over-allocation an explicit configuration choice rather than an error.
pub fn select_variant<'a>(
    definition: &'a FeatureDefinition,
    context: &TargetingContext,
    bucketer: &dyn Bucketer,
) -> Result<Option<&'a FeatureVariant>> {
    let mut default_variant = None;
    let mut cumulative_default = 0.0;
    let mut cumulative_groups: HashMap<&str, f64> = HashMap::new();

    for variant in &definition.variants {
        validate_audience(&variant.audience)?;

        if default_variant.is_none() && variant.is_default {
            default_variant = Some(variant);
        }

        let audience = accumulate_audience(
            &variant.audience,
            &mut cumulative_default,
            &mut cumulative_groups,
        );

        if is_targeted_unchecked(&audience, context, true, &definition.name, bucketer) {
            return Ok(Some(variant));
        }
    }

    Ok(default_variant)
}

/// Rewrite a declared audience into its effective form, advancing the running
/// totals.
fn accumulate_audience<'a>(
    audience: &'a Audience,
    cumulative_default: &mut f64,
    cumulative_groups: &mut HashMap<&'a str, f64>,
) -> Audience {
    let mut groups = Vec::with_capacity(audience.groups.len());

    for rollout in &audience.groups {
        let prior = cumulative_groups
            .get(rollout.name.as_str())
            .copied()
            .unwrap_or(0.0);
        let percentage = (rollout.rollout_percentage + prior).min(100.0);

        cumulative_groups.insert(&rollout.name, percentage);

        groups.push(GroupRollout {
            name: rollout.name.clone(),
            rollout_percentage: percentage,
        });
    }

    *cumulative_default += audience.default_rollout_percentage;

    Audience {
        users: audience.users.clone(),
        groups,
        default_rollout_percentage: *cumulative_default,
    }
}
