//! Audience-membership evaluation.
use serde::{Deserialize, Serialize};

use crate::{bucketing::Bucketer, Error, Result};

/// A targeting rule set: explicit users, group rollouts, and a default
/// rollout percentage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audience {
    /// User identifiers targeted directly.
    #[serde(default)]
    pub users: Vec<String>,
    /// Group rollouts, in declaration order.
    #[serde(default)]
    pub groups: Vec<GroupRollout>,
    /// Percentage of the remaining user base that is targeted.
    #[serde(default)]
    pub default_rollout_percentage: f64,
}

/// A percentage rollout scoped to one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRollout {
    /// The name of the group.
    pub name: String,
    /// Percentage of the group's members that is targeted.
    pub rollout_percentage: f64,
}

/// Who the caller is: the identity evaluated against an [`Audience`].
#[derive(Debug, Clone, Default)]
pub struct TargetingContext {
    /// The caller's user identifier, if known.
    pub user_id: Option<String>,
    /// The groups the caller belongs to, in caller-supplied order.
    pub groups: Vec<String>,
}

impl TargetingContext {
    /// Create a context for the given user.
    pub fn new(user_id: impl Into<String>) -> Self {
        TargetingContext {
            user_id: Some(user_id.into()),
            groups: Vec::new(),
        }
    }

    /// Add a group membership.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }
}

/// Determine if a targeting context is a member of the given audience.
///
/// Checks are performed in order, returning `true` at the first match:
/// direct user match, group rollout match, default rollout match. The result
/// is pure: for fixed inputs it never varies across calls or restarts.
///
/// Returns [`Error::InvalidAudience`] if any declared percentage falls
/// outside of `[0, 100]`.
pub fn is_targeted(
    audience: &Audience,
    context: &TargetingContext,
    ignore_case: bool,
    hint: &str,
    bucketer: &dyn Bucketer,
) -> Result<bool> {
    validate_audience(audience)?;
    Ok(is_targeted_unchecked(
        audience,
        context,
        ignore_case,
        hint,
        bucketer,
    ))
}

/// The unvalidated membership test.
///
/// The variant selector synthesizes effective audiences whose cumulative
/// default percentage may legitimately exceed 100, so it validates declared
/// audiences itself and skips the range check here.
pub(crate) fn is_targeted_unchecked(
    audience: &Audience,
    context: &TargetingContext,
    ignore_case: bool,
    hint: &str,
    bucketer: &dyn Bucketer,
) -> bool {
    let user_id = context.user_id.as_deref().unwrap_or("");

    // Check if the user is being targeted directly.
    if !user_id.is_empty()
        && audience
            .users
            .iter()
            .any(|user| str_eq(user, user_id, ignore_case))
    {
        return true;
    }

    // Check if the user is in a group that is being targeted. Only the first
    // audience entry matching a context group is tested; a failed percentage
    // test does not fall through to later entries of the same name.
    for group in &context.groups {
        let rollout = audience
            .groups
            .iter()
            .find(|rollout| str_eq(&rollout.name, group, ignore_case));

        if let Some(rollout) = rollout {
            let context_id = format!("{user_id}\n{hint}\n{group}");
            if bucketer.bucket(&context_id) < rollout.rollout_percentage {
                return true;
            }
        }
    }

    // Check if the user is targeted by the default rollout percentage.
    let context_id = format!("{user_id}\n{hint}");
    bucketer.bucket(&context_id) < audience.default_rollout_percentage
}

pub(crate) fn validate_audience(audience: &Audience) -> Result<()> {
    if !(0.0..=100.0).contains(&audience.default_rollout_percentage) {
        return Err(Error::InvalidAudience {
            scope: "defaultRolloutPercentage".to_owned(),
            value: audience.default_rollout_percentage,
        });
    }

    for rollout in &audience.groups {
        if !(0.0..=100.0).contains(&rollout.rollout_percentage) {
            return Err(Error::InvalidAudience {
                scope: format!("groups[{}].rolloutPercentage", rollout.name),
                value: rollout.rollout_percentage,
            });
        }
    }

    Ok(())
}

fn str_eq(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}
