//! An embeddable feature-flag and variant-assignment engine.
//!
//! # Overview
//!
//! The crate revolves around a [`FeatureManager`] that decides whether a
//! named feature is enabled for a caller and which configuration variant of
//! that feature should be served. Decisions are driven by declarative
//! targeting rules (explicit user lists, percentage rollouts, group
//! rollouts) and by pluggable boolean predicate plugins called feature
//! filters, so applications can roll features out progressively, run A/B
//! assignments, and gate environments without redeploying code.
//!
//! Feature definitions are supplied by a [`DefinitionProvider`] and fetched
//! fresh on every evaluation, so providers may hot-reload them at any time.
//! The engine is a library boundary only: it speaks no wire protocol and
//! persists nothing.
//!
//! # Examples
//!
//! ```
//! use flagwise::{
//!     FeatureDefinition, InMemoryDefinitionProvider, ManagerConfig, TargetingContext,
//! };
//!
//! let provider = InMemoryDefinitionProvider::new();
//! provider.set_definition(
//!     serde_json::from_value(serde_json::json!({
//!         "name": "new-checkout",
//!         "enabledFor": [{"name": "AlwaysOn"}],
//!         "variants": [
//!             {
//!                 "name": "wide",
//!                 "isDefault": true,
//!                 "audience": {"defaultRolloutPercentage": 100.0},
//!                 "configuration": {"layout": "wide"}
//!             }
//!         ]
//!     }))
//!     .unwrap(),
//! );
//!
//! let manager = ManagerConfig::new(provider).to_manager();
//!
//! # futures::executor::block_on(async {
//! assert!(manager.is_enabled("new-checkout").await.unwrap());
//!
//! let layout: serde_json::Value = manager
//!     .get_variant("new-checkout", &TargetingContext::new("alice"))
//!     .await
//!     .unwrap();
//! assert_eq!(layout["layout"], "wide");
//! # });
//! ```
//!
//! # Consistency within a unit of work
//!
//! Wrap the manager in a [`FeatureManagerSnapshot`] to guarantee that every
//! check of a feature within one scope (such as one request) observes the
//! same result, even when definitions reload or filters are
//! non-deterministic.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. An unknown feature is never
//! an error: it evaluates as disabled and serves the zero value of the
//! requested variant type, consistent with "unknown feature behaves as off".
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate for
//! logging messages under the `flagwise` target. Consider integrating a
//! `log`-compatible logger implementation for better visibility into
//! evaluation decisions.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod assigners;
mod bucketing;
mod builtin;
mod definition;
mod error;
mod filters;
mod manager;
mod provider;
mod registry;
mod session;
mod snapshot;
mod targeting;
mod variants;

pub use assigners::{
    AssignerRegistration, AssignmentContext, ContextualVariantAssigner, VariantAssigner,
};
pub use bucketing::{Bucketer, Md5Bucketer};
pub use builtin::{
    PercentageAssigner, PercentageFilter, TargetingAssigner, TargetingFilter, TimeWindowFilter,
};
pub use definition::{FeatureDefinition, FeatureVariant, FilterConfig, Parameters};
pub use error::{Error, Result};
pub use filters::{ContextualFeatureFilter, FeatureFilter, FilterContext, FilterRegistration};
pub use manager::{FeatureManager, ManagerConfig, MissingFilterPolicy};
pub use provider::{
    BoxError, DefinitionProvider, EmbeddedVariantProvider, InMemoryDefinitionProvider,
    VariantProvider,
};
pub use registry::{AppContext, ContextBinding, Registration};
pub use session::{InMemorySessionCache, SessionCache};
pub use snapshot::FeatureManagerSnapshot;
pub use targeting::{is_targeted, Audience, GroupRollout, TargetingContext};
pub use variants::select_variant;
