//! The feature definition model.
//!
//! Definitions are supplied fresh by a [`DefinitionProvider`] on every
//! evaluation and are never cached by the engine, so providers may hot-reload
//! them at any time.
//!
//! [`DefinitionProvider`]: crate::DefinitionProvider
use derive_more::From;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::targeting::Audience;

/// The definition of a feature: which filters can enable it and which
/// variants it can serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDefinition {
    /// The name of the feature.
    pub name: String,
    /// The feature filters that the feature can be enabled for, evaluated in
    /// order with OR semantics.
    #[serde(default)]
    pub enabled_for: Vec<FilterConfig>,
    /// The variant assigner used when a variant is requested. When absent,
    /// the built-in targeting selection is used.
    #[serde(default)]
    pub assigner: Option<String>,
    /// The feature variants listed for this feature, in declaration order.
    #[serde(default)]
    pub variants: Vec<FeatureVariant>,
}

/// A reference to a feature filter along with its configured parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// The configured filter name. May be namespaced (`"MyOrg.MyFilter"`).
    pub name: String,
    /// Parameters for the filter. Opaque to the engine; the owning filter
    /// resolves them lazily.
    #[serde(default)]
    pub parameters: Parameters,
}

/// One variant of a feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVariant {
    /// The name of the variant.
    pub name: String,
    /// Whether this variant is the fallback when no variant's audience
    /// matches. Only the first variant flagged default is used.
    #[serde(default)]
    pub is_default: bool,
    /// The audience this variant targets.
    #[serde(default)]
    pub audience: Audience,
    /// The configuration payload served when this variant is assigned. The
    /// engine never interprets it; a [`VariantProvider`] materializes it.
    ///
    /// [`VariantProvider`]: crate::VariantProvider
    #[serde(default)]
    pub configuration: serde_json::Value,
}

/// An opaque bag of filter parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct Parameters(serde_json::Value);

impl Parameters {
    /// Deserialize the parameters into a filter-defined settings type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.0.clone())
    }

    /// The raw parameter value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}
