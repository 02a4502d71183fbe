use std::sync::Arc;

use crate::provider::BoxError;

/// Result type used throughout the crate, with the error variant fixed to
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur during feature evaluation.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A configured feature filter (or variant assigner) name has no
    /// registered implementation.
    ///
    /// Only raised when the manager runs with
    /// [`MissingFilterPolicy::Fail`](crate::MissingFilterPolicy::Fail), the
    /// default.
    #[error("feature filter '{name}' is not registered")]
    MissingFilter {
        /// The configured filter name that failed to resolve.
        name: String,
    },

    /// More than one registered implementation matches a configured filter
    /// (or assigner) name. Always fatal: silently picking one could invert
    /// the intended rollout behavior.
    #[error("multiple feature filters match the configured name '{name}'")]
    AmbiguousFilter {
        /// The configured name that resolved ambiguously.
        name: String,
    },

    /// An audience declares a rollout percentage outside of `[0, 100]`.
    #[error("audience percentage {value} for '{scope}' is outside of [0, 100]")]
    InvalidAudience {
        /// Which percentage field is out of range.
        scope: String,
        /// The offending value.
        value: f64,
    },

    /// A definition or variant provider failed. Provider errors are
    /// propagated verbatim, never swallowed.
    // Provider errors are not clonable, so we're wrapping them in an Arc.
    #[error("provider error: {0}")]
    Provider(Arc<dyn std::error::Error + Send + Sync>),

    /// A materialized variant configuration failed to deserialize into the
    /// requested type.
    #[error("failed to decode variant configuration")]
    VariantDecode(#[source] Arc<serde_json::Error>),
}

impl From<BoxError> for Error {
    fn from(value: BoxError) -> Self {
        Self::Provider(Arc::from(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::VariantDecode(Arc::new(value))
    }
}
