//! Feature filters: boolean predicate plugins that decide enablement.
use std::{
    any::{Any, TypeId},
    marker::PhantomData,
    sync::Arc,
};

use async_trait::async_trait;

use crate::{
    definition::Parameters,
    registry::{AppContext, ContextBinding, Registration, Registry},
    Result,
};

/// Everything a filter gets to see for one evaluation.
pub struct FilterContext {
    /// The feature under evaluation.
    pub feature_name: String,
    /// The parameters configured for this filter on this feature.
    pub parameters: Parameters,
}

/// A boolean predicate plugin evaluated to decide whether a feature is
/// enabled.
///
/// Implementations must be stateless with respect to evaluation: they are
/// registered once at engine construction and invoked concurrently.
#[async_trait]
pub trait FeatureFilter: Send + Sync {
    /// Evaluate the filter against its configured parameters.
    async fn evaluate(&self, context: &FilterContext) -> Result<bool>;
}

/// A feature filter that can additionally react to an application-supplied
/// context object of type `C`.
///
/// Support for `C` is declared at registration time via
/// [`FilterRegistration::with_context`]; the engine dispatches to
/// [`evaluate_for`](Self::evaluate_for) whenever the caller supplies an app
/// context of exactly that type.
#[async_trait]
pub trait ContextualFeatureFilter<C>: FeatureFilter
where
    C: Any + Send + Sync,
{
    /// Evaluate the filter with the application-supplied context.
    async fn evaluate_for(&self, context: &FilterContext, app_context: &C) -> Result<bool>;
}

/// Object-safe view of a [`ContextualFeatureFilter`] bound to one concrete
/// context type. Public only as a building block of [`FilterRegistration`].
#[async_trait]
pub trait ErasedContextualFilter: Send + Sync {
    /// Evaluate against a type-erased app context.
    async fn evaluate_erased(&self, context: &FilterContext, app_context: &AppContext)
        -> Result<bool>;
}

struct ContextualFilterAdapter<C, F: ?Sized> {
    filter: Arc<F>,
    _context: PhantomData<fn(C)>,
}

#[async_trait]
impl<C, F> ErasedContextualFilter for ContextualFilterAdapter<C, F>
where
    C: Any + Send + Sync,
    F: ContextualFeatureFilter<C> + ?Sized,
{
    async fn evaluate_erased(
        &self,
        context: &FilterContext,
        app_context: &AppContext,
    ) -> Result<bool> {
        match app_context.downcast_ref::<C>() {
            Some(app_context) => self.filter.evaluate_for(context, app_context).await,
            // The dispatcher only invokes bindings whose context type
            // matched, so this is unreachable in practice.
            None => Ok(false),
        }
    }
}

/// A feature filter registered under an explicit alias.
pub type FilterRegistration = Registration<dyn FeatureFilter, dyn ErasedContextualFilter>;

pub(crate) type FilterRegistry = Registry<dyn FeatureFilter, dyn ErasedContextualFilter>;

impl Registration<dyn FeatureFilter, dyn ErasedContextualFilter> {
    /// Register `filter` under `alias`.
    ///
    /// The alias may be namespaced with `'.'` separators; see
    /// [`ManagerConfig::filter`](crate::ManagerConfig::filter) for the
    /// matching rules.
    pub fn new(alias: impl Into<String>, filter: impl FeatureFilter + 'static) -> Self {
        Registration {
            alias: alias.into(),
            implementation: Arc::new(filter),
            bindings: Vec::new(),
        }
    }

    /// Register an already-shared filter under `alias`.
    pub fn from_arc(alias: impl Into<String>, filter: Arc<dyn FeatureFilter>) -> Self {
        Registration {
            alias: alias.into(),
            implementation: filter,
            bindings: Vec::new(),
        }
    }

    /// Register a contextual filter and declare support for app contexts of
    /// type `C` in one step.
    pub fn contextual<C, F>(alias: impl Into<String>, filter: Arc<F>) -> Self
    where
        C: Any + Send + Sync,
        F: ContextualFeatureFilter<C> + 'static,
    {
        Self::from_arc(alias, filter.clone()).with_context::<C, F>(filter)
    }

    /// Declare that the registered filter reacts to app contexts of type
    /// `C`.
    ///
    /// Declarations are consulted in order; when a filter declares several
    /// types and a context is compatible with more than one, the first
    /// declaration wins.
    pub fn with_context<C, F>(mut self, filter: Arc<F>) -> Self
    where
        C: Any + Send + Sync,
        F: ContextualFeatureFilter<C> + 'static + ?Sized,
    {
        self.bindings.push(ContextBinding {
            context_type: TypeId::of::<C>(),
            evaluator: Arc::new(ContextualFilterAdapter::<C, F> {
                filter,
                _context: PhantomData,
            }),
        });
        self
    }
}
