//! Variant assigners: plugins that pick which variant of an enabled feature
//! a caller should be served.
use std::{
    any::{Any, TypeId},
    marker::PhantomData,
    sync::Arc,
};

use async_trait::async_trait;

use crate::{
    definition::{FeatureDefinition, FeatureVariant},
    registry::{AppContext, ContextBinding, Registration, Registry},
    Result,
};

/// Everything an assigner gets to see when picking a variant.
pub struct AssignmentContext {
    /// The definition of the feature in need of an assigned variant.
    pub definition: FeatureDefinition,
}

/// Picks one of a feature's variants, or none.
///
/// Like filters, assigners are registered once at engine construction, must
/// be stateless with respect to evaluation, and are resolved by alias (a
/// feature definition names its assigner in
/// [`FeatureDefinition::assigner`]).
#[async_trait]
pub trait VariantAssigner: Send + Sync {
    /// Assign a variant without an application-supplied context.
    async fn assign(&self, context: &AssignmentContext) -> Result<Option<FeatureVariant>>;
}

/// A variant assigner that can additionally react to an
/// application-supplied context object of type `C`.
#[async_trait]
pub trait ContextualVariantAssigner<C>: VariantAssigner
where
    C: Any + Send + Sync,
{
    /// Assign a variant using the application-supplied context.
    async fn assign_for(
        &self,
        context: &AssignmentContext,
        app_context: &C,
    ) -> Result<Option<FeatureVariant>>;
}

/// Object-safe view of a [`ContextualVariantAssigner`] bound to one concrete
/// context type. Public only as a building block of
/// [`AssignerRegistration`].
#[async_trait]
pub trait ErasedContextualAssigner: Send + Sync {
    /// Assign against a type-erased app context.
    async fn assign_erased(
        &self,
        context: &AssignmentContext,
        app_context: &AppContext,
    ) -> Result<Option<FeatureVariant>>;
}

struct ContextualAssignerAdapter<C, A: ?Sized> {
    assigner: Arc<A>,
    _context: PhantomData<fn(C)>,
}

#[async_trait]
impl<C, A> ErasedContextualAssigner for ContextualAssignerAdapter<C, A>
where
    C: Any + Send + Sync,
    A: ContextualVariantAssigner<C> + ?Sized,
{
    async fn assign_erased(
        &self,
        context: &AssignmentContext,
        app_context: &AppContext,
    ) -> Result<Option<FeatureVariant>> {
        match app_context.downcast_ref::<C>() {
            Some(app_context) => self.assigner.assign_for(context, app_context).await,
            // Unreachable in practice: the dispatcher matched the context
            // type before invoking the binding.
            None => Ok(None),
        }
    }
}

/// A variant assigner registered under an explicit alias.
pub type AssignerRegistration = Registration<dyn VariantAssigner, dyn ErasedContextualAssigner>;

pub(crate) type AssignerRegistry = Registry<dyn VariantAssigner, dyn ErasedContextualAssigner>;

impl Registration<dyn VariantAssigner, dyn ErasedContextualAssigner> {
    /// Register `assigner` under `alias`.
    pub fn new(alias: impl Into<String>, assigner: impl VariantAssigner + 'static) -> Self {
        Registration {
            alias: alias.into(),
            implementation: Arc::new(assigner),
            bindings: Vec::new(),
        }
    }

    /// Register an already-shared assigner under `alias`.
    pub fn from_arc(alias: impl Into<String>, assigner: Arc<dyn VariantAssigner>) -> Self {
        Registration {
            alias: alias.into(),
            implementation: assigner,
            bindings: Vec::new(),
        }
    }

    /// Register a contextual assigner and declare support for app contexts
    /// of type `C` in one step.
    pub fn contextual<C, A>(alias: impl Into<String>, assigner: Arc<A>) -> Self
    where
        C: Any + Send + Sync,
        A: ContextualVariantAssigner<C> + 'static,
    {
        Self::from_arc(alias, assigner.clone()).with_context::<C, A>(assigner)
    }

    /// Declare that the registered assigner reacts to app contexts of type
    /// `C`. First declaration wins when several types are compatible.
    pub fn with_context<C, A>(mut self, assigner: Arc<A>) -> Self
    where
        C: Any + Send + Sync,
        A: ContextualVariantAssigner<C> + 'static + ?Sized,
    {
        self.bindings.push(ContextBinding {
            context_type: TypeId::of::<C>(),
            evaluator: Arc::new(ContextualAssignerAdapter::<C, A> {
                assigner,
                _context: PhantomData,
            }),
        });
        self
    }
}
