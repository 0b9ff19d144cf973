//! Ordered plugin chains and the reinvocation wrapper.
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

use apimachinery_core::util;
use async_trait::async_trait;
use futures::FutureExt;

use crate::{
    attributes::{Attributes, Operation},
    error::{AdmissionError, Result},
    interfaces::{Interface, MutationInterface, ObjectInterfaces, ValidationInterface},
};

/// Wait for `plugin` to become ready, failing with [`AdmissionError::NotReady`]
/// once its readiness timeout elapses.
async fn await_ready(plugin: &dyn Interface) -> Result<()> {
    match plugin.readiness() {
        Some(handler) => handler.ensure_ready().await,
        None => Ok(()),
    }
}

/// Run one plugin call, turning a panic into [`AdmissionError::Panic`].
pub(crate) async fn dispatch(call: impl Future<Output = Result<()>>) -> Result<()> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(AdmissionError::Panic(util::report_panic("admission", payload))),
    }
}

/// Plugins run one after another in registration order
///
/// [`admit`](MutationInterface::admit) runs every mutating plugin that
/// handles the operation, [`validate`](ValidationInterface::validate) every
/// validating one. Callers run the mutating phase before the validating
/// phase. A plugin with a [`readiness`](Interface::readiness) probe is
/// waited on before each call. The first error stops the chain.
#[derive(Clone, Default)]
pub struct Chain {
    plugins: Vec<Arc<dyn Interface>>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("plugins", &self.plugins.len()).finish()
    }
}

impl Chain {
    /// A chain over `plugins`, in order
    pub fn new(plugins: Vec<Arc<dyn Interface>>) -> Self {
        Self { plugins }
    }

    /// The plugins, in dispatch order
    pub fn plugins(&self) -> &[Arc<dyn Interface>] {
        &self.plugins
    }

    /// Number of plugins in the chain
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the chain admits everything untouched
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Interface for Chain {
    fn handles(&self, operation: Operation) -> bool {
        self.plugins.iter().any(|p| p.handles(operation))
    }

    fn as_mutating(&self) -> Option<&dyn MutationInterface> {
        Some(self)
    }

    fn as_validating(&self) -> Option<&dyn ValidationInterface> {
        Some(self)
    }
}

#[async_trait]
impl MutationInterface for Chain {
    async fn admit(&self, attributes: &mut Attributes, objects: &ObjectInterfaces) -> Result<()> {
        for plugin in &self.plugins {
            if !plugin.handles(attributes.operation) {
                continue;
            }
            if let Some(mutator) = plugin.as_mutating() {
                await_ready(plugin.as_ref()).await?;
                dispatch(mutator.admit(attributes, objects)).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ValidationInterface for Chain {
    async fn validate(&self, attributes: &Attributes, objects: &ObjectInterfaces) -> Result<()> {
        for plugin in &self.plugins {
            if !plugin.handles(attributes.operation) {
                continue;
            }
            if let Some(validator) = plugin.as_validating() {
                await_ready(plugin.as_ref()).await?;
                dispatch(validator.validate(attributes, objects)).await?;
            }
        }
        Ok(())
    }
}

/// Runs the mutating chain, then runs `reinvocations` once more when a plugin
/// asked for another pass. Validation only ever consults `admissions`.
#[derive(Clone)]
pub struct Reinvoker {
    admissions: Arc<dyn Interface>,
    reinvocations: Arc<dyn Interface>,
}

impl std::fmt::Debug for Reinvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reinvoker").finish_non_exhaustive()
    }
}

impl Reinvoker {
    /// Wrap `admissions`, running `reinvocations` on a requested second pass
    pub fn new(admissions: Arc<dyn Interface>, reinvocations: Arc<dyn Interface>) -> Self {
        Self {
            admissions,
            reinvocations,
        }
    }
}

impl Interface for Reinvoker {
    fn handles(&self, operation: Operation) -> bool {
        self.admissions.handles(operation)
    }

    fn as_mutating(&self) -> Option<&dyn MutationInterface> {
        Some(self)
    }

    fn as_validating(&self) -> Option<&dyn ValidationInterface> {
        Some(self)
    }
}

#[async_trait]
impl MutationInterface for Reinvoker {
    async fn admit(&self, attributes: &mut Attributes, objects: &ObjectInterfaces) -> Result<()> {
        let Some(mutator) = self.admissions.as_mutating() else {
            return Ok(());
        };
        mutator.admit(attributes, objects).await?;
        if !attributes.reinvocation_context().should_reinvoke() {
            return Ok(());
        }
        attributes.reinvocation_context_mut().set_is_reinvoke();
        tracing::debug!(operation = %attributes.operation, name = %attributes.name, "reinvoking admission plugins");
        match self.reinvocations.as_mutating() {
            Some(mutator) => mutator.admit(attributes, objects).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ValidationInterface for Reinvoker {
    async fn validate(&self, attributes: &Attributes, objects: &ObjectInterfaces) -> Result<()> {
        match self.admissions.as_validating() {
            Some(validator) => validator.validate(attributes, objects).await,
            None => Ok(()),
        }
    }
}
