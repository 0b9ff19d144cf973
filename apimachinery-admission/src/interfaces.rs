//! Traits implemented by admission plugins.
use std::sync::Arc;

use apimachinery_runtime::{
    unstructured::DefaultUnstructuredConverter, ObjectConvertor, ObjectCreater, ObjectDefaulter, ObjectTyper,
    Scheme, UnstructuredConverter,
};
use async_trait::async_trait;

use crate::{
    attributes::{Attributes, Operation},
    error::Result,
    initializer::Capability,
    readiness::Handler,
};

/// The base of every admission plugin
///
/// A plugin opts into mutation or validation by implementing
/// [`MutationInterface`] or [`ValidationInterface`] and returning itself from
/// [`as_mutating`](Interface::as_mutating) or
/// [`as_validating`](Interface::as_validating).
pub trait Interface: Send + Sync {
    /// Whether this plugin takes part in `operation`
    fn handles(&self, operation: Operation) -> bool;

    /// The mutating side of this plugin
    fn as_mutating(&self) -> Option<&dyn MutationInterface> {
        None
    }

    /// The validating side of this plugin
    fn as_validating(&self) -> Option<&dyn ValidationInterface> {
        None
    }

    /// The readiness probe a chain waits on before dispatching to this plugin
    fn readiness(&self) -> Option<&Handler> {
        None
    }

    /// Accept a capability offered by an initializer
    ///
    /// Plugins ignore capabilities they have no use for.
    fn inject(&mut self, _capability: &Capability) {}

    /// Check that every capability the plugin needs was injected
    fn validate_initialization(&self) -> Result<()> {
        Ok(())
    }
}

/// A plugin that may rewrite the object under admission
#[async_trait]
pub trait MutationInterface: Interface {
    /// Inspect and possibly modify the request, or reject it
    async fn admit(&self, attributes: &mut Attributes, objects: &ObjectInterfaces) -> Result<()>;
}

/// A plugin that may only accept or reject
#[async_trait]
pub trait ValidationInterface: Interface {
    /// Accept the request or reject it
    async fn validate(&self, attributes: &Attributes, objects: &ObjectInterfaces) -> Result<()>;
}

/// Scheme services a plugin may use to inspect or rebuild objects
#[derive(Clone)]
pub struct ObjectInterfaces {
    scheme: Arc<Scheme>,
}

impl std::fmt::Debug for ObjectInterfaces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectInterfaces")
            .field("scheme", &self.scheme.name())
            .finish()
    }
}

impl ObjectInterfaces {
    /// Services backed by `scheme`
    pub fn from_scheme(scheme: Arc<Scheme>) -> Self {
        Self { scheme }
    }

    /// Finds the kinds of an object
    pub fn typer(&self) -> &dyn ObjectTyper {
        self.scheme.as_ref()
    }

    /// Builds empty objects by kind
    pub fn creater(&self) -> &dyn ObjectCreater {
        self.scheme.as_ref()
    }

    /// Converts objects between versions
    pub fn convertor(&self) -> &dyn ObjectConvertor {
        self.scheme.as_ref()
    }

    /// Fills in defaulted fields
    pub fn defaulter(&self) -> &dyn ObjectDefaulter {
        self.scheme.as_ref()
    }

    /// Moves objects to and from the unstructured tree
    pub fn unstructured_converter(&self) -> &dyn UnstructuredConverter {
        &DefaultUnstructuredConverter
    }

    /// The backing scheme
    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }
}
