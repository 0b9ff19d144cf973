//! Capability injection into freshly built plugins.
use std::{any::Any, fmt, sync::Arc};

use apimachinery_runtime::Scheme;
use tokio_util::sync::CancellationToken;

use crate::{
    certificates::CAContentProvider,
    interfaces::Interface,
    webhook::{AuthenticationInfoResolver, ServiceResolver},
};

/// Something a plugin may ask to be handed at startup
#[derive(Clone)]
pub enum Capability {
    /// The scheme objects are decoded with
    Scheme(Arc<Scheme>),
    /// Resolves in-cluster services to URLs
    ServiceResolver(Arc<dyn ServiceResolver>),
    /// Supplies client credentials for outgoing calls
    AuthenticationInfoResolver(Arc<dyn AuthenticationInfoResolver>),
    /// CA bundle used to verify outgoing calls
    CaContent(Arc<dyn CAContentProvider>),
    /// Fires when the server starts shutting down
    Drained(CancellationToken),
    /// An opaque collaborator such as an API client or informer factory,
    /// recognized by name
    External {
        /// What the collaborator is
        name: &'static str,
        /// The collaborator itself; plugins downcast it
        value: Arc<dyn Any + Send + Sync>,
    },
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Scheme(scheme) => f.debug_tuple("Scheme").field(&scheme.name()).finish(),
            Capability::ServiceResolver(_) => f.write_str("ServiceResolver"),
            Capability::AuthenticationInfoResolver(_) => f.write_str("AuthenticationInfoResolver"),
            Capability::CaContent(content) => f.debug_tuple("CaContent").field(&content.name()).finish(),
            Capability::Drained(_) => f.write_str("Drained"),
            Capability::External { name, .. } => f.debug_struct("External").field("name", name).finish(),
        }
    }
}

/// Prepares a plugin before its first request
pub trait PluginInitializer: Send + Sync {
    /// Inject whatever this initializer owns into `plugin`
    fn initialize(&self, plugin: &mut dyn Interface);
}

/// Offers each capability to every plugin
#[derive(Clone, Debug, Default)]
pub struct CapabilityInitializer {
    capabilities: Vec<Capability>,
}

impl CapabilityInitializer {
    /// An initializer offering `capabilities` in order
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self { capabilities }
    }

    /// Offer one more capability
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }
}

impl PluginInitializer for CapabilityInitializer {
    fn initialize(&self, plugin: &mut dyn Interface) {
        for capability in &self.capabilities {
            plugin.inject(capability);
        }
    }
}

/// Runs several initializers in order
#[derive(Clone, Default)]
pub struct PluginInitializers(pub Vec<Arc<dyn PluginInitializer>>);

impl PluginInitializer for PluginInitializers {
    fn initialize(&self, plugin: &mut dyn Interface) {
        for initializer in &self.0 {
            initializer.initialize(plugin);
        }
    }
}

impl fmt::Debug for PluginInitializers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginInitializers").field(&self.0.len()).finish()
    }
}
