//! Named plugin registry and decorators.
use std::{collections::BTreeMap, fmt, sync::Arc, time::Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::Instrument;

use crate::{
    attributes::{Attributes, Operation},
    chain::{Chain, Reinvoker},
    config::ConfigProvider,
    error::{AdmissionError, Result},
    initializer::{Capability, PluginInitializer},
    interfaces::{Interface, MutationInterface, ObjectInterfaces, ValidationInterface},
    readiness::Handler,
};

/// Builds a plugin from its optional configuration bytes
pub type Factory = Arc<dyn Fn(Option<&[u8]>) -> Result<Box<dyn Interface>> + Send + Sync>;

/// The set of plugins a server knows how to build, by name
#[derive(Clone, Default)]
pub struct Plugins {
    registry: Arc<RwLock<BTreeMap<String, Factory>>>,
}

impl fmt::Debug for Plugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugins").field("registered", &self.registered()).finish()
    }
}

impl Plugins {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin factory under `name`
    ///
    /// # Panics
    ///
    /// Registering the same name twice is a programming error and panics.
    pub fn register(
        &self,
        name: &str,
        factory: impl Fn(Option<&[u8]>) -> Result<Box<dyn Interface>> + Send + Sync + 'static,
    ) {
        let mut registry = self.registry.write();
        assert!(
            !registry.contains_key(name),
            "admission plugin {name:?} was registered twice"
        );
        tracing::debug!(plugin = name, "registered admission plugin");
        registry.insert(name.to_string(), Arc::new(factory));
    }

    /// Names of every registered plugin, sorted
    pub fn registered(&self) -> Vec<String> {
        self.registry.read().keys().cloned().collect()
    }

    /// Whether a plugin is registered under `name`
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.read().contains_key(name)
    }

    /// Build, initialize and validate one plugin
    pub fn init_plugin(
        &self,
        name: &str,
        config: Option<&[u8]>,
        initializer: &dyn PluginInitializer,
    ) -> Result<Box<dyn Interface>> {
        let factory = self
            .registry
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AdmissionError::UnknownPlugin(name.to_string()))?;
        let initialization_failed = |err: AdmissionError| AdmissionError::Initialization {
            name: name.to_string(),
            reason: err.to_string(),
        };
        let mut plugin = factory(config).map_err(initialization_failed)?;
        initializer.initialize(plugin.as_mut());
        plugin.validate_initialization().map_err(initialization_failed)?;
        Ok(plugin)
    }

    /// Build the named plugins into one chain, in the given order
    ///
    /// Each plugin receives its configuration from `configs`, is initialized,
    /// validated and then decorated. The chain is wrapped in a [`Reinvoker`]
    /// so that plugins can request a second mutating pass.
    pub fn new_from_plugins(
        &self,
        names: &[String],
        configs: &dyn ConfigProvider,
        initializer: &dyn PluginInitializer,
        decorator: Option<&dyn Decorator>,
    ) -> Result<Reinvoker> {
        let mut plugins: Vec<Arc<dyn Interface>> = Vec::with_capacity(names.len());
        for name in names {
            let config = configs.config_for(name)?;
            let plugin = self.init_plugin(name, config.as_deref(), initializer)?;
            let plugin = match decorator {
                Some(decorator) => decorator.decorate(plugin, name),
                None => plugin,
            };
            tracing::info!(plugin = %name, "loaded admission plugin");
            plugins.push(Arc::from(plugin));
        }
        let chain: Arc<dyn Interface> = Arc::new(Chain::new(plugins));
        Ok(Reinvoker::new(chain.clone(), chain))
    }
}

/// Wraps each plugin as it is added to a chain
pub trait Decorator: Send + Sync {
    /// Wrap `plugin`, registered as `name`
    fn decorate(&self, plugin: Box<dyn Interface>, name: &str) -> Box<dyn Interface>;
}

/// Applies several decorators, innermost first
#[derive(Clone, Default)]
pub struct Decorators(pub Vec<Arc<dyn Decorator>>);

impl Decorator for Decorators {
    fn decorate(&self, plugin: Box<dyn Interface>, name: &str) -> Box<dyn Interface> {
        self.0.iter().fold(plugin, |plugin, d| d.decorate(plugin, name))
    }
}

/// Runs every plugin call inside a tracing span and logs its outcome and duration
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDecorator;

impl Decorator for TracingDecorator {
    fn decorate(&self, plugin: Box<dyn Interface>, name: &str) -> Box<dyn Interface> {
        Box::new(Traced {
            name: name.to_string(),
            inner: plugin,
        })
    }
}

struct Traced {
    name: String,
    inner: Box<dyn Interface>,
}

impl Traced {
    fn span(&self, phase: &'static str, attributes: &Attributes) -> tracing::Span {
        tracing::debug_span!(
            "admission",
            plugin = %self.name,
            phase,
            operation = %attributes.operation,
            kind = %attributes.kind.kind,
            name = %attributes.name,
        )
    }
}

fn record(result: &Result<()>, started: Instant) {
    match result {
        Ok(()) => tracing::debug!(elapsed = ?started.elapsed(), "admitted"),
        Err(err) if err.is_forbidden() => tracing::debug!(elapsed = ?started.elapsed(), %err, "rejected"),
        Err(err) => tracing::warn!(elapsed = ?started.elapsed(), %err, "admission plugin failed"),
    }
}

impl Interface for Traced {
    fn handles(&self, operation: Operation) -> bool {
        self.inner.handles(operation)
    }

    fn as_mutating(&self) -> Option<&dyn MutationInterface> {
        self.inner.as_mutating().map(|_| self as &dyn MutationInterface)
    }

    fn as_validating(&self) -> Option<&dyn ValidationInterface> {
        self.inner.as_validating().map(|_| self as &dyn ValidationInterface)
    }

    fn readiness(&self) -> Option<&Handler> {
        self.inner.readiness()
    }

    fn inject(&mut self, capability: &Capability) {
        self.inner.inject(capability);
    }

    fn validate_initialization(&self) -> Result<()> {
        self.inner.validate_initialization()
    }
}

#[async_trait]
impl MutationInterface for Traced {
    async fn admit(&self, attributes: &mut Attributes, objects: &ObjectInterfaces) -> Result<()> {
        let Some(mutator) = self.inner.as_mutating() else {
            return Ok(());
        };
        let span = self.span("mutating", attributes);
        let started = Instant::now();
        let result = mutator.admit(attributes, objects).instrument(span.clone()).await;
        span.in_scope(|| record(&result, started));
        result
    }
}

#[async_trait]
impl ValidationInterface for Traced {
    async fn validate(&self, attributes: &Attributes, objects: &ObjectInterfaces) -> Result<()> {
        let Some(validator) = self.inner.as_validating() else {
            return Ok(());
        };
        let span = self.span("validating", attributes);
        let started = Instant::now();
        let result = validator.validate(attributes, objects).instrument(span.clone()).await;
        span.in_scope(|| record(&result, started));
        result
    }
}
