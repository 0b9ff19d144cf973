//! Plugins that need no configuration.
use async_trait::async_trait;

use crate::{
    attributes::{Attributes, Operation},
    error::{AdmissionError, Result},
    interfaces::{Interface, MutationInterface, ObjectInterfaces, ValidationInterface},
    plugins::Plugins,
};

/// Registered name of [`AlwaysAdmit`]
pub const ALWAYS_ADMIT: &str = "AlwaysAdmit";
/// Registered name of [`AlwaysDeny`]
pub const ALWAYS_DENY: &str = "AlwaysDeny";

/// Admits every request unchanged
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysAdmit;

impl Interface for AlwaysAdmit {
    fn handles(&self, _: Operation) -> bool {
        true
    }

    fn as_mutating(&self) -> Option<&dyn MutationInterface> {
        Some(self)
    }

    fn as_validating(&self) -> Option<&dyn ValidationInterface> {
        Some(self)
    }
}

#[async_trait]
impl MutationInterface for AlwaysAdmit {
    async fn admit(&self, _: &mut Attributes, _: &ObjectInterfaces) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ValidationInterface for AlwaysAdmit {
    async fn validate(&self, _: &Attributes, _: &ObjectInterfaces) -> Result<()> {
        Ok(())
    }
}

/// Rejects every request
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysDeny;

impl Interface for AlwaysDeny {
    fn handles(&self, _: Operation) -> bool {
        true
    }

    fn as_mutating(&self) -> Option<&dyn MutationInterface> {
        Some(self)
    }

    fn as_validating(&self) -> Option<&dyn ValidationInterface> {
        Some(self)
    }
}

#[async_trait]
impl MutationInterface for AlwaysDeny {
    async fn admit(&self, attributes: &mut Attributes, _: &ObjectInterfaces) -> Result<()> {
        Err(AdmissionError::forbidden(attributes, "admission control is denying all modifications"))
    }
}

#[async_trait]
impl ValidationInterface for AlwaysDeny {
    async fn validate(&self, attributes: &Attributes, _: &ObjectInterfaces) -> Result<()> {
        Err(AdmissionError::forbidden(attributes, "admission control is denying all modifications"))
    }
}

/// Register every built-in plugin
pub fn register_all(plugins: &Plugins) {
    plugins.register(ALWAYS_ADMIT, |_| Ok(Box::new(AlwaysAdmit)));
    plugins.register(ALWAYS_DENY, |_| {
        tracing::warn!("{ALWAYS_DENY} admission plugin rejects every request; use it for testing only");
        Ok(Box::new(AlwaysDeny))
    });
}
