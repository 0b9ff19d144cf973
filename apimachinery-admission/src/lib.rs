//! Admission control for typed API objects
//!
//! Requests pass through a [`Chain`] of plugins before they are persisted.
//! Mutating plugins may rewrite the object, validating plugins may only accept
//! or reject it. Plugins are registered by name in a [`Plugins`] registry,
//! receive their configuration from an [`AdmissionConfiguration`] file and
//! their collaborators through [`Capability`] injection.
//!
//! The [`certificates`] module holds the CA and serving certificate providers
//! that webhook plugins build their clients from.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]

pub mod attributes;
pub use attributes::{Attributes, Operation, UserInfo};

pub mod builtin;
pub use builtin::{AlwaysAdmit, AlwaysDeny};

pub mod certificates;

pub mod chain;
pub use chain::{Chain, Reinvoker};

pub mod config;
pub use config::{read_admission_configuration, AdmissionConfiguration, ConfigProvider, PluginConfigs};

pub mod error;
pub use error::{AdmissionError, CertificateError, Result};

pub mod initializer;
pub use initializer::{Capability, CapabilityInitializer, PluginInitializer, PluginInitializers};

pub mod interfaces;
pub use interfaces::{Interface, MutationInterface, ObjectInterfaces, ValidationInterface};

pub mod plugins;
pub use plugins::{Decorator, Plugins, TracingDecorator};

pub mod readiness;
pub use readiness::Handler;

pub mod webhook;
