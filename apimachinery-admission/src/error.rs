//! Error handling in [`apimachinery_admission`][crate]
use std::path::PathBuf;

use apimachinery_core::{Status, StatusReason};
use thiserror::Error;

use crate::attributes::Attributes;

/// Possible errors when building or dispatching through an admission chain
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// A plugin rejected the request
    #[error("{kind} {name:?} is forbidden: {reason}")]
    Forbidden {
        /// Kind of the object under admission, or its resource when the kind is unknown
        kind: String,
        /// Name of the object under admission
        name: String,
        /// Why the plugin said no
        reason: String,
    },

    /// A plugin failed while evaluating the request
    #[error("internal error during admission: {0}")]
    Internal(String),

    /// A plugin was still not ready when its readiness wait ran out
    #[error("not yet ready to handle request")]
    NotReady,

    /// A plugin panicked while handling the request
    #[error("admission plugin panicked: {0}")]
    Panic(String),

    /// No plugin with this name is registered
    #[error("unknown admission plugin: {0}")]
    UnknownPlugin(String),

    /// A plugin could not be built from its configuration
    #[error("failed to initialize admission plugin {name:?}: {reason}")]
    Initialization {
        /// The plugin's registered name
        name: String,
        /// What went wrong
        reason: String,
    },

    /// The admission configuration file is unreadable or malformed
    #[error("failed to read admission configuration {path:?}: {reason}")]
    Configuration {
        /// File being read
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Decoding or encoding a configuration object failed
    #[error(transparent)]
    Runtime(#[from] apimachinery_runtime::Error),
}

impl AdmissionError {
    /// Reject the object described by `attributes`
    pub fn forbidden(attributes: &Attributes, reason: impl std::fmt::Display) -> Self {
        let kind = if attributes.kind.kind.is_empty() {
            attributes.resource.resource.clone()
        } else {
            attributes.kind.kind.clone()
        };
        AdmissionError::Forbidden {
            kind,
            name: attributes.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Whether a plugin rejected the request, as opposed to failing on it
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AdmissionError::Forbidden { .. })
    }

    /// The status reply sent back to the requester
    pub fn to_status(&self) -> Status {
        let reason = match self {
            AdmissionError::Forbidden { .. } => StatusReason::Forbidden,
            _ => StatusReason::InternalError,
        };
        Status::failure(&self.to_string(), reason)
    }
}

impl From<AdmissionError> for Status {
    fn from(err: AdmissionError) -> Self {
        err.to_status()
    }
}

/// Failures loading certificate content
#[derive(Error, Debug)]
pub enum CertificateError {
    /// The file could not be read
    #[error("failed to read {path:?}: {source}")]
    ReadFile {
        /// File being read
        path: PathBuf,
        /// The underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The content is empty
    #[error("{name}: content is empty")]
    Empty {
        /// Provider the content belongs to
        name: String,
    },

    /// The content is not PEM
    #[error("{name}: invalid PEM: {source}")]
    Pem {
        /// Provider the content belongs to
        name: String,
        /// The underlying failure
        #[source]
        source: pem::PemError,
    },

    /// The PEM content lacks a block the provider requires
    #[error("{name}: no {tag} block found")]
    MissingBlock {
        /// Provider the content belongs to
        name: String,
        /// The PEM tag that was expected
        tag: &'static str,
    },
}

/// Convenience alias for admission results
pub type Result<T, E = AdmissionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Operation;
    use apimachinery_core::GroupVersionKind;

    #[test]
    fn rejections_become_forbidden_statuses() {
        let attributes = Attributes::new(
            GroupVersionKind::gvk("apps", "v1", "Deployment"),
            Operation::Create,
        )
        .with_name("web");
        let err = AdmissionError::forbidden(&attributes, "too many replicas");
        assert!(err.is_forbidden());
        let status = Status::from(err);
        assert_eq!(status.reason, StatusReason::Forbidden);
        assert_eq!(status.code, 403);
        assert_eq!(status.message, r#"Deployment "web" is forbidden: too many replicas"#);

        let status = AdmissionError::NotReady.to_status();
        assert_eq!(status.reason, StatusReason::InternalError);
        assert_eq!(status.code, 500);
    }
}
