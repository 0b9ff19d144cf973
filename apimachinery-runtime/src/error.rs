//! Error handling in [`apimachinery_runtime`][crate]
use std::fmt;

use apimachinery_core::{
    gvk::{GroupKind, GroupVersionKind, GroupVersionResource},
    reflect,
};
use thiserror::Error;

/// Possible errors when registering, converting, encoding or decoding objects
#[derive(Error, Debug)]
pub enum Error {
    /// The payload does not name its kind and no default was supplied
    #[error("Object 'Kind' is missing in '{data}'")]
    MissingKind {
        /// The offending payload, rendered as text
        data: String,
    },

    /// The payload does not name its version and no default was supplied
    #[error("Object 'apiVersion' is missing in '{data}'")]
    MissingVersion {
        /// The offending payload, rendered as text
        data: String,
    },

    /// A kind, layout or version is unknown to the scheme
    #[error(transparent)]
    NotRegistered(#[from] NotRegisteredError),

    /// Unknown or duplicate fields in strict mode
    #[error(transparent)]
    StrictDecoding(#[from] StrictDecodingError),

    /// A conversion function failed, or none exists
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Projecting between a record and a tree failed
    #[error("{0}")]
    Reflect(#[from] reflect::Error),

    /// JSON parsing or writing failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing or writing failed
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A binary payload could not be decoded
    #[error("protobuf error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// Writing to or reading from a stream failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A decoder panicked while handling a payload
    #[error("recovered from panic: {0}")]
    Panic(String),

    /// None of the serializers recognized the payload
    #[error("no serialization format matched the provided data")]
    NoMatchingFormat,

    /// No serializer is registered for a media type
    #[error("unsupported media type {0:?}")]
    UnsupportedMediaType(String),

    /// The payload is well formed but cannot be used as requested
    #[error("{0}")]
    BadRequest(String),

    /// A scheme registration was rejected
    #[error("invalid registration: {0}")]
    Registration(String),

    /// Resource mapping failed
    #[error(transparent)]
    Mapper(#[from] MapperError),
}

impl Error {
    /// Convenience constructor for conversion failures
    pub fn conversion(message: impl fmt::Display) -> Self {
        Error::Conversion(message.to_string())
    }

    /// Whether the payload was missing its kind
    pub fn is_missing_kind(&self) -> bool {
        matches!(self, Error::MissingKind { .. })
    }

    /// Whether the payload was missing its version
    pub fn is_missing_version(&self) -> bool {
        matches!(self, Error::MissingVersion { .. })
    }

    /// Whether something was not registered with the scheme
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Error::NotRegistered(_))
    }

    /// Whether this is a strict decoding failure
    pub fn is_strict_decoding(&self) -> bool {
        matches!(self, Error::StrictDecoding(_))
    }

    /// Whether a conversion failed
    pub fn is_conversion(&self) -> bool {
        matches!(self, Error::Conversion(_))
    }

    /// Whether a projection overflowed its target type
    pub fn is_overflow(&self) -> bool {
        matches!(self, Error::Reflect(e) if e.is_overflow())
    }
}

/// The different ways something can be unknown to a scheme
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotRegisteredError {
    /// No layout is registered for a kind
    #[error("no kind {:?} is registered for version {:?} in scheme {scheme:?}", .gvk.kind, .gvk.group_version().api_version())]
    Kind {
        /// The requested kind
        gvk: GroupVersionKind,
        /// Name of the scheme
        scheme: String,
    },

    /// A layout has no kind in the scheme
    #[error("no kind is registered for the type {type_name} in scheme {scheme:?}")]
    Type {
        /// Rust type name of the layout
        type_name: String,
        /// Name of the scheme
        scheme: String,
    },

    /// A layout is registered, but the target versioner refused all of its kinds
    #[error("{type_name} is not suitable for converting to {target:?} in scheme {scheme:?}")]
    Target {
        /// Rust type name, or the kind for unstructured objects
        type_name: String,
        /// Identifier of the target versioner
        target: String,
        /// Name of the scheme
        scheme: String,
    },

    /// No kind is registered for a version
    #[error("no version {version:?} has been registered in scheme {scheme:?}")]
    Version {
        /// The requested group version
        version: String,
        /// Name of the scheme
        scheme: String,
    },
}

/// Unknown and duplicate field diagnostics gathered in strict mode.
///
/// The decoded object is still produced; this error rides along with it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
#[error("strict decoding error: {}", .errors.join(", "))]
pub struct StrictDecodingError {
    /// Individual diagnostics such as `unknown field "spec.foo"`
    pub errors: Vec<String>,
}

impl StrictDecodingError {
    /// Wrap a list of diagnostics
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }

    /// The individual diagnostics
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Failures while mapping between kinds and resources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapperError {
    /// The partial resource had no resource name
    #[error("a resource must be present, got: {0}")]
    MissingResource(GroupVersionResource),

    /// Nothing matched a partial resource
    #[error("no matches for {0}")]
    NoResourceMatch(GroupVersionResource),

    /// Nothing matched a group kind in the searched versions
    #[error("no matches for kind {:?} in group {:?}", .group_kind.kind, .group_kind.group)]
    NoKindMatch {
        /// The requested group kind
        group_kind: GroupKind,
        /// Versions that were searched
        searched_versions: Vec<String>,
    },

    /// A partial resource matched several resources
    #[error("{partial} matches multiple resources {matching:?}")]
    AmbiguousResource {
        /// The partial resource
        partial: GroupVersionResource,
        /// Every matching resource
        matching: Vec<GroupVersionResource>,
    },

    /// A partial resource matched several kinds
    #[error("{partial} matches multiple kinds {matching:?}")]
    AmbiguousKind {
        /// The partial resource
        partial: GroupVersionResource,
        /// Every matching kind
        matching: Vec<GroupVersionKind>,
    },

    /// A kind has a resource but no scope
    #[error("the provided version {version:?} and kind {kind:?} cannot be mapped to a supported scope")]
    NoScope {
        /// Group version of the kind
        version: String,
        /// The kind
        kind: String,
    },
}

impl MapperError {
    /// Whether nothing matched
    pub fn is_no_match(&self) -> bool {
        matches!(self, MapperError::NoResourceMatch(_) | MapperError::NoKindMatch { .. })
    }

    /// Whether several things matched
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            MapperError::AmbiguousResource { .. } | MapperError::AmbiguousKind { .. }
        )
    }
}

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_missing_piece() {
        let err = Error::from(NotRegisteredError::Kind {
            gvk: GroupVersionKind::gvk("apps", "v1", "Widget"),
            scheme: "test".into(),
        });
        assert!(err.is_not_registered());
        assert_eq!(
            err.to_string(),
            r#"no kind "Widget" is registered for version "apps/v1" in scheme "test""#
        );

        let strict = StrictDecodingError::new(vec![r#"unknown field "a""#.into(), r#"duplicate field "b""#.into()]);
        assert_eq!(
            strict.to_string(),
            r#"strict decoding error: unknown field "a", duplicate field "b""#
        );
    }
}
