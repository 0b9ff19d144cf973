//! Typed API objects for Rust
//!
//! This crate is the entry point to a set of crates that model API objects the
//! way a Kubernetes-style server does: every object carries a group, version and
//! kind, a [`Scheme`] maps those identifiers to Rust types, and codecs move
//! objects between wire formats and between versions of the same kind.
//!
//! The crate is split into parts that can be enabled separately:
//!
//! - [`core`]: identifiers, metadata records, the unstructured tree, the
//!   [`Reflect`] projection and structural equality
//! - [`runtime`]: the scheme registry, conversions, JSON/YAML/protobuf
//!   serializers, versioning codecs and the REST mapper (default feature `runtime`)
//! - [`admission`]: the admission plugin chain, its configuration and dynamic
//!   certificate content (feature `admission`)
//!
//! # Example
//!
//! Register a kind, then decode a payload that omits its type information:
//!
//! ```rust
//! use std::sync::Arc;
//! use apimachinery::{
//!     core::{GroupVersion, GroupVersionKind, Object, ObjectMeta, TypeMeta},
//!     runtime::serializer::{json::Serializer, Decoder},
//!     Reflect, Scheme,
//! };
//!
//! #[derive(Reflect, Clone, Debug, Default)]
//! #[reflect(object)]
//! struct Deployment {
//!     #[reflect(inline)]
//!     types: TypeMeta,
//!     metadata: ObjectMeta,
//!     #[reflect(omitempty)]
//!     replicas: i32,
//! }
//!
//! let mut scheme = Scheme::new();
//! scheme.add_known_type::<Deployment>(&GroupVersion::gv("apps", "v1"));
//! let scheme = Arc::new(scheme);
//!
//! let json = Serializer::json(scheme.clone(), scheme);
//! let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
//! let decoded = json.decode(br#"{"metadata":{"name":"x"}}"#, Some(&gvk), None)?;
//! let deployment = decoded.into_typed::<Deployment>()?;
//! assert_eq!(deployment.metadata.name, "x");
//! assert_eq!(deployment.group_version_kind(), gvk);
//! # Ok::<(), apimachinery::Error>(())
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

#[cfg(test)]
extern crate self as apimachinery;

macro_rules! cfg_runtime {
    ($($item:item)*) => {
        $(
            #[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
            #[cfg(feature = "runtime")]
            $item
        )*
    }
}

macro_rules! cfg_admission {
    ($($item:item)*) => {
        $(
            #[cfg_attr(docsrs, doc(cfg(feature = "admission")))]
            #[cfg(feature = "admission")]
            $item
        )*
    }
}

/// Re-exports from `apimachinery-core`
#[doc(inline)]
pub use apimachinery_core as core;

#[doc(inline)]
pub use apimachinery_core::{
    GroupVersion, GroupVersionKind, GroupVersionResource, Object, ObjectMeta, Reflect, TypeMeta, Unstructured,
};

cfg_runtime! {
    /// Re-exports from `apimachinery-runtime`
    #[doc(inline)]
    pub use apimachinery_runtime as runtime;

    #[doc(inline)]
    pub use apimachinery_runtime::{CodecFactory, Converter, DefaultRestMapper, Error, Result, Scheme, SchemeBuilder};
}

cfg_admission! {
    /// Re-exports from `apimachinery-admission`
    #[doc(inline)]
    pub use apimachinery_admission as admission;
}

#[cfg(all(test, feature = "runtime"))]
mod test {
    use crate::{
        core::{GroupVersion, GroupVersionKind, Object, ObjectMeta, TypeMeta},
        runtime::serializer::{decode, encode, CONTENT_TYPE_JSON},
        CodecFactory, Reflect, Scheme,
    };
    use std::sync::Arc;

    #[derive(Reflect, Clone, Debug, Default, PartialEq)]
    #[reflect(object)]
    struct Note {
        #[reflect(inline)]
        types: TypeMeta,
        metadata: ObjectMeta,
        text: String,
    }

    #[test]
    fn facade_reexports_compose() {
        let mut scheme = Scheme::with_name("notes");
        scheme.add_known_type::<Note>(&GroupVersion::gv("notes.example.com", "v1"));
        let factory = CodecFactory::new(Arc::new(scheme), &[]);
        let json = &factory.serializer_for_media_type(CONTENT_TYPE_JSON).unwrap().serializer;

        let mut note = Note {
            text: "hello".into(),
            ..Note::default()
        };
        note.metadata.name = "n".into();
        note.set_group_version_kind(&GroupVersionKind::gvk("notes.example.com", "v1", "Note"));

        let data = encode(json, &note).unwrap();
        let back = decode(factory.universal_deserializer().as_ref(), &data).unwrap();
        assert_eq!(back.downcast_ref::<Note>(), Some(&note));
    }
}
