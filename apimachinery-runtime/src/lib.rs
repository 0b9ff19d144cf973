//! Runtime machinery for typed API objects
//!
//! This crate holds the [`Scheme`] registry mapping kinds to Rust layouts,
//! the [`Converter`](conversion::Converter) moving objects between versions,
//! and the serializers and codecs that read and write objects on the wire.
//!
//! Most users start from a [`CodecFactory`] built over their scheme, which
//! hands out version-aware codecs for every supported media type.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec_factory;
pub mod conversion;
pub mod error;
pub mod rest_mapper;
pub mod scheme;
pub mod serializer;
pub mod unstructured;

#[cfg(test)] mod testing;

pub use codec_factory::{CodecFactory, CodecFactoryOptions};
pub use conversion::{Converter, Scope};
pub use error::{Error, MapperError, NotRegisteredError, Result, StrictDecodingError};
pub use rest_mapper::{DefaultRestMapper, RestMapping, RestScope};
pub use scheme::{
    default_scheme, install_default_scheme, KnownType, ObjectConvertor, ObjectCreater,
    ObjectDefaulter, ObjectTyper, Scheme, SchemeBuilder,
};
pub use serializer::{Codec, Decoded, Decoder, Encoder, NegotiatedSerializer, SerializerInfo};
pub use unstructured::{DefaultUnstructuredConverter, UnstructuredConverter};
