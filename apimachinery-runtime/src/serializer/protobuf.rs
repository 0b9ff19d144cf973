//! The binary serializer.
//!
//! Every payload starts with the four byte magic `k8s\0`, followed by an
//! [`UnknownProto`] envelope carrying the type information and the object
//! tree encoded as a [`Node`].
use std::{fmt, io, sync::Arc};

use apimachinery_core::{reflect::FromValue, reflect::ToValue, GroupVersionKind, Map, Object, TypeMeta, Unknown, Value};
use prost::Message;

use super::{
    gvk_with_defaults, use_or_create_object, Decoded, Decoder, Encoder, MemoryAllocator, Recognized,
    RecognizingDecoder, CONTENT_TYPE_PROTOBUF,
};
use crate::{
    error::{Error, Result},
    scheme::{ObjectCreater, ObjectTyper},
};

/// Leading bytes of every binary payload
pub const MAGIC: [u8; 4] = [0x6b, 0x38, 0x73, 0x00];

/// Wire form of [`TypeMeta`]
#[derive(Clone, PartialEq, prost::Message)]
pub struct TypeMetaProto {
    #[prost(string, tag = "1")]
    pub api_version: String,
    #[prost(string, tag = "2")]
    pub kind: String,
}

/// The envelope around every binary payload
#[derive(Clone, PartialEq, prost::Message)]
pub struct UnknownProto {
    #[prost(message, optional, tag = "1")]
    pub type_meta: Option<TypeMetaProto>,
    #[prost(bytes = "vec", tag = "2")]
    pub raw: Vec<u8>,
    #[prost(string, tag = "3")]
    pub content_encoding: String,
    #[prost(string, tag = "4")]
    pub content_type: String,
}

/// One node of an object tree
#[derive(Clone, PartialEq, prost::Message)]
pub struct Node {
    #[prost(oneof = "node::Kind", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub kind: Option<node::Kind>,
}

/// Variants of [`Node`]
pub mod node {
    /// What a node holds
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(bool, tag = "1")]
        Null(bool),
        #[prost(bool, tag = "2")]
        Bool(bool),
        #[prost(int64, tag = "3")]
        Int(i64),
        #[prost(double, tag = "4")]
        Float(f64),
        #[prost(string, tag = "5")]
        String(String),
        #[prost(message, tag = "6")]
        Sequence(super::Sequence),
        #[prost(message, tag = "7")]
        Mapping(super::Mapping),
    }
}

/// An ordered list of nodes
#[derive(Clone, PartialEq, prost::Message)]
pub struct Sequence {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<Node>,
}

/// Key/value pairs, in key order
#[derive(Clone, PartialEq, prost::Message)]
pub struct Mapping {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<Entry>,
}

/// One pair of a [`Mapping`]
#[derive(Clone, PartialEq, prost::Message)]
pub struct Entry {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Node>,
}

impl From<&Value> for Node {
    fn from(value: &Value) -> Self {
        use node::Kind;
        let kind = match value {
            Value::Null => Kind::Null(true),
            Value::Bool(b) => Kind::Bool(*b),
            Value::Int(i) => Kind::Int(*i),
            Value::Float(f) => Kind::Float(*f),
            Value::String(s) => Kind::String(s.clone()),
            Value::Array(items) => Kind::Sequence(Sequence {
                items: items.iter().map(Node::from).collect(),
            }),
            Value::Object(map) => Kind::Mapping(Mapping::from(map)),
        };
        Node { kind: Some(kind) }
    }
}

impl From<&Map> for Mapping {
    fn from(map: &Map) -> Self {
        Mapping {
            entries: map
                .iter()
                .map(|(key, value)| Entry {
                    key: key.clone(),
                    value: Some(Node::from(value)),
                })
                .collect(),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        use node::Kind;
        match node.kind {
            None | Some(Kind::Null(_)) => Value::Null,
            Some(Kind::Bool(b)) => Value::Bool(b),
            Some(Kind::Int(i)) => Value::Int(i),
            Some(Kind::Float(f)) => Value::Float(f),
            Some(Kind::String(s)) => Value::String(s),
            Some(Kind::Sequence(seq)) => Value::Array(seq.items.into_iter().map(Value::from).collect()),
            Some(Kind::Mapping(mapping)) => Value::Object(Map::from(mapping)),
        }
    }
}

impl From<Mapping> for Map {
    fn from(mapping: Mapping) -> Self {
        mapping
            .entries
            .into_iter()
            .map(|entry| (entry.key, entry.value.map(Value::from).unwrap_or(Value::Null)))
            .collect()
    }
}

/// Reads and writes the `k8s\0` enveloped binary format.
///
/// There is no strict variant; unknown fields are ignored.
#[derive(Clone)]
pub struct Serializer {
    creater: Arc<dyn ObjectCreater>,
    typer: Arc<dyn ObjectTyper>,
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("protobuf::Serializer").finish_non_exhaustive()
    }
}

impl Serializer {
    /// A binary serializer backed by a scheme
    pub fn new(creater: Arc<dyn ObjectCreater>, typer: Arc<dyn ObjectTyper>) -> Self {
        Self { creater, typer }
    }

    fn envelope(&self, obj: &dyn Object) -> Result<UnknownProto> {
        if let Some(unknown) = obj.downcast_ref::<Unknown>() {
            if unknown.content_type == CONTENT_TYPE_PROTOBUF {
                return Ok(UnknownProto {
                    type_meta: Some(TypeMetaProto {
                        api_version: unknown.types.api_version.clone(),
                        kind: unknown.types.kind.clone(),
                    }),
                    raw: unknown.raw.to_vec(),
                    content_encoding: unknown.content_encoding.clone(),
                    content_type: String::new(),
                });
            }
        }
        let tree = obj.to_tree(&mut ToValue::default())?;
        let (api_version, kind) = obj.group_version_kind().to_api_version_and_kind();
        Ok(UnknownProto {
            type_meta: Some(TypeMetaProto { api_version, kind }),
            raw: Mapping::from(&tree).encode_to_vec(),
            content_encoding: String::new(),
            content_type: String::new(),
        })
    }
}

fn describe(envelope: &UnknownProto) -> String {
    format!("{:?}", envelope.type_meta)
}

impl Decoder for Serializer {
    fn decode(
        &self,
        data: &[u8],
        defaults: Option<&GroupVersionKind>,
        into: Option<Box<dyn Object>>,
    ) -> Result<Decoded> {
        let Some(body) = data.strip_prefix(&MAGIC[..]) else {
            return Err(Error::BadRequest(
                "provided data does not appear to be a protobuf message, expected prefix [107 56 115 0]".into(),
            ));
        };
        let envelope = UnknownProto::decode(body)?;
        let types = envelope.type_meta.clone().unwrap_or_default();
        let mut actual = GroupVersionKind::from_api_version_and_kind(&types.api_version, &types.kind);
        if let Some(defaults) = defaults {
            actual = gvk_with_defaults(actual, defaults);
        }

        let mut into = into;
        if let Some(obj) = into.as_mut() {
            if let Some(unknown) = obj.downcast_mut::<Unknown>() {
                unknown.types = TypeMeta::new(&actual);
                unknown.raw = envelope.raw.into();
                unknown.content_encoding = envelope.content_encoding;
                unknown.content_type = CONTENT_TYPE_PROTOBUF.into();
                let object = into.take().unwrap_or_else(|| Box::new(Unknown::default()));
                return Ok(Decoded::new(object, actual));
            }
            match self.typer.object_kinds(obj.as_ref()) {
                Ok((kinds, _)) => {
                    if let Some(preferred) = kinds.first() {
                        actual = gvk_with_defaults(actual, preferred);
                    }
                }
                Err(e) if e.is_not_registered() => {}
                Err(e) => return Err(e),
            }
        }

        if actual.kind.is_empty() {
            return Err(Error::MissingKind {
                data: describe(&envelope),
            });
        }
        if actual.version.is_empty() {
            return Err(Error::MissingVersion {
                data: describe(&envelope),
            });
        }

        let map = Map::from(Mapping::decode(envelope.raw.as_slice())?);
        let mut obj = use_or_create_object(self.typer.as_ref(), self.creater.as_ref(), &actual, into)?;
        obj.fill_from_tree(&map, &mut FromValue::default())?;
        if obj.group_version_kind().is_empty() {
            obj.set_group_version_kind(&actual);
        }
        Ok(Decoded::new(obj, actual))
    }
}

impl Encoder for Serializer {
    fn encode(&self, obj: &dyn Object, w: &mut dyn io::Write) -> Result<()> {
        let envelope = self.envelope(obj)?;
        w.write_all(&MAGIC)?;
        w.write_all(&envelope.encode_to_vec())?;
        Ok(())
    }

    fn encode_with_allocator(
        &self,
        obj: &dyn Object,
        w: &mut dyn io::Write,
        alloc: &mut dyn MemoryAllocator,
    ) -> Result<()> {
        let envelope = self.envelope(obj)?;
        let buf = alloc.allocate(MAGIC.len() + envelope.encoded_len());
        buf.extend_from_slice(&MAGIC);
        envelope
            .encode(buf)
            .map_err(|e| Error::BadRequest(e.to_string()))?;
        w.write_all(buf)?;
        Ok(())
    }

    fn identifier(&self) -> String {
        "protobuf".into()
    }
}

impl RecognizingDecoder for Serializer {
    fn recognizes_data(&self, data: &[u8]) -> Result<Recognized> {
        Ok(if data.starts_with(&MAGIC) {
            Recognized::Yes
        } else {
            Recognized::No
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        serializer::{encode, SimpleAllocator},
        testing::{self, Gadget},
    };

    fn serializer() -> Serializer {
        let scheme = Arc::new(testing::scheme());
        Serializer::new(scheme.clone(), scheme)
    }

    #[test]
    fn payloads_carry_the_magic_and_identity() {
        let s = serializer();
        let mut gadget = testing::gadget("g", 7);
        gadget.ratio = 0.25;
        let data = encode(&s, &gadget).unwrap();
        assert!(data.starts_with(&MAGIC));
        assert_eq!(s.recognizes_data(&data).unwrap(), Recognized::Yes);
        assert_eq!(s.recognizes_data(b"{}").unwrap(), Recognized::No);

        let decoded = s.decode(&data, None, None).unwrap();
        assert_eq!(decoded.gvk, GroupVersionKind::gvk("toys", "v1", "Gadget"));
        assert_eq!(decoded.into_typed::<Gadget>().unwrap(), gadget);
    }

    #[test]
    fn allocator_and_plain_encodes_agree() {
        let s = serializer();
        let gadget = testing::gadget("g", 1);
        let mut alloc = SimpleAllocator::default();
        let mut out = Vec::new();
        s.encode_with_allocator(&gadget, &mut out, &mut alloc).unwrap();
        assert_eq!(out, encode(&s, &gadget).unwrap());
    }

    #[test]
    fn unknown_targets_keep_the_raw_tree() {
        let s = serializer();
        let data = encode(&s, &testing::gadget("g", 2)).unwrap();
        let decoded = s.decode(&data, None, Some(Box::new(Unknown::default()))).unwrap();
        let unknown = decoded.into_typed::<Unknown>().unwrap();
        assert_eq!(unknown.types.kind, "Gadget");
        assert_eq!(unknown.content_type, CONTENT_TYPE_PROTOBUF);

        // re-encoding an undecoded payload is lossless
        assert_eq!(encode(&s, &unknown).unwrap(), data);
    }

    #[test]
    fn envelopes_without_identity_need_defaults() {
        let s = serializer();
        let mut data = MAGIC.to_vec();
        data.extend(
            UnknownProto {
                type_meta: None,
                raw: Mapping::from(&Map::new()).encode_to_vec(),
                ..UnknownProto::default()
            }
            .encode_to_vec(),
        );
        assert!(s.decode(&data, None, None).unwrap_err().is_missing_kind());
        let defaults = GroupVersionKind::gvk("toys", "v1", "Gadget");
        let decoded = s.decode(&data, Some(&defaults), None).unwrap();
        assert_eq!(decoded.object.group_version_kind(), defaults);
        assert!(s.decode(b"{}", None, None).is_err());
    }
}
