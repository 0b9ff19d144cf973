//! Opaque payloads: embedded blobs and undecoded objects.
use std::any::Any;

use bytes::Bytes;

use crate::{
    equality::Equalities,
    gvk::GroupVersionKind,
    metadata::TypeMeta,
    object::{Layout, Object},
    reflect::{Error, FromValue, Reflect, ToValue},
    value::{Map, Value},
};

/// An object embedded inside another, kept as raw JSON until someone decodes it.
///
/// On encode the in-memory [`object`](RawExtension::object) wins over the raw
/// bytes; on decode only the raw bytes are filled.
#[derive(Clone, Default, Debug)]
pub struct RawExtension {
    /// The serialized form, as JSON
    pub raw: Bytes,
    /// A decoded form, when available
    pub object: Option<Box<dyn Object>>,
}

impl RawExtension {
    /// Wrap raw JSON bytes
    pub fn from_raw(raw: impl Into<Bytes>) -> Self {
        Self {
            raw: raw.into(),
            object: None,
        }
    }

    /// Wrap an in-memory object
    pub fn from_object(object: Box<dyn Object>) -> Self {
        Self {
            raw: Bytes::new(),
            object: Some(object),
        }
    }

    /// Whether neither form is present
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.object.is_none()
    }
}

impl Reflect for RawExtension {
    fn to_value(&self, ctx: &mut ToValue) -> Result<Value, Error> {
        if let Some(object) = &self.object {
            return object.to_tree(ctx).map(Value::Object);
        }
        if self.raw.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice::<Value>(&self.raw).map_err(|e| Error::InvalidValue {
            path: ctx.path(),
            message: format!("embedded object is not JSON: {e}"),
        })
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(Self::default()),
            other => serde_json::to_vec(other)
                .map(Self::from_raw)
                .map_err(|e| ctx.invalid(e)),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn deep_equal(&self, other: &Self, eq: &Equalities) -> bool {
        if self.raw != other.raw {
            return false;
        }
        match (&self.object, &other.object) {
            (None, None) => true,
            (Some(a), Some(b)) => a.deep_equal_object(b.as_ref(), eq),
            _ => false,
        }
    }
}

/// An object whose payload has not been decoded.
///
/// Decoders stash the raw bytes here when asked to decode into an [`Unknown`];
/// the binary format uses the same shape as its envelope.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Unknown {
    /// The embedded type information, as detected
    pub types: TypeMeta,
    /// The undecoded payload
    pub raw: Bytes,
    /// Encoding applied to `raw`, usually empty
    pub content_encoding: String,
    /// Media type of `raw`
    pub content_type: String,
}

impl Object for Unknown {
    fn group_version_kind(&self) -> GroupVersionKind {
        self.types.group_version_kind()
    }

    fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
        self.types.set_group_version_kind(gvk)
    }

    fn layout(&self) -> Layout {
        Layout::of::<Self>()
    }

    fn deep_copy_object(&self) -> Box<dyn Object> {
        Box::new(self.clone())
    }

    fn to_tree(&self, ctx: &mut ToValue) -> Result<Map, Error> {
        match serde_json::from_slice::<Value>(&self.raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::TypeMismatch {
                path: ctx.path(),
                expected: "object",
                found: other.kind_name(),
            }),
            Err(e) => Err(Error::InvalidValue {
                path: ctx.path(),
                message: format!("payload of type {:?} is not JSON: {e}", self.content_type),
            }),
        }
    }

    fn fill_from_tree(&mut self, map: &Map, ctx: &mut FromValue) -> Result<(), Error> {
        let raw = serde_json::to_vec(map).map_err(|e| ctx.invalid(e))?;
        let api_version = map.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
        let kind = map.get("kind").and_then(Value::as_str).unwrap_or_default();
        *self = Unknown {
            types: TypeMeta {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            },
            raw: raw.into(),
            content_encoding: String::new(),
            content_type: "application/json".into(),
        };
        Ok(())
    }

    fn deep_equal_object(&self, other: &dyn Object, _: &Equalities) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
