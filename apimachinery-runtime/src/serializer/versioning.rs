//! Codecs that convert objects between versions as they are read and written.
use std::{any::Any, fmt, io, sync::Arc};

use apimachinery_core::{GroupVersionKind, GroupVersioner, Object, Unknown};

use super::{Decoded, Decoder, Encoder};
use crate::{
    error::{NotRegisteredError, Result},
    scheme::{ObjectConvertor, ObjectDefaulter, ObjectTyper, Scheme},
};

/// Wraps an encoder and a decoder with conversion and defaulting.
///
/// Decoding runs the base decoder, converts the result to the decode target
/// and then applies defaults. Encoding converts a copy of the object to the
/// encode target and writes that; the caller's object is never touched.
///
/// A missing or disabled target skips the conversion step.
#[derive(Clone)]
pub struct VersioningCodec {
    encoder: Arc<dyn Encoder>,
    decoder: Arc<dyn Decoder>,
    convertor: Arc<dyn ObjectConvertor>,
    typer: Arc<dyn ObjectTyper>,
    defaulter: Option<Arc<dyn ObjectDefaulter>>,
    encode_version: Option<Arc<dyn GroupVersioner>>,
    decode_version: Option<Arc<dyn GroupVersioner>>,
    scheme_name: String,
}

impl fmt::Debug for VersioningCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersioningCodec")
            .field("encoder", &self.encoder.identifier())
            .field("encode_version", &self.encode_version.as_ref().map(|v| v.identifier()))
            .field("decode_version", &self.decode_version.as_ref().map(|v| v.identifier()))
            .field("scheme", &self.scheme_name)
            .finish_non_exhaustive()
    }
}

fn active(version: &Option<Arc<dyn GroupVersioner>>) -> Option<&Arc<dyn GroupVersioner>> {
    version.as_ref().filter(|v| !v.is_disabled())
}

impl VersioningCodec {
    /// A codec converting and defaulting through `scheme`
    pub fn new(
        encoder: Arc<dyn Encoder>,
        decoder: Arc<dyn Decoder>,
        scheme: Arc<Scheme>,
        encode_version: Option<Arc<dyn GroupVersioner>>,
        decode_version: Option<Arc<dyn GroupVersioner>>,
    ) -> Self {
        Self {
            encoder,
            decoder,
            scheme_name: scheme.name().to_string(),
            convertor: scheme.clone(),
            typer: scheme.clone(),
            defaulter: Some(scheme),
            encode_version,
            decode_version,
        }
    }

    /// Replace the defaulter; `None` disables defaulting
    #[must_use]
    pub fn with_defaulter(mut self, defaulter: Option<Arc<dyn ObjectDefaulter>>) -> Self {
        self.defaulter = defaulter;
        self
    }

    fn default_object(&self, obj: &mut dyn Object) {
        if let Some(defaulter) = &self.defaulter {
            defaulter.default_object(obj);
        }
    }

    fn decode_into(&self, decoded: Decoded, mut target: Box<dyn Object>) -> Result<Decoded> {
        let Decoded {
            mut object,
            gvk,
            strict_errors,
        } = decoded;
        if object.layout() == target.layout() && !object.is_unstructured() {
            self.default_object(object.as_mut());
            return Ok(Decoded {
                object,
                gvk,
                strict_errors,
            });
        }
        let context = self.decode_version.as_ref().map(|v| v as &dyn Any);
        self.convertor.convert(object.as_ref(), target.as_mut(), context)?;
        self.default_object(target.as_mut());
        Ok(Decoded {
            object: target,
            gvk,
            strict_errors,
        })
    }

    fn encode_unstructured(&self, obj: &dyn Object, w: &mut dyn io::Write) -> Result<Option<()>> {
        let gvk = obj.group_version_kind();
        let Some(target) = active(&self.encode_version) else {
            return self.encoder.encode(obj, w).map(Some);
        };
        if gvk.version.is_empty() {
            return self.encoder.encode(obj, w).map(Some);
        }
        match target.kind_for_group_version_kinds(std::slice::from_ref(&gvk)) {
            None => Err(NotRegisteredError::Target {
                type_name: gvk.kind.clone(),
                target: target.identifier(),
                scheme: self.scheme_name.clone(),
            }
            .into()),
            Some(wanted) if wanted == gvk => self.encoder.encode(obj, w).map(Some),
            Some(_) => Ok(None),
        }
    }
}

impl Decoder for VersioningCodec {
    fn decode(
        &self,
        data: &[u8],
        defaults: Option<&GroupVersionKind>,
        into: Option<Box<dyn Object>>,
    ) -> Result<Decoded> {
        // an unstructured target with an opinion on its version always goes
        // through conversion
        let (decode_into, target) = match into {
            Some(obj) if obj.is_unstructured() && !obj.group_version_kind().group_version().is_empty() => {
                (None, Some(obj))
            }
            Some(obj) => {
                let target = obj.deep_copy_object();
                (Some(obj), Some(target))
            }
            None => (None, None),
        };
        let decoded = self.decoder.decode(data, defaults, decode_into)?;
        if let Some(target) = target {
            return self.decode_into(decoded, target);
        }

        let Decoded {
            object,
            gvk,
            strict_errors,
        } = decoded;
        let mut object = match active(&self.decode_version) {
            Some(version) => self.convertor.unsafe_convert_to_version(object, version.as_ref())?,
            None => object,
        };
        self.default_object(object.as_mut());
        Ok(Decoded {
            object,
            gvk,
            strict_errors,
        })
    }
}

impl Encoder for VersioningCodec {
    fn encode(&self, obj: &dyn Object, w: &mut dyn io::Write) -> Result<()> {
        if obj.is::<Unknown>() {
            return self.encoder.encode(obj, w);
        }
        if obj.is_unstructured() {
            if let Some(()) = self.encode_unstructured(obj, w)? {
                return Ok(());
            }
        }

        let (kinds, unversioned) = self.typer.object_kinds(obj)?;
        match active(&self.encode_version) {
            Some(version) if !unversioned => {
                let out = self.convertor.convert_to_version(obj, version.as_ref())?;
                self.encoder.encode(out.as_ref(), w)
            }
            _ => {
                let stamp = kinds.first().cloned().unwrap_or_default();
                if obj.group_version_kind() == stamp {
                    return self.encoder.encode(obj, w);
                }
                let mut out = obj.deep_copy_object();
                out.set_group_version_kind(&stamp);
                self.encoder.encode(out.as_ref(), w)
            }
        }
    }

    fn identifier(&self) -> String {
        let target = self
            .encode_version
            .as_ref()
            .map(|v| v.identifier())
            .unwrap_or_default();
        format!("versioning:encodeGV={target},encoder={}", self.encoder.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        serializer::{encode, json},
        testing::{self, Gadget, InternalGadget},
    };
    use apimachinery_core::{
        gvk::{DisabledGroupVersioner, InternalGroupVersioner},
        GroupVersion, Status, Unstructured, Value,
    };

    fn codec(encode_version: Option<Arc<dyn GroupVersioner>>, decode_version: Option<Arc<dyn GroupVersioner>>) -> VersioningCodec {
        let scheme = Arc::new(testing::scheme());
        let serializer = Arc::new(json::Serializer::json(scheme.clone(), scheme.clone()));
        VersioningCodec::new(serializer.clone(), serializer, scheme, encode_version, decode_version)
    }

    fn internal() -> Option<Arc<dyn GroupVersioner>> {
        Some(Arc::new(InternalGroupVersioner))
    }

    fn v1() -> Option<Arc<dyn GroupVersioner>> {
        Some(Arc::new(testing::v1()))
    }

    const GADGET: &[u8] = br#"{"apiVersion":"toys/v1","kind":"Gadget","metadata":{"name":"g"},"ratio":0.5}"#;

    #[test]
    fn decode_converts_then_defaults() {
        let decoded = codec(v1(), internal()).decode(GADGET, None, None).unwrap();
        assert_eq!(decoded.gvk, GroupVersionKind::gvk("toys", "v1", "Gadget"));
        let gadget = decoded.into_typed::<InternalGadget>().unwrap();
        assert_eq!(gadget.size, 1, "defaulted after conversion");
        assert_eq!(gadget.ratio, 0.5);
        assert!(gadget.group_version_kind().is_empty());
    }

    #[test]
    fn disabled_targets_skip_conversion() {
        for version in [None, Some(Arc::new(DisabledGroupVersioner) as Arc<dyn GroupVersioner>)] {
            let decoded = codec(version.clone(), version).decode(GADGET, None, None).unwrap();
            let gadget = decoded.into_typed::<Gadget>().unwrap();
            assert_eq!(gadget.size, 0);
        }
    }

    #[test]
    fn decoding_into_a_different_layout_converts() {
        let codec = codec(v1(), internal());
        let decoded = codec
            .decode(GADGET, None, Some(Box::new(InternalGadget::default())))
            .unwrap();
        assert_eq!(decoded.into_typed::<InternalGadget>().unwrap().size, 1);

        let mut target = Unstructured::default();
        target.set_nested_field(Value::from("toys/v1"), &["apiVersion"]);
        let decoded = codec.decode(GADGET, None, Some(Box::new(target))).unwrap();
        let obj = decoded.into_typed::<Unstructured>().unwrap();
        assert_eq!(obj.nested_string(&["kind"]), Some("Gadget"));
        assert_eq!(obj.nested_field(&["ratio"]), Some(&Value::Float(0.5)));
        assert_eq!(obj.nested_field(&["size"]), None);
    }

    #[test]
    fn encoding_leaves_the_caller_object_alone() {
        let codec = codec(v1(), internal());
        let mut gadget = InternalGadget {
            size: 5,
            ..InternalGadget::default()
        };
        gadget.metadata.name = "g".into();
        let data = encode(&codec, &gadget).unwrap();
        assert!(gadget.group_version_kind().is_empty());
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(value["apiVersion"], "toys/v1");
        assert_eq!(value["size"], 5);

        // unversioned kinds are stamped, not converted
        let data = encode(&codec, &Status::success()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["kind"], "Status");
    }

    #[test]
    fn unstructured_encoding_checks_the_target() {
        let codec = codec(Some(Arc::new(GroupVersion::gv("other", "v1"))), internal());
        let obj = Unstructured::with_kind(&GroupVersionKind::gvk("toys", "v1", "Gadget"));
        let err = encode(&codec, &obj).unwrap_err();
        assert!(err.is_not_registered());

        let codec = self::codec(v1(), internal());
        assert!(encode(&codec, &obj).is_ok());
        assert!(codec.identifier().starts_with("versioning:encodeGV=toys/v1,encoder=json:"));
    }
}
