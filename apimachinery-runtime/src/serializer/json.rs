//! The JSON and YAML serializer.
use std::{cell::RefCell, fmt, io, sync::Arc};

use apimachinery_core::{
    reflect::{FromValue, ToValue},
    value::StrictValue,
    GroupVersionKind, Map, Object, TypeMeta, Unknown, Value,
};
use serde::de::DeserializeSeed;

use super::{
    gvk_with_defaults, use_or_create_object, Decoded, Decoder, Encoder, Recognized, RecognizingDecoder,
    CONTENT_TYPE_JSON, CONTENT_TYPE_YAML,
};
use crate::{
    error::{Error, Result},
    scheme::{ObjectCreater, ObjectTyper},
};

/// Switches for [`Serializer`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Read and write YAML instead of JSON
    pub yaml: bool,
    /// Indent JSON output; ignored for YAML
    pub pretty: bool,
    /// Report duplicate and unknown fields
    pub strict: bool,
}

/// Reads and writes objects as JSON or YAML.
#[derive(Clone)]
pub struct Serializer {
    options: SerializerOptions,
    creater: Arc<dyn ObjectCreater>,
    typer: Arc<dyn ObjectTyper>,
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer").field("options", &self.options).finish_non_exhaustive()
    }
}

/// The kind named by a tree's `apiVersion` and `kind` keys
pub fn type_meta_of(map: &Map) -> GroupVersionKind {
    let api_version = map.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let kind = map.get("kind").and_then(Value::as_str).unwrap_or_default();
    GroupVersionKind::from_api_version_and_kind(api_version, kind)
}

impl Serializer {
    /// A serializer with the given options
    pub fn new(creater: Arc<dyn ObjectCreater>, typer: Arc<dyn ObjectTyper>, options: SerializerOptions) -> Self {
        Self {
            options,
            creater,
            typer,
        }
    }

    /// A compact, lenient JSON serializer
    pub fn json(creater: Arc<dyn ObjectCreater>, typer: Arc<dyn ObjectTyper>) -> Self {
        Self::new(creater, typer, SerializerOptions::default())
    }

    /// A lenient YAML serializer
    pub fn yaml(creater: Arc<dyn ObjectCreater>, typer: Arc<dyn ObjectTyper>) -> Self {
        Self::new(creater, typer, SerializerOptions {
            yaml: true,
            ..SerializerOptions::default()
        })
    }

    /// The options this serializer was built with
    pub fn options(&self) -> SerializerOptions {
        self.options
    }

    fn media_type(&self) -> &'static str {
        if self.options.yaml {
            CONTENT_TYPE_YAML
        } else {
            CONTENT_TYPE_JSON
        }
    }

    /// Parse `data` into a tree, recording the paths of repeated keys
    fn parse(&self, data: &[u8], duplicates: &RefCell<Vec<String>>) -> Result<Value> {
        let seed = StrictValue::new(duplicates);
        if self.options.yaml {
            return Ok(seed.deserialize(serde_yaml::Deserializer::from_slice(data))?);
        }
        let mut de = serde_json::Deserializer::from_slice(data);
        let value = seed.deserialize(&mut de)?;
        de.end()?;
        Ok(value)
    }

    fn fill(&self, obj: &mut dyn Object, map: &Map, duplicates: Vec<String>) -> Result<Vec<String>> {
        let mut ctx = if self.options.strict {
            FromValue::strict()
        } else {
            FromValue::default()
        };
        obj.fill_from_tree(map, &mut ctx)?;
        if !self.options.strict {
            return Ok(Vec::new());
        }
        let mut errors = duplicates
            .into_iter()
            .map(|path| format!("duplicate field {path:?}"))
            .collect::<Vec<_>>();
        errors.extend(
            ctx.take_unknown_fields()
                .into_iter()
                .map(|path| format!("unknown field {path:?}")),
        );
        Ok(errors)
    }
}

fn describe(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

impl Decoder for Serializer {
    fn decode(
        &self,
        data: &[u8],
        defaults: Option<&GroupVersionKind>,
        into: Option<Box<dyn Object>>,
    ) -> Result<Decoded> {
        let duplicates = RefCell::new(Vec::new());
        let map = match self.parse(data, &duplicates)? {
            Value::Object(map) => map,
            other => {
                return Err(Error::BadRequest(format!(
                    "expected a {} object, found {}",
                    self.media_type(),
                    other.kind_name()
                )))
            }
        };
        let duplicates = duplicates.into_inner();

        let mut actual = type_meta_of(&map);
        if let Some(defaults) = defaults {
            actual = gvk_with_defaults(actual, defaults);
        }

        if let Some(mut into) = into {
            if let Some(unknown) = into.downcast_mut::<Unknown>() {
                unknown.raw = data.to_vec().into();
                unknown.content_type = self.media_type().into();
                unknown.content_encoding.clear();
                unknown.types = TypeMeta::new(&actual);
                return Ok(Decoded::new(into, actual));
            }

            let kinds = if into.is_unstructured() {
                None
            } else {
                match self.typer.object_kinds(into.as_ref()) {
                    Ok((kinds, _)) => Some(kinds),
                    Err(e) if e.is_not_registered() => None,
                    Err(e) => return Err(e),
                }
            };
            match kinds {
                None => {
                    let strict_errors = self.fill(into.as_mut(), &map, duplicates)?;
                    if into.is_unstructured() {
                        actual = into.group_version_kind();
                        if actual.kind.is_empty() {
                            return Err(Error::MissingKind { data: describe(data) });
                        }
                    }
                    return Ok(Decoded {
                        object: into,
                        gvk: actual,
                        strict_errors,
                    });
                }
                Some(kinds) => {
                    if let Some(preferred) = kinds.first() {
                        actual = gvk_with_defaults(actual, preferred);
                    }
                    return self.decode_as(data, map, duplicates, actual, Some(into));
                }
            }
        }
        self.decode_as(data, map, duplicates, actual, None)
    }
}

impl Serializer {
    fn decode_as(
        &self,
        data: &[u8],
        map: Map,
        duplicates: Vec<String>,
        actual: GroupVersionKind,
        into: Option<Box<dyn Object>>,
    ) -> Result<Decoded> {
        if actual.kind.is_empty() {
            return Err(Error::MissingKind { data: describe(data) });
        }
        if actual.version.is_empty() {
            return Err(Error::MissingVersion { data: describe(data) });
        }
        let mut obj = use_or_create_object(self.typer.as_ref(), self.creater.as_ref(), &actual, into)?;
        let strict_errors = self.fill(obj.as_mut(), &map, duplicates)?;
        if obj.group_version_kind().is_empty() {
            obj.set_group_version_kind(&actual);
        }
        Ok(Decoded {
            object: obj,
            gvk: actual,
            strict_errors,
        })
    }
}

impl Encoder for Serializer {
    fn encode(&self, obj: &dyn Object, w: &mut dyn io::Write) -> Result<()> {
        let tree = Value::Object(obj.to_tree(&mut ToValue::default())?);
        if self.options.yaml {
            serde_yaml::to_writer(&mut *w, &tree)?;
            return Ok(());
        }
        if self.options.pretty {
            serde_json::to_writer_pretty(&mut *w, &tree)?;
        } else {
            serde_json::to_writer(&mut *w, &tree)?;
        }
        w.write_all(b"\n")?;
        Ok(())
    }

    fn identifier(&self) -> String {
        let SerializerOptions { yaml, pretty, strict } = self.options;
        format!("json:yaml={yaml},pretty={pretty},strict={strict}")
    }
}

impl RecognizingDecoder for Serializer {
    fn recognizes_data(&self, data: &[u8]) -> Result<Recognized> {
        if self.options.yaml {
            return Ok(Recognized::Unknown);
        }
        let first = data.iter().find(|b| !b.is_ascii_whitespace());
        Ok(if first == Some(&b'{') {
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
        serializer::{decode_into, encode},
        testing::{self, Gadget},
    };
    use apimachinery_core::Unstructured;
    use assert_json_diff::assert_json_eq;

    fn serializer(options: SerializerOptions) -> Serializer {
        let scheme = Arc::new(testing::scheme());
        Serializer::new(scheme.clone(), scheme, options)
    }

    #[test]
    fn decodes_with_defaults_into_an_empty_object() {
        let s = serializer(SerializerOptions::default());
        let defaults = GroupVersionKind::gvk("toys", "v1", "Gadget");
        let decoded = s
            .decode(br#"{"metadata":{"name":"x"}}"#, Some(&defaults), Some(Box::new(Gadget::default())))
            .unwrap();
        assert_eq!(decoded.gvk, defaults);
        assert!(decoded.strict_errors.is_empty());
        let gadget = decoded.into_typed::<Gadget>().unwrap();
        assert_eq!(gadget.metadata.name, "x");
        assert_eq!(gadget.group_version_kind(), defaults);
    }

    #[test]
    fn missing_identity_is_reported() {
        let s = serializer(SerializerOptions::default());
        let err = s.decode(br#"{"metadata":{}}"#, None, None).unwrap_err();
        assert!(err.is_missing_kind());
        let err = s.decode(br#"{"kind":"Gadget"}"#, None, None).unwrap_err();
        assert!(err.is_missing_version());
        let err = s.decode(br#"{"apiVersion":"toys/v9","kind":"Gadget"}"#, None, None).unwrap_err();
        assert!(err.is_not_registered());
    }

    #[test]
    fn strict_mode_keeps_the_object() {
        let s = serializer(SerializerOptions {
            strict: true,
            ..Default::default()
        });
        let data = br#"{"apiVersion":"toys/v1","kind":"Gadget","size":1,"bogus":true,"size":2}"#;
        let decoded = s.decode(data, None, None).unwrap();
        assert_eq!(decoded.strict_errors, [r#"duplicate field "size""#, r#"unknown field "bogus""#]);
        assert!(decoded.strict_error().is_some());
        let gadget = decoded.into_typed::<Gadget>().unwrap();
        assert_eq!(gadget.size, 2);

        let lenient = serializer(SerializerOptions::default());
        assert!(lenient.decode(data, None, None).unwrap().strict_errors.is_empty());
    }

    #[test]
    fn unknown_and_unstructured_targets() {
        let s = serializer(SerializerOptions::default());
        let data = br#"{"apiVersion":"other/v1","kind":"Thing","spec":{"a":1}}"#;

        let decoded = s.decode(data, None, Some(Box::new(Unknown::default()))).unwrap();
        let unknown = decoded.into_typed::<Unknown>().unwrap();
        assert_eq!(unknown.raw.as_ref(), &data[..]);
        assert_eq!(unknown.types.kind, "Thing");
        assert_eq!(unknown.content_type, CONTENT_TYPE_JSON);

        let decoded = s.decode(data, None, Some(Box::new(Unstructured::default()))).unwrap();
        assert_eq!(decoded.gvk, GroupVersionKind::gvk("other", "v1", "Thing"));
        let obj = decoded.into_typed::<Unstructured>().unwrap();
        assert_eq!(obj.nested_field(&["spec", "a"]), Some(&Value::Int(1)));

        let err = s
            .decode(br#"{"apiVersion":"v1"}"#, None, Some(Box::new(Unstructured::default())))
            .unwrap_err();
        assert!(err.is_missing_kind());
    }

    #[test]
    fn encodes_json_and_yaml() {
        let mut gadget = testing::gadget("g", 3);
        gadget.ratio = 0.5;
        let json = encode(&serializer(SerializerOptions::default()), &gadget).unwrap();
        assert!(json.ends_with(b"\n"));
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_json_eq!(
            value,
            serde_json::json!({
                "apiVersion": "toys/v1",
                "kind": "Gadget",
                "metadata": {"name": "g"},
                "size": 3,
                "ratio": 0.5,
            })
        );

        let pretty = encode(
            &serializer(SerializerOptions {
                pretty: true,
                ..Default::default()
            }),
            &gadget,
        )
        .unwrap();
        assert!(String::from_utf8(pretty).unwrap().contains("\n  \"kind\": \"Gadget\""));

        let yaml_serializer = serializer(SerializerOptions {
            yaml: true,
            ..Default::default()
        });
        let yaml = encode(&yaml_serializer, &gadget).unwrap();
        assert!(String::from_utf8_lossy(&yaml).contains("kind: Gadget"));
        let back = decode_into::<Gadget>(&yaml_serializer, &yaml).unwrap();
        assert_eq!(back.size, 3);
        assert_eq!(back.metadata.name, "g");
    }

    #[test]
    fn recognition_and_identity() {
        let json = serializer(SerializerOptions::default());
        assert_eq!(json.recognizes_data(b"  \n{\"a\":1}").unwrap(), Recognized::Yes);
        assert_eq!(json.recognizes_data(b"apiVersion: v1").unwrap(), Recognized::No);
        let yaml = serializer(SerializerOptions {
            yaml: true,
            ..Default::default()
        });
        assert_eq!(yaml.recognizes_data(b"{}").unwrap(), Recognized::Unknown);
        assert_eq!(yaml.identifier(), "json:yaml=true,pretty=false,strict=false");
    }
}
