//! Conversion between typed objects and unstructured trees.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    LazyLock,
};

use apimachinery_core::{
    equality::Equalities,
    reflect::{FromValue, ToValue},
    value::Value,
    Map, Object,
};

use crate::error::{Error, Result, StrictDecodingError};

/// Environment variable that turns on the conversion mismatch detector
pub const CONVERSION_DETECTOR_ENV: &str = "APIMACHINERY_CONVERSION_DETECTOR";

static MISMATCH_DETECTION: LazyLock<AtomicBool> = LazyLock::new(|| {
    let enabled = std::env::var(CONVERSION_DETECTOR_ENV)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false);
    AtomicBool::new(enabled)
});

/// Turn the conversion mismatch detector on or off for the whole process.
///
/// When enabled, every conversion is repeated through a JSON round trip and the
/// two results compared; a divergence panics.
pub fn set_mismatch_detection(enabled: bool) {
    MISMATCH_DETECTION.store(enabled, Ordering::Relaxed);
}

/// Whether the conversion mismatch detector is on
pub fn mismatch_detection() -> bool {
    MISMATCH_DETECTION.load(Ordering::Relaxed)
}

/// Moves objects to and from their tree form.
pub trait UnstructuredConverter: Send + Sync {
    /// Project `obj` into a mapping
    fn to_unstructured(&self, obj: &dyn Object) -> Result<Map>;

    /// Fill `obj` from a mapping, ignoring unknown fields
    fn from_unstructured(&self, map: &Map, obj: &mut dyn Object) -> Result<()> {
        self.from_unstructured_with_validation(map, obj, false)
    }

    /// Fill `obj` from a mapping, failing with a strict decoding error on unknown
    /// fields when `return_unknown_fields` is set
    fn from_unstructured_with_validation(
        &self,
        map: &Map,
        obj: &mut dyn Object,
        return_unknown_fields: bool,
    ) -> Result<()>;
}

/// The converter driven by each layout's record descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUnstructuredConverter;

impl UnstructuredConverter for DefaultUnstructuredConverter {
    fn to_unstructured(&self, obj: &dyn Object) -> Result<Map> {
        let map = obj.to_tree(&mut ToValue::default())?;
        if mismatch_detection() {
            check_to_unstructured(obj, &map);
        }
        Ok(map)
    }

    fn from_unstructured_with_validation(
        &self,
        map: &Map,
        obj: &mut dyn Object,
        return_unknown_fields: bool,
    ) -> Result<()> {
        let mut ctx = if return_unknown_fields {
            FromValue::strict()
        } else {
            FromValue::default()
        };
        obj.fill_from_tree(map, &mut ctx)?;
        if mismatch_detection() {
            check_from_unstructured(map, obj);
        }
        let unknown = ctx.take_unknown_fields();
        if return_unknown_fields && !unknown.is_empty() {
            let errors = unknown.into_iter().map(|p| format!("unknown field {p:?}")).collect();
            return Err(StrictDecodingError::new(errors).into());
        }
        Ok(())
    }
}

/// Convenience for [`DefaultUnstructuredConverter::to_unstructured`]
pub fn to_unstructured(obj: &dyn Object) -> Result<Map> {
    DefaultUnstructuredConverter.to_unstructured(obj)
}

/// Convenience for [`DefaultUnstructuredConverter::from_unstructured`]
pub fn from_unstructured(map: &Map, obj: &mut dyn Object) -> Result<()> {
    DefaultUnstructuredConverter.from_unstructured(map, obj)
}

fn json_round_trip(map: &Map) -> Result<Map> {
    let text = serde_json::to_vec(map)?;
    match serde_json::from_slice::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::BadRequest(format!("expected a mapping, found {}", other.kind_name()))),
    }
}

fn check_to_unstructured(obj: &dyn Object, map: &Map) {
    match json_round_trip(map) {
        Ok(trip) if trip == *map => {}
        Ok(trip) => mismatch(obj, &format!("{trip:?}")),
        Err(e) => mismatch(obj, &e.to_string()),
    }
}

fn check_from_unstructured(map: &Map, obj: &dyn Object) {
    let result = json_round_trip(map).and_then(|map| {
        let mut copy = obj.deep_copy_object();
        copy.fill_from_tree(&map, &mut FromValue::default())?;
        Ok(copy)
    });
    match result {
        Ok(copy) if Equalities::semantic().deep_equal_objects(copy.as_ref(), obj) => {}
        Ok(copy) => mismatch(obj, &format!("{copy:?}")),
        Err(e) => mismatch(obj, &e.to_string()),
    }
}

fn mismatch(obj: &dyn Object, json: &str) {
    tracing::error!(layout = %obj.layout(), "unstructured conversion diverges from the JSON path");
    panic!("unstructured conversion mismatch for {}:\n  direct: {obj:?}\n  json: {json}", obj.layout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use apimachinery_core::{ObjectMeta, Reflect, TypeMeta, Unstructured};
    use serde_json::json;

    #[derive(Reflect, Clone, Debug, Default)]
    #[reflect(object, crates(core = "::apimachinery_core"))]
    struct Gadget {
        #[reflect(inline)]
        types: TypeMeta,
        metadata: ObjectMeta,
        #[reflect(omitempty)]
        size: u64,
        #[reflect(omitempty)]
        ratio: f32,
    }

    fn tree(v: serde_json::Value) -> Map {
        match Value::from(v) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn typed_objects_round_trip_through_trees() {
        let mut gadget = Gadget {
            size: 3,
            ratio: 0.5,
            ..Gadget::default()
        };
        gadget.metadata.name = "g".into();
        let map = to_unstructured(&gadget).unwrap();
        assert_eq!(map.get("size"), Some(&Value::Int(3)));

        let mut back = Gadget::default();
        from_unstructured(&map, &mut back).unwrap();
        assert_eq!(back.size, 3);
        assert_eq!(back.metadata.name, "g");

        // both directions agree with the JSON path
        check_to_unstructured(&gadget, &map);
        check_from_unstructured(&map, &back);
    }

    #[test]
    #[should_panic(expected = "unstructured conversion mismatch")]
    fn trees_that_change_through_json_are_mismatches() {
        let mut map = to_unstructured(&Gadget::default()).unwrap();
        map.insert("ratio".into(), Value::Float(f64::NAN));
        check_to_unstructured(&Gadget::default(), &map);
    }

    #[test]
    fn overflowing_unsigned_values_fail() {
        let gadget = Gadget {
            size: u64::MAX,
            ..Gadget::default()
        };
        let err = to_unstructured(&gadget).unwrap_err();
        assert!(err.is_overflow(), "{err}");
    }

    #[test]
    fn integral_floats_fill_integers() {
        let mut out = Gadget::default();
        from_unstructured(&tree(json!({ "size": 4.0 })), &mut out).unwrap();
        assert_eq!(out.size, 4);
        assert!(from_unstructured(&tree(json!({ "size": 4.5 })), &mut out).is_err());
    }

    #[test]
    fn validation_reports_unknown_fields() {
        let map = tree(json!({ "metadata": { "name": "a", "color": "red" }, "bogus": 1 }));
        let mut out = Gadget::default();
        let err = DefaultUnstructuredConverter
            .from_unstructured_with_validation(&map, &mut out, true)
            .unwrap_err();
        match err {
            Error::StrictDecoding(e) => {
                assert_eq!(e.errors(), [r#"unknown field "metadata.color""#, r#"unknown field "bogus""#]);
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(out.metadata.name, "a");
    }

    #[test]
    fn unstructured_objects_pass_through() {
        let map = tree(json!({ "apiVersion": "v1", "kind": "Thing", "spec": { "a": [1, 2] } }));
        let mut u = Unstructured::default();
        from_unstructured(&map, &mut u).unwrap();
        assert_eq!(to_unstructured(&u).unwrap(), map);
    }
}
