//! Record descriptors and the tree projection built on them.
//!
//! A [`Reflect`] type knows how to project itself into a [`Value`] tree and back.
//! Records (named-field structs) get their implementation from
//! `#[derive(Reflect)]`, which emits a static [`RecordLayout`] describing every
//! field. Field names, omitempty bits and inline flags are resolved at runtime
//! through the [field-info cache](field_info), so encoding and strict decoding
//! share a single walk.
//!
//! Scalars, containers and a handful of meta types implement [`Reflect`] by
//! hand; those hand-written implementations act as custom to-tree and
//! from-tree hooks and short-circuit the record walk.
use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::{
    equality::Equalities,
    value::{Map, Value},
};

mod field_cache;
mod impls;

pub use field_cache::{field_info, FieldInfo};

/// Failures while projecting between records and trees.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A number does not fit the target type
    #[error("{path}: value {value} overflows {target}")]
    Overflow {
        /// Location in the tree
        path: String,
        /// The offending value
        value: String,
        /// Name of the target type
        target: &'static str,
    },

    /// A node has a shape the target cannot be built from
    #[error("{path}: cannot convert {found} to {expected}")]
    TypeMismatch {
        /// Location in the tree
        path: String,
        /// The shape the target accepts
        expected: &'static str,
        /// The shape that was found
        found: &'static str,
    },

    /// A textual node could not be parsed into the target
    #[error("{path}: {message}")]
    InvalidValue {
        /// Location in the tree
        path: String,
        /// What went wrong
        message: String,
    },

    /// An inline field's type is not a record
    #[error("{0} cannot be inlined")]
    NotInlinable(&'static str),
}

impl Error {
    /// Whether this is an overflow failure
    pub fn is_overflow(&self) -> bool {
        matches!(self, Error::Overflow { .. })
    }
}

/// A dotted path through the tree, used to label diagnostics.
#[derive(Debug, Default, Clone)]
struct FieldPath(Vec<String>);

impl FieldPath {
    fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            if segment.starts_with('[') || out.is_empty() {
                out.push_str(segment);
            } else {
                out.push('.');
                out.push_str(segment);
            }
        }
        out
    }
}

/// State carried through a record → tree projection.
#[derive(Debug, Default)]
pub struct ToValue {
    path: FieldPath,
}

impl ToValue {
    /// Run `f` with `segment` pushed onto the current path.
    pub fn nested<R>(&mut self, segment: impl Into<String>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.0.push(segment.into());
        let out = f(self);
        self.path.0.pop();
        out
    }

    /// The current location in the tree
    pub fn path(&self) -> String {
        self.path.render()
    }

    /// Build an overflow error at the current location
    pub fn overflow(&self, value: impl ToString, target: &'static str) -> Error {
        Error::Overflow {
            path: self.path(),
            value: value.to_string(),
            target,
        }
    }
}

/// State carried through a tree → record projection.
///
/// In strict mode, mapping keys that no field claims are collected as
/// unknown-field diagnostics instead of being dropped silently.
#[derive(Debug, Default)]
pub struct FromValue {
    path: FieldPath,
    strict: bool,
    unknown: Vec<String>,
}

impl FromValue {
    /// A context that reports unknown fields
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Whether unknown fields are being collected
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Run `f` with `segment` pushed onto the current path.
    pub fn nested<R>(&mut self, segment: impl Into<String>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.0.push(segment.into());
        let out = f(self);
        self.path.0.pop();
        out
    }

    /// The current location in the tree
    pub fn path(&self) -> String {
        self.path.render()
    }

    /// Unknown field paths collected so far
    pub fn unknown_fields(&self) -> &[String] {
        &self.unknown
    }

    /// Take the collected unknown field paths
    pub fn take_unknown_fields(&mut self) -> Vec<String> {
        std::mem::take(&mut self.unknown)
    }

    /// Build a shape mismatch error at the current location
    pub fn mismatch(&self, expected: &'static str, found: &Value) -> Error {
        Error::TypeMismatch {
            path: self.path(),
            expected,
            found: found.kind_name(),
        }
    }

    /// Build an overflow error at the current location
    pub fn overflow(&self, value: impl ToString, target: &'static str) -> Error {
        Error::Overflow {
            path: self.path(),
            value: value.to_string(),
            target,
        }
    }

    /// Build an invalid value error at the current location
    pub fn invalid(&self, message: impl ToString) -> Error {
        Error::InvalidValue {
            path: self.path(),
            message: message.to_string(),
        }
    }

    /// Record every key of `map` not claimed in `matched` as unknown.
    pub fn check_unknown(&mut self, map: &Map, matched: &Matched) {
        if !self.strict {
            return;
        }
        for key in map.keys() {
            if !matched.contains(key) {
                let path = self.nested(key.clone(), |ctx| ctx.path());
                self.unknown.push(path);
            }
        }
    }
}

/// Keys of a source mapping that some field has claimed.
///
/// Inline fields share their parent's tracker.
#[derive(Debug, Default)]
pub struct Matched(BTreeSet<Arc<str>>);

impl Matched {
    /// Mark `key` as claimed
    pub fn insert(&mut self, key: Arc<str>) {
        self.0.insert(key);
    }

    /// Whether `key` has been claimed
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

/// A value that can be projected to and from the unstructured tree.
pub trait Reflect: Default + Clone + Send + Sync + 'static {
    /// Project into a tree node.
    fn to_value(&self, ctx: &mut ToValue) -> Result<Value, Error>;

    /// Build from a tree node.
    ///
    /// `null` always produces the zero value.
    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error>;

    /// Whether `omitempty` drops this value.
    ///
    /// Empty sequences, mappings, strings and zero scalars are empty; records are not.
    fn is_zero(&self) -> bool;

    /// Whether the value is a nil pointer, dropped regardless of `omitempty`.
    fn is_nil(&self) -> bool {
        false
    }

    /// Structural equality, consulting `eq` for custom comparisons of nested values.
    fn deep_equal(&self, other: &Self, eq: &Equalities) -> bool;

    /// Write this record's fields into a parent mapping.
    fn write_inline(&self, _out: &mut Map, _ctx: &mut ToValue) -> Result<(), Error> {
        Err(Error::NotInlinable(std::any::type_name::<Self>()))
    }

    /// Read this record's fields from a parent mapping, sharing its tracker.
    fn read_inline(&mut self, _map: &Map, _matched: &mut Matched, _ctx: &mut FromValue) -> Result<(), Error> {
        Err(Error::NotInlinable(std::any::type_name::<Self>()))
    }
}

/// Static description of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// The Rust identifier of the field
    pub ident: &'static str,
    /// An explicit serialization name; `"-"` skips the field and `""` inlines it
    pub rename: Option<&'static str>,
    /// Drop the field when its value is empty
    pub omit_empty: bool,
    /// Hoist the field's own fields into the parent mapping
    pub inline: bool,
}

/// Static description of a record.
#[derive(Debug)]
pub struct RecordLayout {
    /// Name of the record type
    pub name: &'static str,
    /// Described fields, in declaration order
    pub fields: &'static [FieldDescriptor],
}

/// A record with a derived field layout.
pub trait Record: Reflect {
    /// The static layout descriptor of this record
    fn layout() -> &'static RecordLayout;
}

/// Build a record from a tree node: `null` is the zero record, a mapping is walked.
pub fn read_record<R: Record>(value: &Value, ctx: &mut FromValue) -> Result<R, Error> {
    match value {
        Value::Null => Ok(R::default()),
        Value::Object(map) => read_record_map(map, ctx),
        other => Err(ctx.mismatch("object", other)),
    }
}

/// Build a record from a mapping, reporting unclaimed keys in strict mode.
pub fn read_record_map<R: Record>(map: &Map, ctx: &mut FromValue) -> Result<R, Error> {
    let mut out = R::default();
    let mut matched = Matched::default();
    out.read_inline(map, &mut matched, ctx)?;
    ctx.check_unknown(map, &matched);
    Ok(out)
}

/// Project a record into a mapping.
pub fn write_record<R: Reflect>(record: &R, ctx: &mut ToValue) -> Result<Map, Error> {
    let mut out = Map::new();
    record.write_inline(&mut out, ctx)?;
    Ok(out)
}

/// Write field `index` of record `R` into `out`.
pub fn write_field<R: Record, T: Reflect>(
    out: &mut Map,
    index: usize,
    value: &T,
    ctx: &mut ToValue,
) -> Result<(), Error> {
    let info = field_info::<R>(index);
    if info.skip {
        return Ok(());
    }
    if info.inline {
        return value.write_inline(out, ctx);
    }
    if value.is_nil() || (info.omit_empty && value.is_zero()) {
        return Ok(());
    }
    let node = ctx.nested(&*info.name, |ctx| value.to_value(ctx))?;
    out.insert(info.name.to_string(), node);
    Ok(())
}

/// Read field `index` of record `R` from `map` into `slot`.
pub fn read_field<R: Record, T: Reflect>(
    map: &Map,
    matched: &mut Matched,
    index: usize,
    slot: &mut T,
    ctx: &mut FromValue,
) -> Result<(), Error> {
    let info = field_info::<R>(index);
    if info.skip {
        return Ok(());
    }
    if info.inline {
        return slot.read_inline(map, matched, ctx);
    }
    if let Some(node) = map.get(&*info.name) {
        matched.insert(info.name.clone());
        *slot = ctx.nested(&*info.name, |ctx| T::from_value(node, ctx))?;
    }
    Ok(())
}

/// Project any reflected value into a tree node.
pub fn to_value<T: Reflect>(value: &T) -> Result<Value, Error> {
    value.to_value(&mut ToValue::default())
}

/// Build any reflected value from a tree node, ignoring unknown fields.
pub fn from_value<T: Reflect>(value: &Value) -> Result<T, Error> {
    T::from_value(value, &mut FromValue::default())
}

/// Build any reflected value from a tree node, returning unknown field paths.
pub fn from_value_strict<T: Reflect>(value: &Value) -> Result<(T, Vec<String>), Error> {
    let mut ctx = FromValue::strict();
    let out = T::from_value(value, &mut ctx)?;
    Ok((out, ctx.take_unknown_fields()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{equality::Equalities, Reflect};
    use std::collections::BTreeMap;

    #[derive(Reflect, Debug, Clone, Default, PartialEq)]
    #[reflect(crates(core = "crate"))]
    struct Inner {
        #[reflect(omitempty)]
        label: String,
        count: u32,
    }

    #[derive(Reflect, Debug, Clone, Default, PartialEq)]
    #[reflect(crates(core = "crate"))]
    struct Outer {
        #[reflect(inline)]
        inner: Inner,
        #[reflect(rename = "displayName")]
        title: String,
        #[reflect(omitempty)]
        tags: Vec<String>,
        #[reflect(rename = "-")]
        hidden: String,
        pointer: Option<i64>,
        nested: Inner,
        data: BTreeMap<String, String>,
    }

    #[test]
    fn projects_records_to_trees() {
        let outer = Outer {
            inner: Inner { label: "".into(), count: 2 },
            title: "t".into(),
            hidden: "secret".into(),
            nested: Inner { label: "n".into(), count: 0 },
            ..Outer::default()
        };
        let tree = to_value(&outer).unwrap();
        let map = tree.as_object().unwrap();
        assert_eq!(map.get("count"), Some(&Value::Int(2)));
        assert!(!map.contains_key("label"));
        assert_eq!(map.get("displayName"), Some(&Value::from("t")));
        assert!(!map.contains_key("tags"));
        assert!(!map.contains_key("hidden"));
        assert!(!map.contains_key("pointer"));
        assert_eq!(tree.pointer(&["nested", "label"]), Some(&Value::from("n")));
        assert_eq!(map.get("data"), Some(&Value::Object(Map::new())));
    }

    #[test]
    fn tree_round_trip_preserves_records() {
        let outer = Outer {
            inner: Inner { label: "l".into(), count: 7 },
            title: "t".into(),
            tags: vec!["a".into(), "b".into()],
            pointer: Some(-4),
            data: [("k".to_string(), "v".to_string())].into(),
            ..Outer::default()
        };
        let back: Outer = from_value(&to_value(&outer).unwrap()).unwrap();
        assert_eq!(back, outer);
        assert!(Equalities::new().deep_equal(&back, &outer));
    }

    #[test]
    fn strict_reads_report_unknown_fields_including_inline_parents() {
        let tree: Value = serde_json::from_str(
            r#"{"label":"x","count":1,"bogus":true,"nested":{"count":2,"extra":1},"displayName":"d"}"#,
        )
        .unwrap();
        let (outer, unknown) = from_value_strict::<Outer>(&tree).unwrap();
        assert_eq!(outer.inner.label, "x");
        assert_eq!(outer.nested.count, 2);
        assert_eq!(unknown, vec!["nested.extra".to_string(), "bogus".to_string()]);

        let mut lenient = FromValue::default();
        Outer::from_value(&tree, &mut lenient).unwrap();
        assert!(lenient.unknown_fields().is_empty());
    }

    #[test]
    fn coercion_rules() {
        let tree: Value = serde_json::from_str(r#"{"count":3.0}"#).unwrap();
        assert_eq!(from_value::<Inner>(&tree).unwrap().count, 3);

        let tree: Value = serde_json::from_str(r#"{"count":3.5}"#).unwrap();
        let err = from_value::<Inner>(&tree).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref path, .. } if path == "count"));

        let tree: Value = serde_json::from_str(r#"{"count":-1}"#).unwrap();
        assert!(from_value::<Inner>(&tree).unwrap_err().is_overflow());

        let tree: Value = serde_json::from_str(r#"{"count":"1"}"#).unwrap();
        assert!(matches!(from_value::<Inner>(&tree), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn wide_unsigned_values_overflow_on_encode() {
        #[derive(Reflect, Debug, Clone, Default)]
        #[reflect(crates(core = "crate"))]
        struct Wide {
            big: u64,
        }
        let err = to_value(&Wide { big: u64::MAX }).unwrap_err();
        assert!(err.is_overflow());
        assert!(to_value(&Wide { big: 5 }).is_ok());
    }
}
