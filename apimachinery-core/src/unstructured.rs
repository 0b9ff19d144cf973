//! Objects held as dynamic trees, with no registered layout.
use std::{any::Any, collections::BTreeMap};

use crate::{
    equality::Equalities,
    gvk::GroupVersionKind,
    object::{Layout, Object},
    reflect::{Error, FromValue, ToValue},
    value::{Map, Value},
};

/// An object of any kind, stored as its tree.
///
/// The identifier is read from the tree's own `apiVersion` and `kind` keys.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Unstructured {
    /// The object's fields
    pub object: Map,
}

fn gvk_of(map: &Map) -> GroupVersionKind {
    let api_version = map.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let kind = map.get("kind").and_then(Value::as_str).unwrap_or_default();
    GroupVersionKind::from_api_version_and_kind(api_version, kind)
}

fn set_gvk_of(map: &mut Map, gvk: &GroupVersionKind) {
    if gvk.is_empty() {
        map.remove("apiVersion");
        map.remove("kind");
        return;
    }
    let (api_version, kind) = gvk.to_api_version_and_kind();
    map.insert("apiVersion".into(), Value::String(api_version));
    map.insert("kind".into(), Value::String(kind));
}

/// Follow `path` through nested mappings.
pub fn nested_field<'a>(map: &'a Map, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let node = map.get(*first)?;
    if rest.is_empty() {
        return Some(node);
    }
    nested_field(node.as_object()?, rest)
}

/// Set `value` at `path`, creating or replacing intermediate mappings.
pub fn set_nested_field(map: &mut Map, value: Value, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = map;
    for key in parents {
        let slot = current.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if !matches!(slot, Value::Object(_)) {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(next) => next,
            _ => unreachable!("replaced with a mapping above"),
        };
    }
    current.insert(last.to_string(), value);
}

/// Remove the node at `path`, returning it.
pub fn remove_nested_field(map: &mut Map, path: &[&str]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut current = map;
    for key in parents {
        current = current.get_mut(*key)?.as_object_mut()?;
    }
    current.remove(*last)
}

impl Unstructured {
    /// Wrap an existing mapping
    pub fn from_map(object: Map) -> Self {
        Self { object }
    }

    /// An empty object of the given kind
    pub fn with_kind(gvk: &GroupVersionKind) -> Self {
        let mut out = Self::default();
        set_gvk_of(&mut out.object, gvk);
        out
    }

    /// The node at `path`
    pub fn nested_field(&self, path: &[&str]) -> Option<&Value> {
        nested_field(&self.object, path)
    }

    /// The text at `path`, if it is a textual node
    pub fn nested_string(&self, path: &[&str]) -> Option<&str> {
        self.nested_field(path).and_then(Value::as_str)
    }

    /// The mapping of strings at `path`; non-textual entries are skipped
    pub fn nested_string_map(&self, path: &[&str]) -> BTreeMap<String, String> {
        self.nested_field(path)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set `value` at `path`
    pub fn set_nested_field(&mut self, value: Value, path: &[&str]) {
        set_nested_field(&mut self.object, value, path)
    }

    /// Remove and return the node at `path`
    pub fn remove_nested_field(&mut self, path: &[&str]) -> Option<Value> {
        remove_nested_field(&mut self.object, path)
    }

    /// `metadata.name`
    pub fn name(&self) -> &str {
        self.nested_string(&["metadata", "name"]).unwrap_or_default()
    }

    /// Set `metadata.name`
    pub fn set_name(&mut self, name: &str) {
        self.set_nested_field(Value::from(name), &["metadata", "name"])
    }

    /// `metadata.namespace`
    pub fn namespace(&self) -> &str {
        self.nested_string(&["metadata", "namespace"]).unwrap_or_default()
    }

    /// Set `metadata.namespace`
    pub fn set_namespace(&mut self, namespace: &str) {
        self.set_nested_field(Value::from(namespace), &["metadata", "namespace"])
    }

    /// `metadata.labels`
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.nested_string_map(&["metadata", "labels"])
    }

    /// Replace `metadata.labels`
    pub fn set_labels(&mut self, labels: BTreeMap<String, String>) {
        let map = labels.into_iter().map(|(k, v)| (k, Value::String(v))).collect::<Map>();
        self.set_nested_field(Value::Object(map), &["metadata", "labels"])
    }
}

impl From<Map> for Unstructured {
    fn from(object: Map) -> Self {
        Self { object }
    }
}

macro_rules! object_plumbing {
    () => {
        fn layout(&self) -> Layout {
            Layout::of::<Self>()
        }

        fn deep_copy_object(&self) -> Box<dyn Object> {
            Box::new(self.clone())
        }

        fn is_unstructured(&self) -> bool {
            true
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
    };
}

impl Object for Unstructured {
    object_plumbing!();

    fn group_version_kind(&self) -> GroupVersionKind {
        gvk_of(&self.object)
    }

    fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
        set_gvk_of(&mut self.object, gvk)
    }

    fn to_tree(&self, _: &mut ToValue) -> Result<Map, Error> {
        Ok(self.object.clone())
    }

    fn fill_from_tree(&mut self, map: &Map, _: &mut FromValue) -> Result<(), Error> {
        self.object = map.clone();
        Ok(())
    }

    fn deep_equal_object(&self, other: &dyn Object, eq: &Equalities) -> bool {
        match other.as_any().downcast_ref::<Self>() {
            Some(other) => eq.deep_equal(&self.object, &other.object),
            None => false,
        }
    }
}

/// A list of dynamic objects; `items` is kept apart from the other fields.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct UnstructuredList {
    /// Every field except `items`
    pub object: Map,
    /// The listed objects
    pub items: Vec<Unstructured>,
}

impl Object for UnstructuredList {
    object_plumbing!();

    fn group_version_kind(&self) -> GroupVersionKind {
        gvk_of(&self.object)
    }

    fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
        set_gvk_of(&mut self.object, gvk)
    }

    fn to_tree(&self, _: &mut ToValue) -> Result<Map, Error> {
        let mut out = self.object.clone();
        let items = self.items.iter().map(|item| Value::Object(item.object.clone())).collect();
        out.insert("items".into(), Value::Array(items));
        Ok(out)
    }

    fn fill_from_tree(&mut self, map: &Map, ctx: &mut FromValue) -> Result<(), Error> {
        let mut object = map.clone();
        let items = match object.remove("items") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(Unstructured::from_map(map)),
                    other => Err(ctx.nested(format!("items[{i}]"), |ctx| ctx.mismatch("object", &other))),
                })
                .collect::<Result<_, _>>()?,
            Some(other) => return Err(ctx.nested("items", |ctx| ctx.mismatch("array", &other))),
        };
        *self = Self { object, items };
        Ok(())
    }

    fn deep_equal_object(&self, other: &dyn Object, eq: &Equalities) -> bool {
        match other.as_any().downcast_ref::<Self>() {
            Some(other) => {
                eq.deep_equal(&self.object, &other.object)
                    && self.items.len() == other.items.len()
                    && self
                        .items
                        .iter()
                        .zip(&other.items)
                        .all(|(a, b)| eq.deep_equal(&a.object, &b.object))
            }
            None => false,
        }
    }
}
