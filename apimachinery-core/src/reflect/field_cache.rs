//! Memoized per-field metadata keyed by `(record type, field index)`.
//!
//! Readers load an immutable snapshot through [`ArcSwap`] and never block.
//! A miss takes the writer lock, resolves every field of the record at once,
//! and publishes a new snapshot containing the previous entries plus the new ones.
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::{FieldDescriptor, Record};

/// Resolved metadata of a single record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Serialization name, shared with mapping lookups
    pub name: Arc<str>,
    /// Drop the field when its value is empty
    pub omit_empty: bool,
    /// Hoist the field's own fields into the parent
    pub inline: bool,
    /// Never read or written
    pub skip: bool,
}

impl FieldInfo {
    fn resolve(descriptor: &FieldDescriptor) -> Self {
        let (name, skip, inline) = match descriptor.rename {
            Some("-") => (String::new(), true, false),
            Some("") => (String::new(), false, true),
            Some(name) => (name.to_string(), false, descriptor.inline),
            None if descriptor.inline => (String::new(), false, true),
            None => (lower_camel(descriptor.ident), false, false),
        };
        Self {
            name: name.into(),
            // inline fields are always traversed
            omit_empty: descriptor.omit_empty && !inline,
            inline,
            skip,
        }
    }
}

type Snapshot = HashMap<(TypeId, usize), Arc<FieldInfo>>;

struct FieldCache {
    snapshot: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

static CACHE: LazyLock<FieldCache> = LazyLock::new(|| FieldCache {
    snapshot: ArcSwap::from_pointee(Snapshot::new()),
    writer: Mutex::new(()),
});

/// Metadata for field `index` of record `R`.
///
/// # Panics
///
/// Panics if `index` is outside the record's described fields, which only
/// happens when a layout is constructed by hand inconsistently.
pub fn field_info<R: Record>(index: usize) -> Arc<FieldInfo> {
    let key = (TypeId::of::<R>(), index);
    if let Some(info) = CACHE.snapshot.load().get(&key) {
        return info.clone();
    }

    let _guard = CACHE.writer.lock();
    let current = CACHE.snapshot.load_full();
    if let Some(info) = current.get(&key) {
        return info.clone();
    }
    let layout = R::layout();
    let mut next = Snapshot::clone(&current);
    for (i, descriptor) in layout.fields.iter().enumerate() {
        next.insert((key.0, i), Arc::new(FieldInfo::resolve(descriptor)));
    }
    tracing::trace!(record = layout.name, fields = layout.fields.len(), "caching field info");
    let info = next
        .get(&key)
        .cloned()
        .unwrap_or_else(|| panic!("{} has no field at index {index}", layout.name));
    CACHE.snapshot.store(Arc::new(next));
    info
}

/// `resource_version` → `resourceVersion`; raw identifiers lose their `r#`.
fn lower_camel(ident: &str) -> String {
    let ident = ident.strip_prefix("r#").unwrap_or(ident);
    let mut out = String::with_capacity(ident.len());
    let mut upper = false;
    for c in ident.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
