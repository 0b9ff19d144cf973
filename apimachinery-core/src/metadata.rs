//! Metadata records embedded in every object and list.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    gvk::GroupVersionKind,
    time::Time,
    value::Value,
    Reflect,
};

/// Type information that is inlined into every object
#[derive(Reflect, Deserialize, Serialize, Clone, Default, Debug, Eq, PartialEq, Hash)]
#[reflect(crates(core = "crate"))]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// The version of the API
    #[serde(default)]
    #[reflect(omitempty)]
    pub api_version: String,

    /// The name of the API
    #[serde(default)]
    #[reflect(omitempty)]
    pub kind: String,
}

impl TypeMeta {
    /// Type information for a kind
    pub fn new(gvk: &GroupVersionKind) -> Self {
        let (api_version, kind) = gvk.to_api_version_and_kind();
        Self { api_version, kind }
    }

    /// The identifier these fields describe
    pub fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version_and_kind(&self.api_version, &self.kind)
    }

    /// Overwrite both fields; the empty identifier clears them.
    pub fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
        if gvk.is_empty() {
            self.api_version.clear();
            self.kind.clear();
        } else {
            *self = Self::new(gvk);
        }
    }
}

/// Metadata every persisted object carries
#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(crates(core = "crate"))]
pub struct ObjectMeta {
    /// Name, unique within a namespace
    #[reflect(omitempty)]
    pub name: String,

    /// Prefix used by the server to generate a unique name
    #[reflect(omitempty)]
    pub generate_name: String,

    /// Namespace the object lives in; empty for cluster scoped objects
    #[reflect(omitempty)]
    pub namespace: String,

    /// Legacy self link
    #[reflect(omitempty)]
    pub self_link: String,

    /// Unique identifier assigned by the server
    #[reflect(omitempty)]
    pub uid: String,

    /// Opaque version used for optimistic concurrency
    #[reflect(omitempty)]
    pub resource_version: String,

    /// Sequence number of the desired state
    #[reflect(omitempty)]
    pub generation: i64,

    /// Creation time; written as `null` when unset
    #[reflect(omitempty)]
    pub creation_timestamp: Time,

    /// Time after which the object will be removed
    #[reflect(omitempty)]
    pub deletion_timestamp: Option<Time>,

    /// Grace period granted before removal
    #[reflect(omitempty)]
    pub deletion_grace_period_seconds: Option<i64>,

    /// Identifying key/value pairs
    #[reflect(omitempty)]
    pub labels: BTreeMap<String, String>,

    /// Non-identifying key/value pairs
    #[reflect(omitempty)]
    pub annotations: BTreeMap<String, String>,

    /// Objects this one depends on
    #[reflect(omitempty)]
    pub owner_references: Vec<OwnerReference>,

    /// Keys that must be cleared before deletion completes
    #[reflect(omitempty)]
    pub finalizers: Vec<String>,

    /// Field ownership bookkeeping
    #[reflect(omitempty)]
    pub managed_fields: Vec<ManagedFieldsEntry>,
}

/// A reference from a dependent to its owner
#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(crates(core = "crate"))]
pub struct OwnerReference {
    /// API version of the owner
    pub api_version: String,
    /// Kind of the owner
    pub kind: String,
    /// Name of the owner
    pub name: String,
    /// UID of the owner
    pub uid: String,
    /// Whether the owner is the managing controller
    #[reflect(omitempty)]
    pub controller: Option<bool>,
    /// Whether deletion of the owner waits for this dependent
    #[reflect(omitempty)]
    pub block_owner_deletion: Option<bool>,
}

/// One manager's claim over a set of fields
#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(crates(core = "crate"))]
pub struct ManagedFieldsEntry {
    /// Identifier of the workflow managing these fields
    #[reflect(omitempty)]
    pub manager: String,
    /// `Apply` or `Update`
    #[reflect(omitempty)]
    pub operation: String,
    /// Version the field set applies to
    #[reflect(omitempty)]
    pub api_version: String,
    /// When the entry was last touched
    #[reflect(omitempty)]
    pub time: Option<Time>,
    /// Format of `fieldsV1`
    #[reflect(omitempty)]
    pub fields_type: String,
    /// The field set itself
    #[reflect(omitempty, rename = "fieldsV1")]
    pub fields_v1: Option<Value>,
    /// Subresource the entry applies to
    #[reflect(omitempty)]
    pub subresource: String,
}

/// Metadata carried by list objects
#[derive(Reflect, Clone, Default, Debug, PartialEq, Eq)]
#[reflect(crates(core = "crate"))]
pub struct ListMeta {
    /// Legacy self link
    #[reflect(omitempty)]
    pub self_link: String,
    /// Version of the collection
    #[reflect(omitempty)]
    pub resource_version: String,
    /// Token to continue a paginated listing
    #[reflect(omitempty, rename = "continue")]
    pub continue_: String,
    /// Number of items left after this page, when known
    #[reflect(omitempty)]
    pub remaining_item_count: Option<i64>,
}
