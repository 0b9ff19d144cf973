//! Types for the watch api
//!
//! See <https://kubernetes.io/docs/reference/using-api/api-concepts/#efficient-detection-of-changes>
use std::fmt;

use crate::{gvk::GroupVersion, metadata::TypeMeta, object::Object, raw::RawExtension, Reflect};

/// The kind of change a watch event describes
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[reflect(crates(core = "crate"))]
pub enum EventType {
    /// Resource was added
    #[default]
    #[reflect(rename = "ADDED")]
    Added,
    /// Resource was modified
    #[reflect(rename = "MODIFIED")]
    Modified,
    /// Resource was deleted
    #[reflect(rename = "DELETED")]
    Deleted,
    /// A resource version checkpoint with otherwise empty payload
    #[reflect(rename = "BOOKMARK")]
    Bookmark,
    /// There was some kind of error; the payload is a status
    #[reflect(rename = "ERROR")]
    Error,
}

impl EventType {
    /// The wire text of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
            EventType::Bookmark => "BOOKMARK",
            EventType::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change in a watch stream, wrapping the changed object as an opaque blob
///
/// Note that a watch query returns many of these framed in the negotiated format.
#[derive(Reflect, Clone, Default, Debug)]
#[reflect(object, crates(core = "crate"))]
pub struct WatchEvent {
    /// apiVersion + kind, usually empty on the wire
    #[reflect(inline)]
    pub types: TypeMeta,

    /// What happened to the object
    #[reflect(rename = "type")]
    pub type_: EventType,

    /// The object at the time of the event
    pub object: RawExtension,
}

impl WatchEvent {
    /// An event embedding an in-memory object
    pub fn new(type_: EventType, object: Box<dyn Object>) -> Self {
        Self {
            types: TypeMeta::default(),
            type_,
            object: RawExtension::from_object(object),
        }
    }

    /// The kind watch events are registered under for a group version
    pub fn kind_in(gv: &GroupVersion) -> crate::gvk::GroupVersionKind {
        gv.with_kind("WatchEvent")
    }
}
