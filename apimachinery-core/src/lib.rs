//! Types and traits shared by every layer of the typed-object runtime.
//!
//! This crate holds the identifier model, the metadata records, the
//! unstructured tree and the [`Reflect`] projection between the two, plus
//! structural equality. The same information is re-exported from
//! `apimachinery` under `apimachinery::core`.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]

extern crate self as apimachinery_core;

pub mod duration;
pub use duration::Duration;

pub mod equality;
pub use equality::Equalities;

pub mod gvk;
pub use gvk::{
    GroupKind, GroupResource, GroupVersion, GroupVersionKind, GroupVersionResource, GroupVersioner,
    INTERNAL_VERSION,
};

pub mod metadata;
pub use metadata::{ListMeta, ObjectMeta, TypeMeta};

pub mod object;
pub use object::{Layout, List, Object};

pub mod raw;
pub use raw::{RawExtension, Unknown};

pub mod reflect;
pub use reflect::{Record, Reflect};

/// Derive [`Reflect`] and [`Record`] for a record, or [`Reflect`] for a unit enum.
pub use apimachinery_derive::Reflect;

pub mod response;
pub use response::{Status, StatusReason};

pub mod time;
pub use time::{MicroTime, Time};

pub mod unstructured;
pub use unstructured::{Unstructured, UnstructuredList};

pub mod util;

pub mod value;
pub use value::{Map, Value};

pub mod watch;
pub use watch::{EventType, WatchEvent};
