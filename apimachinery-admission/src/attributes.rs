//! The request record handed to every admission plugin.
use std::{collections::BTreeMap, fmt};

use apimachinery_core::{GroupVersionKind, GroupVersionResource, Object};

use crate::error::{AdmissionError, Result};

/// The operation being admitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// An operation that creates a resource.
    Create,
    /// An operation that updates a resource.
    Update,
    /// An operation that deletes a resource.
    Delete,
    /// An operation that connects to a resource.
    Connect,
}

impl Operation {
    /// Every operation, in declaration order
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Connect,
    ];

    /// The wire form: `CREATE`, `UPDATE`, `DELETE` or `CONNECT`
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about the requesting user
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// The name that uniquely identifies this user among all active users.
    pub username: String,
    /// A unique value that identifies this user across time.
    pub uid: String,
    /// The names of groups this user is a part of.
    pub groups: Vec<String>,
    /// Any additional information provided by the authenticator.
    pub extra: BTreeMap<String, Vec<String>>,
}

/// Tracks repeated passes of the mutating chain over one request
#[derive(Clone, Debug, Default)]
pub struct ReinvocationContext {
    is_reinvoke: bool,
    should_reinvoke: bool,
    values: BTreeMap<String, String>,
}

impl ReinvocationContext {
    /// Whether the current pass is a reinvocation
    pub fn is_reinvoke(&self) -> bool {
        self.is_reinvoke
    }

    /// Mark the current pass as a reinvocation
    pub fn set_is_reinvoke(&mut self) {
        self.is_reinvoke = true;
    }

    /// Whether a plugin asked for another mutating pass
    pub fn should_reinvoke(&self) -> bool {
        self.should_reinvoke
    }

    /// Ask for another mutating pass after the current one
    pub fn set_should_reinvoke(&mut self) {
        self.should_reinvoke = true;
    }

    /// Plugin-private state carried between passes
    pub fn value(&self, plugin: &str) -> Option<&str> {
        self.values.get(plugin).map(String::as_str)
    }

    /// Store plugin-private state for later passes
    pub fn set_value(&mut self, plugin: &str, value: impl Into<String>) {
        self.values.insert(plugin.to_string(), value.into());
    }
}

/// Everything a plugin may inspect about a request
///
/// Mutating plugins receive the record mutably and may rewrite
/// [`object`](Attributes::object) in place.
#[derive(Clone, Debug)]
pub struct Attributes {
    /// Name of the object as presented in the request; empty on a generated-name create
    pub name: String,
    /// Namespace of the object, empty for cluster scoped objects
    pub namespace: String,
    /// The kind of the object under admission
    pub kind: GroupVersionKind,
    /// The resource being requested
    pub resource: GroupVersionResource,
    /// The subresource being requested, if any
    pub subresource: String,
    /// The operation being performed
    pub operation: Operation,
    /// Options object for the operation, such as create or delete options
    pub options: Option<Box<dyn Object>>,
    /// Modifications will not be persisted
    pub dry_run: bool,
    /// The incoming object; absent for deletes
    pub object: Option<Box<dyn Object>>,
    /// The stored object; present for updates and deletes
    pub old_object: Option<Box<dyn Object>>,
    /// The requesting user
    pub user_info: UserInfo,
    annotations: BTreeMap<String, String>,
    reinvocation: ReinvocationContext,
}

impl Attributes {
    /// Attributes for `operation` on an object of kind `kind`
    pub fn new(kind: GroupVersionKind, operation: Operation) -> Self {
        Self {
            name: String::new(),
            namespace: String::new(),
            kind,
            resource: GroupVersionResource::default(),
            subresource: String::new(),
            operation,
            options: None,
            dry_run: false,
            object: None,
            old_object: None,
            user_info: UserInfo::default(),
            annotations: BTreeMap::new(),
            reinvocation: ReinvocationContext::default(),
        }
    }

    /// Set the object name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the object namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the requested resource and subresource
    #[must_use]
    pub fn with_resource(mut self, resource: GroupVersionResource, subresource: impl Into<String>) -> Self {
        self.resource = resource;
        self.subresource = subresource.into();
        self
    }

    /// Set the incoming object
    #[must_use]
    pub fn with_object(mut self, object: Box<dyn Object>) -> Self {
        self.object = Some(object);
        self
    }

    /// Set the stored object
    #[must_use]
    pub fn with_old_object(mut self, object: Box<dyn Object>) -> Self {
        self.old_object = Some(object);
        self
    }

    /// Set the operation options
    #[must_use]
    pub fn with_options(mut self, options: Box<dyn Object>) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the requesting user
    #[must_use]
    pub fn with_user_info(mut self, user_info: UserInfo) -> Self {
        self.user_info = user_info;
        self
    }

    /// Mark the request as a dry run
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The incoming object downcast to `T`
    pub fn object_as<T: Object>(&self) -> Option<&T> {
        self.object.as_deref().and_then(|o| o.downcast_ref())
    }

    /// The incoming object downcast to `T`, mutably
    pub fn object_as_mut<T: Object>(&mut self) -> Option<&mut T> {
        self.object.as_deref_mut().and_then(|o| o.downcast_mut())
    }

    /// Record an audit annotation
    ///
    /// Setting a key twice to the same value is allowed; changing an existing
    /// value is an error.
    pub fn add_annotation(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        if key.is_empty() {
            return Err(AdmissionError::Internal("annotation key must not be empty".into()));
        }
        match self.annotations.get(key) {
            Some(existing) if *existing != value => Err(AdmissionError::Internal(format!(
                "annotation {key:?} is already set to {existing:?}, refusing to overwrite with {value:?}"
            ))),
            _ => {
                self.annotations.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    /// Audit annotations recorded so far
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// State of repeated mutating passes
    pub fn reinvocation_context(&self) -> &ReinvocationContext {
        &self.reinvocation
    }

    /// State of repeated mutating passes, mutably
    pub fn reinvocation_context_mut(&mut self) -> &mut ReinvocationContext {
        &mut self.reinvocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apimachinery_core::Unstructured;

    #[test]
    fn annotations_refuse_overwrites() {
        let mut attributes = Attributes::new(GroupVersionKind::gvk("", "v1", "Pod"), Operation::Create);
        attributes.add_annotation("quota.example.com/limited", "true").unwrap();
        attributes.add_annotation("quota.example.com/limited", "true").unwrap();
        assert!(attributes.add_annotation("quota.example.com/limited", "false").is_err());
        assert!(attributes.add_annotation("", "x").is_err());
        assert_eq!(attributes.annotations().len(), 1);
    }

    #[test]
    fn objects_downcast() {
        let mut attributes = Attributes::new(GroupVersionKind::gvk("", "v1", "Pod"), Operation::Update)
            .with_object(Box::new(Unstructured::default()));
        assert!(attributes.object_as::<Unstructured>().is_some());
        attributes.object_as_mut::<Unstructured>().unwrap().set_name("p");
        assert_eq!(attributes.object_as::<Unstructured>().unwrap().name(), "p");
        assert_eq!(Operation::Connect.to_string(), "CONNECT");
    }
}
