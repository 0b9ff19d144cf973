//! The type-erased object capability shared by typed records and unstructured trees.
use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
};

use crate::{
    equality::Equalities,
    gvk::GroupVersionKind,
    metadata::{ListMeta, ObjectMeta, TypeMeta},
    raw::RawExtension,
    reflect::{Error, FromValue, ToValue},
    value::Map,
    Reflect,
};

/// Identity of an in-memory record layout.
#[derive(Clone, Copy)]
pub struct Layout {
    id: TypeId,
    name: &'static str,
}

impl Layout {
    /// The layout of `T`
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified Rust type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name without its module path or generic arguments.
    ///
    /// This is the default kind a layout registers under.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// The underlying type id
    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for Layout {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Layout {}

impl Hash for Layout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A value that can travel through schemes and codecs.
///
/// Typed records get this from `#[derive(Reflect)]` with `#[reflect(object)]`.
pub trait Object: Any + Send + Sync + fmt::Debug {
    /// The identifier stored in the object's type fields
    fn group_version_kind(&self) -> GroupVersionKind;

    /// Overwrite the object's type fields; the empty identifier clears them
    fn set_group_version_kind(&mut self, gvk: &GroupVersionKind);

    /// The in-memory layout of the object
    fn layout(&self) -> Layout;

    /// A deep copy behind a fresh box
    fn deep_copy_object(&self) -> Box<dyn Object>;

    /// Project the object into a mapping
    fn to_tree(&self, ctx: &mut ToValue) -> Result<Map, Error>;

    /// Replace the object's contents with those described by `map`
    fn fill_from_tree(&mut self, map: &Map, ctx: &mut FromValue) -> Result<(), Error>;

    /// Structural equality against another object of any type
    fn deep_equal_object(&self, other: &dyn Object, eq: &Equalities) -> bool;

    /// Whether this is a dynamic tree that declares its own identifier
    fn is_unstructured(&self) -> bool {
        false
    }

    /// Standard metadata, when the object has it
    fn meta(&self) -> Option<&ObjectMeta> {
        None
    }

    /// Standard metadata, mutably
    fn meta_mut(&mut self) -> Option<&mut ObjectMeta> {
        None
    }

    /// Upcast for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting, mutably
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Upcast an owned box
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl dyn Object {
    /// Whether the concrete type is `T`
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow as the concrete type `T`
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Borrow mutably as the concrete type `T`
    pub fn downcast_mut<T: Object>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }

    /// Convert an owned box into the concrete type `T`, handing it back on mismatch
    pub fn downcast<T: Object>(self: Box<Self>) -> Result<Box<T>, Box<dyn Object>> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.into_any().downcast::<T>() {
            Ok(typed) => Ok(typed),
            Err(_) => unreachable!("type checked above"),
        }
    }

    /// Name from standard metadata, if present
    pub fn name(&self) -> Option<&str> {
        self.meta().map(|m| m.name.as_str())
    }
}

impl Clone for Box<dyn Object> {
    fn clone(&self) -> Self {
        self.deep_copy_object()
    }
}

/// Anything that exposes type fields.
pub trait ObjectKind {
    /// The identifier these fields describe
    fn group_version_kind(&self) -> GroupVersionKind;
    /// Overwrite the identifier
    fn set_group_version_kind(&mut self, gvk: &GroupVersionKind);
}

impl ObjectKind for TypeMeta {
    fn group_version_kind(&self) -> GroupVersionKind {
        TypeMeta::group_version_kind(self)
    }

    fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
        TypeMeta::set_group_version_kind(self, gvk)
    }
}

/// A generic list whose items are pre-serialized, possibly heterogeneous objects.
#[derive(Reflect, Clone, Default, Debug)]
#[reflect(object, crates(core = "crate"))]
pub struct List {
    /// Type fields
    #[reflect(inline)]
    pub types: TypeMeta,
    /// List metadata
    #[reflect(omitempty)]
    pub metadata: ListMeta,
    /// The embedded items
    pub items: Vec<RawExtension>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unstructured::Unstructured;

    #[derive(Reflect, Clone, Default, Debug)]
    #[reflect(object, crates(core = "crate"))]
    struct Widget {
        #[reflect(inline)]
        types: TypeMeta,
        metadata: ObjectMeta,
        size: i32,
    }

    #[test]
    fn layouts_compare_by_type() {
        assert_eq!(Layout::of::<Widget>(), Layout::of::<Widget>());
        assert_ne!(Layout::of::<Widget>(), Layout::of::<List>());
        assert_eq!(Layout::of::<Widget>().short_name(), "Widget");
        assert_eq!(Layout::of::<Vec<Widget>>().short_name(), "Vec");
    }

    #[test]
    fn boxed_objects_downcast_and_copy() {
        let mut widget = Widget::default();
        widget.metadata.name = "w".into();
        widget.set_group_version_kind(&GroupVersionKind::gvk("toys", "v1", "Widget"));
        let boxed: Box<dyn Object> = Box::new(widget);
        assert_eq!(boxed.name(), Some("w"));
        let copy = boxed.clone();
        assert!(Equalities::new().deep_equal_objects(boxed.as_ref(), copy.as_ref()));
        assert_eq!(copy.group_version_kind().api_version(), "toys/v1");

        let other: Box<dyn Object> = Box::new(Unstructured::default());
        assert!(!boxed.deep_equal_object(other.as_ref(), &Equalities::new()));
        let other = other.downcast::<Widget>().unwrap_err();
        assert!(other.is_unstructured());
        assert_eq!(boxed.downcast::<Widget>().unwrap().metadata.name, "w");
    }

    #[test]
    fn objects_fill_from_trees() {
        let tree: crate::Value =
            serde_json::from_str(r#"{"apiVersion":"toys/v1","kind":"Widget","size":3}"#).unwrap();
        let mut widget = Widget::default();
        widget
            .fill_from_tree(tree.as_object().unwrap(), &mut FromValue::default())
            .unwrap();
        assert_eq!(widget.size, 3);
        assert_eq!(widget.group_version_kind(), GroupVersionKind::gvk("toys", "v1", "Widget"));
        let back = widget.to_tree(&mut ToValue::default()).unwrap();
        assert_eq!(back.get("kind"), Some(&crate::Value::from("Widget")));
    }
}
