//! A crate for the apimachinery derive macros.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![recursion_limit = "1024"]
extern crate proc_macro;
#[macro_use] extern crate quote;

mod reflect;

/// A custom derive projecting records to and from the unstructured tree.
///
/// On a struct with named fields this implements `Reflect` and `Record`: every
/// field gets a static descriptor, and its serialized name, omitempty bit and
/// inline flag are resolved once at runtime by the field-info cache.
/// On an enum with only unit variants this implements `Reflect`, writing each
/// variant as its name.
///
/// # Example
///
/// ```rust
/// use apimachinery::core::{ObjectMeta, Reflect, TypeMeta};
///
/// #[derive(Reflect, Clone, Debug, Default)]
/// #[reflect(object)]
/// struct Widget {
///     #[reflect(inline)]
///     types: TypeMeta,
///     metadata: ObjectMeta,
///     #[reflect(omitempty)]
///     size: i32,
///     #[reflect(rename = "displayName")]
///     title: String,
/// }
/// ```
///
/// ## Container attributes
///
/// ### `#[reflect(object)]`
/// Also implement `Object`. The struct needs a `TypeMeta` field, which carries the
/// group/version/kind. A field named `metadata` of type `ObjectMeta` is exposed as
/// the object's standard metadata.
///
/// ### `#[reflect(crates(core = "::apimachinery_core"))]`
/// Path to the core crate. Defaults to `::apimachinery::core` for users of the facade crate.
///
/// ## Field attributes
///
/// ### `#[reflect(rename = "name")]`
/// Serialize under `name` instead of the lower camel case field name.
/// `"-"` skips the field at runtime and `""` inlines it.
///
/// ### `#[reflect(omitempty)]`
/// Leave the field out when it holds an empty value (empty strings, sequences, mappings and zero numbers).
///
/// ### `#[reflect(inline)]`
/// Hoist the fields of this record into the parent mapping.
///
/// ### `#[reflect(skip)]`
/// Leave the field out of the layout entirely. It keeps its default value when read
/// and takes no part in equality.
///
/// ## Variant attributes
///
/// ### `#[reflect(rename = "NAME")]`
/// Serialize the variant as `NAME`.
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    reflect::derive(proc_macro2::TokenStream::from(input)).into()
}
