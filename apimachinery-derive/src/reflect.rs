use darling::{ast, FromDeriveInput, FromField, FromMeta, FromVariant};
use proc_macro2::{Span, TokenStream};
use syn::{parse_quote, DeriveInput, Generics, Ident, LitStr, Path, Type};

#[derive(FromDeriveInput)]
#[darling(attributes(reflect), supports(struct_named, enum_unit))]
struct ReflectInput {
    ident: Ident,
    generics: Generics,
    data: ast::Data<Variant, Field>,
    #[darling(default)]
    crates: Crates,
    /// Implement `Object` as well
    #[darling(default)]
    object: bool,
}

#[derive(FromField)]
#[darling(attributes(reflect))]
struct Field {
    ident: Option<Ident>,
    ty: Type,
    rename: Option<String>,
    #[darling(default)]
    omitempty: bool,
    #[darling(default)]
    inline: bool,
    #[darling(default)]
    skip: bool,
}

#[derive(FromVariant)]
#[darling(attributes(reflect))]
struct Variant {
    ident: Ident,
    rename: Option<String>,
}

#[derive(Debug, FromMeta)]
struct Crates {
    #[darling(default = "Self::default_core")]
    core: Path,
}

// Default is required when the subattribute isn't mentioned at all
// Delegate to darling rather than deriving, so that we can piggyback off the `#[darling(default)]` clauses
impl Default for Crates {
    fn default() -> Self {
        Self::from_list(&[]).unwrap()
    }
}

impl Crates {
    fn default_core() -> Path {
        parse_quote! { ::apimachinery::core } // by default must work well with people using facade crate
    }
}

pub(crate) fn derive(input: TokenStream) -> TokenStream {
    let ast: DeriveInput = match syn::parse2(input) {
        Err(err) => return err.to_compile_error(),
        Ok(di) => di,
    };
    let input = match ReflectInput::from_derive_input(&ast) {
        Err(err) => return err.write_errors(),
        Ok(input) => input,
    };

    match &input.data {
        ast::Data::Struct(fields) => derive_record(&input, &fields.fields),
        ast::Data::Enum(variants) => {
            if input.object {
                return syn::Error::new(input.ident.span(), "`object` is only supported on structs")
                    .to_compile_error();
            }
            derive_enum(&input, variants)
        }
    }
}

/// The type's generics with a `Reflect` bound on every type parameter
fn bounded_generics(input: &ReflectInput) -> Generics {
    let core = &input.crates.core;
    let mut generics = input.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(parse_quote!(#core::reflect::Reflect));
    }
    generics
}

fn last_segment_is(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(path) => path.path.segments.last().is_some_and(|s| s.ident == name),
        _ => false,
    }
}

fn derive_record(input: &ReflectInput, fields: &[Field]) -> TokenStream {
    let core = &input.crates.core;
    let ident = &input.ident;
    let name = LitStr::new(&ident.to_string(), ident.span());
    let generics = bounded_generics(input);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let described = fields.iter().filter(|f| !f.skip).collect::<Vec<_>>();
    let mut descriptors = Vec::with_capacity(described.len());
    let mut writes = Vec::with_capacity(described.len());
    let mut reads = Vec::with_capacity(described.len());
    let mut comparisons = Vec::with_capacity(described.len());
    for (index, field) in described.iter().enumerate() {
        let Some(field_ident) = &field.ident else {
            continue;
        };
        let ident_text = LitStr::new(&field_ident.to_string(), field_ident.span());
        let rename = match &field.rename {
            Some(rename) => quote! { ::std::option::Option::Some(#rename) },
            None => quote! { ::std::option::Option::None },
        };
        let omit_empty = field.omitempty;
        let inline = field.inline;
        descriptors.push(quote! {
            #core::reflect::FieldDescriptor {
                ident: #ident_text,
                rename: #rename,
                omit_empty: #omit_empty,
                inline: #inline,
            }
        });
        writes.push(quote! {
            #core::reflect::write_field::<Self, _>(out, #index, &self.#field_ident, ctx)?;
        });
        reads.push(quote! {
            #core::reflect::read_field::<Self, _>(map, matched, #index, &mut self.#field_ident, ctx)?;
        });
        comparisons.push(quote! {
            && eq.deep_equal(&self.#field_ident, &other.#field_ident)
        });
    }

    let object_impl = if input.object {
        match object_impl(input, fields) {
            Ok(tokens) => tokens,
            Err(err) => return err.to_compile_error(),
        }
    } else {
        TokenStream::new()
    };

    quote! {
        #[automatically_derived]
        impl #impl_generics #core::reflect::Reflect for #ident #ty_generics #where_clause {
            fn to_value(
                &self,
                ctx: &mut #core::reflect::ToValue,
            ) -> ::std::result::Result<#core::value::Value, #core::reflect::Error> {
                #core::reflect::write_record(self, ctx).map(#core::value::Value::Object)
            }

            fn from_value(
                value: &#core::value::Value,
                ctx: &mut #core::reflect::FromValue,
            ) -> ::std::result::Result<Self, #core::reflect::Error> {
                #core::reflect::read_record::<Self>(value, ctx)
            }

            fn is_zero(&self) -> bool {
                false
            }

            fn deep_equal(&self, other: &Self, eq: &#core::equality::Equalities) -> bool {
                true #(#comparisons)*
            }

            fn write_inline(
                &self,
                out: &mut #core::value::Map,
                ctx: &mut #core::reflect::ToValue,
            ) -> ::std::result::Result<(), #core::reflect::Error> {
                #(#writes)*
                ::std::result::Result::Ok(())
            }

            fn read_inline(
                &mut self,
                map: &#core::value::Map,
                matched: &mut #core::reflect::Matched,
                ctx: &mut #core::reflect::FromValue,
            ) -> ::std::result::Result<(), #core::reflect::Error> {
                #(#reads)*
                ::std::result::Result::Ok(())
            }
        }

        #[automatically_derived]
        impl #impl_generics #core::reflect::Record for #ident #ty_generics #where_clause {
            fn layout() -> &'static #core::reflect::RecordLayout {
                static LAYOUT: #core::reflect::RecordLayout = #core::reflect::RecordLayout {
                    name: #name,
                    fields: &[#(#descriptors),*],
                };
                &LAYOUT
            }
        }

        #object_impl
    }
}

fn object_impl(input: &ReflectInput, fields: &[Field]) -> syn::Result<TokenStream> {
    let core = &input.crates.core;
    let ident = &input.ident;
    let generics = bounded_generics(input);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let types = fields
        .iter()
        .find(|f| last_segment_is(&f.ty, "TypeMeta"))
        .and_then(|f| f.ident.as_ref())
        .ok_or_else(|| {
            syn::Error::new(
                ident.span(),
                "#[reflect(object)] requires a field of type `TypeMeta`",
            )
        })?;

    let metadata = fields.iter().find(|f| {
        f.ident.as_ref().is_some_and(|i| i == "metadata") && last_segment_is(&f.ty, "ObjectMeta")
    });
    let meta_accessors = match metadata {
        Some(_) => quote! {
            fn meta(&self) -> ::std::option::Option<&#core::metadata::ObjectMeta> {
                ::std::option::Option::Some(&self.metadata)
            }

            fn meta_mut(&mut self) -> ::std::option::Option<&mut #core::metadata::ObjectMeta> {
                ::std::option::Option::Some(&mut self.metadata)
            }
        },
        None => TokenStream::new(),
    };

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics #core::object::Object for #ident #ty_generics #where_clause {
            fn group_version_kind(&self) -> #core::gvk::GroupVersionKind {
                #core::object::ObjectKind::group_version_kind(&self.#types)
            }

            fn set_group_version_kind(&mut self, gvk: &#core::gvk::GroupVersionKind) {
                #core::object::ObjectKind::set_group_version_kind(&mut self.#types, gvk)
            }

            fn layout(&self) -> #core::object::Layout {
                #core::object::Layout::of::<Self>()
            }

            fn deep_copy_object(&self) -> ::std::boxed::Box<dyn #core::object::Object> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }

            fn to_tree(
                &self,
                ctx: &mut #core::reflect::ToValue,
            ) -> ::std::result::Result<#core::value::Map, #core::reflect::Error> {
                #core::reflect::write_record(self, ctx)
            }

            fn fill_from_tree(
                &mut self,
                map: &#core::value::Map,
                ctx: &mut #core::reflect::FromValue,
            ) -> ::std::result::Result<(), #core::reflect::Error> {
                *self = #core::reflect::read_record_map::<Self>(map, ctx)?;
                ::std::result::Result::Ok(())
            }

            fn deep_equal_object(
                &self,
                other: &dyn #core::object::Object,
                eq: &#core::equality::Equalities,
            ) -> bool {
                match other.as_any().downcast_ref::<Self>() {
                    ::std::option::Option::Some(other) => eq.deep_equal(self, other),
                    ::std::option::Option::None => false,
                }
            }

            #meta_accessors

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
        }
    })
}

fn derive_enum(input: &ReflectInput, variants: &[Variant]) -> TokenStream {
    let core = &input.crates.core;
    let ident = &input.ident;
    let generics = bounded_generics(input);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let names = variants
        .iter()
        .map(|v| {
            let text = v.rename.clone().unwrap_or_else(|| v.ident.to_string());
            LitStr::new(&text, Span::call_site())
        })
        .collect::<Vec<_>>();
    let idents = variants.iter().map(|v| &v.ident).collect::<Vec<_>>();
    let expected = LitStr::new(
        &format!(
            "one of {}",
            names.iter().map(|n| format!("{:?}", n.value())).collect::<Vec<_>>().join(", ")
        ),
        Span::call_site(),
    );

    quote! {
        #[automatically_derived]
        impl #impl_generics #core::reflect::Reflect for #ident #ty_generics #where_clause {
            fn to_value(
                &self,
                _ctx: &mut #core::reflect::ToValue,
            ) -> ::std::result::Result<#core::value::Value, #core::reflect::Error> {
                let text = match self {
                    #(#ident::#idents => #names,)*
                };
                ::std::result::Result::Ok(#core::value::Value::String(::std::string::ToString::to_string(text)))
            }

            fn from_value(
                value: &#core::value::Value,
                ctx: &mut #core::reflect::FromValue,
            ) -> ::std::result::Result<Self, #core::reflect::Error> {
                match value {
                    #core::value::Value::Null => ::std::result::Result::Ok(::std::default::Default::default()),
                    #core::value::Value::String(text) => match text.as_str() {
                        #(#names => ::std::result::Result::Ok(#ident::#idents),)*
                        other => ::std::result::Result::Err(
                            ctx.invalid(::std::format!("unknown variant {:?}, expected {}", other, #expected)),
                        ),
                    },
                    other => ::std::result::Result::Err(ctx.mismatch("string", other)),
                }
            }

            fn is_zero(&self) -> bool {
                false
            }

            fn deep_equal(&self, other: &Self, _eq: &#core::equality::Equalities) -> bool {
                ::std::mem::discriminant(self) == ::std::mem::discriminant(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_emit_layouts_for_described_fields() {
        let input = quote! {
            #[reflect(crates(core = "crate"))]
            struct Foo {
                #[reflect(omitempty)]
                name: String,
                #[reflect(skip)]
                scratch: u8,
                #[reflect(rename = "displayName")]
                title: String,
            }
        };
        let output = derive(input).to_string();
        assert!(output.contains("impl crate :: reflect :: Reflect for Foo"));
        assert!(output.contains("ident : \"name\""));
        assert!(output.contains("ident : \"title\""));
        assert!(!output.contains("ident : \"scratch\""));
        assert!(output.contains("1usize"));
        assert!(output.contains("self . title"));
        assert!(!output.contains("Object for Foo"));
    }

    #[test]
    fn objects_need_type_meta() {
        let input = quote! {
            #[reflect(object)]
            struct Foo {
                metadata: ObjectMeta,
            }
        };
        let output = derive(input).to_string();
        assert!(output.contains("compile_error"));
        assert!(output.contains("TypeMeta"));

        let input = quote! {
            #[reflect(object)]
            struct Foo {
                #[reflect(inline)]
                types: TypeMeta,
                metadata: ObjectMeta,
            }
        };
        let output = derive(input).to_string();
        assert!(output.contains("impl :: apimachinery :: core :: object :: Object for Foo"));
        assert!(output.contains("fn meta"));
    }

    #[test]
    fn unit_enums_use_variant_names() {
        let input = quote! {
            enum Phase {
                Pending,
                #[reflect(rename = "RUNNING")]
                Running,
            }
        };
        let output = derive(input).to_string();
        assert!(output.contains("\"Pending\""));
        assert!(output.contains("\"RUNNING\""));
        assert!(!output.contains("\"Running\""));
    }

    #[test]
    fn data_enums_are_rejected() {
        let input = quote! {
            enum Shape {
                Circle(f64),
            }
        };
        assert!(derive(input).to_string().contains("compile_error"));
    }
}
