//! Derive macro for `ferry_codec::Described`.
//!
//! The macro emits a type descriptor for structs with named fields. Field
//! behavior is controlled with `#[codec(...)]` attributes:
//!
//! - `rename = "name"` sets the wire name.
//! - `skip` leaves the field out entirely.
//! - `omit_empty` drops the field from output when its value is empty.
//! - `flatten` promotes the field's own fields into the parent record.
//!
//! Container-level `#[codec(serialize)]` and `#[codec(deserialize)]` route
//! the corresponding direction through the type's own `Serialize` or
//! `Deserialize` implementation instead of the generated structural codec.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, GenericParam, Generics, LitStr, parse_macro_input, parse_quote,
};

#[proc_macro_derive(Described, attributes(codec))]
pub fn derive_described(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Described requires named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Described can only be derived for structs",
            ));
        }
    };

    let container = ContainerAttrs::parse(&input)?;
    let name = &input.ident;
    let name_str = name.to_string();

    let mut decls = Vec::new();
    for field in fields {
        let attrs = FieldAttrs::parse(field)?;
        if attrs.skip {
            continue;
        }
        // Fields::Named guarantees an ident.
        let ident = field.ident.as_ref().unwrap();
        let ident_str = ident.to_string();
        let ty = &field.ty;
        let rename = match &attrs.rename {
            Some(lit) => quote!(::core::option::Option::Some(#lit)),
            None => quote!(::core::option::Option::None),
        };
        let omit_empty = attrs.omit_empty;
        let flatten = attrs.flatten;
        decls.push(quote! {
            ferry_codec::FieldDecl {
                name: #ident_str,
                rename: #rename,
                skip: false,
                omit_empty: #omit_empty,
                flatten: #flatten,
                exported: true,
                ty: ferry_codec::TypeRef::of::<#ty>(),
                get: |v| &ferry_codec::ops::downcast_ref::<Self>(v).#ident,
                get_mut: |v| &mut ferry_codec::ops::downcast_mut::<Self>(v).#ident,
            }
        });
    }

    let custom = container.custom_codec_fn();
    let generics = with_described_bounds(input.generics.clone());
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ferry_codec::Described for #name #ty_generics #where_clause {
            fn describe() -> ferry_codec::TypeDesc {
                ferry_codec::TypeDesc::Struct(ferry_codec::desc::StructDesc {
                    name: #name_str,
                    fields: ::std::vec![#(#decls),*],
                })
            }

            #custom
        }
    })
}

fn with_described_bounds(mut generics: Generics) -> Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(ty) = param {
            ty.bounds.push(parse_quote!(ferry_codec::Described));
        }
    }
    generics
}

#[derive(Default)]
struct ContainerAttrs {
    serialize: bool,
    deserialize: bool,
}

impl ContainerAttrs {
    fn parse(input: &DeriveInput) -> syn::Result<Self> {
        let mut attrs = Self::default();
        for attr in &input.attrs {
            if !attr.path().is_ident("codec") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("serialize") {
                    attrs.serialize = true;
                } else if meta.path.is_ident("deserialize") {
                    attrs.deserialize = true;
                } else {
                    return Err(meta.error("unknown codec container attribute"));
                }
                Ok(())
            })?;
        }
        Ok(attrs)
    }

    fn custom_codec_fn(&self) -> proc_macro2::TokenStream {
        if !self.serialize && !self.deserialize {
            return quote!();
        }
        let serialize = if self.serialize {
            quote! {
                ::core::option::Option::Some(|value, encoder| {
                    ferry_codec::Serialize::serialize(
                        ferry_codec::ops::downcast_ref::<Self>(value),
                        encoder,
                    )
                })
            }
        } else {
            quote!(::core::option::Option::None)
        };
        let deserialize = if self.deserialize {
            quote! {
                ::core::option::Option::Some(|value, decoder| {
                    ferry_codec::Deserialize::deserialize(
                        ferry_codec::ops::downcast_mut::<Self>(value),
                        decoder,
                    )
                })
            }
        } else {
            quote!(::core::option::Option::None)
        };
        quote! {
            fn custom_codec() -> ferry_codec::CustomCodec {
                ferry_codec::CustomCodec {
                    serialize: #serialize,
                    deserialize: #deserialize,
                }
            }
        }
    }
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<LitStr>,
    skip: bool,
    omit_empty: bool,
    flatten: bool,
}

impl FieldAttrs {
    fn parse(field: &syn::Field) -> syn::Result<Self> {
        let mut attrs = Self::default();
        for attr in &field.attrs {
            if !attr.path().is_ident("codec") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    attrs.rename = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("skip") {
                    attrs.skip = true;
                } else if meta.path.is_ident("omit_empty") {
                    attrs.omit_empty = true;
                } else if meta.path.is_ident("flatten") {
                    attrs.flatten = true;
                } else {
                    return Err(meta.error("unknown codec field attribute"));
                }
                Ok(())
            })?;
        }
        Ok(attrs)
    }
}
