//! Procedural macros for the docrepo project.
//!
//! `#[derive(Document)]` implements `docrepo::document::Document` for a struct with named
//! fields:
//!
//! - `#[document(collection = "name")]` on the struct overrides the conventional collection name
//! - `#[document(id)]` marks the key field; without it the field named `id` is used
//! - `#[document(partition_key)]` marks a `String` or `Option<String>` partition key field
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! #[document(collection = "orders")]
//! pub struct Order {
//!     #[document(id)]
//!     pub number: i64,
//!     #[document(partition_key)]
//!     pub tenant: String,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Field, Fields, GenericArgument, LitStr, PathArguments, Result, Type,
    parse_macro_input, spanned::Spanned,
};

#[proc_macro_derive(Document, attributes(document))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct FieldFlags {
    id: bool,
    partition_key: bool,
}

fn field_flags(field: &Field) -> Result<FieldFlags> {
    let mut flags = FieldFlags::default();

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("document")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                flags.id = true;
                Ok(())
            } else if meta.path.is_ident("partition_key") {
                flags.partition_key = true;
                Ok(())
            } else {
                Err(meta.error("expected `id` or `partition_key`"))
            }
        })?;
    }

    Ok(flags)
}

fn collection_override(input: &DeriveInput) -> Result<Option<LitStr>> {
    let mut collection = None;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("document")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let name: LitStr = meta.value()?.parse()?;
                if name.value().is_empty() {
                    return Err(meta.error("collection name cannot be empty"));
                }
                collection = Some(name);
                Ok(())
            } else {
                Err(meta.error("expected `collection = \"...\"`"))
            }
        })?;
    }

    Ok(collection)
}

/// `Some(inner)` when `ty` is `Option<inner>`.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };

    match arguments.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn expand(input: DeriveInput) -> Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(Error::new(input.span(), "Document can only be derived for structs"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(Error::new(input.span(), "Document needs a struct with named fields"));
    };

    let mut id_field = None;
    let mut partition_field = None;

    for field in &fields.named {
        let flags = field_flags(field)?;

        if flags.id {
            if id_field.is_some() {
                return Err(Error::new(field.span(), "only one field can be marked `id`"));
            }
            id_field = Some(field);
        }
        if flags.partition_key {
            if partition_field.is_some() {
                return Err(Error::new(field.span(), "only one field can be marked `partition_key`"));
            }
            partition_field = Some(field);
        }
    }

    let id_field = match id_field {
        Some(field) => field,
        None => fields
            .named
            .iter()
            .find(|field| field.ident.as_ref().is_some_and(|ident| ident == "id"))
            .ok_or_else(|| Error::new(input.span(), "no `id` field; mark the key field with #[document(id)]"))?,
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let id_ident = &id_field.ident;
    let id_type = &id_field.ty;

    let collection = collection_override(&input)?.map(|name| {
        quote! {
            fn collection_name_override() -> ::core::option::Option<&'static str> {
                ::core::option::Option::Some(#name)
            }
        }
    });

    let partition = partition_field.map(|field| {
        let ident = &field.ident;
        let body = if option_inner(&field.ty).is_some() {
            quote! { self.#ident.as_deref() }
        } else {
            quote! { ::core::option::Option::Some(self.#ident.as_ref()) }
        };

        quote! {
            fn partition_key(&self) -> ::core::option::Option<&str> {
                #body
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::docrepo::document::Document for #name #ty_generics #where_clause {
            type Key = #id_type;

            fn id(&self) -> &Self::Key {
                &self.#id_ident
            }

            #collection

            #partition
        }
    })
}
