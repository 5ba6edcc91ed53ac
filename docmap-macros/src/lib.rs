//! Procedural macros for the docmap project.
//!
//! This crate provides `#[derive(Record)]`, which implements `docmap::record::Record` from
//! field markers instead of runtime reflection:
//!
//! - `#[record(id)]` - the identifier field; must be an `ObjectId` serialized as `_id`
//! - `#[record(slug)]` - the optional slug field; must be a `String`
//! - `#[record(inline)]` - an embedded record (also `#[serde(flatten)]`) whose roles this
//!   record delegates to
//!
//! Misplaced or conflicting markers are reported at compile time.

#[allow(unused_extern_crates)]
extern crate self as docmap_macros;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, Field, Fields, Ident, LitStr, Token, Type, meta::ParseNestedMeta,
    parenthesized, parse_macro_input, spanned::Spanned,
};

const ID_FIELD: &str = "_id";

/// Derives `docmap::record::Record` for a struct with named fields.
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize, Record)]
/// pub struct HelloWorld {
///     #[record(id)]
///     #[serde(rename = "_id")]
///     pub id: ObjectId,
///     #[record(slug)]
///     pub name: String,
///     pub value: String,
/// }
///
/// #[derive(Debug, Clone, Serialize, Deserialize, Record)]
/// pub struct Hello {
///     #[record(inline)]
///     #[serde(flatten)]
///     pub world: HelloWorld,
///     pub greeting: String,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Id,
    Slug,
    Inline,
}

/// What the markers and serde attributes say about one field.
#[derive(Debug, Default)]
struct FieldAttrs {
    roles: Vec<(Role, Span)>,
    rename: Option<String>,
    flatten: bool,
}

struct RoleField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    attrs: FieldAttrs,
    span: Span,
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new(
                    input.ident.span(),
                    "Record can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.ident.span(),
                "Record can only be derived for structs",
            ))
        }
    };

    let rename_all = container_rename_all(&input)?;

    let mut id: Option<RoleField> = None;
    let mut slug: Option<RoleField> = None;
    let mut inline: Option<RoleField> = None;

    for field in fields {
        let attrs = field_attrs(field)?;

        for (role, span) in attrs.roles.clone() {
            let slot = match role {
                Role::Id => &mut id,
                Role::Slug => &mut slug,
                Role::Inline => &mut inline,
            };

            if slot.is_some() {
                return Err(syn::Error::new(span, match role {
                    Role::Id => "more than one field is marked #[record(id)]",
                    Role::Slug => "more than one field is marked #[record(slug)]",
                    Role::Inline => "more than one field is marked #[record(inline)]",
                }));
            }

            *slot = Some(RoleField {
                ident: field.ident.as_ref().ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?,
                ty: &field.ty,
                attrs: FieldAttrs {
                    roles: Vec::new(),
                    rename: attrs.rename.clone(),
                    flatten: attrs.flatten,
                },
                span,
            });
        }
    }

    if let (Some(id), Some(_)) = (&id, &inline) {
        return Err(syn::Error::new(
            id.span,
            "a record takes its identifier from either #[record(id)] or #[record(inline)], not both",
        ));
    }

    if let Some(id) = &id {
        if id.attrs.rename.as_deref() != Some(ID_FIELD) {
            return Err(syn::Error::new(
                id.span,
                "the identifier field must be serialized as `_id`; add #[serde(rename = \"_id\")]",
            ));
        }
    }

    if let Some(inline) = &inline {
        if !inline.attrs.flatten {
            return Err(syn::Error::new(
                inline.span,
                "an inline record must be embedded with #[serde(flatten)]",
            ));
        }
    }

    let slug_name = match &slug {
        Some(slug) => match (&slug.attrs.rename, rename_all) {
            (Some(name), _) => Some(name.clone()),
            (None, true) => {
                return Err(syn::Error::new(
                    slug.span,
                    "the slug field of a struct with #[serde(rename_all)] needs an explicit #[serde(rename = \"...\")]",
                ))
            }
            (None, false) => Some(slug.ident.to_string()),
        },
        None => None,
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (identifier, identifier_mut) = match (&id, &inline) {
        (Some(id), _) => {
            let ident = id.ident;
            (quote! { &self.#ident }, quote! { &mut self.#ident })
        }
        (None, Some(inline)) => {
            let ident = inline.ident;
            let ty = inline.ty;
            (
                quote! { <#ty as ::docmap::record::Record>::identifier(&self.#ident) },
                quote! { <#ty as ::docmap::record::Record>::identifier_mut(&mut self.#ident) },
            )
        }
        (None, None) => {
            return Err(syn::Error::new(
                Span::call_site(),
                "No ID field found! mark one with #[record(id)] or embed a record with #[record(inline)]",
            ))
        }
    };

    // An inline member's slug must not compete with a direct one.
    let mut slug_check = TokenStream2::new();

    let slug_field = match (slug_name, &inline) {
        (Some(field_name), Some(inline)) => {
            let ty = inline.ty;
            let assertion = quote! {
                assert!(
                    <#ty as ::docmap::record::Record>::SLUG_FIELD.is_none(),
                    "more than one slug field after inline flattening",
                );
            };

            if input.generics.params.is_empty() {
                slug_check = quote! { const _: () = { #assertion }; };
            }

            quote! {{
                #assertion
                ::core::option::Option::Some(#field_name)
            }}
        }
        (Some(field_name), None) => quote! { ::core::option::Option::Some(#field_name) },
        (None, Some(inline)) => {
            let ty = inline.ty;
            quote! { <#ty as ::docmap::record::Record>::SLUG_FIELD }
        }
        (None, None) => quote! { ::core::option::Option::None },
    };

    Ok(quote! {
        #slug_check

        impl #impl_generics ::docmap::record::Record for #name #ty_generics #where_clause {
            const SLUG_FIELD: ::core::option::Option<&'static str> = #slug_field;

            fn identifier(&self) -> &::docmap::identifier::ObjectId {
                #identifier
            }

            fn identifier_mut(&mut self) -> &mut ::docmap::identifier::ObjectId {
                #identifier_mut
            }
        }
    })
}

/// Returns `true` if the struct carries a container level `#[serde(rename_all = ...)]`.
fn container_rename_all(input: &DeriveInput) -> syn::Result<bool> {
    let mut found = false;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                found = true;
            }
            skip_meta_value(&meta)
        })?;
    }

    Ok(found)
}

fn field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();

    for attr in &field.attrs {
        if attr.path().is_ident("record") {
            attr.parse_nested_meta(|meta| {
                let role = if meta.path.is_ident("id") {
                    Role::Id
                } else if meta.path.is_ident("slug") {
                    Role::Slug
                } else if meta.path.is_ident("inline") {
                    Role::Inline
                } else {
                    return Err(meta.error("unknown record marker; expected `id`, `slug` or `inline`"));
                };

                attrs.roles.push((role, meta.path.span()));
                Ok(())
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    attrs.rename = parse_rename(&meta)?;
                    Ok(())
                } else if meta.path.is_ident("flatten") {
                    attrs.flatten = true;
                    Ok(())
                } else {
                    skip_meta_value(&meta)
                }
            })?;
        }
    }

    let has = |role| attrs.roles.iter().any(|(r, _)| *r == role);
    if has(Role::Inline) && (has(Role::Id) || has(Role::Slug)) {
        let span = attrs.roles[0].1;
        return Err(syn::Error::new(span, "an inline field cannot also be an id or slug field"));
    }

    Ok(attrs)
}

/// Reads `rename = "x"` or the serialize half of `rename(serialize = "x", ...)`.
fn parse_rename(meta: &ParseNestedMeta) -> syn::Result<Option<String>> {
    if meta.input.peek(Token![=]) {
        let name: LitStr = meta.value()?.parse()?;
        return Ok(Some(name.value()));
    }

    let mut name = None;
    meta.parse_nested_meta(|nested| {
        let value: LitStr = nested.value()?.parse()?;
        if nested.path.is_ident("serialize") {
            name = Some(value.value());
        }
        Ok(())
    })?;

    Ok(name)
}

/// Consumes the value of a serde option this macro does not care about.
fn skip_meta_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        parenthesized!(content in meta.input);
        content.parse::<TokenStream2>()?;
    }

    Ok(())
}
