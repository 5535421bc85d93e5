//! Derive macros for the `totem-object` reflection registry.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::Parse;
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, parse_quote, Data, DeriveInput, Expr, ExprLit, Fields, Lit, LitStr, Path,
    UnOp,
};

/// Container-level and field-level `#[reflect(...)]` configuration.
struct ReflectConfig {
    crate_path: Path,
    display_name: Option<String>,
    value_mode: bool,
    flags_mode: bool,
}

impl ReflectConfig {
    fn from_attrs(attrs: &[syn::Attribute]) -> Result<Self, syn::Error> {
        let mut config = Self {
            crate_path: parse_quote!(::totem_object),
            display_name: None,
            value_mode: false,
            flags_mode: false,
        };

        for attr in attrs {
            if !attr.path().is_ident("reflect") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("crate") {
                    config.crate_path = meta.value()?.parse()?;
                    Ok(())
                } else if meta.path.is_ident("name") {
                    let lit: LitStr = meta.value()?.parse()?;
                    config.display_name = Some(lit.value());
                    Ok(())
                } else if meta.path.is_ident("value") {
                    config.value_mode = true;
                    Ok(())
                } else if meta.path.is_ident("flags") {
                    config.flags_mode = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported reflect attribute"))
                }
            })?;
        }

        Ok(config)
    }
}

/// Derive macro registering a type's reflected fields.
///
/// Object types embed their parent as a first field named `base` (which is
/// skipped automatically); value aggregates opt in with
/// `#[reflect(value)]`, which additionally lets the type appear as a
/// nested-struct field or sequence element.
///
/// Field attributes: `#[reflect(skip)]` leaves a field out of the
/// descriptor list; `#[reflect(tags("flag", "key=value"))]` attaches tag
/// bags.
///
/// # Example
///
/// ```ignore
/// use totem_object::{Object, ObjectType, Reflect};
///
/// #[derive(Reflect)]
/// #[repr(C)]
/// struct Monster {
///     base: Object,
///     #[reflect(tags("replicated", "max=100"))]
///     health: i32,
///     target: *mut Object,
/// }
///
/// unsafe impl ObjectType for Monster {
///     type Parent = Object;
/// }
/// ```
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let config = match ReflectConfig::from_attrs(&input.attrs) {
        Ok(config) => config,
        Err(err) => return err.into_compile_error().into(),
    };

    if !input.generics.params.is_empty() {
        return syn::Error::new(
            input.generics.span(),
            "generic types cannot be registered with the reflection system",
        )
        .into_compile_error()
        .into();
    }

    let Data::Struct(data) = &input.data else {
        return syn::Error::new(
            input.span(),
            "#[derive(Reflect)] only supports structs",
        )
        .into_compile_error()
        .into();
    };
    let Fields::Named(fields) = &data.fields else {
        return syn::Error::new(
            input.span(),
            "#[derive(Reflect)] requires named fields",
        )
        .into_compile_error()
        .into();
    };

    let ident = &input.ident;
    let crate_path = &config.crate_path;
    let name_str = config
        .display_name
        .clone()
        .unwrap_or_else(|| ident.to_string());

    let has_base = fields
        .named
        .iter()
        .any(|field| field.ident.as_ref().is_some_and(|name| name == "base"));
    if !config.value_mode && !has_base {
        return syn::Error::new(
            input.span(),
            "object types embed their parent as a first field named `base`; \
             use #[reflect(value)] for value aggregates",
        )
        .into_compile_error()
        .into();
    }

    let mut pushes = Vec::new();
    for field in &fields.named {
        let field_ident = field.ident.as_ref().expect("named field");
        if !config.value_mode && field_ident == "base" {
            continue;
        }

        let mut skip = false;
        let mut tags: Vec<LitStr> = Vec::new();
        for attr in &field.attrs {
            if !attr.path().is_ident("reflect") {
                continue;
            }
            let result = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else if meta.path.is_ident("tags") {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let entries =
                        content.parse_terminated(<LitStr as Parse>::parse, syn::Token![,])?;
                    tags.extend(entries);
                    Ok(())
                } else {
                    Err(meta.error("unsupported reflect attribute"))
                }
            });
            if let Err(err) = result {
                return err.into_compile_error().into();
            }
        }
        if skip {
            continue;
        }

        let ty = &field.ty;
        let field_name = field_ident.to_string();
        pushes.push(quote! {
            fields.push(<#ty as #crate_path::Reflected>::field(
                ::core::mem::offset_of!(#ident, #field_ident) as u32,
                #field_name,
                &[#(#tags),*],
            ));
        });
    }

    let base_assert = if config.value_mode {
        TokenStream::new()
    } else {
        quote! {
            const _: () = assert!(
                ::core::mem::offset_of!(#ident, base) == 0,
                "object types must embed their parent as the first field"
            );
        }
    };

    let reflected_impl = if config.value_mode {
        quote! {
            impl #crate_path::Reflected for #ident {
                fn field(offset: u32, name: &str, tags: &[&str]) -> #crate_path::Field {
                    #crate_path::Field::nested_struct::<Self>(offset, name, tags)
                }
            }
        }
    } else {
        TokenStream::new()
    };

    let expanded = quote! {
        #base_assert

        unsafe impl #crate_path::Reflect for #ident {
            const NAME: &'static str = #name_str;

            fn reflect_fields(fields: &mut ::std::vec::Vec<#crate_path::Field>) {
                #(#pushes)*
            }
        }

        #reflected_impl
    };

    expanded.into()
}

/// Derive macro registering an enumeration's metadata.
///
/// The enumeration must be `#[repr(i32)]` with unit variants whose
/// discriminants, when written out, are integer literals. Flag
/// enumerations declare themselves with `#[reflect(flags)]`.
///
/// # Example
///
/// ```ignore
/// use totem_object::ReflectEnum;
///
/// #[derive(ReflectEnum, Clone, Copy)]
/// #[repr(i32)]
/// enum DamageKind {
///     Blunt,
///     Piercing,
///     Fire = 10,
/// }
/// ```
#[proc_macro_derive(ReflectEnum, attributes(reflect))]
pub fn derive_reflect_enum(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let config = match ReflectConfig::from_attrs(&input.attrs) {
        Ok(config) => config,
        Err(err) => return err.into_compile_error().into(),
    };

    let Data::Enum(data) = &input.data else {
        return syn::Error::new(
            input.span(),
            "#[derive(ReflectEnum)] only supports enums",
        )
        .into_compile_error()
        .into();
    };

    let mut repr_i32 = false;
    for attr in &input.attrs {
        if attr.path().is_ident("repr") {
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("i32") {
                    repr_i32 = true;
                }
                Ok(())
            });
        }
    }
    if !repr_i32 {
        return syn::Error::new(
            input.span(),
            "reflected enums must be #[repr(i32)]",
        )
        .into_compile_error()
        .into();
    }

    let mut next_value: i32 = 0;
    let mut values = Vec::new();
    let mut names = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return syn::Error::new(
                variant.span(),
                "reflected enums only support unit variants",
            )
            .into_compile_error()
            .into();
        }

        let value = match &variant.discriminant {
            Some((_, expr)) => match discriminant_value(expr) {
                Some(value) => value,
                None => {
                    return syn::Error::new(
                        expr.span(),
                        "enumerator discriminants must be integer literals",
                    )
                    .into_compile_error()
                    .into();
                }
            },
            None => next_value,
        };
        next_value = value.wrapping_add(1);

        values.push(value);
        names.push(variant.ident.to_string());
    }

    let ident = &input.ident;
    let crate_path = &config.crate_path;
    let name_str = config
        .display_name
        .clone()
        .unwrap_or_else(|| ident.to_string());
    let is_flags = config.flags_mode;

    let expanded = quote! {
        const _: () = assert!(
            ::core::mem::size_of::<#ident>() == 4,
            "reflected enums are stored through their i32 backing value"
        );

        impl #crate_path::ReflectedEnum for #ident {
            fn enum_info() -> &'static #crate_path::EnumInfo {
                static INFO: ::std::sync::OnceLock<#crate_path::EnumInfo> =
                    ::std::sync::OnceLock::new();
                INFO.get_or_init(|| {
                    #crate_path::EnumInfo::new(
                        #name_str,
                        ::std::vec![#(#values),*],
                        ::std::vec![#(#names),*],
                        #is_flags,
                    )
                })
            }
        }

        impl #crate_path::Reflected for #ident {
            fn field(offset: u32, name: &str, tags: &[&str]) -> #crate_path::Field {
                #crate_path::Field::enumeration(
                    <Self as #crate_path::ReflectedEnum>::enum_info(),
                    offset,
                    name,
                    tags,
                )
            }
        }
    };

    expanded.into()
}

fn discriminant_value(expr: &Expr) -> Option<i32> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(int), ..
        }) => int.base10_parse().ok(),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => {
            if let Expr::Lit(ExprLit {
                lit: Lit::Int(int), ..
            }) = &*unary.expr
            {
                int.base10_parse::<i32>().ok().map(i32::wrapping_neg)
            } else {
                None
            }
        }
        _ => None,
    }
}
