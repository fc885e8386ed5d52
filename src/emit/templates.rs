//! Accessor templates.
//!
//! One `generate_*` function per emitted impl. Every dispatch `match` lists its
//! arms in ascending ordinal order.
//!
//! # Example Output
//!
//! ```rust,ignore
//! impl ::netabase_model::Model for crate::models::User {
//!     fn model_name(&self) -> &'static str { "User" }
//!     fn field_names(&self) -> &'static [&'static str] { &["id", "name", "groups"] }
//!     fn is_primary_key_zero(&self) -> bool { self.id == 0 }
//!     fn primary_key_value(&self) -> &dyn ::core::any::Any { &self.id }
//!     // ...
//! }
//!
//! impl ::netabase_model::MultiRelationer for crate::models::User {
//!     fn relation_len(&self, index: usize) -> Result<usize, ::netabase_model::ModelError> {
//!         match index {
//!             2 => Ok(::core::option::Option::Some(&self.groups).map_or(0, |items| items.len())),
//!             _ => Err(::netabase_model::ModelError::unknown_field("User", index)),
//!         }
//!     }
//!     // ...
//! }
//! ```

use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Ident, Path};

use crate::classify::{Entity, Field, Role};
use crate::config::NamingConvention;
use crate::emit::qualify::PathQualifier;
use crate::relation::Cardinality;
use crate::types::{PrimitiveKind, SliceShape, SmartPointer, TypeDescriptor, TypeKind};
use crate::zero::{AlternateType, pointer_ctor};

pub struct RenderContext<'q, 'a> {
    pub qualifier: &'q PathQualifier<'a>,
    pub contract: &'q Path,
    pub naming: NamingConvention,
}

impl RenderContext<'_, '_> {
    fn error(&self) -> TokenStream {
        let contract = self.contract;
        quote!(#contract::ModelError)
    }

    fn unknown_field(&self, name: &str) -> TokenStream {
        let error = self.error();
        quote!(#error::unknown_field(#name, index))
    }

    fn invalid_type(&self, name: &str) -> TokenStream {
        let error = self.error();
        quote!(#error::invalid_type(#name, index))
    }

    fn unsupported(&self, name: &str, operation: &str) -> TokenStream {
        let error = self.error();
        quote!(#error::unsupported(#name, index, #operation))
    }

    fn invalid_value(&self, name: &str, message: TokenStream) -> TokenStream {
        let error = self.error();
        quote!(#error::invalid_value(#name, index, #message))
    }

    fn parse_error(&self, name: &str) -> TokenStream {
        self.invalid_value(name, quote!(format!("cannot parse {:?}", value)))
    }
}

/// Every impl for one entity.
pub fn generate_entity(ctx: &RenderContext, entity: &Entity) -> TokenStream {
    let model = generate_model_impl(ctx, entity);
    let fielder = entity
        .has_attributes()
        .then(|| generate_fielder_impl(ctx, entity));
    let single = entity
        .has_single_relation()
        .then(|| generate_single_relationer_impl(ctx, entity));
    let multi = entity
        .has_multi_relation()
        .then(|| generate_multi_relationer_impl(ctx, entity));

    quote! {
        #model
        #fielder
        #single
        #multi
    }
}

/// `registered_models()` over the given entities.
pub fn generate_registry(ctx: &RenderContext, entities: &[&Entity]) -> TokenStream {
    let contract = ctx.contract;
    let models = entities.iter().map(|entity| {
        let ty = ctx.qualifier.decl_path(entity.decl);
        quote! {
            ::std::boxed::Box::new(<#ty as ::core::default::Default>::default())
                as ::std::boxed::Box<dyn #contract::Model>
        }
    });
    quote! {
        /// Default instances of every generated model.
        pub fn registered_models() -> ::std::vec::Vec<::std::boxed::Box<dyn #contract::Model>> {
            ::std::vec![#(#models),*]
        }
    }
}

fn index_lit(field: &Field) -> Literal {
    Literal::usize_unsuffixed(field.index)
}

pub fn emitted_name(naming: NamingConvention, field: &Field) -> String {
    match field.annotations.name_override() {
        Some(name) => name.to_string(),
        None => naming.apply(&field.ident.unraw().to_string()),
    }
}

fn generate_model_impl(ctx: &RenderContext, entity: &Entity) -> TokenStream {
    let contract = ctx.contract;
    let error = ctx.error();
    let ty = ctx.qualifier.decl_path(entity.decl);
    let name = entity.name.as_str();
    let names = entity.fields.iter().map(|f| emitted_name(ctx.naming, f));

    let pk = entity.primary_field();
    let ident = &pk.ident;
    let pk_index = index_lit(pk);
    let zero_check = pk
        .zero
        .as_ref()
        .map(|z| z.check.render(quote!(self.#ident)))
        .unwrap_or_else(|| quote!(false));
    let assign = assign_from_any(ctx, name, pk);
    let encode = pk
        .codec
        .as_ref()
        .map(|c| c.encode(quote!(&self.#ident)))
        .unwrap_or_else(|| quote!(::std::string::String::new()));
    let set_string = match pk
        .codec
        .as_ref()
        .and_then(|c| c.decode(quote!(value), &ctx.parse_error(name)))
    {
        Some(decoded) => quote! {
            self.#ident = #decoded;
            Ok(())
        },
        None => {
            let unsupported = ctx.unsupported(name, "set_primary_key_string");
            quote!(Err(#unsupported))
        }
    };

    quote! {
        #[allow(unused_variables, unused_parens)]
        impl #contract::Model for #ty {
            fn model_name(&self) -> &'static str {
                #name
            }

            fn field_names(&self) -> &'static [&'static str] {
                &[#(#names),*]
            }

            fn is_primary_key_zero(&self) -> bool {
                #zero_check
            }

            fn primary_key_value(&self) -> &dyn ::core::any::Any {
                &self.#ident
            }

            fn set_primary_key_value(
                &mut self,
                value: &dyn ::core::any::Any,
            ) -> ::core::result::Result<(), #error> {
                let index: usize = #pk_index;
                #assign
                Err(#error::invalid_type(#name, index))
            }

            fn primary_key_string(&self) -> ::std::string::String {
                #encode
            }

            fn set_primary_key_string(&mut self, value: &str) -> ::core::result::Result<(), #error> {
                let index: usize = #pk_index;
                #set_string
            }
        }
    }
}

fn generate_fielder_impl(ctx: &RenderContext, entity: &Entity) -> TokenStream {
    let contract = ctx.contract;
    let error = ctx.error();
    let ty = ctx.qualifier.decl_path(entity.decl);
    let name = entity.name.as_str();
    let unknown = ctx.unknown_field(name);

    let value_fields: Vec<&Field> = entity
        .fields
        .iter()
        .filter(|f| matches!(f.role, Role::Primary | Role::Attribute))
        .collect();
    let indices: Vec<Literal> = value_fields.iter().map(|f| index_lit(f)).collect();
    let idents: Vec<&Ident> = value_fields.iter().map(|f| &f.ident).collect();

    let set_arms = value_fields.iter().map(|f| {
        let index = index_lit(f);
        let assign = assign_from_any(ctx, name, f);
        let invalid = ctx.invalid_type(name);
        quote!(#index => {
            #assign
            Err(#invalid)
        })
    });
    let zero_checks = value_fields.iter().map(|f| {
        let ident = &f.ident;
        f.zero
            .as_ref()
            .map(|z| z.check.render(quote!(self.#ident)))
            .unwrap_or_else(|| quote!(false))
    });
    let zero_values = value_fields.iter().map(|f| match &f.zero {
        Some(z) => {
            let ident = &f.ident;
            let value = &z.value;
            quote!({
                self.#ident = #value;
                Ok(())
            })
        }
        None => {
            let unsupported = ctx.unsupported(name, "set_field_zero");
            quote!(Err(#unsupported))
        }
    });
    let hashables = value_fields.iter().map(|f| hashable_value(f));
    let encodes = value_fields.iter().map(|f| {
        let ident = &f.ident;
        match &f.codec {
            Some(codec) => {
                let encoded = codec.encode(quote!(&self.#ident));
                quote!(Ok(#encoded))
            }
            None => {
                let unsupported = ctx.unsupported(name, "field_string");
                quote!(Err(#unsupported))
            }
        }
    });
    let decodes = value_fields.iter().map(|f| {
        let ident = &f.ident;
        match f
            .codec
            .as_ref()
            .and_then(|c| c.decode(quote!(value), &ctx.parse_error(name)))
        {
            Some(decoded) => quote!({
                self.#ident = #decoded;
                Ok(())
            }),
            None => {
                let unsupported = ctx.unsupported(name, "set_field_string");
                quote!(Err(#unsupported))
            }
        }
    });

    quote! {
        #[allow(unused_variables, unused_parens)]
        impl #contract::Fielder for #ty {
            fn field_value(&self, index: usize) -> ::core::result::Result<&dyn ::core::any::Any, #error> {
                match index {
                    #(#indices => Ok(&self.#idents),)*
                    _ => Err(#unknown),
                }
            }

            fn set_field_value(
                &mut self,
                index: usize,
                value: &dyn ::core::any::Any,
            ) -> ::core::result::Result<(), #error> {
                match index {
                    #(#set_arms)*
                    _ => Err(#unknown),
                }
            }

            fn is_field_zero(&self, index: usize) -> ::core::result::Result<bool, #error> {
                match index {
                    #(#indices => Ok(#zero_checks),)*
                    _ => Err(#unknown),
                }
            }

            fn set_field_zero(&mut self, index: usize) -> ::core::result::Result<(), #error> {
                match index {
                    #(#indices => #zero_values,)*
                    _ => Err(#unknown),
                }
            }

            fn hashable_field_value(
                &self,
                index: usize,
            ) -> ::core::result::Result<::std::boxed::Box<dyn ::core::any::Any>, #error> {
                match index {
                    #(#indices => Ok(#hashables),)*
                    _ => Err(#unknown),
                }
            }

            fn field_string(&self, index: usize) -> ::core::result::Result<::std::string::String, #error> {
                match index {
                    #(#indices => #encodes,)*
                    _ => Err(#unknown),
                }
            }

            fn set_field_string(
                &mut self,
                index: usize,
                value: &str,
            ) -> ::core::result::Result<(), #error> {
                match index {
                    #(#indices => #decodes,)*
                    _ => Err(#unknown),
                }
            }
        }
    }
}

fn generate_single_relationer_impl(ctx: &RenderContext, entity: &Entity) -> TokenStream {
    let contract = ctx.contract;
    let error = ctx.error();
    let ty = ctx.qualifier.decl_path(entity.decl);
    let name = entity.name.as_str();
    let unknown = ctx.unknown_field(name);
    let receiver = format_ident!("{}", entity.receiver);

    let fields = relations_of(entity, Cardinality::Single);
    let get_arms = fields.iter().map(|f| {
        let index = index_lit(f);
        let ident = &f.ident;
        let view = view(&f.ty, quote!(&self.#ident));
        quote!(#index => Ok(#view.map(|model| model as &dyn ::core::any::Any)),)
    });
    let set_arms = fields.iter().map(|f| {
        let index = index_lit(f);
        let ident = &f.ident;
        let target = relation_target(ctx, f);
        let invalid = ctx.invalid_type(name);
        let value = construct(ctx.qualifier, &f.ty, quote!(*#receiver));
        quote!(#index => {
            let #receiver = model.downcast::<#target>().map_err(|_| #invalid)?;
            self.#ident = #value;
            Ok(())
        })
    });

    quote! {
        #[allow(unused_parens)]
        impl #contract::SingleRelationer for #ty {
            fn relation_model(
                &self,
                index: usize,
            ) -> ::core::result::Result<::core::option::Option<&dyn ::core::any::Any>, #error> {
                match index {
                    #(#get_arms)*
                    _ => Err(#unknown),
                }
            }

            fn set_relation_model(
                &mut self,
                index: usize,
                model: ::std::boxed::Box<dyn ::core::any::Any>,
            ) -> ::core::result::Result<(), #error> {
                match index {
                    #(#set_arms)*
                    _ => Err(#unknown),
                }
            }
        }
    }
}

fn generate_multi_relationer_impl(ctx: &RenderContext, entity: &Entity) -> TokenStream {
    let contract = ctx.contract;
    let error = ctx.error();
    let ty = ctx.qualifier.decl_path(entity.decl);
    let name = entity.name.as_str();
    let unknown = ctx.unknown_field(name);
    let receiver = format_ident!("{}", entity.receiver);
    let catalog = ctx.qualifier.catalog();

    let fields = relations_of(entity, Cardinality::Multi);
    let mut all = Vec::new();
    let mut at = Vec::new();
    let mut len = Vec::new();
    let mut add = Vec::new();
    let mut set = Vec::new();
    let mut joins = Vec::new();

    for f in &fields {
        let index = index_lit(f);
        let ident = &f.ident;
        let collection = f.ty.strip_pointers();
        let Some(elem) = collection.sequence_elem() else {
            continue;
        };
        let items = view(&f.ty, quote!(&self.#ident));
        let elem_view = view(elem, quote!(value));
        let target = relation_target(ctx, f);
        let invalid = ctx.invalid_type(name);
        let element = construct(ctx.qualifier, elem, quote!(*#receiver));

        all.push(quote!(#index => Ok(#items
            .into_iter()
            .flat_map(|items| items.iter())
            .filter_map(|value| #elem_view)
            .map(|model| model as &dyn ::core::any::Any)
            .collect()),));
        at.push(quote!(#index => Ok(#items
            .and_then(|items| items.get(position))
            .and_then(|value| #elem_view)
            .map(|model| model as &dyn ::core::any::Any)),));
        len.push(quote!(#index => Ok(#items.map_or(0, |items| items.len())),));

        let push = match (&collection.kind, collection_mut(&f.ty, quote!(&mut self.#ident))) {
            (TypeKind::Slice { shape: SliceShape::Vec, .. }, Some(target_mut)) => quote! {{
                let #receiver = model.downcast::<#target>().map_err(|_| #invalid)?;
                (#target_mut).push(#element);
                Ok(())
            }},
            (TypeKind::Slice { shape: SliceShape::Boxed, .. }, Some(target_mut)) => quote! {{
                let #receiver = model.downcast::<#target>().map_err(|_| #invalid)?;
                let items = #target_mut;
                let mut grown = ::std::mem::take(items).into_vec();
                grown.push(#element);
                *items = grown.into_boxed_slice();
                Ok(())
            }},
            _ => {
                let unsupported = ctx.unsupported(name, "add_relation_model");
                quote!(Err(#unsupported))
            }
        };
        add.push(quote!(#index => #push,));

        let collected = match &collection.kind {
            TypeKind::Array { len, .. } => {
                let message = format!("expected exactly {len} models");
                let invalid_len = ctx.invalid_value(name, quote!(#message.to_string()));
                quote!(items.try_into().map_err(|_| #invalid_len)?)
            }
            TypeKind::Slice { shape: SliceShape::Boxed, .. } => quote!(items.into_boxed_slice()),
            _ => quote!(items),
        };
        let value = construct(ctx.qualifier, &f.ty, collected);
        set.push(quote!(#index => {
            let mut items = ::std::vec::Vec::with_capacity(models.len());
            for model in models {
                let #receiver = model.downcast::<#target>().map_err(|_| #invalid)?;
                items.push(#element);
            }
            self.#ident = #value;
            Ok(())
        }));

        if let Some(join) = f.relation.as_ref().and_then(|r| r.join) {
            let join_name = catalog.decl(join).name.as_str();
            joins.push(quote!(#index => ::core::option::Option::Some(#join_name),));
        }
    }

    quote! {
        #[allow(unused_parens)]
        impl #contract::MultiRelationer for #ty {
            fn relation_models(
                &self,
                index: usize,
            ) -> ::core::result::Result<::std::vec::Vec<&dyn ::core::any::Any>, #error> {
                match index {
                    #(#all)*
                    _ => Err(#unknown),
                }
            }

            fn relation_model_at(
                &self,
                index: usize,
                position: usize,
            ) -> ::core::result::Result<::core::option::Option<&dyn ::core::any::Any>, #error> {
                match index {
                    #(#at)*
                    _ => Err(#unknown),
                }
            }

            fn relation_len(&self, index: usize) -> ::core::result::Result<usize, #error> {
                match index {
                    #(#len)*
                    _ => Err(#unknown),
                }
            }

            fn add_relation_model(
                &mut self,
                index: usize,
                model: ::std::boxed::Box<dyn ::core::any::Any>,
            ) -> ::core::result::Result<(), #error> {
                match index {
                    #(#add)*
                    _ => Err(#unknown),
                }
            }

            fn set_relation_models(
                &mut self,
                index: usize,
                models: ::std::vec::Vec<::std::boxed::Box<dyn ::core::any::Any>>,
            ) -> ::core::result::Result<(), #error> {
                match index {
                    #(#set)*
                    _ => Err(#unknown),
                }
            }

            fn relation_join(&self, index: usize) -> ::core::option::Option<&'static str> {
                match index {
                    #(#joins)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    }
}

fn relations_of(entity: &Entity, cardinality: Cardinality) -> Vec<&Field> {
    entity
        .relation_fields()
        .filter(|f| f.relation.as_ref().is_some_and(|r| r.cardinality == cardinality))
        .collect()
}

fn relation_target(ctx: &RenderContext, field: &Field) -> TokenStream {
    match field.relation.as_ref().and_then(|r| r.target) {
        Some(id) => {
            let path = ctx.qualifier.decl_path(id);
            quote!(#path)
        }
        None => {
            let ty = ctx.qualifier.descriptor(field.ty.deref_target());
            quote!(#ty)
        }
    }
}

/// `Option<&Inner>` from `expr: &T`, looking through `Option` and smart pointers.
fn view(desc: &TypeDescriptor, expr: TokenStream) -> TokenStream {
    match &desc.kind {
        TypeKind::Pointer(elem) => {
            let inner = view(elem, quote!(value));
            quote!((#expr).as_ref().and_then(|value| #inner))
        }
        TypeKind::Boxed { elem, .. } => view(elem, quote!(&**(#expr))),
        _ => quote!(::core::option::Option::Some(#expr)),
    }
}

/// `&mut Collection` from `expr: &mut T`; `Rc`/`Arc` layers cannot be mutated.
fn collection_mut(desc: &TypeDescriptor, expr: TokenStream) -> Option<TokenStream> {
    match &desc.kind {
        TypeKind::Pointer(elem) => collection_mut(
            elem,
            quote!((#expr).get_or_insert_with(::core::default::Default::default)),
        ),
        TypeKind::Boxed {
            pointer: SmartPointer::Box,
            elem,
        } => collection_mut(elem, quote!(&mut **(#expr))),
        TypeKind::Boxed { .. } => None,
        _ => Some(expr),
    }
}

/// Wrap `base` in the newtype, `Option` and pointer layers of `desc`.
fn construct(qualifier: &PathQualifier, desc: &TypeDescriptor, base: TokenStream) -> TokenStream {
    match &desc.kind {
        TypeKind::Named { decl, underlying } => {
            let path = qualifier.decl_path(*decl);
            let inner = construct(qualifier, underlying, base);
            quote!(#path(#inner))
        }
        TypeKind::Pointer(elem) => {
            let inner = construct(qualifier, elem, base);
            quote!(::core::option::Option::Some(#inner))
        }
        TypeKind::Boxed { pointer, elem } => {
            let inner = construct(qualifier, elem, base);
            let ctor = pointer_ctor(*pointer);
            quote!(#ctor(#inner))
        }
        _ => base,
    }
}

fn base_of(desc: &TypeDescriptor) -> &TypeDescriptor {
    match &desc.kind {
        TypeKind::Named { underlying: elem, .. }
        | TypeKind::Pointer(elem)
        | TypeKind::Boxed { elem, .. } => base_of(elem),
        _ => desc,
    }
}

/// Downcast chain for `set_*_value`: declared type, `Option` element, alternates.
fn assign_from_any(ctx: &RenderContext, name: &str, field: &Field) -> TokenStream {
    let ident = &field.ident;
    let declared = ctx.qualifier.descriptor(&field.ty);
    let mut attempts = vec![quote! {
        if let ::core::option::Option::Some(value) = value.downcast_ref::<#declared>() {
            self.#ident = ::core::clone::Clone::clone(value);
            return Ok(());
        }
    }];

    if let TypeKind::Pointer(elem) = &field.ty.kind {
        let elem_ty = ctx.qualifier.descriptor(elem);
        attempts.push(quote! {
            if let ::core::option::Option::Some(value) = value.downcast_ref::<#elem_ty>() {
                self.#ident = ::core::option::Option::Some(::core::clone::Clone::clone(value));
                return Ok(());
            }
        });
    }

    let base = base_of(&field.ty);
    for alternate in field.zero.iter().flat_map(|z| z.alternates.iter()) {
        let Some(converted) = convert_alternate(ctx, name, *alternate, base) else {
            continue;
        };
        let alt_ty = alternate.to_type();
        let value = construct(ctx.qualifier, &field.ty, converted);
        attempts.push(quote! {
            if let ::core::option::Option::Some(value) = value.downcast_ref::<#alt_ty>() {
                self.#ident = #value;
                return Ok(());
            }
        });
    }

    quote!(#(#attempts)*)
}

fn convert_alternate(
    ctx: &RenderContext,
    name: &str,
    alternate: AlternateType,
    base: &TypeDescriptor,
) -> Option<TokenStream> {
    match (alternate, &base.kind) {
        (AlternateType::Primitive(from), TypeKind::Primitive(to))
            if from.is_numeric() && to.is_numeric() =>
        {
            let to = to.to_type();
            Some(quote!(*value as #to))
        }
        (AlternateType::ByteSlice, TypeKind::Primitive(PrimitiveKind::String)) => {
            let invalid = ctx.invalid_value(name, quote!(e.to_string()));
            Some(quote!(
                ::std::string::String::from_utf8(::core::clone::Clone::clone(value))
                    .map_err(|e| #invalid)?
            ))
        }
        (
            AlternateType::Primitive(PrimitiveKind::String),
            TypeKind::Slice {
                shape: SliceShape::Vec,
                ..
            },
        ) => Some(quote!(::core::clone::Clone::clone(value).into_bytes())),
        (
            AlternateType::Primitive(PrimitiveKind::String),
            TypeKind::Slice {
                shape: SliceShape::Boxed,
                ..
            },
        ) => Some(quote!(::std::boxed::Box::<[u8]>::from(value.as_bytes()))),
        _ => None,
    }
}

/// Byte slices, also behind newtypes, hash as their lossy text.
fn hashable_value(field: &Field) -> TokenStream {
    let ident = &field.ident;
    let (chain, inner) = field.ty.unwrap_named();
    if inner.is_byte_slice() {
        let mut access = quote!(self.#ident);
        for _ in &chain {
            access = quote!(#access.0);
        }
        return quote!(::std::boxed::Box::new(
            ::std::string::String::from_utf8_lossy(&#access).into_owned()
        ));
    }
    quote!(::std::boxed::Box::new(::core::clone::Clone::clone(&self.#ident)))
}
