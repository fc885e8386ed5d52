//! Zero values, zero checks and alternate coercion types.
//!
//! # Example Flow
//!
//! ```text
//! TypeDescriptor
//!     ↓ delegated?   is_zero(&self) -> bool + zero() -> Self
//!     ↓ newtype?     project `.0`, recurse into the wrapped type
//!     ↓ kind rules   None / is_empty() / == zero
//! ZeroMetadata { value, check, alternates, wrapped }
//! ```

use std::collections::HashMap;

use proc_macro2::{Literal, TokenStream};
use quote::quote;
use strum::IntoEnumIterator;
use syn::Type;

use crate::catalog::{DeclId, MethodPattern, Receiver};
use crate::emit::qualify::PathQualifier;
use crate::types::{PrimitiveKind, SliceShape, SmartPointer, TypeDescriptor, TypeKind};

const IS_ZERO: MethodPattern = MethodPattern {
    trait_name: None,
    name: "is_zero",
    receiver: Receiver::Ref,
    params: &[],
    returns: "bool",
};

const ZERO: MethodPattern = MethodPattern {
    trait_name: None,
    name: "zero",
    receiver: Receiver::None,
    params: &[],
    returns: "Self",
};

/// A type a field value may also be assigned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlternateType {
    Primitive(PrimitiveKind),
    /// `Vec<u8>`
    ByteSlice,
}

impl AlternateType {
    pub fn to_type(self) -> Type {
        match self {
            Self::Primitive(kind) => kind.to_type(),
            Self::ByteSlice => syn::parse_quote!(::std::vec::Vec<u8>),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AlternateKey {
    Primitive(PrimitiveKind),
    ByteSlice,
}

/// Alternate sets per base kind, computed once per invocation.
#[derive(Debug, Default)]
pub struct AlternateTable {
    cache: HashMap<AlternateKey, Vec<AlternateType>>,
}

impl AlternateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alternates(&mut self, desc: &TypeDescriptor) -> Vec<AlternateType> {
        let Some(key) = alternate_key(desc) else {
            return Vec::new();
        };
        self.cache
            .entry(key)
            .or_insert_with(|| compute_alternates(key))
            .clone()
    }

    pub fn cached_kinds(&self) -> usize {
        self.cache.len()
    }
}

fn alternate_key(desc: &TypeDescriptor) -> Option<AlternateKey> {
    match &desc.kind {
        TypeKind::Named { underlying, .. } => alternate_key(underlying),
        TypeKind::Pointer(elem) | TypeKind::Boxed { elem, .. } => alternate_key(elem),
        TypeKind::Primitive(kind) => Some(AlternateKey::Primitive(*kind)),
        TypeKind::Slice { .. } if desc.is_byte_slice() => Some(AlternateKey::ByteSlice),
        _ => None,
    }
}

fn compute_alternates(key: AlternateKey) -> Vec<AlternateType> {
    match key {
        AlternateKey::Primitive(PrimitiveKind::String) => vec![AlternateType::ByteSlice],
        AlternateKey::Primitive(kind) if kind.is_numeric() => PrimitiveKind::iter()
            .filter(|other| other.is_numeric() && *other != kind)
            .map(AlternateType::Primitive)
            .collect(),
        AlternateKey::Primitive(_) => Vec::new(),
        AlternateKey::ByteSlice => vec![AlternateType::Primitive(PrimitiveKind::String)],
    }
}

/// How an emitted zero check tests a value.
#[derive(Debug, Clone)]
pub enum ZeroCheck {
    IsEmpty,
    IsNone,
    /// The type's own `is_zero()`
    Delegated,
    Equals(TokenStream),
    /// Newtype layer, test `.0`
    Project(Box<ZeroCheck>),
    /// Smart pointer layer, test the pointee
    Deref(Box<ZeroCheck>),
}

impl ZeroCheck {
    pub fn render(&self, access: TokenStream) -> TokenStream {
        match self {
            Self::IsEmpty => quote!(#access.is_empty()),
            Self::IsNone => quote!(#access.is_none()),
            Self::Delegated => quote!(#access.is_zero()),
            Self::Equals(zero) => quote!(#access == #zero),
            Self::Project(inner) => inner.render(quote!(#access.0)),
            Self::Deref(inner) => inner.render(quote!((*#access))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZeroMetadata {
    pub value: TokenStream,
    pub check: ZeroCheck,
    pub alternates: Vec<AlternateType>,
    /// Qualified names of the newtypes wrapping the base kind, outermost first
    pub wrapped: Vec<String>,
    pub delegated: bool,
}

pub struct ZeroAnalyzer<'q, 'a> {
    qualifier: &'q PathQualifier<'a>,
}

impl<'q, 'a> ZeroAnalyzer<'q, 'a> {
    pub fn new(qualifier: &'q PathQualifier<'a>) -> Self {
        Self { qualifier }
    }

    pub fn analyze(&self, desc: &TypeDescriptor, table: &mut AlternateTable) -> ZeroMetadata {
        let (chain, _) = desc.unwrap_named();
        let catalog = self.qualifier.catalog();
        ZeroMetadata {
            value: self.zero_value(desc),
            check: self.zero_check(desc),
            alternates: table.alternates(desc),
            wrapped: chain
                .iter()
                .map(|&id| catalog.decl(id).qualified_name())
                .collect(),
            delegated: desc.decl_id().is_some_and(|id| self.is_delegated(id)),
        }
    }

    fn is_delegated(&self, id: DeclId) -> bool {
        let decl = self.qualifier.catalog().decl(id);
        decl.provides(&IS_ZERO) && decl.provides(&ZERO)
    }

    pub fn zero_value(&self, desc: &TypeDescriptor) -> TokenStream {
        if let Some(id) = desc.decl_id()
            && self.is_delegated(id)
        {
            let path = self.qualifier.decl_path(id);
            return quote!(#path::zero());
        }

        match &desc.kind {
            TypeKind::Primitive(kind) => primitive_zero(*kind),
            TypeKind::Named { decl, underlying } => {
                let path = self.qualifier.decl_path(*decl);
                let inner = self.zero_value(underlying);
                quote!(#path(#inner))
            }
            TypeKind::Pointer(_) => quote!(::core::option::Option::None),
            TypeKind::Boxed { pointer, elem } => {
                let inner = self.zero_value(elem);
                let ctor = pointer_ctor(*pointer);
                quote!(#ctor(#inner))
            }
            TypeKind::Slice {
                shape: SliceShape::Vec,
                ..
            } => quote!(::std::vec::Vec::new()),
            TypeKind::Slice {
                shape: SliceShape::Boxed,
                ..
            } => quote!(::std::vec::Vec::new().into_boxed_slice()),
            TypeKind::Array { len, elem } => {
                let inner = self.zero_value(elem);
                let len = Literal::usize_unsuffixed(*len);
                match elem.primitive() {
                    Some(kind) if kind != PrimitiveKind::String => quote!([#inner; #len]),
                    _ => quote!(::core::array::from_fn::<_, #len, _>(|_| #inner)),
                }
            }
            TypeKind::Map { .. } => quote!(::core::default::Default::default()),
            TypeKind::Struct(_)
            | TypeKind::Enum(_)
            | TypeKind::Imported { .. }
            | TypeKind::Opaque
            | TypeKind::Channel
            | TypeKind::Reference => {
                let ty = self.qualifier.descriptor(desc);
                quote!(<#ty as ::core::default::Default>::default())
            }
        }
    }

    pub fn zero_check(&self, desc: &TypeDescriptor) -> ZeroCheck {
        if desc.decl_id().is_some_and(|id| self.is_delegated(id)) {
            return ZeroCheck::Delegated;
        }
        match &desc.kind {
            TypeKind::Named { underlying, .. } => {
                ZeroCheck::Project(Box::new(self.zero_check(underlying)))
            }
            TypeKind::Pointer(_) => ZeroCheck::IsNone,
            TypeKind::Boxed { elem, .. } => ZeroCheck::Deref(Box::new(self.zero_check(elem))),
            TypeKind::Slice { .. } | TypeKind::Map { .. } => ZeroCheck::IsEmpty,
            TypeKind::Primitive(PrimitiveKind::String) => ZeroCheck::IsEmpty,
            _ => ZeroCheck::Equals(self.zero_value(desc)),
        }
    }
}

fn primitive_zero(kind: PrimitiveKind) -> TokenStream {
    match kind {
        PrimitiveKind::Bool => quote!(false),
        PrimitiveKind::Char => quote!('\0'),
        PrimitiveKind::String => quote!(::std::string::String::new()),
        kind if kind.is_float() => quote!(0.0),
        _ => quote!(0),
    }
}

pub(crate) fn pointer_ctor(pointer: SmartPointer) -> TokenStream {
    match pointer {
        SmartPointer::Box => quote!(::std::boxed::Box::new),
        SmartPointer::Rc => quote!(::std::rc::Rc::new),
        SmartPointer::Arc => quote!(::std::sync::Arc::new),
    }
}
