//! Type descriptors.
//!
//! A [`TypeDescriptor`] is the classifier's view of a field type: the written
//! `syn::Type` plus a [`TypeKind`] computed through catalog lookups. Aliases
//! are looked through; newtypes keep their declaration and the descriptor of
//! the wrapped type.

use std::collections::BTreeSet;

use quote::ToTokens;
use strum::{Display, EnumIter, EnumString};
use syn::{Expr, GenericArgument, Lit, PathArguments, Type};

use crate::catalog::{DeclId, DeclShape, Resolution, TypeCatalog, path_segments};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
)]
pub enum PrimitiveKind {
    #[strum(serialize = "i8")]
    I8,
    #[strum(serialize = "i16")]
    I16,
    #[strum(serialize = "i32")]
    I32,
    #[strum(serialize = "i64")]
    I64,
    #[strum(serialize = "i128")]
    I128,
    #[strum(serialize = "isize")]
    Isize,
    #[strum(serialize = "u8")]
    U8,
    #[strum(serialize = "u16")]
    U16,
    #[strum(serialize = "u32")]
    U32,
    #[strum(serialize = "u64")]
    U64,
    #[strum(serialize = "u128")]
    U128,
    #[strum(serialize = "usize")]
    Usize,
    #[strum(serialize = "f32")]
    F32,
    #[strum(serialize = "f64")]
    F64,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "char")]
    Char,
    #[strum(serialize = "String")]
    String,
}

impl PrimitiveKind {
    pub fn is_integer(self) -> bool {
        self.bits().is_some() && !self.is_float()
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.bits().is_some()
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::I128 | Self::Isize
        )
    }

    /// Bit width of numeric kinds; pointer-sized integers count as 64.
    pub fn bits(self) -> Option<u16> {
        Some(match self {
            Self::I8 | Self::U8 => 8,
            Self::I16 | Self::U16 => 16,
            Self::I32 | Self::U32 | Self::F32 => 32,
            Self::I64 | Self::U64 | Self::F64 | Self::Isize | Self::Usize => 64,
            Self::I128 | Self::U128 => 128,
            Self::Bool | Self::Char | Self::String => return None,
        })
    }

    pub fn to_type(self) -> Type {
        let ident = syn::Ident::new(&self.to_string(), proc_macro2::Span::call_site());
        syn::parse_quote!(#ident)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SmartPointer {
    Box,
    Rc,
    Arc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceShape {
    /// `Vec<T>`
    Vec,
    /// `Box<[T]>`
    Boxed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    /// Single-field tuple struct
    Named {
        decl: DeclId,
        underlying: Box<TypeDescriptor>,
    },
    Struct(DeclId),
    Enum(DeclId),
    /// `Option<T>`
    Pointer(Box<TypeDescriptor>),
    Boxed {
        pointer: SmartPointer,
        elem: Box<TypeDescriptor>,
    },
    Slice {
        shape: SliceShape,
        elem: Box<TypeDescriptor>,
    },
    Array {
        len: usize,
        elem: Box<TypeDescriptor>,
    },
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Channel,
    /// Borrowed data, `&T` / `&mut T`
    Reference,
    /// Path into a dependency crate that is not loaded yet
    Imported { crate_name: String },
    /// Resolved to nothing the catalog knows about
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    /// The type as written in `package`
    pub ty: Type,
    pub package: String,
}

impl TypeDescriptor {
    pub fn decl_id(&self) -> Option<DeclId> {
        match self.kind {
            TypeKind::Named { decl, .. } | TypeKind::Struct(decl) | TypeKind::Enum(decl) => {
                Some(decl)
            }
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_) | TypeKind::Boxed { .. })
    }

    /// Strip `Option`, `Box`, `Rc` and `Arc` layers.
    pub fn strip_pointers(&self) -> &TypeDescriptor {
        match &self.kind {
            TypeKind::Pointer(elem) | TypeKind::Boxed { elem, .. } => elem.strip_pointers(),
            _ => self,
        }
    }

    /// Element of a `Vec`, boxed slice or array, pointers stripped first.
    pub fn sequence_elem(&self) -> Option<&TypeDescriptor> {
        match &self.strip_pointers().kind {
            TypeKind::Slice { elem, .. } | TypeKind::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Pointers, then one sequence level, then pointers again.
    pub fn deref_target(&self) -> &TypeDescriptor {
        let outer = self.strip_pointers();
        match outer.sequence_elem() {
            Some(elem) => elem.strip_pointers(),
            None => outer,
        }
    }

    pub fn is_byte_slice(&self) -> bool {
        matches!(
            &self.kind,
            TypeKind::Slice { elem, .. } if elem.kind == TypeKind::Primitive(PrimitiveKind::U8)
        )
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self.kind {
            TypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Newtype layers first, then the innermost non-newtype descriptor.
    pub fn unwrap_named(&self) -> (Vec<DeclId>, &TypeDescriptor) {
        let mut chain = Vec::new();
        let mut current = self;
        while let TypeKind::Named { decl, underlying } = &current.kind {
            chain.push(*decl);
            current = underlying;
        }
        (chain, current)
    }

    pub fn imported_crates(&self, out: &mut BTreeSet<String>) {
        match &self.kind {
            TypeKind::Imported { crate_name } => {
                out.insert(crate_name.clone());
            }
            TypeKind::Named { underlying: elem, .. }
            | TypeKind::Pointer(elem)
            | TypeKind::Boxed { elem, .. }
            | TypeKind::Slice { elem, .. }
            | TypeKind::Array { elem, .. } => elem.imported_crates(out),
            TypeKind::Map { key, value } => {
                key.imported_crates(out);
                value.imported_crates(out);
            }
            _ => {}
        }
    }
}

/// Describe `ty` as written inside `package`.
pub fn describe(catalog: &TypeCatalog, package: &str, ty: &Type) -> TypeDescriptor {
    Describer {
        catalog,
        owner: None,
        stack: Vec::new(),
    }
    .describe(package, ty)
}

/// Describe the type of a field declared by `owner`, where `Self` names `owner`.
pub fn describe_field(
    catalog: &TypeCatalog,
    package: &str,
    ty: &Type,
    owner: DeclId,
) -> TypeDescriptor {
    Describer {
        catalog,
        owner: Some(owner),
        stack: Vec::new(),
    }
    .describe(package, ty)
}

struct Describer<'a> {
    catalog: &'a TypeCatalog,
    owner: Option<DeclId>,
    /// Newtypes and aliases currently being expanded
    stack: Vec<DeclId>,
}

impl Describer<'_> {
    fn describe(&mut self, package: &str, ty: &Type) -> TypeDescriptor {
        let kind = self.kind(package, ty);
        TypeDescriptor {
            kind,
            ty: ty.clone(),
            package: package.to_string(),
        }
    }

    fn boxed(&mut self, package: &str, ty: &Type) -> Box<TypeDescriptor> {
        Box::new(self.describe(package, ty))
    }

    fn kind(&mut self, package: &str, ty: &Type) -> TypeKind {
        match ty {
            Type::Paren(p) => self.kind(package, &p.elem),
            Type::Group(g) => self.kind(package, &g.elem),
            Type::Reference(_) | Type::Ptr(_) => TypeKind::Reference,
            Type::Array(a) => match array_len(&a.len) {
                Some(len) => TypeKind::Array {
                    len,
                    elem: self.boxed(package, &a.elem),
                },
                None => TypeKind::Opaque,
            },
            Type::Path(p) if p.qself.is_none() => self.path_kind(package, &p.path),
            _ => TypeKind::Opaque,
        }
    }

    fn path_kind(&mut self, package: &str, path: &syn::Path) -> TypeKind {
        if let Some(owner) = self.owner
            && path.is_ident("Self")
        {
            return self.decl_kind(owner);
        }
        let segments = path_segments(path);
        match self.catalog.resolve(package, &segments) {
            Resolution::Decl(id) => return self.decl_kind(id),
            Resolution::External { crate_name, .. } => {
                if builtin_ident(path).is_none() {
                    return TypeKind::Imported { crate_name };
                }
            }
            Resolution::Unknown => {}
        }

        let Some((ident, args)) = builtin_ident(path) else {
            return TypeKind::Opaque;
        };
        if let Ok(primitive) = ident.parse::<PrimitiveKind>() {
            return TypeKind::Primitive(primitive);
        }
        match (ident.as_str(), args.as_slice()) {
            ("Option", [elem]) => TypeKind::Pointer(self.boxed(package, elem)),
            ("Vec", [elem]) => TypeKind::Slice {
                shape: SliceShape::Vec,
                elem: self.boxed(package, elem),
            },
            ("Box" | "Rc" | "Arc", [elem]) => {
                if let (Type::Slice(slice), "Box") = (elem, ident.as_str()) {
                    return TypeKind::Slice {
                        shape: SliceShape::Boxed,
                        elem: self.boxed(package, &slice.elem),
                    };
                }
                let pointer = match ident.as_str() {
                    "Box" => SmartPointer::Box,
                    "Rc" => SmartPointer::Rc,
                    _ => SmartPointer::Arc,
                };
                TypeKind::Boxed {
                    pointer,
                    elem: self.boxed(package, elem),
                }
            }
            ("HashMap" | "BTreeMap" | "IndexMap", [key, value, ..]) => TypeKind::Map {
                key: self.boxed(package, key),
                value: self.boxed(package, value),
            },
            (
                "Sender" | "Receiver" | "SyncSender" | "UnboundedSender" | "UnboundedReceiver",
                _,
            ) => TypeKind::Channel,
            _ => TypeKind::Opaque,
        }
    }

    fn decl_kind(&mut self, id: DeclId) -> TypeKind {
        let decl = self.catalog.decl(id);
        if self.stack.contains(&id) {
            return TypeKind::Opaque;
        }
        match &decl.shape {
            DeclShape::Alias(target) => {
                self.stack.push(id);
                let kind = self.kind(&decl.package, target);
                self.stack.pop();
                kind
            }
            DeclShape::Tuple(fields) if fields.len() == 1 && !decl.generic => {
                self.stack.push(id);
                let underlying = self.boxed(&decl.package, &fields[0].ty);
                self.stack.pop();
                TypeKind::Named {
                    decl: id,
                    underlying,
                }
            }
            DeclShape::Enum => TypeKind::Enum(id),
            _ => TypeKind::Struct(id),
        }
    }
}

/// Final identifier and type arguments of a path that can name a built-in
/// type: a bare ident or one rooted at `std`/`core`/`alloc`, or one of the
/// map and channel crates.
fn builtin_ident(path: &syn::Path) -> Option<(String, Vec<&Type>)> {
    let last = path.segments.last()?;
    if path.segments.len() > 1 {
        let root = path.segments.first()?.ident.to_string();
        if !matches!(
            root.as_str(),
            "std" | "core" | "alloc" | "indexmap" | "tokio" | "crossbeam" | "crossbeam_channel"
                | "flume" | "futures"
        ) {
            return None;
        }
    }
    let args = match &last.arguments {
        PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .filter_map(|a| match a {
                GenericArgument::Type(t) => Some(t),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Some((last.ident.to_string(), args))
}

fn array_len(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Int(int) => int.base10_parse().ok(),
            _ => None,
        },
        Expr::Group(g) => array_len(&g.expr),
        Expr::Paren(p) => array_len(&p.expr),
        _ => None,
    }
}

/// Compact source rendering of a type for log messages.
pub fn type_string(ty: &Type) -> String {
    ty.to_token_stream().to_string().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::imports::flatten_use;
    use crate::loader::{LoadedSources, Package};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::str::FromStr;
    use syn::parse_quote;

    fn catalog(file: syn::File) -> TypeCatalog {
        let imports = file
            .items
            .iter()
            .filter_map(|i| match i {
                syn::Item::Use(u) => Some(flatten_use(u)),
                _ => None,
            })
            .flatten()
            .collect();
        let package = Package {
            crate_name: "app".into(),
            module: Vec::new(),
            path: PathBuf::from("lib.rs"),
            items: file.items,
            imports,
            is_test: false,
        };
        TypeCatalog::index(&LoadedSources {
            packages: vec![package],
            crates: ["app".to_string()].into(),
            dependency_roots: BTreeMap::from([("shared".to_string(), PathBuf::from("../shared"))]),
        })
    }

    #[test]
    fn primitive_kinds_parse_from_idents() {
        assert_eq!(PrimitiveKind::from_str("u16").unwrap(), PrimitiveKind::U16);
        assert_eq!(PrimitiveKind::from_str("String").unwrap(), PrimitiveKind::String);
        assert!(PrimitiveKind::from_str("Vec").is_err());
        assert!(PrimitiveKind::I64.is_signed());
        assert_eq!(PrimitiveKind::F32.bits(), Some(32));
        assert!(!PrimitiveKind::Char.is_numeric());
    }

    #[test]
    fn describes_wrappers_and_sequences() {
        let catalog = catalog(parse_quote! {
            pub struct User { pub id: u64 }
        });
        let d = describe(&catalog, "app", &parse_quote!(Option<Box<User>>));
        assert!(d.is_pointer());
        assert_matches::assert_matches!(d.deref_target().kind, TypeKind::Struct(_));

        let d = describe(&catalog, "app", &parse_quote!(Vec<Option<User>>));
        let elem = d.sequence_elem().unwrap();
        assert!(elem.is_pointer());

        let d = describe(&catalog, "app", &parse_quote!(Box<[u8]>));
        assert!(d.is_byte_slice());

        let d = describe(&catalog, "app", &parse_quote!([u8; 16]));
        assert_matches::assert_matches!(d.kind, TypeKind::Array { len: 16, .. });

        let d = describe(&catalog, "app", &parse_quote!(std::collections::HashMap<String, u32>));
        assert_matches::assert_matches!(d.kind, TypeKind::Map { .. });

        let d = describe(&catalog, "app", &parse_quote!(std::sync::mpsc::Sender<u8>));
        assert_eq!(d.kind, TypeKind::Channel);
        assert_eq!(describe(&catalog, "app", &parse_quote!(&'static str)).kind, TypeKind::Reference);
    }

    #[test]
    fn aliases_are_transparent_and_newtypes_chain() {
        let catalog = catalog(parse_quote! {
            pub type Bytes = Vec<u8>;
            pub struct Token(Bytes);
            pub struct Secret(Token);
        });
        assert!(describe(&catalog, "app", &parse_quote!(Bytes)).is_byte_slice());

        let d = describe(&catalog, "app", &parse_quote!(Secret));
        let (chain, inner) = d.unwrap_named();
        assert_eq!(chain.len(), 2);
        assert!(inner.is_byte_slice());
    }

    #[test]
    fn recursive_newtypes_terminate() {
        let catalog = catalog(parse_quote! {
            pub struct Node(Box<Node>);
        });
        let d = describe(&catalog, "app", &parse_quote!(Node));
        let (_, inner) = d.unwrap_named();
        assert_matches::assert_matches!(&inner.kind, TypeKind::Boxed { elem, .. } if elem.kind == TypeKind::Opaque);
    }

    #[test]
    fn self_names_the_owning_declaration() {
        let catalog = catalog(parse_quote! {
            pub struct Node { pub id: u64, pub parent: Option<Box<Self>> }
        });
        let owner = catalog.find("app::Node").unwrap().id;
        let d = describe_field(&catalog, "app", &parse_quote!(Option<Box<Self>>), owner);
        assert_eq!(d.strip_pointers().kind, TypeKind::Struct(owner));
        assert_eq!(describe(&catalog, "app", &parse_quote!(Self)).kind, TypeKind::Opaque);
    }

    #[test]
    fn dependency_paths_are_imported() {
        let catalog = catalog(parse_quote! {
            use shared::Tag;
        });
        let d = describe(&catalog, "app", &parse_quote!(Vec<Tag>));
        let mut crates = BTreeSet::new();
        d.imported_crates(&mut crates);
        assert_eq!(crates, BTreeSet::from(["shared".to_string()]));
        assert_eq!(describe(&catalog, "app", &parse_quote!(uuid::Uuid)).kind, TypeKind::Opaque);
    }
}
