//! String codecs.
//!
//! Each field gets at most one strategy for rendering its value as text and
//! parsing it back. Capabilities declared by the type win over kind dispatch;
//! both look through newtypes, `Option` and smart pointers.
//!
//! # Example Flow
//!
//! ```text
//! Option<Email(String)>
//!     ↓ Email: Display + FromStr?  → Capability::Text
//!     ↓ otherwise `.0`, String     → KindCodec::String
//! StringCodec { layers: [Option, Newtype(Email)], base }
//! ```

use proc_macro2::{Literal, TokenStream};
use quote::quote;
use syn::{Path, Type};

use crate::catalog::{DeclId, MethodPattern, Receiver};
use crate::emit::qualify::PathQualifier;
use crate::types::{PrimitiveKind, SliceShape, SmartPointer, TypeDescriptor, TypeKind};
use crate::zero::pointer_ctor;

/// Declarative capability table, probed by signature equality.
const FROM_STR: MethodPattern = MethodPattern {
    trait_name: Some("FromStr"),
    name: "from_str",
    receiver: Receiver::None,
    params: &["&str"],
    returns: "Result<Self,_>",
};

const DISPLAY: MethodPattern = MethodPattern {
    trait_name: Some("Display"),
    name: "fmt",
    receiver: Receiver::Ref,
    params: &["&mut Formatter"],
    returns: "Result",
};

const TO_STRING: MethodPattern = MethodPattern {
    trait_name: None,
    name: "to_string",
    receiver: Receiver::Ref,
    params: &[],
    returns: "String",
};

const AS_STR: MethodPattern = MethodPattern {
    trait_name: None,
    name: "as_str",
    receiver: Receiver::Ref,
    params: &[],
    returns: "&str",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Capability {
    /// `Display` + `FromStr`
    Text,
    Display,
    ToString,
    AsStr,
}

impl Capability {
    pub fn can_decode(self) -> bool {
        self == Self::Text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindCodec {
    Int {
        kind: PrimitiveKind,
        signed: bool,
        bits: u16,
    },
    Float {
        kind: PrimitiveKind,
        bits: u16,
    },
    Bool,
    Char,
    String,
    /// Byte slice as UTF-8
    Bytes(SliceShape),
    /// Fixed byte array as lowercase hex
    HexBytes(usize),
}

impl KindCodec {
    fn for_primitive(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Bool => Self::Bool,
            PrimitiveKind::Char => Self::Char,
            PrimitiveKind::String => Self::String,
            kind if kind.is_float() => Self::Float {
                kind,
                bits: kind.bits().unwrap_or(64),
            },
            kind => Self::Int {
                kind,
                signed: kind.is_signed(),
                bits: kind.bits().unwrap_or(64),
            },
        }
    }

    /// Primitive kind the decoder parses into, if it parses with `str::parse`.
    pub fn parse_kind(self) -> Option<PrimitiveKind> {
        match self {
            Self::Int { kind, .. } | Self::Float { kind, .. } => Some(kind),
            Self::Bool => Some(PrimitiveKind::Bool),
            Self::Char => Some(PrimitiveKind::Char),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CodecBase {
    Capability { capability: Capability, ty: Type },
    Kind(KindCodec),
}

#[derive(Debug, Clone)]
pub enum CodecLayer {
    Newtype(Path),
    /// `None` renders as the empty string and the empty string parses as
    /// `None`, so a `Some` whose text is empty reads back as `None`.
    Option,
    Boxed(SmartPointer),
}

#[derive(Debug, Clone)]
pub struct StringCodec {
    /// Outermost first
    pub layers: Vec<CodecLayer>,
    pub base: CodecBase,
}

impl StringCodec {
    pub fn can_decode(&self) -> bool {
        match &self.base {
            CodecBase::Capability { capability, .. } => capability.can_decode(),
            CodecBase::Kind(_) => true,
        }
    }

    /// Render `value` (an expression of type `&T`) to a `String`.
    pub fn encode(&self, value: TokenStream) -> TokenStream {
        self.encode_at(0, value)
    }

    fn encode_at(&self, depth: usize, value: TokenStream) -> TokenStream {
        match self.layers.get(depth) {
            None => self.encode_base(value),
            Some(CodecLayer::Newtype(_)) => self.encode_at(depth + 1, quote!(&(#value).0)),
            Some(CodecLayer::Boxed(_)) => self.encode_at(depth + 1, quote!(&**(#value))),
            Some(CodecLayer::Option) => {
                let inner = self.encode_at(depth + 1, quote!(value));
                quote! {
                    match #value {
                        ::core::option::Option::Some(value) => #inner,
                        ::core::option::Option::None => ::std::string::String::new(),
                    }
                }
            }
        }
    }

    fn encode_base(&self, value: TokenStream) -> TokenStream {
        match &self.base {
            CodecBase::Capability {
                capability: Capability::AsStr,
                ..
            } => quote!((#value).as_str().to_string()),
            CodecBase::Capability { .. } => quote!((#value).to_string()),
            CodecBase::Kind(KindCodec::String) => quote!((#value).clone()),
            CodecBase::Kind(KindCodec::Bytes(_)) => {
                quote!(::std::string::String::from_utf8_lossy(#value).into_owned())
            }
            CodecBase::Kind(KindCodec::HexBytes(_)) => quote! {
                (#value).iter().map(|b| format!("{b:02x}")).collect::<::std::string::String>()
            },
            CodecBase::Kind(_) => quote!((#value).to_string()),
        }
    }

    /// Parse `text` (an expression of type `&str`) into the field type.
    ///
    /// `error` is a `ModelError` expression; the rendered code uses `?` and
    /// `return Err(..)`, so it belongs in a function returning `Result`.
    pub fn decode(&self, text: TokenStream, error: &TokenStream) -> Option<TokenStream> {
        self.can_decode().then(|| self.decode_at(0, &text, error))
    }

    fn decode_at(&self, depth: usize, text: &TokenStream, error: &TokenStream) -> TokenStream {
        match self.layers.get(depth) {
            None => self.decode_base(text, error),
            Some(layer) => {
                let inner = self.decode_at(depth + 1, text, error);
                match layer {
                    CodecLayer::Newtype(path) => quote!(#path(#inner)),
                    CodecLayer::Boxed(pointer) => {
                        let ctor = pointer_ctor(*pointer);
                        quote!(#ctor(#inner))
                    }
                    CodecLayer::Option => quote! {
                        if (#text).is_empty() {
                            ::core::option::Option::None
                        } else {
                            ::core::option::Option::Some(#inner)
                        }
                    },
                }
            }
        }
    }

    fn decode_base(&self, text: &TokenStream, error: &TokenStream) -> TokenStream {
        match &self.base {
            CodecBase::Capability { ty, .. } => {
                quote!((#text).parse::<#ty>().map_err(|_| #error)?)
            }
            CodecBase::Kind(KindCodec::String) => quote!((#text).to_string()),
            CodecBase::Kind(KindCodec::Bytes(SliceShape::Vec)) => {
                quote!((#text).as_bytes().to_vec())
            }
            CodecBase::Kind(KindCodec::Bytes(SliceShape::Boxed)) => {
                quote!(::std::boxed::Box::<[u8]>::from((#text).as_bytes()))
            }
            CodecBase::Kind(KindCodec::HexBytes(len)) => {
                let len = Literal::usize_unsuffixed(*len);
                quote! {{
                    let text: &str = #text;
                    if text.len() != #len * 2 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
                        return ::core::result::Result::Err(#error);
                    }
                    let mut bytes = [0u8; #len];
                    for (i, byte) in bytes.iter_mut().enumerate() {
                        *byte = text
                            .get(i * 2..i * 2 + 2)
                            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                            .ok_or_else(|| #error)?;
                    }
                    bytes
                }}
            }
            CodecBase::Kind(kind) => {
                let ty = kind
                    .parse_kind()
                    .map(PrimitiveKind::to_type)
                    .unwrap_or_else(|| PrimitiveKind::String.to_type());
                quote!((#text).parse::<#ty>().map_err(|_| #error)?)
            }
        }
    }
}

pub struct StringCodecResolver<'q, 'a> {
    qualifier: &'q PathQualifier<'a>,
}

impl<'q, 'a> StringCodecResolver<'q, 'a> {
    pub fn new(qualifier: &'q PathQualifier<'a>) -> Self {
        Self { qualifier }
    }

    /// Probe a declaration against the capability table.
    pub fn capability(&self, id: DeclId) -> Option<Capability> {
        let decl = self.qualifier.catalog().decl(id);
        let display = decl.provides(&DISPLAY);
        if display && decl.provides(&FROM_STR) {
            Some(Capability::Text)
        } else if display {
            Some(Capability::Display)
        } else if decl.provides(&TO_STRING) {
            Some(Capability::ToString)
        } else if decl.provides(&AS_STR) {
            Some(Capability::AsStr)
        } else {
            None
        }
    }

    pub fn resolve(&self, desc: &TypeDescriptor) -> Option<StringCodec> {
        let mut layers = Vec::new();
        let mut current = desc;
        loop {
            if let Some(id) = current.decl_id()
                && let Some(capability) = self.capability(id)
            {
                let ty: Type = {
                    let path = self.qualifier.decl_path(id);
                    syn::parse_quote!(#path)
                };
                return Some(StringCodec {
                    layers,
                    base: CodecBase::Capability { capability, ty },
                });
            }

            let base = match &current.kind {
                TypeKind::Named { decl, underlying } => {
                    layers.push(CodecLayer::Newtype(self.qualifier.decl_path(*decl)));
                    current = underlying;
                    continue;
                }
                TypeKind::Pointer(elem) => {
                    layers.push(CodecLayer::Option);
                    current = elem;
                    continue;
                }
                TypeKind::Boxed { pointer, elem } => {
                    layers.push(CodecLayer::Boxed(*pointer));
                    current = elem;
                    continue;
                }
                TypeKind::Primitive(kind) => KindCodec::for_primitive(*kind),
                TypeKind::Slice { shape, .. } if current.is_byte_slice() => {
                    KindCodec::Bytes(*shape)
                }
                TypeKind::Array { len, elem }
                    if elem.primitive() == Some(PrimitiveKind::U8) =>
                {
                    KindCodec::HexBytes(*len)
                }
                _ => return None,
            };
            return Some(StringCodec {
                layers,
                base: CodecBase::Kind(base),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeCatalog;
    use crate::loader::{LoadedSources, Package};
    use crate::types::describe;
    use proptest::prelude::*;
    use std::path::PathBuf;
    use strum::IntoEnumIterator;
    use syn::parse_quote;

    fn catalog() -> TypeCatalog {
        let file: syn::File = parse_quote! {
            use std::fmt;
            use std::str::FromStr;

            #[derive(strum::Display, strum::EnumString)]
            pub enum Status { Active, Banned }

            pub struct Email(String);
            impl fmt::Display for Email {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
            }
            impl FromStr for Email {
                type Err = String;
                fn from_str(s: &str) -> Result<Email, String> { Ok(Email(s.into())) }
            }

            pub struct Slug(String);
            impl Slug {
                pub fn as_str(&self) -> &str { &self.0 }
            }

            pub struct Counter(u16);

            pub struct Blob { pub data: Vec<u8> }
        };
        TypeCatalog::index(&LoadedSources {
            packages: vec![Package {
                crate_name: "app".into(),
                module: Vec::new(),
                path: PathBuf::from("src/lib.rs"),
                items: file.items,
                imports: Vec::new(),
                is_test: false,
            }],
            crates: ["app".to_string()].into(),
            dependency_roots: Default::default(),
        })
    }

    fn resolve(catalog: &TypeCatalog, ty: Type) -> Option<StringCodec> {
        let q = PathQualifier::new(catalog, "app");
        StringCodecResolver::new(&q).resolve(&describe(catalog, "app", &ty))
    }

    #[test]
    fn derives_and_impls_provide_text() {
        let catalog = catalog();
        let codec = resolve(&catalog, parse_quote!(Status)).unwrap();
        assert!(matches!(codec.base, CodecBase::Capability { capability: Capability::Text, .. }));

        let codec = resolve(&catalog, parse_quote!(Option<Email>)).unwrap();
        assert!(matches!(codec.layers[..], [CodecLayer::Option]));
        assert!(codec.can_decode());
    }

    #[test]
    fn display_shaped_methods_are_read_only() {
        let catalog = catalog();
        let codec = resolve(&catalog, parse_quote!(Slug)).unwrap();
        assert!(matches!(codec.base, CodecBase::Capability { capability: Capability::AsStr, .. }));
        assert!(!codec.can_decode());
        assert!(codec.decode(quote!(text), &quote!(err)).is_none());
        assert_eq!(
            codec.encode(quote!(&self.slug)).to_string(),
            quote!((&self.slug).as_str().to_string()).to_string()
        );
    }

    #[test]
    fn kind_dispatch_through_newtypes() {
        let catalog = catalog();
        let codec = resolve(&catalog, parse_quote!(Counter)).unwrap();
        assert!(matches!(
            codec.base,
            CodecBase::Kind(KindCodec::Int { kind: PrimitiveKind::U16, signed: false, bits: 16 })
        ));
        let decoded = codec.decode(quote!(text), &quote!(err)).unwrap();
        assert_eq!(
            decoded.to_string(),
            quote!(crate::Counter((text).parse::<u16>().map_err(|_| err)?)).to_string()
        );

        let codec = resolve(&catalog, parse_quote!(Vec<u8>)).unwrap();
        assert!(matches!(codec.base, CodecBase::Kind(KindCodec::Bytes(SliceShape::Vec))));
        let codec = resolve(&catalog, parse_quote!([u8; 16])).unwrap();
        assert!(matches!(codec.base, CodecBase::Kind(KindCodec::HexBytes(16))));
    }

    #[test]
    fn hex_decoder_accepts_only_hex_digits() {
        let catalog = catalog();
        let codec = resolve(&catalog, parse_quote!([u8; 2])).unwrap();
        let decoded = codec.decode(quote!(value), &quote!(err)).unwrap().to_string();
        assert!(decoded.contains(&quote!(text.bytes().all(|b| b.is_ascii_hexdigit())).to_string()));
    }

    #[test]
    fn empty_text_decodes_to_none() {
        let catalog = catalog();
        let codec = resolve(&catalog, parse_quote!(Option<String>)).unwrap();
        let decoded = codec.decode(quote!(value), &quote!(err)).unwrap();
        assert_eq!(
            decoded.to_string(),
            quote! {
                if (value).is_empty() {
                    ::core::option::Option::None
                } else {
                    ::core::option::Option::Some((value).to_string())
                }
            }
            .to_string()
        );
    }

    #[test]
    fn unsupported_types_have_no_codec() {
        let catalog = catalog();
        assert!(resolve(&catalog, parse_quote!(Blob)).is_none());
        assert!(resolve(&catalog, parse_quote!(Vec<u32>)).is_none());
        assert!(resolve(&catalog, parse_quote!(std::collections::HashMap<String, u8>)).is_none());
    }

    proptest! {
        #[test]
        fn primitive_codecs_parse_into_their_own_kind(
            kind in proptest::sample::select(PrimitiveKind::iter().collect::<Vec<_>>())
        ) {
            let catalog = catalog();
            let codec = resolve(&catalog, kind.to_type()).unwrap();
            prop_assert!(codec.can_decode());
            let CodecBase::Kind(base) = codec.base else {
                panic!("expected kind dispatch");
            };
            match base {
                KindCodec::String => prop_assert_eq!(kind, PrimitiveKind::String),
                other => prop_assert_eq!(other.parse_kind(), Some(kind)),
            }
        }
    }
}
