//! Recorded method signatures.
//!
//! Methods found in `impl` blocks (and the ones implied by well-known derives)
//! are stored in a normalized, path-insensitive form so that capability probes
//! can compare them by plain string equality.

use quote::ToTokens;
use syn::{FnArg, GenericArgument, PathArguments, ReturnType, Signature, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Associated function, no `self`
    None,
    Ref,
    RefMut,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    /// Last path segment of the implemented trait, if any
    pub trait_name: Option<String>,
    pub receiver: Receiver,
    /// Normalized parameter types, receiver excluded
    pub params: Vec<String>,
    /// Normalized return type, `()` when omitted
    pub returns: String,
}

impl MethodSignature {
    pub fn from_signature(sig: &Signature, trait_name: Option<String>) -> Self {
        let mut receiver = Receiver::None;
        let mut params = Vec::new();

        for input in &sig.inputs {
            match input {
                FnArg::Receiver(r) => {
                    receiver = match (&r.reference, r.mutability.is_some()) {
                        (Some(_), true) => Receiver::RefMut,
                        (Some(_), false) => Receiver::Ref,
                        (None, _) => Receiver::Value,
                    };
                }
                FnArg::Typed(pat) => params.push(normalize_type(&pat.ty)),
            }
        }

        let returns = match &sig.output {
            ReturnType::Default => "()".to_string(),
            ReturnType::Type(_, ty) => normalize_type(ty),
        };

        Self {
            name: sig.ident.to_string(),
            trait_name,
            receiver,
            params,
            returns,
        }
    }

    fn synthesized(
        name: &str,
        trait_name: &str,
        receiver: Receiver,
        params: &[&str],
        returns: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            trait_name: Some(trait_name.to_string()),
            receiver,
            params: params.iter().map(|p| p.to_string()).collect(),
            returns: returns.to_string(),
        }
    }
}

/// Shape a recorded method must have to provide a capability.
///
/// Types in `params` and `returns` are normalized strings where `_` stands
/// for any single type and `Self` also accepts the declaring type's name.
#[derive(Debug, Clone, Copy)]
pub struct MethodPattern {
    /// `None` accepts inherent and trait methods alike
    pub trait_name: Option<&'static str>,
    pub name: &'static str,
    pub receiver: Receiver,
    pub params: &'static [&'static str],
    pub returns: &'static str,
}

impl MethodPattern {
    pub fn matches(&self, sig: &MethodSignature, self_name: &str) -> bool {
        if sig.name != self.name || sig.receiver != self.receiver {
            return false;
        }
        if let Some(expected) = self.trait_name
            && sig.trait_name.as_deref() != Some(expected)
        {
            return false;
        }
        sig.params.len() == self.params.len()
            && self
                .params
                .iter()
                .zip(&sig.params)
                .all(|(pattern, actual)| shape_matches(pattern, actual, self_name))
            && shape_matches(self.returns, &sig.returns, self_name)
    }
}

/// Compare a normalized type against a pattern.
pub fn shape_matches(pattern: &str, actual: &str, self_name: &str) -> bool {
    let pattern = tokenize(pattern);
    let actual = tokenize(actual);
    let mut at = 0;
    for token in &pattern {
        if at >= actual.len() {
            return false;
        }
        match token.as_str() {
            "_" => at = skip_type(&actual, at),
            "Self" if actual[at] == "Self" || actual[at] == self_name => at += 1,
            expected if actual[at] == expected => at += 1,
            _ => return false,
        }
    }
    at == actual.len()
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut ident = String::new();
    for c in input.chars() {
        if c.is_alphanumeric() || c == '_' {
            ident.push(c);
            continue;
        }
        if !ident.is_empty() {
            tokens.push(std::mem::take(&mut ident));
        }
        if !c.is_whitespace() {
            tokens.push(c.to_string());
        }
    }
    if !ident.is_empty() {
        tokens.push(ident);
    }
    tokens
}

/// Index just past one balanced type starting at `at`.
fn skip_type(tokens: &[String], mut at: usize) -> usize {
    let mut depth = 0usize;
    while at < tokens.len() {
        match tokens[at].as_str() {
            "<" | "[" | "(" => depth += 1,
            ">" | "]" | ")" if depth == 0 => return at,
            ">" | "]" | ")" => {
                depth -= 1;
                if depth == 0 {
                    return at + 1;
                }
            }
            "," if depth == 0 => return at,
            "&" | "mut" => {}
            _ if depth == 0 && tokens.get(at + 1).is_none_or(|next| next != "<") => {
                return at + 1;
            }
            _ => {}
        }
        at += 1;
    }
    at
}

/// Trait implied by a derive, with the methods that derive generates.
pub fn derive_signatures(derive: &str) -> Option<(&'static str, Vec<MethodSignature>)> {
    match derive {
        "Display" => Some((
            "Display",
            vec![MethodSignature::synthesized(
                "fmt",
                "Display",
                Receiver::Ref,
                &["&mut Formatter"],
                "Result",
            )],
        )),
        "EnumString" | "FromStr" => Some((
            "FromStr",
            vec![MethodSignature::synthesized(
                "from_str",
                "FromStr",
                Receiver::None,
                &["&str"],
                "Result<Self,Err>",
            )],
        )),
        _ => None,
    }
}

/// Render a type without paths, lifetimes or whitespace.
///
/// `&'a mut std::fmt::Formatter<'_>` becomes `&mut Formatter`, and
/// `Result<Self, Self::Err>` becomes `Result<Self,Err>`.
pub fn normalize_type(ty: &Type) -> String {
    match ty {
        Type::Reference(r) => {
            let inner = normalize_type(&r.elem);
            if r.mutability.is_some() {
                format!("&mut {inner}")
            } else {
                format!("&{inner}")
            }
        }
        Type::Path(p) => {
            let Some(last) = p.path.segments.last() else {
                return String::new();
            };
            let mut out = last.ident.to_string();
            if let PathArguments::AngleBracketed(args) = &last.arguments {
                let inner: Vec<String> = args
                    .args
                    .iter()
                    .filter_map(|arg| match arg {
                        GenericArgument::Type(t) => Some(normalize_type(t)),
                        _ => None,
                    })
                    .collect();
                if !inner.is_empty() {
                    out.push('<');
                    out.push_str(&inner.join(","));
                    out.push('>');
                }
            }
            out
        }
        Type::Slice(s) => format!("[{}]", normalize_type(&s.elem)),
        Type::Array(a) => format!("[{};{}]", normalize_type(&a.elem), a.len.to_token_stream()),
        Type::Tuple(t) => {
            let inner: Vec<String> = t.elems.iter().map(normalize_type).collect();
            format!("({})", inner.join(","))
        }
        Type::Paren(p) => normalize_type(&p.elem),
        Type::Group(g) => normalize_type(&g.elem),
        other => other.to_token_stream().to_string().replace(' ', ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn normalizes_paths_and_lifetimes() {
        assert_eq!(
            normalize_type(&parse_quote!(&'a mut std::fmt::Formatter<'_>)),
            "&mut Formatter"
        );
        assert_eq!(
            normalize_type(&parse_quote!(Result<Self, Self::Err>)),
            "Result<Self,Err>"
        );
        assert_eq!(normalize_type(&parse_quote!(&'static str)), "&str");
        assert_eq!(normalize_type(&parse_quote!(())), "()");
    }

    #[test]
    fn records_receiver_and_params() {
        let item: syn::ImplItemFn = parse_quote! {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result { Ok(()) }
        };
        let sig = MethodSignature::from_signature(&item.sig, Some("Display".into()));
        assert_eq!(sig.receiver, Receiver::Ref);
        assert_eq!(sig.params, ["&mut Formatter"]);
        assert_eq!(sig.returns, "Result");

        let item: syn::ImplItemFn = parse_quote! {
            fn zero() -> Self { Self(0) }
        };
        let sig = MethodSignature::from_signature(&item.sig, None);
        assert_eq!(sig.receiver, Receiver::None);
        assert!(sig.params.is_empty());
        assert_eq!(sig.returns, "Self");
    }

    #[test]
    fn wildcards_and_self_match_shapes() {
        assert!(shape_matches("Result<Self,_>", "Result<Self,Err>", "Status"));
        assert!(shape_matches("Result<Self,_>", "Result<Status,ParseError>", "Status"));
        assert!(shape_matches("Result<Self,_>", "Result<Self,Box<Error>>", "Status"));
        assert!(!shape_matches("Result<Self,_>", "Result<Other,Err>", "Status"));
        assert!(!shape_matches("Result<Self,_>", "Option<Self>", "Status"));
        assert!(shape_matches("&str", "&str", "Status"));
        assert!(!shape_matches("String", "&str", "Status"));
    }

    #[test]
    fn patterns_check_receiver_and_trait() {
        const AS_STR: MethodPattern = MethodPattern {
            trait_name: None,
            name: "as_str",
            receiver: Receiver::Ref,
            params: &[],
            returns: "&str",
        };
        let item: syn::ImplItemFn = parse_quote! {
            pub fn as_str(&self) -> &'static str { "" }
        };
        let sig = MethodSignature::from_signature(&item.sig, None);
        assert!(AS_STR.matches(&sig, "Status"));

        let item: syn::ImplItemFn = parse_quote! {
            pub fn as_str(self) -> &'static str { "" }
        };
        let sig = MethodSignature::from_signature(&item.sig, None);
        assert!(!AS_STR.matches(&sig, "Status"));
    }

    #[test]
    fn derives_imply_signatures() {
        let (name, methods) = derive_signatures("EnumString").unwrap();
        assert_eq!(name, "FromStr");
        assert_eq!(methods[0].name, "from_str");
        assert!(derive_signatures("Debug").is_none());
    }
}
