//! Per-field `#[model(..)]` annotations.
//!
//! The tag is a string: options separated by `,`, each `key` or
//! `key=value;value`. A backslash escapes the next character.
//!
//! ```ignore
//! #[model("pk")]
//! #[model = "many2many=UserGroups"]
//! #[model("name=display\\,name, attr")]
//! ```

use log::warn;
use syn::{Attribute, Expr, Lit, LitStr, Meta};

pub use netabase_codegen_annotations::{Annotation, AnnotationKey};

pub const ATTRIBUTE_NAME: &str = "model";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSet {
    entries: Vec<Annotation>,
}

impl AnnotationSet {
    pub fn parse(tag: &str) -> Self {
        Self {
            entries: netabase_codegen_annotations::parse_tag(tag),
        }
    }

    /// Collect every `#[model("..")]` / `#[model = ".."]` on a field.
    pub fn from_attrs(attrs: &[Attribute]) -> Result<Self, String> {
        let mut set = Self::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident(ATTRIBUTE_NAME)) {
            let tag = match &attr.meta {
                Meta::List(_) => attr
                    .parse_args::<LitStr>()
                    .map_err(|e| format!("malformed #[model] attribute: {e}"))?
                    .value(),
                Meta::NameValue(nv) => match &nv.value {
                    Expr::Lit(expr) => match &expr.lit {
                        Lit::Str(s) => s.value(),
                        _ => return Err("#[model = ..] expects a string literal".into()),
                    },
                    _ => return Err("#[model = ..] expects a string literal".into()),
                },
                Meta::Path(_) => return Err("#[model] needs a tag string".into()),
            };
            set.entries.extend(Self::parse(&tag).entries);
        }
        Ok(set)
    }

    pub fn entries(&self) -> &[Annotation] {
        &self.entries
    }

    pub fn get(&self, key: AnnotationKey) -> Option<&Annotation> {
        self.entries.iter().find(|a| a.known() == Some(key))
    }

    pub fn has(&self, key: AnnotationKey) -> bool {
        self.get(key).is_some()
    }

    pub fn is_ignored(&self) -> bool {
        self.has(AnnotationKey::Ignore)
    }

    pub fn name_override(&self) -> Option<&str> {
        self.get(AnnotationKey::Name)?.values.first().map(String::as_str)
    }

    /// Explicit join entity of a `many2many=Join` option.
    pub fn join_name(&self) -> Option<&str> {
        self.get(AnnotationKey::ManyToMany)?
            .values
            .first()
            .map(String::as_str)
    }

    pub fn warn_unknown(&self, entity: &str, field: &str) {
        for entry in &self.entries {
            if entry.known().is_none() {
                warn!("{entity}.{field}: ignoring unknown annotation key {:?}", entry.key);
            }
        }
    }
}
