//! The `#[model(..)]` tag grammar.
//!
//! A tag is a string of options separated by `,`, each `key` or
//! `key=value;value`. A backslash escapes the next character, so
//! `name=first\,last` names a field `first,last`.
//!
//! # Example
//!
//! ```
//! use netabase_codegen_annotations::{AnnotationKey, parse_tag};
//!
//! let options = parse_tag(r"pk, name=first\,last");
//! assert_eq!(options[0].known(), Some(AnnotationKey::Primary));
//! assert_eq!(options[1].values, ["first,last"]);
//! ```

use std::str::FromStr;

use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum AnnotationKey {
    #[strum(serialize = "-")]
    Ignore,
    #[strum(serialize = "pk", serialize = "primary")]
    Primary,
    #[strum(serialize = "attr")]
    Attribute,
    #[strum(serialize = "relation", serialize = "rel")]
    Relation,
    #[strum(serialize = "many2many")]
    ManyToMany,
    #[strum(serialize = "name")]
    Name,
}

/// One option of a tag, with escapes already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub key: String,
    pub values: Vec<String>,
}

impl Annotation {
    pub fn known(&self) -> Option<AnnotationKey> {
        AnnotationKey::from_str(&self.key).ok()
    }
}

/// Parse a tag into its options. Empty options are dropped.
pub fn parse_tag(tag: &str) -> Vec<Annotation> {
    split_unescaped(tag, ',', usize::MAX)
        .into_iter()
        .filter_map(|option| {
            let mut parts = split_unescaped(&option, '=', 2).into_iter();
            let key = unescape(parts.next()?.trim());
            if key.is_empty() {
                return None;
            }
            let values = parts
                .next()
                .map(|raw| {
                    split_unescaped(&raw, ';', usize::MAX)
                        .iter()
                        .map(|v| unescape(v.trim()))
                        .filter(|v| !v.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            Some(Annotation { key, values })
        })
        .collect()
}

/// Split on unescaped `sep`, at most `limit` pieces. Escapes are kept.
fn split_unescaped(input: &str, sep: char, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == sep && pieces.len() + 1 < limit {
            pieces.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    pieces.push(current);
    pieces
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}
