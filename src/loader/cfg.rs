//! Evaluation of `#[cfg(..)]` predicates against enabled build tags.

use std::collections::BTreeSet;

use syn::{Attribute, Expr, Lit, Meta, punctuated::Punctuated, Token};

/// Whether an item survives the active build tags, and in which variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgState {
    Disabled,
    /// Present in production builds (and therefore in test builds too)
    Enabled,
    /// Present only because test packages were requested
    TestOnly,
}

#[derive(Debug, Clone)]
pub struct CfgEvaluator {
    tags: BTreeSet<String>,
    include_tests: bool,
}

impl CfgEvaluator {
    pub fn new(tags: BTreeSet<String>, include_tests: bool) -> Self {
        Self {
            tags,
            include_tests,
        }
    }

    /// Evaluate every `cfg` attribute on an item; they must all hold.
    pub fn state(&self, attrs: &[Attribute]) -> CfgState {
        let predicates: Vec<Meta> = attrs
            .iter()
            .filter(|attr| attr.path().is_ident("cfg"))
            .filter_map(|attr| attr.parse_args::<Meta>().ok())
            .collect();

        if predicates.is_empty() {
            return CfgState::Enabled;
        }

        let holds = |test: bool| predicates.iter().all(|p| self.eval(p, test));

        if holds(false) {
            CfgState::Enabled
        } else if self.include_tests && holds(true) {
            CfgState::TestOnly
        } else {
            CfgState::Disabled
        }
    }

    fn eval(&self, meta: &Meta, test: bool) -> bool {
        match meta {
            Meta::Path(path) => match path.get_ident().map(|i| i.to_string()) {
                Some(name) if name == "test" => test,
                Some(name) => self.tags.contains(&name),
                None => false,
            },
            Meta::NameValue(nv) => {
                let Some(key) = nv.path.get_ident().map(|i| i.to_string()) else {
                    return false;
                };
                let Expr::Lit(expr) = &nv.value else {
                    return false;
                };
                let Lit::Str(value) = &expr.lit else {
                    return false;
                };
                let value = value.value();
                if key == "feature" {
                    self.tags.contains(&value) || self.tags.contains(&format!("feature={value}"))
                } else {
                    self.tags.contains(&format!("{key}={value}"))
                }
            }
            Meta::List(list) => {
                let Ok(nested) =
                    list.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
                else {
                    return false;
                };
                if list.path.is_ident("not") {
                    nested.first().is_some_and(|m| !self.eval(m, test))
                } else if list.path.is_ident("all") {
                    nested.iter().all(|m| self.eval(m, test))
                } else if list.path.is_ident("any") {
                    nested.iter().any(|m| self.eval(m, test))
                } else {
                    false
                }
            }
        }
    }
}
