//! Type catalog.
//!
//! Every type declaration of every loaded package is indexed by its qualified
//! name before anything is classified. `impl` blocks and derive lists are
//! attached in a second phase, so a method declared in one file on a type
//! declared in another is found regardless of file order.
//!
//! # Example Flow
//!
//! ```text
//! Vec<Package>
//!     ↓ phase 1: structs / enums / aliases → arena + name index
//!     ↓ phase 2: impl blocks + #[derive(..)] → methods, traits
//! TypeCatalog
//!     ↓ resolve(package, path)
//! Resolution::{Decl, External, Unknown}
//! ```

pub mod signature;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, trace};
use syn::punctuated::Punctuated;
use syn::{Attribute, Fields, Item, Token, Type};

use crate::loader::{Import, LoadedSources, Package};
pub use signature::{MethodPattern, MethodSignature, Receiver, derive_signatures, normalize_type};

/// Bound on `pub use` chains followed while resolving a path.
const MAX_REEXPORT_DEPTH: usize = 8;

pub type DeclId = usize;

#[derive(Debug, Clone)]
pub enum DeclShape {
    /// Struct with named fields
    Struct(Vec<syn::Field>),
    /// Tuple struct; a newtype when it has exactly one field
    Tuple(Vec<syn::Field>),
    Unit,
    Enum,
    /// `type X = T;`
    Alias(Type),
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub id: DeclId,
    pub name: String,
    /// Qualified module name of the owning package
    pub package: String,
    pub crate_name: String,
    pub module: Vec<String>,
    pub shape: DeclShape,
    pub generic: bool,
    pub exported: bool,
    pub is_test: bool,
    pub attrs: Vec<Attribute>,
    pub traits: BTreeSet<String>,
    pub methods: Vec<MethodSignature>,
}

impl TypeDecl {
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.package, self.name)
    }

    pub fn segments(&self) -> Vec<String> {
        let mut segments = vec![self.crate_name.clone()];
        segments.extend(self.module.iter().cloned());
        segments.push(self.name.clone());
        segments
    }

    pub fn named_fields(&self) -> Option<&[syn::Field]> {
        match &self.shape {
            DeclShape::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// The wrapped type of a single-field tuple struct.
    pub fn newtype_inner(&self) -> Option<&Type> {
        match &self.shape {
            DeclShape::Tuple(fields) if fields.len() == 1 => Some(&fields[0].ty),
            _ => None,
        }
    }

    pub fn implements(&self, trait_name: &str) -> bool {
        self.traits.contains(trait_name)
    }

    pub fn find_method(&self, name: &str) -> impl Iterator<Item = &MethodSignature> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn provides(&self, pattern: &MethodPattern) -> bool {
        self.methods.iter().any(|m| pattern.matches(m, &self.name))
    }
}

/// Outcome of resolving a path in the context of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Decl(DeclId),
    /// Path into a crate that is known but not loaded
    External { crate_name: String, path: Vec<String> },
    Unknown,
}

#[derive(Debug, Clone)]
struct Scope {
    crate_name: String,
    module: Vec<String>,
    imports: Vec<Import>,
}

impl Scope {
    fn segments(&self) -> Vec<String> {
        let mut segments = vec![self.crate_name.clone()];
        segments.extend(self.module.iter().cloned());
        segments
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    decls: Vec<TypeDecl>,
    by_name: HashMap<String, DeclId>,
    scopes: BTreeMap<String, Scope>,
    crates: BTreeSet<String>,
    external: BTreeMap<String, std::path::PathBuf>,
}

impl TypeCatalog {
    pub fn index(sources: &LoadedSources) -> Self {
        let mut catalog = Self::default();
        catalog.add(sources);
        debug!(
            "TypeCatalog: indexed {} declarations in {} packages",
            catalog.decls.len(),
            catalog.scopes.len()
        );
        catalog
    }

    /// Add second-pass packages. Crates already indexed are left untouched.
    pub fn extend(&mut self, sources: &LoadedSources) {
        let before = self.decls.len();
        self.add(sources);
        debug!(
            "TypeCatalog: extended with {} declarations",
            self.decls.len() - before
        );
    }

    fn add(&mut self, sources: &LoadedSources) {
        let fresh: Vec<&Package> = sources
            .packages
            .iter()
            .filter(|p| !self.crates.contains(&p.crate_name))
            .collect();

        for package in &fresh {
            self.index_package(package);
        }
        for name in &sources.crates {
            self.crates.insert(name.clone());
            self.external.remove(name);
        }
        for (name, root) in &sources.dependency_roots {
            if !self.crates.contains(name) {
                self.external.entry(name.clone()).or_insert_with(|| root.clone());
            }
        }
        for package in &fresh {
            self.attach_impls(package);
        }
    }

    fn index_package(&mut self, package: &Package) {
        let name = package.name();
        self.scopes.insert(
            name.clone(),
            Scope {
                crate_name: package.crate_name.clone(),
                module: package.module.clone(),
                imports: package.imports.clone(),
            },
        );

        for item in &package.items {
            let (ident, generics, vis, attrs, shape) = match item {
                Item::Struct(s) => {
                    let shape = match &s.fields {
                        Fields::Named(named) => DeclShape::Struct(named.named.iter().cloned().collect()),
                        Fields::Unnamed(unnamed) => {
                            DeclShape::Tuple(unnamed.unnamed.iter().cloned().collect())
                        }
                        Fields::Unit => DeclShape::Unit,
                    };
                    (&s.ident, &s.generics, &s.vis, &s.attrs, shape)
                }
                Item::Enum(e) => (&e.ident, &e.generics, &e.vis, &e.attrs, DeclShape::Enum),
                Item::Type(t) => (
                    &t.ident,
                    &t.generics,
                    &t.vis,
                    &t.attrs,
                    DeclShape::Alias((*t.ty).clone()),
                ),
                _ => continue,
            };

            let id = self.decls.len();
            let mut decl = TypeDecl {
                id,
                name: ident.to_string(),
                package: name.clone(),
                crate_name: package.crate_name.clone(),
                module: package.module.clone(),
                shape,
                generic: !generics.params.is_empty(),
                exported: !matches!(vis, syn::Visibility::Inherited),
                is_test: package.is_test,
                attrs: attrs.clone(),
                traits: BTreeSet::new(),
                methods: Vec::new(),
            };
            for derive in derives(attrs) {
                if let Some((trait_name, methods)) = derive_signatures(&derive) {
                    decl.traits.insert(trait_name.to_string());
                    decl.methods.extend(methods);
                }
                decl.traits.insert(derive);
            }

            trace!("TypeCatalog: {} -> #{id}", decl.qualified_name());
            self.by_name.insert(decl.qualified_name(), id);
            self.decls.push(decl);
        }
    }

    fn attach_impls(&mut self, package: &Package) {
        let name = package.name();
        for item in &package.items {
            let Item::Impl(block) = item else {
                continue;
            };
            let Type::Path(self_ty) = &*block.self_ty else {
                continue;
            };
            let Resolution::Decl(id) = self.resolve(&name, &path_segments(&self_ty.path)) else {
                trace!("TypeCatalog: impl target in {name} not in catalog");
                continue;
            };

            let trait_name = block
                .trait_
                .as_ref()
                .and_then(|(_, path, _)| path.segments.last())
                .map(|s| s.ident.to_string());
            let decl = &mut self.decls[id];
            if let Some(t) = &trait_name {
                decl.traits.insert(t.clone());
            }
            for impl_item in &block.items {
                if let syn::ImplItem::Fn(f) = impl_item {
                    decl.methods
                        .push(MethodSignature::from_signature(&f.sig, trait_name.clone()));
                }
            }
        }
    }

    pub fn decl(&self, id: DeclId) -> &TypeDecl {
        &self.decls[id]
    }

    pub fn decls(&self) -> impl Iterator<Item = &TypeDecl> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Lookup by exact qualified name, `crate::module::Name`.
    pub fn find(&self, qualified: &str) -> Option<&TypeDecl> {
        self.by_name.get(qualified).map(|&id| &self.decls[id])
    }

    pub fn is_loaded(&self, crate_name: &str) -> bool {
        self.crates.contains(crate_name)
    }

    /// Known dependency crates that have not been loaded, with their roots.
    pub fn external_roots(&self) -> &BTreeMap<String, std::path::PathBuf> {
        &self.external
    }

    pub fn register_external(&mut self, name: &str, root: std::path::PathBuf) {
        if !self.crates.contains(name) {
            self.external.insert(name.to_string(), root);
        }
    }

    /// Full path bound by a non-glob `use` in `package`.
    pub fn import_path(&self, package: &str, alias: &str) -> Option<&[String]> {
        self.scopes
            .get(package)?
            .imports
            .iter()
            .find(|i| !i.glob && i.alias == alias)
            .map(|i| i.path.as_slice())
    }

    /// Resolve a `::`-separated name as written in `package`.
    pub fn resolve_str(&self, package: &str, path: &str) -> Resolution {
        let segments: Vec<String> = path
            .trim_start_matches("::")
            .split("::")
            .map(str::to_string)
            .collect();
        self.resolve(package, &segments)
    }

    pub fn resolve(&self, package: &str, path: &[String]) -> Resolution {
        let resolution = self.resolve_in(package, path, 0);
        trace!("TypeCatalog: resolve {}::{{{}}} -> {resolution:?}", package, path.join("::"));
        resolution
    }

    fn resolve_in(&self, package: &str, path: &[String], depth: usize) -> Resolution {
        if depth > MAX_REEXPORT_DEPTH || path.is_empty() {
            return Resolution::Unknown;
        }
        let Some(scope) = self.scopes.get(package) else {
            return self.lookup_absolute(path, depth);
        };

        let first = path[0].as_str();
        match first {
            "crate" => {
                let mut absolute = vec![scope.crate_name.clone()];
                absolute.extend_from_slice(&path[1..]);
                return self.lookup_absolute(&absolute, depth);
            }
            "self" => {
                let mut absolute = scope.segments();
                absolute.extend_from_slice(&path[1..]);
                return self.lookup_absolute(&absolute, depth);
            }
            "super" => {
                let mut base = scope.segments();
                let mut rest = path;
                while rest.first().is_some_and(|s| s == "super") {
                    if base.len() <= 1 {
                        return Resolution::Unknown;
                    }
                    base.pop();
                    rest = &rest[1..];
                }
                base.extend_from_slice(rest);
                return self.lookup_absolute(&base, depth);
            }
            _ => {}
        }

        // Declared in this module, or a path through a child module.
        let mut local = scope.segments();
        local.extend_from_slice(path);
        if let Resolution::Decl(id) = self.lookup_absolute(&local, depth) {
            return Resolution::Decl(id);
        }

        if let Some(import) = scope.imports.iter().find(|i| !i.glob && i.alias == first) {
            let mut expanded = import.path.clone();
            expanded.extend_from_slice(&path[1..]);
            return self.resolve_in(package, &expanded, depth + 1);
        }

        if self.crates.contains(first) || self.external.contains_key(first) {
            return self.lookup_absolute(path, depth);
        }

        for glob in scope.imports.iter().filter(|i| i.glob) {
            let mut expanded = glob.path.clone();
            expanded.extend_from_slice(path);
            if let found @ Resolution::Decl(_) = self.resolve_in(package, &expanded, depth + 1) {
                return found;
            }
        }

        Resolution::Unknown
    }

    fn lookup_absolute(&self, path: &[String], depth: usize) -> Resolution {
        if let Some(&id) = self.by_name.get(&path.join("::")) {
            return Resolution::Decl(id);
        }
        let Some(first) = path.first() else {
            return Resolution::Unknown;
        };
        if self.external.contains_key(first) {
            return Resolution::External {
                crate_name: first.clone(),
                path: path.to_vec(),
            };
        }
        if !self.crates.contains(first) || path.len() < 2 {
            return Resolution::Unknown;
        }

        // Re-exported through the parent module.
        let (name, parent) = (&path[path.len() - 1], &path[..path.len() - 1]);
        let parent_name = parent.join("::");
        let Some(scope) = self.scopes.get(&parent_name) else {
            return Resolution::Unknown;
        };
        if let Some(import) = scope.imports.iter().find(|i| !i.glob && &i.alias == name) {
            return self.resolve_in(&parent_name, &import.path, depth + 1);
        }
        for glob in scope.imports.iter().filter(|i| i.glob) {
            let mut expanded = glob.path.clone();
            expanded.push(name.clone());
            if let found @ Resolution::Decl(_) = self.resolve_in(&parent_name, &expanded, depth + 1)
            {
                return found;
            }
        }
        Resolution::Unknown
    }
}

/// Identifier segments of a path, generic arguments dropped.
pub fn path_segments(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|s| s.ident.to_string()).collect()
}

/// Last segment of every path in every `#[derive(..)]`.
fn derives(attrs: &[Attribute]) -> Vec<String> {
    let mut out = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("derive")) {
        let Ok(paths) = attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
        else {
            continue;
        };
        out.extend(
            paths
                .iter()
                .filter_map(|p| p.segments.last())
                .map(|s| s.ident.to_string()),
        );
    }
    out
}
