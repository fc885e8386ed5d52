//! Absolute paths for emitted code.
//!
//! Field types are written relative to the module that declares them. The
//! generated code lives elsewhere, so every path is rewritten: declarations of
//! the emitting crate become `crate::..`, other crates `::name::..`, imported
//! std items are expanded through their `use`.

use proc_macro2::Span;
use syn::visit_mut::{self, VisitMut};
use syn::{Ident, Path, PathSegment, Type, TypePath};

use crate::catalog::{DeclId, Resolution, TypeCatalog, path_segments};
use crate::types::{PrimitiveKind, TypeDescriptor};

/// Names that need no qualification in any module.
const PRELUDE: &[&str] = &["Option", "Vec", "String", "Box", "Self"];

pub struct PathQualifier<'a> {
    catalog: &'a TypeCatalog,
    crate_name: &'a str,
}

impl<'a> PathQualifier<'a> {
    pub fn new(catalog: &'a TypeCatalog, crate_name: &'a str) -> Self {
        Self {
            catalog,
            crate_name,
        }
    }

    pub fn catalog(&self) -> &'a TypeCatalog {
        self.catalog
    }

    pub fn decl_path(&self, id: DeclId) -> Path {
        let decl = self.catalog.decl(id);
        let mut segments = decl.segments();
        let leading = if decl.crate_name == self.crate_name {
            segments[0] = "crate".to_string();
            false
        } else {
            true
        };
        build_path(&segments, leading)
    }

    pub fn descriptor(&self, desc: &TypeDescriptor) -> Type {
        self.qualify(&desc.package, &desc.ty)
    }

    pub fn qualify(&self, package: &str, ty: &Type) -> Type {
        let mut ty = ty.clone();
        Rewriter {
            qualifier: self,
            package,
        }
        .visit_type_mut(&mut ty);
        ty
    }
}

struct Rewriter<'q, 'a> {
    qualifier: &'q PathQualifier<'a>,
    package: &'q str,
}

impl VisitMut for Rewriter<'_, '_> {
    fn visit_type_path_mut(&mut self, node: &mut TypePath) {
        if node.qself.is_none() {
            if let Some(rewritten) = self.rewrite(&node.path) {
                let arguments = node
                    .path
                    .segments
                    .last()
                    .map(|s| s.arguments.clone())
                    .unwrap_or_default();
                node.path = rewritten;
                if let Some(last) = node.path.segments.last_mut() {
                    last.arguments = arguments;
                }
            }
        }
        visit_mut::visit_type_path_mut(self, node);
    }
}

impl Rewriter<'_, '_> {
    fn rewrite(&self, path: &Path) -> Option<Path> {
        if path.leading_colon.is_some() {
            return None;
        }
        let catalog = self.qualifier.catalog;
        let segments = path_segments(path);

        match catalog.resolve(self.package, &segments) {
            Resolution::Decl(id) => return Some(self.qualifier.decl_path(id)),
            Resolution::External { path, .. } => return Some(build_path(&path, true)),
            Resolution::Unknown => {}
        }

        let first = segments.first()?;
        if segments.len() == 1
            && (PRELUDE.contains(&first.as_str()) || first.parse::<PrimitiveKind>().is_ok())
        {
            return None;
        }
        if let Some(import) = catalog.import_path(self.package, first) {
            let mut expanded = import.to_vec();
            expanded.extend_from_slice(&segments[1..]);
            if !matches!(expanded[0].as_str(), "crate" | "self" | "super") {
                return Some(build_path(&expanded, true));
            }
            return None;
        }
        if segments.len() > 1 {
            return Some(build_path(&segments, true));
        }
        None
    }
}

fn build_path(segments: &[String], leading_colon: bool) -> Path {
    let mut path = Path {
        leading_colon: leading_colon.then(Default::default),
        segments: Default::default(),
    };
    for segment in segments {
        path.segments
            .push(PathSegment::from(Ident::new(segment, Span::call_site())));
    }
    path
}
