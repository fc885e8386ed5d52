//! Field classification.
//!
//! Every non-generic struct with named fields is a candidate. Its exported
//! fields are walked in declaration order and each one gets a [`Role`]. A
//! candidate becomes an [`Entity`] when exactly one field ends up primary.
//!
//! # Example Flow
//!
//! ```text
//! TypeDecl (struct, named fields)
//!     ↓ exported fields only, ordinal = position among them
//!     ↓ #[model(..)] → AnnotationSet
//!     ↓ primary: `pk` tag, else a field named `id`
//!     ↓ relation: tag, or target struct has a primary (one level)
//!     ↓ field type in an unloaded crate → deferred
//! Entity { fields, primary, relations }
//! ```

pub mod annotation;

use std::collections::BTreeSet;

use heck::ToSnakeCase;
use log::{debug, trace};
use syn::Visibility;

use crate::catalog::{DeclId, TypeCatalog, TypeDecl};
use crate::codec::StringCodec;
use crate::error::{CodegenError, CodegenResult};
use crate::relation::{self, RelationInfo};
use crate::types::{TypeDescriptor, TypeKind, describe_field};
use crate::zero::ZeroMetadata;
pub use annotation::{Annotation, AnnotationKey, AnnotationSet};

/// Locals used by emitted accessor bodies.
const RESERVED_LOCALS: &[&str] = &[
    "index", "value", "model", "models", "items", "grown", "position", "e",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Primary,
    Attribute,
    Relation,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Field {
    /// Position among exported fields; dispatch key of emitted accessors
    pub index: usize,
    pub ident: syn::Ident,
    pub ty: TypeDescriptor,
    pub annotations: AnnotationSet,
    pub role: Role,
    pub relation: Option<RelationInfo>,
    pub pointer: bool,
    pub elem_pointer: bool,
    pub array_len: Option<usize>,
    pub zero: Option<ZeroMetadata>,
    pub codec: Option<StringCodec>,
    /// Type lives in a dependency crate that is not loaded yet
    pub deferred: bool,
}

impl Field {
    pub fn name(&self) -> String {
        self.ident.to_string()
    }

    pub fn is_accessible(&self) -> bool {
        self.role != Role::Ignored
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub decl: DeclId,
    pub package: String,
    pub crate_name: String,
    pub module: Vec<String>,
    /// Binding name for down-cast values in emitted code
    pub receiver: String,
    pub fields: Vec<Field>,
    /// Position of the primary field in `fields`
    pub primary: usize,
    /// Positions of relation fields in `fields`
    pub relations: Vec<usize>,
    pub is_test: bool,
}

impl Entity {
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.package, self.name)
    }

    pub fn primary_field(&self) -> &Field {
        &self.fields[self.primary]
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.role == Role::Attribute)
    }

    pub fn has_attributes(&self) -> bool {
        self.attributes().next().is_some()
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &Field> {
        self.relations.iter().map(|&i| &self.fields[i])
    }

    pub fn has_single_relation(&self) -> bool {
        self.relation_fields().any(|f| {
            f.relation
                .as_ref()
                .is_some_and(|r| r.cardinality == relation::Cardinality::Single)
        })
    }

    pub fn has_multi_relation(&self) -> bool {
        self.relation_fields().any(|f| {
            f.relation
                .as_ref()
                .is_some_and(|r| r.cardinality == relation::Cardinality::Multi)
        })
    }

    pub fn deferred_crates(&self) -> BTreeSet<String> {
        let mut crates = BTreeSet::new();
        for field in self.fields.iter().filter(|f| f.deferred) {
            field.ty.imported_crates(&mut crates);
        }
        crates
    }
}

/// Name filters; a name matches by simple or qualified form.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub include: BTreeSet<String>,
    pub exclude: BTreeSet<String>,
}

impl Selection {
    fn matches(set: &BTreeSet<String>, decl: &TypeDecl) -> bool {
        set.contains(&decl.name) || set.contains(&decl.qualified_name())
    }

    pub fn selects(&self, decl: &TypeDecl) -> bool {
        if Self::matches(&self.exclude, decl) {
            return false;
        }
        self.include.is_empty() || Self::matches(&self.include, decl)
    }
}

pub struct Classifier<'a> {
    catalog: &'a TypeCatalog,
    selection: &'a Selection,
}

impl<'a> Classifier<'a> {
    pub fn new(catalog: &'a TypeCatalog, selection: &'a Selection) -> Self {
        Self { catalog, selection }
    }

    /// Classify every selected candidate declaration.
    pub fn classify(&self) -> CodegenResult<Vec<Entity>> {
        let mut entities = Vec::new();
        for decl in self.catalog.decls() {
            if decl.generic || !self.selection.selects(decl) {
                continue;
            }
            if let Some(entity) = self.classify_decl(decl)? {
                entities.push(entity);
            }
        }

        for name in &self.selection.include {
            let found = entities
                .iter()
                .any(|e| &e.name == name || &e.qualified_name() == name);
            if !found {
                return Err(CodegenError::ModelNotFound(name.clone()));
            }
        }
        if entities.is_empty() {
            return Err(CodegenError::NoModelsFound);
        }
        debug!("Classifier: {} entities", entities.len());
        Ok(entities)
    }

    pub fn classify_decl(&self, decl: &TypeDecl) -> CodegenResult<Option<Entity>> {
        let Some(fields) = decl.named_fields() else {
            return Ok(None);
        };
        let exported: Vec<&syn::Field> = fields
            .iter()
            .filter(|f| !matches!(f.vis, Visibility::Inherited) && f.ident.is_some())
            .collect();
        if exported.is_empty() {
            return Ok(None);
        }

        let mut annotated = Vec::with_capacity(exported.len());
        for field in &exported {
            let ident = field.ident.clone().ok_or_else(|| classification(decl, "_", "unnamed field"))?;
            let annotations = AnnotationSet::from_attrs(&field.attrs)
                .map_err(|reason| classification(decl, &ident.to_string(), reason))?;
            annotations.warn_unknown(&decl.name, &ident.to_string());
            annotated.push((ident, *field, annotations));
        }

        let Some(primary) = primary_index(decl, &annotated)? else {
            debug!("Classifier: {} has no primary field, skipping", decl.qualified_name());
            return Ok(None);
        };

        let mut entity_fields = Vec::with_capacity(annotated.len());
        for (index, (ident, field, annotations)) in annotated.into_iter().enumerate() {
            let ty = describe_field(self.catalog, &decl.package, &field.ty, decl.id);
            let mut classified = Field {
                index,
                ident,
                ty,
                annotations,
                role: Role::Attribute,
                relation: None,
                pointer: false,
                elem_pointer: false,
                array_len: None,
                zero: None,
                codec: None,
                deferred: false,
            };
            self.assign_role(&mut classified, index == primary);
            trace!(
                "Classifier: {}.{} #{} -> {}",
                decl.name, classified.ident, index, classified.role
            );
            entity_fields.push(classified);
        }

        let relations = relation_positions(&entity_fields);
        let name = decl.name.clone();
        let mut receiver = name.to_snake_case();
        if syn::parse_str::<syn::Ident>(&receiver).is_err()
            || RESERVED_LOCALS.contains(&receiver.as_str())
        {
            receiver.push('_');
        }

        Ok(Some(Entity {
            name,
            decl: decl.id,
            package: decl.package.clone(),
            crate_name: decl.crate_name.clone(),
            module: decl.module.clone(),
            receiver,
            fields: entity_fields,
            primary,
            relations,
            is_test: decl.is_test,
        }))
    }

    /// Re-describe deferred fields against the extended catalog.
    pub fn back_patch(&self, entity: &mut Entity) {
        for field in entity.fields.iter_mut().filter(|f| f.deferred) {
            let written = field.ty.ty.clone();
            field.ty = describe_field(self.catalog, &entity.package, &written, entity.decl);
            let primary = field.role == Role::Primary;
            self.assign_role(field, primary);
            debug!(
                "Classifier: back-patched {}.{} -> {}",
                entity.name, field.ident, field.role
            );
        }
        entity.relations = relation_positions(&entity.fields);
    }

    fn assign_role(&self, field: &mut Field, primary: bool) {
        let annotations = &field.annotations;
        let target = field.ty.deref_target();
        let mut crates = BTreeSet::new();
        field.ty.imported_crates(&mut crates);

        let role = if annotations.is_ignored() {
            Role::Ignored
        } else if primary {
            Role::Primary
        } else if annotations.has(AnnotationKey::Attribute) {
            Role::Attribute
        } else if annotations.has(AnnotationKey::Relation)
            || annotations.has(AnnotationKey::ManyToMany)
            || self.targets_model(target)
        {
            Role::Relation
        } else if matches!(
            field.ty.strip_pointers().kind,
            TypeKind::Channel | TypeKind::Reference
        ) {
            Role::Ignored
        } else {
            Role::Attribute
        };

        let shape = relation::shape(&field.ty);
        let relation = (role == Role::Relation)
            .then(|| RelationInfo::new(shape, target, annotations));
        let deferred = !crates.is_empty() && role != Role::Ignored;

        field.role = role;
        field.relation = relation;
        field.deferred = deferred;
        field.pointer = shape.pointer;
        field.elem_pointer = shape.elem_pointer;
        field.array_len = shape.array_len;
    }

    /// One level only: the target's own fields are not described.
    fn targets_model(&self, target: &TypeDescriptor) -> bool {
        let TypeKind::Struct(id) = target.kind else {
            return false;
        };
        let decl = self.catalog.decl(id);
        let Some(fields) = decl.named_fields() else {
            return false;
        };
        let exported: Vec<&syn::Field> = fields
            .iter()
            .filter(|f| !matches!(f.vis, Visibility::Inherited))
            .collect();
        let tags: Vec<AnnotationSet> = exported
            .iter()
            .map(|f| AnnotationSet::from_attrs(&f.attrs).unwrap_or_default())
            .collect();
        if tags.iter().any(|t| t.has(AnnotationKey::Primary) && !t.is_ignored()) {
            return true;
        }
        exported
            .iter()
            .zip(&tags)
            .any(|(f, t)| !t.is_ignored() && f.ident.as_ref().is_some_and(is_id))
    }
}

fn is_id(ident: &syn::Ident) -> bool {
    ident.to_string().eq_ignore_ascii_case("id")
}

fn primary_index(
    decl: &TypeDecl,
    fields: &[(syn::Ident, &syn::Field, AnnotationSet)],
) -> CodegenResult<Option<usize>> {
    let explicit: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, (_, _, a))| a.has(AnnotationKey::Primary) && !a.is_ignored())
        .map(|(i, _)| i)
        .collect();
    match explicit.as_slice() {
        [] => {}
        [only] => return Ok(Some(*only)),
        [_, second, ..] => {
            return Err(classification(
                decl,
                &fields[*second].0.to_string(),
                "more than one field is tagged primary",
            ));
        }
    }

    Ok(fields.iter().position(|(ident, _, a)| {
        is_id(ident)
            && !a.is_ignored()
            && !a.has(AnnotationKey::Relation)
            && !a.has(AnnotationKey::ManyToMany)
    }))
}

fn relation_positions(fields: &[Field]) -> Vec<usize> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.role == Role::Relation)
        .map(|(i, _)| i)
        .collect()
}

fn classification(decl: &TypeDecl, field: &str, reason: impl Into<String>) -> CodegenError {
    CodegenError::Classification {
        entity: decl.qualified_name(),
        field: field.to_string(),
        reason: reason.into(),
    }
}
