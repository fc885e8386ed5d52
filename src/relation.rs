//! Relation shapes and many-to-many join resolution.
//!
//! A relation without an explicit join name tries these candidates, first hit
//! wins:
//!
//! ```text
//! 1. Owner + Plural(Target)   in the owner's module
//! 2. Owner + Plural(Target)   in the target's module
//! 3. Target + Plural(Owner)   in the owner's module
//! 4. Target + Plural(Owner)   in the target's module
//! ```
//!
//! Both sides of a `User <-> Group` pair therefore settle on the same join.

use log::{debug, trace};

use crate::catalog::{DeclId, Resolution, TypeCatalog, TypeDecl};
use crate::classify::{AnnotationKey, AnnotationSet, Entity, Field};
use crate::error::{CodegenError, CodegenResult};
use crate::types::{TypeDescriptor, TypeKind, type_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Cardinality {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationShape {
    pub cardinality: Cardinality,
    /// Outer `Option` / `Box` / `Rc` / `Arc`
    pub pointer: bool,
    /// Wrappers around the element of a multi relation
    pub elem_pointer: bool,
    pub array_len: Option<usize>,
}

pub fn shape(ty: &TypeDescriptor) -> RelationShape {
    let outer = ty.strip_pointers();
    let (cardinality, elem_pointer, array_len) = match &outer.kind {
        TypeKind::Slice { elem, .. } => (Cardinality::Multi, elem.is_pointer(), None),
        TypeKind::Array { len, elem } => (Cardinality::Multi, elem.is_pointer(), Some(*len)),
        _ => (Cardinality::Single, false, None),
    };
    RelationShape {
        cardinality,
        pointer: ty.is_pointer(),
        elem_pointer,
        array_len,
    }
}

#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub cardinality: Cardinality,
    /// Innermost related type
    pub target_ty: TypeDescriptor,
    pub target: Option<DeclId>,
    pub many_to_many: bool,
    pub explicit_join: Option<String>,
    pub join: Option<DeclId>,
}

impl RelationInfo {
    pub fn new(shape: RelationShape, target: &TypeDescriptor, annotations: &AnnotationSet) -> Self {
        Self {
            cardinality: shape.cardinality,
            target_ty: target.clone(),
            target: match target.kind {
                TypeKind::Struct(id) => Some(id),
                _ => None,
            },
            many_to_many: annotations.has(AnnotationKey::ManyToMany),
            explicit_join: annotations.join_name().map(str::to_string),
            join: None,
        }
    }
}

/// English plural of a PascalCase name.
pub fn pluralize(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if let Some(stem) = name.strip_suffix(['y', 'Y'])
        && stem
            .chars()
            .last()
            .is_some_and(|c| c.is_alphabetic() && !"aeiouAEIOU".contains(c))
    {
        return format!("{stem}ies");
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        return format!("{name}es");
    }
    format!("{name}s")
}

pub struct RelationResolver<'a> {
    catalog: &'a TypeCatalog,
}

impl<'a> RelationResolver<'a> {
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, entity: &mut Entity) -> CodegenResult<()> {
        let owner = entity.clone();
        for &position in &entity.relations {
            let field = &mut entity.fields[position];
            let Some(info) = field.relation.as_ref() else {
                continue;
            };

            let Some(target_id) = info.target else {
                let reason = match &info.target_ty.kind {
                    TypeKind::Imported { crate_name } => {
                        format!("target type is declared in crate `{crate_name}`, which could not be loaded")
                    }
                    _ => format!(
                        "`{}` is not a struct declaration",
                        type_string(&info.target_ty.ty)
                    ),
                };
                return Err(CodegenError::relation(&owner.name, &field.ident.to_string(), reason));
            };

            if !info.many_to_many {
                continue;
            }
            if info.cardinality == Cardinality::Single {
                return Err(CodegenError::relation(
                    &owner.name,
                    &field.ident.to_string(),
                    "many2many requires a multi-valued relation",
                ));
            }

            let target = self.catalog.decl(target_id);
            let join = match info.explicit_join.as_deref() {
                Some(name) => self.explicit_join(&owner, field_name(field), name)?,
                None => self.inferred_join(&owner, field_name(field), target)?,
            };
            debug!(
                "RelationResolver: {}.{} joins through {}",
                owner.name,
                field.ident,
                self.catalog.decl(join).qualified_name()
            );
            if let Some(info) = field.relation.as_mut() {
                info.join = Some(join);
            }
        }
        Ok(())
    }

    fn explicit_join(&self, owner: &Entity, field: String, name: &str) -> CodegenResult<DeclId> {
        if let Resolution::Decl(id) = self.catalog.resolve_str(&owner.package, name) {
            return Ok(id);
        }
        if let Some(decl) = self.catalog.find(name) {
            return Ok(decl.id);
        }
        Err(CodegenError::relation(
            &owner.name,
            &field,
            format!("join entity `{name}` not found"),
        ))
    }

    /// The four-step candidate order documented at module level.
    pub fn inferred_join(
        &self,
        owner: &Entity,
        field: String,
        target: &TypeDecl,
    ) -> CodegenResult<DeclId> {
        let candidates = [
            format!("{}{}", owner.name, pluralize(&target.name)),
            format!("{}{}", target.name, pluralize(&owner.name)),
        ];
        for candidate in &candidates {
            for package in [&owner.package, &target.package] {
                let qualified = format!("{package}::{candidate}");
                trace!("RelationResolver: trying {qualified}");
                if let Some(decl) = self.catalog.find(&qualified) {
                    return Ok(decl.id);
                }
            }
        }
        Err(CodegenError::relation(
            &owner.name,
            &field,
            format!(
                "no join entity found, tried {} and {}",
                candidates[0], candidates[1]
            ),
        ))
    }
}

fn field_name(field: &Field) -> String {
    field.ident.to_string()
}
