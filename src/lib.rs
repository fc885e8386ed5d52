//! # Netabase Codegen
//!
//! Generates model accessor implementations for plain Rust structs.
//!
//! Sources are parsed, never compiled. Every struct with a primary field
//! (`id`, or one annotated `#[model("pk")]`) becomes an entity, and the
//! generator emits `Model`, `Fielder` and relation trait implementations for
//! it against a contract crate (`netabase_model` by default).
//!
//! ## Pipeline
//!
//! ```text
//! patterns ─► SourceLoader ─► TypeCatalog ─► Classifier ─┬─► second load pass
//!                                                         │   (deferred dependency crates)
//!                                                         ▼
//!                   RelationResolver ─► ZeroAnalyzer / StringCodecResolver
//!                                                         ▼
//!                                     Emitter ─► SourceFormatter ─► staged write
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use netabase_codegen::{GeneratorConfig, generate};
//!
//! let config = GeneratorConfig::builder()
//!     .patterns(vec!["./my_models".to_string()])
//!     .build();
//! let report = generate(&config)?;
//! for path in &report.files {
//!     println!("wrote {}", path.display());
//! }
//! # Ok::<(), netabase_codegen::error::CodegenError>(())
//! ```

pub mod catalog;
pub mod classify;
pub mod codec;
pub mod config;
pub mod emit;
pub mod error;
pub mod loader;
pub mod relation;
pub mod types;
pub mod zero;

use std::collections::BTreeSet;
use std::path::PathBuf;

use log::{debug, info, warn};

use catalog::TypeCatalog;
use classify::{Classifier, Entity, Role, Selection};
use codec::StringCodecResolver;
use emit::Emitter;
use emit::qualify::PathQualifier;
use error::{CodegenError, CodegenResult};
use loader::{LoadedSources, SourceLoader};
use relation::RelationResolver;
use zero::{AlternateTable, ZeroAnalyzer};

pub use config::GeneratorConfig;

/// Everything the emitter needs.
#[derive(Debug)]
pub struct Analysis {
    pub catalog: TypeCatalog,
    /// Sorted by qualified name
    pub entities: Vec<Entity>,
    /// `Entity.field` attributes without a string codec
    pub skipped_string_fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub files: Vec<PathBuf>,
    pub entities: usize,
    pub skipped_string_fields: Vec<String>,
}

/// Load, classify and resolve every model reachable from the configured patterns.
pub fn analyze(config: &GeneratorConfig) -> CodegenResult<Analysis> {
    config.validate()?;
    let loader = SourceLoader::new(config.build_tags.clone(), config.include_tests);
    let sources = loader.load(&config.patterns)?;
    analyze_loaded(&loader, sources, config)
}

/// [`analyze`] over sources that are already loaded.
pub fn analyze_loaded(
    loader: &SourceLoader,
    sources: LoadedSources,
    config: &GeneratorConfig,
) -> CodegenResult<Analysis> {
    let mut catalog = TypeCatalog::index(&sources);
    for (name, root) in &config.extern_roots {
        catalog.register_external(name, root.clone());
    }
    debug!("Analysis: indexed {} type declarations", catalog.len());

    let selection = Selection {
        include: config.include.iter().cloned().collect(),
        exclude: config.exclude.iter().cloned().collect(),
    };
    let mut entities = Classifier::new(&catalog, &selection).classify()?;

    let deferred: BTreeSet<String> = entities
        .iter()
        .flat_map(Entity::deferred_crates)
        .filter(|name| !catalog.is_loaded(name))
        .collect();
    if !deferred.is_empty() {
        info!("Analysis: loading deferred crates {deferred:?}");
        let extra = loader.load_crates(&deferred, catalog.external_roots())?;
        catalog.extend(&extra);
        let classifier = Classifier::new(&catalog, &selection);
        for entity in &mut entities {
            classifier.back_patch(entity);
        }
    }

    let resolver = RelationResolver::new(&catalog);
    for entity in &mut entities {
        resolver.resolve(entity)?;
    }

    let mut table = AlternateTable::new();
    let mut skipped_string_fields = Vec::new();
    for entity in &mut entities {
        enrich(&catalog, entity, &mut table, &mut skipped_string_fields)?;
    }
    debug!("Analysis: {} alternate sets computed", table.cached_kinds());

    entities.sort_by_key(Entity::qualified_name);
    Ok(Analysis {
        catalog,
        entities,
        skipped_string_fields,
    })
}

/// Attach zero metadata and string codecs to value fields.
fn enrich(
    catalog: &TypeCatalog,
    entity: &mut Entity,
    table: &mut AlternateTable,
    skipped: &mut Vec<String>,
) -> CodegenResult<()> {
    let qualifier = PathQualifier::new(catalog, &entity.crate_name);
    let zeros = ZeroAnalyzer::new(&qualifier);
    let codecs = StringCodecResolver::new(&qualifier);

    for field in &mut entity.fields {
        if !matches!(field.role, Role::Primary | Role::Attribute) {
            continue;
        }
        field.zero = Some(zeros.analyze(&field.ty, table));
        field.codec = codecs.resolve(&field.ty);

        if field.codec.is_none() {
            if field.role == Role::Primary {
                return Err(CodegenError::StringCapabilityMissing {
                    entity: entity.name.clone(),
                    field: field.name(),
                });
            }
            warn!(
                "Analysis: {}.{} has no string codec, field_string is unsupported for it",
                entity.name,
                field.name()
            );
            skipped.push(format!("{}.{}", entity.name, field.name()));
        }
    }
    Ok(())
}

/// Analyze, render and write. Nothing is written unless every step succeeds.
pub fn generate(config: &GeneratorConfig) -> CodegenResult<GenerationReport> {
    let analysis = analyze(config)?;
    let emitter = Emitter::new(&analysis.catalog, config)?;
    let rendered = emitter.render_all(&analysis.entities)?;
    let files = emit::writer::write_all(&rendered)?;

    info!(
        "Generator: {} entities, {} files written to {}",
        analysis.entities.len(),
        files.len(),
        config.output_dir.display()
    );
    if !analysis.skipped_string_fields.is_empty() {
        info!(
            "Generator: {} attributes without a string codec",
            analysis.skipped_string_fields.len()
        );
    }

    Ok(GenerationReport {
        files,
        entities: analysis.entities.len(),
        skipped_string_fields: analysis.skipped_string_fields,
    })
}
