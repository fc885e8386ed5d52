//! Source emission for analyzed entities.
//!
//! Entities are grouped by package. Each package gets its own directory under
//! the output root (`blog::models` lands in `<out>/blog/models/`).
//!
//! # Example Output
//!
//! ```text
//! single_file:  <out>/blog/models/models.rs        every entity + registered_models()
//!               <out>/blog/models/models_test.rs   test-variant entities, #![cfg(test)]
//! per_entity:   <out>/blog/models/user.rs          one entity
//!               <out>/blog/models/registry.rs      registered_models()
//! ```
//!
//! Output is deterministic: packages, files and entities are ordered by name,
//! dispatch arms by field ordinal.

pub mod format;
pub mod qualify;
pub mod templates;
pub mod writer;

use std::collections::BTreeMap;
use std::path::PathBuf;

use heck::ToSnakeCase;
use log::{debug, trace};
use proc_macro2::TokenStream;
use quote::quote;

use crate::catalog::TypeCatalog;
use crate::classify::Entity;
use crate::config::{GeneratorConfig, OutputMode};
use crate::error::{CodegenError, CodegenResult};
use format::SourceFormatter;
use qualify::PathQualifier;
use templates::RenderContext;

/// First line of every generated file.
pub const HEADER: &str = "// Code generated by netabase-codegen. DO NOT EDIT.";

pub struct Emitter<'a> {
    catalog: &'a TypeCatalog,
    config: &'a GeneratorConfig,
    contract: syn::Path,
    formatter: Box<dyn SourceFormatter>,
}

impl<'a> Emitter<'a> {
    pub fn new(catalog: &'a TypeCatalog, config: &'a GeneratorConfig) -> CodegenResult<Self> {
        Self::with_formatter(catalog, config, format::formatter(config.formatter))
    }

    pub fn with_formatter(
        catalog: &'a TypeCatalog,
        config: &'a GeneratorConfig,
        formatter: Box<dyn SourceFormatter>,
    ) -> CodegenResult<Self> {
        Ok(Self {
            catalog,
            config,
            contract: contract_path(&config.contract_path)?,
            formatter,
        })
    }

    /// Render every output file without touching the file system.
    pub fn render_all(&self, entities: &[Entity]) -> CodegenResult<BTreeMap<PathBuf, String>> {
        let mut packages: BTreeMap<&str, Vec<&Entity>> = BTreeMap::new();
        for entity in entities {
            packages.entry(&entity.package).or_default().push(entity);
        }

        let mut files = BTreeMap::new();
        for (package, mut members) in packages {
            members.sort_by(|a, b| a.name.cmp(&b.name));
            let dir = package
                .split("::")
                .fold(self.config.output_dir.clone(), |dir, segment| dir.join(segment));
            let (tests, regular): (Vec<&Entity>, Vec<&Entity>) =
                members.into_iter().partition(|e| e.is_test);
            debug!(
                "Emitter: package {package}: {} entities, {} test entities",
                regular.len(),
                tests.len()
            );

            for (group, is_test) in [(regular, false), (tests, true)] {
                if group.is_empty() {
                    continue;
                }
                let suffix = if is_test { "_test" } else { "" };
                match self.config.output_mode {
                    OutputMode::SingleFile => {
                        let body = self.render_group(&group, true);
                        let path = dir.join(format!("models{suffix}.rs"));
                        files.insert(path.clone(), self.finish(path, body, is_test)?);
                    }
                    OutputMode::PerEntity => {
                        for entity in &group {
                            let body = self.render_group(std::slice::from_ref(entity), false);
                            let path = dir.join(format!("{}{suffix}.rs", entity.name.to_snake_case()));
                            if files.contains_key(&path) {
                                return Err(CodegenError::Config(format!(
                                    "entities in {package} collide on output file {}",
                                    path.display()
                                )));
                            }
                            files.insert(path.clone(), self.finish(path, body, is_test)?);
                        }
                        let registry = self.render_registry(&group);
                        let path = dir.join(format!("registry{suffix}.rs"));
                        if files.contains_key(&path) {
                            return Err(CodegenError::Config(format!(
                                "an entity in {package} collides with the registry file {}",
                                path.display()
                            )));
                        }
                        files.insert(path.clone(), self.finish(path, registry, is_test)?);
                    }
                }
            }
        }
        Ok(files)
    }

    fn qualifier<'q>(&'q self, entity: &'q Entity) -> PathQualifier<'q> {
        PathQualifier::new(self.catalog, &entity.crate_name)
    }

    fn render_group(&self, group: &[&Entity], with_registry: bool) -> TokenStream {
        let mut body = TokenStream::new();
        for entity in group {
            trace!("Emitter: rendering {}", entity.qualified_name());
            let qualifier = self.qualifier(entity);
            let ctx = RenderContext {
                qualifier: &qualifier,
                contract: &self.contract,
                naming: self.config.naming,
            };
            body.extend(templates::generate_entity(&ctx, entity));
        }
        if with_registry {
            body.extend(self.render_registry(group));
        }
        body
    }

    fn render_registry(&self, group: &[&Entity]) -> TokenStream {
        let Some(first) = group.first() else {
            return TokenStream::new();
        };
        let qualifier = self.qualifier(first);
        let ctx = RenderContext {
            qualifier: &qualifier,
            contract: &self.contract,
            naming: self.config.naming,
        };
        templates::generate_registry(&ctx, group)
    }

    /// Header, optional `cfg(test)`, parse check, formatting.
    fn finish(&self, path: PathBuf, body: TokenStream, is_test: bool) -> CodegenResult<String> {
        let gate = is_test.then(|| quote!(#![cfg(test)]));
        let tokens = quote! {
            #gate
            #body
        };
        let source = format!("{HEADER}\n\n{tokens}\n");

        syn::parse_file(&source).map_err(|e| CodegenError::Format {
            path: path.clone(),
            message: format!("rendered source does not parse: {e}"),
        })?;

        self.formatter.format(&path, source)
    }
}

/// Turn a configured contract path into an absolute path for emitted code.
fn contract_path(raw: &str) -> CodegenResult<syn::Path> {
    let mut path: syn::Path = syn::parse_str(raw).map_err(|e| {
        CodegenError::Config(format!("contract path '{raw}' is not a valid Rust path: {e}"))
    })?;
    let relative = path
        .segments
        .first()
        .is_some_and(|s| ["crate", "self", "super"].contains(&s.ident.to_string().as_str()));
    if !relative {
        path.leading_colon = Some(Default::default());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::config::{FormatterKind, NamingConvention};
    use crate::loader::{LoadedSources, Package, SourceLoader};
    use std::path::Path;
    use syn::parse_quote;

    fn package(module: &[&str], file: syn::File, is_test: bool) -> Package {
        Package {
            crate_name: "blog".into(),
            module: module.iter().map(|s| s.to_string()).collect(),
            path: PathBuf::from("src/lib.rs"),
            items: file.items,
            imports: Vec::new(),
            is_test,
        }
    }

    fn render(packages: Vec<Package>, config: &GeneratorConfig) -> BTreeMap<PathBuf, String> {
        let sources = LoadedSources {
            packages,
            crates: ["blog".to_string()].into(),
            dependency_roots: Default::default(),
        };
        let loader = SourceLoader::new(Default::default(), false);
        let analysis = crate::analyze_loaded(&loader, sources, config).unwrap();
        Emitter::new(&analysis.catalog, config)
            .unwrap()
            .render_all(&analysis.entities)
            .unwrap()
    }

    fn config(mode: OutputMode) -> GeneratorConfig {
        GeneratorConfig::builder()
            .patterns(vec!["blog".to_string()])
            .output_dir(PathBuf::from("out"))
            .output_mode(mode)
            .formatter(FormatterKind::None)
            .build()
    }

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn blog() -> syn::File {
        parse_quote! {
            #[derive(Default, Clone)]
            pub struct User {
                pub id: u64,
                #[model("name=display_name")]
                pub name: String,
                pub posts: Vec<Post>,
            }

            #[derive(Default, Clone)]
            pub struct Post {
                pub id: u64,
                pub author: Option<Box<User>>,
            }
        }
    }

    #[test]
    fn single_file_holds_every_entity_and_the_registry() {
        let files = render(vec![package(&["models"], blog(), false)], &config(OutputMode::SingleFile));
        let path = Path::new("out/blog/models/models.rs");
        assert_eq!(files.keys().collect::<Vec<_>>(), vec![path]);

        let source = &files[path];
        assert!(source.starts_with(HEADER));
        syn::parse_file(source).unwrap();

        let flat = squash(source);
        assert!(flat.contains("impl::netabase_model::Modelforcrate::models::User"));
        assert!(flat.contains("impl::netabase_model::Fielderforcrate::models::User"));
        assert!(flat.contains("impl::netabase_model::MultiRelationerforcrate::models::User"));
        assert!(flat.contains("impl::netabase_model::SingleRelationerforcrate::models::Post"));
        assert!(!flat.contains("impl::netabase_model::Fielderforcrate::models::Post"));
        assert!(flat.contains(r#"&["id","display_name","posts"]"#));
        assert!(flat.contains("pubfnregistered_models()"));
        // Post sorts before User
        assert!(flat.find("models::Post").unwrap() < flat.find("forcrate::models::User").unwrap());
    }

    #[test]
    fn per_entity_mode_writes_one_file_per_entity_plus_registry() {
        let files = render(vec![package(&["models"], blog(), false)], &config(OutputMode::PerEntity));
        let names: Vec<String> = files
            .keys()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["post.rs", "registry.rs", "user.rs"]);
        assert!(!squash(&files[Path::new("out/blog/models/user.rs")]).contains("registered_models"));
    }

    #[test]
    fn numeric_alternates_cast_without_parentheses() {
        let files = render(vec![package(&["models"], blog(), false)], &config(OutputMode::SingleFile));
        let flat = squash(&files[Path::new("out/blog/models/models.rs")]);
        assert!(flat.contains("self.id=*valueasu64;"));
        assert!(!flat.contains("(*valueas"));
        assert!(flat.contains("#[allow(unused_variables,unused_parens)]impl::netabase_model::Fielder"));
    }

    #[test]
    fn entity_named_like_the_registry_is_rejected() {
        let models: syn::File = parse_quote! {
            #[derive(Default, Clone)]
            pub struct Registry { pub id: u64, pub label: String }

            #[derive(Default, Clone)]
            pub struct Other { pub id: u64 }
        };
        let config = config(OutputMode::PerEntity);
        let sources = LoadedSources {
            packages: vec![package(&["reg"], models, false)],
            crates: ["blog".to_string()].into(),
            dependency_roots: Default::default(),
        };
        let loader = SourceLoader::new(Default::default(), false);
        let analysis = crate::analyze_loaded(&loader, sources, &config).unwrap();
        let err = Emitter::new(&analysis.catalog, &config)
            .unwrap()
            .render_all(&analysis.entities)
            .unwrap_err();
        assert_matches!(err, CodegenError::Config(message) if message.contains("registry.rs"));

        let files = render(
            vec![package(&["reg"], parse_quote! { pub struct Registry { pub id: u64 } }, false)],
            &self::config(OutputMode::SingleFile),
        );
        assert!(squash(&files[Path::new("out/blog/reg/models.rs")]).contains("Modelforcrate::reg::Registry"));
    }

    #[test]
    fn test_entities_are_partitioned_and_gated() {
        let fixture: syn::File = parse_quote! {
            #[derive(Default, Clone)]
            pub struct Fixture { pub id: u32, pub label: String }
        };
        let files = render(
            vec![
                package(&["models"], blog(), false),
                package(&["fixtures"], fixture, true),
            ],
            &config(OutputMode::SingleFile),
        );
        let test_file = &files[Path::new("out/blog/fixtures/models_test.rs")];
        assert!(squash(test_file).contains("#![cfg(test)]"));
        assert!(test_file.contains("Fixture"));
        assert!(!files.contains_key(Path::new("out/blog/fixtures/models.rs")));
        assert!(!files[Path::new("out/blog/models/models.rs")].contains("Fixture"));
    }

    #[test]
    fn naming_convention_applies_unless_overridden() {
        let models: syn::File = parse_quote! {
            #[derive(Default, Clone)]
            pub struct Account {
                pub id: u64,
                pub first_name: String,
                #[model("name=SURNAME")]
                pub last_name: String,
            }
        };
        let mut config = config(OutputMode::SingleFile);
        config.naming = NamingConvention::CamelCase;
        let files = render(vec![package(&[], models, false)], &config);
        let flat = squash(&files[Path::new("out/blog/models.rs")]);
        assert!(flat.contains(r#"&["id","firstName","SURNAME"]"#));
    }

    #[test]
    fn contract_path_is_made_absolute() {
        let path = contract_path("my_models::contract").unwrap();
        assert!(path.leading_colon.is_some());
        let path = contract_path("crate::contract").unwrap();
        assert!(path.leading_colon.is_none());
        assert!(contract_path("not a path").is_err());
    }
}
