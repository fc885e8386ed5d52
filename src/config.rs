//! Generator configuration.
//!
//! A [`GeneratorConfig`] can be built in code through its builder or read from
//! a TOML file (conventionally `netabase-codegen.toml`). Command-line flags in
//! the binary override whatever the file sets.
//!
//! # Examples
//!
//! ```
//! use netabase_codegen::config::{GeneratorConfig, NamingConvention, OutputMode};
//!
//! let config = GeneratorConfig::builder()
//!     .patterns(vec!["./my_models".to_string()])
//!     .naming(NamingConvention::CamelCase)
//!     .output_mode(OutputMode::PerEntity)
//!     .build();
//! assert!(!config.include_tests);
//! ```
//!
//! ```toml
//! patterns = ["./my_models"]
//! build_tags = ["postgres"]
//! include_tests = true
//! naming = "camelCase"
//! output_dir = "src/generated"
//! output_mode = "per_entity"
//!
//! [extern_roots]
//! shared_models = "../shared_models"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToSnakeCase};
use serde::Deserialize;
use strum::{Display, EnumString};
use typed_builder::TypedBuilder;

use crate::error::{CodegenError, CodegenResult};

/// Default crate path of the model contract the emitted code implements.
pub const DEFAULT_CONTRACT_PATH: &str = "netabase_model";

/// Casing applied to the field names exposed by generated code.
///
/// Analysis never depends on this; only emitted name strings do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
pub enum NamingConvention {
    #[default]
    #[serde(rename = "snake_case")]
    #[strum(serialize = "snake_case", serialize = "snake")]
    SnakeCase,
    #[serde(rename = "camelCase")]
    #[strum(serialize = "camelCase", serialize = "camel")]
    CamelCase,
    #[serde(rename = "PascalCase")]
    #[strum(serialize = "PascalCase", serialize = "pascal")]
    PascalCase,
    #[serde(rename = "kebab-case")]
    #[strum(serialize = "kebab-case", serialize = "kebab")]
    KebabCase,
}

impl NamingConvention {
    pub fn apply(&self, name: &str) -> String {
        match self {
            NamingConvention::SnakeCase => name.to_snake_case(),
            NamingConvention::CamelCase => name.to_lower_camel_case(),
            NamingConvention::PascalCase => name.to_pascal_case(),
            NamingConvention::KebabCase => name.to_kebab_case(),
        }
    }
}

/// How generated code is split into files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum OutputMode {
    /// One file per package holding every entity of that package.
    #[default]
    SingleFile,
    /// One file per entity plus a registry file per package.
    PerEntity,
}

/// Post-render formatting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FormatterKind {
    /// Pipe rendered source through `rustfmt`.
    #[default]
    Rustfmt,
    /// Write the rendered token stream as is.
    None,
}

#[derive(Debug, Clone, TypedBuilder, Deserialize)]
#[builder(doc)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Source roots: crate directories, plain directories or single `.rs` files
    #[builder(default)]
    pub patterns: Vec<String>,

    /// Enabled `cfg` predicates (`feature = "x"` is enabled by tag `x`)
    #[builder(default)]
    pub build_tags: BTreeSet<String>,

    /// Load `#[cfg(test)]` modules and `tests/` files as test-variant packages
    #[builder(default = false)]
    pub include_tests: bool,

    /// Only generate these types (simple or qualified names)
    #[builder(default)]
    pub include: Vec<String>,

    /// Never generate these types (simple or qualified names)
    #[builder(default)]
    pub exclude: Vec<String>,

    #[builder(default)]
    pub naming: NamingConvention,

    #[builder(default = PathBuf::from("generated"))]
    pub output_dir: PathBuf,

    #[builder(default)]
    pub output_mode: OutputMode,

    #[builder(default)]
    pub formatter: FormatterKind,

    /// Path of the crate providing `Model`, `Fielder` and the relation traits
    #[builder(default = DEFAULT_CONTRACT_PATH.to_string())]
    pub contract_path: String,

    /// Source roots of dependency crates that are not `path` dependencies
    #[builder(default)]
    pub extern_roots: BTreeMap<String, PathBuf>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GeneratorConfig {
    /// Read a configuration from a TOML file.
    ///
    /// Relative paths inside the file are resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CodegenResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CodegenError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> CodegenResult<Self> {
        toml::from_str(content)
            .map_err(|e| CodegenError::Config(format!("Failed to parse TOML config: {e}")))
    }

    /// Check the settings that cannot be expressed in the type system.
    pub fn validate(&self) -> CodegenResult<()> {
        if self.patterns.is_empty() {
            return Err(CodegenError::Config(
                "at least one source pattern is required".to_string(),
            ));
        }

        syn::parse_str::<syn::Path>(&self.contract_path).map_err(|e| {
            CodegenError::Config(format!(
                "contract path '{}' is not a valid Rust path: {}",
                self.contract_path, e
            ))
        })?;

        if let Some(name) = self.include.iter().find(|n| self.exclude.contains(n)) {
            return Err(CodegenError::Config(format!(
                "type '{name}' is both included and excluded"
            )));
        }

        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }
        for pattern in &mut self.patterns {
            if Path::new(pattern).is_relative() {
                *pattern = base.join(&*pattern).to_string_lossy().into_owned();
            }
        }
        if self.output_dir.is_relative() {
            self.output_dir = base.join(&self.output_dir);
        }
        for root in self.extern_roots.values_mut() {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
    }
}
