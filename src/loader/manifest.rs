//! Minimal `Cargo.toml` reading: crate name and `path` dependencies.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CodegenError, CodegenResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawManifest {
    package: Option<RawPackage>,
    lib: Option<RawLib>,
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawLib {
    name: Option<String>,
}

/// What the loader needs to know about a crate directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrateManifest {
    /// Crate name as written in paths (`-` replaced by `_`)
    pub name: String,
    /// Dependency name as used in code → absolute crate directory
    pub path_dependencies: BTreeMap<String, PathBuf>,
}

impl CrateManifest {
    pub fn read(crate_dir: &Path) -> CodegenResult<Self> {
        let path = crate_dir.join("Cargo.toml");
        let content = fs::read_to_string(&path).map_err(|e| CodegenError::io(&path, e))?;
        Self::parse(&content, crate_dir).map_err(|message| CodegenError::Manifest {
            path: path.clone(),
            message,
        })
    }

    pub fn parse(content: &str, crate_dir: &Path) -> Result<Self, String> {
        let raw: RawManifest = toml::from_str(content).map_err(|e| e.to_string())?;

        let package = raw
            .package
            .ok_or_else(|| "manifest has no [package] section".to_string())?;
        let name = raw
            .lib
            .and_then(|lib| lib.name)
            .unwrap_or(package.name)
            .replace('-', "_");

        let mut path_dependencies = BTreeMap::new();
        for (key, value) in raw.dependencies.iter().chain(raw.dev_dependencies.iter()) {
            let Some(rel) = value.get("path").and_then(toml::Value::as_str) else {
                continue;
            };
            path_dependencies
                .entry(key.replace('-', "_"))
                .or_insert_with(|| crate_dir.join(rel));
        }

        Ok(Self {
            name,
            path_dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_name_and_path_dependencies() {
        let manifest = CrateManifest::parse(
            r#"
            [package]
            name = "blog-models"
            version = "0.1.0"

            [dependencies]
            serde = "1"
            shared-types = { path = "../shared" }

            [dev-dependencies]
            fixtures = { path = "fixtures", version = "0.1" }
            "#,
            Path::new("/work/blog"),
        )
        .unwrap();

        assert_eq!(manifest.name, "blog_models");
        assert_eq!(manifest.path_dependencies.len(), 2);
        assert_eq!(
            manifest.path_dependencies["shared_types"],
            PathBuf::from("/work/blog/../shared")
        );
        assert!(manifest.path_dependencies.contains_key("fixtures"));
    }

    #[test]
    fn lib_name_wins() {
        let manifest = CrateManifest::parse(
            "[package]\nname = \"a-b\"\n[lib]\nname = \"ab\"\n",
            Path::new("."),
        )
        .unwrap();
        assert_eq!(manifest.name, "ab");
    }

    #[test]
    fn workspace_manifest_is_rejected() {
        assert!(CrateManifest::parse("[workspace]\nmembers = []\n", Path::new(".")).is_err());
    }
}
