// Common test utilities and helpers

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use netabase_codegen::GeneratorConfig;
use netabase_codegen::config::FormatterKind;
use tempfile::TempDir;

/// A throwaway directory holding fixture crates and the generator output.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// A crate with a `Cargo.toml` and the given `src/lib.rs`.
    pub fn crate_with(&self, name: &str, lib: &str) -> PathBuf {
        self.crate_with_deps(name, lib, &[])
    }

    pub fn crate_with_deps(&self, name: &str, lib: &str, path_deps: &[(&str, &str)]) -> PathBuf {
        let mut manifest = format!(
            "[package]\nname = \"{name}\"\nversion = \"0.1.0\"\nedition = \"2024\"\n\n[dependencies]\n"
        );
        for (dep, rel) in path_deps {
            manifest.push_str(&format!("{dep} = {{ path = \"{rel}\" }}\n"));
        }
        self.write(&format!("{name}/Cargo.toml"), &manifest);
        self.write(&format!("{name}/src/lib.rs"), lib);
        self.path(name)
    }

    pub fn config(&self, root: &Path) -> GeneratorConfig {
        GeneratorConfig::builder()
            .patterns(vec![root.to_string_lossy().into_owned()])
            .output_dir(self.path("generated"))
            .formatter(FormatterKind::None)
            .build()
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap_or_else(|e| panic!("reading {rel}: {e}"))
    }

    /// Every file under `generated/`, relative paths sorted.
    pub fn generated_files(&self) -> Vec<String> {
        let root = self.path("generated");
        if !root.exists() {
            return Vec::new();
        }
        let mut files: Vec<String> = walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(&root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }
}

/// Source text without whitespace, for substring assertions on unformatted output.
pub fn squash(source: &str) -> String {
    source.chars().filter(|c| !c.is_whitespace()).collect()
}
