//! Source loading.
//!
//! The loader turns root patterns into [`Package`]s: one per source file and
//! one per inline `mod { .. }` block, each holding the items that survive the
//! active build tags. Any unreadable or unparsable file aborts the whole load.
//!
//! # Example Flow
//!
//! ```text
//! pattern (crate dir / plain dir / file)
//!     ↓
//! CrateManifest (name + path dependencies)
//!     ↓
//! syn::parse_file per `.rs` file
//!     ↓
//! CfgEvaluator (drop disabled items, mark test-only modules)
//!     ↓
//! Vec<Package>
//! ```

pub mod cfg;
pub mod imports;
pub mod manifest;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use heck::ToSnakeCase;
use log::{debug, trace};
use syn::{Fields, Item};
use walkdir::WalkDir;

use crate::error::{CodegenError, CodegenResult};
use cfg::{CfgEvaluator, CfgState};
pub use imports::Import;
use manifest::CrateManifest;

/// One Rust module with its surviving items.
#[derive(Debug, Clone)]
pub struct Package {
    pub crate_name: String,
    /// Module segments below the crate root
    pub module: Vec<String>,
    pub path: PathBuf,
    pub items: Vec<Item>,
    pub imports: Vec<Import>,
    pub is_test: bool,
}

impl Package {
    /// Qualified module name, e.g. `blog::models::user`.
    pub fn name(&self) -> String {
        qualify(&self.crate_name, &self.module)
    }

    pub fn segments(&self) -> Vec<String> {
        let mut segments = vec![self.crate_name.clone()];
        segments.extend(self.module.iter().cloned());
        segments
    }
}

pub(crate) fn qualify(crate_name: &str, module: &[String]) -> String {
    let mut name = crate_name.to_string();
    for segment in module {
        name.push_str("::");
        name.push_str(segment);
    }
    name
}

/// Everything one load pass produced.
#[derive(Debug, Clone, Default)]
pub struct LoadedSources {
    pub packages: Vec<Package>,
    /// Crate names loaded in this pass
    pub crates: BTreeSet<String>,
    /// Dependency crates known by name but not loaded, with their source roots
    pub dependency_roots: BTreeMap<String, PathBuf>,
}

impl LoadedSources {
    pub fn merge(&mut self, other: LoadedSources) {
        self.packages.extend(other.packages);
        self.crates.extend(other.crates);
        for (name, root) in other.dependency_roots {
            self.dependency_roots.entry(name).or_insert(root);
        }
        let crates = &self.crates;
        self.dependency_roots.retain(|name, _| !crates.contains(name));
    }
}

pub struct SourceLoader {
    cfg: CfgEvaluator,
    include_tests: bool,
}

impl SourceLoader {
    pub fn new(build_tags: BTreeSet<String>, include_tests: bool) -> Self {
        Self {
            cfg: CfgEvaluator::new(build_tags, include_tests),
            include_tests,
        }
    }

    /// Load every package matched by the root patterns.
    pub fn load(&self, patterns: &[String]) -> CodegenResult<LoadedSources> {
        let mut loaded = LoadedSources::default();

        for pattern in patterns {
            let trimmed = pattern
                .strip_suffix("/...")
                .or_else(|| pattern.strip_suffix("..."))
                .unwrap_or(pattern);
            let root = PathBuf::from(if trimmed.is_empty() { "." } else { trimmed });

            let pass = if root.is_file() {
                self.load_file(&root)?
            } else if root.join("Cargo.toml").is_file() {
                self.load_crate(&root, None, self.include_tests)?
            } else if root.is_dir() {
                self.load_dir(&root)?
            } else {
                return Err(CodegenError::load(&root, "pattern matches no sources"));
            };
            loaded.merge(pass);
        }

        debug!(
            "SourceLoader: loaded {} packages from {} crates",
            loaded.packages.len(),
            loaded.crates.len()
        );
        Ok(loaded)
    }

    /// The narrower second pass: load only the named dependency crates.
    pub fn load_crates(
        &self,
        names: &BTreeSet<String>,
        roots: &BTreeMap<String, PathBuf>,
    ) -> CodegenResult<LoadedSources> {
        let mut loaded = LoadedSources::default();
        for name in names {
            let Some(root) = roots.get(name) else {
                continue;
            };
            debug!("SourceLoader: loading dependency crate {name} from {}", root.display());
            let pass = if root.join("Cargo.toml").is_file() {
                self.load_crate(root, Some(name), false)?
            } else if root.is_dir() {
                self.load_tree(root, name, false)?
            } else {
                return Err(CodegenError::load(root, "dependency root does not exist"));
            };
            loaded.merge(pass);
        }
        Ok(loaded)
    }

    fn load_crate(
        &self,
        dir: &Path,
        alias: Option<&str>,
        with_tests: bool,
    ) -> CodegenResult<LoadedSources> {
        let manifest = CrateManifest::read(dir)?;
        let name = alias.map(str::to_string).unwrap_or(manifest.name);

        let src = dir.join("src");
        let mut loaded = if src.is_dir() {
            self.load_tree(&src, &name, false)?
        } else {
            LoadedSources::default()
        };
        loaded.crates.insert(name.clone());

        let tests = dir.join("tests");
        if with_tests && tests.is_dir() {
            for path in rust_files(&tests, 1)? {
                let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
                else {
                    continue;
                };
                let mut files = BTreeMap::new();
                files.insert(Vec::new(), (path.clone(), parse_source(&path)?));
                loaded.packages.extend(self.build_packages(&stem, files, true));
                loaded.crates.insert(stem);
            }
        }

        loaded.dependency_roots = manifest.path_dependencies;
        loaded.dependency_roots.remove(&name);
        Ok(loaded)
    }

    fn load_dir(&self, dir: &Path) -> CodegenResult<LoadedSources> {
        let name = dir
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .map(|n| n.to_snake_case())
            .unwrap_or_else(|| "crate".to_string());
        self.load_tree(dir, &name, false)
    }

    fn load_file(&self, path: &Path) -> CodegenResult<LoadedSources> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_snake_case())
            .unwrap_or_else(|| "crate".to_string());
        let mut files = BTreeMap::new();
        files.insert(Vec::new(), (path.to_path_buf(), parse_source(path)?));

        let mut loaded = LoadedSources::default();
        loaded.packages = self.build_packages(&name, files, false);
        loaded.crates.insert(name);
        Ok(loaded)
    }

    fn load_tree(&self, root: &Path, crate_name: &str, is_test: bool) -> CodegenResult<LoadedSources> {
        let has_lib = root.join("lib.rs").is_file();
        let mut files: BTreeMap<Vec<String>, (PathBuf, syn::File)> = BTreeMap::new();
        for path in rust_files(root, usize::MAX)? {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            // With a library root present, main.rs is a separate binary crate.
            if rel.starts_with("bin") || (has_lib && rel == Path::new("main.rs")) {
                continue;
            }
            let module = module_path(rel);
            trace!("SourceLoader: {} -> {:?}", path.display(), module);
            if let Some((existing, _)) = files.get(&module) {
                let message = format!(
                    "module `{}` is also defined by {}",
                    module.join("::"),
                    existing.display()
                );
                return Err(CodegenError::load(&path, message));
            }
            let file = parse_source(&path)?;
            files.insert(module, (path, file));
        }

        let mut loaded = LoadedSources::default();
        loaded.packages = self.build_packages(crate_name, files, is_test);
        loaded.crates.insert(crate_name.to_string());
        Ok(loaded)
    }

    /// Apply out-of-line `mod x;` gating, then expand each file into packages.
    fn build_packages(
        &self,
        crate_name: &str,
        files: BTreeMap<Vec<String>, (PathBuf, syn::File)>,
        is_test: bool,
    ) -> Vec<Package> {
        let mut gates: BTreeMap<Vec<String>, CfgState> = BTreeMap::new();
        for (module, (_, file)) in &files {
            for item in &file.items {
                if let Item::Mod(m) = item
                    && m.content.is_none()
                {
                    let mut child = module.clone();
                    child.push(m.ident.to_string());
                    gates.insert(child, self.cfg.state(&m.attrs));
                }
            }
        }

        let mut packages = Vec::new();
        'files: for (module, (path, file)) in files {
            let mut test = is_test;
            for depth in 1..=module.len() {
                match gates.get(&module[..depth]) {
                    Some(CfgState::Disabled) => {
                        debug!("SourceLoader: {} disabled by cfg", path.display());
                        continue 'files;
                    }
                    Some(CfgState::TestOnly) => test = true,
                    _ => {}
                }
            }
            self.expand(crate_name, module, &path, file.items, test, &mut packages);
        }
        packages
    }

    fn expand(
        &self,
        crate_name: &str,
        module: Vec<String>,
        path: &Path,
        items: Vec<Item>,
        is_test: bool,
        out: &mut Vec<Package>,
    ) {
        let mut kept = Vec::new();
        let mut uses = Vec::new();
        let mut children = Vec::new();

        for mut item in items {
            let state = match item_attrs(&item) {
                Some(attrs) => self.cfg.state(attrs),
                None => CfgState::Enabled,
            };
            if state == CfgState::Disabled {
                continue;
            }

            match &mut item {
                Item::Use(u) => uses.extend(imports::flatten_use(u)),
                Item::Struct(s) => self.filter_fields(&mut s.fields),
                _ => {}
            }

            if let Item::Mod(m) = item {
                if let Some((_, content)) = m.content {
                    let mut child = module.clone();
                    child.push(m.ident.to_string());
                    children.push((child, content, is_test || state == CfgState::TestOnly));
                } else {
                    kept.push(Item::Mod(m));
                }
                continue;
            }
            kept.push(item);
        }

        out.push(Package {
            crate_name: crate_name.to_string(),
            module,
            path: path.to_path_buf(),
            items: kept,
            imports: uses,
            is_test,
        });

        for (child, content, test) in children {
            self.expand(crate_name, child, path, content, test, out);
        }
    }

    fn filter_fields(&self, fields: &mut Fields) {
        let keep = |f: &syn::Field| self.cfg.state(&f.attrs) != CfgState::Disabled;
        match fields {
            Fields::Named(named) => {
                named.named = std::mem::take(&mut named.named)
                    .into_iter()
                    .filter(keep)
                    .collect();
            }
            Fields::Unnamed(unnamed) => {
                unnamed.unnamed = std::mem::take(&mut unnamed.unnamed)
                    .into_iter()
                    .filter(keep)
                    .collect();
            }
            Fields::Unit => {}
        }
    }
}

fn item_attrs(item: &Item) -> Option<&[syn::Attribute]> {
    let attrs = match item {
        Item::Struct(i) => &i.attrs,
        Item::Enum(i) => &i.attrs,
        Item::Type(i) => &i.attrs,
        Item::Impl(i) => &i.attrs,
        Item::Use(i) => &i.attrs,
        Item::Mod(i) => &i.attrs,
        Item::Trait(i) => &i.attrs,
        Item::Fn(i) => &i.attrs,
        Item::Const(i) => &i.attrs,
        Item::Static(i) => &i.attrs,
        _ => return None,
    };
    Some(attrs)
}

fn parse_source(path: &Path) -> CodegenResult<syn::File> {
    let content = fs::read_to_string(path).map_err(|e| CodegenError::io(path, e))?;
    syn::parse_file(&content).map_err(|e| {
        let start = e.span().start();
        CodegenError::load(path, format!("{}:{}: {}", start.line, start.column + 1, e))
    })
}

/// `.rs` files below `root`, sorted, skipping hidden and `target` directories.
fn rust_files(root: &Path, max_depth: usize) -> CodegenResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            entry.depth() == 0 || !(name.starts_with('.') || name == "target")
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            CodegenError::load(path, e)
        })?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "rs")
        {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

/// `lib.rs` → `[]`, `a/mod.rs` → `[a]`, `a/b.rs` → `[a, b]`.
fn module_path(rel: &Path) -> Vec<String> {
    let mut segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let Some(file) = segments.pop() else {
        return segments;
    };
    let stem = file.trim_end_matches(".rs");
    if segments.is_empty() && (stem == "lib" || stem == "main") {
        return segments;
    }
    if stem != "mod" {
        segments.push(stem.to_string());
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn module_paths_follow_file_layout() {
        assert!(module_path(Path::new("lib.rs")).is_empty());
        assert_eq!(module_path(Path::new("models/mod.rs")), ["models"]);
        assert_eq!(module_path(Path::new("models/user.rs")), ["models", "user"]);
    }

    #[test]
    fn loads_crate_with_inline_and_gated_modules() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Cargo.toml", "[package]\nname = \"blog\"\nversion = \"0.1.0\"\n");
        write(
            dir.path(),
            "src/lib.rs",
            r#"
            pub mod models;
            #[cfg(feature = "extra")]
            pub mod extra;
            #[cfg(test)]
            mod tests {
                pub struct Fixture { pub id: u64 }
            }
            "#,
        );
        write(dir.path(), "src/models.rs", "pub struct User { pub id: u64 }");
        write(dir.path(), "src/extra.rs", "pub struct Extra { pub id: u64 }");

        let loader = SourceLoader::new(BTreeSet::new(), false);
        let loaded = loader.load(&[dir.path().to_string_lossy().into_owned()]).unwrap();
        let names: Vec<String> = loaded.packages.iter().map(Package::name).collect();
        assert_eq!(names, ["blog", "blog::models"]);

        let loader = SourceLoader::new(["extra".to_string()].into(), true);
        let loaded = loader.load(&[dir.path().to_string_lossy().into_owned()]).unwrap();
        let tests = loaded.packages.iter().find(|p| p.name() == "blog::tests").unwrap();
        assert!(tests.is_test);
        assert!(loaded.packages.iter().any(|p| p.name() == "blog::extra"));
    }

    #[test]
    fn main_beside_lib_is_a_binary_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Cargo.toml", "[package]\nname = \"bank\"\nversion = \"0.1.0\"\n");
        write(dir.path(), "src/lib.rs", "pub struct Account { pub id: u64, pub name: String }");
        write(dir.path(), "src/main.rs", "fn main() {}");

        let loader = SourceLoader::new(BTreeSet::new(), false);
        let loaded = loader.load(&[dir.path().to_string_lossy().into_owned()]).unwrap();
        assert_eq!(loaded.packages.len(), 1);
        assert_eq!(loaded.packages[0].path, dir.path().join("src/lib.rs"));
        assert!(loaded.packages[0].items.iter().any(|item| matches!(item, Item::Struct(s) if s.ident == "Account")));
    }

    #[test]
    fn main_alone_is_the_crate_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.rs", "pub struct Job { pub id: u64 }");
        let loader = SourceLoader::new(BTreeSet::new(), false);
        let loaded = loader.load(&[dir.path().to_string_lossy().into_owned()]).unwrap();
        assert_eq!(loaded.packages.len(), 1);
        assert!(loaded.packages[0].module.is_empty());
    }

    #[test]
    fn duplicate_module_files_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "models.rs", "pub struct A { pub id: u64 }");
        write(dir.path(), "models/mod.rs", "pub struct B { pub id: u64 }");
        let loader = SourceLoader::new(BTreeSet::new(), false);
        let err = loader.load(&[dir.path().to_string_lossy().into_owned()]).unwrap_err();
        assert_matches::assert_matches!(err, CodegenError::Load { message, .. } if message.contains("models"));
    }

    #[test]
    fn parse_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.rs", "pub struct User {");
        let loader = SourceLoader::new(BTreeSet::new(), false);
        let err = loader.load(&[dir.path().to_string_lossy().into_owned()]).unwrap_err();
        assert!(matches!(err, CodegenError::Load { .. }));
    }

    #[test]
    fn missing_pattern_is_fatal() {
        let loader = SourceLoader::new(BTreeSet::new(), false);
        assert!(loader.load(&["/definitely/not/here".to_string()]).is_err());
    }

    #[test]
    fn gated_fields_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "models.rs",
            "pub struct User { pub id: u64, #[cfg(feature = \"audit\")] pub audit: String }",
        );
        let loader = SourceLoader::new(BTreeSet::new(), false);
        let loaded = loader
            .load(&[dir.path().join("models.rs").to_string_lossy().into_owned()])
            .unwrap();
        let Item::Struct(user) = &loaded.packages[0].items[0] else {
            panic!("expected struct");
        };
        assert_eq!(user.fields.len(), 1);
    }

    #[test]
    fn records_dependency_roots() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app/Cargo.toml",
            "[package]\nname = \"app\"\n[dependencies]\nshared = { path = \"../shared\" }\n",
        );
        write(dir.path(), "app/src/lib.rs", "use shared::Tag;");
        let loader = SourceLoader::new(BTreeSet::new(), false);
        let loaded = loader
            .load(&[dir.path().join("app").to_string_lossy().into_owned()])
            .unwrap();
        assert!(loaded.dependency_roots.contains_key("shared"));
        assert_eq!(loaded.packages[0].imports[0].path, ["shared", "Tag"]);
    }
}
