use syn::{ItemUse, UseTree, Visibility};

/// One flattened `use` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Name the import binds in the module (empty for globs)
    pub alias: String,
    /// Full path as written, `crate`/`self`/`super` segments included
    pub path: Vec<String>,
    pub glob: bool,
    /// `pub use` re-exports are visible to other modules
    pub public: bool,
}

/// Flatten a `use` item into one entry per bound name.
pub fn flatten_use(item: &ItemUse) -> Vec<Import> {
    let public = !matches!(item.vis, Visibility::Inherited);
    let mut out = Vec::new();
    walk(&item.tree, &mut Vec::new(), public, &mut out);
    out
}

fn walk(tree: &UseTree, prefix: &mut Vec<String>, public: bool, out: &mut Vec<Import>) {
    match tree {
        UseTree::Path(p) => {
            prefix.push(p.ident.to_string());
            walk(&p.tree, prefix, public, out);
            prefix.pop();
        }
        UseTree::Name(n) => {
            let name = n.ident.to_string();
            if name == "self" {
                if let Some(last) = prefix.last() {
                    out.push(Import {
                        alias: last.clone(),
                        path: prefix.clone(),
                        glob: false,
                        public,
                    });
                }
                return;
            }
            let mut path = prefix.clone();
            path.push(name.clone());
            out.push(Import {
                alias: name,
                path,
                glob: false,
                public,
            });
        }
        UseTree::Rename(r) => {
            let alias = r.rename.to_string();
            if alias == "_" {
                return;
            }
            let mut path = prefix.clone();
            if r.ident != "self" {
                path.push(r.ident.to_string());
            }
            out.push(Import {
                alias,
                path,
                glob: false,
                public,
            });
        }
        UseTree::Glob(_) => out.push(Import {
            alias: String::new(),
            path: prefix.clone(),
            glob: true,
            public,
        }),
        UseTree::Group(g) => {
            for tree in &g.items {
                walk(tree, prefix, public, out);
            }
        }
    }
}
