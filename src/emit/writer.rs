//! Staged, all-or-nothing output writes.
//!
//! # Example Flow
//!
//! ```text
//! stage:   models.rs      -> .models.rs.netabase-tmp
//!          models_test.rs -> .models_test.rs.netabase-tmp
//! commit:  move an existing target to .models.rs.netabase-bak,
//!          then rename the temp file over it
//! failure: restore every backup, remove every temp file written so far
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::error::{CodegenError, CodegenResult};

const TEMP_SUFFIX: &str = "netabase-tmp";
const BACKUP_SUFFIX: &str = "netabase-bak";

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{suffix}"))
}

fn temp_path(target: &Path) -> PathBuf {
    sibling(target, TEMP_SUFFIX)
}

fn backup_path(target: &Path) -> PathBuf {
    sibling(target, BACKUP_SUFFIX)
}

/// Write every file or none of them.
pub fn write_all(files: &BTreeMap<PathBuf, String>) -> CodegenResult<Vec<PathBuf>> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());

    let result = stage(files, &mut staged)
        .and_then(|()| commit(&staged, |from, to| fs::rename(from, to)));
    if let Err(e) = result {
        for (temp, _) in &staged {
            if temp.exists() {
                trace!("OutputWriter: removing {}", temp.display());
                let _ = fs::remove_file(temp);
            }
        }
        return Err(e);
    }

    debug!("OutputWriter: wrote {} files", staged.len());
    Ok(staged.into_iter().map(|(_, target)| target).collect())
}

fn stage(
    files: &BTreeMap<PathBuf, String>,
    staged: &mut Vec<(PathBuf, PathBuf)>,
) -> CodegenResult<()> {
    for (target, content) in files {
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| CodegenError::io(parent, e))?;
        }
        let temp = temp_path(target);
        fs::write(&temp, content).map_err(|e| CodegenError::io(&temp, e))?;
        staged.push((temp, target.clone()));
    }
    Ok(())
}

/// Rename every temp file over its target. On failure, targets replaced so
/// far get their previous content back.
fn commit<F>(staged: &[(PathBuf, PathBuf)], mut rename: F) -> CodegenResult<()>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    let mut committed: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(staged.len());
    for (temp, target) in staged {
        let backup = if target.exists() {
            let backup = backup_path(target);
            if let Err(e) = rename(target, &backup) {
                rollback(&committed);
                return Err(CodegenError::io(target, e));
            }
            Some(backup)
        } else {
            None
        };
        if let Err(e) = rename(temp, target) {
            committed.push((target, backup));
            rollback(&committed);
            return Err(CodegenError::io(target, e));
        }
        committed.push((target, backup));
    }

    for backup in committed.iter().filter_map(|(_, backup)| backup.as_ref()) {
        let _ = fs::remove_file(backup);
    }
    Ok(())
}

fn rollback(committed: &[(&Path, Option<PathBuf>)]) {
    for (target, backup) in committed.iter().rev() {
        match backup {
            Some(backup) => {
                debug!("OutputWriter: restoring {}", target.display());
                let _ = fs::rename(backup, target);
            }
            None => {
                trace!("OutputWriter: removing {}", target.display());
                let _ = fs::remove_file(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn writes_every_file_and_leaves_no_temps() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = BTreeMap::new();
        files.insert(dir.path().join("a/models.rs"), "// a".to_string());
        files.insert(dir.path().join("b/models.rs"), "// b".to_string());

        let written = write_all(&files).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(fs::read_to_string(dir.path().join("a/models.rs")).unwrap(), "// a");
        assert!(!temp_path(&dir.path().join("a/models.rs")).exists());
    }

    #[test]
    fn failed_commit_restores_previous_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a/models.rs");
        let b = dir.path().join("b/models.rs");
        let c = dir.path().join("c/models.rs");
        for (path, content) in [(&a, "// old a"), (&b, "// old b")] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let mut files = BTreeMap::new();
        files.insert(a.clone(), "// new a".to_string());
        files.insert(b.clone(), "// new b".to_string());
        files.insert(c.clone(), "// new c".to_string());
        let mut staged = Vec::new();
        stage(&files, &mut staged).unwrap();

        let refused = temp_path(&c);
        let result = commit(&staged, |from, to| {
            if from == refused {
                Err(io::Error::other("rename refused"))
            } else {
                fs::rename(from, to)
            }
        });

        assert_matches!(result, Err(CodegenError::Io { .. }));
        assert_eq!(fs::read_to_string(&a).unwrap(), "// old a");
        assert_eq!(fs::read_to_string(&b).unwrap(), "// old b");
        assert!(!c.exists());
        assert!(!backup_path(&a).exists());
        assert!(!backup_path(&b).exists());
    }

    #[test]
    fn overwrites_leave_no_backups() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("models.rs");
        fs::write(&target, "// old").unwrap();

        let files = BTreeMap::from([(target.clone(), "// new".to_string())]);
        write_all(&files).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "// new");
        assert!(!backup_path(&target).exists());
    }

    #[test]
    fn failure_removes_staged_files() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where a directory is needed makes the second stage fail.
        fs::write(dir.path().join("blocked"), "").unwrap();

        let mut files = BTreeMap::new();
        files.insert(dir.path().join("a/models.rs"), "// a".to_string());
        files.insert(dir.path().join("blocked/models.rs"), "// b".to_string());

        assert_matches!(write_all(&files), Err(CodegenError::Io { .. }));
        assert!(!dir.path().join("a/models.rs").exists());
        assert!(!temp_path(&dir.path().join("a/models.rs")).exists());
    }
}
