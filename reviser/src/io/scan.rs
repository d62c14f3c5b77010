//! Candidate discovery and source/dependency loading.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::dependencies::referenced_dependencies;

/// List files under `root` whose extension matches `extension`
/// (case-insensitive, leading dot optional), sorted by path.
///
/// Hidden directories are skipped. A missing root yields an empty list.
pub fn enumerate_candidates(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        warn!(root = %root.display(), "input directory does not exist");
        return Ok(Vec::new());
    }
    let wanted = extension.trim_start_matches('.');
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted));
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    debug!(root = %root.display(), count = files.len(), "enumerated candidates");
    Ok(files)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Read access to primary sources and their included files.
pub trait SourceRepository {
    fn read_source(&self, path: &Path) -> Result<String>;

    /// Contents of an included file, or `None` when it does not exist.
    fn read_dependency(&self, name: &str) -> Result<Option<String>>;
}

/// Load every dependency referenced by `source`, skipping missing ones.
pub fn load_dependencies<R: SourceRepository + ?Sized>(
    repo: &R,
    filename: &str,
    source: &str,
) -> BTreeMap<String, String> {
    let mut contents = BTreeMap::new();
    for name in referenced_dependencies(source) {
        match repo.read_dependency(&name) {
            Ok(Some(text)) => {
                contents.insert(name, text);
            }
            Ok(None) => warn!(file = filename, dependency = %name, "dependency not found, skipping"),
            Err(err) => {
                warn!(file = filename, dependency = %name, err = %format!("{err:#}"), "dependency unreadable, skipping");
            }
        }
    }
    contents
}

/// A dependency name that cannot leave the copy directory.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\', ':'])
        && !Path::new(name).is_absolute()
}

/// Repository reading from the file system.
///
/// Dependencies are looked up in `copy_dir` by exact name, then with the
/// configured source extension and the usual copybook extensions.
#[derive(Debug, Clone)]
pub struct FsSourceRepository {
    copy_dir: PathBuf,
    extensions: Vec<String>,
}

impl FsSourceRepository {
    pub fn new(copy_dir: impl Into<PathBuf>, source_extension: &str) -> Self {
        let mut extensions = vec!["cpy".to_string(), "CPY".to_string()];
        let source_extension = source_extension.trim_start_matches('.');
        if !source_extension.is_empty() && !extensions.iter().any(|e| e == source_extension) {
            extensions.push(source_extension.to_string());
        }
        Self {
            copy_dir: copy_dir.into(),
            extensions,
        }
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let mut paths = vec![self.copy_dir.join(name)];
        paths.extend(
            self.extensions
                .iter()
                .map(|ext| self.copy_dir.join(format!("{name}.{ext}"))),
        );
        paths
    }
}

impl SourceRepository for FsSourceRepository {
    fn read_source(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
    }

    fn read_dependency(&self, name: &str) -> Result<Option<String>> {
        if !is_plain_name(name) {
            return Err(anyhow!(
                "dependency name {name:?} must be a plain file name inside {}",
                self.copy_dir.display()
            ));
        }
        for path in self.candidates(name) {
            match fs::read_to_string(&path) {
                Ok(text) => {
                    debug!(dependency = name, path = %path.display(), "loaded dependency");
                    return Ok(Some(text));
                }
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) if path.is_dir() => {
                    debug!(path = %path.display(), err = %err, "dependency path is a directory");
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("read {}", path.display()));
                }
            }
        }
        Ok(None)
    }
}
