//! Final artifacts for a completed file.
//!
//! `input/NAME.ext` produces `output/NAME.ext` (the accepted revision),
//! `output/NAME_justification.md` (the last critique) and
//! `output/NAME_logs.txt` (the downstream feedback). Subdirectories below the
//! input root are mirrored below the output root.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::io::run_log::{FileTrace, render_trace, trace_path};

/// Everything written for one completed file.
#[derive(Debug, Clone, Copy)]
pub struct Artifacts<'a> {
    pub source_path: &'a Path,
    pub generated_text: &'a str,
    pub justification: &'a str,
    pub feedback_text: &'a str,
    pub trace: &'a FileTrace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub output: PathBuf,
    pub justification: PathBuf,
    pub logs: PathBuf,
}

pub trait PersistenceSink {
    fn save(&mut self, artifacts: &Artifacts<'_>) -> Result<ArtifactPaths>;
}

/// Path of `source` relative to `input_root`; just the file name when the
/// source lives elsewhere.
fn relative_source(input_root: &Path, source: &Path) -> PathBuf {
    match source.strip_prefix(input_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| source.to_path_buf()),
    }
}

/// Map a source path to its three artifact paths.
pub fn artifact_paths(input_root: &Path, output_root: &Path, source: &Path) -> ArtifactPaths {
    let output = output_root.join(relative_source(input_root, source));
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    ArtifactPaths {
        justification: output.with_file_name(format!("{stem}_justification.md")),
        logs: output.with_file_name(format!("{stem}_logs.txt")),
        output,
    }
}

fn text_file(contents: &str) -> String {
    let mut buf = contents.to_string();
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn stage_file(path: &Path, tmp: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(tmp, contents).with_context(|| format!("write {}", tmp.display()))
}

/// Write every file to a `.tmp` sibling, then rename them into place.
///
/// Nothing is renamed unless all temp writes succeeded; on failure the temp
/// files are removed and existing files are left untouched.
fn write_all_atomic(files: &[(PathBuf, String)]) -> Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for (path, contents) in files {
        let tmp = staging_path(path);
        let result = stage_file(path, &tmp, contents);
        staged.push(tmp);
        if let Err(err) = result {
            discard(&staged);
            return Err(err);
        }
    }
    for (tmp, (path, _)) in staged.iter().zip(files) {
        fs::rename(tmp, path).with_context(|| format!("replace {}", path.display()))?;
    }
    Ok(())
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path) {
            debug!(path = %path.display(), err = %err, "temp file not removed");
        }
    }
}

/// Sink writing artifacts (and the run trace) to the file system.
#[derive(Debug, Clone)]
pub struct FsPersistenceSink {
    input_root: PathBuf,
    output_root: PathBuf,
}

impl FsPersistenceSink {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }
}

impl PersistenceSink for FsPersistenceSink {
    fn save(&mut self, artifacts: &Artifacts<'_>) -> Result<ArtifactPaths> {
        let paths = artifact_paths(&self.input_root, &self.output_root, artifacts.source_path);
        let relative = relative_source(&self.input_root, artifacts.source_path);
        let trace = trace_path(&self.output_root, &relative);

        write_all_atomic(&[
            (paths.output.clone(), text_file(artifacts.generated_text)),
            (paths.justification.clone(), text_file(artifacts.justification)),
            (paths.logs.clone(), text_file(artifacts.feedback_text)),
            (trace.clone(), render_trace(artifacts.trace)?),
        ])?;
        debug!(trace = %trace.display(), "wrote trace");

        info!(output = %paths.output.display(), "saved artifacts");
        Ok(paths)
    }
}
