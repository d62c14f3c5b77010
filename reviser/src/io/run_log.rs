//! Per-file transition traces under `<output>/.reviser/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::stage::Stage;

/// Directory (under the output root) holding run traces.
pub const TRACE_DIR: &str = ".reviser";

/// Stages visited while revising one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileTrace {
    pub file: String,
    pub stages: Vec<Stage>,
    pub generate_calls: u32,
    pub feedback_rounds: u32,
}

impl FileTrace {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, stage: Stage) {
        if stage == Stage::Generate {
            self.generate_calls += 1;
        }
        self.stages.push(stage);
    }

    pub fn transitions(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }
}

/// Path of the trace for a file whose output-relative path is `relative`.
pub fn trace_path(output_root: &Path, relative: &Path) -> PathBuf {
    let mut name = relative.as_os_str().to_os_string();
    name.push(".trace.json");
    output_root.join(TRACE_DIR).join(name)
}

/// Pretty JSON for `trace`, newline-terminated.
pub fn render_trace(trace: &FileTrace) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(trace).context("serialize trace")?;
    buf.push('\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_path_mirrors_relative_layout() {
        let path = trace_path(Path::new("/out"), Path::new("batch/PAY.cob"));
        assert_eq!(path, PathBuf::from("/out/.reviser/batch/PAY.cob.trace.json"));
    }

    #[test]
    fn records_stages_and_counts_generations() {
        let mut trace = FileTrace::new("A.cob");
        for stage in [
            Stage::AnalyzeFile,
            Stage::Generate,
            Stage::Critique,
            Stage::Generate,
            Stage::Critique,
            Stage::HumanReview,
            Stage::Send,
        ] {
            trace.record(stage);
        }
        assert_eq!(trace.generate_calls, 2);
        assert_eq!(trace.transitions(), 6);
    }

    #[test]
    fn renders_pretty_json() {
        let mut trace = FileTrace::new("A.cob");
        trace.record(Stage::AnalyzeFile);

        let contents = render_trace(&trace).expect("render");

        assert!(contents.ends_with("}\n"));
        let value: serde_json::Value = serde_json::from_str(&contents).expect("json");
        assert_eq!(value["stages"][0], "analyze_file");
        assert_eq!(value["file"], "A.cob");
    }
}
