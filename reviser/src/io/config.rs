//! Workflow configuration stored in `reviser.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "reviser.toml";

/// Reviser configuration (TOML).
///
/// Meant to be edited by humans. Missing fields default to values that work
/// with the `init` layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReviserConfig {
    /// Root scanned for candidate files.
    pub input_dir: PathBuf,

    /// Root receiving revised files and their justification/log artifacts.
    pub output_dir: PathBuf,

    /// Directory holding included files (copybooks) referenced by sources.
    pub copy_dir: PathBuf,

    /// File suffix selecting candidates (e.g. `cob`).
    pub extension: String,

    pub limits: LimitsConfig,
    pub model: ModelConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Consecutive `bad` critiques tolerated before the run aborts.
    pub max_critique_rounds: u32,

    /// Follow-up `continue` calls allowed for a single generation.
    pub max_continuation_rounds: u32,

    /// Compile/runtime error rounds tolerated for one file before aborting.
    pub max_feedback_rounds: u32,

    /// Hard ceiling on stage transitions for one file.
    pub max_transitions_per_file: u32,

    /// Diff lines shown to the human reviewer before eliding the rest.
    pub diff_max_lines: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_critique_rounds: 5,
            max_continuation_rounds: 8,
            max_feedback_rounds: 5,
            max_transitions_per_file: 200,
            diff_max_lines: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Command that reads a prompt on stdin and prints the completion on stdout.
    pub command: Vec<String>,

    /// Per-call wall-clock budget in seconds.
    pub timeout_secs: u64,

    /// Truncate captured model output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Where external feedback comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackMode {
    /// Operator pastes compiler/runtime output, terminated by `END`.
    #[default]
    Terminal,
    /// Run `feedback.command` against the delivered file.
    Command,
}

/// How feedback text is classified.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    #[default]
    Keyword,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedbackConfig {
    pub mode: FeedbackMode,

    pub classifier: ClassifierMode,

    /// Directory receiving delivered files before feedback is collected.
    pub outbox_dir: PathBuf,

    /// Command run in `command` mode; `{file}` is replaced by the delivered path.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    pub output_limit_bytes: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            mode: FeedbackMode::Terminal,
            classifier: ClassifierMode::Keyword,
            outbox_dir: PathBuf::from("outbox"),
            command: vec!["cobc".to_string(), "-x".to_string(), "{file}".to_string()],
            timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for ReviserConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            copy_dir: PathBuf::from("input/copy"),
            extension: "cob".to_string(),
            limits: LimitsConfig::default(),
            model: ModelConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl ReviserConfig {
    pub fn validate(&self) -> Result<()> {
        if self.extension.trim().is_empty() {
            return Err(anyhow!("extension must be non-empty"));
        }
        if self.input_dir == self.output_dir {
            return Err(anyhow!("input_dir and output_dir must differ"));
        }
        let limits = &self.limits;
        if limits.max_critique_rounds == 0 {
            return Err(anyhow!("limits.max_critique_rounds must be > 0"));
        }
        if limits.max_continuation_rounds == 0 {
            return Err(anyhow!("limits.max_continuation_rounds must be > 0"));
        }
        if limits.max_feedback_rounds == 0 {
            return Err(anyhow!("limits.max_feedback_rounds must be > 0"));
        }
        if limits.max_transitions_per_file == 0 {
            return Err(anyhow!("limits.max_transitions_per_file must be > 0"));
        }
        if self.model.command.is_empty() || self.model.command[0].trim().is_empty() {
            return Err(anyhow!("model.command must be a non-empty array"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        if self.model.output_limit_bytes == 0 {
            return Err(anyhow!("model.output_limit_bytes must be > 0"));
        }
        if self.feedback.mode == FeedbackMode::Command
            && (self.feedback.command.is_empty() || self.feedback.command[0].trim().is_empty())
        {
            return Err(anyhow!(
                "feedback.command must be a non-empty array in command mode"
            ));
        }
        if self.feedback.timeout_secs == 0 {
            return Err(anyhow!("feedback.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Resolve relative directories against `root`.
    pub fn resolved(mut self, root: &Path) -> Self {
        for dir in [
            &mut self.input_dir,
            &mut self.output_dir,
            &mut self.copy_dir,
            &mut self.feedback.outbox_dir,
        ] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReviserConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReviserConfig> {
    if !path.exists() {
        let cfg = ReviserConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ReviserConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ReviserConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
