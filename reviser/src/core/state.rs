//! Shared workflow state threaded through every stage.
//!
//! One [`SharedState`] instance lives for the whole batch. Per-file fields are
//! populated in phases (analyze, generate/critique loop, human loop, external
//! feedback loop) and reset wholesale by [`SharedState::finish_file`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Binary critique grade.
///
/// Deserializes from any string: only `good` (case-insensitive, trimmed) maps to
/// [`Grade::Good`]; every other value is [`Grade::Bad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Grade {
    Good,
    Bad,
}

impl Grade {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("good") {
            Grade::Good
        } else {
            Grade::Bad
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Good => "good",
            Grade::Bad => "bad",
        }
    }
}

impl From<String> for Grade {
    fn from(raw: String) -> Self {
        Grade::parse(&raw)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured critique produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub description: String,
    pub grade: Grade,
}

impl Review {
    /// Description used when the critique call itself fails.
    pub const CRITIQUE_FAILED: &'static str = "An error occurred during critique generation.";

    pub fn new(description: impl Into<String>, grade: Grade) -> Self {
        Self {
            description: description.into(),
            grade,
        }
    }

    /// Conservative review substituted for a failed critique call.
    pub fn critique_failed() -> Self {
        Self::new(Self::CRITIQUE_FAILED, Grade::Bad)
    }
}

/// Classification of text returned by the external feedback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    CompileError,
    RuntimeError,
    BenignLog,
    #[default]
    None,
}

impl FeedbackKind {
    pub fn is_error(self) -> bool {
        matches!(self, FeedbackKind::CompileError | FeedbackKind::RuntimeError)
    }

    /// Human-readable label used in prompts ("Compile error").
    pub fn label(self) -> &'static str {
        match self {
            FeedbackKind::CompileError => "Compile error",
            FeedbackKind::RuntimeError => "Runtime error",
            FeedbackKind::BenignLog => "Logs",
            FeedbackKind::None => "None",
        }
    }
}

/// Outcome of the human gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanDecision {
    Accept,
    Reject,
    #[default]
    Pending,
}

/// Mutable record owned by the workflow engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedState {
    /// Work queue; the head is the file currently being revised.
    pub pending_files: VecDeque<PathBuf>,
    pub current_filename: String,
    source_text: String,
    pub prior_generated_text: String,
    pub generated_text: String,
    pub initial_review: Option<Review>,
    pub review: Option<Review>,
    pub reviewer_feedback_text: Option<String>,
    pub dependency_contents: BTreeMap<String, String>,
    pub external_feedback_text: Option<String>,
    pub external_feedback_kind: FeedbackKind,
    pub human_decision: HumanDecision,
}

impl SharedState {
    pub fn new(pending_files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            pending_files: pending_files.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Original content of the current file. Set once per file by [`Self::begin_file`].
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn current_file(&self) -> Option<&PathBuf> {
        self.pending_files.front()
    }

    /// Populate the per-file fields for the head of the queue.
    pub fn begin_file(
        &mut self,
        filename: String,
        source_text: String,
        dependency_contents: BTreeMap<String, String>,
    ) {
        self.clear_file_fields();
        self.current_filename = filename;
        self.source_text = source_text;
        self.dependency_contents = dependency_contents;
    }

    /// Record a fresh generation: snapshot the previous output, store the new one,
    /// and clear every transient context field consumed by the call.
    pub fn record_generation(&mut self, generated_text: String) {
        self.prior_generated_text = std::mem::replace(&mut self.generated_text, generated_text);
        self.initial_review = None;
        self.clear_transients();
    }

    /// Drop the context consumed by a generation call.
    pub fn clear_transients(&mut self) {
        self.reviewer_feedback_text = None;
        self.external_feedback_text = None;
        self.external_feedback_kind = FeedbackKind::None;
    }

    /// Pop the completed file and reset all per-file fields.
    pub fn finish_file(&mut self) -> Option<PathBuf> {
        let done = self.pending_files.pop_front();
        self.clear_file_fields();
        done
    }

    /// True when every per-file field holds its default value.
    pub fn is_file_state_clear(&self) -> bool {
        let cleared = SharedState {
            pending_files: self.pending_files.clone(),
            ..SharedState::default()
        };
        *self == cleared
    }

    fn clear_file_fields(&mut self) {
        let pending = std::mem::take(&mut self.pending_files);
        *self = SharedState {
            pending_files: pending,
            ..SharedState::default()
        };
    }
}
