//! Workflow stages and the explicit continue/abort signal returned by each stage.

use std::fmt;

use serde::Serialize;

/// States of the per-file revision workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AnalyzeFile,
    Generate,
    Critique,
    HumanReview,
    Send,
    ReceiveFeedback,
    ClassifyFeedback,
    Persist,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::AnalyzeFile => "analyze_file",
            Stage::Generate => "generate",
            Stage::Critique => "critique",
            Stage::HumanReview => "human_review",
            Stage::Send => "send",
            Stage::ReceiveFeedback => "receive_feedback",
            Stage::ClassifyFeedback => "classify_feedback",
            Stage::Persist => "persist",
            Stage::Done => "done",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Done
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the workflow stopped before reaching [`Stage::Done`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The work queue was empty when the run started.
    EmptyQueue,
    /// The operator asked to exit.
    UserRequested,
    /// The primary source file could not be read.
    SourceUnreadable { path: String, message: String },
    /// The generation backend failed (spawn error, timeout, bad exit).
    Backend { stage: Stage, message: String },
    /// Artifacts for a finished file could not be written.
    PersistFailed { path: String, message: String },
    /// A bounded retry loop ran out of rounds.
    RetryBudgetExhausted {
        stage: Stage,
        file: String,
        rounds: u32,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::EmptyQueue => f.write_str("no files to process"),
            AbortReason::UserRequested => f.write_str("exit requested by user"),
            AbortReason::SourceUnreadable { path, message } => {
                write!(f, "cannot read source file {path}: {message}")
            }
            AbortReason::Backend { stage, message } => {
                write!(f, "model backend failed during {stage}: {message}")
            }
            AbortReason::PersistFailed { path, message } => {
                write!(f, "cannot save artifacts for {path}: {message}")
            }
            AbortReason::RetryBudgetExhausted {
                stage,
                file,
                rounds,
            } => write!(f, "{file}: gave up at {stage} after {rounds} rounds"),
        }
    }
}

/// Result of running one stage: either the next stage or a terminal abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue(Stage),
    Abort(AbortReason),
}
