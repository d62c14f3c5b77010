//! Decision points of the workflow graph.
//!
//! Each gate is a pure function from state to the next [`Stage`]. The engine
//! owns retry budgets; gates only look at the latest verdict.

use crate::core::stage::Stage;
use crate::core::state::{FeedbackKind, Grade, HumanDecision, Review};

/// Verdict of the automated quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Regenerate,
    Proceed,
}

/// Accept only an explicit `good` grade. A missing review counts as `bad`.
pub fn quality_gate(review: Option<&Review>) -> GateDecision {
    match review.map(|review| review.grade) {
        Some(Grade::Good) => GateDecision::Proceed,
        _ => GateDecision::Regenerate,
    }
}

/// Stage following the critique.
pub fn after_critique(review: Option<&Review>) -> Stage {
    match quality_gate(review) {
        GateDecision::Proceed => Stage::HumanReview,
        GateDecision::Regenerate => Stage::Generate,
    }
}

/// Stage following the human gate. Anything but an explicit accept regenerates.
pub fn after_human_review(decision: HumanDecision) -> Stage {
    match decision {
        HumanDecision::Accept => Stage::Send,
        HumanDecision::Reject | HumanDecision::Pending => Stage::Generate,
    }
}

/// Stage following classification of external feedback.
pub fn after_classification(kind: FeedbackKind) -> Stage {
    match kind {
        FeedbackKind::CompileError | FeedbackKind::RuntimeError => Stage::Generate,
        FeedbackKind::BenignLog | FeedbackKind::None => Stage::Persist,
    }
}

/// Stage following persistence of a file.
pub fn after_persist(remaining_files: usize) -> Stage {
    if remaining_files > 0 {
        Stage::AnalyzeFile
    } else {
        Stage::Done
    }
}
