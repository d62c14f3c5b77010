//! Selection of the single context source honored by a generation call.

use serde::Serialize;

use crate::core::state::{FeedbackKind, Review, SharedState};

/// The one piece of steering context passed to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Guidance {
    /// First pass: critique of the untouched source.
    InitialReview { review: Review },
    /// Compiler or runtime output after delivery.
    ExternalFeedback { kind: FeedbackKind, text: String },
    /// Free-text demand from the human reviewer.
    ReviewerFeedback { text: String },
    /// Critique of the previous generation (possibly empty).
    Refinement { critique: String },
}

impl Guidance {
    pub fn source(&self) -> &'static str {
        match self {
            Guidance::InitialReview { .. } => "initial_review",
            Guidance::ExternalFeedback { .. } => "external_feedback",
            Guidance::ReviewerFeedback { .. } => "reviewer_feedback",
            Guidance::Refinement { .. } => "refinement",
        }
    }
}

/// Pick the guidance for the next generation.
///
/// Precedence: initial review > external feedback > reviewer feedback > review
/// description. Only one source is returned even if several are set.
pub fn select_guidance(state: &SharedState) -> Guidance {
    if let Some(review) = &state.initial_review {
        return Guidance::InitialReview {
            review: review.clone(),
        };
    }
    if let Some(text) = non_empty(state.external_feedback_text.as_deref()) {
        return Guidance::ExternalFeedback {
            kind: state.external_feedback_kind,
            text: text.to_string(),
        };
    }
    if let Some(text) = non_empty(state.reviewer_feedback_text.as_deref()) {
        return Guidance::ReviewerFeedback {
            text: text.to_string(),
        };
    }
    Guidance::Refinement {
        critique: state
            .review
            .as_ref()
            .map(|review| review.description.clone())
            .unwrap_or_default(),
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|text| !text.trim().is_empty())
}
