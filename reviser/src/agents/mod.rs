//! Model-backed agents for the analyze, generate and critique stages.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::core::guidance::Guidance;
use crate::core::state::Review;

pub mod continuation;
pub mod generator;
pub mod structured;

/// File-level context shared by every agent call.
#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    pub filename: &'a str,
    pub source_text: &'a str,
    pub dependency_contents: &'a BTreeMap<String, String>,
}

/// Inputs of one generation call.
#[derive(Debug, Clone)]
pub struct GenerationContext<'a> {
    pub file: FileContext<'a>,
    /// Latest revision; empty before the first generation.
    pub current_text: &'a str,
    pub guidance: Guidance,
}

/// Inputs of one critique call.
#[derive(Debug, Clone, Copy)]
pub struct CritiqueContext<'a> {
    pub file: FileContext<'a>,
    pub prior_text: &'a str,
    pub generated_text: &'a str,
    pub previous_critique: Option<&'a str>,
}

/// Content generation backend used by the workflow engine.
///
/// Errors from `analyze` and `critique` are recoverable (the engine degrades);
/// errors from `generate` abort the run.
pub trait ContentGenerator {
    fn analyze(&mut self, ctx: &FileContext<'_>) -> Result<Review>;
    fn generate(&mut self, ctx: &GenerationContext<'_>) -> Result<String>;
    fn critique(&mut self, ctx: &CritiqueContext<'_>) -> Result<Review>;
}
