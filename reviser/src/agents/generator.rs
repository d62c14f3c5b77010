//! [`ContentGenerator`] backed by a [`LanguageModel`].

use anyhow::Result;
use tracing::{debug, instrument};

use crate::agents::continuation::accumulate_continuations;
use crate::agents::structured::{REVIEW_SCHEMA, parse_structured};
use crate::agents::{ContentGenerator, CritiqueContext, FileContext, GenerationContext};
use crate::core::stage::Stage;
use crate::core::state::Review;
use crate::io::model::{LanguageModel, ModelRequest};
use crate::io::prompt::PromptEngine;
use crate::io::session::{SessionKey, SessionStore};

pub struct ModelGenerator<M> {
    model: M,
    prompts: PromptEngine,
    sessions: SessionStore,
    max_continuation_rounds: u32,
}

impl<M: LanguageModel> ModelGenerator<M> {
    pub fn new(model: M, max_continuation_rounds: u32) -> Self {
        Self {
            model,
            prompts: PromptEngine::new(),
            sessions: SessionStore::new(),
            max_continuation_rounds,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    fn review(&self, stage: Stage, prompt: String) -> Result<Review> {
        let reply = self
            .model
            .complete(&ModelRequest::single(stage.as_str(), prompt))?;
        let review: Review = parse_structured(&reply, REVIEW_SCHEMA)?;
        debug!(stage = %stage, grade = %review.grade, "parsed review");
        Ok(review)
    }
}

impl<M: LanguageModel> ContentGenerator for ModelGenerator<M> {
    #[instrument(skip_all, fields(file = %ctx.filename))]
    fn analyze(&mut self, ctx: &FileContext<'_>) -> Result<Review> {
        let prompt = self.prompts.render_analyze(ctx)?;
        self.review(Stage::AnalyzeFile, prompt)
    }

    #[instrument(skip_all, fields(file = %ctx.file.filename, guidance = ctx.guidance.source()))]
    fn generate(&mut self, ctx: &GenerationContext<'_>) -> Result<String> {
        let prompt = self.prompts.render_generate(ctx)?;
        let key = SessionKey::new(Stage::Generate.as_str(), ctx.file.filename);
        accumulate_continuations(
            &self.model,
            &mut self.sessions,
            &key,
            &prompt,
            self.max_continuation_rounds,
        )
    }

    #[instrument(skip_all, fields(file = %ctx.file.filename))]
    fn critique(&mut self, ctx: &CritiqueContext<'_>) -> Result<Review> {
        let prompt = self.prompts.render_critique(ctx)?;
        self.review(Stage::Critique, prompt)
    }
}
