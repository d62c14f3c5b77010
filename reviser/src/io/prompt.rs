//! Prompt rendering for every model-backed stage.

use std::collections::BTreeMap;

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::agents::{CritiqueContext, FileContext, GenerationContext};
use crate::core::guidance::Guidance;

const ANALYZE_TEMPLATE: &str = include_str!("prompts/analyze.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const CRITIQUE_TEMPLATE: &str = include_str!("prompts/critique.md");
const CLASSIFY_TEMPLATE: &str = include_str!("prompts/classify.md");

/// Included file passed to templates.
#[derive(Debug, Clone, Serialize)]
struct DependencyContext<'a> {
    name: &'a str,
    content: &'a str,
}

fn dependency_list(deps: &BTreeMap<String, String>) -> Vec<DependencyContext<'_>> {
    deps.iter()
        .map(|(name, content)| DependencyContext {
            name,
            content: content.trim_end(),
        })
        .collect()
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("analyze", ANALYZE_TEMPLATE)
            .expect("analyze template should be valid");
        env.add_template("generate", GENERATE_TEMPLATE)
            .expect("generate template should be valid");
        env.add_template("critique", CRITIQUE_TEMPLATE)
            .expect("critique template should be valid");
        env.add_template("classify", CLASSIFY_TEMPLATE)
            .expect("classify template should be valid");
        Self { env }
    }

    pub fn render_analyze(&self, ctx: &FileContext<'_>) -> Result<String> {
        let template = self.env.get_template("analyze")?;
        let rendered = template.render(context! {
            filename => ctx.filename,
            source => ctx.source_text.trim_end(),
            dependencies => dependency_list(ctx.dependency_contents),
        })?;
        Ok(rendered)
    }

    pub fn render_generate(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        let feedback_label = match &ctx.guidance {
            Guidance::ExternalFeedback { kind, .. } => kind.label(),
            _ => "",
        };
        let template = self.env.get_template("generate")?;
        let rendered = template.render(context! {
            filename => ctx.file.filename,
            source => ctx.file.source_text.trim_end(),
            dependencies => dependency_list(ctx.file.dependency_contents),
            current => (!ctx.current_text.trim().is_empty()).then(|| ctx.current_text.trim_end()),
            guidance => &ctx.guidance,
            feedback_label => feedback_label,
        })?;
        Ok(rendered)
    }

    pub fn render_critique(&self, ctx: &CritiqueContext<'_>) -> Result<String> {
        let template = self.env.get_template("critique")?;
        let rendered = template.render(context! {
            filename => ctx.file.filename,
            source => ctx.file.source_text.trim_end(),
            prior => (!ctx.prior_text.trim().is_empty()).then(|| ctx.prior_text.trim_end()),
            previous_critique => ctx.previous_critique.map(str::trim).filter(|s| !s.is_empty()),
            generated => ctx.generated_text.trim_end(),
        })?;
        Ok(rendered)
    }

    pub fn render_classify(&self, message: &str) -> Result<String> {
        let template = self.env.get_template("classify")?;
        let rendered = template.render(context! { message => message.trim() })?;
        Ok(rendered)
    }
}
