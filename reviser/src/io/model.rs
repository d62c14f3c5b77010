//! Language model abstraction.
//!
//! The [`LanguageModel`] trait decouples the workflow from the actual backend.
//! [`CommandModel`] spawns a configured CLI (prompt on stdin, completion on
//! stdout). Tests use scripted models that return predetermined text.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ModelConfig;
use crate::io::process::run_command_with_timeout;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior exchange in a multi-turn generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Workflow stage issuing the call (for logs).
    pub stage: String,
    /// Rendered instruction prompt.
    pub system: String,
    /// Earlier turns of the same session, oldest first.
    pub history: Vec<Turn>,
    /// Latest user message (empty on the first call of a session).
    pub question: String,
}

impl ModelRequest {
    pub fn single(stage: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            system: system.into(),
            history: Vec::new(),
            question: String::new(),
        }
    }

    /// Flatten the request into one prompt for text-in/text-out backends.
    pub fn render_transcript(&self) -> String {
        let mut buf = self.system.trim().to_string();
        for turn in &self.history {
            let label = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            buf.push_str(&format!("\n\n### {label}\n{}", turn.content));
        }
        if !self.question.trim().is_empty() {
            buf.push_str(&format!("\n\n### User\n{}", self.question.trim()));
        }
        buf.push('\n');
        buf
    }
}

/// Abstraction over model backends.
pub trait LanguageModel {
    fn complete(&self, request: &ModelRequest) -> Result<String>;
}

/// Model backend that spawns an external command per call.
#[derive(Debug, Clone)]
pub struct CommandModel {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandModel {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> Self {
        Self::new(
            cfg.command.clone(),
            Duration::from_secs(cfg.timeout_secs),
            cfg.output_limit_bytes,
        )
    }
}

impl LanguageModel for CommandModel {
    #[instrument(skip_all, fields(stage = %request.stage, turns = request.history.len()))]
    fn complete(&self, request: &ModelRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("model command is empty"))?;
        info!(program = %program, "calling model");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let prompt = request.render_transcript();
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run model command {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "model call timed out");
            return Err(anyhow!("model call timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model call failed");
            return Err(anyhow!(
                "model command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        let text = output.stdout_text();
        debug!(bytes = text.len(), "model call completed");
        Ok(text)
    }
}
