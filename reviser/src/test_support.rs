//! Scripted collaborators and fixtures for engine tests.
//!
//! Every fake pops answers from a queue and records what it was asked, so a
//! test reads as a script of the conversation followed by assertions on it.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::agents::{ContentGenerator, CritiqueContext, FileContext, GenerationContext};
use crate::core::classifier::classify_feedback;
use crate::core::stage::Stage;
use crate::core::state::{FeedbackKind, Grade, Review};
use crate::io::feedback::{ExternalFeedbackChannel, FeedbackClassifier};
use crate::io::human::{HumanGate, HumanInput};
use crate::io::model::{LanguageModel, ModelRequest};
use crate::io::persist::{ArtifactPaths, Artifacts, PersistenceSink, artifact_paths};
use crate::io::scan::SourceRepository;

/// Model returning canned replies in order; errors once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.borrow().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, request: &ModelRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model has no reply left"))
    }
}

/// One call observed by [`ScriptedGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCall {
    pub stage: Stage,
    pub filename: String,
    pub source_text: String,
    /// Guidance source for generate calls; empty otherwise.
    pub guidance_source: &'static str,
    /// Revision passed in (generate) or under review (critique).
    pub text: String,
    pub dependencies: Vec<String>,
}

impl GeneratorCall {
    fn new(stage: Stage, file: &FileContext<'_>) -> Self {
        Self {
            stage,
            filename: file.filename.to_string(),
            source_text: file.source_text.to_string(),
            guidance_source: "",
            text: String::new(),
            dependencies: file.dependency_contents.keys().cloned().collect(),
        }
    }
}

/// Content generator driven by queued results.
///
/// Defaults when a queue is empty: analyze returns a `bad` review, generate
/// returns `REVISION <n>`, critique returns a `good` review.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    analyze: VecDeque<Result<Review, String>>,
    generate: VecDeque<Result<String, String>>,
    critique: VecDeque<Result<Review, String>>,
    calls: Vec<GeneratorCall>,
}

impl ScriptedGenerator {
    pub fn push_analyze(&mut self, review: Review) {
        self.analyze.push_back(Ok(review));
    }

    pub fn push_analyze_error(&mut self, message: &str) {
        self.analyze.push_back(Err(message.to_string()));
    }

    pub fn push_generate(&mut self, text: &str) {
        self.generate.push_back(Ok(text.to_string()));
    }

    pub fn push_generate_error(&mut self, message: &str) {
        self.generate.push_back(Err(message.to_string()));
    }

    pub fn push_critique(&mut self, review: Review) {
        self.critique.push_back(Ok(review));
    }

    pub fn push_critique_error(&mut self, message: &str) {
        self.critique.push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> &[GeneratorCall] {
        &self.calls
    }

    pub fn generate_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| call.stage == Stage::Generate)
            .count()
    }
}

impl ContentGenerator for ScriptedGenerator {
    fn analyze(&mut self, ctx: &FileContext<'_>) -> Result<Review> {
        self.calls.push(GeneratorCall::new(Stage::AnalyzeFile, ctx));
        match self.analyze.pop_front() {
            Some(result) => result.map_err(|message| anyhow!(message)),
            None => Ok(Review::new("initial review", Grade::Bad)),
        }
    }

    fn generate(&mut self, ctx: &GenerationContext<'_>) -> Result<String> {
        let mut call = GeneratorCall::new(Stage::Generate, &ctx.file);
        call.guidance_source = ctx.guidance.source();
        call.text = ctx.current_text.to_string();
        self.calls.push(call);
        let n = self.generate_calls();
        match self.generate.pop_front() {
            Some(result) => result.map_err(|message| anyhow!(message)),
            None => Ok(format!("REVISION {n}")),
        }
    }

    fn critique(&mut self, ctx: &CritiqueContext<'_>) -> Result<Review> {
        let mut call = GeneratorCall::new(Stage::Critique, &ctx.file);
        call.text = ctx.generated_text.to_string();
        self.calls.push(call);
        match self.critique.pop_front() {
            Some(result) => result.map_err(|message| anyhow!(message)),
            None => Ok(Review::new("ready for review", Grade::Good)),
        }
    }
}

/// Human gate answering from a queue; quits once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedHumanGate {
    answers: VecDeque<HumanInput>,
    presented: Vec<(String, String, String)>,
}

impl ScriptedHumanGate {
    pub fn push(&mut self, input: HumanInput) {
        self.answers.push_back(input);
    }

    /// `(filename, old, new)` for every diff shown.
    pub fn presented(&self) -> &[(String, String, String)] {
        &self.presented
    }
}

impl HumanGate for ScriptedHumanGate {
    fn present_diff(&mut self, filename: &str, old: &str, new: &str) -> Result<()> {
        self.presented
            .push((filename.to_string(), old.to_string(), new.to_string()));
        Ok(())
    }

    fn collect_decision(&mut self) -> Result<HumanInput> {
        Ok(self.answers.pop_front().unwrap_or(HumanInput::Quit))
    }
}

/// Feedback channel replaying queued feedback; closed once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    feedback: VecDeque<Result<String, String>>,
    delivered: Vec<(String, String)>,
}

impl ScriptedChannel {
    pub fn push_feedback(&mut self, text: &str) {
        self.feedback.push_back(Ok(text.to_string()));
    }

    pub fn push_error(&mut self, message: &str) {
        self.feedback.push_back(Err(message.to_string()));
    }

    /// `(filename, content)` for every delivery.
    pub fn delivered(&self) -> &[(String, String)] {
        &self.delivered
    }
}

impl ExternalFeedbackChannel for ScriptedChannel {
    fn deliver(&mut self, filename: &str, content: &str) -> Result<()> {
        self.delivered
            .push((filename.to_string(), content.to_string()));
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<String>> {
        match self.feedback.pop_front() {
            Some(Ok(text)) => Ok(Some(text)),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(None),
        }
    }
}

/// Classifier answering from a queue, then falling back to keywords.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    kinds: VecDeque<FeedbackKind>,
    inputs: Vec<String>,
}

impl ScriptedClassifier {
    pub fn push(&mut self, kind: FeedbackKind) {
        self.kinds.push_back(kind);
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }
}

impl FeedbackClassifier for ScriptedClassifier {
    fn classify(&mut self, raw: &str) -> FeedbackKind {
        self.inputs.push(raw.to_string());
        self.kinds
            .pop_front()
            .unwrap_or_else(|| classify_feedback(raw))
    }
}

/// In-memory sources keyed by path, plus named dependencies.
#[derive(Debug, Default, Clone)]
pub struct MemorySources {
    sources: BTreeMap<PathBuf, String>,
    dependencies: BTreeMap<String, String>,
}

impl MemorySources {
    pub fn with_source(mut self, path: impl Into<PathBuf>, text: &str) -> Self {
        self.sources.insert(path.into(), text.to_string());
        self
    }

    pub fn with_dependency(mut self, name: &str, text: &str) -> Self {
        self.dependencies.insert(name.to_string(), text.to_string());
        self
    }
}

impl SourceRepository for MemorySources {
    fn read_source(&self, path: &Path) -> Result<String> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("read {}: no such file", path.display()))
    }

    fn read_dependency(&self, name: &str) -> Result<Option<String>> {
        Ok(self.dependencies.get(name).cloned())
    }
}

/// Owned copy of one saved artifact set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifacts {
    pub source_path: PathBuf,
    pub generated_text: String,
    pub justification: String,
    pub feedback_text: String,
    pub stages: Vec<Stage>,
}

/// Sink that records artifacts instead of writing them.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Vec<SavedArtifacts>,
    fail_after: Option<usize>,
}

impl MemorySink {
    /// Sink whose saves fail once `saves` artifact sets were recorded.
    pub fn failing_after(saves: usize) -> Self {
        Self {
            saved: Vec::new(),
            fail_after: Some(saves),
        }
    }

    pub fn saved(&self) -> &[SavedArtifacts] {
        &self.saved
    }
}

impl PersistenceSink for MemorySink {
    fn save(&mut self, artifacts: &Artifacts<'_>) -> Result<ArtifactPaths> {
        if self.fail_after.is_some_and(|limit| self.saved.len() >= limit) {
            return Err(anyhow!("write {}: disk full", artifacts.source_path.display()));
        }
        self.saved.push(SavedArtifacts {
            source_path: artifacts.source_path.to_path_buf(),
            generated_text: artifacts.generated_text.to_string(),
            justification: artifacts.justification.to_string(),
            feedback_text: artifacts.feedback_text.to_string(),
            stages: artifacts.trace.stages.clone(),
        });
        Ok(artifact_paths(
            Path::new("input"),
            Path::new("output"),
            artifacts.source_path,
        ))
    }
}

/// Temporary project directory with the default `input/`, `input/copy/` and
/// `output/` layout.
pub struct TempProject {
    dir: tempfile::TempDir,
}

impl TempProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        for sub in ["input", "input/copy", "output"] {
            fs::create_dir_all(dir.path().join(sub))
                .with_context(|| format!("create {sub}"))?;
        }
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `relative` below the root and return the full path.
    pub fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.dir.path().join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
