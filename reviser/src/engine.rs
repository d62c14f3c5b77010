//! The revision workflow state machine.
//!
//! [`WorkflowEngine`] owns the single [`SharedState`] and drives each queued
//! file through analyze, the generate/critique loop, the human gate, and the
//! external feedback loop until its artifacts are persisted. Every stage
//! returns a [`Flow`]: either the next stage or a terminal [`AbortReason`].
//! Terminal I/O failures are returned as errors instead; a failed artifact
//! write aborts the run like any other stage.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{error, info, instrument, warn};

use crate::agents::{ContentGenerator, CritiqueContext, FileContext, GenerationContext};
use crate::core::budget::RetryBudget;
use crate::core::gates::{after_classification, after_critique, after_human_review, after_persist};
use crate::core::guidance::select_guidance;
use crate::core::stage::{AbortReason, Flow, Stage};
use crate::core::state::{HumanDecision, Review, SharedState};
use crate::io::config::LimitsConfig;
use crate::io::feedback::{ExternalFeedbackChannel, FeedbackClassifier};
use crate::io::human::{HumanGate, HumanInput};
use crate::io::persist::{ArtifactPaths, Artifacts, PersistenceSink};
use crate::io::run_log::FileTrace;
use crate::io::scan::{SourceRepository, load_dependencies};

/// External collaborators the engine calls into.
pub struct Collaborators<'a> {
    pub sources: &'a dyn SourceRepository,
    pub generator: &'a mut dyn ContentGenerator,
    pub human: &'a mut dyn HumanGate,
    pub channel: &'a mut dyn ExternalFeedbackChannel,
    pub classifier: &'a mut dyn FeedbackClassifier,
    pub sink: &'a mut dyn PersistenceSink,
}

/// Retry ceilings applied per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_critique_rounds: u32,
    pub max_feedback_rounds: u32,
    pub max_transitions_per_file: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for EngineLimits {
    fn from(cfg: &LimitsConfig) -> Self {
        Self {
            max_critique_rounds: cfg.max_critique_rounds,
            max_feedback_rounds: cfg.max_feedback_rounds,
            max_transitions_per_file: cfg.max_transitions_per_file,
        }
    }
}

/// A transition reported to the observer.
#[derive(Debug)]
pub struct StageEvent<'s> {
    pub file: &'s str,
    pub from: Stage,
    pub to: Stage,
    pub state: &'s SharedState,
}

/// A file that reached persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    /// Source path as queued.
    pub path: PathBuf,
    pub artifacts: ArtifactPaths,
    pub trace: FileTrace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Aborted(AbortReason),
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub completed: Vec<FileReport>,
    pub outcome: RunOutcome,
    /// Trace of the file being revised when the run aborted.
    pub in_flight: Option<FileTrace>,
}

pub struct WorkflowEngine<'a> {
    collab: Collaborators<'a>,
    limits: EngineLimits,
    state: SharedState,
    critique_budget: RetryBudget,
    feedback_budget: RetryBudget,
    trace: FileTrace,
    saved: Option<(PathBuf, ArtifactPaths)>,
}

fn file_context(state: &SharedState) -> FileContext<'_> {
    FileContext {
        filename: &state.current_filename,
        source_text: state.source_text(),
        dependency_contents: &state.dependency_contents,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(
        collab: Collaborators<'a>,
        limits: EngineLimits,
        pending_files: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        Self {
            collab,
            limits,
            state: SharedState::new(pending_files),
            critique_budget: RetryBudget::new(limits.max_critique_rounds),
            feedback_budget: RetryBudget::new(limits.max_feedback_rounds),
            trace: FileTrace::default(),
            saved: None,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn run(&mut self) -> Result<RunReport> {
        self.run_observed(|_| {})
    }

    /// Run until the queue drains or a stage aborts, calling `on_event` after
    /// every transition.
    pub fn run_observed<F: FnMut(&StageEvent<'_>)>(&mut self, mut on_event: F) -> Result<RunReport> {
        let mut completed = Vec::new();
        if self.state.pending_files.is_empty() {
            warn!("no files to process");
            return Ok(RunReport {
                completed,
                outcome: RunOutcome::Aborted(AbortReason::EmptyQueue),
                in_flight: None,
            });
        }

        let mut stage = Stage::AnalyzeFile;
        while !stage.is_terminal() {
            if stage == Stage::AnalyzeFile {
                let name = self
                    .state
                    .current_file()
                    .map(|path| display_name(path))
                    .unwrap_or_default();
                self.trace = FileTrace::new(name);
            }
            self.trace.record(stage);
            if self.trace.transitions() > self.limits.max_transitions_per_file as usize {
                let reason = AbortReason::RetryBudgetExhausted {
                    stage,
                    file: self.trace.file.clone(),
                    rounds: self.limits.max_transitions_per_file,
                };
                return Ok(self.abort(completed, reason));
            }

            info!(file = %self.trace.file, stage = %stage, "entering stage");
            let next = match self.step(stage)? {
                Flow::Continue(next) => next,
                Flow::Abort(reason) => return Ok(self.abort(completed, reason)),
            };

            on_event(&StageEvent {
                file: &self.trace.file,
                from: stage,
                to: next,
                state: &self.state,
            });

            if stage == Stage::Persist {
                completed.push(self.take_report()?);
            }
            stage = next;
        }

        info!(files = completed.len(), "all files processed");
        Ok(RunReport {
            completed,
            outcome: RunOutcome::Done,
            in_flight: None,
        })
    }

    fn abort(&mut self, completed: Vec<FileReport>, reason: AbortReason) -> RunReport {
        error!(file = %self.trace.file, reason = %reason, "workflow aborted");
        RunReport {
            completed,
            outcome: RunOutcome::Aborted(reason),
            in_flight: Some(std::mem::take(&mut self.trace)),
        }
    }

    fn take_report(&mut self) -> Result<FileReport> {
        let (path, artifacts) = self
            .saved
            .take()
            .ok_or_else(|| anyhow!("persist finished without artifacts"))?;
        Ok(FileReport {
            path,
            artifacts,
            trace: std::mem::take(&mut self.trace),
        })
    }

    fn step(&mut self, stage: Stage) -> Result<Flow> {
        match stage {
            Stage::AnalyzeFile => Ok(self.analyze()),
            Stage::Generate => Ok(self.generate()),
            Stage::Critique => Ok(self.critique()),
            Stage::HumanReview => self.human_review(),
            Stage::Send => Ok(self.send()),
            Stage::ReceiveFeedback => Ok(self.receive_feedback()),
            Stage::ClassifyFeedback => Ok(self.classify_feedback()),
            Stage::Persist => Ok(self.persist()),
            Stage::Done => Ok(Flow::Continue(Stage::Done)),
        }
    }

    #[instrument(skip_all)]
    fn analyze(&mut self) -> Flow {
        let Some(path) = self.state.current_file().cloned() else {
            return Flow::Abort(AbortReason::EmptyQueue);
        };
        let filename = display_name(&path);
        let source = match self.collab.sources.read_source(&path) {
            Ok(source) => source,
            Err(err) => {
                return Flow::Abort(AbortReason::SourceUnreadable {
                    path: path.display().to_string(),
                    message: format!("{err:#}"),
                });
            }
        };
        let dependencies = load_dependencies(self.collab.sources, &filename, &source);
        info!(file = %filename, dependencies = dependencies.len(), "loaded source");
        self.state.begin_file(filename, source, dependencies);
        self.critique_budget.reset();
        self.feedback_budget.reset();

        let result = self.collab.generator.analyze(&file_context(&self.state));
        match result {
            Ok(review) => {
                info!(grade = %review.grade, "initial review ready");
                self.state.initial_review = Some(review);
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "initial review failed, generating without it");
                self.state.initial_review = None;
            }
        }
        Flow::Continue(Stage::Generate)
    }

    #[instrument(skip_all)]
    fn generate(&mut self) -> Flow {
        let guidance = select_guidance(&self.state);
        info!(guidance = guidance.source(), "generating revision");
        let ctx = GenerationContext {
            file: file_context(&self.state),
            current_text: &self.state.generated_text,
            guidance,
        };
        let result = self.collab.generator.generate(&ctx);
        match result {
            Ok(text) => {
                self.state.record_generation(text);
                Flow::Continue(Stage::Critique)
            }
            Err(err) => Flow::Abort(AbortReason::Backend {
                stage: Stage::Generate,
                message: format!("{err:#}"),
            }),
        }
    }

    #[instrument(skip_all)]
    fn critique(&mut self) -> Flow {
        let ctx = CritiqueContext {
            file: file_context(&self.state),
            prior_text: &self.state.prior_generated_text,
            generated_text: &self.state.generated_text,
            previous_critique: self
                .state
                .review
                .as_ref()
                .map(|review| review.description.as_str()),
        };
        let result = self.collab.generator.critique(&ctx);
        let review = result.unwrap_or_else(|err| {
            warn!(err = %format!("{err:#}"), "critique failed, treating revision as bad");
            Review::critique_failed()
        });
        info!(grade = %review.grade, "critique ready");
        self.state.review = Some(review);

        let next = after_critique(self.state.review.as_ref());
        if next == Stage::Generate {
            if !self.critique_budget.try_consume() {
                return Flow::Abort(AbortReason::RetryBudgetExhausted {
                    stage: Stage::Critique,
                    file: self.state.current_filename.clone(),
                    rounds: self.critique_budget.max(),
                });
            }
            warn!(
                round = self.critique_budget.used(),
                max = self.critique_budget.max(),
                "critique rejected revision"
            );
        }
        Flow::Continue(next)
    }

    #[instrument(skip_all)]
    fn human_review(&mut self) -> Result<Flow> {
        self.critique_budget.reset();
        self.collab.human.present_diff(
            &self.state.current_filename,
            self.state.source_text(),
            &self.state.generated_text,
        )?;
        let verdict = match self.collab.human.collect_decision()? {
            HumanInput::Quit => return Ok(Flow::Abort(AbortReason::UserRequested)),
            HumanInput::Verdict(verdict) => verdict,
        };

        self.state.human_decision = verdict.decision;
        match verdict.decision {
            HumanDecision::Accept => {
                info!("reviewer accepted revision");
                self.state.reviewer_feedback_text = None;
            }
            HumanDecision::Reject => {
                warn!("reviewer rejected revision");
                self.state.reviewer_feedback_text = verdict.feedback_text;
            }
            HumanDecision::Pending => {}
        }
        Ok(Flow::Continue(after_human_review(verdict.decision)))
    }

    #[instrument(skip_all)]
    fn send(&mut self) -> Flow {
        let result = self
            .collab
            .channel
            .deliver(&self.state.current_filename, &self.state.generated_text);
        match result {
            Ok(()) => Flow::Continue(Stage::ReceiveFeedback),
            Err(err) => Flow::Abort(AbortReason::Backend {
                stage: Stage::Send,
                message: format!("{err:#}"),
            }),
        }
    }

    #[instrument(skip_all)]
    fn receive_feedback(&mut self) -> Flow {
        match self.collab.channel.receive() {
            Ok(Some(text)) => {
                self.state.external_feedback_text = Some(text);
                Flow::Continue(Stage::ClassifyFeedback)
            }
            Ok(None) => Flow::Abort(AbortReason::UserRequested),
            Err(err) => Flow::Abort(AbortReason::Backend {
                stage: Stage::ReceiveFeedback,
                message: format!("{err:#}"),
            }),
        }
    }

    #[instrument(skip_all)]
    fn classify_feedback(&mut self) -> Flow {
        let raw = self.state.external_feedback_text.as_deref().unwrap_or_default();
        let kind = self.collab.classifier.classify(raw);
        self.state.external_feedback_kind = kind;
        info!(kind = kind.label(), "classified feedback");

        if kind.is_error() {
            if !self.feedback_budget.try_consume() {
                return Flow::Abort(AbortReason::RetryBudgetExhausted {
                    stage: Stage::ClassifyFeedback,
                    file: self.state.current_filename.clone(),
                    rounds: self.feedback_budget.max(),
                });
            }
            warn!(
                round = self.feedback_budget.used(),
                max = self.feedback_budget.max(),
                "downstream reported {}",
                kind.label().to_lowercase()
            );
            self.trace.feedback_rounds = self.feedback_budget.used();
        }
        Flow::Continue(after_classification(kind))
    }

    #[instrument(skip_all)]
    fn persist(&mut self) -> Flow {
        let Some(path) = self.state.current_file().cloned() else {
            return Flow::Abort(AbortReason::EmptyQueue);
        };
        let justification = self
            .state
            .review
            .as_ref()
            .map(|review| review.description.as_str())
            .unwrap_or_default();
        let result = self.collab.sink.save(&Artifacts {
            source_path: &path,
            generated_text: &self.state.generated_text,
            justification,
            feedback_text: self.state.external_feedback_text.as_deref().unwrap_or_default(),
            trace: &self.trace,
        });
        let paths = match result {
            Ok(paths) => paths,
            Err(err) => {
                return Flow::Abort(AbortReason::PersistFailed {
                    path: path.display().to_string(),
                    message: format!("{err:#}"),
                });
            }
        };
        self.state.finish_file();
        self.saved = Some((path, paths));
        Flow::Continue(after_persist(self.state.pending_files.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{FeedbackKind, Grade};
    use crate::io::human::HumanVerdict;
    use crate::test_support::{
        MemorySink, MemorySources, ScriptedChannel, ScriptedClassifier, ScriptedGenerator,
        ScriptedHumanGate,
    };

    struct Fixture {
        sources: MemorySources,
        generator: ScriptedGenerator,
        human: ScriptedHumanGate,
        channel: ScriptedChannel,
        classifier: ScriptedClassifier,
        sink: MemorySink,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sources: MemorySources::default().with_source("input/A.cob", "DISPLAY 'A'."),
                generator: ScriptedGenerator::default(),
                human: ScriptedHumanGate::default(),
                channel: ScriptedChannel::default(),
                classifier: ScriptedClassifier::default(),
                sink: MemorySink::default(),
            }
        }

        fn run(&mut self, limits: EngineLimits, files: &[&str]) -> (RunReport, Vec<(Stage, Stage)>) {
            let mut events = Vec::new();
            let collab = Collaborators {
                sources: &self.sources,
                generator: &mut self.generator,
                human: &mut self.human,
                channel: &mut self.channel,
                classifier: &mut self.classifier,
                sink: &mut self.sink,
            };
            let mut engine =
                WorkflowEngine::new(collab, limits, files.iter().map(PathBuf::from));
            let report = engine
                .run_observed(|event| events.push((event.from, event.to)))
                .expect("run");
            (report, events)
        }
    }

    fn bad(text: &str) -> Review {
        Review::new(text, Grade::Bad)
    }

    fn good() -> Review {
        Review::new("ready", Grade::Good)
    }

    #[test]
    fn empty_queue_aborts_immediately() {
        let mut fx = Fixture::new();
        let (report, events) = fx.run(EngineLimits::default(), &[]);
        assert_eq!(report.outcome, RunOutcome::Aborted(AbortReason::EmptyQueue));
        assert!(events.is_empty());
        assert!(fx.generator.calls().is_empty());
    }

    #[test]
    fn critique_failure_routes_back_to_generate() {
        let mut fx = Fixture::new();
        fx.generator.push_critique_error("timeout");
        fx.generator.push_critique(good());
        fx.human.push(HumanInput::Verdict(HumanVerdict::accept()));
        fx.channel.push_feedback("INFO: run completed");
        fx.classifier.push(FeedbackKind::BenignLog);

        let (report, events) = fx.run(EngineLimits::default(), &["input/A.cob"]);

        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(events[2], (Stage::Critique, Stage::Generate));
        let justification = &fx.sink.saved()[0].justification;
        assert_eq!(justification, "ready");
    }

    #[test]
    fn critique_budget_exhaustion_aborts_without_artifacts() {
        let mut fx = Fixture::new();
        for _ in 0..3 {
            fx.generator.push_critique(bad("still wrong"));
        }
        let limits = EngineLimits {
            max_critique_rounds: 2,
            ..EngineLimits::default()
        };

        let (report, _) = fx.run(limits, &["input/A.cob"]);

        assert_eq!(
            report.outcome,
            RunOutcome::Aborted(AbortReason::RetryBudgetExhausted {
                stage: Stage::Critique,
                file: "A.cob".into(),
                rounds: 2,
            })
        );
        assert_eq!(fx.generator.generate_calls(), 3);
        assert!(fx.sink.saved().is_empty());
        let trace = report.in_flight.expect("in-flight trace");
        assert_eq!(trace.generate_calls, 3);
    }

    #[test]
    fn feedback_budget_exhaustion_aborts_without_artifacts() {
        let mut fx = Fixture::new();
        let limits = EngineLimits {
            max_feedback_rounds: 1,
            ..EngineLimits::default()
        };
        for _ in 0..2 {
            fx.generator.push_critique(good());
            fx.human.push(HumanInput::Verdict(HumanVerdict::accept()));
            fx.channel.push_feedback("SYNTAX ERROR at line 12");
            fx.classifier.push(FeedbackKind::CompileError);
        }

        let (report, _) = fx.run(limits, &["input/A.cob"]);

        assert_eq!(
            report.outcome,
            RunOutcome::Aborted(AbortReason::RetryBudgetExhausted {
                stage: Stage::ClassifyFeedback,
                file: "A.cob".into(),
                rounds: 1,
            })
        );
        assert!(fx.sink.saved().is_empty());
    }

    #[test]
    fn transition_ceiling_aborts() {
        let mut fx = Fixture::new();
        let limits = EngineLimits {
            max_transitions_per_file: 3,
            ..EngineLimits::default()
        };
        for _ in 0..3 {
            fx.generator.push_critique(bad("no"));
        }

        let (report, _) = fx.run(limits, &["input/A.cob"]);

        assert!(matches!(
            report.outcome,
            RunOutcome::Aborted(AbortReason::RetryBudgetExhausted { rounds: 3, .. })
        ));
    }

    #[test]
    fn analyze_failure_degrades_to_refinement() {
        let mut fx = Fixture::new();
        fx.generator.push_analyze_error("model offline");
        fx.generator.push_critique(good());
        fx.human.push(HumanInput::Verdict(HumanVerdict::accept()));
        fx.channel.push_feedback("");
        fx.classifier.push(FeedbackKind::BenignLog);

        let (report, _) = fx.run(EngineLimits::default(), &["input/A.cob"]);

        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(fx.generator.calls()[1].guidance_source, "refinement");
    }

    #[test]
    fn generate_failure_aborts_with_backend_reason() {
        let mut fx = Fixture::new();
        fx.generator.push_generate_error("spawn llm: not found");

        let (report, _) = fx.run(EngineLimits::default(), &["input/A.cob"]);

        match report.outcome {
            RunOutcome::Aborted(AbortReason::Backend { stage, message }) => {
                assert_eq!(stage, Stage::Generate);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(fx.sink.saved().is_empty());
    }

    #[test]
    fn failed_save_keeps_earlier_reports() {
        let mut fx = Fixture::new();
        fx.sources = fx.sources.clone().with_source("input/B.cob", "DISPLAY 'B'.");
        fx.sink = MemorySink::failing_after(1);
        for _ in 0..2 {
            fx.human.push(HumanInput::Verdict(HumanVerdict::accept()));
            fx.channel.push_feedback("INFO: run completed");
        }

        let (report, _) = fx.run(EngineLimits::default(), &["input/A.cob", "input/B.cob"]);

        match &report.outcome {
            RunOutcome::Aborted(AbortReason::PersistFailed { path, message }) => {
                assert_eq!(path, "input/B.cob");
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].path, PathBuf::from("input/A.cob"));
        let trace = report.in_flight.expect("in-flight trace");
        assert_eq!(trace.stages.last(), Some(&Stage::Persist));
    }

    #[test]
    fn closed_feedback_channel_is_a_user_abort() {
        let mut fx = Fixture::new();
        fx.generator.push_critique(good());
        fx.human.push(HumanInput::Verdict(HumanVerdict::accept()));

        let (report, _) = fx.run(EngineLimits::default(), &["input/A.cob"]);

        assert_eq!(report.outcome, RunOutcome::Aborted(AbortReason::UserRequested));
        assert_eq!(fx.channel.delivered().len(), 1);
    }
}
