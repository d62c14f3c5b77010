//! End-to-end workflow scenarios.
//!
//! These tests drive `WorkflowEngine` over whole files with scripted model
//! output and verify the stage sequence, the context handed to each
//! generation, and the artifacts left on disk.

use std::io::Cursor;
use std::path::PathBuf;

use reviser::core::stage::{AbortReason, Stage};
use reviser::core::state::{FeedbackKind, Grade, Review};
use reviser::engine::{Collaborators, EngineLimits, RunOutcome, RunReport, WorkflowEngine};
use reviser::io::feedback::{KeywordClassifier, TerminalFeedbackChannel};
use reviser::io::human::{HumanInput, HumanVerdict, TerminalHumanGate};
use reviser::io::persist::FsPersistenceSink;
use reviser::io::scan::FsSourceRepository;
use reviser::io::terminal::LineInput;
use reviser::test_support::{
    MemorySink, MemorySources, ScriptedChannel, ScriptedClassifier, ScriptedGenerator,
    ScriptedHumanGate, TempProject,
};

const SOURCE_A: &str = "000100 IDENTIFICATION DIVISION.\n000200 PROGRAM-ID. A.\n000300 PROCEDURE DIVISION.\n000400     STOP RUN.\n";
const SOURCE_B: &str = "000100 IDENTIFICATION DIVISION.\n000200 PROGRAM-ID. B.\n000300     COPY CUSTREC.\n000400     STOP RUN.\n";

fn bad(text: &str) -> Review {
    Review::new(text, Grade::Bad)
}

fn accept() -> HumanInput {
    HumanInput::Verdict(HumanVerdict::accept())
}

/// Everything observed at one transition.
#[derive(Debug, Clone)]
struct Seen {
    from: Stage,
    to: Stage,
    pending: usize,
    file_state_clear: bool,
    external_feedback: Option<String>,
    reviewer_feedback: Option<String>,
    source_text: String,
}

/// In-memory collaborators plus a helper that runs the engine and records
/// every transition.
struct Harness {
    sources: MemorySources,
    generator: ScriptedGenerator,
    human: ScriptedHumanGate,
    channel: ScriptedChannel,
    classifier: ScriptedClassifier,
    sink: MemorySink,
}

impl Harness {
    fn new(sources: MemorySources) -> Self {
        Self {
            sources,
            generator: ScriptedGenerator::default(),
            human: ScriptedHumanGate::default(),
            channel: ScriptedChannel::default(),
            classifier: ScriptedClassifier::default(),
            sink: MemorySink::default(),
        }
    }

    fn run(&mut self, files: &[&str]) -> (RunReport, Vec<Seen>) {
        let mut seen = Vec::new();
        let collab = Collaborators {
            sources: &self.sources,
            generator: &mut self.generator,
            human: &mut self.human,
            channel: &mut self.channel,
            classifier: &mut self.classifier,
            sink: &mut self.sink,
        };
        let mut engine = WorkflowEngine::new(
            collab,
            EngineLimits::default(),
            files.iter().map(PathBuf::from),
        );
        let report = engine
            .run_observed(|event| {
                seen.push(Seen {
                    from: event.from,
                    to: event.to,
                    pending: event.state.pending_files.len(),
                    file_state_clear: event.state.is_file_state_clear(),
                    external_feedback: event.state.external_feedback_text.clone(),
                    reviewer_feedback: event.state.reviewer_feedback_text.clone(),
                    source_text: event.state.source_text().to_string(),
                });
            })
            .expect("run");
        (report, seen)
    }
}

/// Queue `[A.cob]`: one generation graded good, accepted, benign logs.
///
/// Uses the file-system source repository and persistence sink to check the
/// artifact triple and the run trace.
#[test]
fn single_file_happy_path_writes_one_artifact_triple() {
    let project = TempProject::new().expect("project");
    let source_path = project.write("input/A.cob", SOURCE_A).expect("write");
    let input_dir = project.root().join("input");
    let output_dir = project.root().join("output");

    let sources = FsSourceRepository::new(input_dir.join("copy"), "cob");
    let mut generator = ScriptedGenerator::default();
    generator.push_generate("000100 IDENTIFICATION DIVISION.\n000150* Entry point.\n");
    generator.push_critique(Review::new("Comments are accurate.", Grade::Good));
    let mut human = ScriptedHumanGate::default();
    human.push(accept());
    let mut channel = ScriptedChannel::default();
    channel.push_feedback("INFO: run completed");
    let mut classifier = KeywordClassifier;
    let mut sink = FsPersistenceSink::new(&input_dir, &output_dir);

    let mut engine = WorkflowEngine::new(
        Collaborators {
            sources: &sources,
            generator: &mut generator,
            human: &mut human,
            channel: &mut channel,
            classifier: &mut classifier,
            sink: &mut sink,
        },
        EngineLimits::default(),
        [source_path.clone()],
    );
    let report = engine.run().expect("run");

    assert_eq!(report.outcome, RunOutcome::Done);
    assert!(engine.state().pending_files.is_empty());
    assert!(engine.state().is_file_state_clear());
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].path, source_path);
    assert_eq!(
        report.completed[0].trace.stages,
        vec![
            Stage::AnalyzeFile,
            Stage::Generate,
            Stage::Critique,
            Stage::HumanReview,
            Stage::Send,
            Stage::ReceiveFeedback,
            Stage::ClassifyFeedback,
            Stage::Persist,
        ]
    );
    assert_eq!(generator.generate_calls(), 1);
    assert_eq!(generator.calls()[1].guidance_source, "initial_review");

    assert_eq!(
        project.read("output/A.cob").expect("output"),
        "000100 IDENTIFICATION DIVISION.\n000150* Entry point.\n"
    );
    assert_eq!(
        project.read("output/A_justification.md").expect("justification"),
        "Comments are accurate.\n"
    );
    assert_eq!(
        project.read("output/A_logs.txt").expect("logs"),
        "INFO: run completed\n"
    );
    assert!(output_dir.join(".reviser/A.cob.trace.json").is_file());
    assert_eq!(project.read("input/A.cob").expect("source"), SOURCE_A);
}

/// Queue `[B.cob]`: critique grades bad twice then good; the reviewer rejects,
/// then reconsiders and accepts at the same prompt. Three generations happen
/// before the file is sent.
#[test]
fn reconsidered_rejection_sends_after_three_generations() {
    let project = TempProject::new().expect("project");
    let source_path = project.write("input/B.cob", SOURCE_B).expect("write");
    project
        .write("input/copy/CUSTREC.cpy", "01 CUST-ID PIC 9(6).\n")
        .expect("write copybook");
    let input_dir = project.root().join("input");
    let output_dir = project.root().join("output");
    colored::control::set_override(false);

    let sources = FsSourceRepository::new(input_dir.join("copy"), "cob");
    let mut generator = ScriptedGenerator::default();
    generator.push_critique(bad("Sequence numbers were dropped."));
    generator.push_critique(bad("Termination changed to GOBACK."));
    generator.push_critique(Review::new("Ready.", Grade::Good));
    let input = LineInput::new(Cursor::new(
        b"no\nrename WS-TMP\nyes\nINFO: run completed\nEND\n".to_vec(),
    ));
    let mut human = TerminalHumanGate::new(input.clone(), Vec::new(), 100);
    let mut channel = TerminalFeedbackChannel::new(input, Vec::new(), project.root().join("outbox"));
    let mut classifier = KeywordClassifier;
    let mut sink = FsPersistenceSink::new(&input_dir, &output_dir);

    let mut stages = Vec::new();
    let mut engine = WorkflowEngine::new(
        Collaborators {
            sources: &sources,
            generator: &mut generator,
            human: &mut human,
            channel: &mut channel,
            classifier: &mut classifier,
            sink: &mut sink,
        },
        EngineLimits::default(),
        [source_path],
    );
    let report = engine
        .run_observed(|event| stages.push(event.from))
        .expect("run");

    assert_eq!(report.outcome, RunOutcome::Done);
    let before_send = stages
        .iter()
        .take_while(|stage| **stage != Stage::Send)
        .filter(|stage| **stage == Stage::Generate)
        .count();
    assert_eq!(before_send, 3);
    assert_eq!(generator.generate_calls(), 3);

    let calls = generator.calls();
    assert_eq!(calls[0].dependencies, vec!["CUSTREC".to_string()]);
    let third = calls
        .iter()
        .filter(|call| call.stage == Stage::Generate)
        .nth(2)
        .expect("third generation");
    assert_eq!(third.guidance_source, "refinement");
    assert_eq!(third.text, "REVISION 2");
    assert_eq!(
        project.read("outbox/B.cob").expect("delivered"),
        "REVISION 3\n"
    );
    assert_eq!(project.read("output/B.cob").expect("output"), "REVISION 3\n");
}

#[test]
fn bad_bad_good_regenerates_exactly_twice_before_human_review() {
    let mut h = Harness::new(MemorySources::default().with_source("input/C.cob", SOURCE_A));
    h.generator.push_critique(bad("one"));
    h.generator.push_critique(bad("two"));
    h.generator.push_critique(Review::new("good", Grade::Good));
    h.human.push(accept());
    h.channel.push_feedback("INFO: run completed");

    let (report, seen) = h.run(&["input/C.cob"]);

    assert_eq!(report.outcome, RunOutcome::Done);
    let regenerations = seen
        .iter()
        .take_while(|s| s.to != Stage::HumanReview)
        .filter(|s| s.from == Stage::Critique && s.to == Stage::Generate)
        .count();
    assert_eq!(regenerations, 2);
    assert!(
        seen.iter()
            .filter(|s| s.from != Stage::Persist)
            .all(|s| s.source_text == SOURCE_A)
    );
    assert_eq!(h.generator.calls()[5].text, "REVISION 2");
}

#[test]
fn human_rejection_regenerates_with_reviewer_feedback() {
    let mut h = Harness::new(MemorySources::default().with_source("input/D.cob", SOURCE_A));
    h.human
        .push(HumanInput::Verdict(HumanVerdict::reject("keep the banner comment")));
    h.human.push(accept());
    h.channel.push_feedback("INFO: run completed");

    let (report, seen) = h.run(&["input/D.cob"]);

    assert_eq!(report.outcome, RunOutcome::Done);
    let generates: Vec<_> = h
        .generator
        .calls()
        .iter()
        .filter(|call| call.stage == Stage::Generate)
        .collect();
    assert_eq!(generates.len(), 2);
    assert_eq!(generates[1].guidance_source, "reviewer_feedback");
    assert_eq!(generates[1].text, "REVISION 1");

    let rejected = seen
        .iter()
        .find(|s| s.from == Stage::HumanReview && s.to == Stage::Generate)
        .expect("rejection transition");
    assert_eq!(rejected.reviewer_feedback.as_deref(), Some("keep the banner comment"));
    let regenerated = seen
        .iter()
        .filter(|s| s.from == Stage::Generate)
        .nth(1)
        .expect("second generation");
    assert_eq!(regenerated.reviewer_feedback, None);
}

#[test]
fn compile_error_loops_back_with_external_feedback() {
    let mut h = Harness::new(MemorySources::default().with_source("input/E.cob", SOURCE_A));
    h.human.push(accept());
    h.human.push(accept());
    h.channel.push_feedback("E.cob:12: error: SYNTAX ERROR near 'MOVE'");
    h.channel.push_feedback("INFO: run completed");
    h.classifier.push(FeedbackKind::CompileError);
    h.classifier.push(FeedbackKind::BenignLog);

    let (report, seen) = h.run(&["input/E.cob"]);

    assert_eq!(report.outcome, RunOutcome::Done);
    let generates: Vec<_> = h
        .generator
        .calls()
        .iter()
        .filter(|call| call.stage == Stage::Generate)
        .collect();
    assert_eq!(generates.len(), 2);
    assert_eq!(generates[1].guidance_source, "external_feedback");

    let after_fix = seen
        .iter()
        .filter(|s| s.from == Stage::Generate)
        .nth(1)
        .expect("fix generation");
    assert_eq!(after_fix.external_feedback, None);

    let saved = &h.sink.saved()[0];
    assert_eq!(saved.feedback_text, "INFO: run completed");
    assert_eq!(saved.generated_text, "REVISION 2");
    assert_eq!(h.channel.delivered().len(), 2);
    assert_eq!(report.completed[0].trace.feedback_rounds, 1);
}

#[test]
fn queue_shrinks_by_one_per_persisted_file() {
    let sources = MemorySources::default()
        .with_source("input/F.cob", SOURCE_A)
        .with_source("input/G.cob", SOURCE_B)
        .with_dependency("CUSTREC", "01 CUST-ID PIC 9(6).");
    let mut h = Harness::new(sources);
    h.human.push(accept());
    h.human.push(accept());
    h.channel.push_feedback("INFO: ok");
    h.channel.push_feedback("INFO: ok");

    let (report, seen) = h.run(&["input/F.cob", "input/G.cob"]);

    assert_eq!(report.outcome, RunOutcome::Done);
    let persists: Vec<_> = seen.iter().filter(|s| s.from == Stage::Persist).collect();
    assert_eq!(persists.len(), 2);
    assert_eq!(persists[0].to, Stage::AnalyzeFile);
    assert_eq!(persists[0].pending, 1);
    assert!(persists[0].file_state_clear);
    assert_eq!(persists[1].to, Stage::Done);
    assert_eq!(persists[1].pending, 0);

    let saved: Vec<_> = h
        .sink
        .saved()
        .iter()
        .map(|s| s.source_path.clone())
        .collect();
    assert_eq!(
        saved,
        vec![PathBuf::from("input/F.cob"), PathBuf::from("input/G.cob")]
    );
    let analyze_g = h
        .generator
        .calls()
        .iter()
        .filter(|call| call.stage == Stage::AnalyzeFile)
        .nth(1)
        .expect("second analyze");
    assert_eq!(analyze_g.filename, "G.cob");
    assert_eq!(analyze_g.dependencies, vec!["CUSTREC".to_string()]);
}

#[test]
fn missing_dependency_is_skipped() {
    let mut h = Harness::new(MemorySources::default().with_source("input/B.cob", SOURCE_B));
    h.human.push(accept());
    h.channel.push_feedback("INFO: ok");

    let (report, _) = h.run(&["input/B.cob"]);

    assert_eq!(report.outcome, RunOutcome::Done);
    assert!(h.generator.calls()[0].dependencies.is_empty());
}

#[test]
fn unreadable_source_aborts_without_model_calls() {
    let mut h = Harness::new(MemorySources::default());

    let (report, _) = h.run(&["input/GONE.cob"]);

    assert!(matches!(
        report.outcome,
        RunOutcome::Aborted(AbortReason::SourceUnreadable { .. })
    ));
    assert!(h.generator.calls().is_empty());
    assert!(h.sink.saved().is_empty());
}

#[test]
fn quitting_at_the_human_gate_aborts_without_artifacts() {
    let mut h = Harness::new(MemorySources::default().with_source("input/A.cob", SOURCE_A));
    h.human.push(HumanInput::Quit);

    let (report, _) = h.run(&["input/A.cob"]);

    assert_eq!(report.outcome, RunOutcome::Aborted(AbortReason::UserRequested));
    assert!(h.sink.saved().is_empty());
    assert!(h.channel.delivered().is_empty());
    let trace = report.in_flight.expect("in-flight trace");
    assert_eq!(trace.stages.last(), Some(&Stage::HumanReview));
}
