//! Iterative model-driven revision of legacy source files.
//!
//! `reviser init` scaffolds a project, `reviser scan` lists candidate files,
//! and `reviser run` drives each candidate through the revision workflow.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;

use reviser::agents::generator::ModelGenerator;
use reviser::core::stage::AbortReason;
use reviser::engine::{Collaborators, EngineLimits, RunOutcome, WorkflowEngine};
use reviser::exit_codes;
use reviser::io::config::{CONFIG_FILE, ClassifierMode, FeedbackMode, ReviserConfig, load_config};
use reviser::io::feedback::{
    CommandFeedbackChannel, ExternalFeedbackChannel, FeedbackClassifier, KeywordClassifier,
    ModelClassifier, TerminalFeedbackChannel,
};
use reviser::io::human::TerminalHumanGate;
use reviser::io::init::{InitOptions, init_project};
use reviser::io::model::CommandModel;
use reviser::io::persist::FsPersistenceSink;
use reviser::io::scan::{FsSourceRepository, enumerate_candidates};
use reviser::io::terminal::LineInput;
use reviser::logging;

#[derive(Parser)]
#[command(
    name = "reviser",
    version,
    about = "Iterative model-driven revision of legacy source files"
)]
struct Cli {
    /// Config file (defaults to `reviser.toml` in the working directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config and create the input/output directories.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// List candidate files, one per line.
    Scan,
    /// Revise every candidate, or only the named files.
    Run {
        /// Candidate to revise (file name or path below the input directory).
        #[arg(long = "file", value_name = "NAME")]
        files: Vec<String>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve working directory")?;
    let config_path = cli.config.unwrap_or_else(|| root.join(CONFIG_FILE));
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Scan => cmd_scan(&root, &config_path),
        Command::Run { files } => cmd_run(&root, &config_path, &files),
    }
}

fn load_resolved(root: &Path, config_path: &Path) -> Result<ReviserConfig> {
    let cfg = load_config(config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    Ok(cfg.resolved(root))
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_project(root, &InitOptions { force })?;
    println!("{} {}", "created".green(), paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_scan(root: &Path, config_path: &Path) -> Result<i32> {
    let cfg = load_resolved(root, config_path)?;
    let files = enumerate_candidates(&cfg.input_dir, &cfg.extension)?;
    if files.is_empty() {
        eprintln!(
            "{} no .{} files under {}",
            "warning:".yellow().bold(),
            cfg.extension.trim_start_matches('.'),
            cfg.input_dir.display()
        );
        return Ok(exit_codes::NOTHING_TO_DO);
    }
    for file in &files {
        let shown = file.strip_prefix(root).unwrap_or(file);
        println!("{}", shown.display());
    }
    Ok(exit_codes::OK)
}

/// Pick the requested candidates in the order given; all of them when none are named.
fn select_files(input_dir: &Path, candidates: Vec<PathBuf>, names: &[String]) -> Result<Vec<PathBuf>> {
    if names.is_empty() {
        return Ok(candidates);
    }
    names
        .iter()
        .map(|name| {
            candidates
                .iter()
                .find(|path| {
                    path.file_name().is_some_and(|f| f == name.as_str())
                        || path.strip_prefix(input_dir).is_ok_and(|rel| rel == Path::new(name))
                })
                .cloned()
                .ok_or_else(|| anyhow!("no candidate named {name} under {}", input_dir.display()))
        })
        .collect()
}

fn cmd_run(root: &Path, config_path: &Path, names: &[String]) -> Result<i32> {
    let cfg = load_resolved(root, config_path)?;
    let candidates = enumerate_candidates(&cfg.input_dir, &cfg.extension)?;
    let queue = select_files(&cfg.input_dir, candidates, names)?;

    let sources = FsSourceRepository::new(&cfg.copy_dir, &cfg.extension);
    let model = CommandModel::from_config(&cfg.model);
    let mut generator = ModelGenerator::new(model.clone(), cfg.limits.max_continuation_rounds);
    let input = LineInput::new(io::stdin().lock());
    let mut human = TerminalHumanGate::new(input.clone(), io::stdout(), cfg.limits.diff_max_lines);
    let mut channel: Box<dyn ExternalFeedbackChannel> = match cfg.feedback.mode {
        FeedbackMode::Terminal => Box::new(TerminalFeedbackChannel::new(
            input,
            io::stdout(),
            &cfg.feedback.outbox_dir,
        )),
        FeedbackMode::Command => Box::new(CommandFeedbackChannel::from_config(&cfg.feedback)),
    };
    let mut classifier: Box<dyn FeedbackClassifier> = match cfg.feedback.classifier {
        ClassifierMode::Keyword => Box::new(KeywordClassifier),
        ClassifierMode::Model => Box::new(ModelClassifier::new(model)),
    };
    let mut sink = FsPersistenceSink::new(&cfg.input_dir, &cfg.output_dir);

    let collab = Collaborators {
        sources: &sources,
        generator: &mut generator,
        human: &mut human,
        channel: channel.as_mut(),
        classifier: classifier.as_mut(),
        sink: &mut sink,
    };
    let mut engine = WorkflowEngine::new(collab, EngineLimits::from(&cfg.limits), queue);
    let report = engine.run_observed(|event| {
        eprintln!(
            "{} {} -> {}",
            event.file.bold(),
            event.from.as_str().dimmed(),
            event.to
        );
    })?;

    for file in &report.completed {
        println!(
            "{} {} ({} generations)",
            "saved".green(),
            file.artifacts.output.display(),
            file.trace.generate_calls
        );
    }

    Ok(match report.outcome {
        RunOutcome::Done => exit_codes::OK,
        RunOutcome::Aborted(AbortReason::EmptyQueue) => {
            eprintln!("{} nothing to do", "warning:".yellow().bold());
            exit_codes::NOTHING_TO_DO
        }
        RunOutcome::Aborted(AbortReason::UserRequested) => {
            eprintln!("{} exit requested, stopping", "warning:".yellow().bold());
            exit_codes::ABORTED
        }
        RunOutcome::Aborted(reason) => {
            eprintln!("{} {reason}", "aborted:".red().bold());
            exit_codes::ABORTED
        }
    })
}
