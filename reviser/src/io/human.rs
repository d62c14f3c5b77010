//! Human review gate.
//!
//! The engine shows the reviewer a diff of the original source against the
//! latest revision, then asks for a decision. A rejection must carry feedback
//! for the next generation and is confirmed by a second question, which lets
//! the reviewer change their mind and accept after all.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{debug, info};

use crate::core::diff::{DiffLine, diff_stats, line_diff};
use crate::core::state::HumanDecision;
use crate::io::terminal::LineInput;

/// Decision collected from the reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanVerdict {
    pub decision: HumanDecision,
    /// Demand for the next generation; set only on reject.
    pub feedback_text: Option<String>,
}

impl HumanVerdict {
    pub fn accept() -> Self {
        Self {
            decision: HumanDecision::Accept,
            feedback_text: None,
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            decision: HumanDecision::Reject,
            feedback_text: Some(feedback.into()),
        }
    }
}

/// What the reviewer answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanInput {
    Verdict(HumanVerdict),
    /// The reviewer asked to stop the whole run.
    Quit,
}

pub trait HumanGate {
    fn present_diff(&mut self, filename: &str, old: &str, new: &str) -> Result<()>;
    fn collect_decision(&mut self) -> Result<HumanInput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Quit,
}

fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(Answer::Yes),
        "n" | "no" => Some(Answer::No),
        "q" | "quit" | "exit" => Some(Answer::Quit),
        _ => None,
    }
}

/// Line-oriented gate over any reader/writer pair (stdin/stdout in the binary).
pub struct TerminalHumanGate<R, W> {
    input: LineInput<R>,
    output: W,
    diff_max_lines: usize,
}

impl<R: BufRead, W: Write> TerminalHumanGate<R, W> {
    pub fn new(input: LineInput<R>, output: W, diff_max_lines: usize) -> Self {
        Self {
            input,
            output,
            diff_max_lines,
        }
    }

    fn ask(&mut self, question: &str) -> Result<Option<Answer>> {
        loop {
            write!(self.output, "{} ", question.bold()).context("write prompt")?;
            self.output.flush().context("flush prompt")?;
            let Some(line) = self.input.read_line()? else {
                return Ok(None);
            };
            match parse_answer(&line) {
                Some(answer) => return Ok(Some(answer)),
                None => writeln!(self.output, "{}", "Please enter 'yes', 'no' or 'quit'.".red())
                    .context("write prompt")?,
            }
        }
    }

    fn ask_feedback(&mut self) -> Result<Option<String>> {
        loop {
            write!(self.output, "{} ", "What must change?".bold()).context("write prompt")?;
            self.output.flush().context("flush prompt")?;
            let Some(line) = self.input.read_line()? else {
                return Ok(None);
            };
            let text = line.trim();
            if parse_answer(text) == Some(Answer::Quit) {
                return Ok(None);
            }
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
            writeln!(self.output, "{}", "Feedback is required to reject.".red())
                .context("write prompt")?;
        }
    }
}

impl<R: BufRead, W: Write> HumanGate for TerminalHumanGate<R, W> {
    fn present_diff(&mut self, filename: &str, old: &str, new: &str) -> Result<()> {
        let diff = line_diff(old, new);
        let (added, removed) = diff_stats(&diff);
        writeln!(self.output, "{}", format!("=== HUMAN REVIEW: {filename} ===").cyan().bold())
            .context("write diff")?;
        writeln!(self.output, "{}", format!("--- {filename} (original)").red())
            .context("write diff")?;
        writeln!(self.output, "{}", format!("+++ {filename} (revised)").green())
            .context("write diff")?;
        for line in diff.iter().take(self.diff_max_lines) {
            let rendered = match line {
                DiffLine::Same(text) => format!(" {text}").dimmed(),
                DiffLine::Removed(text) => format!("-{text}").red(),
                DiffLine::Added(text) => format!("+{text}").green(),
            };
            writeln!(self.output, "{rendered}").context("write diff")?;
        }
        if diff.len() > self.diff_max_lines {
            writeln!(
                self.output,
                "{}",
                format!("... {} more diff lines", diff.len() - self.diff_max_lines).yellow()
            )
            .context("write diff")?;
        }
        writeln!(self.output, "{added} added, {removed} removed").context("write diff")?;
        debug!(file = filename, added, removed, "presented diff");
        Ok(())
    }

    fn collect_decision(&mut self) -> Result<HumanInput> {
        match self.ask("Accept changes? (yes/no/quit):")? {
            None | Some(Answer::Quit) => return Ok(HumanInput::Quit),
            Some(Answer::Yes) => {
                writeln!(self.output, "{}", "Changes accepted.".green()).context("write")?;
                return Ok(HumanInput::Verdict(HumanVerdict::accept()));
            }
            Some(Answer::No) => {}
        }

        let Some(feedback) = self.ask_feedback()? else {
            return Ok(HumanInput::Quit);
        };

        match self.ask("Reconsider and accept the changes after all? (yes/no):")? {
            None | Some(Answer::Quit) => Ok(HumanInput::Quit),
            Some(Answer::Yes) => {
                info!("reviewer reconsidered and accepted");
                writeln!(self.output, "{}", "Changes accepted.".green()).context("write")?;
                Ok(HumanInput::Verdict(HumanVerdict::accept()))
            }
            Some(Answer::No) => {
                writeln!(self.output, "{}", "Keeping the rejection.".yellow()).context("write")?;
                Ok(HumanInput::Verdict(HumanVerdict::reject(feedback)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn gate(input: &str) -> TerminalHumanGate<Cursor<Vec<u8>>, Vec<u8>> {
        colored::control::set_override(false);
        let input = LineInput::new(Cursor::new(input.as_bytes().to_vec()));
        TerminalHumanGate::new(input, Vec::new(), 50)
    }

    #[test]
    fn yes_accepts_without_feedback() {
        let mut gate = gate("yes\n");
        let input = gate.collect_decision().expect("decision");
        assert_eq!(input, HumanInput::Verdict(HumanVerdict::accept()));
    }

    #[test]
    fn reject_requires_feedback_then_confirms() {
        let mut gate = gate("maybe\nno\n\nkeep line numbers\nno\n");
        let input = gate.collect_decision().expect("decision");
        assert_eq!(
            input,
            HumanInput::Verdict(HumanVerdict::reject("keep line numbers"))
        );
        let transcript = String::from_utf8(gate.output).expect("utf8");
        assert!(transcript.contains("Please enter 'yes', 'no' or 'quit'."));
        assert!(transcript.contains("Feedback is required to reject."));
    }

    #[test]
    fn reconsider_overrides_reject() {
        let mut gate = gate("no\nadd comments\nyes\n");
        let input = gate.collect_decision().expect("decision");
        assert_eq!(input, HumanInput::Verdict(HumanVerdict::accept()));
    }

    #[test]
    fn eof_and_quit_abort() {
        assert_eq!(gate("").collect_decision().expect("eof"), HumanInput::Quit);
        assert_eq!(gate("quit\n").collect_decision().expect("quit"), HumanInput::Quit);
        assert_eq!(
            gate("no\nq\n").collect_decision().expect("quit"),
            HumanInput::Quit
        );
    }

    #[test]
    fn diff_is_capped() {
        let mut gate = gate("");
        gate.diff_max_lines = 2;
        gate.present_diff("A.cob", "a\nb\nc\n", "a\nB\nc\n")
            .expect("diff");
        let transcript = String::from_utf8(gate.output).expect("utf8");
        assert!(transcript.contains("--- A.cob (original)"));
        assert!(transcript.contains(" a\n-b\n"));
        assert!(transcript.contains("... 2 more diff lines"));
        assert!(transcript.contains("1 added, 1 removed"));
    }
}
