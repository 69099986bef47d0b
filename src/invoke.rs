//! Run an external tool against one work item and publish its output.
//!
//! Candidates are tried in priority order. Each one writes to the item's
//! temporary path; the first candidate that exits cleanly with a valid output
//! has it renamed into place. The final path therefore holds either nothing or
//! a validated file, never a partial write.
mod command;

pub use command::{dedup_candidates, path_arg, CommandCandidate};

use crate::paths::temp_output_path;
use crate::text::{bounded_reason, last_meaningful_line};
use crate::util::remove_if_exists;
use crate::validate::OutputValidator;
use std::fs;
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};
use std::time::Instant;
use tempfile::TempPath;

/// Layout of the per-item log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `>>> cmd` header followed by lower-case `[stdout]`/`[stderr]` blocks.
    Transcript,
    /// Upper-case `[CMD]`/`[STDOUT]`/`[STDERR]` sections after an optional preamble.
    Sectioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Published,
    ToolFailed,
    /// The tool reported success but its output did not validate.
    InvalidOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub kind: OutcomeKind,
    pub reason: String,
    pub best_score: Option<f64>,
    /// Resolved program of the candidate that produced the output.
    pub program: Option<String>,
    pub attempts: usize,
}

impl ToolOutcome {
    pub fn published(&self) -> bool {
        self.kind == OutcomeKind::Published
    }
}

/// Everything needed to run one item through one tool.
pub struct Invocation<'a> {
    pub candidates: &'a [CommandCandidate],
    pub output_path: &'a Path,
    pub log_path: &'a Path,
    pub validator: &'a dyn OutputValidator,
    pub log_format: LogFormat,
    /// Written at the top of every attempt's log (for example the search box).
    pub log_preamble: &'a str,
    /// Reason reported when every candidate failed; defaults to the last failure.
    pub exhausted_reason: Option<&'a str>,
    /// Working directory for the tool and for relative program lookups.
    pub cwd: &'a Path,
}

struct Attempt {
    kind: OutcomeKind,
    reason: String,
}

impl Invocation<'_> {
    /// Try candidates until one publishes. Never returns an error: every
    /// failure is folded into the outcome.
    ///
    /// A candidate that cannot be resolved leaves the outcome and the log of an
    /// earlier attempt untouched; "command not found" is only reported when no
    /// candidate ran at all.
    pub fn run(&self) -> ToolOutcome {
        self.clear_stale();
        let tmp = TempPath::from_path(temp_output_path(self.output_path));
        let mut last: Option<Attempt> = None;
        let mut not_found: Option<&str> = None;
        let mut attempts = 0;
        for candidate in self.candidates {
            attempts += 1;
            let Some(program) = candidate.resolve_program(self.cwd) else {
                tracing::debug!(program = %candidate.program, "candidate not found; skipped");
                if last.is_none() && not_found.is_none() {
                    self.write_log(candidate, &format!("command not found: {}", candidate.program));
                    not_found = Some(candidate.program.as_str());
                }
                continue;
            };
            let started = Instant::now();
            let output = match self.spawn(&program, candidate) {
                Ok(output) => output,
                Err(err) => {
                    tracing::warn!(program = %program.display(), error = %err, "spawn failed");
                    self.write_log(candidate, &format!("spawn failed: {err}"));
                    last = Some(Attempt {
                        kind: OutcomeKind::ToolFailed,
                        reason: format!("spawn failed: {err}"),
                    });
                    continue;
                }
            };
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            self.write_transcript(candidate, &stdout, &stderr, output.status);
            tracing::debug!(
                command = %candidate.command_line(),
                rc = %rc_label(output.status),
                elapsed_ms = started.elapsed().as_millis(),
                "tool finished"
            );
            if !output.status.success() {
                let _ = remove_if_exists(&tmp);
                let reason = last_meaningful_line(&stderr, &stdout).unwrap_or_else(|| {
                    format!("{} exited with {}", candidate.program, rc_label(output.status))
                });
                last = Some(Attempt {
                    kind: OutcomeKind::ToolFailed,
                    reason,
                });
                continue;
            }
            let validation = self.validator.validate(&tmp);
            if !validation.valid {
                let _ = remove_if_exists(&tmp);
                last = Some(Attempt {
                    kind: OutcomeKind::InvalidOutput,
                    reason: "output produced but invalid".to_string(),
                });
                continue;
            }
            if let Err(err) = tmp.persist(self.output_path) {
                return ToolOutcome {
                    kind: OutcomeKind::ToolFailed,
                    reason: bounded_reason(&format!("publish failed: {}", err.error)),
                    best_score: None,
                    program: None,
                    attempts,
                };
            }
            return ToolOutcome {
                kind: OutcomeKind::Published,
                reason: "OK".to_string(),
                best_score: validation.best_score,
                program: Some(program.display().to_string()),
                attempts,
            };
        }
        let last = last.unwrap_or_else(|| Attempt {
            kind: OutcomeKind::ToolFailed,
            reason: match not_found {
                Some(program) => format!("command not found: {program}"),
                None => "no command candidates".to_string(),
            },
        });
        let reason = match (self.exhausted_reason, last.kind) {
            (_, OutcomeKind::InvalidOutput) => last.reason,
            (Some(reason), _) => reason.to_string(),
            (None, _) => last.reason,
        };
        ToolOutcome {
            kind: last.kind,
            reason: bounded_reason(&reason),
            best_score: None,
            program: None,
            attempts,
        }
    }

    fn clear_stale(&self) {
        for path in [
            self.output_path.to_path_buf(),
            temp_output_path(self.output_path),
            self.log_path.to_path_buf(),
        ] {
            if let Err(err) = remove_if_exists(&path) {
                tracing::debug!(path = %path.display(), error = %err, "stale file not removed");
            }
        }
        if let Some(parent) = self.output_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Some(parent) = self.log_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
    }

    fn spawn(&self, program: &Path, candidate: &CommandCandidate) -> std::io::Result<Output> {
        let mut command = Command::new(program);
        command
            .args(&candidate.args)
            .current_dir(self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Keep terminal SIGINT away from the tool; the run loop decides when to stop.
            command.process_group(0);
        }
        command.output()
    }

    fn write_transcript(
        &self,
        candidate: &CommandCandidate,
        stdout: &str,
        stderr: &str,
        status: ExitStatus,
    ) {
        let rc = rc_label(status);
        let cmd = candidate.command_line();
        let body = match self.log_format {
            LogFormat::Transcript => format!(
                "{}>>> {cmd}\n\n[stdout]\n{stdout}\n\n[stderr]\n{stderr}\nRC={rc}\n",
                self.log_preamble
            ),
            LogFormat::Sectioned => format!(
                "{}[CMD]\n{cmd}\n\n[STDOUT]\n{stdout}\n\n[STDERR]\n{stderr}\nRC={rc}\n",
                self.log_preamble
            ),
        };
        self.overwrite_log(&body);
    }

    fn write_log(&self, candidate: &CommandCandidate, error: &str) {
        let cmd = candidate.command_line();
        let body = match self.log_format {
            LogFormat::Transcript => format!("{}>>> {cmd}\n\n[error]\n{error}\n", self.log_preamble),
            LogFormat::Sectioned => {
                format!("{}[CMD]\n{cmd}\n\n[ERROR]\n{error}\n", self.log_preamble)
            }
        };
        self.overwrite_log(&body);
    }

    fn overwrite_log(&self, body: &str) {
        if let Err(err) = fs::write(self.log_path, body) {
            tracing::warn!(path = %self.log_path.display(), error = %err, "tool log not written");
        }
    }
}

fn rc_label(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

#[cfg(all(test, unix))]
#[path = "invoke_tests.rs"]
mod tests;
