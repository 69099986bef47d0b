//! Candidate command lines for one tool invocation.
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

/// One concrete way to run a tool: program plus fully expanded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCandidate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandCandidate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a configured command string (`"python -m meeko.cli"`) and append `args`.
    pub fn from_configured(command: &str, args: Vec<String>) -> Result<Self> {
        let mut words =
            shell_words::split(command).with_context(|| format!("parse command: {command}"))?;
        if words.is_empty() {
            return Err(anyhow!("configured command is empty"));
        }
        let program = words.remove(0);
        words.extend(args);
        Ok(Self {
            program,
            args: words,
        })
    }

    /// Shell-quoted command line for logs.
    pub fn command_line(&self) -> String {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.as_str());
        argv.extend(self.args.iter().map(String::as_str));
        shell_words::join(argv)
    }

    /// Locate the program on disk; `None` means this candidate is skippable.
    pub fn resolve_program(&self, cwd: &Path) -> Option<PathBuf> {
        which::which_in(&self.program, std::env::var_os("PATH"), cwd).ok()
    }
}

/// Render a path as a command argument.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Drop later duplicates while keeping priority order.
pub fn dedup_candidates(candidates: Vec<CommandCandidate>) -> Vec<CommandCandidate> {
    let mut unique: Vec<CommandCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_command_is_split_and_extended() {
        let candidate = CommandCandidate::from_configured(
            "python -m meeko.cli_prepare_ligand",
            vec!["-i".into(), "in put.sdf".into()],
        )
        .expect("parse");
        assert_eq!(candidate.program, "python");
        assert_eq!(
            candidate.args,
            ["-m", "meeko.cli_prepare_ligand", "-i", "in put.sdf"]
        );
        assert_eq!(
            candidate.command_line(),
            "python -m meeko.cli_prepare_ligand -i 'in put.sdf'"
        );
    }

    #[test]
    fn empty_or_unbalanced_commands_are_rejected() {
        assert!(CommandCandidate::from_configured("   ", Vec::new()).is_err());
        assert!(CommandCandidate::from_configured("mk 'unterminated", Vec::new()).is_err());
    }

    #[test]
    fn duplicates_are_removed_in_order() {
        let a = CommandCandidate::new("a", vec!["x".into()]);
        let b = CommandCandidate::new("b", Vec::new());
        let unique = dedup_candidates(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(unique, vec![a, b]);
    }

    #[test]
    fn missing_program_does_not_resolve() {
        let dir = tempfile::tempdir().expect("tempdir");
        let candidate = CommandCandidate::new("definitely-not-installed-vscreen-tool", Vec::new());
        assert!(candidate.resolve_program(dir.path()).is_none());
    }
}
