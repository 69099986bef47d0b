//! Locating the docking executable and its key=value config file.
use super::Engine;
use crate::config::ToolSettings;
use crate::invoke::CommandCandidate;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Resolved docking executable plus any arguments baked into the configured command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockBinary {
    pub program: PathBuf,
    pub prefix_args: Vec<String>,
}

impl DockBinary {
    fn bare(program: PathBuf) -> Self {
        Self {
            program,
            prefix_args: Vec::new(),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.program.parent()
    }
}

/// Configured command, then well-known names in the project root, then `PATH`.
pub fn resolve_binary(engine: Engine, tools: &ToolSettings, root: &Path) -> Result<DockBinary> {
    let configured = match engine {
        Engine::Cpu => tools.vina_cmd.as_deref(),
        Engine::Gpu => tools.vina_gpu_cmd.as_deref(),
    };
    if let Some(command) = configured {
        match CommandCandidate::from_configured(command, Vec::new()) {
            Ok(candidate) => {
                if let Some(program) = candidate.resolve_program(root) {
                    return Ok(DockBinary {
                        program,
                        prefix_args: candidate.args,
                    });
                }
                tracing::warn!(command, "configured docking command not found; searching defaults");
            }
            Err(err) => tracing::warn!(error = %err, "configured docking command unusable"),
        }
    }
    let names = engine.binary_names();
    for name in &names {
        let candidate = root.join(name);
        if candidate.is_file() {
            if let Err(err) = make_executable(&candidate) {
                tracing::debug!(path = %candidate.display(), error = %err, "chmod skipped");
            }
            return Ok(DockBinary::bare(candidate));
        }
    }
    for name in &names {
        if let Ok(found) = which::which(name) {
            return Ok(DockBinary::bare(found));
        }
    }
    Err(anyhow!(
        "no {} docking binary found: set tools.{}, place one of [{}] in {}, or put it on PATH",
        engine.label(),
        engine.config_key(),
        names.join(", "),
        root.display()
    ))
}

/// Key=value config for the run: an explicit override, else the first
/// well-known file beside the binary.
pub fn locate_docking_config(
    engine: Engine,
    binary: &DockBinary,
    explicit: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let dir = binary.dir()?;
    engine
        .config_file_names()
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & 0o111 == 0o111 {
        return Ok(());
    }
    permissions.set_mode(mode | 0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
