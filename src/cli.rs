//! CLI argument parsing for the screening stages.
//!
//! Each subcommand maps onto one workflow entry point; policy lives in the
//! stage modules, not here.
use crate::dock::Engine;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "vscreen",
    version,
    about = "Resumable virtual-screening stages: ligand preparation and docking",
    after_help = "Commands:\n  prepare --project <dir>            Prepare ligands (SDF -> PDBQT via Meeko)\n  dock --project <dir> --engine cpu  Dock prepared ligands against the receptor\n  pipeline --project <dir> --resume  Run stages in order with checkpoints\n  status --project <dir>             Summarize manifest progress and next action\n\nExamples:\n  vscreen prepare --project /data/screen\n  vscreen dock --project /data/screen --engine gpu --docking-config bin/VinaGPUConfig.txt\n  vscreen pipeline --project /data/screen --resume --skip 1\n  vscreen status --project /data/screen --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Prepare(PrepareArgs),
    Dock(DockArgs),
    Pipeline(PipelineArgs),
    Status(StatusArgs),
}

/// Flags shared by every stage-running command.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Project root containing 3D_Structures, prepared_ligands, results, state and config
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Extra YAML config layer applied after config/run.yml and config/machine.yml (repeatable)
    #[arg(long = "config", value_name = "FILE")]
    pub configs: Vec<PathBuf>,

    /// Re-run every item, ignoring existing valid outputs
    #[arg(long)]
    pub rerun_all: bool,

    /// Emit debug logging
    #[arg(long)]
    pub verbose: bool,
}

/// Docking engine selection shared by `dock` and `pipeline`.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Docking engine
    #[arg(long, value_enum, default_value_t = Engine::Cpu)]
    pub engine: Engine,

    /// Key=value docking config to use instead of the one beside the binary
    #[arg(long, value_name = "FILE")]
    pub docking_config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Prepare ligand PDBQT files from 3D SDF structures")]
pub struct PrepareArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Dock prepared ligands against the configured receptor")]
pub struct DockArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Run the built-in stages in order with checkpoints")]
pub struct PipelineArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Skip stages that already have a checkpoint
    #[arg(long, conflicts_with = "fresh")]
    pub resume: bool,

    /// Delete checkpoints of selected stages before running
    #[arg(long, conflicts_with = "resume")]
    pub fresh: bool,

    /// Run only these stage indices (comma-separated, 1-based)
    #[arg(long, value_name = "LIST")]
    pub only: Option<String>,

    /// Skip these stage indices (comma-separated, 1-based)
    #[arg(long, value_name = "LIST")]
    pub skip: Option<String>,

    /// Print the numbered stage list and exit
    #[arg(long)]
    pub list: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize manifest progress and next action")]
pub struct StatusArgs {
    /// Project root containing state/manifest.csv
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn pipeline_flags_parse() {
        let args = RootArgs::try_parse_from([
            "vscreen",
            "pipeline",
            "--project",
            "/data/screen",
            "--engine",
            "gpu",
            "--resume",
            "--only",
            "2",
            "--config",
            "a.yml",
            "--config",
            "b.yml",
        ])
        .expect("parse");
        let Command::Pipeline(pipeline) = args.command else {
            panic!("expected pipeline");
        };
        assert_eq!(pipeline.engine.engine, Engine::Gpu);
        assert!(pipeline.resume);
        assert_eq!(pipeline.only.as_deref(), Some("2"));
        assert_eq!(
            pipeline.common.configs,
            [PathBuf::from("a.yml"), PathBuf::from("b.yml")]
        );
    }

    #[test]
    fn resume_conflicts_with_fresh() {
        let err = RootArgs::try_parse_from(["vscreen", "pipeline", "--resume", "--fresh"])
            .expect_err("must conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
