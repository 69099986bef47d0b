//! Stage sequencer with on-disk checkpoints.
//!
//! Stages run in order. A stage that finishes writes
//! `_pipeline_checkpoints/NN.done`; `--resume` skips stages that have one and
//! `--fresh` clears them first. A fatal stage error ends the sequence.
use crate::run::RunReport;
use crate::util::{now_utc, remove_if_exists};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Prepare,
    Dock,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 2] = [PipelineStage::Prepare, PipelineStage::Dock];

    /// 1-based position used by `--only`, `--skip` and checkpoint names.
    pub fn index(&self) -> usize {
        match self {
            PipelineStage::Prepare => 1,
            PipelineStage::Dock => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Prepare => "prepare",
            PipelineStage::Dock => "dock",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Prepare => "ligand preparation (SDF -> PDBQT via Meeko)",
            PipelineStage::Dock => "docking (AutoDock Vina / Vina-GPU)",
        }
    }
}

/// Runs one built-in stage to completion.
pub trait StageRunner {
    fn run_stage(&mut self, stage: PipelineStage) -> Result<RunReport>;
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub resume: bool,
    pub fresh: bool,
    pub only: Option<BTreeSet<usize>>,
    pub skip: BTreeSet<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDisposition {
    Ran,
    NotSelected,
    Skipped,
    AlreadyComplete,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub stages: Vec<(PipelineStage, StageDisposition)>,
    pub reports: Vec<RunReport>,
    pub stopped: bool,
}

#[derive(Debug, Clone)]
pub struct Checkpoints {
    dir: PathBuf,
}

impl Checkpoints {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self, stage: PipelineStage) -> PathBuf {
        self.dir.join(format!("{:02}.done", stage.index()))
    }

    pub fn is_done(&self, stage: PipelineStage) -> bool {
        self.path(stage).is_file()
    }

    pub fn mark_done(&self, stage: PipelineStage) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))?;
        let path = self.path(stage);
        fs::write(&path, now_utc()).with_context(|| format!("write {}", path.display()))
    }

    pub fn clear(&self, stage: PipelineStage) {
        let path = self.path(stage);
        if let Err(err) = remove_if_exists(&path) {
            tracing::warn!(path = %path.display(), error = %err, "checkpoint not removed");
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Parse `"1,2"` into validated 1-based stage indices.
pub fn parse_indices(text: &str) -> Result<BTreeSet<usize>> {
    let mut indices = BTreeSet::new();
    for part in text.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let index: usize = part
            .parse()
            .with_context(|| format!("invalid stage index {part:?}"))?;
        if !(1..=PipelineStage::ALL.len()).contains(&index) {
            return Err(anyhow!(
                "stage index {index} out of range (1..={})",
                PipelineStage::ALL.len()
            ));
        }
        indices.insert(index);
    }
    Ok(indices)
}

/// Numbered stage list for `--list`.
pub fn render_stage_list() -> String {
    PipelineStage::ALL
        .iter()
        .map(|stage| format!("{}. {} - {}\n", stage.index(), stage.name(), stage.description()))
        .collect()
}

pub fn run_pipeline(
    checkpoints: &Checkpoints,
    options: &PipelineOptions,
    runner: &mut dyn StageRunner,
) -> Result<PipelineReport> {
    let mut report = PipelineReport::default();
    for stage in PipelineStage::ALL {
        let index = stage.index();
        if options.only.as_ref().is_some_and(|only| !only.contains(&index)) {
            report.stages.push((stage, StageDisposition::NotSelected));
            continue;
        }
        if options.skip.contains(&index) {
            tracing::info!(stage = stage.name(), index, "stage skipped by request");
            report.stages.push((stage, StageDisposition::Skipped));
            continue;
        }
        if options.fresh {
            checkpoints.clear(stage);
        } else if options.resume && checkpoints.is_done(stage) {
            tracing::info!(stage = stage.name(), index, "stage already complete; resuming past it");
            report.stages.push((stage, StageDisposition::AlreadyComplete));
            continue;
        }
        tracing::info!(stage = stage.name(), index, "stage starting");
        let stage_report = runner
            .run_stage(stage)
            .with_context(|| format!("stage {index} ({}) failed", stage.name()))?;
        report.stages.push((stage, StageDisposition::Ran));
        let stopped = stage_report.stopped;
        report.reports.push(stage_report);
        if stopped {
            tracing::info!(stage = stage.name(), "stopped by request; checkpoint not written");
            report.stopped = true;
            break;
        }
        checkpoints.mark_done(stage)?;
    }
    Ok(report)
}
