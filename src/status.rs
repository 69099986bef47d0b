//! Read-only progress summary computed from the manifest.
//!
//! The summary is deterministic for a given manifest and tells the caller
//! which command to run next:
//!
//! ```text
//! prepare: done 120, failed 3, pending 0
//! dock:    done 97, failed 1, pending 25
//! next: vscreen dock
//! ```
use crate::manifest::{Manifest, ManifestRecord, StageStatus};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub done: usize,
    pub failed: usize,
    pub pending: usize,
}

impl StageCounts {
    fn add(&mut self, status: StageStatus) {
        match status {
            StageStatus::Done => self.done += 1,
            StageStatus::Failed => self.failed += 1,
            StageStatus::Pending => self.pending += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestHit {
    pub id: String,
    pub vina_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextAction {
    Command { command: String, reason: String },
    None { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub manifest: String,
    pub records: usize,
    pub prepare: StageCounts,
    pub dock: StageCounts,
    pub best: Option<BestHit>,
    pub next_action: NextAction,
}

/// Summarize the manifest. Dock counts only cover items with a prepared ligand.
pub fn build_status_summary(manifest_path: &Path, manifest: &Manifest) -> StatusSummary {
    let mut prepare = StageCounts::default();
    let mut dock = StageCounts::default();
    let mut best: Option<BestHit> = None;
    for record in manifest.values() {
        prepare.add(record.pdbqt_status);
        if record.pdbqt_status == StageStatus::Done {
            dock.add(record.vina_status);
        }
        if let Some(score) = scored(record) {
            let better = match &best {
                Some(hit) => score < hit.vina_score,
                None => true,
            };
            if better {
                best = Some(BestHit {
                    id: record.id.clone(),
                    vina_score: score,
                });
            }
        }
    }
    let next_action = next_action(manifest.len(), &prepare, &dock);
    StatusSummary {
        manifest: manifest_path.display().to_string(),
        records: manifest.len(),
        prepare,
        dock,
        best,
        next_action,
    }
}

fn scored(record: &ManifestRecord) -> Option<f64> {
    if record.vina_status != StageStatus::Done {
        return None;
    }
    record.score()
}

fn next_action(records: usize, prepare: &StageCounts, dock: &StageCounts) -> NextAction {
    if records == 0 {
        return NextAction::Command {
            command: "vscreen prepare".to_string(),
            reason: "manifest is empty".to_string(),
        };
    }
    if prepare.pending > 0 {
        return NextAction::Command {
            command: "vscreen prepare".to_string(),
            reason: format!("{} ligands not prepared", prepare.pending),
        };
    }
    if dock.pending > 0 {
        return NextAction::Command {
            command: "vscreen dock".to_string(),
            reason: format!("{} prepared ligands not docked", dock.pending),
        };
    }
    if prepare.failed + dock.failed > 0 {
        return NextAction::None {
            reason: format!(
                "{} preparation and {} docking failures need attention (see item logs)",
                prepare.failed, dock.failed
            ),
        };
    }
    NextAction::None {
        reason: "all items docked".to_string(),
    }
}

pub fn print_status(summary: &StatusSummary) {
    println!("manifest: {} ({} records)", summary.manifest, summary.records);
    println!(
        "prepare: done {}, failed {}, pending {}",
        summary.prepare.done, summary.prepare.failed, summary.prepare.pending
    );
    println!(
        "dock:    done {}, failed {}, pending {}",
        summary.dock.done, summary.dock.failed, summary.dock.pending
    );
    if let Some(best) = &summary.best {
        println!("best: {} ({:.2})", best.id, best.vina_score);
    }
    match &summary.next_action {
        NextAction::Command { command, reason } => {
            println!("next: {command}");
            println!("next detail: {reason}");
        }
        NextAction::None { reason } => println!("next detail: {reason}"),
    }
}
