//! Per-item execution loop shared by every stage.
//!
//! For each discovered item, in id order, the loop either keeps an existing
//! valid output (the skip fast path) or runs the stage's tool, then folds the
//! outcome into the manifest. Every [`CHECKPOINT_EVERY`] items the manifest
//! and the stage's derived views are persisted; a final flush always runs,
//! whether the loop completed, was stopped, or hit an error.
mod report;

pub use report::RunReport;

use crate::discovery::WorkItems;
use crate::invoke::ToolOutcome;
use crate::manifest::{Manifest, ManifestRecord, ManifestStore};
use crate::stop::StopToken;
use crate::util::now_utc;
use crate::validate::{OutputValidator, Validation};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Items processed between periodic checkpoints.
pub const CHECKPOINT_EVERY: usize = 50;

/// Canonical locations for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPlan {
    pub id: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
}

/// Terminal state of one item in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Existing output kept without running the tool.
    Skipped,
    Done,
    Failed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Skipped => "skipped",
            ItemState::Done => "done",
            ItemState::Failed => "failed",
        }
    }
}

/// One tool-driven stage: where items come from, how they run, and how
/// results land in the manifest.
pub trait Stage {
    fn name(&self) -> &'static str;

    fn discover(&self, manifest: &Manifest) -> Result<WorkItems>;

    fn plan(&self, id: &str, input: &Path) -> ItemPlan;

    fn validator(&self) -> &dyn OutputValidator;

    /// Stage-specific conditions on top of "output exists and validates".
    fn keep_existing(&self, _record: &ManifestRecord, _existing: &Validation) -> bool {
        true
    }

    /// Line written to the item log when the existing output is kept.
    fn skip_note(&self, plan: &ItemPlan) -> String;

    fn record_skip(&self, record: &mut ManifestRecord, plan: &ItemPlan, existing: &Validation);

    fn invoke(&self, plan: &ItemPlan) -> ToolOutcome;

    fn record_outcome(&self, record: &mut ManifestRecord, plan: &ItemPlan, outcome: &ToolOutcome);

    /// Regenerate projections of the manifest; returns the files written.
    fn write_views(&self, _manifest: &Manifest) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Hook invoked after each item; used to observe or steer a run.
pub trait ItemObserver {
    fn item_finished(&mut self, position: usize, id: &str, state: ItemState, stop: &StopToken);
}

pub struct RunLoop<'a> {
    stage: &'a dyn Stage,
    store: &'a ManifestStore,
    stop: StopToken,
    skip_existing: bool,
    observer: Option<&'a mut dyn ItemObserver>,
}

impl<'a> RunLoop<'a> {
    pub fn new(stage: &'a dyn Stage, store: &'a ManifestStore, stop: StopToken) -> Self {
        Self {
            stage,
            store,
            stop,
            skip_existing: true,
            observer: None,
        }
    }

    /// Enable or disable the skip fast path for this run.
    pub fn skip_existing(mut self, enabled: bool) -> Self {
        self.skip_existing = enabled;
        self
    }

    #[cfg(test)]
    pub fn observer(mut self, observer: &'a mut dyn ItemObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Process every discovered item. Discovery failure is fatal and happens
    /// before any item is touched.
    pub fn run(mut self) -> Result<RunReport> {
        let mut manifest = self.store.load()?;
        let items = self.stage.discover(&manifest)?;
        let mut report = RunReport::new(self.stage.name(), self.store.path());
        tracing::info!(stage = self.stage.name(), items = items.len(), "run started");
        let started = Instant::now();

        let processed = self.process_all(&items, &mut manifest, &mut report);
        let flushed = self.flush(&manifest);
        report.stopped = self.stop.stop_requested();
        tracing::info!(
            stage = self.stage.name(),
            done = report.done,
            skipped = report.skipped,
            failed = report.failed,
            processed = report.processed(),
            stopped = report.stopped,
            elapsed_ms = started.elapsed().as_millis(),
            "run finished"
        );
        processed?;
        report.views = flushed?;
        Ok(report)
    }

    fn process_all(
        &mut self,
        items: &WorkItems,
        manifest: &mut Manifest,
        report: &mut RunReport,
    ) -> Result<()> {
        let total = items.len();
        for (index, (id, input)) in items.iter().enumerate() {
            if self.stop.stop_requested() {
                tracing::info!(remaining = total - index, "stop requested; finalizing");
                break;
            }
            let position = index + 1;
            let record = manifest
                .entry(id.clone())
                .or_insert_with(|| ManifestRecord::new(id));
            let state = self.process_item(id, input, record);
            report.count(state);
            tracing::info!(id = %id, state = state.as_str(), position, total, "item finished");
            if let Some(observer) = self.observer.as_deref_mut() {
                observer.item_finished(position, id, state, &self.stop);
            }
            if position % CHECKPOINT_EVERY == 0 && !self.stop.is_hard() {
                self.flush(manifest)?;
                tracing::debug!(position, "checkpoint written");
            }
        }
        Ok(())
    }

    fn process_item(&self, id: &str, input: &Path, record: &mut ManifestRecord) -> ItemState {
        let plan = self.stage.plan(id, input);
        if self.skip_existing {
            let existing = self.stage.validator().validate(&plan.output);
            if existing.valid && self.stage.keep_existing(record, &existing) {
                self.stage.record_skip(record, &plan, &existing);
                record.touch(&now_utc());
                write_skip_log(&plan.log, &self.stage.skip_note(&plan));
                return ItemState::Skipped;
            }
        }
        let started = Instant::now();
        let outcome = self.stage.invoke(&plan);
        self.stage.record_outcome(record, &plan, &outcome);
        record.touch(&now_utc());
        if outcome.published() {
            tracing::debug!(id, elapsed_ms = started.elapsed().as_millis(), "output published");
            ItemState::Done
        } else {
            tracing::warn!(
                id,
                reason = %outcome.reason,
                attempts = outcome.attempts,
                "item failed"
            );
            ItemState::Failed
        }
    }

    fn flush(&self, manifest: &Manifest) -> Result<Vec<PathBuf>> {
        self.store.save(manifest)?;
        self.stage.write_views(manifest)
    }
}

fn write_skip_log(path: &Path, note: &str) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Err(err) = fs::write(path, format!("{note}\n")) {
        tracing::debug!(path = %path.display(), error = %err, "skip note not written");
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
