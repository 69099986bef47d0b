use super::ItemState;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Counts and artifact locations for one finished stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub stage: &'static str,
    /// Items that ended `DONE`, including those kept via the skip path.
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stopped: bool,
    pub manifest_path: PathBuf,
    pub views: Vec<PathBuf>,
}

impl RunReport {
    pub fn new(stage: &'static str, manifest_path: &Path) -> Self {
        Self {
            stage,
            done: 0,
            skipped: 0,
            failed: 0,
            stopped: false,
            manifest_path: manifest_path.to_path_buf(),
            views: Vec::new(),
        }
    }

    pub fn count(&mut self, state: ItemState) {
        match state {
            ItemState::Skipped => {
                self.done += 1;
                self.skipped += 1;
            }
            ItemState::Done => self.done += 1,
            ItemState::Failed => self.failed += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.done + self.failed
    }

    /// Plain-text summary printed at the end of a run.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}: DONE: {} (skipped {}) FAILED: {}\n",
            self.stage, self.done, self.skipped, self.failed
        );
        let _ = writeln!(out, "  manifest: {}", self.manifest_path.display());
        for view in &self.views {
            let _ = writeln!(out, "  wrote: {}", view.display());
        }
        if self.stopped {
            out.push_str("  (stopped early by request)\n");
        }
        out
    }
}
