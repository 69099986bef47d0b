use super::*;
use crate::invoke::OutcomeKind;
use crate::manifest::StageStatus;
use crate::stop::StopLevel;
use std::cell::{Cell, RefCell};

struct MarkerValidator;

impl OutputValidator for MarkerValidator {
    fn validate(&self, path: &Path) -> Validation {
        match fs::read_to_string(path) {
            Ok(text) if text == "ok" => Validation {
                valid: true,
                best_score: Some(-1.0),
            },
            _ => Validation::invalid(),
        }
    }
}

struct FakeStage {
    root: PathBuf,
    ids: Vec<String>,
    failing: Vec<String>,
    require_done_status: bool,
    invoked: RefCell<Vec<String>>,
    views_written: Cell<usize>,
}

impl FakeStage {
    fn new(root: &Path, count: usize) -> Self {
        Self {
            root: root.to_path_buf(),
            ids: (1..=count).map(|n| format!("LIG{n:03}")).collect(),
            failing: Vec::new(),
            require_done_status: false,
            invoked: RefCell::new(Vec::new()),
            views_written: Cell::new(0),
        }
    }
}

impl Stage for FakeStage {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn discover(&self, _manifest: &Manifest) -> Result<WorkItems> {
        Ok(self
            .ids
            .iter()
            .map(|id| (id.clone(), self.root.join("in").join(format!("{id}.sdf"))))
            .collect())
    }

    fn plan(&self, id: &str, input: &Path) -> ItemPlan {
        ItemPlan {
            id: id.to_string(),
            input: input.to_path_buf(),
            output: self.root.join("out").join(format!("{id}.pdbqt")),
            log: self.root.join("out").join(format!("{id}.log")),
        }
    }

    fn validator(&self) -> &dyn OutputValidator {
        &MarkerValidator
    }

    fn keep_existing(&self, record: &ManifestRecord, _existing: &Validation) -> bool {
        !self.require_done_status || record.pdbqt_status == StageStatus::Done
    }

    fn skip_note(&self, plan: &ItemPlan) -> String {
        format!("[SKIP] kept {}", plan.id)
    }

    fn record_skip(&self, record: &mut ManifestRecord, plan: &ItemPlan, _existing: &Validation) {
        record.pdbqt_status = StageStatus::Done;
        record.pdbqt_path = plan.output.display().to_string();
        record.pdbqt_reason = "kept".to_string();
    }

    fn invoke(&self, plan: &ItemPlan) -> ToolOutcome {
        self.invoked.borrow_mut().push(plan.id.clone());
        if self.failing.contains(&plan.id) {
            return ToolOutcome {
                kind: OutcomeKind::ToolFailed,
                reason: "boom".to_string(),
                best_score: None,
                program: None,
                attempts: 1,
            };
        }
        fs::create_dir_all(plan.output.parent().expect("parent")).expect("mkdir");
        fs::write(&plan.output, "ok").expect("write output");
        ToolOutcome {
            kind: OutcomeKind::Published,
            reason: "OK".to_string(),
            best_score: Some(-1.0),
            program: Some("fake-tool".to_string()),
            attempts: 1,
        }
    }

    fn record_outcome(&self, record: &mut ManifestRecord, plan: &ItemPlan, outcome: &ToolOutcome) {
        record.pdbqt_status = if outcome.published() {
            StageStatus::Done
        } else {
            StageStatus::Failed
        };
        record.pdbqt_path = plan.output.display().to_string();
        record.pdbqt_reason = outcome.reason.clone();
    }

    fn write_views(&self, _manifest: &Manifest) -> Result<Vec<PathBuf>> {
        self.views_written.set(self.views_written.get() + 1);
        Ok(vec![self.root.join("summary.csv")])
    }
}

struct StopAfter {
    position: usize,
    seen: Vec<String>,
}

impl ItemObserver for StopAfter {
    fn item_finished(&mut self, position: usize, id: &str, _state: ItemState, stop: &StopToken) {
        self.seen.push(id.to_string());
        if position == self.position {
            stop.request(StopLevel::Graceful);
        }
    }
}

fn store_for(root: &Path) -> ManifestStore {
    ManifestStore::new(root.join("state").join("manifest.csv"))
}

#[test]
fn second_run_takes_skip_path_without_invoking_tool() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_for(dir.path());
    let stage = FakeStage::new(dir.path(), 1);

    let first = RunLoop::new(&stage, &store, StopToken::new())
        .run()
        .expect("first run");
    assert_eq!((first.done, first.skipped, first.failed), (1, 0, 0));
    let record = store.load().expect("load")["LIG001"].clone();
    assert_eq!(record.pdbqt_status, StageStatus::Done);
    assert_eq!(record.created_at, record.updated_at);
    let output = fs::read(dir.path().join("out").join("LIG001.pdbqt")).expect("output");

    let second = RunLoop::new(&stage, &store, StopToken::new())
        .run()
        .expect("second run");
    assert_eq!((second.done, second.skipped), (1, 1));
    assert_eq!(stage.invoked.borrow().len(), 1, "tool must not run again");
    let again = store.load().expect("reload")["LIG001"].clone();
    assert_eq!(again.pdbqt_status, StageStatus::Done);
    assert_eq!(again.created_at, record.created_at);
    assert_eq!(
        fs::read(dir.path().join("out").join("LIG001.pdbqt")).expect("output"),
        output
    );
    let log = fs::read_to_string(dir.path().join("out").join("LIG001.log")).expect("log");
    assert_eq!(log, "[SKIP] kept LIG001\n");
}

#[test]
fn disabled_skip_and_stage_policy_force_reinvocation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_for(dir.path());
    let mut stage = FakeStage::new(dir.path(), 2);
    RunLoop::new(&stage, &store, StopToken::new())
        .run()
        .expect("first run");

    RunLoop::new(&stage, &store, StopToken::new())
        .skip_existing(false)
        .run()
        .expect("rerun-all");
    assert_eq!(stage.invoked.borrow().len(), 4);

    let mut manifest = store.load().expect("load");
    if let Some(record) = manifest.get_mut("LIG002") {
        record.pdbqt_status = StageStatus::Failed;
    }
    store.save(&manifest).expect("save");
    stage.require_done_status = true;
    let report = RunLoop::new(&stage, &store, StopToken::new())
        .run()
        .expect("policy run");
    assert_eq!(report.skipped, 1);
    assert_eq!(stage.invoked.borrow().last().map(String::as_str), Some("LIG002"));
}

#[test]
fn failures_are_recorded_and_do_not_stop_the_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_for(dir.path());
    let mut stage = FakeStage::new(dir.path(), 3);
    stage.failing.push("LIG002".to_string());
    let report = RunLoop::new(&stage, &store, StopToken::new())
        .run()
        .expect("run");
    assert_eq!((report.done, report.failed), (2, 1));
    let manifest = store.load().expect("load");
    assert_eq!(manifest["LIG002"].pdbqt_status, StageStatus::Failed);
    assert_eq!(manifest["LIG002"].pdbqt_reason, "boom");
    assert_eq!(manifest["LIG003"].pdbqt_status, StageStatus::Done);
}

#[test]
fn graceful_stop_after_third_item_flushes_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_for(dir.path());
    let stage = FakeStage::new(dir.path(), 10);
    let mut observer = StopAfter {
        position: 3,
        seen: Vec::new(),
    };
    let report = RunLoop::new(&stage, &store, StopToken::new())
        .observer(&mut observer)
        .run()
        .expect("run");
    assert!(report.stopped);
    assert_eq!(report.done, 3);
    assert_eq!(observer.seen, ["LIG001", "LIG002", "LIG003"]);
    assert_eq!(stage.views_written.get(), 1);
    assert_eq!(report.views, vec![dir.path().join("summary.csv")]);
    let manifest = store.load().expect("load");
    let ids: Vec<&str> = manifest.keys().map(String::as_str).collect();
    assert_eq!(ids, ["LIG001", "LIG002", "LIG003"]);
}

#[test]
fn stop_requested_before_start_still_flushes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_for(dir.path());
    let stage = FakeStage::new(dir.path(), 2);
    let stop = StopToken::new();
    stop.request(StopLevel::Hard);
    let report = RunLoop::new(&stage, &store, stop).run().expect("run");
    assert!(report.stopped);
    assert_eq!(report.processed(), 0);
    assert!(store.path().is_file());
    assert!(stage.invoked.borrow().is_empty());
}

/// Snapshots what is on disk when item `at` finishes, and optionally stops there.
struct CheckpointWatcher<'s> {
    store: &'s ManifestStore,
    views: &'s Cell<usize>,
    at: usize,
    stop_with: Option<StopLevel>,
    rows_on_disk: Option<usize>,
    views_so_far: Option<usize>,
}

impl<'s> CheckpointWatcher<'s> {
    fn new(store: &'s ManifestStore, stage: &'s FakeStage, at: usize) -> Self {
        Self {
            store,
            views: &stage.views_written,
            at,
            stop_with: None,
            rows_on_disk: None,
            views_so_far: None,
        }
    }
}

impl ItemObserver for CheckpointWatcher<'_> {
    fn item_finished(&mut self, position: usize, _id: &str, _state: ItemState, stop: &StopToken) {
        if position != self.at {
            return;
        }
        self.rows_on_disk = Some(self.store.load().map(|m| m.len()).unwrap_or(0));
        self.views_so_far = Some(self.views.get());
        if let Some(level) = self.stop_with {
            stop.request(level);
        }
    }
}

#[test]
fn manifest_and_views_are_checkpointed_periodically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_for(dir.path());
    let stage = FakeStage::new(dir.path(), CHECKPOINT_EVERY + 1);
    let mut watcher = CheckpointWatcher::new(&store, &stage, CHECKPOINT_EVERY + 1);
    let report = RunLoop::new(&stage, &store, StopToken::new())
        .observer(&mut watcher)
        .run()
        .expect("run");
    assert_eq!(report.done, CHECKPOINT_EVERY + 1);
    assert_eq!(watcher.rows_on_disk, Some(CHECKPOINT_EVERY));
    assert_eq!(watcher.views_so_far, Some(1));
    assert_eq!(stage.views_written.get(), 2, "checkpoint plus final flush");
    assert_eq!(store.load().expect("load").len(), CHECKPOINT_EVERY + 1);
}

#[test]
fn graceful_stop_on_checkpoint_item_still_checkpoints() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_for(dir.path());
    let stage = FakeStage::new(dir.path(), CHECKPOINT_EVERY + 5);
    let mut watcher = CheckpointWatcher::new(&store, &stage, CHECKPOINT_EVERY);
    watcher.stop_with = Some(StopLevel::Graceful);
    let report = RunLoop::new(&stage, &store, StopToken::new())
        .observer(&mut watcher)
        .run()
        .expect("run");
    assert!(report.stopped);
    assert_eq!(report.done, CHECKPOINT_EVERY);
    assert_eq!(stage.views_written.get(), 2);
    assert_eq!(store.load().expect("load").len(), CHECKPOINT_EVERY);
}

#[test]
fn hard_stop_skips_periodic_checkpoint_but_not_final_flush() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_for(dir.path());
    let stage = FakeStage::new(dir.path(), CHECKPOINT_EVERY + 5);
    let mut watcher = CheckpointWatcher::new(&store, &stage, CHECKPOINT_EVERY);
    watcher.stop_with = Some(StopLevel::Hard);
    let report = RunLoop::new(&stage, &store, StopToken::new())
        .observer(&mut watcher)
        .run()
        .expect("run");
    assert!(report.stopped);
    assert_eq!(report.done, CHECKPOINT_EVERY);
    assert_eq!(watcher.rows_on_disk, Some(0));
    assert_eq!(stage.views_written.get(), 1, "final flush only");
    assert_eq!(store.load().expect("load").len(), CHECKPOINT_EVERY);
    assert_eq!(stage.invoked.borrow().len(), CHECKPOINT_EVERY);
}
