use crate::cli::{CommonArgs, DockArgs, EngineArgs, PipelineArgs, PrepareArgs, StatusArgs};
use crate::config::ConfigResolver;
use crate::dock::{DockOptions, DockStage};
use crate::manifest::{ManifestLock, ManifestStore};
use crate::paths::ProjectPaths;
use crate::pipeline::{
    parse_indices, render_stage_list, run_pipeline, Checkpoints, PipelineOptions, PipelineStage,
    StageDisposition, StageRunner,
};
use crate::prepare::PrepareStage;
use crate::run::{RunLoop, RunReport, Stage};
use crate::status::{build_status_summary, print_status};
use crate::stop::{install_interrupt_handler, StopToken};
use crate::util::ensure_project_root;
use anyhow::{Context, Result};

/// One locked, interruptible run against a project.
struct Session {
    paths: ProjectPaths,
    store: ManifestStore,
    stop: StopToken,
    common: CommonArgs,
    _lock: ManifestLock,
}

impl Session {
    fn open(common: &CommonArgs) -> Result<Self> {
        let root = ensure_project_root(&common.project)?;
        let paths = ProjectPaths::new(root);
        let lock = ManifestLock::acquire(&paths.manifest_lock_path())?;
        let stop = StopToken::new();
        install_interrupt_handler(&stop)?;
        let store = ManifestStore::new(paths.manifest_path());
        tracing::debug!(
            root = %paths.root().display(),
            lock = %lock.path().display(),
            "session opened"
        );
        Ok(Self {
            paths,
            store,
            stop,
            common: common.clone(),
            _lock: lock,
        })
    }

    fn prepare(&self) -> Result<RunReport> {
        let config = ConfigResolver::for_project(&self.paths, None, &self.common.configs)
            .resolve()
            .context("resolve preparation config")?;
        tracing::debug!(
            sources = ?config.sources,
            fingerprint = %config.fingerprint,
            "preparation config resolved"
        );
        let skip = config.skip_if_done && !self.common.rerun_all;
        let stage = PrepareStage::new(self.paths.clone(), config);
        self.drive(&stage, skip)
    }

    fn dock(&self, engine: &EngineArgs) -> Result<RunReport> {
        let options = DockOptions {
            extra_configs: self.common.configs.clone(),
            docking_config: engine.docking_config.clone(),
        };
        let stage = DockStage::setup(self.paths.clone(), engine.engine, &options)?;
        let skip = stage.config().skip_if_done && !self.common.rerun_all;
        self.drive(&stage, skip)
    }

    fn drive(&self, stage: &dyn Stage, skip_existing: bool) -> Result<RunReport> {
        RunLoop::new(stage, &self.store, self.stop.clone())
            .skip_existing(skip_existing)
            .run()
    }
}

pub fn run_prepare(args: PrepareArgs) -> Result<()> {
    let session = Session::open(&args.common)?;
    let report = session.prepare()?;
    print!("{}", report.render());
    Ok(())
}

pub fn run_dock(args: DockArgs) -> Result<()> {
    let session = Session::open(&args.common)?;
    let report = session.dock(&args.engine)?;
    print!("{}", report.render());
    Ok(())
}

struct SessionRunner<'a> {
    session: &'a Session,
    engine: &'a EngineArgs,
}

impl StageRunner for SessionRunner<'_> {
    fn run_stage(&mut self, stage: PipelineStage) -> Result<RunReport> {
        let report = match stage {
            PipelineStage::Prepare => self.session.prepare()?,
            PipelineStage::Dock => self.session.dock(self.engine)?,
        };
        print!("{}", report.render());
        Ok(report)
    }
}

pub fn run_pipeline_command(args: PipelineArgs) -> Result<()> {
    if args.list {
        print!("{}", render_stage_list());
        return Ok(());
    }
    let options = PipelineOptions {
        resume: args.resume,
        fresh: args.fresh,
        only: args.only.as_deref().map(parse_indices).transpose()?,
        skip: args
            .skip
            .as_deref()
            .map(parse_indices)
            .transpose()?
            .unwrap_or_default(),
    };
    let session = Session::open(&args.common)?;
    let checkpoints = Checkpoints::new(session.paths.checkpoints_dir());
    let mut runner = SessionRunner {
        session: &session,
        engine: &args.engine,
    };
    let report = run_pipeline(&checkpoints, &options, &mut runner)?;
    for (stage, disposition) in &report.stages {
        let note = match disposition {
            StageDisposition::Ran => continue,
            StageDisposition::NotSelected => "not selected",
            StageDisposition::Skipped => "skipped by request",
            StageDisposition::AlreadyComplete => "already complete (checkpoint present)",
        };
        println!("stage {} ({}): {note}", stage.index(), stage.name());
    }
    let failed: usize = report.reports.iter().map(|stage| stage.failed).sum();
    println!(
        "pipeline: {} stage(s) run, {failed} item failure(s)",
        report.reports.len()
    );
    if report.stopped {
        println!("pipeline stopped early by request; remaining stages not run");
    }
    println!("checkpoints: {}", checkpoints.dir().display());
    Ok(())
}

pub fn run_status(args: StatusArgs) -> Result<()> {
    let root = ensure_project_root(&args.project)?;
    let paths = ProjectPaths::new(root);
    let store = ManifestStore::new(paths.manifest_path());
    let manifest = store.load()?;
    let summary = build_status_summary(store.path(), &manifest);
    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serialize status")?;
        println!("{text}");
    } else {
        print_status(&summary);
    }
    Ok(())
}
