//! Docking stage: prepared ligand PDBQT -> scored pose with AutoDock Vina or Vina-GPU.
//!
//! Setup is fatal on a missing binary or receptor. Per item, an existing pose
//! is kept only when it validates, is recorded `DONE`, and was produced with
//! the same configuration fingerprint and receptor content hash.
mod binary;

pub use binary::{locate_docking_config, resolve_binary, DockBinary};

use crate::config::{ConfigResolver, RunConfig};
use crate::discovery::{discover, DiscoverySpec, WorkItems};
use crate::invoke::{path_arg, CommandCandidate, Invocation, LogFormat, ToolOutcome};
use crate::manifest::{format_score, Manifest, ManifestRecord, StageStatus};
use crate::paths::{temp_output_path, ProjectPaths, ResultPaths};
use crate::run::{ItemPlan, Stage};
use crate::util::{display_path, resolve_against, sha256_file};
use crate::validate::{DockedPoseValidator, OutputValidator, Validation};
use crate::views;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

const SKIP_NOTE: &str = "[SKIP] Existing valid pose kept (same receptor+config)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Engine {
    /// AutoDock Vina on the CPU.
    Cpu,
    /// Vina-GPU.
    Gpu,
}

impl Engine {
    pub fn label(&self) -> &'static str {
        match self {
            Engine::Cpu => "vina",
            Engine::Gpu => "vina-gpu",
        }
    }

    fn config_key(&self) -> &'static str {
        match self {
            Engine::Cpu => "vina_cmd",
            Engine::Gpu => "vina_gpu_cmd",
        }
    }

    fn log_suffix(&self) -> &'static str {
        match self {
            Engine::Cpu => "vina",
            Engine::Gpu => "vinagpu",
        }
    }

    /// File names probed in the project root and on `PATH`, in order.
    fn binary_names(&self) -> Vec<&'static str> {
        match self {
            Engine::Cpu => {
                let mac_build = if std::env::consts::ARCH == "aarch64" {
                    "vina_1.2.7_mac_aarch64"
                } else {
                    "vina_1.2.7_mac_x86_64"
                };
                vec![mac_build, "vina", "autodock_vina", "vina_1.2.7"]
            }
            Engine::Gpu => vec![
                "Vina-GPU+.exe",
                "Vina-GPU+_K.exe",
                "Vina-GPU.exe",
                "vina-gpu.exe",
                "vina-gpu",
            ],
        }
    }

    fn config_file_names(&self) -> &'static [&'static str] {
        match self {
            Engine::Cpu => &["VinaConfig.txt"],
            Engine::Gpu => &["VinaGPUConfig.txt", "VinaConfig.txt"],
        }
    }
}

/// Inputs to docking setup beyond the project layout.
#[derive(Debug, Clone, Default)]
pub struct DockOptions {
    /// Extra YAML layers applied last, in order.
    pub extra_configs: Vec<PathBuf>,
    /// Key=value docking file used instead of the one beside the binary.
    pub docking_config: Option<PathBuf>,
}

pub struct DockStage {
    paths: ProjectPaths,
    engine: Engine,
    binary: DockBinary,
    config: RunConfig,
    receptor: PathBuf,
    receptor_hash: String,
    ligand_dir: PathBuf,
    results: ResultPaths,
    validator: DockedPoseValidator,
}

impl DockStage {
    /// Resolve binary, configuration and receptor. Any failure here aborts the run.
    pub fn setup(paths: ProjectPaths, engine: Engine, options: &DockOptions) -> Result<Self> {
        let bootstrap = ConfigResolver::for_project(&paths, None, &options.extra_configs).resolve()?;
        let binary = resolve_binary(engine, &bootstrap.tools, paths.root())?;
        let kv = locate_docking_config(engine, &binary, options.docking_config.as_deref());
        match &kv {
            Some(path) if !path.is_file() => {
                tracing::warn!(path = %path.display(), "docking config not found; using defaults")
            }
            None => tracing::warn!(
                binary = %binary.program.display(),
                "no docking config beside binary; using defaults"
            ),
            Some(_) => {}
        }
        let config =
            ConfigResolver::for_project(&paths, kv.as_deref(), &options.extra_configs).resolve()?;
        let receptor = resolve_receptor(&paths, &config);
        if !receptor.is_file() {
            return Err(anyhow!("receptor not found: {}", receptor.display()));
        }
        let receptor_hash = sha256_file(&receptor)?;
        let ligand_dir = config
            .docking
            .ligand_dir
            .as_deref()
            .map(|dir| resolve_against(paths.root(), dir))
            .unwrap_or_else(|| paths.prepared_dir());
        let results = ResultPaths::new(
            config
                .docking
                .output_dir
                .as_deref()
                .map(|dir| resolve_against(paths.root(), dir))
                .unwrap_or_else(|| paths.results_dir()),
        );
        tracing::info!(
            engine = engine.label(),
            binary = %binary.program.display(),
            receptor = %receptor.display(),
            fingerprint = %config.fingerprint,
            sources = ?config.sources,
            "docking configured"
        );
        Ok(Self {
            paths,
            engine,
            binary,
            config,
            receptor,
            receptor_hash,
            ligand_dir,
            results,
            validator: DockedPoseValidator,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn receptor_hash(&self) -> &str {
        &self.receptor_hash
    }

    /// Full argument list for one ligand, writing the pose to `tmp_output`.
    pub fn dock_args(&self, ligand: &Path, tmp_output: &Path) -> Vec<String> {
        let search = &self.config.search_box;
        let mut args = self.binary.prefix_args.clone();
        args.extend([
            "--receptor".to_string(),
            path_arg(&self.receptor),
            "--ligand".to_string(),
            path_arg(ligand),
        ]);
        for (axis, value) in ["x", "y", "z"].iter().zip(search.center) {
            args.extend([format!("--center_{axis}"), value.to_string()]);
        }
        for (axis, value) in ["x", "y", "z"].iter().zip(search.size) {
            args.extend([format!("--size_{axis}"), value.to_string()]);
        }
        match self.engine {
            Engine::Cpu => {
                let vina = &self.config.vina;
                args.extend([
                    "--exhaustiveness".to_string(),
                    vina.exhaustiveness.to_string(),
                    "--num_modes".to_string(),
                    vina.num_modes.to_string(),
                    "--energy_range".to_string(),
                    vina.energy_range.to_string(),
                    "--out".to_string(),
                    path_arg(tmp_output),
                ]);
                if let Some(seed) = vina.seed {
                    args.extend(["--seed".to_string(), seed.to_string()]);
                }
                if let Some(cpu) = vina.cpu {
                    args.extend(["--cpu".to_string(), cpu.to_string()]);
                }
            }
            Engine::Gpu => {
                let gpu = &self.config.gpu;
                args.extend([
                    "--thread".to_string(),
                    gpu.thread.to_string(),
                    "--search_depth".to_string(),
                    gpu.search_depth.to_string(),
                    "--out".to_string(),
                    path_arg(tmp_output),
                ]);
            }
        }
        args
    }

    fn box_preamble(&self) -> String {
        let [cx, cy, cz] = self.config.search_box.center;
        let [sx, sy, sz] = self.config.search_box.size;
        format!(
            "[BOX]\ncenter_x={cx} center_y={cy} center_z={cz}\nsize_x={sx} size_y={sy} size_z={sz}\n\n"
        )
    }

    fn rel(&self, path: &Path) -> String {
        display_path(path, Some(self.paths.root()))
    }

    fn binary_label(&self) -> String {
        self.binary.program.display().to_string()
    }
}

fn resolve_receptor(paths: &ProjectPaths, config: &RunConfig) -> PathBuf {
    match &config.docking.receptor {
        Some(receptor) => {
            let base = config.docking.base_dir.as_deref().unwrap_or(paths.root());
            resolve_against(base, receptor)
        }
        None => paths.fallback_receptor_path(),
    }
}

fn pdbqt_path(record: &ManifestRecord) -> &str {
    &record.pdbqt_path
}

impl Stage for DockStage {
    fn name(&self) -> &'static str {
        "dock"
    }

    fn discover(&self, manifest: &Manifest) -> Result<WorkItems> {
        discover(
            manifest,
            &DiscoverySpec {
                input_dir: &self.ligand_dir,
                extension: "pdbqt",
                manifest_path: pdbqt_path,
                project_root: self.paths.root(),
            },
        )
    }

    fn plan(&self, id: &str, input: &Path) -> ItemPlan {
        let dir = self.results.dir();
        ItemPlan {
            id: id.to_string(),
            input: input.to_path_buf(),
            output: dir.join(format!("{id}_out.pdbqt")),
            log: dir.join(format!("{id}_{}.log", self.engine.log_suffix())),
        }
    }

    fn validator(&self) -> &dyn OutputValidator {
        &self.validator
    }

    fn keep_existing(&self, record: &ManifestRecord, _existing: &Validation) -> bool {
        record.vina_status == StageStatus::Done
            && record.docking_fingerprint() == self.config.fingerprint
            && record.receptor_hash == self.receptor_hash
    }

    fn skip_note(&self, _plan: &ItemPlan) -> String {
        SKIP_NOTE.to_string()
    }

    fn record_skip(&self, record: &mut ManifestRecord, plan: &ItemPlan, existing: &Validation) {
        if record.vina_score.trim().is_empty() {
            if let Some(score) = existing.best_score {
                record.vina_score = format_score(score);
            }
        }
        record.vina_pose = self.rel(&plan.output);
        record.pdbqt_path = self.rel(&plan.input);
        record.dock_config_hash = self.config.fingerprint.clone();
        record.tools_vina = self.binary_label();
    }

    fn invoke(&self, plan: &ItemPlan) -> ToolOutcome {
        let args = self.dock_args(&plan.input, &temp_output_path(&plan.output));
        let candidates = [CommandCandidate::new(path_arg(&self.binary.program), args)];
        let preamble = self.box_preamble();
        Invocation {
            candidates: &candidates,
            output_path: &plan.output,
            log_path: &plan.log,
            validator: &self.validator,
            log_format: LogFormat::Sectioned,
            log_preamble: &preamble,
            exhausted_reason: None,
            cwd: self.paths.root(),
        }
        .run()
    }

    fn record_outcome(&self, record: &mut ManifestRecord, plan: &ItemPlan, outcome: &ToolOutcome) {
        record.pdbqt_path = self.rel(&plan.input);
        record.vina_pose = self.rel(&plan.output);
        record.dock_config_hash = self.config.fingerprint.clone();
        record.receptor_hash = self.receptor_hash.clone();
        record.tools_vina = self.binary_label();
        match (outcome.published(), outcome.best_score) {
            (true, Some(score)) => {
                record.vina_status = StageStatus::Done;
                record.vina_score = format_score(score);
                record.vina_reason = outcome.reason.clone();
            }
            (true, None) => {
                record.vina_status = StageStatus::Failed;
                record.vina_score.clear();
                record.vina_reason = "output produced but invalid".to_string();
            }
            (false, _) => {
                record.vina_status = StageStatus::Failed;
                record.vina_score.clear();
                record.vina_reason = outcome.reason.clone();
            }
        }
    }

    fn write_views(&self, manifest: &Manifest) -> Result<Vec<PathBuf>> {
        views::write_views(manifest, &self.results)
    }
}

#[cfg(test)]
#[path = "dock_tests.rs"]
mod tests;
