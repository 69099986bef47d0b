//! Ligand preparation: `3D_Structures/<id>.sdf` -> `prepared_ligands/<id>.pdbqt` via Meeko.
use crate::config::RunConfig;
use crate::discovery::{discover, DiscoverySpec, WorkItems};
use crate::invoke::{dedup_candidates, path_arg, CommandCandidate, Invocation, LogFormat, ToolOutcome};
use crate::manifest::{Manifest, ManifestRecord, StageStatus};
use crate::paths::{temp_output_path, ProjectPaths};
use crate::run::{ItemPlan, Stage};
use crate::util::display_path;
use crate::validate::{LigandPdbqtValidator, OutputValidator, Validation};
use anyhow::Result;
use std::path::Path;

/// Module entry point used by the installed Meeko package.
const MEEKO_MODULE: &str = "meeko.cli_prepare_ligand";
const MEEKO_FALLBACK_CMD: &str = "mk_prepare_ligand";
const EXHAUSTED_REASON: &str = "All Meeko attempts failed";
const SKIP_REASON: &str = "Found existing valid PDBQT";
const DEFAULT_PROVENANCE: &str = "meeko";

pub struct PrepareStage {
    paths: ProjectPaths,
    config: RunConfig,
    validator: LigandPdbqtValidator,
}

impl PrepareStage {
    pub fn new(paths: ProjectPaths, config: RunConfig) -> Self {
        Self {
            paths,
            config,
            validator: LigandPdbqtValidator,
        }
    }

    #[cfg(test)]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Configured command first, then the console script, then the module entry point.
    pub fn candidates(&self, input: &Path, tmp_output: &Path) -> Vec<CommandCandidate> {
        let io_args = vec![
            "-i".to_string(),
            path_arg(input),
            "-o".to_string(),
            path_arg(tmp_output),
        ];
        let mut candidates = Vec::new();
        match CommandCandidate::from_configured(&self.config.tools.meeko_cmd, io_args.clone()) {
            Ok(candidate) => candidates.push(candidate),
            Err(err) => tracing::warn!(error = %err, "tools.meeko_cmd unusable; using fallbacks"),
        }
        candidates.push(CommandCandidate::new(MEEKO_FALLBACK_CMD, io_args.clone()));
        let mut module_args = vec!["-m".to_string(), MEEKO_MODULE.to_string()];
        module_args.extend(io_args);
        candidates.push(CommandCandidate::new(
            self.config.tools.python_exe.clone(),
            module_args,
        ));
        dedup_candidates(candidates)
    }

    fn rel(&self, path: &Path) -> String {
        display_path(path, Some(self.paths.root()))
    }
}

fn sdf_path(record: &ManifestRecord) -> &str {
    &record.sdf_path
}

impl Stage for PrepareStage {
    fn name(&self) -> &'static str {
        "prepare"
    }

    fn discover(&self, manifest: &Manifest) -> Result<WorkItems> {
        let input_dir = self.paths.structures_dir();
        discover(
            manifest,
            &DiscoverySpec {
                input_dir: &input_dir,
                extension: "sdf",
                manifest_path: sdf_path,
                project_root: self.paths.root(),
            },
        )
    }

    fn plan(&self, id: &str, input: &Path) -> ItemPlan {
        let dir = self.paths.prepared_dir();
        ItemPlan {
            id: id.to_string(),
            input: input.to_path_buf(),
            output: dir.join(format!("{id}.pdbqt")),
            log: dir.join(format!("{id}_meeko.log")),
        }
    }

    fn validator(&self) -> &dyn OutputValidator {
        &self.validator
    }

    fn skip_note(&self, plan: &ItemPlan) -> String {
        format!("[SKIP] Existing valid PDBQT kept: {}", plan.output.display())
    }

    fn record_skip(&self, record: &mut ManifestRecord, plan: &ItemPlan, _existing: &Validation) {
        record.sdf_path = self.rel(&plan.input);
        record.pdbqt_status = StageStatus::Done;
        record.pdbqt_path = self.rel(&plan.output);
        record.pdbqt_reason = SKIP_REASON.to_string();
        record.config_hash = self.config.fingerprint.clone();
        if record.tools_meeko.is_empty() {
            record.tools_meeko = DEFAULT_PROVENANCE.to_string();
        }
    }

    fn invoke(&self, plan: &ItemPlan) -> ToolOutcome {
        let candidates = self.candidates(&plan.input, &temp_output_path(&plan.output));
        Invocation {
            candidates: &candidates,
            output_path: &plan.output,
            log_path: &plan.log,
            validator: &self.validator,
            log_format: LogFormat::Transcript,
            log_preamble: "",
            exhausted_reason: Some(EXHAUSTED_REASON),
            cwd: self.paths.root(),
        }
        .run()
    }

    fn record_outcome(&self, record: &mut ManifestRecord, plan: &ItemPlan, outcome: &ToolOutcome) {
        record.sdf_path = self.rel(&plan.input);
        record.pdbqt_path = self.rel(&plan.output);
        record.config_hash = self.config.fingerprint.clone();
        record.pdbqt_status = if outcome.published() {
            StageStatus::Done
        } else {
            StageStatus::Failed
        };
        record.pdbqt_reason = outcome.reason.clone();
        match &outcome.program {
            Some(program) => record.tools_meeko = program.clone(),
            None if record.tools_meeko.is_empty() => {
                record.tools_meeko = DEFAULT_PROVENANCE.to_string();
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigResolver;
    use std::path::PathBuf;

    fn stage_with(root: &Path, run_yml: &str) -> PrepareStage {
        let paths = ProjectPaths::new(root.to_path_buf());
        std::fs::create_dir_all(paths.config_dir()).expect("mkdir config");
        std::fs::write(paths.run_config_path(), run_yml).expect("write run.yml");
        let config = ConfigResolver::new()
            .with_yaml(paths.run_config_path())
            .resolve()
            .expect("resolve");
        PrepareStage::new(paths, config)
    }

    #[test]
    fn candidates_follow_priority_and_drop_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stage = stage_with(
            dir.path(),
            "tools:\n  meeko_cmd: mk_prepare_ligand\n  python_exe: python3\n",
        );
        let candidates = stage.candidates(Path::new("in.sdf"), Path::new("out.pdbqt.tmp"));
        let programs: Vec<&str> = candidates.iter().map(|c| c.program.as_str()).collect();
        assert_eq!(programs, ["mk_prepare_ligand", "python3"]);
        assert_eq!(
            candidates[1].args,
            ["-m", MEEKO_MODULE, "-i", "in.sdf", "-o", "out.pdbqt.tmp"]
        );
    }

    #[test]
    fn configured_command_may_carry_its_own_arguments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stage = stage_with(dir.path(), "tools:\n  meeko_cmd: \"conda run mk_prepare_ligand.py\"\n");
        let candidates = stage.candidates(Path::new("a.sdf"), Path::new("a.tmp"));
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].program, "conda");
        assert_eq!(
            candidates[0].args,
            ["run", "mk_prepare_ligand.py", "-i", "a.sdf", "-o", "a.tmp"]
        );
    }

    #[test]
    fn plan_uses_prepared_ligand_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stage = stage_with(dir.path(), "");
        let plan = stage.plan("LIG001", Path::new("/x/LIG001.sdf"));
        let prepared = dir.path().join("prepared_ligands");
        assert_eq!(plan.output, prepared.join("LIG001.pdbqt"));
        assert_eq!(plan.log, prepared.join("LIG001_meeko.log"));
        assert_eq!(plan.input, PathBuf::from("/x/LIG001.sdf"));
    }

    #[test]
    fn failed_outcome_keeps_previous_provenance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stage = stage_with(dir.path(), "");
        let plan = stage.plan("LIG001", &dir.path().join("3D_Structures").join("LIG001.sdf"));
        let mut record = ManifestRecord::new("LIG001");
        record.tools_meeko = "/opt/bin/mk_prepare_ligand".to_string();
        let outcome = ToolOutcome {
            kind: crate::invoke::OutcomeKind::ToolFailed,
            reason: EXHAUSTED_REASON.to_string(),
            best_score: None,
            program: None,
            attempts: 3,
        };
        stage.record_outcome(&mut record, &plan, &outcome);
        assert_eq!(record.pdbqt_status, StageStatus::Failed);
        assert_eq!(record.pdbqt_reason, EXHAUSTED_REASON);
        assert_eq!(record.sdf_path, "3D_Structures/LIG001.sdf");
        assert_eq!(record.pdbqt_path, "prepared_ligands/LIG001.pdbqt");
        assert_eq!(record.tools_meeko, "/opt/bin/mk_prepare_ligand");
        assert_eq!(record.config_hash, stage.config().fingerprint);
    }
}
