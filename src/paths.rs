//! Typed paths into a screening project layout.
//!
//! Every stage derives its file locations from here so the layout stays
//! consistent between ligand preparation, docking and the pipeline sequencer.
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating common project artifacts.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the project root used for path derivation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `3D_Structures/` directory holding SDF inputs.
    pub fn structures_dir(&self) -> PathBuf {
        self.root.join("3D_Structures")
    }

    /// Return the `prepared_ligands/` directory holding ligand PDBQT files.
    pub fn prepared_dir(&self) -> PathBuf {
        self.root.join("prepared_ligands")
    }

    /// Return the `results/` directory holding poses and derived tables.
    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Return the `state/manifest.csv` path.
    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir().join("manifest.csv")
    }

    /// Return the `state/manifest.lock` path guarding single-writer access.
    pub fn manifest_lock_path(&self) -> PathBuf {
        self.state_dir().join("manifest.lock")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Return the `config/run.yml` path.
    pub fn run_config_path(&self) -> PathBuf {
        self.config_dir().join("run.yml")
    }

    /// Return the `config/machine.yml` path.
    pub fn machine_config_path(&self) -> PathBuf {
        self.config_dir().join("machine.yml")
    }

    /// Receptor used when the docking config does not name one.
    pub fn fallback_receptor_path(&self) -> PathBuf {
        self.root.join("receptors").join("target_prepared.pdbqt")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("_pipeline_checkpoints")
    }
}

/// Per-directory locations of docking outputs.
#[derive(Debug, Clone)]
pub struct ResultPaths {
    dir: PathBuf,
}

impl ResultPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Return the `summary.csv` path.
    pub fn summary_path(&self) -> PathBuf {
        self.dir.join("summary.csv")
    }

    /// Return the `leaderboard.csv` path.
    pub fn leaderboard_path(&self) -> PathBuf {
        self.dir.join("leaderboard.csv")
    }
}

/// Temporary sibling of `final_path` that a tool writes before publication.
pub fn temp_output_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    final_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_output_path_appends_tmp_suffix() {
        let tmp = temp_output_path(Path::new("/p/results/LIG001_out.pdbqt"));
        assert_eq!(tmp, PathBuf::from("/p/results/LIG001_out.pdbqt.tmp"));
    }

    #[test]
    fn project_layout_is_rooted() {
        let paths = ProjectPaths::new(PathBuf::from("/proj"));
        assert_eq!(
            paths.manifest_path(),
            PathBuf::from("/proj/state/manifest.csv")
        );
        assert_eq!(
            paths.fallback_receptor_path(),
            PathBuf::from("/proj/receptors/target_prepared.pdbqt")
        );
    }
}
