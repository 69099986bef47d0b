//! Durable per-ligand manifest shared by every stage.
//!
//! The manifest is a CSV table keyed by ligand id. Every save rewrites the whole
//! table, sorted by id, through a temporary file that is renamed into place, so
//! the file on disk is always a complete snapshot.
mod lock;

pub use lock::ManifestLock;

use crate::util::write_atomic;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_SCHEMA_VERSION: u32 = 2;

/// Column order of manifest schema version 2. The set only ever grows.
pub const MANIFEST_COLUMNS: [&str; 23] = [
    "id",
    "smiles",
    "inchikey",
    "admet_status",
    "admet_reason",
    "sdf_status",
    "sdf_path",
    "sdf_reason",
    "pdbqt_status",
    "pdbqt_path",
    "pdbqt_reason",
    "vina_status",
    "vina_score",
    "vina_pose",
    "vina_reason",
    "config_hash",
    "dock_config_hash",
    "receptor_hash",
    "tools_rdkit",
    "tools_meeko",
    "tools_vina",
    "created_at",
    "updated_at",
];

/// Records keyed (and therefore ordered) by ligand id.
pub type Manifest = BTreeMap<String, ManifestRecord>;

/// Outcome of one stage for one ligand. An empty cell means not yet attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StageStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "",
            StageStatus::Done => "DONE",
            StageStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StageStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "DONE" => StageStatus::Done,
            "FAILED" => StageStatus::Failed,
            _ => StageStatus::Pending,
        }
    }
}

impl From<StageStatus> for String {
    fn from(value: StageStatus) -> Self {
        value.as_str().to_string()
    }
}

/// One manifest row. Every column is declared; absent cells read as empty.
///
/// `admet_*`, `sdf_*`, `smiles`, `inchikey` and `tools_rdkit` belong to the
/// upstream filtering and 3D-embedding stages and are carried through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestRecord {
    pub id: String,
    pub smiles: String,
    pub inchikey: String,
    pub admet_status: String,
    pub admet_reason: String,
    pub sdf_status: String,
    pub sdf_path: String,
    pub sdf_reason: String,
    #[serde(with = "status_cell")]
    pub pdbqt_status: StageStatus,
    pub pdbqt_path: String,
    pub pdbqt_reason: String,
    #[serde(with = "status_cell")]
    pub vina_status: StageStatus,
    pub vina_score: String,
    pub vina_pose: String,
    pub vina_reason: String,
    /// Preparation fingerprint.
    pub config_hash: String,
    /// Docking fingerprint. Empty in version 1 files, where `config_hash` held it.
    pub dock_config_hash: String,
    #[serde(alias = "receptor_sha1")]
    pub receptor_hash: String,
    pub tools_rdkit: String,
    pub tools_meeko: String,
    pub tools_vina: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ManifestRecord {
    /// Fresh record with every field empty except the id.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Stamp a write: `created_at` only the first time, `updated_at` always.
    pub fn touch(&mut self, now: &str) {
        if self.created_at.is_empty() {
            self.created_at = now.to_string();
        }
        self.updated_at = now.to_string();
    }

    /// Fingerprint the recorded pose was docked with.
    pub fn docking_fingerprint(&self) -> &str {
        if self.dock_config_hash.is_empty() {
            &self.config_hash
        } else {
            &self.dock_config_hash
        }
    }

    /// Parsed docking score, if one is recorded.
    pub fn score(&self) -> Option<f64> {
        parse_score(&self.vina_score)
    }
}

mod status_cell {
    use super::StageStatus;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &StageStatus, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(status.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StageStatus, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(StageStatus::from).unwrap_or_default())
    }
}

/// Render a score the way the manifest stores it.
pub fn format_score(score: f64) -> String {
    format!("{score:.2}")
}

pub fn parse_score(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Reads and rewrites the manifest file. Only this type writes it.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records; a missing file is an empty manifest.
    pub fn load(&self) -> Result<Manifest> {
        if !self.path.is_file() {
            return Ok(Manifest::new());
        }
        let bytes =
            fs::read(&self.path).with_context(|| format!("read manifest {}", self.path.display()))?;
        parse_manifest(&bytes).with_context(|| format!("parse manifest {}", self.path.display()))
    }

    /// Rewrite the full table, sorted by id, replacing the file atomically.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let bytes = render_manifest(manifest)?;
        write_atomic(&self.path, &bytes)
            .with_context(|| format!("save manifest {}", self.path.display()))?;
        tracing::debug!(
            records = manifest.len(),
            schema = MANIFEST_SCHEMA_VERSION,
            path = %self.path.display(),
            "manifest saved"
        );
        Ok(())
    }
}

fn parse_manifest(bytes: &[u8]) -> Result<Manifest> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let mut manifest = Manifest::new();
    for row in reader.deserialize::<ManifestRecord>() {
        let mut record = row.context("decode manifest row")?;
        record.id = record.id.trim().to_string();
        if record.id.is_empty() {
            continue;
        }
        manifest.insert(record.id.clone(), record);
    }
    Ok(manifest)
}

fn render_manifest(manifest: &Manifest) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(MANIFEST_COLUMNS)
        .context("write manifest header")?;
    for record in manifest.values() {
        writer.serialize(record).context("write manifest row")?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow!("finish manifest: {}", err.error()))
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
