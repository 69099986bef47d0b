//! Work-item discovery from manifest hints plus a directory scan.
use crate::manifest::{Manifest, ManifestRecord};
use crate::util::resolve_against;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Ordered `id -> input file` mapping for one stage.
pub type WorkItems = BTreeMap<String, PathBuf>;

/// Where a stage finds its inputs.
#[derive(Debug, Clone)]
pub struct DiscoverySpec<'a> {
    /// Directory scanned for `<id>.<extension>` files.
    pub input_dir: &'a Path,
    /// Extension without the dot, matched case-sensitively.
    pub extension: &'a str,
    /// Manifest column naming a previously recorded input path.
    pub manifest_path: fn(&ManifestRecord) -> &str,
    /// Base for relative manifest paths.
    pub project_root: &'a Path,
}

/// Resolve inputs: trusted manifest paths first, then fill gaps from the scan.
///
/// Zero discovered items is fatal for the run.
pub fn discover(manifest: &Manifest, spec: &DiscoverySpec<'_>) -> Result<WorkItems> {
    let mut items = WorkItems::new();
    for (id, record) in manifest {
        let recorded = (spec.manifest_path)(record).trim();
        if recorded.is_empty() {
            continue;
        }
        let path = resolve_against(spec.project_root, Path::new(recorded));
        if path.is_file() {
            items.insert(id.clone(), path);
        }
    }
    let from_manifest = items.len();
    for path in scan_dir(spec.input_dir, spec.extension)? {
        let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        items.entry(id.to_string()).or_insert(path);
    }
    tracing::info!(
        from_manifest,
        total = items.len(),
        dir = %spec.input_dir.display(),
        "work items discovered"
    );
    if items.is_empty() {
        return Err(anyhow!(
            "no .{} inputs found (manifest or {})",
            spec.extension,
            spec.input_dir.display()
        ));
    }
    Ok(items)
}

fn scan_dir(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
