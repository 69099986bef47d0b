//! Structural checks on tool outputs.
//!
//! Validation is deliberately shallow: it confirms a file is large enough and
//! carries the markers downstream stages rely on. It never errors; anything
//! unreadable is simply invalid.
//!
//! ## Rules
//! - **Ligand PDBQT**: at least [`MIN_OUTPUT_BYTES`], an `ATOM `/`HETATM`
//!   record, and a `TORSDOF` line.
//! - **Docked pose**: at least [`MIN_OUTPUT_BYTES`] and one or more
//!   `REMARK VINA RESULT:` lines. The best (lowest) energy is reported.
//!
//! ```text
//! REMARK VINA RESULT:    -7.412      0.000      0.000
//! REMARK VINA RESULT:    -6.903      1.871      2.604
//! -> valid, best score -7.412
//! ```

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Outputs below this size are treated as truncated writes.
pub const MIN_OUTPUT_BYTES: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validation {
    pub valid: bool,
    /// Most negative score found, for outputs that carry scores.
    pub best_score: Option<f64>,
}

impl Validation {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            best_score: None,
        }
    }

    fn valid(best_score: Option<f64>) -> Self {
        Self {
            valid: true,
            best_score,
        }
    }
}

/// Format-specific acceptance check for one output file.
pub trait OutputValidator {
    fn validate(&self, path: &Path) -> Validation;
}

/// Ligand PDBQT written by Meeko.
#[derive(Debug, Clone, Copy, Default)]
pub struct LigandPdbqtValidator;

/// Multi-model pose file written by Vina or Vina-GPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockedPoseValidator;

impl OutputValidator for LigandPdbqtValidator {
    fn validate(&self, path: &Path) -> Validation {
        let Some(text) = read_sized(path) else {
            return Validation::invalid();
        };
        let has_atoms = text.contains("ATOM ") || text.contains("HETATM");
        let has_torsions = text.contains("TORSDOF");
        if has_atoms && has_torsions {
            Validation::valid(None)
        } else {
            Validation::invalid()
        }
    }
}

impl OutputValidator for DockedPoseValidator {
    fn validate(&self, path: &Path) -> Validation {
        let Some(text) = read_sized(path) else {
            return Validation::invalid();
        };
        match best_vina_score(&text) {
            Some(score) => Validation::valid(Some(score)),
            None => Validation::invalid(),
        }
    }
}

fn vina_result_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)REMARK VINA RESULT:\s+(-?\d+\.\d+)").expect("regex for vina result lines")
    })
}

/// Minimum over every `REMARK VINA RESULT` energy in `text`.
pub fn best_vina_score(text: &str) -> Option<f64> {
    vina_result_re()
        .captures_iter(text)
        .filter_map(|cap| cap.get(1)?.as_str().parse::<f64>().ok())
        .min_by(f64::total_cmp)
}

fn read_sized(path: &Path) -> Option<String> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() || meta.len() < MIN_OUTPUT_BYTES {
        return None;
    }
    let bytes = fs::read(path).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
