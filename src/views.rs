//! Summary and leaderboard tables projected from the manifest.
//!
//! Both files are regenerated in full on every checkpoint; nothing else
//! writes them.
use crate::manifest::{Manifest, ManifestRecord};
use crate::paths::ResultPaths;
use crate::util::write_atomic;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::PathBuf;

pub const SUMMARY_COLUMNS: [&str; 5] = ["id", "inchikey", "vina_score", "pose_path", "created_at"];
pub const LEADERBOARD_COLUMNS: [&str; 5] = ["rank", "id", "inchikey", "vina_score", "pose_path"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub id: String,
    pub inchikey: String,
    pub vina_score: String,
    pub pose_path: String,
    /// Time the score was last written, taken from the record's `updated_at`.
    pub created_at: String,
    #[serde(skip)]
    score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub id: String,
    pub inchikey: String,
    pub vina_score: String,
    pub pose_path: String,
}

impl SummaryRow {
    fn from_record(record: &ManifestRecord) -> Option<Self> {
        let score = record.score()?;
        Some(Self {
            id: record.id.clone(),
            inchikey: record.inchikey.clone(),
            vina_score: record.vina_score.trim().to_string(),
            pose_path: record.vina_pose.clone(),
            created_at: record.updated_at.clone(),
            score,
        })
    }
}

/// One row per record with a recorded score, in id order.
pub fn summary_rows(manifest: &Manifest) -> Vec<SummaryRow> {
    manifest.values().filter_map(SummaryRow::from_record).collect()
}

/// Rows sorted by ascending score; ties keep id order. Ranks start at 1.
pub fn leaderboard_rows(summary: &[SummaryRow]) -> Vec<LeaderboardRow> {
    let mut ranked: Vec<&SummaryRow> = summary.iter().collect();
    ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
    ranked
        .into_iter()
        .enumerate()
        .map(|(index, row)| LeaderboardRow {
            rank: index + 1,
            id: row.id.clone(),
            inchikey: row.inchikey.clone(),
            vina_score: row.vina_score.clone(),
            pose_path: row.pose_path.clone(),
        })
        .collect()
}

/// Regenerate both tables; returns the paths written.
pub fn write_views(manifest: &Manifest, paths: &ResultPaths) -> Result<Vec<PathBuf>> {
    let summary = summary_rows(manifest);
    let leaderboard = leaderboard_rows(&summary);
    let summary_path = paths.summary_path();
    let leaderboard_path = paths.leaderboard_path();
    write_atomic(&summary_path, &render(&SUMMARY_COLUMNS, &summary)?)?;
    write_atomic(&leaderboard_path, &render(&LEADERBOARD_COLUMNS, &leaderboard)?)?;
    tracing::debug!(rows = summary.len(), dir = %paths.dir().display(), "views regenerated");
    Ok(vec![summary_path, leaderboard_path])
}

fn render<T: Serialize>(columns: &[&str], rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(columns).context("write view header")?;
    for row in rows {
        writer.serialize(row).context("write view row")?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow!("finish view: {}", err.error()))
}
