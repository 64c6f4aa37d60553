//! Discovery of per-year source files.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

static YEAR_IN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:\D|$)").expect("year pattern compiles"));

/// Which family a source file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    CombinedScores,
    JuryScores,
    TelevoteScores,
    Songs,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::CombinedScores => "combined scores",
            SourceKind::JuryScores => "jury scores",
            SourceKind::TelevoteScores => "televote scores",
            SourceKind::Songs => "songs",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub year: i64,
    pub kind: SourceKind,
}

impl SourceFile {
    /// Name of the cleaned per-year relation this file becomes.
    pub fn relation_name(&self) -> String {
        match self.kind {
            SourceKind::CombinedScores => format!("scores_{}", self.year),
            SourceKind::JuryScores => format!("scores_{}_jury", self.year),
            SourceKind::TelevoteScores => format!("scores_{}_televote", self.year),
            SourceKind::Songs => format!("songs_{}", self.year),
        }
    }
}

/// The first `19xx` or `20xx` number in a file name that is not part of a longer number.
pub fn extract_year(file_name: &str) -> Option<i64> {
    YEAR_IN_NAME
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn classify_score_file(file_name: &str) -> SourceKind {
    let lower = file_name.to_lowercase();
    if lower.contains("juryvote") {
        SourceKind::JuryScores
    } else if lower.contains("televote") {
        SourceKind::TelevoteScores
    } else {
        SourceKind::CombinedScores
    }
}

fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::Config(format!(
            "source directory '{}' does not exist",
            dir.display()
        )));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn discover<F>(dir: &Path, classify: F) -> Result<Vec<SourceFile>>
where
    F: Fn(&str) -> SourceKind,
{
    let mut sources = Vec::new();
    for path in list_csv_files(dir)? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match extract_year(&file_name) {
            Some(year) => {
                let kind = classify(&file_name);
                debug!(file = %file_name, year, %kind, "discovered source");
                sources.push(SourceFile { path, year, kind });
            }
            None => warn!(file = %file_name, "ignoring source file without a year in its name"),
        }
    }
    sources.sort_by(|a, b| (a.year, a.kind, &a.path).cmp(&(b.year, b.kind, &b.path)));
    Ok(sources)
}

/// Per-year score files, in ascending year order.
pub fn discover_score_files(dir: &Path) -> Result<Vec<SourceFile>> {
    discover(dir, classify_score_file)
}

/// Per-year song tables, in ascending year order.
pub fn discover_song_files(dir: &Path) -> Result<Vec<SourceFile>> {
    discover(dir, |_| SourceKind::Songs)
}
