//! Loading per-year sources through their schema declarations.
//!
//! A per-year table that does not match its declaration is skipped and recorded;
//! every other failure aborts the run. The song sheet and the prediction input are
//! single tables, so any mismatch there is fatal.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, instrument, warn};

use super::catalog::{SourceFile, SourceKind};
use crate::constants::SPLIT_SCORES_FIRST_YEAR;
use crate::error::{PipelineError, Result};
use crate::metrics::SourcesMetrics;
use crate::pipeline::processing::canonicalize::canonical_column_name;
use crate::pipeline::processing::fixers::clean_song_sheet;
use crate::pipeline::processing::merge::SplitYear;
use crate::pipeline::processing::normalize::normalize_table;
use crate::schema::{TableSchema, PREDICTION_INPUT, SCORE_TABLE, SONG_SHEET, SONG_TABLE, SPLIT_SCORE_TABLE};
use crate::table::csv_io::{apply_schema, read_raw_path};
use crate::table::Table;

/// A per-year source left out of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub year: i64,
    pub kind: SourceKind,
    pub file: String,
    pub reason: String,
}

/// Everything the score stage needs.
#[derive(Debug, Default)]
pub struct ScoreSources {
    /// Era A tables, normalized, one per year.
    pub combined: Vec<Table>,
    /// Era B years with both halves normalized.
    pub split: Vec<SplitYear>,
    pub skipped: Vec<SkippedSource>,
}

#[derive(Debug, Default)]
pub struct SongSources {
    pub tables: Vec<Table>,
    pub skipped: Vec<SkippedSource>,
}

/// Read a CSV file, canonicalize its headers and type it per the schema.
pub fn load_table(path: &Path, schema: &TableSchema) -> Result<Table> {
    let raw = read_raw_path(path)?.rename_with(canonical_column_name)?;
    apply_schema(raw, schema)
}

fn file_label(source: &SourceFile) -> String {
    source
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Turn a schema mismatch into a skip; pass everything else through.
fn skip_on_mismatch<T>(
    result: Result<T>,
    source: &SourceFile,
    skipped: &mut Vec<SkippedSource>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_schema_mismatch() => {
            warn!(year = source.year, kind = %source.kind, error = %e, "skipping source year");
            SourcesMetrics::record_skipped(&source.kind.to_string());
            skipped.push(SkippedSource {
                year: source.year,
                kind: source.kind,
                file: file_label(source),
                reason: e.to_string(),
            });
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn load_normalized(source: &SourceFile, schema: &TableSchema) -> Result<Table> {
    let table = load_table(&source.path, schema)?.with_name(source.relation_name());
    let table = normalize_table(&table, schema)?;
    SourcesMetrics::record_loaded(&source.kind.to_string(), table.len());
    Ok(table)
}

/// Load every score file. Era A files are normalized on their own; Era B files
/// are paired by year and a year is only kept when both halves load.
#[instrument(skip_all, fields(files = files.len()))]
pub fn load_score_sources(files: &[SourceFile]) -> Result<ScoreSources> {
    let mut out = ScoreSources::default();
    let mut halves: BTreeMap<i64, (Option<&SourceFile>, Option<&SourceFile>)> = BTreeMap::new();

    for source in files {
        match source.kind {
            SourceKind::CombinedScores => {
                let loaded = skip_on_mismatch(load_normalized(source, &SCORE_TABLE), source, &mut out.skipped)?;
                out.combined.extend(loaded);
            }
            SourceKind::JuryScores | SourceKind::TelevoteScores if source.year < SPLIT_SCORES_FIRST_YEAR => {
                let reason = format!("split scores start in {SPLIT_SCORES_FIRST_YEAR}");
                record_skipped_half(&mut out.skipped, source, &reason);
            }
            SourceKind::JuryScores | SourceKind::TelevoteScores => {
                let entry = halves.entry(source.year).or_default();
                let slot = if source.kind == SourceKind::JuryScores {
                    &mut entry.0
                } else {
                    &mut entry.1
                };
                if slot.is_some() {
                    return Err(PipelineError::Config(format!(
                        "more than one {} table for {}",
                        source.kind, source.year
                    )));
                }
                *slot = Some(source);
            }
            SourceKind::Songs => {
                return Err(PipelineError::Config(format!(
                    "song table '{}' listed as a score source",
                    source.path.display()
                )))
            }
        }
    }

    for (year, pair) in halves {
        match pair {
            (Some(jury), Some(televote)) => {
                let j = skip_on_mismatch(load_normalized(jury, &SPLIT_SCORE_TABLE), jury, &mut out.skipped)?;
                let t = skip_on_mismatch(
                    load_normalized(televote, &SPLIT_SCORE_TABLE),
                    televote,
                    &mut out.skipped,
                )?;
                match (j, t) {
                    (Some(jury), Some(televote)) => out.split.push(SplitYear { year, jury, televote }),
                    (Some(_), None) => record_skipped_half(&mut out.skipped, jury, "televote table was skipped"),
                    (None, Some(_)) => record_skipped_half(&mut out.skipped, televote, "jury table was skipped"),
                    (None, None) => {}
                }
            }
            (Some(lone), None) => record_skipped_half(&mut out.skipped, lone, "no televote table for this year"),
            (None, Some(lone)) => record_skipped_half(&mut out.skipped, lone, "no jury table for this year"),
            (None, None) => {}
        }
    }

    info!(
        combined = out.combined.len(),
        split = out.split.len(),
        skipped = out.skipped.len(),
        "score sources loaded"
    );
    Ok(out)
}

fn record_skipped_half(skipped: &mut Vec<SkippedSource>, source: &SourceFile, reason: &str) {
    warn!(year = source.year, kind = %source.kind, reason, "skipping split-year half");
    SourcesMetrics::record_skipped(&source.kind.to_string());
    skipped.push(SkippedSource {
        year: source.year,
        kind: source.kind,
        file: file_label(source),
        reason: reason.to_string(),
    });
}

/// Load the yearly song tables. They are typed here and cleaned by the merger.
#[instrument(skip_all, fields(files = files.len()))]
pub fn load_song_sources(files: &[SourceFile]) -> Result<SongSources> {
    let mut out = SongSources::default();
    for source in files {
        let loaded = load_table(&source.path, &SONG_TABLE).map(|t| t.with_name(source.relation_name()));
        if let Some(table) = skip_on_mismatch(loaded, source, &mut out.skipped)? {
            SourcesMetrics::record_loaded(&source.kind.to_string(), table.len());
            out.tables.push(table);
        }
    }
    info!(tables = out.tables.len(), skipped = out.skipped.len(), "song sources loaded");
    Ok(out)
}

/// Load and clean the 2009+ song sheet.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_song_sheet(path: &Path, known_bad_rows: &BTreeSet<usize>) -> Result<Table> {
    let sheet = load_table(path, &SONG_SHEET)?;
    SourcesMetrics::record_loaded("song sheet", sheet.len());
    clean_song_sheet(sheet, known_bad_rows)
}

pub fn load_prediction_input(path: &Path) -> Result<Table> {
    let input = load_table(path, &PREDICTION_INPUT)?;
    SourcesMetrics::record_loaded("prediction input", input.len());
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingestion::catalog::discover_score_files;
    use crate::pipeline::processing::merge::merge_combined_years;
    use polars::prelude::AnyValue;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_combined_year_is_normalized() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2015.csv", "Country,Total score,Norway[a],Year\nSweden,12,12,2015\nMalta,,,2015\n");
        let files = discover_score_files(dir.path()).unwrap();
        let loaded = load_score_sources(&files).unwrap();
        let table = &loaded.combined[0];
        assert_eq!(table.name(), "scores_2015");
        assert!(table.has_column("Norway"));
        assert_eq!(table.cell(1, "Norway"), Some(AnyValue::Int64(0)));
    }

    #[test]
    fn test_combined_year_may_name_contestants() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2014.csv", "Country,Norway,Year\nSweden,12,2014\n");
        write(dir.path(), "2015.csv", "Contestants,Norway,Year\nSweden,12,2015\n");
        let files = discover_score_files(dir.path()).unwrap();
        let loaded = load_score_sources(&files).unwrap();
        assert!(loaded.skipped.is_empty());
        let merged = merge_combined_years(&loaded.combined).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.cell(1, "country"), Some(AnyValue::String("Sweden")));
    }

    #[test]
    fn test_split_files_before_split_era_are_skipped() {
        let dir = TempDir::new().unwrap();
        let half = "Contestants,Norway,Year\nSweden,5,2015\n";
        write(dir.path(), "2015_juryvote.csv", half);
        write(dir.path(), "2015_televote.csv", half);
        let files = discover_score_files(dir.path()).unwrap();
        let loaded = load_score_sources(&files).unwrap();
        assert!(loaded.split.is_empty());
        assert_eq!(loaded.skipped.len(), 2);
        assert!(loaded.skipped.iter().all(|s| s.year == 2015 && s.reason.contains("2016")));
    }

    #[test]
    fn test_schema_mismatch_year_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2014.csv", "Norway,Year\n12,2014\n");
        write(dir.path(), "2015.csv", "Country,Norway,Year\nSweden,12,2015\n");
        let files = discover_score_files(dir.path()).unwrap();
        let loaded = load_score_sources(&files).unwrap();
        assert_eq!(loaded.combined.len(), 1);
        assert_eq!(loaded.skipped.len(), 1);
        assert_eq!(loaded.skipped[0].year, 2014);
    }

    #[test]
    fn test_split_year_needs_both_halves() {
        let dir = TempDir::new().unwrap();
        let half = "Contestants,Jury score,Norway,Year\nSweden,5,5,2016\n";
        write(dir.path(), "2016_juryvote.csv", half);
        write(dir.path(), "2016_televote.csv", &half.replace("Jury score", "Televoting score"));
        write(dir.path(), "2017_juryvote.csv", "Contestants,Norway,Year\nItaly,1,2017\n");
        write(dir.path(), "2017_televote.csv", "Norway,Year\n1,2017\n");
        write(dir.path(), "2018_juryvote.csv", "Contestants,Norway,Year\nIsrael,1,2018\n");

        let files = discover_score_files(dir.path()).unwrap();
        let loaded = load_score_sources(&files).unwrap();
        assert_eq!(loaded.split.len(), 1);
        assert_eq!(loaded.split[0].year, 2016);
        assert_eq!(loaded.split[0].jury.name(), "scores_2016_jury");

        let skipped: Vec<(i64, SourceKind)> = loaded.skipped.iter().map(|s| (s.year, s.kind)).collect();
        assert_eq!(
            skipped,
            vec![
                (2017, SourceKind::TelevoteScores),
                (2017, SourceKind::JuryScores),
                (2018, SourceKind::JuryScores),
            ]
        );
    }

    #[test]
    fn test_coercion_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2015.csv", "Country,Norway,Year\nSweden,twelve,2015\n");
        let files = discover_score_files(dir.path()).unwrap();
        assert!(matches!(
            load_score_sources(&files),
            Err(PipelineError::Coercion { .. })
        ));
    }
}
