//! Runs the stages in order and hands the assembled relations to the sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, info_span, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::constants::{METRICS_FILE, OVERVIEW_RELATION, RUN_REPORT_FILE, SONGS_CLEANED_RELATION};
use crate::domain::{FeaturesView, OverviewView, YearRecord};
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::pipeline::ingestion::{
    discover_score_files, discover_song_files, load_prediction_input, load_score_sources, load_song_sheet,
    load_song_sources, ScoreSources, SkippedSource, SongSources,
};
use crate::pipeline::processing::merge::{merge_combined_years, merge_split_years, merge_yearly_song_tables, unify_scores, unify_songs};
use crate::pipeline::processing::{align_prediction_input, assemble_views, scores_relation};
use crate::pipeline::storage::{CsvDirSink, RelationSink, SqliteSink};
use crate::table::csv_io::write_table;
use crate::table::Table;

/// Everything one run produces, before persistence.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub overview: OverviewView,
    pub features: FeaturesView,
    /// Id plus integer score columns.
    pub scores: Table,
    pub songs_cleaned: Table,
    pub prediction_input: Option<Table>,
    /// Cleaned per-year source tables, in year order.
    pub cleaned_years: Vec<Table>,
    pub skipped: Vec<SkippedSource>,
}

impl Dataset {
    /// Every relation to persist, named as they are stored.
    pub fn relations(&self) -> Result<Vec<Table>> {
        let mut relations = vec![
            self.overview.to_table(OVERVIEW_RELATION)?,
            self.features.table().clone(),
            self.scores.clone(),
            self.songs_cleaned.clone().with_name(SONGS_CLEANED_RELATION),
        ];
        relations.extend(self.prediction_input.iter().cloned());
        relations.extend(self.cleaned_years.iter().cloned());
        Ok(relations)
    }
}

/// Row and content summary of one persisted relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSummary {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    /// SHA-256 of the relation's CSV rendering.
    pub sha256: String,
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub relations: Vec<RelationSummary>,
    pub skipped: Vec<SkippedSource>,
    pub sinks: Vec<String>,
}

impl PipelineReport {
    pub fn relation(&self, name: &str) -> Option<&RelationSummary> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn total_rows(&self) -> usize {
        self.relations.iter().map(|r| r.rows).sum()
    }
}

/// Hex SHA-256 of the CSV rendering, for output-parity checks between runs.
pub fn relation_digest(table: &Table) -> Result<String> {
    let mut buf = Vec::new();
    write_table(table, &mut buf)?;
    Ok(hex::encode(Sha256::digest(&buf)))
}

fn summarize(relations: &[Table]) -> Result<Vec<RelationSummary>> {
    relations
        .iter()
        .map(|t| {
            Ok(RelationSummary {
                name: t.name().to_string(),
                rows: t.len(),
                columns: t.columns().len(),
                sha256: relation_digest(t)?,
            })
        })
        .collect()
}

/// Time a stage, record its metrics and tag any failure with the stage name.
fn stage<T, F>(name: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<(T, usize)>,
{
    let span = info_span!("stage", stage = name);
    let _enter = span.enter();
    let started = Instant::now();
    match f() {
        Ok((value, rows)) => {
            let secs = started.elapsed().as_secs_f64();
            StageMetrics::record_stage(name, rows, secs);
            info!(rows, duration_secs = secs, "stage finished");
            Ok(value)
        }
        Err(e) => {
            StageMetrics::record_failure(name);
            error!(error = %e, "stage failed");
            Err(PipelineError::Stage {
                stage: name,
                source: Box::new(e),
            })
        }
    }
}

/// Build the sinks the configuration asks for.
pub fn sinks_from_config(config: &Config) -> Vec<Box<dyn RelationSink>> {
    let mut sinks: Vec<Box<dyn RelationSink>> = Vec::new();
    if config.database.enabled {
        sinks.push(Box::new(SqliteSink::new(config.database.clone())));
    }
    if config.output.write_csv {
        sinks.push(Box::new(CsvDirSink::new(config.output.dir.clone())));
    }
    sinks
}

/// Stage the relations in every sink, then commit them. A sink that fails to
/// prepare leaves every sink as it was.
pub fn persist_all(sinks: &[Box<dyn RelationSink>], relations: &[Table]) -> Result<()> {
    let prepared = sinks
        .iter()
        .map(|sink| {
            let write = sink.prepare(relations)?;
            debug!(sink = sink.name(), "relations staged");
            Ok((sink.name(), write))
        })
        .collect::<Result<Vec<_>>>()?;
    for (name, write) in prepared {
        write.commit()?;
        info!(sink = name, "relations persisted");
    }
    Ok(())
}

/// Write `run_report.json` and the metrics snapshot into `dir`.
pub fn write_run_artifacts(report: &PipelineReport, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let file = fs::File::create(dir.join(RUN_REPORT_FILE))?;
    serde_json::to_writer_pretty(file, report)?;
    if let Some(rendered) = crate::metrics::render() {
        fs::write(dir.join(METRICS_FILE), rendered)?;
    }
    Ok(())
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load and clean the song sheet only.
    pub fn clean(&self) -> Result<Table> {
        let known_bad_rows = self.config.known_bad_rows();
        stage("clean_song_sheet", || {
            let sheet = load_song_sheet(&self.config.sources.song_sheet, &known_bad_rows)?;
            let rows = sheet.len();
            Ok((sheet.with_name(SONGS_CLEANED_RELATION), rows))
        })
    }

    /// Run every stage up to, but not including, persistence.
    #[instrument(skip_all)]
    pub fn build(&self) -> Result<Dataset> {
        let sources = &self.config.sources;

        let (scores_in, songs_in): (ScoreSources, SongSources) = stage("load_sources", || {
            let scores = load_score_sources(&discover_score_files(&sources.scores_dir)?)?;
            let songs = load_song_sources(&discover_song_files(&sources.songs_dir)?)?;
            let rows = scores.combined.iter().map(Table::len).sum::<usize>()
                + scores.split.iter().map(|y| y.jury.len()).sum::<usize>()
                + songs.tables.iter().map(Table::len).sum::<usize>();
            Ok(((scores, songs), rows))
        })?;

        let songs_cleaned = self.clean()?;

        let scores = stage("merge_scores", || {
            let combined = merge_combined_years(&scores_in.combined)?;
            let split = merge_split_years(&scores_in.split)?;
            let unified = unify_scores(combined, split)?;
            // Enforces the non-negative integer invariant on every score.
            YearRecord::from_table(&unified)?;
            let scores = scores_relation(&unified)?;
            let rows = scores.len();
            Ok((scores, rows))
        })?;

        let songs = stage("merge_songs", || {
            let early = merge_yearly_song_tables(&songs_in.tables)?;
            let songs = unify_songs(early, songs_cleaned.clone())?;
            let rows = songs.len();
            Ok((songs, rows))
        })?;

        let (overview, features, prediction_input) = stage("assemble", || {
            let (overview, features) = assemble_views(&songs)?;
            let prediction_input = match &sources.prediction_input {
                Some(path) => Some(align_prediction_input(load_prediction_input(path)?, &features)?),
                None => None,
            };
            let rows = overview.len() + features.len();
            Ok(((overview, features, prediction_input), rows))
        })?;

        let mut cleaned_years = scores_in.combined;
        for year in scores_in.split {
            cleaned_years.push(year.jury);
            cleaned_years.push(year.televote);
        }
        cleaned_years.extend(songs_in.tables);

        let mut skipped = scores_in.skipped;
        skipped.extend(songs_in.skipped);

        Ok(Dataset {
            overview,
            features,
            scores,
            songs_cleaned,
            prediction_input,
            cleaned_years,
            skipped,
        })
    }

    /// Build the dataset and persist it to every sink. Nothing is persisted when
    /// any stage fails or any sink cannot stage the relations.
    pub fn run(&self, sinks: &[Box<dyn RelationSink>]) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "pipeline run started");

        let dataset = self.build()?;
        let relations = dataset.relations()?;
        let summaries = summarize(&relations)?;

        stage("persist", || {
            persist_all(sinks, &relations)?;
            Ok(((), relations.iter().map(Table::len).sum()))
        })?;

        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            relations: summaries,
            skipped: dataset.skipped,
            sinks: sinks.iter().map(|s| s.name().to_string()).collect(),
        };
        info!(%run_id, relations = report.relations.len(), rows = report.total_rows(), "pipeline run finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::pipeline::storage::InMemorySink;
    use polars::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let a = Table::new("t", df!("x" => [1i64]).unwrap());
        let b = Table::new("t", df!("x" => [2i64]).unwrap());
        assert_eq!(relation_digest(&a).unwrap(), relation_digest(&a.clone()).unwrap());
        assert_ne!(relation_digest(&a).unwrap(), relation_digest(&b).unwrap());
        assert_eq!(relation_digest(&a).unwrap().len(), 64);
    }

    #[test]
    fn test_stage_wraps_errors() {
        let err = stage::<(), _>("merge_scores", || Err(PipelineError::Misaligned { year: 2016, detail: "x".into() }))
            .unwrap_err();
        match err {
            PipelineError::Stage { stage, source } => {
                assert_eq!(stage, "merge_scores");
                assert!(matches!(*source, PipelineError::Misaligned { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_sinks_follow_config() {
        let mut config = Config::default();
        assert_eq!(sinks_from_config(&config).len(), 2);
        config.database.enabled = false;
        let sinks = sinks_from_config(&config);
        assert_eq!(sinks.iter().map(|s| s.name()).collect::<Vec<_>>(), vec!["csv"]);
    }

    #[test]
    fn test_failing_sink_leaves_earlier_sinks_untouched() {
        let dir = TempDir::new().unwrap();
        let sqlite = SqliteSink::new(DatabaseConfig {
            path: dir.path().join("esc.db"),
            enabled: true,
        });
        let memory = InMemorySink::new();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();
        let sinks: Vec<Box<dyn RelationSink>> = vec![
            Box::new(SqliteSink::new(DatabaseConfig {
                path: dir.path().join("esc.db"),
                enabled: true,
            })),
            Box::new(memory.clone()),
            Box::new(CsvDirSink::new(blocker.join("out"))),
        ];
        let relations = vec![Table::new("song_overview", df!("id" => ["2016Sweden"]).unwrap())];

        assert!(persist_all(&sinks, &relations).is_err());
        assert!(sqlite.relation_names().unwrap().is_empty());
        assert!(memory.relation_names().is_empty());

        persist_all(&sinks[..2], &relations).unwrap();
        assert_eq!(sqlite.relation_names().unwrap(), vec!["song_overview"]);
        assert_eq!(memory.get("song_overview"), Some(relations[0].clone()));
    }
}
