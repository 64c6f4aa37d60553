use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{check_relation_names, PreparedWrite, RelationSink};
use crate::error::{PipelineError, Result};
use crate::metrics::SinkMetrics;
use crate::table::csv_io::write_table_to_path;
use crate::table::Table;

/// Writes each relation to `<dir>/<relation>.csv`.
///
/// Files are written into a sibling staging directory when the write is prepared;
/// committing replaces `dir` with it.
pub struct CsvDirSink {
    dir: PathBuf,
}

impl CsvDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sibling(&self, tag: &str) -> Result<PathBuf> {
        let file_name = self
            .dir
            .file_name()
            .ok_or_else(|| PipelineError::Config(format!("invalid output directory '{}'", self.dir.display())))?;
        let name = format!(".{}.{}-{}", file_name.to_string_lossy(), tag, Uuid::new_v4().simple());
        Ok(self.dir.with_file_name(name))
    }

    fn write_staging(staging: &Path, relations: &[Table]) -> Result<()> {
        fs::create_dir_all(staging)?;
        for table in relations {
            write_table_to_path(table, &staging.join(format!("{}.csv", table.name())))?;
        }
        Ok(())
    }

    /// Move the staging directory into place, keeping the old output until the move succeeds.
    fn swap_in(&self, staging: &Path) -> Result<()> {
        if !self.dir.exists() {
            fs::rename(staging, &self.dir)?;
            return Ok(());
        }
        let backup = self.sibling("previous")?;
        fs::rename(&self.dir, &backup)?;
        if let Err(e) = fs::rename(staging, &self.dir) {
            fs::rename(&backup, &self.dir)?;
            return Err(e.into());
        }
        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!(path = %backup.display(), error = %e, "could not remove previous output");
        }
        Ok(())
    }
}

/// Relations written to a staging directory, waiting to replace the output.
struct StagedCsv<'a> {
    sink: &'a CsvDirSink,
    staging: PathBuf,
    relations: usize,
    rows: usize,
    started: Instant,
    committed: bool,
}

impl PreparedWrite for StagedCsv<'_> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.sink.swap_in(&self.staging)?;
        self.committed = true;
        SinkMetrics::record_persisted("csv", self.relations, self.rows, self.started.elapsed().as_secs_f64());
        info!(dir = %self.sink.dir.display(), rows = self.rows, "relations written as csv");
        Ok(())
    }
}

impl Drop for StagedCsv<'_> {
    fn drop(&mut self) {
        if self.committed || !self.staging.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.staging) {
            warn!(path = %self.staging.display(), error = %e, "could not remove staging directory");
        }
    }
}

impl RelationSink for CsvDirSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    #[instrument(skip_all, fields(dir = %self.dir.display(), relations = relations.len()))]
    fn prepare(&self, relations: &[Table]) -> Result<Box<dyn PreparedWrite + '_>> {
        check_relation_names(relations)?;
        let started = Instant::now();
        if let Some(parent) = self.dir.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let staged = StagedCsv {
            sink: self,
            staging: self.sibling("staging")?,
            relations: relations.len(),
            rows: relations.iter().map(Table::len).sum(),
            started,
            committed: false,
        };
        // On failure the staged write is dropped, which removes the partial staging dir.
        Self::write_staging(&staged.staging, relations)?;
        Ok(Box::new(staged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use tempfile::TempDir;

    fn header_only(name: &str, columns: &[&str]) -> Table {
        let series = columns.iter().map(|c| Series::new((*c).into(), Vec::<i64>::new())).collect();
        Table::from_series(name, series).unwrap()
    }

    #[test]
    fn test_writes_one_file_per_relation() {
        let root = TempDir::new().unwrap();
        let sink = CsvDirSink::new(root.path().join("out"));
        let a = Table::new("song_overview", df!("id" => ["2016Sweden"], "year" => [2016i64]).unwrap());
        sink.persist(&[a]).unwrap();
        let content = fs::read_to_string(root.path().join("out").join("song_overview.csv")).unwrap();
        assert_eq!(content, "id,year\n2016Sweden,2016\n");
    }

    #[test]
    fn test_previous_output_replaced_as_a_whole() {
        let root = TempDir::new().unwrap();
        let out = root.path().join("out");
        let sink = CsvDirSink::new(&out);
        sink.persist(&[header_only("old", &["x"]), header_only("kept", &["x"])]).unwrap();
        sink.persist(&[header_only("kept", &["y"])]).unwrap();
        assert!(!out.join("old.csv").exists());
        assert_eq!(fs::read_to_string(out.join("kept.csv")).unwrap(), "y\n");
        let leftovers = fs::read_dir(root.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_failure_leaves_previous_output() {
        let root = TempDir::new().unwrap();
        let out = root.path().join("out");
        let sink = CsvDirSink::new(&out);
        sink.persist(&[header_only("song_overview", &["id"])]).unwrap();

        // A relation name with a path separator cannot be written inside the staging dir.
        let bad = header_only("missing/dir/relation", &["id"]);
        let err = sink.persist(&[header_only("song_overview", &["id", "year"]), bad]);
        assert!(err.is_err());
        assert_eq!(fs::read_to_string(out.join("song_overview.csv")).unwrap(), "id\n");
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_dropped_write_is_cleaned_up() {
        let root = TempDir::new().unwrap();
        let sink = CsvDirSink::new(root.path().join("out"));
        let staged = sink.prepare(&[header_only("song_overview", &["id"])]).unwrap();
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
        drop(staged);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
