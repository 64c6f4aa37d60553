// Persistence of the assembled relations

pub mod csv_dir;
pub mod in_memory;
pub mod sqlite;

pub use csv_dir::CsvDirSink;
pub use in_memory::InMemorySink;
pub use sqlite::SqliteSink;

use std::collections::HashSet;

use crate::error::{PipelineError, Result};
use crate::table::Table;

/// Destination for a run's relations.
///
/// Writing is split in two so several sinks can agree before any of them changes:
/// `prepare` stages every relation without touching what is already persisted,
/// and committing the returned write replaces the previous contents as a whole.
pub trait RelationSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(&self, relations: &[Table]) -> Result<Box<dyn PreparedWrite + '_>>;

    /// Prepare and commit in one step.
    fn persist(&self, relations: &[Table]) -> Result<()> {
        self.prepare(relations)?.commit()
    }
}

/// A staged write. Dropping it without committing discards the staged data.
pub trait PreparedWrite {
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Relation names become file and table names; they must be unique and non-empty.
pub(crate) fn check_relation_names(relations: &[Table]) -> Result<()> {
    let mut seen = HashSet::new();
    for table in relations {
        if table.name().trim().is_empty() {
            return Err(PipelineError::Config("relation without a name".to_string()));
        }
        if !seen.insert(table.name()) {
            return Err(PipelineError::Config(format!(
                "relation '{}' appears twice in one run",
                table.name()
            )));
        }
    }
    Ok(())
}
