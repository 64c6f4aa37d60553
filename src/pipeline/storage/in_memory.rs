use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::{check_relation_names, PreparedWrite, RelationSink};
use crate::error::Result;
use crate::table::Table;

type Relations = Arc<Mutex<BTreeMap<String, Table>>>;

/// In-memory sink for development/testing
#[derive(Clone, Default)]
pub struct InMemorySink {
    relations: Relations,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Table> {
        let relations = self.relations.lock().unwrap_or_else(PoisonError::into_inner);
        relations.get(name).cloned()
    }

    pub fn relation_names(&self) -> Vec<String> {
        let relations = self.relations.lock().unwrap_or_else(PoisonError::into_inner);
        relations.keys().cloned().collect()
    }
}

struct StagedRelations {
    target: Relations,
    replacement: BTreeMap<String, Table>,
}

impl PreparedWrite for StagedRelations {
    fn commit(self: Box<Self>) -> Result<()> {
        let mut stored = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        *stored = self.replacement;
        debug!("Stored {} relations in memory", stored.len());
        Ok(())
    }
}

impl RelationSink for InMemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn prepare(&self, relations: &[Table]) -> Result<Box<dyn PreparedWrite + '_>> {
        check_relation_names(relations)?;
        let replacement = relations
            .iter()
            .map(|t| (t.name().to_string(), t.clone()))
            .collect();
        Ok(Box::new(StagedRelations {
            target: Arc::clone(&self.relations),
            replacement,
        }))
    }
}
