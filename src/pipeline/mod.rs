// Data processing pipeline: ingestion, processing, storage and orchestration

pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod storage;

pub use orchestrator::{persist_all, sinks_from_config, write_run_artifacts, Dataset, Pipeline, PipelineReport, RelationSummary};
pub use storage::{CsvDirSink, InMemorySink, PreparedWrite, RelationSink, SqliteSink};
