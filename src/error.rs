use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A source table does not have the structure its schema declares.
    #[error("Schema mismatch in '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// A value that must be numeric could not be parsed.
    #[error("Cannot coerce '{value}' to an integer in '{table}', column '{column}', row {row}")]
    Coercion {
        table: String,
        column: String,
        row: usize,
        value: String,
    },

    /// Jury and televote tables do not line up row for row.
    #[error("Split-year {year} tables are misaligned: {detail}")]
    Misaligned { year: i64, detail: String },

    #[error("Missing required column '{column}' in '{table}'")]
    MissingColumn { table: String, column: String },

    #[error("Known-bad row {row} is out of range for '{table}' ({len} rows)")]
    KnownBadRow { table: String, row: usize, len: usize },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn schema_mismatch(table: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        PipelineError::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Schema mismatches on a single year's source are skipped, everything else aborts.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(
            self,
            PipelineError::SchemaMismatch { .. } | PipelineError::MissingColumn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
