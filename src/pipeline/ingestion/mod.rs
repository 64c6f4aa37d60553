// Pipeline ingestion: source discovery and schema-checked loading

pub mod catalog;
pub mod loader;

pub use catalog::{discover_score_files, discover_song_files, extract_year, SourceFile, SourceKind};
pub use loader::{
    load_prediction_input, load_score_sources, load_song_sheet, load_song_sources, load_table,
    ScoreSources, SkippedSource, SongSources,
};
