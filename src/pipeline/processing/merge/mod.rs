//! Reconciliation of the historical table layouts into one table per entity.

pub mod scores;
pub mod songs;

pub use scores::{
    merge_combined_years, merge_split_years, reconcile_split_year_tables, unify_scores, SplitYear,
};
pub use songs::{merge_yearly_song_tables, unify_songs};
