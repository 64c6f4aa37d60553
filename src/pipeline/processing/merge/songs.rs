use polars::prelude::*;
use tracing::{info, instrument};

use crate::constants::*;
use crate::error::Result;
use crate::pipeline::processing::fixers::{fix_country_names, replace_placeholders};
use crate::pipeline::processing::identity::assign_entity_ids;
use crate::pipeline::processing::normalize::coerce_columns;
use crate::table::Table;

/// Concatenate the yearly song tables and keep the editions the song sheet does
/// not cover, renamed to the sheet's vocabulary.
#[instrument(skip_all, fields(tables = tables.len()))]
pub fn merge_yearly_song_tables(tables: &[Table]) -> Result<Table> {
    let prepared = tables.iter().cloned().map(prepare_yearly).collect::<Result<Vec<_>>>()?;
    let merged = Table::concat("songs_yearly", &prepared)?;
    if merged.is_empty() {
        return merged.rename(SONG_TABLE_RENAMES);
    }

    let early: BooleanChunked = merged
        .series(YEAR)?
        .i64()?
        .into_iter()
        .map(|y| matches!(y, Some(y) if y < SONG_SHEET_FIRST_YEAR))
        .collect();
    let early = merged.filter(&early)?.rename(SONG_TABLE_RENAMES)?;
    info!(rows = early.len(), "merged yearly song tables");
    Ok(early)
}

/// Bring one year onto the shared layout so the concatenation agrees on types.
fn prepare_yearly(table: Table) -> Result<Table> {
    let table = table.drop_columns(&[PANDAS_INDEX, POINTS])?;
    let table = ensure_column(table, PLACE)?;
    let table = ensure_column(table, ORDER)?;
    let table = replace_placeholders(table, &[PLACE, ORDER])?;
    coerce_columns(table, &[YEAR, PLACE, ORDER])
}

/// Some early layouts have no placing or draw column at all.
fn ensure_column(table: Table, column: &str) -> Result<Table> {
    if table.has_column(column) {
        return Ok(table);
    }
    let zeros = Series::new(column.into(), vec![0i64; table.len()]);
    table.with_series(zeros)
}

/// Union the early song rows with the cleaned sheet and key every row.
#[instrument(skip_all, fields(early = early.len(), sheet = sheet.len()))]
pub fn unify_songs(early: Table, sheet: Table) -> Result<Table> {
    let songs = Table::concat("songs", &[early, sheet])?.drop_columns(UNIFIED_SONG_DROPPED_COLUMNS)?;
    let songs = coerce_columns(songs, &[FINAL_PLACE, FINAL_DRAW_POSITION])?;
    let songs = fix_country_names(songs, C_COUNTRY)?;
    let songs = assign_entity_ids(songs, C_YEAR, C_COUNTRY, ID)?;
    info!(rows = songs.len(), "unified song table");
    Ok(songs)
}
