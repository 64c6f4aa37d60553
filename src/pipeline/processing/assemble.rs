use polars::prelude::*;
use tracing::{info, instrument, warn};

use super::fixers::canonicalize_language;
use super::identity::assign_entity_ids;
use crate::constants::*;
use crate::domain::{FeaturesView, OverviewView};
use crate::error::{PipelineError, Result};
use crate::table::{map_text, Rounding, Table};

/// Convert every float column left over from upstream arithmetic.
pub fn coerce_floats(table: Table, rounding: Rounding) -> Result<Table> {
    table.map_series(|series| rounding.apply_series(series))
}

/// Identity and descriptive projection of the unified song table. Rows without a
/// language are dropped; language values are canonicalized.
#[instrument(skip_all, fields(rows = songs.len()))]
pub fn assemble_overview(songs: &Table) -> Result<OverviewView> {
    let overview = songs.select(OVERVIEW_COLUMNS)?.with_name(OVERVIEW_RELATION);
    let has_language = overview.series(LANGUAGE)?.is_not_null();
    let before = overview.len();
    let overview = overview.filter(&has_language)?;
    if overview.len() < before {
        warn!(dropped = before - overview.len(), "entries without a language left out of the overview");
    }
    let overview = overview.map_column(LANGUAGE, |series| {
        map_text(series, |v| v.map(canonicalize_language))
    })?;
    let overview = coerce_floats(overview, Rounding::Truncate)?;
    OverviewView::from_table(&overview)
}

/// Extended feature projection, limited to the editions that carry features.
#[instrument(skip_all, fields(rows = songs.len()))]
pub fn assemble_features(songs: &Table) -> Result<FeaturesView> {
    let features = songs
        .clone()
        .with_name(FEATURES_RELATION)
        .drop_columns(FEATURES_EXCLUDED_COLUMNS)?;
    let covered: BooleanChunked = features
        .series(C_YEAR)?
        .i64()?
        .into_iter()
        .map(|y| matches!(y, Some(y) if y >= SONG_SHEET_FIRST_YEAR))
        .collect();
    let features = features.filter(&covered)?;
    let features = coerce_floats(features, Rounding::Truncate)?;
    FeaturesView::new(features)
}

/// Both song views.
pub fn assemble_views(songs: &Table) -> Result<(OverviewView, FeaturesView)> {
    let overview = assemble_overview(songs)?;
    let features = assemble_features(songs)?;
    info!(overview = overview.len(), features = features.len(), "assembled song views");
    Ok((overview, features))
}

/// The persisted score relation: the id plus integer score columns.
pub fn scores_relation(unified: &Table) -> Result<Table> {
    let scores = unified
        .clone()
        .with_name(SCORES_RELATION)
        .drop_columns(&[C_COUNTRY, C_YEAR])?;
    coerce_floats(scores, Rounding::Truncate)
}

/// Shape the upcoming edition's entries like the features view so a trained model
/// can score them. Every feature column except the id must be present.
pub fn align_prediction_input(input: Table, features: &FeaturesView) -> Result<Table> {
    let feature_columns = features.columns();
    let missing: Vec<&str> = feature_columns
        .iter()
        .map(String::as_str)
        .filter(|c| *c != ID && !input.has_column(c))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema_mismatch(
            input.name(),
            format!("prediction input lacks feature columns {missing:?}"),
        ));
    }
    let input = if input.has_column(ID) {
        input
    } else {
        assign_entity_ids(input, C_YEAR, C_COUNTRY, ID)?
    };
    let columns: Vec<&str> = feature_columns.iter().map(String::as_str).collect();
    let aligned = input.select(&columns)?.with_name(PREDICTION_RELATION);
    coerce_floats(aligned, Rounding::Truncate)
}
