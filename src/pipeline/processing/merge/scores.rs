use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::identity::assign_entity_ids;
use crate::table::{value_text, Table};

/// The jury and televote halves of one split-scoring year, already normalized.
#[derive(Debug, Clone)]
pub struct SplitYear {
    pub year: i64,
    pub jury: Table,
    pub televote: Table,
}

/// Era A: combined per-year score tables, concatenated in year order.
#[instrument(skip_all, fields(tables = tables.len()))]
pub fn merge_combined_years(tables: &[Table]) -> Result<Table> {
    let renamed = tables
        .iter()
        .map(|t| t.clone().drop_columns(&[PANDAS_INDEX, TOTAL_SCORE])?.rename(ERA_A_RENAMES))
        .collect::<Result<Vec<_>>>()?;
    let merged = Table::concat("scores_combined", &renamed)?;
    info!(rows = merged.len(), "merged combined score years");
    Ok(merged)
}

/// Era B: reconcile every year's jury and televote halves, then concatenate.
#[instrument(skip_all, fields(years = years.len()))]
pub fn merge_split_years(years: &[SplitYear]) -> Result<Table> {
    let reconciled = years
        .iter()
        .map(|y| {
            let jury = y.jury.clone().drop_columns(&[PANDAS_INDEX])?;
            let televote = y.televote.clone().drop_columns(&[PANDAS_INDEX])?;
            let summed = reconcile_split_year_tables(y.year, &jury, &televote)?;
            debug!(year = y.year, rows = summed.len(), "reconciled split year");
            summed.rename(ERA_B_RENAMES)
        })
        .collect::<Result<Vec<_>>>()?;
    let merged = Table::concat("scores_split", &reconciled)?;
    info!(rows = merged.len(), "merged split score years");
    Ok(merged)
}

/// Add a jury table and a televote table value by value.
///
/// The two tables must describe the same contestants in the same order with the
/// same columns once their aggregate columns are dropped. Summing turns every text
/// value into its own concatenation and doubles the year, so the contestant names
/// and years are then recovered by halving. Inputs violating the precondition
/// are rejected instead of being summed into plausible-looking garbage.
pub fn reconcile_split_year_tables(year: i64, jury: &Table, televote: &Table) -> Result<Table> {
    let jury = jury.clone().drop_columns(SPLIT_AGGREGATE_COLUMNS)?;
    let televote = televote.clone().drop_columns(SPLIT_AGGREGATE_COLUMNS)?;
    check_alignment(year, &jury, &televote)?;
    let summed = sum_aligned_tables(year, &jury, &televote)?;
    recover_doubled_keys(year, summed, CONTESTANTS, YEAR)
}

fn misaligned(year: i64, jury: &Table, televote: &Table, detail: impl std::fmt::Display) -> PipelineError {
    PipelineError::Misaligned {
        year,
        detail: format!("'{}' vs '{}': {detail}", jury.name(), televote.name()),
    }
}

fn check_alignment(year: i64, jury: &Table, televote: &Table) -> Result<()> {
    if jury.len() != televote.len() {
        return Err(misaligned(
            year,
            jury,
            televote,
            format!("{} jury rows vs {} televote rows", jury.len(), televote.len()),
        ));
    }
    let jury_cols: BTreeSet<String> = jury.columns().into_iter().collect();
    let televote_cols: BTreeSet<String> = televote.columns().into_iter().collect();
    if jury_cols != televote_cols {
        let only_jury: Vec<_> = jury_cols.difference(&televote_cols).collect();
        let only_televote: Vec<_> = televote_cols.difference(&jury_cols).collect();
        return Err(misaligned(
            year,
            jury,
            televote,
            format!("columns only in jury {only_jury:?}, only in televote {only_televote:?}"),
        ));
    }
    for key in [CONTESTANTS, YEAR] {
        let j = jury.series(key)?;
        let t = televote.series(key)?;
        for row in 0..jury.len() {
            let (a, b) = (value_text(&j.get(row)?), value_text(&t.get(row)?));
            if a != b {
                return Err(misaligned(
                    year,
                    jury,
                    televote,
                    format!("row {row}: jury {key} '{a}' vs televote '{b}'"),
                ));
            }
        }
    }
    Ok(())
}

/// Value-by-value sum of two tables with identical row order and column sets.
/// Integers add (overflow is an error), text concatenates, missing absorbs.
/// Columns are matched by name and keep the jury table's order.
fn sum_aligned_tables(year: i64, jury: &Table, televote: &Table) -> Result<Table> {
    let columns = jury
        .columns()
        .iter()
        .map(|column| {
            let j = jury.series(column)?;
            let t = televote.series(column)?;
            match (j.dtype(), t.dtype()) {
                (DataType::Int64, DataType::Int64) => {
                    let summed = j
                        .i64()?
                        .into_iter()
                        .zip(t.i64()?)
                        .enumerate()
                        .map(|(row, pair)| match pair {
                            (Some(a), Some(b)) => a.checked_add(b).map(Some).ok_or_else(|| {
                                misaligned(year, jury, televote, format!("row {row}, column '{column}': {a} + {b} overflows"))
                            }),
                            _ => Ok(None),
                        })
                        .collect::<Result<Vec<Option<i64>>>>()?;
                    Ok(Series::new(column.as_str().into(), summed))
                }
                (DataType::String, DataType::String) => {
                    let joined: StringChunked = j
                        .str()?
                        .into_iter()
                        .zip(t.str()?)
                        .map(|pair| match pair {
                            (Some(a), Some(b)) => Some(format!("{a}{b}")),
                            _ => None,
                        })
                        .collect();
                    Ok(joined.with_name(column.as_str().into()).into_series())
                }
                (a, b) => Err(misaligned(
                    year,
                    jury,
                    televote,
                    format!("column '{column}': cannot add {a} and {b}"),
                )),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Table::from_series("scores_split", columns)
}

/// Undo the doubling left by summing: keep the first half of each contestant
/// string and half of each year. Anything that is not an exact doubling fails.
pub fn recover_doubled_keys(year: i64, table: Table, contestant_column: &str, year_column: &str) -> Result<Table> {
    let not_doubled = |detail: String| PipelineError::Misaligned { year, detail };

    let contestants = table.series(contestant_column)?;
    let names = match contestants.dtype() {
        DataType::String => contestants.str()?,
        other => return Err(not_doubled(format!("contestant column is {other}, not text"))),
    };
    let halved = names
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            let s = v.unwrap_or_default();
            let chars: Vec<char> = s.chars().collect();
            let (first, second) = chars.split_at(chars.len() / 2);
            if first != second {
                return Err(not_doubled(format!("row {row}: contestant '{s}' is not a doubled name")));
            }
            Ok(first.iter().collect::<String>())
        })
        .collect::<Result<Vec<String>>>()?;

    let years = table.series(year_column)?;
    let doubled_years = years.i64().map_err(|_| not_doubled(format!("year column is {}", years.dtype())))?;
    let halved_years = doubled_years
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(doubled) if doubled % 2 == 0 => Ok(doubled / 2),
            _ => Err(not_doubled(format!(
                "row {row}: year '{}' is not the sum of two equal years",
                v.map(|y| y.to_string()).unwrap_or_default()
            ))),
        })
        .collect::<Result<Vec<i64>>>()?;

    table
        .with_series(Series::new(contestant_column.into(), halved))?
        .with_series(Series::new(year_column.into(), halved_years))
}

/// Union both eras, zero-fill the gaps and prepend the score id.
#[instrument(skip_all)]
pub fn unify_scores(combined: Table, split: Table) -> Result<Table> {
    let unified = Table::concat(SCORES_RELATION, &[combined, split])?.fill_missing_with_zero()?;
    let unified = assign_entity_ids(unified, C_YEAR, C_COUNTRY, SCORE_ID)?;
    info!(rows = unified.len(), columns = unified.width(), "unified score table");
    Ok(unified)
}
