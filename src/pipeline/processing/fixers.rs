//! Entity-specific value repairs.

use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

use super::normalize::coerce_integer_series;
use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::table::{map_text, Rounding, Table};

/// Loudness is always attenuation: strip a unit suffix ("-4 dB"), flip any
/// positive value, then round to the nearest integer.
pub fn normalize_loudness(raw: &str) -> Option<i64> {
    let value = raw.trim().split(' ').next()?.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    let negative = if value > 0.0 { -value } else { value };
    Some(Rounding::Nearest.apply(negative))
}

/// Strip a trailing footnote marker, e.g. `English[12]` -> `English`.
pub fn strip_footnote(value: &str) -> &str {
    value.split('[').next().unwrap_or(value).trim_end()
}

/// Canonical form of a language entry. Multi-language entries are sorted so that
/// "French, English" and "English, French" are the same combination.
pub fn canonicalize_language(raw: &str) -> String {
    let stripped = strip_footnote(raw);
    if !stripped.contains(',') {
        return stripped.to_string();
    }
    let mut parts: Vec<String> = stripped
        .split(',')
        .map(|p| p.replace('\u{a0}', " ").trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    parts.sort();
    parts.join(", ")
}

/// Replace a lone "-" with `0` in the given columns and make them integers.
/// Missing values stay missing; absent columns are ignored.
pub fn replace_placeholders(table: Table, columns: &[&str]) -> Result<Table> {
    let name = table.name().to_string();
    columns.iter().try_fold(table, |table, column| {
        if !table.has_column(column) {
            return Ok(table);
        }
        table.map_column(column, |series| {
            let replaced = if series.dtype() == &DataType::String {
                map_text(series, |v| {
                    v.map(|s| if s.trim() == PLACEHOLDER { "0".to_string() } else { s.to_string() })
                })?
            } else {
                series.clone()
            };
            coerce_integer_series(&name, &replaced, false)
        })
    })
}

pub fn fix_country_names(table: Table, column: &str) -> Result<Table> {
    table.map_column(column, |series| {
        if series.dtype() != &DataType::String {
            return Ok(series.clone());
        }
        map_text(series, |v| {
            v.map(|s| {
                COUNTRY_NAME_FIXES
                    .iter()
                    .find(|(wrong, _)| *wrong == s)
                    .map(|(_, right)| right.to_string())
                    .unwrap_or_else(|| s.to_string())
            })
        })
    })
}

/// Drop rows known to be unrecoverable. Positions refer to the table as it was
/// read, so this runs before anything else touches the rows.
pub fn drop_known_bad_rows(table: Table, positions: &BTreeSet<usize>) -> Result<Table> {
    if positions.is_empty() {
        return Ok(table);
    }
    info!(table = %table.name(), rows = ?positions, "dropping known-bad rows");
    table.drop_row_positions(positions)
}

/// Round every float column to the nearest integer and truncate the designated
/// integer columns.
pub fn sheet_dtype_pass(table: Table) -> Result<Table> {
    let name = table.name().to_string();
    table.map_series(|series| {
        if series.dtype().is_float() {
            Rounding::Nearest.apply_series(series)
        } else if SHEET_TRUNCATED_COLUMNS.contains(&series.name().as_str()) {
            coerce_integer_series(&name, series, false)
        } else {
            Ok(series.clone())
        }
    })
}

/// The cleaning pass over the hand-curated 2009+ song sheet.
#[instrument(skip_all, fields(table = %sheet.name(), rows = sheet.len()))]
pub fn clean_song_sheet(sheet: Table, known_bad_rows: &BTreeSet<usize>) -> Result<Table> {
    let name = sheet.name().to_string();
    let sheet = drop_known_bad_rows(sheet, known_bad_rows)?;
    let sheet = replace_placeholders(sheet, SHEET_PLACEHOLDER_COLUMNS)?;
    let sheet = sheet.map_column(LOUDNESS, |series| {
        map_text(series, |v| Some(v.unwrap_or(LOUDNESS_FALLBACK).to_string()))
    })?;
    let sheet = sheet.drop_columns(SHEET_DROPPED_COLUMNS)?;

    let has_key: BooleanChunked = sheet
        .series(KEY)?
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim) != Some(PLACEHOLDER))
        .collect();
    let before = sheet.len();
    let sheet = sheet.filter(&has_key)?;
    debug!(dropped = before - sheet.len(), "dropped rows without a key");

    let sheet = sheet.map_column(LOUDNESS, |series| {
        let text = series.str()?;
        let values = text
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                let raw = v.unwrap_or_default();
                normalize_loudness(raw).ok_or_else(|| PipelineError::Coercion {
                    table: name.clone(),
                    column: LOUDNESS.to_string(),
                    row,
                    value: raw.to_string(),
                })
            })
            .collect::<Result<Vec<i64>>>()?;
        Ok(Series::new(LOUDNESS.into(), values))
    })?;
    let sheet = sheet_dtype_pass(sheet)?;
    let sheet = sheet.map_column(KEY, |series| map_text(series, |v| v.map(str::to_lowercase)))?;

    let reached_final: BooleanChunked = sheet
        .series(FINAL_DRAW_POSITION)?
        .i64()?
        .into_iter()
        .map(|v| v != Some(0))
        .collect();
    let sheet = sheet.filter(&reached_final)?;
    info!(rows = sheet.len(), "song sheet cleaned");
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loudness_examples() {
        assert_eq!(normalize_loudness("-4 dB"), Some(-4));
        assert_eq!(normalize_loudness("2.4"), Some(-2));
        assert_eq!(normalize_loudness("-11"), Some(-11));
        assert_eq!(normalize_loudness("0 dB"), Some(0));
        assert_eq!(normalize_loudness("6"), Some(-6));
        assert_eq!(normalize_loudness("4.5"), Some(-4));
        assert_eq!(normalize_loudness("loud"), None);
    }

    #[test]
    fn test_loudness_never_positive() {
        for v in [-20.7, -0.4, 0.0, 0.6, 3.5, 14.2] {
            assert!(normalize_loudness(&v.to_string()).unwrap() <= 0);
        }
    }

    #[test]
    fn test_language_order_invariant() {
        assert_eq!(canonicalize_language("French, English"), "English, French");
        assert_eq!(canonicalize_language("English, French"), "English, French");
        assert_eq!(canonicalize_language("Italian,\u{a0}English"), "English, Italian");
    }

    #[test]
    fn test_single_language_footnote() {
        assert_eq!(canonicalize_language("Norwegian[a]"), "Norwegian");
        assert_eq!(canonicalize_language("Hebrew"), "Hebrew");
        assert_eq!(canonicalize_language("Spanish, Catalan[b]"), "Catalan, Spanish");
    }

    #[test]
    fn test_placeholders_only_in_designated_columns() {
        let t = Table::new("sheet", df!("final_place" => ["-", "4"], "style" => ["-", "Pop"]).unwrap());
        let out = replace_placeholders(t, &["final_place", "semi_place"]).unwrap();
        assert_eq!(out.cell(0, "final_place"), Some(AnyValue::Int64(0)));
        assert_eq!(out.cell(1, "final_place"), Some(AnyValue::Int64(4)));
        assert_eq!(out.cell(0, "style"), Some(AnyValue::String("-")));
    }

    #[test]
    fn test_country_fix() {
        let t = Table::new("songs", df!("country" => [" Yugoslavia", "Malta"]).unwrap());
        let out = fix_country_names(t, "country").unwrap();
        assert_eq!(out.cell(0, "country"), Some(AnyValue::String("Yugoslavia")));
        assert_eq!(out.cell(1, "country"), Some(AnyValue::String("Malta")));
    }

    #[test]
    fn test_dtype_pass_rounding_modes() {
        let t = Table::new(
            "sheet",
            df!("acousticness" => [2.5f64], "BPM" => [128i64], "energy" => ["61.9"]).unwrap(),
        );
        let out = sheet_dtype_pass(t).unwrap();
        assert_eq!(out.cell(0, "acousticness"), Some(AnyValue::Int64(2)));
        assert_eq!(out.cell(0, "BPM"), Some(AnyValue::Int64(128)));
        assert_eq!(out.cell(0, "energy"), Some(AnyValue::Int64(61)));
    }

    #[test]
    fn test_clean_song_sheet() {
        let sheet = Table::new(
            "song_data",
            df!(
                "year" => [2019i64; 5],
                "country" => ["Malta"; 5],
                "final_draw_position" => ["3", "-", "7", "9", "1"],
                "key" => ["C Major", "A minor", "-", "D", "E"],
                "loudness" => [Some("-5 dB"), Some("-7"), Some("-7"), None, Some("-9")],
                "BPM" => [118.6f64; 5],
                "age" => ["x"; 5]
            )
            .unwrap(),
        );
        let out = clean_song_sheet(sheet, &BTreeSet::from([4])).unwrap();
        assert!(!out.has_column("age"));
        assert_eq!(out.len(), 2);
        assert_eq!(out.cell(0, "key"), Some(AnyValue::String("c major")));
        assert_eq!(out.cell(0, "loudness"), Some(AnyValue::Int64(-5)));
        assert_eq!(out.cell(1, "loudness"), Some(AnyValue::Int64(-3)));
        // Float values round, even in the truncated columns.
        assert_eq!(out.cell(1, "BPM"), Some(AnyValue::Int64(119)));
    }
}
