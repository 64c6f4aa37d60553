use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::schema::TableSchema;
use crate::table::{value_text, Rounding, Table};

/// Parse integer text the way `astype(int)` does: integral text parses, float
/// text truncates toward zero. Surrounding whitespace is ignored.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let t = raw.trim();
    t.parse::<i64>().ok().or_else(|| {
        t.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| Rounding::Truncate.apply(v))
    })
}

/// Coerce one column to `Int64`, floats truncating. Missing values become `0` when
/// `zero_missing` is set and stay missing otherwise. The first value that cannot
/// be coerced is reported with its table, column and row.
pub fn coerce_integer_series(table: &str, series: &Series, zero_missing: bool) -> Result<Series> {
    let missing = zero_missing.then_some(0);
    let name = series.name().clone();
    let coerced = match series.dtype() {
        DataType::String => {
            let text = series.str()?;
            let values = text
                .into_iter()
                .enumerate()
                .map(|(row, v)| match v {
                    None => Ok(missing),
                    Some(raw) if raw.trim().is_empty() => Ok(missing),
                    Some(raw) => parse_integer(raw).map(Some).ok_or_else(|| PipelineError::Coercion {
                        table: table.to_string(),
                        column: name.to_string(),
                        row,
                        value: raw.to_string(),
                    }),
                })
                .collect::<Result<Vec<Option<i64>>>>()?;
            Series::new(name, values)
        }
        dtype if dtype.is_integer() || dtype.is_float() || dtype == &DataType::Null => {
            let ints = Rounding::Truncate.apply_series(series)?.strict_cast(&DataType::Int64)?;
            if zero_missing {
                ints.fill_null(FillNullStrategy::Zero)?
            } else {
                ints
            }
        }
        _ => {
            let row = (0..series.len()).find(|&i| series.get(i).map(|v| !v.is_null()).unwrap_or(false));
            return Err(PipelineError::Coercion {
                table: table.to_string(),
                column: name.to_string(),
                row: row.unwrap_or(0),
                value: row.and_then(|i| series.get(i).ok()).map(|v| value_text(&v)).unwrap_or_default(),
            });
        }
    };
    Ok(coerced)
}

/// Null/type normalization of a raw per-year table.
///
/// Every missing value becomes `0`; every column the schema declares typed is
/// coerced to an integer (floats truncate toward zero). A value that cannot be
/// coerced fails the whole table: nothing is substituted silently.
pub fn normalize_table(table: &Table, schema: &TableSchema) -> Result<Table> {
    let name = table.name().to_string();
    let typed = table.clone().map_series(|series| {
        if schema.is_typed(series.name()) {
            coerce_integer_series(&name, series, true)
        } else {
            Ok(series.clone())
        }
    })?;
    let normalized = typed.fill_missing_with_zero()?;
    debug!(table = %name, rows = normalized.len(), "normalized table");
    Ok(normalized)
}

/// Coerce the named columns to integers, treating missing values as `0`.
/// Absent columns are ignored.
pub fn coerce_columns(table: Table, columns: &[&str]) -> Result<Table> {
    let name = table.name().to_string();
    columns.iter().try_fold(table, |table, column| {
        if !table.has_column(column) {
            return Ok(table);
        }
        table.map_column(column, |series| coerce_integer_series(&name, series, true))
    })
}
