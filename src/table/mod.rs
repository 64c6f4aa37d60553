//! Named data frames shared by every pipeline stage.
//!
//! A [`Table`] pairs a polars [`DataFrame`] with the relation name it will be
//! persisted under. Stages take a table by reference (or by value) and hand back a
//! new one; nothing is mutated behind the caller's back.

pub mod csv_io;

use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};

use crate::error::{PipelineError, Result};

/// The two float-to-integer conversions the dataset has always used. They are
/// kept apart: loudness and the song-sheet dtype pass round, every other
/// conversion truncates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round to nearest, ties to even (`-4.5` becomes `-4`).
    Nearest,
    /// Truncate toward zero.
    Truncate,
}

impl Rounding {
    pub fn apply(self, value: f64) -> i64 {
        match self {
            Rounding::Nearest => value.round_ties_even() as i64,
            Rounding::Truncate => value.trunc() as i64,
        }
    }

    /// Convert a float column to integers. Other columns pass through.
    pub fn apply_series(self, series: &Series) -> Result<Series> {
        if !series.dtype().is_float() {
            return Ok(series.clone());
        }
        let floats = series.cast(&DataType::Float64)?;
        let ints: Int64Chunked = floats
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()).map(|x| self.apply(x)))
            .collect();
        Ok(ints.with_name(series.name().clone()).into_series())
    }
}

/// Text form of one value: missing is empty, strings are unquoted.
pub fn value_text(value: &AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        other => other
            .get_str()
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// An integer value, whatever its width. Floats and text are not integers.
pub fn value_i64(value: &AnyValue<'_>) -> Option<i64> {
    match *value {
        AnyValue::Int64(v) => Some(v),
        AnyValue::Int32(v) => Some(v.into()),
        AnyValue::Int16(v) => Some(v.into()),
        AnyValue::Int8(v) => Some(v.into()),
        AnyValue::UInt32(v) => Some(v.into()),
        AnyValue::UInt16(v) => Some(v.into()),
        AnyValue::UInt8(v) => Some(v.into()),
        AnyValue::UInt64(v) => i64::try_from(v).ok(),
        _ => None,
    }
}

/// Rewrite a column as text, value by value. Non-text columns are rendered first.
pub fn map_text<F>(series: &Series, mut f: F) -> Result<Series>
where
    F: FnMut(Option<&str>) -> Option<String>,
{
    let text = series.cast(&DataType::String)?;
    let mapped: StringChunked = text.str()?.into_iter().map(|v| f(v)).collect();
    Ok(mapped.with_name(series.name().clone()).into_series())
}

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    frame: DataFrame,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.columns() == other.columns()
            && self.frame.equals_missing(&other.frame)
    }
}

impl Table {
    pub fn new(name: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            name: name.into(),
            frame,
        }
    }

    /// A table with no columns and no rows.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, DataFrame::empty())
    }

    /// Build a table from whole columns, which must share one length.
    pub fn from_series(name: impl Into<String>, columns: Vec<Series>) -> Result<Self> {
        let name = name.into();
        let frame = DataFrame::new(columns.into_iter().map(IntoColumn::into_column).collect())
            .map_err(|e| PipelineError::schema_mismatch(&name, e.to_string()))?;
        Ok(Self { name, frame })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn columns(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect()
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.frame.column(column).is_ok()
    }

    pub fn series(&self, column: &str) -> Result<&Series> {
        self.frame
            .column(column)
            .map(Column::as_materialized_series)
            .map_err(|_| PipelineError::missing_column(&self.name, column))
    }

    /// One value, or `None` when the row or column does not exist.
    pub fn cell(&self, row: usize, column: &str) -> Option<AnyValue<'_>> {
        self.frame.column(column).ok()?.as_materialized_series().get(row).ok()
    }

    /// Rename columns through `f`. Two columns collapsing onto one name is a
    /// schema mismatch.
    pub fn rename_with<F>(mut self, f: F) -> Result<Self>
    where
        F: Fn(&str) -> String,
    {
        let renamed: Vec<String> = self.columns().iter().map(|c| f(c)).collect();
        let mut seen = BTreeSet::new();
        for name in &renamed {
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::schema_mismatch(
                    &self.name,
                    format!("duplicate column '{name}' after renaming"),
                ));
            }
        }
        self.frame.set_column_names(renamed)?;
        Ok(self)
    }

    /// Rename through a fixed map; columns not in the map keep their name.
    pub fn rename(self, map: &[(&str, &str)]) -> Result<Self> {
        let lookup: HashMap<&str, &str> = map.iter().copied().collect();
        self.rename_with(|c| lookup.get(c).map(|s| s.to_string()).unwrap_or_else(|| c.to_string()))
    }

    /// Drop the named columns; names that are not present are ignored.
    pub fn drop_columns(mut self, names: &[&str]) -> Result<Self> {
        for name in names {
            if self.has_column(name) {
                self.frame.drop_in_place(name)?;
            }
        }
        Ok(self)
    }

    /// Project onto `names`, in that order. Every name must exist.
    pub fn select(&self, names: &[&str]) -> Result<Table> {
        if let Some(missing) = names.iter().find(|n| !self.has_column(n)) {
            return Err(PipelineError::missing_column(&self.name, *missing));
        }
        let frame = self.frame.select(names.iter().copied())?;
        Ok(Table::new(self.name.clone(), frame))
    }

    /// Keep the rows where `mask` is true.
    pub fn filter(self, mask: &BooleanChunked) -> Result<Self> {
        let frame = self.frame.filter(mask)?;
        Ok(Table::new(self.name, frame))
    }

    /// Drop rows by position. Every position must exist.
    pub fn drop_row_positions(self, positions: &BTreeSet<usize>) -> Result<Self> {
        let len = self.len();
        if let Some(&row) = positions.iter().find(|&&p| p >= len) {
            return Err(PipelineError::KnownBadRow {
                table: self.name.clone(),
                row,
                len,
            });
        }
        let keep: BooleanChunked = (0..len).map(|i| !positions.contains(&i)).collect();
        self.filter(&keep)
    }

    /// Replace the column carrying the series' name, or append it.
    pub fn with_series(mut self, series: Series) -> Result<Self> {
        if series.len() != self.len() && self.width() > 0 {
            return Err(PipelineError::schema_mismatch(
                &self.name,
                format!("column '{}' has {} values for {} rows", series.name(), series.len(), self.len()),
            ));
        }
        self.frame.with_column(series)?;
        Ok(self)
    }

    /// Insert a new column at `position`.
    pub fn insert_series(mut self, position: usize, series: Series) -> Result<Self> {
        if self.has_column(series.name()) {
            return Err(PipelineError::schema_mismatch(
                &self.name,
                format!("column '{}' already exists", series.name()),
            ));
        }
        if series.len() != self.len() {
            return Err(PipelineError::schema_mismatch(
                &self.name,
                format!("column '{}' has {} values for {} rows", series.name(), series.len(), self.len()),
            ));
        }
        let position = position.min(self.width());
        self.frame.insert_column(position, series)?;
        Ok(self)
    }

    /// Rewrite every column through `f`.
    pub fn map_series<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Series) -> Result<Series>,
    {
        let columns = self
            .frame
            .get_columns()
            .iter()
            .map(|c| f(c.as_materialized_series()))
            .collect::<Result<Vec<_>>>()?;
        Table::from_series(self.name, columns)
    }

    /// Rewrite one column through `f`.
    pub fn map_column<F>(self, column: &str, f: F) -> Result<Self>
    where
        F: FnOnce(&Series) -> Result<Series>,
    {
        let replaced = f(self.series(column)?)?;
        self.with_series(replaced)
    }

    /// Fill every missing value with zero; text columns get the text "0".
    pub fn fill_missing_with_zero(self) -> Result<Self> {
        self.map_series(|series| {
            if series.null_count() == 0 {
                return Ok(series.clone());
            }
            match series.dtype() {
                DataType::String | DataType::Null => {
                    map_text(series, |v| Some(v.unwrap_or("0").to_string()))
                }
                _ => Ok(series.fill_null(FillNullStrategy::Zero)?),
            }
        })
    }

    /// Row-wise union aligned by column name. Columns appear in first-seen order;
    /// values a table does not have become missing.
    pub fn concat(name: impl Into<String>, tables: &[Table]) -> Result<Table> {
        let frames: Vec<LazyFrame> = tables
            .iter()
            .filter(|t| t.width() > 0)
            .map(|t| t.frame.clone().lazy())
            .collect();
        if frames.is_empty() {
            return Ok(Table::empty(name));
        }
        let args = UnionArgs {
            to_supertypes: true,
            ..Default::default()
        };
        let frame = concat_lf_diagonal(&frames, args)?.collect()?;
        Ok(Table::new(name, frame))
    }
}
