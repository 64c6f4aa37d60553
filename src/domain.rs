//! Domain data shapes produced by the pipeline.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{C_COUNTRY, C_YEAR, OVERVIEW_COLUMNS, SCORE_ID};
use crate::error::{PipelineError, Result};
use crate::table::{value_i64, value_text, Table};

/// Composite join key: the first 4 characters of the year followed by the first
/// 6 characters of the country. Short names are used as-is, so two countries
/// sharing a 6-character prefix in the same year collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(year: &str, country: &str) -> Self {
        let mut id: String = year.chars().take(4).collect();
        id.extend(country.chars().take(6));
        EntityId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One edition's scores for one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRecord {
    pub id: EntityId,
    pub year: u16,
    pub country: String,
    /// One entry per scoring category, in column order.
    pub scores: Vec<(String, u32)>,
}

impl YearRecord {
    /// Read typed records back out of the unified score table, enforcing that
    /// every score is a non-negative integer.
    pub fn from_table(table: &Table) -> Result<Vec<YearRecord>> {
        let ids = table.series(SCORE_ID)?;
        let years = table.series(C_YEAR)?;
        let countries = table.series(C_COUNTRY)?;
        let score_columns: Vec<&Series> = table
            .frame()
            .get_columns()
            .iter()
            .map(Column::as_materialized_series)
            .filter(|s| ![SCORE_ID, C_YEAR, C_COUNTRY].contains(&s.name().as_str()))
            .collect();
        let invalid = |row: usize, column: &str, value: &AnyValue| PipelineError::Coercion {
            table: table.name().to_string(),
            column: column.to_string(),
            row,
            value: value_text(value),
        };

        (0..table.len())
            .map(|i| {
                let year_value = years.get(i)?;
                let year = value_i64(&year_value)
                    .and_then(|y| u16::try_from(y).ok())
                    .ok_or_else(|| invalid(i, C_YEAR, &year_value))?;
                let scores = score_columns
                    .iter()
                    .map(|series| {
                        let value = series.get(i)?;
                        let points = value_i64(&value)
                            .and_then(|v| u32::try_from(v).ok())
                            .ok_or_else(|| invalid(i, series.name(), &value))?;
                        Ok((series.name().to_string(), points))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(YearRecord {
                    id: EntityId(value_text(&ids.get(i)?)),
                    year,
                    country: value_text(&countries.get(i)?),
                    scores,
                })
            })
            .collect()
    }
}

/// Identity and descriptive fields of one song entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewRow {
    pub id: EntityId,
    pub country: String,
    pub artist_name: String,
    pub song_name: String,
    pub language: String,
    /// 0 when the entry was not placed.
    pub final_place: u32,
    /// 0 when the entry did not reach the final.
    pub final_draw_position: u32,
    pub year: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverviewView {
    pub rows: Vec<OverviewRow>,
}

impl OverviewView {
    pub fn from_table(table: &Table) -> Result<Self> {
        let projected = table.select(OVERVIEW_COLUMNS)?;
        let columns = OVERVIEW_COLUMNS
            .iter()
            .map(|c| projected.series(c))
            .collect::<Result<Vec<_>>>()?;
        let text = |row: usize, col: usize| -> Result<String> { Ok(value_text(&columns[col].get(row)?)) };
        let int_field = |row: usize, col: usize| -> Result<i64> {
            let value = columns[col].get(row)?;
            value_i64(&value).filter(|v| *v >= 0).ok_or_else(|| PipelineError::Coercion {
                table: projected.name().to_string(),
                column: OVERVIEW_COLUMNS[col].to_string(),
                row,
                value: value_text(&value),
            })
        };

        let rows = (0..projected.len())
            .map(|i| {
                Ok(OverviewRow {
                    id: EntityId(text(i, 0)?),
                    country: text(i, 1)?,
                    artist_name: text(i, 2)?,
                    song_name: text(i, 3)?,
                    language: text(i, 4)?,
                    final_place: int_field(i, 5)? as u32,
                    final_draw_position: int_field(i, 6)? as u32,
                    year: int_field(i, 7)? as u16,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn to_table(&self, name: &str) -> Result<Table> {
        let text = |f: fn(&OverviewRow) -> String| self.rows.iter().map(f).collect::<Vec<_>>();
        let int = |f: fn(&OverviewRow) -> i64| self.rows.iter().map(f).collect::<Vec<_>>();
        Table::from_series(
            name,
            vec![
                Series::new(OVERVIEW_COLUMNS[0].into(), text(|r| r.id.to_string())),
                Series::new(OVERVIEW_COLUMNS[1].into(), text(|r| r.country.clone())),
                Series::new(OVERVIEW_COLUMNS[2].into(), text(|r| r.artist_name.clone())),
                Series::new(OVERVIEW_COLUMNS[3].into(), text(|r| r.song_name.clone())),
                Series::new(OVERVIEW_COLUMNS[4].into(), text(|r| r.language.clone())),
                Series::new(OVERVIEW_COLUMNS[5].into(), int(|r| r.final_place.into())),
                Series::new(OVERVIEW_COLUMNS[6].into(), int(|r| r.final_draw_position.into())),
                Series::new(OVERVIEW_COLUMNS[7].into(), int(|r| r.year.into())),
            ],
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The extended 2009+ feature set keyed by [`EntityId`]. Its columns follow the
/// song sheet, so it stays a table rather than a fixed struct.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturesView {
    table: Table,
}

impl FeaturesView {
    pub fn new(table: Table) -> Result<Self> {
        table.series(crate::constants::ID)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn columns(&self) -> Vec<String> {
        self.table.columns()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
