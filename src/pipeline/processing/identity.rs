use polars::prelude::*;

use crate::domain::EntityId;
use crate::error::Result;
use crate::table::{value_text, Table};

/// Prepend an id column derived from each row's year and country.
///
/// The id depends only on the row itself; no other row is consulted, so the
/// same (year, country) always yields the same id.
pub fn assign_entity_ids(
    table: Table,
    year_column: &str,
    country_column: &str,
    id_column: &str,
) -> Result<Table> {
    let years = table.series(year_column)?;
    let countries = table.series(country_column)?;
    let ids = (0..table.len())
        .map(|row| {
            let year = value_text(&years.get(row)?);
            let country = value_text(&countries.get(row)?);
            Ok(EntityId::new(&year, &country).to_string())
        })
        .collect::<Result<Vec<String>>>()?;
    table.insert_series(0, Series::new(id_column.into(), ids))
}
