use polars::prelude::*;
use std::io::{Cursor, Write};
use std::path::Path;

use super::{map_text, Table};
use crate::error::Result;
use crate::schema::TableSchema;

/// Read CSV bytes with every column kept as text, exactly as written.
pub fn read_raw(name: impl Into<String>, bytes: Vec<u8>) -> Result<Table> {
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(Table::new(name, frame))
}

/// Read a CSV file as text; the relation is named after the file stem.
pub fn read_raw_path(path: &Path) -> Result<Table> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    read_raw(name, std::fs::read(path)?)
}

fn blank_to_missing(raw: Option<&str>) -> Option<&str> {
    raw.filter(|v| !v.trim().is_empty())
}

/// Infer one text column: integers if every present value parses as one, floats
/// if every value parses as a finite float, text otherwise. Numeric parsing
/// ignores surrounding whitespace and treats "nan" as missing.
fn infer_column(series: &Series) -> Result<Series> {
    let text = series.str()?;
    let numeric: Vec<Option<&str>> = text
        .into_iter()
        .map(|v| blank_to_missing(v).map(str::trim).filter(|v| !v.eq_ignore_ascii_case("nan")))
        .collect();

    let ints: Option<Vec<Option<i64>>> = numeric
        .iter()
        .map(|v| match v {
            Some(s) => s.parse::<i64>().ok().map(Some),
            None => Some(None),
        })
        .collect();
    if let Some(ints) = ints {
        return Ok(Series::new(series.name().clone(), ints));
    }

    let floats: Option<Vec<Option<f64>>> = numeric
        .iter()
        .map(|v| match v {
            Some(s) => s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Some),
            None => Some(None),
        })
        .collect();
    if let Some(floats) = floats {
        return Ok(Series::new(series.name().clone(), floats));
    }

    map_text(series, |v| blank_to_missing(v).map(str::to_string))
}

/// Type a raw table: free-text columns stay text, every other column is
/// inferred. The schema's structural checks run on the result.
pub fn apply_schema(raw: Table, schema: &TableSchema) -> Result<Table> {
    let typed = raw.map_series(|series| {
        if schema.is_free_text(series.name()) {
            map_text(series, |v| blank_to_missing(v).map(str::to_string))
        } else {
            infer_column(series)
        }
    })?;
    schema.check(&typed)?;
    Ok(typed)
}

pub fn write_table<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut frame = table.frame().clone();
    CsvWriter::new(writer).include_header(true).finish(&mut frame)?;
    Ok(())
}

pub fn write_table_to_path(table: &Table, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_table(table, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SCORE_TABLE, SONG_SHEET};

    #[test]
    fn test_free_text_columns_keep_raw_text() {
        let csv = "Country,Norway,Year\n Yugoslavia,12,1990\n007,,1990\n";
        let table = apply_schema(read_raw("1990", csv.as_bytes().to_vec()).unwrap(), &SCORE_TABLE).unwrap();
        assert_eq!(table.cell(0, "Country"), Some(AnyValue::String(" Yugoslavia")));
        assert_eq!(table.cell(1, "Country"), Some(AnyValue::String("007")));
        assert_eq!(table.cell(1, "Norway"), Some(AnyValue::Null));
        assert_eq!(table.cell(0, "Year"), Some(AnyValue::Int64(1990)));
    }

    #[test]
    fn test_columns_are_inferred_as_a_whole() {
        let csv = "year,country,artist_name,song_name,language,final_draw_position,final_place,loudness,key,BPM\n\
                   2019,Malta,Michela,Chameleon,English,-,14, -5 ,C,118.6\n\
                   2019,Israel,Kobi,Home,English,3,23,nan,D,NaN\n";
        let table = apply_schema(read_raw("song_data", csv.as_bytes().to_vec()).unwrap(), &SONG_SHEET).unwrap();
        assert_eq!(table.series("final_place").unwrap().dtype(), &DataType::Int64);
        assert_eq!(table.series("BPM").unwrap().dtype(), &DataType::Float64);
        assert_eq!(table.cell(1, "BPM"), Some(AnyValue::Null));
        // A placeholder keeps the whole column as text.
        assert_eq!(table.cell(0, "final_draw_position"), Some(AnyValue::String("-")));
        // Loudness is free text.
        assert_eq!(table.cell(0, "loudness"), Some(AnyValue::String(" -5 ")));
    }

    #[test]
    fn test_write_renders_missing_as_empty() {
        let frame = df!("a" => [Some(1i64), None], "b" => ["x, y", "z"]).unwrap();
        let mut out = Vec::new();
        write_table(&Table::new("t", frame), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,b\n1,\"x, y\"\n,z\n");
    }
}
