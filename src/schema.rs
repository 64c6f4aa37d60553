//! Per-entity schema declarations.
//!
//! Each source family declares which of its fields are typed (coerced to integers by
//! the normalizer) and which are free text, instead of every transformation guessing
//! from the column name. Declarations are checked when a table is loaded.

use crate::error::{PipelineError, Result};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer after normalization.
    Typed,
    /// Kept as text, never coerced.
    FreeText,
}

#[derive(Debug)]
pub struct TableSchema {
    pub entity: &'static str,
    /// Explicitly declared fields.
    fields: &'static [(&'static str, FieldKind)],
    /// Any column whose name contains one of these is free text.
    free_text_markers: &'static [&'static str],
    /// Kind of undeclared columns; `None` leaves them as loaded.
    default_kind: Option<FieldKind>,
    /// Columns that must be present.
    required: &'static [&'static str],
    /// Groups of which exactly one column must be present.
    required_one_of: &'static [&'static [&'static str]],
}

impl TableSchema {
    pub fn kind_of(&self, column: &str) -> Option<FieldKind> {
        if let Some((_, kind)) = self.fields.iter().find(|(name, _)| *name == column) {
            return Some(*kind);
        }
        if self.free_text_markers.iter().any(|m| column.contains(m)) {
            return Some(FieldKind::FreeText);
        }
        self.default_kind
    }

    pub fn is_free_text(&self, column: &str) -> bool {
        self.kind_of(column) == Some(FieldKind::FreeText)
    }

    pub fn is_typed(&self, column: &str) -> bool {
        self.kind_of(column) == Some(FieldKind::Typed)
    }

    /// Verify the structural expectations of the declaration.
    pub fn check(&self, table: &Table) -> Result<()> {
        if table.columns().is_empty() {
            return Err(PipelineError::schema_mismatch(table.name(), "table has no columns"));
        }
        for column in self.required {
            if !table.has_column(column) {
                return Err(PipelineError::schema_mismatch(
                    table.name(),
                    format!("{} table lacks required column '{column}'", self.entity),
                ));
            }
        }
        for group in self.required_one_of {
            let present = group.iter().filter(|c| table.has_column(c)).count();
            if present != 1 {
                return Err(PipelineError::schema_mismatch(
                    table.name(),
                    format!("{} table needs exactly one of {:?}, found {present}", self.entity, group),
                ));
            }
        }
        Ok(())
    }
}

/// Era A: one combined score table per year, one column per voting country.
pub static SCORE_TABLE: TableSchema = TableSchema {
    entity: "score",
    fields: &[("Year", FieldKind::Typed), ("Total score", FieldKind::Typed)],
    free_text_markers: &["Country", "Contestants"],
    default_kind: Some(FieldKind::Typed),
    required: &["Year"],
    required_one_of: &[&["Country", "Contestants"]],
};

/// Era B: the jury and televote halves of a split year.
pub static SPLIT_SCORE_TABLE: TableSchema = TableSchema {
    entity: "split score",
    fields: &[
        ("Year", FieldKind::Typed),
        ("Total score", FieldKind::Typed),
        ("Jury score", FieldKind::Typed),
        ("Televoting score", FieldKind::Typed),
        ("Jury vote", FieldKind::Typed),
    ],
    free_text_markers: &["Country", "Contestants"],
    default_kind: Some(FieldKind::Typed),
    required: &["Contestants", "Year"],
    required_one_of: &[],
};

/// Yearly song tables, after header canonicalization.
pub static SONG_TABLE: TableSchema = TableSchema {
    entity: "song",
    fields: &[
        ("Country", FieldKind::FreeText),
        ("Artist", FieldKind::FreeText),
        ("Song", FieldKind::FreeText),
        ("Language", FieldKind::FreeText),
        ("Place", FieldKind::Typed),
        ("Order", FieldKind::Typed),
        ("Points", FieldKind::Typed),
        ("Year", FieldKind::Typed),
    ],
    free_text_markers: &[],
    default_kind: Some(FieldKind::FreeText),
    required: &["Country", "Artist", "Song", "Language", "Year"],
    required_one_of: &[],
};

/// The hand-curated 2009+ song sheet. Undeclared columns keep their inferred types.
pub static SONG_SHEET: TableSchema = TableSchema {
    entity: "song sheet",
    fields: &[
        ("year", FieldKind::Typed),
        ("country", FieldKind::FreeText),
        ("artist_name", FieldKind::FreeText),
        ("song_name", FieldKind::FreeText),
        ("language", FieldKind::FreeText),
        ("style", FieldKind::FreeText),
        ("gender", FieldKind::FreeText),
        ("main_singers", FieldKind::FreeText),
        ("key", FieldKind::FreeText),
        ("loudness", FieldKind::FreeText),
        ("semi_draw_position", FieldKind::Typed),
        ("final_draw_position", FieldKind::Typed),
        ("semi_place", FieldKind::Typed),
        ("final_place", FieldKind::Typed),
        ("final_televote_points", FieldKind::Typed),
        ("final_jury_points", FieldKind::Typed),
        ("BPM", FieldKind::Typed),
        ("energy", FieldKind::Typed),
        ("danceability", FieldKind::Typed),
        ("happiness", FieldKind::Typed),
        ("liveness", FieldKind::Typed),
        ("speechiness", FieldKind::Typed),
    ],
    free_text_markers: &[],
    default_kind: None,
    required: &[
        "year",
        "country",
        "artist_name",
        "song_name",
        "language",
        "final_draw_position",
        "final_place",
        "loudness",
        "key",
    ],
    required_one_of: &[],
};

/// Entries of the upcoming edition, shaped like the cleaned sheet.
pub static PREDICTION_INPUT: TableSchema = TableSchema {
    entity: "prediction input",
    fields: &[
        ("year", FieldKind::Typed),
        ("country", FieldKind::FreeText),
        ("style", FieldKind::FreeText),
        ("gender", FieldKind::FreeText),
        ("main_singers", FieldKind::FreeText),
        ("key", FieldKind::FreeText),
    ],
    free_text_markers: &[],
    default_kind: None,
    required: &["year", "country"],
    required_one_of: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use polars::prelude::*;

    fn header_only(columns: &[&str]) -> Table {
        let series = columns
            .iter()
            .map(|c| Series::new((*c).into(), Vec::<i64>::new()))
            .collect();
        Table::from_series("1990", series).unwrap()
    }

    #[test]
    fn test_score_table_markers() {
        assert!(SCORE_TABLE.is_free_text("Country"));
        assert!(SCORE_TABLE.is_free_text("Contestants[a]"));
        assert!(SCORE_TABLE.is_typed("Norway"));
        assert!(SCORE_TABLE.is_typed("Year"));
    }

    #[test]
    fn test_sheet_leaves_undeclared_columns_alone() {
        assert_eq!(SONG_SHEET.kind_of("acousticness"), None);
        assert!(SONG_SHEET.is_free_text("loudness"));
    }

    #[test]
    fn test_check_reports_missing_structure() {
        let err = SCORE_TABLE.check(&header_only(&["Norway", "Year"])).unwrap_err();
        assert!(err.is_schema_mismatch());

        assert!(SCORE_TABLE.check(&header_only(&["Country", "Norway", "Year"])).is_ok());
        assert!(SCORE_TABLE.check(&header_only(&["Contestants", "Norway", "Year"])).is_ok());
    }

    #[test]
    fn test_country_and_contestants_together_are_ambiguous() {
        let t = header_only(&["Country", "Contestants", "Norway", "Year"]);
        assert!(SCORE_TABLE.check(&t).unwrap_err().is_schema_mismatch());
    }
}
