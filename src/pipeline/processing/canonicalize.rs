use crate::constants::HEADER_RENAMES;

/// Canonical form of a scraped column header: everything from the first `[` or
/// `(` onward (footnote markers, annotations) is removed and the two legacy
/// spellings are mapped onto the current vocabulary. Idempotent.
pub fn canonical_column_name(name: &str) -> String {
    let cut = name.find(['[', '(']).unwrap_or(name.len());
    let stripped = name[..cut].trim_end();
    HEADER_RENAMES
        .iter()
        .find(|(legacy, _)| *legacy == stripped)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| stripped.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_annotations() {
        assert_eq!(canonical_column_name("Points[11]"), "Points");
        assert_eq!(canonical_column_name("Language(s)"), "Language");
        assert_eq!(canonical_column_name("Language [a]"), "Language");
        assert_eq!(canonical_column_name("Points"), "Points");
    }

    #[test]
    fn test_legacy_names() {
        assert_eq!(canonical_column_name("Final result"), "Place");
        assert_eq!(canonical_column_name("Final result[5]"), "Place");
        assert_eq!(canonical_column_name("Performer"), "Artist");
    }

    #[test]
    fn test_idempotent() {
        for name in ["Points[11]", "Final result (a)", "Performer", "Song", "Draw (semi)[b]", ""] {
            let once = canonical_column_name(name);
            assert_eq!(canonical_column_name(&once), once, "not idempotent for {name:?}");
        }
    }
}
