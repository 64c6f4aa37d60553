/// Column vocabulary and fixed data-quality tables used across the pipeline.

// Source column names
pub const COUNTRY: &str = "Country";
pub const CONTESTANTS: &str = "Contestants";
pub const YEAR: &str = "Year";
pub const TOTAL_SCORE: &str = "Total score";
pub const JURY_SCORE: &str = "Jury score";
pub const TELEVOTING_SCORE: &str = "Televoting score";
pub const JURY_VOTE: &str = "Jury vote";
pub const POINTS: &str = "Points";
pub const PLACE: &str = "Place";
pub const ORDER: &str = "Order";

/// Index column pandas leaves behind when a frame is written with its index.
pub const PANDAS_INDEX: &str = "Unnamed: 0";

// Canonical column names
pub const ID: &str = "id";
pub const SCORE_ID: &str = "_id";
pub const C_YEAR: &str = "year";
pub const C_COUNTRY: &str = "country";
pub const ARTIST_NAME: &str = "artist_name";
pub const SONG_NAME: &str = "song_name";
pub const LANGUAGE: &str = "language";
pub const FINAL_PLACE: &str = "final_place";
pub const FINAL_DRAW_POSITION: &str = "final_draw_position";
pub const SEMI_DRAW_POSITION: &str = "semi_draw_position";
pub const SEMI_PLACE: &str = "semi_place";
pub const FINAL_TELEVOTE_POINTS: &str = "final_televote_points";
pub const FINAL_JURY_POINTS: &str = "final_jury_points";
pub const LOUDNESS: &str = "loudness";
pub const KEY: &str = "key";

/// First edition whose scores are split into jury and televote tables.
pub const SPLIT_SCORES_FIRST_YEAR: i64 = 2016;

/// First edition covered by the song sheet and its extended features.
pub const SONG_SHEET_FIRST_YEAR: i64 = 2009;

/// Legacy header spellings and their canonical names.
pub const HEADER_RENAMES: &[(&str, &str)] = &[("Final result", PLACE), ("Performer", "Artist")];

/// Yearly song-table columns mapped onto the song-sheet vocabulary.
pub const SONG_TABLE_RENAMES: &[(&str, &str)] = &[
    (COUNTRY, C_COUNTRY),
    ("Artist", ARTIST_NAME),
    ("Song", SONG_NAME),
    ("Language", LANGUAGE),
    (PLACE, FINAL_PLACE),
    (ORDER, FINAL_DRAW_POSITION),
    (YEAR, C_YEAR),
];

/// A combined table names its contestants either way, never both.
pub const ERA_A_RENAMES: &[(&str, &str)] = &[(YEAR, C_YEAR), (COUNTRY, C_COUNTRY), (CONTESTANTS, C_COUNTRY)];
pub const ERA_B_RENAMES: &[(&str, &str)] = &[(YEAR, C_YEAR), (CONTESTANTS, C_COUNTRY)];

/// Aggregates removed from both halves of a split year before they are summed.
pub const SPLIT_AGGREGATE_COLUMNS: &[&str] = &[TOTAL_SCORE, JURY_SCORE, TELEVOTING_SCORE, JURY_VOTE];

/// Sheet columns where a lone "-" means "did not take part".
pub const SHEET_PLACEHOLDER_COLUMNS: &[&str] = &[
    SEMI_DRAW_POSITION,
    FINAL_DRAW_POSITION,
    FINAL_TELEVOTE_POINTS,
    FINAL_JURY_POINTS,
    FINAL_PLACE,
];

pub const PLACEHOLDER: &str = "-";

/// Hand-looked-up loudness for the one sheet entry that lacks it.
pub const LOUDNESS_FALLBACK: &str = "-3";

/// Redundant or non-informative sheet columns.
pub const SHEET_DROPPED_COLUMNS: &[&str] = &[
    "direct_qualifier_10",
    "selection",
    "instrumentalness",
    "release_date",
    "key_change_10",
    "qualified",
    "final_jury_votes",
    "final_televote_votes",
    "final_total_points",
    "semi_total_points",
    "race",
    "age",
];

/// Sheet columns cast straight to integers (truncating) by the dtype pass.
pub const SHEET_TRUNCATED_COLUMNS: &[&str] =
    &["BPM", "energy", "danceability", "happiness", "liveness", "speechiness"];

/// Semi-final breakdowns removed once the two song eras are unioned.
pub const UNIFIED_SONG_DROPPED_COLUMNS: &[&str] =
    &[SEMI_DRAW_POSITION, SEMI_PLACE, FINAL_TELEVOTE_POINTS, FINAL_JURY_POINTS];

/// Known misspellings of country names.
pub const COUNTRY_NAME_FIXES: &[(&str, &str)] = &[(" Yugoslavia", "Yugoslavia")];

/// Sheet rows (0-based, as read) with unrecoverable gaps in critical fields.
pub const KNOWN_BAD_SHEET_ROWS: &[usize] = &[474, 528];

pub const OVERVIEW_COLUMNS: &[&str] = &[
    ID,
    C_COUNTRY,
    ARTIST_NAME,
    SONG_NAME,
    LANGUAGE,
    FINAL_PLACE,
    FINAL_DRAW_POSITION,
    C_YEAR,
];

/// Descriptive columns that belong to the overview rather than the features.
pub const FEATURES_EXCLUDED_COLUMNS: &[&str] =
    &[ARTIST_NAME, SONG_NAME, LANGUAGE, FINAL_PLACE, FINAL_DRAW_POSITION];

// Persisted relation names
pub const OVERVIEW_RELATION: &str = "song_overview";
pub const FEATURES_RELATION: &str = "song_features";
pub const SCORES_RELATION: &str = "year_scores";
pub const SONGS_CLEANED_RELATION: &str = "songs_cleaned";
pub const PREDICTION_RELATION: &str = "prediction_input";
pub const TRAINING_VIEW: &str = "training_set";

pub const RUN_REPORT_FILE: &str = "run_report.json";
pub const METRICS_FILE: &str = "metrics.prom";
