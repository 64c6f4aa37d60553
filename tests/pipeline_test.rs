use std::fs;
use std::path::Path;

use esc_dataset::config::Config;
use esc_dataset::constants::*;
use esc_dataset::domain::EntityId;
use esc_dataset::pipeline::ingestion::SourceKind;
use esc_dataset::pipeline::{
    write_run_artifacts, CsvDirSink, InMemorySink, Pipeline, PipelineReport, RelationSink, SqliteSink,
};
use esc_dataset::PipelineError;
use polars::prelude::AnyValue;
use tempfile::TempDir;

fn write(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}

/// Two editions (one per score era) with two countries each.
fn fixture(root: &Path) -> Config {
    write(
        &root.join("scores/2015.csv"),
        "Country,Total score,Sweden,Norway[a],Year\n\
         Sweden,10,0,10,2015\n\
         Norway,8,8,,2015\n",
    );
    write(
        &root.join("scores/2016_juryvote.csv"),
        "Contestants,Total score,Jury score,Sweden,Norway,Year\n\
         Sweden,5,5,0,5,2016\n\
         Norway,3,3,3,,2016\n",
    );
    write(
        &root.join("scores/2016_televote.csv"),
        "Contestants,Total score,Televoting score,Sweden,Norway,Year\n\
         Sweden,7,7,0,7,2016\n\
         Norway,2,2,2,0,2016\n",
    );
    write(
        &root.join("songs/2008.csv"),
        "Country,Performer,Song,Language[b],Final result,Points,Order,Year\n\
         Sweden,Charlotte Perrelli,Hero,English,18,47,14,2008\n\
         Norway,Maria Haukaas Storeng,Hold On Be Strong,English,5,182,8,2008\n",
    );
    write(
        &root.join("song_data.csv"),
        "year,country,artist_name,song_name,language,final_draw_position,final_place,loudness,key,BPM,energy,semi_place,age\n\
         2016,Sweden,Frans,If I Were Sorry,English,12,5,-6 dB,C Major,120,70,3,17\n\
         2016,Malta,Ira Losco,Walk on Water,English,-,-,-5,D major,100,65,12,29\n\
         2016,Norway,Agnete,Icebreaker,\"English, Sami\",9,11,4.6,A minor,110.4,60,13,20\n",
    );

    let mut config = Config::default();
    config.sources.scores_dir = root.join("scores");
    config.sources.songs_dir = root.join("songs");
    config.sources.song_sheet = root.join("song_data.csv");
    config.output.dir = root.join("output");
    config.database.path = root.join("esc.db");
    config.cleaning.known_bad_rows = Vec::new();
    config
}

#[test]
fn test_end_to_end_two_eras() {
    let root = TempDir::new().unwrap();
    let pipeline = Pipeline::new(fixture(root.path()));
    let dataset = pipeline.build().unwrap();

    let scores = &dataset.scores;
    assert_eq!(scores.columns(), &[SCORE_ID, "Sweden", "Norway"]);
    assert_eq!(scores.len(), 4);
    let ids: Vec<Option<&str>> = scores.series(SCORE_ID).unwrap().str().unwrap().into_iter().collect();
    assert_eq!(
        ids,
        vec![Some("2015Sweden"), Some("2015Norway"), Some("2016Sweden"), Some("2016Norway")]
    );
    for country in ["Sweden", "Norway"] {
        let points = scores.series(country).unwrap().i64().unwrap();
        assert!(points.into_iter().all(|v| matches!(v, Some(v) if v >= 0)));
    }
    assert_eq!(scores.cell(2, "Norway"), Some(AnyValue::Int64(12)));
    assert_eq!(scores.cell(3, "Sweden"), Some(AnyValue::Int64(5)));
    assert_eq!(scores.cell(1, "Norway"), Some(AnyValue::Int64(0)));

    assert_eq!(dataset.overview.len(), 4);
    for row in &dataset.overview.rows {
        assert_eq!(row.id, EntityId::new(&row.year.to_string(), &row.country));
    }
    let norway_2016 = &dataset.overview.rows[3];
    assert_eq!(norway_2016.language, "English, Sami");
    assert_eq!(norway_2016.final_place, 11);
    assert_eq!(dataset.overview.rows[0].artist_name, "Charlotte Perrelli");

    let features = dataset.features.table();
    assert_eq!(features.len(), 2);
    assert!(!features.has_column(SEMI_PLACE));
    assert!(!features.has_column("age"));
    assert_eq!(features.cell(0, LOUDNESS), Some(AnyValue::Int64(-6)));
    assert_eq!(features.cell(1, LOUDNESS), Some(AnyValue::Int64(-5)));
    assert_eq!(features.cell(1, "BPM"), Some(AnyValue::Int64(110)));
    assert_eq!(features.cell(1, KEY), Some(AnyValue::String("a minor")));
    assert!(dataset.skipped.is_empty());
}

#[test]
fn test_mismatched_year_is_skipped_and_reported() {
    let root = TempDir::new().unwrap();
    let config = fixture(root.path());
    write(&root.path().join("scores/2014.csv"), "Sweden,Norway,Year\n1,2,2014\n");

    let sink = InMemorySink::new();
    let sinks: Vec<Box<dyn RelationSink>> = vec![Box::new(sink.clone())];
    let report = Pipeline::new(config).run(&sinks).unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].year, 2014);
    assert_eq!(report.skipped[0].kind, SourceKind::CombinedScores);
    assert_eq!(report.relation(SCORES_RELATION).unwrap().rows, 4);
    assert!(sink.get("scores_2014").is_none());
    assert!(sink.get("scores_2015").is_some());
    assert!(sink.get("scores_2016_jury").is_some());
    assert!(sink.get("songs_2008").is_some());
}

#[test]
fn test_failed_stage_persists_nothing() {
    let root = TempDir::new().unwrap();
    let config = fixture(root.path());
    // Televote rows in a different order than the jury rows.
    write(
        &root.path().join("scores/2016_televote.csv"),
        "Contestants,Total score,Televoting score,Sweden,Norway,Year\n\
         Norway,2,2,2,0,2016\n\
         Sweden,7,7,0,7,2016\n",
    );

    let sink = InMemorySink::new();
    let sinks: Vec<Box<dyn RelationSink>> = vec![Box::new(sink.clone())];
    let err = Pipeline::new(config).run(&sinks).unwrap_err();
    match err {
        PipelineError::Stage { stage, source } => {
            assert_eq!(stage, "merge_scores");
            assert!(matches!(*source, PipelineError::Misaligned { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(sink.relation_names().is_empty());
}

#[test]
fn test_known_bad_row_out_of_range_is_fatal() {
    let root = TempDir::new().unwrap();
    let mut config = fixture(root.path());
    config.cleaning.known_bad_rows = vec![474];
    let err = Pipeline::new(config).clean().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Stage { source, .. } if matches!(*source, PipelineError::KnownBadRow { row: 474, .. })
    ));
}

#[test]
fn test_prediction_input_is_aligned_to_features() {
    let root = TempDir::new().unwrap();
    let mut config = fixture(root.path());
    let input = root.path().join("clean_2023.csv");
    write(&input, "country,BPM,energy,key,loudness,year,style\nFinland,120.9,80,d minor,-4,2023,Pop\n");
    config.sources.prediction_input = Some(input);

    let dataset = Pipeline::new(config).build().unwrap();
    let prediction = dataset.prediction_input.unwrap();
    assert_eq!(prediction.name(), PREDICTION_RELATION);
    assert_eq!(prediction.columns(), dataset.features.columns());
    assert_eq!(prediction.cell(0, ID), Some(AnyValue::String("2023Finlan")));
    assert_eq!(prediction.cell(0, "BPM"), Some(AnyValue::Int64(120)));
}

#[test]
fn test_sqlite_and_csv_outputs() {
    let root = TempDir::new().unwrap();
    let config = fixture(root.path());
    let db_path = config.database.path.clone();
    let out_dir = config.output.dir.clone();

    let sinks = esc_dataset::pipeline::sinks_from_config(&config);
    let report = Pipeline::new(config.clone()).run(&sinks).unwrap();
    write_run_artifacts(&report, &out_dir).unwrap();

    let sqlite = SqliteSink::new(config.database.clone());
    let overview = sqlite.read_relation(OVERVIEW_RELATION).unwrap();
    assert_eq!(overview.len(), 4);
    assert_eq!(overview.columns(), OVERVIEW_COLUMNS);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let joined: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {TRAINING_VIEW} WHERE artist_name IS NOT NULL"),
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(joined, 2);

    assert!(out_dir.join(format!("{FEATURES_RELATION}.csv")).exists());
    assert!(out_dir.join(format!("{SONGS_CLEANED_RELATION}.csv")).exists());
    let saved: PipelineReport =
        serde_json::from_str(&fs::read_to_string(out_dir.join(RUN_REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(saved.run_id, report.run_id);
    assert_eq!(saved.sinks, vec!["sqlite", "csv"]);

    // Same inputs, same relation contents.
    let again = Pipeline::new(config).run(&sinks).unwrap();
    for relation in &report.relations {
        assert_eq!(again.relation(&relation.name).unwrap().sha256, relation.sha256);
    }
}

#[test]
fn test_combined_year_naming_contestants_is_merged() {
    let root = TempDir::new().unwrap();
    let config = fixture(root.path());
    write(&root.path().join("scores/2014.csv"), "Contestants,Sweden,Norway,Year\nSweden,0,12,2014\n");

    let dataset = Pipeline::new(config).build().unwrap();
    assert!(dataset.skipped.is_empty());
    assert_eq!(dataset.scores.len(), 5);
    assert_eq!(dataset.scores.cell(0, SCORE_ID), Some(AnyValue::String("2014Sweden")));
    assert_eq!(dataset.scores.cell(0, "Norway"), Some(AnyValue::Int64(12)));
}

#[test]
fn test_failing_second_sink_leaves_first_untouched() {
    let root = TempDir::new().unwrap();
    let config = fixture(root.path());
    let blocker = root.path().join("blocker");
    fs::write(&blocker, "").unwrap();

    let sinks: Vec<Box<dyn RelationSink>> = vec![
        Box::new(SqliteSink::new(config.database.clone())),
        Box::new(CsvDirSink::new(blocker.join("out"))),
    ];
    let err = Pipeline::new(config.clone()).run(&sinks).unwrap_err();
    assert!(matches!(err, PipelineError::Stage { stage: "persist", .. }));

    let sqlite = SqliteSink::new(config.database);
    assert!(sqlite.relation_names().unwrap().is_empty());
}
