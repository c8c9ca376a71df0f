use rusqlite::types::Value;
use std::fs;
use std::path::{Path, PathBuf};
use student_essays::core::config::{EssayConfig, StoreConfig};
use student_essays::store::{RecordStore, RowFields, StoreError};
use tempfile::TempDir;

/// Copy the fixture schema and data directories into a scratch directory,
/// since saving rewrites data files.
fn scratch_store() -> (TempDir, StoreConfig) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        schema_dir: dir.path().join("schema"),
        data_dir: dir.path().join("data"),
        table: "samples".to_string(),
    };
    copy_dir(Path::new("tests/fixtures/schema"), &config.schema_dir);
    copy_dir(Path::new("tests/fixtures/data"), &config.data_dir);
    (dir, config)
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let path = entry.unwrap().path();
        fs::copy(&path, to.join(path.file_name().unwrap())).unwrap();
    }
}

fn fields(pairs: &[(&str, Option<&str>)]) -> RowFields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
        .collect()
}

fn samples_file(config: &StoreConfig) -> PathBuf {
    config.data_dir.join("samples_data.sql")
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Null => None,
        other => panic!("unexpected value {other:?}"),
    }
}

#[test]
fn load_discovers_tables_and_keys() {
    let (_dir, config) = scratch_store();
    let store = RecordStore::open(&config).unwrap();

    let names: Vec<&str> = store.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["graders", "samples"]);

    let samples = store.table("samples").unwrap();
    assert_eq!(samples.columns.len(), 13);
    assert_eq!(samples.primary_key_column(), "sample_id");

    let rows = store
        .query("SELECT sample_id FROM samples ORDER BY sample_id", [])
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn save_without_changes_is_byte_identical() {
    let (_dir, config) = scratch_store();
    let before_samples = fs::read(samples_file(&config)).unwrap();
    let before_graders = fs::read(config.data_dir.join("graders_data.sql")).unwrap();

    let store = RecordStore::open(&config).unwrap();
    store.save_all().unwrap();

    assert_eq!(fs::read(samples_file(&config)).unwrap(), before_samples);
    assert_eq!(
        fs::read(config.data_dir.join("graders_data.sql")).unwrap(),
        before_graders
    );
}

#[test]
fn upsert_rewrites_the_row_in_place_and_keeps_comments() {
    let (_dir, config) = scratch_store();
    let original = fs::read_to_string(samples_file(&config)).unwrap();

    let mut store = RecordStore::open(&config).unwrap();
    store
        .upsert(
            "samples",
            &fields(&[
                ("sample_id", Some("s-002")),
                ("essay_text", Some("Revised draft.")),
                ("content_level", Some("5")),
            ]),
        )
        .unwrap();
    store.save_all().unwrap();

    let saved = fs::read_to_string(samples_file(&config)).unwrap();
    let original_lines: Vec<&str> = original.lines().collect();
    let saved_lines: Vec<&str> = saved.lines().collect();
    assert_eq!(original_lines.len(), saved_lines.len());

    for (i, (old, new)) in original_lines.iter().zip(&saved_lines).enumerate() {
        if old.contains("'s-002'") {
            assert!(new.contains("VALUES ('s-002', 'Revised draft.', NULL"), "{new}");
            assert!(new.contains("'5'"));
            assert!(!new.contains("Many people fought"));
        } else {
            assert_eq!(old, new, "line {i} changed");
        }
    }
}

#[test]
fn upsert_replaces_the_whole_row_and_stamps_modified_ts() {
    let (_dir, config) = scratch_store();
    let mut store = RecordStore::open(&config).unwrap();
    store
        .upsert(
            "samples",
            &fields(&[
                ("sample_id", Some("s-001")),
                ("subject", Some("Social Studies")),
                ("modified_ts", Some("ignored")),
            ]),
        )
        .unwrap();

    let rows = store
        .query(
            "SELECT subject, essay_text, modified_ts FROM samples WHERE sample_id = ?1",
            ["s-001"],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0][0]).as_deref(), Some("Social Studies"));
    assert_eq!(text(&rows[0][1]), None);
    let stamp = text(&rows[0][2]).unwrap();
    assert_ne!(stamp, "ignored");
    assert!(chrono::NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S").is_ok());
}

#[test]
fn new_rows_are_appended_after_existing_text() {
    let (_dir, config) = scratch_store();
    let original = fs::read_to_string(samples_file(&config)).unwrap();

    let mut store = RecordStore::open(&config).unwrap();
    store
        .upsert(
            "samples",
            &fields(&[("sample_id", Some("s-004")), ("topic", Some("Reconstruction"))]),
        )
        .unwrap();
    store.save_table("samples").unwrap();

    let saved = fs::read_to_string(samples_file(&config)).unwrap();
    assert!(saved.starts_with(&original));
    let appended = &saved[original.len()..];
    assert_eq!(appended.lines().count(), 1);
    assert!(appended.starts_with("INSERT INTO samples (sample_id, essay_text"));
    assert!(appended.contains("'s-004'"));
    assert!(appended.contains("'Reconstruction'"));
}

#[test]
fn deleted_rows_disappear_from_the_data_file() {
    let (_dir, config) = scratch_store();
    let store = RecordStore::open(&config).unwrap();
    store
        .query("DELETE FROM samples WHERE sample_id = 's-003' RETURNING sample_id", [])
        .unwrap();
    store.save_all().unwrap();

    let saved = fs::read_to_string(samples_file(&config)).unwrap();
    assert!(!saved.contains("'s-003'"));
    assert!(saved.contains("-- end of seed set"));
    assert!(saved.contains("'s-001'"));
}

#[test]
fn saved_files_reload_to_the_same_rows() {
    let (_dir, config) = scratch_store();
    let mut store = RecordStore::open(&config).unwrap();
    store
        .upsert(
            "samples",
            &fields(&[
                ("sample_id", Some("s-005")),
                ("essay_text", Some("It's a draft, with commas; and quotes ''.")),
            ]),
        )
        .unwrap();
    store.save_all().unwrap();
    let sql = "SELECT * FROM samples ORDER BY sample_id";
    let before = store.query(sql, []).unwrap();
    store.close().unwrap();

    let reloaded = RecordStore::open(&config).unwrap();
    assert_eq!(reloaded.query(sql, []).unwrap(), before);

    // A second save of the reloaded store changes nothing.
    let first = fs::read(samples_file(&config)).unwrap();
    reloaded.save_all().unwrap();
    assert_eq!(fs::read(samples_file(&config)).unwrap(), first);
}

#[test]
fn table_without_a_data_file_gets_one_on_save() {
    let (_dir, config) = scratch_store();
    fs::remove_file(config.data_dir.join("graders_data.sql")).unwrap();

    let mut store = RecordStore::open(&config).unwrap();
    store
        .upsert(
            "graders",
            &fields(&[("grader_id", Some("g-5")), ("name", Some("Mr. Lee"))]),
        )
        .unwrap();
    let path = store.save_table("graders").unwrap();

    assert_eq!(path, config.data_dir.join("graders_data.sql"));
    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "INSERT INTO graders (grader_id, name, rubric, weight) VALUES ('g-5', 'Mr. Lee', NULL, NULL);\n"
    );
}

#[test]
fn unknown_table_is_rejected_without_touching_files() {
    let (_dir, config) = scratch_store();
    let before = fs::read(samples_file(&config)).unwrap();

    let mut store = RecordStore::open(&config).unwrap();
    let err = store
        .upsert("essays", &fields(&[("sample_id", Some("x"))]))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownTable(ref t) if t == "essays"));
    assert!(matches!(
        store.save_table("essays"),
        Err(StoreError::UnknownTable(_))
    ));

    store.save_all().unwrap();
    assert_eq!(fs::read(samples_file(&config)).unwrap(), before);
}

#[test]
fn unknown_column_and_missing_key_are_rejected() {
    let (_dir, config) = scratch_store();
    let mut store = RecordStore::open(&config).unwrap();

    let err = store
        .upsert(
            "samples",
            &fields(&[("sample_id", Some("s-9")), ("score", Some("4"))]),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownColumn { ref column, .. } if column == "score"));

    let err = store
        .upsert("samples", &fields(&[("essay_text", Some("no key"))]))
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingPrimaryKey { ref column, .. } if column == "sample_id"));

    let count = store.query("SELECT COUNT(*) FROM samples", []).unwrap();
    assert_eq!(count[0][0], Value::Integer(3));
}

#[test]
fn broken_schema_file_fails_the_load() {
    let (_dir, config) = scratch_store();
    fs::write(
        config.schema_dir.join("03_broken.sql"),
        "CREATE TABLE oops (id TEXT PRIMARY KEY,,);\n",
    )
    .unwrap();

    match RecordStore::open(&config) {
        Err(StoreError::SchemaLoad { path, .. }) => {
            assert!(path.ends_with("03_broken.sql"));
        }
        other => panic!("expected a schema load error, got {other:?}"),
    }
}

#[test]
fn broken_data_file_fails_the_load() {
    let (_dir, config) = scratch_store();
    fs::write(
        config.data_dir.join("zz_bad_data.sql"),
        "INSERT INTO nowhere (id) VALUES ('1');\n",
    )
    .unwrap();
    assert!(matches!(
        RecordStore::open(&config),
        Err(StoreError::SchemaLoad { .. })
    ));
}

#[test]
fn missing_data_dir_loads_empty_tables() {
    let (dir, mut config) = scratch_store();
    config.data_dir = dir.path().join("fresh");

    let store = RecordStore::open(&config).unwrap();
    let rows = store.query("SELECT * FROM samples", []).unwrap();
    assert!(rows.is_empty());

    store.save_all().unwrap();
    assert_eq!(fs::read_to_string(config.data_dir.join("samples_data.sql")).unwrap(), "");
}

#[test]
fn config_fixture_points_at_the_fixture_store() {
    let config = EssayConfig::load_from_ron(Path::new("tests/fixtures/essay_config.ron")).unwrap();
    let store_config = config.store.unwrap();
    let store = RecordStore::open(&store_config).unwrap();
    assert_eq!(store_config.table, "samples");
    assert!(store.table("samples").is_ok());
}

#[test]
fn multi_paragraph_text_saves_idempotently_and_reloads() {
    let (_dir, config) = scratch_store();
    let essay = "Para one.\n\nPara two; with a semicolon.\n";
    let mut store = RecordStore::open(&config).unwrap();
    store
        .upsert(
            "samples",
            &fields(&[("sample_id", Some("s-010")), ("essay_text", Some(essay))]),
        )
        .unwrap();

    store.save_all().unwrap();
    let first = fs::read_to_string(samples_file(&config)).unwrap();
    assert_eq!(first.matches("'s-010'").count(), 1);

    store.save_all().unwrap();
    let second = fs::read_to_string(samples_file(&config)).unwrap();
    assert_eq!(second, first);
    store.close().unwrap();

    let reloaded = RecordStore::open(&config).unwrap();
    let rows = reloaded
        .query("SELECT essay_text FROM samples WHERE sample_id = 's-010'", [])
        .unwrap();
    assert_eq!(rows, vec![vec![Value::Text(essay.to_string())]]);
    reloaded.save_all().unwrap();
    assert_eq!(fs::read_to_string(samples_file(&config)).unwrap(), first);
}

#[test]
fn split_and_multi_row_inserts_are_rewritten_not_duplicated() {
    let (_dir, config) = scratch_store();
    let graders = config.data_dir.join("graders_data.sql");
    let original = fs::read_to_string(&graders).unwrap();

    let mut store = RecordStore::open(&config).unwrap();
    let count = store.query("SELECT COUNT(*) FROM graders", []).unwrap();
    assert_eq!(count[0][0], Value::Integer(4));
    let weight = store
        .query("SELECT weight FROM graders WHERE grader_id = 'g-2'", [])
        .unwrap();
    assert_eq!(weight[0][0], Value::Real(0.5));

    store
        .upsert(
            "graders",
            &fields(&[
                ("grader_id", Some("g-4")),
                ("name", Some("Mx. Park")),
                ("rubric", Some("analytic")),
                ("weight", Some("1.5")),
            ]),
        )
        .unwrap();
    store.save_all().unwrap();

    let saved = fs::read_to_string(&graders).unwrap();
    let split_row = "INSERT INTO graders (grader_id, name, rubric, weight)\n  VALUES ('g-2', 'Mr. Lee', 'holistic:\ncontent first, then mechanics', '0.5');\n";
    assert!(original.contains(split_row));
    assert!(saved.contains(split_row));
    assert!(saved.ends_with(
        "-- Calibration pair, added together.\n\
         INSERT INTO graders (grader_id, name, rubric, weight) VALUES ('g-3', 'Dr. Chen', NULL, '2');\n\
         INSERT INTO graders (grader_id, name, rubric, weight) VALUES ('g-4', 'Mx. Park', 'analytic', '1.5');\n"
    ));
    assert_eq!(saved.matches("'g-4'").count(), 1);
    store.close().unwrap();

    let reloaded = RecordStore::open(&config).unwrap();
    let count = reloaded.query("SELECT COUNT(*) FROM graders", []).unwrap();
    assert_eq!(count[0][0], Value::Integer(4));
    reloaded.save_all().unwrap();
    assert_eq!(fs::read_to_string(&graders).unwrap(), saved);
}

#[test]
fn insert_with_expressions_blocks_the_save() {
    let (_dir, config) = scratch_store();
    let graders = config.data_dir.join("graders_data.sql");
    let mut text = fs::read_to_string(&graders).unwrap();
    text.push_str("INSERT INTO graders (grader_id, name) VALUES ('g-9', upper('ann'));\n");
    fs::write(&graders, &text).unwrap();

    let store = RecordStore::open(&config).unwrap();
    let err = store.save_table("graders").unwrap_err();
    assert!(matches!(err, StoreError::UnrecognizedRow(ref e) if e.table == "graders"));
    assert_eq!(fs::read_to_string(&graders).unwrap(), text);
}
