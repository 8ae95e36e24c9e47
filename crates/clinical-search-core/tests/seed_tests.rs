//! Seeding tests against file-backed databases.

use std::fs;

use clinical_search_core::{
    CodeEntry, CsvSeeder, Database, SearchEngine, SeedError, SqliteStore, TieredSearchEngine,
};

const FIRST_RELEASE: &str = "\
code,description,search_terms
E10,Diabetes mellitus tipo 1,
E11,Diabetes mellitus tipo 2,dm2
J45,Asma,
";

const SECOND_RELEASE: &str = "\
code,description
E10,Diabetes mellitus tipo 1
E11,Diabetes mellitus tipo 2
J45,Asma bronquial
J45,Asma bronquial
I10,Hipertensión esencial
";

#[test]
fn test_seeding_twice_keeps_one_entry_per_code() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("icd10.csv");
    fs::write(&csv_path, FIRST_RELEASE).unwrap();

    let mut db = Database::open(dir.path().join("clinical.db")).unwrap();
    let seeder = CsvSeeder::new();

    let first = seeder.seed_file(&mut db, &csv_path).unwrap();
    let again = seeder.seed_file(&mut db, &csv_path).unwrap();

    assert_eq!(first.inserted, 3);
    assert_eq!((again.inserted, again.updated, again.unchanged), (0, 0, 3));
    assert_eq!(db.count_code_entries().unwrap(), 3);
    assert_eq!(again.source, csv_path.display().to_string());
}

#[test]
fn test_latest_description_wins_and_terms_survive() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(dir.path().join("clinical.db")).unwrap();
    let seeder = CsvSeeder::new();

    seeder
        .seed_bytes(&mut db, "release-1", FIRST_RELEASE.as_bytes())
        .unwrap();
    let report = seeder
        .seed_bytes(&mut db, "release-2", SECOND_RELEASE.as_bytes())
        .unwrap();

    // Duplicate J45 row: updated once, then unchanged
    assert_eq!(report.inserted, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 3);

    let asthma = db.get_code_entry("J45").unwrap().unwrap();
    assert_eq!(asthma.description, "Asma bronquial");

    // The second release has no search_terms column
    let dm2 = db.get_code_entry("E11").unwrap().unwrap();
    assert_eq!(dm2.search_terms.as_deref(), Some("dm2"));

    db.check_search_index().unwrap();
}

#[test]
fn test_seeded_file_is_searchable_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("clinical.db");
    {
        let mut db = Database::open(&db_path).unwrap();
        CsvSeeder::new()
            .seed_bytes(&mut db, "release-1", FIRST_RELEASE.as_bytes())
            .unwrap();
    }

    let engine = TieredSearchEngine::new(SqliteStore::open(&db_path).unwrap());
    let codes: Vec<_> = engine
        .search("dm2", None)
        .unwrap()
        .into_iter()
        .map(|s| s.code)
        .collect();
    assert_eq!(codes, vec!["E11"]);
    assert_eq!(
        engine.get_by_code("J45").unwrap(),
        Some(CodeEntry::new("J45", "Asma"))
    );
}

#[test]
fn test_seed_runs_are_recorded() {
    let mut db = Database::open_in_memory().unwrap();
    let seeder = CsvSeeder::new();
    let first = seeder
        .seed_bytes(&mut db, "release-1", FIRST_RELEASE.as_bytes())
        .unwrap();
    let second = seeder
        .seed_bytes(&mut db, "release-2", SECOND_RELEASE.as_bytes())
        .unwrap();

    assert_ne!(first.source_sha256, second.source_sha256);
    assert!(first.finished_at >= first.started_at);

    let runs = db.list_seed_reports(10).unwrap();
    let run_ids: Vec<_> = runs.iter().map(|r| r.run_id).collect();
    assert!(run_ids.contains(&first.run_id));
    assert!(run_ids.contains(&second.run_id));
}

#[test]
fn test_missing_file() {
    let mut db = Database::open_in_memory().unwrap();
    let result = CsvSeeder::new().seed_file(&mut db, "/nonexistent/icd10.csv");
    assert!(matches!(result, Err(SeedError::Io(_))));
}
