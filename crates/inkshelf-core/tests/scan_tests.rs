use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use tempfile::tempdir;

use inkshelf_core::config::LibraryConfig;
use inkshelf_core::folders;
use inkshelf_core::storage::models::{FileStatus, SeriesStatus};
use inkshelf_core::storage::Database;
use inkshelf_core::{AppConfig, ApplyOutcome, ScanEngine, ScanResult};

/// Write a comic with a fixed mtime so identical bytes give identical fingerprints.
fn write_comic(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = fs::File::create(path).unwrap();
    file.write_all(content).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        .unwrap();
}

fn engine_for(root: &Path) -> (ScanEngine, i64) {
    let config = AppConfig {
        libraries: vec![LibraryConfig {
            name: "comics".to_string(),
            root_path: root.to_string_lossy().into_owned(),
        }],
        ..AppConfig::default()
    };
    let engine = ScanEngine::with_database(config, Database::open_in_memory().unwrap());
    let libraries = engine.sync_libraries().unwrap();
    (engine, libraries[0].id)
}

/// Scan, apply, and wait for the linking pass.
fn scan_and_apply(engine: &ScanEngine, library_id: i64) -> (ScanResult, ApplyOutcome) {
    let result = engine.scan_library(library_id).unwrap();
    let applied = engine.apply_scan_results(&result).unwrap();
    applied.linking.join().unwrap();
    (result, applied.outcome)
}

fn file_id_at(engine: &ScanEngine, library_id: i64, relative_path: &str) -> i64 {
    let db = engine.database();
    let db = db.lock().unwrap();
    db.get_catalog_file_by_path(library_id, relative_path)
        .unwrap()
        .unwrap()
        .id
}

#[test]
fn test_first_scan_catalogs_supported_files() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("Batman (2011)/001.cbr"), b"batman 1");
    write_comic(&root.join("Batman (2011)/002.cbr"), b"batman 2");
    write_comic(&root.join("Saga/01.cbr"), b"saga 1");
    write_comic(&root.join(".hidden/secret.cbr"), b"hidden");
    write_comic(&root.join("Saga/notes.txt"), b"not a comic");

    let (engine, lib) = engine_for(root);
    let result = engine.scan_library(lib).unwrap();

    let new_paths: Vec<&str> = result.new_files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(
        new_paths,
        vec!["Batman (2011)/001.cbr", "Batman (2011)/002.cbr", "Saga/01.cbr"]
    );
    assert!(result.moved.is_empty());
    assert!(result.orphaned.is_empty());
    assert!(result.new_files.iter().all(|f| f.fingerprint.is_some()));

    // Planning alone writes nothing.
    {
        let db = engine.database();
        let db = db.lock().unwrap();
        assert!(db.load_library_snapshot(lib).unwrap().is_empty());
    }

    let applied = engine.apply_scan_results(&result).unwrap();
    assert_eq!(applied.outcome.added, 3);
    assert_eq!(applied.outcome.new_file_ids.len(), 3);
    let summary = applied.linking.join().unwrap();
    assert_eq!(summary.indexed, 3);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.linked, 1);

    let db = engine.database();
    let db = db.lock().unwrap();
    let batman = db.get_folder_by_path(lib, "Batman (2011)").unwrap().unwrap();
    assert_eq!((batman.file_count, batman.total_files), (2, 2));
    let stats = db.library_stats(&db.get_library(lib).unwrap().unwrap()).unwrap();
    assert_eq!(stats.indexed, 3);
    assert_eq!(stats.series, 2);
}

#[test]
fn test_rescan_without_changes_is_a_no_op() {
    let tmp = tempdir().unwrap();
    write_comic(&tmp.path().join("Saga/01.cbr"), b"saga 1");
    write_comic(&tmp.path().join("Saga/02.cbr"), b"saga 2");

    let (engine, lib) = engine_for(tmp.path());
    scan_and_apply(&engine, lib);

    let result = engine.scan_library(lib).unwrap();
    assert_eq!(result.unchanged.len(), 2);
    assert!(!result.has_changes());
}

#[test]
fn test_moved_file_keeps_identity() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("Batman/001.cbr"), b"batman issue one");

    let (engine, lib) = engine_for(root);
    scan_and_apply(&engine, lib);
    let original_id = file_id_at(&engine, lib, "Batman/001.cbr");

    fs::create_dir_all(root.join("Batman (2011)")).unwrap();
    fs::rename(root.join("Batman/001.cbr"), root.join("Batman (2011)/001.cbr")).unwrap();

    let (result, outcome) = scan_and_apply(&engine, lib);
    assert_eq!(result.moved.len(), 1);
    assert_eq!(result.new_files.len(), 0);
    assert_eq!(result.orphaned.len(), 0);
    assert_eq!(result.moved[0].file_id, original_id);
    assert_eq!(result.moved[0].old_relative_path, "Batman/001.cbr");
    assert_eq!(outcome.moved, 1);

    assert_eq!(file_id_at(&engine, lib, "Batman (2011)/001.cbr"), original_id);

    let db = engine.database();
    let db = db.lock().unwrap();
    let file = db.get_catalog_file(original_id).unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Indexed);
    assert!(file.series_id.is_some());

    let old = db.get_folder_by_path(lib, "Batman").unwrap().unwrap();
    let new = db.get_folder_by_path(lib, "Batman (2011)").unwrap().unwrap();
    assert_eq!((old.file_count, old.total_files), (0, 0));
    assert_eq!((new.file_count, new.total_files), (1, 1));
    assert_eq!(file.folder_id, Some(new.id));
}

#[test]
fn test_vanished_series_files_are_removed_and_series_archived() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("Superman/1.cbr"), b"superman 1");
    write_comic(&root.join("Superman/2.cbr"), b"superman 2");
    write_comic(&root.join("Saga/1.cbr"), b"saga 1");

    let (engine, lib) = engine_for(root);
    scan_and_apply(&engine, lib);

    let superman_series = {
        let db = engine.database();
        let db = db.lock().unwrap();
        let file = db.get_catalog_file_by_path(lib, "Superman/1.cbr").unwrap().unwrap();
        let series_id = file.series_id.unwrap();
        let other = db.get_catalog_file_by_path(lib, "Superman/2.cbr").unwrap().unwrap();
        assert_eq!(other.series_id, Some(series_id));
        series_id
    };

    fs::remove_dir_all(root.join("Superman")).unwrap();

    let (result, outcome) = scan_and_apply(&engine, lib);
    assert_eq!(result.orphaned.len(), 2);
    assert_eq!(result.unchanged.len(), 1);
    assert_eq!(outcome.removed, 2);
    assert_eq!(outcome.series_archived, 1);

    let db = engine.database();
    let db = db.lock().unwrap();
    assert!(db.get_catalog_file_by_path(lib, "Superman/1.cbr").unwrap().is_none());
    assert!(db.get_catalog_file_by_path(lib, "Superman/2.cbr").unwrap().is_none());
    let series = db.get_series(superman_series).unwrap().unwrap();
    assert_eq!(series.status, SeriesStatus::Archived);
    assert_eq!(series.cover_file_id, None);

    let folder = db.get_folder_by_path(lib, "Superman").unwrap().unwrap();
    assert_eq!(folder.total_files, 0);
}

#[test]
fn test_fingerprint_collision_claims_lowest_id_first() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("A/x.cbr"), b"same bytes");
    write_comic(&root.join("B/y.cbr"), b"same bytes");

    let (engine, lib) = engine_for(root);
    scan_and_apply(&engine, lib);
    let first = file_id_at(&engine, lib, "A/x.cbr");
    let second = file_id_at(&engine, lib, "B/y.cbr");
    assert!(first < second);

    fs::remove_file(root.join("A/x.cbr")).unwrap();
    fs::remove_file(root.join("B/y.cbr")).unwrap();
    write_comic(&root.join("C/z.cbr"), b"same bytes");

    let result = engine.scan_library(lib).unwrap();
    assert_eq!(result.moved.len(), 1);
    assert_eq!(result.moved[0].file_id, first);
    assert_eq!(result.orphaned.len(), 1);
    assert_eq!(result.orphaned[0].file_id, second);
    assert!(result.new_files.is_empty());
}

#[test]
fn test_copies_of_existing_file_are_new() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("A/x.cbr"), b"original bytes");

    let (engine, lib) = engine_for(root);
    scan_and_apply(&engine, lib);

    // The original is still in place, so a byte-identical copy is a new file.
    write_comic(&root.join("B/x.cbr"), b"original bytes");
    let result = engine.scan_library(lib).unwrap();
    assert_eq!(result.unchanged.len(), 1);
    assert_eq!(result.new_files.len(), 1);
    assert!(result.moved.is_empty());
}

#[test]
fn test_two_copies_of_vanished_file_claim_once() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("A/x.cbr"), b"original bytes");

    let (engine, lib) = engine_for(root);
    scan_and_apply(&engine, lib);
    let original = file_id_at(&engine, lib, "A/x.cbr");

    fs::remove_file(root.join("A/x.cbr")).unwrap();
    write_comic(&root.join("B/x.cbr"), b"original bytes");
    write_comic(&root.join("C/x.cbr"), b"original bytes");

    let result = engine.scan_library(lib).unwrap();
    assert_eq!(result.moved.len(), 1);
    assert_eq!(result.moved[0].file_id, original);
    assert_eq!(result.moved[0].new_relative_path, "B/x.cbr");
    assert_eq!(result.new_files.len(), 1);
    assert_eq!(result.new_files[0].relative_path, "C/x.cbr");
    assert!(result.orphaned.is_empty());
}

#[test]
fn test_apply_heals_leftover_orphans_and_recatalogs_resighted_ones() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("S/gone.cbr"), b"gone");
    write_comic(&root.join("S/back.cbr"), b"back");
    write_comic(&root.join("S/fine.cbr"), b"fine");

    let (engine, lib) = engine_for(root);
    scan_and_apply(&engine, lib);
    let gone = file_id_at(&engine, lib, "S/gone.cbr");
    let back = file_id_at(&engine, lib, "S/back.cbr");

    // Simulate an apply that marked rows orphaned and stopped before deleting them.
    {
        let db = engine.database();
        let db = db.lock().unwrap();
        db.set_file_status(gone, FileStatus::Orphaned).unwrap();
        db.set_file_status(back, FileStatus::Orphaned).unwrap();
    }
    fs::remove_file(root.join("S/gone.cbr")).unwrap();

    let (result, outcome) = scan_and_apply(&engine, lib);
    assert!(result.orphaned.is_empty());
    assert_eq!(outcome.healed, 1);
    assert_eq!(outcome.readded, 1);
    assert_eq!(outcome.new_file_ids.len(), 1);

    let readded = file_id_at(&engine, lib, "S/back.cbr");
    assert_ne!(readded, back);
    assert_eq!(outcome.new_file_ids, vec![readded]);

    {
        let db = engine.database();
        let db = db.lock().unwrap();
        assert!(db.get_catalog_file(gone).unwrap().is_none());
        assert!(db.get_catalog_file(back).unwrap().is_none());
        let file = db.get_catalog_file(readded).unwrap().unwrap();
        assert_ne!(file.status, FileStatus::Orphaned);
        assert_ne!(file.status, FileStatus::Quarantined);
        assert!(file.fingerprint.is_some());
        let folder = db.get_folder_by_path(lib, "S").unwrap().unwrap();
        assert_eq!(folder.file_count, 2);
    }

    // The next scan sees the re-added file as unchanged and leaves it alone.
    let (result, outcome) = scan_and_apply(&engine, lib);
    assert!(!result.has_changes());
    assert_eq!(outcome.readded, 0);
    assert_eq!(file_id_at(&engine, lib, "S/back.cbr"), readded);
}

#[test]
fn test_applying_a_stale_plan_skips_cataloged_paths() {
    let tmp = tempdir().unwrap();
    write_comic(&tmp.path().join("Saga/01.cbr"), b"saga 1");

    let (engine, lib) = engine_for(tmp.path());
    let result = engine.scan_library(lib).unwrap();
    engine.apply_scan_results(&result).unwrap().linking.join().unwrap();

    let applied = engine.apply_scan_results(&result).unwrap();
    applied.linking.join().unwrap();
    assert_eq!(applied.outcome.added, 0);
    assert_eq!(applied.outcome.errors.len(), 1);

    let db = engine.database();
    let db = db.lock().unwrap();
    assert_eq!(db.load_library_snapshot(lib).unwrap().len(), 1);
    assert_eq!(db.get_folder_by_path(lib, "Saga").unwrap().unwrap().file_count, 1);
}

#[test]
fn test_ignore_patterns_skip_matching_paths() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("Keep/1.cbr"), b"keep");
    write_comic(&root.join("Trash/1.cbr"), b"trash");

    let mut config = AppConfig {
        libraries: vec![LibraryConfig {
            name: "comics".to_string(),
            root_path: root.to_string_lossy().into_owned(),
        }],
        ..AppConfig::default()
    };
    config.scan.ignore_patterns = vec!["*/Trash".to_string()];
    let engine = ScanEngine::with_database(config, Database::open_in_memory().unwrap());
    let lib = engine.sync_libraries().unwrap()[0].id;

    let result = engine.scan_library(lib).unwrap();
    assert_eq!(result.new_files.len(), 1);
    assert_eq!(result.new_files[0].relative_path, "Keep/1.cbr");
}

#[test]
fn test_scan_unknown_library_fails() {
    let tmp = tempdir().unwrap();
    let (engine, _) = engine_for(tmp.path());
    assert!(engine.scan_library(4242).is_err());
}

#[test]
fn test_scan_after_folder_rename_finds_files_unchanged() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_comic(&root.join("Bat/001.cbz"), b"batman 1");

    let (engine, lib) = engine_for(root);
    scan_and_apply(&engine, lib);
    let id = file_id_at(&engine, lib, "Bat/001.cbz");

    engine
        .with_db(|db| {
            let bat = folders::folder_at_path(db, lib, "Bat")?;
            folders::rename_folder(db, bat.id, "Batman")
        })
        .unwrap();
    fs::rename(root.join("Bat"), root.join("Batman")).unwrap();

    let (result, _) = scan_and_apply(&engine, lib);
    assert!(!result.has_changes());
    assert_eq!(file_id_at(&engine, lib, "Batman/001.cbz"), id);

    let roots = engine.with_db(|db| folders::root_folders(db, lib)).unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].path, "Batman");
    assert_eq!(roots[0].file_count, 1);
}
