use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

use inkshelf_core::folders::{self, DeleteFolderOutcome};
use inkshelf_core::scan::remove_catalog_file;
use inkshelf_core::storage::models::*;
use inkshelf_core::storage::Database;
use inkshelf_core::Error;

fn setup() -> (Database, Library) {
    let db = Database::open_in_memory().unwrap();
    let lib = db.upsert_library("comics", "/comics").unwrap();
    (db, lib)
}

/// Insert a file the way an apply does: ensure its folder, insert, bump counts.
fn add_file(db: &Database, library_id: i64, relative_path: &str) -> i64 {
    let (folder_path, file_name) = relative_path.rsplit_once('/').unwrap();
    let folder = folders::ensure_folder_path(db, library_id, folder_path).unwrap();
    let id = db
        .insert_catalog_file(&NewCatalogFile {
            library_id,
            absolute_path: format!("/comics/{}", relative_path),
            relative_path: relative_path.to_string(),
            file_name: file_name.to_string(),
            extension: "cbz".to_string(),
            file_size: 10,
            last_modified: 0,
            fingerprint: Some(format!("fp-{}", relative_path)),
            folder_id: Some(folder.id),
        })
        .unwrap();
    folders::increment_folder_file_counts(db, folder.id, 1).unwrap();
    id
}

fn folder(db: &Database, library_id: i64, path: &str) -> Folder {
    db.get_folder_by_path(library_id, path).unwrap().unwrap()
}

#[test]
fn test_ensure_folder_path_creates_missing_ancestors() {
    let (db, lib) = setup();

    let z = folders::ensure_folder_path(&db, lib.id, "X/Y/Z").unwrap();
    let x = folder(&db, lib.id, "X");
    let y = folder(&db, lib.id, "X/Y");

    assert_eq!((x.depth, y.depth, z.depth), (0, 1, 2));
    assert_eq!(x.parent_id, None);
    assert_eq!(y.parent_id, Some(x.id));
    assert_eq!(z.parent_id, Some(y.id));
    assert_eq!(x.child_count, 1);
    assert_eq!(y.child_count, 1);
    assert_eq!(z.child_count, 0);
    assert_eq!(z.name, "Z");
}

#[test]
fn test_ensure_folder_path_is_idempotent() {
    let (db, lib) = setup();

    let first = folders::ensure_folder_path(&db, lib.id, "X/Y").unwrap();
    let again = folders::ensure_folder_path(&db, lib.id, "/X/Y/").unwrap();
    folders::ensure_folder_path(&db, lib.id, "X/W").unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(folder(&db, lib.id, "X").child_count, 2);
    assert_eq!(db.library_folders(lib.id).unwrap().len(), 3);
}

#[test]
fn test_ensure_folder_path_rejects_bad_input() {
    let (db, lib) = setup();
    assert!(folders::ensure_folder_path(&db, lib.id, "").is_err());
    assert!(folders::ensure_folder_path(&db, lib.id, "X/../Y").is_err());
    assert!(matches!(
        folders::ensure_folder_path(&db, 999, "X"),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_file_counts_propagate_to_ancestors() {
    let (db, lib) = setup();
    add_file(&db, lib.id, "X/Y/Z/1.cbz");
    add_file(&db, lib.id, "X/Y/Z/2.cbz");
    add_file(&db, lib.id, "X/3.cbz");

    let x = folder(&db, lib.id, "X");
    let y = folder(&db, lib.id, "X/Y");
    let z = folder(&db, lib.id, "X/Y/Z");
    assert_eq!((x.file_count, x.total_files), (1, 3));
    assert_eq!((y.file_count, y.total_files), (0, 2));
    assert_eq!((z.file_count, z.total_files), (2, 2));

    folders::increment_folder_file_counts(&db, z.id, -1).unwrap();
    assert_eq!(folder(&db, lib.id, "X").total_files, 2);
    assert_eq!(folder(&db, lib.id, "X/Y/Z").file_count, 1);
}

#[test]
fn test_recalculate_repairs_drifted_counts() {
    let (db, lib) = setup();
    add_file(&db, lib.id, "X/Y/1.cbz");
    add_file(&db, lib.id, "X/2.cbz");

    db.connection()
        .execute("UPDATE folder SET file_count = 40, total_files = 99, child_count = 7", [])
        .unwrap();

    let updated = folders::recalculate_library_counts(&db, lib.id).unwrap();
    assert_eq!(updated, 2);

    let x = folder(&db, lib.id, "X");
    let y = folder(&db, lib.id, "X/Y");
    assert_eq!((x.file_count, x.total_files, x.child_count), (1, 2, 1));
    assert_eq!((y.file_count, y.total_files, y.child_count), (1, 1, 0));

    db.connection()
        .execute("UPDATE folder SET file_count = 5 WHERE path = 'X/Y'", [])
        .unwrap();
    let y = folders::recalculate_folder_counts(&db, y.id).unwrap();
    assert_eq!(y.file_count, 1);
}

#[test]
fn test_rename_folder_rewrites_descendants() {
    let (db, lib) = setup();
    add_file(&db, lib.id, "Marvel/X-Men/Uncanny/1.cbz");
    let xmen = folder(&db, lib.id, "Marvel/X-Men");

    let renamed = folders::rename_folder(&db, xmen.id, "X-Men (1991)").unwrap();
    assert_eq!(renamed.id, xmen.id);
    assert_eq!(renamed.path, "Marvel/X-Men (1991)");
    assert_eq!(renamed.name, "X-Men (1991)");

    let child = folder(&db, lib.id, "Marvel/X-Men (1991)/Uncanny");
    assert_eq!(child.parent_id, Some(xmen.id));
    assert!(db.get_folder_by_path(lib.id, "Marvel/X-Men/Uncanny").unwrap().is_none());
    assert_eq!(renamed.total_files, 1);
}

#[test]
fn test_removing_a_file_decrements_folder_and_ancestors() {
    let (db, lib) = setup();
    let deep = add_file(&db, lib.id, "X/Y/a.cbz");
    add_file(&db, lib.id, "X/b.cbz");
    assert_eq!(folder(&db, lib.id, "X").total_files, 2);

    let file = db.get_catalog_file(deep).unwrap().unwrap();
    remove_catalog_file(&db, &file).unwrap();

    let x = folder(&db, lib.id, "X");
    let y = folder(&db, lib.id, "X/Y");
    assert_eq!((y.file_count, y.total_files), (0, 0));
    assert_eq!((x.file_count, x.total_files), (1, 1));
}

#[test]
fn test_rename_folder_rewrites_file_paths_below_it() {
    let (db, lib) = setup();
    let inside = add_file(&db, lib.id, "Bat/001.cbz");
    let nested = add_file(&db, lib.id, "Bat/Annuals/a1.cbz");
    let sibling = add_file(&db, lib.id, "Batgirl/001.cbz");
    let bat = folder(&db, lib.id, "Bat");

    folders::rename_folder(&db, bat.id, "Batman").unwrap();

    let file = db.get_catalog_file(inside).unwrap().unwrap();
    assert_eq!(file.relative_path, "Batman/001.cbz");
    assert_eq!(file.absolute_path, "/comics/Batman/001.cbz");
    assert_eq!(file.file_name, "001.cbz");
    assert_eq!(file.folder_id, Some(bat.id));

    let file = db.get_catalog_file(nested).unwrap().unwrap();
    assert_eq!(file.relative_path, "Batman/Annuals/a1.cbz");
    assert_eq!(file.absolute_path, "/comics/Batman/Annuals/a1.cbz");

    let file = db.get_catalog_file(sibling).unwrap().unwrap();
    assert_eq!(file.relative_path, "Batgirl/001.cbz");
    assert_eq!(file.absolute_path, "/comics/Batgirl/001.cbz");
}

#[test]
fn test_rename_folder_rejects_collisions_and_bad_names() {
    let (db, lib) = setup();
    let a = folders::ensure_folder_path(&db, lib.id, "Root/A").unwrap();
    folders::ensure_folder_path(&db, lib.id, "Root/B").unwrap();

    for name in ["B", "", "  ", "a/b", ".."] {
        let err = folders::rename_folder(&db, a.id, name).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)), "name {:?}", name);
    }
    assert_eq!(folder(&db, lib.id, "Root/A").id, a.id);
}

#[test]
fn test_prune_empty_folders_cascades_upward() {
    let (db, lib) = setup();
    folders::ensure_folder_path(&db, lib.id, "Empty/Deeper/Deepest").unwrap();
    add_file(&db, lib.id, "Kept/1.cbz");
    folders::ensure_folder_path(&db, lib.id, "Kept/EmptyChild").unwrap();

    let removed = folders::prune_empty_folders(&db, lib.id).unwrap();
    assert_eq!(removed, 4);

    let remaining = db.library_folders(lib.id).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path, "Kept");
    assert_eq!(remaining[0].child_count, 0);
    assert_eq!(folders::prune_empty_folders(&db, lib.id).unwrap(), 0);
}

#[test]
fn test_delete_folder_requires_force_when_not_empty() {
    let (db, lib) = setup();
    let file_id = add_file(&db, lib.id, "Top/Sub/1.cbz");
    add_file(&db, lib.id, "Top/2.cbz");
    let sub = folder(&db, lib.id, "Top/Sub");

    let err = folders::delete_folder(&db, sub.id, false).unwrap_err();
    assert!(matches!(err, Error::Precondition(msg) if msg.contains("not empty")));

    let outcome = folders::delete_folder(&db, sub.id, true).unwrap();
    assert_eq!(
        outcome,
        DeleteFolderOutcome {
            folders_removed: 1,
            files_removed: 1,
            series_archived: 0,
        }
    );
    assert!(db.get_catalog_file(file_id).unwrap().is_none());

    let top = folder(&db, lib.id, "Top");
    assert_eq!((top.file_count, top.total_files, top.child_count), (1, 1, 0));
}

#[test]
fn test_delete_empty_folder_without_force() {
    let (db, lib) = setup();
    let empty = folders::ensure_folder_path(&db, lib.id, "Parent/Empty").unwrap();
    folders::delete_folder(&db, empty.id, false).unwrap();
    assert_eq!(folder(&db, lib.id, "Parent").child_count, 0);
}

#[test]
fn test_browse_tree() {
    let (db, lib) = setup();
    add_file(&db, lib.id, "DC/Batman/1.cbz");
    add_file(&db, lib.id, "DC/Superman/Action/1.cbz");
    add_file(&db, lib.id, "Image/Saga/1.cbz");

    let roots = folders::root_folders(&db, lib.id).unwrap();
    assert_eq!(
        roots.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        vec!["DC", "Image"]
    );

    let dc = &roots[0];
    let children = folders::child_folders(&db, dc.id).unwrap();
    assert_eq!(children.len(), 2);

    let action = folder(&db, lib.id, "DC/Superman/Action");
    let crumbs = folders::ancestor_chain(&db, action.id).unwrap();
    assert_eq!(
        crumbs.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
        vec!["DC", "DC/Superman", "DC/Superman/Action"]
    );

    let shallow = folders::folder_subtree(&db, dc.id, 1).unwrap();
    assert_eq!(shallow.children.len(), 2);
    assert!(shallow.children.iter().all(|c| c.children.is_empty()));

    let deep = folders::folder_subtree(&db, dc.id, 5).unwrap();
    let superman = deep.children.iter().find(|c| c.folder.name == "Superman").unwrap();
    assert_eq!(superman.children.len(), 1);

    assert_eq!(folders::folder_at_path(&db, lib.id, "Image/Saga").unwrap().total_files, 1);
    assert!(folders::child_folders(&db, 12345).is_err());
}

#[test]
fn test_backfill_builds_tree_once() {
    let (db, lib) = setup();
    for path in ["A/B/1.cbz", "A/B/2.cbz", "A/3.cbz", "loose.cbz"] {
        db.insert_catalog_file(&NewCatalogFile {
            library_id: lib.id,
            absolute_path: format!("/comics/{}", path),
            relative_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap().to_string(),
            extension: "cbz".to_string(),
            file_size: 1,
            last_modified: 0,
            fingerprint: None,
            folder_id: None,
        })
        .unwrap();
    }

    let summary = folders::backfill_library_folders(&db, lib.id).unwrap();
    assert!(!summary.skipped);
    assert_eq!(summary.folders_created, 2);
    assert_eq!(summary.files_linked, 3);

    let a = folder(&db, lib.id, "A");
    assert_eq!((a.file_count, a.total_files, a.child_count), (1, 3, 1));
    assert!(db.get_library(lib.id).unwrap().unwrap().folders_ready);

    let again = folders::backfill_library_folders(&db, lib.id).unwrap();
    assert!(again.skipped);
}

#[test]
fn test_concurrent_ensure_folder_path_converges_on_one_row() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("catalog.db");
    let db_path = db_path.to_str().unwrap();

    let lib = {
        let db = Database::open(db_path).unwrap();
        db.upsert_library("comics", "/comics").unwrap()
    };

    for round in 0..10 {
        let path = format!("R{}/A/B", round);
        let writers = 4;
        let barrier = Arc::new(Barrier::new(writers));
        let handles: Vec<_> = (0..writers)
            .map(|_| {
                let db = Database::open(db_path).unwrap();
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                thread::spawn(move || {
                    barrier.wait();
                    folders::ensure_folder_path(&db, lib.id, &path)
                })
            })
            .collect();

        let ids: Vec<i64> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap().id)
            .collect();
        assert!(ids.iter().all(|id| *id == ids[0]));

        let db = Database::open(db_path).unwrap();
        let leaf = folder(&db, lib.id, &path);
        assert_eq!(leaf.id, ids[0]);
        assert_eq!(folder(&db, lib.id, &format!("R{}", round)).child_count, 1);
        assert_eq!(folder(&db, lib.id, &format!("R{}/A", round)).child_count, 1);
        assert_eq!(leaf.child_count, 0);
    }
}
