//! Write-back integration tests
//!
//! The export on disk must only ever end up either fully rewritten and valid,
//! or byte-identical to what it was before the call.

mod helpers;

use helpers::{
    create_test_catalog, itl_track, write_book_file, write_itl, ExportBuilder, FailingValidator,
    FakeOrganizer, RecordingReporter, TrackSpec,
};
use shelf_common::config::{ImportTuning, ItunesConfig, PathMapping};
use shelf_common::events::{EventBus, ShelfEvent};
use shelf_itunes::catalog::CatalogStore;
use shelf_itunes::db::SqliteCatalog;
use shelf_itunes::export::parse_library;
use shelf_itunes::fingerprint::LibraryFingerprint;
use shelf_itunes::itl::parse_itl;
use shelf_itunes::location::encode_location;
use shelf_itunes::models::{
    BookSegment, CatalogBook, ImportMode, JobParams, JobState, JobStatusRegistry, LibraryState,
};
use shelf_itunes::services::{
    JobExecutor, ReparseValidator, Sha256Hasher, WriteBackBatcher, WriteBackEngine,
    WriteBackRequest, WriteBackUpdate,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

struct Fixture {
    _db_dir: TempDir,
    temp: TempDir,
    catalog: Arc<SqliteCatalog>,
    library: PathBuf,
    new_path: PathBuf,
    book_id: Uuid,
}

/// Export pointing at an old location; catalog already has the new one
async fn fixture() -> Fixture {
    let (db_dir, catalog) = create_test_catalog().await;
    let temp = TempDir::new().unwrap();

    let old_path = write_book_file(&temp.path().join("old/R&D Notes.m4b"));
    let other = write_book_file(&temp.path().join("old/Other.m4b"));
    let new_path = write_book_file(&temp.path().join("managed/Jane Doe/R&D Notes.m4b"));

    let library = ExportBuilder::new()
        .track(TrackSpec::audiobook(1, "WB01", "Jane Doe", "R&D Notes", &old_path))
        .track(TrackSpec::audiobook(2, "WB02", "John Roe", "Other", &other))
        .write(&temp.path().join("Library.xml"));

    let mut book = CatalogBook::new("R&D Notes", new_path.to_string_lossy());
    book.persistent_id = Some("WB01".to_string());
    catalog.create_book(&book).await.unwrap();

    Fixture {
        _db_dir: db_dir,
        temp,
        catalog,
        library,
        new_path,
        book_id: book.id,
    }
}

fn engine(catalog: &Arc<SqliteCatalog>) -> WriteBackEngine {
    WriteBackEngine::new(catalog.clone(), Arc::new(EventBus::new(16)))
}

fn request(library: &Path, new_path: &Path) -> WriteBackRequest {
    WriteBackRequest::new(
        library,
        vec![WriteBackUpdate {
            persistent_id: "WB01".to_string(),
            new_path: new_path.to_string_lossy().into_owned(),
        }],
    )
}

#[tokio::test]
async fn test_write_back_rewrites_only_target_location() {
    let f = fixture().await;
    let original = std::fs::read_to_string(&f.library).unwrap();

    let event_bus = Arc::new(EventBus::new(16));
    let mut events = event_bus.subscribe();
    let engine = WriteBackEngine::new(f.catalog.clone(), Arc::clone(&event_bus));

    let result = engine.write_back(&request(&f.library, &f.new_path)).await.unwrap();
    assert_eq!(result.updated_count, 1);
    assert_eq!(result.message, "Successfully updated 1 audiobook locations");

    // Backup holds the original bytes
    let backup = result.backup_path.unwrap();
    assert!(backup
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("Library.xml.backup."));
    assert_eq!(std::fs::read_to_string(&backup).unwrap(), original);

    let library = parse_library(&f.library).unwrap();
    let target = library.track_by_persistent_id("WB01").unwrap();
    assert_eq!(target.location, encode_location(&f.new_path));
    let untouched = library.track_by_persistent_id("WB02").unwrap();
    assert_eq!(untouched.location, encode_location(&f.temp.path().join("old/Other.m4b")));

    // Only the location line changed
    let rewritten = std::fs::read_to_string(&f.library).unwrap();
    let changed: Vec<_> = original
        .lines()
        .zip(rewritten.lines())
        .filter(|(a, b)| a != b)
        .collect();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].1.contains("<key>Location</key>"));

    // Fingerprint now matches the rewritten file
    let key = f.library.to_string_lossy().into_owned();
    let stored = f.catalog.get_library_fingerprint(&key).await.unwrap().unwrap();
    let current = LibraryFingerprint::compute(&f.library).await.unwrap();
    assert!(stored.matches_strict(&current));

    match events.recv().await.unwrap() {
        ShelfEvent::LibraryWritten { updated_count, .. } => assert_eq!(updated_count, 1),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_external_change_is_a_conflict() {
    let f = fixture().await;

    let fingerprint = LibraryFingerprint::compute(&f.library).await.unwrap();
    f.catalog.save_library_fingerprint(&fingerprint).await.unwrap();

    // Player rewrote its export after our last sync
    let mut modified = std::fs::read(&f.library).unwrap();
    modified.extend_from_slice(b"\n");
    std::fs::write(&f.library, &modified).unwrap();

    let err = engine(&f.catalog)
        .write_back(&request(&f.library, &f.new_path))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert!(err.to_string().contains("modified externally"));
    assert_eq!(std::fs::read(&f.library).unwrap(), modified);

    // Forcing skips the check
    let mut forced = request(&f.library, &f.new_path);
    forced.force_overwrite = true;
    forced.create_backup = false;
    let result = engine(&f.catalog).write_back(&forced).await.unwrap();
    assert_eq!(result.updated_count, 1);
    assert!(result.backup_path.is_none());
}

#[tokio::test]
async fn test_failed_validation_restores_original() {
    let f = fixture().await;
    let original = std::fs::read(&f.library).unwrap();

    let fingerprint = LibraryFingerprint::compute(&f.library).await.unwrap();
    f.catalog.save_library_fingerprint(&fingerprint).await.unwrap();

    let failing = engine(&f.catalog).with_validator(Arc::new(FailingValidator));
    let err = failing
        .write_back(&request(&f.library, &f.new_path))
        .await
        .unwrap_err();

    assert!(matches!(err, shelf_itunes::Error::WriteBack(_)));
    assert!(err.to_string().contains("original restored"));
    assert_eq!(std::fs::read(&f.library).unwrap(), original);

    // Restoring is not an external edit: a retry goes through
    let result = engine(&f.catalog)
        .write_back(&request(&f.library, &f.new_path))
        .await
        .unwrap();
    assert_eq!(result.updated_count, 1);
}

#[tokio::test]
async fn test_unknown_persistent_ids_are_a_validation_error() {
    let f = fixture().await;
    let original = std::fs::read(&f.library).unwrap();

    let request = WriteBackRequest::new(
        &f.library,
        vec![WriteBackUpdate {
            persistent_id: "NOPE".to_string(),
            new_path: "/nowhere.m4b".to_string(),
        }],
    );
    let err = engine(&f.catalog).write_back(&request).await.unwrap_err();

    assert!(matches!(err, shelf_itunes::Error::Validation(_)));
    assert_eq!(std::fs::read(&f.library).unwrap(), original);
}

#[tokio::test]
async fn test_path_mappings_are_reversed() {
    let f = fixture().await;

    // Export side says /Volumes/Books, catalog side is the temp dir
    let mapping = PathMapping {
        from: "file://localhost/Volumes/Books".to_string(),
        to: encode_location(f.temp.path()),
    };
    let mut request = request(&f.library, &f.new_path);
    request.path_mappings = vec![mapping];
    request.create_backup = false;

    engine(&f.catalog).write_back(&request).await.unwrap();

    let library = parse_library(&f.library).unwrap();
    assert_eq!(
        library.track_by_persistent_id("WB01").unwrap().location,
        "file://localhost/Volumes/Books/managed/Jane%20Doe/R%26D%20Notes.m4b"
    );
}

#[tokio::test]
async fn test_preview_warnings() {
    let f = fixture().await;
    let original = std::fs::read(&f.library).unwrap();

    let mut gone = CatalogBook::new("Other", f.temp.path().join("managed/Other.m4b").to_string_lossy());
    gone.persistent_id = Some("WB02".to_string());
    f.catalog.create_book(&gone).await.unwrap();

    let request = WriteBackRequest::new(
        &f.library,
        vec![
            WriteBackUpdate {
                persistent_id: "WB01".to_string(),
                new_path: f.new_path.to_string_lossy().into_owned(),
            },
            WriteBackUpdate {
                persistent_id: "WB02".to_string(),
                new_path: String::new(),
            },
            WriteBackUpdate {
                persistent_id: "MISSING".to_string(),
                new_path: "/x.m4b".to_string(),
            },
        ],
    );

    let warnings = engine(&f.catalog).preview(&request).await.unwrap();
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].starts_with("New file path does not exist: "));
    assert!(warnings[0].ends_with("Other.m4b"));
    assert_eq!(warnings[1], "Persistent ID not found in library export: MISSING");

    assert_eq!(std::fs::read(&f.library).unwrap(), original);
}

#[tokio::test]
async fn test_updates_for_multi_segment_book() {
    let f = fixture().await;

    let mut book = CatalogBook::new("Saga", "/managed/Saga");
    book.persistent_id = Some("SAGA1".to_string());
    f.catalog.create_book(&book).await.unwrap();
    for (n, pid) in [(1u32, Some("SAGA1")), (2, Some("SAGA2")), (3, None)] {
        f.catalog
            .create_segment(&BookSegment {
                id: Uuid::new_v4(),
                book_id: book.id,
                file_path: format!("/managed/Saga/{:02}.m4b", n),
                format: "m4b".to_string(),
                track_number: Some(n),
                persistent_id: pid.map(str::to_string),
                ..BookSegment::default()
            })
            .await
            .unwrap();
    }

    let no_pid = CatalogBook::new("Loose", "/managed/Loose.m4b");
    f.catalog.create_book(&no_pid).await.unwrap();

    let updates = engine(&f.catalog)
        .updates_for_books(&[book.id, f.book_id, no_pid.id])
        .await
        .unwrap();

    assert_eq!(
        updates,
        vec![
            WriteBackUpdate {
                persistent_id: "SAGA1".to_string(),
                new_path: "/managed/Saga/01.m4b".to_string(),
            },
            WriteBackUpdate {
                persistent_id: "SAGA2".to_string(),
                new_path: "/managed/Saga/02.m4b".to_string(),
            },
            WriteBackUpdate {
                persistent_id: "WB01".to_string(),
                new_path: f.new_path.to_string_lossy().into_owned(),
            },
        ]
    );
}

#[tokio::test]
async fn test_batcher_flushes_on_stop_without_backup() {
    let f = fixture().await;
    let engine = Arc::new(engine(&f.catalog));

    let config = ItunesConfig {
        library_xml_path: Some(f.library.clone()),
        auto_write_back: true,
        write_back_delay_ms: 60_000,
        ..ItunesConfig::default()
    };
    let batcher = WriteBackBatcher::spawn(engine, &config);
    assert!(batcher.is_enabled());

    batcher.enqueue([f.book_id, f.book_id]);
    assert_eq!(batcher.pending_count(), 2);
    batcher.stop().await;

    let library = parse_library(&f.library).unwrap();
    assert_eq!(
        library.track_by_persistent_id("WB01").unwrap().location,
        encode_location(&f.new_path)
    );
    let backups = std::fs::read_dir(f.temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".backup."))
        .count();
    assert_eq!(backups, 0);
}

#[tokio::test]
async fn test_batcher_disabled_without_auto_write_back() {
    let f = fixture().await;
    let original = std::fs::read(&f.library).unwrap();

    let config = ItunesConfig {
        library_xml_path: Some(f.library.clone()),
        ..ItunesConfig::default()
    };
    let batcher = WriteBackBatcher::spawn(Arc::new(engine(&f.catalog)), &config);
    assert!(!batcher.is_enabled());

    batcher.enqueue([f.book_id]);
    assert_eq!(batcher.pending_count(), 0);
    batcher.stop().await;

    assert_eq!(std::fs::read(&f.library).unwrap(), original);
}

#[tokio::test]
async fn test_organized_multi_track_book_writes_new_segment_locations() {
    let (_db_dir, catalog) = create_test_catalog().await;
    let temp = TempDir::new().unwrap();
    let ch1 = write_book_file(&temp.path().join("books/Saga/01.m4b"));
    let ch2 = write_book_file(&temp.path().join("books/Saga/02.m4b"));
    let library = ExportBuilder::new()
        .track(TrackSpec::audiobook(1, "S1", "Jane Doe", "Saga", &ch1).track_number(1))
        .track(TrackSpec::audiobook(2, "S2", "Jane Doe", "Saga", &ch2).track_number(2))
        .write(&temp.path().join("Library.xml"));

    let managed = temp.path().join("managed");
    let organizer = Arc::new(FakeOrganizer::new(&managed.to_string_lossy()));
    let executor = JobExecutor::new(
        catalog.clone(),
        Arc::new(Sha256Hasher),
        Arc::new(EventBus::new(16)),
        JobStatusRegistry::new(),
        ImportTuning::default(),
    )
    .with_organizer(organizer);

    let mut params = JobParams::new(&library);
    params.import_mode = ImportMode::Organize;
    let outcome = executor
        .run_import("job-organize-wb", params, &RecordingReporter::new())
        .await
        .unwrap();
    assert_eq!(outcome.state, JobState::Completed);

    let book = catalog.get_book_by_persistent_id("S1").await.unwrap().unwrap();
    assert_eq!(book.library_state, LibraryState::Organized);
    let book_dir = PathBuf::from(&book.file_path);
    assert!(book_dir.starts_with(&managed));

    let segments = catalog.list_segments(book.id).await.unwrap();
    let segment_paths: Vec<_> = segments.iter().map(|s| s.file_path.clone()).collect();
    assert_eq!(
        segment_paths,
        vec![
            book_dir.join("01.m4b").to_string_lossy().into_owned(),
            book_dir.join("02.m4b").to_string_lossy().into_owned(),
        ]
    );

    let engine = engine(&catalog).with_validator(Arc::new(ReparseValidator));
    let updates = engine.updates_for_books(&[book.id]).await.unwrap();
    assert_eq!(
        updates.iter().map(|u| u.new_path.clone()).collect::<Vec<_>>(),
        segment_paths
    );

    let mut request = WriteBackRequest::new(&library, updates);
    request.create_backup = false;
    let result = engine.write_back(&request).await.unwrap();
    assert_eq!(result.updated_count, 2);

    let export = parse_library(&library).unwrap();
    assert_eq!(
        export.track_by_persistent_id("S1").unwrap().location,
        encode_location(&book_dir.join("01.m4b"))
    );
    assert_eq!(
        export.track_by_persistent_id("S2").unwrap().location,
        encode_location(&book_dir.join("02.m4b"))
    );
}

#[tokio::test]
async fn test_batcher_restarts_delay_on_each_enqueue() {
    let f = fixture().await;
    let config = ItunesConfig {
        library_xml_path: Some(f.library.clone()),
        auto_write_back: true,
        write_back_delay_ms: 300,
        ..ItunesConfig::default()
    };
    let batcher = WriteBackBatcher::spawn(Arc::new(engine(&f.catalog)), &config);

    batcher.enqueue([f.book_id]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    batcher.enqueue([f.book_id]);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // 400ms after the first enqueue, 200ms after the last: still waiting
    assert_eq!(batcher.pending_count(), 2);

    let mut waited = 0;
    while batcher.pending_count() > 0 && waited < 3_000 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        waited += 25;
    }
    assert_eq!(batcher.pending_count(), 0);
    batcher.stop().await;

    let library = parse_library(&f.library).unwrap();
    assert_eq!(
        library.track_by_persistent_id("WB01").unwrap().location,
        encode_location(&f.new_path)
    );
}

#[tokio::test]
async fn test_batcher_patches_binary_library_locations() {
    let (_db_dir, catalog) = create_test_catalog().await;
    let temp = TempDir::new().unwrap();
    let pid = "0123456789ABCDEF";

    let old_path = write_book_file(&temp.path().join("old/Binary.m4b"));
    let other = write_book_file(&temp.path().join("old/Kept.m4b"));
    let new_path = write_book_file(&temp.path().join("managed/Binary.m4b"));

    let library = ExportBuilder::new()
        .track(TrackSpec::audiobook(1, pid, "Ann Author", "Binary", &old_path))
        .write(&temp.path().join("Library.xml"));
    let itl_path = write_itl(
        &temp.path().join("iTunes Library.itl"),
        &[
            itl_track(1, pid, &old_path, &encode_location(&old_path)),
            itl_track(2, "FEDCBA9876543210", &other, &encode_location(&other)),
        ],
    );

    let mut book = CatalogBook::new("Binary", new_path.to_string_lossy());
    book.persistent_id = Some(pid.to_string());
    catalog.create_book(&book).await.unwrap();

    let config = ItunesConfig {
        library_xml_path: Some(library.clone()),
        auto_write_back: true,
        write_back_delay_ms: 60_000,
        itl_path: Some(itl_path.clone()),
        itl_write_back: true,
        ..ItunesConfig::default()
    };
    let batcher = WriteBackBatcher::spawn(Arc::new(engine(&catalog)), &config);
    batcher.enqueue([book.id]);
    batcher.stop().await;

    let itl = parse_itl(&itl_path).unwrap();
    let moved = itl.track_by_persistent_id(pid).unwrap();
    assert_eq!(moved.location, new_path.to_string_lossy());
    assert_eq!(moved.local_url, encode_location(&new_path));

    let kept = itl.track_by_persistent_id("fedcba9876543210").unwrap();
    assert_eq!(kept.location, other.to_string_lossy());
    assert!(!temp.path().join("iTunes Library.itl.tmp").exists());

    assert_eq!(
        parse_library(&library).unwrap().track_by_persistent_id(pid).unwrap().location,
        encode_location(&new_path)
    );
}

#[tokio::test]
async fn test_binary_library_untouched_when_disabled() {
    let f = fixture().await;
    let pid = "0123456789ABCDEF";
    let old_path = f.temp.path().join("old/R&D Notes.m4b");
    let itl_path = write_itl(
        &f.temp.path().join("iTunes Library.itl"),
        &[itl_track(1, pid, &old_path, &encode_location(&old_path))],
    );
    let before = std::fs::read(&itl_path).unwrap();

    let config = ItunesConfig {
        library_xml_path: Some(f.library.clone()),
        auto_write_back: true,
        write_back_delay_ms: 60_000,
        itl_path: Some(itl_path.clone()),
        itl_write_back: false,
        ..ItunesConfig::default()
    };
    let batcher = WriteBackBatcher::spawn(Arc::new(engine(&f.catalog)), &config);
    batcher.enqueue([f.book_id]);
    batcher.stop().await;

    assert_eq!(std::fs::read(&itl_path).unwrap(), before);
}
