mod support;

use sqlask_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use support::{write_csv, MemoryStore};

#[tokio::test]
async fn test_second_ensure_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "sales.csv", "region,amount\nnorth,10\n");

    let store = Arc::new(MemoryStore::new());
    let catalog = TableCatalog::new(store.clone());
    let id = DatasetId::parse("sales").unwrap();

    let first = catalog.ensure_table(&id, SourceFile::new(&path)).await.unwrap();
    assert!(first.created);

    // The source is gone; a second ensure must not look at it
    std::fs::remove_file(&path).unwrap();
    let second = catalog.ensure_table(&id, SourceFile::new(&path)).await.unwrap();
    assert!(!second.created);

    assert_eq!(store.load_count(), 1);
    assert_eq!(store.table_count(), 1);
}

#[tokio::test]
async fn test_missing_source_is_unreadable() {
    let store = Arc::new(MemoryStore::new());
    let catalog = TableCatalog::new(store.clone());
    let id = DatasetId::parse("ghost").unwrap();

    let err = catalog
        .ensure_table(&id, SourceFile::new("/nonexistent/ghost.csv"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceUnreadable);
    assert_eq!(store.load_count(), 0);
    assert_eq!(store.table_count(), 0);
}

#[tokio::test]
async fn test_directory_source_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let catalog = TableCatalog::new(store);
    let id = DatasetId::parse("folder").unwrap();

    let err = catalog.ensure_table(&id, SourceFile::new(dir.path())).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnreadable);
}

#[tokio::test]
async fn test_failing_existence_check_is_store_unavailable() {
    let store = Arc::new(MemoryStore {
        unavailable: true,
        ..MemoryStore::default()
    });
    let catalog = TableCatalog::new(store);
    let id = DatasetId::parse("sales").unwrap();

    let err = catalog
        .ensure_table(&id, SourceFile::new("/tmp/whatever.csv"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ensures_create_one_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "race.csv", "a,b\n1,2\n");

    let store = Arc::new(MemoryStore {
        load_delay: Some(Duration::from_millis(50)),
        ..MemoryStore::default()
    });
    let catalog = Arc::new(TableCatalog::new(store.clone()));
    let id = DatasetId::parse("race").unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let catalog = catalog.clone();
            let id = id.clone();
            let path = path.clone();
            tokio::spawn(async move { catalog.ensure_table(&id, SourceFile::new(path)).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        let registration = task.await.unwrap().expect("every racer succeeds");
        if registration.created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.load_count(), 1);
    assert_eq!(store.table_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_case_variants_share_one_creation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "sales.csv", "a,b\n1,2\n");

    let store = Arc::new(MemoryStore {
        load_delay: Some(Duration::from_millis(100)),
        ..MemoryStore::default()
    });
    let catalog = Arc::new(TableCatalog::new(store.clone()));

    let tasks: Vec<_> = ["Sales", "sales", "SALES"]
        .into_iter()
        .map(|name| {
            let catalog = catalog.clone();
            let id = DatasetId::parse(name).unwrap();
            let path = path.clone();
            tokio::spawn(async move { catalog.ensure_table(&id, SourceFile::new(path)).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        let registration = task.await.unwrap().expect("every case variant succeeds");
        if registration.created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.load_count(), 1);
    assert_eq!(store.table_count(), 1);
}

#[tokio::test]
async fn test_resolver_only_runs_when_table_is_absent() {
    let store = Arc::new(MemoryStore::new().with_table("known", Default::default()));
    let catalog = TableCatalog::new(store);
    let id = DatasetId::parse("Known").unwrap();

    let registration = catalog
        .ensure_table_with(&id, || panic!("resolver must not run for an existing table"))
        .await
        .unwrap();
    assert!(!registration.created);
}
