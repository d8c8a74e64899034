use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::FolderStore;
use crate::error::FolioError;
use crate::store::ContentStore;
use crate::testutil::{bootstrap, open_with, test_config, text_file, website, FailingStore, SlowStore};

fn workspace_leftovers(store: &FolderStore) -> usize {
    std::fs::read_dir(store.config().workspace_root())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("folio-ws-"))
        .count()
}

#[tokio::test]
async fn failed_fetch_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let failing = Arc::new(FailingStore::new(tmp.path()));
    let store = open_with(test_config(tmp.path()), failing.clone());
    let boot = bootstrap(&store, "alice", 1024 * 1024).await;
    let account = store.account("alice").unwrap();

    failing.fail_get.store(true, Ordering::SeqCst);
    let err = store
        .mutate("alice", website("blog", &[("index.html", "hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::StoreUnavailable(_)), "{err:?}");

    assert_eq!(store.account("alice").unwrap(), account);
    assert_eq!(store.folder_history("alice").unwrap().len(), 1);
    assert!(store.site("blog").is_err());
    assert_eq!(store.resolve_historical(&boot.new), boot.new);
    assert_eq!(workspace_leftovers(&store), 0);

    failing.fail_get.store(false, Ordering::SeqCst);
    store
        .mutate("alice", website("blog", &[("index.html", "hi")]))
        .await
        .unwrap();
    assert!(store.site("blog").is_ok());
}

#[tokio::test]
async fn failed_put_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let failing = Arc::new(FailingStore::new(tmp.path()));
    let store = open_with(test_config(tmp.path()), failing.clone());
    let boot = bootstrap(&store, "alice", 1024 * 1024).await;

    failing.fail_put.store(true, Ordering::SeqCst);
    let err = store
        .mutate("alice", text_file("a.txt", "aaa"))
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::StoreUnavailable(_)));
    assert_eq!(store.resolve_live("alice").unwrap(), boot.new);
    assert_eq!(store.account("alice").unwrap().quota.used, boot.quota_used);
    assert!(store.list_entries("alice", crate::folder::EntryKind::File).unwrap().is_empty());
    assert_eq!(workspace_leftovers(&store), 0);

    failing.fail_put.store(false, Ordering::SeqCst);
    let outcome = store.mutate("alice", text_file("a.txt", "aaa")).await.unwrap();
    assert_eq!(outcome.seq, 2);
    assert_eq!(outcome.previous.as_ref(), Some(&boot.new));
}

#[tokio::test]
async fn failed_bootstrap_leaves_no_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let failing = Arc::new(FailingStore::new(tmp.path()));
    let store = open_with(test_config(tmp.path()), failing.clone());

    failing.fail_put.store(true, Ordering::SeqCst);
    let err = store
        .mutate("alice", crate::engine::edit::Edit::CreateFolder)
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::StoreUnavailable(_)));
    assert!(store.account("alice").is_err());
    assert_eq!(store.stats().snapshots, 0);
}

#[tokio::test]
async fn unresponsive_store_times_out_and_releases_the_lock() {
    let tmp = tempfile::tempdir().unwrap();
    let slow = Arc::new(SlowStore::new(tmp.path(), Duration::from_millis(1000)));
    let mut config = test_config(tmp.path());
    config.store_timeout_ms = 200;
    let store = open_with(config, slow.clone());
    let boot = bootstrap(&store, "alice", 1024 * 1024).await;

    slow.slow_get.store(true, Ordering::SeqCst);
    let err = store
        .mutate("alice", text_file("a.txt", "a"))
        .await
        .unwrap_err();
    match &err {
        FolioError::StoreUnavailable(msg) => assert!(msg.contains("no response"), "{msg}"),
        other => panic!("expected StoreUnavailable, got {other:?}"),
    }
    assert_eq!(store.resolve_live("alice").unwrap(), boot.new);

    // The abandoned read still owns its workspace and removes it when it returns.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(workspace_leftovers(&store), 0);

    slow.slow_get.store(false, Ordering::SeqCst);
    let outcome = store.mutate("alice", text_file("a.txt", "a")).await.unwrap();
    assert_eq!(outcome.seq, 2);
}

#[tokio::test]
async fn abandoned_write_cleans_up_its_workspace() {
    let tmp = tempfile::tempdir().unwrap();
    let slow = Arc::new(SlowStore::new(tmp.path(), Duration::from_millis(600)));
    let mut config = test_config(tmp.path());
    config.store_timeout_ms = 100;
    let store = open_with(config, slow.clone());
    let boot = bootstrap(&store, "alice", 1024 * 1024).await;

    slow.slow_put.store(true, Ordering::SeqCst);
    let err = store
        .mutate("alice", text_file("a.txt", "a"))
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::StoreUnavailable(_)), "{err:?}");
    assert_eq!(store.resolve_live("alice").unwrap(), boot.new);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(workspace_leftovers(&store), 0);
    assert!(store.list_entries("alice", crate::folder::EntryKind::File).unwrap().is_empty());
}

#[tokio::test]
async fn missing_kind_directory_is_corrupt() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_with(
        test_config(tmp.path()),
        Arc::new(crate::testutil::local_store(tmp.path())),
    );
    bootstrap(&store, "alice", 1024 * 1024).await;

    // A tree with no files/ directory.
    let broken = tempfile::tempdir().unwrap();
    std::fs::create_dir(broken.path().join("websites")).unwrap();
    std::fs::create_dir(broken.path().join("zip-websites")).unwrap();
    let broken_id = store.store.put_tree(broken.path()).unwrap();
    store
        .ledger
        .write()
        .unwrap()
        .accounts
        .get_mut("alice")
        .unwrap()
        .current = Some(broken_id.clone());

    let err = store
        .mutate("alice", text_file("a.txt", "a"))
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::Corrupt(_)), "{err:?}");
    assert_eq!(store.resolve_live("alice").unwrap(), broken_id);
    assert_eq!(store.folder_history("alice").unwrap().len(), 1);
}

#[tokio::test]
async fn entry_missing_from_tree_is_corrupt() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_with(
        test_config(tmp.path()),
        Arc::new(crate::testutil::local_store(tmp.path())),
    );
    let boot = bootstrap(&store, "alice", 1024 * 1024).await;
    store.mutate("alice", text_file("a.txt", "a")).await.unwrap();

    // Bookkeeping says a.txt exists, but point the folder back at the bare skeleton.
    store
        .ledger
        .write()
        .unwrap()
        .accounts
        .get_mut("alice")
        .unwrap()
        .current = Some(boot.new.clone());

    let err = store
        .mutate("alice", text_file("b.txt", "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::Corrupt(_)), "{err:?}");
    assert_eq!(store.resolve_live("alice").unwrap(), boot.new);
}
