use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::FolderStore;
use crate::error::FolioError;
use crate::folder::EntryKind;
use crate::store::ContentStore;
use crate::testutil::{bootstrap, files, open_store, open_with, test_config, text_file, SlowStore};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accounts_keep_separate_ordered_histories() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(open_store(tmp.path()));
    bootstrap(&store, "alice", 1024 * 1024).await;
    bootstrap(&store, "bob", 1024 * 1024).await;

    let mut tasks = Vec::new();
    for alias in ["alice", "bob"] {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..5 {
                store
                    .mutate(alias, text_file(&format!("{alias}-{i}.txt"), "x"))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for alias in ["alice", "bob"] {
        let history = store.folder_history(alias).unwrap();
        assert_eq!(history.len(), 6);
        for pair in history.windows(2) {
            assert!(pair[0].seq < pair[1].seq);
            assert_eq!(pair[1].previous_id.as_ref(), Some(&pair[0].new_id));
        }
        assert_eq!(store.counts_by_kind(alias).unwrap().files, 5);
        assert_eq!(
            history.last().unwrap().new_id,
            store.resolve_live(alias).unwrap()
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_edits_on_one_account_all_survive() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(open_store(tmp.path()));
    bootstrap(&store, "alice", 1024 * 1024).await;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .mutate("alice", text_file(&format!("f{i}.txt"), &format!("body {i}")))
                    .await
                    .unwrap()
            })
        })
        .collect();
    let mut seqs = Vec::new();
    for task in tasks {
        seqs.push(task.await.unwrap().seq);
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (2..=9).collect::<Vec<u64>>());

    let live = store.resolve_live("alice").unwrap();
    for i in 0..8 {
        let body = store
            .store
            .read_file(&live, &format!("files/f{i}.txt"))
            .unwrap();
        assert_eq!(body, Some(format!("body {i}").into_bytes()));
    }
    assert_eq!(store.list_entries("alice", EntryKind::File).unwrap().len(), 8);
}

async fn slow_pair(store: &Arc<FolderStore>, aliases: [&'static str; 2]) -> Duration {
    let start = Instant::now();
    let tasks: Vec<_> = aliases
        .into_iter()
        .enumerate()
        .map(|(i, alias)| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .mutate(alias, text_file(&format!("slow-{i}.txt"), "s"))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    start.elapsed()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_accounts_do_not_wait_on_each_other() {
    let tmp = tempfile::tempdir().unwrap();
    let slow = Arc::new(SlowStore::new(tmp.path(), Duration::from_millis(500)));
    let store = Arc::new(open_with(test_config(tmp.path()), slow.clone()));
    bootstrap(&store, "alice", 1024 * 1024).await;
    bootstrap(&store, "bob", 1024 * 1024).await;
    slow.slow_get.store(true, Ordering::SeqCst);

    let elapsed = slow_pair(&store, ["alice", "bob"]).await;
    assert!(elapsed < Duration::from_millis(900), "took {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_account_mutations_are_serialized() {
    let tmp = tempfile::tempdir().unwrap();
    let slow = Arc::new(SlowStore::new(tmp.path(), Duration::from_millis(500)));
    let store = Arc::new(open_with(test_config(tmp.path()), slow.clone()));
    bootstrap(&store, "alice", 1024 * 1024).await;
    slow.slow_get.store(true, Ordering::SeqCst);

    let elapsed = slow_pair(&store, ["alice", "alice"]).await;
    assert!(elapsed >= Duration::from_millis(1000), "took {elapsed:?}");
    assert_eq!(store.folder_history("alice").unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_committed_state_during_a_slow_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let slow = Arc::new(SlowStore::new(tmp.path(), Duration::from_millis(300)));
    let store = Arc::new(open_with(test_config(tmp.path()), slow.clone()));
    let boot = bootstrap(&store, "alice", 1024 * 1024).await;
    slow.slow_get.store(true, Ordering::SeqCst);

    let writer = {
        let store = store.clone();
        tokio::spawn(async move { store.mutate("alice", text_file("a.txt", "a")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    assert_eq!(store.resolve_live("alice").unwrap(), boot.new);
    assert!(start.elapsed() < Duration::from_millis(100));

    let outcome = writer.await.unwrap().unwrap();
    assert_eq!(store.resolve_live("alice").unwrap(), outcome.new);
}

#[tokio::test]
async fn unknown_accounts_leave_no_lock_behind() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());

    for i in 0..50 {
        let ghost = format!("ghost-{i}");
        let err = store.mutate(&ghost, text_file("a.txt", "a")).await.unwrap_err();
        assert!(matches!(err, FolioError::NotFound(_)), "{err:?}");
        let err = store
            .publish_site(&ghost, &format!("site-{i}"), files(&[("index.html", "x")]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FolioError::NotFound(_)), "{err:?}");
        let err = store.reconcile_quota(&ghost).await.unwrap_err();
        assert!(matches!(err, FolioError::NotFound(_)), "{err:?}");
    }
    assert_eq!(store.locks.tracked(), 0);

    bootstrap(&store, "alice", 1024 * 1024).await;
    store.mutate("alice", text_file("a.txt", "a")).await.unwrap();
    assert_eq!(store.locks.tracked(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_reach_disk_as_they_reach_memory() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(open_store(tmp.path()));
    let aliases: Vec<String> = (0..6).map(|i| format!("user{i}")).collect();
    for alias in &aliases {
        bootstrap(&store, alias, 1024 * 1024).await;
    }

    let tasks: Vec<_> = aliases
        .iter()
        .cloned()
        .map(|alias| {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..4 {
                    store
                        .mutate(&alias, text_file(&format!("{i}.txt"), &alias))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let reopened = open_store(tmp.path());
    for alias in &aliases {
        assert_eq!(reopened.resolve_live(alias).unwrap(), store.resolve_live(alias).unwrap());
        assert_eq!(reopened.folder_history(alias).unwrap(), store.folder_history(alias).unwrap());
        assert_eq!(reopened.account(alias).unwrap(), store.account(alias).unwrap());
        assert_eq!(reopened.folder_history(alias).unwrap().len(), 5);
    }
    assert_eq!(reopened.stats(), store.stats());
}
