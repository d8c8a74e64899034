use std::sync::Arc;

use folio_core::{
    Content, ContentStore, Edit, EntryKind, FolderStore, FolioConfig, LocalContentStore,
};

fn open(dir: &std::path::Path) -> FolderStore {
    let config = FolioConfig::with_data_dir(dir.join("data"));
    let store = LocalContentStore::new(dir.join("objects")).unwrap();
    FolderStore::open(config, Arc::new(store)).unwrap()
}

fn put_file(name: &str, body: &str) -> Edit {
    Edit::PutFile {
        name: name.to_string(),
        content: Content::text(body),
    }
}

#[tokio::test]
async fn website_file_and_delete_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open(tmp.path());

    store.register_account("alice", 10 * 1024 * 1024).await.unwrap();
    let boot = store.mutate("alice", Edit::CreateFolder).await.unwrap();

    // Website with one 500-byte page.
    let page = "p".repeat(500);
    let s1 = store
        .mutate(
            "alice",
            Edit::PutWebsite {
                name: "alice-blog".into(),
                files: [("index.html".to_string(), Content::text(page.as_str()))]
                    .into_iter()
                    .collect(),
                metadata: None,
            },
        )
        .await
        .unwrap()
        .new;
    assert_eq!(store.resolve_live("alice").unwrap(), s1);

    let s2 = store
        .mutate("alice", put_file("notes.txt", &"n".repeat(200)))
        .await
        .unwrap()
        .new;
    assert_ne!(s2, s1);
    assert_eq!(store.resolve_historical(&s1), s2);
    assert_eq!(
        store.account("alice").unwrap().quota.used,
        boot.quota_used + 700
    );

    let s3 = store
        .mutate(
            "alice",
            Edit::DeleteEntry {
                kind: EntryKind::Website,
                name: "alice-blog".into(),
            },
        )
        .await
        .unwrap()
        .new;
    assert!(store
        .list_entries("alice", EntryKind::Website)
        .unwrap()
        .is_empty());
    let notes = LocalContentStore::new(tmp.path().join("objects"))
        .unwrap()
        .read_file(&s3, "files/notes.txt")
        .unwrap();
    assert_eq!(notes, Some("n".repeat(200).into_bytes()));
    for old in [&boot.new, &s1, &s2] {
        assert_eq!(store.resolve_historical(old), s3);
    }
}

#[tokio::test]
async fn state_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let live = {
        let store = open(tmp.path());
        store.mutate("bob", Edit::CreateFolder).await.unwrap();
        store.mutate("bob", put_file("a.txt", "a")).await.unwrap().new
    };

    let store = open(tmp.path());
    assert_eq!(store.resolve_live("bob").unwrap(), live);
    assert_eq!(store.folder_history("bob").unwrap().len(), 2);
    assert_eq!(store.stats().folders, 1);
}
