// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::Deserialize;
use std::sync::Arc as StdArc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
struct Doc {
    n: u32,
    tag: String,
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    let store = AtomicStore::new();

    let doc = Doc { n: 7, tag: "x".into() };
    store.atomic_write_json(&path, &doc).await.unwrap();

    let read: Doc = store.safe_read_json(&path, Doc::default()).await;
    assert_eq!(read, doc);
}

#[tokio::test]
async fn missing_file_returns_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");
    let store = AtomicStore::new();

    let read: Doc = store.safe_read_json(&path, Doc { n: 9, tag: "default".into() }).await;
    assert_eq!(read, Doc { n: 9, tag: "default".into() });
}

#[tokio::test]
async fn corrupt_file_is_quarantined_and_default_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    tokio::fs::write(&path, b"{not json").await.unwrap();
    let store = AtomicStore::new();

    let read: Doc = store.safe_read_json(&path, Doc::default()).await;
    assert_eq!(read, Doc::default());

    // Original file preserved at <path>.corrupt.<ts>
    let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
    let mut found_quarantine = false;
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("doc.json.corrupt.") {
            found_quarantine = true;
            let contents = tokio::fs::read(entry.path()).await.unwrap();
            assert_eq!(contents, b"{not json");
        }
    }
    assert!(found_quarantine, "expected a quarantined copy of the corrupt file");
}

#[tokio::test]
async fn concurrent_writes_leave_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = StdArc::new(dir.path().join("doc.json"));
    let store = StdArc::new(AtomicStore::new());

    let a = {
        let store = StdArc::clone(&store);
        let path = StdArc::clone(&path);
        tokio::spawn(async move {
            store.atomic_write_json(&path, &Doc { n: 1, tag: "a".into() }).await.unwrap();
        })
    };
    let b = {
        let store = StdArc::clone(&store);
        let path = StdArc::clone(&path);
        tokio::spawn(async move {
            store.atomic_write_json(&path, &Doc { n: 2, tag: "b".into() }).await.unwrap();
        })
    };
    let _ = tokio::join!(a, b);

    let read: Doc = store.safe_read_json(&path, Doc::default()).await;
    assert!(read == Doc { n: 1, tag: "a".into() } || read == Doc { n: 2, tag: "b".into() });
}

#[tokio::test]
async fn modify_json_applies_mutator_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.json");
    let store = AtomicStore::new();

    let result = store
        .modify_json(&path, Doc::default(), |doc| {
            doc.n += 1;
            Ok::<_, anyhow::Error>(None)
        })
        .await
        .unwrap();
    assert_eq!(result.n, 1);

    let result = store
        .modify_json(&path, Doc::default(), |doc| {
            doc.n += 1;
            Ok::<_, anyhow::Error>(None)
        })
        .await
        .unwrap();
    assert_eq!(result.n, 2);

    let read: Doc = store.safe_read_json(&path, Doc::default()).await;
    assert_eq!(read.n, 2);
}

#[tokio::test]
async fn modify_json_releases_operation_lock_on_mutator_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    let store = AtomicStore::new();

    let err = store
        .modify_json(&path, Doc::default(), |_doc| Err::<Option<Doc>, _>(anyhow::anyhow!("boom")))
        .await;
    assert!(err.is_err());

    // Lock must have been released: a subsequent call succeeds.
    let result = store
        .modify_json(&path, Doc::default(), |doc| {
            doc.n = 42;
            Ok::<_, anyhow::Error>(None)
        })
        .await
        .unwrap();
    assert_eq!(result.n, 42);
}

#[tokio::test]
async fn ensure_dir_creates_nested_parents() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a/b/c");
    let store = AtomicStore::new();
    store.ensure_dir(&nested).await.unwrap();
    assert!(nested.is_dir());
}

proptest::proptest! {
    /// The suffixed path always keeps the original file name as a prefix
    /// of its own file name and ends with exactly the requested suffix,
    /// for any base name and any suffix the quarantine/tmp-file paths use.
    #[test]
    fn append_suffix_keeps_the_original_name_and_adds_the_suffix(
        base in "[a-zA-Z0-9_.-]{1,20}",
        suffix in "\\.(tmp|corrupt)\\.[a-zA-Z0-9-]{1,20}",
    ) {
        let path = std::path::Path::new("/some/dir").join(&base);
        let suffixed = append_suffix(&path, &suffix);

        let original_name = path.file_name().unwrap().to_string_lossy().into_owned();
        let suffixed_name = suffixed.file_name().unwrap().to_string_lossy().into_owned();

        proptest::prop_assert_eq!(suffixed_name, format!("{original_name}{suffix}"));
        proptest::prop_assert_eq!(suffixed.parent(), path.parent());
    }
}
