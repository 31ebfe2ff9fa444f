//! Document uploads through the scratch directory

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedApi;
use study_client::ApiError;
use study_session::{DocumentStore, RetryPolicy, SessionError};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn upload_writes_scratch_file_and_returns_handle() {
    let scratch = tempfile::tempdir().unwrap();
    let api = Arc::new(ScriptedApi::new());
    let store = DocumentStore::new(api.clone(), scratch.path().join("uploads"));

    let handle = store.upload("notes.pdf", b"%PDF-1.4 notes").await.unwrap();

    assert_eq!(handle.id, "file-1");
    assert_eq!(handle.display_name, "notes.pdf");
    let scratch_file = scratch.path().join("uploads").join("notes.pdf");
    assert_eq!(std::fs::read(&scratch_file).unwrap(), b"%PDF-1.4 notes");
    assert_eq!(api.calls(), vec!["upload_file:assistants".to_string()]);
    assert_eq!(api.uploaded()[0].0, scratch_file);
}

#[tokio::test]
async fn identical_uploads_yield_distinct_handles() {
    let scratch = tempfile::tempdir().unwrap();
    let api = Arc::new(ScriptedApi::new());
    let store = DocumentStore::new(api.clone(), scratch.path());

    let first = store.upload("a.txt", b"same").await.unwrap();
    let second = store.upload("a.txt", b"same").await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(api.count("upload_file"), 2);
}

#[tokio::test]
async fn display_name_cannot_escape_scratch_dir() {
    let scratch = tempfile::tempdir().unwrap();
    let api = Arc::new(ScriptedApi::new());
    let store = DocumentStore::new(api.clone(), scratch.path());

    let handle = store.upload("../../secret.txt", b"x").await.unwrap();

    assert_eq!(handle.display_name, "secret.txt");
    assert!(scratch.path().join("secret.txt").exists());
}

#[tokio::test]
async fn unavailable_service_is_retried_until_upload_succeeds() {
    let scratch = tempfile::tempdir().unwrap();
    let api = Arc::new(ScriptedApi::new().with_upload_failures([503, 503]));
    let store = DocumentStore::new(api.clone(), scratch.path()).with_retry_policy(fast_retry());

    let handle = store.upload("notes.pdf", b"body").await.unwrap();

    assert_eq!(handle.display_name, "notes.pdf");
    assert_eq!(api.count("upload_file"), 3);
}

#[tokio::test]
async fn bad_request_is_not_retried() {
    let scratch = tempfile::tempdir().unwrap();
    let api = Arc::new(ScriptedApi::new().with_upload_failures([400]));
    let store = DocumentStore::new(api.clone(), scratch.path()).with_retry_policy(fast_retry());

    let err = store.upload("notes.pdf", b"body").await.unwrap_err();

    match err {
        SessionError::Upload(ApiError::Status { status, .. }) => assert_eq!(status.as_u16(), 400),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(api.count("upload_file"), 1);
}

#[tokio::test]
async fn retries_are_bounded() {
    let scratch = tempfile::tempdir().unwrap();
    let api = Arc::new(ScriptedApi::new().with_upload_failures([500, 500, 500, 500, 500]));
    let store = DocumentStore::new(api.clone(), scratch.path()).with_retry_policy(fast_retry());

    let err = store.upload("notes.pdf", b"body").await.unwrap_err();

    assert!(matches!(err, SessionError::Upload(_)));
    assert_eq!(api.count("upload_file"), 4);
}

#[tokio::test]
async fn upload_path_uses_the_local_file_name() {
    let source = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let local = source.path().join("chapter-3.md");
    std::fs::write(&local, "# Chapter 3").unwrap();
    let api = Arc::new(ScriptedApi::new());
    let store = DocumentStore::new(api.clone(), scratch.path());

    let handle = store.upload_path(&local).await.unwrap();

    assert_eq!(handle.display_name, "chapter-3.md");
    assert_eq!(api.uploaded()[0].1, b"# Chapter 3");
}
