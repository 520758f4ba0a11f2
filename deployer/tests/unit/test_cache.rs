//! Build cache unit tests

use std::sync::Arc;

use chrono::{Duration, Utc};

use blend_deploy::cache::build::{cache_key, BuildCache};
use blend_deploy::models::cache::BuildCacheEntry;
use blend_deploy::storage::records::Records;
use blend_deploy::storage::store::MemoryStore;

fn setup(ttl: Duration) -> (tempfile::TempDir, Records, BuildCache) {
    let tmp = tempfile::tempdir().unwrap();
    let records = Records::new(Arc::new(MemoryStore::new()));
    let cache = BuildCache::new(records.clone(), ttl);
    (tmp, records, cache)
}

fn artifact(tmp: &tempfile::TempDir, name: &str) -> String {
    let dir = tmp.path().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "<html></html>").unwrap();
    dir.display().to_string()
}

#[tokio::test]
async fn test_cache_round_trip_within_ttl() {
    let (tmp, _records, cache) = setup(Duration::hours(24));
    let path = artifact(&tmp, "build-1");

    let stored = cache
        .cache_build("abc123", "storybook", &path)
        .await
        .unwrap()
        .unwrap();
    let found = cache
        .get_cached_build("abc123", "storybook")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.key, stored.key);
    assert_eq!(found.artifact_path, path);
    assert_eq!(found.commit_sha, "abc123");
    assert!(found.expires_at > Utc::now());

    // other targets of the same commit are separate entries
    assert!(cache
        .get_cached_build("abc123", "docs")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_missing_artifact_evicts_entry() {
    let (tmp, records, cache) = setup(Duration::hours(24));
    let path = artifact(&tmp, "build-1");
    cache.cache_build("abc123", "storybook", &path).await.unwrap();

    std::fs::remove_dir_all(&path).unwrap();

    assert!(cache
        .get_cached_build("abc123", "storybook")
        .await
        .unwrap()
        .is_none());
    assert!(records
        .load_cache_entry(&cache_key("abc123", "storybook"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_expired_entry_is_evicted() {
    let (tmp, records, cache) = setup(Duration::hours(24));
    let path = artifact(&tmp, "build-1");

    let created_at = Utc::now() - Duration::hours(25);
    let entry = BuildCacheEntry {
        key: cache_key("abc123", "storybook"),
        commit_sha: "abc123".to_string(),
        target: "storybook".to_string(),
        artifact_path: path,
        created_at,
        expires_at: created_at + Duration::hours(24),
    };
    records.save_cache_entry(&entry).await.unwrap();

    assert!(cache
        .get_cached_build("abc123", "storybook")
        .await
        .unwrap()
        .is_none());
    assert!(records.load_cache_entry(&entry.key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_commit_is_never_cached() {
    let (tmp, _records, cache) = setup(Duration::hours(24));
    let path = artifact(&tmp, "build-1");

    assert!(cache.cache_build("", "storybook", &path).await.unwrap().is_none());
    assert!(cache.get_cached_build("", "storybook").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalidate_drops_entry() {
    let (tmp, _records, cache) = setup(Duration::hours(1));
    let path = artifact(&tmp, "build-1");
    cache.cache_build("abc123", "storybook", &path).await.unwrap();

    cache.invalidate("abc123", "storybook").await.unwrap();

    assert!(cache
        .get_cached_build("abc123", "storybook")
        .await
        .unwrap()
        .is_none());
}

#[test]
fn test_cache_key_matches_sha256_of_commit_and_target() {
    use sha2::{Digest, Sha256};

    let expected = format!("{:x}", Sha256::digest(b"abc123storybook"));
    assert_eq!(cache_key("abc123", "storybook"), expected);
}

#[tokio::test]
async fn test_cache_build_with_overflowing_ttl_errors() {
    let (tmp, _records, cache) = setup(Duration::hours(10_000_000_000));
    let path = artifact(&tmp, "build-1");

    let result = cache.cache_build("abc123", "storybook", &path).await;
    assert!(matches!(
        result,
        Err(blend_deploy::errors::DeployError::ConfigError(_))
    ));
    assert!(cache
        .get_cached_build("abc123", "storybook")
        .await
        .unwrap()
        .is_none());
}
