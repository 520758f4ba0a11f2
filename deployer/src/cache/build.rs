//! Build artifact cache
//!
//! Entries are keyed by a hash of commit and target and live in the record
//! store. An entry is only served while it is unexpired and its artifact
//! directory still exists; anything else is evicted on lookup. There is no
//! background sweep and no size bound.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::models::cache::BuildCacheEntry;
use crate::storage::records::Records;
use crate::utils::sha256_hash;

/// Cache key for a commit built for a target
pub fn cache_key(commit_sha: &str, target: &str) -> String {
    sha256_hash(format!("{}{}", commit_sha, target).as_bytes())
}

/// Store-backed build cache
#[derive(Clone)]
pub struct BuildCache {
    records: Records,
    ttl: Duration,
}

impl BuildCache {
    pub fn new(records: Records, ttl: Duration) -> Self {
        Self { records, ttl }
    }

    /// Look up a usable cached build. Unattributed builds are never cached.
    pub async fn get_cached_build(
        &self,
        commit_sha: &str,
        target: &str,
    ) -> Result<Option<BuildCacheEntry>, DeployError> {
        if commit_sha.is_empty() {
            return Ok(None);
        }

        let key = cache_key(commit_sha, target);
        let Some(entry) = self.records.load_cache_entry(&key).await? else {
            return Ok(None);
        };

        if entry.is_expired_at(Utc::now()) {
            debug!("Cache entry {} for {} expired, evicting", key, target);
            self.records.remove_cache_entry(&key).await?;
            return Ok(None);
        }

        if tokio::fs::metadata(&entry.artifact_path).await.is_err() {
            debug!(
                "Cached artifact {} for {} is gone, evicting",
                entry.artifact_path, target
            );
            self.records.remove_cache_entry(&key).await?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Record an artifact for later reuse. Returns `None` for an empty commit.
    pub async fn cache_build(
        &self,
        commit_sha: &str,
        target: &str,
        artifact_path: &str,
    ) -> Result<Option<BuildCacheEntry>, DeployError> {
        if commit_sha.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            DeployError::ConfigError(format!(
                "Cache ttl of {} hours is out of range",
                self.ttl.num_hours()
            ))
        })?;
        let entry = BuildCacheEntry {
            key: cache_key(commit_sha, target),
            commit_sha: commit_sha.to_string(),
            target: target.to_string(),
            artifact_path: artifact_path.to_string(),
            created_at: now,
            expires_at,
        };

        self.records.save_cache_entry(&entry).await?;
        info!("Cached build {} for {} at {}", commit_sha, target, artifact_path);
        Ok(Some(entry))
    }

    /// Drop any entry for a commit and target
    pub async fn invalidate(&self, commit_sha: &str, target: &str) -> Result<(), DeployError> {
        self.records
            .remove_cache_entry(&cache_key(commit_sha, target))
            .await
    }
}
