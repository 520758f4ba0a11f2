//! Build cache models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A packaged build artifact reusable for the same commit and target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCacheEntry {
    pub key: String,
    pub commit_sha: String,
    pub target: String,
    pub artifact_path: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BuildCacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
