//! Typed access to deployment records in the store

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::DeployError;
use crate::models::approval::DeploymentApproval;
use crate::models::cache::BuildCacheEntry;
use crate::models::deployment::{Deployment, DeploymentStatus, LogStage};
use crate::models::notification::Notification;
use crate::storage::paths;
use crate::storage::store::Store;

/// Partial update of a deployment record. Unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentPatch {
    pub fn status(status: DeploymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Repository over the well-known store paths
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn Store>,
}

impl Records {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // ============================== DEPLOYMENTS ============================== //

    pub async fn save_deployment(&self, deployment: &Deployment) -> Result<(), DeployError> {
        self.put(&paths::deployment(&deployment.id), deployment).await
    }

    pub async fn load_deployment(&self, id: &str) -> Result<Option<Deployment>, DeployError> {
        self.fetch(&paths::deployment(id)).await
    }

    /// Load a deployment or fail with `NotFound`
    pub async fn require_deployment(&self, id: &str) -> Result<Deployment, DeployError> {
        self.load_deployment(id)
            .await?
            .ok_or_else(|| DeployError::NotFound(format!("Deployment {} not found", id)))
    }

    pub async fn patch_deployment(
        &self,
        id: &str,
        patch: DeploymentPatch,
    ) -> Result<(), DeployError> {
        let fields = match serde_json::to_value(patch)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.store.update(&paths::deployment(id), fields).await
    }

    pub async fn append_log(
        &self,
        id: &str,
        stage: LogStage,
        line: impl Into<String> + Send,
    ) -> Result<(), DeployError> {
        self.store
            .append(
                &paths::deployment_logs(id, stage.key()),
                Value::String(line.into()),
            )
            .await
    }

    /// All deployments, newest first
    pub async fn list_deployments(&self) -> Result<Vec<Deployment>, DeployError> {
        let mut deployments: Vec<Deployment> = self.fetch_all(paths::HISTORY).await?;
        deployments.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(deployments)
    }

    // =============================== APPROVALS =============================== //

    pub async fn save_approval(&self, approval: &DeploymentApproval) -> Result<(), DeployError> {
        self.put(&paths::approval(&approval.id), approval).await
    }

    pub async fn load_approval(
        &self,
        id: &str,
    ) -> Result<Option<DeploymentApproval>, DeployError> {
        self.fetch(&paths::approval(id)).await
    }

    pub async fn list_approvals(&self) -> Result<Vec<DeploymentApproval>, DeployError> {
        let mut approvals: Vec<DeploymentApproval> = self.fetch_all(paths::APPROVALS).await?;
        approvals.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(approvals)
    }

    // ============================== BUILD CACHE ============================== //

    pub async fn save_cache_entry(&self, entry: &BuildCacheEntry) -> Result<(), DeployError> {
        self.put(&paths::cache_entry(&entry.key), entry).await
    }

    pub async fn load_cache_entry(
        &self,
        key: &str,
    ) -> Result<Option<BuildCacheEntry>, DeployError> {
        self.fetch(&paths::cache_entry(key)).await
    }

    pub async fn remove_cache_entry(&self, key: &str) -> Result<(), DeployError> {
        self.store.remove(&paths::cache_entry(key)).await
    }

    // ============================= NOTIFICATIONS ============================= //

    pub async fn save_notification(&self, notification: &Notification) -> Result<(), DeployError> {
        self.put(&paths::notification(&notification.id), notification)
            .await
    }

    pub async fn load_notification(
        &self,
        id: &str,
    ) -> Result<Option<Notification>, DeployError> {
        self.fetch(&paths::notification(id)).await
    }

    /// All notifications, newest first
    pub async fn list_notifications(&self) -> Result<Vec<Notification>, DeployError> {
        let mut notifications: Vec<Notification> = self.fetch_all(paths::NOTIFICATIONS).await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), DeployError> {
        let mut fields = Map::new();
        fields.insert("read".to_string(), Value::Bool(true));
        self.store.update(&paths::notification(id), fields).await
    }

    // ================================ HELPERS ================================ //

    async fn put<T: Serialize + Sync>(&self, path: &str, value: &T) -> Result<(), DeployError> {
        self.store.set(path, serde_json::to_value(value)?).await
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, DeployError> {
        match self.store.get(path).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn fetch_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, DeployError> {
        let children = self.store.list(path).await?;
        let mut records = Vec::with_capacity(children.len());
        for (key, value) in children {
            match serde_json::from_value(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed record {}/{}: {}", path, key, e),
            }
        }
        Ok(records)
    }
}
