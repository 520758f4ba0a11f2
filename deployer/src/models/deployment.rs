//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    InProgress,
    PendingApproval,
    Approved,
    Building,
    Deploying,
    Success,
    Failed,
    Cancelled,
    RolledBack,
}

impl DeploymentStatus {
    /// Whether no further pipeline work will happen for this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success
                | DeploymentStatus::Failed
                | DeploymentStatus::Cancelled
                | DeploymentStatus::RolledBack
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::PendingApproval => "pending_approval",
            DeploymentStatus::Approved => "approved",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
            DeploymentStatus::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which log sequence of a deployment a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Build,
    Deploy,
}

impl LogStage {
    /// Field name under `logs` in the stored record
    pub fn key(&self) -> &'static str {
        match self {
            LogStage::Build => "build",
            LogStage::Deploy => "deploy",
        }
    }
}

/// Append-only log sequences captured during a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLogs {
    #[serde(default)]
    pub build: Vec<String>,

    #[serde(default)]
    pub deploy: Vec<String>,
}

impl DeploymentLogs {
    pub fn stage(&self, stage: LogStage) -> &[String] {
        match stage {
            LogStage::Build => &self.build,
            LogStage::Deploy => &self.deploy,
        }
    }
}

/// A deployment of one build to one hosting target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Hosting target (e.g. "storybook", "production")
    pub target: String,

    /// Version label shown in the dashboard
    #[serde(default)]
    pub version: String,

    /// User ID of the requester
    pub deployed_by: String,

    /// Commit being deployed; empty when unattributed
    #[serde(default)]
    pub commit_sha: String,

    #[serde(default)]
    pub branch: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub status: DeploymentStatus,

    #[serde(default)]
    pub logs: DeploymentLogs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,

    /// Deployment whose artifacts this one restores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_from: Option<String>,

    /// Deployment that superseded this one through a rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,

    #[serde(default)]
    pub from_cache: bool,

    /// Caching option of the original request
    #[serde(default = "default_true")]
    pub use_cache: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Deployment {
    /// Build a fresh `in_progress` record for a request
    pub fn from_request(id: String, request: &DeploymentRequest, user_id: &str) -> Self {
        Self {
            id,
            target: request.target.trim().to_string(),
            version: request.version.clone(),
            deployed_by: user_id.to_string(),
            commit_sha: request.commit_sha.clone(),
            branch: request.branch.clone(),
            message: request.message.clone(),
            started_at: Utc::now(),
            completed_at: None,
            status: DeploymentStatus::InProgress,
            logs: DeploymentLogs::default(),
            approval_id: None,
            rollback_from: None,
            rolled_back_by: None,
            artifact_path: None,
            from_cache: false,
            use_cache: request.use_cache,
            error: None,
        }
    }

    /// Reconstruct the request that produced this record
    pub fn to_request(&self) -> DeploymentRequest {
        DeploymentRequest {
            target: self.target.clone(),
            version: self.version.clone(),
            commit_sha: self.commit_sha.clone(),
            branch: self.branch.clone(),
            message: self.message.clone(),
            requires_approval: false,
            use_cache: self.use_cache,
        }
    }
}

/// A request to deploy a build to a hosting target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub commit_sha: String,

    #[serde(default)]
    pub branch: String,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub requires_approval: bool,

    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl DeploymentRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            use_cache: true,
            ..Default::default()
        }
    }
}
