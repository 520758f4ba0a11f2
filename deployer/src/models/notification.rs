//! Notification models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApprovalRequired,
    DeploymentApproved,
    DeploymentRejected,
    DeploymentSucceeded,
    DeploymentFailed,
    RollbackStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-facing record of a deployment status change. Written once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub deployment_id: String,

    #[serde(rename = "type")]
    pub kind: NotificationKind,

    pub title: String,
    pub message: String,
    pub severity: Severity,

    #[serde(default)]
    pub read: bool,

    pub action_url: String,
    pub created_at: DateTime<Utc>,
}
