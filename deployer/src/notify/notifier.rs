//! Writes user-facing notification records for deployment status changes

use chrono::Utc;
use tracing::debug;

use crate::errors::DeployError;
use crate::models::deployment::Deployment;
use crate::models::notification::{Notification, NotificationKind, Severity};
use crate::storage::records::Records;
use crate::utils::generate_uuid;

#[derive(Clone)]
pub struct Notifier {
    records: Records,
    dashboard_url: String,
}

impl Notifier {
    pub fn new(records: Records, dashboard_url: impl Into<String>) -> Self {
        Self {
            records,
            dashboard_url: dashboard_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Link to a deployment's page in the dashboard
    pub fn action_url(&self, deployment_id: &str) -> String {
        format!("{}/deployments/{}", self.dashboard_url, deployment_id)
    }

    /// Persist one notification for `kind` about `deployment`
    pub async fn notify(
        &self,
        deployment: &Deployment,
        kind: NotificationKind,
    ) -> Result<Notification, DeployError> {
        let (title, message, severity) = describe(deployment, kind);
        let notification = Notification {
            id: generate_uuid(),
            deployment_id: deployment.id.clone(),
            kind,
            title,
            message,
            severity,
            read: false,
            action_url: self.action_url(&deployment.id),
            created_at: Utc::now(),
        };

        self.records.save_notification(&notification).await?;
        debug!(
            "Notification {:?} written for deployment {}",
            kind, deployment.id
        );
        Ok(notification)
    }
}

fn describe(deployment: &Deployment, kind: NotificationKind) -> (String, String, Severity) {
    let label = if deployment.version.is_empty() {
        deployment.target.clone()
    } else {
        format!("{} {}", deployment.target, deployment.version)
    };

    match kind {
        NotificationKind::ApprovalRequired => (
            "Deployment approval required".to_string(),
            format!(
                "{} requested a deployment of {} that needs approval",
                deployment.deployed_by, label
            ),
            Severity::Warning,
        ),
        NotificationKind::DeploymentApproved => (
            "Deployment approved".to_string(),
            format!("Deployment of {} was approved and is starting", label),
            Severity::Info,
        ),
        NotificationKind::DeploymentRejected => (
            "Deployment rejected".to_string(),
            format!("Deployment of {} was rejected", label),
            Severity::Warning,
        ),
        NotificationKind::DeploymentSucceeded => (
            "Deployment succeeded".to_string(),
            format!("{} is live", label),
            Severity::Success,
        ),
        NotificationKind::DeploymentFailed => (
            "Deployment failed".to_string(),
            format!(
                "Deployment of {} failed: {}",
                label,
                deployment.error.as_deref().unwrap_or("unknown error")
            ),
            Severity::Error,
        ),
        NotificationKind::RollbackStarted => (
            "Rollback started".to_string(),
            format!(
                "Rolling {} back to deployment {}",
                label,
                deployment.rollback_from.as_deref().unwrap_or("unknown")
            ),
            Severity::Warning,
        ),
    }
}
