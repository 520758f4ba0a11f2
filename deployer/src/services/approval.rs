//! Approval decisions for gated deployments

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::stage_log::StageLog;
use crate::errors::DeployError;
use crate::models::approval::{ApprovalStatus, DeploymentApproval};
use crate::models::deployment::{Deployment, DeploymentStatus, LogStage};
use crate::models::notification::NotificationKind;
use crate::services::deployment::DeploymentService;
use crate::storage::records::DeploymentPatch;

impl DeploymentService {
    /// Approve a gated deployment and resume its pipeline in the background.
    ///
    /// An approval past its expiry is marked `expired`, the deployment fails
    /// and the call returns `Conflict`.
    pub async fn approve_deployment(
        self: &Arc<Self>,
        deployment_id: &str,
        approver_id: &str,
        comments: Option<String>,
    ) -> Result<Deployment, DeployError> {
        let (mut deployment, mut approval) = self.pending_approval(deployment_id).await?;
        let now = Utc::now();

        if approval.is_expired_at(now) {
            approval.status = ApprovalStatus::Expired;
            approval.decided_at = Some(now);
            self.records.save_approval(&approval).await?;

            let message = format!("Approval expired at {}", approval.expires_at.to_rfc3339());
            StageLog::new(self.records.clone(), &deployment.id, LogStage::Build)
                .line(message.clone())
                .await;

            let mut fsm = DeploymentFsm::resume(deployment.status);
            let status = fsm.process(DeploymentEvent::Fail(message.clone()))?;
            self.records
                .patch_deployment(
                    &deployment.id,
                    DeploymentPatch {
                        status: Some(status),
                        completed_at: Some(now),
                        error: Some(message.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            deployment.status = status;
            deployment.error = Some(message);
            self.emit(&deployment, NotificationKind::DeploymentFailed)
                .await;

            return Err(DeployError::Conflict(format!(
                "Approval for deployment {} has expired",
                deployment_id
            )));
        }

        approval.status = ApprovalStatus::Approved;
        approval.approver = Some(approver_id.to_string());
        approval.decided_at = Some(now);
        approval.comments = comments;
        self.records.save_approval(&approval).await?;

        let mut fsm = DeploymentFsm::resume(deployment.status);
        self.transition(&mut deployment, &mut fsm, DeploymentEvent::Approve)
            .await?;
        info!("Deployment {} approved by {}", deployment.id, approver_id);
        self.emit(&deployment, NotificationKind::DeploymentApproved)
            .await;

        self.dispatch(deployment.clone());
        Ok(deployment)
    }

    /// Reject a gated deployment; it ends `cancelled` and never builds
    pub async fn reject_deployment(
        &self,
        deployment_id: &str,
        approver_id: &str,
        comments: Option<String>,
    ) -> Result<Deployment, DeployError> {
        let (mut deployment, mut approval) = self.pending_approval(deployment_id).await?;
        let now = Utc::now();

        approval.status = ApprovalStatus::Rejected;
        approval.approver = Some(approver_id.to_string());
        approval.decided_at = Some(now);
        approval.comments = comments;
        self.records.save_approval(&approval).await?;

        let mut fsm = DeploymentFsm::resume(deployment.status);
        let status = fsm.process(DeploymentEvent::Reject)?;
        self.records
            .patch_deployment(
                &deployment.id,
                DeploymentPatch {
                    status: Some(status),
                    completed_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;
        deployment.status = status;
        deployment.completed_at = Some(now);

        info!("Deployment {} rejected by {}", deployment.id, approver_id);
        self.emit(&deployment, NotificationKind::DeploymentRejected)
            .await;
        Ok(deployment)
    }

    /// Pending approvals that have not expired, newest first
    pub async fn list_pending_approvals(&self) -> Result<Vec<DeploymentApproval>, DeployError> {
        let now = Utc::now();
        let approvals = self.records.list_approvals().await?;
        Ok(approvals
            .into_iter()
            .filter(|a| a.status == ApprovalStatus::Pending && !a.is_expired_at(now))
            .collect())
    }

    async fn pending_approval(
        &self,
        deployment_id: &str,
    ) -> Result<(Deployment, DeploymentApproval), DeployError> {
        let deployment = self.records.require_deployment(deployment_id).await?;
        let not_found =
            || DeployError::NotFound(format!("No pending approval for deployment {}", deployment_id));

        if deployment.status != DeploymentStatus::PendingApproval {
            return Err(not_found());
        }
        let approval_id = deployment.approval_id.clone().ok_or_else(not_found)?;
        let approval = self
            .records
            .load_approval(&approval_id)
            .await?
            .filter(|a| a.status == ApprovalStatus::Pending)
            .ok_or_else(not_found)?;

        Ok((deployment, approval))
    }
}
