//! Rollback to an earlier successful deployment

use std::sync::Arc;

use tracing::{info, warn};

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::errors::DeployError;
use crate::models::deployment::{Deployment, DeploymentRequest, DeploymentStatus};
use crate::models::notification::NotificationKind;
use crate::services::deployment::DeploymentService;
use crate::storage::records::DeploymentPatch;
use crate::utils::generate_uuid;

impl DeploymentService {
    /// Redeploy what `deployment_id` shipped as a new deployment.
    ///
    /// Rollbacks skip the approval gate. When the new deployment succeeds the
    /// deployment it replaced is marked `rolled_back`.
    pub async fn rollback_deployment(
        self: &Arc<Self>,
        deployment_id: &str,
        user_id: &str,
        reason: Option<String>,
    ) -> Result<Deployment, DeployError> {
        let source = self.records.require_deployment(deployment_id).await?;
        if source.status != DeploymentStatus::Success {
            return Err(DeployError::Conflict(format!(
                "Deployment {} is {} and cannot be rolled back to",
                source.id, source.status
            )));
        }

        let request = DeploymentRequest {
            message: Some(reason.unwrap_or_else(|| format!("Rollback to {}", source.id))),
            use_cache: true,
            ..source.to_request()
        };

        let mut deployment = Deployment::from_request(generate_uuid(), &request, user_id);
        deployment.rollback_from = Some(source.id.clone());
        self.records.save_deployment(&deployment).await?;

        info!(
            "Rollback {} of {} to {} requested by {}",
            deployment.id, deployment.target, source.id, user_id
        );
        self.emit(&deployment, NotificationKind::RollbackStarted)
            .await;

        self.dispatch(deployment.clone());
        Ok(deployment)
    }

    /// Mark the deployment a successful rollback replaced as `rolled_back`
    pub(super) async fn supersede_previous(&self, rollback: &Deployment) {
        let deployments = match self.records.list_deployments().await {
            Ok(deployments) => deployments,
            Err(e) => {
                warn!("Failed to list deployments after rollback {}: {}", rollback.id, e);
                return;
            }
        };

        let replaced = deployments.into_iter().find(|d| {
            d.target == rollback.target
                && d.id != rollback.id
                && d.status == DeploymentStatus::Success
                && d.started_at <= rollback.started_at
        });
        let Some(mut replaced) = replaced else {
            return;
        };
        if rollback.rollback_from.as_deref() == Some(replaced.id.as_str()) {
            // already live again, nothing was replaced
            return;
        }

        let mut fsm = DeploymentFsm::resume(replaced.status);
        let result = match fsm.process(DeploymentEvent::RollBack) {
            Ok(status) => {
                replaced.status = status;
                self.records
                    .patch_deployment(
                        &replaced.id,
                        DeploymentPatch {
                            status: Some(status),
                            rolled_back_by: Some(rollback.id.clone()),
                            ..Default::default()
                        },
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => info!("Deployment {} rolled back by {}", replaced.id, rollback.id),
            Err(e) => warn!(
                "Failed to mark {} rolled back by {}: {}",
                replaced.id, rollback.id, e
            ),
        }
    }
}
