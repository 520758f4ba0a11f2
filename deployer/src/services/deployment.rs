//! Deployment orchestrator
//!
//! Owns the deployment state machine and drives a deployment through build
//! and deploy. Requests return as soon as the record is persisted; the
//! pipeline runs in the background and reports progress only through the
//! record store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::app::options::PipelineOptions;
use crate::cache::build::BuildCache;
use crate::deploy::builder::BuildExecutor;
use crate::deploy::command::CommandRunner;
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::hosting::HostingDeployer;
use crate::deploy::stage_log::StageLog;
use crate::deploy::tracker::PipelineTracker;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::approval::{ApprovalStatus, DeploymentApproval};
use crate::models::cache::BuildCacheEntry;
use crate::models::deployment::{Deployment, DeploymentRequest, DeploymentStatus, LogStage};
use crate::models::notification::{Notification, NotificationKind};
use crate::notify::notifier::Notifier;
use crate::storage::layout::StorageLayout;
use crate::storage::records::{DeploymentPatch, Records};
use crate::storage::settings::TargetSettings;
use crate::utils::generate_uuid;

/// Default page size for deployment history
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

pub struct DeploymentService {
    pub(super) records: Records,
    pub(super) cache: BuildCache,
    pub(super) notifier: Notifier,
    builder: BuildExecutor,
    hosting: HostingDeployer,
    tracker: Arc<PipelineTracker>,
    pub(super) options: PipelineOptions,
}

impl DeploymentService {
    pub fn new(
        records: Records,
        runner: Arc<dyn CommandRunner>,
        layout: &StorageLayout,
        options: PipelineOptions,
    ) -> Self {
        Self {
            cache: BuildCache::new(records.clone(), options.cache_ttl),
            notifier: Notifier::new(records.clone(), options.dashboard_url.clone()),
            builder: BuildExecutor::new(runner.clone(), layout.cache_dir(), layout.builds_dir()),
            hosting: HostingDeployer::new(runner, layout.deploy_dir()),
            tracker: Arc::new(PipelineTracker::new()),
            records,
            options,
        }
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    /// Background pipelines started by this service
    pub fn tracker(&self) -> &Arc<PipelineTracker> {
        &self.tracker
    }

    /// Whether a request has to wait for a human before building
    pub fn requires_approval(&self, request: &DeploymentRequest) -> bool {
        request.requires_approval || request.target.trim() == self.options.production_target
    }

    /// Create a deployment for `request` and either gate it behind an approval
    /// or start its pipeline. Returns the record as persisted at return time.
    pub async fn deploy_to_hosting(
        self: &Arc<Self>,
        request: DeploymentRequest,
        user_id: &str,
    ) -> Result<Deployment, DeployError> {
        if request.target.trim().is_empty() {
            return Err(DeployError::ValidationError(
                "target is required".to_string(),
            ));
        }

        let requested_at = Utc::now();
        let approval_expiry = if self.requires_approval(&request) {
            Some(self.approval_expiry(requested_at)?)
        } else {
            None
        };

        let deployment = Deployment::from_request(generate_uuid(), &request, user_id);
        self.records.save_deployment(&deployment).await?;
        info!(
            "Deployment {} of {} requested by {}",
            deployment.id, deployment.target, user_id
        );

        if let Some(expires_at) = approval_expiry {
            return self
                .request_approval(deployment, requested_at, expires_at)
                .await;
        }

        self.dispatch(deployment.clone());
        Ok(deployment)
    }

    fn approval_expiry(&self, requested_at: DateTime<Utc>) -> Result<DateTime<Utc>, DeployError> {
        requested_at
            .checked_add_signed(self.options.approval_ttl)
            .ok_or_else(|| {
                DeployError::ConfigError(format!(
                    "Approval ttl of {} hours is out of range",
                    self.options.approval_ttl.num_hours()
                ))
            })
    }

    async fn request_approval(
        &self,
        mut deployment: Deployment,
        requested_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Deployment, DeployError> {
        let mut fsm = DeploymentFsm::resume(deployment.status);
        let status = fsm.process(DeploymentEvent::RequestApproval)?;

        let approval = DeploymentApproval {
            id: generate_uuid(),
            deployment_id: deployment.id.clone(),
            requested_by: deployment.deployed_by.clone(),
            requested_at,
            approver: None,
            decided_at: None,
            status: ApprovalStatus::Pending,
            expires_at,
            comments: None,
        };
        self.records.save_approval(&approval).await?;

        self.records
            .patch_deployment(
                &deployment.id,
                DeploymentPatch {
                    status: Some(status),
                    approval_id: Some(approval.id.clone()),
                    ..Default::default()
                },
            )
            .await?;
        deployment.status = status;
        deployment.approval_id = Some(approval.id.clone());

        info!(
            "Deployment {} of {} awaits approval {} until {}",
            deployment.id, deployment.target, approval.id, approval.expires_at
        );
        self.emit(&deployment, NotificationKind::ApprovalRequired)
            .await;
        Ok(deployment)
    }

    /// Start the pipeline for `deployment` without waiting for it
    pub(super) fn dispatch(self: &Arc<Self>, deployment: Deployment) {
        let service = Arc::clone(self);
        let id = deployment.id.clone();
        self.tracker.spawn(&id, async move {
            service.process_deployment(deployment).await;
        });
    }

    /// Wait for the background pipeline of a deployment to finish
    pub async fn wait_for(&self, deployment_id: &str) -> Result<(), DeployError> {
        self.tracker.wait(deployment_id).await
    }

    // =============================== PIPELINE ================================ //

    /// Run build and deploy for a deployment that is `in_progress` or
    /// `approved`. Every failure is captured in the record; nothing is
    /// returned to the caller.
    pub async fn process_deployment(&self, mut deployment: Deployment) -> Deployment {
        let mut fsm = DeploymentFsm::resume(deployment.status);
        let mut stage = LogStage::Build;

        match self
            .run_pipeline(&mut deployment, &mut fsm, &mut stage)
            .await
        {
            Ok(()) => {
                let completed_at = Utc::now();
                let patch = DeploymentPatch {
                    completed_at: Some(completed_at),
                    ..Default::default()
                };
                if let Err(e) = self.records.patch_deployment(&deployment.id, patch).await {
                    error!("Failed to record completion of {}: {}", deployment.id, e);
                }
                deployment.completed_at = Some(completed_at);
                info!("Deployment {} of {} succeeded", deployment.id, deployment.target);

                self.emit(&deployment, NotificationKind::DeploymentSucceeded)
                    .await;
                if deployment.rollback_from.is_some() {
                    self.supersede_previous(&deployment).await;
                }
            }
            Err(e) => self.fail(&mut deployment, &mut fsm, stage, e).await,
        }

        deployment
    }

    async fn run_pipeline(
        &self,
        deployment: &mut Deployment,
        fsm: &mut DeploymentFsm,
        stage: &mut LogStage,
    ) -> Result<(), DeployError> {
        self.transition(deployment, fsm, DeploymentEvent::StartBuild)
            .await?;

        let build_log = StageLog::new(self.records.clone(), &deployment.id, LogStage::Build);
        let target = self.target_settings(&deployment.target)?;
        let artifact = self.build_step(deployment, &target, &build_log).await?;

        *stage = LogStage::Deploy;
        self.transition(deployment, fsm, DeploymentEvent::StartDeploy)
            .await?;

        let deploy_log = StageLog::new(self.records.clone(), &deployment.id, LogStage::Deploy);
        self.hosting
            .deploy(deployment, &target, &artifact, &deploy_log)
            .await?;

        self.transition(deployment, fsm, DeploymentEvent::Succeed)
            .await
    }

    fn target_settings(&self, target: &str) -> Result<TargetSettings, DeployError> {
        self.options.targets.get(target).cloned().ok_or_else(|| {
            DeployError::BuildError(format!("No build configuration for target {}", target))
        })
    }

    /// Produce the artifact directory for a deployment, from the build cache
    /// when possible.
    async fn build_step(
        &self,
        deployment: &mut Deployment,
        target: &TargetSettings,
        log: &StageLog,
    ) -> Result<Dir, DeployError> {
        if let Some(artifact) = self.rollback_artifact(deployment, log).await? {
            return Ok(artifact);
        }

        let cacheable = deployment.use_cache && !deployment.commit_sha.is_empty();
        if cacheable {
            if let Some(entry) = self
                .cache
                .get_cached_build(&deployment.commit_sha, &deployment.target)
                .await?
            {
                log.line(format!(
                    "Using cached build from {} ({})",
                    entry.created_at.to_rfc3339(),
                    entry.artifact_path
                ))
                .await;
                self.record_artifact(deployment, &entry.artifact_path, true)
                    .await?;
                return Ok(Dir::new(&entry.artifact_path));
            }
        }

        let artifact = self
            .builder
            .build(deployment, target, cacheable, log)
            .await?;
        let artifact_path = artifact.path().display().to_string();
        self.record_artifact(deployment, &artifact_path, false)
            .await?;

        if cacheable {
            self.cache
                .cache_build(&deployment.commit_sha, &deployment.target, &artifact_path)
                .await?;
            log.line(format!("Cached build of {}", deployment.commit_sha))
                .await;
        }

        Ok(artifact)
    }

    /// A rollback reuses the artifact of the deployment it restores while that
    /// artifact is still on disk.
    async fn rollback_artifact(
        &self,
        deployment: &mut Deployment,
        log: &StageLog,
    ) -> Result<Option<Dir>, DeployError> {
        let Some(source_id) = deployment.rollback_from.clone() else {
            return Ok(None);
        };
        let Some(source) = self.records.load_deployment(&source_id).await? else {
            return Ok(None);
        };
        let Some(path) = source.artifact_path else {
            return Ok(None);
        };

        let artifact = Dir::new(&path);
        if !artifact.exists().await {
            return Ok(None);
        }

        log.line(format!("Reusing artifact of deployment {} ({})", source_id, path))
            .await;
        // nothing was built for the rollback itself
        self.record_artifact(deployment, &path, true).await?;
        Ok(Some(artifact))
    }

    async fn record_artifact(
        &self,
        deployment: &mut Deployment,
        artifact_path: &str,
        from_cache: bool,
    ) -> Result<(), DeployError> {
        self.records
            .patch_deployment(
                &deployment.id,
                DeploymentPatch {
                    artifact_path: Some(artifact_path.to_string()),
                    from_cache: Some(from_cache),
                    ..Default::default()
                },
            )
            .await?;
        deployment.artifact_path = Some(artifact_path.to_string());
        deployment.from_cache = from_cache;
        Ok(())
    }

    /// Apply `event` to the FSM and persist the resulting status
    pub(super) async fn transition(
        &self,
        deployment: &mut Deployment,
        fsm: &mut DeploymentFsm,
        event: DeploymentEvent,
    ) -> Result<(), DeployError> {
        let status = fsm.process(event)?;
        self.records
            .patch_deployment(&deployment.id, DeploymentPatch::status(status))
            .await?;
        deployment.status = status;
        info!("Deployment {} is now {}", deployment.id, status);
        Ok(())
    }

    async fn fail(
        &self,
        deployment: &mut Deployment,
        fsm: &mut DeploymentFsm,
        stage: LogStage,
        err: DeployError,
    ) {
        let message = err.to_string();
        error!(
            "Deployment {} failed during {}: {}",
            deployment.id,
            stage.key(),
            message
        );

        StageLog::new(self.records.clone(), &deployment.id, stage)
            .line(format!("Error: {}", message))
            .await;

        if let Err(e) = fsm.process(DeploymentEvent::Fail(message.clone())) {
            warn!("Forcing {} to failed: {}", deployment.id, e);
        }

        let completed_at = Utc::now();
        let patch = DeploymentPatch {
            status: Some(DeploymentStatus::Failed),
            completed_at: Some(completed_at),
            error: Some(message.clone()),
            ..Default::default()
        };
        if let Err(e) = self.records.patch_deployment(&deployment.id, patch).await {
            error!("Failed to record failure of {}: {}", deployment.id, e);
        }

        deployment.status = DeploymentStatus::Failed;
        deployment.completed_at = Some(completed_at);
        deployment.error = Some(message);
        self.emit(deployment, NotificationKind::DeploymentFailed)
            .await;
    }

    /// Write a notification; failures are logged and swallowed
    pub(super) async fn emit(&self, deployment: &Deployment, kind: NotificationKind) {
        if let Err(e) = self.notifier.notify(deployment, kind).await {
            warn!(
                "Failed to write {:?} notification for {}: {}",
                kind, deployment.id, e
            );
        }
    }

    // ================================ QUERIES ================================ //

    pub async fn get_deployment(&self, id: &str) -> Result<Deployment, DeployError> {
        self.records.require_deployment(id).await
    }

    /// Deployments newest first, optionally for one target
    pub async fn get_deployment_history(
        &self,
        target: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Deployment>, DeployError> {
        let deployments = self.records.list_deployments().await?;
        Ok(deployments
            .into_iter()
            .filter(|d| target.map_or(true, |t| d.target == t))
            .take(limit)
            .collect())
    }

    pub async fn get_cached_build(
        &self,
        commit_sha: &str,
        target: &str,
    ) -> Result<Option<BuildCacheEntry>, DeployError> {
        self.cache.get_cached_build(commit_sha, target).await
    }

    pub async fn invalidate_cached_build(
        &self,
        commit_sha: &str,
        target: &str,
    ) -> Result<(), DeployError> {
        self.cache.invalidate(commit_sha, target).await
    }

    pub async fn list_notifications(
        &self,
        unread_only: bool,
    ) -> Result<Vec<Notification>, DeployError> {
        let notifications = self.records.list_notifications().await?;
        Ok(notifications
            .into_iter()
            .filter(|n| !unread_only || !n.read)
            .collect())
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<Notification, DeployError> {
        if self.records.load_notification(id).await?.is_none() {
            return Err(DeployError::NotFound(format!(
                "Notification {} not found",
                id
            )));
        }
        self.records.mark_notification_read(id).await?;
        self.records
            .load_notification(id)
            .await?
            .ok_or_else(|| DeployError::NotFound(format!("Notification {} not found", id)))
    }
}
