//! Deployment orchestrator integration tests

#[path = "common/mod.rs"]
mod common;

use chrono::{Duration, Utc};
use tokio_test::assert_ok;

use blend_deploy::cache::build::cache_key;
use blend_deploy::errors::DeployError;
use blend_deploy::models::approval::ApprovalStatus;
use blend_deploy::models::deployment::{Deployment, DeploymentRequest, DeploymentStatus};
use blend_deploy::models::notification::NotificationKind;

use common::{target, Fixture};

fn request(target: &str, commit: &str) -> DeploymentRequest {
    DeploymentRequest {
        commit_sha: commit.to_string(),
        branch: "main".to_string(),
        version: "1.4.0".to_string(),
        ..DeploymentRequest::new(target)
    }
}

async fn deploy_and_wait(fx: &Fixture, request: DeploymentRequest) -> Deployment {
    let created = fx
        .service
        .deploy_to_hosting(request, "user-1")
        .await
        .unwrap();
    assert_ok!(fx.service.wait_for(&created.id).await);
    fx.service.get_deployment(&created.id).await.unwrap()
}

async fn notification_kinds(fx: &Fixture, deployment_id: &str) -> Vec<NotificationKind> {
    let mut notifications = fx.service.list_notifications(false).await.unwrap();
    notifications.retain(|n| n.deployment_id == deployment_id);
    notifications.sort_by_key(|n| n.created_at);
    notifications.into_iter().map(|n| n.kind).collect()
}

// ============================== PIPELINE ============================== //

#[tokio::test]
async fn test_deploy_runs_build_and_deploy_to_success() {
    let fx = Fixture::new();

    let created = fx
        .service
        .deploy_to_hosting(request("storybook", "abc123"), "user-1")
        .await
        .unwrap();
    assert_eq!(created.status, DeploymentStatus::InProgress);
    assert_eq!(created.deployed_by, "user-1");

    assert_ok!(fx.service.wait_for(&created.id).await);
    let deployment = fx.service.get_deployment(&created.id).await.unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert!(deployment.completed_at.is_some());
    assert!(!deployment.from_cache);
    assert_eq!(
        fx.store.statuses_of(&created.id),
        vec!["in_progress", "building", "deploying", "success"]
    );

    assert!(deployment
        .logs
        .build
        .iter()
        .any(|l| l.starts_with("$ mkdir -p dist")));
    assert!(deployment
        .logs
        .deploy
        .iter()
        .any(|l| l == "released to blend-storybook"));

    let staged = fx.layout.deploy_dir().subdir("storybook").path().join("index.html");
    assert_eq!(
        std::fs::read_to_string(staged).unwrap().trim(),
        "abc123@storybook"
    );

    assert_eq!(
        notification_kinds(&fx, &created.id).await,
        vec![NotificationKind::DeploymentSucceeded]
    );
}

#[tokio::test]
async fn test_empty_target_is_rejected_without_a_record() {
    let fx = Fixture::new();

    let result = fx
        .service
        .deploy_to_hosting(request("  ", "abc123"), "user-1")
        .await;

    assert!(matches!(result, Err(DeployError::ValidationError(_))));
    assert!(fx.records.list_deployments().await.unwrap().is_empty());
    assert!(fx.runner.commands().is_empty());
}

#[tokio::test]
async fn test_failing_build_marks_deployment_failed() {
    let fx = Fixture::with_targets(|targets| {
        let workdir = targets["storybook"].working_dir.clone();
        targets.insert(
            "storybook".to_string(),
            target(&workdir, "echo compiling; echo boom >&2; exit 3"),
        );
    });

    let deployment = deploy_and_wait(&fx, request("storybook", "abc123")).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.error.as_deref().unwrap().contains("exit code 3"));
    assert!(deployment.logs.build.contains(&"compiling".to_string()));
    assert!(deployment.logs.build.contains(&"[stderr] boom".to_string()));
    assert!(deployment.logs.build.last().unwrap().starts_with("Error:"));
    assert!(deployment.logs.deploy.is_empty());
    assert_eq!(
        fx.store.statuses_of(&deployment.id),
        vec!["in_progress", "building", "failed"]
    );

    assert_eq!(fx.runner.count_matching("released"), 0);
    assert!(fx
        .service
        .get_cached_build("abc123", "storybook")
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        notification_kinds(&fx, &deployment.id).await,
        vec![NotificationKind::DeploymentFailed]
    );
}

#[tokio::test]
async fn test_failing_hosting_command_fails_in_deploy_stage() {
    let fx = Fixture::with_targets(|targets| {
        if let Some(storybook) = targets.get_mut("storybook") {
            storybook.deploy_command = "echo 'not logged in' >&2; exit 1".to_string();
        }
    });

    let deployment = deploy_and_wait(&fx, request("storybook", "abc123")).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert_eq!(
        fx.store.statuses_of(&deployment.id),
        vec!["in_progress", "building", "deploying", "failed"]
    );
    assert!(deployment
        .logs
        .deploy
        .contains(&"[stderr] not logged in".to_string()));
    assert!(deployment.logs.deploy.last().unwrap().starts_with("Error:"));
}

#[tokio::test]
async fn test_unconfigured_target_fails() {
    let fx = Fixture::new();

    let deployment = deploy_and_wait(&fx, request("marketing", "abc123")).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment
        .error
        .as_deref()
        .unwrap()
        .contains("No build configuration for target marketing"));
    assert!(fx.runner.commands().is_empty());
}

// =============================== CACHE =============================== //

#[tokio::test]
async fn test_second_deploy_of_same_commit_uses_cache() {
    let fx = Fixture::new();

    let first = deploy_and_wait(&fx, request("storybook", "abc123")).await;
    assert_eq!(first.status, DeploymentStatus::Success);

    let entry = fx
        .service
        .get_cached_build("abc123", "storybook")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.key, cache_key("abc123", "storybook"));
    assert_eq!(entry.artifact_path, first.artifact_path.clone().unwrap());
    assert_eq!(entry.expires_at - entry.created_at, Duration::hours(24));

    let second = deploy_and_wait(&fx, request("storybook", "abc123")).await;

    assert_eq!(second.status, DeploymentStatus::Success);
    assert!(second.from_cache);
    assert!(second
        .logs
        .build
        .iter()
        .any(|l| l.starts_with("Using cached build")));
    assert_eq!(fx.runner.count_matching("mkdir -p dist"), 1);
    assert_eq!(fx.runner.count_matching("released"), 2);
}

#[tokio::test]
async fn test_cache_ttl_overflow_fails_deployment() {
    let fx = Fixture::with_options(|options| {
        options.cache_ttl = Duration::hours(10_000_000_000);
    });

    let deployment = deploy_and_wait(&fx, request("storybook", "abc123")).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.completed_at.is_some());
    assert!(deployment.error.unwrap().contains("out of range"));
    assert_eq!(
        notification_kinds(&fx, &deployment.id).await,
        vec![NotificationKind::DeploymentFailed]
    );
}

#[tokio::test]
async fn test_deleted_artifact_evicts_cache_entry() {
    let fx = Fixture::new();

    let first = deploy_and_wait(&fx, request("docs", "def456")).await;
    let artifact = first.artifact_path.clone().unwrap();
    std::fs::remove_dir_all(&artifact).unwrap();

    assert!(fx
        .service
        .get_cached_build("def456", "docs")
        .await
        .unwrap()
        .is_none());
    assert!(fx
        .records
        .load_cache_entry(&cache_key("def456", "docs"))
        .await
        .unwrap()
        .is_none());

    let second = deploy_and_wait(&fx, request("docs", "def456")).await;
    assert_eq!(second.status, DeploymentStatus::Success);
    assert!(!second.from_cache);
    assert_eq!(fx.runner.count_matching("mkdir -p dist"), 2);
}

#[tokio::test]
async fn test_cache_disabled_or_unattributed_builds_always_build() {
    let fx = Fixture::new();

    let mut uncached = request("storybook", "abc123");
    uncached.use_cache = false;
    deploy_and_wait(&fx, uncached.clone()).await;
    deploy_and_wait(&fx, uncached).await;
    assert_eq!(fx.runner.count_matching("mkdir -p dist"), 2);
    assert!(fx
        .service
        .get_cached_build("abc123", "storybook")
        .await
        .unwrap()
        .is_none());

    let unattributed = deploy_and_wait(&fx, request("storybook", "")).await;
    assert_eq!(unattributed.status, DeploymentStatus::Success);
    assert_eq!(fx.runner.count_matching("mkdir -p dist"), 3);
    assert!(unattributed
        .artifact_path
        .unwrap()
        .starts_with(&fx.layout.builds_dir().path().display().to_string()));
}

// ============================== APPROVALS ============================== //

#[tokio::test]
async fn test_production_deploy_waits_for_approval() {
    let fx = Fixture::new();

    let created = fx
        .service
        .deploy_to_hosting(request("production", "abc123"), "user-1")
        .await
        .unwrap();

    assert_eq!(created.status, DeploymentStatus::PendingApproval);
    let approval_id = created.approval_id.clone().unwrap();

    assert_ok!(fx.service.wait_for(&created.id).await);
    let stored = fx.service.get_deployment(&created.id).await.unwrap();
    assert_eq!(stored.status, DeploymentStatus::PendingApproval);
    assert!(stored.logs.build.is_empty());
    assert!(fx.runner.commands().is_empty());
    assert_eq!(fx.service.tracker().in_flight(), 0);

    let pending = fx.service.list_pending_approvals().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, approval_id);
    assert_eq!(pending[0].deployment_id, created.id);
    assert_eq!(pending[0].requested_by, "user-1");
    assert!(pending[0].expires_at > Utc::now() + Duration::hours(23));

    assert_eq!(
        notification_kinds(&fx, &created.id).await,
        vec![NotificationKind::ApprovalRequired]
    );
}

#[tokio::test]
async fn test_explicit_approval_flag_gates_any_target() {
    let fx = Fixture::new();

    let mut gated = request("docs", "abc123");
    gated.requires_approval = true;
    let created = fx.service.deploy_to_hosting(gated, "user-1").await.unwrap();

    assert_eq!(created.status, DeploymentStatus::PendingApproval);
    assert!(fx.runner.commands().is_empty());
}

#[tokio::test]
async fn test_approval_resumes_pipeline() {
    let fx = Fixture::new();

    let created = fx
        .service
        .deploy_to_hosting(request("production", "abc123"), "user-1")
        .await
        .unwrap();

    let approved = fx
        .service
        .approve_deployment(&created.id, "admin-1", Some("ship it".to_string()))
        .await
        .unwrap();
    assert_eq!(approved.status, DeploymentStatus::Approved);

    assert_ok!(fx.service.wait_for(&created.id).await);
    let deployment = fx.service.get_deployment(&created.id).await.unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert_eq!(
        fx.store.statuses_of(&created.id),
        vec![
            "in_progress",
            "pending_approval",
            "approved",
            "building",
            "deploying",
            "success"
        ]
    );

    let approval = fx
        .records
        .load_approval(created.approval_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.status, ApprovalStatus::Approved);
    assert_eq!(approval.approver.as_deref(), Some("admin-1"));
    assert_eq!(approval.comments.as_deref(), Some("ship it"));
    assert!(fx.service.list_pending_approvals().await.unwrap().is_empty());

    assert_eq!(
        notification_kinds(&fx, &created.id).await,
        vec![
            NotificationKind::ApprovalRequired,
            NotificationKind::DeploymentApproved,
            NotificationKind::DeploymentSucceeded
        ]
    );

    // a decided approval cannot be approved twice
    let again = fx
        .service
        .approve_deployment(&created.id, "admin-1", None)
        .await;
    assert!(matches!(again, Err(DeployError::NotFound(_))));
}

#[tokio::test]
async fn test_rejection_cancels_deployment() {
    let fx = Fixture::new();

    let created = fx
        .service
        .deploy_to_hosting(request("production", "abc123"), "user-1")
        .await
        .unwrap();

    let rejected = fx
        .service
        .reject_deployment(&created.id, "admin-1", Some("freeze".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, DeploymentStatus::Cancelled);

    let deployment = fx.service.get_deployment(&created.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Cancelled);
    assert!(deployment.completed_at.is_some());
    assert!(fx.runner.commands().is_empty());

    let approval = fx
        .records
        .load_approval(created.approval_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.status, ApprovalStatus::Rejected);

    let late = fx
        .service
        .approve_deployment(&created.id, "admin-1", None)
        .await;
    assert!(matches!(late, Err(DeployError::NotFound(_))));
}

#[tokio::test]
async fn test_expired_approval_fails_deployment() {
    let fx = Fixture::new();

    let created = fx
        .service
        .deploy_to_hosting(request("production", "abc123"), "user-1")
        .await
        .unwrap();

    let mut approval = fx
        .records
        .load_approval(created.approval_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    approval.expires_at = Utc::now() - Duration::minutes(1);
    fx.records.save_approval(&approval).await.unwrap();

    let result = fx
        .service
        .approve_deployment(&created.id, "admin-1", None)
        .await;
    assert!(matches!(result, Err(DeployError::Conflict(_))));

    let deployment = fx.service.get_deployment(&created.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.error.unwrap().contains("expired"));
    assert!(fx.runner.commands().is_empty());

    let approval = fx.records.load_approval(&approval.id).await.unwrap().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Expired);
}

#[tokio::test]
async fn test_expired_approvals_are_not_listed_as_pending() {
    let fx = Fixture::new();

    let stale = fx
        .service
        .deploy_to_hosting(request("production", "aaa111"), "user-1")
        .await
        .unwrap();
    let fresh = fx
        .service
        .deploy_to_hosting(request("production", "bbb222"), "user-1")
        .await
        .unwrap();

    let mut approval = fx
        .records
        .load_approval(stale.approval_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    approval.expires_at = Utc::now() - Duration::minutes(1);
    fx.records.save_approval(&approval).await.unwrap();

    let pending = fx.service.list_pending_approvals().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].deployment_id, fresh.id);
}

#[tokio::test]
async fn test_approval_ttl_out_of_range_is_rejected_before_saving() {
    let fx = Fixture::with_options(|options| {
        options.approval_ttl = Duration::hours(10_000_000_000);
    });

    let result = fx
        .service
        .deploy_to_hosting(request("production", "abc123"), "user-1")
        .await;
    assert!(matches!(result, Err(DeployError::ConfigError(_))));

    assert!(fx
        .service
        .get_deployment_history(None, 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_approving_unknown_deployment_is_not_found() {
    let fx = Fixture::new();

    let result = fx
        .service
        .approve_deployment("missing", "admin-1", None)
        .await;
    assert!(matches!(result, Err(DeployError::NotFound(_))));

    let ungated = deploy_and_wait(&fx, request("docs", "abc123")).await;
    let result = fx
        .service
        .approve_deployment(&ungated.id, "admin-1", None)
        .await;
    assert!(matches!(result, Err(DeployError::NotFound(_))));
}

// =============================== ROLLBACK =============================== //

#[tokio::test]
async fn test_rollback_redeploys_previous_artifact() {
    let fx = Fixture::new();

    let v1 = deploy_and_wait(&fx, request("storybook", "aaa111")).await;
    let v2 = deploy_and_wait(&fx, request("storybook", "bbb222")).await;
    assert_eq!(v2.status, DeploymentStatus::Success);

    let created = fx
        .service
        .rollback_deployment(&v1.id, "user-2", None)
        .await
        .unwrap();
    assert_eq!(created.rollback_from.as_deref(), Some(v1.id.as_str()));
    assert_eq!(created.commit_sha, "aaa111");

    assert_ok!(fx.service.wait_for(&created.id).await);
    let rollback = fx.service.get_deployment(&created.id).await.unwrap();

    assert_eq!(rollback.status, DeploymentStatus::Success);
    assert!(rollback.from_cache);
    assert!(rollback
        .logs
        .build
        .iter()
        .any(|l| l.starts_with("Reusing artifact of deployment")));
    assert_eq!(fx.runner.count_matching("mkdir -p dist"), 2);

    let staged = fx.layout.deploy_dir().subdir("storybook").path().join("index.html");
    assert_eq!(
        std::fs::read_to_string(staged).unwrap().trim(),
        "aaa111@storybook"
    );

    let v2 = fx.service.get_deployment(&v2.id).await.unwrap();
    assert_eq!(v2.status, DeploymentStatus::RolledBack);
    assert_eq!(v2.rolled_back_by.as_deref(), Some(rollback.id.as_str()));

    let v1 = fx.service.get_deployment(&v1.id).await.unwrap();
    assert_eq!(v1.status, DeploymentStatus::Success);

    assert_eq!(
        notification_kinds(&fx, &rollback.id).await,
        vec![
            NotificationKind::RollbackStarted,
            NotificationKind::DeploymentSucceeded
        ]
    );
}

#[tokio::test]
async fn test_rollback_requires_successful_source() {
    let fx = Fixture::new();

    let gated = fx
        .service
        .deploy_to_hosting(request("production", "abc123"), "user-1")
        .await
        .unwrap();

    let result = fx
        .service
        .rollback_deployment(&gated.id, "user-1", None)
        .await;
    assert!(matches!(result, Err(DeployError::Conflict(_))));

    let result = fx
        .service
        .rollback_deployment("missing", "user-1", None)
        .await;
    assert!(matches!(result, Err(DeployError::NotFound(_))));
}

#[tokio::test]
async fn test_rollback_of_production_is_not_gated() {
    let fx = Fixture::new();

    let created = fx
        .service
        .deploy_to_hosting(request("production", "abc123"), "user-1")
        .await
        .unwrap();
    fx.service
        .approve_deployment(&created.id, "admin-1", None)
        .await
        .unwrap();
    assert_ok!(fx.service.wait_for(&created.id).await);

    let rollback = fx
        .service
        .rollback_deployment(&created.id, "user-1", Some("bad release".to_string()))
        .await
        .unwrap();
    assert_eq!(rollback.status, DeploymentStatus::InProgress);
    assert_eq!(rollback.message.as_deref(), Some("bad release"));

    assert_ok!(fx.service.wait_for(&rollback.id).await);
    let rollback = fx.service.get_deployment(&rollback.id).await.unwrap();
    assert_eq!(rollback.status, DeploymentStatus::Success);
}

// =============================== QUERIES =============================== //

#[tokio::test]
async fn test_history_is_newest_first_and_filtered() {
    let fx = Fixture::new();

    let a = deploy_and_wait(&fx, request("docs", "c1")).await;
    let b = deploy_and_wait(&fx, request("storybook", "c2")).await;
    let c = deploy_and_wait(&fx, request("docs", "c3")).await;

    let all = fx.service.get_deployment_history(None, 50).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec![c.id.as_str(), b.id.as_str(), a.id.as_str()]);

    let docs = fx
        .service
        .get_deployment_history(Some("docs"), 1)
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, c.id);
}

#[tokio::test]
async fn test_notifications_can_be_marked_read() {
    let fx = Fixture::new();
    deploy_and_wait(&fx, request("docs", "c1")).await;

    let unread = fx.service.list_notifications(true).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert!(unread[0].action_url.starts_with("https://deploy.blend.dev/deployments/"));

    let read = fx
        .service
        .mark_notification_read(&unread[0].id)
        .await
        .unwrap();
    assert!(read.read);
    assert!(fx.service.list_notifications(true).await.unwrap().is_empty());
    assert_eq!(fx.service.list_notifications(false).await.unwrap().len(), 1);

    let missing = fx.service.mark_notification_read("missing").await;
    assert!(matches!(missing, Err(DeployError::NotFound(_))));
}
