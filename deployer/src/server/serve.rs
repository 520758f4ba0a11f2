//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DeployError;
use crate::server::handlers::{
    approve_deployment_handler, create_deployment_handler, get_cached_build_handler,
    get_deployment_handler, health_handler, invalidate_cached_build_handler,
    list_deployments_handler, list_notifications_handler, mark_notification_read_handler,
    pending_approvals_handler, reject_deployment_handler, rollback_deployment_handler,
    version_handler,
};
use crate::server::state::ServerState;

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route(
            "/deployments",
            get(list_deployments_handler).post(create_deployment_handler),
        )
        .route("/deployments/{id}", get(get_deployment_handler))
        .route("/deployments/{id}/approve", post(approve_deployment_handler))
        .route("/deployments/{id}/reject", post(reject_deployment_handler))
        .route("/deployments/{id}/rollback", post(rollback_deployment_handler))
        // Approvals
        .route("/approvals/pending", get(pending_approvals_handler))
        // Notifications
        .route("/notifications", get(list_notifications_handler))
        .route(
            "/notifications/{id}/read",
            post(mark_notification_read_handler),
        )
        // Build cache
        .route(
            "/cache/{commit_sha}/{target}",
            get(get_cached_build_handler).delete(invalidate_cached_build_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployError>>, DeployError> {
    let app = router(state);

    let addr = options.addr();
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployError::ServerError(format!("Failed to bind {}: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployError::ServerError(e.to_string()))
    });

    Ok(handle)
}
