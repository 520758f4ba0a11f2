//! Application state management

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::info;

use crate::app::options::AppOptions;
use crate::authn::identity::{IdentityVerifier, JwtVerifier};
use crate::authn::remote::RemoteVerifier;
use crate::deploy::command::{CommandRunner, ShellRunner};
use crate::errors::DeployError;
use crate::services::deployment::DeploymentService;
use crate::storage::firebase::FirebaseStore;
use crate::storage::records::Records;
use crate::storage::settings::{AuthMode, AuthSettings, StoreBackend};
use crate::storage::store::{FileStore, MemoryStore, Store};

/// Main application state
pub struct AppState {
    /// Deployment orchestrator
    pub service: Arc<DeploymentService>,

    /// Bearer token verifier for the HTTP server
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, DeployError> {
        info!("Initializing application state...");

        options.layout.setup().await?;
        let store = open_store(options).await?;
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new());

        let service = Arc::new(DeploymentService::new(
            Records::new(store),
            runner,
            &options.layout,
            options.pipeline.clone(),
        ));
        let verifier = build_verifier(&options.auth)?;

        Ok(Self { service, verifier })
    }

    /// Wait for in-flight pipelines to finish
    pub async fn shutdown(&self) -> Result<(), DeployError> {
        let in_flight = self.service.tracker().in_flight();
        if in_flight > 0 {
            info!("Waiting for {} in-flight pipelines...", in_flight);
        }
        self.service.tracker().drain().await
    }
}

/// Open the configured record store
pub async fn open_store(options: &AppOptions) -> Result<Arc<dyn Store>, DeployError> {
    let store: Arc<dyn Store> = match &options.backend {
        StoreBackend::File => {
            let file = options.layout.store_file();
            info!("Using file record store at {}", file.path().display());
            Arc::new(FileStore::open(file.path()).await?)
        }
        StoreBackend::Memory => {
            info!("Using in-memory record store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Firebase { url, auth_token } => {
            info!("Using Firebase record store at {}", url);
            Arc::new(FirebaseStore::new(url, auth_token.clone())?)
        }
    };
    Ok(store)
}

/// Build the token verifier for the configured auth mode
pub fn build_verifier(auth: &AuthSettings) -> Result<Arc<dyn IdentityVerifier>, DeployError> {
    match auth.mode {
        AuthMode::Jwt => {
            let secret = auth.jwt_secret.as_ref().ok_or_else(|| {
                DeployError::ConfigError("auth.jwt_secret is required in jwt mode".to_string())
            })?;
            if secret.expose_secret().is_empty() {
                return Err(DeployError::ConfigError(
                    "auth.jwt_secret must not be empty".to_string(),
                ));
            }
            Ok(Arc::new(JwtVerifier::new(
                secret,
                auth.issuer.as_deref(),
                auth.audience.as_deref(),
            )))
        }
        AuthMode::Remote => {
            let url = auth.userinfo_url.as_deref().ok_or_else(|| {
                DeployError::ConfigError("auth.userinfo_url is required in remote mode".to_string())
            })?;
            Ok(Arc::new(RemoteVerifier::new(url)?))
        }
    }
}
