//! Application configuration options

use std::collections::HashMap;
use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::{
    AuthSettings, PipelineSettings, Settings, StoreBackend, TargetSettings, MAX_TTL_HOURS,
};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// On-disk layout
    pub layout: StorageLayout,

    /// Which record store to open
    pub backend: StoreBackend,

    /// Server configuration
    pub server: ServerOptions,

    /// How bearer tokens are verified
    pub auth: AuthSettings,

    /// Deployment pipeline options
    pub pipeline: PipelineOptions,
}

impl AppOptions {
    /// Resolve runtime options from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        let layout = match &settings.storage.base_dir {
            Some(dir) => StorageLayout::new(dir.clone()),
            None => StorageLayout::default(),
        };

        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            layout,
            backend: settings.storage.backend.clone(),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            auth: settings.auth.clone(),
            pipeline: PipelineOptions::from(&settings.pipeline),
        }
    }
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown, including in-flight pipelines
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerOptions {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options consumed by the deployment orchestrator
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Target that always requires approval
    pub production_target: String,

    /// How long an approval request stays valid
    pub approval_ttl: chrono::Duration,

    /// How long a cached build may be reused
    pub cache_ttl: chrono::Duration,

    /// Base URL used for notification links
    pub dashboard_url: String,

    /// Build and hosting configuration per target
    pub targets: HashMap<String, TargetSettings>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for PipelineOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            production_target: settings.production_target.clone(),
            approval_ttl: ttl_hours(settings.approval_ttl_hours),
            cache_ttl: ttl_hours(settings.cache_ttl_hours),
            dashboard_url: settings.dashboard_url.clone(),
            targets: settings.targets.clone(),
        }
    }
}

// Clamped so unvalidated settings cannot overflow chrono
fn ttl_hours(hours: i64) -> chrono::Duration {
    chrono::Duration::hours(hours.clamp(1, MAX_TTL_HOURS))
}
