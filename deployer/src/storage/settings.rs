//! Settings file management

use std::collections::HashMap;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Service settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Record store and artifact storage
    #[serde(default)]
    pub storage: StorageSettings,

    /// Bearer token verification
    #[serde(default)]
    pub auth: AuthSettings,

    /// Build and deploy pipeline
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Maximum time to wait for in-flight pipelines on shutdown
    #[serde(default = "default_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            auth: AuthSettings::default(),
            pipeline: PipelineSettings::default(),
            max_shutdown_delay_secs: default_shutdown_delay(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        let settings: Settings = file.read_json().await.map_err(|e| {
            DeployError::ConfigError(format!(
                "Failed to read settings file {}: {}",
                file.path().display(),
                e
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field requirements serde cannot express
    pub fn validate(&self) -> Result<(), DeployError> {
        match self.auth.mode {
            AuthMode::Jwt if self.auth.jwt_secret.is_none() => {
                return Err(DeployError::ConfigError(
                    "auth.jwt_secret is required in jwt mode".to_string(),
                ));
            }
            AuthMode::Remote if self.auth.userinfo_url.is_none() => {
                return Err(DeployError::ConfigError(
                    "auth.userinfo_url is required in remote mode".to_string(),
                ));
            }
            _ => {}
        }

        if self.pipeline.production_target.trim().is_empty() {
            return Err(DeployError::ConfigError(
                "pipeline.production_target must not be empty".to_string(),
            ));
        }

        for (field, hours) in [
            ("approval_ttl_hours", self.pipeline.approval_ttl_hours),
            ("cache_ttl_hours", self.pipeline.cache_ttl_hours),
        ] {
            if !(1..=MAX_TTL_HOURS).contains(&hours) {
                return Err(DeployError::ConfigError(format!(
                    "pipeline.{} must be between 1 and {}, got {}",
                    field, MAX_TTL_HOURS, hours
                )));
            }
        }

        for (name, target) in &self.pipeline.targets {
            if target.deploy_command.trim().is_empty() {
                return Err(DeployError::ConfigError(format!(
                    "pipeline.targets.{}.deploy_command must not be empty",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    /// Overrides the platform default base directory
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    #[serde(default)]
    pub backend: StoreBackend,
}

/// Which record store implementation to use
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON document under the base directory
    #[default]
    File,

    /// Process memory only; nothing survives a restart
    Memory,

    /// Firebase Realtime Database over REST
    Firebase {
        url: String,
        #[serde(default)]
        auth_token: Option<SecretString>,
    },
}

/// Token verification mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Verify HS256 JWTs locally
    #[default]
    Jwt,

    /// Ask the identity provider's user-info endpoint
    Remote,
}

/// Authentication settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub mode: AuthMode,

    #[serde(default)]
    pub jwt_secret: Option<SecretString>,

    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default)]
    pub audience: Option<String>,

    #[serde(default)]
    pub userinfo_url: Option<String>,
}

/// Pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Target that always requires approval
    #[serde(default = "default_production_target")]
    pub production_target: String,

    #[serde(default = "default_ttl_hours")]
    pub approval_ttl_hours: i64,

    #[serde(default = "default_ttl_hours")]
    pub cache_ttl_hours: i64,

    /// Base URL used for notification action links
    #[serde(default)]
    pub dashboard_url: String,

    #[serde(default)]
    pub targets: HashMap<String, TargetSettings>,
}

fn default_production_target() -> String {
    "production".to_string()
}

/// Upper bound for approval and cache lifetimes (ten years)
pub const MAX_TTL_HOURS: i64 = 24 * 365 * 10;

fn default_ttl_hours() -> i64 {
    24
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            production_target: default_production_target(),
            approval_ttl_hours: default_ttl_hours(),
            cache_ttl_hours: default_ttl_hours(),
            dashboard_url: String::new(),
            targets: HashMap::new(),
        }
    }
}

/// How to build and ship one hosting target
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSettings {
    /// Hosting site id, defaults to the target name
    #[serde(default)]
    pub site: Option<String>,

    /// Hosting project id
    #[serde(default)]
    pub project: Option<String>,

    /// Directory the build commands run in
    pub working_dir: PathBuf,

    /// Shell commands run in order; the first failure aborts the build
    #[serde(default)]
    pub build_commands: Vec<String>,

    /// Build output, relative to `working_dir`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Hosting CLI invocation, run inside the staged deploy directory
    #[serde(default = "default_deploy_command")]
    pub deploy_command: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_deploy_command() -> String {
    "firebase deploy --only hosting:{site} --project {project} --non-interactive".to_string()
}
