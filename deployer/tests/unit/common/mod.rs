//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use blend_deploy::app::options::PipelineOptions;
use blend_deploy::deploy::command::{CommandOutput, CommandRunner, CommandSpec, ShellRunner};
use blend_deploy::errors::DeployError;
use blend_deploy::services::deployment::DeploymentService;
use blend_deploy::storage::layout::StorageLayout;
use blend_deploy::storage::records::Records;
use blend_deploy::storage::settings::TargetSettings;
use blend_deploy::storage::store::{MemoryStore, Store};

pub const BUILD_COMMAND: &str =
    "mkdir -p dist && echo \"$COMMIT_SHA@$DEPLOY_TARGET\" > dist/index.html";
pub const DEPLOY_COMMAND: &str = "test -f index.html && echo \"released to {site}\"";

/// Runs commands through `sh` and remembers what it ran
#[derive(Default)]
pub struct RecordingRunner {
    inner: ShellRunner,
    commands: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError> {
        self.commands.lock().unwrap().push(spec.command.clone());
        self.inner.run(spec).await
    }
}

/// Memory store that remembers every status written to a deployment
pub struct StatusRecordingStore {
    inner: MemoryStore,
    statuses: Mutex<Vec<(String, String)>>,
}

impl StatusRecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            statuses: Mutex::new(Vec::new()),
        }
    }

    /// Statuses written for one deployment, in order
    pub fn statuses_of(&self, id: &str) -> Vec<String> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(dep, _)| dep == id)
            .map(|(_, status)| status.clone())
            .collect()
    }

    fn record(&self, path: &str, status: Option<&Value>) {
        let Some(Value::String(status)) = status else {
            return;
        };
        let Some(id) = path.strip_prefix("deployments/history/") else {
            return;
        };
        if id.contains('/') {
            return;
        }
        self.statuses
            .lock()
            .unwrap()
            .push((id.to_string(), status.clone()));
    }
}

#[async_trait]
impl Store for StatusRecordingStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, DeployError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), DeployError> {
        self.record(path, value.get("status"));
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), DeployError> {
        self.record(path, fields.get("status"));
        self.inner.update(path, fields).await
    }

    async fn append(&self, path: &str, value: Value) -> Result<(), DeployError> {
        self.inner.append(path, value).await
    }

    async fn remove(&self, path: &str) -> Result<(), DeployError> {
        self.inner.remove(path).await
    }

    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, DeployError> {
        self.inner.list(path).await
    }
}

/// A deployment service wired to a temp directory and real `sh` commands
pub struct Fixture {
    pub tmp: tempfile::TempDir,
    pub layout: StorageLayout,
    pub store: Arc<StatusRecordingStore>,
    pub records: Records,
    pub runner: Arc<RecordingRunner>,
    pub service: Arc<DeploymentService>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_targets(|_| {})
    }

    /// Build a fixture, letting the caller adjust the target table first
    pub fn with_targets(configure: impl FnOnce(&mut HashMap<String, TargetSettings>)) -> Self {
        Self::with_options(|options| configure(&mut options.targets))
    }

    /// Build a fixture, letting the caller adjust the pipeline options first
    pub fn with_options(configure: impl FnOnce(&mut PipelineOptions)) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = tmp.path().join("app");
        std::fs::create_dir_all(&workdir).unwrap();

        let mut targets = HashMap::new();
        for name in ["storybook", "docs", "production"] {
            targets.insert(name.to_string(), target(&workdir, BUILD_COMMAND));
        }

        let mut options = PipelineOptions {
            dashboard_url: "https://deploy.blend.dev".to_string(),
            targets,
            ..PipelineOptions::default()
        };
        configure(&mut options);

        let layout = StorageLayout::new(tmp.path().join("state"));
        let store = Arc::new(StatusRecordingStore::new());
        let records = Records::new(store.clone());
        let runner = Arc::new(RecordingRunner::default());
        let service = Arc::new(DeploymentService::new(
            records.clone(),
            runner.clone(),
            &layout,
            options,
        ));

        Self {
            tmp,
            layout,
            store,
            records,
            runner,
            service,
        }
    }

    pub fn workdir(&self) -> PathBuf {
        self.tmp.path().join("app")
    }
}

/// Target settings building in `workdir` with the given command
pub fn target(workdir: &std::path::Path, build_command: &str) -> TargetSettings {
    TargetSettings {
        site: Some("blend-storybook".to_string()),
        project: Some("blend-prod".to_string()),
        working_dir: workdir.to_path_buf(),
        build_commands: vec![build_command.to_string()],
        output_dir: PathBuf::from("dist"),
        deploy_command: DEPLOY_COMMAND.to_string(),
    }
}
