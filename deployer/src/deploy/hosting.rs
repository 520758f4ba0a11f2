//! Deploy step: stage artifacts and hand them to the hosting CLI

use std::sync::Arc;

use crate::deploy::builder::{describe_exit, pipeline_env};
use crate::deploy::command::{CommandRunner, CommandSpec};
use crate::deploy::stage_log::StageLog;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::deployment::Deployment;
use crate::storage::settings::TargetSettings;
use crate::utils::render_template;

pub struct HostingDeployer {
    runner: Arc<dyn CommandRunner>,
    deploy_dir: Dir,
}

impl HostingDeployer {
    pub fn new(runner: Arc<dyn CommandRunner>, deploy_dir: Dir) -> Self {
        Self { runner, deploy_dir }
    }

    /// Staging directory for a target
    pub fn staging_dir(&self, target: &str) -> Dir {
        self.deploy_dir.subdir(target)
    }

    /// Copy `artifact` into the target's staging directory and run the
    /// hosting command there, capturing its output into the deploy log.
    pub async fn deploy(
        &self,
        deployment: &Deployment,
        target: &TargetSettings,
        artifact: &Dir,
        log: &StageLog,
    ) -> Result<(), DeployError> {
        let staging = self.staging_dir(&deployment.target);
        let files = staging.replace_with(artifact).await.map_err(|e| {
            DeployError::HostingError(format!(
                "Failed to stage {}: {}",
                artifact.path().display(),
                e
            ))
        })?;
        log.line(format!(
            "Staged {} files in {}",
            files,
            staging.path().display()
        ))
        .await;

        let dir = staging.path().display().to_string();
        let site = target.site.as_deref().unwrap_or(&deployment.target);
        let project = target.project.as_deref().unwrap_or_default();
        let command = render_template(
            &target.deploy_command,
            &[
                ("target", deployment.target.as_str()),
                ("site", site),
                ("project", project),
                ("dir", dir.as_str()),
            ],
        );
        log.line(format!("$ {}", command)).await;

        let mut spec = CommandSpec::new(command.as_str(), staging.path());
        spec.envs = pipeline_env(deployment);
        let output = self.runner.run(&spec).await?;
        log.lines(output.log_lines()).await;

        if !output.success() {
            return Err(DeployError::HostingError(format!(
                "Hosting command exited with {}",
                describe_exit(output.exit_code)
            )));
        }

        log.line(format!("Deployed {} to {}", deployment.target, site))
            .await;
        Ok(())
    }
}
