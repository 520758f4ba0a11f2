//! Build executor: runs a target's build commands and packages the output

use std::sync::Arc;

use crate::cache::build::cache_key;
use crate::deploy::command::{CommandRunner, CommandSpec};
use crate::deploy::stage_log::StageLog;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::deployment::Deployment;
use crate::storage::settings::TargetSettings;

/// Environment passed to every build and deploy command
pub fn pipeline_env(deployment: &Deployment) -> Vec<(String, String)> {
    vec![
        ("COMMIT_SHA".to_string(), deployment.commit_sha.clone()),
        ("BRANCH".to_string(), deployment.branch.clone()),
        ("DEPLOY_TARGET".to_string(), deployment.target.clone()),
        ("DEPLOYMENT_ID".to_string(), deployment.id.clone()),
    ]
}

pub struct BuildExecutor {
    runner: Arc<dyn CommandRunner>,
    cache_dir: Dir,
    builds_dir: Dir,
}

impl BuildExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, cache_dir: Dir, builds_dir: Dir) -> Self {
        Self {
            runner,
            cache_dir,
            builds_dir,
        }
    }

    /// Where the packaged artifact of a build goes. Cacheable builds are
    /// stored by cache key so a later build of the same commit overwrites
    /// the same directory.
    pub fn artifact_dir(&self, deployment: &Deployment, cacheable: bool) -> Dir {
        if cacheable {
            self.cache_dir
                .subdir(&cache_key(&deployment.commit_sha, &deployment.target))
        } else {
            self.builds_dir.subdir(&deployment.id)
        }
    }

    /// Run every build command in order and package the output directory.
    pub async fn build(
        &self,
        deployment: &Deployment,
        target: &TargetSettings,
        cacheable: bool,
        log: &StageLog,
    ) -> Result<Dir, DeployError> {
        log.line(format!(
            "Building {} at {}",
            deployment.target,
            if deployment.commit_sha.is_empty() {
                "working tree"
            } else {
                deployment.commit_sha.as_str()
            }
        ))
        .await;

        let env = pipeline_env(deployment);
        for command in &target.build_commands {
            log.line(format!("$ {}", command)).await;

            let mut spec = CommandSpec::new(command.as_str(), &target.working_dir);
            spec.envs = env.clone();
            let output = self.runner.run(&spec).await?;
            log.lines(output.log_lines()).await;

            if !output.success() {
                return Err(DeployError::BuildError(format!(
                    "`{}` exited with {}",
                    command,
                    describe_exit(output.exit_code)
                )));
            }
        }

        let output_dir = Dir::new(target.working_dir.join(&target.output_dir));
        let artifact = self.artifact_dir(deployment, cacheable);
        let files = artifact.replace_with(&output_dir).await.map_err(|e| {
            DeployError::BuildError(format!(
                "Failed to package {}: {}",
                output_dir.path().display(),
                e
            ))
        })?;

        log.line(format!(
            "Packaged {} files into {}",
            files,
            artifact.path().display()
        ))
        .await;
        Ok(artifact)
    }
}

pub(crate) fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}
