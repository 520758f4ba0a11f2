//! Registry of background pipelines

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::errors::DeployError;

/// Keeps the join handles of spawned pipelines so shutdown can wait for them
#[derive(Default)]
pub struct PipelineTracker {
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PipelineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a pipeline for a deployment; the caller does not wait for it
    pub fn spawn<F>(&self, deployment_id: &str, pipeline: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(pipeline);
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|_, h| !h.is_finished());
        handles.insert(deployment_id.to_string(), handle);
        debug!("Pipeline for {} spawned ({} in flight)", deployment_id, handles.len());
    }

    /// Number of pipelines that have not finished yet
    pub fn in_flight(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.values().filter(|h| !h.is_finished()).count()
    }

    /// Wait for the pipeline of one deployment, if one was spawned
    pub async fn wait(&self, deployment_id: &str) -> Result<(), DeployError> {
        let handle = {
            let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.remove(deployment_id)
        };
        match handle {
            Some(handle) => Ok(handle.await?),
            None => Ok(()),
        }
    }

    /// Wait for every pipeline spawned so far
    pub async fn drain(&self) -> Result<(), DeployError> {
        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.drain().collect()
        };

        let mut result = Ok(());
        for (id, handle) in handles {
            if let Err(e) = handle.await {
                error!("Pipeline for {} panicked: {}", id, e);
                result = Err(DeployError::from(e));
            }
        }
        result
    }
}
