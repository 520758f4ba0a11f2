//! Per-stage log writer for a deployment record

use tracing::{info, warn};

use crate::models::deployment::LogStage;
use crate::storage::records::Records;

/// Appends lines to one log sequence of one deployment.
///
/// A failed append is traced and dropped; logging never fails a pipeline.
#[derive(Clone)]
pub struct StageLog {
    records: Records,
    deployment_id: String,
    stage: LogStage,
}

impl StageLog {
    pub fn new(records: Records, deployment_id: impl Into<String>, stage: LogStage) -> Self {
        Self {
            records,
            deployment_id: deployment_id.into(),
            stage,
        }
    }

    pub async fn line(&self, line: impl Into<String>) {
        let line = line.into();
        info!(
            deployment = %self.deployment_id,
            stage = self.stage.key(),
            "{}",
            line
        );
        if let Err(e) = self
            .records
            .append_log(&self.deployment_id, self.stage, line)
            .await
        {
            warn!(
                "Failed to append {} log for {}: {}",
                self.stage.key(),
                self.deployment_id,
                e
            );
        }
    }

    pub async fn lines(&self, lines: Vec<String>) {
        for line in lines {
            self.line(line).await;
        }
    }
}
