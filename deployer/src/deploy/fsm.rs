//! Finite state machine for deployment status

use crate::errors::DeployError;
use crate::models::deployment::DeploymentStatus;

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Gate the deployment behind a human approval
    RequestApproval,

    /// Approval granted
    Approve,

    /// Approval refused
    Reject,

    /// Build step begins
    StartBuild,

    /// Deploy step begins
    StartDeploy,

    /// Hosting accepted the artifacts
    Succeed,

    /// Any stage failed
    Fail(String),

    /// A later rollback superseded this deployment
    RollBack,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM for a freshly requested deployment
    pub fn new() -> Self {
        Self::resume(DeploymentStatus::InProgress)
    }

    /// Create an FSM positioned at a persisted status
    pub fn resume(state: DeploymentStatus) -> Self {
        Self { state, error: None }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, DeployError> {
        use DeploymentStatus::*;

        let new_state = match (self.state, &event) {
            (InProgress, DeploymentEvent::RequestApproval) => PendingApproval,

            (PendingApproval, DeploymentEvent::Approve) => Approved,
            (PendingApproval, DeploymentEvent::Reject) => Cancelled,

            (InProgress | Approved, DeploymentEvent::StartBuild) => Building,
            (Building, DeploymentEvent::StartDeploy) => Deploying,
            (Deploying, DeploymentEvent::Succeed) => Success,

            (
                InProgress | PendingApproval | Approved | Building | Deploying,
                DeploymentEvent::Fail(err),
            ) => {
                self.error = Some(err.clone());
                Failed
            }

            (Success, DeploymentEvent::RollBack) => RolledBack,

            (state, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
