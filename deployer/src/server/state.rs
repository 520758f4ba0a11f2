//! Server state

use std::sync::Arc;

use crate::authn::identity::IdentityVerifier;
use crate::services::deployment::DeploymentService;

/// Server state shared across handlers
pub struct ServerState {
    pub service: Arc<DeploymentService>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl ServerState {
    pub fn new(service: Arc<DeploymentService>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { service, verifier }
    }
}
