//! Bearer token extraction

use std::sync::Arc;

use axum::extract::FromRequestParts;
use http::header::AUTHORIZATION;
use http::request::Parts;

use crate::authn::identity::Identity;
use crate::errors::DeployError;
use crate::server::error::ApiError;
use crate::server::state::ServerState;

/// The verified caller of a request. Extraction fails with 401 when the
/// `Authorization` header is missing, malformed or rejected by the verifier.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl FromRequestParts<Arc<ServerState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let identity = state.verifier.verify(token).await?;
        Ok(Caller(identity))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, DeployError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| DeployError::Unauthorized("Authorization header not found".to_string()))?
        .to_str()
        .map_err(|_| DeployError::Unauthorized("Authorization header empty".to_string()))?;

    let mut words = header.split_whitespace();
    match (words.next(), words.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(DeployError::Unauthorized(
            "Invalid Authorization header".to_string(),
        )),
    }
}
