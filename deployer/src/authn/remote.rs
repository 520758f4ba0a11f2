//! Identity lookup against an identity provider's user-info endpoint

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};

use crate::authn::identity::{Identity, IdentityVerifier, Role};
use crate::errors::DeployError;

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(alias = "uid", alias = "id")]
    sub: String,

    #[serde(default)]
    email: Option<String>,

    #[serde(default)]
    role: Option<String>,
}

/// Forwards the caller's bearer token to the provider and trusts its answer
pub struct RemoteVerifier {
    client: Client,
    userinfo_url: String,
}

impl RemoteVerifier {
    pub fn new(userinfo_url: &str) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            userinfo_url: userinfo_url.to_string(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for RemoteVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, DeployError> {
        debug!("GET {}", self.userinfo_url);
        let response = self
            .client
            .get(&self.userinfo_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DeployError::Unauthorized(
                "Identity provider rejected the token".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("User-info lookup failed: {} - {}", status, body);
            return Err(DeployError::ServerError(format!(
                "Identity provider returned {}",
                status
            )));
        }

        let info: UserInfo = response.json().await?;
        Ok(Identity {
            role: Role::parse(info.role.as_deref()),
            user_id: info.sub,
            email: info.email,
        })
    }
}
