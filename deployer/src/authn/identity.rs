//! Caller identity and bearer token verification

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DeployError;

/// Role attached to an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Deployer,
    Viewer,
}

impl Role {
    /// Unknown or missing roles get read-only access
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") => Role::Admin,
            Some("deployer") => Role::Deployer,
            _ => Role::Viewer,
        }
    }

    pub fn can_deploy(&self) -> bool {
        matches!(self, Role::Admin | Role::Deployer)
    }

    pub fn can_approve(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Role,
}

impl Identity {
    /// Fail with `Forbidden` unless the caller may start deployments
    pub fn require_deployer(&self) -> Result<(), DeployError> {
        if self.role.can_deploy() {
            Ok(())
        } else {
            Err(DeployError::Forbidden(format!(
                "{} may not start deployments",
                self.user_id
            )))
        }
    }

    /// Fail with `Forbidden` unless the caller may decide approvals
    pub fn require_admin(&self) -> Result<(), DeployError> {
        if self.role.can_approve() {
            Ok(())
        } else {
            Err(DeployError::Forbidden(format!(
                "{} may not approve deployments",
                self.user_id
            )))
        }
    }
}

/// Turns a bearer token into an identity
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, DeployError>;
}

/// Claims carried by tokens the JWT verifier accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (user ID)
    pub sub: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    /// Expiration timestamp
    pub exp: i64,

    #[serde(default)]
    pub iss: Option<String>,

    /// A single audience or a list of them
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

/// Verifies HS256 tokens signed with a shared secret
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &SecretString, issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        match audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, DeployError> {
        let data = decode::<IdentityClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            DeployError::Unauthorized(format!("Invalid token: {}", e))
        })?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(DeployError::Unauthorized(
                "Token has no subject".to_string(),
            ));
        }

        Ok(Identity {
            role: Role::parse(claims.role.as_deref()),
            user_id: claims.sub,
            email: claims.email,
        })
    }
}
