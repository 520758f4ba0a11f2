//! Firebase Realtime Database REST backend for the record store

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tracing::{debug, error};
use url::Url;

use crate::errors::DeployError;
use crate::storage::store::{segments, Store};

/// Store backed by the Firebase Realtime Database REST API
pub struct FirebaseStore {
    client: Client,
    base_url: Url,
    auth_token: Option<SecretString>,
}

impl FirebaseStore {
    /// Create a new client for the database at `base_url`
    pub fn new(base_url: &str, auth_token: Option<SecretString>) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let mut base_url = Url::parse(base_url)
            .map_err(|e| DeployError::ConfigError(format!("Invalid Firebase URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    /// REST URL of a store path
    pub fn url_for(&self, path: &str) -> Result<Url, DeployError> {
        let relative = format!("{}.json", segments(path)?.join("/"));
        let mut url = self
            .base_url
            .join(&relative)
            .map_err(|e| DeployError::StoreError(format!("Invalid path {}: {}", path, e)))?;
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut()
                .append_pair("auth", token.expose_secret());
        }
        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, DeployError> {
        let url = self.url_for(path)?;
        debug!("{} {}", method, path);
        Ok(self.client.request(method, url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, DeployError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Firebase request failed: {} - {}", status, body);
            return Err(DeployError::StoreError(format!("{}: {}", status, body)));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Store for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, DeployError> {
        let value = self.send(self.request(Method::GET, path)?).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), DeployError> {
        if value.is_null() {
            return self.remove(path).await;
        }
        self.send(self.request(Method::PUT, path)?.json(&value))
            .await?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), DeployError> {
        self.send(self.request(Method::PATCH, path)?.json(&fields))
            .await?;
        Ok(())
    }

    async fn append(&self, path: &str, value: Value) -> Result<(), DeployError> {
        // Read-modify-write; the record has a single writer per pipeline.
        let items = match self.get(path).await? {
            None => vec![value],
            Some(Value::Array(mut items)) => {
                items.push(value);
                items
            }
            Some(_) => {
                return Err(DeployError::StoreError(format!(
                    "Cannot append to non-sequence at {}",
                    path
                )))
            }
        };
        self.set(path, Value::Array(items)).await
    }

    async fn remove(&self, path: &str) -> Result<(), DeployError> {
        self.send(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, DeployError> {
        match self.get(path).await? {
            Some(Value::Object(map)) => Ok(map.into_iter().collect()),
            _ => Ok(Vec::new()),
        }
    }
}
