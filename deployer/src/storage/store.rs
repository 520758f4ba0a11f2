//! Hierarchical key-value record store
//!
//! Records live in a single JSON tree addressed by slash-separated paths
//! (`deployments/history/{id}`), mirroring a realtime-database layout.
//! Every write is a last-writer-wins replacement or shallow merge of one
//! subtree; there are no multi-key transactions.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// Record store operations
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the subtree at `path`
    async fn get(&self, path: &str) -> Result<Option<Value>, DeployError>;

    /// Replace the subtree at `path`. Writing `null` removes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), DeployError>;

    /// Shallow-merge `fields` into the object at `path`. `null` fields are removed.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), DeployError>;

    /// Push `value` onto the ordered sequence at `path`
    async fn append(&self, path: &str, value: Value) -> Result<(), DeployError>;

    /// Delete the subtree at `path`
    async fn remove(&self, path: &str) -> Result<(), DeployError>;

    /// Direct children of the object at `path`, ordered by key
    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, DeployError>;
}

/// Split and validate a store path
pub fn segments(path: &str) -> Result<Vec<&str>, DeployError> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return Err(DeployError::StoreError("Empty store path".to_string()));
    }
    if let Some(bad) = parts
        .iter()
        .find(|s| s.contains(['.', '#', '$', '[', ']']))
    {
        return Err(DeployError::StoreError(format!(
            "Invalid path segment '{}' in {}",
            bad, path
        )));
    }
    Ok(parts)
}

/// Pure operations on an in-memory JSON tree
pub mod tree {
    use super::*;

    pub fn get<'a>(root: &'a Value, parts: &[&str]) -> Option<&'a Value> {
        parts
            .iter()
            .try_fold(root, |node, key| node.as_object()?.get(*key))
            .filter(|v| !v.is_null())
    }

    fn entry<'a>(root: &'a mut Value, parts: &[&str]) -> &'a mut Value {
        parts.iter().fold(root, |node, key| {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
                _ => unreachable!("node was just replaced by an object"),
            }
        })
    }

    pub fn set(root: &mut Value, parts: &[&str], value: Value) {
        if value.is_null() {
            remove(root, parts);
        } else {
            *entry(root, parts) = value;
        }
    }

    pub fn update(root: &mut Value, parts: &[&str], fields: Map<String, Value>) {
        let node = entry(root, parts);
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            for (key, value) in fields {
                if value.is_null() {
                    map.remove(&key);
                } else {
                    map.insert(key, value);
                }
            }
        }
    }

    pub fn append(root: &mut Value, parts: &[&str], value: Value) -> Result<(), DeployError> {
        let node = entry(root, parts);
        match node {
            Value::Null => {
                *node = Value::Array(vec![value]);
                Ok(())
            }
            Value::Array(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(DeployError::StoreError(format!(
                "Cannot append to non-sequence at {}",
                parts.join("/")
            ))),
        }
    }

    pub fn remove(root: &mut Value, parts: &[&str]) {
        let Some((last, parent_parts)) = parts.split_last() else {
            return;
        };
        let parent = parent_parts
            .iter()
            .try_fold(root, |node, key| node.as_object_mut()?.get_mut(*key));
        if let Some(Value::Object(map)) = parent {
            map.remove(*last);
        }
    }

    pub fn list(root: &Value, parts: &[&str]) -> Vec<(String, Value)> {
        match get(root, parts) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: RwLock<Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }

}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, DeployError> {
        let parts = segments(path)?;
        let root = self.root.read().await;
        Ok(tree::get(&root, &parts).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), DeployError> {
        let parts = segments(path)?;
        tree::set(&mut *self.root.write().await, &parts, value);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), DeployError> {
        let parts = segments(path)?;
        tree::update(&mut *self.root.write().await, &parts, fields);
        Ok(())
    }

    async fn append(&self, path: &str, value: Value) -> Result<(), DeployError> {
        let parts = segments(path)?;
        tree::append(&mut *self.root.write().await, &parts, value)
    }

    async fn remove(&self, path: &str) -> Result<(), DeployError> {
        let parts = segments(path)?;
        tree::remove(&mut *self.root.write().await, &parts);
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, DeployError> {
        let parts = segments(path)?;
        let root = self.root.read().await;
        Ok(tree::list(&root, &parts))
    }
}

/// Store persisted as one JSON document, rewritten atomically after every mutation
#[derive(Debug)]
pub struct FileStore {
    file: File,
    root: RwLock<Value>,
}

impl FileStore {
    /// Open the store file, starting from an empty tree if it does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let file = File::new(path.as_ref());
        let root = if file.exists().await {
            file.read_json().await?
        } else {
            Value::Object(Map::new())
        };
        debug!("Opened record store at {}", file.path().display());

        Ok(Self {
            file,
            root: RwLock::new(root),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    async fn mutate<F>(&self, op: F) -> Result<(), DeployError>
    where
        F: FnOnce(&mut Value) -> Result<(), DeployError> + Send,
    {
        let mut root = self.root.write().await;
        // Only a tree that reached disk becomes visible to readers
        let mut next = root.clone();
        op(&mut next)?;
        let contents = serde_json::to_vec_pretty(&next)?;
        self.file.write_atomic(&contents).await?;
        *root = next;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, DeployError> {
        let parts = segments(path)?;
        let root = self.root.read().await;
        Ok(tree::get(&root, &parts).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), DeployError> {
        let parts = segments(path)?;
        self.mutate(|root| {
            tree::set(root, &parts, value);
            Ok(())
        })
        .await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), DeployError> {
        let parts = segments(path)?;
        self.mutate(|root| {
            tree::update(root, &parts, fields);
            Ok(())
        })
        .await
    }

    async fn append(&self, path: &str, value: Value) -> Result<(), DeployError> {
        let parts = segments(path)?;
        self.mutate(|root| tree::append(root, &parts, value)).await
    }

    async fn remove(&self, path: &str) -> Result<(), DeployError> {
        let parts = segments(path)?;
        self.mutate(|root| {
            tree::remove(root, &parts);
            Ok(())
        })
        .await
    }

    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, DeployError> {
        let parts = segments(path)?;
        let root = self.root.read().await;
        Ok(tree::list(&root, &parts))
    }
}
