use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::config::AgentConfig;
use crate::domains::lead::Lead;
use crate::training::TrainingData;
use crate::{ConciergeError, Result};

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    /// Keys directly under `prefix`, without the prefix itself.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// One JSON document per key. Writes go to a temporary sibling and are
/// renamed into place, so readers never observe a torn document.
pub struct FsStore {
    base: PathBuf,
}

impl FsStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Ok(self.base.clone());
        }
        if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(ConciergeError::BadRequest(format!("invalid store key: {key}")));
        }
        Ok(self.base.join(key))
    }
}

#[async_trait]
impl KeyValueStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConciergeError::Runtime(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConciergeError::Runtime(format!("mkdir {}: {e}", parent.display())))?;
        }
        let tmp = path.with_extension(format!(
            "tmp.{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos())
                .unwrap_or(0)
        ));
        std::fs::write(&tmp, &value)
            .map_err(|e| ConciergeError::Runtime(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| ConciergeError::Runtime(format!("rename {}: {e}", path.display())))?;
        debug!(key, bytes = value.len(), "store put");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ConciergeError::Runtime(format!(
                    "list {}: {e}",
                    dir.display()
                )))
            }
        };
        let mut keys = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ConciergeError::Runtime(format!("list {}: {e}", dir.display())))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(".tmp.") {
                continue;
            }
            keys.push(name);
        }
        keys.sort();
        Ok(keys)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter_map(|entry| {
                entry.key().strip_prefix(&prefix).map(|rest| {
                    // Listing a parent yields child names only, the way a
                    // directory read would.
                    match rest.split_once('/') {
                        Some((first, _)) => first.to_string(),
                        None => rest.to_string(),
                    }
                })
            })
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

pub struct AgentStore {
    inner: Arc<dyn KeyValueStore>,
}

impl AgentStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    fn config_key(agent_id: &str) -> String {
        format!("{agent_id}/config.json")
    }

    fn training_key(agent_id: &str) -> String {
        format!("{agent_id}/training.json")
    }

    fn lead_key(agent_id: &str, session_id: &str) -> String {
        format!("{agent_id}/leads/{session_id}.json")
    }

    pub async fn config_value(&self, agent_id: &str) -> Result<Option<Value>> {
        match self.inner.get(&Self::config_key(agent_id)).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ConciergeError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn config(&self, agent_id: &str) -> Result<AgentConfig> {
        let value = self
            .config_value(agent_id)
            .await?
            .ok_or_else(|| ConciergeError::AgentNotFound(agent_id.to_string()))?;
        AgentConfig::from_value(value)
    }

    pub async fn save_config_value(&self, agent_id: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| ConciergeError::Serialization(e.to_string()))?;
        self.inner.put(&Self::config_key(agent_id), bytes).await
    }

    pub async fn training(&self, agent_id: &str) -> Result<TrainingData> {
        match self.inner.get(&Self::training_key(agent_id)).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ConciergeError::Serialization(e.to_string())),
            None => Ok(TrainingData::default()),
        }
    }

    pub async fn save_training(&self, agent_id: &str, training: &TrainingData) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(training)
            .map_err(|e| ConciergeError::Serialization(e.to_string()))?;
        self.inner.put(&Self::training_key(agent_id), bytes).await
    }

    pub async fn lead(&self, agent_id: &str, session_id: &str) -> Result<Option<Lead>> {
        match self.inner.get(&Self::lead_key(agent_id, session_id)).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ConciergeError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn save_lead(&self, agent_id: &str, lead: &Lead) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(lead)
            .map_err(|e| ConciergeError::Serialization(e.to_string()))?;
        self.inner.put(&Self::lead_key(agent_id, &lead.id), bytes).await
    }

    pub async fn leads(&self, agent_id: &str) -> Result<Vec<Lead>> {
        let mut leads = Vec::new();
        for name in self.inner.list(&format!("{agent_id}/leads")).await? {
            let Some(session_id) = name.strip_suffix(".json") else {
                continue;
            };
            if let Some(lead) = self.lead(agent_id, session_id).await? {
                leads.push(lead);
            }
        }
        Ok(leads)
    }

    pub async fn list_agents(&self) -> Result<Vec<String>> {
        let mut agents = Vec::new();
        for name in self.inner.list("").await? {
            agents.push(name);
        }
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_round_trips_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store
            .put("vamos/leads/web-1.json", b"{}".to_vec())
            .await
            .unwrap();
        store
            .put("vamos/leads/web-2.json", b"{}".to_vec())
            .await
            .unwrap();
        assert_eq!(store.get("vamos/leads/web-1.json").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.get("vamos/leads/missing.json").await.unwrap(), None);
        assert_eq!(
            store.list("vamos/leads").await.unwrap(),
            vec!["web-1.json".to_string(), "web-2.json".to_string()]
        );
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store.get("../escape.json").await.unwrap_err();
        assert!(matches!(err, ConciergeError::BadRequest(_)));
    }

    #[tokio::test]
    async fn missing_config_is_agent_not_found() {
        let store = AgentStore::new(Arc::new(MemoryStore::new()));
        let err = store.config("ghost").await.unwrap_err();
        assert!(matches!(err, ConciergeError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn missing_training_defaults_to_empty() {
        let store = AgentStore::new(Arc::new(MemoryStore::new()));
        let training = store.training("vamos").await.unwrap();
        assert!(training.examples.is_empty());
        assert!(training.faq.is_empty());
    }
}
