//! Token Registry (C2) — the set of bearer tokens this node considers valid.
//!
//! Backed by a single JSON file (`api_keys.json` under the data root) holding
//! `{"api_keys": [...]}`. Every addition rewrites the whole file: fine at the
//! token counts a gossiped cluster like this actually sees, and it keeps the
//! on-disk format trivial to inspect.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Serialize, Deserialize, Default)]
struct ApiKeysFile {
    api_keys: Vec<String>,
}

pub struct TokenRegistry {
    path: PathBuf,
    tokens: RwLock<HashSet<String>>,
}

impl TokenRegistry {
    /// Load `api_keys.json` under `data_root`, creating an empty one if it
    /// doesn't exist yet.
    pub async fn recover(data_root: impl Into<PathBuf>) -> std::io::Result<Arc<Self>> {
        let data_root = data_root.into();
        fs::create_dir_all(&data_root).await?;
        let path = data_root.join("api_keys.json");

        let tokens = match fs::read(&path).await {
            Ok(bytes) => {
                let parsed: ApiKeysFile = serde_json::from_slice(&bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                parsed.api_keys.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = ApiKeysFile::default();
                let data = serde_json::to_vec_pretty(&empty)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                fs::write(&path, data).await?;
                HashSet::new()
            }
            Err(e) => return Err(e),
        };

        Ok(Arc::new(Self {
            path,
            tokens: RwLock::new(tokens),
        }))
    }

    /// Idempotently add `token`; rewrites the file only if the set actually
    /// changed.
    pub async fn add(&self, token: &str) -> std::io::Result<()> {
        {
            let tokens = self.tokens.read().await;
            if tokens.contains(token) {
                return Ok(());
            }
        }

        let mut tokens = self.tokens.write().await;
        if !tokens.insert(token.to_string()) {
            return Ok(());
        }
        self.persist(&tokens).await
    }

    pub async fn is_valid(&self, token: &str) -> bool {
        self.tokens.read().await.contains(token)
    }

    pub async fn list(&self) -> Vec<String> {
        self.tokens.read().await.iter().cloned().collect()
    }

    async fn persist(&self, tokens: &HashSet<String>) -> std::io::Result<()> {
        let mut api_keys: Vec<String> = tokens.iter().cloned().collect();
        api_keys.sort();
        let data = serde_json::to_vec_pretty(&ApiKeysFile { api_keys })
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("kvcluster-tokens-test-{}", uuid::Uuid::new_v4()));
        dir
    }

    #[tokio::test]
    async fn recover_creates_empty_file_when_missing() {
        let dir = tempdir();
        let registry = TokenRegistry::recover(dir.clone()).await.unwrap();
        assert!(!registry.is_valid("anything").await);
        assert!(dir.join("api_keys.json").exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn add_then_is_valid() {
        let dir = tempdir();
        let registry = TokenRegistry::recover(dir.clone()).await.unwrap();
        registry.add("tok-1").await.unwrap();
        assert!(registry.is_valid("tok-1").await);
        assert!(!registry.is_valid("tok-2").await);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let dir = tempdir();
        let registry = TokenRegistry::recover(dir.clone()).await.unwrap();
        registry.add("tok-1").await.unwrap();
        registry.add("tok-1").await.unwrap();
        assert!(registry.is_valid("tok-1").await);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn recover_after_restart_reloads_tokens() {
        let dir = tempdir();
        {
            let registry = TokenRegistry::recover(dir.clone()).await.unwrap();
            registry.add("tok-1").await.unwrap();
        }
        let registry2 = TokenRegistry::recover(dir.clone()).await.unwrap();
        assert!(registry2.is_valid("tok-1").await);
        std::fs::remove_dir_all(dir).ok();
    }
}
