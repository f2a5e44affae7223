use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

/// Where boundary datasets are read from: a local directory or a remote
/// content-addressed base URL such as a CDN.
#[derive(Clone)]
enum Backend {
    Local(PathBuf),
    Remote {
        client: reqwest::Client,
        base_url: String,
    },
}

#[derive(Clone)]
pub struct DataStore {
    backend: Backend,
    cache: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

#[derive(Debug)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for region_nav::NavError {
    fn from(e: StoreError) -> Self {
        region_nav::NavError::SourceUnavailable(e.0)
    }
}

impl DataStore {
    pub fn from_env(timeout: Duration) -> Self {
        match std::env::var("DATA_BASE_URL") {
            Ok(base_url) if !base_url.is_empty() => {
                let client = reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new());
                tracing::info!("Reading datasets from {base_url}");
                Self::remote(client, base_url)
            }
            _ => {
                let root = std::env::var("DATA_ROOT").unwrap_or_else(|_| "data".to_string());
                tracing::info!("Reading datasets from {root}");
                Self::local(root)
            }
        }
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Local(root.into()),
            cache: Arc::default(),
        }
    }

    pub fn remote(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            backend: Backend::Remote {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            },
            cache: Arc::default(),
        }
    }

    /// Fetch a dataset. Every call reaches the backend.
    pub async fn get_object(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let rel = sanitize(path)?;
        match &self.backend {
            Backend::Local(root) => {
                let full = root.join(&rel);
                tokio::fs::read(&full)
                    .await
                    .map_err(|e| StoreError(format!("{}: {e}", full.display())))
            }
            Backend::Remote { client, base_url } => {
                let url = format!("{base_url}/{rel}");
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| StoreError(format!("{url}: {e}")))?;
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| StoreError(format!("{url}: {e}")))?;
                Ok(bytes.to_vec())
            }
        }
    }

    /// Fetch a dataset at most once; later calls are served from memory.
    pub async fn get_cached(&self, path: &str) -> Result<Arc<Vec<u8>>, StoreError> {
        if let Some(hit) = self.cache.read().await.get(path) {
            return Ok(hit.clone());
        }
        let data = Arc::new(self.get_object(path).await?);
        self.cache
            .write()
            .await
            .insert(path.to_string(), data.clone());
        Ok(data)
    }
}

/// Relative path with `/` separators, rejecting anything that could leave
/// the data root.
fn sanitize(path: &str) -> Result<String, StoreError> {
    let trimmed = path.trim_start_matches('/');
    let ok = !trimmed.is_empty()
        && Path::new(trimmed)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(trimmed.to_string())
    } else {
        Err(StoreError(format!("invalid dataset path {path:?}")))
    }
}
