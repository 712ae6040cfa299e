//! Server inventory capability.
//!
//! The engine only reads the inventory. Adding and removing servers is owned by
//! whichever tool manages the backing store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use shellgate_types::{ServerId, ServerRecord, ServerSummary};
use thiserror::Error;
use tracing::debug;

#[async_trait]
pub trait ServerInventory: Send + Sync {
    /// Fetch a single server. `Ok(None)` when the id is unknown.
    async fn get_server(&self, id: ServerId) -> Result<Option<ServerRecord>, InventoryError>;

    /// All servers in display order.
    async fn list_servers(&self) -> Result<Vec<ServerSummary>, InventoryError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("server inventory unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("server inventory is malformed: {reason}")]
    Malformed { reason: String },
}

#[derive(Deserialize)]
struct InventoryFile {
    #[serde(default)]
    servers: Vec<ServerRecord>,
}

/// Read-only inventory backed by a JSON document: `{"servers": [ ... ]}`.
///
/// The file is re-read on each call. A missing file is an empty inventory.
#[derive(Debug, Clone)]
pub struct JsonInventory {
    path: PathBuf,
}

impl JsonInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<ServerRecord>, InventoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Inventory file not found; treating as empty");
                return Ok(Vec::new());
            }
            Err(error) => {
                return Err(InventoryError::Unavailable {
                    path: self.path.display().to_string(),
                    reason: error.to_string(),
                });
            }
        };
        let file: InventoryFile =
            serde_json::from_str(&content).map_err(|error| InventoryError::Malformed { reason: error.to_string() })?;
        Ok(file.servers)
    }
}

#[async_trait]
impl ServerInventory for JsonInventory {
    async fn get_server(&self, id: ServerId) -> Result<Option<ServerRecord>, InventoryError> {
        Ok(self.read_all().await?.into_iter().find(|server| server.id == id))
    }

    async fn list_servers(&self) -> Result<Vec<ServerSummary>, InventoryError> {
        Ok(self.read_all().await?.iter().map(ServerRecord::summary).collect())
    }
}
