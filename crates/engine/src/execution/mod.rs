//! Remote execution pipeline.
//!
//! One run looks the server up, unseals its credential, opens a fresh remote session,
//! runs the command under a timeout and always closes the session before shaping the
//! captured output into transport-sized chunks. Every failure becomes a single
//! descriptive chunk; nothing here is fatal to the caller.

mod output;
mod remote;
pub mod ssh;

use std::sync::Arc;
use std::time::Duration;

use shellgate_types::ServerId;
use shellgate_util::{CredentialCipher, DecryptionError, GateSettings, redact_sensitive};
use thiserror::Error;
use tracing::{debug, warn};

use crate::inventory::{InventoryError, ServerInventory};

pub use output::{NO_OUTPUT_MESSAGE, chunk_output, compose_output};
pub use remote::{ConnectTarget, RemoteConnector, RemoteError, RemoteOutput, RemoteSession};
pub use ssh::SshConnector;

/// Base delay between connection attempts; attempt `n` waits `n` times this.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("server not found")]
    ServerNotFound,

    #[error("Failed to load server: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Failed to decrypt server credential: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("Invalid timeout value.")]
    InvalidTimeout,

    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Authentication failed for {login}@{address}")]
    Authentication { login: String, address: String },

    #[error("Command timed out after {seconds} seconds.")]
    Timeout { seconds: u64 },

    #[error("Failed to execute command: {reason}")]
    Execution { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed { exit_status: Option<u32> },
    Failed { error: ExecutionError },
}

impl ExecutionOutcome {
    /// Short label for audit records.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed { exit_status: Some(0) | None } => "completed",
            ExecutionOutcome::Completed { .. } => "nonzero_exit",
            ExecutionOutcome::Failed { .. } => "failed",
        }
    }
}

/// What a run produced: the chunks to send and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub chunks: Vec<String>,
    pub outcome: ExecutionOutcome,
}

impl ExecutionReport {
    fn failed(error: ExecutionError) -> Self {
        Self {
            chunks: vec![error.to_string()],
            outcome: ExecutionOutcome::Failed { error },
        }
    }

    pub fn into_chunks(self) -> Vec<String> {
        self.chunks
    }
}

pub struct ExecutionPipeline {
    inventory: Arc<dyn ServerInventory>,
    cipher: Arc<dyn CredentialCipher>,
    connector: Arc<dyn RemoteConnector>,
    settings: Arc<GateSettings>,
    retry_backoff: Duration,
}

impl ExecutionPipeline {
    pub fn new(
        inventory: Arc<dyn ServerInventory>,
        cipher: Arc<dyn CredentialCipher>,
        connector: Arc<dyn RemoteConnector>,
        settings: Arc<GateSettings>,
    ) -> Self {
        Self {
            inventory,
            cipher,
            connector,
            settings,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Run `command` on the server and return the chunks to send back.
    pub async fn run(&self, server_id: ServerId, command: &str) -> Vec<String> {
        self.execute(server_id, command).await.into_chunks()
    }

    /// Like [`run`](Self::run), but keeps the outcome alongside the chunks.
    pub async fn execute(&self, server_id: ServerId, command: &str) -> ExecutionReport {
        match self.try_execute(server_id, command).await {
            Ok(output) => {
                let body = compose_output(&output);
                ExecutionReport {
                    chunks: chunk_output(&body, self.settings.output_chunk_size),
                    outcome: ExecutionOutcome::Completed {
                        exit_status: output.exit_status,
                    },
                }
            }
            Err(error) => {
                warn!(server = %server_id, error = %error, "Remote execution failed");
                ExecutionReport::failed(error)
            }
        }
    }

    async fn try_execute(&self, server_id: ServerId, command: &str) -> Result<RemoteOutput, ExecutionError> {
        let server = self
            .inventory
            .get_server(server_id)
            .await?
            .ok_or(ExecutionError::ServerNotFound)?;
        let password = self.cipher.decrypt(&server.encrypted_credential)?;
        let timeout = self.settings.command_timeout().map_err(|error| {
            warn!(error = %error, "Rejecting run with invalid command timeout");
            ExecutionError::InvalidTimeout
        })?;

        let target = ConnectTarget {
            address: server.address.clone(),
            port: server.port,
            login: server.login.clone(),
        };
        let mut session = self.connect_with_retry(&target, &password).await?;
        debug!(
            server = %server_id,
            endpoint = %target.endpoint(),
            command = %redact_sensitive(command),
            "Running remote command"
        );

        let result = tokio::time::timeout(timeout, session.run(command)).await;
        session.close().await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => Err(ExecutionError::Execution {
                reason: error.to_string(),
            }),
            Err(_) => Err(ExecutionError::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn connect_with_retry(
        &self,
        target: &ConnectTarget,
        password: &str,
    ) -> Result<Box<dyn RemoteSession>, ExecutionError> {
        let attempts = self.settings.connect_attempts.max(1);
        let connect_timeout = self.settings.connect_timeout;
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(connect_timeout, self.connector.connect(target, password)).await {
                Ok(Ok(session)) => return Ok(session),
                Ok(Err(RemoteError::Authentication)) => {
                    return Err(ExecutionError::Authentication {
                        login: target.login.clone(),
                        address: target.address.clone(),
                    });
                }
                Ok(Err(error)) => last_reason = error.to_string(),
                Err(_) => last_reason = format!("connection timed out after {}s", connect_timeout.as_secs()),
            }
            warn!(
                endpoint = %target.endpoint(),
                attempt,
                attempts,
                reason = %last_reason,
                "Connection attempt failed"
            );
            if attempt < attempts {
                tokio::time::sleep(self.retry_backoff * attempt).await;
            }
        }

        Err(ExecutionError::Connection {
            endpoint: target.endpoint(),
            reason: last_reason,
        })
    }
}
