//! SSH transport for remote sessions, built on `russh`.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{HashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use tracing::{debug, warn};

use super::remote::{ConnectTarget, RemoteConnector, RemoteError, RemoteOutput, RemoteSession};

/// Extended-data stream code for stderr.
const STDERR_STREAM: u32 = 1;

/// Host keys are accepted and logged by fingerprint; the inventory is the trust anchor.
struct HostKeyLogger {
    endpoint: String,
}

impl client::Handler for HostKeyLogger {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        debug!(
            endpoint = %self.endpoint,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "Accepting server host key"
        );
        Ok(true)
    }
}

/// Password-authenticated SSH sessions.
#[derive(Clone)]
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new() -> Self {
        Self {
            config: Arc::new(client::Config::default()),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, target: &ConnectTarget, password: &str) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let handler = HostKeyLogger {
            endpoint: target.endpoint(),
        };
        let mut handle = client::connect(self.config.clone(), (target.address.as_str(), target.port), handler)
            .await
            .map_err(|error| RemoteError::connection(error.to_string()))?;

        let auth = handle
            .authenticate_password(target.login.as_str(), password)
            .await
            .map_err(|error| RemoteError::connection(error.to_string()))?;
        if !auth.success() {
            if let Err(error) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
                debug!(error = %error, "Disconnect after rejected authentication failed");
            }
            return Err(RemoteError::Authentication);
        }

        Ok(Box::new(SshSession {
            handle,
            endpoint: target.endpoint(),
        }))
    }
}

struct SshSession {
    handle: Handle<HostKeyLogger>,
    endpoint: String,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<RemoteOutput, RemoteError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|error| RemoteError::channel(error.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|error| RemoteError::channel(error.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;
        while let Some(message) = channel.wait().await {
            match message {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == STDERR_STREAM => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }

        Ok(RemoteOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    async fn close(self: Box<Self>) {
        if let Err(error) = self.handle.disconnect(Disconnect::ByApplication, "", "en").await {
            warn!(endpoint = %self.endpoint, error = %error, "Failed to close SSH session cleanly");
        }
    }
}
