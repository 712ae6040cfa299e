use async_trait::async_trait;
use thiserror::Error;

/// Where to connect and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub address: String,
    pub port: u16,
    pub login: String,
}

impl ConnectTarget {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the server closed the channel without reporting a status.
    pub exit_status: Option<u32>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport-level failure; the pipeline may retry these.
    #[error("{reason}")]
    Connection { reason: String },

    #[error("authentication rejected")]
    Authentication,

    #[error("{reason}")]
    Channel { reason: String },
}

impl RemoteError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection { reason: reason.into() }
    }

    pub fn channel(reason: impl Into<String>) -> Self {
        Self::Channel { reason: reason.into() }
    }
}

/// Opens authenticated sessions against remote hosts.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, target: &ConnectTarget, password: &str) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// One authenticated session. Callers must `close` it on every path.
#[async_trait]
pub trait RemoteSession: Send {
    async fn run(&mut self, command: &str) -> Result<RemoteOutput, RemoteError>;

    async fn close(self: Box<Self>);
}
