use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the privileged role that bypasses command whitelisting.
pub const ADMIN_ROLE: &str = "admin";

/// Opaque numeric identity of whoever issued an inbound event (for example a chat user id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub i64);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a chat conversation. Each conversation owns at most one selection flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary key of a server in the inventory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub i64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved principal. Built per event from the role source and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: String,
}

impl Principal {
    pub fn new(id: PrincipalId, role: impl Into<String>) -> Self {
        Self { id, role: role.into() }
    }

    /// Whether this principal holds the privileged role.
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// A registered server as stored by the inventory.
///
/// The credential is kept sealed; only the execution pipeline unseals it, and only for
/// the duration of a single remote session.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerRecord {
    pub id: ServerId,
    pub name: String,
    /// Host name or IP address.
    #[serde(alias = "ip")]
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub login: String,
    /// Sealed credential as produced by the credential cipher.
    #[serde(alias = "password")]
    pub encrypted_credential: String,
}

impl ServerRecord {
    /// Lightweight view used by selection listings.
    pub fn summary(&self) -> ServerSummary {
        ServerSummary {
            id: self.id,
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }
}

// Never print the sealed credential, even in debug output.
impl fmt::Debug for ServerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("encrypted_credential", &"<redacted>")
            .finish()
    }
}

fn default_ssh_port() -> u16 {
    22
}

/// Server listing entry shown while the operator picks a target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSummary {
    pub id: ServerId,
    pub name: String,
    pub address: String,
}

impl fmt::Display for ServerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}
