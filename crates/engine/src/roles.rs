//! Role resolution and command permissions.
//!
//! Roles live in a JSON document shaped like
//! `{"admin": {"users": [1], "commands": []}, "viewer": {"users": [2], "commands": ["uptime"]}}`.
//! The document is re-read on every call so edits take effect without a restart.

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use shellgate_types::{ADMIN_ROLE, Principal, PrincipalId};
use thiserror::Error;
use tracing::debug;

/// A single role: who holds it and which literal command texts it may issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDefinition {
    pub name: String,
    pub members: IndexSet<PrincipalId>,
    pub allowed_commands: IndexSet<String>,
}

#[derive(Deserialize)]
struct RawRole {
    #[serde(default, alias = "members")]
    users: IndexSet<PrincipalId>,
    #[serde(default, alias = "allowed_commands")]
    commands: IndexSet<String>,
}

/// Decide whether `role` may issue `command`.
///
/// The privileged role is always allowed. Any other role needs the literal command text in
/// its allowed set; a missing definition denies.
pub fn role_permits(role: &str, definition: Option<&RoleDefinition>, command: &str) -> bool {
    if role == ADMIN_ROLE {
        return true;
    }
    definition.is_some_and(|definition| definition.allowed_commands.contains(command))
}

/// Parsed role document, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleBook {
    roles: IndexMap<String, RoleDefinition>,
}

impl RoleBook {
    pub fn parse(content: &str) -> Result<Self, RoleStoreError> {
        let raw: IndexMap<String, RawRole> =
            serde_json::from_str(content).map_err(|error| RoleStoreError::Malformed { reason: error.to_string() })?;
        let roles = raw
            .into_iter()
            .map(|(name, role)| {
                let definition = RoleDefinition {
                    name: name.clone(),
                    members: role.users,
                    allowed_commands: role.commands,
                };
                (name, definition)
            })
            .collect();
        Ok(Self { roles })
    }

    /// First role (in file order) that lists the principal.
    pub fn resolve_role(&self, principal_id: PrincipalId) -> Option<&str> {
        self.roles
            .values()
            .find(|definition| definition.members.contains(&principal_id))
            .map(|definition| definition.name.as_str())
    }

    pub fn definition(&self, role: &str) -> Option<&RoleDefinition> {
        self.roles.get(role)
    }

    pub fn has_permission(&self, role: &str, command: &str) -> bool {
        role_permits(role, self.definition(role), command)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// File-backed role source.
#[derive(Debug, Clone)]
pub struct RoleStore {
    path: PathBuf,
}

impl RoleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the role document.
    pub async fn load(&self) -> Result<RoleBook, RoleStoreError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|error| RoleStoreError::Unavailable {
            path: self.path.display().to_string(),
            reason: error.to_string(),
        })?;
        let book = RoleBook::parse(&content)?;
        debug!(path = %self.path.display(), roles = book.len(), "Loaded role definitions");
        Ok(book)
    }

    /// Resolve a principal's role. `Ok(None)` means the principal is not authorized.
    pub async fn resolve_role(&self, principal_id: PrincipalId) -> Result<Option<String>, RoleStoreError> {
        let book = self.load().await?;
        Ok(book.resolve_role(principal_id).map(str::to_string))
    }

    pub async fn resolve_principal(&self, principal_id: PrincipalId) -> Result<Option<Principal>, RoleStoreError> {
        Ok(self
            .resolve_role(principal_id)
            .await?
            .map(|role| Principal::new(principal_id, role)))
    }

    pub async fn has_permission(&self, role: &str, command: &str) -> Result<bool, RoleStoreError> {
        if role == ADMIN_ROLE {
            return Ok(true);
        }
        let book = self.load().await?;
        Ok(book.has_permission(role, command))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleStoreError {
    #[error("role definitions unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("role definitions are malformed: {reason}")]
    Malformed { reason: String },
}
