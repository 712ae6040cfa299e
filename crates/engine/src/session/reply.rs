//! Transport-neutral replies produced by the gate.
//!
//! A transport renders [`Reply::messages`] as text and [`Reply::actions`] as buttons whose
//! payloads come back as [`CallbackPayload`]s.

use std::fmt;

use shellgate_types::ServerSummary;

use super::{ProtocolError, START_COMMAND};
use crate::catalog::{CatalogEntry, CommandCatalog};
use crate::protocol::CallbackPayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Unauthorized,
    PermissionDenied,
    ConfigurationError { message: String },
    NoServers,
    ServerPage(ServerPage),
    CommandMenu(CommandMenu),
    PromptManualCommand,
    Rejected(Rejection),
    Output { chunks: Vec<String> },
    ProtocolError(ProtocolError),
    Cancelled,
}

impl Reply {
    /// Message bodies in send order. Output replies carry one message per chunk.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Reply::Output { chunks } => chunks.clone(),
            other => vec![other.to_string()],
        }
    }

    pub fn actions(&self) -> Vec<Action> {
        match self {
            Reply::ServerPage(page) => page.actions(),
            Reply::CommandMenu(menu) => menu.actions(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Unauthorized => f.write_str("You are not authorized to run commands."),
            Reply::PermissionDenied => f.write_str("You don't have permission to use this command."),
            Reply::ConfigurationError { message } => write!(f, "Configuration error: {message}"),
            Reply::NoServers => f.write_str("No servers found."),
            Reply::ServerPage(page) => page.fmt(f),
            Reply::CommandMenu(menu) => menu.fmt(f),
            Reply::PromptManualCommand => f.write_str("Enter the command you want to execute:"),
            Reply::Rejected(rejection) => rejection.fmt(f),
            Reply::Output { chunks } => f.write_str(&chunks.concat()),
            Reply::ProtocolError(error) => write!(f, "{error}. Please start the process again with {START_COMMAND}."),
            Reply::Cancelled => f.write_str("Command selection cancelled."),
        }
    }
}

/// A button: visible label plus the payload echoed back when pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub payload: CallbackPayload,
}

impl Action {
    fn new(label: impl Into<String>, payload: CallbackPayload) -> Self {
        Self {
            label: label.into(),
            payload,
        }
    }
}

/// One page of the server listing. Servers are numbered across pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPage {
    pub page: usize,
    pub total_pages: usize,
    pub offset: usize,
    pub servers: Vec<ServerSummary>,
}

impl ServerPage {
    fn actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .servers
            .iter()
            .enumerate()
            .map(|(index, server)| {
                Action::new((self.offset + index + 1).to_string(), CallbackPayload::Server(server.id))
            })
            .collect();
        if self.page > 1 {
            actions.push(Action::new("Previous", CallbackPayload::Page(self.page - 1)));
        }
        if self.page < self.total_pages {
            actions.push(Action::new("Next", CallbackPayload::Page(self.page + 1)));
        }
        actions
    }
}

impl fmt::Display for ServerPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Servers (Page {}/{}):", self.page, self.total_pages)?;
        for (index, server) in self.servers.iter().enumerate() {
            write!(f, "\n{}. {server}", self.offset + index + 1)?;
        }
        Ok(())
    }
}

/// Catalog choices for the selected server, or a manual-only fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMenu {
    pub entries: Vec<CatalogEntry>,
    /// Why the catalog could not be offered. `Some` means manual entry only.
    pub unavailable_reason: Option<String>,
}

impl CommandMenu {
    pub fn from_catalog(catalog: &CommandCatalog) -> Self {
        Self {
            entries: catalog.entries().cloned().collect(),
            unavailable_reason: None,
        }
    }

    pub fn manual_only(reason: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            unavailable_reason: Some(reason.into()),
        }
    }

    pub fn is_manual_only(&self) -> bool {
        self.unavailable_reason.is_some()
    }

    fn actions(&self) -> Vec<Action> {
        self.entries
            .iter()
            .map(|entry| {
                Action::new(
                    format!("{} - {}", entry.command, entry.description),
                    CallbackPayload::Command(entry.short_id.clone()),
                )
            })
            .chain(std::iter::once(Action::new("Enter command manually", CallbackPayload::ManualEntry)))
            .collect()
    }
}

impl fmt::Display for CommandMenu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unavailable_reason {
            Some(reason) => write!(f, "{reason}. Enter command manually:"),
            None => f.write_str("Choose a command to execute:"),
        }
    }
}

/// Manual input that was refused; the session stays where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyCommand,
    InvalidCharacters,
    NotAllowed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::EmptyCommand => "Please enter a command.",
            Rejection::InvalidCharacters => "Invalid characters in command.",
            Rejection::NotAllowed => "This command is not allowed.",
        })
    }
}
