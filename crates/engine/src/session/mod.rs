//! Per-conversation selection flow.
//!
//! A conversation moves `Idle -> AwaitingServer -> AwaitingCatalogChoice` and then either
//! executes a catalog command or passes through `AwaitingManualCommand` before executing.
//! Execution, cancellation and protocol errors all return it to `Idle`.
//!
//! [`plan`] is the pure transition table; [`Gate`] applies the resulting [`Step`] with the
//! role store, inventory, catalog and execution pipeline.

mod gate;
mod reply;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use shellgate_types::{ConversationId, ServerId};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::catalog::ShortId;

pub use gate::{AUDIT_TARGET, Gate};
pub use reply::{Action, CommandMenu, Rejection, Reply, ServerPage};

/// Entry command a role must be granted to open the selection flow.
pub const START_COMMAND: &str = "/execute_command";

static MANUAL_COMMAND_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\s./-]+$").expect("manual command pattern compiles"));

/// Where a conversation is in the selection flow. Pending data lives in the variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionStage {
    #[default]
    Idle,
    AwaitingServer {
        page: usize,
    },
    AwaitingCatalogChoice {
        server_id: ServerId,
    },
    AwaitingManualCommand {
        server_id: ServerId,
    },
}

impl SessionStage {
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            SessionStage::AwaitingCatalogChoice { server_id } | SessionStage::AwaitingManualCommand { server_id } => {
                Some(*server_id)
            }
            SessionStage::Idle | SessionStage::AwaitingServer { .. } => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SessionStage::Idle => "idle",
            SessionStage::AwaitingServer { .. } => "choosing a server",
            SessionStage::AwaitingCatalogChoice { .. } => "choosing a command",
            SessionStage::AwaitingManualCommand { .. } => "waiting for a command",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    ChangePage { page: usize },
    ChooseServer { server_id: ServerId },
    ChooseCommand { short_id: ShortId },
    RequestManualEntry,
    Text(String),
    Cancel,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start",
            SessionEvent::ChangePage { .. } => "page change",
            SessionEvent::ChooseServer { .. } => "server choice",
            SessionEvent::ChooseCommand { .. } => "command choice",
            SessionEvent::RequestManualEntry => "manual entry request",
            SessionEvent::Text(_) => "text",
            SessionEvent::Cancel => "cancel",
        }
    }

    fn needs_server(&self) -> bool {
        matches!(
            self,
            SessionEvent::ChooseCommand { .. } | SessionEvent::RequestManualEntry | SessionEvent::Text(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("No server selected")]
    MissingServer,

    #[error("Unexpected {event} while {stage}")]
    UnexpectedEvent { event: &'static str, stage: &'static str },

    #[error("Unknown command reference {short_id}")]
    UnknownCommandReference { short_id: ShortId },
}

/// What the gate should do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    ListServers { page: usize },
    OpenCatalog { server_id: ServerId },
    RunCatalogCommand { server_id: ServerId, short_id: ShortId },
    PromptManualCommand { server_id: ServerId },
    SubmitManualCommand { server_id: ServerId, text: String },
    Cancel,
}

/// Transition table. Pure: no IO, no state mutation.
pub fn plan(stage: &SessionStage, event: SessionEvent) -> Result<Step, ProtocolError> {
    match (stage, event) {
        (_, SessionEvent::Start) => Ok(Step::ListServers { page: 1 }),
        (_, SessionEvent::Cancel) => Ok(Step::Cancel),
        (SessionStage::AwaitingServer { .. }, SessionEvent::ChangePage { page }) => Ok(Step::ListServers { page }),
        (SessionStage::AwaitingServer { .. }, SessionEvent::ChooseServer { server_id }) => {
            Ok(Step::OpenCatalog { server_id })
        }
        (SessionStage::AwaitingCatalogChoice { server_id }, SessionEvent::ChooseCommand { short_id }) => {
            Ok(Step::RunCatalogCommand {
                server_id: *server_id,
                short_id,
            })
        }
        (
            SessionStage::AwaitingCatalogChoice { server_id } | SessionStage::AwaitingManualCommand { server_id },
            SessionEvent::RequestManualEntry,
        ) => Ok(Step::PromptManualCommand { server_id: *server_id }),
        (SessionStage::AwaitingManualCommand { server_id }, SessionEvent::Text(text)) => {
            Ok(Step::SubmitManualCommand {
                server_id: *server_id,
                text,
            })
        }
        (stage, event) if event.needs_server() && stage.server_id().is_none() => Err(ProtocolError::MissingServer),
        (stage, event) => Err(ProtocolError::UnexpectedEvent {
            event: event.name(),
            stage: stage.name(),
        }),
    }
}

/// Trim and check manually typed command text.
pub fn validate_manual_command(text: &str) -> Result<&str, Rejection> {
    let command = text.trim();
    if command.is_empty() {
        return Err(Rejection::EmptyCommand);
    }
    if !MANUAL_COMMAND_PATTERN.is_match(command) {
        return Err(Rejection::InvalidCharacters);
    }
    Ok(command)
}

/// Stage per conversation. Critical sections only copy or replace a stage.
#[derive(Debug, Default)]
pub struct SessionStore {
    stages: Mutex<HashMap<ConversationId, SessionStage>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stage(&self, conversation: ConversationId) -> SessionStage {
        self.stages.lock().await.get(&conversation).cloned().unwrap_or_default()
    }

    pub async fn set(&self, conversation: ConversationId, stage: SessionStage) {
        let mut stages = self.stages.lock().await;
        if stage == SessionStage::Idle {
            stages.remove(&conversation);
        } else {
            stages.insert(conversation, stage);
        }
    }

    pub async fn reset(&self, conversation: ConversationId) {
        self.set(conversation, SessionStage::Idle).await;
    }

    /// Number of conversations not idle.
    pub async fn active(&self) -> usize {
        self.stages.lock().await.len()
    }
}
