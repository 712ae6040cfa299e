//! # Shellgate Engine
//!
//! The engine behind an access-controlled remote command gate. Operators pick a server,
//! pick a curated command (or type one), and get the command's output back in chunks
//! small enough for a chat transport.
//!
//! ## Key Features
//!
//! - **Roles**: file-backed role membership with per-role command grants
//! - **Command Catalog**: curated commands grouped by category, referenced by short ids
//! - **Session Flow**: per-conversation selection state with a pure transition table
//! - **Execution**: SSH sessions with connection retries, timeouts and chunked output
//!
//! ## Usage
//!
//! ```rust
//! use shellgate_engine::execution::chunk_output;
//! use shellgate_engine::session::{plan, SessionEvent, SessionStage, Step};
//!
//! let step = plan(&SessionStage::Idle, SessionEvent::Start)?;
//! assert_eq!(step, Step::ListServers { page: 1 });
//!
//! let chunks = chunk_output(&"x".repeat(10_000), 4096);
//! assert_eq!(chunks.len(), 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`roles`**: role resolution and permission checks
//! - **`catalog`**: catalog loading and short-id resolution
//! - **`inventory`**: the server inventory capability and its JSON implementation
//! - **`execution`**: the remote execution pipeline and its SSH transport
//! - **`session`**: session stages, the transition table and the [`Gate`]
//! - **`protocol`**: compact callback payloads for transport buttons
//! - **`pagination`**: windowing over listings

pub mod catalog;
pub mod execution;
pub mod inventory;
pub mod pagination;
pub mod protocol;
pub mod roles;
pub mod session;

pub use catalog::{CatalogEntry, CatalogError, CommandCatalog, ShortId};
pub use execution::{
    ConnectTarget, ExecutionError, ExecutionOutcome, ExecutionPipeline, ExecutionReport, RemoteConnector, RemoteError,
    RemoteOutput, RemoteSession, SshConnector,
};
pub use inventory::{InventoryError, JsonInventory, ServerInventory};
pub use protocol::{CallbackPayload, PayloadError};
pub use roles::{RoleBook, RoleDefinition, RoleStore, RoleStoreError};
pub use session::{Gate, ProtocolError, Reply, START_COMMAND, SessionEvent, SessionStage};
