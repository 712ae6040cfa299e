use std::sync::Arc;
use std::time::Duration;

use shellgate_types::{ConversationId, Principal, PrincipalId, ServerId};
use shellgate_util::{CredentialCipher, GateSettings, redact_sensitive};
use tracing::{debug, error, info, warn};

use super::reply::{CommandMenu, Rejection, Reply, ServerPage};
use super::{ProtocolError, START_COMMAND, SessionEvent, SessionStage, SessionStore, Step, plan, validate_manual_command};
use crate::catalog::{CatalogError, CommandCatalog, ShortId};
use crate::execution::{ExecutionPipeline, RemoteConnector};
use crate::inventory::ServerInventory;
use crate::pagination::{clamp_page, page, total_pages};
use crate::roles::RoleStore;

/// `tracing` target for one-record-per-execution audit events.
pub const AUDIT_TARGET: &str = "shellgate::audit";

#[derive(Clone, Copy)]
enum CommandSource {
    Catalog,
    Manual,
}

impl CommandSource {
    fn as_str(self) -> &'static str {
        match self {
            CommandSource::Catalog => "catalog",
            CommandSource::Manual => "manual",
        }
    }
}

/// Entry point for transports: authorizes the principal, advances the conversation and
/// runs commands.
pub struct Gate {
    settings: Arc<GateSettings>,
    roles: RoleStore,
    inventory: Arc<dyn ServerInventory>,
    pipeline: ExecutionPipeline,
    sessions: SessionStore,
}

impl Gate {
    pub fn new(
        settings: GateSettings,
        inventory: Arc<dyn ServerInventory>,
        cipher: Arc<dyn CredentialCipher>,
        connector: Arc<dyn RemoteConnector>,
    ) -> Self {
        let settings = Arc::new(settings);
        let pipeline = ExecutionPipeline::new(inventory.clone(), cipher, connector, settings.clone());
        Self {
            roles: RoleStore::new(settings.roles_path.clone()),
            settings,
            inventory,
            pipeline,
            sessions: SessionStore::new(),
        }
    }

    /// Override the delay between connection attempts.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.pipeline = self.pipeline.with_retry_backoff(backoff);
        self
    }

    pub fn roles(&self) -> &RoleStore {
        &self.roles
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub async fn stage(&self, conversation: ConversationId) -> SessionStage {
        self.sessions.stage(conversation).await
    }

    /// Handle one event from `principal_id` in `conversation`.
    ///
    /// Unknown principals get [`Reply::Unauthorized`] and leave no trace in the session map.
    /// A [`SessionEvent::Start`] also needs [`START_COMMAND`] in the role's allowed set;
    /// without it the reply is [`Reply::PermissionDenied`] and the stage is left untouched.
    ///
    /// The stage is read before and written after IO, so callers must dispatch the events
    /// of one conversation sequentially.
    pub async fn handle(&self, conversation: ConversationId, principal_id: PrincipalId, event: SessionEvent) -> Reply {
        let principal = match self.roles.resolve_principal(principal_id).await {
            Ok(Some(principal)) => principal,
            Ok(None) => {
                info!(principal = %principal_id, "Rejected event from unknown principal");
                return Reply::Unauthorized;
            }
            Err(error) => {
                error!(principal = %principal_id, error = %error, "Role lookup failed");
                return Reply::ConfigurationError {
                    message: error.to_string(),
                };
            }
        };

        if event == SessionEvent::Start && !self.may_start(&principal).await {
            info!(
                principal = %principal.id,
                role = %principal.role,
                command = START_COMMAND,
                "Refused entry command without permission"
            );
            return Reply::PermissionDenied;
        }

        let stage = self.sessions.stage(conversation).await;
        let step = match plan(&stage, event) {
            Ok(step) => step,
            Err(error) => return self.protocol_error(conversation, error).await,
        };
        debug!(conversation = %conversation, principal = %principal.id, step = ?step, "Advancing session");

        match step {
            Step::ListServers { page } => self.list_servers(conversation, page).await,
            Step::OpenCatalog { server_id } => self.open_catalog(conversation, server_id).await,
            Step::RunCatalogCommand { server_id, short_id } => {
                self.run_catalog_command(conversation, &principal, server_id, &short_id)
                    .await
            }
            Step::PromptManualCommand { server_id } => {
                self.sessions
                    .set(conversation, SessionStage::AwaitingManualCommand { server_id })
                    .await;
                Reply::PromptManualCommand
            }
            Step::SubmitManualCommand { server_id, text } => {
                self.submit_manual_command(conversation, &principal, server_id, &text)
                    .await
            }
            Step::Cancel => {
                self.sessions.reset(conversation).await;
                Reply::Cancelled
            }
        }
    }

    async fn may_start(&self, principal: &Principal) -> bool {
        match self.roles.has_permission(&principal.role, START_COMMAND).await {
            Ok(granted) => granted,
            Err(error) => {
                error!(error = %error, "Role lookup failed during permission check");
                false
            }
        }
    }

    async fn protocol_error(&self, conversation: ConversationId, error: ProtocolError) -> Reply {
        warn!(conversation = %conversation, error = %error, "Resetting session after protocol error");
        self.sessions.reset(conversation).await;
        Reply::ProtocolError(error)
    }

    async fn list_servers(&self, conversation: ConversationId, requested_page: usize) -> Reply {
        let servers = match self.inventory.list_servers().await {
            Ok(servers) => servers,
            Err(error) => {
                error!(error = %error, "Server listing failed");
                self.sessions.reset(conversation).await;
                return Reply::ConfigurationError {
                    message: error.to_string(),
                };
            }
        };
        if servers.is_empty() {
            self.sessions.reset(conversation).await;
            return Reply::NoServers;
        }

        let page_size = self.settings.servers_per_page.max(1);
        let page_number = clamp_page(requested_page, total_pages(servers.len(), page_size));
        let window = page(&servers, page_number, page_size);
        self.sessions
            .set(conversation, SessionStage::AwaitingServer { page: page_number })
            .await;
        Reply::ServerPage(ServerPage {
            page: page_number,
            total_pages: window.total_pages,
            offset: window.offset,
            servers: window.items.to_vec(),
        })
    }

    async fn open_catalog(&self, conversation: ConversationId, server_id: ServerId) -> Reply {
        match CommandCatalog::load(&self.settings.catalog_path).await {
            Ok(catalog) => {
                self.sessions
                    .set(conversation, SessionStage::AwaitingCatalogChoice { server_id })
                    .await;
                Reply::CommandMenu(CommandMenu::from_catalog(&catalog))
            }
            Err(error) => {
                warn!(error = %error, "Command catalog unavailable; offering manual entry only");
                self.sessions
                    .set(conversation, SessionStage::AwaitingCatalogChoice { server_id })
                    .await;
                Reply::CommandMenu(CommandMenu::manual_only(self.unavailable_reason(&error)))
            }
        }
    }

    fn unavailable_reason(&self, error: &CatalogError) -> String {
        match error {
            CatalogError::Unavailable { .. } => {
                format!("File '{}' not found", self.settings.catalog_path.display())
            }
            CatalogError::ShortIdCollision { .. } => "Command catalog has conflicting entries".to_string(),
            CatalogError::Invalid { .. } | CatalogError::MalformedReference { .. } => {
                "Command catalog could not be read".to_string()
            }
        }
    }

    async fn run_catalog_command(
        &self,
        conversation: ConversationId,
        principal: &Principal,
        server_id: ServerId,
        short_id: &ShortId,
    ) -> Reply {
        let command = match CommandCatalog::load(&self.settings.catalog_path).await {
            Ok(catalog) => catalog.resolve(short_id).map(|entry| entry.command.clone()),
            Err(error) => {
                warn!(error = %error, "Command catalog reload failed");
                None
            }
        };
        let Some(command) = command else {
            let error = ProtocolError::UnknownCommandReference {
                short_id: short_id.clone(),
            };
            return self.protocol_error(conversation, error).await;
        };
        self.execute(conversation, principal, server_id, &command, CommandSource::Catalog)
            .await
    }

    async fn submit_manual_command(
        &self,
        conversation: ConversationId,
        principal: &Principal,
        server_id: ServerId,
        text: &str,
    ) -> Reply {
        let command = match validate_manual_command(text) {
            Ok(command) => command,
            Err(rejection) => return Reply::Rejected(rejection),
        };
        if !principal.is_admin() && !self.is_whitelisted(command).await {
            info!(
                principal = %principal.id,
                role = %principal.role,
                command = %redact_sensitive(command),
                "Refused manual command outside the whitelist"
            );
            return Reply::Rejected(Rejection::NotAllowed);
        }
        self.execute(conversation, principal, server_id, command, CommandSource::Manual)
            .await
    }

    /// Catalog command texts, compared verbatim. No catalog means nothing is whitelisted.
    async fn is_whitelisted(&self, command: &str) -> bool {
        match CommandCatalog::load(&self.settings.catalog_path).await {
            Ok(catalog) => catalog.contains_command(command),
            Err(error) => {
                warn!(error = %error, "Catalog unavailable for whitelist; refusing manual command");
                false
            }
        }
    }

    async fn execute(
        &self,
        conversation: ConversationId,
        principal: &Principal,
        server_id: ServerId,
        command: &str,
        source: CommandSource,
    ) -> Reply {
        self.sessions.reset(conversation).await;
        let report = self.pipeline.execute(server_id, command).await;
        info!(
            target: AUDIT_TARGET,
            principal = %principal.id,
            role = %principal.role,
            server = %server_id,
            command = %redact_sensitive(command),
            source = source.as_str(),
            outcome = report.outcome.label(),
            chunks = report.chunks.len(),
            "command executed"
        );
        Reply::Output {
            chunks: report.into_chunks(),
        }
    }
}
