use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shellgate_engine::execution::{ConnectTarget, RemoteConnector, RemoteError, RemoteOutput, RemoteSession};
use shellgate_engine::inventory::{InventoryError, ServerInventory};
use shellgate_engine::session::{Rejection, Reply, SessionEvent, SessionStage};
use shellgate_engine::{CallbackPayload, Gate, ProtocolError, ShortId};
use shellgate_types::{ConversationId, PrincipalId, ServerId, ServerRecord, ServerSummary};
use shellgate_util::{CredentialCipher, DecryptionError, GateSettings};
use tempfile::TempDir;

const ADMIN: PrincipalId = PrincipalId(1);
const VIEWER: PrincipalId = PrincipalId(2);
const AUDITOR: PrincipalId = PrincipalId(3);
const STRANGER: PrincipalId = PrincipalId(99);
const CHAT: ConversationId = ConversationId(500);

const ROLES: &str = r#"{
    "admin": {"users": [1], "commands": []},
    "viewer": {"users": [2], "commands": ["/execute_command"]},
    "auditor": {"users": [3], "commands": ["df -h"]}
}"#;

const BULK_COMMAND: &str = "cat /var/log/bulk.log";
const BULK_LEN: usize = 10_000;

const CATALOG: &str = "\
# System
uptime | Show uptime
free -m | Memory usage
# Logs
tail -n 20 /var/log/syslog | Recent syslog
";

struct MemoryInventory {
    servers: Vec<ServerRecord>,
}

impl MemoryInventory {
    fn with_servers(count: i64) -> Self {
        let servers = (1..=count)
            .map(|id| ServerRecord {
                id: ServerId(id),
                name: format!("host-{id}"),
                address: format!("10.0.0.{id}"),
                port: 22,
                login: "ops".into(),
                encrypted_credential: format!("sealed-{id}"),
            })
            .collect();
        Self { servers }
    }
}

#[async_trait]
impl ServerInventory for MemoryInventory {
    async fn get_server(&self, id: ServerId) -> Result<Option<ServerRecord>, InventoryError> {
        Ok(self.servers.iter().find(|server| server.id == id).cloned())
    }

    async fn list_servers(&self) -> Result<Vec<ServerSummary>, InventoryError> {
        Ok(self.servers.iter().map(ServerRecord::summary).collect())
    }
}

struct IdentityCipher;

impl CredentialCipher for IdentityCipher {
    fn decrypt(&self, sealed: &str) -> Result<String, DecryptionError> {
        Ok(sealed.to_string())
    }
}

#[derive(Default)]
struct Recorder {
    commands: Mutex<Vec<(String, String)>>,
    closes: AtomicUsize,
}

impl Recorder {
    fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }
}

/// Echoes commands back; anything starting with `sleep` hangs and [`BULK_COMMAND`]
/// prints [`BULK_LEN`] characters.
struct EchoConnector {
    recorder: Arc<Recorder>,
}

struct EchoSession {
    endpoint: String,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl RemoteConnector for EchoConnector {
    async fn connect(&self, target: &ConnectTarget, _password: &str) -> Result<Box<dyn RemoteSession>, RemoteError> {
        Ok(Box::new(EchoSession {
            endpoint: target.endpoint(),
            recorder: self.recorder.clone(),
        }))
    }
}

#[async_trait]
impl RemoteSession for EchoSession {
    async fn run(&mut self, command: &str) -> Result<RemoteOutput, RemoteError> {
        self.recorder
            .commands
            .lock()
            .unwrap()
            .push((self.endpoint.clone(), command.to_string()));
        if command.starts_with("sleep") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if command == BULK_COMMAND {
            return Ok(RemoteOutput {
                stdout: format!("{}\n", "x".repeat(BULK_LEN)),
                stderr: String::new(),
                exit_status: Some(0),
            });
        }
        Ok(RemoteOutput {
            stdout: format!("ran {command}\n"),
            stderr: String::new(),
            exit_status: Some(0),
        })
    }

    async fn close(self: Box<Self>) {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    gate: Gate,
    recorder: Arc<Recorder>,
    dir: TempDir,
}

impl Harness {
    fn new(server_count: i64) -> Self {
        Self::with(server_count, |_| {})
    }

    fn with(server_count: i64, tweak: impl FnOnce(&mut GateSettings)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("roles.json"), ROLES).unwrap();
        std::fs::write(dir.path().join("favorite_commands.txt"), CATALOG).unwrap();
        let mut settings = GateSettings {
            roles_path: dir.path().join("roles.json"),
            catalog_path: dir.path().join("favorite_commands.txt"),
            ..GateSettings::default()
        };
        tweak(&mut settings);

        let recorder = Arc::new(Recorder::default());
        let gate = Gate::new(
            settings,
            Arc::new(MemoryInventory::with_servers(server_count)),
            Arc::new(IdentityCipher),
            Arc::new(EchoConnector {
                recorder: recorder.clone(),
            }),
        )
        .with_retry_backoff(Duration::ZERO);
        Self { gate, recorder, dir }
    }

    fn catalog_path(&self) -> std::path::PathBuf {
        self.dir.path().join("favorite_commands.txt")
    }

    async fn send(&self, principal: PrincipalId, event: SessionEvent) -> Reply {
        self.gate.handle(CHAT, principal, event).await
    }

    async fn press(&self, principal: PrincipalId, payload: &str) -> Reply {
        let event = CallbackPayload::unpack(payload).unwrap().into_event();
        self.send(principal, event).await
    }

    async fn stage(&self) -> SessionStage {
        self.gate.stage(CHAT).await
    }

    /// Start, pick server `server`, and ask for manual entry.
    async fn reach_manual_entry(&self, principal: PrincipalId, server: i64) {
        self.send(principal, SessionEvent::Start).await;
        self.press(principal, &format!("srv:{server}")).await;
        assert_eq!(self.press(principal, "cmd:manual").await, Reply::PromptManualCommand);
    }
}

fn output(reply: Reply) -> Vec<String> {
    match reply {
        Reply::Output { chunks } => chunks,
        other => panic!("expected output, got {other:?}"),
    }
}

fn write(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn unknown_principals_are_turned_away_without_state() {
    let harness = Harness::new(3);
    let reply = harness.send(STRANGER, SessionEvent::Start).await;
    assert_eq!(reply, Reply::Unauthorized);
    assert_eq!(reply.to_string(), "You are not authorized to run commands.");
    assert_eq!(harness.stage().await, SessionStage::Idle);
}

#[tokio::test]
async fn missing_role_file_is_a_configuration_error() {
    let harness = Harness::with(3, |settings| settings.roles_path = "/nonexistent/roles.json".into());
    let reply = harness.send(ADMIN, SessionEvent::Start).await;
    assert!(matches!(reply, Reply::ConfigurationError { .. }));
    assert!(reply.to_string().starts_with("Configuration error: "));
}

#[tokio::test]
async fn idle_conversations_only_accept_start() {
    let harness = Harness::new(3);
    let reply = harness.send(ADMIN, SessionEvent::Text("uptime".into())).await;
    assert_eq!(reply, Reply::ProtocolError(ProtocolError::MissingServer));
    assert_eq!(
        reply.to_string(),
        "No server selected. Please start the process again with /execute_command."
    );
    assert_eq!(harness.stage().await, SessionStage::Idle);
    assert!(harness.recorder.commands().is_empty());

    let reply = harness.send(ADMIN, SessionEvent::Start).await;
    assert!(matches!(reply, Reply::ServerPage(_)));
    assert_eq!(harness.stage().await, SessionStage::AwaitingServer { page: 1 });
}

#[tokio::test]
async fn empty_inventory_reports_no_servers() {
    let harness = Harness::new(0);
    assert_eq!(harness.send(ADMIN, SessionEvent::Start).await, Reply::NoServers);
    assert_eq!(harness.stage().await, SessionStage::Idle);
}

#[tokio::test]
async fn server_pages_are_clamped_and_navigable() {
    let harness = Harness::new(45);
    let first = harness.send(ADMIN, SessionEvent::Start).await;
    let labels: Vec<_> = first.actions().into_iter().map(|action| action.label).collect();
    assert_eq!(labels.len(), 21);
    assert_eq!(labels.last().map(String::as_str), Some("Next"));

    let Reply::ServerPage(last) = harness.press(ADMIN, "page:9").await else {
        panic!("expected a server page");
    };
    assert_eq!((last.page, last.total_pages, last.servers.len()), (3, 3, 5));
    assert!(Reply::ServerPage(last).to_string().ends_with("45. host-45 (10.0.0.45)"));
    assert_eq!(harness.stage().await, SessionStage::AwaitingServer { page: 3 });
}

#[tokio::test]
async fn catalog_choice_runs_the_referenced_command() {
    let harness = Harness::new(3);
    harness.send(VIEWER, SessionEvent::Start).await;
    let menu = harness.press(VIEWER, "srv:2").await;
    assert_eq!(menu.to_string(), "Choose a command to execute:");
    assert_eq!(harness.stage().await, SessionStage::AwaitingCatalogChoice { server_id: ServerId(2) });

    let free = menu
        .actions()
        .into_iter()
        .find(|action| action.label == "free -m - Memory usage")
        .expect("catalog button present");
    let reply = harness.press(VIEWER, &free.payload.pack()).await;
    assert_eq!(output(reply), vec!["```stdout\nran free -m\n```".to_string()]);
    assert_eq!(
        harness.recorder.commands(),
        vec![("10.0.0.2:22".to_string(), "free -m".to_string())]
    );
    assert_eq!(harness.recorder.closes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.stage().await, SessionStage::Idle);
}

#[tokio::test]
async fn viewer_may_run_catalog_text_typed_manually() {
    let harness = Harness::new(3);
    harness.reach_manual_entry(VIEWER, 1).await;
    let reply = harness.send(VIEWER, SessionEvent::Text("  uptime ".into())).await;
    assert_eq!(output(reply), vec!["```stdout\nran uptime\n```".to_string()]);
    assert_eq!(harness.stage().await, SessionStage::Idle);
}

#[tokio::test]
async fn role_grants_do_not_whitelist_manual_text() {
    let harness = Harness::new(3);
    harness.reach_manual_entry(VIEWER, 1).await;
    for text in ["/execute_command", "df -h"] {
        assert_eq!(
            harness.send(VIEWER, SessionEvent::Text(text.into())).await,
            Reply::Rejected(Rejection::NotAllowed)
        );
    }
    assert!(harness.recorder.commands().is_empty());
}

#[tokio::test]
async fn roles_without_the_entry_command_cannot_start() {
    let harness = Harness::new(3);
    let reply = harness.send(AUDITOR, SessionEvent::Start).await;
    assert_eq!(reply, Reply::PermissionDenied);
    assert_eq!(reply.to_string(), "You don't have permission to use this command.");
    assert_eq!(harness.stage().await, SessionStage::Idle);

    harness.send(ADMIN, SessionEvent::Start).await;
    assert_eq!(harness.send(AUDITOR, SessionEvent::Start).await, Reply::PermissionDenied);
    assert_eq!(harness.stage().await, SessionStage::AwaitingServer { page: 1 });
    assert!(harness.recorder.commands().is_empty());
}

#[tokio::test]
async fn viewer_is_refused_commands_outside_the_whitelist() {
    let harness = Harness::new(3);
    harness.reach_manual_entry(VIEWER, 1).await;
    let reply = harness.send(VIEWER, SessionEvent::Text("rm -rf /".into())).await;
    assert_eq!(reply, Reply::Rejected(Rejection::NotAllowed));
    assert_eq!(reply.to_string(), "This command is not allowed.");
    assert_eq!(harness.stage().await, SessionStage::AwaitingManualCommand { server_id: ServerId(1) });
    assert!(harness.recorder.commands().is_empty());
}

#[tokio::test]
async fn malformed_manual_input_is_rejected_in_place() {
    let harness = Harness::new(3);
    harness.reach_manual_entry(ADMIN, 1).await;
    assert_eq!(
        harness.send(ADMIN, SessionEvent::Text("   ".into())).await,
        Reply::Rejected(Rejection::EmptyCommand)
    );
    assert_eq!(
        harness.send(ADMIN, SessionEvent::Text("uptime; reboot".into())).await,
        Reply::Rejected(Rejection::InvalidCharacters)
    );
    assert_eq!(harness.stage().await, SessionStage::AwaitingManualCommand { server_id: ServerId(1) });
}

#[tokio::test]
async fn admin_may_run_anything_that_passes_validation() {
    let harness = Harness::new(3);
    harness.reach_manual_entry(ADMIN, 3).await;
    let reply = harness.send(ADMIN, SessionEvent::Text("rm -rf /tmp/cache".into())).await;
    assert_eq!(output(reply), vec!["```stdout\nran rm -rf /tmp/cache\n```".to_string()]);
}

#[tokio::test]
async fn stale_references_reset_the_session() {
    let harness = Harness::new(3);
    harness.send(ADMIN, SessionEvent::Start).await;
    harness.press(ADMIN, "srv:1").await;

    write(&harness.catalog_path(), "# System\nhostname | Host name\n");
    let stale = ShortId::for_command("uptime");
    let reply = harness.press(ADMIN, &format!("cmd:{stale}")).await;
    assert_eq!(reply, Reply::ProtocolError(ProtocolError::UnknownCommandReference { short_id: stale }));
    assert_eq!(harness.stage().await, SessionStage::Idle);
    assert!(harness.recorder.commands().is_empty());
}

#[tokio::test]
async fn missing_catalog_degrades_to_manual_entry() {
    let harness = Harness::new(3);
    std::fs::remove_file(harness.catalog_path()).unwrap();
    harness.send(VIEWER, SessionEvent::Start).await;

    let reply = harness.press(VIEWER, "srv:1").await;
    let labels: Vec<_> = reply.actions().into_iter().map(|action| action.label).collect();
    assert_eq!(labels, vec!["Enter command manually"]);
    let Reply::CommandMenu(menu) = reply else {
        panic!("expected a command menu");
    };
    assert!(menu.is_manual_only());
    assert!(menu.to_string().ends_with("not found. Enter command manually:"));
    assert_eq!(harness.stage().await, SessionStage::AwaitingCatalogChoice { server_id: ServerId(1) });

    assert_eq!(harness.press(VIEWER, "cmd:manual").await, Reply::PromptManualCommand);
    assert_eq!(
        harness.send(VIEWER, SessionEvent::Text("uptime".into())).await,
        Reply::Rejected(Rejection::NotAllowed)
    );
    assert_eq!(harness.stage().await, SessionStage::AwaitingManualCommand { server_id: ServerId(1) });
    assert!(harness.recorder.commands().is_empty());
}

#[tokio::test]
async fn admin_runs_manual_commands_without_a_catalog() {
    let harness = Harness::new(3);
    std::fs::remove_file(harness.catalog_path()).unwrap();
    harness.reach_manual_entry(ADMIN, 1).await;
    let reply = harness.send(ADMIN, SessionEvent::Text("uptime".into())).await;
    assert_eq!(output(reply), vec!["```stdout\nran uptime\n```".to_string()]);
}

#[tokio::test]
async fn unknown_servers_report_a_single_chunk() {
    let harness = Harness::new(3);
    harness.reach_manual_entry(ADMIN, 42).await;
    let reply = harness.send(ADMIN, SessionEvent::Text("uptime".into())).await;
    assert_eq!(output(reply), vec!["server not found".to_string()]);
    assert_eq!(harness.stage().await, SessionStage::Idle);
}

#[tokio::test(start_paused = true)]
async fn hung_commands_time_out_and_close_the_session() {
    let harness = Harness::with(3, |settings| settings.command_timeout_raw = "2".into());
    harness.reach_manual_entry(ADMIN, 1).await;
    let reply = harness.send(ADMIN, SessionEvent::Text("sleep 600".into())).await;
    assert_eq!(output(reply), vec!["Command timed out after 2 seconds.".to_string()]);
    assert_eq!(harness.recorder.closes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.stage().await, SessionStage::Idle);
}

#[tokio::test]
async fn invalid_timeout_values_are_reported() {
    let harness = Harness::with(3, |settings| settings.command_timeout_raw = "0".into());
    harness.reach_manual_entry(ADMIN, 1).await;
    let reply = harness.send(ADMIN, SessionEvent::Text("uptime".into())).await;
    assert_eq!(output(reply), vec!["Invalid timeout value.".to_string()]);
    assert!(harness.recorder.commands().is_empty());
}

#[tokio::test]
async fn long_output_arrives_in_chunks() {
    let harness = Harness::with(3, |settings| settings.output_chunk_size = 16);
    harness.reach_manual_entry(ADMIN, 1).await;
    let chunks = output(harness.send(ADMIN, SessionEvent::Text("cat /etc/hostname".into())).await);
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|chunk| chunk.len() <= 16));
    assert_eq!(chunks.concat(), "```stdout\nran cat /etc/hostname\n```");
}

#[tokio::test]
async fn ten_thousand_characters_arrive_in_three_chunks() {
    let harness = Harness::new(3);
    assert_eq!(harness.gate.settings().output_chunk_size, 4096);
    harness.reach_manual_entry(ADMIN, 1).await;
    let chunks = output(harness.send(ADMIN, SessionEvent::Text(BULK_COMMAND.into())).await);
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|chunk| chunk.len() <= 4096));
    assert_eq!(chunks.concat(), format!("```stdout\n{}\n```", "x".repeat(BULK_LEN)));
}

#[tokio::test]
async fn cancel_and_restart_always_work() {
    let harness = Harness::new(3);
    harness.reach_manual_entry(ADMIN, 2).await;
    assert_eq!(harness.send(ADMIN, SessionEvent::Cancel).await, Reply::Cancelled);
    assert_eq!(harness.stage().await, SessionStage::Idle);

    harness.reach_manual_entry(ADMIN, 2).await;
    harness.send(ADMIN, SessionEvent::Start).await;
    assert_eq!(harness.stage().await, SessionStage::AwaitingServer { page: 1 });
}

#[tokio::test]
async fn buttons_pressed_in_the_wrong_stage_reset_the_flow() {
    let harness = Harness::new(3);
    harness.reach_manual_entry(ADMIN, 2).await;
    let reply = harness.press(ADMIN, "srv:3").await;
    assert!(matches!(reply, Reply::ProtocolError(ProtocolError::UnexpectedEvent { .. })));
    assert_eq!(harness.stage().await, SessionStage::Idle);
}
