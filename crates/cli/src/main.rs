use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shellgate_engine::session::{Reply, SessionEvent};
use shellgate_engine::{CallbackPayload, CommandCatalog, Gate, JsonInventory, RoleStore, START_COMMAND, SshConnector};
use shellgate_types::{ConversationId, PrincipalId};
use shellgate_util::{GateSettings, SealedCredentialCipher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable naming a file to receive logs instead of stderr.
const LOG_FILE_ENV: &str = "SHELLGATE_LOG_FILE";

const CANCEL_COMMAND: &str = "/cancel";

/// Access-controlled remote command gate.
#[derive(Parser, Debug)]
#[command(name = "shellgate", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the selection flow from stdin, one event per line
    Console {
        /// Principal id the events are sent as
        #[arg(long)]
        principal: i64,

        #[arg(long, default_value_t = 0)]
        conversation: i64,
    },
    /// Print the command catalog with its short ids
    Catalog,
    /// Show the role a principal resolves to
    Whoami { principal: i64 },
    /// Seal a password read from stdin with ENCRYPTION_KEY
    Seal,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let Args { command } = Args::parse();
    let settings = GateSettings::from_env().context("invalid shellgate settings")?;

    match command {
        Command::Console { principal, conversation } => {
            run_console(settings, PrincipalId(principal), ConversationId(conversation)).await
        }
        Command::Catalog => print_catalog(&settings).await,
        Command::Whoami { principal } => whoami(&settings, PrincipalId(principal)).await,
        Command::Seal => seal().await,
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    match std::env::var(LOG_FILE_ENV).ok().filter(|path| !path.trim().is_empty()) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {path}"))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
    Ok(())
}

async fn run_console(settings: GateSettings, principal: PrincipalId, conversation: ConversationId) -> Result<()> {
    let cipher = SealedCredentialCipher::from_env().context("server credentials cannot be unsealed")?;
    let inventory = JsonInventory::new(settings.servers_path.clone());
    info!(
        servers = %inventory.path().display(),
        roles = %settings.roles_path.display(),
        catalog = %settings.catalog_path.display(),
        "Starting console"
    );
    let gate = Gate::new(settings, Arc::new(inventory), Arc::new(cipher), Arc::new(SshConnector::new()));

    println!("Type {START_COMMAND} to begin, {CANCEL_COMMAND} to abort, or paste a button payload.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let reply = gate.handle(conversation, principal, parse_event(&line)).await;
        print_reply(&reply);
    }
    Ok(())
}

/// Map one console line to a session event.
fn parse_event(line: &str) -> SessionEvent {
    match line.trim() {
        START_COMMAND => SessionEvent::Start,
        CANCEL_COMMAND => SessionEvent::Cancel,
        trimmed => match CallbackPayload::unpack(trimmed) {
            Ok(payload) => payload.into_event(),
            Err(_) => SessionEvent::Text(line.to_string()),
        },
    }
}

fn print_reply(reply: &Reply) {
    for message in reply.messages() {
        println!("{message}");
    }
    for action in reply.actions() {
        println!("  [{}] {}", action.label, action.payload.pack());
    }
}

async fn print_catalog(settings: &GateSettings) -> Result<()> {
    let catalog = CommandCatalog::load(&settings.catalog_path).await?;
    for (category, entries) in catalog.categories() {
        println!("# {category}");
        for entry in entries {
            println!("  {}  {} | {}", entry.short_id, entry.command, entry.description);
        }
    }
    Ok(())
}

async fn whoami(settings: &GateSettings, principal: PrincipalId) -> Result<()> {
    let store = RoleStore::new(settings.roles_path.clone());
    match store.resolve_role(principal).await? {
        Some(role) => println!("{principal}: {role}"),
        None => println!("{principal}: not authorized"),
    }
    Ok(())
}

async fn seal() -> Result<()> {
    let cipher = SealedCredentialCipher::from_env()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let password = lines
        .next_line()
        .await?
        .context("expected a password on stdin")?;
    println!("{}", cipher.encrypt(&password)?);
    Ok(())
}
