//! Environment-driven settings for the execution engine.
//!
//! Every knob has a default so a bare environment still yields a usable
//! configuration. Numeric values are validated eagerly, with one exception:
//! `COMMAND_TIMEOUT` is kept raw and validated on each run so a bad value turns
//! into a readable error reply instead of preventing startup.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::path_processing::{config_file_path, expand_tilde};

pub const COMMAND_TIMEOUT_ENV: &str = "COMMAND_TIMEOUT";
pub const FAVORITE_COMMANDS_FILE_ENV: &str = "FAVORITE_COMMANDS_FILE";
pub const ROLES_PATH_ENV: &str = "ROLES_PATH";
pub const SERVERS_PATH_ENV: &str = "SERVERS_PATH";
pub const OUTPUT_CHUNK_SIZE_ENV: &str = "OUTPUT_CHUNK_SIZE";
pub const SERVERS_PER_PAGE_ENV: &str = "SERVERS_PER_PAGE";
pub const SSH_CONNECT_ATTEMPTS_ENV: &str = "SSH_CONNECT_ATTEMPTS";
pub const SSH_CONNECT_TIMEOUT_ENV: &str = "SSH_CONNECT_TIMEOUT";

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FAVORITE_COMMANDS_FILE: &str = "favorite_commands.txt";
pub const DEFAULT_ROLES_FILE: &str = "roles.json";
pub const DEFAULT_SERVERS_FILE: &str = "servers.json";
pub const DEFAULT_OUTPUT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_SERVERS_PER_PAGE: usize = 20;
pub const DEFAULT_SSH_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_SSH_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Smallest chunk that can always hold one UTF-8 encoded character.
pub const MIN_OUTPUT_CHUNK_SIZE: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidValue { name: String, value: String, reason: String },
}

impl SettingsError {
    fn invalid(name: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Resolved engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    /// Raw remote command timeout in seconds; see [`GateSettings::command_timeout`].
    pub command_timeout_raw: String,
    pub catalog_path: PathBuf,
    pub roles_path: PathBuf,
    pub servers_path: PathBuf,
    /// Maximum bytes per output chunk handed to the transport.
    pub output_chunk_size: usize,
    pub servers_per_page: usize,
    pub connect_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            command_timeout_raw: DEFAULT_COMMAND_TIMEOUT_SECS.to_string(),
            catalog_path: PathBuf::from(DEFAULT_FAVORITE_COMMANDS_FILE),
            roles_path: PathBuf::from(DEFAULT_ROLES_FILE),
            servers_path: PathBuf::from(DEFAULT_SERVERS_FILE),
            output_chunk_size: DEFAULT_OUTPUT_CHUNK_SIZE,
            servers_per_page: DEFAULT_SERVERS_PER_PAGE,
            connect_attempts: DEFAULT_SSH_CONNECT_ATTEMPTS,
            connect_timeout: Duration::from_secs(DEFAULT_SSH_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl GateSettings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let output_chunk_size = parse_var(OUTPUT_CHUNK_SIZE_ENV, defaults.output_chunk_size)?;
        if output_chunk_size < MIN_OUTPUT_CHUNK_SIZE {
            return Err(SettingsError::invalid(
                OUTPUT_CHUNK_SIZE_ENV,
                &output_chunk_size.to_string(),
                format!("must be at least {MIN_OUTPUT_CHUNK_SIZE}"),
            ));
        }
        let servers_per_page = parse_var(SERVERS_PER_PAGE_ENV, defaults.servers_per_page)?;
        if servers_per_page == 0 {
            return Err(SettingsError::invalid(SERVERS_PER_PAGE_ENV, "0", "must be positive"));
        }
        let connect_attempts = parse_var(SSH_CONNECT_ATTEMPTS_ENV, defaults.connect_attempts)?;
        if connect_attempts == 0 {
            return Err(SettingsError::invalid(SSH_CONNECT_ATTEMPTS_ENV, "0", "must be positive"));
        }
        let connect_timeout_secs = parse_var(SSH_CONNECT_TIMEOUT_ENV, DEFAULT_SSH_CONNECT_TIMEOUT_SECS)?;
        if connect_timeout_secs == 0 {
            return Err(SettingsError::invalid(SSH_CONNECT_TIMEOUT_ENV, "0", "must be positive"));
        }

        Ok(Self {
            command_timeout_raw: non_blank_var(COMMAND_TIMEOUT_ENV).unwrap_or(defaults.command_timeout_raw),
            catalog_path: non_blank_var(FAVORITE_COMMANDS_FILE_ENV)
                .map(|path| expand_tilde(&path))
                .unwrap_or(defaults.catalog_path),
            roles_path: non_blank_var(ROLES_PATH_ENV)
                .map(|path| expand_tilde(&path))
                .unwrap_or(defaults.roles_path),
            servers_path: config_file_path(SERVERS_PATH_ENV, DEFAULT_SERVERS_FILE),
            output_chunk_size,
            servers_per_page,
            connect_attempts,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }

    /// Parse the remote command timeout. Zero and non-integer values are rejected.
    pub fn command_timeout(&self) -> Result<Duration, SettingsError> {
        let raw = self.command_timeout_raw.trim();
        match raw.parse::<u64>() {
            Ok(0) => Err(SettingsError::invalid(COMMAND_TIMEOUT_ENV, raw, "must be positive")),
            Ok(seconds) => Ok(Duration::from_secs(seconds)),
            Err(error) => Err(SettingsError::invalid(COMMAND_TIMEOUT_ENV, raw, error.to_string())),
        }
    }
}

fn non_blank_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_blank_var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|error| SettingsError::invalid(name, &value, error.to_string())),
        None => Ok(default),
    }
}
