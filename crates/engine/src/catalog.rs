//! Favorite command catalog.
//!
//! The catalog groups curated commands by category and gives every command a short,
//! content-derived reference ([`ShortId`]) small enough to embed in a chat callback
//! payload. The id map belongs to one loaded [`CommandCatalog`]; a reload builds a new
//! one from scratch.
//!
//! Two source formats are accepted, chosen by file extension:
//!
//! - `.yaml`, `.yml`, `.json`: a mapping of category to a list of `{command, description}`.
//! - anything else: the line format, where `# Category` starts a group and each entry is
//!   written as `command | description`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Number of hex characters kept from the command digest.
pub const SHORT_ID_LEN: usize = 8;

/// Category used for line-format entries that appear before any `#` header.
pub const DEFAULT_CATEGORY: &str = "General";

/// Compact reference to a catalog command: the first 8 hex characters of its SHA-256.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortId(String);

impl ShortId {
    /// Derive the id for a command text. Deterministic across processes.
    pub fn for_command(command: &str) -> Self {
        let digest = Sha256::digest(command.as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(SHORT_ID_LEN);
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ShortId {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let is_valid = value.len() == SHORT_ID_LEN && value.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'));
        if is_valid {
            Ok(Self(value.to_string()))
        } else {
            Err(CatalogError::MalformedReference { value: value.to_string() })
        }
    }
}

/// A curated command as presented to operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub category: String,
    pub command: String,
    pub description: String,
    pub short_id: ShortId,
}

/// Entry as read from a source, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawCatalogEntry {
    pub category: String,
    pub command: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct StructuredEntry {
    #[serde(default, alias = "name")]
    command: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("command catalog unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("command catalog is invalid: {reason}")]
    Invalid { reason: String },

    #[error("commands '{first}' and '{second}' share the reference {short_id}")]
    ShortIdCollision { short_id: ShortId, first: String, second: String },

    #[error("'{value}' is not a command reference")]
    MalformedReference { value: String },
}

/// One loaded catalog: categories in source order plus the reference map.
#[derive(Clone, Debug, Default)]
pub struct CommandCatalog {
    source: Option<PathBuf>,
    categories: IndexMap<String, Vec<CatalogEntry>>,
    by_id: HashMap<ShortId, CatalogEntry>,
}

impl CommandCatalog {
    /// Load a catalog from disk.
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|error| CatalogError::Unavailable {
            path: path.display().to_string(),
            reason: error.to_string(),
        })?;
        let raw = if is_structured_source(path) {
            parse_structured(&content)?
        } else {
            parse_lines(&content)
        };
        let mut catalog = Self::from_raw_entries(raw)?;
        catalog.source = Some(path.to_path_buf());
        debug!(path = %path.display(), commands = catalog.len(), "Loaded command catalog");
        Ok(catalog)
    }

    /// Validate raw entries and build the reference map.
    pub fn from_raw_entries(raw: Vec<RawCatalogEntry>) -> Result<Self, CatalogError> {
        Self::build_with(raw, ShortId::for_command)
    }

    fn build_with(raw: Vec<RawCatalogEntry>, derive_id: impl Fn(&str) -> ShortId) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for entry in raw {
            let command = entry.command.as_deref().map(str::trim).unwrap_or_default();
            let description = entry.description.as_deref().map(str::trim).unwrap_or_default();
            if command.is_empty() || description.is_empty() {
                warn!(
                    category = %entry.category,
                    command = %command,
                    "Skipping catalog entry without both a command and a description"
                );
                continue;
            }

            let short_id = derive_id(command);
            if let Some(existing) = catalog.by_id.get(&short_id)
                && existing.command != command
            {
                return Err(CatalogError::ShortIdCollision {
                    short_id,
                    first: existing.command.clone(),
                    second: command.to_string(),
                });
            }

            let entry = CatalogEntry {
                category: entry.category,
                command: command.to_string(),
                description: description.to_string(),
                short_id: short_id.clone(),
            };
            catalog.by_id.entry(short_id).or_insert_with(|| entry.clone());
            catalog.categories.entry(entry.category.clone()).or_default().push(entry);
        }

        if catalog.categories.is_empty() {
            return Err(CatalogError::Invalid {
                reason: "no usable entries".to_string(),
            });
        }
        Ok(catalog)
    }

    /// Categories with their entries, in source order.
    pub fn categories(&self) -> impl Iterator<Item = (&str, &[CatalogEntry])> {
        self.categories.iter().map(|(name, entries)| (name.as_str(), entries.as_slice()))
    }

    /// All entries in display order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.categories.values().flatten()
    }

    /// Map a reference back to its entry.
    pub fn resolve(&self, short_id: &ShortId) -> Option<&CatalogEntry> {
        self.by_id.get(short_id)
    }

    /// Whether `command` is, verbatim, one of the catalog's command texts.
    pub fn contains_command(&self, command: &str) -> bool {
        self.by_id
            .get(&ShortId::for_command(command))
            .is_some_and(|entry| entry.command == command)
    }

    /// Number of distinct commands.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn is_structured_source(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| matches!(extension.to_ascii_lowercase().as_str(), "yaml" | "yml" | "json"))
}

fn parse_structured(content: &str) -> Result<Vec<RawCatalogEntry>, CatalogError> {
    let document: IndexMap<String, Option<Vec<StructuredEntry>>> =
        serde_yaml::from_str(content).map_err(|error| CatalogError::Invalid { reason: error.to_string() })?;
    let entries = document
        .into_iter()
        .flat_map(|(category, entries)| {
            entries.unwrap_or_default().into_iter().map(move |entry| RawCatalogEntry {
                category: category.clone(),
                command: entry.command,
                description: entry.description,
            })
        })
        .collect();
    Ok(entries)
}

fn parse_lines(content: &str) -> Vec<RawCatalogEntry> {
    let mut category = DEFAULT_CATEGORY.to_string();
    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let header = header.trim();
            category = if header.is_empty() { DEFAULT_CATEGORY.to_string() } else { header.to_string() };
            continue;
        }
        match line.split_once('|') {
            Some((command, description)) => entries.push(RawCatalogEntry {
                category: category.clone(),
                command: Some(command.trim().to_string()),
                description: Some(description.trim().to_string()),
            }),
            None => {
                warn!(line = index + 1, "Catalog line has no '|' separator; expected 'command | description'");
                entries.push(RawCatalogEntry {
                    category: category.clone(),
                    command: Some(line.to_string()),
                    description: None,
                });
            }
        }
    }
    entries
}
