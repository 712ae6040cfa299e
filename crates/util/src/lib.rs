//! Shared helpers for the Shellgate workspace: environment-driven settings,
//! path resolution, log redaction and the sealed-credential cipher.

pub mod credentials;
pub mod path_processing;
pub mod redact;
pub mod settings;

pub use credentials::{CredentialCipher, DecryptionError, ENCRYPTION_KEY_ENV, SealedCredentialCipher};
pub use path_processing::{config_file_path, expand_tilde};
pub use redact::redact_sensitive;
pub use settings::{GateSettings, SettingsError};
