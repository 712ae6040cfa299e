use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization:\s*)(\S+(?:\s+\S+)?)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD|PASSWD)=)(\S+)",
        r"(?i)(--(?:password|token|secret|api-key)[= ])(\S+)",
        r"(?i)([a-z][a-z0-9+.-]*://[^:/\s]+:)([^@\s]+)(@)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets before a command line reaches the logs.
///
/// The prefix that identified the secret is kept so the log line stays readable.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let suffix = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}<redacted>{suffix}")
            })
            .into_owned();
    }
    redacted
}
