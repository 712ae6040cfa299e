//! Shaping captured output for chat transports.

use super::remote::RemoteOutput;

pub const NO_OUTPUT_MESSAGE: &str = "Command completed with no output.";

/// Render captured streams as one message body.
///
/// Each non-empty stream is fenced and labelled. A non-zero exit status is appended on its
/// own line.
pub fn compose_output(output: &RemoteOutput) -> String {
    let mut parts = Vec::new();
    let stdout = output.stdout.trim();
    if !stdout.is_empty() {
        parts.push(format!("```stdout\n{stdout}\n```"));
    }
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        parts.push(format!("```stderr\n{stderr}\n```"));
    }
    if let Some(status) = output.exit_status.filter(|status| *status != 0) {
        parts.push(format!("exit status: {status}"));
    }
    if parts.is_empty() {
        return NO_OUTPUT_MESSAGE.to_string();
    }
    parts.join("\n")
}

/// Split `text` into chunks of at most `max_bytes` bytes, never inside a UTF-8 sequence.
///
/// Concatenating the chunks yields `text`. Empty input yields one empty chunk so callers
/// always have something to send.
pub fn chunk_output(text: &str, max_bytes: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let max_bytes = max_bytes.max(1);
    let mut chunks = Vec::with_capacity(text.len().div_ceil(max_bytes));
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = max_bytes.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // A single character wider than the budget still has to go out whole.
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}
