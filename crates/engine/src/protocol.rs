//! Compact callback payloads.
//!
//! Chat transports echo a short opaque string back when a button is pressed. The
//! selection flow encodes its choices as `prefix:value` pairs that always fit inside
//! [`MAX_CALLBACK_BYTES`]; commands are referenced by [`ShortId`] rather than by text.

use std::fmt;
use std::str::FromStr;

use shellgate_types::ServerId;
use thiserror::Error;

use crate::catalog::ShortId;
use crate::session::SessionEvent;

/// Callback payload budget imposed by common chat transports.
pub const MAX_CALLBACK_BYTES: usize = 64;

const SERVER_PREFIX: &str = "srv";
const PAGE_PREFIX: &str = "page";
const COMMAND_PREFIX: &str = "cmd";
const MANUAL_MARKER: &str = "manual";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackPayload {
    Server(ServerId),
    Page(usize),
    Command(ShortId),
    ManualEntry,
}

impl CallbackPayload {
    pub fn pack(&self) -> String {
        let packed = self.to_string();
        debug_assert!(packed.len() <= MAX_CALLBACK_BYTES);
        packed
    }

    pub fn unpack(raw: &str) -> Result<Self, PayloadError> {
        raw.parse()
    }

    /// The session event a pressed button stands for.
    pub fn into_event(self) -> SessionEvent {
        match self {
            CallbackPayload::Server(server_id) => SessionEvent::ChooseServer { server_id },
            CallbackPayload::Page(page) => SessionEvent::ChangePage { page },
            CallbackPayload::Command(short_id) => SessionEvent::ChooseCommand { short_id },
            CallbackPayload::ManualEntry => SessionEvent::RequestManualEntry,
        }
    }
}

impl fmt::Display for CallbackPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackPayload::Server(server_id) => write!(f, "{SERVER_PREFIX}:{server_id}"),
            CallbackPayload::Page(page) => write!(f, "{PAGE_PREFIX}:{page}"),
            CallbackPayload::Command(short_id) => write!(f, "{COMMAND_PREFIX}:{short_id}"),
            CallbackPayload::ManualEntry => write!(f, "{COMMAND_PREFIX}:{MANUAL_MARKER}"),
        }
    }
}

impl FromStr for CallbackPayload {
    type Err = PayloadError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.len() > MAX_CALLBACK_BYTES {
            return Err(PayloadError::TooLong { len: raw.len() });
        }
        let (prefix, value) = raw.split_once(':').ok_or_else(|| PayloadError::malformed(raw))?;
        match prefix {
            SERVER_PREFIX => value
                .parse::<i64>()
                .map(|id| CallbackPayload::Server(ServerId(id)))
                .map_err(|_| PayloadError::malformed(raw)),
            PAGE_PREFIX => value.parse::<usize>().map(CallbackPayload::Page).map_err(|_| PayloadError::malformed(raw)),
            COMMAND_PREFIX if value == MANUAL_MARKER => Ok(CallbackPayload::ManualEntry),
            COMMAND_PREFIX => value
                .parse::<ShortId>()
                .map(CallbackPayload::Command)
                .map_err(|_| PayloadError::malformed(raw)),
            _ => Err(PayloadError::UnknownPrefix { prefix: prefix.to_string() }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("callback payload is {len} bytes, above the 64-byte limit")]
    TooLong { len: usize },

    #[error("malformed callback payload '{raw}'")]
    Malformed { raw: String },

    #[error("unknown callback prefix '{prefix}'")]
    UnknownPrefix { prefix: String },
}

impl PayloadError {
    fn malformed(raw: &str) -> Self {
        Self::Malformed { raw: raw.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_use_short_prefixes() {
        assert_eq!(CallbackPayload::Server(ServerId(12)).pack(), "srv:12");
        assert_eq!(CallbackPayload::Page(3).pack(), "page:3");
        assert_eq!(CallbackPayload::ManualEntry.pack(), "cmd:manual");
        let short_id = ShortId::for_command("systemctl restart a-service-with-a-rather-long-unit-name.service");
        assert_eq!(CallbackPayload::Command(short_id.clone()).pack(), format!("cmd:{short_id}"));
    }

    #[test]
    fn largest_server_id_fits_the_budget() {
        assert!(CallbackPayload::Server(ServerId(i64::MIN)).pack().len() <= MAX_CALLBACK_BYTES);
        assert!(CallbackPayload::Page(usize::MAX).pack().len() <= MAX_CALLBACK_BYTES);
    }

    #[test]
    fn unpack_maps_buttons_to_session_events() {
        let short_id = ShortId::for_command("uptime");
        let event = CallbackPayload::unpack(&format!("cmd:{short_id}")).unwrap().into_event();
        assert_eq!(event, SessionEvent::ChooseCommand { short_id });
        assert_eq!(
            CallbackPayload::unpack("srv:4").unwrap().into_event(),
            SessionEvent::ChooseServer { server_id: ServerId(4) }
        );
        assert_eq!(CallbackPayload::unpack("cmd:manual").unwrap().into_event(), SessionEvent::RequestManualEntry);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(CallbackPayload::unpack("srv"), Err(PayloadError::Malformed { .. })));
        assert!(matches!(CallbackPayload::unpack("srv:abc"), Err(PayloadError::Malformed { .. })));
        assert!(matches!(CallbackPayload::unpack("cmd:uptime"), Err(PayloadError::Malformed { .. })));
        assert!(matches!(CallbackPayload::unpack("location:1"), Err(PayloadError::UnknownPrefix { .. })));
        assert!(matches!(
            CallbackPayload::unpack(&"x".repeat(MAX_CALLBACK_BYTES + 1)),
            Err(PayloadError::TooLong { .. })
        ));
    }
}
