use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// OAuth handshake data structures.
pub mod auth;
/// Health check data structures.
pub mod health;
/// Room and player snapshot data structures.
pub mod room;
/// Request validation utilities.
pub mod validation;
/// WebSocket message data structures.
pub mod ws;

/// Formats a SystemTime as an RFC3339 timestamp string.
pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
