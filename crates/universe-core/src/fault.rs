//! Fault payloads.
//!
//! Each `FaultKind` has a fixed message and detail template. Callers read
//! `retry_after` off the payload and never need to know which kinds set it.

use crate::types::{ErrorKind, FaultKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Fixed backoff hint attached to every `server_error`.
pub const SERVER_ERROR_RETRY_AFTER_SECS: u64 = 5;

/// Fallback hint for a rate-limit fault when the request log is empty.
pub const RATE_LIMIT_FALLBACK_RETRY_AFTER_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Fault
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    #[serde(rename = "type")]
    pub kind: FaultKind,
    pub message: String,
    pub details: Value,
    pub retry_after: Option<u64>,
}

impl Fault {
    /// Build the fixed payload for `kind`.
    ///
    /// Rate-limit faults built here carry the fallback hint and no limit;
    /// the engine uses `rate_limited` when it knows the window.
    pub fn template(kind: FaultKind, app: &str, action: &str) -> Self {
        let (message, details, retry_after) = match kind {
            FaultKind::NetworkUnreachable => (
                "Network unreachable",
                json!({ "app": app, "action": action }),
                None,
            ),
            FaultKind::AuthExpired => (
                "Authentication expired",
                json!({ "app": app, "action": action }),
                None,
            ),
            FaultKind::RateLimit => {
                return Self::rate_limited(app, action, None, RATE_LIMIT_FALLBACK_RETRY_AFTER_SECS)
            }
            FaultKind::SchemaError => (
                "Invalid input schema",
                json!({ "app": app, "action": action, "field": "unknown", "expected": "string" }),
                None,
            ),
            FaultKind::PartialFailure => (
                "Partial failure in operation",
                json!({ "app": app, "action": action, "succeeded_items": 3, "failed_items": 2 }),
                None,
            ),
            FaultKind::DataInconsistency => (
                "Data inconsistency detected",
                json!({ "app": app, "action": action, "conflict_id": "12345" }),
                None,
            ),
            FaultKind::InvalidInput => (
                "Invalid input provided",
                json!({
                    "app": app,
                    "action": action,
                    "validation_errors": ["field 'email' is required"]
                }),
                None,
            ),
            FaultKind::ServerError => (
                "Internal server error",
                json!({ "app": app, "action": action, "error_code": "500" }),
                Some(SERVER_ERROR_RETRY_AFTER_SECS),
            ),
        };
        Self {
            kind,
            message: message.to_string(),
            details,
            retry_after,
        }
    }

    pub fn rate_limited(app: &str, action: &str, limit: Option<u32>, retry_after: u64) -> Self {
        Self {
            kind: FaultKind::RateLimit,
            message: "Rate limit exceeded".to_string(),
            details: json!({ "app": app, "action": action, "limit": limit }),
            retry_after: Some(retry_after),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorInfo
// ---------------------------------------------------------------------------

/// The `error` member of a result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub retry_after: Option<u64>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>, details: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            details,
            retry_after: None,
        }
    }
}

impl From<Fault> for ErrorInfo {
    fn from(fault: Fault) -> Self {
        Self {
            kind: fault.kind.into(),
            message: fault.message,
            details: fault.details,
            retry_after: fault.retry_after,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
