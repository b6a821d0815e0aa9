use crate::fault::ErrorInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The uniform shape every action execution returns.
///
/// All four members are always serialized, `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<ErrorInfo>,
    pub latency_ms: Option<u64>,
}

impl ResultEnvelope {
    pub fn ok(result: Value, latency_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn err(error: ErrorInfo) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            latency_ms: None,
        }
    }

    pub fn error_type(&self) -> Option<&'static str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use serde_json::json;

    #[test]
    fn failure_serializes_every_member() {
        let env = ResultEnvelope::err(ErrorInfo::new(
            ErrorKind::ActionNotFound,
            "Action 'x' not found in app 'y'",
            json!({}),
        ));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["result"].is_null());
        assert!(json["latency_ms"].is_null());
        assert_eq!(json["error"]["type"], "action_not_found");
        assert!(json["error"]["retry_after"].is_null());
    }

    #[test]
    fn success_carries_latency() {
        let env = ResultEnvelope::ok(json!({ "id": "1" }), 120);
        assert!(env.success);
        assert_eq!(env.latency_ms, Some(120));
        assert!(env.error_type().is_none());
    }
}
