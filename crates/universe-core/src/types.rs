use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// FaultKind
// ---------------------------------------------------------------------------

/// A simulated failure injected instead of normal execution.
///
/// The declaration order is the scan order of the probability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    RateLimit,
    AuthExpired,
    NetworkUnreachable,
    SchemaError,
    PartialFailure,
    DataInconsistency,
    InvalidInput,
    ServerError,
}

impl FaultKind {
    pub fn all() -> &'static [FaultKind] {
        &[
            FaultKind::RateLimit,
            FaultKind::AuthExpired,
            FaultKind::NetworkUnreachable,
            FaultKind::SchemaError,
            FaultKind::PartialFailure,
            FaultKind::DataInconsistency,
            FaultKind::InvalidInput,
            FaultKind::ServerError,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::RateLimit => "rate_limit",
            FaultKind::AuthExpired => "auth_expired",
            FaultKind::NetworkUnreachable => "network_unreachable",
            FaultKind::SchemaError => "schema_error",
            FaultKind::PartialFailure => "partial_failure",
            FaultKind::DataInconsistency => "data_inconsistency",
            FaultKind::InvalidInput => "invalid_input",
            FaultKind::ServerError => "server_error",
        }
    }

    /// Probability used when no chaos level or profile override is applied.
    pub fn baseline_probability(self) -> f64 {
        match self {
            FaultKind::RateLimit => 0.05,
            FaultKind::AuthExpired => 0.02,
            FaultKind::NetworkUnreachable => 0.03,
            FaultKind::SchemaError => 0.08,
            FaultKind::PartialFailure => 0.04,
            FaultKind::DataInconsistency => 0.02,
            FaultKind::InvalidInput => 0.10,
            FaultKind::ServerError => 0.02,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FaultKind {
    type Err = crate::error::UniverseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FaultKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| crate::error::UniverseError::InvalidConfig(format!("unknown fault kind: {s}")))
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Every `error.type` a result envelope can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ActionNotFound,
    RateLimit,
    AuthExpired,
    NetworkUnreachable,
    SchemaError,
    PartialFailure,
    DataInconsistency,
    InvalidInput,
    ServerError,
    ExecutionError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ActionNotFound => "action_not_found",
            ErrorKind::ExecutionError => "execution_error",
            ErrorKind::RateLimit => FaultKind::RateLimit.as_str(),
            ErrorKind::AuthExpired => FaultKind::AuthExpired.as_str(),
            ErrorKind::NetworkUnreachable => FaultKind::NetworkUnreachable.as_str(),
            ErrorKind::SchemaError => FaultKind::SchemaError.as_str(),
            ErrorKind::PartialFailure => FaultKind::PartialFailure.as_str(),
            ErrorKind::DataInconsistency => FaultKind::DataInconsistency.as_str(),
            ErrorKind::InvalidInput => FaultKind::InvalidInput.as_str(),
            ErrorKind::ServerError => FaultKind::ServerError.as_str(),
        }
    }

    /// Whether a caller may retry the same payload after waiting or after
    /// external remediation.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorKind::ActionNotFound | ErrorKind::SchemaError | ErrorKind::ExecutionError
        )
    }
}

impl From<FaultKind> for ErrorKind {
    fn from(kind: FaultKind) -> Self {
        match kind {
            FaultKind::RateLimit => ErrorKind::RateLimit,
            FaultKind::AuthExpired => ErrorKind::AuthExpired,
            FaultKind::NetworkUnreachable => ErrorKind::NetworkUnreachable,
            FaultKind::SchemaError => ErrorKind::SchemaError,
            FaultKind::PartialFailure => ErrorKind::PartialFailure,
            FaultKind::DataInconsistency => ErrorKind::DataInconsistency,
            FaultKind::InvalidInput => ErrorKind::InvalidInput,
            FaultKind::ServerError => ErrorKind::ServerError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AppCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppCategory {
    Email,
    Storage,
    Productivity,
    Crm,
    Finance,
    DeveloperTools,
    Messaging,
    Calendar,
    Operations,
    FileProcessing,
}

impl AppCategory {
    pub fn all() -> &'static [AppCategory] {
        &[
            AppCategory::Email,
            AppCategory::Storage,
            AppCategory::Productivity,
            AppCategory::Crm,
            AppCategory::Finance,
            AppCategory::DeveloperTools,
            AppCategory::Messaging,
            AppCategory::Calendar,
            AppCategory::Operations,
            AppCategory::FileProcessing,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppCategory::Email => "email",
            AppCategory::Storage => "storage",
            AppCategory::Productivity => "productivity",
            AppCategory::Crm => "crm",
            AppCategory::Finance => "finance",
            AppCategory::DeveloperTools => "developer_tools",
            AppCategory::Messaging => "messaging",
            AppCategory::Calendar => "calendar",
            AppCategory::Operations => "operations",
            AppCategory::FileProcessing => "file_processing",
        }
    }

    /// Typical `(requests_per_min, burst_limit)` for apps of this kind.
    pub fn default_rate_limits(self) -> (u32, u32) {
        match self {
            AppCategory::Email => (60, 10),
            AppCategory::Storage => (100, 20),
            AppCategory::Productivity => (120, 15),
            AppCategory::Crm => (200, 30),
            AppCategory::Finance => (30, 5),
            AppCategory::DeveloperTools => (300, 50),
            AppCategory::Messaging => (180, 25),
            AppCategory::Calendar => (100, 15),
            AppCategory::Operations => (150, 20),
            AppCategory::FileProcessing => (80, 12),
        }
    }
}

impl fmt::Display for AppCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppCategory {
    type Err = crate::error::UniverseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppCategory::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| crate::error::UniverseError::InvalidConfig(format!("unknown app category: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_kind_order_is_stable() {
        let names: Vec<&str> = FaultKind::all().iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            [
                "rate_limit",
                "auth_expired",
                "network_unreachable",
                "schema_error",
                "partial_failure",
                "data_inconsistency",
                "invalid_input",
                "server_error",
            ]
        );
    }

    #[test]
    fn fault_kind_from_str() {
        assert_eq!("server_error".parse::<FaultKind>().unwrap(), FaultKind::ServerError);
        assert!("auth_error".parse::<FaultKind>().is_err());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ActionNotFound).unwrap();
        assert_eq!(json, "\"action_not_found\"");
        assert_eq!(ErrorKind::from(FaultKind::RateLimit).as_str(), "rate_limit");
    }

    #[test]
    fn category_parses_from_its_name() {
        for category in AppCategory::all() {
            assert_eq!(category.as_str().parse::<AppCategory>().unwrap(), *category);
        }
        assert!("gaming".parse::<AppCategory>().is_err());
    }

    #[test]
    fn retryable_classification() {
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::AuthExpired.is_retryable());
        assert!(!ErrorKind::SchemaError.is_retryable());
        assert!(!ErrorKind::ActionNotFound.is_retryable());
    }
}
