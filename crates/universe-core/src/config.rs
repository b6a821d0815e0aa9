use crate::app::RateLimitProfile;
use crate::chaos::{FaultProfile, MAX_CHAOS_LEVEL, MAX_FAULT_PROBABILITY};
use crate::error::{Result, UniverseError};
use crate::types::FaultKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// FaultProbabilities
// ---------------------------------------------------------------------------

/// The baseline probability table, one field per fault kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultProbabilities {
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "default_auth_expired")]
    pub auth_expired: f64,
    #[serde(default = "default_network_unreachable")]
    pub network_unreachable: f64,
    #[serde(default = "default_schema_error")]
    pub schema_error: f64,
    #[serde(default = "default_partial_failure")]
    pub partial_failure: f64,
    #[serde(default = "default_data_inconsistency")]
    pub data_inconsistency: f64,
    #[serde(default = "default_invalid_input")]
    pub invalid_input: f64,
    #[serde(default = "default_server_error")]
    pub server_error: f64,
}

fn default_rate_limit() -> f64 {
    FaultKind::RateLimit.baseline_probability()
}

fn default_auth_expired() -> f64 {
    FaultKind::AuthExpired.baseline_probability()
}

fn default_network_unreachable() -> f64 {
    FaultKind::NetworkUnreachable.baseline_probability()
}

fn default_schema_error() -> f64 {
    FaultKind::SchemaError.baseline_probability()
}

fn default_partial_failure() -> f64 {
    FaultKind::PartialFailure.baseline_probability()
}

fn default_data_inconsistency() -> f64 {
    FaultKind::DataInconsistency.baseline_probability()
}

fn default_invalid_input() -> f64 {
    FaultKind::InvalidInput.baseline_probability()
}

fn default_server_error() -> f64 {
    FaultKind::ServerError.baseline_probability()
}

impl Default for FaultProbabilities {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            auth_expired: default_auth_expired(),
            network_unreachable: default_network_unreachable(),
            schema_error: default_schema_error(),
            partial_failure: default_partial_failure(),
            data_inconsistency: default_data_inconsistency(),
            invalid_input: default_invalid_input(),
            server_error: default_server_error(),
        }
    }
}

impl FaultProbabilities {
    /// Entries in the engine's scan order.
    pub fn pairs(&self) -> [(FaultKind, f64); 8] {
        [
            (FaultKind::RateLimit, self.rate_limit),
            (FaultKind::AuthExpired, self.auth_expired),
            (FaultKind::NetworkUnreachable, self.network_unreachable),
            (FaultKind::SchemaError, self.schema_error),
            (FaultKind::PartialFailure, self.partial_failure),
            (FaultKind::DataInconsistency, self.data_inconsistency),
            (FaultKind::InvalidInput, self.invalid_input),
            (FaultKind::ServerError, self.server_error),
        ]
    }

    pub fn to_profile(&self) -> FaultProfile {
        FaultProfile::from_pairs(&self.pairs())
    }
}

// ---------------------------------------------------------------------------
// ChaosConfig / AppOverride
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosConfig {
    #[serde(default = "default_chaos_level")]
    pub level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub profile: FaultProbabilities,
}

fn default_chaos_level() -> f64 {
    1.0
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            level: default_chaos_level(),
            seed: None,
            profile: FaultProbabilities::default(),
        }
    }
}

/// Per-app settings that win over the app definition when it is attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<RateLimitProfile>,
}

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub chaos: ChaosConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub apps: BTreeMap<String, AppOverride>,
}

fn default_version() -> u32 {
    1
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            chaos: ChaosConfig::default(),
            apps: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&data)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::io::atomic_write(path, self.to_yaml()?.as_bytes())
    }

    pub fn override_for(&self, app_name: &str) -> Option<&AppOverride> {
        self.apps.get(app_name)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !(0.0..=MAX_CHAOS_LEVEL).contains(&self.chaos.level) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "chaos.level {} is outside [0, {MAX_CHAOS_LEVEL}] and will be clamped",
                    self.chaos.level
                ),
            });
        }

        for (kind, p) in self.chaos.profile.pairs() {
            if !(0.0..=1.0).contains(&p) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("chaos.profile.{kind} = {p} is not a probability"),
                });
            }
        }

        // Chance that at least one probabilistic fault fires on a call.
        let level = self.chaos.level.clamp(0.0, MAX_CHAOS_LEVEL);
        let survive: f64 = self
            .chaos
            .profile
            .pairs()
            .iter()
            .map(|(_, p)| 1.0 - (p.clamp(0.0, 1.0) * level).min(MAX_FAULT_PROBABILITY))
            .product();
        if 1.0 - survive > 0.5 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "more than half of all calls will fail ({:.0}% fault rate)",
                    (1.0 - survive) * 100.0
                ),
            });
        }

        for (name, ov) in &self.apps {
            if let Some(limits) = ov.rate_limits {
                if limits.requests_per_min == 0 || limits.burst_limit == 0 {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("apps.{name}.rate_limits must be at least 1"),
                    });
                } else if limits.burst_limit > limits.requests_per_min {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "apps.{name}.rate_limits burst_limit {} exceeds requests_per_min {}",
                            limits.burst_limit, limits.requests_per_min
                        ),
                    });
                }
            }
        }

        warnings
    }

    /// Fail on the first `Error`-level finding.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(UniverseError::InvalidConfig(w.message)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
