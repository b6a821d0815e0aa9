//! App and action definitions.
//!
//! These are supplied by whatever loads the universe (see `catalog`) and are
//! read-only once loaded. The runtime only ever borrows them.

use crate::error::{Result, UniverseError};
use crate::types::{AppCategory, FaultKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// RateLimitProfile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitProfile {
    /// Calls allowed in the trailing 60 second window.
    pub requests_per_min: u32,
    /// Calls allowed in the trailing 10 second window.
    pub burst_limit: u32,
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// e.g. "send_email", "create_task"
    pub name: String,
    pub inputs_schema: serde_json::Value,
    pub outputs_schema: serde_json::Value,
    #[serde(default)]
    pub side_effects: Vec<String>,
    #[serde(default)]
    pub errors: Vec<FaultKind>,
    /// `[min_ms, max_ms]`, inclusive.
    #[serde(default = "default_latency_range")]
    pub latency_range_ms: (u64, u64),
}

fn default_latency_range() -> (u64, u64) {
    (50, 400)
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs_schema: serde_json::json!({ "type": "object" }),
            outputs_schema: serde_json::json!({ "type": "object" }),
            side_effects: Vec::new(),
            errors: Vec::new(),
            latency_range_ms: default_latency_range(),
        }
    }

    pub fn with_inputs(mut self, schema: serde_json::Value) -> Self {
        self.inputs_schema = schema;
        self
    }

    pub fn with_outputs(mut self, schema: serde_json::Value) -> Self {
        self.outputs_schema = schema;
        self
    }

    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_range_ms = (min_ms, max_ms);
        self
    }

    pub fn with_side_effects(mut self, effects: &[&str]) -> Self {
        self.side_effects = effects.iter().map(|s| s.to_string()).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub category: AppCategory,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDefinition {
    /// Seeded into the app's state the first time it is attached.
    #[serde(default)]
    pub initial_state: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub state_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub metadata: AppMetadata,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub rate_limits: RateLimitProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_definition: Option<StateDefinition>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl App {
    /// Rate limits start at the category's typical values.
    pub fn new(name: impl Into<String>, category: AppCategory, description: impl Into<String>) -> Self {
        let (requests_per_min, burst_limit) = category.default_rate_limits();
        Self {
            metadata: AppMetadata {
                name: name.into(),
                category,
                description: description.into(),
            },
            actions: Vec::new(),
            rate_limits: RateLimitProfile {
                requests_per_min,
                burst_limit,
            },
            state_definition: None,
            version: default_version(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_rate_limits(mut self, requests_per_min: u32, burst_limit: u32) -> Self {
        self.rate_limits = RateLimitProfile {
            requests_per_min,
            burst_limit,
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn get_action(&self, action_name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == action_name)
    }

    /// Check the invariants the runtime relies on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| UniverseError::InvalidApp {
            app: self.metadata.name.clone(),
            reason,
        };

        if self.metadata.name.trim().is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        if self.rate_limits.requests_per_min == 0 || self.rate_limits.burst_limit == 0 {
            return Err(invalid("rate limits must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.name.as_str()) {
                return Err(invalid(format!("duplicate action '{}'", action.name)));
            }
            let (min, max) = action.latency_range_ms;
            if min > max {
                return Err(invalid(format!(
                    "action '{}' latency range [{min}, {max}] is inverted",
                    action.name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
