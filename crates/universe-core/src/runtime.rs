//! The execution orchestrator.
//!
//! `Runtime::execute_action` is the single call surface for driving a
//! synthetic app. It owns no app definitions; callers pass the `App` in.
//! Every failure, simulated or real, comes back inside a `ResultEnvelope`.

use crate::app::App;
use crate::chaos::{ChaosEngine, FaultProfile};
use crate::config::{AppOverride, RuntimeConfig};
use crate::dispatch::{ActionHandler, CrudHandler, HandlerContext};
use crate::envelope::ResultEnvelope;
use crate::fault::ErrorInfo;
use crate::schema::{Direction, SchemaValidator};
use crate::state::StateStore;
use crate::types::ErrorKind;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct Runtime {
    chaos: Arc<ChaosEngine>,
    store: Arc<StateStore>,
    validator: SchemaValidator,
    handlers: RwLock<HashMap<(String, String), Arc<dyn ActionHandler>>>,
    fallback: CrudHandler,
    overrides: HashMap<String, AppOverride>,
    latency_rng: Mutex<StdRng>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(ChaosEngine::new()), Arc::new(StateStore::new()))
    }
}

impl Runtime {
    pub fn new(chaos: Arc<ChaosEngine>, store: Arc<StateStore>) -> Self {
        Self {
            chaos,
            store,
            validator: SchemaValidator::new(),
            handlers: RwLock::new(HashMap::new()),
            fallback: CrudHandler,
            overrides: HashMap::new(),
            latency_rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seed the latency draws. The chaos engine is seeded separately.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.latency_rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        let mut chaos = ChaosEngine::new().with_baseline(config.chaos.profile.to_profile());
        if let Some(seed) = config.chaos.seed {
            chaos = chaos.with_seed(seed);
        }
        chaos.set_chaos_level(config.chaos.level);

        let mut runtime = Self::new(Arc::new(chaos), Arc::new(StateStore::new()));
        if let Some(seed) = config.chaos.seed {
            runtime = runtime.with_seed(seed);
        }
        runtime.overrides = config
            .apps
            .iter()
            .map(|(name, ov)| (name.clone(), ov.clone()))
            .collect();
        for (name, ov) in &runtime.overrides {
            runtime.apply_override(name, ov);
        }
        runtime
    }

    pub fn chaos(&self) -> &Arc<ChaosEngine> {
        &self.chaos
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Bring an app online: its rate profile, healthy auth and network, and
    /// its initial state when the store holds nothing for it yet. Config
    /// overrides for the app are applied last.
    pub fn attach(&self, app: &App) {
        let name = app.name();
        self.chaos.configure(
            name,
            app.rate_limits.requests_per_min,
            app.rate_limits.burst_limit,
        );
        self.chaos.set_auth_state(name, true);
        self.chaos.set_network_state(name, true);

        if let Some(def) = &app.state_definition {
            if !def.initial_state.is_empty() && !self.store.has_app_state(name) {
                self.store.update_app_state(name, def.initial_state.clone());
            }
        }
        if let Some(ov) = self.overrides.get(name) {
            self.apply_override(name, ov);
        }
        debug!(app = name, actions = app.actions.len(), "attached app");
    }

    fn apply_override(&self, app_name: &str, ov: &AppOverride) {
        if let Some(limits) = ov.rate_limits {
            self.chaos
                .configure(app_name, limits.requests_per_min, limits.burst_limit);
        }
        if let Some(authenticated) = ov.authenticated {
            self.chaos.set_auth_state(app_name, authenticated);
        }
        if let Some(available) = ov.network_available {
            self.chaos.set_network_state(app_name, available);
        }
    }

    /// Route `action_name` of `app_name` to `handler` instead of the CRUD
    /// inference.
    pub fn register_handler(
        &self,
        app_name: &str,
        action_name: &str,
        handler: Arc<dyn ActionHandler>,
    ) {
        self.handlers
            .write()
            .insert((app_name.to_string(), action_name.to_string()), handler);
    }

    fn handler_for(&self, app_name: &str, action_name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .read()
            .get(&(app_name.to_string(), action_name.to_string()))
            .cloned()
    }

    fn draw_latency(&self, min_ms: u64, max_ms: u64) -> u64 {
        let (lo, hi) = (min_ms.min(max_ms), min_ms.max(max_ms));
        self.latency_rng.lock().gen_range(lo..=hi)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    pub async fn execute_action(&self, app: &App, action_name: &str, inputs: Value) -> ResultEnvelope {
        let app_name = app.name();

        let Some(action) = app.get_action(action_name) else {
            return ResultEnvelope::err(ErrorInfo::new(
                ErrorKind::ActionNotFound,
                format!("Action '{action_name}' not found in app '{app_name}'"),
                json!({ "app": app_name, "action": action_name }),
            ));
        };

        self.chaos.record_request(app_name);

        let (min_ms, max_ms) = action.latency_range_ms;
        let latency_ms = self.draw_latency(min_ms, max_ms);
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        if let Some(fault) = self.chaos.decide(app_name, action_name) {
            debug!(app = app_name, action = action_name, kind = %fault.kind, "injected fault");
            return ResultEnvelope::err(fault.into());
        }

        match self.validator.validate(
            app_name,
            action_name,
            Direction::Input,
            &action.inputs_schema,
            &inputs,
        ) {
            Ok(Ok(())) => {}
            Ok(Err(violation)) => {
                return ResultEnvelope::err(ErrorInfo::new(
                    ErrorKind::SchemaError,
                    format!("Invalid input schema: {}", violation.message),
                    violation.details(),
                ));
            }
            Err(e) => {
                return ResultEnvelope::err(ErrorInfo::new(
                    ErrorKind::SchemaError,
                    format!("Invalid input schema: {e}"),
                    json!({ "validation_error": e.to_string() }),
                ));
            }
        }

        let result = match self.dispatch(app_name, action_name, inputs) {
            Ok(result) => result,
            Err(reason) => {
                return ResultEnvelope::err(ErrorInfo::new(
                    ErrorKind::ExecutionError,
                    format!("Action execution failed: {reason}"),
                    json!({ "exception": reason }),
                ));
            }
        };

        match self.validator.validate(
            app_name,
            action_name,
            Direction::Output,
            &action.outputs_schema,
            &result,
        ) {
            Ok(Ok(())) => {}
            Ok(Err(violation)) => {
                warn!(app = app_name, action = action_name, error = %violation.message, "output schema mismatch");
            }
            Err(e) => {
                warn!(app = app_name, action = action_name, error = %e, "output schema unusable");
            }
        }

        debug!(app = app_name, action = action_name, latency_ms, "action executed");
        ResultEnvelope::ok(result, latency_ms)
    }

    /// Run the handler, turning both errors and panics into a message.
    fn dispatch(&self, app_name: &str, action_name: &str, inputs: Value) -> Result<Value, String> {
        let ctx = HandlerContext {
            app_name,
            action_name,
            store: &self.store,
        };
        let handler = self.handler_for(app_name, action_name);
        let outcome = catch_unwind(AssertUnwindSafe(|| match &handler {
            Some(h) => h.handle(&ctx, inputs),
            None => self.fallback.handle(&ctx, inputs),
        }));
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("handler panicked".to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Admin hooks
    // -----------------------------------------------------------------------

    pub fn configure_rate_limit(&self, app_name: &str, requests_per_min: u32, burst_limit: u32) {
        self.chaos.configure(app_name, requests_per_min, burst_limit);
    }

    pub fn set_auth_state(&self, app_name: &str, authenticated: bool) {
        self.chaos.set_auth_state(app_name, authenticated);
    }

    pub fn set_network_state(&self, app_name: &str, available: bool) {
        self.chaos.set_network_state(app_name, available);
    }

    pub fn set_chaos_level(&self, level: f64) {
        self.chaos.set_chaos_level(level);
    }

    pub fn fault_profile(&self) -> FaultProfile {
        self.chaos.fault_profile()
    }

    pub fn clear_app_state(&self, app_name: &str) -> bool {
        self.store.clear_app_state(app_name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
