//! Per-app object store with CRUD operations and event propagation.
//!
//! Each app's state is a JSON map keyed by object type; object collections
//! are arrays of objects carrying system fields `id`, `created_at` and
//! (after the first update) `updated_at`. Every app gets its own lock.
//!
//! Events are dispatched after the app lock is released and before the
//! mutating call returns, so a listener may call back into the store.

use crate::clock::{self, Clock};
use crate::error::{Result, UniverseError};
use chrono::SecondsFormat;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type Object = serde_json::Map<String, Value>;

/// Scope used for events that do not belong to a single app.
pub const GLOBAL_SCOPE: &str = "global";

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Delete,
    StateChange,
    StateUpdate,
    StateCleared,
    SharedObjectCreated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::StateChange => "state_change",
            EventKind::StateUpdate => "state_update",
            EventKind::StateCleared => "state_cleared",
            EventKind::SharedObjectCreated => "shared_object_created",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateEvent {
    pub app: String,
    pub kind: EventKind,
    pub data: Value,
}

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Advisory callback. Errors and panics are logged and swallowed.
pub type Listener = Arc<dyn Fn(&StateEvent) -> std::result::Result<(), ListenerError> + Send + Sync>;

fn subscription_key(app: &str, kind: EventKind) -> String {
    format!("{app}:{}", kind.as_str())
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

pub struct StateStore {
    apps: RwLock<HashMap<String, Arc<Mutex<Object>>>>,
    shared: RwLock<HashMap<String, Value>>,
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    events: broadcast::Sender<StateEvent>,
    clock: Arc<dyn Clock>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            apps: RwLock::new(HashMap::new()),
            shared: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            events,
            clock: clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn app(&self, app_name: &str) -> Option<Arc<Mutex<Object>>> {
        self.apps.read().get(app_name).cloned()
    }

    fn app_or_create(&self, app_name: &str) -> Arc<Mutex<Object>> {
        if let Some(app) = self.app(app_name) {
            return app;
        }
        let mut apps = self.apps.write();
        Arc::clone(apps.entry(app_name.to_string()).or_default())
    }

    fn timestamp(&self) -> String {
        self.clock.now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// Append a new object to `object_type` and return its fresh id.
    ///
    /// `id` and `created_at` in `fields` are ignored.
    pub fn create_object(&self, app_name: &str, object_type: &str, fields: Object) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let mut obj = fields;
        obj.insert("id".into(), Value::String(id.clone()));
        obj.insert("created_at".into(), Value::String(self.timestamp()));

        {
            let app = self.app_or_create(app_name);
            let mut state = app.lock();
            let collection = state
                .entry(object_type.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            let Value::Array(items) = collection else {
                return Err(UniverseError::NotACollection(object_type.to_string()));
            };
            items.push(Value::Object(obj));
        }

        self.emit(
            app_name,
            EventKind::Create,
            json!({ "type": object_type, "id": id }),
        );
        Ok(id)
    }

    /// A copy of the object; mutating it never touches stored state.
    pub fn read_object(&self, app_name: &str, object_type: &str, id: &str) -> Option<Object> {
        let app = self.app(app_name)?;
        let state = app.lock();
        collection(&state, object_type)?
            .iter()
            .filter_map(Value::as_object)
            .find(|obj| has_id(obj, id))
            .cloned()
    }

    /// Merge `updates` into an existing object and stamp `updated_at`.
    ///
    /// Returns false when the object does not exist. `id` and `created_at`
    /// in `updates` are ignored.
    pub fn update_object(&self, app_name: &str, object_type: &str, id: &str, updates: Object) -> bool {
        let Some(app) = self.app(app_name) else {
            return false;
        };
        let stamp = self.timestamp();
        {
            let mut state = app.lock();
            let Some(Value::Array(items)) = state.get_mut(object_type) else {
                return false;
            };
            let Some(obj) = items
                .iter_mut()
                .filter_map(Value::as_object_mut)
                .find(|obj| has_id(obj, id))
            else {
                return false;
            };
            for (key, value) in updates {
                if key == "id" || key == "created_at" {
                    continue;
                }
                obj.insert(key, value);
            }
            obj.insert("updated_at".into(), Value::String(stamp));
        }

        self.emit(
            app_name,
            EventKind::Update,
            json!({ "type": object_type, "id": id }),
        );
        true
    }

    pub fn delete_object(&self, app_name: &str, object_type: &str, id: &str) -> bool {
        let Some(app) = self.app(app_name) else {
            return false;
        };
        {
            let mut state = app.lock();
            let Some(Value::Array(items)) = state.get_mut(object_type) else {
                return false;
            };
            let Some(pos) = items
                .iter()
                .position(|v| v.as_object().is_some_and(|obj| has_id(obj, id)))
            else {
                return false;
            };
            items.remove(pos);
        }

        self.emit(
            app_name,
            EventKind::Delete,
            json!({ "type": object_type, "id": id }),
        );
        true
    }

    /// The first `limit` objects of a collection plus the total count.
    pub fn list_objects(&self, app_name: &str, object_type: &str, limit: usize) -> (Vec<Object>, usize) {
        let Some(app) = self.app(app_name) else {
            return (Vec::new(), 0);
        };
        let state = app.lock();
        let Some(items) = collection(&state, object_type) else {
            return (Vec::new(), 0);
        };
        let objects = items
            .iter()
            .filter_map(Value::as_object)
            .take(limit)
            .cloned()
            .collect();
        (objects, items.len())
    }

    // -----------------------------------------------------------------------
    // Whole-app state
    // -----------------------------------------------------------------------

    /// Snapshot of every key in the app's state.
    pub fn get_app_state(&self, app_name: &str) -> Object {
        self.app(app_name)
            .map(|app| app.lock().clone())
            .unwrap_or_default()
    }

    pub fn has_app_state(&self, app_name: &str) -> bool {
        self.app(app_name).is_some_and(|app| !app.lock().is_empty())
    }

    pub fn set_app_state(&self, app_name: &str, key: &str, value: Value) {
        self.app_or_create(app_name)
            .lock()
            .insert(key.to_string(), value.clone());
        self.emit(
            app_name,
            EventKind::StateChange,
            json!({ "key": key, "value": value }),
        );
    }

    pub fn update_app_state(&self, app_name: &str, updates: Object) {
        {
            let app = self.app_or_create(app_name);
            let mut state = app.lock();
            for (key, value) in &updates {
                state.insert(key.clone(), value.clone());
            }
        }
        self.emit(app_name, EventKind::StateUpdate, Value::Object(updates));
    }

    /// Drop every collection for `app_name`. Returns false if there was
    /// nothing to clear.
    pub fn clear_app_state(&self, app_name: &str) -> bool {
        let removed = self.apps.write().remove(app_name).is_some();
        if removed {
            self.emit(app_name, EventKind::StateCleared, json!({}));
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Shared objects
    // -----------------------------------------------------------------------

    pub fn create_shared_object(&self, key: &str, value: Value) {
        self.shared.write().insert(key.to_string(), value);
        self.emit(
            GLOBAL_SCOPE,
            EventKind::SharedObjectCreated,
            json!({ "key": key }),
        );
    }

    pub fn get_shared_object(&self, key: &str) -> Option<Value> {
        self.shared.read().get(key).cloned()
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn subscribe<F>(&self, app_name: &str, kind: EventKind, listener: F)
    where
        F: Fn(&StateEvent) -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(subscription_key(app_name, kind))
            .or_default()
            .push(Arc::new(listener));
    }

    /// Receiver for every event the store emits, across all apps.
    pub fn events(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    fn emit(&self, app_name: &str, kind: EventKind, data: Value) {
        let event = StateEvent {
            app: app_name.to_string(),
            kind,
            data,
        };

        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .get(&subscription_key(app_name, kind))
            .cloned()
            .unwrap_or_default();

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(app = %event.app, event = %kind, error = %e, "event listener failed");
                }
                Err(_) => {
                    tracing::warn!(app = %event.app, event = %kind, "event listener panicked");
                }
            }
        }

        // No receivers is not an error.
        let _ = self.events.send(event);
    }
}

fn collection<'a>(state: &'a Object, object_type: &str) -> Option<&'a Vec<Value>> {
    state.get(object_type)?.as_array()
}

fn has_id(obj: &Object, id: &str) -> bool {
    obj.get("id").and_then(Value::as_str) == Some(id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
