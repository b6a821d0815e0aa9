//! Read-only collection of app definitions.
//!
//! Definitions live on disk as `<apps_dir>/<snake_name>/definition.json`.
//! A handful of hand-crafted apps ship built in for demos and tests.

use crate::app::{Action, App, StateDefinition};
use crate::error::{Result, UniverseError};
use crate::io;
use crate::paths;
use crate::types::AppCategory;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct AppCatalog {
    apps: BTreeMap<String, App>,
}

impl AppCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `app` and adds it, replacing any app with the same name.
    pub fn insert(&mut self, app: App) -> Result<()> {
        app.validate()?;
        self.apps.insert(app.name().to_string(), app);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&App> {
        self.apps.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&App> {
        self.get(name)
            .ok_or_else(|| UniverseError::AppNotFound(name.to_string()))
    }

    pub fn action(&self, app_name: &str, action_name: &str) -> Result<&Action> {
        self.require(app_name)?
            .get_action(action_name)
            .ok_or_else(|| UniverseError::ActionNotFound {
                app: app_name.to_string(),
                action: action_name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.apps.keys().map(String::as_str).collect()
    }

    pub fn apps(&self) -> impl Iterator<Item = &App> {
        self.apps.values()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Parse a single `definition.json` document.
    pub fn from_json_str(json: &str) -> Result<App> {
        let app: App = serde_json::from_str(json)?;
        app.validate()?;
        Ok(app)
    }

    /// Load every `<dir>/*/definition.json`. Subdirectories without a
    /// definition are skipped; a malformed definition is an error.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::new();
        if !dir.exists() {
            return Ok(catalog);
        }

        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();

        for entry in entries {
            let path = entry.join(paths::DEFINITION_FILE);
            if !path.exists() {
                tracing::debug!(dir = %entry.display(), "no app definition, skipping");
                continue;
            }
            let data = std::fs::read_to_string(&path)?;
            let app = Self::from_json_str(&data).map_err(|e| UniverseError::InvalidApp {
                app: path.display().to_string(),
                reason: e.to_string(),
            })?;
            catalog.insert(app)?;
        }
        Ok(catalog)
    }

    /// Write each app to `<dir>/<snake_name>/definition.json`. Existing
    /// files are left alone unless `overwrite` is set. Returns the names
    /// of the apps written.
    pub fn save_dir(&self, dir: &Path, overwrite: bool) -> Result<Vec<String>> {
        let mut written = Vec::new();
        for app in self.apps.values() {
            let path = paths::definition_path(dir, app.name());
            let data = serde_json::to_string_pretty(app)?;
            let wrote = if overwrite {
                io::atomic_write(&path, data.as_bytes())?;
                true
            } else {
                io::write_if_missing(&path, data.as_bytes())?
            };
            if wrote {
                written.push(app.name().to_string());
            }
        }
        Ok(written)
    }

    /// The example apps: MailoMailer, TaskPad and AutoBooker Calendar.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for app in [mailo_mailer(), taskpad(), autobooker_calendar()] {
            catalog.apps.insert(app.name().to_string(), app);
        }
        catalog
    }
}

// ---------------------------------------------------------------------------
// Built-in apps
// ---------------------------------------------------------------------------

fn app(name: &str, category: AppCategory, description: &str, collections: &[&str]) -> App {
    let mut initial_state = Map::new();
    for c in collections {
        initial_state.insert((*c).to_string(), json!([]));
    }
    let mut app = App::new(name, category, description);
    app.state_definition = Some(StateDefinition {
        initial_state,
        state_schema: json!({ "type": "object" }),
    });
    app
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn id_schema() -> Value {
    object_schema(json!({ "id": { "type": "string" } }), &["id"])
}

fn list_schema() -> Value {
    object_schema(
        json!({ "limit": { "type": "integer", "minimum": 1, "maximum": 100 } }),
        &[],
    )
}

fn list_output() -> Value {
    object_schema(
        json!({
            "results": { "type": "array" },
            "count": { "type": "integer" }
        }),
        &["results", "count"],
    )
}

fn created_output() -> Value {
    object_schema(
        json!({
            "id": { "type": "string" },
            "status": { "type": "string" }
        }),
        &["id"],
    )
}

fn mailo_mailer() -> App {
    app(
        "MailoMailer",
        AppCategory::Email,
        "Email delivery service with inbox management",
        &["emails"],
    )
    .with_action(
        Action::new("send_email")
            .with_inputs(object_schema(
                json!({
                    "to": { "type": "string", "format": "email" },
                    "subject": { "type": "string", "maxLength": 200 },
                    "body": { "type": "string" },
                    "cc": { "type": "array", "items": { "type": "string" } }
                }),
                &["to", "subject"],
            ))
            .with_outputs(created_output())
            .with_side_effects(&["creates_resource"]),
    )
    .with_action(
        Action::new("get_email")
            .with_inputs(id_schema())
            .with_latency(20, 100),
    )
    .with_action(
        Action::new("list_emails")
            .with_inputs(list_schema())
            .with_outputs(list_output())
            .with_latency(20, 100),
    )
    .with_action(
        Action::new("delete_email")
            .with_inputs(id_schema())
            .with_side_effects(&["deletes_resource"]),
    )
    .with_action(Action::new("mark_as_read").with_inputs(id_schema()))
}

fn taskpad() -> App {
    app(
        "TaskPad",
        AppCategory::Productivity,
        "Lightweight task tracker for teams",
        &["tasks"],
    )
    .with_action(
        Action::new("create_task")
            .with_inputs(object_schema(
                json!({
                    "title": { "type": "string", "minLength": 1 },
                    "description": { "type": "string" },
                    "priority": { "type": "string", "enum": ["low", "medium", "high"] }
                }),
                &["title"],
            ))
            .with_outputs(created_output())
            .with_side_effects(&["creates_resource"]),
    )
    .with_action(
        Action::new("update_task")
            .with_inputs(object_schema(
                json!({
                    "id": { "type": "string" },
                    "title": { "type": "string" },
                    "status": { "type": "string", "enum": ["todo", "in_progress", "done"] },
                    "priority": { "type": "string", "enum": ["low", "medium", "high"] }
                }),
                &[],
            ))
            .with_side_effects(&["updates_resource"]),
    )
    .with_action(
        Action::new("get_task")
            .with_inputs(id_schema())
            .with_latency(20, 100),
    )
    .with_action(
        Action::new("list_tasks")
            .with_inputs(list_schema())
            .with_outputs(list_output())
            .with_latency(20, 100),
    )
    .with_action(Action::new("complete_task").with_inputs(id_schema()))
}

fn autobooker_calendar() -> App {
    app(
        "AutoBooker Calendar",
        AppCategory::Calendar,
        "Calendar scheduling with automatic booking",
        &["events"],
    )
    .with_action(
        Action::new("create_event")
            .with_inputs(object_schema(
                json!({
                    "title": { "type": "string" },
                    "start": { "type": "string", "format": "date-time" },
                    "end": { "type": "string", "format": "date-time" },
                    "attendees": { "type": "array", "items": { "type": "string" } }
                }),
                &["title", "start", "end"],
            ))
            .with_outputs(created_output())
            .with_side_effects(&["creates_resource"]),
    )
    .with_action(
        Action::new("update_event")
            .with_inputs(object_schema(
                json!({
                    "id": { "type": "string" },
                    "title": { "type": "string" },
                    "start": { "type": "string" },
                    "end": { "type": "string" }
                }),
                &[],
            ))
            .with_side_effects(&["updates_resource"]),
    )
    .with_action(Action::new("get_event").with_inputs(id_schema()))
    .with_action(
        Action::new("list_events")
            .with_inputs(list_schema())
            .with_outputs(list_output()),
    )
    .with_action(
        Action::new("delete_event")
            .with_inputs(id_schema())
            .with_side_effects(&["deletes_resource"]),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
