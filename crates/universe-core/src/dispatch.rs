//! Action dispatch.
//!
//! An app may register an explicit `ActionHandler` per action. Everything
//! else goes through `CrudHandler`, which infers a verb and an object type
//! from the action name using the ordered `VERB_TABLE`.

use crate::error::{Result, UniverseError};
use crate::state::{Object, StateStore};
use serde_json::{json, Value};

/// Page size for list actions when `limit` is absent or is not a
/// non-negative integer.
pub const DEFAULT_LIST_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// CrudVerb
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrudVerb {
    Create,
    Update,
    Delete,
    Get,
    List,
    Passthrough,
}

/// Checked top to bottom; the first row with a matching substring wins.
pub const VERB_TABLE: &[(&[&str], CrudVerb)] = &[
    (&["create", "add", "send"], CrudVerb::Create),
    (&["update", "edit"], CrudVerb::Update),
    (&["delete", "remove"], CrudVerb::Delete),
    (&["get", "fetch"], CrudVerb::Get),
    (&["list"], CrudVerb::List),
];

pub fn classify(action_name: &str) -> CrudVerb {
    VERB_TABLE
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| action_name.contains(p)))
        .map(|&(_, verb)| verb)
        .unwrap_or(CrudVerb::Passthrough)
}

/// "create_contact" -> "contacts", "list_contacts" -> "contacts".
pub fn object_type(action_name: &str) -> String {
    let last = action_name.rsplit('_').next().unwrap_or(action_name);
    if action_name.contains("list") {
        last.to_string()
    } else {
        format!("{last}s")
    }
}

// ---------------------------------------------------------------------------
// ActionHandler
// ---------------------------------------------------------------------------

pub struct HandlerContext<'a> {
    pub app_name: &'a str,
    pub action_name: &'a str,
    pub store: &'a StateStore,
}

pub trait ActionHandler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext<'_>, inputs: Value) -> Result<Value>;
}

impl<F> ActionHandler for F
where
    F: Fn(&HandlerContext<'_>, Value) -> Result<Value> + Send + Sync,
{
    fn handle(&self, ctx: &HandlerContext<'_>, inputs: Value) -> Result<Value> {
        self(ctx, inputs)
    }
}

// ---------------------------------------------------------------------------
// CrudHandler
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct CrudHandler;

impl ActionHandler for CrudHandler {
    fn handle(&self, ctx: &HandlerContext<'_>, inputs: Value) -> Result<Value> {
        let object_type = object_type(ctx.action_name);
        let app = ctx.app_name;
        let store = ctx.store;

        match classify(ctx.action_name) {
            CrudVerb::Create => {
                let fields = into_object(inputs)?;
                let id = store.create_object(app, &object_type, fields.clone())?;
                let mut out = fields;
                out.insert("id".into(), Value::String(id));
                out.insert("status".into(), json!("success"));
                Ok(Value::Object(out))
            }
            CrudVerb::Update => {
                let mut fields = into_object(inputs)?;
                let id = fields
                    .remove("id")
                    .as_ref()
                    .and_then(id_string)
                    .ok_or(UniverseError::MissingId("update"))?;
                if !store.update_object(app, &object_type, &id, fields) {
                    return Err(UniverseError::ObjectNotFound(id));
                }
                store
                    .read_object(app, &object_type, &id)
                    .map(Value::Object)
                    .ok_or(UniverseError::ObjectNotFound(id))
            }
            CrudVerb::Delete => {
                let id = required_id(&inputs, "delete")?;
                if !store.delete_object(app, &object_type, &id) {
                    return Err(UniverseError::ObjectNotFound(id));
                }
                Ok(json!({ "id": id, "status": "deleted" }))
            }
            CrudVerb::Get => {
                let id = required_id(&inputs, "get")?;
                store
                    .read_object(app, &object_type, &id)
                    .map(Value::Object)
                    .ok_or(UniverseError::ObjectNotFound(id))
            }
            CrudVerb::List => {
                let limit = match inputs.get("limit") {
                    None => DEFAULT_LIST_LIMIT,
                    Some(raw) => match raw.as_u64() {
                        Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
                        None => {
                            tracing::debug!(
                                app,
                                action = ctx.action_name,
                                limit = %raw,
                                "unusable list limit, using default"
                            );
                            DEFAULT_LIST_LIMIT
                        }
                    },
                };
                let (results, count) = store.list_objects(app, &object_type, limit);
                Ok(json!({ "results": results, "count": count }))
            }
            CrudVerb::Passthrough => {
                tracing::warn!(
                    app,
                    action = ctx.action_name,
                    "no specific implementation for action, returning inputs"
                );
                Ok(json!({ "status": "executed", "result": inputs }))
            }
        }
    }
}

fn into_object(inputs: Value) -> Result<Object> {
    match inputs {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Object::new()),
        _ => Err(UniverseError::InputsNotObject),
    }
}

/// Accepts non-empty strings and numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_id(inputs: &Value, op: &'static str) -> Result<String> {
    inputs
        .get("id")
        .and_then(id_string)
        .ok_or(UniverseError::MissingId(op))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
