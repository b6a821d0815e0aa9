//! JSON Schema validation for action inputs and outputs.
//!
//! Compiled schemas are cached per `(app, action, direction)` together with
//! the source schema. A different schema under the same key (a reloaded
//! definition, say) replaces the entry.

use crate::error::{Result, UniverseError};
use jsonschema::{Draft, JSONSchema};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// A failed validation: the first error message plus every error found.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub message: String,
    pub errors: Vec<String>,
}

impl Violation {
    pub fn details(&self) -> Value {
        json!({
            "validation_error": self.message,
            "errors": self.errors,
        })
    }
}

struct CachedSchema {
    source: Value,
    compiled: Arc<JSONSchema>,
}

#[derive(Default)]
pub struct SchemaValidator {
    cache: RwLock<HashMap<(String, String, Direction), CachedSchema>>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(
        &self,
        app: &str,
        action: &str,
        direction: Direction,
        schema: &Value,
    ) -> Result<Arc<JSONSchema>> {
        let key = (app.to_string(), action.to_string(), direction);
        if let Some(cached) = self.cache.read().get(&key) {
            if cached.source == *schema {
                return Ok(Arc::clone(&cached.compiled));
            }
        }

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|err| UniverseError::InvalidSchema {
                subject: format!("{app}.{action} {}", direction.as_str()),
                reason: err.to_string(),
            })?;

        let compiled = Arc::new(compiled);
        self.cache.write().insert(
            key,
            CachedSchema {
                source: schema.clone(),
                compiled: Arc::clone(&compiled),
            },
        );
        Ok(compiled)
    }

    /// Validate `instance` against `schema`.
    ///
    /// The outer `Result` fails only when the schema itself does not compile.
    pub fn validate(
        &self,
        app: &str,
        action: &str,
        direction: Direction,
        schema: &Value,
        instance: &Value,
    ) -> Result<std::result::Result<(), Violation>> {
        let compiled = self.compiled(app, action, direction, schema)?;
        let outcome = match compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let errors: Vec<String> = errors.map(|e| e.to_string()).collect();
                let message = errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "validation failed".to_string());
                Err(Violation { message, errors })
            }
        };
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn email_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string" },
                "subject": { "type": "string" }
            },
            "required": ["to", "subject"]
        })
    }

    #[test]
    fn valid_instance_passes() {
        let v = SchemaValidator::new();
        let outcome = v
            .validate(
                "MailoMailer",
                "send_email",
                Direction::Input,
                &email_schema(),
                &json!({ "to": "a@b.com", "subject": "Hi" }),
            )
            .unwrap();
        assert!(outcome.is_ok());
    }

    #[test]
    fn missing_required_field_is_a_violation() {
        let v = SchemaValidator::new();
        let violation = v
            .validate(
                "MailoMailer",
                "send_email",
                Direction::Input,
                &email_schema(),
                &json!({ "to": "a@b.com" }),
            )
            .unwrap()
            .unwrap_err();
        assert!(violation.message.contains("subject"), "{}", violation.message);
        assert_eq!(violation.details()["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn empty_schema_accepts_anything() {
        let v = SchemaValidator::new();
        let outcome = v
            .validate("App", "noop", Direction::Output, &json!({}), &json!([1, 2, 3]))
            .unwrap();
        assert!(outcome.is_ok());
    }

    #[test]
    fn broken_schema_is_an_error() {
        let v = SchemaValidator::new();
        let err = v
            .validate(
                "App",
                "broken",
                Direction::Input,
                &json!({ "type": 12 }),
                &json!({}),
            )
            .unwrap_err();
        assert!(matches!(err, UniverseError::InvalidSchema { .. }));
    }

    #[test]
    fn compiled_schema_is_cached() {
        let v = SchemaValidator::new();
        let schema = email_schema();
        let instance = json!({ "to": "x", "subject": "y" });
        v.validate("A", "b", Direction::Input, &schema, &instance).unwrap().unwrap();
        v.validate("A", "b", Direction::Input, &schema, &instance).unwrap().unwrap();
        assert_eq!(v.cache.read().len(), 1);
    }

    #[test]
    fn changed_schema_under_same_key_is_recompiled() {
        let v = SchemaValidator::new();
        let instance = json!({ "to": "a" });
        let strict = email_schema();
        let loose = json!({
            "type": "object",
            "properties": { "to": { "type": "string" } },
            "required": ["to"]
        });

        let first = v
            .validate("MailoMailer", "send_email", Direction::Input, &strict, &instance)
            .unwrap();
        assert!(first.is_err());
        let second = v
            .validate("MailoMailer", "send_email", Direction::Input, &loose, &instance)
            .unwrap();
        assert!(second.is_ok());
        assert_eq!(v.cache.read().len(), 1);
    }
}
