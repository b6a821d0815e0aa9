use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("app not found: {0}")]
    AppNotFound(String),

    #[error("action '{action}' not found in app '{app}'")]
    ActionNotFound { app: String, action: String },

    #[error("invalid app definition '{app}': {reason}")]
    InvalidApp { app: String, reason: String },

    #[error("invalid schema for {subject}: {reason}")]
    InvalidSchema { subject: String, reason: String },

    #[error("Missing 'id' for {0} operation")]
    MissingId(&'static str),

    #[error("Object {0} not found")]
    ObjectNotFound(String),

    #[error("'{0}' is not an object collection")]
    NotACollection(String),

    #[error("inputs must be a JSON object")]
    InputsNotObject,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UniverseError>;
