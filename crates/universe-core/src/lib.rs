pub mod app;
pub mod catalog;
pub mod chaos;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod fault;
pub mod io;
pub mod paths;
pub mod runtime;
pub mod schema;
pub mod state;
pub mod triggers;
pub mod types;

pub use app::{Action, App, AppMetadata, RateLimitProfile, StateDefinition};
pub use catalog::AppCatalog;
pub use chaos::{ChaosEngine, FaultProfile};
pub use config::RuntimeConfig;
pub use envelope::ResultEnvelope;
pub use error::{Result, UniverseError};
pub use fault::{ErrorInfo, Fault};
pub use runtime::Runtime;
pub use state::{EventKind, StateEvent, StateStore};
pub use types::{AppCategory, ErrorKind, FaultKind};
