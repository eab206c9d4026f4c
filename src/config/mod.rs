pub mod loader;
pub mod schema;

pub use loader::{load, load_from_path, load_from_str, ConfigError, DEFAULT_CONFIG_FILE};
pub use schema::{
    LoggingSettings, ModelSettings, PatchSettings, PathSettings, Settings, ValidationError,
    ValidationIssue,
};
