use crate::config::schema::{Settings, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "tracefix.toml";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Env {
        var: &'static str,
        value: String,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Env { var, value } => {
                write!(f, "invalid value for {}: {:?}", var, value)
            }
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::Env { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    settings
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(settings)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Load settings the way the binary does.
///
/// Priority order (later wins):
/// 1. Built-in defaults
/// 2. `explicit` config file, or `tracefix.toml` in the working directory
/// 3. `TRACEFIX_*` environment variables
pub fn load(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match explicit {
        Some(path) => load_from_path(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => load_from_path(DEFAULT_CONFIG_FILE)?,
        None => Settings::default(),
    };

    apply_env(&mut settings, |var| std::env::var(var).ok())?;
    settings
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(settings)
}

/// Overlay environment variables onto `settings`.
pub fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(root) = lookup("TRACEFIX_TARGET_ROOT") {
        settings.paths.target_root = Some(root);
    }
    if let Some(prefix) = lookup("TRACEFIX_STRIP_PREFIX") {
        settings.paths.strip_prefix = Some(prefix);
    }
    if let Some(dir) = lookup("TRACEFIX_OUTPUT_DIR") {
        settings.paths.output_dir = dir;
    }
    if let Some(file) = lookup("TRACEFIX_HISTORY_FILE") {
        settings.paths.history_file = Some(file);
    }
    if let Some(prefix) = lookup("TRACEFIX_PATCH_PREFIX") {
        settings.patch.prefix = prefix;
    }
    if let Some(name) = lookup("TRACEFIX_MODEL") {
        settings.model.name = name;
    }
    if let Some(value) = lookup("TRACEFIX_TEMPERATURE") {
        settings.model.temperature = value.trim().parse().map_err(|_| ConfigError::Env {
            var: "TRACEFIX_TEMPERATURE",
            value,
        })?;
    }
    if let Some(level) = lookup("TRACEFIX_LOG_LEVEL") {
        settings.logging.level = level;
    }
    Ok(())
}
