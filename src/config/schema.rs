use crate::patch::{NamingPolicy, PatchError, DEFAULT_PREFIX};
use crate::resolve::{PathResolver, ResolveError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub paths: PathSettings,
    pub patch: PatchSettings,
    pub model: ModelSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Local checkout of the traced codebase; unset means paths are local
    pub target_root: Option<String>,
    /// Deployment prefix dropped from reported paths (e.g. `/usr/srv/app`)
    pub strip_prefix: Option<String>,
    pub output_dir: String,
    /// Defaults to `<output_dir>/agent_history.json`
    pub history_file: Option<String>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            target_root: None,
            strip_prefix: None,
            output_dir: "data/output".to_string(),
            history_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PatchSettings {
    pub prefix: String,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSettings {
    pub name: String,
    pub temperature: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: "gpt-4o".to_string(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: String,
    /// Emit newline-delimited JSON log lines
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.paths.output_dir.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "paths.output_dir",
            });
        }

        if let Err(e) = NamingPolicy::prefixed(self.patch.prefix.as_str()) {
            issues.push(ValidationIssue::InvalidValue {
                field: "patch.prefix",
                message: e.to_string(),
            });
        }

        if self.model.name.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "model.name",
            });
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            issues.push(ValidationIssue::InvalidValue {
                field: "model.temperature",
                message: format!("{} is outside 0.0..=2.0", self.model.temperature),
            });
        }

        if tracing::Level::from_str(&self.logging.level).is_err() {
            issues.push(ValidationIssue::InvalidValue {
                field: "logging.level",
                message: format!("unknown level {:?}", self.logging.level),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Path resolver for the configured root and strip prefix.
    pub fn resolver(&self) -> Result<PathResolver, ResolveError> {
        let resolver = PathResolver::from_setting(self.paths.target_root.as_deref())?;
        Ok(match self.paths.strip_prefix.as_deref() {
            Some(prefix) if !prefix.trim().is_empty() => resolver.strip_prefix(prefix),
            _ => resolver,
        })
    }

    pub fn naming(&self) -> Result<NamingPolicy, PatchError> {
        NamingPolicy::prefixed(self.patch.prefix.as_str())
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.output_dir)
    }

    pub fn history_file(&self) -> PathBuf {
        match &self.paths.history_file {
            Some(file) if !file.trim().is_empty() => PathBuf::from(file),
            _ => self.output_dir().join("agent_history.json"),
        }
    }

    /// Configured log level, `INFO` if it does not parse.
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(&self.logging.level).unwrap_or(tracing::Level::INFO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => write!(f, "missing {field}"),
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid {field}: {message}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issues: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        write!(f, "{}", issues.join("; "))
    }
}

impl std::error::Error for ValidationError {}
