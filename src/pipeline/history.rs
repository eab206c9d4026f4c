//! JSON session history of a pipeline run.
//!
//! Every stage start and end, model exchange and tool call is appended as an
//! event. The history and a snapshot of the final state are saved next to
//! each other when the run ends.

use crate::pipeline::state::{PipelineState, Stage};
use crate::pipeline::tools::ToolCall;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize history: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a stage could see when it started.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub has_rca_report: bool,
    pub has_fix_plan: bool,
    pub has_patch_report: bool,
    pub input_file: PathBuf,
    pub failures: usize,
}

impl StateSnapshot {
    fn of(state: &PipelineState) -> Self {
        Self {
            has_rca_report: state.completed(Stage::Diagnosis),
            has_fix_plan: state.completed(Stage::Plan),
            has_patch_report: state.completed(Stage::Patch),
            input_file: state.input_file().to_path_buf(),
            failures: state.failures().len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    AgentStart {
        timestamp: DateTime<Local>,
        agent: Stage,
        state_snapshot: StateSnapshot,
    },
    AgentEnd {
        timestamp: DateTime<Local>,
        agent: Stage,
        output: Value,
    },
    ToolCall {
        timestamp: DateTime<Local>,
        agent: Stage,
        tool: &'static str,
        input: Value,
        output: Value,
    },
    Message {
        timestamp: DateTime<Local>,
        agent: Stage,
        message_type: String,
        content: Value,
    },
}

#[derive(Serialize)]
struct HistoryDocument<'a> {
    session_id: &'a str,
    total_events: usize,
    events: &'a [HistoryEvent],
}

#[derive(Serialize)]
struct FinalStateDocument<'a> {
    session_id: &'a str,
    saved_at: DateTime<Local>,
    state: &'a PipelineState,
}

#[derive(Debug, Clone)]
pub struct History {
    session_id: String,
    path: PathBuf,
    events: Vec<HistoryEvent>,
}

impl History {
    /// Start a session named after the current local time.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_session_id(path, Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn with_session_id(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            path: path.into(),
            events: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn stage_start(&mut self, stage: Stage, state: &PipelineState) {
        self.events.push(HistoryEvent::AgentStart {
            timestamp: Local::now(),
            agent: stage,
            state_snapshot: StateSnapshot::of(state),
        });
    }

    pub fn stage_end(&mut self, stage: Stage, output: &impl Serialize) {
        self.events.push(HistoryEvent::AgentEnd {
            timestamp: Local::now(),
            agent: stage,
            output: to_value(output),
        });
    }

    pub fn tool_call(&mut self, stage: Stage, call: &ToolCall, output: &impl Serialize) {
        self.events.push(HistoryEvent::ToolCall {
            timestamp: Local::now(),
            agent: stage,
            tool: call.name(),
            input: to_value(call),
            output: to_value(output),
        });
    }

    pub fn message(&mut self, stage: Stage, message_type: &str, content: &impl Serialize) {
        self.events.push(HistoryEvent::Message {
            timestamp: Local::now(),
            agent: stage,
            message_type: message_type.to_string(),
            content: to_value(content),
        });
    }

    /// Write the event log, creating parent directories.
    pub fn save(&self) -> Result<PathBuf, HistoryError> {
        let document = HistoryDocument {
            session_id: &self.session_id,
            total_events: self.events.len(),
            events: &self.events,
        };
        write_json(&self.path, &document)?;
        info!(path = %self.path.display(), events = self.events.len(), "history saved");
        Ok(self.path.clone())
    }

    /// Write `final_state_<session>.json` next to the history file.
    pub fn save_final_state(&self, state: &PipelineState) -> Result<PathBuf, HistoryError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = dir.join(format!("final_state_{}.json", self.session_id));

        let document = FinalStateDocument {
            session_id: &self.session_id,
            saved_at: Local::now(),
            state,
        };
        write_json(&path, &document)?;
        Ok(path)
    }
}

fn to_value(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Pretty-print `value` to `path`, creating parent directories.
pub(crate) fn write_json(path: &Path, value: &impl Serialize) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })
}
