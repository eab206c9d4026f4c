//! Error records from exported trace files.
//!
//! The input is the JSON export of an exception event: either one event
//! object or a list of them, each with an `event_attributes` map using
//! OpenTelemetry `exception.*` keys. Stack details arrive as a JSON array,
//! sometimes double-encoded as a string.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid trace JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("trace contains no events with event_attributes")]
    NoEvents,
}

/// One frame of the failing call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Path as the failing process reported it
    pub file: String,
    pub function: String,
    pub line: Option<u32>,
    /// Source of the enclosing function, when exported
    pub code: String,
    /// Application code, as opposed to library or framework code
    pub internal: bool,
}

/// One exception event. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub exception_type: String,
    pub message: String,
    pub stack_trace: String,
    /// Outermost call first
    pub frames: Vec<StackFrame>,
}

impl ErrorRecord {
    /// `Type: message`
    pub fn summary(&self) -> String {
        format!("{}: {}", self.exception_type, self.message)
    }

    pub fn internal_frames(&self) -> impl DoubleEndedIterator<Item = &StackFrame> {
        self.frames.iter().filter(|f| f.internal)
    }

    /// The application frame closest to where the exception was raised.
    pub fn innermost_internal(&self) -> Option<&StackFrame> {
        self.internal_frames().next_back()
    }

    /// Markdown context block for the diagnosis prompt.
    pub fn prompt_context(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "### Critical Error Summary");
        let _ = writeln!(out, "**Type:** {}", self.exception_type);
        let _ = writeln!(out, "**Message:** {}\n", self.message);

        let frames: Vec<&StackFrame> = self.internal_frames().rev().collect();
        if frames.is_empty() {
            let _ = writeln!(
                out,
                "No internal application frames detected in the stack details.\n"
            );
        } else {
            let _ = writeln!(
                out,
                "### Internal Code Execution Flow (Most Recent Call First)\n"
            );
            for (idx, frame) in frames.iter().enumerate() {
                let line = frame
                    .line
                    .map_or_else(|| "?".to_string(), |l| l.to_string());
                let _ = writeln!(out, "**Frame {}:** `{}`", idx + 1, frame.function);
                let _ = writeln!(out, "- **File:** `{}` (Line {line})", frame.file);
                let _ = writeln!(out, "- **Code Snippet:**");
                let _ = writeln!(
                    out,
                    "```{}\n{}\n```\n",
                    fence_language(&frame.file),
                    frame.code.trim()
                );
            }
        }

        let _ = writeln!(out, "### Full Reference Stack Trace");
        let _ = write!(out, "```\n{}\n```", self.stack_trace);
        out
    }
}

/// Load every error record from a trace file.
pub fn load(path: &Path) -> Result<Vec<ErrorRecord>, TraceError> {
    let text = fs::read_to_string(path).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

/// Parse a trace document (single event or list of events).
pub fn parse(text: &str) -> Result<Vec<ErrorRecord>, TraceError> {
    let document: TraceDocument = serde_json::from_str(text)?;
    let events = match document {
        TraceDocument::Many(events) => events,
        TraceDocument::One(event) => vec![event],
    };

    let total = events.len();
    let records: Vec<ErrorRecord> = events
        .into_iter()
        .filter_map(|event| event.event_attributes)
        .map(EventAttributes::into_record)
        .collect();

    debug!(events = total, records = records.len(), "parsed trace");

    if records.is_empty() {
        return Err(TraceError::NoEvents);
    }
    Ok(records)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceDocument {
    Many(Vec<TraceEvent>),
    One(TraceEvent),
}

#[derive(Deserialize)]
struct TraceEvent {
    #[serde(default)]
    event_attributes: Option<EventAttributes>,
}

#[derive(Deserialize)]
struct EventAttributes {
    #[serde(rename = "exception.type")]
    exception_type: Option<String>,
    #[serde(rename = "exception.message")]
    message: Option<String>,
    #[serde(rename = "exception.stacktrace")]
    stacktrace: Option<String>,
    #[serde(rename = "exception.stack_details")]
    stack_details: Option<StackDetails>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StackDetails {
    Frames(Vec<RawFrame>),
    Encoded(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "exception.file")]
    file: Option<String>,
    #[serde(rename = "exception.function_name")]
    function_name: Option<String>,
    #[serde(rename = "exception.line")]
    line: Option<serde_json::Value>,
    #[serde(rename = "exception.is_file_external")]
    is_file_external: Option<serde_json::Value>,
    #[serde(rename = "exception.function_body")]
    function_body: Option<String>,
}

impl EventAttributes {
    fn into_record(self) -> ErrorRecord {
        let raw_frames = match self.stack_details {
            Some(StackDetails::Frames(frames)) => frames,
            // Undecodable details leave the record without frames
            Some(StackDetails::Encoded(text)) => serde_json::from_str(&text).unwrap_or_default(),
            None => Vec::new(),
        };

        ErrorRecord {
            exception_type: self
                .exception_type
                .unwrap_or_else(|| "UnknownError".to_string()),
            message: self
                .message
                .unwrap_or_else(|| "No message provided".to_string()),
            stack_trace: self
                .stacktrace
                .unwrap_or_else(|| "No stacktrace found.".to_string()),
            frames: raw_frames.into_iter().map(RawFrame::into_frame).collect(),
        }
    }
}

impl RawFrame {
    fn into_frame(self) -> StackFrame {
        StackFrame {
            file: self.file.unwrap_or_default(),
            function: self
                .function_name
                .unwrap_or_else(|| "<unknown>".to_string()),
            line: self.line.as_ref().and_then(lenient_u32),
            code: self.function_body.unwrap_or_default(),
            internal: !self.is_file_external.as_ref().is_some_and(lenient_bool),
        }
    }
}

fn lenient_u32(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_bool(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn fence_language(file: &str) -> &'static str {
    match Path::new(file).extension().and_then(|e| e.to_str()) {
        Some("py") => "python",
        Some("rs") => "rust",
        Some("js") => "javascript",
        Some("ts") => "typescript",
        Some("go") => "go",
        Some("java") => "java",
        Some("rb") => "ruby",
        _ => "",
    }
}
