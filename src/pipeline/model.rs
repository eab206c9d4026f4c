//! The language-model boundary.
//!
//! A stage hands the model a prompt plus the JSON schema its answer must
//! follow and gets a JSON value back. How the model is reached is not this
//! crate's concern; [`ReplayModel`] answers from a recorded transcript.

use crate::pipeline::state::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read transcript {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid transcript JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no {0} response recorded")]
    MissingResponse(Stage),

    #[error("model call failed: {0}")]
    Call(String),
}

/// One structured completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRequest {
    pub stage: Stage,
    pub model: String,
    pub temperature: f64,
    pub system: String,
    pub prompt: String,
    /// JSON schema the response must satisfy
    pub schema: Value,
}

pub trait Model {
    fn complete(&self, request: &StageRequest) -> Result<Value, ModelError>;
}

impl<F> Model for F
where
    F: Fn(&StageRequest) -> Result<Value, ModelError>,
{
    fn complete(&self, request: &StageRequest) -> Result<Value, ModelError> {
        self(request)
    }
}

/// Recorded stage outputs, one per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transcript {
    #[serde(default)]
    pub diagnosis: Option<Value>,
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub patch: Option<Value>,
}

/// Answers each stage with its recorded response.
#[derive(Debug, Clone, Default)]
pub struct ReplayModel {
    transcript: Transcript,
}

impl ReplayModel {
    pub fn new(transcript: Transcript) -> Self {
        Self { transcript }
    }

    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(serde_json::from_str(&text)?))
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}

impl Model for ReplayModel {
    fn complete(&self, request: &StageRequest) -> Result<Value, ModelError> {
        let response = match request.stage {
            Stage::Diagnosis => &self.transcript.diagnosis,
            Stage::Plan => &self.transcript.plan,
            Stage::Patch => &self.transcript.patch,
        };
        response
            .clone()
            .ok_or(ModelError::MissingResponse(request.stage))
    }
}
