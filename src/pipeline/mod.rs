//! Diagnosis, planning and patching of one error record.
//!
//! The stages run in order over an immutable [`PipelineState`]. A stage that
//! fails is recorded and every later stage is skipped. Stage outputs are
//! saved as `rca_report.json`, `fix_plan.json` and `patch_result.json` in the
//! output directory, alongside the run history.

pub mod history;
pub mod model;
pub mod prompts;
pub mod stages;
pub mod state;
pub mod tools;

pub use history::{History, HistoryError, HistoryEvent};
pub use model::{Model, ModelError, ReplayModel, StageRequest, Transcript};
pub use stages::StageError;
pub use state::{
    CodeChange, Confidence, FixPlan, PatchProposal, PatchReport, PatchStatus, PipelineState,
    RcaReport, Severity, Stage, StageFailure,
};
pub use tools::{ToolCall, ToolError, ToolOutput, Toolbox};

use crate::config::Settings;
use crate::patch::{PatchError, PatchWriter};
use crate::resolve::ResolveError;
use crate::trace::{self, TraceError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const RCA_REPORT_FILE: &str = "rca_report.json";
pub const FIX_PLAN_FILE: &str = "fix_plan.json";
pub const PATCH_RESULT_FILE: &str = "patch_result.json";

/// Problems that stop a run before any stage starts.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("invalid target root: {0}")]
    Root(#[from] ResolveError),

    #[error(transparent)]
    Naming(#[from] PatchError),
}

#[derive(Debug)]
pub struct RunReport {
    pub session_id: String,
    pub state: PipelineState,
    /// Every file written to the output directory
    pub artifacts: Vec<PathBuf>,
    /// Output files that could not be written; the stages still ran
    pub artifact_errors: Vec<String>,
}

impl RunReport {
    /// Every stage produced output and the patch is clean.
    pub fn succeeded(&self) -> bool {
        Stage::ALL.iter().all(|s| self.state.completed(*s))
            && self.state.patch_report().is_some_and(PatchReport::is_clean)
    }
}

/// Run the full pipeline on the first error record in `trace_file`.
pub fn run<M: Model>(
    model: &M,
    settings: &Settings,
    trace_file: &Path,
) -> Result<RunReport, PipelineError> {
    let record = trace::load(trace_file)?
        .into_iter()
        .next()
        .ok_or(TraceError::NoEvents)?;

    let toolbox = Toolbox::new(settings.resolver()?, PatchWriter::new(settings.naming()?));
    let output_dir = settings.output_dir();
    let mut history = History::new(settings.history_file());
    let mut saved = Artifacts::default();

    info!(
        session = history.session_id(),
        trace = %trace_file.display(),
        root = ?toolbox.resolver().root(),
        "pipeline started"
    );

    let mut state =
        PipelineState::new(trace_file, toolbox.resolver().root()).with_record(record.clone());

    history.stage_start(Stage::Diagnosis, &state);
    state = match stages::diagnose(model, &settings.model, &record, &mut history) {
        Ok(rca) => {
            history.stage_end(Stage::Diagnosis, &rca);
            saved.record(save(&output_dir, RCA_REPORT_FILE, &rca));
            state.with_rca_report(rca)
        }
        Err(e) => fail(state, &mut history, Stage::Diagnosis, e),
    };

    if let Some(rca) = state.rca_report().cloned() {
        history.stage_start(Stage::Plan, &state);
        state = match stages::plan(model, &settings.model, &record, &rca, &mut history) {
            Ok(plan) => {
                history.stage_end(Stage::Plan, &plan);
                saved.record(save(&output_dir, FIX_PLAN_FILE, &plan));
                state.with_fix_plan(plan)
            }
            Err(e) => fail(state, &mut history, Stage::Plan, e),
        };
    }

    if let (Some(rca), Some(plan)) = (state.rca_report().cloned(), state.fix_plan().cloned()) {
        history.stage_start(Stage::Patch, &state);
        state = match stages::patch(model, &settings.model, &toolbox, &rca, &plan, &mut history) {
            Ok(report) => {
                history.stage_end(Stage::Patch, &report);
                saved.record(save(&output_dir, PATCH_RESULT_FILE, &report));
                state.with_patch_report(report)
            }
            Err(e) => fail(state, &mut history, Stage::Patch, e),
        };
    }

    saved.record(history.save());
    saved.record(history.save_final_state(&state));

    let report = RunReport {
        session_id: history.session_id().to_string(),
        state,
        artifacts: saved.written,
        artifact_errors: saved.errors,
    };
    info!(succeeded = report.succeeded(), "pipeline finished");
    Ok(report)
}

fn fail(
    state: PipelineState,
    history: &mut History,
    stage: Stage,
    error: StageError,
) -> PipelineState {
    warn!(%stage, error = %error, "stage failed");
    history.message(stage, "error", &error.to_string());
    state.with_failure(stage, error)
}

#[derive(Default)]
struct Artifacts {
    written: Vec<PathBuf>,
    errors: Vec<String>,
}

impl Artifacts {
    fn record(&mut self, result: Result<PathBuf, HistoryError>) {
        match result {
            Ok(path) => self.written.push(path),
            Err(e) => {
                warn!(error = %e, "output file not written");
                self.errors.push(e.to_string());
            }
        }
    }
}

fn save(dir: &Path, name: &str, value: &impl serde::Serialize) -> Result<PathBuf, HistoryError> {
    let path = dir.join(name);
    history::write_json(&path, value)?;
    Ok(path)
}
