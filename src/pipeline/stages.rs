//! The three stages. Each is a plain function from its inputs to its output.

use crate::config::ModelSettings;
use crate::patch::{self, SnippetReplacement};
use crate::pipeline::history::History;
use crate::pipeline::model::{Model, ModelError, StageRequest};
use crate::pipeline::prompts;
use crate::pipeline::state::{
    CodeChange, FixPlan, PatchProposal, PatchReport, PatchStatus, RcaReport, Stage,
};
use crate::pipeline::tools::{ToolCall, ToolError, Toolbox};
use crate::trace::ErrorRecord;
use crate::verify::{self, ClaimOutcome, MatchMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage} stage: model call failed: {source}")]
    Model {
        stage: Stage,
        #[source]
        source: ModelError,
    },

    #[error("{stage} stage: response does not match the schema: {source}")]
    Response {
        stage: Stage,
        #[source]
        source: serde_json::Error,
    },

    #[error("{stage} stage: {what}")]
    MissingInput { stage: Stage, what: &'static str },
}

/// Diagnose the error record into a root cause report.
pub fn diagnose<M: Model>(
    model: &M,
    settings: &ModelSettings,
    record: &ErrorRecord,
    history: &mut History,
) -> Result<RcaReport, StageError> {
    let request = request(
        Stage::Diagnosis,
        settings,
        prompts::DIAGNOSIS_SYSTEM,
        prompts::diagnosis_prompt(record),
        prompts::rca_schema(),
    );
    let report: RcaReport = ask(model, &request, history)?;
    info!(
        affected_file = %report.affected_file,
        severity = ?report.severity,
        "diagnosis complete"
    );
    Ok(report)
}

/// Turn a root cause report into a list of snippet changes.
pub fn plan<M: Model>(
    model: &M,
    settings: &ModelSettings,
    record: &ErrorRecord,
    rca: &RcaReport,
    history: &mut History,
) -> Result<FixPlan, StageError> {
    let request = request(
        Stage::Plan,
        settings,
        prompts::PLAN_SYSTEM,
        prompts::plan_prompt(record, rca),
        prompts::plan_schema(),
    );
    let plan: FixPlan = ask(model, &request, history)?;
    if plan.changes.is_empty() {
        return Err(StageError::MissingInput {
            stage: Stage::Plan,
            what: "fix plan contains no changes",
        });
    }
    info!(changes = plan.changes.len(), "fix plan complete");
    Ok(plan)
}

/// Verify the author's claim against the current file and write the fix.
///
/// Tool failures and stale claims end in a report, not an error; nothing is
/// written unless every claimed snippet is present in the file as it is now.
pub fn patch<M: Model>(
    model: &M,
    settings: &ModelSettings,
    toolbox: &Toolbox,
    rca: &RcaReport,
    plan: &FixPlan,
    history: &mut History,
) -> Result<PatchReport, StageError> {
    let target = plan
        .target_file()
        .unwrap_or(rca.affected_file.as_str())
        .to_string();
    if target.trim().is_empty() {
        return Err(StageError::MissingInput {
            stage: Stage::Patch,
            what: "no target file in plan or report",
        });
    }

    let read = ToolCall::ReadSource {
        path: target.clone(),
        lines: None,
    };
    let content = match logged(history, &read, toolbox.read_source(&target)) {
        Ok((_, file)) => file.content,
        Err(message) => return Ok(PatchReport::failed(&target, message)),
    };

    let request = request(
        Stage::Patch,
        settings,
        prompts::PATCH_SYSTEM,
        prompts::patch_prompt(rca, plan, &target, &content),
        prompts::patch_schema(),
    );
    let proposal: PatchProposal = ask(model, &request, history)?;

    // The author may only retarget to a file the plan names
    let retargeted = !proposal.file_path.trim().is_empty()
        && plan.changes_for(&proposal.file_path).next().is_some();
    let file_path = if retargeted {
        proposal.file_path.clone()
    } else {
        target
    };
    let changes: Vec<&CodeChange> = plan.changes_for(&file_path).collect();

    let claims: Vec<String> = if proposal.claimed_snippet.is_empty() {
        changes
            .iter()
            .map(|c| c.original_snippet.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        vec![proposal.claimed_snippet.clone()]
    };

    let mut report = PatchReport::new(&file_path, PatchStatus::Rejected);
    if claims.is_empty() {
        report.error = Some("no snippet claimed; refusing to patch blindly".to_string());
        return Ok(report);
    }

    for claim in &claims {
        let call = ToolCall::VerifySnippet {
            path: file_path.clone(),
            snippet: claim.clone(),
        };
        match logged(history, &call, toolbox.verify_snippet(&file_path, claim)) {
            Ok((resolved, true)) => report.local_file = Some(resolved.local().to_path_buf()),
            Ok((resolved, false)) => {
                warn!(file = %file_path, "claimed snippet not in current file");
                report.local_file = Some(resolved.local().to_path_buf());
                report.verification = Some(ClaimOutcome::Absent);
                report.error = Some("claimed snippet not found in current file".to_string());
                if let Ok((_, file)) = toolbox.read_source(&file_path) {
                    report.suggestions =
                        verify::locate(&file.content, claim, MatchMode::Exact, 0).suggestions;
                }
                return Ok(report);
            }
            Err(message) => return Ok(PatchReport::failed(&file_path, message)),
        }
    }
    report.verification = Some(ClaimOutcome::Present);

    // Changes apply to the file as verified, not as first read
    let current = match toolbox.read_source(&file_path) {
        Ok((_, file)) => file.content,
        Err(e) => return Ok(PatchReport::failed(&file_path, e)),
    };

    let new_content = match &proposal.new_content {
        Some(full) => {
            report.applied_changes_summary = if proposal.summary.is_empty() {
                "Replaced file content".to_string()
            } else {
                proposal.summary.clone()
            };
            full.clone()
        }
        None => {
            let replacements: Vec<SnippetReplacement> =
                changes.iter().map(|c| c.replacement()).collect();
            let set = patch::apply_changes(&current, &replacements);
            report.warnings.extend(set.warnings);
            if set.applied == 0 {
                report.error = Some("no planned change matched the current file".to_string());
                return Ok(report);
            }
            report.applied_changes_summary = format!(
                "Applied {} of {} change(s): {}",
                set.applied,
                set.requested,
                set.change_log.join("; ")
            );
            set.content
        }
    };

    let write = ToolCall::WritePatch {
        path: file_path.clone(),
        content: new_content.clone(),
    };
    let result = match logged(history, &write, toolbox.write_patch(&file_path, &new_content)) {
        Ok(result) => result,
        Err(message) => {
            report.status = PatchStatus::Failed;
            report.error = Some(message);
            return Ok(report);
        }
    };

    report.write_error = result.error;
    report.content_hash = result.content_hash;
    let Some(output) = result.output.filter(|_| result.success) else {
        report.status = PatchStatus::Failed;
        report.error = result.message;
        return Ok(report);
    };
    report.fixed_file = Some(output.clone());

    report.status = PatchStatus::Applied;
    report.diff = Some(patch::diff_summary(
        &current,
        &new_content,
        &file_path,
        &output.display().to_string(),
    ));

    let validate = ToolCall::ValidateSyntax {
        path: output.clone(),
    };
    match logged(history, &validate, toolbox.validate_syntax(&output)) {
        Ok(validation) => {
            report.syntax_valid = Some(validation.valid);
            report.diagnostics = validation.diagnostics;
        }
        Err(message) => report.warnings.push(format!("syntax not checked: {message}")),
    }

    info!(
        original = %report.original_file,
        status = ?report.status,
        syntax_valid = ?report.syntax_valid,
        "patch stage complete"
    );
    Ok(report)
}

fn request(
    stage: Stage,
    settings: &ModelSettings,
    system: &str,
    prompt: String,
    schema: Value,
) -> StageRequest {
    StageRequest {
        stage,
        model: settings.name.clone(),
        temperature: settings.temperature,
        system: system.to_string(),
        prompt,
        schema,
    }
}

/// Send a request and decode the answer.
fn ask<M: Model, T: DeserializeOwned>(
    model: &M,
    request: &StageRequest,
    history: &mut History,
) -> Result<T, StageError> {
    history.message(request.stage, "request", &request.prompt);
    let stage = request.stage;
    let response = model
        .complete(request)
        .map_err(|source| StageError::Model { stage, source })?;
    history.message(stage, "response", &response);
    serde_json::from_value(response).map_err(|source| StageError::Response { stage, source })
}

/// Log a tool call made through a typed helper; errors come back as text.
fn logged<T: Serialize>(
    history: &mut History,
    call: &ToolCall,
    result: Result<T, ToolError>,
) -> Result<T, String> {
    match result {
        Ok(output) => {
            history.tool_call(Stage::Patch, call, &output);
            Ok(output)
        }
        Err(e) => {
            warn!(tool = call.name(), error = %e, "tool call failed");
            history.tool_call(Stage::Patch, call, &json!({ "error": e.to_string() }));
            Err(e.to_string())
        }
    }
}
