use crate::patch::{SnippetReplacement, WriteErrorKind};
use crate::syntax::Diagnostic;
use crate::trace::ErrorRecord;
use crate::verify::ClaimOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The three analysis stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Diagnosis,
    Plan,
    Patch,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Diagnosis, Stage::Plan, Stage::Patch];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Diagnosis => "diagnosis",
            Stage::Plan => "plan",
            Stage::Patch => "patch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

/// Output of the diagnosis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcaReport {
    pub error_type: String,
    pub error_message: String,
    #[serde(default)]
    pub severity: Severity,
    pub root_cause_summary: String,
    #[serde(default)]
    pub root_cause_detailed: String,
    #[serde(default)]
    pub contributing_factors: Vec<String>,
    /// Path as reported in the trace
    pub affected_file: String,
    #[serde(default)]
    pub affected_function: String,
    #[serde(default)]
    pub affected_class: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default = "default_fix_category")]
    pub fix_category: String,
    pub recommended_fix_approach: String,
}

fn default_fix_category() -> String {
    "other".to_string()
}

/// One `original_snippet -> fixed_snippet` replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    pub file_path: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub line_number: Option<u32>,
    pub original_snippet: String,
    pub fixed_snippet: String,
    #[serde(default)]
    pub explanation: String,
}

impl CodeChange {
    pub fn replacement(&self) -> SnippetReplacement {
        SnippetReplacement {
            original: self.original_snippet.clone(),
            fixed: self.fixed_snippet.clone(),
            line_hint: self.line_number,
        }
    }
}

/// Output of the planning stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPlan {
    pub fix_summary: String,
    #[serde(default)]
    pub detailed_reasoning: String,
    pub changes: Vec<CodeChange>,
    #[serde(default)]
    pub safety_checks: Vec<String>,
    #[serde(default)]
    pub potential_risks: Vec<String>,
    #[serde(default)]
    pub verification_steps: Vec<String>,
}

impl FixPlan {
    /// File named by the first change.
    pub fn target_file(&self) -> Option<&str> {
        self.changes
            .iter()
            .map(|c| c.file_path.as_str())
            .find(|p| !p.trim().is_empty())
    }

    /// Changes for `file_path`, in plan order.
    pub fn changes_for<'a>(&'a self, file_path: &'a str) -> impl Iterator<Item = &'a CodeChange> {
        self.changes.iter().filter(move |c| c.file_path == file_path)
    }
}

/// What the patch-authoring stage claims and proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchProposal {
    pub file_path: String,
    /// Code the author expects to find in the current file
    #[serde(default)]
    pub claimed_snippet: String,
    /// Full replacement file content; the plan's changes are applied when absent
    #[serde(default)]
    pub new_content: Option<String>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    /// Sibling file written
    Applied,
    /// Claimed code not in the current file; nothing written
    Rejected,
    /// Resolution, read or write failed
    Failed,
}

/// Terminal artifact of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchReport {
    pub original_file: String,
    pub local_file: Option<PathBuf>,
    pub fixed_file: Option<PathBuf>,
    pub status: PatchStatus,
    pub applied_changes_summary: String,
    pub verification: Option<ClaimOutcome>,
    /// `None` when validation could not run (e.g. unknown language)
    pub syntax_valid: Option<bool>,
    pub diagnostics: Vec<Diagnostic>,
    pub write_error: Option<WriteErrorKind>,
    pub error: Option<String>,
    pub content_hash: Option<u64>,
    pub diff: Option<String>,
    pub suggestions: Vec<String>,
    pub warnings: Vec<String>,
}

impl PatchReport {
    pub(crate) fn new(original_file: &str, status: PatchStatus) -> Self {
        Self {
            original_file: original_file.to_string(),
            local_file: None,
            fixed_file: None,
            status,
            applied_changes_summary: String::new(),
            verification: None,
            syntax_valid: None,
            diagnostics: Vec::new(),
            write_error: None,
            error: None,
            content_hash: None,
            diff: None,
            suggestions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn failed(original_file: &str, error: impl fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(original_file, PatchStatus::Failed)
        }
    }

    /// Written and not known to be syntactically broken.
    pub fn is_clean(&self) -> bool {
        self.status == PatchStatus::Applied && self.syntax_valid != Some(false)
    }
}

/// Why a stage produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// Context handed from stage to stage.
///
/// Never mutated in place: each `with_*` call returns the next state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineState {
    input_file: PathBuf,
    target_root: Option<PathBuf>,
    record: Option<ErrorRecord>,
    rca_report: Option<RcaReport>,
    fix_plan: Option<FixPlan>,
    patch_report: Option<PatchReport>,
    failures: Vec<StageFailure>,
}

impl PipelineState {
    pub fn new(input_file: impl Into<PathBuf>, target_root: Option<&Path>) -> Self {
        Self {
            input_file: input_file.into(),
            target_root: target_root.map(Path::to_path_buf),
            record: None,
            rca_report: None,
            fix_plan: None,
            patch_report: None,
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_record(self, record: ErrorRecord) -> Self {
        Self {
            record: Some(record),
            ..self
        }
    }

    #[must_use]
    pub fn with_rca_report(self, report: RcaReport) -> Self {
        Self {
            rca_report: Some(report),
            ..self
        }
    }

    #[must_use]
    pub fn with_fix_plan(self, plan: FixPlan) -> Self {
        Self {
            fix_plan: Some(plan),
            ..self
        }
    }

    #[must_use]
    pub fn with_patch_report(self, report: PatchReport) -> Self {
        Self {
            patch_report: Some(report),
            ..self
        }
    }

    #[must_use]
    pub fn with_failure(mut self, stage: Stage, message: impl fmt::Display) -> Self {
        self.failures.push(StageFailure {
            stage,
            message: message.to_string(),
        });
        self
    }

    pub fn input_file(&self) -> &Path {
        &self.input_file
    }

    pub fn target_root(&self) -> Option<&Path> {
        self.target_root.as_deref()
    }

    pub fn record(&self) -> Option<&ErrorRecord> {
        self.record.as_ref()
    }

    pub fn rca_report(&self) -> Option<&RcaReport> {
        self.rca_report.as_ref()
    }

    pub fn fix_plan(&self) -> Option<&FixPlan> {
        self.fix_plan.as_ref()
    }

    pub fn patch_report(&self) -> Option<&PatchReport> {
        self.patch_report.as_ref()
    }

    pub fn failures(&self) -> &[StageFailure] {
        &self.failures
    }

    /// Whether `stage` produced its output.
    pub fn completed(&self, stage: Stage) -> bool {
        match stage {
            Stage::Diagnosis => self.rca_report.is_some(),
            Stage::Plan => self.fix_plan.is_some(),
            Stage::Patch => self.patch_report.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rca_report_tolerates_sparse_model_output() {
        let report: RcaReport = serde_json::from_value(json!({
            "error_type": "AttributeError",
            "error_message": "type object 'User' has no attribute 'emails'",
            "root_cause_summary": "Typo in the column name",
            "affected_file": "/usr/srv/app/services/user.py",
            "severity": "high",
            "recommended_fix_approach": "Use the existing email column"
        }))
        .unwrap();

        assert_eq!(report.severity, Severity::High);
        assert_eq!(report.confidence, Confidence::Medium);
        assert_eq!(report.fix_category, "other");
        assert_eq!(report.line_number, None);
    }

    #[test]
    fn fix_plan_target_skips_blank_paths() {
        let plan: FixPlan = serde_json::from_value(json!({
            "fix_summary": "rename",
            "changes": [
                {"file_path": "", "original_snippet": "a", "fixed_snippet": "b"},
                {"file_path": "services/user.py", "original_snippet": "c", "fixed_snippet": "d", "line_number": 7}
            ]
        }))
        .unwrap();

        assert_eq!(plan.target_file(), Some("services/user.py"));
        let replacements: Vec<_> = plan
            .changes_for("services/user.py")
            .map(CodeChange::replacement)
            .collect();
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements[0].line_hint, Some(7));
    }

    #[test]
    fn state_transitions_leave_previous_state_untouched() {
        let start = PipelineState::new("trace.json", None);
        let failed = start.clone().with_failure(Stage::Diagnosis, "model timed out");

        assert!(start.failures().is_empty());
        assert_eq!(failed.failures().len(), 1);
        assert!(!failed.completed(Stage::Diagnosis));
    }

    #[test]
    fn clean_requires_applied_and_valid() {
        let mut report = PatchReport::new("user.py", PatchStatus::Applied);
        assert!(report.is_clean());
        report.syntax_valid = Some(false);
        assert!(!report.is_clean());
        assert!(!PatchReport::failed("user.py", "boom").is_clean());
    }
}
