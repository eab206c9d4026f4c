//! Stage prompts and the JSON schemas their answers must follow.

use crate::pipeline::state::{FixPlan, RcaReport};
use crate::trace::ErrorRecord;
use serde_json::{json, Value};
use std::fmt::Write as _;

pub const DIAGNOSIS_SYSTEM: &str = "You are a senior engineer performing root cause analysis \
of a production exception. Work only from the evidence given. Identify the file, function and \
line where the failure originates and explain why it happens. Do not write code.";

pub const PLAN_SYSTEM: &str = "You are a senior engineer turning a root cause analysis into a \
minimal fix. Express every change as an exact original snippet copied from the current code \
and the snippet that replaces it. Change nothing the analysis does not justify.";

pub const PATCH_SYSTEM: &str = "You apply a fix plan to a source file. Quote, in \
claimed_snippet, code that is present verbatim in the current file. Either return the complete \
new file in new_content or leave it empty to apply the plan's snippet replacements. The original \
file is never overwritten; the result is written next to it.";

pub fn diagnosis_prompt(record: &ErrorRecord) -> String {
    format!(
        "{}\n\nProduce the root cause analysis report.",
        record.prompt_context()
    )
}

pub fn plan_prompt(record: &ErrorRecord, rca: &RcaReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "### Root Cause Analysis");
    let _ = writeln!(out, "- **Error:** {}: {}", rca.error_type, rca.error_message);
    let _ = writeln!(out, "- **Summary:** {}", rca.root_cause_summary);
    if !rca.root_cause_detailed.is_empty() {
        let _ = writeln!(out, "- **Details:** {}", rca.root_cause_detailed);
    }
    let _ = writeln!(out, "- **File:** `{}`", rca.affected_file);
    if !rca.affected_function.is_empty() {
        let _ = writeln!(out, "- **Function:** `{}`", rca.affected_function);
    }
    if let Some(line) = rca.line_number {
        let _ = writeln!(out, "- **Line:** {line}");
    }
    let _ = writeln!(out, "- **Approach:** {}\n", rca.recommended_fix_approach);

    match record.innermost_internal() {
        Some(frame) if !frame.code.trim().is_empty() => {
            let _ = writeln!(out, "### Failing Function\n```\n{}\n```\n", frame.code.trim());
        }
        _ => {}
    }

    let _ = write!(out, "Produce the fix plan.");
    out
}

pub fn patch_prompt(rca: &RcaReport, plan: &FixPlan, file_path: &str, content: &str) -> String {
    let changes = serde_json::to_string_pretty(&plan.changes).unwrap_or_default();
    format!(
        "### Root Cause\n{}\n\n### Fix Plan\n{}\n\n### Requested Changes\n```json\n{}\n```\n\n\
         ### Current Content of `{}`\n```\n{}\n```\n\nProduce the patch proposal.",
        rca.root_cause_summary, plan.fix_summary, changes, file_path, content
    )
}

pub fn rca_schema() -> Value {
    json!({
        "type": "object",
        "required": [
            "error_type", "error_message", "severity", "root_cause_summary",
            "affected_file", "confidence", "recommended_fix_approach"
        ],
        "properties": {
            "error_type": {"type": "string"},
            "error_message": {"type": "string"},
            "severity": {"enum": ["critical", "high", "medium", "low"]},
            "root_cause_summary": {"type": "string"},
            "root_cause_detailed": {"type": "string"},
            "contributing_factors": {"type": "array", "items": {"type": "string"}},
            "affected_file": {"type": "string"},
            "affected_function": {"type": "string"},
            "affected_class": {"type": ["string", "null"]},
            "line_number": {"type": ["integer", "null"], "minimum": 1},
            "evidence": {"type": "string"},
            "confidence": {"enum": ["high", "medium", "low"]},
            "assumptions": {"type": "array", "items": {"type": "string"}},
            "related_files": {"type": "array", "items": {"type": "string"}},
            "fix_category": {"enum": [
                "typo_correction", "type_mismatch", "missing_validation", "logic_error",
                "missing_import", "schema_mismatch", "other"
            ]},
            "recommended_fix_approach": {"type": "string"}
        }
    })
}

pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "required": ["fix_summary", "changes"],
        "properties": {
            "fix_summary": {"type": "string"},
            "detailed_reasoning": {"type": "string"},
            "changes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["file_path", "original_snippet", "fixed_snippet"],
                    "properties": {
                        "file_path": {"type": "string"},
                        "function_name": {"type": "string"},
                        "line_number": {"type": ["integer", "null"], "minimum": 1},
                        "original_snippet": {"type": "string"},
                        "fixed_snippet": {"type": "string"},
                        "explanation": {"type": "string"}
                    }
                }
            },
            "safety_checks": {"type": "array", "items": {"type": "string"}},
            "potential_risks": {"type": "array", "items": {"type": "string"}},
            "verification_steps": {"type": "array", "items": {"type": "string"}}
        }
    })
}

pub fn patch_schema() -> Value {
    json!({
        "type": "object",
        "required": ["file_path", "claimed_snippet"],
        "properties": {
            "file_path": {"type": "string"},
            "claimed_snippet": {"type": "string"},
            "new_content": {"type": ["string", "null"]},
            "summary": {"type": "string"}
        }
    })
}
