//! End-to-end pipeline runs driven by recorded model responses.

use super::{fixture, fixture_workspace};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracefix::config::Settings;
use tracefix::pipeline::{
    self, ModelError, PatchStatus, ReplayModel, Stage, StageRequest, Transcript,
};

fn settings_for(root: &Path, out: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.paths.target_root = Some(root.display().to_string());
    settings.paths.output_dir = out.display().to_string();
    settings
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn replayed_run_writes_fix_and_reports() {
    let (dir, root) = fixture_workspace();
    let out = dir.path().join("out");
    let settings = settings_for(&root, &out);
    let model = ReplayModel::from_file(&fixture("replay.json")).unwrap();

    let services = root.join("usr/srv/app/services");
    let original = fs::read_to_string(services.join("user.py")).unwrap();

    let report = pipeline::run(&model, &settings, &fixture("trace.json")).unwrap();

    assert!(report.succeeded(), "{:?}", report.state.failures());
    let patch = report.state.patch_report().unwrap();
    assert_eq!(patch.status, PatchStatus::Applied);
    assert_eq!(patch.syntax_valid, Some(true));

    let fixed = fs::read_to_string(services.join("fixed_user.py")).unwrap();
    assert!(fixed.contains("filter(User.email == data.email)"));
    assert!(!fixed.contains("User.emails"));
    assert_eq!(fs::read_to_string(services.join("user.py")).unwrap(), original);

    for name in [
        pipeline::RCA_REPORT_FILE,
        pipeline::FIX_PLAN_FILE,
        pipeline::PATCH_RESULT_FILE,
        "agent_history.json",
    ] {
        assert!(out.join(name).is_file(), "missing {name}");
    }
    assert!(out
        .join(format!("final_state_{}.json", report.session_id))
        .is_file());

    let patch_json = read_json(&out.join(pipeline::PATCH_RESULT_FILE));
    assert_eq!(patch_json["status"], "applied");
    assert_eq!(patch_json["verification"], "present");

    let history = read_json(&out.join("agent_history.json"));
    let tools: Vec<&str> = history["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event"] == "tool_call")
        .filter_map(|e| e["tool"].as_str())
        .collect();
    assert_eq!(
        tools,
        ["read_source", "verify_snippet", "write_patch", "validate_syntax"]
    );
}

#[test]
fn stale_claim_blocks_the_write() {
    let (dir, root) = fixture_workspace();
    let out = dir.path().join("out");
    let settings = settings_for(&root, &out);
    let model = ReplayModel::from_file(&fixture("replay.json")).unwrap();

    // Someone fixed the file after the trace was captured
    let user = root.join("usr/srv/app/services/user.py");
    let current = fs::read_to_string(&user)
        .unwrap()
        .replace("User.emails", "User.email");
    fs::write(&user, &current).unwrap();

    let report = pipeline::run(&model, &settings, &fixture("trace.json")).unwrap();

    assert!(!report.succeeded());
    let patch = report.state.patch_report().unwrap();
    assert_eq!(patch.status, PatchStatus::Rejected);
    assert!(!patch.suggestions.is_empty());
    assert!(!root.join("usr/srv/app/services/fixed_user.py").exists());
    assert_eq!(fs::read_to_string(&user).unwrap(), current);
    assert!(out.join(pipeline::PATCH_RESULT_FILE).is_file());
}

#[test]
fn failed_stage_skips_the_rest() {
    let (dir, root) = fixture_workspace();
    let out = dir.path().join("out");
    let settings = settings_for(&root, &out);

    let recorded: Transcript =
        serde_json::from_str(&fs::read_to_string(fixture("replay.json")).unwrap()).unwrap();
    let model = ReplayModel::new(Transcript {
        plan: None,
        ..recorded
    });

    let report = pipeline::run(&model, &settings, &fixture("trace.json")).unwrap();

    assert!(report.state.completed(Stage::Diagnosis));
    assert!(!report.state.completed(Stage::Plan));
    assert!(!report.state.completed(Stage::Patch));
    assert_eq!(report.state.failures().len(), 1);
    assert_eq!(report.state.failures()[0].stage, Stage::Plan);
    assert!(!report.succeeded());
    assert!(!out.join(pipeline::FIX_PLAN_FILE).exists());
    assert!(!out.join(pipeline::PATCH_RESULT_FILE).exists());
}

#[test]
fn stage_requests_carry_model_settings_and_schema() {
    let (dir, root) = fixture_workspace();
    let mut settings = settings_for(&root, &dir.path().join("out"));
    settings.model.name = "local-test".to_string();
    settings.model.temperature = 0.3;

    let model = |request: &StageRequest| -> Result<Value, ModelError> {
        assert_eq!(request.model, "local-test");
        assert_eq!(request.temperature, 0.3);
        assert!(request.schema["required"].is_array());
        assert!(request.prompt.contains("AttributeError"));
        Err(ModelError::Call("offline".to_string()))
    };

    let report = pipeline::run(&model, &settings, &fixture("trace.json")).unwrap();
    assert_eq!(report.state.failures().len(), 1);
    assert!(report.state.failures()[0].message.contains("offline"));
}

#[test]
fn missing_root_is_a_setup_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let settings = settings_for(&dir.path().join("nope"), &dir.path().join("out"));
    let model = ReplayModel::new(Transcript::default());

    let result = pipeline::run(&model, &settings, &fixture("trace.json"));
    assert!(matches!(result, Err(pipeline::PipelineError::Root(_))));
}

#[test]
fn full_content_proposal_is_written_verbatim() {
    let (dir, root) = fixture_workspace();
    let settings = settings_for(&root, &dir.path().join("out"));

    let recorded: Transcript =
        serde_json::from_str(&fs::read_to_string(fixture("replay.json")).unwrap()).unwrap();
    let content = "async def create_user_account(data, session, background_tasks):\n    return None\n";
    let model = ReplayModel::new(Transcript {
        patch: Some(json!({
            "file_path": "/usr/srv/app/services/user.py",
            "claimed_snippet": "async def create_user_account(data, session, background_tasks):",
            "new_content": content,
            "summary": "stub out"
        })),
        ..recorded
    });

    let report = pipeline::run(&model, &settings, &fixture("trace.json")).unwrap();

    assert!(report.succeeded());
    let written = root.join("usr/srv/app/services/fixed_user.py");
    assert_eq!(fs::read_to_string(written).unwrap(), content);
}

#[test]
fn unwritable_output_dir_still_runs_every_stage() {
    let (dir, root) = fixture_workspace();
    let out = dir.path().join("out");
    fs::write(&out, "not a directory").unwrap();
    let settings = settings_for(&root, &out);
    let model = ReplayModel::from_file(&fixture("replay.json")).unwrap();

    let report = pipeline::run(&model, &settings, &fixture("trace.json")).unwrap();

    assert!(report.succeeded(), "{:?}", report.state.failures());
    assert!(root.join("usr/srv/app/services/fixed_user.py").is_file());
    assert!(report.artifacts.is_empty());
    // three stage outputs, the history and the final state
    assert_eq!(report.artifact_errors.len(), 5);
}
