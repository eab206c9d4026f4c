//! Tests for the command-line interface.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Workspace with a small service file under a deployment-style path.
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let services = dir.path().join("usr/srv/app/services");
    fs::create_dir_all(&services).unwrap();
    fs::write(
        services.join("user.py"),
        "def create_user(data, session):\n    return session.query(User).filter(User.emails == data.email).first()\n",
    )
    .unwrap();
    dir
}

fn tracefix(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tracefix"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("TRACEFIX_TARGET_ROOT")
        .env("NO_COLOR", "1")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = tracefix(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["run", "trace", "resolve", "read", "verify", "write", "validate"] {
        assert!(stdout.contains(command), "help is missing {command}");
    }
}

#[test]
fn test_resolve_reports_found_and_missing() {
    let dir = setup_workspace();
    let root = dir.path().to_str().unwrap();

    let found = tracefix(
        dir.path(),
        &["resolve", "-r", root, "/usr/srv/app/services/user.py"],
    );
    assert!(found.status.success());
    assert!(String::from_utf8_lossy(&found.stdout).contains("services/user.py"));

    let missing = tracefix(dir.path(), &["resolve", "-r", root, "/usr/srv/app/models.py"]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stdout).contains("not found"));

    let escaping = tracefix(dir.path(), &["resolve", "-r", root, "../etc/passwd"]);
    assert!(!escaping.status.success());
}

#[test]
fn test_read_with_strip_prefix() {
    let dir = setup_workspace();
    let app = dir.path().join("usr/srv/app");
    let output = tracefix(
        dir.path(),
        &[
            "read",
            "--target-root",
            app.to_str().unwrap(),
            "--strip-prefix",
            "/usr/srv/app",
            "/usr/srv/app/services/user.py",
            "--lines",
            "2:2",
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("User.emails"));
}

#[test]
fn test_read_without_strip() {
    let dir = setup_workspace();
    let output = tracefix(
        dir.path(),
        &[
            "read",
            "-r",
            dir.path().to_str().unwrap(),
            "/usr/srv/app/services/user.py",
            "-l",
            "1:1",
        ],
    );

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "def create_user(data, session):\n"
    );
}

#[test]
fn test_verify_exit_codes() {
    let dir = setup_workspace();
    let root = dir.path().to_str().unwrap();
    let path = "/usr/srv/app/services/user.py";

    let present = tracefix(dir.path(), &["verify", "-r", root, path, "User.emails == data.email"]);
    assert!(present.status.success());
    assert!(String::from_utf8_lossy(&present.stdout).contains("line 2"));

    let absent = tracefix(dir.path(), &["verify", "-r", root, path, "def missing_method"]);
    assert_eq!(absent.status.code(), Some(1));
}

#[test]
fn test_write_creates_sibling_and_validates() {
    let dir = setup_workspace();
    let content = dir.path().join("new.py");
    fs::write(
        &content,
        "def create_user(data, session):\n    return session.query(User).filter(User.email == data.email).first()\n",
    )
    .unwrap();

    let output = tracefix(
        dir.path(),
        &[
            "write",
            "-r",
            dir.path().to_str().unwrap(),
            "/usr/srv/app/services/user.py",
            "--content",
            content.to_str().unwrap(),
            "--diff",
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let fixed = dir.path().join("usr/srv/app/services/fixed_user.py");
    assert!(fixed.exists());
    assert!(fs::read_to_string(dir.path().join("usr/srv/app/services/user.py"))
        .unwrap()
        .contains("User.emails"));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("syntax valid"));
    assert!(stdout.contains("+    return"));
}

#[test]
fn test_validate_flags_broken_file() {
    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("broken.py");
    fs::write(&broken, "def f(:\n    pass\n").unwrap();

    let output = tracefix(dir.path(), &["validate", broken.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("line "));
}

#[test]
fn test_trace_json_output() {
    let dir = TempDir::new().unwrap();
    let output = tracefix(
        dir.path(),
        &["trace", fixture("trace.json").to_str().unwrap(), "--json"],
    );

    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["exception_type"], "AttributeError");
    assert_eq!(records[0]["frames"].as_array().unwrap().len(), 3);
}

#[test]
fn test_run_with_replay() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("codebase/usr/srv/app/services");
    fs::create_dir_all(&root).unwrap();
    fs::copy(
        fixture("target-codebase/usr/srv/app/services/user.py"),
        root.join("user.py"),
    )
    .unwrap();
    let out = dir.path().join("out");

    let output = tracefix(
        dir.path(),
        &[
            "run",
            fixture("trace.json").to_str().unwrap(),
            "--replay",
            fixture("replay.json").to_str().unwrap(),
            "-r",
            dir.path().join("codebase").to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(root.join("fixed_user.py").exists());
    assert!(out.join("rca_report.json").exists());
    assert!(out.join("fix_plan.json").exists());
    assert!(out.join("patch_result.json").exists());
}

#[test]
fn test_config_file_sets_prefix() {
    let dir = setup_workspace();
    fs::write(
        dir.path().join("tracefix.toml"),
        "[patch]\nprefix = \"patched_\"\n",
    )
    .unwrap();
    let content = dir.path().join("new.py");
    fs::write(&content, "x = 1\n").unwrap();

    let output = tracefix(
        dir.path(),
        &[
            "write",
            "-r",
            dir.path().to_str().unwrap(),
            "/usr/srv/app/services/user.py",
            "--content",
            content.to_str().unwrap(),
        ],
    );

    assert!(output.status.success());
    assert!(dir
        .path()
        .join("usr/srv/app/services/patched_user.py")
        .exists());
}

#[test]
fn test_write_with_invalid_syntax_exits_nonzero() {
    let dir = setup_workspace();
    let content = dir.path().join("broken.py");
    fs::write(&content, "def create_user(data:\n").unwrap();

    let output = tracefix(
        dir.path(),
        &[
            "write",
            "-r",
            dir.path().to_str().unwrap(),
            "/usr/srv/app/services/user.py",
            "--content",
            content.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("syntax invalid"));
    // Kept on disk for inspection
    assert!(dir.path().join("usr/srv/app/services/fixed_user.py").exists());
}

#[test]
fn test_write_without_grammar_skips_syntax_check() {
    let dir = setup_workspace();
    fs::write(dir.path().join("usr/srv/app/notes.txt"), "old notes\n").unwrap();
    let content = dir.path().join("c.txt");
    fs::write(&content, "new notes\n").unwrap();

    let output = tracefix(
        dir.path(),
        &[
            "write",
            "-r",
            dir.path().to_str().unwrap(),
            "/usr/srv/app/notes.txt",
            "--content",
            content.to_str().unwrap(),
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("syntax not checked"));
    assert_eq!(
        fs::read_to_string(dir.path().join("usr/srv/app/fixed_notes.txt")).unwrap(),
        "new notes\n"
    );
}

#[test]
fn test_write_refuses_root_and_directories() {
    let dir = setup_workspace();
    let content = dir.path().join("new.py");
    fs::write(&content, "x = 1\n").unwrap();
    let root = dir.path().join("usr/srv/app");

    for reported in ["/", ".", "/services"] {
        let output = tracefix(
            dir.path(),
            &[
                "write",
                "-r",
                root.to_str().unwrap(),
                reported,
                "--content",
                content.to_str().unwrap(),
            ],
        );
        assert!(!output.status.success(), "{reported} should be refused");
    }
    assert!(!dir.path().join("usr/srv/fixed_app").exists());
    assert!(!root.join("fixed_services").exists());
}
