//! Integration tests against the fixture trace and codebase.
//!
//! Each test works on its own copy of `tests/fixtures/target-codebase` so
//! patch outputs never land in the source tree.

mod pipeline_run;
mod properties;
mod scenarios;

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Copy the fixture codebase into a fresh temp dir; returns the dir and its
/// `target-codebase` root.
pub fn fixture_workspace() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("target-codebase");
    copy_tree(&fixture("target-codebase"), &root);
    (dir, root)
}

fn copy_tree(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}
