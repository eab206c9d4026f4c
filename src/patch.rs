//! Patch materialization: fixed content is written next to the original.
//!
//! The original file referenced by a trace is immutable input. A patch for
//! `services/user.py` lands in `services/fixed_user.py`; the original is
//! never opened for writing, and re-running overwrites the sibling.

use serde::Serialize;
use similar::TextDiff;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "fixed_";

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Invalid output prefix {0:?}: must be non-empty and contain no path separators")]
    InvalidPrefix(String),

    #[error("Target has no file name: {0}")]
    NoFileName(PathBuf),
}

/// How the sibling output file is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    prefix: String,
}

impl NamingPolicy {
    /// Name outputs `<prefix><original file name>`.
    pub fn prefixed(prefix: impl Into<String>) -> Result<Self, PatchError> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.contains(['/', '\\']) || prefix == "." || prefix == ".." {
            return Err(PatchError::InvalidPrefix(prefix));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Compute the sibling path for `original`.
    ///
    /// The result is in the same directory and, because the prefix is never
    /// empty, never equal to `original`.
    pub fn sibling_of(&self, original: &Path) -> Result<PathBuf, PatchError> {
        let name = original
            .file_name()
            .ok_or_else(|| PatchError::NoFileName(original.to_path_buf()))?;

        let mut fixed = std::ffi::OsString::from(&self.prefix);
        fixed.push(name);
        Ok(original.with_file_name(fixed))
    }
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

/// A request to materialize new content for `target`.
#[derive(Debug, Clone)]
pub struct PatchRequest {
    /// Resolved path of the original file
    pub target: PathBuf,
    /// Full replacement content
    pub content: String,
    pub naming: NamingPolicy,
}

/// Category of a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteErrorKind {
    PermissionDenied,
    /// Directory of the target does not exist
    NotFound,
    StorageFull,
    /// Target cannot have a sibling (no file name, or not a regular file)
    InvalidTarget,
    Other,
}

impl WriteErrorKind {
    fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            ErrorKind::PermissionDenied => WriteErrorKind::PermissionDenied,
            ErrorKind::NotFound => WriteErrorKind::NotFound,
            ErrorKind::StorageFull => WriteErrorKind::StorageFull,
            _ => WriteErrorKind::Other,
        }
    }
}

/// Outcome of one patch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "PatchResult should be checked for success"]
pub struct PatchResult {
    pub original: PathBuf,
    /// Sibling path, when one could be computed
    pub output: Option<PathBuf>,
    pub success: bool,
    pub error: Option<WriteErrorKind>,
    pub message: Option<String>,
    pub bytes_written: usize,
    /// xxh3 of the written content
    pub content_hash: Option<u64>,
}

impl PatchResult {
    fn failed(
        original: &Path,
        output: Option<PathBuf>,
        kind: WriteErrorKind,
        message: String,
    ) -> Self {
        Self {
            original: original.to_path_buf(),
            output,
            success: false,
            error: Some(kind),
            message: Some(message),
            bytes_written: 0,
            content_hash: None,
        }
    }
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.output, self.success) {
            (Some(output), true) => write!(
                f,
                "Wrote {} ({} bytes)",
                output.display(),
                self.bytes_written
            ),
            _ => write!(
                f,
                "Failed to patch {}: {}",
                self.original.display(),
                self.message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Writes patched content to sibling files.
#[derive(Debug, Clone, Default)]
pub struct PatchWriter {
    naming: NamingPolicy,
}

impl PatchWriter {
    pub fn new(naming: NamingPolicy) -> Self {
        Self { naming }
    }

    pub fn naming(&self) -> &NamingPolicy {
        &self.naming
    }

    /// Build a request using this writer's naming policy.
    pub fn request(&self, target: impl Into<PathBuf>, content: impl Into<String>) -> PatchRequest {
        PatchRequest {
            target: target.into(),
            content: content.into(),
            naming: self.naming.clone(),
        }
    }

    /// Shorthand for `write(&request(target, content))`.
    pub fn write_to(&self, target: &Path, content: &str) -> PatchResult {
        self.write(&self.request(target, content))
    }

    /// Materialize a patch.
    ///
    /// Errors never escape: they are reported in the returned [`PatchResult`].
    pub fn write(&self, request: &PatchRequest) -> PatchResult {
        let target = request.target.as_path();

        let output = match request.naming.sibling_of(target) {
            Ok(output) => output,
            Err(e) => {
                warn!(target = %target.display(), error = %e, "no sibling path");
                return PatchResult::failed(target, None, WriteErrorKind::InvalidTarget, e.to_string());
            }
        };

        if output == target {
            return PatchResult::failed(
                target,
                None,
                WriteErrorKind::InvalidTarget,
                "sibling path equals original".to_string(),
            );
        }

        let metadata = fs::metadata(target).ok();
        if metadata.as_ref().is_some_and(|m| !m.is_file()) {
            warn!(target = %target.display(), "target is not a regular file");
            return PatchResult::failed(
                target,
                None,
                WriteErrorKind::InvalidTarget,
                "target is not a regular file".to_string(),
            );
        }
        let permissions = metadata.map(|m| m.permissions());

        match atomic_write(&output, request.content.as_bytes(), permissions) {
            Ok(()) => {
                info!(
                    original = %target.display(),
                    output = %output.display(),
                    bytes = request.content.len(),
                    "patch written"
                );
                PatchResult {
                    original: target.to_path_buf(),
                    output: Some(output),
                    success: true,
                    error: None,
                    message: None,
                    bytes_written: request.content.len(),
                    content_hash: Some(xxh3_64(request.content.as_bytes())),
                }
            }
            Err(e) => {
                let kind = WriteErrorKind::from_io(&e);
                warn!(output = %output.display(), ?kind, error = %e, "patch write failed");
                PatchResult::failed(target, Some(output), kind, e.to_string())
            }
        }
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// The tempfile lives in the destination directory so the rename stays on
/// one filesystem. Readers see the old file or the new one, never a mix.
fn atomic_write(
    path: &Path,
    content: &[u8],
    permissions: Option<fs::Permissions>,
) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions)?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// One `original -> fixed` snippet replacement from a fix plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetReplacement {
    pub original: String,
    pub fixed: String,
    /// Line the plan expects the change at, for the change log only
    pub line_hint: Option<u32>,
}

/// Content produced by applying a list of replacements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub content: String,
    pub applied: usize,
    pub requested: usize,
    pub change_log: Vec<String>,
    pub warnings: Vec<String>,
}

impl ChangeSet {
    pub fn is_complete(&self) -> bool {
        self.applied == self.requested
    }
}

/// Apply replacements in order to `original`, each to its first occurrence.
///
/// Snippets are compared with surrounding whitespace trimmed, so a fixed
/// snippet inherits the indentation in front of the original's first line.
/// Replacements whose snippet is absent are skipped and reported.
pub fn apply_changes(original: &str, changes: &[SnippetReplacement]) -> ChangeSet {
    let mut content = original.to_string();
    let mut applied = 0;
    let mut change_log = Vec::new();
    let mut warnings = Vec::new();

    for (idx, change) in changes.iter().enumerate() {
        let number = idx + 1;
        let from = change.original.trim();
        let to = change.fixed.trim();

        if from.is_empty() || !content.contains(from) {
            warnings.push(format!(
                "Change {number}: original snippet not found in content, skipped"
            ));
            continue;
        }

        let occurrences = content.matches(from).count();
        if occurrences > 1 {
            warnings.push(format!(
                "Change {number}: matches {occurrences} locations, applied to first occurrence only"
            ));
        }

        content = content.replacen(from, to, 1);
        applied += 1;

        let line = change
            .line_hint
            .map_or_else(|| "unknown".to_string(), |l| l.to_string());
        change_log.push(format!("Change {number}: replaced at line ~{line}"));
    }

    ChangeSet {
        content,
        applied,
        requested: changes.len(),
        change_log,
        warnings,
    }
}

/// Unified diff between the original and patched text.
pub fn diff_summary(original: &str, patched: &str, original_name: &str, patched_name: &str) -> String {
    TextDiff::from_lines(original, patched)
        .unified_diff()
        .context_radius(3)
        .header(original_name, patched_name)
        .to_string()
}
