//! Mapping of reported (possibly foreign) file paths onto a local root.
//!
//! Stack frames carry the path the failing process saw, often on a
//! different machine or inside a container. [`PathResolver`] turns such a
//! path into a location under the configured local root with exactly one
//! deterministic join, and refuses anything that would land outside it.
//!
//! # Join rule
//!
//! 1. `\` separators are treated as `/`.
//! 2. A drive designator (`C:`) or a UNC `//host/share` pair is dropped.
//! 3. A configured strip prefix is dropped when it matches whole segments.
//! 4. Leading separators, empty segments and `.` segments are dropped.
//! 5. Any `..` segment rejects the path.
//! 6. The remaining segments are joined onto the root. A path with none
//!    left (`/`, `.`, or exactly the strip prefix) is rejected.
//!
//! So `/usr/srv/app/models.py` under `./target-codebase` becomes
//! `./target-codebase/usr/srv/app/models.py`.

use serde::Serialize;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use thiserror::Error;
use tracing::debug;

/// A reported path together with its local counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    reported: String,
    local: PathBuf,
    resolved: bool,
}

impl ResolvedPath {
    /// Wrap an already-local path, checking existence.
    pub fn local_only(path: impl Into<PathBuf>) -> Self {
        let local = path.into();
        Self {
            reported: local.display().to_string(),
            resolved: local.exists(),
            local,
        }
    }

    /// The path exactly as it was reported.
    pub fn reported(&self) -> &str {
        &self.reported
    }

    /// The local filesystem path the report maps to.
    pub fn local(&self) -> &Path {
        &self.local
    }

    /// Whether the local path existed when resolution ran.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Return the local path, or `NotFound` when resolution failed.
    pub fn require(&self) -> Result<&Path, ResolveError> {
        if self.resolved {
            Ok(&self.local)
        } else {
            Err(ResolveError::NotFound {
                reported: self.reported.clone(),
                local: self.local.clone(),
            })
        }
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Path escapes local root: {reported} (root: {root})")]
    PathTraversalRejected { reported: String, root: PathBuf },

    #[error("Reported path not found locally: {reported} (looked at {local})")]
    NotFound { reported: String, local: PathBuf },

    #[error("Reported path names no file under the root: {reported}")]
    NoFileSegments { reported: String },

    #[error("Local root is not a directory: {0}")]
    InvalidRoot(PathBuf),

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves reported paths against an optional local root.
///
/// Holds no per-lookup state: every call to [`PathResolver::resolve`] is an
/// independent join-and-check.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    /// Canonical local root, if one is configured
    root: Option<PathBuf>,
    /// Leading segments to drop from reported paths before joining
    strip_prefix: Vec<String>,
}

impl PathResolver {
    /// A resolver with no local root; reported paths are used as given.
    pub fn unrooted() -> Self {
        Self::default()
    }

    /// A resolver joining reported paths onto `root`.
    ///
    /// The root is canonicalized so symlinked roots compare correctly. A
    /// leading `~` expands to the home directory.
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self, ResolveError> {
        let root = expand_home(root.as_ref());
        if !root.is_dir() {
            return Err(ResolveError::InvalidRoot(root));
        }
        let root = root
            .canonicalize()
            .map_err(|source| ResolveError::Canonicalize {
                path: root.clone(),
                source,
            })?;

        Ok(Self {
            root: Some(root),
            strip_prefix: Vec::new(),
        })
    }

    /// Build from an optional setting; unset or blank means unrooted.
    pub fn from_setting(root: Option<&str>) -> Result<Self, ResolveError> {
        match root.map(str::trim) {
            Some(root) if !root.is_empty() => Self::with_root(root),
            _ => Ok(Self::unrooted()),
        }
    }

    /// Drop `prefix` (e.g. `/usr/srv/app`) from reported paths that start
    /// with it on whole-segment boundaries.
    pub fn strip_prefix(mut self, prefix: &str) -> Self {
        self.strip_prefix = split_segments(&prefix.replace('\\', "/"))
            .into_iter()
            .filter(|s| *s != "..")
            .map(str::to_string)
            .collect();
        self
    }

    /// Get the configured root.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve a reported path.
    ///
    /// Returns `Ok` with `resolved=false` when the target does not exist, and
    /// `PathTraversalRejected` when the path would leave the root.
    pub fn resolve(&self, reported: &str) -> Result<ResolvedPath, ResolveError> {
        let Some(root) = &self.root else {
            let local = PathBuf::from(to_host_separators(reported));
            let resolved = local.exists();
            debug!(reported, local = %local.display(), resolved, "resolved without root");
            return Ok(ResolvedPath {
                reported: reported.to_string(),
                local,
                resolved,
            });
        };

        let rejected = || ResolveError::PathTraversalRejected {
            reported: reported.to_string(),
            root: root.clone(),
        };

        let segments = relative_segments(reported, &self.strip_prefix).ok_or_else(rejected)?;
        if segments.is_empty() {
            return Err(ResolveError::NoFileSegments {
                reported: reported.to_string(),
            });
        }

        let mut local = root.clone();
        local.extend(&segments);

        let resolved = local.exists();
        if resolved {
            // Symlinks inside the root must not lead out of it
            let canonical = local
                .canonicalize()
                .map_err(|source| ResolveError::Canonicalize {
                    path: local.clone(),
                    source,
                })?;
            if !canonical.starts_with(root) {
                return Err(rejected());
            }
        }

        debug!(reported, local = %local.display(), resolved, "resolved against root");

        Ok(ResolvedPath {
            reported: reported.to_string(),
            local,
            resolved,
        })
    }
}

/// Reduce a reported path to the segments joined onto the root.
///
/// Returns `None` if any `..` segment is present.
fn relative_segments(reported: &str, strip: &[String]) -> Option<Vec<String>> {
    let unified = reported.replace('\\', "/");
    let rest = drop_volume(&unified);

    let mut segments = split_segments(rest);
    if segments.iter().any(|s| *s == "..") {
        return None;
    }

    let strips = !strip.is_empty()
        && segments.len() >= strip.len()
        && segments.iter().zip(strip).all(|(a, b)| *a == b.as_str());
    if strips {
        segments.drain(..strip.len());
    }

    Some(segments.into_iter().map(str::to_string).collect())
}

/// Remove a drive designator or UNC host/share from a `/`-separated path.
fn drop_volume(path: &str) -> &str {
    if let Some(unc) = path.strip_prefix("//") {
        let mut parts = unc.splitn(3, '/');
        parts.next();
        parts.next();
        return parts.next().unwrap_or("");
    }

    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return &path[2..];
    }

    path
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn to_host_separators(path: &str) -> String {
    path.chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect()
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
