//! Whole-file reads of resolved source files.

use crate::resolve::ResolvedPath;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied reading {0}")]
    PermissionDenied(PathBuf),

    #[error("Path is not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Invalid line range {start}..={end} in {path} ({line_count} lines)")]
    InvalidRange {
        path: PathBuf,
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReadError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => ReadError::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => ReadError::PermissionDenied(path.to_path_buf()),
            _ => ReadError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Text encoding a file was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    Utf8,
    /// Fallback for non-UTF-8 bytes; every byte maps to one char
    Latin1,
}

/// Contents of a source file plus the metadata reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
    pub line_count: usize,
    pub size_bytes: u64,
    pub encoding: Encoding,
}

/// Read the file behind a resolved path.
///
/// Unresolved paths fail with `NotFound` without touching the disk again.
pub fn read(path: &ResolvedPath) -> Result<SourceFile, ReadError> {
    if !path.is_resolved() {
        return Err(ReadError::NotFound(path.local().to_path_buf()));
    }
    read_file(path.local())
}

/// Read a local file, decoding UTF-8 with a Latin-1 fallback.
pub fn read_file(path: &Path) -> Result<SourceFile, ReadError> {
    let metadata = fs::metadata(path).map_err(|e| ReadError::from_io(path, e))?;
    if !metadata.is_file() {
        return Err(ReadError::NotAFile(path.to_path_buf()));
    }

    let bytes = fs::read(path).map_err(|e| ReadError::from_io(path, e))?;
    let size_bytes = bytes.len() as u64;

    let (content, encoding) = match String::from_utf8(bytes) {
        Ok(text) => (text, Encoding::Utf8),
        Err(err) => {
            let text = err.into_bytes().iter().map(|&b| b as char).collect();
            (text, Encoding::Latin1)
        }
    };

    let line_count = content.split('\n').count();
    debug!(path = %path.display(), size_bytes, line_count, ?encoding, "read source file");

    Ok(SourceFile {
        path: path.to_path_buf(),
        content,
        line_count,
        size_bytes,
        encoding,
    })
}

/// Read lines `start..=end` (1-based) of a resolved file.
///
/// The returned text keeps the original line endings between lines and has
/// no trailing newline.
pub fn read_lines(path: &ResolvedPath, start: usize, end: usize) -> Result<String, ReadError> {
    let file = read(path)?;
    slice_lines(&file, start, end)
}

pub(crate) fn slice_lines(file: &SourceFile, start: usize, end: usize) -> Result<String, ReadError> {
    let lines: Vec<&str> = file.content.split('\n').collect();
    if start == 0 || start > end || end > lines.len() {
        return Err(ReadError::InvalidRange {
            path: file.path.clone(),
            start,
            end,
            line_count: lines.len(),
        });
    }
    Ok(lines[start - 1..end].join("\n"))
}
