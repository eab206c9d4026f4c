//! The fixed tool set the patch stage works through.

use crate::patch::{PatchResult, PatchWriter};
use crate::resolve::{PathResolver, ResolveError, ResolvedPath};
use crate::source::{self, Encoding, ReadError, SourceFile};
use crate::syntax::{self, SyntaxError, Validation};
use crate::verify;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("Patch target is not a regular file: {0}")]
    NotAFile(PathBuf),
}

/// One tool invocation. Paths are as reported unless noted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    ReadSource {
        path: String,
        /// 1-based inclusive line range; whole file when unset
        #[serde(default)]
        lines: Option<(usize, usize)>,
    },
    VerifySnippet {
        path: String,
        snippet: String,
    },
    WritePatch {
        path: String,
        content: String,
    },
    /// `path` is a local file, typically a patch output
    ValidateSyntax {
        path: PathBuf,
    },
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ReadSource { .. } => "read_source",
            ToolCall::VerifySnippet { .. } => "verify_snippet",
            ToolCall::WritePatch { .. } => "write_patch",
            ToolCall::ValidateSyntax { .. } => "validate_syntax",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolOutput {
    ReadSource {
        resolved: ResolvedPath,
        content: String,
        line_count: usize,
        encoding: Encoding,
    },
    VerifySnippet {
        resolved: ResolvedPath,
        present: bool,
    },
    WritePatch {
        result: PatchResult,
    },
    ValidateSyntax {
        validation: Validation,
    },
}

/// Resolver and writer bound together for one run.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    resolver: PathResolver,
    writer: PatchWriter,
}

impl Toolbox {
    pub fn new(resolver: PathResolver, writer: PatchWriter) -> Self {
        Self { resolver, writer }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn writer(&self) -> &PatchWriter {
        &self.writer
    }

    pub fn invoke(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        match call {
            ToolCall::ReadSource { path, lines } => {
                let (resolved, file) = self.read_source(path)?;
                let content = match lines {
                    Some((start, end)) => source::slice_lines(&file, *start, *end)?,
                    None => file.content,
                };
                Ok(ToolOutput::ReadSource {
                    resolved,
                    content,
                    line_count: file.line_count,
                    encoding: file.encoding,
                })
            }
            ToolCall::VerifySnippet { path, snippet } => {
                let (resolved, present) = self.verify_snippet(path, snippet)?;
                Ok(ToolOutput::VerifySnippet { resolved, present })
            }
            ToolCall::WritePatch { path, content } => Ok(ToolOutput::WritePatch {
                result: self.write_patch(path, content)?,
            }),
            ToolCall::ValidateSyntax { path } => Ok(ToolOutput::ValidateSyntax {
                validation: self.validate_syntax(path)?,
            }),
        }
    }

    pub fn read_source(&self, path: &str) -> Result<(ResolvedPath, SourceFile), ToolError> {
        let resolved = self.resolver.resolve(path)?;
        let file = source::read(&resolved)?;
        Ok((resolved, file))
    }

    pub fn verify_snippet(&self, path: &str, snippet: &str) -> Result<(ResolvedPath, bool), ToolError> {
        let resolved = self.resolver.resolve(path)?;
        let present = verify::verify(&resolved, snippet)?;
        Ok((resolved, present))
    }

    /// Write `content` next to the resolved original, which must be an
    /// existing regular file.
    pub fn write_patch(&self, path: &str, content: &str) -> Result<PatchResult, ToolError> {
        let resolved = self.resolver.resolve(path)?;
        let local = resolved.require()?;
        if !local.is_file() {
            return Err(ToolError::NotAFile(local.to_path_buf()));
        }
        Ok(self.writer.write_to(local, content))
    }

    pub fn validate_syntax(&self, path: &Path) -> Result<Validation, ToolError> {
        Ok(syntax::validate_file(path)?)
    }
}
