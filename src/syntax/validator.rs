use crate::pool;
use crate::syntax::errors::SyntaxError;
use crate::syntax::parser::{language_for_path, ParsedSource};
use ast_grep_language::SupportLang;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Longest excerpt of unexpected text quoted in a diagnostic.
const EXCERPT_CHARS: usize = 40;

/// One syntax problem, 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

/// Result of a syntax check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub language: String,
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl Validation {
    /// Diagnostic text for reports; `None` when valid.
    pub fn summary(&self) -> Option<String> {
        let first = self.diagnostics.first()?;
        Some(match self.diagnostics.len() {
            1 => first.to_string(),
            n => format!("{first} (and {} more)", n - 1),
        })
    }
}

/// Syntax checker for one grammar.
#[derive(Debug, Clone, Copy)]
pub struct SyntaxValidator {
    lang: SupportLang,
}

impl SyntaxValidator {
    pub fn new(lang: SupportLang) -> Self {
        Self { lang }
    }

    /// Choose the grammar from the file extension.
    pub fn for_path(path: &Path) -> Result<Self, SyntaxError> {
        language_for_path(path)
            .map(Self::new)
            .ok_or_else(|| SyntaxError::UnsupportedLanguage {
                path: path.to_path_buf(),
            })
    }

    pub fn lang(&self) -> SupportLang {
        self.lang
    }

    /// Parse `source` and report every ERROR or MISSING region.
    pub fn validate(&self, source: &str) -> Result<Validation, SyntaxError> {
        let diagnostics = pool::with_parser(self.lang, |parser| {
            let parsed = parser.parse_with_source(source)?;
            Ok::<_, SyntaxError>(collect_diagnostics(&parsed))
        })??;

        Ok(Validation {
            language: format!("{:?}", self.lang),
            valid: diagnostics.is_empty(),
            diagnostics,
        })
    }
}

/// Validate in-memory source with an explicit grammar.
pub fn validate_source(lang: SupportLang, source: &str) -> Result<Validation, SyntaxError> {
    SyntaxValidator::new(lang).validate(source)
}

/// Read and validate a file, picking the grammar from its extension.
pub fn validate_file(path: &Path) -> Result<Validation, SyntaxError> {
    let validator = SyntaxValidator::for_path(path)?;
    let source = std::fs::read_to_string(path).map_err(|source| SyntaxError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let validation = validator.validate(&source)?;
    if validation.valid {
        debug!(path = %path.display(), "syntax valid");
    } else {
        warn!(
            path = %path.display(),
            errors = validation.diagnostics.len(),
            "syntax invalid"
        );
    }
    Ok(validation)
}

fn collect_diagnostics(parsed: &ParsedSource<'_>) -> Vec<Diagnostic> {
    parsed
        .error_nodes()
        .into_iter()
        .map(|node| {
            let start = node.start_position();
            let message = if node.is_missing() {
                format!("missing \"{}\"", node.kind())
            } else {
                let text = parsed.node_text(node).trim();
                let excerpt: String = text
                    .lines()
                    .next()
                    .unwrap_or("")
                    .chars()
                    .take(EXCERPT_CHARS)
                    .collect();
                if excerpt.is_empty() {
                    "syntax error".to_string()
                } else {
                    format!("unexpected \"{excerpt}\"")
                }
            };

            Diagnostic {
                line: start.row + 1,
                column: start.column + 1,
                byte_start: node.start_byte(),
                byte_end: node.end_byte(),
                message,
            }
        })
        .collect()
}
