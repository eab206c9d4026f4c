//! Snippet verification: the precondition gate before any patch is written.
//!
//! A patch proposal claims that some code is present in the target file.
//! [`verify`] re-reads the file and checks the claim with exact,
//! whitespace-sensitive containment. Absence is a normal outcome meaning the
//! proposal was built against stale code.

use crate::resolve::ResolvedPath;
use crate::source::{self, ReadError};
use serde::Serialize;
use tracing::{debug, warn};

/// Minimum normalized similarity for a line to be offered as a suggestion.
const SUGGESTION_CUTOFF: f64 = 0.6;
const MAX_SUGGESTIONS: usize = 3;

/// How a snippet is compared against file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Exact substring containment
    #[default]
    Exact,
    /// Line-by-line comparison ignoring leading and trailing whitespace.
    /// Only used when a caller asks for it.
    LineTrimmed,
}

/// Check that `snippet` is an exact substring of the file's current text.
///
/// The file is read on every call so the answer reflects the disk, not an
/// earlier read.
pub fn verify(path: &ResolvedPath, snippet: &str) -> Result<bool, ReadError> {
    let file = source::read(path)?;
    let present = verify_text(&file.content, snippet);
    if present {
        debug!(path = %path.local().display(), "snippet present");
    } else {
        warn!(path = %path.local().display(), "snippet absent");
    }
    Ok(present)
}

/// Exact containment check on already-loaded text.
pub fn verify_text(content: &str, snippet: &str) -> bool {
    content.contains(snippet)
}

/// The fragment a claim is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimFragment {
    /// Text expected somewhere in the file
    Text(String),
    /// Text expected at exactly lines `start..=end` (1-based)
    Lines {
        start: usize,
        end: usize,
        expected: String,
    },
}

/// A claim that a file currently contains some code.
#[derive(Debug, Clone)]
pub struct SnippetClaim {
    pub path: ResolvedPath,
    pub fragment: ClaimFragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimOutcome {
    Present,
    Absent,
}

/// Evaluate a claim against the file on disk.
///
/// A line range outside the file is `Absent`, not an error.
pub fn verify_claim(claim: &SnippetClaim) -> Result<ClaimOutcome, ReadError> {
    let present = match &claim.fragment {
        ClaimFragment::Text(text) => verify(&claim.path, text)?,
        ClaimFragment::Lines {
            start,
            end,
            expected,
        } => {
            let file = source::read(&claim.path)?;
            match source::slice_lines(&file, *start, *end) {
                Ok(actual) => actual == *expected,
                Err(ReadError::InvalidRange { .. }) => false,
                Err(e) => return Err(e),
            }
        }
    };

    Ok(if present {
        ClaimOutcome::Present
    } else {
        ClaimOutcome::Absent
    })
}

/// Where a snippet sits in a file, or what it might have meant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnippetMatch {
    pub found: bool,
    /// 1-based line of the first match
    pub line_number: Option<usize>,
    /// Non-overlapping matches (exact mode) or matching windows (trimmed mode)
    pub occurrences: usize,
    /// File text of the matched lines
    pub matched: Option<String>,
    /// Matched lines plus surrounding context
    pub context: Option<String>,
    /// Closest lines when nothing matched
    pub suggestions: Vec<String>,
}

impl SnippetMatch {
    fn absent(suggestions: Vec<String>) -> Self {
        Self {
            found: false,
            line_number: None,
            occurrences: 0,
            matched: None,
            context: None,
            suggestions,
        }
    }
}

/// Locate `snippet` in `content` and describe the surrounding code.
///
/// An empty snippet locates nothing.
pub fn locate(content: &str, snippet: &str, mode: MatchMode, context_lines: usize) -> SnippetMatch {
    if snippet.is_empty() {
        return SnippetMatch::absent(Vec::new());
    }

    let lines: Vec<&str> = content.split('\n').collect();

    let hit = match mode {
        MatchMode::Exact => content.find(snippet).map(|offset| {
            let first = content[..offset].matches('\n').count();
            let last = first + snippet.matches('\n').count();
            (first, last, content.matches(snippet).count())
        }),
        MatchMode::LineTrimmed => {
            let wanted: Vec<&str> = snippet.trim().split('\n').map(str::trim).collect();
            let windows: Vec<usize> = lines
                .windows(wanted.len())
                .enumerate()
                .filter(|(_, window)| window.iter().map(|l| l.trim()).eq(wanted.iter().copied()))
                .map(|(idx, _)| idx)
                .collect();
            windows
                .first()
                .map(|&first| (first, first + wanted.len() - 1, windows.len()))
        }
    };

    let Some((first, last, occurrences)) = hit else {
        return SnippetMatch::absent(suggest(&lines, snippet));
    };

    let start = first.saturating_sub(context_lines);
    let end = (last + context_lines + 1).min(lines.len());

    SnippetMatch {
        found: true,
        line_number: Some(first + 1),
        occurrences,
        matched: Some(lines[first..=last].join("\n")),
        context: Some(lines[start..end].join("\n")),
        suggestions: Vec::new(),
    }
}

fn suggest(lines: &[&str], snippet: &str) -> Vec<String> {
    let wanted = snippet.trim();
    let mut scored: Vec<(f64, &str)> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| (strsim::normalized_levenshtein(wanted, l), l))
        .filter(|(score, _)| *score >= SUGGESTION_CUTOFF)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.dedup_by(|a, b| a.1 == b.1);

    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, l)| l.to_string())
        .collect()
}
