//! Thread-local parser pooling.
//!
//! Creating a tree-sitter parser and loading a grammar is not free, and a
//! run validates the same language repeatedly. One parser per language is
//! kept per thread and reused.

use crate::syntax::{SourceParser, SyntaxError};
use ast_grep_language::SupportLang;
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<SupportLang, SourceParser>> = RefCell::new(HashMap::new());
}

/// Execute function with a pooled parser for `lang`.
///
/// The first call per thread and language creates the parser; later calls
/// reuse it.
pub fn with_parser<F, R>(lang: SupportLang, f: F) -> Result<R, SyntaxError>
where
    F: FnOnce(&mut SourceParser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(lang) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(SourceParser::new(lang)?),
        };
        Ok(f(parser))
    })
}

/// Number of parsers held by the current thread.
pub fn pooled_count() -> usize {
    PARSERS.with(|cell| cell.borrow().len())
}
