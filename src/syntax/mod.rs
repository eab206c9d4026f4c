//! Tree-sitter syntax checks for patched files.
//!
//! A patched file is parsed with the grammar matching its extension. Any
//! ERROR or MISSING node makes it invalid. Nothing is executed and nothing
//! is written.

pub mod errors;
pub mod parser;
pub mod validator;

pub use errors::SyntaxError;
pub use parser::{language_for_path, ParsedSource, SourceParser};
pub use validator::{validate_file, validate_source, Diagnostic, SyntaxValidator, Validation};
