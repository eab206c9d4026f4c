//! tracefix: turn a captured exception trace into a verified, side-by-side fix.
//!
//! Paths in a trace are reported by the failing process, often from another
//! machine or OS. They are mapped onto a local checkout, the code a fix is
//! based on is verified against the file as it is now, and the fixed file is
//! written next to the original, then syntax-checked.
//!
//! # Architecture
//!
//! The filesystem core is small and synchronous:
//!
//! - [`resolve`]: reported path + local root to a [`ResolvedPath`]
//! - [`source`]: whole-file and line-range reads
//! - [`verify`]: exact snippet containment, the gate before any write
//! - [`patch`]: `<prefix><name>` sibling writes, atomic, never touching the original
//! - [`syntax`]: tree-sitter check of the written file
//!
//! [`pipeline`] drives three model-backed stages (diagnosis, plan, patch)
//! over these components through a fixed tool set.
//!
//! # Safety
//!
//! - `..` in a reported path is rejected, as is a symlink leading out of the root
//! - The original file is never opened for writing
//! - Nothing is written unless the claimed code is present verbatim
//! - Writes are tempfile + fsync + rename
//!
//! # Example
//!
//! ```no_run
//! use tracefix::{verify, PathResolver, PatchWriter};
//!
//! let resolver = PathResolver::with_root("./target-codebase")?
//!     .strip_prefix("/usr/srv/app");
//! let target = resolver.resolve("/usr/srv/app/services/user.py")?;
//!
//! if verify::verify(&target, "User.emails == data.email")? {
//!     let fixed = "...";
//!     let result = PatchWriter::default().write_to(target.require()?, fixed);
//!     println!("{result}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod patch;
pub mod pipeline;
pub mod pool;
pub mod resolve;
pub mod source;
pub mod syntax;
pub mod telemetry;
pub mod trace;
pub mod verify;

// Re-exports
pub use config::{ConfigError, Settings};
pub use patch::{
    apply_changes, NamingPolicy, PatchError, PatchRequest, PatchResult, PatchWriter,
    SnippetReplacement, WriteErrorKind,
};
pub use pipeline::{run, Model, PipelineError, ReplayModel, RunReport};
pub use resolve::{PathResolver, ResolveError, ResolvedPath};
pub use source::{ReadError, SourceFile};
pub use syntax::{validate_file, validate_source, SyntaxError, SyntaxValidator, Validation};
pub use trace::{ErrorRecord, StackFrame, TraceError};
pub use verify::{verify_claim, ClaimFragment, ClaimOutcome, MatchMode, SnippetClaim};
