//! Project file reading: evaluation, caching and content extraction
//!
//! The reader takes a project file on disk and turns it into structured
//! data. Evaluation runs in two modes per file: exact, which follows only
//! the branches the configuration decides, and cumulative, which follows
//! every branch to find all reachable structure. Parses are shared through
//! a reference-counted cache so concurrent reads of overlapping trees do
//! the work once.

pub mod bindings;
pub mod cache;
pub mod contents;
pub mod error;
pub mod functions;
pub mod globals;
pub mod read;

mod eval;

pub use bindings::{FileKind, ProjectType, VariableBindings};
pub use cache::{CacheEntry, ParseCache};
pub use contents::{FileEntry, InstallRule, ProContents, TargetDescription};
pub use error::{ReadError, ReadResult};
pub use functions::WildcardExpansion;
pub use globals::{host_features, Globals};
pub use read::{EvalOutcome, ProData, ProReadResult, ProReader, ProSubtree};
