//! modscope: call-graph, patch and config-edit analysis for a C# game
//! codebase and the extensions written against it.
//!
//! A build parses every source tree, resolves calls, discovers runtime
//! patches and configuration edits, and persists the result in a SQLite
//! store. Queries and the compatibility report read that store.
//!
//! # Position Conventions
//!
//! - **Line positions**: 1-indexed
//! - **File paths**: relative to the source root, extension directory or
//!   config directory they were found under, with `/` separators
//!
//! # Identifiers
//!
//! Type and method ids are assigned in sorted file order and depth-first
//! declaration order, so rebuilding unchanged input yields identical ids.

pub mod common;
pub mod conflicts;
pub mod diagnostics;
pub mod discover;
pub mod error;
pub mod error_codes;
pub mod events;
pub mod ingest;
pub mod model;
pub mod output;
pub mod patches;
pub mod pipeline;
pub mod refs;
pub mod resolve;
pub mod settings;
pub mod store;
pub mod validation;
pub mod version;
pub mod xmlconf;

pub use conflicts::{CompatReport, Conflict, ConflictKind};
pub use diagnostics::{BuildDiagnostic, DiagnosticStage, SkipReason};
pub use error::{BuildError, QueryError};
pub use model::{Callee, Confidence, ConfigOp, PatchKind, Severity};
pub use output::{generate_execution_id, output_json, JsonResponse, OutputFormat};
pub use pipeline::{build, BuildOptions, BuildReport, BuildSummary};
pub use settings::AnalyzerSettings;
pub use store::Store;
pub use validation::{validate_input_dir, PathValidationError};
