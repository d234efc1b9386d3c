//! Structured diagnostics for the build pipeline.
//!
//! Recoverable failures (unloadable references, unreadable or unparsable
//! files, unresolved patch targets) are collected here instead of aborting
//! the build, then persisted and summarized.

pub mod build_diagnostics;

pub use build_diagnostics::{BuildDiagnostic, DiagnosticStage, SkipReason};
