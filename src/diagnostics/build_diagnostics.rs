//! Build diagnostics with deterministic ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Reason why an input was skipped during a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Matched an exclude pattern from settings
    ExcludedByGlob,
    /// Binary has no CLI header (native or resource-only)
    NotManagedAssembly,
    /// Binary is truncated or its metadata is malformed
    CorruptAssembly,
    /// Extension directory has no manifest; directory name used instead
    MissingManifest,
    /// File is not valid UTF-8 text
    NotText,
    /// Symlink or path resolving outside the scanned directory
    OutsideRoot,
}

impl SkipReason {
    /// Stable sort key for deterministic ordering.
    pub fn sort_key(&self) -> u8 {
        match self {
            SkipReason::ExcludedByGlob => 0,
            SkipReason::MissingManifest => 1,
            SkipReason::NotText => 2,
            SkipReason::NotManagedAssembly => 3,
            SkipReason::CorruptAssembly => 4,
            SkipReason::OutsideRoot => 5,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SkipReason::ExcludedByGlob => "excluded by pattern",
            SkipReason::NotManagedAssembly => "not a managed assembly",
            SkipReason::CorruptAssembly => "corrupt assembly metadata",
            SkipReason::MissingManifest => "no manifest, using directory name",
            SkipReason::NotText => "not valid UTF-8 text",
            SkipReason::OutsideRoot => "resolves outside the scanned directory",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl PartialOrd for SkipReason {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SkipReason {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Pipeline stage where a problem occurred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DiagnosticStage {
    Discover,
    LoadReference,
    Read,
    Parse,
    Resolve,
    Patch,
    ConfigDefinition,
    ConfigEdit,
}

impl DiagnosticStage {
    pub fn sort_key(&self) -> u8 {
        match self {
            DiagnosticStage::Discover => 0,
            DiagnosticStage::LoadReference => 1,
            DiagnosticStage::Read => 2,
            DiagnosticStage::Parse => 3,
            DiagnosticStage::Resolve => 4,
            DiagnosticStage::Patch => 5,
            DiagnosticStage::ConfigDefinition => 6,
            DiagnosticStage::ConfigEdit => 7,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DiagnosticStage::Discover => "discovering sources",
            DiagnosticStage::LoadReference => "loading reference",
            DiagnosticStage::Read => "reading file",
            DiagnosticStage::Parse => "parsing source",
            DiagnosticStage::Resolve => "resolving calls",
            DiagnosticStage::Patch => "discovering patches",
            DiagnosticStage::ConfigDefinition => "indexing config",
            DiagnosticStage::ConfigEdit => "reading config edits",
        }
    }

    /// Short identifier used in the store and in summaries.
    pub fn key(&self) -> &'static str {
        match self {
            DiagnosticStage::Discover => "discover",
            DiagnosticStage::LoadReference => "load_reference",
            DiagnosticStage::Read => "read",
            DiagnosticStage::Parse => "parse",
            DiagnosticStage::Resolve => "resolve",
            DiagnosticStage::Patch => "patch",
            DiagnosticStage::ConfigDefinition => "config_definition",
            DiagnosticStage::ConfigEdit => "config_edit",
        }
    }
}

impl fmt::Display for DiagnosticStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl PartialOrd for DiagnosticStage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiagnosticStage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// A recoverable problem recorded during a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BuildDiagnostic {
    /// Input was skipped entirely
    Skipped { path: String, reason: SkipReason },
    /// Processing an input failed; the rest of the build continued
    Error {
        path: String,
        stage: DiagnosticStage,
        message: String,
    },
    /// A result was produced by heuristic fallback
    Degraded {
        path: String,
        stage: DiagnosticStage,
        message: String,
    },
}

impl BuildDiagnostic {
    pub fn skipped(path: impl Into<String>, reason: SkipReason) -> Self {
        BuildDiagnostic::Skipped {
            path: path.into(),
            reason,
        }
    }

    pub fn error(path: impl Into<String>, stage: DiagnosticStage, message: impl Into<String>) -> Self {
        BuildDiagnostic::Error {
            path: path.into(),
            stage,
            message: message.into(),
        }
    }

    pub fn degraded(
        path: impl Into<String>,
        stage: DiagnosticStage,
        message: impl Into<String>,
    ) -> Self {
        BuildDiagnostic::Degraded {
            path: path.into(),
            stage,
            message: message.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            BuildDiagnostic::Skipped { path, .. }
            | BuildDiagnostic::Error { path, .. }
            | BuildDiagnostic::Degraded { path, .. } => path,
        }
    }

    /// `skipped`, `error` or `degraded`
    pub fn severity_label(&self) -> &'static str {
        match self {
            BuildDiagnostic::Skipped { .. } => "skipped",
            BuildDiagnostic::Error { .. } => "error",
            BuildDiagnostic::Degraded { .. } => "degraded",
        }
    }

    /// Stage key; skips are attributed to the stage that produced them.
    pub fn stage_key(&self) -> &'static str {
        match self {
            BuildDiagnostic::Skipped { reason, .. } => match reason {
                SkipReason::NotManagedAssembly | SkipReason::CorruptAssembly => {
                    DiagnosticStage::LoadReference.key()
                }
                SkipReason::NotText => DiagnosticStage::Read.key(),
                SkipReason::ExcludedByGlob
                | SkipReason::MissingManifest
                | SkipReason::OutsideRoot => {
                    DiagnosticStage::Discover.key()
                }
            },
            BuildDiagnostic::Error { stage, .. } | BuildDiagnostic::Degraded { stage, .. } => {
                stage.key()
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            BuildDiagnostic::Skipped { reason, .. } => reason.description().to_string(),
            BuildDiagnostic::Error { message, .. } | BuildDiagnostic::Degraded { message, .. } => {
                message.clone()
            }
        }
    }

    /// Primary: path. Secondary: variant (Error, Degraded, Skipped). Tertiary: stage/reason.
    pub fn sort_key(&self) -> (&str, u8, u8, &str) {
        match self {
            BuildDiagnostic::Error {
                path,
                stage,
                message,
            } => (path, 0, stage.sort_key(), message),
            BuildDiagnostic::Degraded {
                path,
                stage,
                message,
            } => (path, 1, stage.sort_key(), message),
            BuildDiagnostic::Skipped { path, reason } => (path, 2, reason.sort_key(), ""),
        }
    }

    /// Examples:
    /// - "SKIP refs/native.dll: not a managed assembly"
    /// - "ERROR Game/Bad.cs: reading file: permission denied"
    pub fn format_stderr(&self) -> String {
        match self {
            BuildDiagnostic::Skipped { path, reason } => format!("SKIP {}: {}", path, reason),
            BuildDiagnostic::Error {
                path,
                stage,
                message,
            } => format!("ERROR {}: {}: {}", path, stage, message),
            BuildDiagnostic::Degraded {
                path,
                stage,
                message,
            } => format!("DEGRADED {}: {}: {}", path, stage, message),
        }
    }
}

impl fmt::Display for BuildDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_stderr())
    }
}

impl PartialOrd for BuildDiagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BuildDiagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ord() {
        assert!(DiagnosticStage::Read < DiagnosticStage::Parse);
        assert!(DiagnosticStage::Patch < DiagnosticStage::ConfigEdit);
    }

    #[test]
    fn test_skip_attributed_to_stage() {
        let d = BuildDiagnostic::skipped("refs/native.dll", SkipReason::NotManagedAssembly);
        assert_eq!(d.stage_key(), "load_reference");
        assert_eq!(d.severity_label(), "skipped");
    }

    #[test]
    fn test_sorting_by_path_then_variant() {
        let mut diagnostics = vec![
            BuildDiagnostic::skipped("b.dll", SkipReason::CorruptAssembly),
            BuildDiagnostic::degraded("a.cs", DiagnosticStage::Patch, "target unknown"),
            BuildDiagnostic::error("a.cs", DiagnosticStage::Read, "denied"),
        ];
        diagnostics.sort();
        assert_eq!(diagnostics[0].severity_label(), "error");
        assert_eq!(diagnostics[1].severity_label(), "degraded");
        assert_eq!(diagnostics[2].path(), "b.dll");
    }

    #[test]
    fn test_format_stderr() {
        let d = BuildDiagnostic::error("Game/Bad.cs", DiagnosticStage::Read, "permission denied");
        assert_eq!(d.format_stderr(), "ERROR Game/Bad.cs: reading file: permission denied");
        let d = BuildDiagnostic::skipped("refs/x.dll", SkipReason::NotManagedAssembly);
        assert_eq!(d.to_string(), "SKIP refs/x.dll: not a managed assembly");
    }
}
