//! JSON output types for CLI commands
//!
//! Every command that supports `--output json` prints exactly one
//! [`JsonResponse`] envelope on stdout. Failures print an [`ErrorResponse`]
//! carrying the stable error code.

use serde::{Deserialize, Serialize};

/// Current JSON output schema version
pub const MODSCOPE_JSON_SCHEMA_VERSION: &str = "1.0.0";

/// Wrapper for all JSON responses
///
/// Every JSON response includes schema_version and execution_id for
/// parsing stability and traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse<T> {
    /// Schema version for parsing stability
    pub schema_version: String,
    /// Unique execution ID for this run
    pub execution_id: String,
    pub tool: String,
    /// RFC 3339, second precision
    pub timestamp: String,
    /// Response data
    pub data: T,
}

impl<T> JsonResponse<T> {
    pub fn new(data: T, execution_id: &str) -> Self {
        JsonResponse {
            schema_version: MODSCOPE_JSON_SCHEMA_VERSION.to_string(),
            execution_id: execution_id.to_string(),
            tool: "modscope".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            data,
        }
    }
}

/// Error response for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable `MSC-*` error code
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Human,
    /// JSON output with schema versioning
    Json,
}

impl OutputFormat {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Some(OutputFormat::Human),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Generate a unique execution ID for this run
pub fn generate_execution_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Output JSON to stdout
pub fn output_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{}", json);
    Ok(())
}

/// Print `data` wrapped in a fresh envelope.
pub fn print_response<T: Serialize>(data: T) -> anyhow::Result<()> {
    let response = JsonResponse::new(data, &generate_execution_id());
    output_json(&response)
}

/// Print an error envelope for `err`.
pub fn print_error(err: &anyhow::Error) -> anyhow::Result<()> {
    let response = JsonResponse::new(
        ErrorResponse {
            error: crate::error::code_for(err).to_string(),
            message: format!("{:#}", err),
        },
        &generate_execution_id(),
    );
    output_json(&response)
}
