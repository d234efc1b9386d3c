//! JSON output module for CLI commands
//!
//! Provides the schema-versioned envelope shared by every command.

pub mod command;

pub use command::{
    generate_execution_id, output_json, print_error, print_response, ErrorResponse, JsonResponse,
    OutputFormat,
};
