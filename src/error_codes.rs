//! modscope error codes
//!
//! Error codes follow the pattern: MSC-{CATEGORY}-{3-digit number}
//!
//! Categories (1-3 uppercase letters):
//! - IO: file system access (source root, store file)
//! - BLD: build pipeline failures
//! - QRY: query failures (bad SQL, unknown method, bad arguments)
//! - CFG: settings file problems
//! - GEN: anything not covered above
//!
//! Each error code is stable and should not be reused.

/// Source root not found or not a directory
pub const MSC_IO_001_ROOT_NOT_FOUND: &str = "MSC-IO-001";

/// Store database not found
pub const MSC_IO_002_STORE_NOT_FOUND: &str = "MSC-IO-002";

/// Invalid file path argument
pub const MSC_IO_003_INVALID_PATH: &str = "MSC-IO-003";

/// No parsable source files
pub const MSC_BLD_001_NO_SYNTAX_TREES: &str = "MSC-BLD-001";

/// Store could not be written or swapped into place
pub const MSC_BLD_002_STORE_WRITE_FAILED: &str = "MSC-BLD-002";

/// Invalid or non read-only SQL
pub const MSC_QRY_001_INVALID_QUERY: &str = "MSC-QRY-001";

/// Method reference matched nothing
pub const MSC_QRY_002_METHOD_NOT_FOUND: &str = "MSC-QRY-002";

/// Invalid command parameters
pub const MSC_QRY_003_INVALID_PARAMS: &str = "MSC-QRY-003";

/// Settings file unreadable or malformed
pub const MSC_CFG_001_INVALID_SETTINGS: &str = "MSC-CFG-001";

/// Uncategorized failure
pub const MSC_GEN_001_UNCATEGORIZED: &str = "MSC-GEN-001";

/// Error code documentation
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | MSC-IO-001 | Source root not found | Check the `--root` argument |
/// | MSC-IO-002 | Store not found | Run `modscope build` first |
/// | MSC-IO-003 | Invalid path | Verify path format and escaping |
/// | MSC-BLD-001 | No syntax trees | Point `--root` at decompiled C# source |
/// | MSC-BLD-002 | Store write failed | Check the database directory is writable |
/// | MSC-QRY-001 | Invalid query | Only SELECT/WITH/EXPLAIN statements are accepted |
/// | MSC-QRY-002 | Method not found | Use `Type.Method` or a full signature |
/// | MSC-QRY-003 | Invalid parameters | Check required arguments for command |
/// | MSC-CFG-001 | Invalid settings | Fix the TOML file passed with `--settings` |
pub const ERROR_CODE_DOCUMENTATION: &str = "Error code documentation available in source";
