//! Store schema.
//!
//! One table per record kind, all keyed by the build-assigned integer ids.
//! `method_bodies` is an FTS5 table over method source text.

use anyhow::Result;
use rusqlite::Connection;

/// Bumped whenever a table or column changes.
pub const STORE_SCHEMA_VERSION: i64 = 3;

const TABLES: &str = "
CREATE TABLE types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    namespace TEXT NOT NULL,
    full_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    base_type TEXT,
    interfaces TEXT NOT NULL,
    modifiers TEXT NOT NULL,
    type_params INTEGER NOT NULL,
    outer_type TEXT,
    tree TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE type_supertypes (
    type_id INTEGER NOT NULL,
    super_id INTEGER NOT NULL,
    relation TEXT NOT NULL,
    PRIMARY KEY (type_id, super_id)
);

CREATE TABLE methods (
    id INTEGER PRIMARY KEY,
    type_id INTEGER NOT NULL REFERENCES types(id),
    name TEXT NOT NULL,
    signature TEXT NOT NULL,
    identity TEXT NOT NULL,
    param_types TEXT NOT NULL,
    param_count INTEGER NOT NULL,
    return_type TEXT NOT NULL,
    modifiers TEXT NOT NULL,
    kind TEXT NOT NULL,
    is_virtual INTEGER NOT NULL,
    is_abstract INTEGER NOT NULL,
    is_override INTEGER NOT NULL,
    is_static INTEGER NOT NULL,
    is_extension INTEGER NOT NULL,
    synthetic INTEGER NOT NULL,
    type_params INTEGER NOT NULL,
    file TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL
);

CREATE VIRTUAL TABLE method_bodies USING fts5(body, method_id UNINDEXED);

CREATE TABLE calls (
    id INTEGER PRIMARY KEY,
    caller_id INTEGER NOT NULL REFERENCES methods(id),
    callee_id INTEGER NOT NULL REFERENCES methods(id),
    kind TEXT NOT NULL,
    strategy TEXT NOT NULL,
    confidence TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE external_targets (
    id INTEGER PRIMARY KEY,
    assembly TEXT,
    type_name TEXT NOT NULL,
    method TEXT NOT NULL,
    signature TEXT NOT NULL
);

CREATE TABLE external_calls (
    id INTEGER PRIMARY KEY,
    caller_id INTEGER NOT NULL REFERENCES methods(id),
    target_id INTEGER NOT NULL REFERENCES external_targets(id),
    kind TEXT NOT NULL,
    confidence TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE event_declarations (
    id INTEGER PRIMARY KEY,
    owner_type_id INTEGER NOT NULL,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    delegate_type TEXT NOT NULL,
    declaration_kind TEXT NOT NULL,
    evidence TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE event_subscriptions (
    id INTEGER PRIMARY KEY,
    subscriber_type_id INTEGER NOT NULL,
    subscriber_method_id INTEGER NOT NULL,
    event_owner TEXT NOT NULL,
    event_name TEXT NOT NULL,
    handler TEXT NOT NULL,
    direction TEXT NOT NULL,
    evidence TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE event_fires (
    id INTEGER PRIMARY KEY,
    firing_type_id INTEGER NOT NULL,
    firing_method_id INTEGER NOT NULL,
    event_owner TEXT NOT NULL,
    event_name TEXT NOT NULL,
    style TEXT NOT NULL,
    guarded INTEGER NOT NULL,
    evidence TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE config_definitions (
    id INTEGER PRIMARY KEY,
    file TEXT NOT NULL,
    path TEXT NOT NULL,
    element TEXT NOT NULL,
    property_name TEXT,
    value TEXT,
    declaring_class TEXT,
    line INTEGER NOT NULL
);

CREATE TABLE property_accesses (
    id INTEGER PRIMARY KEY,
    method_id INTEGER NOT NULL REFERENCES methods(id),
    property_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    api TEXT NOT NULL,
    confidence TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE extensions (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    path TEXT NOT NULL,
    version TEXT,
    author TEXT,
    description TEXT,
    has_manifest INTEGER NOT NULL
);

CREATE TABLE patches (
    id INTEGER PRIMARY KEY,
    extension TEXT NOT NULL,
    declaring_type TEXT NOT NULL,
    declaring_method TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_method TEXT NOT NULL,
    target_params TEXT,
    target_signature TEXT NOT NULL,
    kind TEXT NOT NULL,
    style TEXT NOT NULL,
    confidence TEXT NOT NULL,
    target_method_id INTEGER REFERENCES methods(id),
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE config_edits (
    id INTEGER PRIMARY KEY,
    extension TEXT NOT NULL,
    target_file TEXT NOT NULL,
    raw_path TEXT NOT NULL,
    path TEXT NOT NULL,
    op TEXT NOT NULL,
    property_name TEXT,
    value TEXT,
    file TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE TABLE source_files (
    id INTEGER PRIMARY KEY,
    tree TEXT NOT NULL,
    path TEXT NOT NULL,
    extension TEXT,
    sha256 TEXT NOT NULL,
    line_count INTEGER NOT NULL,
    has_errors INTEGER NOT NULL
);

CREATE TABLE build_diagnostics (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    severity TEXT NOT NULL,
    stage TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE TABLE build_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const INDEXES: &str = "
CREATE INDEX idx_methods_name ON methods(name);
CREATE INDEX idx_methods_signature ON methods(signature);
CREATE INDEX idx_methods_type ON methods(type_id);
CREATE INDEX idx_types_name ON types(name);
CREATE INDEX idx_supertypes_super ON type_supertypes(super_id);
CREATE INDEX idx_calls_caller ON calls(caller_id);
CREATE INDEX idx_calls_callee ON calls(callee_id);
CREATE INDEX idx_external_calls_caller ON external_calls(caller_id);
CREATE INDEX idx_external_calls_target ON external_calls(target_id);
CREATE INDEX idx_patches_signature ON patches(target_signature);
CREATE INDEX idx_config_edits_path ON config_edits(target_file, path);
CREATE INDEX idx_property_accesses_name ON property_accesses(property_name);
CREATE INDEX idx_config_definitions_property ON config_definitions(property_name);
";

/// Create every table and index on a fresh database.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(TABLES)
        .map_err(|e| anyhow::anyhow!("Failed to create store tables: {}", e))?;
    conn.execute_batch(INDEXES)
        .map_err(|e| anyhow::anyhow!("Failed to create store indexes: {}", e))?;
    Ok(())
}

/// Every table the store defines, in creation order.
pub const TABLE_NAMES: &[&str] = &[
    "types",
    "type_supertypes",
    "methods",
    "method_bodies",
    "calls",
    "external_targets",
    "external_calls",
    "event_declarations",
    "event_subscriptions",
    "event_fires",
    "config_definitions",
    "property_accesses",
    "extensions",
    "patches",
    "config_edits",
    "source_files",
    "build_diagnostics",
    "build_meta",
];
