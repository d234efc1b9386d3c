//! Persisted analysis store.
//!
//! A build writes every record into a fresh SQLite database next to the
//! destination and renames it into place, so readers never observe a
//! half-written store. Queries open their own read-only connection through
//! [`Store`].

pub mod query;
pub mod schema;

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::diagnostics::BuildDiagnostic;
use crate::ingest::ParsedFile;
use crate::model::{
    CallEdge, Callee, ConfigDefinition, ConfigEdit, EventDeclaration, EventFire,
    EventSubscription, ExtensionRecord, ExternalTarget, PatchRecord, PropertyAccess, SymbolIndex,
};

pub use query::{
    CallSite, CallersResult, CalleesResult, ChainResult, ExternalCallRow, MethodRef,
    OverridesResult, PropertyReport, SearchHit, SqlResult, Store, StoreSummary,
};
pub use schema::STORE_SCHEMA_VERSION;

/// Provenance row for one parsed source file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFileRow {
    pub tree: String,
    pub path: String,
    pub extension: Option<String>,
    pub sha256: String,
    pub line_count: usize,
    pub has_errors: bool,
}

impl From<&ParsedFile> for SourceFileRow {
    fn from(parsed: &ParsedFile) -> Self {
        Self {
            tree: parsed.file.tree_id.clone(),
            path: parsed.file.rel_path.clone(),
            extension: parsed.file.extension.clone(),
            sha256: parsed.sha256.clone(),
            line_count: parsed.line_count,
            has_errors: parsed.has_errors,
        }
    }
}

/// Inputs and identity of one build, persisted in `build_meta`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildMeta {
    pub build_id: String,
    pub created_at: String,
    pub tool_version: String,
    pub root: String,
    pub refs_dir: Option<String>,
    pub config_dir: Option<String>,
    pub mods_dirs: Vec<String>,
    pub source_trees: Vec<String>,
}

impl BuildMeta {
    pub fn new(
        root: &Path,
        refs_dir: Option<&Path>,
        config_dir: Option<&Path>,
        mods_dirs: &[PathBuf],
        source_trees: Vec<String>,
    ) -> Self {
        let show = |p: &Path| p.display().to_string();
        Self {
            build_id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            tool_version: crate::version::package_version().to_string(),
            root: show(root),
            refs_dir: refs_dir.map(show),
            config_dir: config_dir.map(show),
            mods_dirs: mods_dirs.iter().map(|p| show(p)).collect(),
            source_trees,
        }
    }

    fn rows(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("build_id", self.build_id.clone()),
            ("created_at", self.created_at.clone()),
            ("tool_version", self.tool_version.clone()),
            ("schema_version", STORE_SCHEMA_VERSION.to_string()),
            ("root", self.root.clone()),
            ("refs_dir", self.refs_dir.clone().unwrap_or_default()),
            ("config_dir", self.config_dir.clone().unwrap_or_default()),
            ("mods_dirs", serde_json::to_string(&self.mods_dirs)?),
            ("source_trees", serde_json::to_string(&self.source_trees)?),
        ])
    }
}

/// Everything one build produced.
#[derive(Debug)]
pub struct BuildData {
    pub index: SymbolIndex,
    pub calls: Vec<CallEdge>,
    pub event_declarations: Vec<EventDeclaration>,
    pub event_subscriptions: Vec<EventSubscription>,
    pub event_fires: Vec<EventFire>,
    pub config_definitions: Vec<ConfigDefinition>,
    pub property_accesses: Vec<PropertyAccess>,
    pub extensions: Vec<ExtensionRecord>,
    pub patches: Vec<PatchRecord>,
    pub config_edits: Vec<ConfigEdit>,
    pub source_files: Vec<SourceFileRow>,
    pub diagnostics: Vec<BuildDiagnostic>,
    pub meta: BuildMeta,
}

/// Sibling path the store is written to before it replaces `db_path`.
pub fn temp_path(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "modscope.db".into());
    name.push(".tmp");
    db_path.with_file_name(name)
}

/// Write `data` as a complete store at `db_path`, replacing any prior store.
pub fn write_store(db_path: &Path, data: &BuildData) -> Result<()> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = temp_path(db_path);
    if tmp.exists() {
        std::fs::remove_file(&tmp)
            .with_context(|| format!("Failed to remove stale {}", tmp.display()))?;
    }

    let result = write_to(&tmp, data);
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, db_path).with_context(|| {
        format!("Failed to move {} over {}", tmp.display(), db_path.display())
    })?;
    Ok(())
}

fn write_to(path: &Path, data: &BuildData) -> Result<()> {
    let conn = Connection::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open store {}: {}", path.display(), e))?;
    conn.execute_batch("PRAGMA journal_mode = OFF; PRAGMA synchronous = OFF;")
        .map_err(|e| anyhow::anyhow!("Failed to configure store: {}", e))?;
    schema::create_schema(&conn)?;

    let tx = conn.unchecked_transaction()?;
    write_symbols(&tx, &data.index)?;
    tx.commit()?;
    tracing::debug!(
        "store: wrote {} types, {} methods",
        data.index.types.len(),
        data.index.methods.len()
    );

    let tx = conn.unchecked_transaction()?;
    write_calls(&tx, &data.calls)?;
    write_events(&tx, data)?;
    write_property_accesses(&tx, &data.property_accesses)?;
    tx.commit()?;

    let tx = conn.unchecked_transaction()?;
    write_extensions(&tx, data)?;
    write_config_definitions(&tx, &data.config_definitions)?;
    write_provenance(&tx, data)?;
    tx.commit()?;
    Ok(())
}

fn flag(b: bool) -> i64 {
    i64::from(b)
}

fn write_symbols(conn: &Connection, index: &SymbolIndex) -> Result<()> {
    let mut insert_type = conn.prepare_cached(
        "INSERT INTO types (id, name, namespace, full_name, kind, base_type, interfaces,
             modifiers, type_params, outer_type, tree, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    let mut insert_super = conn.prepare_cached(
        "INSERT OR IGNORE INTO type_supertypes (type_id, super_id, relation) VALUES (?1, ?2, ?3)",
    )?;
    for t in &index.types {
        insert_type
            .execute(params![
                t.id,
                t.name,
                t.namespace,
                t.full_name,
                t.kind.as_str(),
                t.base_type,
                t.interfaces.join(","),
                t.modifiers.to_keyword_string(),
                t.type_params as i64,
                t.outer,
                t.tree,
                t.file,
                t.line as i64,
            ])
            .map_err(|e| anyhow::anyhow!("Failed to insert type {}: {}", t.full_name, e))?;
        if let Some(base) = index.base_type_id(t.id) {
            insert_super.execute(params![t.id, base, "base"])?;
        }
        for &iface in index.interface_ids(t.id) {
            insert_super.execute(params![t.id, iface, "interface"])?;
        }
    }

    let mut insert_method = conn.prepare_cached(
        "INSERT INTO methods (id, type_id, name, signature, identity, param_types, param_count,
             return_type, modifiers, kind, is_virtual, is_abstract, is_override, is_static,
             is_extension, synthetic, type_params, file, start_line, end_line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
             ?18, ?19, ?20)",
    )?;
    let mut insert_body =
        conn.prepare_cached("INSERT INTO method_bodies (body, method_id) VALUES (?1, ?2)")?;
    for m in &index.methods {
        let owner = index.type_record(m.type_id);
        let param_types = m.param_types();
        let identity = format!("{}.{}({})", owner.full_name, m.name, param_types.join(","));
        insert_method
            .execute(params![
                m.id,
                m.type_id,
                m.name,
                m.signature,
                identity,
                param_types.join(","),
                m.params.len() as i64,
                m.return_type,
                m.modifiers.to_keyword_string(),
                m.kind.as_str(),
                flag(m.modifiers.is_virtual),
                flag(m.modifiers.is_abstract),
                flag(m.modifiers.is_override),
                flag(m.modifiers.is_static),
                flag(m.is_extension),
                flag(m.synthetic),
                m.type_params as i64,
                m.file,
                m.start_line as i64,
                m.end_line as i64,
            ])
            .map_err(|e| anyhow::anyhow!("Failed to insert method {}: {}", identity, e))?;
        if !m.body.is_empty() {
            insert_body.execute(params![m.body, m.id])?;
        }
    }
    Ok(())
}

fn write_calls(conn: &Connection, calls: &[CallEdge]) -> Result<()> {
    let mut insert_call = conn.prepare_cached(
        "INSERT INTO calls (caller_id, callee_id, kind, strategy, confidence, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut insert_target = conn.prepare_cached(
        "INSERT INTO external_targets (id, assembly, type_name, method, signature)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut insert_external = conn.prepare_cached(
        "INSERT INTO external_calls (caller_id, target_id, kind, confidence, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut targets: AHashMap<&ExternalTarget, i64> = AHashMap::new();
    for edge in calls {
        match &edge.callee {
            Callee::Internal(callee) => {
                insert_call.execute(params![
                    edge.caller,
                    callee,
                    edge.kind.as_str(),
                    edge.strategy,
                    edge.confidence.as_str(),
                    edge.file,
                    edge.line as i64,
                ])?;
            }
            Callee::External(target) => {
                let next_id = targets.len() as i64 + 1;
                let target_id = *targets.entry(target).or_insert(next_id);
                if target_id == next_id {
                    insert_target.execute(params![
                        target_id,
                        target.assembly,
                        target.type_name,
                        target.method,
                        target.signature,
                    ])?;
                }
                insert_external.execute(params![
                    edge.caller,
                    target_id,
                    edge.kind.as_str(),
                    edge.confidence.as_str(),
                    edge.file,
                    edge.line as i64,
                ])?;
            }
        }
    }
    Ok(())
}

fn write_events(conn: &Connection, data: &BuildData) -> Result<()> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO event_declarations (owner_type_id, owner, name, delegate_type,
             declaration_kind, evidence, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for d in &data.event_declarations {
        insert.execute(params![
            d.owner_type_id,
            d.owner,
            d.name,
            d.delegate_type,
            d.declaration_kind,
            d.evidence.as_str(),
            d.file,
            d.line as i64,
        ])?;
    }

    let mut insert = conn.prepare_cached(
        "INSERT INTO event_subscriptions (subscriber_type_id, subscriber_method_id, event_owner,
             event_name, handler, direction, evidence, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for s in &data.event_subscriptions {
        insert.execute(params![
            s.subscriber_type_id,
            s.subscriber_method_id,
            s.event_owner,
            s.event_name,
            s.handler,
            s.direction.as_str(),
            s.evidence.as_str(),
            s.file,
            s.line as i64,
        ])?;
    }

    let mut insert = conn.prepare_cached(
        "INSERT INTO event_fires (firing_type_id, firing_method_id, event_owner, event_name,
             style, guarded, evidence, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for f in &data.event_fires {
        insert.execute(params![
            f.firing_type_id,
            f.firing_method_id,
            f.event_owner,
            f.event_name,
            f.style.as_str(),
            flag(f.guarded),
            f.evidence.as_str(),
            f.file,
            f.line as i64,
        ])?;
    }
    Ok(())
}

fn write_property_accesses(conn: &Connection, accesses: &[PropertyAccess]) -> Result<()> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO property_accesses (method_id, property_name, kind, api, confidence, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for a in accesses {
        insert.execute(params![
            a.method_id,
            a.property_name,
            a.kind.as_str(),
            a.api,
            a.confidence.as_str(),
            a.file,
            a.line as i64,
        ])?;
    }
    Ok(())
}

fn write_extensions(conn: &Connection, data: &BuildData) -> Result<()> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO extensions (name, path, version, author, description, has_manifest)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for e in &data.extensions {
        insert
            .execute(params![
                e.name,
                e.path,
                e.version,
                e.author,
                e.description,
                flag(e.has_manifest),
            ])
            .map_err(|err| anyhow::anyhow!("Failed to insert extension {}: {}", e.name, err))?;
    }

    let mut insert = conn.prepare_cached(
        "INSERT INTO patches (extension, declaring_type, declaring_method, target_type,
             target_method, target_params, target_signature, kind, style, confidence,
             target_method_id, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for p in &data.patches {
        insert.execute(params![
            p.extension,
            p.declaring_type,
            p.declaring_method,
            p.target_type,
            p.target_method,
            p.target_params.as_ref().map(|ps| ps.join(",")),
            p.target_signature,
            p.kind.as_str(),
            p.style.as_str(),
            p.confidence.as_str(),
            p.target_method_id,
            p.file,
            p.line as i64,
        ])?;
    }

    let mut insert = conn.prepare_cached(
        "INSERT INTO config_edits (extension, target_file, raw_path, path, op, property_name,
             value, file, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for e in &data.config_edits {
        insert.execute(params![
            e.extension,
            e.target_file,
            e.raw_path,
            e.path,
            e.op.as_str(),
            e.property_name,
            e.value,
            e.file,
            e.line as i64,
        ])?;
    }
    Ok(())
}

fn write_config_definitions(conn: &Connection, definitions: &[ConfigDefinition]) -> Result<()> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO config_definitions (file, path, element, property_name, value,
             declaring_class, line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for d in definitions {
        insert.execute(params![
            d.file,
            d.path,
            d.element,
            d.property_name,
            d.value,
            d.declaring_class,
            d.line as i64,
        ])?;
    }
    Ok(())
}

fn write_provenance(conn: &Connection, data: &BuildData) -> Result<()> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO source_files (tree, path, extension, sha256, line_count, has_errors)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for f in &data.source_files {
        insert.execute(params![
            f.tree,
            f.path,
            f.extension,
            f.sha256,
            f.line_count as i64,
            flag(f.has_errors),
        ])?;
    }

    let mut insert = conn.prepare_cached(
        "INSERT INTO build_diagnostics (path, severity, stage, message) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for d in &data.diagnostics {
        insert.execute(params![d.path(), d.severity_label(), d.stage_key(), d.message()])?;
    }

    let mut insert = conn.prepare_cached("INSERT INTO build_meta (key, value) VALUES (?1, ?2)")?;
    for (key, value) in data.meta.rows()? {
        insert.execute(params![key, value])?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::discover::SourceFile;
    use crate::ingest::parse_source;
    use crate::model::{harvest_file, ExternalTarget};
    use crate::refs::ReferenceIndex;
    use crate::resolve::Resolver;

    /// Store data for a single in-memory C# file, with resolved calls.
    pub(crate) fn data_for(src: &str) -> BuildData {
        let file = SourceFile {
            path: PathBuf::from("Game/Code.cs"),
            rel_path: "Code.cs".into(),
            tree_id: "Game".into(),
            extension: None,
        };
        let parsed = parse_source(file, src.to_string(), "00".into()).unwrap();
        let refs = ReferenceIndex::new();
        let index = SymbolIndex::build(vec![harvest_file(&parsed)], &refs);
        let calls = Resolver::new(&index, &refs).resolve_file(&parsed);
        let source_files = vec![SourceFileRow::from(&parsed)];
        BuildData {
            index,
            calls,
            event_declarations: Vec::new(),
            event_subscriptions: Vec::new(),
            event_fires: Vec::new(),
            config_definitions: Vec::new(),
            property_accesses: Vec::new(),
            extensions: Vec::new(),
            patches: Vec::new(),
            config_edits: Vec::new(),
            source_files,
            diagnostics: vec![BuildDiagnostic::skipped(
                "refs/native.dll",
                crate::diagnostics::SkipReason::NotManagedAssembly,
            )],
            meta: BuildMeta::new(Path::new("/src"), None, None, &[], vec!["Game".into()]),
        }
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_write_replaces_prior_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("out").join("modscope.db");
        let data = data_for("class Foo { void Bar() { Baz(); } void Baz() {} }");
        write_store(&db, &data).unwrap();
        write_store(&db, &data).unwrap();
        assert!(db.exists());
        assert!(!temp_path(&db).exists());

        let conn = Connection::open(&db).unwrap();
        assert_eq!(count(&conn, "types"), 1);
        assert_eq!(count(&conn, "calls"), 1);
        assert_eq!(count(&conn, "source_files"), 1);
        assert_eq!(count(&conn, "build_diagnostics"), 1);
        let version: String = conn
            .query_row("SELECT value FROM build_meta WHERE key = 'schema_version'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(version, STORE_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_external_targets_are_shared() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("modscope.db");
        let mut data = data_for("class Foo { void A() {} void B() {} }");
        let target = ExternalTarget {
            assembly: None,
            type_name: "Debug".into(),
            method: "Log".into(),
            signature: "Debug.Log(string)".into(),
        };
        for caller in [1, 2] {
            data.calls.push(CallEdge {
                caller,
                callee: Callee::External(target.clone()),
                kind: crate::model::CallKind::Direct,
                strategy: "external".into(),
                confidence: crate::model::Confidence::BestEffort,
                file: "Code.cs".into(),
                line: 1,
            });
        }
        write_store(&db, &data).unwrap();
        let conn = Connection::open(&db).unwrap();
        assert_eq!(count(&conn, "external_targets"), 1);
        assert_eq!(count(&conn, "external_calls"), 2);
    }
}
