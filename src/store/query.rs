//! Read-only queries over a built store.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

use crate::conflicts::{self, CompatReport, ConflictInput};
use crate::error::QueryError;
use crate::model::types::{normalize_type, signature_key, split_top_level};
use crate::model::{
    ConfigDefinition, ConfigEdit, ConfigOp, Confidence, MethodId, PatchKind, PatchRecord,
    PatchStyle,
};
use crate::settings::ConflictSettings;

/// Columns read by [`method_ref`], in order.
const METHOD_COLUMNS: &str =
    "m.id, t.full_name, m.name, m.signature, m.identity, m.kind, m.modifiers, m.file, m.start_line";
const METHOD_COLUMN_COUNT: usize = 9;

/// A method as shown in query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodRef {
    pub id: MethodId,
    /// Full name of the owning type
    pub owner: String,
    pub name: String,
    pub signature: String,
    pub identity: String,
    pub kind: String,
    pub modifiers: String,
    pub file: String,
    pub line: i64,
}

fn method_ref(row: &Row<'_>, offset: usize) -> rusqlite::Result<MethodRef> {
    Ok(MethodRef {
        id: row.get(offset)?,
        owner: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        signature: row.get(offset + 3)?,
        identity: row.get(offset + 4)?,
        kind: row.get(offset + 5)?,
        modifiers: row.get(offset + 6)?,
        file: row.get(offset + 7)?,
        line: row.get(offset + 8)?,
    })
}

/// One call site, seen from the other end of the edge.
#[derive(Debug, Clone, Serialize)]
pub struct CallSite {
    pub method: MethodRef,
    pub kind: String,
    pub strategy: String,
    pub confidence: String,
    pub file: String,
    pub line: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExternalCallRow {
    pub caller: MethodRef,
    pub assembly: Option<String>,
    pub type_name: String,
    pub method: String,
    pub signature: String,
    pub kind: String,
    pub confidence: String,
    pub file: String,
    pub line: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodCallers {
    pub method: MethodRef,
    pub callers: Vec<CallSite>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallersResult {
    pub query: String,
    pub results: Vec<MethodCallers>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodCallees {
    pub method: MethodRef,
    pub internal: Vec<CallSite>,
    pub external: Vec<ExternalCallRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalleesResult {
    pub query: String,
    pub results: Vec<MethodCallees>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainResult {
    pub from: String,
    pub to: String,
    pub max_depth: usize,
    /// First shortest path, `None` when `to` is unreachable within the bound
    pub path: Option<Vec<MethodRef>>,
}

/// A topmost declaration and every override or implementation of it.
#[derive(Debug, Clone, Serialize)]
pub struct OverrideGroup {
    pub root: MethodRef,
    /// The root first, then the descendants' declarations in id order
    pub methods: Vec<MethodRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverridesResult {
    pub query: String,
    pub groups: Vec<OverrideGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub method: MethodRef,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyRead {
    pub method: MethodRef,
    pub kind: String,
    pub api: String,
    pub confidence: String,
    pub file: String,
    pub line: i64,
}

/// Everything the store knows about one config property name.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyReport {
    pub name: String,
    pub definitions: Vec<ConfigDefinition>,
    pub accesses: Vec<PropertyRead>,
    pub edits: Vec<ConfigEdit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub meta: BTreeMap<String, String>,
    pub counts: BTreeMap<String, i64>,
    pub calls_by_strategy: BTreeMap<String, i64>,
    pub patches_by_confidence: BTreeMap<String, i64>,
    pub diagnostics_by_stage: BTreeMap<String, i64>,
    pub extensions: Vec<String>,
}

/// Read-only handle on a built store.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(QueryError::MissingStore(path.to_path_buf()).into());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| anyhow::anyhow!("Failed to open store {}: {}", path.display(), e))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Methods named by `spec`: a signature (`Foo.Bar(int)`, full names
    /// accepted), `Type.Method`, `Type..ctor`, or a bare method name.
    pub fn find_methods(&self, spec: &str) -> Result<Vec<MethodRef>> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(QueryError::InvalidMethodSpec(spec.to_string()).into());
        }
        let found = if let Some(open) = spec.find('(') {
            let inner = spec[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| QueryError::InvalidMethodSpec(spec.to_string()))?;
            let (owner, name) = split_member(&spec[..open])
                .ok_or_else(|| QueryError::InvalidMethodSpec(spec.to_string()))?;
            let param_types: Vec<String> = split_top_level(inner)
                .iter()
                .filter(|p| !p.trim().is_empty())
                .map(|p| normalize_type(p))
                .collect();
            let key = signature_key(&normalize_type(owner), name, &param_types);
            let identity = format!("{}.{}({})", owner, name, param_types.join(","));
            self.methods_where("m.signature = ?1 OR m.identity = ?2", params![key, identity])?
        } else if let Some((owner, name)) = split_member(spec) {
            self.methods_where(
                "m.name = ?1 AND (t.name = ?2 OR t.full_name = ?2)",
                params![name, owner],
            )?
        } else {
            self.methods_where("m.name = ?1", params![spec])?
        };
        if found.is_empty() {
            return Err(QueryError::MethodNotFound(spec.to_string()).into());
        }
        Ok(found)
    }

    fn methods_where(&self, condition: &str, args: impl rusqlite::Params) -> Result<Vec<MethodRef>> {
        let sql = format!(
            "SELECT {} FROM methods m JOIN types t ON t.id = m.type_id WHERE {} ORDER BY m.id",
            METHOD_COLUMNS, condition
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(args, |row| method_ref(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn method_by_id(&self, id: MethodId) -> Result<Option<MethodRef>> {
        let sql = format!(
            "SELECT {} FROM methods m JOIN types t ON t.id = m.type_id WHERE m.id = ?1",
            METHOD_COLUMNS
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.query_row(params![id], |row| method_ref(row, 0)).optional()?)
    }

    /// Internal callers of every method `spec` names.
    pub fn callers(&self, spec: &str) -> Result<CallersResult> {
        let sql = format!(
            "SELECT {}, c.kind, c.strategy, c.confidence, c.file, c.line
             FROM calls c
             JOIN methods m ON m.id = c.caller_id
             JOIN types t ON t.id = m.type_id
             WHERE c.callee_id = ?1
             ORDER BY c.file, c.line, c.id",
            METHOD_COLUMNS
        );
        let mut results = Vec::new();
        for method in self.find_methods(spec)? {
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let callers = stmt
                .query_map(params![method.id], call_site)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            results.push(MethodCallers { method, callers });
        }
        Ok(CallersResult {
            query: spec.to_string(),
            results,
        })
    }

    /// Internal and external callees of every method `spec` names.
    pub fn callees(&self, spec: &str) -> Result<CalleesResult> {
        let internal_sql = format!(
            "SELECT {}, c.kind, c.strategy, c.confidence, c.file, c.line
             FROM calls c
             JOIN methods m ON m.id = c.callee_id
             JOIN types t ON t.id = m.type_id
             WHERE c.caller_id = ?1
             ORDER BY c.line, c.id",
            METHOD_COLUMNS
        );
        let mut results = Vec::new();
        for method in self.find_methods(spec)? {
            let mut stmt = self.conn.prepare_cached(&internal_sql)?;
            let internal = stmt
                .query_map(params![method.id], call_site)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let external = self.external_calls("e.caller_id = ?1", params![method.id])?;
            results.push(MethodCallees {
                method,
                internal,
                external,
            });
        }
        Ok(CalleesResult {
            query: spec.to_string(),
            results,
        })
    }

    /// External calls, optionally restricted to one target type name.
    pub fn externals(&self, type_name: Option<&str>) -> Result<Vec<ExternalCallRow>> {
        match type_name {
            Some(name) => self.external_calls("x.type_name = ?1", params![name]),
            None => self.external_calls("1 = 1", params![]),
        }
    }

    fn external_calls(
        &self,
        condition: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<ExternalCallRow>> {
        let sql = format!(
            "SELECT {}, x.assembly, x.type_name, x.method, x.signature,
                    e.kind, e.confidence, e.file, e.line
             FROM external_calls e
             JOIN external_targets x ON x.id = e.target_id
             JOIN methods m ON m.id = e.caller_id
             JOIN types t ON t.id = m.type_id
             WHERE {}
             ORDER BY x.type_name, x.method, m.id, e.line, e.id",
            METHOD_COLUMNS, condition
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(args, |row| {
            let n = METHOD_COLUMN_COUNT;
            Ok(ExternalCallRow {
                caller: method_ref(row, 0)?,
                assembly: row.get(n)?,
                type_name: row.get(n + 1)?,
                method: row.get(n + 2)?,
                signature: row.get(n + 3)?,
                kind: row.get(n + 4)?,
                confidence: row.get(n + 5)?,
                file: row.get(n + 6)?,
                line: row.get(n + 7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// First shortest call path from any `from` method to any `to` method.
    pub fn chain(&self, from: &str, to: &str, max_depth: usize) -> Result<ChainResult> {
        let sources: Vec<MethodId> = self.find_methods(from)?.iter().map(|m| m.id).collect();
        let targets: AHashSet<MethodId> = self.find_methods(to)?.iter().map(|m| m.id).collect();

        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT callee_id FROM calls WHERE caller_id = ?1 ORDER BY callee_id")?;
        let mut parent: AHashMap<MethodId, Option<MethodId>> = AHashMap::new();
        let mut queue: VecDeque<(MethodId, usize)> = VecDeque::new();
        for &s in &sources {
            if parent.insert(s, None).is_none() {
                queue.push_back((s, 0));
            }
        }

        let mut found = None;
        while let Some((current, depth)) = queue.pop_front() {
            if targets.contains(&current) {
                found = Some(current);
                break;
            }
            if depth >= max_depth {
                continue;
            }
            let next = stmt
                .query_map(params![current], |row| row.get::<_, MethodId>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for callee in next {
                if let std::collections::hash_map::Entry::Vacant(slot) = parent.entry(callee) {
                    slot.insert(Some(current));
                    queue.push_back((callee, depth + 1));
                }
            }
        }

        let path = match found {
            Some(end) => {
                let mut ids = vec![end];
                let mut current = end;
                while let Some(Some(p)) = parent.get(&current) {
                    ids.push(*p);
                    current = *p;
                }
                ids.reverse();
                let mut methods = Vec::with_capacity(ids.len());
                for id in ids {
                    methods.extend(self.method_by_id(id)?);
                }
                Some(methods)
            }
            None => None,
        };
        Ok(ChainResult {
            from: from.to_string(),
            to: to.to_string(),
            max_depth,
            path,
        })
    }

    /// Topmost declaration of each named method plus all its overrides.
    pub fn overrides(&self, spec: &str) -> Result<OverridesResult> {
        let mut groups: Vec<OverrideGroup> = Vec::new();
        for method in self.find_methods(spec)? {
            let (type_id, param_types, param_count) = self.conn.query_row(
                "SELECT type_id, param_types, param_count FROM methods WHERE id = ?1",
                params![method.id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
            )?;
            let root_id = self.topmost_declaration(&method, type_id, &param_types, param_count)?;
            if groups.iter().any(|g| g.root.id == root_id) {
                continue;
            }
            let root = match self.method_by_id(root_id)? {
                Some(r) => r,
                None => continue,
            };
            let (root_type, root_params): (i64, String) = self.conn.query_row(
                "SELECT type_id, param_types FROM methods WHERE id = ?1",
                params![root_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            // Same-arity overloads declared beside the root claim their own overrides
            let sibling_params: AHashSet<String> = {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT param_types FROM methods
                     WHERE type_id = ?1 AND name = ?2 AND param_count = ?3 AND id != ?4",
                )?;
                let rows = stmt.query_map(params![root_type, root.name, param_count, root_id], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<rusqlite::Result<_>>()?
            };

            let mut methods = vec![root.clone()];
            let descendants = self.descendant_types(root_type)?;
            let sql = format!(
                "SELECT {}, m.param_types FROM methods m JOIN types t ON t.id = m.type_id
                 WHERE m.type_id = ?1 AND m.name = ?2 AND m.param_count = ?3
                 ORDER BY m.id",
                METHOD_COLUMNS
            );
            let mut found = Vec::new();
            for t in descendants {
                let mut stmt = self.conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params![t, root.name, param_count], |row| {
                    Ok((method_ref(row, 0)?, row.get::<_, String>(METHOD_COLUMN_COUNT)?))
                })?;
                for row in rows {
                    let (m, types) = row?;
                    if types == root_params || !sibling_params.contains(&types) {
                        found.push(m);
                    }
                }
            }
            found.sort_by_key(|m| m.id);
            methods.extend(found);
            groups.push(OverrideGroup { root, methods });
        }
        Ok(OverridesResult {
            query: spec.to_string(),
            groups,
        })
    }

    /// Farthest harvested ancestor declaring a method of the same name and
    /// arity, preferring one with identical parameter types.
    ///
    /// Class methods are rooted in their base-class chain only; interface
    /// methods in their super-interfaces. Implementers of an interface
    /// method are listed when the interface method itself is queried.
    fn topmost_declaration(
        &self,
        method: &MethodRef,
        type_id: i64,
        param_types: &str,
        param_count: i64,
    ) -> Result<MethodId> {
        let mut declared = self.conn.prepare_cached(
            "SELECT id FROM methods WHERE type_id = ?1 AND name = ?2 AND param_count = ?3
             ORDER BY param_types = ?4 DESC, id LIMIT 1",
        )?;
        let mut declared_in = |t: i64| -> Result<Option<MethodId>> {
            Ok(declared
                .query_row(params![t, method.name, param_count, param_types], |row| row.get(0))
                .optional()?)
        };

        let mut base_of = self.conn.prepare_cached(
            "SELECT super_id FROM type_supertypes WHERE type_id = ?1 AND relation = 'base'",
        )?;
        let mut seen = AHashSet::from_iter([type_id]);
        let mut from_bases = None;
        let mut current = type_id;
        while let Some(parent) = base_of
            .query_row(params![current], |row| row.get::<_, i64>(0))
            .optional()?
        {
            if !seen.insert(parent) {
                break;
            }
            if let Some(id) = declared_in(parent)? {
                from_bases = Some(id);
            }
            current = parent;
        }
        if let Some(id) = from_bases {
            return Ok(id);
        }
        let is_interface: bool = self.conn.query_row(
            "SELECT kind = 'interface' FROM types WHERE id = ?1",
            params![type_id],
            |row| row.get(0),
        )?;
        if !is_interface {
            return Ok(method.id);
        }

        let mut supers = self
            .conn
            .prepare_cached("SELECT super_id FROM type_supertypes WHERE type_id = ?1 ORDER BY super_id")?;
        let mut best = (0usize, method.id);
        let mut seen = AHashSet::from_iter([type_id]);
        let mut queue = VecDeque::from([(type_id, 0usize)]);
        while let Some((t, depth)) = queue.pop_front() {
            let parents = supers
                .query_map(params![t], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for p in parents {
                if !seen.insert(p) {
                    continue;
                }
                if let Some(id) = declared_in(p)? {
                    if depth + 1 > best.0 {
                        best = (depth + 1, id);
                    }
                }
                queue.push_back((p, depth + 1));
            }
        }
        Ok(best.1)
    }

    /// Every subclass and implementer of `type_id`, transitively.
    fn descendant_types(&self, type_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT type_id FROM type_supertypes WHERE super_id = ?1 ORDER BY type_id")?;
        let mut seen = AHashSet::from_iter([type_id]);
        let mut out = Vec::new();
        let mut queue = VecDeque::from([type_id]);
        while let Some(t) = queue.pop_front() {
            let children = stmt
                .query_map(params![t], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for c in children {
                if seen.insert(c) {
                    out.push(c);
                    queue.push_back(c);
                }
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    /// Phrase search over method bodies.
    pub fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let phrase = format!("\"{}\"", keyword.replace('"', "\"\""));
        let hits: Vec<(MethodId, String)> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT method_id, snippet(method_bodies, 0, '>>>', '<<<', '...', 32)
                 FROM method_bodies WHERE method_bodies MATCH ?1
                 ORDER BY rank, method_id LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![phrase, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut out = Vec::with_capacity(hits.len());
        for (id, snippet) in hits {
            if let Some(method) = self.method_by_id(id)? {
                out.push(SearchHit { method, snippet });
            }
        }
        Ok(out)
    }

    /// Run one read-only statement and return its rows as JSON values.
    pub fn sql(&self, query: &str) -> Result<SqlResult> {
        let mut stmt = self.conn.prepare(query)?;
        if !stmt.readonly() {
            return Err(QueryError::NotReadOnly(query.to_string()).into());
        }
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(json_value(row.get_ref(i)?));
            }
            rows.push(values);
        }
        Ok(SqlResult { columns, rows })
    }

    /// Counts and breakdowns for the whole store.
    pub fn summary(&self) -> Result<StoreSummary> {
        let mut counts = BTreeMap::new();
        for table in super::schema::TABLE_NAMES {
            if *table == "build_meta" {
                continue;
            }
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            counts.insert(table.to_string(), n);
        }
        Ok(StoreSummary {
            meta: self.meta()?,
            counts,
            calls_by_strategy: self.grouped("SELECT strategy, COUNT(*) FROM calls GROUP BY strategy")?,
            patches_by_confidence: self
                .grouped("SELECT confidence, COUNT(*) FROM patches GROUP BY confidence")?,
            diagnostics_by_stage: self
                .grouped("SELECT stage, COUNT(*) FROM build_diagnostics GROUP BY stage")?,
            extensions: self.extension_names()?,
        })
    }

    fn grouped(&self, sql: &str) -> Result<BTreeMap<String, i64>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
    }

    pub fn meta(&self) -> Result<BTreeMap<String, String>> {
        self.conn
            .prepare_cached("SELECT key, value FROM build_meta")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .map_err(Into::into)
    }

    fn extension_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT name FROM extensions ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Definitions, code accesses and extension edits of a property name.
    pub fn properties(&self, name: &str) -> Result<PropertyReport> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT file, path, element, property_name, value, declaring_class, line
             FROM config_definitions WHERE property_name = ?1 ORDER BY file, line, id",
        )?;
        let definitions = stmt
            .query_map(params![name], |row| {
                Ok(ConfigDefinition {
                    file: row.get(0)?,
                    path: row.get(1)?,
                    element: row.get(2)?,
                    property_name: row.get(3)?,
                    value: row.get(4)?,
                    declaring_class: row.get(5)?,
                    line: row.get::<_, i64>(6)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let sql = format!(
            "SELECT {}, a.kind, a.api, a.confidence, a.file, a.line
             FROM property_accesses a
             JOIN methods m ON m.id = a.method_id
             JOIN types t ON t.id = m.type_id
             WHERE a.property_name = ?1
             ORDER BY a.file, a.line, a.id",
            METHOD_COLUMNS
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let accesses = stmt
            .query_map(params![name], |row| {
                let n = METHOD_COLUMN_COUNT;
                Ok(PropertyRead {
                    method: method_ref(row, 0)?,
                    kind: row.get(n)?,
                    api: row.get(n + 1)?,
                    confidence: row.get(n + 2)?,
                    file: row.get(n + 3)?,
                    line: row.get(n + 4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let edits = self.config_edits(Some(name))?;
        Ok(PropertyReport {
            name: name.to_string(),
            definitions,
            accesses,
            edits,
        })
    }

    fn config_edits(&self, property: Option<&str>) -> Result<Vec<ConfigEdit>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT extension, target_file, raw_path, path, op, property_name, value, file, line
             FROM config_edits WHERE ?1 IS NULL OR property_name = ?1
             ORDER BY extension, file, line, id",
        )?;
        let rows = stmt.query_map(params![property], |row| {
            Ok(ConfigEdit {
                extension: row.get(0)?,
                target_file: row.get(1)?,
                raw_path: row.get(2)?,
                path: row.get(3)?,
                op: parse_column(row, 4, ConfigOp::parse)?,
                property_name: row.get(5)?,
                value: row.get(6)?,
                file: row.get(7)?,
                line: row.get::<_, i64>(8)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn patches(&self) -> Result<Vec<PatchRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT extension, declaring_type, declaring_method, target_type, target_method,
                    target_params, target_signature, kind, style, confidence, target_method_id,
                    file, line
             FROM patches ORDER BY extension, file, line, id",
        )?;
        let rows = stmt.query_map([], |row| {
            let params: Option<String> = row.get(5)?;
            Ok(PatchRecord {
                extension: row.get(0)?,
                declaring_type: row.get(1)?,
                declaring_method: row.get(2)?,
                target_type: row.get(3)?,
                target_method: row.get(4)?,
                target_params: params.map(|p| {
                    if p.is_empty() {
                        Vec::new()
                    } else {
                        split_top_level(&p)
                    }
                }),
                target_signature: row.get(6)?,
                kind: parse_column(row, 7, PatchKind::parse)?,
                style: parse_column(row, 8, PatchStyle::parse)?,
                confidence: parse_column(row, 9, Confidence::parse)?,
                target_method_id: row.get(10)?,
                file: row.get(11)?,
                line: row.get::<_, i64>(12)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Records conflict detection runs on.
    pub fn conflict_input(&self) -> Result<ConflictInput> {
        let edges = self
            .conn
            .prepare_cached("SELECT DISTINCT caller_id, callee_id FROM calls ORDER BY caller_id, callee_id")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let reads = self
            .conn
            .prepare_cached(
                "SELECT DISTINCT method_id, property_name FROM property_accesses
                 WHERE kind != 'write' ORDER BY method_id, property_name",
            )?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let signatures = self
            .conn
            .prepare_cached("SELECT id, signature FROM methods")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<AHashMap<_, _>>>()?;
        Ok(ConflictInput {
            extensions: self.extension_names()?,
            patches: self.patches()?,
            edits: self.config_edits(None)?,
            edges,
            reads,
            signatures,
        })
    }

    /// Compatibility report for `only` (every extension when `None`).
    pub fn compat(&self, only: Option<&[String]>, settings: &ConflictSettings) -> Result<CompatReport> {
        let input = self.conflict_input()?;
        if let Some(names) = only {
            for name in names {
                if !input.extensions.contains(name) {
                    tracing::warn!("compat: unknown extension '{}'", name);
                }
            }
        }
        Ok(conflicts::detect(&input, settings, only))
    }
}

/// `Type.Method` or `Type..ctor` split into owner and member name.
fn split_member(spec: &str) -> Option<(&str, &str)> {
    for ctor in ["..cctor", "..ctor"] {
        if let Some(owner) = spec.strip_suffix(ctor) {
            return (!owner.is_empty()).then(|| (owner, &ctor[1..]));
        }
    }
    let (owner, name) = spec.rsplit_once('.')?;
    (!owner.is_empty() && !name.is_empty()).then_some((owner, name))
}

fn call_site(row: &Row<'_>) -> rusqlite::Result<CallSite> {
    let n = METHOD_COLUMN_COUNT;
    Ok(CallSite {
        method: method_ref(row, 0)?,
        kind: row.get(n)?,
        strategy: row.get(n + 1)?,
        confidence: row.get(n + 2)?,
        file: row.get(n + 3)?,
        line: row.get(n + 4)?,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unexpected value '{}'", raw).into(),
        )
    })
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::from(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::data_for;
    use crate::store::write_store;

    const HIERARCHY: &str = "
class Baz {
    public virtual void Qux() {}
    public virtual void Qux(int n) {}
}
class Left : Baz { public override void Qux() { Helper(); } void Helper() { Log(\"left side\"); } void Log(string s) {} }
class Right : Baz { public override void Qux() {} }
class Deep : Left { public override void Qux() {} }
class Caller {
    void Run(Baz b) { b.Qux(); }
    void Start() { Run(new Left()); }
}
";

    fn store_for(src: &str) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("modscope.db");
        write_store(&db, &data_for(src)).unwrap();
        let store = Store::open(&db).unwrap();
        (dir, store)
    }

    #[test]
    fn test_method_specs() {
        let (_dir, store) = store_for(HIERARCHY);
        assert_eq!(store.find_methods("Baz.Qux").unwrap().len(), 2);
        assert_eq!(store.find_methods("Baz.Qux()").unwrap().len(), 1);
        assert_eq!(store.find_methods("Baz.Qux(System.Int32)").unwrap().len(), 1);
        assert_eq!(store.find_methods("Qux").unwrap().len(), 5);
        assert_eq!(store.find_methods("Left..ctor").unwrap().len(), 1);
        let err = store.find_methods("Nope.Nothing").unwrap_err();
        assert!(matches!(err.downcast_ref::<QueryError>(), Some(QueryError::MethodNotFound(_))));
    }

    #[test]
    fn test_callers_of_virtual_method() {
        let (_dir, store) = store_for(HIERARCHY);
        let result = store.callers("Baz.Qux()").unwrap();
        assert_eq!(result.results.len(), 1);
        let callers: Vec<&str> = result.results[0]
            .callers
            .iter()
            .map(|c| c.method.signature.as_str())
            .collect();
        assert_eq!(callers, vec!["Caller.Run(Baz)"]);
        assert_eq!(result.results[0].callers[0].kind, "virtual");
    }

    #[test]
    fn test_overrides_returns_root_and_descendants() {
        let (_dir, store) = store_for(HIERARCHY);
        let result = store.overrides("Right.Qux").unwrap();
        assert_eq!(result.groups.len(), 1);
        let group = &result.groups[0];
        assert_eq!(group.root.signature, "Baz.Qux()");
        let owners: Vec<&str> = group.methods.iter().map(|m| m.owner.as_str()).collect();
        assert_eq!(owners, vec!["Baz", "Left", "Right", "Deep"]);
    }

    #[test]
    fn test_overrides_prefer_base_class_over_interface() {
        let (_dir, store) = store_for(
            "interface IQux { void Qux(); }\n\
             class Baz : IQux { public virtual void Qux() {} }\n\
             class Quux : Baz { public override void Qux() {} }",
        );
        let result = store.overrides("Baz.Qux").unwrap();
        assert_eq!(result.groups.len(), 1);
        let owners: Vec<&str> = result.groups[0].methods.iter().map(|m| m.owner.as_str()).collect();
        assert_eq!(owners, vec!["Baz", "Quux"]);

        let through_interface = store.overrides("IQux.Qux").unwrap();
        let owners: Vec<&str> = through_interface.groups[0]
            .methods
            .iter()
            .map(|m| m.owner.as_str())
            .collect();
        assert_eq!(owners, vec!["IQux", "Baz", "Quux"]);
    }

    #[test]
    fn test_overrides_keep_same_arity_overloads_apart() {
        let (_dir, store) = store_for(
            "class Baz {\n\
               public virtual void Qux(int n) {}\n\
               public virtual void Qux(string s) {}\n\
             }\n\
             class Sub : Baz { public override void Qux(string s) {} }\n\
             class Other : Baz { public override void Qux(int n) {} }",
        );
        let result = store.overrides("Sub.Qux").unwrap();
        assert_eq!(result.groups.len(), 1);
        let group = &result.groups[0];
        assert_eq!(group.root.signature, "Baz.Qux(string)");
        let signatures: Vec<&str> = group.methods.iter().map(|m| m.signature.as_str()).collect();
        assert_eq!(signatures, vec!["Baz.Qux(string)", "Sub.Qux(string)"]);
    }

    #[test]
    fn test_chain_finds_shortest_path() {
        let (_dir, store) = store_for(HIERARCHY);
        let chain = store.chain("Caller.Start", "Baz.Qux()", 10).unwrap();
        let path: Vec<String> = chain.path.unwrap().into_iter().map(|m| m.signature).collect();
        assert_eq!(path, vec!["Caller.Start()", "Caller.Run(Baz)", "Baz.Qux()"]);

        let bounded = store.chain("Caller.Start", "Baz.Qux()", 1).unwrap();
        assert!(bounded.path.is_none());
    }

    #[test]
    fn test_search_and_sql() {
        let (_dir, store) = store_for(HIERARCHY);
        let hits = store.search("left side", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].method.signature, "Left.Helper()");
        assert!(hits[0].snippet.contains(">>>left"));

        let result = store.sql("SELECT name FROM types ORDER BY id LIMIT 2").unwrap();
        assert_eq!(result.columns, vec!["name"]);
        assert_eq!(result.rows[0][0], serde_json::json!("Baz"));

        let err = store.sql("DELETE FROM types").unwrap_err();
        assert!(err.downcast_ref::<QueryError>().is_some());
    }

    #[test]
    fn test_summary_counts() {
        let (_dir, store) = store_for(HIERARCHY);
        let summary = store.summary().unwrap();
        assert_eq!(summary.counts["types"], 5);
        assert_eq!(summary.meta["source_trees"], "[\"Game\"]");
        assert!(summary.calls_by_strategy.values().sum::<i64>() >= 3);
    }

    #[test]
    fn test_missing_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Store::open(&dir.path().join("absent.db")).err().unwrap();
        assert!(matches!(err.downcast_ref::<QueryError>(), Some(QueryError::MissingStore(_))));
    }
}
