//! Build orchestration.
//!
//! One full rebuild per run: discover, load references, parse and harvest in
//! parallel, build the symbol index, resolve and extract in parallel, read
//! configuration, then write the store. Recoverable problems become
//! diagnostics; only a missing root, an empty corpus, or a failed store write
//! abort the build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diagnostics::{BuildDiagnostic, DiagnosticStage};
use crate::discover::{self, SourceFile};
use crate::error::BuildError;
use crate::events;
use crate::ingest::{self, ParsedFile};
use crate::model::{
    harvest_file, CallEdge, Callee, Confidence, EventFire, EventSubscription, PatchRecord,
    PropertyAccess, SymbolIndex,
};
use crate::patches;
use crate::refs::ReferenceIndex;
use crate::resolve::Resolver;
use crate::settings::AnalyzerSettings;
use crate::store::{self, BuildData, BuildMeta, SourceFileRow};
use crate::xmlconf::{self, ConfigIndex};

/// Inputs of one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub root: PathBuf,
    pub refs_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub mods_dirs: Vec<PathBuf>,
    pub db_path: PathBuf,
    pub settings: AnalyzerSettings,
    /// Show progress bars on stderr
    pub progress: bool,
}

impl BuildOptions {
    pub fn new(root: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            refs_dir: None,
            config_dir: None,
            mods_dirs: Vec::new(),
            db_path: db_path.into(),
            settings: AnalyzerSettings::default(),
            progress: false,
        }
    }
}

/// Counts of everything a build wrote.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub source_trees: usize,
    pub source_files: usize,
    pub files_with_errors: usize,
    pub types: usize,
    pub methods: usize,
    pub internal_calls: usize,
    pub external_calls: usize,
    pub calls_by_strategy: BTreeMap<String, usize>,
    pub event_declarations: usize,
    pub event_subscriptions: usize,
    pub event_fires: usize,
    pub property_accesses: usize,
    pub config_definitions: usize,
    pub extensions: usize,
    pub patches_resolved: usize,
    pub patches_best_effort: usize,
    pub config_edits: usize,
    pub diagnostics_by_stage: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: String,
    pub db_path: PathBuf,
    pub elapsed_ms: u128,
    pub summary: BuildSummary,
    pub diagnostics: Vec<BuildDiagnostic>,
}

/// Per-file results of the resolution phase.
#[derive(Default)]
struct FileFacts {
    calls: Vec<CallEdge>,
    subscriptions: Vec<EventSubscription>,
    fires: Vec<EventFire>,
    accesses: Vec<PropertyAccess>,
    patches: Vec<PatchRecord>,
    diagnostics: Vec<BuildDiagnostic>,
}

fn progress_bar(enabled: bool, len: usize, message: &'static str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{msg:>10} [{bar:40}] {pos}/{len} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message(message);
    bar
}

/// Run a full build and replace the store at `options.db_path`.
pub fn build(options: &BuildOptions) -> Result<BuildReport> {
    let started = Instant::now();
    let settings = &options.settings;
    let root = options.root.as_path();
    if !root.is_dir() {
        return Err(BuildError::MissingRoot(root.to_path_buf()).into());
    }
    let exclude = settings.discovery.exclude_set()?;
    let mut diagnostics: Vec<BuildDiagnostic> = Vec::new();

    // Discovery
    let trees = discover::discover_trees(root, &exclude);
    let mut files: Vec<SourceFile> = Vec::new();
    for tree in &trees {
        let sources = discover::collect_tree_sources(tree, root, &exclude);
        debug!("tree {}: {} files", tree.id, sources.files.len());
        files.extend(sources.files);
        diagnostics.extend(sources.diagnostics);
    }
    let (extensions, ext_diagnostics) =
        discover::discover_extensions(&options.mods_dirs, &settings.discovery, &exclude);
    diagnostics.extend(ext_diagnostics);
    for ext in &extensions {
        files.extend(ext.sources.iter().cloned());
    }
    files.sort_by(|a, b| (&a.tree_id, &a.rel_path).cmp(&(&b.tree_id, &b.rel_path)));
    files.dedup_by(|a, b| a.path == b.path);
    info!(
        "Discovered {} source trees, {} extensions, {} C# files",
        trees.len(),
        extensions.len(),
        files.len()
    );

    // References
    let refs = match &options.refs_dir {
        Some(dir) if dir.is_dir() => {
            let (refs, ref_diagnostics) = ReferenceIndex::load(dir, &exclude);
            diagnostics.extend(ref_diagnostics);
            refs
        }
        Some(dir) => {
            diagnostics.push(BuildDiagnostic::error(
                dir.display().to_string(),
                DiagnosticStage::LoadReference,
                "reference directory does not exist",
            ));
            ReferenceIndex::new()
        }
        None => ReferenceIndex::new(),
    };

    // Parse
    let bar = progress_bar(options.progress, files.len(), "parse");
    let results: Vec<std::result::Result<ParsedFile, BuildDiagnostic>> = files
        .par_iter()
        .map(|file| {
            let result = ingest::parse_file(file);
            bar.inc(1);
            result
        })
        .collect();
    bar.finish_and_clear();
    let mut parsed: Vec<ParsedFile> = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(p) => parsed.push(p),
            Err(d) => diagnostics.push(d),
        }
    }
    if parsed.is_empty() {
        return Err(BuildError::NoSyntaxTrees(root.to_path_buf()).into());
    }
    let with_errors = parsed.iter().filter(|p| p.has_errors).count();
    info!("Parsed {} files ({} with syntax errors)", parsed.len(), with_errors);

    // Harvest
    let harvests: Vec<_> = parsed.par_iter().map(harvest_file).collect();
    let index = SymbolIndex::build(harvests, &refs);
    info!(
        "Harvested {} types, {} methods",
        index.types.len(),
        index.methods.len()
    );

    // Resolve and extract
    let resolver = Resolver::new(&index, &refs).with_event_settings(settings.events.clone());
    let bar = progress_bar(options.progress, parsed.len(), "resolve");
    let per_file: Vec<FileFacts> = parsed
        .par_iter()
        .map(|p| {
            let facts = extract_file(&resolver, p, &index, settings);
            bar.inc(1);
            facts
        })
        .collect();
    bar.finish_and_clear();
    let mut facts = FileFacts::default();
    for f in per_file {
        facts.calls.extend(f.calls);
        facts.subscriptions.extend(f.subscriptions);
        facts.fires.extend(f.fires);
        facts.accesses.extend(f.accesses);
        facts.patches.extend(f.patches);
        facts.diagnostics.extend(f.diagnostics);
    }
    diagnostics.append(&mut facts.diagnostics);
    let event_declarations = events::event_declarations(&index, &settings.events);
    info!(
        "Resolved {} calls, {} event facts, {} property accesses, {} patches",
        facts.calls.len(),
        event_declarations.len() + facts.subscriptions.len() + facts.fires.len(),
        facts.accesses.len(),
        facts.patches.len()
    );

    // Configuration
    let config = match &options.config_dir {
        Some(dir) if dir.is_dir() => xmlconf::index_config_dir(dir, &exclude),
        Some(dir) => {
            warn!("Config directory {} does not exist", dir.display());
            ConfigIndex::default()
        }
        None => ConfigIndex::default(),
    };
    diagnostics.extend(config.diagnostics);
    let mut config_edits = Vec::new();
    for ext in &extensions {
        let (edits, edit_diagnostics) = xmlconf::read_extension_edits(ext, &config.catalog);
        config_edits.extend(edits);
        diagnostics.extend(edit_diagnostics);
    }
    info!(
        "Indexed {} config definitions, {} config edits",
        config.definitions.len(),
        config_edits.len()
    );

    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    for d in &diagnostics {
        warn!("{}", d.format_stderr());
    }

    let meta = BuildMeta::new(
        root,
        options.refs_dir.as_deref(),
        options.config_dir.as_deref(),
        &options.mods_dirs,
        trees.iter().map(|t| t.id.clone()).collect(),
    );
    let data = BuildData {
        index,
        calls: facts.calls,
        event_declarations,
        event_subscriptions: facts.subscriptions,
        event_fires: facts.fires,
        config_definitions: config.definitions,
        property_accesses: facts.accesses,
        extensions: extensions.iter().map(|e| e.record.clone()).collect(),
        patches: facts.patches,
        config_edits,
        source_files: parsed.iter().map(SourceFileRow::from).collect(),
        diagnostics,
        meta,
    };
    let summary = summarize(&data, trees.len());
    store::write_store(&options.db_path, &data).map_err(|source| BuildError::Store {
        path: options.db_path.clone(),
        source,
    })?;
    info!("Wrote store {}", options.db_path.display());

    Ok(BuildReport {
        build_id: data.meta.build_id,
        db_path: options.db_path.clone(),
        elapsed_ms: started.elapsed().as_millis(),
        summary,
        diagnostics: data.diagnostics,
    })
}

fn extract_file(
    resolver: &Resolver<'_>,
    parsed: &ParsedFile,
    index: &SymbolIndex,
    settings: &AnalyzerSettings,
) -> FileFacts {
    let event_facts = events::extract_file(resolver, parsed);
    let found = patches::discover_file(parsed, index);
    FileFacts {
        calls: resolver.resolve_file(parsed),
        subscriptions: event_facts.subscriptions,
        fires: event_facts.fires,
        accesses: xmlconf::extract_property_accesses(resolver, parsed, &settings.resolution),
        patches: found.records,
        diagnostics: found.diagnostics,
    }
}

fn summarize(data: &BuildData, source_trees: usize) -> BuildSummary {
    let mut summary = BuildSummary {
        source_trees,
        source_files: data.source_files.len(),
        files_with_errors: data.source_files.iter().filter(|f| f.has_errors).count(),
        types: data.index.types.len(),
        methods: data.index.methods.len(),
        event_declarations: data.event_declarations.len(),
        event_subscriptions: data.event_subscriptions.len(),
        event_fires: data.event_fires.len(),
        property_accesses: data.property_accesses.len(),
        config_definitions: data.config_definitions.len(),
        extensions: data.extensions.len(),
        config_edits: data.config_edits.len(),
        ..BuildSummary::default()
    };
    for call in &data.calls {
        match call.callee {
            Callee::Internal(_) => summary.internal_calls += 1,
            Callee::External(_) => summary.external_calls += 1,
        }
        *summary
            .calls_by_strategy
            .entry(call.strategy.clone())
            .or_default() += 1;
    }
    for p in &data.patches {
        match p.confidence {
            Confidence::Resolved => summary.patches_resolved += 1,
            Confidence::BestEffort => summary.patches_best_effort += 1,
        }
    }
    for d in &data.diagnostics {
        *summary
            .diagnostics_by_stage
            .entry(d.stage_key().to_string())
            .or_default() += 1;
    }
    summary
}

/// Default store location for a source root.
pub fn default_db_path(root: &Path) -> PathBuf {
    root.join("modscope.db")
}
