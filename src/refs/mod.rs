//! Reference loader.
//!
//! Loads compiled dependencies as type-resolution context for calls that
//! leave the analyzed corpus. Each binary is read independently; ones that
//! are not managed assemblies or whose metadata is damaged are skipped and
//! reported, never fatal.

pub mod metadata;

use ahash::AHashMap;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::common::display_path;
use crate::diagnostics::{BuildDiagnostic, DiagnosticStage, SkipReason};
use metadata::{AssemblyMetadata, MetadataError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefMethod {
    pub name: String,
    pub is_virtual: bool,
    pub is_static: bool,
    pub param_count: Option<usize>,
}

/// A type defined in a referenced assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefType {
    pub assembly: String,
    pub namespace: String,
    /// Simple name without generic arity suffix
    pub name: String,
    pub is_interface: bool,
    pub base: Option<String>,
    pub methods: Vec<RefMethod>,
}

impl RefType {
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// `List`1` -> `List`
pub fn strip_arity(name: &str) -> &str {
    name.split('`').next().unwrap_or(name)
}

/// Types of all loaded references, looked up by simple name.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    types: AHashMap<String, Vec<RefType>>,
    assemblies: Vec<String>,
}

/// Upper bound on base-chain walks through references.
const MAX_BASE_DEPTH: usize = 32;

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.dll`/`.exe` under `dir`, in parallel.
    pub fn load(dir: &Path, exclude: &globset::GlobSet) -> (Self, Vec<BuildDiagnostic>) {
        let walk = crate::discover::walk_files(dir, &["dll", "exe"], exclude);
        let mut diagnostics = walk.diagnostics;

        let results: Vec<(PathBuf, Result<AssemblyMetadata, BuildDiagnostic>)> = walk
            .files
            .par_iter()
            .map(|path| {
                let rel = display_path(path, dir);
                let result = std::fs::read(path)
                    .map_err(|e| {
                        BuildDiagnostic::error(rel.clone(), DiagnosticStage::LoadReference, e.to_string())
                    })
                    .and_then(|bytes| {
                        metadata::read_assembly(&bytes).map_err(|e| match e {
                            MetadataError::NotManaged(_) => {
                                BuildDiagnostic::skipped(rel.clone(), SkipReason::NotManagedAssembly)
                            }
                            MetadataError::Corrupt(_) => {
                                BuildDiagnostic::skipped(rel.clone(), SkipReason::CorruptAssembly)
                            }
                        })
                    });
                (path.clone(), result)
            })
            .collect();

        let mut index = ReferenceIndex::new();
        for (path, result) in results {
            match result {
                Ok(meta) => {
                    debug!("Loaded reference {} ({} types)", path.display(), meta.types.len());
                    let fallback = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default();
                    index.add_assembly(meta, &fallback);
                }
                Err(diag) => {
                    warn!("Skipping reference {}: {}", path.display(), diag.message());
                    diagnostics.push(diag);
                }
            }
        }
        info!(
            "Loaded {} reference assemblies ({} type names)",
            index.assemblies.len(),
            index.types.len()
        );
        (index, diagnostics)
    }

    /// Add one assembly's types; the file stem names it when the module name is empty.
    pub fn add_assembly(&mut self, meta: AssemblyMetadata, fallback_name: &str) {
        let assembly = if meta.assembly.is_empty() {
            fallback_name.to_string()
        } else {
            meta.assembly
        };
        for t in meta.types {
            let is_interface = t.is_interface();
            let name = strip_arity(&t.name).to_string();
            let rt = RefType {
                assembly: assembly.clone(),
                namespace: t.namespace,
                name: name.clone(),
                is_interface,
                base: t.extends.map(|b| strip_arity(&b).to_string()),
                methods: t
                    .methods
                    .into_iter()
                    .map(|m| RefMethod {
                        is_virtual: m.is_virtual(),
                        is_static: m.is_static(),
                        param_count: m.param_count,
                        name: m.name,
                    })
                    .collect(),
            };
            self.types.entry(name).or_default().push(rt);
        }
        self.assemblies.push(assembly);
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn assemblies(&self) -> &[String] {
        &self.assemblies
    }

    /// First loaded type with this simple name.
    pub fn lookup(&self, simple_name: &str) -> Option<&RefType> {
        self.types.get(strip_arity(simple_name)).and_then(|v| v.first())
    }

    pub fn assembly_of(&self, simple_name: &str) -> Option<&str> {
        self.lookup(simple_name).map(|t| t.assembly.as_str())
    }

    /// Find `method` on `type_name` or its reference base chain.
    ///
    /// Returns the declaring type and the method.
    pub fn find_method(&self, type_name: &str, method: &str) -> Option<(&RefType, &RefMethod)> {
        let mut current = self.lookup(type_name)?;
        for _ in 0..MAX_BASE_DEPTH {
            if let Some(m) = current.methods.iter().find(|m| m.name == method) {
                return Some((current, m));
            }
            current = self.lookup(current.base.as_deref()?)?;
        }
        None
    }

    pub fn is_interface(&self, simple_name: &str) -> bool {
        self.lookup(simple_name).is_some_and(|t| t.is_interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DiscoverySettings;
    use metadata::tests::{build_metadata, build_pe};
    use tempfile::TempDir;

    fn unity() -> Vec<u8> {
        build_pe(&build_metadata(
            "UnityEngine.dll",
            &["Object"],
            &[
                ("UnityEngine", "Object", 0x1, None, vec![("Destroy", 0x16, 1)]),
                ("UnityEngine", "MonoBehaviour", 0x1, Some(1), vec![("Invoke", 0x46, 2)]),
                ("System.Collections.Generic", "List`1", 0x1, None, vec![("Add", 0x6, 1)]),
            ],
        ))
    }

    #[test]
    fn test_lookup_and_base_chain() {
        let mut index = ReferenceIndex::new();
        let meta = metadata::read_assembly(&unity()).unwrap();
        index.add_assembly(meta, "x");
        assert_eq!(index.assembly_of("MonoBehaviour"), Some("UnityEngine"));
        assert_eq!(index.lookup("List").map(|t| t.full_name()).as_deref(), Some("System.Collections.Generic.List"));

        let (decl, m) = index.find_method("MonoBehaviour", "Invoke").unwrap();
        assert_eq!(decl.name, "MonoBehaviour");
        assert!(m.is_virtual);
        // Destroy is inherited from the base reference type
        let (decl, m) = index.find_method("MonoBehaviour", "Destroy").unwrap();
        assert_eq!(decl.name, "Object");
        assert!(m.is_static);
        assert!(index.find_method("MonoBehaviour", "Missing").is_none());
    }

    #[test]
    fn test_load_skips_unmanaged_and_corrupt_binaries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("UnityEngine.dll"), unity()).unwrap();
        std::fs::write(dir.path().join("native.dll"), vec![0u8; 256]).unwrap();
        let mut broken = unity();
        broken.truncate(broken.len() - 120);
        std::fs::write(dir.path().join("broken.dll"), broken).unwrap();

        let exclude = DiscoverySettings::default().exclude_set().unwrap();
        let (index, diags) = ReferenceIndex::load(dir.path(), &exclude);
        assert_eq!(index.assemblies(), &["UnityEngine".to_string()]);
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().any(|d| matches!(
            d,
            BuildDiagnostic::Skipped { reason: SkipReason::NotManagedAssembly, .. }
        )));
        assert!(diags.iter().any(|d| matches!(
            d,
            BuildDiagnostic::Skipped { reason: SkipReason::CorruptAssembly, .. }
        )));
    }
}
