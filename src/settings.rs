//! Analyzer settings.
//!
//! Loaded from an optional TOML file passed with `--settings`. Every section
//! falls back to its defaults, so a file only needs the keys it changes:
//!
//! ```toml
//! [conflicts]
//! indirect_depth = 4
//!
//! [conflicts.severity]
//! set = "high"
//! ```

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SettingsError;
use crate::model::{ConfigOp, Severity};

/// Top-level analyzer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub discovery: DiscoverySettings,
    pub resolution: ResolutionSettings,
    pub events: EventSettings,
    pub conflicts: ConflictSettings,
    pub query: QuerySettings,
}

impl AnalyzerSettings {
    /// Load settings from the given TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::Io(path.to_path_buf(), e))?;
        let mut settings: AnalyzerSettings = toml::from_str(&content)
            .map_err(|e| SettingsError::Parse(path.to_path_buf(), e.to_string()))?;
        settings.conflicts.severity.enforce_destructive_floor();
        Ok(settings)
    }

    /// Load from `path` when given, else use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

/// Source discovery conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Glob patterns (relative paths) never scanned
    pub exclude: Vec<String>,
    /// Manifest file name inside each extension directory
    pub manifest_name: String,
    /// Directory holding an extension's configuration edits
    pub config_subdir: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            exclude: vec![
                "**/bin/**".to_string(),
                "**/obj/**".to_string(),
                "**/.git/**".to_string(),
                "**/.vs/**".to_string(),
            ],
            manifest_name: "ModInfo.xml".to_string(),
            config_subdir: "Config".to_string(),
        }
    }
}

impl DiscoverySettings {
    /// Compile the exclude patterns into one matcher.
    pub fn exclude_set(&self) -> anyhow::Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            builder.add(Glob::new(pattern)?);
        }
        Ok(builder.build()?)
    }
}

/// Property-bag detection for the property-access pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionSettings {
    /// Type names treated as property bags when the receiver type is known
    pub property_bag_types: Vec<String>,
    /// Receiver member names accepted when the type is unknown
    pub property_bag_members: Vec<String>,
    /// Methods that read a named property
    pub read_apis: Vec<String>,
    /// Methods that test whether a property exists
    pub existence_apis: Vec<String>,
    /// Methods that write a named property
    pub write_apis: Vec<String>,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            property_bag_types: strings(&["DynamicProperties"]),
            property_bag_members: strings(&["Properties", "Values", "Props", "Params"]),
            read_apis: strings(&[
                "GetBool",
                "GetFloat",
                "GetInt",
                "GetString",
                "GetStringValue",
                "GetLocalizedString",
                "ParseBool",
                "ParseFloat",
                "ParseInt",
                "ParseString",
                "ParseVec",
                "ParseColor",
                "ParseEnum",
                "TryGetValue",
            ]),
            existence_apis: strings(&["Contains", "ContainsKey"]),
            write_apis: strings(&["SetValue"]),
        }
    }
}

/// Event-name vocabulary and naming conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub vocabulary: Vec<String>,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

impl Default for EventSettings {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            vocabulary: strings(&[
                "Changed",
                "Updated",
                "Clicked",
                "Pressed",
                "Completed",
                "Started",
                "Finished",
                "Loaded",
                "Unloaded",
                "Spawned",
                "Despawned",
                "Killed",
                "Died",
                "Destroyed",
                "Damaged",
                "Triggered",
                "Opened",
                "Closed",
                "Selected",
                "ValueChanged",
                "PropertyChanged",
                "CollectionChanged",
            ]),
            prefixes: strings(&["On"]),
            suffixes: strings(&["Changed", "Event"]),
        }
    }
}

impl EventSettings {
    pub fn in_vocabulary(&self, name: &str) -> bool {
        self.vocabulary.iter().any(|v| v == name)
    }

    /// `On*` (followed by an upper-case letter), `*Changed`, `*Event`.
    pub fn matches_convention(&self, name: &str) -> bool {
        let prefixed = self.prefixes.iter().any(|p| {
            name.strip_prefix(p.as_str())
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c.is_ascii_uppercase())
        });
        let suffixed = self
            .suffixes
            .iter()
            .any(|s| name.len() > s.len() && name.ends_with(s.as_str()));
        prefixed || suffixed
    }
}

/// Conflict detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictSettings {
    pub indirect_enabled: bool,
    /// Forward reachability bound for indirect conflicts
    pub indirect_depth: usize,
    pub severity: OpSeverity,
}

impl Default for ConflictSettings {
    fn default() -> Self {
        Self {
            indirect_enabled: true,
            indirect_depth: 3,
            severity: OpSeverity::default(),
        }
    }
}

impl ConflictSettings {
    pub fn severity_for(&self, op: ConfigOp) -> Severity {
        match op {
            ConfigOp::Set => self.severity.set,
            ConfigOp::Append => self.severity.append,
            ConfigOp::Remove => self.severity.remove,
            ConfigOp::InsertBefore => self.severity.insert_before,
            ConfigOp::InsertAfter => self.severity.insert_after,
        }
    }
}

/// Per-operation severity of a configuration collision participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpSeverity {
    pub set: Severity,
    pub append: Severity,
    pub remove: Severity,
    pub insert_before: Severity,
    pub insert_after: Severity,
}

impl Default for OpSeverity {
    fn default() -> Self {
        Self {
            set: Severity::Medium,
            append: Severity::Low,
            remove: Severity::High,
            insert_before: Severity::Low,
            insert_after: Severity::Low,
        }
    }
}

impl OpSeverity {
    /// Destructive operations never rank below additive ones.
    pub fn enforce_destructive_floor(&mut self) {
        let additive = self.append.max(self.insert_before).max(self.insert_after);
        if self.set < additive {
            tracing::warn!("severity.set ranked below an additive op; raising to {}", additive);
            self.set = additive;
        }
        if self.remove < self.set {
            tracing::warn!("severity.remove ranked below set; raising to {}", self.set);
            self.remove = self.set;
        }
    }
}

/// Query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub chain_max_depth: usize,
    pub search_limit: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            chain_max_depth: 10,
            search_limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_roundtrip_toml() {
        let settings = AnalyzerSettings::default();
        let toml_str = toml::to_string_pretty(&settings).expect("serialize");
        let parsed: AnalyzerSettings = toml::from_str(&toml_str).expect("parse back");
        assert_eq!(parsed.conflicts.indirect_depth, 3);
        assert_eq!(parsed.query.chain_max_depth, 10);
        assert_eq!(parsed.discovery.manifest_name, "ModInfo.xml");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modscope.toml");
        std::fs::write(&path, "[conflicts]\nindirect_depth = 5\n").unwrap();
        let settings = AnalyzerSettings::load(&path).unwrap();
        assert_eq!(settings.conflicts.indirect_depth, 5);
        assert!(settings.conflicts.indirect_enabled);
        assert_eq!(settings.conflicts.severity.remove, Severity::High);
        assert_eq!(settings.resolution.property_bag_types, vec!["DynamicProperties"]);
    }

    #[test]
    fn test_destructive_floor_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.toml");
        std::fs::write(
            &path,
            "[conflicts.severity]\nremove = \"low\"\nset = \"low\"\nappend = \"medium\"\n",
        )
        .unwrap();
        let settings = AnalyzerSettings::load(&path).unwrap();
        assert_eq!(settings.conflicts.severity.set, Severity::Medium);
        assert_eq!(settings.conflicts.severity.remove, Severity::Medium);
        assert!(
            settings.conflicts.severity_for(ConfigOp::Remove)
                >= settings.conflicts.severity_for(ConfigOp::Append)
        );
    }

    #[test]
    fn test_invalid_settings_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[conflicts\n").unwrap();
        assert!(matches!(
            AnalyzerSettings::load(&path),
            Err(SettingsError::Parse(_, _))
        ));
    }

    #[test]
    fn test_event_conventions() {
        let events = EventSettings::default();
        assert!(events.matches_convention("OnDamaged"));
        assert!(events.matches_convention("HealthChanged"));
        assert!(events.matches_convention("DeathEvent"));
        assert!(!events.matches_convention("Once"));
        assert!(!events.matches_convention("Event"));
        assert!(events.in_vocabulary("Changed"));
    }

    #[test]
    fn test_exclude_set_matches_build_dirs() {
        let set = DiscoverySettings::default().exclude_set().unwrap();
        assert!(set.is_match("Game/obj/Debug/Temp.cs"));
        assert!(!set.is_match("Game/Player.cs"));
    }
}
