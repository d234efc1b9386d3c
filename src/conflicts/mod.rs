//! Compatibility analysis between extensions.
//!
//! Detection is a pure function of the records an extension set produced:
//! patches, config edits, internal call edges and property reads. The store
//! loads those and hands them to [`detect`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ahash::AHashMap;
use serde::Serialize;

use crate::model::{ConfigEdit, MethodId, PatchKind, PatchRecord, Severity, UNKNOWN_TYPE};
use crate::settings::ConflictSettings;

const DIRECT_RESOLUTION: &str = "Both mods patch the same method. Test thoroughly for conflicts.";
const CONFIG_RESOLUTION: &str = "Multiple mods modify the same XML node. Last-loaded wins.";
const INDIRECT_RESOLUTION: &str =
    "One mod changes behavior another mod's patch depends on. Test the interaction.";

/// Everything conflict detection looks at.
#[derive(Debug, Clone, Default)]
pub struct ConflictInput {
    pub extensions: Vec<String>,
    pub patches: Vec<PatchRecord>,
    pub edits: Vec<ConfigEdit>,
    /// Internal call edges, caller to callee
    pub edges: Vec<(MethodId, MethodId)>,
    /// Methods that read a config property, with the property name
    pub reads: Vec<(MethodId, String)>,
    /// Display signature per method, for indirect conflict targets
    pub signatures: AHashMap<MethodId, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    DirectPatch,
    ConfigCollision,
    Indirect,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::DirectPatch => "direct-patch",
            ConflictKind::ConfigCollision => "config-collision",
            ConflictKind::Indirect => "indirect",
        }
    }
}

/// One extension's part in a conflict.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Participant {
    pub extension: String,
    /// `file:line`
    pub location: String,
    /// Patch kind or config operation
    pub action: String,
    /// Declaring member of a patch, or the edit value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub target: String,
    pub severity: Severity,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_order_suggestion: Option<String>,
    pub resolution: String,
}

impl Conflict {
    /// Distinct extensions involved, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.participants.iter().map(|p| p.extension.as_str()).collect();
        set.into_iter().collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadOrderSuggestion {
    pub recommendation: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompatSummary {
    pub total_conflicts: usize,
    pub direct_patch: usize,
    pub config_collision: usize,
    pub indirect: usize,
    pub high_severity: usize,
    pub medium_severity: usize,
    pub low_severity: usize,
    /// No conflicts at all
    pub compatible: bool,
    /// No high-severity conflicts
    pub compatible_with_caveats: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompatReport {
    pub extensions: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub load_order_suggestions: Vec<LoadOrderSuggestion>,
    pub summary: CompatSummary,
}

/// Detect every conflict among `only` (all extensions when `None`).
pub fn detect(input: &ConflictInput, settings: &ConflictSettings, only: Option<&[String]>) -> CompatReport {
    let included = |ext: &str| only.map_or(true, |names| names.iter().any(|n| n == ext));
    let patches: Vec<&PatchRecord> = input.patches.iter().filter(|p| included(&p.extension)).collect();
    let edits: Vec<&ConfigEdit> = input.edits.iter().filter(|e| included(&e.extension)).collect();

    let mut conflicts = Vec::new();
    let mut suggestions = Vec::new();
    direct_conflicts(&patches, &mut conflicts, &mut suggestions);
    config_collisions(&edits, settings, &mut conflicts);
    if settings.indirect_enabled {
        indirect_conflicts(input, &patches, &edits, settings.indirect_depth, &mut conflicts);
    }
    conflicts.sort_by(|a, b| (a.kind, &a.target).cmp(&(b.kind, &b.target)));

    let mut extensions: Vec<String> = input
        .extensions
        .iter()
        .filter(|e| included(e.as_str()))
        .cloned()
        .collect();
    extensions.sort();

    let count = |s: Severity| conflicts.iter().filter(|c| c.severity == s).count();
    let of_kind = |k: ConflictKind| conflicts.iter().filter(|c| c.kind == k).count();
    let summary = CompatSummary {
        total_conflicts: conflicts.len(),
        direct_patch: of_kind(ConflictKind::DirectPatch),
        config_collision: of_kind(ConflictKind::ConfigCollision),
        indirect: of_kind(ConflictKind::Indirect),
        high_severity: count(Severity::High),
        medium_severity: count(Severity::Medium),
        low_severity: count(Severity::Low),
        compatible: conflicts.is_empty(),
        compatible_with_caveats: count(Severity::High) == 0,
    };
    CompatReport {
        extensions,
        conflicts,
        load_order_suggestions: suggestions,
        summary,
    }
}

fn is_known_target(p: &PatchRecord) -> bool {
    p.target_type != UNKNOWN_TYPE && p.target_method != UNKNOWN_TYPE
}

fn patch_participant(p: &PatchRecord) -> Participant {
    Participant {
        extension: p.extension.clone(),
        location: format!("{}:{}", p.file, p.line),
        action: p.kind.as_str().to_string(),
        detail: Some(format!("{}.{}", p.declaring_type, p.declaring_method)),
        severity: None,
    }
}

fn distinct_extensions<'a>(items: impl Iterator<Item = &'a str>) -> BTreeSet<&'a str> {
    items.collect()
}

fn direct_conflicts(
    patches: &[&PatchRecord],
    conflicts: &mut Vec<Conflict>,
    suggestions: &mut Vec<LoadOrderSuggestion>,
) {
    let mut groups: BTreeMap<&str, Vec<&PatchRecord>> = BTreeMap::new();
    for p in patches.iter().filter(|p| is_known_target(p)) {
        groups.entry(p.target_signature.as_str()).or_default().push(*p);
    }
    for (signature, group) in groups {
        if distinct_extensions(group.iter().map(|p| p.extension.as_str())).len() < 2 {
            continue;
        }
        let mut participants: Vec<Participant> = group.iter().map(|p| patch_participant(p)).collect();
        participants.sort();

        let rewriters = distinct_extensions(
            group
                .iter()
                .filter(|p| p.kind == PatchKind::Rewrite)
                .map(|p| p.extension.as_str()),
        );
        let wrappers = distinct_extensions(
            group
                .iter()
                .filter(|p| matches!(p.kind, PatchKind::Before | PatchKind::After))
                .map(|p| p.extension.as_str()),
        );
        let load_order = (!rewriters.is_empty() && !wrappers.is_empty()).then(|| {
            let first: Vec<&str> = rewriters.iter().copied().collect();
            let recommendation = format!("Load {} first", first.join(", "));
            suggestions.push(LoadOrderSuggestion {
                recommendation: recommendation.clone(),
                reason: format!(
                    "{} rewrites {} while other mods wrap it with before/after patches",
                    first.join(", "),
                    signature
                ),
            });
            recommendation
        });

        conflicts.push(Conflict {
            kind: ConflictKind::DirectPatch,
            target: signature.to_string(),
            severity: Severity::High,
            participants,
            load_order_suggestion: load_order,
            resolution: DIRECT_RESOLUTION.to_string(),
        });
    }
}

fn config_collisions(edits: &[&ConfigEdit], settings: &ConflictSettings, conflicts: &mut Vec<Conflict>) {
    let mut groups: BTreeMap<(&str, &str), Vec<&ConfigEdit>> = BTreeMap::new();
    for e in edits {
        groups
            .entry((e.target_file.as_str(), e.path.as_str()))
            .or_default()
            .push(*e);
    }
    for ((file, path), group) in groups {
        if distinct_extensions(group.iter().map(|e| e.extension.as_str())).len() < 2 {
            continue;
        }
        let mut participants: Vec<Participant> = group
            .iter()
            .map(|e| Participant {
                extension: e.extension.clone(),
                location: format!("{}:{}", e.file, e.line),
                action: e.op.as_str().to_string(),
                detail: e.value.clone(),
                severity: Some(settings.severity_for(e.op)),
            })
            .collect();
        participants.sort();
        let severity = participants
            .iter()
            .filter_map(|p| p.severity)
            .max()
            .unwrap_or(Severity::Low);
        conflicts.push(Conflict {
            kind: ConflictKind::ConfigCollision,
            target: format!("{}:{}", file, path),
            severity,
            participants,
            load_order_suggestion: None,
            resolution: CONFIG_RESOLUTION.to_string(),
        });
    }
}

/// Methods reachable from `start` in at most `depth` calls, with their distance.
pub fn reachable_within(
    adjacency: &AHashMap<MethodId, Vec<MethodId>>,
    start: MethodId,
    depth: usize,
) -> BTreeMap<MethodId, usize> {
    let mut seen = BTreeMap::new();
    seen.insert(start, 0);
    let mut queue = VecDeque::from([(start, 0usize)]);
    while let Some((node, d)) = queue.pop_front() {
        if d == depth {
            continue;
        }
        for next in adjacency.get(&node).into_iter().flatten() {
            if !seen.contains_key(next) {
                seen.insert(*next, d + 1);
                queue.push_back((*next, d + 1));
            }
        }
    }
    seen
}

fn indirect_conflicts(
    input: &ConflictInput,
    patches: &[&PatchRecord],
    edits: &[&ConfigEdit],
    depth: usize,
    conflicts: &mut Vec<Conflict>,
) {
    let mut adjacency: AHashMap<MethodId, Vec<MethodId>> = AHashMap::new();
    for (caller, callee) in &input.edges {
        adjacency.entry(*caller).or_default().push(*callee);
    }
    let mut readers: AHashMap<&str, BTreeSet<MethodId>> = AHashMap::new();
    for (method, property) in &input.reads {
        readers.entry(property.as_str()).or_default().insert(*method);
    }
    let signature_of = |id: MethodId| {
        input
            .signatures
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("#{}", id))
    };

    // One conflict per (patched root, other extension, reached item)
    let mut found: BTreeMap<(String, String, String), Conflict> = BTreeMap::new();
    for root in patches {
        let Some(root_id) = root.target_method_id else {
            continue;
        };
        let reach = reachable_within(&adjacency, root_id, depth);

        for other in patches {
            if other.extension == root.extension {
                continue;
            }
            let Some(other_id) = other.target_method_id else {
                continue;
            };
            if other_id == root_id {
                continue;
            }
            let Some(distance) = reach.get(&other_id) else {
                continue;
            };
            let target = format!("{} -> {}", root.target_signature, other.target_signature);
            let key = (target.clone(), other.extension.clone(), root.extension.clone());
            let entry = found.entry(key).or_insert_with(|| Conflict {
                kind: ConflictKind::Indirect,
                target,
                severity: Severity::Medium,
                participants: vec![patch_participant(root)],
                load_order_suggestion: None,
                resolution: format!(
                    "{} {} is reached {} call(s) deep.",
                    INDIRECT_RESOLUTION, other.target_signature, distance
                ),
            });
            let participant = patch_participant(other);
            if !entry.participants.contains(&participant) {
                entry.participants.push(participant);
            }
        }

        for edit in edits {
            if edit.extension == root.extension {
                continue;
            }
            let Some(property) = edit.property_name.as_deref() else {
                continue;
            };
            let Some(reading) = readers
                .get(property)
                .and_then(|ms| ms.iter().find(|m| reach.contains_key(*m)))
            else {
                continue;
            };
            let target = format!("{} -> {} reads {}", root.target_signature, signature_of(*reading), property);
            let key = (target.clone(), edit.extension.clone(), root.extension.clone());
            let entry = found.entry(key).or_insert_with(|| Conflict {
                kind: ConflictKind::Indirect,
                target,
                severity: Severity::Low,
                participants: vec![patch_participant(root)],
                load_order_suggestion: None,
                resolution: INDIRECT_RESOLUTION.to_string(),
            });
            let participant = Participant {
                extension: edit.extension.clone(),
                location: format!("{}:{}", edit.file, edit.line),
                action: edit.op.as_str().to_string(),
                detail: Some(format!("{}:{}", edit.target_file, edit.path)),
                severity: None,
            };
            if !entry.participants.contains(&participant) {
                entry.participants.push(participant);
            }
        }
    }
    for (_, mut conflict) in found {
        conflict.participants.sort();
        conflicts.push(conflict);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confidence, ConfigOp, PatchStyle};

    fn patch(ext: &str, signature: &str, kind: PatchKind, id: Option<MethodId>) -> PatchRecord {
        let (type_name, method) = signature
            .split_once('(')
            .and_then(|(head, _)| head.rsplit_once('.'))
            .unwrap_or((UNKNOWN_TYPE, UNKNOWN_TYPE));
        PatchRecord {
            extension: ext.into(),
            declaring_type: format!("{}Patch", ext),
            declaring_method: "Prefix".into(),
            target_type: type_name.into(),
            target_method: method.into(),
            target_params: None,
            target_signature: signature.into(),
            kind,
            style: PatchStyle::Declarative,
            confidence: Confidence::Resolved,
            target_method_id: id,
            file: format!("{}/Patch.cs", ext),
            line: 3,
        }
    }

    fn edit(ext: &str, path: &str, op: ConfigOp, value: Option<&str>) -> ConfigEdit {
        ConfigEdit {
            extension: ext.into(),
            target_file: "items.xml".into(),
            raw_path: path.into(),
            path: path.into(),
            op,
            property_name: crate::xmlconf::property_name_of(path),
            value: value.map(str::to_string),
            file: "Config/items.xml".into(),
            line: 2,
        }
    }

    fn input(patches: Vec<PatchRecord>, edits: Vec<ConfigEdit>) -> ConflictInput {
        ConflictInput {
            extensions: vec!["A".into(), "B".into(), "C".into()],
            patches,
            edits,
            ..Default::default()
        }
    }

    #[test]
    fn test_direct_conflicts_respect_overloads() {
        let report = detect(
            &input(
                vec![
                    patch("A", "Foo.Bar(int)", PatchKind::Before, Some(1)),
                    patch("B", "Foo.Bar(string)", PatchKind::Before, Some(2)),
                    patch("C", "Foo.Bar(int)", PatchKind::After, Some(1)),
                ],
                vec![],
            ),
            &ConflictSettings::default(),
            None,
        );
        assert_eq!(report.conflicts.len(), 1);
        let c = &report.conflicts[0];
        assert_eq!(c.kind, ConflictKind::DirectPatch);
        assert_eq!(c.target, "Foo.Bar(int)");
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.extensions(), vec!["A", "C"]);
        assert_eq!(c.resolution, DIRECT_RESOLUTION);
        assert!(!report.summary.compatible);
        assert!(!report.summary.compatible_with_caveats);
    }

    #[test]
    fn test_rewriters_load_first() {
        let report = detect(
            &input(
                vec![
                    patch("A", "Foo.Bar()", PatchKind::Before, Some(1)),
                    patch("B", "Foo.Bar()", PatchKind::Rewrite, Some(1)),
                ],
                vec![],
            ),
            &ConflictSettings::default(),
            None,
        );
        assert_eq!(
            report.conflicts[0].load_order_suggestion.as_deref(),
            Some("Load B first")
        );
        assert_eq!(report.load_order_suggestions.len(), 1);
    }

    #[test]
    fn test_collision_severity_follows_operation() {
        let path = "/items/item[@name='gun']";
        let removed = detect(
            &input(
                vec![],
                vec![
                    edit("A", path, ConfigOp::Remove, None),
                    edit("B", path, ConfigOp::Append, Some("<x/>")),
                ],
            ),
            &ConflictSettings::default(),
            None,
        );
        let appended = detect(
            &input(
                vec![],
                vec![
                    edit("A", path, ConfigOp::Append, Some("<y/>")),
                    edit("B", path, ConfigOp::Append, Some("<x/>")),
                ],
            ),
            &ConflictSettings::default(),
            None,
        );
        assert_eq!(removed.conflicts[0].severity, Severity::High);
        assert_eq!(appended.conflicts[0].severity, Severity::Low);
        assert!(appended.summary.compatible_with_caveats);
    }

    #[test]
    fn test_two_sets_list_both_values() {
        let path = "/items/item[@name='gun']/property[@name='Damage']/@value";
        let report = detect(
            &input(
                vec![],
                vec![
                    edit("A", path, ConfigOp::Set, Some("50")),
                    edit("B", path, ConfigOp::Set, Some("70")),
                ],
            ),
            &ConflictSettings::default(),
            None,
        );
        let values: Vec<Option<&str>> = report.conflicts[0]
            .participants
            .iter()
            .map(|p| p.detail.as_deref())
            .collect();
        assert_eq!(values, vec![Some("50"), Some("70")]);
        assert_eq!(report.conflicts[0].severity, Severity::Medium);
    }

    #[test]
    fn test_indirect_conflicts_through_calls_and_reads() {
        let mut data = input(
            vec![
                patch("A", "Game.Tick()", PatchKind::Before, Some(1)),
                patch("B", "Game.Damage()", PatchKind::After, Some(3)),
            ],
            vec![edit(
                "C",
                "/items/item[@name='gun']/property[@name='Range']",
                ConfigOp::Set,
                Some("9"),
            )],
        );
        // 1 -> 2 -> 3, and 2 reads Range
        data.edges = vec![(1, 2), (2, 3)];
        data.reads = vec![(2, "Range".into())];
        data.signatures.insert(2, "Game.Step()".into());

        let report = detect(&data, &ConflictSettings::default(), None);
        let indirect: Vec<(&str, Severity)> = report
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::Indirect)
            .map(|c| (c.target.as_str(), c.severity))
            .collect();
        assert_eq!(
            indirect,
            vec![
                ("Game.Tick() -> Game.Damage()", Severity::Medium),
                ("Game.Tick() -> Game.Step() reads Range", Severity::Low),
            ]
        );

        let shallow = ConflictSettings {
            indirect_depth: 1,
            ..ConflictSettings::default()
        };
        let report = detect(&data, &shallow, None);
        assert_eq!(report.summary.indirect, 1);
    }

    #[test]
    fn test_extension_filter() {
        let data = input(
            vec![
                patch("A", "Foo.Bar()", PatchKind::Before, Some(1)),
                patch("B", "Foo.Bar()", PatchKind::Before, Some(1)),
            ],
            vec![],
        );
        let only = vec!["A".to_string(), "C".to_string()];
        let report = detect(&data, &ConflictSettings::default(), Some(&only));
        assert!(report.conflicts.is_empty());
        assert!(report.summary.compatible);
        assert_eq!(report.extensions, vec!["A", "C"]);
    }
}
