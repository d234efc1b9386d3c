//! End-to-end scenarios: build a store from a small corpus on disk and
//! query it back through the read-only store handle.

use modscope::settings::ConflictSettings;
use modscope::{build, BuildOptions, ConflictKind, PatchKind, Severity, Store};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn manifest(name: &str) -> String {
    format!(
        "<xml><ModInfo><Name value=\"{}\"/><Version value=\"1.0\"/></ModInfo></xml>",
        name
    )
}

/// Corpus layout used by every scenario: `game/` holds the base tree,
/// `config/` the base configuration and `mods/` one directory per mod.
struct Corpus {
    dir: TempDir,
}

impl Corpus {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("game")
    }

    fn mods(&self) -> PathBuf {
        self.dir.path().join("mods")
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config")
    }

    fn base(&self, rel: &str, src: &str) -> &Self {
        write(&self.root().join(rel), src);
        self
    }

    fn base_config(&self, rel: &str, src: &str) -> &Self {
        write(&self.config().join(rel), src);
        self
    }

    fn mod_file(&self, name: &str, rel: &str, src: &str) -> &Self {
        let dir = self.mods().join(name);
        if !dir.join("ModInfo.xml").exists() {
            write(&dir.join("ModInfo.xml"), &manifest(name));
        }
        write(&dir.join(rel), src);
        self
    }

    fn build_to(&self, db: &Path) -> modscope::BuildReport {
        let mut options = BuildOptions::new(self.root(), db);
        options.refs_dir = None;
        if self.config().is_dir() {
            options.config_dir = Some(self.config());
        }
        if self.mods().is_dir() {
            options.mods_dirs = vec![self.mods()];
        }
        build(&options).unwrap()
    }

    fn build(&self) -> Store {
        let db = self.dir.path().join("modscope.db");
        self.build_to(&db);
        Store::open(&db).unwrap()
    }
}

const FOO: &str = "namespace Game {\n\
    public class Baz { public virtual void Qux() {} }\n\
    public class Quux : Baz { public override void Qux() {} }\n\
    public class Foo {\n\
        public void Bar() { Baz b = new Baz(); b.Qux(); }\n\
        public void Load(int n) {}\n\
        public void Load(string s) {}\n\
    }\n\
}";

// =========================================================================
// Patches
// =========================================================================

#[test]
fn test_before_patch_is_recorded_once() {
    let corpus = Corpus::new();
    corpus.base("Game/Foo.cs", FOO).mod_file(
        "ModA",
        "Patches.cs",
        "using HarmonyLib;\n\
         [HarmonyPatch(typeof(Foo), \"Bar\")]\n\
         class BarPatch { static void Prefix() {} }",
    );
    let store = corpus.build();
    let patches = store.conflict_input().unwrap().patches;

    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].target_signature, "Foo.Bar()");
    assert_eq!(patches[0].kind, PatchKind::Before);
    assert_eq!(patches[0].extension, "ModA");
    assert!(patches[0].target_method_id.is_some());
}

#[test]
fn test_overloaded_targets_stay_apart() {
    let corpus = Corpus::new();
    corpus
        .base("Game/Foo.cs", FOO)
        .mod_file(
            "ModA",
            "A.cs",
            "[HarmonyPatch(typeof(Foo), \"Load\", new Type[] { typeof(int) })]\n\
             class A { static void Postfix() {} }",
        )
        .mod_file(
            "ModB",
            "B.cs",
            "[HarmonyPatch(typeof(Foo), \"Load\", new Type[] { typeof(int) })]\n\
             class B { static void Prefix() {} }",
        )
        .mod_file(
            "ModC",
            "C.cs",
            "[HarmonyPatch(typeof(Foo), \"Load\", new Type[] { typeof(string) })]\n\
             class C { static void Prefix() {} }",
        );
    let store = corpus.build();
    let report = store.compat(None, &ConflictSettings::default()).unwrap();

    let direct: Vec<_> = report
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::DirectPatch)
        .collect();
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].target, "Foo.Load(int)");
    let mods: Vec<&str> = direct[0]
        .participants
        .iter()
        .map(|p| p.extension.as_str())
        .collect();
    assert_eq!(mods, vec!["ModA", "ModB"]);
}

#[test]
fn test_trailing_typeof_patch_targets_the_matching_overload() {
    let corpus = Corpus::new();
    corpus
        .base("Game/Foo.cs", FOO)
        .mod_file(
            "ModA",
            "A.cs",
            "[HarmonyPatch(typeof(Foo), \"Load\", typeof(int))]\n\
             class A { static void Postfix() {} }",
        )
        .mod_file(
            "ModB",
            "B.cs",
            "[HarmonyPatch(typeof(Foo), \"Load\", new Type[] { typeof(int) })]\n\
             class B { static void Prefix() {} }",
        )
        .mod_file(
            "ModC",
            "C.cs",
            "[HarmonyPatch(typeof(Foo))]\n\
             class C {\n\
                 [HarmonyPatch(\"Load\", typeof(string))]\n\
                 [HarmonyPrefix]\n\
                 static void Before() {}\n\
             }",
        );
    let store = corpus.build();

    let mut targets: Vec<String> = store
        .conflict_input()
        .unwrap()
        .patches
        .iter()
        .map(|p| format!("{} {}", p.extension, p.target_signature))
        .collect();
    targets.sort();
    assert_eq!(
        targets,
        vec!["ModA Foo.Load(int)", "ModB Foo.Load(int)", "ModC Foo.Load(string)"]
    );

    let report = store.compat(None, &ConflictSettings::default()).unwrap();
    let direct: Vec<_> = report
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::DirectPatch)
        .collect();
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].target, "Foo.Load(int)");
    let mods: Vec<&str> = direct[0]
        .participants
        .iter()
        .map(|p| p.extension.as_str())
        .collect();
    assert_eq!(mods, vec!["ModA", "ModB"]);
}

// =========================================================================
// Calls and hierarchy
// =========================================================================

#[test]
fn test_virtual_call_callers_and_overrides() {
    let corpus = Corpus::new();
    corpus.base("Game/Foo.cs", FOO);
    let store = corpus.build();

    let callers = store.callers("Baz.Qux").unwrap();
    assert_eq!(callers.results.len(), 1);
    let sites: Vec<&str> = callers.results[0]
        .callers
        .iter()
        .map(|c| c.method.signature.as_str())
        .collect();
    assert_eq!(sites, vec!["Foo.Bar()"]);

    let overrides = store.overrides("Baz.Qux").unwrap();
    assert_eq!(overrides.groups.len(), 1);
    let owners: Vec<&str> = overrides.groups[0]
        .methods
        .iter()
        .map(|m| m.owner.as_str())
        .collect();
    assert_eq!(owners, vec!["Game.Baz", "Game.Quux"]);
}

#[test]
fn test_override_count_is_overrides_plus_root() {
    let corpus = Corpus::new();
    corpus.base(
        "Game/Shapes.cs",
        "abstract class Shape { public abstract double Area(); }\n\
         class Circle : Shape { public override double Area() { return 1; } }\n\
         class Square : Shape { public override double Area() { return 2; } }\n\
         class Tile : Square { public override double Area() { return 3; } }\n\
         class Other { public double Area() { return 0; } }",
    );
    let store = corpus.build();
    let overrides = store.overrides("Tile.Area").unwrap();
    assert_eq!(overrides.groups.len(), 1);
    assert_eq!(overrides.groups[0].root.owner, "Shape");
    assert_eq!(overrides.groups[0].methods.len(), 4);
}

#[test]
fn test_same_arity_overrides_call_their_own_root() {
    let corpus = Corpus::new();
    corpus.base(
        "Game/Baz.cs",
        "public class Baz {\n\
           public virtual void Qux(int n) {}\n\
           public virtual void Qux(string s) {}\n\
         }\n\
         public class Sub : Baz { public override void Qux(string s) {} }\n\
         public class Foo { public void Bar() { Sub s = new Sub(); s.Qux(\"x\"); } }",
    );
    let store = corpus.build();

    let callers = store.callers("Baz.Qux(string)").unwrap();
    assert_eq!(callers.results.len(), 1);
    let sites: Vec<&str> = callers.results[0]
        .callers
        .iter()
        .map(|c| c.method.signature.as_str())
        .collect();
    assert_eq!(sites, vec!["Foo.Bar()"]);

    let by_int = store.callers("Baz.Qux(int)").unwrap();
    assert!(by_int.results.iter().all(|r| r.callers.is_empty()));

    let overrides = store.overrides("Sub.Qux").unwrap();
    assert_eq!(overrides.groups.len(), 1);
    assert_eq!(overrides.groups[0].root.signature, "Baz.Qux(string)");
}

#[test]
fn test_unloaded_library_call_is_external_only() {
    let corpus = Corpus::new();
    corpus.base(
        "Game/Player.cs",
        "class Player { void Tick() { Debug.Log(\"tick\"); Jump(); } void Jump() {} }",
    );
    let store = corpus.build();

    let externals = store.externals(None).unwrap();
    assert_eq!(externals.len(), 1);
    assert_eq!(externals[0].type_name, "Debug");
    assert_eq!(externals[0].method, "Log");
    assert_eq!(externals[0].caller.signature, "Player.Tick()");
    assert!(externals[0].assembly.is_none());

    let callees = store.callees("Player.Tick").unwrap();
    let internal: Vec<&str> = callees.results[0]
        .internal
        .iter()
        .map(|c| c.method.signature.as_str())
        .collect();
    assert_eq!(internal, vec!["Player.Jump()"]);
    assert_eq!(callees.results[0].external.len(), 1);

    // No method named Log exists inside the corpus
    assert!(store.callers("Debug.Log").is_err());
}

#[test]
fn test_every_edge_has_exactly_one_callee_and_methods_one_owner() {
    let corpus = Corpus::new();
    corpus.base("Game/Foo.cs", FOO).base(
        "Game/Player.cs",
        "class Player {\n\
             void Tick() {\n\
                 Debug.Log(\"tick\");\n\
                 var foo = new Game.Foo();\n\
                 foo.Bar();\n\
             }\n\
         }",
    );
    let store = corpus.build();

    let internal = store.sql("SELECT COUNT(*) FROM calls").unwrap();
    let external = store.sql("SELECT COUNT(*) FROM external_calls").unwrap();
    // Foo.Bar: Baz ctor, Baz.Qux. Player.Tick: Debug.Log, Foo ctor, Foo.Bar.
    assert_eq!(internal.rows[0][0], serde_json::json!(4));
    assert_eq!(external.rows[0][0], serde_json::json!(1));

    let both = store
        .sql(
            "SELECT COUNT(*) FROM calls c JOIN external_calls x
             ON x.caller_id = c.caller_id AND x.file = c.file AND x.line = c.line",
        )
        .unwrap();
    assert_eq!(both.rows[0][0], serde_json::json!(0));

    let orphans = store
        .sql(
            "SELECT COUNT(*) FROM methods m
             LEFT JOIN types t ON t.id = m.type_id WHERE t.id IS NULL",
        )
        .unwrap();
    assert_eq!(orphans.rows[0][0], serde_json::json!(0));
}

#[test]
fn test_rebuild_is_deterministic() {
    let corpus = Corpus::new();
    corpus
        .base("Game/Foo.cs", FOO)
        .base("Engine/Loop.cs", "class Loop { void Run() { Step(); } void Step() {} }")
        .mod_file(
            "ModA",
            "Patches.cs",
            "[HarmonyPatch(typeof(Foo), \"Bar\")] class P { static void Postfix() {} }",
        );
    let first = corpus.dir.path().join("first.db");
    let second = corpus.dir.path().join("second.db");
    corpus.build_to(&first);
    corpus.build_to(&second);

    let dump = |db: &Path| {
        let store = Store::open(db).unwrap();
        [
            "SELECT id, type_id, identity FROM methods ORDER BY id",
            "SELECT caller_id, callee_id, external_id, line FROM calls ORDER BY id",
            "SELECT id, full_name FROM types ORDER BY id",
            "SELECT extension, target_signature, kind FROM patches ORDER BY id",
        ]
        .iter()
        .map(|q| store.sql(q).unwrap().rows)
        .collect::<Vec<_>>()
    };
    assert_eq!(dump(&first), dump(&second));
}

// =========================================================================
// Configuration
// =========================================================================

const ITEMS: &str = "<items>\n\
    <item name=\"gun\">\n\
        <property name=\"Damage\" value=\"10\"/>\n\
    </item>\n\
    <item name=\"knife\"/>\n\
</items>";

#[test]
fn test_two_sets_on_one_path_list_both_values() {
    let path = "/items/item[@name='gun']/property[@name='Damage']/@value";
    let corpus = Corpus::new();
    corpus
        .base("Game/Foo.cs", FOO)
        .base_config("items.xml", ITEMS)
        .mod_file(
            "ModA",
            "Config/items.xml",
            &format!("<configs><set xpath=\"{}\">20</set></configs>", path),
        )
        .mod_file(
            "ModB",
            "Config/items.xml",
            &format!("<configs><set xpath=\"{}\">30</set></configs>", path),
        );
    let store = corpus.build();
    let report = store.compat(None, &ConflictSettings::default()).unwrap();

    let collisions: Vec<_> = report
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::ConfigCollision)
        .collect();
    assert_eq!(collisions.len(), 1);
    let listed: Vec<(&str, Option<&str>, &str)> = collisions[0]
        .participants
        .iter()
        .map(|p| (p.extension.as_str(), p.detail.as_deref(), p.location.as_str()))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("ModA", Some("20"), "Config/items.xml:1"),
            ("ModB", Some("30"), "Config/items.xml:1"),
        ]
    );

    let property = store.properties("Damage").unwrap();
    assert_eq!(property.definitions.len(), 1);
    assert_eq!(property.edits.len(), 2);
}

#[test]
fn test_remove_ranks_above_append() {
    let corpus = Corpus::new();
    corpus
        .base("Game/Foo.cs", FOO)
        .base_config("items.xml", ITEMS)
        .mod_file(
            "Cutter",
            "Config/items.xml",
            "<configs><remove xpath=\"/items/item[@name='knife']\"/></configs>",
        )
        .mod_file(
            "Adder",
            "Config/items.xml",
            "<configs><append xpath=\"/items/item[@name='knife']\"><property name=\"Edge\" value=\"1\"/></append></configs>",
        );
    let store = corpus.build();
    let report = store.compat(None, &ConflictSettings::default()).unwrap();

    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    let severity_of = |name: &str| {
        conflict
            .participants
            .iter()
            .find(|p| p.extension == name)
            .and_then(|p| p.severity)
            .unwrap()
    };
    assert!(severity_of("Cutter") > severity_of("Adder"));
    assert_eq!(conflict.severity, Severity::High);
    assert!(!report.summary.compatible_with_caveats);
}

#[test]
fn test_compat_subset_ignores_other_mods() {
    let path = "/items/item[@name='gun']/property[@name='Damage']/@value";
    let corpus = Corpus::new();
    corpus.base("Game/Foo.cs", FOO).base_config("items.xml", ITEMS);
    for (name, value) in [("ModA", "1"), ("ModB", "2"), ("ModC", "3")] {
        corpus.mod_file(
            name,
            "Config/items.xml",
            &format!("<configs><set xpath=\"{}\">{}</set></configs>", path, value),
        );
    }
    let store = corpus.build();
    let only = vec!["ModA".to_string(), "ModC".to_string()];
    let report = store
        .compat(Some(only.as_slice()), &ConflictSettings::default())
        .unwrap();

    assert_eq!(report.extensions, vec!["ModA", "ModC"]);
    assert_eq!(report.conflicts.len(), 1);
    assert!(report.conflicts[0]
        .participants
        .iter()
        .all(|p| p.extension != "ModB"));
}
