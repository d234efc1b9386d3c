//! CLI tests for the modscope binary
//!
//! Spawns the binary against a small corpus and checks the human and JSON
//! outputs of build and the query commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_modscope"))
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn run(args: &[&str], db: &Path) -> Output {
    Command::new(bin())
        .args(args)
        .arg("--db")
        .arg(db)
        .output()
        .expect("Failed to run modscope binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Builds a one-tree corpus and returns (tempdir, db path).
fn built_store() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("game");
    write(
        &root.join("Game/Player.cs"),
        "class Player {\n\
             void Tick() { Jump(); Debug.Log(\"tick\"); }\n\
             void Jump() { Land(); }\n\
             void Land() {}\n\
         }",
    );
    let db = dir.path().join("modscope.db");
    let output = Command::new(bin())
        .arg("build")
        .arg("--root")
        .arg(&root)
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(db.exists());
    (dir, db)
}

#[test]
fn test_version_and_help() {
    let version = Command::new(bin()).arg("--version").output().unwrap();
    assert!(version.status.success());
    assert!(stdout(&version).starts_with("modscope"));

    let help = Command::new(bin()).arg("--help").output().unwrap();
    assert!(help.status.success());
    assert!(String::from_utf8_lossy(&help.stderr).contains("callers"));
}

#[test]
fn test_callers_human_output() {
    let (_dir, db) = built_store();
    let output = run(&["callers", "Player.Land"], &db);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Calls TO Player.Land()"));
    assert!(text.contains("From: Player.Jump()"));
}

#[test]
fn test_chain_json_envelope() {
    let (_dir, db) = built_store();
    let output = run(
        &["chain", "Player.Tick", "Player.Land", "--output", "json"],
        &db,
    );
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["tool"], "modscope");
    let path: Vec<&str> = json["data"]["path"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["signature"].as_str().unwrap())
        .collect();
    assert_eq!(path, vec!["Player.Tick()", "Player.Jump()", "Player.Land()"]);
}

#[test]
fn test_externals_and_sql() {
    let (_dir, db) = built_store();
    let externals = run(&["externals"], &db);
    assert!(stdout(&externals).contains("Debug.Log"));

    let sql = run(&["sql", "SELECT name FROM methods ORDER BY id"], &db);
    assert!(sql.status.success());
    let lines: Vec<String> = stdout(&sql).lines().map(str::to_string).collect();
    assert_eq!(lines[0], "name");
    assert!(lines.contains(&"Tick".to_string()));

    let rejected = run(&["sql", "DROP TABLE methods"], &db);
    assert!(!rejected.status.success());
}

#[test]
fn test_missing_store_reports_error_code() {
    let dir = TempDir::new().unwrap();
    let output = run(
        &["summary", "--output", "json"],
        &dir.path().join("absent.db"),
    );
    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(json["data"]["error"].as_str().unwrap().starts_with("MSC-"));
}

#[test]
fn test_unknown_method_fails() {
    let (_dir, db) = built_store();
    let output = run(&["callees", "Player.Fly"], &db);
    assert!(!output.status.success());
}
