use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docqa");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("policy.txt"),
        "Dental surgery is covered after a six month waiting period.\n\nCosmetic procedures are excluded.",
    )
    .unwrap();
    fs::write(files_dir.join("empty.txt"), "").unwrap();
    fs::write(files_dir.join("tool.exe"), "MZ").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docqa.sqlite"

[ingest]
upload_dir = "{root}/data/uploads"

[chunking]
chunk_size = 1000
overlap = 200

[retrieval]
top_k = 5

[completion]
provider = "disabled"

[server]
bind = "127.0.0.1:8181"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn file_arg(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

/// Document id from `ingest` output (`  document: <id>`).
fn document_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("document: "))
        .unwrap_or_else(|| panic!("no document id in output: {}", stdout))
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docqa(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_docqa(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docqa(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_text_file() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let file = file_arg(&config_path, "policy.txt");
    let (stdout, stderr, success) =
        run_docqa(&config_path, &["ingest", &file, "--owner", "alice"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("status: processed"));
    assert!(stdout.contains("chunks: 1"));
}

#[test]
fn test_ingest_unsupported_format_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let file = file_arg(&config_path, "tool.exe");
    let (_, stderr, success) = run_docqa(&config_path, &["ingest", &file, "--owner", "alice"]);
    assert!(!success);
    assert!(stderr.contains("unsupported file format"), "stderr: {}", stderr);

    let (stdout, _, _) = run_docqa(&config_path, &["documents", "list", "--owner", "alice"]);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_ingest_empty_file_records_failure() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let file = file_arg(&config_path, "empty.txt");
    let (_, _, success) = run_docqa(&config_path, &["ingest", &file, "--owner", "alice"]);
    assert!(!success);

    let (stdout, _, success) =
        run_docqa(&config_path, &["documents", "list", "--owner", "alice"]);
    assert!(success);
    assert!(stdout.contains("failed"));
    assert!(stdout.contains("empty.txt"));
}

#[test]
fn test_documents_list_get_delete() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let file = file_arg(&config_path, "policy.txt");
    let (stdout, _, _) = run_docqa(&config_path, &["ingest", &file, "--owner", "alice"]);
    let id = document_id(&stdout);

    let (stdout, _, success) =
        run_docqa(&config_path, &["documents", "list", "--owner", "alice"]);
    assert!(success);
    assert!(stdout.contains(&id));
    assert!(stdout.contains("policy.txt"));

    let (stdout, _, success) =
        run_docqa(&config_path, &["documents", "get", &id, "--owner", "alice"]);
    assert!(success);
    assert!(stdout.contains("status: processed"));
    assert!(stdout.contains("[0] Dental surgery"));

    let (_, stderr, success) =
        run_docqa(&config_path, &["documents", "get", &id, "--owner", "bob"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);

    let (stdout, _, success) =
        run_docqa(&config_path, &["documents", "delete", &id, "--owner", "alice"]);
    assert!(success);
    assert!(stdout.contains("Deleted document"));

    let (_, _, success) = run_docqa(&config_path, &["documents", "get", &id, "--owner", "alice"]);
    assert!(!success);
}

#[test]
fn test_ask_with_disabled_provider_fails_and_is_recorded() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let file = file_arg(&config_path, "policy.txt");
    run_docqa(&config_path, &["ingest", &file, "--owner", "alice"]);

    let (_, stderr, success) = run_docqa(
        &config_path,
        &["ask", "Is dental surgery covered?", "--owner", "alice"],
    );
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);

    let (stdout, _, success) =
        run_docqa(&config_path, &["queries", "recent", "--owner", "alice"]);
    assert!(success);
    assert!(stdout.contains("failed"));
    assert!(stdout.contains("Is dental surgery covered?"));

    let (stdout, _, success) =
        run_docqa(&config_path, &["queries", "stats", "--owner", "alice"]);
    assert!(success);
    assert!(stdout.contains("total queries: 1"));
    assert!(stdout.contains("failed: 1"));
    assert!(stdout.contains("average confidence: -"));
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docqa(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_readme_quick_start_commands_parse() {
    let (_tmp, config_path) = setup_test_env();
    let readme = include_str!("../README.md");

    let mut in_code = false;
    let mut commands: Vec<Vec<&str>> = Vec::new();
    for line in readme.lines() {
        if line.starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if let Some(rest) = line.trim().strip_prefix("docqa ").filter(|_| in_code) {
            commands.push(
                rest.split_whitespace()
                    .take_while(|w| !w.starts_with(['-', '.', '"', '/']))
                    .collect(),
            );
        }
    }
    assert!(commands.len() >= 4, "quick start lists too few commands");

    for words in commands {
        let mut args = words.clone();
        args.push("--help");
        let (_, stderr, success) = run_docqa(&config_path, &args);
        assert!(success, "`docqa {}` is not a command: {}", words.join(" "), stderr);
    }
}
