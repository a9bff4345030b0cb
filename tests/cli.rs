use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sentinel_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sentinel"))
}

fn write_config(root: &Path, body: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let path = config_dir.join("sentinel.toml");
    fs::write(&path, body).unwrap();
    path
}

fn run_sentinel(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(sentinel_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("DISCORD_WEBHOOK_URL")
        .env_remove("SENTINEL_BIND")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run sentinel")
}

#[test]
fn test_check_config_prints_summary() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(
        tmp.path(),
        r#"
[server]
bind = "127.0.0.1:9123"

[retrieval]
k = 4
metric = "euclidean"

[alerts]
sink = "log"
"#,
    );

    let output = run_sentinel(&config, &["check-config"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("config ok"));
    assert!(stdout.contains("127.0.0.1:9123"));
    assert!(stdout.contains("k=4 metric=euclidean"));
}

#[test]
fn test_missing_webhook_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "[chat]\nmodel = \"gpt-3.5-turbo\"\n");

    let output = run_sentinel(&config, &["check-config"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("webhook_url"));
}

#[test]
fn test_missing_config_file_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let output = run_sentinel(&tmp.path().join("nope.toml"), &["check-config"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read config file"));
}
