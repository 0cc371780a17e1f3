use std::process::Command;
use tempfile::TempDir;

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = Command::new(env!("CARGO_BIN_EXE_watchreduce"))
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");

    assert!(output.status.success());

    let config_path = temp_path.join(".watchreduce/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[watch]"));
    assert!(content.contains("[reduce]"));

    // Second init without --force refuses to overwrite
    let output = Command::new(env!("CARGO_BIN_EXE_watchreduce"))
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");
    assert!(!output.status.success());

    let output = Command::new(env!("CARGO_BIN_EXE_watchreduce"))
        .args(["init", "--force"])
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");
    assert!(output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let config_dir = temp_path.join(".watchreduce");
    std::fs::create_dir_all(&config_dir).unwrap();

    let config_content = r#"
version = 2
[reduce]
threads = 99
"#;

    std::fs::write(config_dir.join("settings.toml"), config_content).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_watchreduce"))
        .arg("config")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("threads = 99"));
}

#[test]
fn test_config_flag_points_at_file() {
    let temp_dir = TempDir::new().unwrap();
    let custom = temp_dir.path().join("custom.toml");
    std::fs::write(&custom, "[watch]\ndebounce = \"keyed\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_watchreduce"))
        .arg("config")
        .arg("--config")
        .arg(&custom)
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("debounce = \"keyed\""));
}
