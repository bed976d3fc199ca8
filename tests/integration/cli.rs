//! Command-line behaviour of the `hopper` binary. None of these reach the network.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn hopper() -> Command {
    Command::cargo_bin("hopper").unwrap()
}

#[test]
fn test_help_lists_commands() {
    hopper()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("channel"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_status_reads_config_file() -> Result<()> {
    hopper::test_utils::init_test_logging(None);
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "channel = \"dev\"\ninstalled_tag = \"v3.2.30-dev.adcb1ae\"\n")?;

    hopper()
        .arg("status")
        .arg("--quiet")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Channel:"))
        .stdout(predicate::str::contains("dev"))
        .stdout(predicate::str::contains("v3.2.30-dev.adcb1ae"));
    Ok(())
}

#[test]
fn test_status_without_config_file_uses_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("missing.toml");

    hopper()
        .env("HOPPER_CONFIG", &config_path)
        .arg("status")
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::contains("stable"))
        .stdout(predicate::str::contains("(built-in)"));

    // Status is read-only
    assert!(!config_path.exists());
    Ok(())
}

#[test]
fn test_unknown_channel_is_rejected() {
    hopper()
        .arg("channel")
        .arg("nightly")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nightly"));
}

#[test]
fn test_invalid_config_reports_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "channel = [not toml")?;

    hopper()
        .arg("status")
        .arg("--quiet")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure();
    Ok(())
}

/// Copy the built binary to `dir/Hopper`, next to a leftover `Hopper.old`.
#[cfg(unix)]
fn installed_copy(dir: &std::path::Path) -> Result<std::path::PathBuf> {
    let exe = dir.join("Hopper");
    std::fs::copy(env!("CARGO_BIN_EXE_hopper"), &exe)?;
    std::fs::write(dir.join("Hopper.old"), b"previous build")?;
    std::fs::write(dir.join(".Hopper.update-a1b2c3"), b"partial")?;
    Ok(exe)
}

#[cfg(unix)]
#[test]
fn test_relaunch_without_command_removes_previous_executable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let exe = installed_copy(temp_dir.path())?;

    Command::new(&exe)
        .env("HOPPER_CONFIG", temp_dir.path().join("config.toml"))
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .stdout(predicate::str::contains("Channel:"));

    assert!(!temp_dir.path().join("Hopper.old").exists());
    assert!(!temp_dir.path().join(".Hopper.update-a1b2c3").exists());
    assert!(exe.exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_after_update_flag_reports_install() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let exe = installed_copy(temp_dir.path())?;
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "channel = \"stable\"\ninstalled_tag = \"v1.1.9\"\n")?;

    Command::new(&exe)
        .arg("--after-update")
        .arg("--quiet")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Update installed."))
        .stdout(predicate::str::contains("v1.1.9"));

    assert!(!temp_dir.path().join("Hopper.old").exists());
    Ok(())
}
