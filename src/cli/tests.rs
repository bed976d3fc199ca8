use super::*;
use crate::upgrade::Channel;
use clap::CommandFactory;

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_build_config_log_levels() {
    let cli = Cli::try_parse_from(["hopper", "status"]).unwrap();
    assert_eq!(cli.build_config().log_level.as_deref(), Some("info"));

    let cli = Cli::try_parse_from(["hopper", "--verbose", "status"]).unwrap();
    assert_eq!(cli.build_config().log_level.as_deref(), Some("debug"));

    let cli = Cli::try_parse_from(["hopper", "status", "-q"]).unwrap();
    assert!(cli.build_config().log_level.is_none());

    assert!(Cli::try_parse_from(["hopper", "-v", "-q", "status"]).is_err());
}

#[test]
fn test_channel_argument() {
    let cli = Cli::try_parse_from(["hopper", "channel", "Dev"]).unwrap();
    match cli.command {
        Some(Commands::Channel(cmd)) => {
            assert_eq!(cmd.channel, Channel::Dev);
            assert!(!cmd.force);
        }
        _ => panic!("expected channel command"),
    }

    assert!(Cli::try_parse_from(["hopper", "channel", "nightly"]).is_err());
}

#[test]
fn test_global_overrides() {
    let cli = Cli::try_parse_from([
        "hopper",
        "check",
        "--channel",
        "stable",
        "--max-pages",
        "3",
        "--config",
        "/tmp/hopper.toml",
    ])
    .unwrap();
    let config = cli.build_config();
    assert_eq!(config.max_pages, Some(3));
    assert_eq!(config.config_path.as_deref(), Some(std::path::Path::new("/tmp/hopper.toml")));

    assert!(Cli::try_parse_from(["hopper", "check", "--max-pages", "0"]).is_err());
}

#[tokio::test]
async fn test_max_pages_override_applies() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[upgrade]\nmax_pages = 7\n").unwrap();

    let config = CliConfig {
        config_path: Some(path.clone()),
        ..CliConfig::new()
    };
    assert_eq!(config.load_global().await.unwrap().upgrade.max_pages, 7);

    let config = CliConfig {
        config_path: Some(path),
        max_pages: Some(2),
        ..CliConfig::new()
    };
    assert_eq!(config.load_global().await.unwrap().upgrade.max_pages, 2);
}

#[test]
fn test_no_command_is_accepted() {
    let cli = Cli::try_parse_from(["hopper"]).unwrap();
    assert!(cli.command.is_none());
    assert!(!cli.build_config().after_update);

    let cli = Cli::try_parse_from(["hopper", AFTER_UPDATE_FLAG, "--config", "/tmp/h.toml"]).unwrap();
    assert!(cli.build_config().after_update);
}

#[test]
fn test_restart_args_parse_back() {
    let config = CliConfig {
        config_path: Some(std::path::PathBuf::from("/tmp/hopper config.toml")),
        ..CliConfig::new()
    };
    let args = config.restart_args();
    assert_eq!(args[0], AFTER_UPDATE_FLAG);

    let relaunched = Cli::try_parse_from(std::iter::once("hopper".to_string()).chain(args)).unwrap();
    let relaunched = relaunched.build_config();
    assert!(relaunched.after_update);
    assert_eq!(relaunched.config_path, config.config_path);

    assert_eq!(CliConfig::new().restart_args(), vec![AFTER_UPDATE_FLAG.to_string()]);
}
