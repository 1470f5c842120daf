use std::fs;
use std::time::Duration;

use clap::Parser;
use docdedup::cli::{Cli, CliOverrides};
use docdedup::config::{Config, ConfigError, ScanPair};
use docdedup::error::ExitCode;
use figment::Jail;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    Jail::expect_with(|jail| {
        let missing = jail.directory().join("absent.toml");
        let config: Config = Config::figment(Some(&missing), &CliOverrides::default())
            .extract()
            .unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.connection, "mongodb://127.0.0.1:27017/infinity");
        assert_eq!(config.database, "infinity");
        assert_eq!(config.interval_minutes, 10);
        Ok(())
    });
}

#[test]
fn test_config_load_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
connection = "mongodb://db.internal:27017"
database = "prod"
interval_minutes = 5
collections = "bots,users"
keys = "botID,email"
"#,
        )?;
        let path = jail.directory().join("config.toml");

        let config: Config = Config::figment(Some(&path), &CliOverrides::default())
            .extract()
            .unwrap();
        let settings = config.validate().unwrap();

        assert_eq!(settings.connection, "mongodb://db.internal:27017");
        assert_eq!(settings.database, "prod");
        assert_eq!(settings.interval, Duration::from_secs(300));
        assert_eq!(
            settings.pairs,
            vec![ScanPair::new("bots", "botID"), ScanPair::new("users", "email")]
        );
        Ok(())
    });
}

#[test]
fn test_config_load_from_env() {
    Jail::expect_with(|jail| {
        jail.set_env("DOCDEDUP_DATABASE", "from_env");
        jail.set_env("DOCDEDUP_INTERVAL_MINUTES", "2");
        jail.set_env("DOCDEDUP_DRY_RUN", "true");

        let config: Config = Config::figment(None, &CliOverrides::default())
            .extract()
            .unwrap();

        assert_eq!(config.database, "from_env");
        assert_eq!(config.interval_minutes, 2);
        assert!(config.dry_run);
        Ok(())
    });
}

#[test]
fn test_layer_priority_file_env_cli() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
database = "from_file"
interval_minutes = 7
collections = "file_col"
keys = "file_key"
"#,
        )?;
        jail.set_env("DOCDEDUP_DATABASE", "from_env");
        jail.set_env("DOCDEDUP_COLLECTIONS", "env_col");
        let path = jail.directory().join("config.toml");

        let cli = Cli::try_parse_from(["docdedup", "--dbname", "from_cli"]).unwrap();
        let config: Config = Config::figment(Some(&path), &cli.overrides())
            .extract()
            .unwrap();

        assert_eq!(config.database, "from_cli");
        assert_eq!(config.collections, "env_col");
        assert_eq!(config.keys, "file_key");
        assert_eq!(config.interval_minutes, 7);
        Ok(())
    });
}

#[test]
fn test_unset_cli_flags_do_not_mask_lower_layers() {
    Jail::expect_with(|jail| {
        jail.set_env("DOCDEDUP_DRY_RUN", "true");
        jail.set_env("DOCDEDUP_KEYS", "email");

        let cli = Cli::try_parse_from(["docdedup"]).unwrap();
        let config: Config = Config::figment(None, &cli.overrides()).extract().unwrap();

        assert!(config.dry_run);
        assert_eq!(config.keys, "email");
        Ok(())
    });
}

#[test]
fn test_invalid_value_type_is_a_load_error() {
    Jail::expect_with(|jail| {
        jail.set_env("DOCDEDUP_INTERVAL_MINUTES", "soon");

        let cli = Cli::try_parse_from(["docdedup"]).unwrap();
        let result = Config::figment(None, &cli.overrides()).extract::<Config>();
        assert!(result.is_err());
        Ok(())
    });
}

#[test]
fn test_explicit_missing_config_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    let cli = Cli::try_parse_from(["docdedup", "--config", path.to_str().unwrap()]).unwrap();

    let err = Config::load(&cli).unwrap_err();
    assert!(matches!(err, ConfigError::MissingFile(p) if p == path));
}

#[test]
fn test_load_with_explicit_file() {
    Jail::expect_with(|jail| {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docdedup.toml");
        fs::write(&path, "interval_minutes = 1\ncollections = \"bots\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "docdedup",
            "--config",
            path.to_str().unwrap(),
            "--key",
            "owner",
        ])
        .unwrap();
        let settings = Config::load(&cli).unwrap().validate().unwrap();

        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.pairs, vec![ScanPair::new("bots", "owner")]);
        Ok(())
    });
}

#[test]
fn test_mismatched_lists_map_to_config_exit_code() {
    let cli = Cli::try_parse_from(["docdedup", "--col", "bots,users", "--key", "botID"]).unwrap();
    let config: Config = figment::Figment::from(figment::providers::Serialized::defaults(
        Config::default(),
    ))
    .merge(figment::providers::Serialized::globals(cli.overrides()))
    .extract()
    .unwrap();

    let err = anyhow::Error::new(config.validate().unwrap_err());
    assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
    assert!(err.to_string().contains("collections (2) and keys (1)"));
}

#[test]
fn test_overlong_interval_is_a_config_error() {
    Jail::expect_with(|jail| {
        jail.set_env("DOCDEDUP_INTERVAL_MINUTES", u64::MAX.to_string());

        let config: Config = Config::figment(None, &CliOverrides::default())
            .extract()
            .unwrap();
        assert_eq!(config.interval_minutes, u64::MAX);

        let err = anyhow::Error::new(config.validate().unwrap_err());
        assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
        assert!(err.to_string().contains("exceeds the maximum"));
        Ok(())
    });
}
