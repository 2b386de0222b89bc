use super::*;
use crate::cache::CacheMode;

#[test]
fn test_parse_install_defaults() {
    let cli = Cli::try_parse_from(["npmi", "install"]).unwrap();
    let Commands::Install(cmd) = cli.command else {
        panic!("expected install");
    };
    assert_eq!(cmd.dir, None);
    assert!(!cmd.no_cache);
    assert_eq!(cmd.max_parallel, None);
}

#[test]
fn test_parse_install_flags() {
    let cli = Cli::try_parse_from([
        "npmi",
        "install",
        "./app",
        "--no-cache",
        "--max-parallel",
        "3",
        "--registry",
        "file:///mirror",
        "--build-tool",
        "/opt/gyp",
        "--fetch-timeout",
        "0",
        "--build-timeout",
        "30",
    ])
    .unwrap();
    let Commands::Install(cmd) = cli.command else {
        panic!("expected install");
    };

    let mut config = GlobalConfig::default();
    cmd.apply_to(&mut config);
    assert_eq!(cmd.dir, Some(PathBuf::from("./app")));
    assert_eq!(config.cache_mode, CacheMode::Ephemeral);
    assert_eq!(config.max_parallel(), 3);
    assert_eq!(config.registry, "file:///mirror");
    assert_eq!(config.build_tool, "/opt/gyp");
    assert_eq!(config.fetch_timeout(), None);
    assert_eq!(config.build_timeout(), Some(std::time::Duration::from_secs(30)));
}

#[test]
fn test_flags_only_override_what_is_given() {
    let cli = Cli::try_parse_from(["npmi", "install"]).unwrap();
    let Commands::Install(cmd) = cli.command else {
        panic!("expected install");
    };

    let mut config = GlobalConfig {
        cache_mode: CacheMode::Ephemeral,
        max_parallel: Some(2),
        ..GlobalConfig::default()
    };
    cmd.apply_to(&mut config);
    assert_eq!(config.cache_mode, CacheMode::Ephemeral);
    assert_eq!(config.max_parallel, Some(2));
}

#[test]
fn test_cache_subcommands() {
    assert!(Cli::try_parse_from(["npmi", "cache", "dir"]).is_ok());
    assert!(Cli::try_parse_from(["npmi", "cache", "clean"]).is_ok());
    assert!(Cli::try_parse_from(["npmi", "cache"]).is_err());
}

#[test]
fn test_build_config_log_levels() {
    let cli = Cli::try_parse_from(["npmi", "install"]).unwrap();
    assert_eq!(cli.build_config().log_level, "info");

    let cli = Cli::try_parse_from(["npmi", "-v", "install"]).unwrap();
    let config = cli.build_config();
    assert_eq!(config.log_level, "debug");
    assert!(config.verbose);

    let cli = Cli::try_parse_from(["npmi", "install", "--quiet"]).unwrap();
    assert_eq!(cli.build_config().log_level, "warn");

    let cli = Cli::try_parse_from(["npmi", "-c", "/tmp/npmi.toml", "cache", "dir"]).unwrap();
    assert_eq!(cli.build_config().config_path, Some(PathBuf::from("/tmp/npmi.toml")));
}

#[test]
fn test_verbose_conflicts_with_quiet() {
    assert!(Cli::try_parse_from(["npmi", "-v", "-q", "install"]).is_err());
}
