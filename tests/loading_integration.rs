//! Configuration and secrets loading scenarios.
//!
//! Exercises the bootstrap layering end to end: config files merge first,
//! the environment namespace second, and the secrets store feeds the render
//! path through the keyed-lookup handler.

use std::fs;
use std::path::PathBuf;

use tempfile::tempdir;

use strata_cli::config::{load_config, load_secrets, ConfigError, LoadConfigParams};
use strata_cli::mock::StaticDecryptor;
use strata_store::{LayeredStore, StoreError, StoreOptions};

fn strict() -> LayeredStore {
    LayeredStore::new(StoreOptions::strict())
}

#[test]
fn test_environment_wins_over_file_for_same_shape_key() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "[a]\nb = 3\n").unwrap();
    std::env::set_var("STRATAIT1_A_B", "5");

    let params = LoadConfigParams {
        env_prefixes: vec!["STRATAIT1".to_string()],
        config_paths: vec![config],
    };
    let mut store = strict();
    load_config(&params, &mut store).unwrap();

    assert_eq!(store.string("a.b"), "5");
}

#[test]
fn test_shape_conflict_across_file_layers_is_fatal() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.toml");
    let second = dir.path().join("second.toml");
    fs::write(&first, "cache = \"disabled\"\n").unwrap();
    fs::write(&second, "[cache]\nmode = \"on\"\n").unwrap();

    let params = LoadConfigParams {
        env_prefixes: Vec::new(),
        config_paths: vec![first, second],
    };
    let mut store = strict();
    let err = load_config(&params, &mut store).unwrap_err();

    match err {
        ConfigError::Store(StoreError::MergeConflict { key, .. }) => {
            assert_eq!(key, "cache");
        }
        other => panic!("expected MergeConflict, got {:?}", other),
    }
}

#[test]
fn test_multiple_config_files_merge_in_order() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base.toml");
    let overlay = dir.path().join("overlay.toml");
    fs::write(&base, "[server]\nhost = \"a\"\nport = 8080\n").unwrap();
    fs::write(&overlay, "[server]\nhost = \"b\"\n").unwrap();

    let params = LoadConfigParams {
        env_prefixes: Vec::new(),
        config_paths: vec![base, overlay],
    };
    let mut store = strict();
    load_config(&params, &mut store).unwrap();

    assert_eq!(store.string("server.host"), "b");
    assert_eq!(store.string("server.port"), "8080");
}

#[test]
fn test_secrets_file_merges_into_its_own_store() {
    let dir = tempdir().unwrap();
    let secrets_file = dir.path().join("secrets.enc.json");
    fs::write(
        &secrets_file,
        br#"{"db": {"user": "admin", "pass": "hunter2"}, "github": {"token": "gh-1"}}"#,
    )
    .unwrap();

    let mut secrets = strict();
    load_secrets(&[secrets_file], &StaticDecryptor, &mut secrets).unwrap();

    assert_eq!(secrets.string("db.user"), "admin");
    assert_eq!(secrets.string("github.token"), "gh-1");
    assert_eq!(
        secrets.keys(),
        vec!["db.pass", "db.user", "github.token"]
    );
}

#[test]
fn test_missing_secrets_file_fails_loading() {
    let mut secrets = strict();
    let err = load_secrets(
        &[PathBuf::from("/no/such/secrets.enc.json")],
        &StaticDecryptor,
        &mut secrets,
    )
    .unwrap_err();

    assert!(matches!(err, ConfigError::Decrypt(_)));
}
