//! Integration tests for configuration layering

use crate::integration::test_utils::with_isolated_env;
use std::path::Path;
use tabrelay::config::{ConfigLoader, RelayConfig};
use tabrelay::pending::PendingSlot;
use tabrelay::RelayError;
use tempfile::TempDir;

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn test_defaults_without_any_files() {
    let temp_dir = TempDir::new().unwrap();
    let config = with_isolated_env(&temp_dir, || ConfigLoader::load(temp_dir.path()).unwrap());

    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.retry.base_delay_ms, 500);
    assert_eq!(config.probe.max_probes, 2);
    assert_eq!(config.probe.base_delay_ms, 100);
    assert_eq!(config.injection.poll_interval_ms, 10);
    assert_eq!(config.injection.max_poll_attempts, 100);
    assert_eq!(config.pending.max_age_secs, 300);
    assert!(config.pending.path.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_layer_precedence() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write(
        &temp_dir.path().join("xdg/tabrelay/config.toml"),
        "[retry]\nbase_delay_ms = 250\nmax_retries = 1\n\n[injection]\nmax_poll_attempts = 50\n",
    );
    write(
        &workspace.join("config/config.toml"),
        "[retry]\nmax_retries = 3\n\n[probe]\nmax_probes = 3\n",
    );
    write(
        &workspace.join("config/development.toml"),
        "[probe]\nbase_delay_ms = 150\n",
    );

    let config = with_isolated_env(&temp_dir, || {
        std::env::set_var("TABRELAY__INJECTION__POLL_INTERVAL_MS", "25");
        ConfigLoader::load(&workspace).unwrap()
    });

    // global file
    assert_eq!(config.retry.base_delay_ms, 250);
    assert_eq!(config.injection.max_poll_attempts, 50);
    // workspace file over global
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.probe.max_probes, 3);
    // environment-specific file
    assert_eq!(config.probe.base_delay_ms, 150);
    // environment variable
    assert_eq!(config.injection.poll_interval_ms, 25);
}

#[test]
fn test_env_file_follows_tabrelay_env() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write(
        &workspace.join("config/development.toml"),
        "[pending]\nmax_age_secs = 60\n",
    );
    write(
        &workspace.join("config/ci.toml"),
        "[pending]\nmax_age_secs = 30\n",
    );

    let config = with_isolated_env(&temp_dir, || {
        std::env::set_var("TABRELAY_ENV", "ci");
        ConfigLoader::load(&workspace).unwrap()
    });
    assert_eq!(config.pending.max_age_secs, 30);
}

#[test]
fn test_invalid_budgets_are_reported_together() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("relay.toml");
    write(
        &config_file,
        "[retry]\nmax_retries = 9\n\n[probe]\nmax_probes = 0\n\n[injection]\nmax_poll_attempts = 0\n",
    );

    let config = with_isolated_env(&temp_dir, || ConfigLoader::load_from_file(&config_file).unwrap());
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);

    let err = config.validated().unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Configuration error: "), "{message}");
    assert!(message.contains("max_retries 9 exceeds 3"), "{message}");
    assert!(message.contains("max_probes must be at least 1"), "{message}");
    assert!(message.contains("max_poll_attempts must be at least 1"), "{message}");
}

#[test]
fn test_missing_explicit_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");
    let err = with_isolated_env(&temp_dir, || ConfigLoader::load_from_file(&missing).unwrap_err());
    assert!(matches!(err, RelayError::Config(_)));
    assert!(err.to_string().contains("nope.toml"));
}

#[test]
fn test_malformed_value_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write(
        &workspace.join("config/config.toml"),
        "[retry]\nmax_retries = \"lots\"\n",
    );
    let err = with_isolated_env(&temp_dir, || ConfigLoader::load(&workspace).unwrap_err());
    assert!(matches!(err, RelayError::Config(_)));
}

#[test]
fn test_file_backed_pending_slot_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    let slot_path = temp_dir.path().join("state/pending.json");
    write(
        &workspace.join("config/config.toml"),
        &format!("[pending]\npath = {:?}\n", slot_path.to_string_lossy()),
    );

    let config: RelayConfig =
        with_isolated_env(&temp_dir, || ConfigLoader::load(&workspace).unwrap());
    assert_eq!(config.pending.path.as_deref(), Some(slot_path.as_path()));

    let slot = PendingSlot::from_config(&config.pending);
    slot.stash("document.title").unwrap();
    assert!(slot_path.exists());

    // A second slot over the same file sees the stash exactly once.
    let other = PendingSlot::from_config(&config.pending);
    assert_eq!(other.take_fresh().unwrap().unwrap().source, "document.title");
    assert!(other.take_fresh().unwrap().is_none());
    assert!(!slot_path.exists());
}
