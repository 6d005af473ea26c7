//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading settings from files and the
//! environment, then running work through the components they describe.

use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::Registry;
use resilex_infra::config::{self, Settings};
use resilex_infra::observability;
use resilex_infra::InfraError;
use tempfile::TempDir;

// Probing depends on the process-wide working directory and environment.
static PROCESS_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn clear_resilex_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("RESILEX_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_load_probes_working_directory_when_env_incomplete() {
    let _guard = PROCESS_LOCK.lock().expect("process lock poisoned");
    clear_resilex_env();

    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join("resilex.toml"),
        r#"
workers = 3
acquire_timeout = 750

[pool]
capacity = 5

[retry]
max_attempts = 2
base_delay = 10
max_delay = 40
"#,
    )
    .expect("Failed to write config");

    let original_dir = std::env::current_dir().expect("cwd");
    std::env::set_current_dir(dir.path()).expect("enter temp dir");
    let probed = config::probe_config_paths();
    let result = config::load();
    std::env::set_current_dir(original_dir).expect("restore cwd");

    assert_eq!(
        probed.and_then(|p| p.file_name().map(|n| n.to_os_string())),
        Some("resilex.toml".into())
    );
    let settings = result.expect("settings load from probed file");
    assert_eq!(settings.workers, 3);
    assert_eq!(settings.pool.capacity, 5);
    assert_eq!(settings.retry.max_attempts, 2);
    assert_eq!(settings.retry.max_delay, Some(Duration::from_millis(40)));
    assert_eq!(settings.acquire_timeout, Some(Duration::from_millis(750)));
}

#[test]
fn test_resilex_file_takes_precedence_over_config_file() {
    let _guard = PROCESS_LOCK.lock().expect("process lock poisoned");
    clear_resilex_env();

    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("config.json"), r#"{ "workers": 9 }"#).expect("write json");
    std::fs::write(dir.path().join("resilex.json"), r#"{ "workers": 2 }"#).expect("write json");

    let original_dir = std::env::current_dir().expect("cwd");
    std::env::set_current_dir(dir.path()).expect("enter temp dir");
    let result = config::load();
    std::env::set_current_dir(original_dir).expect("restore cwd");

    assert_eq!(result.expect("settings load").workers, 2);
}

#[test]
fn test_environment_wins_over_files() {
    let _guard = PROCESS_LOCK.lock().expect("process lock poisoned");
    clear_resilex_env();

    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("resilex.json"), r#"{ "workers": 2 }"#).expect("write json");

    std::env::set_var("RESILEX_POOL_CAPACITY", "1");
    std::env::set_var("RESILEX_QUEUE_CAPACITY", "1");
    std::env::set_var("RESILEX_WORKERS", "1");

    let original_dir = std::env::current_dir().expect("cwd");
    std::env::set_current_dir(dir.path()).expect("enter temp dir");
    let result = config::load();
    std::env::set_current_dir(original_dir).expect("restore cwd");
    clear_resilex_env();

    let settings = result.expect("settings load from env");
    assert_eq!(settings.workers, 1);
    assert_eq!(settings.pool.capacity, 1);
}

#[test]
fn test_load_from_file_rejects_negative_delay() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("resilex.json");
    std::fs::write(&path, r#"{ "retry": { "max_attempts": 3, "base_delay": -5 } }"#)
        .expect("write json");

    let result = config::load_from_file(Some(path));
    assert!(matches!(result, Err(InfraError::Json(_))), "unexpected result: {result:?}");
}

#[test]
fn test_settings_round_trip_through_toml_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("resilex.toml");

    let mut original = Settings::default();
    original.pool.capacity = 12;
    original.breaker.cooldown = Duration::from_secs(2);
    original.logging.filter = Some("resilex_common=debug".to_string());
    std::fs::write(&path, toml::to_string(&original).expect("serializes")).expect("write toml");

    let loaded = config::load_from_file(Some(path)).expect("settings load");
    assert_eq!(loaded, original);
}

#[tokio::test]
async fn test_loaded_settings_drive_a_worker_pool() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("resilex.json");
    std::fs::write(
        &path,
        r#"{
            "pool": { "capacity": 2 },
            "queue": { "capacity": 4 },
            "workers": 2,
            "retry": { "max_attempts": 2, "base_delay": 0 }
        }"#,
    )
    .expect("write json");

    let settings = config::load_from_file(Some(path)).expect("settings load");
    let registry = Registry::new();
    let pool = settings
        .start_worker_pool(observability::observer(&registry).expect("fresh registry"))
        .expect("pool starts");

    let mut handles = Vec::new();
    for n in 0..6u32 {
        let handle = pool
            .submit(move || async move { Ok::<_, std::io::Error>(n * 2) })
            .await
            .expect("queue open");
        handles.push(handle);
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.expect("job succeeds");
    }
    assert_eq!(total, 30);

    let stats = pool.shutdown().await;
    assert_eq!(stats.completed, 6);

    let text = observability::encode_text(&registry).expect("encodes");
    assert!(text.contains(r#"resilex_events_total{counter="pool_acquired_total"} 6"#));
}
