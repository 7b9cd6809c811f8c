use context_kernel::ContextBroker;
use context_kernel::KernelConfig;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[test]
fn config_file_overrides_only_named_fields() {
    let temp = TempDir::new().expect("tempdir");
    let config_path = temp.path().join("kernel.toml");
    let toml = r#"
[lifecycle]
idle_timeout_secs = 30

[quota]
max_session_bytes = 4096

[exec]
max_output_bytes = 256
allowed_modules = ["re"]
"#;
    std::fs::write(&config_path, toml).expect("write config");

    let config = KernelConfig::load_from_path(&config_path).expect("load config");

    assert_eq!(config.lifecycle.idle_timeout_secs, 30);
    assert_eq!(config.quota.max_session_bytes, 4096);
    assert_eq!(config.exec.max_output_bytes, 256);
    assert_eq!(config.exec.allowed_modules, vec!["re".to_string()]);
    assert_eq!(config.exec.timeout_ms, 60_000);
    assert_eq!(config.access.chunk_default, 2000);
    assert_eq!(config.access.scan_default_matches, 50);
}

#[test]
fn missing_config_file_is_an_error() {
    let temp = TempDir::new().expect("tempdir");
    let result = KernelConfig::load_from_path(&temp.path().join("absent.toml"));
    assert!(result.is_err());
}

#[test]
fn broker_applies_loaded_quota() {
    let config = KernelConfig::from_toml_str("[quota]\nmax_session_bytes = 8\n").expect("parse");
    let broker = ContextBroker::new(config);
    broker
        .load("s", "small", "1234".to_string(), "custom", serde_json::json!({}))
        .expect("fits");
    let err = broker
        .load("s", "big", "12345".to_string(), "custom", serde_json::json!({}))
        .expect_err("over quota");
    assert_eq!(err.code(), "quota_exceeded");
}
