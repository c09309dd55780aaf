//! Integration test: configuration loading

use vcuda_core::config::{ServerConfig, VcudaConfig};
use vcuda_core::CoreError;

#[test]
fn test_defaults() {
    let config = ServerConfig::default();
    assert_eq!(config.port, 9988);
    assert_eq!(config.bind, "0.0.0.0");
    assert_eq!(config.max_clients, 16);
    assert_eq!(config.idle_timeout_secs, 120);
    assert!(config.release_on_disconnect);
    assert_eq!(config.bind_address(), "0.0.0.0:9988");
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = VcudaConfig::from_toml(
        r#"
        [server]
        port = 7000
        release_on_disconnect = false

        [runtime]
        library_path = "/opt/cuda/lib64/libcudart.so"
        "#,
    )
    .unwrap();

    assert_eq!(config.server.port, 7000);
    assert!(!config.server.release_on_disconnect);
    assert_eq!(config.server.max_clients, 16);
    assert_eq!(
        config.runtime.library_path.as_deref(),
        Some("/opt/cuda/lib64/libcudart.so")
    );
}

#[test]
fn test_empty_file() {
    let config = VcudaConfig::from_toml("").unwrap();
    assert_eq!(config.server.port, 9988);
    assert!(config.runtime.library_path.is_none());
}

#[test]
fn test_invalid_file() {
    let err = VcudaConfig::from_toml("[server]\nport = \"high\"").unwrap_err();
    assert!(matches!(err, CoreError::ConfigError(_)));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let config = VcudaConfig::load_or_default("/nonexistent/vcuda.toml");
    assert_eq!(config.server.port, 9988);
}
