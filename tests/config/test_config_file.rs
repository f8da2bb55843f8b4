// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Loading configuration from TOML files

use sealed_payload::{BootstrapPolicy, ConfigError, EncryptionConfig};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
api_base_url = "https://shop.example.com/api"
bootstrap_policy = "degrade"
bootstrap_timeout_ms = 1500
session_ttl_secs = 0
"#,
    );

    let config = EncryptionConfig::from_file(file.path()).unwrap();
    assert_eq!(config.api_base_url, "https://shop.example.com/api");
    assert_eq!(config.bootstrap_policy, BootstrapPolicy::Degrade);
    assert_eq!(config.bootstrap_timeout(), Duration::from_millis(1500));
    assert_eq!(config.session_ttl(), None);
    assert_eq!(config.api_path_prefix, "/api/");
    assert_eq!(config.nonce_bytes, 16);
    assert_eq!(
        config.public_key_url(),
        "https://shop.example.com/api/crypto/public-key"
    );
}

#[test]
fn test_full_file() {
    let file = write_config(
        r#"
api_base_url = "http://127.0.0.1:8080/v1/"
api_path_prefix = "/v1/"
public_key_path = "/keys/current"
bootstrap_timeout_ms = 500
bootstrap_policy = "fail_fast"
nonce_bytes = 24
session_ttl_secs = 60
shape_sniffing = true
bind_request_aad = true
"#,
    );

    let config = EncryptionConfig::from_file(file.path()).unwrap();
    assert_eq!(config.public_key_url(), "http://127.0.0.1:8080/v1/keys/current");
    assert_eq!(config.nonce_bytes, 24);
    assert_eq!(config.session_ttl(), Some(Duration::from_secs(60)));
    assert!(config.shape_sniffing);
    assert!(config.bind_request_aad);
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let file = write_config("api_base_url = ");
    assert!(matches!(
        EncryptionConfig::from_file(file.path()),
        Err(ConfigError::Parse(_))
    ));

    let file = write_config(r#"bootstrap_policy = "sometimes""#);
    assert!(matches!(
        EncryptionConfig::from_file(file.path()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_invalid_values_are_rejected() {
    for content in [
        "nonce_bytes = 12",
        "bootstrap_timeout_ms = 0",
        r#"api_path_prefix = "api/""#,
        r#"api_base_url = "not a url""#,
    ] {
        let file = write_config(content);
        assert!(
            matches!(
                EncryptionConfig::from_file(file.path()),
                Err(ConfigError::Invalid(_))
            ),
            "expected Invalid for {}",
            content
        );
    }
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        EncryptionConfig::from_file(dir.path().join("missing.toml")),
        Err(ConfigError::Io(_))
    ));
}
