//! Loading `LinkConfig` from TOML files.

use shogi_link::{Difficulty, LinkConfig};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_load_partial_file_fills_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
port = 4000
allowed_origins = ["https://shogi.example"]
difficulty = "hard"
waiting_ttl_secs = 5
"#
    )
    .expect("write config");

    let config = LinkConfig::from_file(file.path()).expect("valid config");
    assert_eq!(*config.port(), 4000);
    assert_eq!(config.allowed_origins(), &vec!["https://shogi.example".to_string()]);
    assert_eq!(*config.difficulty(), Difficulty::Hard);
    assert_eq!(config.host(), "127.0.0.1");
    assert_eq!(*config.eviction_policy().waiting_ttl(), Duration::from_secs(5));
    assert_eq!(config.poll_interval(), Duration::from_millis(1000));
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "port = \"not a number\"").expect("write config");
    let err = LinkConfig::from_file(file.path()).expect_err("bad port");
    assert!(err.message.contains("Failed to parse config"));
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.toml");
    let config = LinkConfig::load(Some(path.as_path())).expect("defaults");
    assert_eq!(config.host(), "127.0.0.1");
}
