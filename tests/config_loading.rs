use std::io::Write;

use braid_core::config::AppConfig;
use braid_core::error::BraidError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_steps = 250

[log]
filter = "braid=debug"

[spans]
enabled = true
jsonl_path = "/tmp/braid-test/spans.jsonl"
bus_capacity = 64
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, 250);
    assert_eq!(config.log.filter, "braid=debug");
    assert!(config.spans.enabled);
    assert_eq!(
        config.spans.jsonl_path.as_deref(),
        Some("/tmp/braid-test/spans.jsonl")
    );
    assert_eq!(config.spans.bus_capacity, 64);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("BRAID_TEST_SPAN_DIR", "/var/tmp/braid");

    let toml_content = r#"
[spans]
jsonl_path = "${BRAID_TEST_SPAN_DIR}/spans.jsonl"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.spans.jsonl_path.as_deref(),
        Some("/var/tmp/braid/spans.jsonl")
    );
}

#[test]
fn test_spans_can_be_disabled() {
    let config = AppConfig::from_toml("[spans]\nenabled = false\n").expect("parse");
    assert!(!config.spans.enabled);
    assert_eq!(config.engine.max_steps, 10_000);
}

#[test]
fn test_wrong_type_is_config_error() {
    let err = AppConfig::from_toml("[engine]\nmax_steps = \"lots\"\n").unwrap_err();
    assert!(matches!(err, BraidError::Config(_)));
}
