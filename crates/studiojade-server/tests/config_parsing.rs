use std::{env, fs};

use studiojade_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("studiojade.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
worker_threads = 2
request_timeout_ms = 10000
body_limit_bytes = 1024

[upstream]
api_url = "http://localhost:9000/studio/user?id=691"
timeout_ms = 1500
max_attempts = 4
backoff_base_ms = 250

[cache]
fresh_ttl_secs = 60
stale_ttl_secs = 30

[site]
title = "Test Studio"
utc_offset_hours = 0
telemetry_enabled = false

[telemetry]
max_samples = 10
truncate_interval_secs = 60

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.worker_threads(), 2);
    assert_eq!(cfg.upstream.max_attempts, 4);
    assert_eq!(cfg.cache.fresh_ttl_secs, 60);
    assert_eq!(cfg.site.title, "Test Studio");
    assert_eq!(cfg.site_options().telemetry_endpoint, None);
    assert_eq!(cfg.telemetry.max_samples, 10);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    // Unset keys keep their defaults
    assert_eq!(cfg.site.page_max_age_secs, 300);

    // 2) Env override should win over file
    unsafe {
        env::set_var("STUDIOJADE__CACHE__STALE_TTL_SECS", "45");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.stale_ttl_secs, 45);
    unsafe {
        env::remove_var("STUDIOJADE__CACHE__STALE_TTL_SECS");
    }

    // 3) Validation failure: zero attempts
    let bad_toml = r#"
[upstream]
max_attempts = 0
"#;
    let bad_path = dir.path().join("bad.toml");
    fs::write(&bad_path, bad_toml).expect("write bad toml");
    let err = load_config(bad_path.to_str()).unwrap_err();
    assert!(err.contains("max_attempts"), "unexpected error: {err}");

    // 4) Validation failure: unparsable upstream URL
    let bad_toml = r#"
[upstream]
api_url = "::not a url::"
"#;
    fs::write(&bad_path, bad_toml).expect("write bad toml");
    let err = load_config(bad_path.to_str()).unwrap_err();
    assert!(err.contains("api_url"), "unexpected error: {err}");

    // 5) Validation failure: page timeout shorter than a full roster refresh
    let bad_toml = r#"
[server]
request_timeout_ms = 2500

[upstream]
timeout_ms = 1000
max_attempts = 3
backoff_base_ms = 1000
"#;
    fs::write(&bad_path, bad_toml).expect("write bad toml");
    let err = load_config(bad_path.to_str()).unwrap_err();
    assert!(err.contains("request_timeout_ms"), "unexpected error: {err}");
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");
    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.server.port, 3244);
    assert_eq!(cfg.cache.fresh_ttl_secs, 600);
    assert_eq!(cfg.upstream.backoff_base_ms, 1000);
}
