use std::io::Write;

use exprlower::{LowerError, LoweringOptions, ScopeMode};

#[test]
fn loads_from_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[lowering]\nscope_mode = \"shadow\"\noptimize = false").unwrap();
    let options = LoweringOptions::from_path(file.path()).unwrap();
    assert_eq!(options.scope_mode, ScopeMode::Shadow);
    assert!(!options.optimize);
    assert!(!options.trace_stages);
}

#[test]
fn missing_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    match LoweringOptions::from_path(&path) {
        Err(LowerError::Config { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn malformed_file_is_a_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[lowering\noptimize = ").unwrap();
    let err = LoweringOptions::from_path(file.path()).unwrap_err();
    assert!(matches!(err, LowerError::Config { .. }));
    assert!(err.to_string().starts_with("Config error"));
}

#[test]
fn json_round_trip() {
    let options = LoweringOptions::default().with_scope_mode(ScopeMode::Shadow).with_trace_stages(true);
    let json = serde_json::to_string(&options).unwrap();
    assert!(json.contains("\"scope_mode\":\"shadow\""));
    let back: LoweringOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(back, options);
}

#[test]
fn json_missing_fields_take_defaults() {
    let options: LoweringOptions = serde_json::from_str("{\"optimize\": false}").unwrap();
    assert_eq!(options.scope_mode, ScopeMode::Alias);
    assert!(!options.optimize);
}
