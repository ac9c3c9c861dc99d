//! logscope.toml 통합 설정 테스트
//!
//! - logscope.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use logscope_core::config::{FormatRule, LogscopeConfig, SaturationPolicy};
use logscope_core::error::{ConfigError, LogscopeError};
use logscope_core::types::Level;

// =============================================================================
// logscope.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../logscope.toml.example");
    let config = LogscopeConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../logscope.toml.example");
    let config = LogscopeConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_correct_analysis_values() {
    let content = include_str!("../../../logscope.toml.example");
    let config = LogscopeConfig::parse(content).expect("should parse");
    let a = &config.analysis;

    assert_eq!(a.window_size_secs, 60);
    assert_eq!(a.baseline_history, 10);
    assert_eq!(a.min_baseline_windows, 5);
    assert_eq!(a.anomaly_threshold, 3.0);
    assert_eq!(a.anomaly_levels, vec![Level::Error, Level::Warning]);
    assert_eq!(
        a.correlation_identifier_keys,
        vec!["request_id", "trace_id", "correlation_id"]
    );
    assert_eq!(a.temporal_tolerance_secs, 60);
    assert_eq!(a.saturation_policy, SaturationPolicy::Queue);
    assert_eq!(a.level_synonyms.get("sev1"), Some(&Level::Error));
}

#[test]
fn example_config_lists_builtin_formats_then_custom() {
    let content = include_str!("../../../logscope.toml.example");
    let config = LogscopeConfig::parse(content).expect("should parse");
    let formats = &config.analysis.formats;

    assert_eq!(formats.len(), 6);
    assert_eq!(&formats[..5], FormatRule::builtin().as_slice());
    match &formats[5] {
        FormatRule::Regex {
            name,
            timestamp_format,
            ..
        } => {
            assert_eq!(name, "pipe_delimited");
            assert_eq!(timestamp_format.as_deref(), Some("%Y/%m/%d %H:%M:%S"));
        }
        other => panic!("unexpected format rule: {other:?}"),
    }
}

// =============================================================================
// 부분 설정 로딩 테스트
// =============================================================================

#[test]
fn partial_config_only_general() {
    let toml = r#"
[general]
log_level = "debug"
"#;
    let config = LogscopeConfig::parse(toml).expect("should parse");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.analysis.window_size_secs, 60);
    assert_eq!(config.analysis.formats, FormatRule::builtin());
}

#[test]
fn partial_config_only_some_analysis_fields() {
    let toml = r#"
[analysis]
window_size_secs = 300
saturation_policy = "reject"
"#;
    let config = LogscopeConfig::parse(toml).expect("should parse");
    assert_eq!(config.analysis.window_size_secs, 300);
    assert_eq!(config.analysis.saturation_policy, SaturationPolicy::Reject);
    // 나머지는 기본값
    assert_eq!(config.analysis.baseline_history, 10);
    assert_eq!(config.analysis.max_concurrent_runs, 4);
    config.validate().expect("should validate");
}

#[test]
fn explicit_formats_replace_builtin_list() {
    let toml = r#"
[[analysis.formats]]
kind = "bracket_level"
"#;
    let config = LogscopeConfig::parse(toml).expect("should parse");
    assert_eq!(config.analysis.formats, vec![FormatRule::BracketLevel]);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let original = std::env::var("LOGSCOPE_GENERAL_LOG_LEVEL").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGSCOPE_GENERAL_LOG_LEVEL", "error");
    }

    let mut config = LogscopeConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.general.log_level.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGSCOPE_GENERAL_LOG_LEVEL", val),
            None => std::env::remove_var("LOGSCOPE_GENERAL_LOG_LEVEL"),
        }
    }

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_saturation_policy() {
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGSCOPE_ANALYSIS_SATURATION_POLICY", "reject");
    }
    let mut config = LogscopeConfig::default();
    config.apply_env_overrides();
    // SAFETY: 테스트 정리
    unsafe {
        std::env::remove_var("LOGSCOPE_ANALYSIS_SATURATION_POLICY");
    }
    assert_eq!(config.analysis.saturation_policy, SaturationPolicy::Reject);
}

#[test]
#[serial_test::serial]
fn env_override_unknown_policy_is_ignored() {
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGSCOPE_ANALYSIS_SATURATION_POLICY", "drop");
    }
    let mut config = LogscopeConfig::default();
    config.apply_env_overrides();
    // SAFETY: 테스트 정리
    unsafe {
        std::env::remove_var("LOGSCOPE_ANALYSIS_SATURATION_POLICY");
    }
    assert_eq!(config.analysis.saturation_policy, SaturationPolicy::Queue);
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGSCOPE_ANALYSIS_EXTRACT_KEY_VALUES", "false");
    }
    let mut config = LogscopeConfig::default();
    config.apply_env_overrides();
    // SAFETY: 테스트 정리
    unsafe {
        std::env::remove_var("LOGSCOPE_ANALYSIS_EXTRACT_KEY_VALUES");
    }
    assert!(!config.analysis.extract_key_values);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_toml_value() {
    let toml = r#"
[analysis]
top_n = 25
"#;
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::remove_var("LOGSCOPE_ANALYSIS_TOP_N");
    }
    let mut config = LogscopeConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    assert_eq!(config.analysis.top_n, 25);
}

// =============================================================================
// 빈 파일 / 잘못된 형식 에러 테스트
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = LogscopeConfig::parse("").expect("empty string should parse");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.analysis.window_size_secs, 60);
}

#[test]
fn comments_only_parses_with_defaults() {
    let toml = r#"
# 주석만 있는 파일
# [analysis]
# window_size_secs = 5
"#;
    let config = LogscopeConfig::parse(toml).expect("should parse");
    assert_eq!(config.analysis.window_size_secs, 60);
}

#[test]
fn malformed_toml_returns_parse_error() {
    let err = LogscopeConfig::parse("[analysis\nwindow_size_secs = ").unwrap_err();
    assert!(matches!(
        err,
        LogscopeError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[analysis]
window_size_secs = "sixty"
"#;
    assert!(LogscopeConfig::parse(toml).is_err());
}

#[test]
fn unknown_level_in_synonyms_is_rejected() {
    let toml = r#"
[analysis.level_synonyms]
sev1 = "CATASTROPHIC"
"#;
    assert!(LogscopeConfig::parse(toml).is_err());
}

#[test]
fn unknown_format_kind_is_rejected() {
    let toml = r#"
[[analysis.formats]]
kind = "syslog"
"#;
    assert!(LogscopeConfig::parse(toml).is_err());
}

#[test]
fn unknown_section_is_ignored() {
    let toml = r#"
[general]
log_level = "warn"

[exporter]
endpoint = "http://localhost:9000"
"#;
    let config = LogscopeConfig::parse(toml).expect("unknown sections should be ignored");
    assert_eq!(config.general.log_level, "warn");
}

#[test]
fn parsed_but_invalid_values_fail_validation() {
    let toml = r#"
[analysis]
baseline_history = 3
min_baseline_windows = 4
"#;
    let config = LogscopeConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("min_baseline_windows"));
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = LogscopeConfig::from_file("/nonexistent/path/logscope.toml").await;
    assert!(matches!(
        result,
        Err(LogscopeError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[tokio::test]
async fn load_example_config_from_disk() {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let example_path = format!("{manifest_dir}/../../logscope.toml.example");

    let config = LogscopeConfig::from_file(&example_path)
        .await
        .expect("example config should load");
    assert_eq!(config.analysis.formats.len(), 6);
}

// =============================================================================
// 직렬화 라운드트립 테스트
// =============================================================================

#[test]
fn serialize_and_reparse_roundtrip() {
    let mut original = LogscopeConfig::default();
    original.analysis.window_size_secs = 120;
    original
        .analysis
        .level_synonyms
        .insert("sev1".to_owned(), Level::Error);

    let toml_str = toml::to_string_pretty(&original).expect("should serialize");
    let reparsed = LogscopeConfig::parse(&toml_str).expect("should reparse");

    assert_eq!(reparsed.analysis.window_size_secs, 120);
    assert_eq!(reparsed.analysis.formats, original.analysis.formats);
    assert_eq!(
        reparsed.analysis.level_synonyms,
        original.analysis.level_synonyms
    );
}
