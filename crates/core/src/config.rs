//! 설정 관리
//!
//! [`LogscopeConfig`]는 `logscope.toml`의 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGSCOPE_ANALYSIS_WINDOW_SIZE_SECS=30` 형식)
//! 3. 설정 파일 (`logscope.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logscope_core::error::LogscopeError> {
//! use logscope_core::config::LogscopeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogscopeConfig::load("logscope.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogscopeConfig::parse("[analysis]\nwindow_size_secs = 30")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogscopeError};
use crate::types::Level;

/// Logscope 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogscopeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 분석 코어 설정
    #[serde(default)]
    pub analysis: AnalysisSection,
}

impl LogscopeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogscopeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogscopeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogscopeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogscopeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogscopeError> {
        toml::from_str(toml_str).map_err(|e| {
            LogscopeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGSCOPE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGSCOPE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGSCOPE_GENERAL_LOG_FORMAT");

        // Analysis
        let a = &mut self.analysis;
        override_u64(&mut a.window_size_secs, "LOGSCOPE_ANALYSIS_WINDOW_SIZE_SECS");
        override_usize(&mut a.baseline_history, "LOGSCOPE_ANALYSIS_BASELINE_HISTORY");
        override_usize(
            &mut a.min_baseline_windows,
            "LOGSCOPE_ANALYSIS_MIN_BASELINE_WINDOWS",
        );
        override_f64(&mut a.anomaly_threshold, "LOGSCOPE_ANALYSIS_ANOMALY_THRESHOLD");
        override_csv(
            &mut a.correlation_identifier_keys,
            "LOGSCOPE_ANALYSIS_CORRELATION_IDENTIFIER_KEYS",
        );
        override_u64(
            &mut a.temporal_tolerance_secs,
            "LOGSCOPE_ANALYSIS_TEMPORAL_TOLERANCE_SECS",
        );
        override_f64(
            &mut a.temporal_min_confidence,
            "LOGSCOPE_ANALYSIS_TEMPORAL_MIN_CONFIDENCE",
        );
        override_usize(
            &mut a.pattern_example_cap,
            "LOGSCOPE_ANALYSIS_PATTERN_EXAMPLE_CAP",
        );
        override_usize(&mut a.max_entry_lines, "LOGSCOPE_ANALYSIS_MAX_ENTRY_LINES");
        override_usize(&mut a.max_line_length, "LOGSCOPE_ANALYSIS_MAX_LINE_LENGTH");
        override_usize(
            &mut a.max_links_per_pair,
            "LOGSCOPE_ANALYSIS_MAX_LINKS_PER_PAIR",
        );
        override_usize(
            &mut a.max_concurrent_runs,
            "LOGSCOPE_ANALYSIS_MAX_CONCURRENT_RUNS",
        );
        override_usize(
            &mut a.stage_channel_capacity,
            "LOGSCOPE_ANALYSIS_STAGE_CHANNEL_CAPACITY",
        );
        override_u64(&mut a.idle_flush_ms, "LOGSCOPE_ANALYSIS_IDLE_FLUSH_MS");
        override_usize(&mut a.top_n, "LOGSCOPE_ANALYSIS_TOP_N");
        override_bool(
            &mut a.extract_key_values,
            "LOGSCOPE_ANALYSIS_EXTRACT_KEY_VALUES",
        );
        if let Ok(val) = std::env::var("LOGSCOPE_ANALYSIS_SATURATION_POLICY") {
            match val.as_str() {
                "queue" => a.saturation_policy = SaturationPolicy::Queue,
                "reject" => a.saturation_policy = SaturationPolicy::Reject,
                _ => warn!(
                    env_key = "LOGSCOPE_ANALYSIS_SATURATION_POLICY",
                    value = val.as_str(),
                    "unknown saturation policy in env var, ignoring"
                ),
            }
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogscopeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        self.analysis.validate()?;
        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 라인 형식 규칙
///
/// 순서대로 시도되며 처음 매칭된 규칙이 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatRule {
    /// `2024-01-15 10:00:00 ERROR message` (`T` 구분자, 소수 초, 오프셋 허용)
    Iso8601Level,
    /// `[ERROR] 2024-01-15 10:00:00 message`
    BracketLevel,
    /// `[2024-01-15 10:00:00] ERROR message`
    BracketTimestamp,
    /// `15/01/2024 10:00:00 ERROR message`
    DayFirstLevel,
    /// `2024-01-15 10:00:00 message` (레벨 토큰 없음)
    Iso8601Plain,
    /// 호출자가 제공하는 정규식 규칙
    ///
    /// `message` 이름 그룹은 필수이며 `timestamp`, `level` 그룹은 선택입니다.
    /// 그 밖의 이름 그룹은 `extracted_fields`로 들어갑니다.
    Regex {
        name: String,
        pattern: String,
        /// chrono 형식 문자열 (없으면 내장 타임스탬프 형식으로 해석)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_format: Option<String>,
    },
}

impl FormatRule {
    /// 규칙 이름 (엔트리의 `format` 필드와 메트릭 레이블에 사용)
    pub fn name(&self) -> &str {
        match self {
            Self::Iso8601Level => "iso8601_level",
            Self::BracketLevel => "bracket_level",
            Self::BracketTimestamp => "bracket_timestamp",
            Self::DayFirstLevel => "day_first_level",
            Self::Iso8601Plain => "iso8601_plain",
            Self::Regex { name, .. } => name,
        }
    }

    /// 기본 내장 형식 목록
    pub fn builtin() -> Vec<FormatRule> {
        vec![
            Self::Iso8601Level,
            Self::BracketLevel,
            Self::BracketTimestamp,
            Self::DayFirstLevel,
            Self::Iso8601Plain,
        ]
    }
}

/// 워커 풀 포화 시 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaturationPolicy {
    /// 슬롯이 빌 때까지 대기
    #[default]
    Queue,
    /// 즉시 거부
    Reject,
}

/// 기본 라인 길이 상한 (64 KiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// 분석 코어 설정 (`[analysis]` 섹션)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    /// 이상 탐지 시간 창 크기 (초)
    pub window_size_secs: u64,
    /// 기준선 계산에 쓰는 직전 창 개수
    pub baseline_history: usize,
    /// 이상 플래그를 켜기 위한 최소 이력 창 개수
    pub min_baseline_windows: usize,
    /// 이상 판정 점수 임계값
    pub anomaly_threshold: f64,
    /// 레벨별 시계열을 만들 레벨
    pub anomaly_levels: Vec<Level>,
    /// 공유 식별자 상관관계에 쓰는 필드 이름
    pub correlation_identifier_keys: Vec<String>,
    /// 시간 근접 상관관계 허용 범위 (초)
    pub temporal_tolerance_secs: u64,
    /// 시간 근접 링크 최소 신뢰도
    pub temporal_min_confidence: f64,
    /// 시간 근접 상관관계 대상 레벨
    pub temporal_levels: Vec<Level>,
    /// 템플릿당 보관할 예시 엔트리 수
    pub pattern_example_cap: usize,
    /// 엔트리 하나에 병합할 최대 라인 수
    pub max_entry_lines: usize,
    /// 라인 하나의 최대 길이 (바이트, 넘는 부분은 잘림)
    pub max_line_length: usize,
    /// 소스 쌍당 최대 링크 수
    pub max_links_per_pair: usize,
    /// 동시에 실행할 최대 분석 run 수
    pub max_concurrent_runs: usize,
    /// 워커 풀 포화 시 정책
    pub saturation_policy: SaturationPolicy,
    /// 단계 간 채널 용량
    pub stage_channel_capacity: usize,
    /// 스트리밍 시 보류 중인 엔트리를 내보내기까지의 유휴 시간 (밀리초)
    pub idle_flush_ms: u64,
    /// 요약의 상위 템플릿 개수
    pub top_n: usize,
    /// 메시지에서 `key=value` 필드를 추출할지 여부
    pub extract_key_values: bool,
    /// 추가 레벨 동의어 (토큰 -> 레벨, 기본 표를 덮어씀)
    pub level_synonyms: BTreeMap<String, Level>,
    /// 순서 있는 라인 형식 규칙
    pub formats: Vec<FormatRule>,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            window_size_secs: 60,
            baseline_history: 10,
            min_baseline_windows: 5,
            anomaly_threshold: 3.0,
            anomaly_levels: vec![Level::Error, Level::Warning],
            correlation_identifier_keys: vec![
                "request_id".to_owned(),
                "trace_id".to_owned(),
                "correlation_id".to_owned(),
            ],
            temporal_tolerance_secs: 60,
            temporal_min_confidence: 0.2,
            temporal_levels: vec![Level::Error, Level::Warning],
            pattern_example_cap: 5,
            max_entry_lines: 500,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_links_per_pair: 10_000,
            max_concurrent_runs: 4,
            saturation_policy: SaturationPolicy::Queue,
            stage_channel_capacity: 1024,
            idle_flush_ms: 500,
            top_n: 10,
            extract_key_values: true,
            level_synonyms: BTreeMap::new(),
            formats: FormatRule::builtin(),
        }
    }
}

impl AnalysisSection {
    /// 값 범위를 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.formats.is_empty() {
            return Err(invalid("analysis.formats", "at least one format is required"));
        }
        if self.window_size_secs == 0 {
            return Err(invalid("analysis.window_size_secs", "must be greater than 0"));
        }
        if self.baseline_history == 0 {
            return Err(invalid("analysis.baseline_history", "must be greater than 0"));
        }
        if self.min_baseline_windows > self.baseline_history {
            return Err(invalid(
                "analysis.min_baseline_windows",
                "must not exceed baseline_history",
            ));
        }
        if !self.anomaly_threshold.is_finite() || self.anomaly_threshold <= 0.0 {
            return Err(invalid(
                "analysis.anomaly_threshold",
                "must be a positive finite number",
            ));
        }
        if !(0.0..=1.0).contains(&self.temporal_min_confidence) {
            return Err(invalid(
                "analysis.temporal_min_confidence",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.pattern_example_cap == 0 {
            return Err(invalid("analysis.pattern_example_cap", "must be greater than 0"));
        }
        if self.max_entry_lines == 0 {
            return Err(invalid("analysis.max_entry_lines", "must be greater than 0"));
        }
        if self.max_line_length == 0 {
            return Err(invalid("analysis.max_line_length", "must be greater than 0"));
        }
        if self.max_concurrent_runs == 0 {
            return Err(invalid("analysis.max_concurrent_runs", "must be greater than 0"));
        }
        if self.stage_channel_capacity == 0 {
            return Err(invalid(
                "analysis.stage_channel_capacity",
                "must be greater than 0",
            ));
        }
        if self
            .correlation_identifier_keys
            .iter()
            .any(|k| k.trim().is_empty())
        {
            return Err(invalid(
                "analysis.correlation_identifier_keys",
                "keys must not be empty",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
