//! 분석 코어 설정
//!
//! [`AnalysisConfig`]는 core의 [`AnalysisSection`]을 기반으로
//! 엔진이 사용하는 검증된 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logscope_core::config::LogscopeConfig;
//! use logscope_analysis::config::AnalysisConfig;
//!
//! let core_config = LogscopeConfig::default();
//! let config = AnalysisConfig::from_core(&core_config.analysis);
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use logscope_core::config::{AnalysisSection, FormatRule, SaturationPolicy};
use logscope_core::types::Level;

use crate::error::AnalysisError;

/// 시간 관련 설정 상한 (7일)
const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// 분석 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// 순서 있는 라인 형식 규칙
    pub formats: Vec<FormatRule>,
    /// 추가 레벨 동의어
    pub level_synonyms: BTreeMap<String, Level>,
    /// 이상 탐지 시간 창 크기 (초)
    pub window_size_secs: u64,
    /// 기준선에 쓰는 직전 창 개수
    pub baseline_history: usize,
    /// 이상 플래그 최소 이력
    pub min_baseline_windows: usize,
    /// 이상 판정 임계값
    pub anomaly_threshold: f64,
    /// 레벨별 시계열 대상
    pub anomaly_levels: Vec<Level>,
    /// 공유 식별자 키
    pub correlation_identifier_keys: Vec<String>,
    /// 시간 근접 허용 범위 (초)
    pub temporal_tolerance_secs: u64,
    /// 시간 근접 링크 최소 신뢰도
    pub temporal_min_confidence: f64,
    /// 시간 근접 대상 레벨
    pub temporal_levels: Vec<Level>,
    /// 템플릿당 예시 수
    pub pattern_example_cap: usize,
    /// 엔트리당 최대 라인 수
    pub max_entry_lines: usize,
    /// 라인 최대 길이 (바이트)
    pub max_line_length: usize,
    /// 소스 쌍당 최대 링크 수
    pub max_links_per_pair: usize,
    /// 최대 동시 run 수
    pub max_concurrent_runs: usize,
    /// 워커 풀 포화 정책
    pub saturation_policy: SaturationPolicy,
    /// 단계 간 채널 용량
    pub stage_channel_capacity: usize,
    /// 스트리밍 유휴 flush 간격 (밀리초)
    pub idle_flush_ms: u64,
    /// 요약 상위 템플릿 개수
    pub top_n: usize,
    /// `key=value` 필드 추출 여부
    pub extract_key_values: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from_core(&AnalysisSection::default())
    }
}

impl AnalysisConfig {
    /// core 설정에서 분석 설정을 생성합니다.
    pub fn from_core(core: &AnalysisSection) -> Self {
        Self {
            formats: core.formats.clone(),
            level_synonyms: core.level_synonyms.clone(),
            window_size_secs: core.window_size_secs,
            baseline_history: core.baseline_history,
            min_baseline_windows: core.min_baseline_windows,
            anomaly_threshold: core.anomaly_threshold,
            anomaly_levels: core.anomaly_levels.clone(),
            correlation_identifier_keys: core.correlation_identifier_keys.clone(),
            temporal_tolerance_secs: core.temporal_tolerance_secs,
            temporal_min_confidence: core.temporal_min_confidence,
            temporal_levels: core.temporal_levels.clone(),
            pattern_example_cap: core.pattern_example_cap,
            max_entry_lines: core.max_entry_lines,
            max_line_length: core.max_line_length,
            max_links_per_pair: core.max_links_per_pair,
            max_concurrent_runs: core.max_concurrent_runs,
            saturation_policy: core.saturation_policy,
            stage_channel_capacity: core.stage_channel_capacity,
            idle_flush_ms: core.idle_flush_ms,
            top_n: core.top_n,
            extract_key_values: core.extract_key_values,
        }
    }

    /// 시간 창 크기
    pub fn window_size(&self) -> TimeDelta {
        secs_delta(self.window_size_secs)
    }

    /// 시간 근접 허용 범위
    pub fn temporal_tolerance(&self) -> TimeDelta {
        secs_delta(self.temporal_tolerance_secs)
    }

    /// 스트리밍 유휴 flush 간격
    pub fn idle_flush(&self) -> Duration {
        Duration::from_millis(self.idle_flush_ms)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.formats.is_empty() {
            return Err(config_err("formats", "at least one format is required"));
        }

        if self.window_size_secs == 0 || self.window_size_secs > MAX_DURATION_SECS {
            return Err(config_err(
                "window_size_secs",
                &format!("must be between 1 and {MAX_DURATION_SECS}"),
            ));
        }

        if self.temporal_tolerance_secs > MAX_DURATION_SECS {
            return Err(config_err(
                "temporal_tolerance_secs",
                &format!("must not exceed {MAX_DURATION_SECS}"),
            ));
        }

        if self.baseline_history == 0 {
            return Err(config_err("baseline_history", "must be greater than 0"));
        }

        if self.min_baseline_windows > self.baseline_history {
            return Err(config_err(
                "min_baseline_windows",
                "must not exceed baseline_history",
            ));
        }

        if !self.anomaly_threshold.is_finite() || self.anomaly_threshold <= 0.0 {
            return Err(config_err(
                "anomaly_threshold",
                "must be a positive finite number",
            ));
        }

        if !(0.0..=1.0).contains(&self.temporal_min_confidence) {
            return Err(config_err(
                "temporal_min_confidence",
                "must be between 0.0 and 1.0",
            ));
        }

        if self
            .correlation_identifier_keys
            .iter()
            .any(|k| k.trim().is_empty())
        {
            return Err(config_err(
                "correlation_identifier_keys",
                "keys must not be empty",
            ));
        }

        for (field, value) in [
            ("pattern_example_cap", self.pattern_example_cap),
            ("max_entry_lines", self.max_entry_lines),
            ("max_line_length", self.max_line_length),
            ("max_links_per_pair", self.max_links_per_pair),
            ("max_concurrent_runs", self.max_concurrent_runs),
            ("stage_channel_capacity", self.stage_channel_capacity),
        ] {
            if value == 0 {
                return Err(config_err(field, "must be greater than 0"));
            }
        }

        Ok(())
    }
}

fn secs_delta(secs: u64) -> TimeDelta {
    TimeDelta::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(TimeDelta::MAX)
}

fn config_err(field: &str, reason: &str) -> AnalysisError {
    AnalysisError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 분석 설정 빌더
#[derive(Default)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    /// 기본값에서 시작하는 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 라인 형식 규칙을 설정합니다.
    pub fn formats(mut self, formats: Vec<FormatRule>) -> Self {
        self.config.formats = formats;
        self
    }

    /// 레벨 동의어를 추가합니다.
    pub fn level_synonym(mut self, token: impl Into<String>, level: Level) -> Self {
        self.config.level_synonyms.insert(token.into(), level);
        self
    }

    /// 시간 창 크기(초)를 설정합니다.
    pub fn window_size_secs(mut self, secs: u64) -> Self {
        self.config.window_size_secs = secs;
        self
    }

    /// 기준선 이력 길이와 최소 이력을 설정합니다.
    pub fn baseline(mut self, history: usize, min_windows: usize) -> Self {
        self.config.baseline_history = history;
        self.config.min_baseline_windows = min_windows;
        self
    }

    /// 이상 판정 임계값을 설정합니다.
    pub fn anomaly_threshold(mut self, threshold: f64) -> Self {
        self.config.anomaly_threshold = threshold;
        self
    }

    /// 레벨별 시계열 대상 레벨을 설정합니다.
    pub fn anomaly_levels(mut self, levels: Vec<Level>) -> Self {
        self.config.anomaly_levels = levels;
        self
    }

    /// 공유 식별자 키를 설정합니다.
    pub fn correlation_identifier_keys(mut self, keys: Vec<String>) -> Self {
        self.config.correlation_identifier_keys = keys;
        self
    }

    /// 시간 근접 허용 범위(초)와 최소 신뢰도를 설정합니다.
    pub fn temporal(mut self, tolerance_secs: u64, min_confidence: f64) -> Self {
        self.config.temporal_tolerance_secs = tolerance_secs;
        self.config.temporal_min_confidence = min_confidence;
        self
    }

    /// 시간 근접 대상 레벨을 설정합니다.
    pub fn temporal_levels(mut self, levels: Vec<Level>) -> Self {
        self.config.temporal_levels = levels;
        self
    }

    /// 템플릿당 예시 수를 설정합니다.
    pub fn pattern_example_cap(mut self, cap: usize) -> Self {
        self.config.pattern_example_cap = cap;
        self
    }

    /// 엔트리당 최대 라인 수를 설정합니다.
    pub fn max_entry_lines(mut self, max: usize) -> Self {
        self.config.max_entry_lines = max;
        self
    }

    /// 라인 최대 길이(바이트)를 설정합니다.
    pub fn max_line_length(mut self, max: usize) -> Self {
        self.config.max_line_length = max;
        self
    }

    /// 소스 쌍당 최대 링크 수를 설정합니다.
    pub fn max_links_per_pair(mut self, max: usize) -> Self {
        self.config.max_links_per_pair = max;
        self
    }

    /// 워커 풀 크기와 포화 정책을 설정합니다.
    pub fn worker_pool(mut self, max_runs: usize, policy: SaturationPolicy) -> Self {
        self.config.max_concurrent_runs = max_runs;
        self.config.saturation_policy = policy;
        self
    }

    /// 단계 간 채널 용량을 설정합니다.
    pub fn stage_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.stage_channel_capacity = capacity;
        self
    }

    /// 스트리밍 유휴 flush 간격(밀리초)을 설정합니다.
    pub fn idle_flush_ms(mut self, ms: u64) -> Self {
        self.config.idle_flush_ms = ms;
        self
    }

    /// 요약 상위 템플릿 개수를 설정합니다.
    pub fn top_n(mut self, n: usize) -> Self {
        self.config.top_n = n;
        self
    }

    /// `key=value` 추출 여부를 설정합니다.
    pub fn extract_key_values(mut self, enabled: bool) -> Self {
        self.config.extract_key_values = enabled;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
