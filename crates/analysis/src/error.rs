//! 분석 코어 에러 타입
//!
//! [`AnalysisError`]는 엔진 구성과 실행 중 호출자에게 전달되는 에러를 표현합니다.
//! 잘못된 입력 라인이나 플러그인 실패는 에러가 아니라 경고로 기록됩니다.
//! `From<AnalysisError> for LogscopeError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use logscope_core::error::{ConfigError, LogscopeError, PipelineError};

/// 분석 코어 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 라인 형식 규칙 컴파일 실패
    #[error("format rule error: '{name}': {reason}")]
    FormatRule {
        /// 규칙 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 알림 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 룰 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 알림 규칙 문서 파싱 실패
    #[error("rule parse error: {origin}: {reason}")]
    RuleParse {
        /// 문서 출처 (파일 경로 등)
        origin: String,
        /// 파싱 실패 사유
        reason: String,
    },

    /// 워커 풀 포화 (거부 정책)
    #[error("worker pool saturated (capacity: {capacity})")]
    PoolSaturated {
        /// 동시 실행 가능 run 수
        capacity: usize,
    },

    /// 호출자가 실행을 취소함
    #[error("analysis cancelled")]
    Cancelled,

    /// 작업 태스크 join 실패 (panic 등)
    #[error("task join error: {0}")]
    Join(String),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl AnalysisError {
    /// 구성 단계(처리 시작 전)에 발생하는 에러인지 여부
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::FormatRule { .. }
                | Self::RuleValidation { .. }
                | Self::RuleParse { .. }
                | Self::Regex(_)
        )
    }
}

impl From<AnalysisError> for LogscopeError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Config { field, reason } => {
                LogscopeError::Config(ConfigError::InvalidValue { field, reason })
            }
            AnalysisError::PoolSaturated { capacity } => {
                LogscopeError::Pipeline(PipelineError::Saturated { capacity })
            }
            AnalysisError::Cancelled => LogscopeError::Pipeline(PipelineError::Cancelled),
            AnalysisError::Channel(reason) => {
                LogscopeError::Pipeline(PipelineError::ChannelSend(reason))
            }
            other if other.is_config() => LogscopeError::Config(ConfigError::ParseFailed {
                reason: other.to_string(),
            }),
            other => LogscopeError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_rule_error_display() {
        let err = AnalysisError::FormatRule {
            name: "nginx".to_owned(),
            reason: "missing 'message' group".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("nginx"));
        assert!(msg.contains("message"));
        assert!(err.is_config());
    }

    #[test]
    fn rule_validation_error_display() {
        let err = AnalysisError::RuleValidation {
            rule_id: "db_timeouts".to_owned(),
            reason: "threshold_count must be greater than 0".to_owned(),
        };
        assert!(err.to_string().contains("db_timeouts"));
    }

    #[test]
    fn regex_error_converts() {
        let regex_err = regex::Regex::new("[invalid").unwrap_err();
        let err: AnalysisError = regex_err.into();
        assert!(matches!(err, AnalysisError::Regex(_)));
        assert!(err.is_config());
    }

    #[test]
    fn config_error_converts_to_logscope_config() {
        let err = AnalysisError::Config {
            field: "window_size_secs".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let top: LogscopeError = err.into();
        assert!(matches!(
            top,
            LogscopeError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn saturation_converts_to_pipeline_error() {
        let top: LogscopeError = AnalysisError::PoolSaturated { capacity: 2 }.into();
        assert!(matches!(
            top,
            LogscopeError::Pipeline(PipelineError::Saturated { capacity: 2 })
        ));
        assert!(!AnalysisError::Cancelled.is_config());
    }

    #[test]
    fn rule_parse_converts_to_config_error() {
        let top: LogscopeError = AnalysisError::RuleParse {
            origin: "rules/db.yml".to_owned(),
            reason: "invalid YAML".to_owned(),
        }
        .into();
        assert!(top.to_string().contains("rules/db.yml"));
    }
}
