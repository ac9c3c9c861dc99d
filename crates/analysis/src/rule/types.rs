//! 알림 규칙 데이터 타입
//!
//! YAML 규칙 문서에서 역직렬화되는 구조체들을 정의합니다.

use serde::{Deserialize, Serialize};

use logscope_core::types::Level;

use crate::error::AnalysisError;

/// 규칙 ID 최대 길이
const MAX_RULE_ID_LEN: usize = 256;
/// 창과 쿨다운의 최대 길이 (30일)
pub const MAX_RULE_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// 알림 규칙 -- 하나의 YAML 문서에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// id: db_timeouts
/// title: Database timeouts
/// description: Repeated database timeouts within a minute
/// status: enabled
/// condition:
///   level: ERROR
///   source: "db-*.log"
///   pattern:
///     modifier: contains
///     value: "db timeout"
/// threshold_count: 3
/// window_secs: 60
/// cooldown_secs: 300
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// 규칙 고유 ID
    pub id: String,
    /// 규칙 제목 (알림에 표시)
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: RuleStatus,
    /// 매칭 조건 (레벨과 패턴은 AND 결합)
    pub condition: RuleCondition,
    /// 창 안에서 이 횟수에 도달하면 발화
    pub threshold_count: u64,
    /// 슬라이딩 창 길이 (초)
    pub window_secs: u64,
    /// 발화 후 재발화 금지 기간 (초)
    #[serde(default)]
    pub cooldown_secs: u64,
}

impl AlertRule {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.id.is_empty() {
            return Err(self.invalid("rule id must not be empty"));
        }

        if self.id.len() > MAX_RULE_ID_LEN {
            return Err(self.invalid(&format!(
                "rule id must not exceed {MAX_RULE_ID_LEN} characters"
            )));
        }

        if self.title.is_empty() {
            return Err(self.invalid("rule title must not be empty"));
        }

        if self.threshold_count == 0 {
            return Err(self.invalid("threshold_count must be greater than 0"));
        }

        if self.window_secs == 0 {
            return Err(self.invalid("window_secs must be greater than 0"));
        }

        if self.window_secs > MAX_RULE_DURATION_SECS || self.cooldown_secs > MAX_RULE_DURATION_SECS
        {
            return Err(self.invalid(&format!(
                "window_secs and cooldown_secs must not exceed {MAX_RULE_DURATION_SECS}"
            )));
        }

        if self.condition.level.is_none() && self.condition.pattern.is_none() {
            return Err(self.invalid("condition must specify a level or a pattern"));
        }

        if let Some(pattern) = &self.condition.pattern
            && pattern.value.is_empty()
        {
            return Err(self.invalid("pattern value must not be empty"));
        }

        if self
            .condition
            .source
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            return Err(self.invalid("source must not be empty"));
        }

        Ok(())
    }

    fn invalid(&self, reason: &str) -> AnalysisError {
        AnalysisError::RuleValidation {
            rule_id: if self.id.is_empty() {
                "(empty)".to_owned()
            } else {
                self.id.clone()
            },
            reason: reason.to_owned(),
        }
    }

    /// 활성 상태인지 여부
    pub fn is_enabled(&self) -> bool {
        self.status == RuleStatus::Enabled
    }
}

/// 규칙 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// 활성화 (기본값)
    #[default]
    Enabled,
    /// 비활성화
    Disabled,
}

/// 매칭 조건
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// 엔트리 레벨이 정확히 일치해야 함
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    /// `raw_text`에 대한 패턴 조건
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternCondition>,
    /// 적용할 소스 ID (glob: `*`, `?`, `[...]`). 없으면 모든 소스
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// 패턴 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCondition {
    #[serde(default)]
    pub modifier: ConditionModifier,
    pub value: String,
}

/// 조건 수정자 -- 매칭 방식을 결정합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionModifier {
    /// 정확히 일치
    Exact,
    /// 부분 문자열 포함 (기본값)
    #[default]
    Contains,
    /// 접두사 일치
    StartsWith,
    /// 접미사 일치
    EndsWith,
    /// 정규식 매칭
    Regex,
}
