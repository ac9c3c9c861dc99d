//! 규칙 매칭 로직 -- 조건 평가 및 정규식 캐싱
//!
//! [`RuleMatcher`]는 규칙의 조건을 [`LogEntry`]에 대해 평가합니다.
//! 패턴은 `raw_text` 전체(여러 줄 엔트리 포함)에 대해 평가됩니다.
//! 정규식 패턴은 규칙 등록 시 한 번만 컴파일하여 캐싱합니다.
//! 소스 범위(`condition.source`)는 glob 패턴으로 컴파일하여 소스 ID에 대해 평가합니다.

use std::collections::HashMap;

use glob::Pattern;
use regex::Regex;

use logscope_core::types::LogEntry;

use super::types::{AlertRule, ConditionModifier};
use crate::error::AnalysisError;

/// 규칙 매처 -- 조건 평가 및 정규식 캐싱
#[derive(Debug, Default)]
pub struct RuleMatcher {
    /// 컴파일된 정규식 캐시: rule_id -> Regex
    regex_cache: HashMap<String, Regex>,
    /// 컴파일된 소스 범위: rule_id -> glob
    source_scopes: HashMap<String, Pattern>,
}

impl RuleMatcher {
    /// 새 매처를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 규칙의 정규식 조건을 미리 컴파일합니다.
    pub fn compile_rule(&mut self, rule: &AlertRule) -> Result<(), AnalysisError> {
        if let Some(pattern) = &rule.condition.pattern
            && pattern.modifier == ConditionModifier::Regex
        {
            let regex = Regex::new(&pattern.value).map_err(|e| AnalysisError::RuleValidation {
                rule_id: rule.id.clone(),
                reason: format!("invalid regex pattern: {e}"),
            })?;
            self.regex_cache.insert(rule.id.clone(), regex);
        }

        if let Some(source) = &rule.condition.source {
            let scope = Pattern::new(source).map_err(|e| AnalysisError::RuleValidation {
                rule_id: rule.id.clone(),
                reason: format!("invalid source pattern: {e}"),
            })?;
            self.source_scopes.insert(rule.id.clone(), scope);
        }
        Ok(())
    }

    /// 규칙이 해당 소스에 적용되는지 여부
    ///
    /// 범위가 없는 규칙은 모든 소스에 적용됩니다. 컴파일되지 않은 범위는 적용되지 않습니다.
    pub fn applies_to(&self, rule: &AlertRule, source_id: &str) -> bool {
        if rule.condition.source.is_none() {
            return true;
        }
        self.source_scopes
            .get(&rule.id)
            .is_some_and(|scope| scope.matches(source_id))
    }

    /// 규칙 조건이 엔트리에 매칭되는지 평가합니다.
    ///
    /// 컴파일되지 않은 정규식 규칙은 매칭되지 않습니다.
    pub fn matches(&self, rule: &AlertRule, entry: &LogEntry) -> bool {
        if let Some(level) = rule.condition.level
            && entry.level != level
        {
            return false;
        }

        let Some(pattern) = &rule.condition.pattern else {
            return true;
        };
        let text = entry.raw_text.as_str();
        match pattern.modifier {
            ConditionModifier::Exact => text == pattern.value,
            ConditionModifier::Contains => text.contains(&pattern.value),
            ConditionModifier::StartsWith => text.starts_with(&pattern.value),
            ConditionModifier::EndsWith => text.ends_with(&pattern.value),
            ConditionModifier::Regex => self
                .regex_cache
                .get(&rule.id)
                .is_some_and(|regex| regex.is_match(text)),
        }
    }
}
