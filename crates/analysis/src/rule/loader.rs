//! 규칙 문서 로더 -- YAML 문자열을 알림 규칙으로 파싱합니다.
//!
//! 분석 코어는 파일 시스템에 접근하지 않습니다. 디렉토리 스캔은 호출자(CLI)가
//! 수행하고, 읽은 문서를 출처 이름과 함께 이 로더에 넘깁니다.
//! 한 문서에 `---`로 구분된 여러 규칙을 넣을 수 있습니다.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::AnalysisError;

use super::types::AlertRule;

/// 규칙 문서 최대 크기
pub const MAX_RULE_DOCUMENT_SIZE: usize = 10 * 1024 * 1024; // 10MB
/// 한 엔진에 등록 가능한 최대 규칙 수
pub const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 문서 로더
pub struct RuleLoader;

impl RuleLoader {
    /// YAML 문자열을 파싱하여 규칙 목록을 생성합니다.
    ///
    /// 모든 규칙은 유효성 검증을 거칩니다. 하나라도 실패하면 전체가 실패합니다.
    pub fn parse_yaml(yaml_str: &str, origin: &str) -> Result<Vec<AlertRule>, AnalysisError> {
        if yaml_str.len() > MAX_RULE_DOCUMENT_SIZE {
            return Err(AnalysisError::RuleParse {
                origin: origin.to_owned(),
                reason: format!(
                    "document too large: {} bytes (max: {MAX_RULE_DOCUMENT_SIZE})",
                    yaml_str.len()
                ),
            });
        }

        let mut rules = Vec::new();
        if yaml_str.trim().is_empty() {
            return Ok(rules);
        }
        for (idx, document) in serde_yaml::Deserializer::from_str(yaml_str).enumerate() {
            let value = serde_yaml::Value::deserialize(document).map_err(|e| {
                AnalysisError::RuleParse {
                    origin: origin.to_owned(),
                    reason: format!("YAML parse error in document {idx}: {e}"),
                }
            })?;
            if value.is_null() {
                continue;
            }
            let rule: AlertRule =
                serde_yaml::from_value(value).map_err(|e| AnalysisError::RuleParse {
                    origin: origin.to_owned(),
                    reason: format!("invalid rule in document {idx}: {e}"),
                })?;
            rule.validate()?;
            rules.push(rule);
        }

        Self::check_unique(&rules)?;
        Ok(rules)
    }

    /// 여러 출처의 규칙을 합칩니다. ID 중복과 최대 개수를 검사합니다.
    pub fn merge(
        sets: impl IntoIterator<Item = Vec<AlertRule>>,
    ) -> Result<Vec<AlertRule>, AnalysisError> {
        let rules: Vec<AlertRule> = sets.into_iter().flatten().collect();
        Self::check_unique(&rules)?;
        Ok(rules)
    }

    /// 규칙 ID 중복과 최대 개수를 검사합니다.
    pub fn check_unique(rules: &[AlertRule]) -> Result<(), AnalysisError> {
        if rules.len() > MAX_RULES_COUNT {
            return Err(AnalysisError::Config {
                field: "rules".to_owned(),
                reason: format!("too many rules: {} (max {MAX_RULES_COUNT})", rules.len()),
            });
        }

        let mut seen = HashSet::with_capacity(rules.len());
        for rule in rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(AnalysisError::RuleValidation {
                    rule_id: rule.id.clone(),
                    reason: "duplicate rule id".to_owned(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use logscope_core::types::Level;

    use super::*;

    const VALID: &str = r#"
id: db_timeouts
title: Database timeouts
condition:
  level: ERROR
  pattern:
    value: db timeout
threshold_count: 3
window_secs: 60
cooldown_secs: 300
"#;

    #[test]
    fn parse_valid_yaml() {
        let rules = RuleLoader::parse_yaml(VALID, "test.yml").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "db_timeouts");
        assert_eq!(rules[0].condition.level, Some(Level::Error));
    }

    #[test]
    fn parse_multi_document_yaml() {
        let yaml = format!("{VALID}\n---\nid: second\ntitle: Second\ncondition:\n  level: WARNING\nthreshold_count: 1\nwindow_secs: 10\n");
        let rules = RuleLoader::parse_yaml(&yaml, "multi.yml").unwrap();
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["db_timeouts", "second"]);
    }

    #[test]
    fn parse_invalid_yaml_returns_error() {
        let err = RuleLoader::parse_yaml("not: [valid: yaml: {{{", "bad.yml").unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn parse_yaml_with_invalid_rule() {
        let yaml = r#"
id: ""
title: ""
condition:
  level: ERROR
threshold_count: 1
window_secs: 1
"#;
        assert!(RuleLoader::parse_yaml(yaml, "empty_id.yml").is_err());
    }

    #[test]
    fn duplicate_ids_in_one_document_rejected() {
        let yaml = format!("{VALID}\n---\n{VALID}");
        let err = RuleLoader::parse_yaml(&yaml, "dup.yml").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn duplicate_ids_across_sources_rejected() {
        let a = RuleLoader::parse_yaml(VALID, "a.yml").unwrap();
        let b = RuleLoader::parse_yaml(VALID, "b.yml").unwrap();
        assert!(RuleLoader::merge([a, b]).is_err());
    }

    #[test]
    fn empty_document_yields_no_rules() {
        let rules = RuleLoader::parse_yaml("", "empty.yml").unwrap();
        assert!(rules.is_empty());
    }
}
