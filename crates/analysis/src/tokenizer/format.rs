//! 라인 형식 규칙 컴파일과 매칭
//!
//! [`FormatSet`]은 설정된 [`FormatRule`] 목록을 정규식으로 컴파일하고,
//! 순서대로 시도하여 첫 번째로 매칭된 형식의 결과를 반환합니다.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use logscope_core::config::FormatRule;

use crate::error::AnalysisError;

/// ISO 8601 계열 타임스탬프 (공백 또는 `T` 구분자, 소수 초, 오프셋)
const ISO_TIMESTAMP: &str =
    r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?";

/// 일-월-연 타임스탬프
const DAY_FIRST_TIMESTAMP: &str = r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}";

/// 내장 타임스탬프 해석 형식 (오프셋 없는 경우 UTC로 간주)
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%d/%m/%Y %H:%M:%S"];

/// `key=value` 추출 패턴 (값은 따옴표로 감쌀 수 있음)
const KEY_VALUE: &str = r#"\b([A-Za-z_][A-Za-z0-9_.\-]*)=(?:"([^"]*)"|([^\s,;"]+))"#;

/// 매칭에서 특별하게 취급되는 그룹 이름
const RESERVED_GROUPS: [&str; 3] = ["timestamp", "level", "message"];

/// 라인 하나가 형식과 매칭된 결과
#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    /// 매칭된 형식 이름
    pub format: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub level_token: Option<String>,
    /// 공백이 정리된 본문
    pub message: String,
    /// 이름 그룹과 `key=value`에서 추출한 필드 (먼저 들어온 값 우선)
    pub fields: Vec<(String, String)>,
}

/// 컴파일된 라인 형식
#[derive(Debug, Clone)]
pub struct CompiledFormat {
    name: String,
    regex: Regex,
    timestamp_format: Option<String>,
    field_groups: Vec<String>,
}

impl CompiledFormat {
    /// 규칙 하나를 컴파일합니다.
    ///
    /// `level_tokens`는 내장 형식의 레벨 그룹에 들어갈 토큰 목록입니다.
    pub fn compile(rule: &FormatRule, level_tokens: &[String]) -> Result<Self, AnalysisError> {
        let level = level_group(level_tokens);
        let (pattern, timestamp_format) = match rule {
            FormatRule::Iso8601Level => (
                format!(
                    r"^(?P<timestamp>{ISO_TIMESTAMP})\s+\[?(?P<level>{level})\]?:?(?:\s+|$)(?P<message>.*)$"
                ),
                None,
            ),
            FormatRule::BracketLevel => (
                format!(
                    r"^\[(?P<level>{level})\]:?\s*(?:(?P<timestamp>{ISO_TIMESTAMP})(?:\s+|$))?(?P<message>.*)$"
                ),
                None,
            ),
            FormatRule::BracketTimestamp => (
                format!(
                    r"^\[(?P<timestamp>{ISO_TIMESTAMP})\]\s*(?:\[?(?P<level>{level})\]?:?(?:\s+|$))?(?P<message>.*)$"
                ),
                None,
            ),
            FormatRule::DayFirstLevel => (
                format!(
                    r"^(?P<timestamp>{DAY_FIRST_TIMESTAMP})\s+\[?(?P<level>{level})\]?:?(?:\s+|$)(?P<message>.*)$"
                ),
                None,
            ),
            FormatRule::Iso8601Plain => (
                format!(r"^(?P<timestamp>{ISO_TIMESTAMP})(?:\s+(?P<message>.*))?$"),
                None,
            ),
            FormatRule::Regex {
                name,
                pattern,
                timestamp_format,
            } => {
                if name.trim().is_empty() {
                    return Err(AnalysisError::FormatRule {
                        name: name.clone(),
                        reason: "name must not be empty".to_owned(),
                    });
                }
                if let Some(fmt) = timestamp_format {
                    validate_timestamp_format(name, fmt)?;
                }
                (pattern.clone(), timestamp_format.clone())
            }
        };

        let regex = Regex::new(&pattern).map_err(|e| AnalysisError::FormatRule {
            name: rule.name().to_owned(),
            reason: format!("invalid pattern: {e}"),
        })?;

        let group_names: Vec<&str> = regex.capture_names().flatten().collect();
        if !group_names.contains(&"message") {
            return Err(AnalysisError::FormatRule {
                name: rule.name().to_owned(),
                reason: "pattern must define a 'message' named group".to_owned(),
            });
        }
        let field_groups = group_names
            .iter()
            .filter(|g| !RESERVED_GROUPS.contains(g))
            .map(|g| (*g).to_owned())
            .collect();

        Ok(Self {
            name: rule.name().to_owned(),
            regex,
            timestamp_format,
            field_groups,
        })
    }

    /// 형식 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 라인이 이 형식으로 시작하면 매칭 결과를 반환합니다.
    pub fn match_line(&self, line: &str) -> Option<LineMatch> {
        let caps = self.regex.captures(line)?;

        let timestamp = caps
            .name("timestamp")
            .and_then(|m| parse_timestamp(m.as_str(), self.timestamp_format.as_deref()));
        let level_token = caps
            .name("level")
            .map(|m| m.as_str().to_owned())
            .filter(|t| !t.is_empty());
        let message = caps
            .name("message")
            .map(|m| collapse_whitespace(m.as_str()))
            .unwrap_or_default();

        let fields = self
            .field_groups
            .iter()
            .filter_map(|g| {
                caps.name(g)
                    .map(|m| (g.clone(), m.as_str().to_owned()))
                    .filter(|(_, v)| !v.is_empty())
            })
            .collect();

        Some(LineMatch {
            format: self.name.clone(),
            timestamp,
            level_token,
            message,
            fields,
        })
    }
}

/// 순서 있는 형식 집합 -- 처음 매칭된 형식이 사용됩니다.
#[derive(Debug, Clone)]
pub struct FormatSet {
    formats: Vec<CompiledFormat>,
    key_value: Option<Regex>,
}

impl FormatSet {
    /// 규칙 목록을 컴파일합니다. 하나라도 실패하면 에러를 반환합니다.
    pub fn compile(
        rules: &[FormatRule],
        level_tokens: &[String],
        extract_key_values: bool,
    ) -> Result<Self, AnalysisError> {
        let mut formats = Vec::with_capacity(rules.len());
        for rule in rules {
            let compiled = CompiledFormat::compile(rule, level_tokens)?;
            if formats
                .iter()
                .any(|f: &CompiledFormat| f.name() == compiled.name())
            {
                return Err(AnalysisError::FormatRule {
                    name: compiled.name().to_owned(),
                    reason: "duplicate format name".to_owned(),
                });
            }
            formats.push(compiled);
        }

        let key_value = if extract_key_values {
            Some(Regex::new(KEY_VALUE)?)
        } else {
            None
        };

        Ok(Self { formats, key_value })
    }

    /// 라인을 순서대로 각 형식에 매칭합니다.
    pub fn match_line(&self, line: &str) -> Option<LineMatch> {
        let mut matched = self.formats.iter().find_map(|f| f.match_line(line))?;
        if let Some(kv) = &self.key_value {
            for caps in kv.captures_iter(&matched.message) {
                let Some(key) = caps.get(1) else { continue };
                let value = caps.get(2).or_else(|| caps.get(3));
                let Some(value) = value else { continue };
                if matched.fields.iter().any(|(k, _)| k == key.as_str()) {
                    continue;
                }
                matched
                    .fields
                    .push((key.as_str().to_owned(), value.as_str().to_owned()));
            }
        }
        Some(matched)
    }

    /// 등록된 형식 이름 목록
    pub fn registered_formats(&self) -> Vec<&str> {
        self.formats.iter().map(CompiledFormat::name).collect()
    }
}

/// 내장 형식용 레벨 그룹 패턴 (대소문자 무시)
fn level_group(tokens: &[String]) -> String {
    if tokens.is_empty() {
        return r"[A-Za-z]+".to_owned();
    }
    let alternation: Vec<String> = tokens.iter().map(|t| regex::escape(t)).collect();
    format!("(?i:{})", alternation.join("|"))
}

/// 타임스탬프 문자열을 UTC 시각으로 해석합니다.
///
/// `custom`이 주어지면 그 형식만 시도합니다. 오프셋이 없는 시각은 UTC로 간주합니다.
pub fn parse_timestamp(text: &str, custom: Option<&str>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Some(fmt) = custom {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        return NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .map(|naive| naive.and_utc());
    }

    let normalized = text.replacen(',', ".", 1);
    let with_t = normalized.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&with_t) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&with_t, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(&normalized, fmt)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

fn validate_timestamp_format(name: &str, fmt: &str) -> Result<(), AnalysisError> {
    use chrono::format::{Item, StrftimeItems};

    if fmt.trim().is_empty() || StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        return Err(AnalysisError::FormatRule {
            name: name.to_owned(),
            reason: format!("invalid timestamp_format '{fmt}'"),
        });
    }
    Ok(())
}

/// 연속 공백을 하나로 줄이고 앞뒤 공백을 제거합니다.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
