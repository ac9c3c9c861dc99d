//! 레벨 분류기
//!
//! 토크나이저가 추출한 레벨 토큰을 정규화하고, 토큰이 없으면 원문 키워드로 추정합니다.
//!
//! # 분류 순서
//! 1. 형식과 매칭되지 않은 엔트리: `UNKNOWN` 유지
//! 2. 레벨 토큰이 있고 동의어 표에 있음: 표의 레벨
//! 3. 그 외: `raw_text` 키워드 스캔 (ERROR > WARNING > INFO > DEBUG), 없으면 `UNKNOWN`

use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use logscope_core::types::{Level, LogEntry};

use crate::error::AnalysisError;

/// 기본 동의어 표 (소문자 토큰)
const DEFAULT_SYNONYMS: &[(&str, Level)] = &[
    ("error", Level::Error),
    ("err", Level::Error),
    ("fatal", Level::Error),
    ("critical", Level::Error),
    ("crit", Level::Error),
    ("severe", Level::Error),
    ("emerg", Level::Error),
    ("alert", Level::Error),
    ("exception", Level::Error),
    ("warning", Level::Warning),
    ("warn", Level::Warning),
    ("info", Level::Info),
    ("information", Level::Info),
    ("notice", Level::Info),
    ("debug", Level::Debug),
    ("trace", Level::Debug),
];

/// 키워드 휴리스틱 (우선순위 순)
const HEURISTICS: &[(Level, &str)] = &[
    (
        Level::Error,
        r"(?i)(?:\b(?:error|fatal|critical|panic|traceback)\b|exception\b)",
    ),
    (Level::Warning, r"(?i)\b(?:warn|warning|deprecated)\b"),
    (Level::Info, r"(?i)\b(?:info|information)\b"),
    (Level::Debug, r"(?i)\b(?:debug|trace)\b"),
];

/// 레벨 분류기
///
/// 상태가 없으므로 여러 run이 `Arc`로 공유합니다.
#[derive(Debug, Clone)]
pub struct LevelClassifier {
    synonyms: HashMap<String, Level>,
    heuristics: Vec<(Level, Regex)>,
}

impl LevelClassifier {
    /// 기본 동의어 표에 `extra`를 덮어써 분류기를 생성합니다.
    pub fn new(extra: &BTreeMap<String, Level>) -> Result<Self, AnalysisError> {
        let mut synonyms: HashMap<String, Level> = DEFAULT_SYNONYMS
            .iter()
            .map(|(token, level)| ((*token).to_owned(), *level))
            .collect();

        for (token, level) in extra {
            let trimmed = token.trim();
            if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
                return Err(AnalysisError::Config {
                    field: "level_synonyms".to_owned(),
                    reason: format!("invalid token '{token}': must be a single word"),
                });
            }
            synonyms.insert(trimmed.to_lowercase(), *level);
        }

        let mut heuristics = Vec::with_capacity(HEURISTICS.len());
        for (level, pattern) in HEURISTICS {
            heuristics.push((*level, Regex::new(pattern)?));
        }

        Ok(Self {
            synonyms,
            heuristics,
        })
    }

    /// 기본 동의어 표만 사용하는 분류기를 생성합니다.
    pub fn with_defaults() -> Result<Self, AnalysisError> {
        Self::new(&BTreeMap::new())
    }

    /// 알려진 레벨 토큰 목록 (긴 것부터, 같은 길이는 사전순)
    ///
    /// 내장 라인 형식의 레벨 그룹을 만들 때 사용합니다.
    pub fn known_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.synonyms.keys().cloned().collect();
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tokens
    }

    /// 레벨 토큰을 정규화합니다 (대소문자 무시).
    pub fn normalize(&self, token: &str) -> Option<Level> {
        self.synonyms.get(&token.trim().to_lowercase()).copied()
    }

    /// 원문 키워드로 레벨을 추정합니다.
    pub fn heuristic(&self, text: &str) -> Level {
        self.heuristics
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(level, _)| *level)
            .unwrap_or(Level::Unknown)
    }

    /// 엔트리의 레벨을 결정합니다.
    pub fn level_for(&self, entry: &LogEntry) -> Level {
        if !entry.is_parsed() {
            return Level::Unknown;
        }
        entry
            .level_token
            .as_deref()
            .and_then(|token| self.normalize(token))
            .unwrap_or_else(|| self.heuristic(&entry.raw_text))
    }

    /// 엔트리를 소비하여 레벨이 채워진 엔트리를 반환합니다.
    pub fn classify(&self, mut entry: LogEntry) -> LogEntry {
        entry.level = self.level_for(&entry);
        entry
    }
}
