//! 소스별 통계 요약
//!
//! [`SummaryBuilder`]는 엔트리를 하나씩 받아 레벨별 개수와 시간대 분포를 누적하고,
//! 마지막에 [`PatternDetector`]의 템플릿으로 상위 ERROR/WARNING 목록을 채웁니다.
//! ERROR/WARNING 엔트리의 `raw_text`에 나온 예외/에러 타입 이름(`IOException`,
//! `TimeoutError` 등)도 함께 집계합니다.

use std::collections::HashMap;

use chrono::Timelike;
use regex::Regex;

use logscope_core::types::{AnalysisSummary, ExceptionCount, Level, LogEntry, TemplateShare};

use crate::error::AnalysisError;
use crate::pattern::PatternDetector;

/// 예외/에러 타입 이름 패턴
pub const EXCEPTION_TYPE_PATTERN: &str = r"\w+(?:Exception|Error|Warning)";

/// 요약에 남길 예외 타입 최대 수
pub const EXCEPTION_TYPE_LIMIT: usize = 5;

/// 컴파일된 예외 타입 추출기 (run 간 공유, 복제 비용 낮음)
#[derive(Debug, Clone)]
pub struct ExceptionTypes {
    pattern: Regex,
}

impl ExceptionTypes {
    pub fn new() -> Result<Self, AnalysisError> {
        Ok(Self {
            pattern: Regex::new(EXCEPTION_TYPE_PATTERN)?,
        })
    }

    /// 텍스트에 나온 타입 이름을 등장 순서대로 반환합니다.
    pub fn find<'t>(&self, text: &'t str) -> impl Iterator<Item = &'t str> {
        self.pattern.find_iter(text).map(|m| m.as_str())
    }
}

/// 요약 누적기
#[derive(Debug)]
pub struct SummaryBuilder {
    summary: AnalysisSummary,
    top_n: usize,
    exception_types: ExceptionTypes,
    exception_counts: HashMap<String, u64>,
}

impl SummaryBuilder {
    pub fn new(source_id: impl Into<String>, top_n: usize, exception_types: ExceptionTypes) -> Self {
        Self {
            summary: AnalysisSummary {
                source_id: source_id.into(),
                ..Default::default()
            },
            top_n,
            exception_types,
            exception_counts: HashMap::new(),
        }
    }

    /// 분류된 엔트리 하나를 누적합니다.
    pub fn observe(&mut self, entry: &LogEntry) {
        let s = &mut self.summary;
        s.total_entries += 1;
        *s.level_counts.entry(entry.level).or_insert(0) += 1;
        if !entry.is_parsed() {
            s.unparsed_entries += 1;
        }
        match entry.timestamp {
            Some(ts) => *s.hourly_distribution.entry(ts.hour()).or_insert(0) += 1,
            None => s.untimestamped_entries += 1,
        }

        if matches!(entry.level, Level::Error | Level::Warning) {
            for name in self.exception_types.find(&entry.raw_text) {
                *self.exception_counts.entry(name.to_owned()).or_insert(0) += 1;
            }
        }
    }

    /// 지금까지 누적된 엔트리 수
    pub fn total_entries(&self) -> u64 {
        self.summary.total_entries
    }

    /// 요약을 완성합니다.
    pub fn finish(
        mut self,
        total_lines: u64,
        late_entries: u64,
        patterns: &PatternDetector,
    ) -> AnalysisSummary {
        self.summary.total_lines = total_lines;
        self.summary.late_entries = late_entries;
        self.summary.top_errors = top_shares(patterns, Level::Error, self.top_n);
        self.summary.top_warnings = top_shares(patterns, Level::Warning, self.top_n);
        self.summary.exception_types = top_exceptions(self.exception_counts, EXCEPTION_TYPE_LIMIT);
        self.summary
    }
}

/// 횟수 내림차순, 같으면 이름순
fn top_exceptions(counts: HashMap<String, u64>, n: usize) -> Vec<ExceptionCount> {
    let mut ranked: Vec<ExceptionCount> = counts
        .into_iter()
        .map(|(name, count)| ExceptionCount { name, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(n);
    ranked
}

fn top_shares(patterns: &PatternDetector, level: Level, n: usize) -> Vec<TemplateShare> {
    let total = patterns.level_total(level);
    patterns
        .top(level, n)
        .into_iter()
        .map(|t| TemplateShare {
            template_id: t.id,
            template_string: t.template_string.clone(),
            count: t.occurrence_count,
            percentage: if total == 0 {
                0.0
            } else {
                t.occurrence_count as f64 * 100.0 / total as f64
            },
        })
        .collect()
}
