//! 교차 소스 상관관계 엔진
//!
//! 서로 다른 두 소스의 엔트리 사이에 무방향 링크를 만듭니다.
//!
//! # 링크 규칙
//! - **공유 식별자**: 설정된 키(`request_id` 등)의 값이 같으면 confidence 1.0
//! - **시간 근접**: 같은 레벨이고 타임스탬프 차이가 허용 범위 이내이면
//!   `1 - |dt| / tolerance` (최소 confidence 미만은 버림)
//!
//! 한 쌍에 공유 식별자 링크가 있으면 시간 근접 링크는 만들지 않습니다.
//! 같은 소스 안의 엔트리끼리는 링크하지 않습니다.

use std::collections::{HashMap, HashSet};

use chrono::TimeDelta;
use tracing::debug;

use logscope_core::metrics as m;
use logscope_core::types::{CorrelationLink, Level, LogEntry, RelationType};

use crate::config::AnalysisConfig;

/// 상관관계 설정
#[derive(Debug, Clone)]
pub struct CorrelationSettings {
    pub identifier_keys: Vec<String>,
    pub tolerance: TimeDelta,
    pub min_confidence: f64,
    pub temporal_levels: Vec<Level>,
    /// 소스 쌍 하나에서 만들 수 있는 최대 링크 수
    pub max_links: usize,
}

impl CorrelationSettings {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            identifier_keys: config.correlation_identifier_keys.clone(),
            tolerance: config.temporal_tolerance(),
            min_confidence: config.temporal_min_confidence,
            temporal_levels: config.temporal_levels.clone(),
            max_links: config.max_links_per_pair,
        }
    }
}

/// 소스 쌍 하나의 상관관계 결과
#[derive(Debug, Clone, Default)]
pub struct PairOutcome {
    pub links: Vec<CorrelationLink>,
    /// 링크 상한에 도달하여 일부 링크가 생략됨
    pub truncated: bool,
}

/// 상관관계 엔진
///
/// 상태가 없으므로 소스 쌍마다 병렬로 호출할 수 있습니다.
#[derive(Debug, Clone)]
pub struct Correlator {
    settings: CorrelationSettings,
}

impl Correlator {
    pub fn new(settings: CorrelationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CorrelationSettings {
        &self.settings
    }

    /// 두 소스 사이의 링크를 계산합니다.
    pub fn correlate_pair(&self, a: &[LogEntry], b: &[LogEntry]) -> PairOutcome {
        let mut outcome = PairOutcome::default();
        let mut linked: HashSet<(usize, usize)> = HashSet::new();

        self.shared_identifier_links(a, b, &mut linked, &mut outcome);
        if !outcome.truncated {
            self.temporal_links(a, b, &linked, &mut outcome);
        }

        if outcome.truncated {
            debug!(
                cap = self.settings.max_links,
                "correlation link cap reached for source pair"
            );
        }
        outcome
    }

    fn push(&self, outcome: &mut PairOutcome, link: CorrelationLink) -> bool {
        if outcome.links.len() >= self.settings.max_links {
            outcome.truncated = true;
            return false;
        }
        let relation = match link.relation_type {
            RelationType::SharedIdentifier => "shared_identifier",
            RelationType::TemporalProximity => "temporal_proximity",
        };
        metrics::counter!(m::LINKS_EMITTED_TOTAL, m::LABEL_RELATION => relation).increment(1);
        outcome.links.push(link);
        true
    }

    fn shared_identifier_links(
        &self,
        a: &[LogEntry],
        b: &[LogEntry],
        linked: &mut HashSet<(usize, usize)>,
        outcome: &mut PairOutcome,
    ) {
        if self.settings.identifier_keys.is_empty() {
            return;
        }

        let mut index: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
        for (j, entry) in b.iter().enumerate() {
            for key in &self.settings.identifier_keys {
                if let Some(value) = entry.field(key) {
                    index.entry((key.as_str(), value)).or_default().push(j);
                }
            }
        }
        if index.is_empty() {
            return;
        }

        for (i, left) in a.iter().enumerate() {
            for key in &self.settings.identifier_keys {
                let Some(value) = left.field(key) else {
                    continue;
                };
                let Some(matches) = index.get(&(key.as_str(), value)) else {
                    continue;
                };
                for &j in matches {
                    if !linked.insert((i, j)) {
                        continue;
                    }
                    let link = CorrelationLink::new(
                        left.id(),
                        b[j].id(),
                        RelationType::SharedIdentifier,
                        1.0,
                        format!("{key}={value}"),
                    );
                    if !self.push(outcome, link) {
                        return;
                    }
                }
            }
        }
    }

    fn temporal_links(
        &self,
        a: &[LogEntry],
        b: &[LogEntry],
        linked: &HashSet<(usize, usize)>,
        outcome: &mut PairOutcome,
    ) {
        let levels = &self.settings.temporal_levels;
        if levels.is_empty() {
            return;
        }
        let tolerance = self.settings.tolerance;
        let tolerance_ms = tolerance.num_milliseconds();

        let mut candidates: Vec<(chrono::DateTime<chrono::Utc>, usize)> = b
            .iter()
            .enumerate()
            .filter(|(_, e)| levels.contains(&e.level))
            .filter_map(|(j, e)| e.timestamp.map(|ts| (ts, j)))
            .collect();
        if candidates.is_empty() {
            return;
        }
        candidates.sort();

        for (i, left) in a.iter().enumerate() {
            if !levels.contains(&left.level) {
                continue;
            }
            let Some(ts) = left.timestamp else {
                continue;
            };
            let lower = ts - tolerance;
            let upper = ts + tolerance;
            let start = candidates.partition_point(|(t, _)| *t < lower);

            for &(other_ts, j) in candidates[start..].iter().take_while(|(t, _)| *t <= upper) {
                let right = &b[j];
                if right.level != left.level || linked.contains(&(i, j)) {
                    continue;
                }
                let delta_ms = (ts - other_ts).num_milliseconds().abs();
                let confidence = if tolerance_ms == 0 {
                    1.0
                } else {
                    1.0 - delta_ms as f64 / tolerance_ms as f64
                };
                if confidence < self.settings.min_confidence {
                    continue;
                }
                let link = CorrelationLink::new(
                    left.id(),
                    right.id(),
                    RelationType::TemporalProximity,
                    confidence,
                    format!("delta={delta_ms}ms"),
                );
                if !self.push(outcome, link) {
                    return;
                }
            }
        }
    }
}

/// `n`개 소스의 모든 비순서 쌍 인덱스
pub fn source_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect()
}
