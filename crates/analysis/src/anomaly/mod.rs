//! 이상 탐지기 -- 고정 시간 창 집계와 기준선 비교
//!
//! 엔트리를 epoch 기준으로 정렬된 고정 크기 창에 집계하고, 창이 닫힐 때마다
//! 직전 N개 창의 기준선과 비교하여 [`AnomalyWindow`]를 만듭니다.
//!
//! # 시계열
//! - `entries_total`: 모든 타임스탬프 엔트리 수
//! - `entries_<level>`: `anomaly_levels`에 포함된 레벨별 엔트리 수
//!
//! 타임스탬프가 없는 엔트리는 집계하지 않고 세기만 합니다.
//! 현재 창보다 이른 엔트리(late)도 집계하지 않고 세기만 합니다.

pub mod baseline;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use logscope_core::metrics as m;
use logscope_core::pipeline::{AnomalyScorer, WindowSample};
use logscope_core::types::{AnomalyWindow, Level, LogEntry};

use crate::config::AnalysisConfig;
use crate::report::{AnalysisWarning, Stage};

pub use baseline::{BaselineStats, DEFAULT_MIN_STDDEV, ZScoreScorer};

/// 0으로 채울 수 있는 최대 빈 창 수 (초과하면 기준선을 리셋)
pub const MAX_GAP_WINDOWS: i64 = 1440;

/// 전체 엔트리 시계열 이름
pub const TOTAL_SERIES: &str = "entries_total";

/// 이상 탐지 설정
#[derive(Debug, Clone)]
pub struct AnomalySettings {
    pub window_secs: i64,
    pub history: usize,
    pub min_history: usize,
    pub threshold: f64,
    pub levels: Vec<Level>,
}

impl AnomalySettings {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            window_secs: i64::try_from(config.window_size_secs)
                .unwrap_or(i64::MAX)
                .max(1),
            history: config.baseline_history.max(1),
            min_history: config.min_baseline_windows,
            threshold: config.anomaly_threshold,
            levels: config.anomaly_levels.clone(),
        }
    }
}

#[derive(Debug)]
struct Series {
    metric_name: String,
    level: Option<Level>,
    count: u64,
    history: VecDeque<f64>,
}

impl Series {
    fn new(metric_name: String, level: Option<Level>, capacity: usize) -> Self {
        Self {
            metric_name,
            level,
            count: 0,
            history: VecDeque::with_capacity(capacity),
        }
    }

    fn accepts(&self, level: Level) -> bool {
        self.level.is_none_or(|l| l == level)
    }
}

/// 소스 하나의 이상 탐지 상태
pub struct AnomalyDetector {
    source_id: String,
    settings: AnomalySettings,
    series: Vec<Series>,
    /// 현재 열린 창의 인덱스 (`timestamp / window_secs`)
    current: Option<i64>,
    scorer: Option<Arc<dyn AnomalyScorer>>,
    builtin: ZScoreScorer,
    late_entries: u64,
    untimestamped: u64,
    warnings: Vec<AnalysisWarning>,
    degraded: bool,
}

impl AnomalyDetector {
    /// 내장 점수 모델만 사용하는 탐지기를 생성합니다.
    pub fn new(source_id: impl Into<String>, settings: AnomalySettings) -> Self {
        let mut series = vec![Series::new(
            TOTAL_SERIES.to_owned(),
            None,
            settings.history,
        )];
        for level in &settings.levels {
            if series.iter().any(|s| s.level == Some(*level)) {
                continue;
            }
            series.push(Series::new(
                format!("entries_{}", level.as_str().to_lowercase()),
                Some(*level),
                settings.history,
            ));
        }

        Self {
            source_id: source_id.into(),
            settings,
            series,
            current: None,
            scorer: None,
            builtin: ZScoreScorer::default(),
            late_entries: 0,
            untimestamped: 0,
            warnings: Vec::new(),
            degraded: false,
        }
    }

    /// 외부 점수 모델을 설정합니다. 실패하면 내장 모델로 대체됩니다.
    pub fn with_scorer(mut self, scorer: Option<Arc<dyn AnomalyScorer>>) -> Self {
        self.scorer = scorer;
        self
    }

    /// 엔트리 하나를 집계합니다. 이 엔트리로 인해 닫힌 창의 결과를 반환합니다.
    pub fn observe(&mut self, entry: &LogEntry) -> Vec<AnomalyWindow> {
        let mut closed = Vec::new();
        let Some(ts) = entry.timestamp else {
            self.untimestamped += 1;
            return closed;
        };
        let idx = ts.timestamp().div_euclid(self.settings.window_secs);

        match self.current {
            None => self.current = Some(idx),
            Some(cur) if idx < cur => {
                self.late_entries += 1;
                return closed;
            }
            Some(cur) if idx > cur => {
                self.close_window(cur, &mut closed);
                let gap = idx - cur - 1;
                if gap > MAX_GAP_WINDOWS {
                    warn!(
                        source = %self.source_id,
                        gap,
                        "timestamp gap too large, resetting anomaly baseline"
                    );
                    self.warnings.push(AnalysisWarning::new(
                        Stage::Anomaly,
                        Some(&self.source_id),
                        format!(
                            "gap of {gap} empty windows exceeds {MAX_GAP_WINDOWS}; baseline reset"
                        ),
                    ));
                    for series in &mut self.series {
                        series.history.clear();
                    }
                } else {
                    for empty in (cur + 1)..idx {
                        self.close_window(empty, &mut closed);
                    }
                }
                self.current = Some(idx);
            }
            Some(_) => {}
        }

        for series in &mut self.series {
            if series.accepts(entry.level) {
                series.count += 1;
            }
        }
        closed
    }

    /// 열린 창을 닫고 결과를 반환합니다.
    pub fn finish(&mut self) -> Vec<AnomalyWindow> {
        let mut closed = Vec::new();
        if let Some(cur) = self.current.take() {
            self.close_window(cur, &mut closed);
        }
        closed
    }

    /// 현재 창보다 늦게 도착하여 집계되지 않은 엔트리 수
    pub fn late_entries(&self) -> u64 {
        self.late_entries
    }

    /// 타임스탬프가 없어 집계되지 않은 엔트리 수
    pub fn untimestamped(&self) -> u64 {
        self.untimestamped
    }

    /// 외부 점수 모델 실패로 내장 모델을 사용했는지 여부
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// 누적된 경고를 꺼냅니다.
    pub fn take_warnings(&mut self) -> Vec<AnalysisWarning> {
        std::mem::take(&mut self.warnings)
    }

    fn window_bounds(&self, idx: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let secs = self.settings.window_secs;
        let start = DateTime::from_timestamp(idx.saturating_mul(secs), 0).unwrap_or_default();
        let end = DateTime::from_timestamp(idx.saturating_add(1).saturating_mul(secs), 0)
            .unwrap_or(start);
        (start, end)
    }

    fn close_window(&mut self, idx: i64, out: &mut Vec<AnomalyWindow>) {
        let (window_start, window_end) = self.window_bounds(idx);

        for i in 0..self.series.len() {
            let observed = self.series[i].count as f64;
            let metric_name = self.series[i].metric_name.clone();
            let history: Vec<f64> = self.series[i].history.iter().copied().collect();
            let stats = BaselineStats::from_history(&history);

            let (score, scorer) = match self.score(&WindowSample {
                metric_name: &metric_name,
                window_start,
                window_end,
                observed,
                history: &history,
            }) {
                (Ok(score), name) => (score, name),
                (Err(reason), name) => {
                    self.record_scorer_failure(&name, &reason);
                    (self.builtin.score_with(observed, &stats), self.builtin_name())
                }
            };
            let is_anomalous = history.len() >= self.settings.min_history
                && score > self.settings.threshold;

            if is_anomalous {
                metrics::counter!(m::ANOMALIES_FLAGGED_TOTAL).increment(1);
                debug!(
                    source = %self.source_id,
                    metric = %metric_name,
                    observed,
                    score,
                    "anomalous window"
                );
            }

            out.push(AnomalyWindow {
                window_start,
                window_end,
                metric_name,
                observed_value: observed,
                baseline_mean: stats.mean,
                baseline_stddev: stats.stddev,
                score,
                is_anomalous,
                history_len: history.len(),
                scorer,
            });

            let series = &mut self.series[i];
            if series.history.len() == self.settings.history {
                series.history.pop_front();
            }
            series.history.push_back(observed);
            series.count = 0;
        }
    }

    /// 외부 모델이 있으면 그 모델로, 없으면 내장 모델로 점수를 계산합니다.
    fn score(&self, sample: &WindowSample<'_>) -> (Result<f64, String>, String) {
        match &self.scorer {
            Some(scorer) => {
                let name = scorer.name().to_owned();
                let result = match scorer.score(sample) {
                    Ok(v) if v.is_finite() => Ok(v),
                    Ok(v) => Err(format!("non-finite score {v}")),
                    Err(e) => Err(e.to_string()),
                };
                (result, name)
            }
            None => {
                let stats = BaselineStats::from_history(sample.history);
                (
                    Ok(self.builtin.score_with(sample.observed, &stats)),
                    self.builtin_name(),
                )
            }
        }
    }

    fn record_scorer_failure(&mut self, scorer: &str, reason: &str) {
        metrics::counter!(m::PLUGIN_FAILURES_TOTAL, m::LABEL_PLUGIN => scorer.to_owned())
            .increment(1);
        if !self.degraded {
            warn!(
                source = %self.source_id,
                scorer,
                reason,
                "anomaly scorer failed, falling back to built-in model"
            );
        }
        self.degraded = true;
        self.warnings.push(AnalysisWarning::new(
            Stage::Anomaly,
            Some(&self.source_id),
            format!("scorer '{scorer}' failed: {reason}; used built-in z-score"),
        ));
    }

    fn builtin_name(&self) -> String {
        self.builtin.name().to_owned()
    }
}
