//! 기준선 추정과 내장 점수 모델
//!
//! 기준선은 직전 N개 창의 단순 이동 평균과 모표준편차입니다.
//! 점수는 `|관측값 - 평균| / max(표준편차, min_stddev)`인 z-score 크기입니다.

use logscope_core::error::PluginError;
use logscope_core::pipeline::{AnomalyScorer, WindowSample};

/// 표준편차 하한 (분산이 0인 이력에서 0으로 나누는 것을 막음)
pub const DEFAULT_MIN_STDDEV: f64 = 1.0;

/// 이력에서 계산한 기준선
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineStats {
    pub mean: f64,
    pub stddev: f64,
}

impl BaselineStats {
    /// 단순 이동 평균과 모표준편차를 계산합니다. 이력이 없으면 0입니다.
    pub fn from_history(history: &[f64]) -> Self {
        if history.is_empty() {
            return Self {
                mean: 0.0,
                stddev: 0.0,
            };
        }
        let n = history.len() as f64;
        let mean = history.iter().sum::<f64>() / n;
        let variance = history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            stddev: variance.sqrt(),
        }
    }
}

/// 내장 z-score 점수 모델
#[derive(Debug, Clone, Copy)]
pub struct ZScoreScorer {
    min_stddev: f64,
}

impl ZScoreScorer {
    pub fn new(min_stddev: f64) -> Self {
        Self {
            min_stddev: if min_stddev.is_finite() && min_stddev > 0.0 {
                min_stddev
            } else {
                DEFAULT_MIN_STDDEV
            },
        }
    }

    /// 이미 계산된 기준선으로 점수를 계산합니다.
    pub fn score_with(&self, observed: f64, stats: &BaselineStats) -> f64 {
        (observed - stats.mean).abs() / stats.stddev.max(self.min_stddev)
    }
}

impl Default for ZScoreScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_STDDEV)
    }
}

impl AnomalyScorer for ZScoreScorer {
    fn name(&self) -> &str {
        "zscore"
    }

    fn score(&self, sample: &WindowSample<'_>) -> Result<f64, PluginError> {
        let stats = BaselineStats::from_history(sample.history);
        Ok(self.score_with(sample.observed, &stats))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn empty_history_is_zero() {
        let stats = BaselineStats::from_history(&[]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn mean_and_population_stddev() {
        let stats = BaselineStats::from_history(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((stats.mean - 5.0).abs() < 1e-9);
        assert!((stats.stddev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn flat_history_uses_stddev_floor() {
        let scorer = ZScoreScorer::default();
        let stats = BaselineStats::from_history(&[10.0; 5]);
        assert_eq!(scorer.score_with(10.0, &stats), 0.0);
        assert_eq!(scorer.score_with(100.0, &stats), 90.0);
    }

    #[test]
    fn invalid_floor_falls_back_to_default() {
        let scorer = ZScoreScorer::new(f64::NAN);
        let stats = BaselineStats::from_history(&[3.0; 4]);
        assert_eq!(scorer.score_with(5.0, &stats), 2.0);
    }

    #[test]
    fn trait_score_matches_direct_score() {
        let scorer = ZScoreScorer::default();
        let history = [8.0, 10.0, 12.0];
        let now = Utc::now();
        let sample = WindowSample {
            metric_name: "entries_total",
            window_start: now,
            window_end: now,
            observed: 20.0,
            history: &history,
        };
        let stats = BaselineStats::from_history(&history);
        assert_eq!(
            scorer.score(&sample).unwrap(),
            scorer.score_with(20.0, &stats)
        );
        assert_eq!(scorer.name(), "zscore");
    }
}
