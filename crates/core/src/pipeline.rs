//! 플러그인 capability trait
//!
//! 분석 코어가 선택적으로 호출하는 외부 기능을 정의합니다.
//! 모든 capability는 없어도 코어가 동작하도록 기본 동작(no-op 또는 통계 전용)을 가집니다.
//!
//! - [`NotificationSink`]: 알림 이벤트 전달 (Slack, Jira 등은 호출자가 구현)
//! - [`AnomalyScorer`]: 시간 창 점수 계산 모델 교체
//! - [`CommentaryGenerator`]: 분석 결과에 대한 자연어 코멘터리

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::PluginError;
use crate::types::{AlertEvent, AnalysisSummary, LogEntry};

/// dyn-compatible 비동기 반환 타입
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 알림 이벤트 전달 capability
///
/// 전달 실패는 경고로 기록되며 이벤트는 결과 객체에 그대로 남습니다.
pub trait NotificationSink: Send + Sync {
    /// sink 이름 (경고 메시지에 사용)
    fn name(&self) -> &str;

    /// 이벤트 하나를 전달합니다.
    fn deliver<'a>(&'a self, event: &'a AlertEvent) -> BoxFuture<'a, Result<(), PluginError>>;
}

/// 점수 계산에 전달되는 시간 창 샘플
#[derive(Debug, Clone, Copy)]
pub struct WindowSample<'a> {
    pub metric_name: &'a str,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// 이 창의 관측값 (엔트리 수)
    pub observed: f64,
    /// 직전 창들의 관측값 (오래된 것부터)
    pub history: &'a [f64],
}

/// 시간 창 이상 점수 모델
///
/// 구현체는 점수만 반환합니다. 임계값 비교와 콜드 스타트 억제는 탐지기가 담당합니다.
/// 실패 시 탐지기는 내장 통계 점수로 대체하고 결과에 degraded 플래그를 설정합니다.
pub trait AnomalyScorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, sample: &WindowSample<'_>) -> Result<f64, PluginError>;
}

/// 자연어 코멘터리 생성 capability
pub trait CommentaryGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// 엔트리 샘플과 요약으로 코멘터리를 생성합니다. 생성할 내용이 없으면 `None`.
    fn generate<'a>(
        &'a self,
        entries: &'a [LogEntry],
        summaries: &'a [AnalysisSummary],
    ) -> BoxFuture<'a, Result<Option<String>, PluginError>>;
}

/// 기본 코멘터리 생성기 (항상 `None`)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommentary;

impl CommentaryGenerator for NoCommentary {
    fn name(&self) -> &str {
        "none"
    }

    fn generate<'a>(
        &'a self,
        _entries: &'a [LogEntry],
        _summaries: &'a [AnalysisSummary],
    ) -> BoxFuture<'a, Result<Option<String>, PluginError>> {
        Box::pin(async { Ok(None) })
    }
}
