//! 알림 전달 -- 발화한 이벤트를 외부 알림 sink로 넘깁니다.
//!
//! [`AlertDispatcher`]는 선택적인 [`NotificationSink`]에 이벤트를 전달합니다.
//! 전달 실패나 시간 초과는 분석을 중단하지 않고 경고로 기록되며,
//! 이벤트 자체는 결과에 그대로 남습니다.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use logscope_core::metrics as m;
use logscope_core::pipeline::NotificationSink;
use logscope_core::types::AlertEvent;

use crate::report::{AnalysisWarning, Stage};

/// sink 한 번 호출의 최대 대기 시간
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// 소스 하나의 알림 전달기
pub struct AlertDispatcher {
    source_id: String,
    sink: Option<Arc<dyn NotificationSink>>,
    timeout: Duration,
    delivered: u64,
    failed: u64,
    warnings: Vec<AnalysisWarning>,
}

impl AlertDispatcher {
    /// 새 전달기를 만듭니다. sink가 없으면 전달을 건너뜁니다.
    pub fn new(source_id: impl Into<String>, sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self {
            source_id: source_id.into(),
            sink,
            timeout: DELIVERY_TIMEOUT,
            delivered: 0,
            failed: 0,
            warnings: Vec::new(),
        }
    }

    /// 전달 대기 시간을 변경합니다.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 이벤트를 sink로 전달합니다. 실패는 경고로만 기록됩니다.
    pub async fn dispatch(&mut self, event: &AlertEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        let name = sink.name().to_owned();

        let reason = match tokio::time::timeout(self.timeout, sink.deliver(event)).await {
            Ok(Ok(())) => {
                self.delivered += 1;
                debug!(sink = %name, rule_id = %event.rule_id, "alert delivered");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("delivery timed out after {}ms", self.timeout.as_millis()),
        };

        self.failed += 1;
        metrics::counter!(m::PLUGIN_FAILURES_TOTAL, m::LABEL_PLUGIN => name.clone())
            .increment(1);
        warn!(
            sink = %name,
            rule_id = %event.rule_id,
            error = %reason,
            "alert delivery failed"
        );
        self.warnings.push(AnalysisWarning::new(
            Stage::Notification,
            Some(&self.source_id),
            format!("sink '{name}' failed for alert {}: {reason}", event.id),
        ));
    }

    /// 성공적으로 전달된 이벤트 수
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// 전달에 실패한 이벤트 수
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// 전달 실패가 있었는지 여부
    pub fn degraded(&self) -> bool {
        self.failed > 0
    }

    /// 누적된 경고를 꺼냅니다.
    pub fn take_warnings(&mut self) -> Vec<AnalysisWarning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use chrono::Utc;
    use logscope_core::error::PluginError;
    use logscope_core::pipeline::BoxFuture;
    use uuid::Uuid;

    use super::*;

    fn event() -> AlertEvent {
        AlertEvent {
            id: Uuid::nil(),
            rule_id: "db".to_owned(),
            rule_title: "db".to_owned(),
            source_id: "app.log".to_owned(),
            triggered_at: Utc::now(),
            matched_entry_ids: Vec::new(),
        }
    }

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicU64,
    }

    impl NotificationSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        fn deliver<'a>(&'a self, _event: &'a AlertEvent) -> BoxFuture<'a, Result<(), PluginError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver<'a>(&'a self, _event: &'a AlertEvent) -> BoxFuture<'a, Result<(), PluginError>> {
            Box::pin(async move {
                Err(PluginError::Failed {
                    plugin: "failing".to_owned(),
                    reason: "webhook returned 500".to_owned(),
                })
            })
        }
    }

    struct HangingSink;

    impl NotificationSink for HangingSink {
        fn name(&self) -> &str {
            "hanging"
        }

        fn deliver<'a>(&'a self, _event: &'a AlertEvent) -> BoxFuture<'a, Result<(), PluginError>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn delivers_to_sink() {
        let sink = Arc::new(CountingSink::default());
        let mut d = AlertDispatcher::new("app.log", Some(sink.clone()));
        d.dispatch(&event()).await;
        d.dispatch(&event()).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(d.delivered(), 2);
        assert!(!d.degraded());
    }

    #[tokio::test]
    async fn no_sink_is_a_no_op() {
        let mut d = AlertDispatcher::new("app.log", None);
        d.dispatch(&event()).await;
        assert_eq!(d.delivered(), 0);
        assert!(d.take_warnings().is_empty());
    }

    #[tokio::test]
    async fn failure_becomes_warning() {
        let mut d = AlertDispatcher::new("app.log", Some(Arc::new(FailingSink)));
        d.dispatch(&event()).await;
        assert!(d.degraded());
        let warnings = d.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].stage, Stage::Notification);
        assert!(warnings[0].message.contains("webhook returned 500"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_sink_times_out() {
        let mut d = AlertDispatcher::new("app.log", Some(Arc::new(HangingSink)))
            .with_timeout(Duration::from_millis(50));
        d.dispatch(&event()).await;
        assert_eq!(d.failed(), 1);
        assert!(d.take_warnings()[0].message.contains("timed out"));
    }
}
