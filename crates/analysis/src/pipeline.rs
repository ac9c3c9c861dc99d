//! 파이프라인 오케스트레이션 -- 소스별 분석 run과 교차 소스 단계를 관리합니다.
//!
//! # 내부 아키텍처
//! ```text
//!                         +--> pattern stage (템플릿 + 요약) --+
//! lines -> Tokenizer -> Classifier --> anomaly stage ----------+--> SourceReport
//!   (mpsc, Bytes)         +--> alert stage (규칙 + sink) -------+
//!
//! SourceReport x N --(join)--> Correlator (소스 쌍별 병렬) --> Commentary --> AnalysisReport
//! ```
//!
//! - 소스 하나의 토크나이저/분류기 체인이 하나의 run이며, [`WorkerPool`]이 동시 run 수를 제한합니다.
//! - 단계 사이 채널은 모두 bounded입니다. 하위 단계가 느리면 토크나이저가 라인 읽기를 멈춥니다.
//! - 패턴/이상 탐지 상태는 run이 배타적으로 소유합니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use logscope_core::config::SaturationPolicy;
use logscope_core::metrics as m;
use logscope_core::pipeline::{
    AnomalyScorer, CommentaryGenerator, NoCommentary, NotificationSink,
};
use logscope_core::types::{
    AlertEvent, AnalysisSummary, AnomalyWindow, CorrelationLink, Level, LogEntry, TemplateId,
};

use crate::alert::AlertDispatcher;
use crate::anomaly::{AnomalyDetector, AnomalySettings};
use crate::classifier::LevelClassifier;
use crate::config::AnalysisConfig;
use crate::correlation::{CorrelationSettings, Correlator, source_pairs};
use crate::error::AnalysisError;
use crate::pattern::{Masker, PatternDetector, RECURRING_TEMPLATE_LIMIT, recurring_templates};
use crate::pool::WorkerPool;
use crate::report::{AnalysisReport, AnalysisWarning, SourceReport, Stage};
use crate::rule::{AlertEvaluator, AlertRule, RuleSet};
use crate::summary::{ExceptionTypes, SummaryBuilder};
use crate::tokenizer::{FormatSet, LineTokenizer};

/// 코멘터리 생성기에 넘기는 ERROR 엔트리 샘플 최대 수
pub const COMMENTARY_SAMPLE_LIMIT: usize = 50;

/// 코멘터리 생성 최대 대기 시간
pub const COMMENTARY_TIMEOUT: Duration = Duration::from_secs(30);

/// 라인 입력 소스
///
/// 업로드 핸들러나 live-tail watcher가 채널로 라인을 공급합니다.
/// 송신측이 모두 drop되면 입력 종료로 간주합니다.
#[derive(Debug)]
pub struct LineSource {
    source_id: String,
    lines: mpsc::Receiver<Bytes>,
}

impl LineSource {
    pub fn new(source_id: impl Into<String>, lines: mpsc::Receiver<Bytes>) -> Self {
        Self {
            source_id: source_id.into(),
            lines,
        }
    }

    /// 메모리에 있는 라인 목록으로 소스를 만듭니다.
    pub fn from_lines<I, L>(source_id: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Bytes>,
    {
        let lines: Vec<Bytes> = lines.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            if tx.try_send(line).is_err() {
                break;
            }
        }
        Self::new(source_id, rx)
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

/// 스트리밍 세션에서 실시간으로 전달되는 이벤트
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// 완성되어 분류된 엔트리
    Entry(LogEntry),
    /// 발화한 알림
    Alert(AlertEvent),
    /// 이상으로 판정된 시간 창
    Anomaly(AnomalyWindow),
}

/// 스트리밍 세션 핸들
///
/// `events`를 읽지 않으면 backpressure로 토크나이저가 멈춥니다.
/// 세션이 끝나면 `join`이 최종 [`SourceReport`]를 반환합니다 (엔트리는 보관하지 않음).
#[derive(Debug)]
pub struct StreamHandle {
    pub events: mpsc::Receiver<StreamEvent>,
    pub join: JoinHandle<Result<SourceReport, AnalysisError>>,
}

/// 빌드가 끝난 불변 엔진 상태 (run 간 공유)
struct EngineInner {
    config: AnalysisConfig,
    classifier: LevelClassifier,
    formats: Arc<FormatSet>,
    masker: Masker,
    exception_types: ExceptionTypes,
    rules: Arc<RuleSet>,
    anomaly: AnomalySettings,
    correlator: Correlator,
    sink: Option<Arc<dyn NotificationSink>>,
    scorer: Option<Arc<dyn AnomalyScorer>>,
    commentary: Arc<dyn CommentaryGenerator>,
    pool: WorkerPool,
}

/// 분석 엔진
///
/// 구성이 잘못되었으면 [`AnalysisEngineBuilder::build`]에서 실패하므로,
/// 만들어진 엔진은 항상 실행 가능한 상태입니다. 복제 비용이 낮습니다.
///
/// # 사용 예시
/// ```ignore
/// let engine = AnalysisEngineBuilder::new()
///     .config(config)
///     .rules(rules)
///     .build()?;
///
/// let report = engine
///     .analyze(vec![LineSource::from_lines("app.log", lines)])
///     .await?;
/// ```
#[derive(Clone)]
pub struct AnalysisEngine {
    inner: Arc<EngineInner>,
}

impl AnalysisEngine {
    /// 엔진 설정
    pub fn config(&self) -> &AnalysisConfig {
        &self.inner.config
    }

    /// 등록된 알림 규칙 수
    pub fn rule_count(&self) -> usize {
        self.inner.rules.len()
    }

    /// 등록된 라인 형식 이름 (시도 순서대로)
    pub fn registered_formats(&self) -> Vec<&str> {
        self.inner.formats.registered_formats()
    }

    /// 워커 풀
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// 유한한 소스 목록을 분석합니다.
    pub async fn analyze(&self, sources: Vec<LineSource>) -> Result<AnalysisReport, AnalysisError> {
        self.analyze_with_cancel(sources, CancellationToken::new())
            .await
    }

    /// 취소 가능한 분석을 실행합니다.
    ///
    /// 취소되면 [`AnalysisError::Cancelled`]를 반환합니다.
    /// `Reject` 정책에서 소스 수가 빈 슬롯 수보다 많으면 작업을 시작하기 전에 실패합니다.
    pub async fn analyze_with_cancel(
        &self,
        sources: Vec<LineSource>,
        cancel: CancellationToken,
    ) -> Result<AnalysisReport, AnalysisError> {
        let run_id = Uuid::new_v4();
        let mut seen = HashSet::with_capacity(sources.len());
        for source in &sources {
            if !seen.insert(source.source_id.as_str()) {
                return Err(AnalysisError::Config {
                    field: "source_id".to_owned(),
                    reason: format!("duplicate source id '{}'", source.source_id),
                });
            }
        }

        let count = sources.len();
        let permits = self.reserve(count)?;
        info!(%run_id, sources = count, "analysis started");

        let mut tasks = JoinSet::new();
        for (idx, (source, permit)) in sources.into_iter().zip(permits).enumerate() {
            let inner = Arc::clone(&self.inner);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = match permit {
                    Some(permit) => permit,
                    None => inner.pool.acquire().await?,
                };
                run_source(inner, source, cancel, None)
                    .await
                    .map(|report| (idx, report))
            });
        }

        let mut slots: Vec<Option<SourceReport>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (idx, report) = joined.map_err(|e| AnalysisError::Join(e.to_string()))??;
            slots[idx] = Some(report);
        }
        if cancel.is_cancelled() {
            info!(%run_id, "analysis cancelled");
            return Err(AnalysisError::Cancelled);
        }
        let mut sources: Vec<SourceReport> = slots.into_iter().flatten().collect();

        let recurring_templates = recurring_templates(&sources, RECURRING_TEMPLATE_LIMIT);
        let mut warnings = Vec::new();
        let (links, correlation_degraded) = self.correlate(&mut sources, &mut warnings).await;
        let (commentary, commentary_degraded) = self.commentary(&sources, &mut warnings).await;

        let degraded = correlation_degraded
            || commentary_degraded
            || sources.iter().any(|s| s.degraded);
        info!(
            %run_id,
            sources = sources.len(),
            links = links.len(),
            recurring_templates = recurring_templates.len(),
            alerts = sources.iter().map(|s| s.alerts.len()).sum::<usize>(),
            degraded,
            "analysis complete"
        );

        Ok(AnalysisReport {
            run_id,
            sources,
            links,
            recurring_templates,
            commentary,
            warnings,
            degraded,
        })
    }

    /// 무한할 수 있는 소스 하나를 스트리밍으로 분석합니다.
    ///
    /// 워커 풀 슬롯을 얻은 뒤 세션을 시작합니다. `cancel`이 신호되면
    /// 다음 라인 읽기 경계에서 멈추고 보류 중인 엔트리를 집계한 뒤 종료합니다.
    /// 취소 이후의 이벤트는 전달되지 않으므로 `events`를 읽지 않고 있어도 세션은 끝납니다.
    pub async fn stream(
        &self,
        source: LineSource,
        cancel: CancellationToken,
    ) -> Result<StreamHandle, AnalysisError> {
        let permit = self.inner.pool.acquire().await?;
        let (tx, rx) = mpsc::channel(self.inner.config.stage_channel_capacity);
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            let _permit = permit;
            run_source(inner, source, cancel, Some(tx)).await
        });
        Ok(StreamHandle { events: rx, join })
    }

    fn reserve(&self, count: usize) -> Result<Vec<Option<OwnedSemaphorePermit>>, AnalysisError> {
        let pool = &self.inner.pool;
        match pool.policy() {
            SaturationPolicy::Reject => {
                let mut permits = Vec::with_capacity(count);
                for _ in 0..count {
                    permits.push(Some(pool.try_acquire()?));
                }
                Ok(permits)
            }
            SaturationPolicy::Queue => Ok((0..count).map(|_| None).collect()),
        }
    }

    async fn correlate(
        &self,
        sources: &mut [SourceReport],
        warnings: &mut Vec<AnalysisWarning>,
    ) -> (Vec<CorrelationLink>, bool) {
        let mut links = Vec::new();
        let mut degraded = false;
        if sources.len() < 2 {
            return (links, degraded);
        }

        let sets: Vec<Arc<Vec<LogEntry>>> = sources
            .iter_mut()
            .map(|s| Arc::new(std::mem::take(&mut s.entries)))
            .collect();

        let mut tasks = JoinSet::new();
        for (i, j) in source_pairs(sets.len()) {
            let a = Arc::clone(&sets[i]);
            let b = Arc::clone(&sets[j]);
            let correlator = self.inner.correlator.clone();
            tasks.spawn_blocking(move || (i, j, correlator.correlate_pair(&a, &b)));
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(error = %e, "correlation task failed");
                    degraded = true;
                    warnings.push(AnalysisWarning::new(
                        Stage::Correlation,
                        None,
                        format!("correlation task failed: {e}"),
                    ));
                }
            }
        }
        outcomes.sort_by_key(|(i, j, _)| (*i, *j));

        let cap = self.inner.correlator.settings().max_links;
        for (i, j, outcome) in outcomes {
            if outcome.truncated {
                warnings.push(AnalysisWarning::new(
                    Stage::Correlation,
                    None,
                    format!(
                        "link cap {cap} reached between '{}' and '{}'; remaining links dropped",
                        sources[i].source_id, sources[j].source_id
                    ),
                ));
            }
            links.extend(outcome.links);
        }

        for (source, entries) in sources.iter_mut().zip(sets) {
            source.entries = Arc::try_unwrap(entries).unwrap_or_else(|shared| (*shared).clone());
        }
        debug!(links = links.len(), "correlation complete");
        (links, degraded)
    }

    async fn commentary(
        &self,
        sources: &[SourceReport],
        warnings: &mut Vec<AnalysisWarning>,
    ) -> (Option<String>, bool) {
        let generator = &self.inner.commentary;
        let sample: Vec<LogEntry> = sources
            .iter()
            .flat_map(|s| s.entries.iter())
            .filter(|e| e.level == Level::Error)
            .take(COMMENTARY_SAMPLE_LIMIT)
            .cloned()
            .collect();
        let summaries: Vec<AnalysisSummary> = sources.iter().map(|s| s.summary.clone()).collect();

        let reason =
            match tokio::time::timeout(COMMENTARY_TIMEOUT, generator.generate(&sample, &summaries))
                .await
            {
                Ok(Ok(text)) => return (text, false),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}s", COMMENTARY_TIMEOUT.as_secs()),
            };

        let name = generator.name().to_owned();
        metrics::counter!(m::PLUGIN_FAILURES_TOTAL, m::LABEL_PLUGIN => name.clone()).increment(1);
        warn!(generator = %name, error = %reason, "commentary generation failed");
        warnings.push(AnalysisWarning::new(
            Stage::Commentary,
            None,
            format!("commentary '{name}' failed: {reason}"),
        ));
        (None, true)
    }
}

/// 분석 엔진 빌더
///
/// 설정 검증, 형식/규칙 컴파일을 수행하여 잘못된 구성은 처리 시작 전에 실패합니다.
pub struct AnalysisEngineBuilder {
    config: AnalysisConfig,
    rules: Vec<AlertRule>,
    sink: Option<Arc<dyn NotificationSink>>,
    scorer: Option<Arc<dyn AnomalyScorer>>,
    commentary: Option<Arc<dyn CommentaryGenerator>>,
}

impl AnalysisEngineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
            rules: Vec::new(),
            sink: None,
            scorer: None,
            commentary: None,
        }
    }

    /// 분석 설정을 지정합니다.
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// 알림 규칙 목록을 지정합니다.
    pub fn rules(mut self, rules: Vec<AlertRule>) -> Self {
        self.rules = rules;
        self
    }

    /// 알림 규칙 하나를 추가합니다.
    pub fn rule(mut self, rule: AlertRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// 알림 전달 sink를 설정합니다. 없으면 이벤트는 결과에만 담깁니다.
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 외부 이상 점수 모델을 설정합니다. 없으면 내장 z-score를 사용합니다.
    pub fn anomaly_scorer(mut self, scorer: Arc<dyn AnomalyScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// 코멘터리 생성기를 설정합니다. 없으면 코멘터리를 만들지 않습니다.
    pub fn commentary(mut self, generator: Arc<dyn CommentaryGenerator>) -> Self {
        self.commentary = Some(generator);
        self
    }

    /// 엔진을 빌드합니다.
    pub fn build(self) -> Result<AnalysisEngine, AnalysisError> {
        self.config.validate()?;

        let classifier = LevelClassifier::new(&self.config.level_synonyms)?;
        let formats = FormatSet::compile(
            &self.config.formats,
            &classifier.known_tokens(),
            self.config.extract_key_values,
        )?;
        let masker = Masker::new()?;
        let exception_types = ExceptionTypes::new()?;
        let rules = RuleSet::new(self.rules)?;

        let inner = EngineInner {
            anomaly: AnomalySettings::from_config(&self.config),
            correlator: Correlator::new(CorrelationSettings::from_config(&self.config)),
            pool: WorkerPool::new(
                self.config.max_concurrent_runs,
                self.config.saturation_policy,
            ),
            commentary: self.commentary.unwrap_or_else(|| Arc::new(NoCommentary)),
            classifier,
            formats: Arc::new(formats),
            masker,
            exception_types,
            rules: Arc::new(rules),
            sink: self.sink,
            scorer: self.scorer,
            config: self.config,
        };
        info!(
            formats = inner.formats.registered_formats().len(),
            rules = inner.rules.len(),
            max_concurrent_runs = inner.pool.capacity(),
            "analysis engine built"
        );

        Ok(AnalysisEngine {
            inner: Arc::new(inner),
        })
    }
}

impl Default for AnalysisEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─── 소스 run ─────────────────────────────────────────────────────

/// 분류기에서 하위 단계로 가는 채널 묶음
struct StageSenders {
    pattern: mpsc::Sender<Arc<LogEntry>>,
    anomaly: mpsc::Sender<Arc<LogEntry>>,
    alert: mpsc::Sender<Arc<LogEntry>>,
    events: Option<mpsc::Sender<StreamEvent>>,
    cancel: CancellationToken,
}

impl StageSenders {
    /// 엔트리를 모든 단계로 보냅니다. 단계가 닫혔으면 `false`.
    async fn send(&self, entry: LogEntry) -> bool {
        metrics::counter!(
            m::ENTRIES_EMITTED_TOTAL,
            m::LABEL_LEVEL => entry.level.as_str(),
            m::LABEL_FORMAT => entry.format.clone().unwrap_or_else(|| "none".to_owned())
        )
        .increment(1);
        if !entry.is_parsed() {
            metrics::counter!(m::UNPARSED_ENTRIES_TOTAL).increment(1);
        }

        // 수신측이 없거나 읽지 않아도 분석은 계속합니다.
        publish(&self.events, StreamEvent::Entry(entry.clone()), &self.cancel).await;

        // 취소된 뒤 단계들은 발행을 버리고 계속 소비하므로 아래 송신은 막히지 않습니다.
        let entry = Arc::new(entry);
        self.pattern.send(Arc::clone(&entry)).await.is_ok()
            && self.anomaly.send(Arc::clone(&entry)).await.is_ok()
            && self.alert.send(entry).await.is_ok()
    }
}

/// 스트리밍 이벤트를 보냅니다. 취소된 뒤에는 보내지 않고 버립니다.
async fn publish(
    events: &Option<mpsc::Sender<StreamEvent>>,
    event: StreamEvent,
    cancel: &CancellationToken,
) {
    let Some(events) = events else {
        return;
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => {}
        _ = events.send(event) => {}
    }
}

struct PatternOutput {
    detector: PatternDetector,
    summary: SummaryBuilder,
    entries: Vec<Arc<LogEntry>>,
    entry_templates: Vec<TemplateId>,
}

struct AnomalyOutput {
    detector: AnomalyDetector,
    windows: Vec<AnomalyWindow>,
}

struct AlertOutput {
    dispatcher: AlertDispatcher,
    alerts: Vec<AlertEvent>,
}

async fn pattern_stage(
    mut rx: mpsc::Receiver<Arc<LogEntry>>,
    mut detector: PatternDetector,
    mut summary: SummaryBuilder,
    retain: bool,
) -> PatternOutput {
    let mut entries = Vec::new();
    let mut entry_templates = Vec::new();
    while let Some(entry) = rx.recv().await {
        let id = detector.observe(&entry);
        summary.observe(&entry);
        if retain {
            entry_templates.push(id);
            entries.push(entry);
        }
    }
    PatternOutput {
        detector,
        summary,
        entries,
        entry_templates,
    }
}

async fn anomaly_stage(
    mut rx: mpsc::Receiver<Arc<LogEntry>>,
    mut detector: AnomalyDetector,
    events: Option<mpsc::Sender<StreamEvent>>,
    cancel: CancellationToken,
) -> AnomalyOutput {
    let mut windows = Vec::new();
    while let Some(entry) = rx.recv().await {
        let closed = detector.observe(&entry);
        publish_windows(&events, &closed, &cancel).await;
        windows.extend(closed);
    }
    let closed = detector.finish();
    publish_windows(&events, &closed, &cancel).await;
    windows.extend(closed);
    AnomalyOutput { detector, windows }
}

async fn publish_windows(
    events: &Option<mpsc::Sender<StreamEvent>>,
    windows: &[AnomalyWindow],
    cancel: &CancellationToken,
) {
    for window in windows.iter().filter(|w| w.is_anomalous) {
        publish(events, StreamEvent::Anomaly(window.clone()), cancel).await;
    }
}

async fn alert_stage(
    mut rx: mpsc::Receiver<Arc<LogEntry>>,
    mut evaluator: AlertEvaluator,
    mut dispatcher: AlertDispatcher,
    events: Option<mpsc::Sender<StreamEvent>>,
    cancel: CancellationToken,
) -> AlertOutput {
    let mut alerts = Vec::new();
    while let Some(entry) = rx.recv().await {
        for event in evaluator.evaluate(&entry) {
            dispatcher.dispatch(&event).await;
            publish(&events, StreamEvent::Alert(event.clone()), &cancel).await;
            alerts.push(event);
        }
    }
    AlertOutput { dispatcher, alerts }
}

fn join_error(e: tokio::task::JoinError) -> AnalysisError {
    AnalysisError::Join(e.to_string())
}

/// 소스 하나를 끝까지(또는 취소될 때까지) 분석합니다.
///
/// `events`가 있으면 스트리밍 모드입니다: 엔트리를 보관하지 않고,
/// 유휴 flush를 사용하며, 취소되어도 부분 결과를 반환합니다.
async fn run_source(
    inner: Arc<EngineInner>,
    source: LineSource,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<StreamEvent>>,
) -> Result<SourceReport, AnalysisError> {
    let LineSource {
        source_id,
        mut lines,
    } = source;
    let streaming = events.is_some();
    let config = &inner.config;
    debug!(source = %source_id, streaming, "source run started");

    let capacity = config.stage_channel_capacity;
    let (pattern_tx, pattern_rx) = mpsc::channel(capacity);
    let (anomaly_tx, anomaly_rx) = mpsc::channel(capacity);
    let (alert_tx, alert_rx) = mpsc::channel(capacity);

    let pattern_task = tokio::spawn(pattern_stage(
        pattern_rx,
        PatternDetector::new(inner.masker.clone(), config.pattern_example_cap),
        SummaryBuilder::new(source_id.clone(), config.top_n, inner.exception_types.clone()),
        !streaming,
    ));
    let anomaly_task = tokio::spawn(anomaly_stage(
        anomaly_rx,
        AnomalyDetector::new(source_id.clone(), inner.anomaly.clone())
            .with_scorer(inner.scorer.clone()),
        events.clone(),
        cancel.clone(),
    ));
    let alert_task = tokio::spawn(alert_stage(
        alert_rx,
        AlertEvaluator::new(source_id.clone(), Arc::clone(&inner.rules)),
        AlertDispatcher::new(source_id.clone(), inner.sink.clone()),
        events.clone(),
        cancel.clone(),
    ));

    let stages = StageSenders {
        pattern: pattern_tx,
        anomaly: anomaly_tx,
        alert: alert_tx,
        events,
        cancel: cancel.clone(),
    };

    let mut tokenizer =
        LineTokenizer::new(source_id.clone(), Arc::clone(&inner.formats), config.max_entry_lines)
            .with_max_line_length(config.max_line_length);
    let idle = config.idle_flush();
    let mut cancelled = false;
    let mut stage_closed = false;

    loop {
        let completed = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            line = lines.recv() => match line {
                Some(line) => {
                    metrics::counter!(m::LINES_READ_TOTAL).increment(1);
                    tokenizer.push_line(&line)
                }
                None => break,
            },
            () = tokio::time::sleep(idle), if streaming && tokenizer.has_pending() => {
                tokenizer.flush()
            }
        };

        if let Some(entry) = completed
            && !stages.send(inner.classifier.classify(entry)).await
        {
            stage_closed = true;
            break;
        }
    }

    if !stage_closed && let Some(entry) = tokenizer.flush() {
        stages.send(inner.classifier.classify(entry)).await;
    }
    let total_lines = tokenizer.lines_read();
    let truncated = tokenizer.truncated_lines();
    drop(stages);

    let PatternOutput {
        detector: patterns,
        summary,
        entries,
        entry_templates,
    } = pattern_task.await.map_err(join_error)?;
    let AnomalyOutput {
        detector: mut anomaly,
        windows,
    } = anomaly_task.await.map_err(join_error)?;
    let AlertOutput {
        mut dispatcher,
        alerts,
    } = alert_task.await.map_err(join_error)?;

    let mut warnings = Vec::new();
    if truncated > 0 {
        warn!(
            source = %source_id,
            truncated,
            max_line_length = config.max_line_length,
            "over-long lines truncated"
        );
        warnings.push(AnalysisWarning::new(
            Stage::Tokenizer,
            Some(&source_id),
            format!(
                "{truncated} lines longer than {} bytes were truncated",
                config.max_line_length
            ),
        ));
    }
    warnings.extend(anomaly.take_warnings());
    warnings.extend(dispatcher.take_warnings());
    let degraded = anomaly.degraded() || dispatcher.degraded();
    let summary = summary.finish(total_lines, anomaly.late_entries(), &patterns);

    let entries: Vec<LogEntry> = entries
        .into_iter()
        .map(|entry| Arc::try_unwrap(entry).unwrap_or_else(|shared| (*shared).clone()))
        .collect();

    info!(
        source = %source_id,
        lines = total_lines,
        entries = summary.total_entries,
        templates = patterns.len(),
        anomalies = windows.iter().filter(|w| w.is_anomalous).count(),
        alerts = alerts.len(),
        cancelled,
        "source analysis complete"
    );

    Ok(SourceReport {
        source_id,
        entries,
        entry_templates,
        templates: patterns.into_ranked(),
        anomalies: windows,
        alerts,
        summary,
        warnings,
        degraded,
        cancelled,
    })
}
