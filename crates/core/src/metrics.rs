//! 메트릭 상수 및 설명 등록
//!
//! 분석 코어가 `metrics::counter!()` 매크로로 기록하는 지표 이름을 정의합니다.
//! 전역 레코더가 설치되지 않았다면 기록은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logscope_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logscope_core::metrics::LINES_READ_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 라인 형식 레이블 키 (iso8601_level, regex 규칙 이름 등)
pub const LABEL_FORMAT: &str = "format";

/// 심각도 레이블 키 (ERROR, WARNING, ...)
pub const LABEL_LEVEL: &str = "level";

/// 관계 유형 레이블 키
pub const LABEL_RELATION: &str = "relation";

/// 플러그인 이름 레이블 키
pub const LABEL_PLUGIN: &str = "plugin";

// ─── 분석 코어 메트릭 ──────────────────────────────────────────────

/// 읽은 원본 라인 수 (counter)
pub const LINES_READ_TOTAL: &str = "logscope_lines_read_total";

/// 생성된 엔트리 수 (counter, labels: level, format)
pub const ENTRIES_EMITTED_TOTAL: &str = "logscope_entries_emitted_total";

/// 어떤 형식과도 매칭되지 않은 엔트리 수 (counter)
pub const UNPARSED_ENTRIES_TOTAL: &str = "logscope_unparsed_entries_total";

/// 새로 생성된 템플릿 수 (counter)
pub const TEMPLATES_CREATED_TOTAL: &str = "logscope_templates_created_total";

/// 이상으로 판정된 시간 창 수 (counter)
pub const ANOMALIES_FLAGGED_TOTAL: &str = "logscope_anomalies_flagged_total";

/// 생성된 상관관계 링크 수 (counter, label: relation)
pub const LINKS_EMITTED_TOTAL: &str = "logscope_links_emitted_total";

/// 발동한 알림 수 (counter)
pub const ALERTS_FIRED_TOTAL: &str = "logscope_alerts_fired_total";

/// 플러그인 호출 실패 수 (counter, label: plugin)
pub const PLUGIN_FAILURES_TOTAL: &str = "logscope_plugin_failures_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(LINES_READ_TOTAL, "Total number of raw log lines read");
    describe_counter!(
        ENTRIES_EMITTED_TOTAL,
        "Total number of log entries emitted after multi-line merging"
    );
    describe_counter!(
        UNPARSED_ENTRIES_TOTAL,
        "Total number of entries that matched no configured line format"
    );
    describe_counter!(
        TEMPLATES_CREATED_TOTAL,
        "Total number of pattern templates created"
    );
    describe_counter!(
        ANOMALIES_FLAGGED_TOTAL,
        "Total number of time windows flagged as anomalous"
    );
    describe_counter!(LINKS_EMITTED_TOTAL, "Total number of correlation links");
    describe_counter!(ALERTS_FIRED_TOTAL, "Total number of alert events fired");
    describe_counter!(
        PLUGIN_FAILURES_TOTAL,
        "Total number of plugin capability failures"
    );
}
