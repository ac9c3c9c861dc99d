//! 도메인 타입
//!
//! 분석 코어가 생산하고 호출자가 소비하는 레코드를 정의합니다.
//! 모든 레코드는 생성 이후 변경되지 않으며 생성한 분석 실행(run)이 소유합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 정규화된 로그 심각도
///
/// 정렬 순서는 심각도 내림차순(`Error`가 가장 앞)입니다.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Error,
    Warning,
    Info,
    Debug,
    #[default]
    Unknown,
}

impl Level {
    /// 모든 레벨 (정렬 순서)
    pub const ALL: [Level; 5] = [
        Level::Error,
        Level::Warning,
        Level::Info,
        Level::Debug,
        Level::Unknown,
    ];

    /// 대문자 표기 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    /// 정규 이름만 허용합니다 (대소문자 무시). 동의어 처리는 분류기의 몫입니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Self::Error),
            "WARNING" => Ok(Self::Warning),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

/// 엔트리 식별자 (소스 + 소스 내 시퀀스 번호)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId {
    pub source_id: String,
    pub sequence_number: u64,
}

impl EntryId {
    pub fn new(source_id: impl Into<String>, sequence_number: u64) -> Self {
        Self {
            source_id: source_id.into(),
            sequence_number,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_id, self.sequence_number)
    }
}

/// 구조화된 로그 엔트리
///
/// 하나 이상의 원본 라인(여러 줄 스택 트레이스 포함)에서 만들어집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 소스(파일) 식별자
    pub source_id: String,
    /// 소스 내 단조 증가 번호 (1부터 시작)
    pub sequence_number: u64,
    /// 첫 번째 원본 라인 번호 (1부터 시작)
    pub line_number: u64,
    /// 이 엔트리에 병합된 원본 라인 수
    pub line_count: u32,
    /// 타임스탬프 (해석 불가 시 `None`)
    pub timestamp: Option<DateTime<Utc>>,
    /// 분류된 심각도
    pub level: Level,
    /// 토크나이저가 추출한 원본 레벨 토큰
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_token: Option<String>,
    /// 매칭된 라인 형식 이름 (`None`이면 해석 불가 라인)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// 타임스탬프/레벨 접두어를 제외한 본문
    pub message: String,
    /// 원본 텍스트 (연속 라인은 `\n`으로 연결)
    pub raw_text: String,
    /// 추출된 필드 (request_id, thread 등)
    #[serde(default)]
    pub extracted_fields: BTreeMap<String, String>,
}

impl LogEntry {
    /// 이 엔트리의 식별자를 반환합니다.
    pub fn id(&self) -> EntryId {
        EntryId::new(self.source_id.clone(), self.sequence_number)
    }

    /// 설정된 형식 중 하나와 매칭되었는지 여부
    pub fn is_parsed(&self) -> bool {
        self.format.is_some()
    }

    /// 비어 있지 않은 추출 필드 값을 반환합니다.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.extracted_fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}#{}: {}",
            self.level, self.source_id, self.sequence_number, self.message
        )
    }
}

/// 템플릿 arena 인덱스
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub usize);

/// 반복 메시지 템플릿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTemplate {
    /// 실행 내 arena 인덱스 (최초 관측 순서와 같음)
    pub id: TemplateId,
    /// 가변 토큰이 placeholder로 치환된 문자열
    pub template_string: String,
    pub occurrence_count: u64,
    /// 최초 K개 예시 엔트리 (가득 차면 교체하지 않음)
    pub example_entry_ids: Vec<EntryId>,
    pub level: Level,
}

/// 시간 창 하나에 대한 이상 점수
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyWindow {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// 지표 이름 (`entries_total`, `entries_error` 등)
    pub metric_name: String,
    pub observed_value: f64,
    pub baseline_mean: f64,
    pub baseline_stddev: f64,
    pub score: f64,
    pub is_anomalous: bool,
    /// 기준선 계산에 사용된 이전 창 개수
    pub history_len: usize,
    /// 점수를 계산한 모델 이름
    pub scorer: String,
}

/// 상관관계 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    SharedIdentifier,
    TemporalProximity,
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedIdentifier => f.write_str("SHARED_IDENTIFIER"),
            Self::TemporalProximity => f.write_str("TEMPORAL_PROXIMITY"),
        }
    }
}

/// 서로 다른 소스의 두 엔트리 사이 무방향 링크
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationLink {
    pub entry_id_a: EntryId,
    pub entry_id_b: EntryId,
    pub relation_type: RelationType,
    /// 0.0 ~ 1.0
    pub confidence: f64,
    /// 근거 (`request_id=abc`, `delta=12s` 등)
    pub detail: String,
}

impl CorrelationLink {
    /// 링크를 생성합니다. 무방향이므로 두 식별자는 정렬되어 저장됩니다.
    pub fn new(
        a: EntryId,
        b: EntryId,
        relation_type: RelationType,
        confidence: f64,
        detail: impl Into<String>,
    ) -> Self {
        let (entry_id_a, entry_id_b) = if a <= b { (a, b) } else { (b, a) };
        Self {
            entry_id_a,
            entry_id_b,
            relation_type,
            confidence: confidence.clamp(0.0, 1.0),
            detail: detail.into(),
        }
    }
}

/// 알림 규칙이 발동한 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// 결정적 ID (규칙, 소스, 발동 엔트리에서 유도)
    pub id: Uuid,
    pub rule_id: String,
    pub rule_title: String,
    pub source_id: String,
    /// 발동 엔트리의 이벤트 시각
    pub triggered_at: DateTime<Utc>,
    /// 창 안에서 매칭된 엔트리 (시간순)
    pub matched_entry_ids: Vec<EntryId>,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} matches in {} at {})",
            self.rule_id,
            self.rule_title,
            self.matched_entry_ids.len(),
            self.source_id,
            self.triggered_at.to_rfc3339(),
        )
    }
}

/// 상위 템플릿 한 줄 요약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateShare {
    pub template_id: TemplateId,
    pub template_string: String,
    pub count: u64,
    /// 같은 레벨 엔트리 중 비율 (0 ~ 100)
    pub percentage: f64,
}

/// 소스 하나에 대한 통계 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub source_id: String,
    pub total_lines: u64,
    pub total_entries: u64,
    pub level_counts: BTreeMap<Level, u64>,
    /// 어떤 형식과도 매칭되지 않은 엔트리 수
    pub unparsed_entries: u64,
    /// 타임스탬프가 없는 엔트리 수
    pub untimestamped_entries: u64,
    /// 이미 닫힌 시간 창에 늦게 도착한 엔트리 수
    pub late_entries: u64,
    /// 시(0-23)별 엔트리 수
    pub hourly_distribution: BTreeMap<u32, u64>,
    pub top_errors: Vec<TemplateShare>,
    pub top_warnings: Vec<TemplateShare>,
    /// ERROR/WARNING 엔트리에 등장한 예외/에러 타입 (많은 순)
    #[serde(default)]
    pub exception_types: Vec<ExceptionCount>,
}

/// 예외/에러 타입 이름과 등장 횟수
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionCount {
    pub name: String,
    pub count: u64,
}

impl AnalysisSummary {
    /// 주어진 레벨의 엔트리 수
    pub fn count(&self, level: Level) -> u64 {
        self.level_counts.get(&level).copied().unwrap_or(0)
    }
}
