//! 분석 결과 객체
//!
//! [`AnalysisReport`]는 호출자(저장소, HTTP 계층 등)에게 넘겨지는 최종 결과입니다.
//! 부분 실패는 에러 대신 [`AnalysisWarning`] 목록과 `degraded` 플래그로 표현됩니다.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use logscope_core::types::{
    AlertEvent, AnalysisSummary, AnomalyWindow, CorrelationLink, Level, LogEntry,
    PatternTemplate, TemplateId,
};

/// 경고가 발생한 처리 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Tokenizer,
    Anomaly,
    Correlation,
    Alert,
    Notification,
    Commentary,
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tokenizer => "tokenizer",
            Self::Anomaly => "anomaly",
            Self::Correlation => "correlation",
            Self::Alert => "alert",
            Self::Notification => "notification",
            Self::Commentary => "commentary",
            Self::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// 건너뛰었거나 품질이 낮아진 항목에 대한 경고
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWarning {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub message: String,
}

impl AnalysisWarning {
    pub fn new(stage: Stage, source_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            stage,
            source_id: source_id.map(str::to_owned),
            message: message.into(),
        }
    }
}

impl fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_id {
            Some(source) => write!(f, "[{}] {}: {}", self.stage, source, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// 소스 하나에 대한 분석 결과
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: String,
    /// 분류된 엔트리 (스트리밍 모드에서는 비어 있음)
    pub entries: Vec<LogEntry>,
    /// `entries`와 같은 순서의 템플릿 배정
    pub entry_templates: Vec<TemplateId>,
    /// 순위순 템플릿 목록
    pub templates: Vec<PatternTemplate>,
    /// 평가된 모든 시간 창
    pub anomalies: Vec<AnomalyWindow>,
    pub alerts: Vec<AlertEvent>,
    pub summary: AnalysisSummary,
    pub warnings: Vec<AnalysisWarning>,
    pub degraded: bool,
    /// 호출자 취소로 입력 끝까지 읽지 못함
    pub cancelled: bool,
}

impl SourceReport {
    /// ID로 템플릿을 조회합니다.
    pub fn template(&self, id: TemplateId) -> Option<&PatternTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// 이상으로 판정된 창만 반환합니다.
    pub fn flagged_anomalies(&self) -> impl Iterator<Item = &AnomalyWindow> {
        self.anomalies.iter().filter(|w| w.is_anomalous)
    }
}

/// 둘 이상의 소스에 나타난 템플릿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub template_string: String,
    pub level: Level,
    /// 모든 소스의 발생 횟수 합
    pub occurrence_count: u64,
    /// 소스별 발생 (입력 소스 순서)
    pub sources: Vec<TemplateOccurrence>,
}

/// 소스 하나에서의 템플릿 발생
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateOccurrence {
    pub source_id: String,
    /// 해당 소스 run 안의 템플릿 ID
    pub template_id: TemplateId,
    pub count: u64,
}

/// 한 번의 분석 호출 전체 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub sources: Vec<SourceReport>,
    /// 소스 간 상관관계 링크
    pub links: Vec<CorrelationLink>,
    /// 여러 소스에 반복해서 나타난 템플릿
    #[serde(default)]
    pub recurring_templates: Vec<RecurringTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    /// 소스에 속하지 않는 경고 (상관관계, 코멘터리)
    pub warnings: Vec<AnalysisWarning>,
    pub degraded: bool,
}

impl AnalysisReport {
    /// ID로 소스 결과를 조회합니다.
    pub fn source(&self, source_id: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    /// 모든 소스의 알림 이벤트
    pub fn alerts(&self) -> impl Iterator<Item = &AlertEvent> {
        self.sources.iter().flat_map(|s| s.alerts.iter())
    }

    /// 모든 소스의 이상 창
    pub fn flagged_anomalies(&self) -> impl Iterator<Item = &AnomalyWindow> {
        self.sources.iter().flat_map(|s| s.flagged_anomalies())
    }

    /// 소스 경고와 전역 경고를 합친 목록
    pub fn all_warnings(&self) -> Vec<&AnalysisWarning> {
        self.sources
            .iter()
            .flat_map(|s| s.warnings.iter())
            .chain(self.warnings.iter())
            .collect()
    }
}
