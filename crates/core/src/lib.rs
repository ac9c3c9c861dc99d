//! Logscope 공통 크레이트
//!
//! 분석 코어(`logscope-analysis`)와 CLI가 공유하는 도메인 타입, 에러,
//! 설정, 그리고 플러그인 capability trait을 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, LogscopeError, PipelineError, PluginError};

// 설정
pub use config::{AnalysisSection, FormatRule, GeneralConfig, LogscopeConfig, SaturationPolicy};

// capability trait
pub use pipeline::{
    AnomalyScorer, BoxFuture, CommentaryGenerator, NoCommentary, NotificationSink, WindowSample,
};

// 도메인 타입
pub use types::{
    AlertEvent, AnalysisSummary, AnomalyWindow, CorrelationLink, EntryId, ExceptionCount, Level,
    LogEntry, PatternTemplate, RelationType, TemplateId, TemplateShare,
};
