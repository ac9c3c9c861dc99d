//! Logscope 분석 코어
//!
//! 임의의 텍스트 로그 라인을 구조화된 엔트리로 바꾸고, 레벨 분류, 반복 템플릿 탐지,
//! 시간 창 이상 탐지, 교차 소스 상관관계, 알림 규칙 평가를 수행합니다.
//! 코어는 데이터베이스, 네트워크, 파일 시스템에 직접 접근하지 않습니다.
//!
//! # 모듈 구성
//!
//! - [`tokenizer`]: 라인 형식 매칭, 타임스탬프/레벨 토큰 추출, 여러 줄 엔트리 병합
//! - [`classifier`]: 레벨 토큰 정규화와 키워드 휴리스틱
//! - [`pattern`]: 가변 토큰 마스킹과 템플릿 arena
//! - [`anomaly`]: 고정 시간 창 집계와 기준선 비교
//! - [`correlation`]: 공유 식별자 / 시간 근접 링크
//! - [`rule`]: YAML 알림 규칙과 슬라이딩 창 평가
//! - [`alert`]: 알림 sink 전달
//! - [`summary`]: 소스별 통계 요약
//! - [`pool`]: 동시 run 수 제한
//! - [`pipeline`]: 배치/스트리밍 분석 오케스트레이션
//! - [`report`]: 결과 객체와 경고
//! - [`config`]: 분석 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! lines -> Tokenizer -> Classifier -+-> PatternDetector + Summary -+
//!                                   +-> AnomalyDetector -----------+-> SourceReport
//!                                   +-> AlertEvaluator -> Sink ----+
//!                                                                  |
//!                      SourceReport x N -> Correlator -> Commentary -> AnalysisReport
//! ```

pub mod alert;
pub mod anomaly;
pub mod classifier;
pub mod config;
pub mod correlation;
pub mod error;
pub mod pattern;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod rule;
pub mod summary;
pub mod tokenizer;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{AnalysisEngine, AnalysisEngineBuilder, LineSource, StreamEvent, StreamHandle};

// 결과
pub use report::{
    AnalysisReport, AnalysisWarning, RecurringTemplate, SourceReport, Stage, TemplateOccurrence,
};

// 설정
pub use config::{AnalysisConfig, AnalysisConfigBuilder};

// 에러
pub use error::AnalysisError;

// 단계별 구성 요소
pub use anomaly::{AnomalyDetector, ZScoreScorer};
pub use classifier::LevelClassifier;
pub use correlation::Correlator;
pub use pattern::{Masker, PatternDetector, recurring_templates};
pub use tokenizer::{FormatSet, LineTokenizer};

// 알림 규칙
pub use rule::{AlertEvaluator, AlertRule, RuleLoader, RuleSet};
