//! 에러 타입
//!
//! 최상위 [`LogscopeError`]와 도메인별 하위 에러를 정의합니다.
//! 각 크레이트는 자신의 에러를 `From` 구현으로 최상위 에러에 연결합니다.

/// Logscope 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogscopeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 플러그인 호출 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 워커 풀 포화
    #[error("worker pool saturated (capacity: {capacity})")]
    Saturated { capacity: usize },

    /// 호출자에 의해 취소됨
    #[error("run cancelled")]
    Cancelled,

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 플러그인(capability) 호출 에러
///
/// 알림 sink, 이상 점수 모델, 코멘터리 생성기가 반환합니다.
/// 호출 측에서 잡아 경고로 기록하며 파이프라인을 중단시키지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 플러그인 내부 실패
    #[error("plugin '{plugin}' failed: {reason}")]
    Failed { plugin: String, reason: String },

    /// 외부 서비스 사용 불가
    #[error("plugin '{plugin}' unavailable")]
    Unavailable { plugin: String },
}

impl PluginError {
    /// 실패한 플러그인 이름을 반환합니다.
    pub fn plugin(&self) -> &str {
        match self {
            Self::Failed { plugin, .. } | Self::Unavailable { plugin } => plugin,
        }
    }
}
