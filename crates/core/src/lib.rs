//! Lockout 공통 크레이트
//!
//! 알림 기반 계정 차단 엔진(`lockout-responder`)과 데몬(`lockout-daemon`)이
//! 공유하는 도메인 타입, 에러, 설정, 생명주기 trait, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, LockoutError, PipelineError, ResponseError};

// 설정
pub use config::LockoutConfig;

// 이벤트
pub use event::{Action, AlertEvent, EventMetadata, EventRecord, RecordDetail};

// 파이프라인 trait
pub use pipeline::{BoxFuture, DynPipeline, HealthStatus, Pipeline};

// 도메인 타입
pub use types::{SessionTermination, TerminationSummary, UserSession};
