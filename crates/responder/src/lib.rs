//! Lockout 대응 엔진
//!
//! 계정 오용 알림을 받아 무시 목록을 확인하고, EZproxy 차단 목록에 사용자명을
//! 기록한 뒤 활성 세션을 종료합니다. 판단 지점마다 [`lockout_core::EventRecord`]를
//! 하나씩 만들어 notifier 워커로 전달합니다.
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 (`ResponderError`)
//! - [`config`]: 엔진 설정 (`ResponderConfig`, builder)
//! - [`lines`]: 줄 단위 목록 파일 조회/추가
//! - [`ignore`]: 무시 목록 검사 (`IgnoreListChecker`)
//! - [`registry`]: 차단 목록 (`DisabledAccountRegistry`)
//! - [`session`]: 세션 디렉토리 계약과 EZproxy 구현 (`SessionDirectory`)
//! - [`termination`]: 세션 조회/종료 오케스트레이션 (`TerminationOrchestrator`)
//! - [`state`]: 알림 처리 상태 기계 (`PipelineState`)
//! - [`pipeline`]: 알림 하나의 처리 흐름 (`DisableEventPipeline`)
//! - [`dispatcher`]: 레코드 큐 전달 (`EventRecordDispatcher`)
//! - [`notify`]: notifier 계약과 전달 워커 (`Notifier`, `NotifyWorker`)
//! - [`responder`]: 생명주기 관리 (`Responder`, `ResponderBuilder`)
//!
//! # Architecture
//!
//! ```text
//! AlertEvent --mpsc--> Responder --task per alert--> DisableEventPipeline
//!                                                     |  IgnoreListChecker
//!                                                     |  DisabledAccountRegistry
//!                                                     |  TerminationOrchestrator
//!                                                     v
//!                                          EventRecordDispatcher --mpsc--> NotifyWorker
//!                                                                          |- ReportedEventsLog
//!                                                                          '- WebhookNotifier
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ignore;
pub mod lines;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod responder;
pub mod session;
pub mod state;
pub mod termination;

// --- Public API Re-exports ---

// Responder (main orchestrator)
pub use responder::{Responder, ResponderBuilder};

// Configuration
pub use config::{ResponderConfig, ResponderConfigBuilder};

// Error
pub use error::ResponderError;

// Pipeline
pub use pipeline::DisableEventPipeline;
pub use state::{Outcome, PipelineState, StageEvent, TransitionPolicy};

// Components
pub use dispatcher::{DispatchOutcome, EventRecordDispatcher};
pub use ignore::{IgnoreListChecker, IgnoreVerdict};
pub use registry::{DisableResult, DisabledAccountRegistry};
pub use session::{ActiveFileSessionDirectory, SessionDirectory};
pub use termination::{TerminationOrchestrator, TerminationOutcome};

// Notification
pub use notify::{
    DynNotifier, Notifier, NotifyWorker, ReportedEventsLog, WebhookNotifier, WorkerStats,
    spawn_notify_worker,
};
