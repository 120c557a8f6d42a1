//! 파이프라인 trait: 장기 실행 컴포넌트의 생명주기
//!
//! [`Pipeline`]은 데몬이 시작/정지/상태 점검하는 모든 컴포넌트가 구현합니다.
//! 정적 디스패치용 RPITIT trait과 `Box<dyn DynPipeline>`으로 관리하기 위한
//! [`DynPipeline`]을 함께 제공합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::LockoutError;

/// `Send` boxed future 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 컴포넌트 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 생명주기 trait
///
/// `start()`는 백그라운드 태스크를 spawn하고 즉시 반환해야 하며,
/// `stop()`은 spawn한 태스크가 종료될 때까지 기다립니다.
pub trait Pipeline: Send + Sync {
    /// 컴포넌트를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LockoutError>> + Send;

    /// 컴포넌트를 정지합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), LockoutError>> + Send;

    /// 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn-compatible 생명주기 trait
///
/// [`Pipeline`]을 구현한 타입은 blanket impl로 자동 구현됩니다.
pub trait DynPipeline: Send + Sync {
    /// 컴포넌트를 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), LockoutError>>;

    /// 컴포넌트를 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), LockoutError>>;

    /// 건강 상태를 확인합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), LockoutError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), LockoutError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        running: bool,
    }

    impl Pipeline for Counter {
        async fn start(&mut self) -> Result<(), LockoutError> {
            if self.running {
                return Err(crate::error::PipelineError::AlreadyRunning.into());
            }
            self.running = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), LockoutError> {
            if !self.running {
                return Err(crate::error::PipelineError::NotRunning.into());
            }
            self.running = false;
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("stopped".to_owned())
            }
        }
    }

    #[tokio::test]
    async fn dyn_pipeline_forwards_to_pipeline() {
        let mut boxed: Box<dyn DynPipeline> = Box::new(Counter { running: false });
        assert!(boxed.health_check().await.is_unhealthy());
        boxed.start().await.unwrap();
        assert!(boxed.health_check().await.is_healthy());
        assert!(boxed.start().await.is_err());
        boxed.stop().await.unwrap();
        assert!(boxed.stop().await.is_err());
    }

    #[test]
    fn health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(
            HealthStatus::Degraded("queue full".to_owned()).to_string(),
            "degraded: queue full"
        );
    }

    #[test]
    fn health_status_serializes_with_reason() {
        let json = serde_json::to_value(HealthStatus::Unhealthy("stopped".to_owned())).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["reason"], "stopped");
    }
}
