//! 워커 풀 -- 동시 분석 run 수 제한
//!
//! 세마포어로 동시에 실행되는 run 수를 제한합니다. 포화 시 동작은
//! [`SaturationPolicy`]로 결정됩니다.
//! - `Queue`: permit이 생길 때까지 대기
//! - `Reject`: 즉시 [`AnalysisError::PoolSaturated`] 반환

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use logscope_core::config::SaturationPolicy;

use crate::error::AnalysisError;

/// run 동시성 제한기
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    policy: SaturationPolicy,
}

impl WorkerPool {
    pub fn new(capacity: usize, policy: SaturationPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            policy,
        }
    }

    /// run 하나의 실행 권한을 얻습니다.
    ///
    /// 반환된 permit이 drop되면 슬롯이 반환됩니다.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AnalysisError> {
        match self.policy {
            SaturationPolicy::Queue => {
                if self.semaphore.available_permits() == 0 {
                    debug!(capacity = self.capacity, "worker pool saturated, queueing run");
                }
                Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| AnalysisError::Cancelled)
            }
            SaturationPolicy::Reject => self.try_acquire(),
        }
    }

    /// 대기하지 않고 실행 권한을 얻습니다. 빈 슬롯이 없으면 실패합니다.
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, AnalysisError> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|_| AnalysisError::PoolSaturated {
                capacity: self.capacity,
            })
    }

    /// 동시 실행 가능 run 수
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 현재 비어 있는 슬롯 수
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn policy(&self) -> SaturationPolicy {
        self.policy
    }
}
