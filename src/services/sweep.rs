//! Shared plumbing for the scheduled sweeps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use utoipa::ToSchema;

use super::redis::RedisService;
use crate::error::AppResult;

/// Counters for one sweep run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    /// Candidates selected by the sweep query
    pub examined: usize,
    /// Candidates acted upon (expired, or reminded)
    pub processed: usize,
    /// Candidates left alone (state changed since selection, or already reminded)
    pub skipped: usize,
    /// Candidates whose processing failed and was rolled back
    pub failed: usize,
    /// Notifications that could not be delivered
    pub notify_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepRun {
    Completed(SweepReport),
    /// Another run of the same sweep was still in flight
    AlreadyRunning,
}

/// A job that the scheduler can trigger
#[async_trait]
pub trait Sweeper: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one sweep now. Safe to call repeatedly.
    async fn run_once(&self) -> AppResult<SweepRun>;
}

/// Keeps runs of one sweep from overlapping.
///
/// Inside a process a mutex is enough; with Redis configured a lease also keeps
/// other server instances out.
#[derive(Clone)]
pub struct SweepGuard {
    name: &'static str,
    running: Arc<Mutex<()>>,
    /// Set while a permit is held; read by status checks without touching the mutex
    busy: Arc<AtomicBool>,
    redis: Option<RedisService>,
    lease_seconds: u64,
}

pub struct SweepPermit {
    _local: OwnedMutexGuard<()>,
    lease: Option<(RedisService, String)>,
    busy: Arc<AtomicBool>,
    name: &'static str,
}

impl SweepGuard {
    pub fn new(name: &'static str, redis: Option<RedisService>, lease_seconds: u64) -> Self {
        Self {
            name,
            running: Arc::new(Mutex::new(())),
            busy: Arc::new(AtomicBool::new(false)),
            redis,
            lease_seconds,
        }
    }

    /// `None` when a run is already in flight here or on another instance
    pub async fn try_enter(&self) -> AppResult<Option<SweepPermit>> {
        let Ok(local) = self.running.clone().try_lock_owned() else {
            return Ok(None);
        };

        let lease = match &self.redis {
            Some(redis) => match redis.try_acquire_lease(self.name, self.lease_seconds).await? {
                Some(token) => Some((redis.clone(), token)),
                None => return Ok(None),
            },
            None => None,
        };

        self.busy.store(true, Ordering::SeqCst);
        Ok(Some(SweepPermit {
            _local: local,
            lease,
            busy: self.busy.clone(),
            name: self.name,
        }))
    }

    pub async fn is_running(&self) -> AppResult<bool> {
        if self.busy.load(Ordering::SeqCst) {
            return Ok(true);
        }
        match &self.redis {
            Some(redis) => redis.is_leased(self.name).await,
            None => Ok(false),
        }
    }
}

impl SweepPermit {
    /// Give the slot back. A lease that cannot be released runs out on its own.
    pub async fn release(self) {
        self.busy.store(false, Ordering::SeqCst);
        if let Some((redis, token)) = &self.lease {
            if let Err(e) = redis.release_lease(self.name, token).await {
                tracing::warn!(sweep = self.name, "Failed to release sweep lease: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_excludes_overlapping_runs() {
        let guard = SweepGuard::new("test", None, 60);
        let permit = guard.try_enter().await.unwrap().expect("first run enters");
        assert!(guard.try_enter().await.unwrap().is_none());
        assert!(guard.is_running().await.unwrap());

        permit.release().await;
        assert!(!guard.is_running().await.unwrap());
        assert!(guard.try_enter().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cloned_guard_shares_slot() {
        let guard = SweepGuard::new("test", None, 60);
        let other = guard.clone();
        let _permit = guard.try_enter().await.unwrap().unwrap();
        assert!(other.try_enter().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_check_does_not_block_entry() {
        let guard = SweepGuard::new("test", None, 60);
        let observer = guard.clone();

        // Status polls interleaved with entry never take the slot
        let (status, entered) = tokio::join!(observer.is_running(), guard.try_enter());
        assert!(!status.unwrap());
        let permit = entered.unwrap().expect("status check left the slot free");

        assert!(observer.is_running().await.unwrap());
        assert!(guard.try_enter().await.unwrap().is_none());
        permit.release().await;

        for _ in 0..3 {
            assert!(!observer.is_running().await.unwrap());
            let permit = guard.try_enter().await.unwrap().expect("guard is free");
            permit.release().await;
        }
    }
}
