//! Business logic services

pub mod circulation;
pub mod expiration;
pub mod notifications;
pub mod overdue;
pub mod redis;
pub mod reservations;
pub mod scheduler;
pub mod sweep;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    repository::CirculationStore,
};

use notifications::NotificationPort;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn CirculationStore>,
    pub circulation: circulation::CirculationLedger,
    pub reservations: reservations::ReservationQueueManager,
    pub expiration: expiration::ExpirationSweeper,
    pub overdue: overdue::OverdueSweeper,
}

impl Services {
    /// Create all services on top of one store and one notification port
    pub fn new(
        store: Arc<dyn CirculationStore>,
        notifier: Arc<dyn NotificationPort>,
        config: &AppConfig,
        redis: Option<redis::RedisService>,
    ) -> Self {
        let lease_seconds = config.scheduler.lease_seconds;
        let grace_days = config.reservations.grace_days;

        Self {
            circulation: circulation::CirculationLedger::new(
                store.clone(),
                notifier.clone(),
                config.circulation.clone(),
                grace_days,
            ),
            reservations: reservations::ReservationQueueManager::new(
                store.clone(),
                notifier.clone(),
                config.circulation.clone(),
                grace_days,
            ),
            expiration: expiration::ExpirationSweeper::new(
                store.clone(),
                notifier.clone(),
                grace_days,
                sweep::SweepGuard::new("expiration", redis.clone(), lease_seconds),
            ),
            overdue: overdue::OverdueSweeper::new(
                store.clone(),
                notifier,
                sweep::SweepGuard::new("overdue", redis, lease_seconds),
            ),
            store,
        }
    }
}

/// Reject callers acting on a loan or reservation they do not own
pub(crate) fn ensure_owner(caller_id: i32, owner_id: i32, resource: &str) -> AppResult<()> {
    if caller_id == owner_id {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "User {} does not own this {}",
            caller_id, resource
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_owner() {
        assert!(ensure_owner(4, 4, "loan").is_ok());
        assert!(matches!(
            ensure_owner(4, 5, "reservation"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
