//! Background janitor for rdbc-pool
//!
//! A periodic task that sweeps the idle queue for expired connections
//! and refills the pool to its floor. It holds only a weak reference to
//! the pool, so dropping the last pool handle stops it on the next tick.

use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::pool::SimpleConnectionPool;

/// Spawn the janitor task for a pool.
pub(crate) fn spawn(pool: Weak<SimpleConnectionPool>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval yields at once; the first sweep should land one full
        // period after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(pool_ref) = pool.upgrade() else {
                break;
            };
            if pool_ref.is_shut_down() {
                break;
            }

            debug!("janitor tick");
            pool_ref.sweep_idle().await;
            if pool_ref.total_connections() < pool_ref.config().min_size {
                pool_ref.try_grow().await;
            }
        }

        debug!("janitor stopped");
    })
}
