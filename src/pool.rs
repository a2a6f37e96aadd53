use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DbConfig;
use crate::driver::{Driver, DriverFactory};
use crate::error::RelayDbError;

/// Grace period between a hot-swap and closing the replaced handle;
/// queries already running against the old pool get this long to finish.
pub const SWAP_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Statement used by the keep-alive probe.
const KEEP_ALIVE_SQL: &str = "SELECT 1";

/// Owns the current driver handle and its lifecycle: creation at startup,
/// hot-swap on reset, periodic keep-alive probing, teardown.
///
/// Reads of the current handle are cheap Arc clones under a read lock;
/// only a swap takes the write lock. In-flight queries hold their clone
/// and finish on the pool they started with.
pub struct PoolManager {
    config: DbConfig,
    factory: Arc<dyn DriverFactory>,
    current: RwLock<Arc<dyn Driver>>,
    keep_alive_secs: AtomicU64,
    keep_alive_running: AtomicBool,
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("target", &self.config.summary())
            .field("keep_alive_secs", &self.keep_alive_secs())
            .finish_non_exhaustive()
    }
}

impl PoolManager {
    /// Connect the first handle. Startup-only; a failure here is fatal to
    /// the relay and is not retried.
    ///
    /// # Errors
    ///
    /// Whatever the factory reports while opening the first handle.
    pub async fn initialize(
        config: DbConfig,
        factory: Arc<dyn DriverFactory>,
    ) -> Result<Arc<Self>, RelayDbError> {
        let driver = factory.connect(&config).await?;
        info!(target_db = %config.summary(), "database pool ready");
        Ok(Arc::new(PoolManager {
            config,
            factory,
            current: RwLock::new(driver),
            keep_alive_secs: AtomicU64::new(0),
            keep_alive_running: AtomicBool::new(false),
        }))
    }

    /// Clone of the current handle.
    pub async fn current(&self) -> Arc<dyn Driver> {
        self.current.read().await.clone()
    }

    /// Hot-swap: build a fresh handle from the retained config, make it
    /// current, and close the old one after [`SWAP_GRACE_PERIOD`].
    ///
    /// # Errors
    ///
    /// A factory failure leaves the old handle in place; a broken
    /// replacement never evicts a working pool.
    pub async fn reset(&self) -> Result<(), RelayDbError> {
        let fresh = self.factory.connect(&self.config).await?;
        let old = {
            let mut guard = self.current.write().await;
            std::mem::replace(&mut *guard, fresh)
        };
        info!(target_db = %self.config.summary(), "pool handle swapped");
        tokio::spawn(async move {
            sleep(SWAP_GRACE_PERIOD).await;
            if let Err(err) = old.close().await {
                warn!(error = %err, "closing replaced pool failed");
            }
        });
        Ok(())
    }

    /// Interval currently configured for keep-alive probing; 0 is off.
    #[must_use]
    pub fn keep_alive_secs(&self) -> u64 {
        self.keep_alive_secs.load(Ordering::Relaxed)
    }

    /// Set the probe interval. Enabling spawns the probe loop unless one
    /// is already running; setting 0 turns the loop's next scheduled run
    /// into a no-op that does not reschedule.
    pub fn set_keep_alive(self: &Arc<Self>, secs: u64) {
        self.keep_alive_secs.store(secs, Ordering::Relaxed);
        if secs > 0 && self.try_claim_keep_alive() {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                manager.keep_alive_loop().await;
            });
        }
    }

    /// Close the current handle for graceful teardown. Keep-alive stops
    /// rescheduling first.
    ///
    /// # Errors
    ///
    /// The driver's close failure, as a connection error.
    pub async fn close(&self) -> Result<(), RelayDbError> {
        self.keep_alive_secs.store(0, Ordering::Relaxed);
        let driver = self.current().await;
        driver
            .close()
            .await
            .map_err(|err| RelayDbError::ConnectionError(err.to_string()))
    }

    fn try_claim_keep_alive(&self) -> bool {
        self.keep_alive_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn keep_alive_loop(&self) {
        loop {
            let secs = self.keep_alive_secs();
            if secs == 0 {
                self.keep_alive_running.store(false, Ordering::Release);
                // An enable may have raced the shutdown; reclaim if so.
                if self.keep_alive_secs() > 0 && self.try_claim_keep_alive() {
                    continue;
                }
                debug!("keep-alive loop stopped");
                return;
            }
            // Each run reschedules itself one full interval after the
            // previous run finished, so probes never pile up.
            sleep(Duration::from_secs(secs)).await;
            if self.keep_alive_secs() == 0 {
                continue;
            }
            let driver = self.current().await;
            match driver.run(KEEP_ALIVE_SQL).await {
                Ok(_) => debug!("keep-alive probe ok"),
                Err(err) => warn!(error = %err, "keep-alive probe failed"),
            }
        }
    }
}
