//! Fair throttle: one capacity pool split across registered principals
//!
//! A single global counter deadlocks when several principals each hold slots
//! while waiting on work that another principal has yet to admit: the first
//! principal to fill the pool starves the rest. [`FairThrottle`] caps every
//! principal at `ceil(max / N)` slots, `N` being the number of principals
//! sharing the pool at the time of each admission attempt, so any principal
//! can always make progress once the others are back within their shares.
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_throttle::FairThrottle;
//! use std::sync::Arc;
//!
//! # async fn example() -> compio_throttle::Result<()> {
//! let throttle = FairThrottle::new(4);
//! let producer = Arc::new(throttle.register()?);
//! let consumer = throttle.register()?;
//!
//! // `producer` can hold at most 2 of the 4 slots, leaving room for `consumer`
//! let task = {
//!     let throttle = throttle.clone();
//!     let producer = Arc::clone(&producer);
//!     compio::runtime::spawn(async move {
//!         throttle.run_as(&producer, async { /* produce */ }).await;
//!     })
//! };
//! let slot = throttle.admit_as(&consumer).await;
//! drop(slot);
//!
//! let _ = task.await;
//! throttle.wait().await;
//! # Ok(())
//! # }
//! ```

use crate::config::{QuotaPolicy, ThrottleConfig};
use crate::error::{Result, ThrottleError};
use crate::pool::{Pool, PrincipalId, ThrottleStats};
use crate::slot::Slot;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Registration of one caller with a [`FairThrottle`]
///
/// Obtained from [`FairThrottle::register`] and presented on every admission.
/// Share it between the tasks of one principal by reference or through an
/// `Arc`. Dropping the handle deregisters the principal: it leaves the
/// registry once its last slot is released, enlarging everyone else's share.
pub struct Principal {
    /// Pool the principal is registered with
    pool: Arc<Pool>,
    /// Registry key within that pool
    id: PrincipalId,
}

impl Principal {
    /// Id of the principal, unique within its throttle
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Principal {
    fn drop(&mut self) {
        self.pool.retire(self.id);
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal").field("id", &self.id).finish()
    }
}

/// A throttled wait group that divides capacity fairly between principals
///
/// Admission for a principal waits until both its own held count is below
/// its current quota and the pool as a whole has a free slot. The quota is
/// recomputed from the live registry on every attempt, including after each
/// wakeup, so it follows principals registering and leaving.
///
/// # Design
///
/// - **One critical section**: pool total, registry and per-principal counts share one mutex
/// - **Non-blocking registration**: at most `max` principals, refused beyond that
/// - **Whole-pool barrier**: [`wait`](Self::wait) joins every principal's slots
#[derive(Clone, Debug)]
pub struct FairThrottle {
    /// Shared pool of all clones of this throttle
    pool: Arc<Pool>,
}

impl FairThrottle {
    /// Create a fair throttle with `max` slots, counting every registered principal
    ///
    /// # Panics
    ///
    /// Panics if `max` is 0
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_throttle::FairThrottle;
    ///
    /// let throttle = FairThrottle::new(4);
    /// let principal = throttle.register().unwrap();
    /// assert_eq!(throttle.quota(&principal), 4);
    /// ```
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self::with_policy(max, QuotaPolicy::default())
    }

    /// Create a fair throttle with `max` slots and an explicit quota policy
    ///
    /// # Panics
    ///
    /// Panics if `max` is 0
    #[must_use]
    pub fn with_policy(max: usize, policy: QuotaPolicy) -> Self {
        Self {
            pool: Arc::new(Pool::new(max, policy)),
        }
    }

    /// Create a fair throttle from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidConfig`] if the configuration does not validate
    pub fn from_config(config: &ThrottleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_policy(config.max_concurrency, config.quota_policy))
    }

    /// Register a new principal
    ///
    /// Never waits.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::RegistryFull`] when `max` principals are
    /// already registered; one more could never be granted a slot. Retry
    /// after some principal is dropped.
    pub fn register(&self) -> Result<Principal> {
        match self.pool.register() {
            Some(id) => Ok(Principal {
                pool: Arc::clone(&self.pool),
                id,
            }),
            None => Err(ThrottleError::RegistryFull { max: self.max() }),
        }
    }

    /// Deregister a principal
    ///
    /// Equivalent to dropping the handle.
    ///
    /// # Panics
    ///
    /// Panics if `principal` was registered with a different throttle
    pub fn deregister(&self, principal: Principal) {
        self.check(&principal);
        drop(principal);
    }

    /// Admit one task for `principal`, waiting while it is at its quota or the pool is full
    ///
    /// May wait indefinitely if slots are never released. Dropping the
    /// returned future before it completes leaves the throttle untouched.
    ///
    /// # Panics
    ///
    /// Panics if `principal` was registered with a different throttle
    pub async fn admit_as(&self, principal: &Principal) -> Slot {
        self.check(principal);
        self.pool.admit(Some(principal.id)).await;
        Slot::new(Arc::clone(&self.pool), Some(principal.id))
    }

    /// Admit one task for `principal` if it is under quota and a slot is free right now
    ///
    /// # Panics
    ///
    /// Panics if `principal` was registered with a different throttle
    #[must_use]
    pub fn try_admit_as(&self, principal: &Principal) -> Option<Slot> {
        self.check(principal);
        self.pool
            .try_admit(Some(principal.id))
            .then(|| Slot::new(Arc::clone(&self.pool), Some(principal.id)))
    }

    /// Admit for `principal`, run `task` to completion, then release
    ///
    /// # Panics
    ///
    /// Panics if `principal` was registered with a different throttle
    pub async fn run_as<F>(&self, principal: &Principal, task: F) -> F::Output
    where
        F: Future,
    {
        let _slot = self.admit_as(principal).await;
        task.await
    }

    /// Wait until every admitted slot of every principal has been released
    pub async fn wait(&self) {
        self.pool.wait().await;
    }

    /// Slots currently held by `principal`
    ///
    /// # Panics
    ///
    /// Panics if `principal` was registered with a different throttle
    #[must_use]
    pub fn held(&self, principal: &Principal) -> usize {
        self.check(principal);
        self.pool.state().held(principal.id)
    }

    /// Current quota of `principal`, evaluated against the live registry
    ///
    /// # Panics
    ///
    /// Panics if `principal` was registered with a different throttle
    #[must_use]
    pub fn quota(&self, principal: &Principal) -> usize {
        self.check(principal);
        self.pool.state().quota(principal.id)
    }

    /// Number of registered principals, including retiring ones
    #[must_use]
    pub fn principals(&self) -> usize {
        self.pool.state().principals()
    }

    /// Maximum number of concurrently admitted tasks
    #[must_use]
    pub fn max(&self) -> usize {
        self.pool.state().max()
    }

    /// Number of slots currently admitted, across all principals
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.pool.state().total()
    }

    /// Snapshot of the throttle's occupancy
    #[must_use]
    pub fn stats(&self) -> ThrottleStats {
        self.pool.stats()
    }

    fn check(&self, principal: &Principal) {
        assert!(
            Arc::ptr_eq(&self.pool, &principal.pool),
            "principal {} was registered with a different throttle",
            principal.id
        );
    }
}
