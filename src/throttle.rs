//! Global throttle: one capacity pool shared by every task
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_throttle::Throttle;
//!
//! # async fn example() {
//! // At most 3 tasks in flight
//! let throttle = Throttle::new(3);
//!
//! let mut handles = Vec::new();
//! for i in 0..10 {
//!     // Blocks while 3 slots are out
//!     let slot = throttle.admit().await;
//!     handles.push(compio::runtime::spawn(async move {
//!         println!("Task {}", i);
//!         drop(slot);
//!     }));
//! }
//!
//! // Join barrier: returns once every slot is released
//! throttle.wait().await;
//! # drop(handles);
//! # }
//! ```

use crate::config::{QuotaPolicy, ThrottleConfig};
use crate::error::Result;
use crate::pool::{Pool, ThrottleStats};
use crate::slot::Slot;
use std::future::Future;
use std::sync::Arc;

/// A throttled wait group bounding how many tasks run at once
///
/// Each task is admitted before it starts ([`admit`](Self::admit)) and
/// releases its [`Slot`] when done; [`wait`](Self::wait) blocks until every
/// admitted slot has been released.
///
/// # Design
///
/// - **Single lock**: the admitted total is only read and written under the pool mutex
/// - **Broadcast wakeups**: each release wakes every blocked admitter, which re-checks capacity;
///   there is no FIFO ordering among waiters
/// - **RAII slots**: a slot cannot be released twice, nor released without being admitted
/// - **Cloneable**: handles share one pool through an `Arc`
#[derive(Clone, Debug)]
pub struct Throttle {
    /// Shared pool of all clones of this throttle
    pool: Arc<Pool>,
}

impl Throttle {
    /// Create a throttle allowing `max` concurrently admitted tasks
    ///
    /// # Panics
    ///
    /// Panics if `max` is 0
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_throttle::Throttle;
    ///
    /// let throttle = Throttle::new(16);
    /// assert_eq!(throttle.max(), 16);
    /// assert_eq!(throttle.available(), 16);
    /// ```
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            pool: Arc::new(Pool::new(max, QuotaPolicy::default())),
        }
    }

    /// Create a throttle from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidConfig`](crate::ThrottleError::InvalidConfig)
    /// if the configuration does not validate
    pub fn from_config(config: &ThrottleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.max_concurrency))
    }

    /// Admit one task, waiting while the pool is full
    ///
    /// May wait indefinitely if slots are never released. Dropping the
    /// returned future before it completes leaves the throttle untouched.
    pub async fn admit(&self) -> Slot {
        self.pool.admit(None).await;
        Slot::new(Arc::clone(&self.pool), None)
    }

    /// Admit one task if a slot is free right now
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_throttle::Throttle;
    ///
    /// let throttle = Throttle::new(1);
    ///
    /// let slot = throttle.try_admit();
    /// assert!(slot.is_some());
    /// assert!(throttle.try_admit().is_none()); // Pool is full
    /// ```
    #[must_use]
    pub fn try_admit(&self) -> Option<Slot> {
        self.pool
            .try_admit(None)
            .then(|| Slot::new(Arc::clone(&self.pool), None))
    }

    /// Admit, run `task` to completion, then release
    pub async fn run<F>(&self, task: F) -> F::Output
    where
        F: Future,
    {
        let _slot = self.admit().await;
        task.await
    }

    /// Wait until every admitted slot has been released
    ///
    /// Resolves immediately on an idle throttle. Tasks admitted while this
    /// future is pending are waited for too.
    pub async fn wait(&self) {
        self.pool.wait().await;
    }

    /// Maximum number of concurrently admitted tasks
    #[must_use]
    pub fn max(&self) -> usize {
        self.pool.state().max()
    }

    /// Number of slots currently admitted
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.pool.state().total()
    }

    /// Number of free slots (`max - in_use`)
    #[must_use]
    pub fn available(&self) -> usize {
        self.stats().available
    }

    /// Snapshot of the throttle's occupancy
    #[must_use]
    pub fn stats(&self) -> ThrottleStats {
        self.pool.stats()
    }
}
