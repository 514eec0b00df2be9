//! Broadcast wait list for condition-based wakeups
//!
//! A [`WaitList`] holds the wakers of tasks that are parked until some shared
//! condition becomes true. It carries no state of its own: the condition lives
//! with the caller (typically behind the caller's own mutex) and every
//! notification wakes *all* parked tasks, each of which re-checks its own
//! condition. Tasks waiting on different predicates can therefore share one
//! list without losing wakeups.
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::WaitList;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! # async fn example() {
//! let in_flight = AtomicUsize::new(3);
//! let drained = WaitList::new();
//!
//! // Waiter side: park until the counter hits zero
//! drained
//!     .wait_until(|| (in_flight.load(Ordering::Acquire) == 0).then_some(()))
//!     .await;
//!
//! // Notifier side: change the state first, then notify
//! in_flight.fetch_sub(1, Ordering::AcqRel);
//! drained.notify_all();
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

/// A list of parked tasks woken together on every notification
///
/// # Design
///
/// - **Broadcast**: [`notify_all`](Self::notify_all) drains every waker, so no event is lost
///   when waiters check different predicates
/// - **Non-blocking notify**: wakers are taken under the lock and invoked after it is released
/// - **Keyed entries**: each waiting future owns at most one entry, replaced on re-poll
///   and removed on drop
#[derive(Default)]
pub struct WaitList {
    /// Parked wakers keyed by the future that registered them
    waiters: Mutex<Waiters>,
}

/// Waker storage guarded by the list's mutex
#[derive(Default)]
struct Waiters {
    /// Key handed to the next newly parked future
    next_key: u64,
    /// Wakers of currently parked futures
    wakers: HashMap<u64, Waker>,
}

impl WaitList {
    /// Create an empty wait list
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::WaitList;
    ///
    /// let list = WaitList::new();
    /// assert!(list.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `condition` returns `Some`, yielding its value
    ///
    /// The condition is evaluated on the first poll and again after every
    /// notification. It must read state that notifiers modify *before* they
    /// call [`notify_all`](Self::notify_all); the future re-checks the
    /// condition after parking, so an update racing with the park is never
    /// missed.
    ///
    /// The condition is free to claim a resource when it succeeds (for
    /// example increment a counter under a lock): it runs to completion at
    /// most once with a `Some` result.
    pub fn wait_until<T, F>(&self, condition: F) -> WaitUntil<'_, T, F>
    where
        F: FnMut() -> Option<T>,
    {
        WaitUntil {
            list: self,
            condition,
            key: None,
        }
    }

    /// Wake every parked task, returning how many were woken
    ///
    /// Never blocks on the woken tasks; each one is merely scheduled and
    /// re-checks its own condition when polled.
    pub fn notify_all(&self) -> usize {
        let wakers: Vec<Waker> = self.lock().wakers.drain().map(|(_, waker)| waker).collect();
        let woken = wakers.len();
        for waker in wakers {
            waker.wake();
        }
        woken
    }

    /// Number of tasks currently parked on the list
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().wakers.len()
    }

    /// Whether no task is currently parked on the list
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().wakers.is_empty()
    }

    /// Park `waker` under `key`, allocating a key on first use or after a drain
    fn park(&self, key: &mut Option<u64>, waker: &Waker) {
        let mut waiters = self.lock();

        if let Some(existing) = key.and_then(|k| waiters.wakers.get_mut(&k)) {
            if !existing.will_wake(waker) {
                existing.clone_from(waker);
            }
            return;
        }

        let new_key = waiters.next_key;
        waiters.next_key = waiters.next_key.wrapping_add(1);
        waiters.wakers.insert(new_key, waker.clone());
        *key = Some(new_key);
    }

    /// Remove a parked entry, if it is still present
    fn unpark(&self, key: u64) {
        self.lock().wakers.remove(&key);
    }

    fn lock(&self) -> MutexGuard<'_, Waiters> {
        // Wakers are only ever inserted or removed whole, so a poisoned list is still consistent
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for WaitList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitList")
            .field("waiters", &self.len())
            .finish()
    }
}

/// Future that resolves once its condition yields a value
///
/// Returned by [`WaitList::wait_until`]. On each poll it will:
/// 1. Evaluate the condition and finish if it yields `Some`
/// 2. Otherwise park the task's waker on the list
/// 3. Evaluate the condition once more, so an update that raced with parking is seen
///
/// Dropping the future removes its waker from the list.
#[must_use = "futures do nothing unless polled"]
pub struct WaitUntil<'a, T, F>
where
    F: FnMut() -> Option<T>,
{
    /// The list this future parks on
    list: &'a WaitList,
    /// Predicate that claims the awaited value
    condition: F,
    /// Entry in the list while parked
    key: Option<u64>,
}

// No field is ever structurally pinned.
impl<T, F> Unpin for WaitUntil<'_, T, F> where F: FnMut() -> Option<T> {}

impl<T, F> WaitUntil<'_, T, F>
where
    F: FnMut() -> Option<T>,
{
    fn finish(&mut self, value: T) -> Poll<T> {
        if let Some(key) = self.key.take() {
            self.list.unpark(key);
        }
        Poll::Ready(value)
    }
}

impl<T, F> Future for WaitUntil<'_, T, F>
where
    F: FnMut() -> Option<T>,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(value) = (this.condition)() {
            return this.finish(value);
        }

        this.list.park(&mut this.key, cx.waker());

        if let Some(value) = (this.condition)() {
            return this.finish(value);
        }

        Poll::Pending
    }
}

impl<T, F> Drop for WaitUntil<'_, T, F>
where
    F: FnMut() -> Option<T>,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.list.unpark(key);
        }
    }
}
