//! RAII guard for one admitted unit of work

use crate::pool::{Pool, PrincipalId};
use std::fmt;
use std::sync::Arc;

/// One admitted slot of a throttle
///
/// Returned by the admission methods of [`Throttle`](crate::Throttle) and
/// [`FairThrottle`](crate::FairThrottle). The slot is released when the guard
/// is dropped, on every exit path of the task holding it (including panics),
/// and wakes every task blocked in admission so each can re-check whether it
/// may proceed. A slot can be moved into the spawned task it accounts for.
///
/// # Example
///
/// ```rust,no_run
/// use compio_throttle::Throttle;
///
/// # async fn example() {
/// let throttle = Throttle::new(10);
///
/// {
///     let slot = throttle.admit().await;
///     // Slot is held here
/// } // Slot released automatically when scope ends
///
/// assert_eq!(throttle.in_use(), 0);
/// # }
/// ```
#[must_use = "dropping a slot releases it immediately"]
pub struct Slot {
    /// Pool the slot was admitted from
    pool: Arc<Pool>,
    /// Principal the slot is charged to, if any
    principal: Option<PrincipalId>,
}

impl Slot {
    pub(crate) fn new(pool: Arc<Pool>, principal: Option<PrincipalId>) -> Self {
        Self { pool, principal }
    }

    /// Release the slot now
    ///
    /// Equivalent to dropping it; spelled out for call sites where the
    /// release point matters.
    pub fn release(self) {
        drop(self);
    }

    /// Id of the principal the slot is charged to (`None` for the global throttle)
    #[must_use]
    pub fn principal_id(&self) -> Option<u64> {
        self.principal
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.pool.release(self.principal);
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}
