//! Shared slot pool behind both throttles
//!
//! [`PoolState`] is the pure bookkeeping: the admitted total, the principal
//! registry and the fair-share arithmetic. [`Pool`] wraps it in the single
//! mutex that covers every counter and registry update, and pairs it with two
//! broadcast wait lists: one for blocked admitters, one for join-barrier
//! waiters.

use crate::config::QuotaPolicy;
use compio_sync::WaitList;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

/// Identifier of a registered principal, unique within its pool
pub(crate) type PrincipalId = u64;

/// Fair share of `max` slots split across `principals` principals: `ceil(max / principals)`
///
/// A divisor of zero is treated as one principal.
#[must_use]
pub(crate) fn fair_share(max: usize, principals: usize) -> usize {
    max.div_ceil(principals.max(1))
}

/// Registry entry of one principal
#[derive(Debug, Default)]
struct Member {
    /// Slots currently held
    held: usize,
    /// Handle dropped while slots were still out; leave on the last release
    retiring: bool,
}

/// Outcome of returning one slot to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Released {
    /// The pool has no admitted slots left
    pub(crate) drained: bool,
    /// A retiring principal released its last slot and left the registry
    pub(crate) retired: bool,
}

/// Counters and registry of a pool
///
/// Invariants, maintained by every method:
/// - `total <= max`
/// - `total` equals the sum of `held` over the registry when every admission
///   is scoped to a principal, and `held == 0` everywhere for global admission
/// - `members.len() <= max`
#[derive(Debug)]
pub(crate) struct PoolState {
    max: usize,
    total: usize,
    policy: QuotaPolicy,
    next_principal: PrincipalId,
    members: HashMap<PrincipalId, Member>,
}

impl PoolState {
    pub(crate) fn new(max: usize, policy: QuotaPolicy) -> Self {
        Self {
            max,
            total: 0,
            policy,
            next_principal: 1,
            members: HashMap::new(),
        }
    }

    pub(crate) fn max(&self) -> usize {
        self.max
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn principals(&self) -> usize {
        self.members.len()
    }

    /// Slots held by a principal
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered
    pub(crate) fn held(&self, id: PrincipalId) -> usize {
        self.member(id).held
    }

    /// Current fair share of a principal, evaluated against the live registry
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered
    pub(crate) fn quota(&self, id: PrincipalId) -> usize {
        let sharing = match self.policy {
            QuotaPolicy::Registered => self.members.len(),
            QuotaPolicy::Active => {
                let active = self.members.values().filter(|m| m.held > 0).count();
                // The caller competes for a share even before it holds anything
                if self.member(id).held == 0 {
                    active + 1
                } else {
                    active
                }
            }
        };
        fair_share(self.max, sharing)
    }

    /// Claim one slot if the pool (and the principal's share, when scoped) allows it
    pub(crate) fn try_admit(&mut self, principal: Option<PrincipalId>) -> bool {
        if self.total >= self.max {
            return false;
        }

        if let Some(id) = principal {
            let quota = self.quota(id);
            let member = self.member_mut(id);
            if member.held >= quota {
                return false;
            }
            member.held += 1;
        }

        self.total += 1;
        true
    }

    /// Return one slot
    ///
    /// # Panics
    ///
    /// Panics if no slot is outstanding for the pool or the principal
    pub(crate) fn release(&mut self, principal: Option<PrincipalId>) -> Released {
        assert!(
            self.total > 0,
            "slot released without a matching admission (pool total is 0)"
        );

        let mut retired = false;
        if let Some(id) = principal {
            let member = self.member_mut(id);
            assert!(
                member.held > 0,
                "slot released without a matching admission (principal {id} holds none)"
            );
            member.held -= 1;
            if member.held == 0 && member.retiring {
                self.members.remove(&id);
                retired = true;
            }
        }

        self.total -= 1;
        Released {
            drained: self.total == 0,
            retired,
        }
    }

    /// Add a principal, unless that would leave some principal without even one slot
    pub(crate) fn register(&mut self) -> Option<PrincipalId> {
        if self.members.len() >= self.max {
            return None;
        }
        let id = self.next_principal;
        self.next_principal += 1;
        self.members.insert(id, Member::default());
        Some(id)
    }

    /// Begin removing a principal; returns whether it left the registry right away
    ///
    /// A principal still holding slots stays registered (and keeps counting
    /// toward everyone's share) until its last slot is released.
    pub(crate) fn retire(&mut self, id: PrincipalId) -> bool {
        let member = self.member_mut(id);
        if member.held > 0 {
            member.retiring = true;
            return false;
        }
        self.members.remove(&id);
        true
    }

    fn member(&self, id: PrincipalId) -> &Member {
        match self.members.get(&id) {
            Some(member) => member,
            None => panic!("principal {id} is not registered with this throttle"),
        }
    }

    fn member_mut(&mut self, id: PrincipalId) -> &mut Member {
        match self.members.get_mut(&id) {
            Some(member) => member,
            None => panic!("principal {id} is not registered with this throttle"),
        }
    }
}

/// Snapshot of a throttle's occupancy
///
/// Values may change immediately after the snapshot is taken; use them for
/// monitoring, not for admission decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStats {
    /// Maximum number of admitted slots
    pub max: usize,
    /// Slots currently admitted
    pub in_use: usize,
    /// Slots free right now (`max - in_use`)
    pub available: usize,
    /// Registered principals, including retiring ones (always 0 for the global throttle)
    pub principals: usize,
}

/// A pool shared by every handle, slot and principal of one throttle
#[derive(Debug)]
pub(crate) struct Pool {
    state: Mutex<PoolState>,
    /// Tasks blocked in admission
    admitters: WaitList,
    /// Tasks blocked until the pool drains
    drainers: WaitList,
}

impl Pool {
    /// # Panics
    ///
    /// Panics if `max` is 0
    pub(crate) fn new(max: usize, policy: QuotaPolicy) -> Self {
        assert!(max > 0, "Throttle must allow at least one concurrent task");
        Self {
            state: Mutex::new(PoolState::new(max, policy)),
            admitters: WaitList::new(),
            drainers: WaitList::new(),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, PoolState> {
        // Every assertion fires before its counter is touched, so the state behind a poisoned lock is intact
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn try_admit(&self, principal: Option<PrincipalId>) -> bool {
        let admitted = self.state().try_admit(principal);
        if admitted {
            trace!(?principal, "slot admitted");
        }
        admitted
    }

    /// Wait until a slot can be claimed, then claim it
    pub(crate) async fn admit(&self, principal: Option<PrincipalId>) {
        self.admitters
            .wait_until(|| self.try_admit(principal).then_some(()))
            .await;
    }

    pub(crate) fn release(&self, principal: Option<PrincipalId>) {
        let released = self.state().release(principal);
        trace!(?principal, drained = released.drained, "slot released");
        if released.retired {
            debug!(?principal, "retired principal released its last slot");
        }

        // Both the pool total and possibly a share changed: every admitter re-checks
        self.admitters.notify_all();
        if released.drained {
            self.drainers.notify_all();
        }
    }

    /// Wait until no slot is admitted
    pub(crate) async fn wait(&self) {
        self.drainers
            .wait_until(|| (self.state().total() == 0).then_some(()))
            .await;
    }

    pub(crate) fn register(&self) -> Option<PrincipalId> {
        let mut state = self.state();
        let registered = state.register();
        match registered {
            Some(id) => debug!(
                principal = id,
                principals = state.principals(),
                quota = fair_share(state.max(), state.principals()),
                "principal registered"
            ),
            None => warn!(max = state.max(), "principal registry full, refusing registration"),
        }
        registered
    }

    pub(crate) fn retire(&self, id: PrincipalId) {
        let left = self.state().retire(id);
        if left {
            debug!(principal = id, "principal deregistered");
            // Fewer principals means larger shares for the rest
            self.admitters.notify_all();
        } else {
            debug!(principal = id, "principal retiring once its slots are released");
        }
    }

    pub(crate) fn stats(&self) -> ThrottleStats {
        let state = self.state();
        ThrottleStats {
            max: state.max(),
            in_use: state.total(),
            available: state.max() - state.total(),
            principals: state.principals(),
        }
    }

    #[cfg(test)]
    pub(crate) fn parked_admitters(&self) -> usize {
        self.admitters.len()
    }
}
