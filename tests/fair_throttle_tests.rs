//! Integration tests for the fair throttle
//!
//! These tests run several principals against one pool and verify that shares
//! hold under real scheduling, and that work depending on another principal's
//! slots completes instead of deadlocking.

mod common;

use common::{abort_after, init_tracing};
use compio_throttle::{FairThrottle, QuotaPolicy, Throttle, ThrottleError};
use futures::poll;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Three principals, ten tasks each, five slots
#[compio::test]
async fn test_three_principals_share_five_slots() {
    init_tracing();
    let _deadline = abort_after(Duration::from_secs(30));

    let throttle = FairThrottle::new(5);
    let principals: Vec<_> = (0..3)
        .map(|_| Arc::new(throttle.register().unwrap()))
        .collect();
    let completed = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut launchers = Vec::new();
    for principal in &principals {
        let throttle = throttle.clone();
        let principal = Arc::clone(principal);
        let completed = Arc::clone(&completed);
        let peak = Arc::clone(&peak);

        launchers.push(compio::runtime::spawn(async move {
            let mut workers = Vec::new();
            for j in 0..10u64 {
                let slot = throttle.admit_as(&principal).await;
                assert!(throttle.held(&principal) <= throttle.quota(&principal));
                assert_eq!(throttle.quota(&principal), 2);
                peak.fetch_max(throttle.in_use(), Ordering::SeqCst);

                let completed = Arc::clone(&completed);
                workers.push(compio::runtime::spawn(async move {
                    compio::time::sleep(Duration::from_millis(1 + j % 2)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    drop(slot);
                }));
            }
            workers
        }));
    }

    let mut workers = Vec::new();
    for launcher in launchers {
        workers.extend(launcher.await.unwrap());
    }

    throttle.wait().await;
    assert_eq!(completed.load(Ordering::SeqCst), 30);
    assert_eq!(throttle.in_use(), 0);
    assert!(peak.load(Ordering::SeqCst) <= 5);

    for worker in workers {
        worker.await.unwrap();
    }
}

/// Every task of `outer` needs a slot of `inner` before it can finish
///
/// With one global counter, `outer` could take all four slots and leave its
/// own tasks waiting forever for `inner`. Capped at half the pool, `outer`
/// always leaves room for the work it depends on.
#[compio::test]
async fn test_cross_principal_dependency_completes() {
    init_tracing();
    let _deadline = abort_after(Duration::from_secs(30));

    let throttle = FairThrottle::new(4);
    let outer = throttle.register().unwrap();
    let inner = Arc::new(throttle.register().unwrap());
    let finished = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..12 {
        let outer_slot = throttle.admit_as(&outer).await;
        assert!(throttle.held(&outer) <= 2);

        let throttle = throttle.clone();
        let inner = Arc::clone(&inner);
        let finished = Arc::clone(&finished);
        handles.push(compio::runtime::spawn(async move {
            let inner_slot = throttle.admit_as(&inner).await;
            compio::time::sleep(Duration::from_millis(1)).await;
            drop(inner_slot);
            finished.fetch_add(1, Ordering::SeqCst);
            drop(outer_slot);
        }));
    }

    throttle.wait().await;
    assert_eq!(finished.load(Ordering::SeqCst), 12);

    for handle in handles {
        handle.await.unwrap();
    }
}

/// The same dependency shape on the global throttle fills the pool with outer work
#[compio::test]
async fn test_global_throttle_lets_one_caller_fill_the_pool() {
    let throttle = Throttle::new(4);
    let outer: Vec<_> = (0..4).map(|_| throttle.try_admit().unwrap()).collect();

    // Nothing is left for the work the outer tasks depend on
    assert!(throttle.try_admit().is_none());

    drop(outer);
    throttle.wait().await;
}

#[test]
fn test_registration_refusal_does_not_block() {
    let throttle = FairThrottle::new(2);
    let a = throttle.register().unwrap();
    let b = throttle.register().unwrap();

    assert_eq!(
        throttle.register().unwrap_err(),
        ThrottleError::RegistryFull { max: 2 }
    );
    assert_ne!(a.id(), b.id());
}

/// Principals registering late shrink the shares of principals already running
#[compio::test]
async fn test_late_registration_is_eventually_fair() {
    let _deadline = abort_after(Duration::from_secs(30));

    let throttle = FairThrottle::new(4);
    let early = throttle.register().unwrap();
    let early_slots: Vec<_> =
        futures::future::join_all((0..4).map(|_| throttle.admit_as(&early))).await;
    assert_eq!(throttle.held(&early), 4);

    let late = throttle.register().unwrap();
    assert_eq!(throttle.quota(&early), 2);
    assert!(throttle.try_admit_as(&early).is_none());
    assert!(throttle.try_admit_as(&late).is_none());

    // As `early` drains back under its new share, `late` gets its slots
    let mut early_slots = early_slots.into_iter();
    for _ in 0..2 {
        drop(early_slots.next());
    }
    let late_slots: Vec<_> =
        futures::future::join_all((0..2).map(|_| throttle.admit_as(&late))).await;
    assert_eq!(throttle.held(&late), 2);
    assert_eq!(throttle.held(&early), 2);
    assert!(throttle.try_admit_as(&early).is_none());

    drop(early_slots);
    drop(late_slots);
    throttle.wait().await;
}

/// Under the active policy an idle registration does not dilute the busy principal
#[test]
fn test_active_policy_with_idle_principal() {
    let throttle = FairThrottle::with_policy(4, QuotaPolicy::Active);
    let busy = throttle.register().unwrap();
    let _idle = throttle.register().unwrap();

    let slots: Vec<_> = (0..4).map(|_| throttle.try_admit_as(&busy)).collect();
    assert!(slots.iter().all(Option::is_some));
    assert_eq!(throttle.held(&busy), 4);

    let registered = FairThrottle::new(4);
    let busy = registered.register().unwrap();
    let _idle = registered.register().unwrap();
    let slots: Vec<_> = (0..4).map(|_| registered.try_admit_as(&busy)).collect();
    assert_eq!(slots.iter().filter(|s| s.is_some()).count(), 2);
}

/// The active policy lets one principal fill the pool and starve a principal it depends on
///
/// `outer` is the only principal holding slots, so its quota is the whole
/// pool. Its tasks would need an `inner` slot to finish, and `inner` can
/// never be admitted: the deadlock the registered policy prevents.
#[compio::test]
async fn test_active_policy_gives_up_deadlock_avoidance() {
    let throttle = FairThrottle::with_policy(4, QuotaPolicy::Active);
    let outer = throttle.register().unwrap();
    let inner = throttle.register().unwrap();

    let mut outer_slots = Vec::new();
    while let Some(slot) = throttle.try_admit_as(&outer) {
        outer_slots.push(slot);
    }
    assert_eq!(throttle.held(&outer), 4);
    assert_eq!(throttle.quota(&outer), 4);
    assert_eq!(throttle.in_use(), 4);

    let mut dependency = pin!(throttle.admit_as(&inner));
    assert!(poll!(dependency.as_mut()).is_pending());
    assert_eq!(throttle.held(&inner), 0);

    // Same shape under the default policy: `outer` stops at half the pool
    let registered = FairThrottle::new(4);
    let outer_r = registered.register().unwrap();
    let inner_r = registered.register().unwrap();
    let mut held_r = Vec::new();
    while let Some(slot) = registered.try_admit_as(&outer_r) {
        held_r.push(slot);
    }
    assert_eq!(registered.held(&outer_r), 2);
    assert!(registered.try_admit_as(&inner_r).is_some());

    // Only releasing `outer`'s slots, which its tasks never would, unblocks `inner`
    drop(outer_slots);
    let _inner_slot = dependency.await;
    assert_eq!(throttle.held(&inner), 1);
}

/// Principals on separate threads never exceed their shares
#[test]
fn test_principals_on_threads() {
    init_tracing();
    let _deadline = abort_after(Duration::from_secs(30));

    let throttle = FairThrottle::new(6);
    let principals: Vec<_> = (0..3).map(|_| throttle.register().unwrap()).collect();
    let over_quota = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for principal in &principals {
            for _ in 0..3 {
                let throttle = &throttle;
                let over_quota = &over_quota;
                scope.spawn(move || {
                    for _ in 0..10 {
                        let slot = futures::executor::block_on(throttle.admit_as(principal));
                        if throttle.held(principal) > 2 || throttle.in_use() > 6 {
                            over_quota.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::sleep(Duration::from_micros(200));
                        drop(slot);
                    }
                });
            }
        }
    });

    futures::executor::block_on(throttle.wait());
    assert_eq!(over_quota.load(Ordering::SeqCst), 0);
    assert_eq!(throttle.in_use(), 0);
    for principal in &principals {
        assert_eq!(throttle.held(principal), 0);
    }
}
