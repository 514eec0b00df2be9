//! Async synchronization primitives for compio runtime
//!
//! This crate provides the signaling building block used by `compio-throttle`.
//! It only deals in [`std::task::Waker`]s, so it works under compio as well as
//! any other executor.
//!
//! # Primitives
//!
//! - [`WaitList`] - Broadcast list of parked tasks, each re-checking its own condition
//! - [`WaitUntil`] - Future returned by [`WaitList::wait_until`]
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::WaitList;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! #[compio::main]
//! async fn main() {
//!     let ready = AtomicBool::new(false);
//!     let list = WaitList::new();
//!
//!     // Another task flips the flag and calls `list.notify_all()`
//!     list.wait_until(|| ready.load(Ordering::Acquire).then_some(())).await;
//! }
//! ```

mod wait_list;

pub use wait_list::{WaitList, WaitUntil};
