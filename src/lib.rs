//! compio-throttle: throttled wait groups for bounding task concurrency
//!
//! This library bounds how many tasks run at once while letting a caller
//! block until every admitted task has finished, a capacity-limited join
//! barrier. It is executor-agnostic and works with compio as well as any
//! other async runtime, from one thread or many.
//!
//! # Throttles
//!
//! - [`Throttle`] - One pool shared by every task
//! - [`FairThrottle`] - One pool split across registered [`Principal`]s, each
//!   capped at `ceil(max / N)` slots so no principal can starve the others
//!
//! Both hand out [`Slot`] guards that release on drop.
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_throttle::FairThrottle;
//!
//! #[compio::main]
//! async fn main() -> compio_throttle::Result<()> {
//!     let throttle = FairThrottle::new(8);
//!     let crawler = throttle.register()?;
//!
//!     let mut handles = Vec::new();
//!     for page in 0..100 {
//!         let slot = throttle.admit_as(&crawler).await;
//!         handles.push(compio::runtime::spawn(async move {
//!             println!("Fetching page {}", page);
//!             drop(slot);
//!         }));
//!     }
//!
//!     throttle.wait().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fair;
mod pool;
mod slot;
pub mod throttle;

// Re-export commonly used types
pub use config::{QuotaPolicy, ThrottleConfig};
pub use error::{Result, ThrottleError};
pub use fair::{FairThrottle, Principal};
pub use pool::ThrottleStats;
pub use slot::Slot;
pub use throttle::Throttle;
