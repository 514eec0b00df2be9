//! Error handling and types

use thiserror::Error;

/// Recoverable throttle errors
///
/// Contract violations (a foreign [`Principal`](crate::Principal), a release
/// with no matching admission) are not represented here: they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThrottleError {
    /// Every principal slot is taken; one more could never be granted a share
    #[error("Principal registry full: a throttle with {max} slots accepts at most {max} principals")]
    RegistryFull {
        /// Capacity of the refusing throttle
        max: usize,
    },

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ThrottleError>;
