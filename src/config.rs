//! Throttle configuration

use crate::error::{Result, ThrottleError};
use std::fmt;
use std::str::FromStr;

/// Which principals divide the pool when computing a fair share
///
/// The quota of a principal is always `ceil(max / N)`; the policy decides `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotaPolicy {
    /// Every registered principal counts, whether or not it holds slots
    ///
    /// Shares never shrink underneath a principal that is busy while others
    /// sit idle, so a principal that starts late is guaranteed its share.
    #[default]
    Registered,
    /// Only principals holding at least one slot count, plus the caller
    ///
    /// Idle principals stop diluting everyone else's share, so a lone busy
    /// principal may take the whole pool. This gives up deadlock avoidance:
    /// if its tasks wait on work that an idle principal has yet to admit,
    /// that work never gets a slot. Use only when principals never depend on
    /// each other's tasks.
    Active,
}

impl fmt::Display for QuotaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Active => write!(f, "active"),
        }
    }
}

impl FromStr for QuotaPolicy {
    type Err = ThrottleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registered" => Ok(Self::Registered),
            "active" => Ok(Self::Active),
            other => Err(ThrottleError::InvalidConfig(format!(
                "unknown quota policy '{other}' (expected 'registered' or 'active')"
            ))),
        }
    }
}

/// Settings for building a [`Throttle`](crate::Throttle) or [`FairThrottle`](crate::FairThrottle)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Maximum number of admitted tasks at any instant
    ///
    /// Also bounds the number of principals a fair throttle accepts.
    pub max_concurrency: usize,

    /// How fair shares are computed (ignored by the global throttle)
    pub quota_policy: QuotaPolicy,
}

impl Default for ThrottleConfig {
    /// One slot per logical CPU, counting every registered principal
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get(),
            quota_policy: QuotaPolicy::default(),
        }
    }
}

impl ThrottleConfig {
    /// Configuration for `max_concurrency` slots with the default quota policy
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            quota_policy: QuotaPolicy::default(),
        }
    }

    /// Replace the quota policy
    #[must_use]
    pub fn with_quota_policy(mut self, quota_policy: QuotaPolicy) -> Self {
        self.quota_policy = quota_policy;
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidConfig`] if `max_concurrency` is zero
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(ThrottleError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
