//! Rate limiting of component interactions.
//!
//! Components may reference a named rate limit group. The listener asks a [`RateLimiter`]
//! for a token before dispatching; when none is available the limiter informs the user
//! itself and the interaction is dropped. [`RateLimitContainer`] keeps one keyed
//! `governor` limiter per group, keyed by user id.
//!
//! `governor` cannot give a cell back, so refunded tokens are kept as credits spent before
//! the limiter is asked again. A credit expires once the bucket would have refilled anyway.

use crate::config::components::{ComponentsConfig, DefaultMessages};
use crate::core::interaction::ComponentInteraction;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Acquisitions between two prunes of idle users.
const PRUNE_INTERVAL: u64 = 1024;

/// Lets a handler give back the token its interaction consumed.
#[derive(Clone, Debug, Default)]
pub struct CancellableRateLimit {
    cancelled: Arc<AtomicBool>,
}

impl CancellableRateLimit {
    /// Marks the consumed token to be given back once the handler returns.
    pub fn cancel_rate_limit(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`CancellableRateLimit::cancel_rate_limit`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Decision point applied to interactions on rate limited components.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Whether a rate limit group with this name is declared.
    fn contains(&self, group: &str) -> bool;

    /// Takes a token from the bucket of the interacting user.
    ///
    /// Returns `false` when the user is rate limited, in which case the limiter has
    /// already told the user.
    async fn try_acquire(&self, group: &str, interaction: &dyn ComponentInteraction)
    -> Result<bool>;

    /// Gives back a token taken by [`RateLimiter::try_acquire`].
    fn refund(&self, group: &str, user_id: u64);
}

struct Bucket {
    limiter: DefaultKeyedRateLimiter<u64>,
    capacity: u32,
    full_refill: Duration,
}

impl Bucket {
    fn new(group: &str, capacity: u32, refill_seconds: u64) -> Result<Self> {
        let invalid = || Error::Config {
            message: format!(
                "Rate limit group '{group}' must have a non-zero capacity and refill delay"
            ),
        };
        let burst = NonZeroU32::new(capacity).ok_or_else(invalid)?;
        let refill = Duration::from_secs(refill_seconds);
        let quota = Quota::with_period(refill).ok_or_else(invalid)?.allow_burst(burst);

        Ok(Self {
            limiter: DefaultKeyedRateLimiter::keyed(quota),
            capacity,
            full_refill: refill * capacity,
        })
    }
}

#[derive(Debug)]
struct Credit {
    tokens: u32,
    expires: Instant,
}

/// In-memory per-user rate limits, one `governor` limiter per named group.
pub struct RateLimitContainer {
    buckets: HashMap<String, Bucket>,
    credits: DashMap<(String, u64), Credit>,
    acquisitions: AtomicU64,
    messages: DefaultMessages,
}

impl RateLimitContainer {
    /// A container without any rate limit group.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            buckets: HashMap::new(),
            credits: DashMap::new(),
            acquisitions: AtomicU64::new(0),
            messages: DefaultMessages::default(),
        }
    }

    /// Builds the limiters declared in the configuration.
    pub fn from_config(config: &ComponentsConfig) -> Result<Self> {
        let mut buckets = HashMap::new();
        for rate_limit in &config.rate_limits {
            let bucket = Bucket::new(
                &rate_limit.group,
                rate_limit.capacity,
                rate_limit.refill_seconds,
            )?;
            if buckets.insert(rate_limit.group.clone(), bucket).is_some() {
                return Err(Error::Config {
                    message: format!("Rate limit group '{}' is declared twice", rate_limit.group),
                });
            }
        }

        Ok(Self {
            buckets,
            messages: config.messages.clone(),
            ..Self::empty()
        })
    }

    /// Forgets users whose buckets are full again and expired credits.
    pub fn prune(&self) {
        for bucket in self.buckets.values() {
            bucket.limiter.retain_recent();
            bucket.limiter.shrink_to_fit();
        }
        let now = Instant::now();
        self.credits
            .retain(|_, credit| credit.tokens > 0 && credit.expires > now);
    }

    /// Number of users currently tracked across all groups.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.buckets
            .values()
            .map(|bucket| bucket.limiter.len())
            .sum::<usize>()
            + self.credits.len()
    }

    /// Spends a refunded token, if the user has one left.
    fn take_credit(&self, group: &str, user_id: u64) -> bool {
        let key = (group.to_string(), user_id);
        let now = Instant::now();
        let taken = match self.credits.get_mut(&key) {
            Some(mut credit) if credit.tokens > 0 && credit.expires > now => {
                credit.tokens -= 1;
                true
            }
            _ => false,
        };
        self.credits
            .remove_if(&key, |_, credit| credit.tokens == 0 || credit.expires <= now);
        taken
    }
}

#[async_trait]
impl RateLimiter for RateLimitContainer {
    fn contains(&self, group: &str) -> bool {
        self.buckets.contains_key(group)
    }

    async fn try_acquire(
        &self,
        group: &str,
        interaction: &dyn ComponentInteraction,
    ) -> Result<bool> {
        let bucket = self
            .buckets
            .get(group)
            .ok_or_else(|| Error::user(format!("Unknown rate limit group '{group}'")))?;
        let acquisitions = self.acquisitions.fetch_add(1, Ordering::Relaxed) + 1;
        if acquisitions % PRUNE_INTERVAL == 0 {
            self.prune();
        }

        let user_id = interaction.user_id();
        if self.take_credit(group, user_id) {
            return Ok(true);
        }

        match bucket.limiter.check_key(&user_id) {
            Ok(_) => Ok(true),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                trace!("User {user_id} is rate limited on '{group}' for {wait:?}");
                let seconds = (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1);
                interaction
                    .reply_ephemeral(&self.messages.rate_limited_message(seconds))
                    .await?;
                Ok(false)
            }
        }
    }

    fn refund(&self, group: &str, user_id: u64) {
        let Some(bucket) = self.buckets.get(group) else {
            return;
        };
        let expires = Instant::now() + bucket.full_refill;
        let mut credit = self
            .credits
            .entry((group.to_string(), user_id))
            .or_insert(Credit { tokens: 0, expires });
        credit.tokens = (credit.tokens + 1).min(bucket.capacity);
        credit.expires = expires;
    }
}
