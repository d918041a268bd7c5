//! In-memory rate limiter implementation using token bucket algorithm.
//!
//! Buckets refill one permit every `window / capacity`, so a bucket that was
//! drained regains its full capacity after one window. The per-key map is
//! bounded: idle buckets are retired by a periodic sweep and, when the map is
//! full, a batch of the least recently used buckets is evicted to make room.

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

#[cfg(any(test, feature = "config"))]
use clap::Args;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::utility::tracing_targets::RATE_LIMITER as TRACING_TARGET;
use crate::{Error, Result};

/// Rate limiter key type.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    /// The single bucket shared by all traffic.
    Global,
    /// One bucket per client address.
    Client(IpAddr),
}

impl RateLimitKey {
    /// Creates a key from a client IP address.
    #[inline]
    pub fn from_ip(ip: IpAddr) -> Self {
        Self::Client(ip)
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Client(ip) => write!(f, "client:{ip}"),
        }
    }
}

/// Named traffic classes with independent limits.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
#[derive(strum::Display, strum::IntoStaticStr)]
pub enum RateLimitPolicy {
    /// General API traffic.
    #[strum(serialize = "api")]
    Api,
    /// GraphQL endpoint traffic.
    #[strum(serialize = "graphql")]
    GraphQl,
    /// Login and registration traffic (the tightest).
    #[strum(serialize = "authentication")]
    Authentication,
}

impl RateLimitPolicy {
    /// Returns the policy name.
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Rejection produced when a bucket has no permit left.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {key} ({policy})")]
pub struct RateLimitExceeded {
    /// Key whose bucket is empty.
    pub key: RateLimitKey,
    /// Policy of the limiter that rejected the request.
    pub policy: RateLimitPolicy,
    /// Time until the next permit becomes available.
    pub retry_after: Duration,
}

impl RateLimitExceeded {
    /// Returns [`retry_after`] rounded up to whole seconds, at least one.
    ///
    /// [`retry_after`]: Self::retry_after
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let secs = if self.retry_after.subsec_nanos() > 0 { secs + 1 } else { secs };
        secs.max(1)
    }
}

/// Bucket capacity and refill window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed in the time window.
    pub capacity: u32,
    /// Time over which an empty bucket refills completely.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Creates a new rate limit configuration.
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
        }
    }

    /// Creates a configuration for N requests per minute.
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Time needed to regain a single permit.
    pub fn refill_interval(&self) -> Duration {
        (self.window / self.capacity).max(Duration::from_nanos(1))
    }
}

/// Token bucket for rate limiting.
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Number of permits available.
    tokens: u32,
    /// Start of the refill interval in progress.
    last_refill: Instant,
    /// Last time a permit check touched this bucket.
    last_seen: Instant,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    /// Adds the permits earned since the last refill, up to capacity.
    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        if self.tokens >= config.capacity {
            self.last_refill = now;
            return;
        }

        let interval = config.refill_interval();
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_nanos() / interval.as_nanos();
        let missing = u128::from(config.capacity - self.tokens);

        if earned >= missing {
            self.tokens = config.capacity;
            self.last_refill = now;
        } else {
            // earned < missing <= u32::MAX
            let earned = earned as u32;
            self.tokens += earned;
            self.last_refill += interval * earned;
        }
    }

    fn try_consume(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.refill(config, now);
        self.last_seen = now;

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Returns time until next permit is available.
    fn time_until_available(&self, config: &RateLimitConfig, now: Instant) -> Duration {
        if self.tokens > 0 {
            return Duration::ZERO;
        }

        let next = self.last_refill + config.refill_interval();
        next.saturating_duration_since(now)
    }

    /// Whether the bucket would be back at full capacity by `now`.
    fn is_idle(&self, config: &RateLimitConfig, now: Instant) -> bool {
        let mut refilled = self.clone();
        refilled.refill(config, now);
        refilled.tokens >= config.capacity
    }
}

struct RateLimiterInner {
    buckets: DashMap<RateLimitKey, TokenBucket>,
    /// Tracked bucket count, kept apart so checks never lock every shard.
    len: AtomicUsize,
    policy: RateLimitPolicy,
    config: RateLimitConfig,
    max_keys: usize,
    eviction_batch: usize,
}

impl RateLimiterInner {
    /// Removes buckets that have refilled to full capacity.
    fn retain_active(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            let idle = bucket.is_idle(&self.config, now);
            removed += usize::from(idle);
            !idle
        });

        self.len.fetch_sub(removed, Ordering::Relaxed);
        removed
    }

    fn remove(&self, key: &RateLimitKey) -> bool {
        let removed = self.buckets.remove(key).is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Frees room for at least [`Self::eviction_batch`] new keys.
    ///
    /// Idle buckets go first, then the least recently used ones, so a scan
    /// runs at most once per batch of new keys.
    fn make_room(&self, now: Instant) {
        self.retain_active(now);

        let target = self.max_keys.saturating_sub(self.eviction_batch);
        let excess = self.len.load(Ordering::Relaxed).saturating_sub(target);
        if excess == 0 {
            return;
        }

        let mut entries: Vec<(RateLimitKey, Instant)> = self
            .buckets
            .iter()
            .map(|entry| (*entry.key(), entry.last_seen))
            .collect();

        let excess = excess.min(entries.len());
        if excess == 0 {
            return;
        }

        entries.select_nth_unstable_by_key(excess - 1, |(_, last_seen)| *last_seen);
        let evicted = entries[..excess]
            .iter()
            .filter(|(key, _)| self.remove(key))
            .count();

        tracing::debug!(
            target: TRACING_TARGET,
            policy = self.policy.as_str(),
            evicted,
            "evicted least recently used buckets"
        );
    }
}

/// In-memory rate limiter using token bucket algorithm.
///
/// Buckets live in a sharded [`DashMap`]: a check locks only the shard of its
/// own key. Cheap to clone; clones share the same buckets.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

impl RateLimiter {
    /// Creates a new rate limiter tracking about `max_keys` buckets.
    ///
    /// Concurrent first requests from new clients may briefly overshoot the
    /// bound by a few buckets.
    pub fn new(policy: RateLimitPolicy, config: RateLimitConfig, max_keys: usize) -> Self {
        let max_keys = max_keys.max(1);
        let inner = RateLimiterInner {
            buckets: DashMap::new(),
            len: AtomicUsize::new(0),
            policy,
            config,
            max_keys,
            eviction_batch: (max_keys / 16).max(1),
        };

        tracing::info!(
            target: TRACING_TARGET,
            policy = policy.as_str(),
            capacity = config.capacity,
            window_secs = config.window.as_secs(),
            max_keys,
            "rate limiter initialized"
        );

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns the policy this limiter enforces.
    #[inline]
    pub fn policy(&self) -> RateLimitPolicy {
        self.inner.policy
    }

    /// Returns the bucket configuration.
    #[inline]
    pub fn config(&self) -> RateLimitConfig {
        self.inner.config
    }

    /// Consumes one permit for `key`, or rejects without waiting.
    ///
    /// The refill and consume step holds the lock of the key's shard, so two
    /// concurrent checks never both take the last permit of a bucket.
    pub fn check(&self, key: RateLimitKey) -> Result<(), RateLimitExceeded> {
        let inner = &*self.inner;
        let config = &inner.config;
        let now = Instant::now();

        if inner.len.load(Ordering::Relaxed) >= inner.max_keys
            && !inner.buckets.contains_key(&key)
        {
            inner.make_room(now);
        }

        let mut bucket = inner.buckets.entry(key).or_insert_with(|| {
            inner.len.fetch_add(1, Ordering::Relaxed);
            TokenBucket::full(config, now)
        });

        if bucket.try_consume(config, now) {
            return Ok(());
        }

        let retry_after = bucket.time_until_available(config, now);
        drop(bucket);

        tracing::warn!(
            target: TRACING_TARGET,
            key = %key,
            policy = inner.policy.as_str(),
            retry_after_ms = retry_after.as_millis() as u64,
            "rate limit exceeded"
        );

        Err(RateLimitExceeded {
            key,
            policy: inner.policy,
            retry_after,
        })
    }

    /// Resets the rate limit for a specific key.
    pub fn reset(&self, key: &RateLimitKey) {
        self.inner.remove(key);
        tracing::debug!(
            target: TRACING_TARGET,
            key = %key,
            "rate limit reset"
        );
    }

    /// Returns the number of tracked keys.
    pub fn size(&self) -> usize {
        self.inner.buckets.len()
    }

    /// Removes buckets that have refilled to full capacity.
    ///
    /// Returns the number of removed buckets.
    pub fn sweep_idle(&self) -> usize {
        Self::sweep(&self.inner)
    }

    fn sweep(inner: &RateLimiterInner) -> usize {
        let removed = inner.retain_active(Instant::now());
        if removed > 0 {
            tracing::debug!(
                target: TRACING_TARGET,
                policy = inner.policy.as_str(),
                removed_count = removed,
                remaining_count = inner.len.load(Ordering::Relaxed),
                "cleaned up idle rate limit buckets"
            );
        }

        removed
    }

    /// Starts a background task that sweeps idle buckets every `interval`.
    ///
    /// The task stops once every clone of this limiter is dropped. Returns
    /// `None` outside of a Tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let inner: Weak<RateLimiterInner> = Arc::downgrade(&self.inner);
        let period = interval.max(Duration::from_secs(1));

        Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                Self::sweep(&inner);
            }
        }))
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.inner.policy)
            .field("config", &self.inner.config)
            .field("max_keys", &self.inner.max_keys)
            .finish()
    }
}

/// Per-minute limits for each traffic class and bucket map bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "config"), derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct RateLimitingConfig {
    /// Requests per minute allowed across all clients.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(long = "global-rate-limit", env = "RATE_LIMIT_PER_MINUTE", default_value_t = 1000)
    )]
    pub global_per_minute: u32,

    /// Requests per minute allowed per client on GraphQL routes.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(long = "graphql-rate-limit", env = "GRAPHQL_RATE_LIMIT_PER_MINUTE", default_value_t = 100)
    )]
    pub graphql_per_minute: u32,

    /// Requests per minute allowed per client on authentication routes.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(long = "auth-rate-limit", env = "AUTH_RATE_LIMIT_PER_MINUTE", default_value_t = 10)
    )]
    pub authentication_per_minute: u32,

    /// Maximum number of client buckets tracked per limiter.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(long = "rate-limit-max-clients", env = "RATE_LIMIT_MAX_CLIENTS", default_value_t = 10_000)
    )]
    pub max_clients: usize,

    /// Interval in seconds between idle bucket sweeps.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(long = "rate-limit-sweep-secs", env = "RATE_LIMIT_SWEEP_SECS", default_value_t = 300)
    )]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            global_per_minute: 1000,
            graphql_per_minute: 100,
            authentication_per_minute: 10,
            max_clients: 10_000,
            sweep_interval_secs: 300,
        }
    }
}

impl RateLimitingConfig {
    /// Rejects zero limits and a zero client bound.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("global", self.global_per_minute),
            ("graphql", self.graphql_per_minute),
            ("authentication", self.authentication_per_minute),
        ];

        if let Some((name, _)) = limits.iter().find(|(_, limit)| *limit == 0) {
            return Err(Error::config(format!(
                "{name} rate limit must be greater than 0"
            )));
        }

        if self.max_clients == 0 {
            return Err(Error::config("rate limit max clients must be greater than 0"));
        }

        if self.sweep_interval_secs == 0 {
            return Err(Error::config("rate limit sweep interval must be at least 1 second"));
        }

        Ok(())
    }

    /// Returns the idle sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// The limiters of every traffic class.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    /// Single shared bucket for all traffic.
    pub global: RateLimiter,
    /// Per-client buckets for GraphQL routes.
    pub graphql: RateLimiter,
    /// Per-client buckets for authentication routes.
    pub authentication: RateLimiter,
}

impl RateLimiters {
    /// Creates all limiters and starts the idle sweepers when a runtime is available.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        config.validate()?;

        let limiters = Self {
            global: RateLimiter::new(
                RateLimitPolicy::Api,
                RateLimitConfig::per_minute(config.global_per_minute),
                1,
            ),
            graphql: RateLimiter::new(
                RateLimitPolicy::GraphQl,
                RateLimitConfig::per_minute(config.graphql_per_minute),
                config.max_clients,
            ),
            authentication: RateLimiter::new(
                RateLimitPolicy::Authentication,
                RateLimitConfig::per_minute(config.authentication_per_minute),
                config.max_clients,
            ),
        };

        let interval = config.sweep_interval();
        let spawned = [&limiters.graphql, &limiters.authentication]
            .into_iter()
            .filter_map(|limiter| limiter.spawn_sweeper(interval))
            .count();

        if spawned == 0 {
            tracing::warn!(
                target: TRACING_TARGET,
                "no async runtime available, idle bucket sweeps are disabled"
            );
        }

        Ok(limiters)
    }
}
