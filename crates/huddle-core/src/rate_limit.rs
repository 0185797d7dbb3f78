//! Per-sender admission control.
//!
//! Every identity gets its own bucket, created lazily on its first message:
//! - **Window:** at most `limit` admissions inside any sliding `window`
//!   (default 3 per second). Admissions are remembered as timestamps and
//!   forgotten once they are a full window old.
//! - **Cooldown:** a rejection opens a penalty box that blocks all admissions
//!   for `cooldown`, even if the window has emptied in the meantime. When the
//!   penalty ends the sender starts over with an empty window.
//!
//! Rejections are silent here; callers decide what the sender sees.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use huddle_types::config::RateLimitConfig;
use huddle_types::identity::Identity;

/// Default admissions per window.
const DEFAULT_LIMIT: usize = 3;

/// Default window length.
const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Default penalty after a rejection.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

/// Longest window or penalty a limiter accepts. Longer values are clamped.
pub const MAX_PERIOD: Duration = Duration::from_secs(86_400);

/// Sliding-window rate limiter keyed by participant identity.
///
/// Buckets live in a `DashMap`, so checks for different identities only
/// contend when they hash to the same shard, and the prune-then-record step
/// for one identity runs while holding that identity's entry.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    cooldown: Duration,
    buckets: DashMap<Identity, Bucket>,
}

/// Mutable admission state for one identity.
struct Bucket {
    /// Admission instants inside the current window, oldest first.
    admitted: VecDeque<Instant>,
    last_seen: Instant,
    cooldown_until: Option<Instant>,
}

impl Bucket {
    fn new(now: Instant) -> Self {
        Self {
            admitted: VecDeque::new(),
            last_seen: now,
            cooldown_until: None,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.admitted.pop_front();
        }
    }

    fn in_window(&self, now: Instant, window: Duration) -> usize {
        self.admitted
            .iter()
            .filter(|at| now.saturating_duration_since(**at) < window)
            .count()
    }

    fn cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

/// Point-in-time view of one identity's bucket, for monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketStats {
    pub in_window: usize,
    pub limit: usize,
    pub blocked: bool,
    pub cooldown_remaining: Option<Duration>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` messages per `window`.
    ///
    /// A zero limit is treated as one; window and cooldown are capped at
    /// [`MAX_PERIOD`].
    pub fn new(limit: usize, window: Duration, cooldown: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window: window.min(MAX_PERIOD),
            cooldown: cooldown.min(MAX_PERIOD),
            buckets: DashMap::new(),
        }
    }

    /// Create a limiter from the `[rate_limit]` config section.
    ///
    /// `capacity` messages are admitted per `capacity / refill_per_second`
    /// seconds, so the defaults (3 and 3) give three messages per second.
    /// Values that do not form a duration fall back to the defaults.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let limit = config.capacity.floor() as usize;
        let window = Duration::try_from_secs_f64(config.capacity / config.refill_per_second)
            .unwrap_or(DEFAULT_WINDOW);
        let cooldown =
            Duration::try_from_secs_f64(config.cooldown_secs).unwrap_or(DEFAULT_COOLDOWN);
        Self::new(limit, window, cooldown)
    }

    /// Decide whether `identity` may send a message at `now`.
    ///
    /// Returns `true` and records the admission when fewer than `limit`
    /// admissions fall inside the window ending at `now`. A rejection caused
    /// by a full window starts the cooldown; a rejection during cooldown
    /// records nothing.
    pub fn admit(&self, identity: &Identity, now: Instant) -> bool {
        let mut entry = self
            .buckets
            .entry(identity.clone())
            .or_insert_with(|| Bucket::new(now));
        let bucket = entry.value_mut();
        bucket.last_seen = bucket.last_seen.max(now);

        if bucket.cooling_down(now) {
            return false;
        }
        if bucket.cooldown_until.take().is_some() {
            bucket.admitted.clear();
        }

        bucket.prune(now, self.window);

        if bucket.admitted.len() < self.limit {
            bucket.admitted.push_back(now);
            true
        } else {
            bucket.cooldown_until = Some(now + self.cooldown);
            false
        }
    }

    /// [`admit`](Self::admit) at the current instant.
    pub fn check(&self, identity: &Identity) -> bool {
        self.admit(identity, Instant::now())
    }

    /// Time left before a cooled-down identity may send again, if any.
    pub fn retry_after(&self, identity: &Identity, now: Instant) -> Option<Duration> {
        self.buckets
            .get(identity)
            .and_then(|b| b.cooldown_until)
            .and_then(|until| until.checked_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Snapshot of an identity's bucket without mutating it.
    pub fn stats(&self, identity: &Identity, now: Instant) -> Option<BucketStats> {
        self.buckets.get(identity).map(|b| BucketStats {
            in_window: b.in_window(now, self.window),
            limit: self.limit,
            blocked: b.cooling_down(now),
            cooldown_remaining: b
                .cooldown_until
                .and_then(|until| until.checked_duration_since(now))
                .filter(|remaining| !remaining.is_zero()),
        })
    }

    /// Forget an identity's bucket (admin reset). Returns `true` if it existed.
    pub fn reset(&self, identity: &Identity) -> bool {
        self.buckets.remove(identity).is_some()
    }

    /// Drop buckets with no admission activity for `max_idle` and no pending
    /// cooldown. Returns how many were evicted.
    pub fn evict_idle(&self, max_idle: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, b| {
            b.cooling_down(now) || now.saturating_duration_since(b.last_seen) <= max_idle
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Admissions allowed per window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }

    /// Number of identities serving a cooldown at `now`.
    pub fn blocked(&self, now: Instant) -> usize {
        self.buckets.iter().filter(|b| b.cooling_down(now)).count()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW, DEFAULT_COOLDOWN)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("cooldown", &self.cooldown)
            .field("tracked", &self.buckets.len())
            .finish()
    }
}
