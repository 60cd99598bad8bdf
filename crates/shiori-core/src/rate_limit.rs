//! Fixed-window request limiting keyed by client address.
//!
//! Each key gets a counter and a window end. The first request after the
//! window ends starts a new one. Expired entries are swept opportunistically,
//! at most once per [`SWEEP_INTERVAL_MS`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::HeaderMap;

/// Minimum spacing between sweeps of expired entries, in milliseconds.
pub const SWEEP_INTERVAL_MS: i64 = 100;

const FALLBACK_CLIENT_KEY: &str = "127.0.0.1";

/// Error code carried in the body of a limited response.
pub const RATE_LIMIT_ERROR_CODE: &str = "rate_limit_exceeded";

/// Window length, request budget and rejection message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: TimeDelta,
    pub max_requests: u32,
    pub message: String,
}

impl RateLimitConfig {
    pub fn new(window: TimeDelta, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            message: "Too many requests".to_string(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// 15 attempts per 15 minutes.
    pub fn password_reset() -> Self {
        Self::new(TimeDelta::minutes(15), 15).with_message(
            "Too many password reset attempts. Please wait a while before trying again.",
        )
    }

    /// 20 attempts per 15 minutes.
    pub fn password_reset_confirm() -> Self {
        Self::new(TimeDelta::minutes(15), 20).with_message(
            "Too many password reset confirmation attempts. Please wait a while before trying again.",
        )
    }

    /// 100 refreshes per 10 minutes.
    pub fn refresh_token() -> Self {
        Self::new(TimeDelta::minutes(10), 100).with_message(
            "Too many token refresh attempts. Please wait a while before trying again.",
        )
    }
}

/// Result of counting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    Limited {
        message: String,
        /// Whole seconds until the window resets, rounded up
        retry_after_secs: i64,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }

    /// `X-RateLimit-*` headers for an allowed request.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            RateLimitDecision::Allowed {
                limit,
                remaining,
                reset_at,
            } => vec![
                ("X-RateLimit-Limit", limit.to_string()),
                ("X-RateLimit-Remaining", remaining.to_string()),
                (
                    "X-RateLimit-Reset",
                    reset_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                ),
            ],
            RateLimitDecision::Limited { .. } => Vec::new(),
        }
    }

    /// JSON body for a limited (429) response; `None` when allowed.
    pub fn body(&self) -> Option<serde_json::Value> {
        match self {
            RateLimitDecision::Allowed { .. } => None,
            RateLimitDecision::Limited {
                message,
                retry_after_secs,
            } => Some(serde_json::json!({
                "error": RATE_LIMIT_ERROR_CODE,
                "message": message,
                "retryAfter": retry_after_secs,
            })),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Entry>,
    last_sweep: Option<DateTime<Utc>>,
}

/// In-memory fixed-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    enabled: bool,
    store: Mutex<Store>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            enabled: true,
            store: Mutex::new(Store::default()),
        }
    }

    /// A limiter that lets everything through (test environments).
    pub fn disabled(config: RateLimitConfig) -> Self {
        Self {
            enabled: false,
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Counts one request for `key` at the current time.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Utc::now())
    }

    /// Counts one request for `key` at `now`.
    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let limit = self.config.max_requests;
        if !self.enabled {
            return RateLimitDecision::Allowed {
                limit,
                remaining: limit,
                reset_at: now + self.config.window,
            };
        }

        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.sweep(now);

        let window = self.config.window;
        let entry = store
            .entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.reset_at < now {
                    *entry = Entry {
                        count: 0,
                        reset_at: now + window,
                    };
                }
            })
            .or_insert(Entry {
                count: 0,
                reset_at: now + window,
            });
        entry.count = entry.count.saturating_add(1);

        if entry.count > limit {
            let remaining_ms = (entry.reset_at - now).num_milliseconds().max(0);
            let retry_after_secs = (remaining_ms + 999) / 1000;
            tracing::debug!(key, retry_after_secs, "rate limit exceeded");
            return RateLimitDecision::Limited {
                message: self.config.message.clone(),
                retry_after_secs,
            };
        }

        RateLimitDecision::Allowed {
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        }
    }
}

impl Store {
    fn sweep(&mut self, now: DateTime<Utc>) {
        if self
            .last_sweep
            .is_some_and(|last| (now - last).num_milliseconds() < SWEEP_INTERVAL_MS)
        {
            return;
        }
        self.last_sweep = Some(now);
        self.entries.retain(|_, entry| entry.reset_at >= now);
    }
}

/// Picks the limiter key for a request: first `x-forwarded-for` hop, then
/// `x-real-ip`, then the peer address, then loopback.
pub fn client_key(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map_or_else(|| FALLBACK_CLIENT_KEY.to_string(), |ip| ip.to_string())
}
