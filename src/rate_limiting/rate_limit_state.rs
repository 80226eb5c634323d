use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Rate limiting configuration.
///
/// Every client (identified by IP address) may make at most `max_requests`
/// requests in any sliding window of `window_ms` milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Length of the window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum requests per client per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Identify clients by the first `X-Forwarded-For` address instead of
    /// the socket peer address
    #[serde(default)]
    pub trust_proxy: bool,
}

const fn default_enabled() -> bool {
    true
}

const fn default_window_ms() -> u64 {
    900_000 // 15 minutes
}

const fn default_max_requests() -> u32 {
    100
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            trust_proxy: false,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Quota left for a client after an allowed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the oldest counted request leaves the window
    pub reset_after: Duration,
}

/// Returned when a client has used up its quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub retry_after: Duration,
}

/// Request timestamps for a single client within the current window.
#[derive(Debug, Clone, Default)]
struct ClientState {
    requests: VecDeque<Instant>,
}

impl ClientState {
    /// Drop timestamps that fell out of the window ending at `now`.
    fn cleanup_expired(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };

        while self.requests.front().is_some_and(|&t| t <= cutoff) {
            self.requests.pop_front();
        }
    }

    fn reset_after(&self, now: Instant, window: Duration) -> Duration {
        self.requests
            .front()
            .map_or(window, |&oldest| (oldest + window).saturating_duration_since(now))
    }
}

/// In-memory rate limiting state tracker.
///
/// Maintains per-IP request history. Uses `DashMap` so request handlers only
/// contend on the shard that holds their client.
#[derive(Clone, Debug)]
pub struct RateLimitState {
    config: Arc<RateLimitConfig>,
    clients: Arc<DashMap<IpAddr, ClientState>>,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            clients: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Records a request from `ip` if it fits in the client's quota.
    pub fn check_rate_limit(&self, ip: IpAddr) -> Result<RateLimitStatus, RateLimitExceeded> {
        let limit = self.config.max_requests;
        let window = self.config.window();

        if !self.config.enabled {
            return Ok(RateLimitStatus {
                limit,
                remaining: limit,
                reset_after: window,
            });
        }

        let now = Instant::now();
        let mut entry = self.clients.entry(ip).or_default();
        let client = entry.value_mut();

        client.cleanup_expired(now, window);

        let used = u32::try_from(client.requests.len()).unwrap_or(u32::MAX);
        if used >= limit {
            let retry_after = client.reset_after(now, window);
            debug!(
                ip = %ip,
                limit,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            return Err(RateLimitExceeded { limit, retry_after });
        }

        client.requests.push_back(now);
        trace!(ip = %ip, used = used + 1, limit, "Request recorded");

        Ok(RateLimitStatus {
            limit,
            remaining: limit - used - 1,
            reset_after: client.reset_after(now, window),
        })
    }

    /// Removes clients with no requests inside the current window.
    pub fn cleanup_expired_entries(&self) {
        let now = Instant::now();
        let window = self.config.window();

        self.clients.retain(|_ip, client| {
            client.cleanup_expired(now, window);
            !client.requests.is_empty()
        });
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}
