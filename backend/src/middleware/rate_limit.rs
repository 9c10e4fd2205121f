//! Fixed-window, in-memory rate limiting keyed on client IP.
//!
//! Five buckets with separate budgets: default, auth (the login path is
//! never exempt), sync, export and backup. Buckets are per process;
//! distributed deployments need a shared store, which is an external
//! collaborator.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateBucketConfig;
use crate::error::AppError;
use crate::state::AppState;

const CLEANUP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateBucket {
    Default,
    Auth,
    Sync,
    Export,
    Backup,
}

impl RateBucket {
    pub fn config(&self, state: &AppState) -> RateBucketConfig {
        match self {
            RateBucket::Default => state.config.rate_limit_default,
            RateBucket::Auth => state.config.rate_limit_auth,
            RateBucket::Sync => state.config.rate_limit_sync,
            RateBucket::Export => state.config.rate_limit_export,
            RateBucket::Backup => state.config.rate_limit_backup,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Outcome of one admission check, carrying the header values either way.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

#[derive(Default)]
pub struct RateLimitStore {
    windows: Mutex<HashMap<(RateBucket, String), Window>>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(
        &self,
        bucket: RateBucket,
        client_ip: &str,
        config: &RateBucketConfig,
        now: Instant,
    ) -> RateDecision {
        let limit = config.max_requests.max(1);
        let window = Duration::from_secs(config.window_seconds.max(1));
        let mut store = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if store.len() > CLEANUP_THRESHOLD {
            store.retain(|_, entry| now.duration_since(entry.started_at) < window);
        }

        let entry = store
            .entry((bucket, client_ip.to_string()))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });
        if now.duration_since(entry.started_at) >= window {
            entry.started_at = now;
            entry.count = 0;
        }

        let elapsed = now.duration_since(entry.started_at);
        let reset_after_secs = window.saturating_sub(elapsed).as_secs().max(1);
        if entry.count >= limit {
            return RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after_secs,
            };
        }
        entry.count += 1;
        RateDecision {
            allowed: true,
            limit,
            remaining: limit - entry.count,
            reset_after_secs,
        }
    }
}

/// Per-bucket entry points for `axum::middleware::from_fn_with_state`.
pub async fn rate_limit_default(state: State<AppState>, request: Request, next: Next) -> Response {
    rate_limit(RateBucket::Default, state, request, next).await
}

pub async fn rate_limit_auth(state: State<AppState>, request: Request, next: Next) -> Response {
    rate_limit(RateBucket::Auth, state, request, next).await
}

pub async fn rate_limit_sync(state: State<AppState>, request: Request, next: Next) -> Response {
    rate_limit(RateBucket::Sync, state, request, next).await
}

pub async fn rate_limit_export(state: State<AppState>, request: Request, next: Next) -> Response {
    rate_limit(RateBucket::Export, state, request, next).await
}

pub async fn rate_limit_backup(state: State<AppState>, request: Request, next: Next) -> Response {
    rate_limit(RateBucket::Backup, state, request, next).await
}

/// Middleware body shared by all buckets.
pub async fn rate_limit(
    bucket: RateBucket,
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(request.headers(), request.extensions().get::<ConnectInfo<SocketAddr>>());
    let config = bucket.config(&state);
    let decision = state
        .rate_limits
        .check(bucket, &client_ip, &config, Instant::now());

    if !decision.allowed {
        tracing::warn!(ip = %client_ip, ?bucket, "Rate limit exceeded");
        let mut response = AppError::TooManyRequests {
            retry_after: decision.reset_after_secs,
        }
        .into_response();
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_after_secs.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Trust-proxy handling: forwarded headers first, then the socket peer.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> String {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| {
            connect_info
                .map(|info| info.0.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_requests: u32, window_seconds: u64) -> RateBucketConfig {
        RateBucketConfig {
            max_requests,
            window_seconds,
        }
    }

    #[test]
    fn fifth_attempt_passes_sixth_is_rejected() {
        let store = RateLimitStore::new();
        let cfg = config(5, 60);
        let now = Instant::now();
        for attempt in 1..=5 {
            let decision = store.check(RateBucket::Auth, "203.0.113.1", &cfg, now);
            assert!(decision.allowed, "attempt {} should pass", attempt);
        }
        let sixth = store.check(RateBucket::Auth, "203.0.113.1", &cfg, now);
        assert!(!sixth.allowed);
        assert!(sixth.reset_after_secs > 0);
        assert_eq!(sixth.remaining, 0);
    }

    #[test]
    fn windows_are_per_ip_and_per_bucket() {
        let store = RateLimitStore::new();
        let cfg = config(1, 60);
        let now = Instant::now();
        assert!(store.check(RateBucket::Auth, "203.0.113.1", &cfg, now).allowed);
        assert!(!store.check(RateBucket::Auth, "203.0.113.1", &cfg, now).allowed);
        // Different IP, fresh window.
        assert!(store.check(RateBucket::Auth, "203.0.113.2", &cfg, now).allowed);
        // Same IP, different bucket.
        assert!(store.check(RateBucket::Sync, "203.0.113.1", &cfg, now).allowed);
    }

    #[test]
    fn window_resets_after_expiry() {
        let store = RateLimitStore::new();
        let cfg = config(1, 1);
        let start = Instant::now();
        assert!(store.check(RateBucket::Default, "10.0.0.1", &cfg, start).allowed);
        assert!(!store.check(RateBucket::Default, "10.0.0.1", &cfg, start).allowed);
        let later = start + Duration::from_secs(2);
        assert!(store.check(RateBucket::Default, "10.0.0.1", &cfg, later).allowed);
    }

    #[test]
    fn forwarded_header_wins_over_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer = ConnectInfo("192.0.2.1:4000".parse::<SocketAddr>().unwrap());
        assert_eq!(extract_client_ip(&headers, Some(&peer)), "203.0.113.7");
        assert_eq!(extract_client_ip(&HeaderMap::new(), Some(&peer)), "192.0.2.1");
    }
}
