use crate::helpers;
use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use scc::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Paths the API window applies to
pub const API_PREFIX: &str = "/api/";

/// Sliding-window request counter keyed by client IP.
///
/// Each key keeps the timestamps of its accepted requests inside the window.
/// Rejected requests are not recorded.
pub struct SlidingWindow {
    max_requests: usize,
    window: Duration,
    hits: HashMap<String, Vec<Instant>>,
}

impl SlidingWindow {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: HashMap::new(),
        }
    }

    /// Record a request at `now`. Returns false if the key is over its limit.
    pub async fn check(&self, key: &str, now: Instant) -> bool {
        let mut entry = self.hits.entry_async(key.to_string()).await.or_default();
        let hits = entry.get_mut();

        hits.retain(|t| now.saturating_duration_since(*t) < self.window);
        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push(now);
        true
    }

    /// Number of requests currently counted for `key`
    #[cfg(test)]
    pub async fn count(&self, key: &str) -> usize {
        self.hits
            .read_async(key, |_, hits| hits.len())
            .await
            .unwrap_or(0)
    }
}

/// The global window (every request) and the API window (`/api/`, minus preflight).
pub struct RateLimiters {
    pub global: SlidingWindow,
    pub api: SlidingWindow,
}

impl RateLimiters {
    pub fn new(config: &crate::RateLimitConfig) -> Self {
        Self {
            global: SlidingWindow::new(config.global_max, config.global_window),
            api: SlidingWindow::new(config.api_max, config.api_window),
        }
    }
}

pub async fn rate_limit(
    State(limiters): State<Arc<RateLimiters>>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = helpers::client_ip(req.headers(), peer);
    let now = Instant::now();

    if !limiters.global.check(&client, now).await {
        tracing::warn!(%client, "global rate limit exceeded");
        return too_many_requests("Rate limit exceeded. Too many requests.");
    }

    let is_api = req.uri().path().starts_with(API_PREFIX) && req.method() != Method::OPTIONS;
    if is_api && !limiters.api.check(&client, now).await {
        tracing::warn!(%client, path = %req.uri().path(), "API rate limit exceeded");
        return too_many_requests("API rate limit exceeded");
    }

    next.run(req).await
}

fn too_many_requests(message: &str) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
