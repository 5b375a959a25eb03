use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::ApiError;

/// Best-effort sliding-window counter per client key. Not shared across
/// processes and forgotten on restart.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: DashMap::new(),
        }
    }

    /// Records a hit for `key` unless the window is already full.
    pub fn check(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut hits = self.hits.entry(key.to_string()).or_default();
        while let Some(&oldest) = hits.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }
        if hits.len() >= self.max_requests {
            let retry_after = hits
                .front()
                .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or(self.window);
            return Err(retry_after);
        }
        hits.push_back(now);
        Ok(())
    }

    /// Drops expired hits and empty buckets.
    pub fn purge(&self, now: Instant) {
        self.hits.retain(|_, hits| {
            while let Some(&oldest) = hits.front() {
                if now.saturating_duration_since(oldest) >= self.window {
                    hits.pop_front();
                } else {
                    break;
                }
            }
            !hits.is_empty()
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.len()
    }

    pub fn spawn_purger(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else { break };
                limiter.purge(Instant::now());
                tracing::debug!(clients = limiter.tracked_clients(), "purged rate-limit buckets");
            }
        })
    }
}

fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn limit_requests(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(&request);
    if let Err(retry_after) = limiter.check(&key, Instant::now()) {
        tracing::warn!(client = %key, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}
