//! Per-user rate limiting using the token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use lessonforge_common::{
    auth::AuthContext,
    errors::{AppError, Result},
    metrics,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::AppState;

/// Rate limiter keyed by the authenticated user
pub type UserRateLimiter = RateLimiter<Uuid, DefaultKeyedStateStore<Uuid>, DefaultClock>;

/// Create a new rate limiter; zero rates are raised to one
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Arc<UserRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);

    Arc::new(RateLimiter::keyed(Quota::per_second(rate).allow_burst(burst)))
}

/// Drop buckets that have refilled completely; returns the users still tracked
pub fn prune(limiter: &UserRateLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

/// Prune the limiter on a fixed interval for the life of the process
pub fn spawn_pruning(limiter: Arc<UserRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let tracked = prune(&limiter);
            tracing::debug!(tracked, "Rate limiter pruned");
        }
    })
}

/// Rate limiting middleware for routes that call the language model
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    auth: AuthContext,
    request: Request,
    next: Next,
) -> Result<Response> {
    if let Some(limiter) = &state.limiter {
        if limiter.check_key(&auth.user_id).is_err() {
            tracing::warn!(user_id = %auth.user_id, path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limited();
            return Err(AppError::RateLimited {
                limit: state.config.rate_limit.requests_per_second,
            });
        }
    }

    Ok(next.run(request).await)
}
