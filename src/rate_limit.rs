/// Rate Limiting
///
/// Two process-wide buckets: one for anonymous/public reads and a larger one
/// for requests that carry credentials.
use crate::{
    api::middleware::{extract_authorization, extract_bearer_token},
    config::RateLimitConfig,
    context::AppContext,
    error::{WardenError, WardenResult},
};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    public: Arc<DirectLimiter>,
    admin: Arc<DirectLimiter>,
}

fn quota(rps: u32) -> Quota {
    let rate = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    // Allow short bursts of twice the steady rate
    let burst = NonZeroU32::new(rps.saturating_mul(2)).unwrap_or(rate);
    Quota::per_second(rate).allow_burst(burst)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            public: Arc::new(GovernorLimiter::direct(quota(config.public_rps))),
            admin: Arc::new(GovernorLimiter::direct(quota(config.admin_rps))),
        }
    }

    fn check(&self, limiter: &DirectLimiter) -> WardenResult<()> {
        if !self.enabled {
            return Ok(());
        }
        limiter.check().map_err(|_| WardenError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }

    pub fn check_public(&self) -> WardenResult<()> {
        self.check(&self.public)
    }

    pub fn check_admin(&self) -> WardenResult<()> {
        self.check(&self.admin)
    }
}

/// True when the request carries a session token or signed payload that
/// actually verifies
async fn has_valid_credentials(ctx: &AppContext, headers: &HeaderMap) -> bool {
    match extract_bearer_token(headers) {
        Some(token) => ctx.tokens.redeem(&token).await.is_ok(),
        None => extract_authorization(headers)
            .map(|raw| ctx.verifier.verify(&raw).is_ok())
            .unwrap_or(false),
    }
}

/// Rate limiting middleware
///
/// Only verified credentials get the larger bucket; a junk `authorization`
/// header counts as anonymous.
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, WardenError> {
    if has_valid_credentials(&ctx, request.headers()).await {
        ctx.rate_limiter.check_admin()?;
    } else {
        ctx.rate_limiter.check_public()?;
    }

    Ok(next.run(request).await)
}
