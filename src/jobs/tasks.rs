/// Background task implementations
use crate::{context::AppContext, error::WardenResult};

/// Drop expired session tokens
pub async fn purge_expired_tokens(ctx: &AppContext) -> WardenResult<usize> {
    Ok(ctx.tokens.purge_expired().await)
}

/// Health check - verify storage is reachable
pub async fn health_check(ctx: &AppContext) -> WardenResult<()> {
    crate::db::test_connection(&ctx.db).await
}
