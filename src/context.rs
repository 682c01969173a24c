/// Application context and dependency injection
use crate::{
    admin::{AdminManager, AuditLog, GroupRegistry, ModerationCoordinator, ModerationStore},
    auth::{SessionTokenStore, WebAppVerifier},
    config::ServerConfig,
    db,
    error::{WardenError, WardenResult},
    platform::{BotApiClient, ChatPlatform, DryRunPlatform},
    rate_limit::RateLimiter,
};
use chrono::TimeDelta;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    // Admin & Moderation
    pub admins: Arc<AdminManager>,
    pub audit: Arc<AuditLog>,
    pub moderation: Arc<ModerationStore>,
    pub groups: Arc<GroupRegistry>,
    pub coordinator: Arc<ModerationCoordinator>,
    // Sessions
    pub verifier: Arc<WebAppVerifier>,
    pub tokens: SessionTokenStore,
    // Chat platform boundary
    pub platform: Arc<dyn ChatPlatform>,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> WardenResult<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;

        let platform: Arc<dyn ChatPlatform> = if config.platform.dry_run {
            tracing::warn!("Platform dry-run mode: no calls reach the chat platform");
            Arc::new(DryRunPlatform::new())
        } else {
            Arc::new(BotApiClient::new(
                &config.platform.api_url,
                &config.authentication.bot_token,
                config.platform.request_timeout_secs,
            )?)
        };

        let ctx = Self::with_parts(config, pool, platform)?;

        ctx.admins
            .seed_bootstrap(&ctx.config.authentication.bootstrap_admins)
            .await?;

        Ok(ctx)
    }

    /// Assemble the context from an open pool and a platform client
    pub fn with_parts(
        config: ServerConfig,
        pool: SqlitePool,
        platform: Arc<dyn ChatPlatform>,
    ) -> WardenResult<Self> {
        let verifier = WebAppVerifier::new(
            &config.authentication.bot_token,
            config.authentication.allow_unsigned_identity,
        )?;
        let ttl = TimeDelta::try_seconds(config.authentication.session_ttl_secs)
            .ok_or_else(|| WardenError::Validation("Session TTL is out of range".to_string()))?;
        let tokens = SessionTokenStore::init(ttl);

        let moderation = ModerationStore::new(pool.clone());
        let groups = GroupRegistry::new(pool.clone());
        let coordinator = ModerationCoordinator::new(
            moderation.clone(),
            groups.clone(),
            platform.clone(),
            config.platform.ban_info_url.clone(),
        );
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Ok(Self {
            admins: Arc::new(AdminManager::new(pool.clone())),
            audit: Arc::new(AuditLog::new(pool.clone())),
            moderation: Arc::new(moderation),
            groups: Arc::new(groups),
            coordinator: Arc::new(coordinator),
            verifier: Arc::new(verifier),
            tokens,
            platform,
            rate_limiter: Arc::new(rate_limiter),
            config: Arc::new(config),
            db: pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    #[tokio::test]
    async fn test_unrepresentable_session_ttl_is_an_error() {
        let mut config = ServerConfig::for_testing("123456:TEST");
        config.authentication.session_ttl_secs = i64::MAX;

        let result = AppContext::with_parts(
            config,
            create_memory_pool().await.unwrap(),
            Arc::new(DryRunPlatform::new()),
        );
        assert!(matches!(result, Err(WardenError::Validation(_))));
    }
}
