/// Configuration management for Groupwarden
use crate::error::{WardenError, WardenResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Longest accepted session token lifetime (one year)
pub const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub platform: PlatformConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Allowed CORS origins, empty means any
    pub cors_origins: Vec<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bot secret that signs mini-app session payloads
    pub bot_token: String,
    /// Accept pre-decoded `{"id": ...}` identities without a signature.
    /// Only for trusted internal callers and local testing.
    pub allow_unsigned_identity: bool,
    /// Session token lifetime in seconds
    pub session_ttl_secs: i64,
    /// User ids seeded as senior admins at startup
    pub bootstrap_admins: Vec<i64>,
}

/// Chat platform client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub api_url: String,
    /// Log platform calls instead of performing them
    pub dry_run: bool,
    /// Link prefix attached to ban notifications, subject id is appended
    pub ban_info_url: Option<String>,
    pub request_timeout_secs: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub public_rps: u32,
    pub admin_rps: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> WardenResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("GW_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("GW_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| WardenError::Validation("Invalid port number".to_string()))?;
        let cors_origins = split_list(&env::var("GW_CORS_ORIGINS").unwrap_or_default())
            .into_iter()
            .filter(|origin| origin != "*")
            .collect();

        let database = env::var("GW_DATABASE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/groupwarden.sqlite"));

        let bot_token = env::var("GW_BOT_TOKEN")
            .map_err(|_| WardenError::Validation("Bot token required".to_string()))?;
        let allow_unsigned_identity = env::var("GW_ALLOW_UNSIGNED_IDENTITY")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let session_ttl_secs = env::var("GW_SESSION_TTL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86400);
        let bootstrap_admins = split_list(&env::var("GW_BOOTSTRAP_ADMINS").unwrap_or_default())
            .iter()
            .map(|id| {
                id.parse::<i64>().map_err(|_| {
                    WardenError::Validation(format!("Invalid bootstrap admin id: {}", id))
                })
            })
            .collect::<WardenResult<Vec<_>>>()?;

        let api_url = env::var("GW_PLATFORM_API_URL")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());
        let dry_run = env::var("GW_PLATFORM_DRY_RUN")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let ban_info_url = env::var("GW_BAN_INFO_URL").ok().filter(|s| !s.is_empty());
        let request_timeout_secs = env::var("GW_PLATFORM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);

        let rate_limit_enabled = env::var("GW_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let public_rps = env::var("GW_PUBLIC_RPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let admin_rps = env::var("GW_ADMIN_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "groupwarden=debug,tower_http=debug".to_string());
        let json = env::var("GW_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                cors_origins,
            },
            storage: StorageConfig { database },
            authentication: AuthConfig {
                bot_token,
                allow_unsigned_identity,
                session_ttl_secs,
                bootstrap_admins,
            },
            platform: PlatformConfig {
                api_url,
                dry_run,
                ban_info_url,
                request_timeout_secs,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                public_rps,
                admin_rps,
            },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> WardenResult<()> {
        if self.service.hostname.is_empty() {
            return Err(WardenError::Validation("Hostname cannot be empty".to_string()));
        }

        // Bot tokens look like `123456:secret`
        let well_formed = self
            .authentication
            .bot_token
            .split_once(':')
            .map(|(id, secret)| {
                !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && !secret.is_empty()
            })
            .unwrap_or(false);
        if !well_formed {
            return Err(WardenError::Validation(
                "Bot token must have the form <bot id>:<secret>".to_string(),
            ));
        }

        let ttl = self.authentication.session_ttl_secs;
        if ttl <= 0 || ttl > MAX_SESSION_TTL_SECS {
            return Err(WardenError::Validation(format!(
                "Session TTL must be between 1 and {} seconds",
                MAX_SESSION_TTL_SECS
            )));
        }

        if self.authentication.allow_unsigned_identity {
            tracing::warn!("Unsigned identity payloads are accepted; never enable this in production");
        }

        Ok(())
    }

    /// Configuration suitable for tests and local tooling
    pub fn for_testing(bot_token: &str) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: Vec::new(),
            },
            storage: StorageConfig {
                database: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                bot_token: bot_token.to_string(),
                allow_unsigned_identity: false,
                session_ttl_secs: 86400,
                bootstrap_admins: Vec::new(),
            },
            platform: PlatformConfig {
                api_url: "http://127.0.0.1:0".to_string(),
                dry_run: true,
                ban_info_url: None,
                request_timeout_secs: 5,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                public_rps: 10,
                admin_rps: 100,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
