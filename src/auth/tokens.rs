/// In-memory session tokens
///
/// Tokens live only for the lifetime of the process; a restart invalidates
/// every session and admins simply re-authenticate with a signed payload.
use crate::{
    auth::Identity,
    error::{WardenError, WardenResult},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Random bytes per token before encoding
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct TokenEntry {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// Issued token returned to the caller
#[derive(Debug, Clone, serde::Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Lock-guarded token map shared by all requests
#[derive(Clone)]
pub struct SessionTokenStore {
    tokens: Arc<RwLock<HashMap<String, TokenEntry>>>,
    ttl: Duration,
}

impl SessionTokenStore {
    /// Create an empty store whose tokens live for `ttl`
    pub fn init(ttl: Duration) -> Self {
        tracing::debug!(ttl_secs = ttl.num_seconds(), "Session token store initialised");
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn issue(&self, identity: Identity) -> IssuedToken {
        self.issue_at(identity, Utc::now()).await
    }

    pub async fn issue_at(&self, identity: Identity, now: DateTime<Utc>) -> IssuedToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let expires_at = now + self.ttl;

        let mut tokens = self.tokens.write().await;
        tokens.insert(
            token.clone(),
            TokenEntry {
                identity,
                expires_at,
            },
        );

        IssuedToken { token, expires_at }
    }

    /// Resolve a token to its identity, evicting it if it has expired
    pub async fn redeem(&self, token: &str) -> WardenResult<Identity> {
        self.redeem_at(token, Utc::now()).await
    }

    pub async fn redeem_at(&self, token: &str, now: DateTime<Utc>) -> WardenResult<Identity> {
        {
            let tokens = self.tokens.read().await;
            match tokens.get(token) {
                None => {
                    return Err(WardenError::Authentication("Invalid token".to_string()));
                }
                Some(entry) if now < entry.expires_at => return Ok(entry.identity.clone()),
                Some(_) => {}
            }
        }

        let mut tokens = self.tokens.write().await;
        // Re-check under the write lock; a concurrent issue cannot reuse the key
        if let Some(entry) = tokens.get(token) {
            if now < entry.expires_at {
                return Ok(entry.identity.clone());
            }
        }
        tokens.remove(token);
        Err(WardenError::Authentication("Token expired".to_string()))
    }

    /// Drop all expired tokens, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, entry| now < entry.expires_at);
        before - tokens.len()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Invalidate every session
    pub async fn shutdown(&self) {
        let mut tokens = self.tokens.write().await;
        let count = tokens.len();
        tokens.clear();
        tracing::info!(count, "Session token store cleared");
    }
}
