/// Authentication extractors and utilities
///
/// The `authorization` header carries either the raw signed session payload
/// or `Bearer <session token>` issued by `/login`.
pub mod tokens;
pub mod webapp;

pub use tokens::{IssuedToken, SessionTokenStore};
pub use webapp::{sign_fields, Identity, SessionPayload, WebAppVerifier};

use crate::{
    admin::AdminRecord,
    api::middleware::{client_ip, extract_authorization, extract_bearer_token},
    context::AppContext,
    error::WardenError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Identity proven by the signed payload itself; session tokens are refused
#[derive(Debug, Clone)]
pub struct SignedIdentity {
    pub identity: Identity,
}

#[async_trait]
impl FromRequestParts<AppContext> for SignedIdentity {
    type Rejection = WardenError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let raw = extract_authorization(&parts.headers)
            .ok_or_else(|| WardenError::Authentication("Missing authorization header".to_string()))?;

        if extract_bearer_token(&parts.headers).is_some() {
            return Err(WardenError::Authentication(
                "A signed session payload is required".to_string(),
            ));
        }

        let identity = state.verifier.verify(&raw)?;
        Ok(SignedIdentity { identity })
    }
}

/// Authenticated identity from either a signed payload or a session token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = WardenError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let identity = match extract_bearer_token(&parts.headers) {
            Some(token) => state.tokens.redeem(&token).await?,
            None => {
                let raw = extract_authorization(&parts.headers).ok_or_else(|| {
                    WardenError::Authentication("Missing authorization header".to_string())
                })?;
                state.verifier.verify(&raw)?
            }
        };

        Ok(AuthContext { identity })
    }
}

/// Authenticated administrator. Refreshes the admin's last-seen IP.
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub identity: Identity,
    pub admin: AdminRecord,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = WardenError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { identity } = AuthContext::from_request_parts(parts, state).await?;
        let admin = state.admins.require_admin(&identity).await?;

        if let Some(ip) = client_ip(parts) {
            if let Err(e) = state.audit.record_ip(admin.user_id, &ip).await {
                tracing::warn!(admin_id = admin.user_id, error = %e, "Failed to record admin IP");
            }
        }

        Ok(AdminAuthContext { identity, admin })
    }
}

/// Administrator with at least senior points
#[derive(Debug, Clone)]
pub struct SeniorAuthContext {
    pub identity: Identity,
    pub admin: AdminRecord,
}

#[async_trait]
impl FromRequestParts<AppContext> for SeniorAuthContext {
    type Rejection = WardenError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AdminAuthContext { identity, admin } =
            AdminAuthContext::from_request_parts(parts, state).await?;
        crate::admin::roles::ensure_senior(&admin)?;

        Ok(SeniorAuthContext { identity, admin })
    }
}
