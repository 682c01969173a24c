/// Session token issuance and admin status checks
use crate::{
    auth::{AuthContext, SignedIdentity},
    context::AppContext,
    error::{WardenError, WardenResult},
};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/login/:user_id", get(login))
        .route("/generate_token/:user_id", get(login))
        .route("/USFAPI/check_admin/:user_id", get(check_admin))
}

/// Exchange a signed payload for a session token
async fn login(
    State(ctx): State<AppContext>,
    Path(user_id): Path<i64>,
    auth: SignedIdentity,
) -> WardenResult<Json<Value>> {
    if auth.identity.user_id != user_id {
        tracing::warn!(
            user_id,
            caller = auth.identity.user_id,
            "Token requested for another user"
        );
        return Err(WardenError::Forbidden(
            "Tokens can only be issued to the signed-in user".to_string(),
        ));
    }

    ctx.admins.require_admin(&auth.identity).await?;
    let issued = ctx.tokens.issue(auth.identity).await;
    tracing::info!(user_id, "Session token issued");

    Ok(Json(json!({
        "token": issued.token,
        "expires_at": issued.expires_at,
    })))
}

async fn check_admin(
    State(ctx): State<AppContext>,
    Path(user_id): Path<i64>,
    _auth: AuthContext,
) -> WardenResult<Json<Value>> {
    let admin = ctx.admins.get(user_id).await?;

    Ok(Json(json!({
        "is_admin": admin.is_some(),
        "rank": admin.as_ref().and_then(|a| a.rank.clone()),
        "points": admin.map(|a| a.points).unwrap_or(0),
    })))
}
