/// Unauthenticated read endpoints
use crate::{
    api::lookup_profile,
    context::AppContext,
    error::{WardenError, WardenResult},
};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/USFAPI/check_ban/:user_id", get(check_ban))
        .route("/USFAPI/user/:user_id", get(user_info))
        .route("/USFAPI/public/ban/:user_id", get(public_ban))
        .route("/USFAPI/file/:file_id", get(proxy_file))
}

async fn check_ban(
    State(ctx): State<AppContext>,
    Path(user_id): Path<i64>,
) -> WardenResult<Json<Value>> {
    let is_banned = ctx.moderation.is_banned(user_id).await?;
    Ok(Json(json!({ "is_banned": is_banned })))
}

/// Platform profile plus ban status; platform failures degrade to nulls
async fn user_info(
    State(ctx): State<AppContext>,
    Path(user_id): Path<i64>,
) -> WardenResult<Json<Value>> {
    let is_banned = ctx.moderation.is_banned(user_id).await?;
    let profile = lookup_profile(ctx.platform.as_ref(), user_id).await;

    let body = match profile {
        Some(profile) => json!({
            "user_id": user_id,
            "username": profile.info.username,
            "first_name": profile.info.first_name,
            "last_name": profile.info.last_name,
            "is_banned": is_banned,
            "avatar": profile.avatar,
        }),
        None => json!({
            "user_id": user_id,
            "username": null,
            "first_name": null,
            "last_name": null,
            "is_banned": is_banned,
            "avatar": null,
        }),
    };

    Ok(Json(body))
}

async fn public_ban(
    State(ctx): State<AppContext>,
    Path(user_id): Path<i64>,
) -> WardenResult<Json<Value>> {
    if user_id <= 0 {
        return Err(WardenError::Validation("Invalid user id".to_string()));
    }

    let Some(public) = ctx.moderation.public_ban(user_id).await? else {
        return Ok(Json(json!({ "is_banned": false })));
    };

    let ban = public.ban;
    let admin_username = ctx
        .platform
        .get_chat(ban.admin_id)
        .await
        .ok()
        .and_then(|info| info.username)
        .unwrap_or_else(|| ban.admin_id.to_string());

    Ok(Json(json!({
        "is_banned": true,
        "user_id": ban.user_id,
        "admin": {
            "id": ban.admin_id,
            "username": admin_username,
            "points": public.admin_points,
        },
        "reason": ban.reason,
        "proofs": ban.proofs,
        "images": ban.images,
        "ban_date": ban.ban_date,
    })))
}

fn content_type_for(file_path: &str) -> &'static str {
    let extension = file_path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Stream a platform file without exposing the token-bearing URL
async fn proxy_file(
    State(ctx): State<AppContext>,
    Path(file_id): Path<String>,
) -> WardenResult<Response> {
    let file_path = ctx
        .platform
        .get_file(&file_id)
        .await
        .map_err(|_| WardenError::NotFound("File not found".to_string()))?;
    let bytes = ctx.platform.download_file(&file_path).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(content_type_for(&file_path)),
            ),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("private, max-age=300"),
            ),
        ],
        bytes,
    )
        .into_response())
}
