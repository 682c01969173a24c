/// Ban, unban, mute and warning endpoints
use crate::{
    admin::{coordinator::WARN_THRESHOLD, BanRecord, WarnOutcome},
    api::{fan_out_body, parse_id},
    auth::AdminAuthContext,
    context::AppContext,
    error::{WardenError, WardenResult},
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};

/// Upper bound for a ban request including evidence images
const BAN_BODY_LIMIT: usize = 20 * 1024 * 1024;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/USFAPI/ban",
            post(ban_user).layer(DefaultBodyLimit::max(BAN_BODY_LIMIT)),
        )
        .route("/USFAPI/bans", get(list_bans))
        .route("/USFAPI/unban", post(unban_user))
        .route("/USFAPI/mute", post(mute_user))
        .route("/USFAPI/warn", post(warn_user))
}

/// Fields of the multipart ban form
#[derive(Debug, Default)]
struct BanSubmission {
    user_id: Option<String>,
    reason: Option<String>,
    proofs: Option<String>,
    images: Vec<String>,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> WardenError {
    WardenError::Validation(format!("Malformed form data: {}", e))
}

async fn read_ban_submission(mut multipart: Multipart) -> WardenResult<BanSubmission> {
    let mut submission = BanSubmission::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("user_id") => submission.user_id = Some(field.text().await.map_err(multipart_error)?),
            Some("reason") => submission.reason = Some(field.text().await.map_err(multipart_error)?),
            Some("proofs") => submission.proofs = Some(field.text().await.map_err(multipart_error)?),
            Some("images") => {
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // Browsers send an empty part when no file was picked
                if !bytes.is_empty() {
                    submission.images.push(STANDARD.encode(&bytes));
                }
            }
            _ => {}
        }
    }

    Ok(submission)
}

fn required(field: &str, value: Option<String>) -> WardenResult<String> {
    value.ok_or_else(|| WardenError::Validation(format!("Missing field: {}", field)))
}

async fn ban_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    multipart: Multipart,
) -> WardenResult<Json<Value>> {
    let submission = read_ban_submission(multipart).await?;
    let user_id = parse_id("user_id", &required("user_id", submission.user_id)?)?;
    let reason = required("reason", submission.reason)?;
    let proofs = required("proofs", submission.proofs)?;

    let outcome = ctx
        .coordinator
        .apply_ban(user_id, &auth.admin, &reason, &proofs, &submission.images)
        .await?;

    Ok(Json(fan_out_body("User banned", &outcome.fan_out)))
}

#[derive(Debug, Deserialize)]
struct BansQuery {
    search_id: Option<String>,
}

async fn list_bans(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(query): Query<BansQuery>,
) -> WardenResult<Json<Vec<BanRecord>>> {
    tracing::debug!(admin_id = auth.admin.user_id, "Listing bans");
    let bans = ctx.moderation.list_bans(query.search_id.as_deref()).await?;
    Ok(Json(bans))
}

#[derive(Debug, Deserialize)]
struct UnbanForm {
    user_id: String,
    reason: String,
}

async fn unban_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Form(form): Form<UnbanForm>,
) -> WardenResult<Json<Value>> {
    let user_id = parse_id("user_id", &form.user_id)?;
    let outcome = ctx
        .coordinator
        .apply_unban(user_id, &auth.admin, &form.reason)
        .await?;

    Ok(Json(fan_out_body("User unbanned", &outcome)))
}

#[derive(Debug, Deserialize)]
struct MuteForm {
    user_id: String,
    reason: String,
    proofs: String,
    duration: String,
}

async fn mute_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Form(form): Form<MuteForm>,
) -> WardenResult<Json<Value>> {
    let user_id = parse_id("user_id", &form.user_id)?;
    let outcome = ctx
        .coordinator
        .apply_mute(user_id, &auth.admin, &form.reason, &form.proofs, &form.duration)
        .await?;

    let mut body = fan_out_body("User muted", &outcome.fan_out);
    body["until"] = json!(outcome.until);
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct WarnForm {
    user_id: String,
    reason: String,
    proofs: String,
    count: Option<String>,
}

async fn warn_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Form(form): Form<WarnForm>,
) -> WardenResult<Json<Value>> {
    let user_id = parse_id("user_id", &form.user_id)?;
    let count = match form.count.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_id("count", raw)?,
        _ => 1,
    };

    let outcome = ctx
        .coordinator
        .apply_warning(user_id, &auth.admin, &form.reason, &form.proofs, count)
        .await?;

    let body = match outcome {
        WarnOutcome::Warned { total, .. } => json!({
            "status": "success",
            "total": total,
            "message": format!("Warning issued ({}/{})", total, WARN_THRESHOLD),
        }),
        WarnOutcome::Escalated { total, ban } => json!({
            "status": "banned",
            "total": total,
            "message": format!("Warning limit reached ({}/{}), user banned", total, WARN_THRESHOLD),
            "ban": fan_out_body("User banned", &ban.fan_out),
        }),
    };

    Ok(Json(body))
}
