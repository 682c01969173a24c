/// Administrator management and audit log endpoints
use crate::{
    admin::{roles::validate_points, ActionType, SENIOR_POINTS},
    api::{lookup_profile, middleware::no_store, parse_id, parse_optional_id},
    auth::{AdminAuthContext, SeniorAuthContext},
    context::AppContext,
    error::{WardenError, WardenResult},
    platform::ChatPlatform,
};
use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post},
    Form, Json, Router,
};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Build admin API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/USFAPI/current-admin", get(current_admin))
        .route(
            "/USFAPI/admins",
            get(list_admins).layer(middleware::from_fn(no_store)),
        )
        .route("/USFAPI/admin/add", post(add_admin))
        .route("/USFAPI/admin/update", post(update_admin))
        .route("/USFAPI/admin/:admin_id", get(get_admin).delete(remove_admin))
        .route("/USFAPI/logs", get(list_logs))
}

/// Platform username, falling back to the numeric id
async fn username_or_id(platform: &dyn ChatPlatform, user_id: i64) -> String {
    platform
        .get_chat(user_id)
        .await
        .ok()
        .and_then(|info| info.username)
        .unwrap_or_else(|| user_id.to_string())
}

async fn current_admin(auth: AdminAuthContext) -> Json<Value> {
    Json(json!({ "points": auth.admin.points }))
}

async fn list_admins(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
) -> WardenResult<Json<Vec<Value>>> {
    let admins = ctx.admins.list().await?;
    let platform = ctx.platform.as_ref();

    let entries = join_all(admins.into_iter().map(|admin| async move {
        let profile = lookup_profile(platform, admin.user_id).await;
        let fallback = admin.user_id.to_string();
        json!({
            "user_id": admin.user_id,
            "rank": admin.rank,
            "points": admin.points,
            "username": profile
                .as_ref()
                .and_then(|p| p.info.username.clone())
                .unwrap_or_else(|| fallback.clone()),
            "full_name": profile
                .as_ref()
                .and_then(|p| p.info.full_name())
                .unwrap_or(fallback),
            "avatar": profile.and_then(|p| p.avatar),
        })
    }))
    .await;

    Ok(Json(entries))
}

async fn get_admin(
    State(ctx): State<AppContext>,
    Path(admin_id): Path<i64>,
    _auth: AdminAuthContext,
) -> WardenResult<Json<Value>> {
    let admin = ctx
        .admins
        .get(admin_id)
        .await?
        .ok_or_else(|| WardenError::NotFound(format!("Administrator {} not found", admin_id)))?;

    let profile = lookup_profile(ctx.platform.as_ref(), admin_id).await;
    let fallback = admin_id.to_string();

    Ok(Json(json!({
        "user_id": admin.user_id,
        "rank": admin.rank,
        "points": admin.points,
        "username": profile
            .as_ref()
            .and_then(|p| p.info.username.clone())
            .unwrap_or_else(|| fallback.clone()),
        "full_name": profile
            .as_ref()
            .and_then(|p| p.info.full_name())
            .unwrap_or(fallback),
        "avatar": profile.and_then(|p| p.avatar),
    })))
}

#[derive(Debug, Deserialize)]
struct AddAdminForm {
    user_id: String,
    points: String,
    rank: Option<String>,
}

async fn add_admin(
    State(ctx): State<AppContext>,
    auth: SeniorAuthContext,
    Form(form): Form<AddAdminForm>,
) -> WardenResult<Json<Value>> {
    let user_id = parse_id("user_id", &form.user_id)?;
    let points = parse_id("points", &form.points)?;
    validate_points(points)?;

    // Only real platform users can become admins
    if let Err(e) = ctx.platform.get_chat(user_id).await {
        tracing::debug!(user_id, error = %e, "Admin candidate lookup failed");
        return Err(WardenError::NotFound(format!(
            "User {} not found on the platform",
            user_id
        )));
    }

    let rank = form
        .rank
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let admin = ctx.admins.add(&auth.admin, user_id, points, rank).await?;

    Ok(Json(json!({
        "message": "Administrator added",
        "admin": admin,
    })))
}

#[derive(Debug, Deserialize)]
struct UpdateAdminForm {
    admin_id: String,
    points: String,
}

async fn update_admin(
    State(ctx): State<AppContext>,
    auth: SeniorAuthContext,
    Form(form): Form<UpdateAdminForm>,
) -> WardenResult<Json<Value>> {
    let admin_id = parse_id("admin_id", &form.admin_id)?;
    let points = parse_id("points", &form.points)?;
    validate_points(points)?;

    if ctx.admins.get(admin_id).await?.is_none() {
        return Err(WardenError::NotFound(format!(
            "Administrator {} not found",
            admin_id
        )));
    }

    let platform = ctx.platform.as_ref();
    let (actor_name, target_name) = futures::join!(
        username_or_id(platform, auth.admin.user_id),
        username_or_id(platform, admin_id)
    );
    let details = format!("@{} → @{} (Points: {})", actor_name, target_name, points);

    ctx.admins
        .update_points(&auth.admin, admin_id, points, &details)
        .await?;

    Ok(Json(json!({ "message": "Administrator updated" })))
}

async fn remove_admin(
    State(ctx): State<AppContext>,
    Path(admin_id): Path<i64>,
    auth: SeniorAuthContext,
) -> WardenResult<Json<Value>> {
    ctx.admins.remove(&auth.admin, admin_id).await?;
    Ok(Json(json!({ "message": "Administrator removed" })))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    filter_admin: Option<String>,
    action_type: Option<String>,
}

async fn list_logs(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<LogsQuery>,
) -> WardenResult<Json<Vec<Value>>> {
    let filter_admin = parse_optional_id("filter_admin", query.filter_admin.as_deref())?;
    let action_type = match query.action_type.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(ActionType::from_str(raw)?),
        _ => None,
    };

    let entries = ctx.audit.list(filter_admin, action_type).await?;

    // One platform lookup per distinct admin
    let mut admin_ids: Vec<i64> = entries.iter().map(|e| e.admin_id).collect();
    admin_ids.sort_unstable();
    admin_ids.dedup();
    let platform = ctx.platform.as_ref();
    let names: HashMap<i64, String> = join_all(admin_ids.into_iter().map(|id| async move {
        (id, username_or_id(platform, id).await)
    }))
    .await
    .into_iter()
    .collect();

    let body = entries
        .into_iter()
        .map(|entry| {
            let mut admin = json!({
                "id": entry.admin_id,
                "username": names.get(&entry.admin_id),
                "points": entry.admin_points,
            });
            // Senior admins' addresses are never shown
            if entry.admin_points < SENIOR_POINTS {
                if let Some(ip) = entry.admin_ip {
                    admin["ip"] = json!(ip);
                }
            }
            json!({
                "id": entry.id,
                "admin": admin,
                "action_type": entry.action_type,
                "target_id": entry.target_id,
                "details": entry.details,
                "timestamp": entry.timestamp,
            })
        })
        .collect();

    Ok(Json(body))
}
