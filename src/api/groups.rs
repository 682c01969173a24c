/// Group registry endpoints
use crate::{
    admin::normalize_group_id,
    api::file_url,
    auth::{AdminAuthContext, SeniorAuthContext},
    context::AppContext,
    error::{WardenError, WardenResult},
};
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Form, Json, Router,
};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/USFAPI/groups", get(list_groups))
        .route("/USFAPI/groups/add", post(add_group))
        .route("/USFAPI/groups/:group_id", delete(remove_group))
}

/// Registered groups with live platform details where available
async fn list_groups(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
) -> WardenResult<Json<Vec<Value>>> {
    let groups = ctx.groups.list().await?;
    let platform = ctx.platform.as_ref();

    let entries = join_all(groups.into_iter().map(|group| async move {
        let (chat, members) = futures::join!(
            platform.get_chat(group.group_id),
            platform.get_chat_members_count(group.group_id)
        );

        match chat {
            Ok(chat) => json!({
                "id": group.group_id,
                "title": chat.title.unwrap_or(group.title),
                "username": chat.username,
                "members_count": members.ok(),
                "photo": chat.photo_file_id.as_deref().map(file_url),
                "added_date": group.added_date,
            }),
            Err(e) => {
                tracing::warn!(group_id = group.group_id, error = %e, "Group lookup failed");
                json!({
                    "id": group.group_id,
                    "title": group.title,
                    "username": group.username,
                    "members_count": null,
                    "photo": null,
                    "added_date": group.added_date,
                })
            }
        }
    }))
    .await;

    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct AddGroupForm {
    group_id: String,
}

async fn add_group(
    State(ctx): State<AppContext>,
    auth: SeniorAuthContext,
    Form(form): Form<AddGroupForm>,
) -> WardenResult<Json<Value>> {
    let group_id = normalize_group_id(&form.group_id)?;
    tracing::info!(group_id, "Registering group");

    let chat = ctx.platform.get_chat(group_id).await.map_err(|e| {
        tracing::warn!(group_id, error = %e, "Group lookup failed");
        WardenError::Validation(
            "Could not fetch group information; check the group id".to_string(),
        )
    })?;

    let title = chat.title.unwrap_or_else(|| group_id.to_string());
    let group = ctx
        .groups
        .add(&auth.admin, group_id, &title, chat.username.as_deref())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!(
            "Group {} added. Make sure the bot is an administrator there.",
            title
        ),
        "group": group,
    })))
}

async fn remove_group(
    State(ctx): State<AppContext>,
    Path(group_id): Path<i64>,
    auth: SeniorAuthContext,
) -> WardenResult<Json<Value>> {
    let title = ctx.groups.remove(&auth.admin, group_id).await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("Group {} removed", title),
    })))
}
