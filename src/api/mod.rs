/// API routes and handlers
pub mod admin;
pub mod groups;
pub mod middleware;
pub mod moderation;
pub mod public;
pub mod session;

use crate::{
    admin::FanOutOutcome,
    context::AppContext,
    error::{WardenError, WardenResult},
    platform::{ChatInfo, ChatPlatform},
};
use axum::Router;
use serde_json::{json, Value};

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(session::routes())
        .merge(admin::routes())
        .merge(moderation::routes())
        .merge(groups::routes())
        .merge(public::routes())
}

/// Parse a numeric id submitted as text
pub(crate) fn parse_id(field: &str, raw: &str) -> WardenResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| WardenError::Validation(format!("Invalid {}: {:?}", field, raw)))
}

/// Optional numeric query parameter; blank means absent
pub(crate) fn parse_optional_id(field: &str, raw: Option<&str>) -> WardenResult<Option<i64>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_id(field, raw).map(Some),
        None => Ok(None),
    }
}

/// Proxied URL for a platform file; the token-bearing URL never leaves the server
pub(crate) fn file_url(file_id: &str) -> String {
    format!("/USFAPI/file/{}", urlencoding::encode(file_id))
}

/// Platform profile with its avatar URL
pub(crate) struct Profile {
    pub info: ChatInfo,
    pub avatar: Option<String>,
}

/// Look up a user's profile; any platform failure yields `None`
pub(crate) async fn lookup_profile(platform: &dyn ChatPlatform, user_id: i64) -> Option<Profile> {
    let info = match platform.get_chat(user_id).await {
        Ok(info) => info,
        Err(e) => {
            tracing::debug!(user_id, error = %e, "Profile lookup failed");
            return None;
        }
    };

    let avatar = platform
        .get_user_profile_photos(user_id)
        .await
        .ok()
        .flatten()
        .map(|file_id| file_url(&file_id));

    Some(Profile { info, avatar })
}

/// Response body shared by every fan-out action
pub(crate) fn fan_out_body(message: &str, outcome: &FanOutOutcome) -> Value {
    json!({
        "status": "success",
        "message": message,
        "success_groups": outcome.success_groups,
        "failed_groups": outcome.failed_groups,
        "total_groups": outcome.total_groups(),
        "success_count": outcome.success_count(),
        "failed_count": outcome.failed_count(),
        "notify_failures": outcome.notify_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_id("user_id", " 42 ").unwrap(), 42);
        assert!(matches!(
            parse_id("user_id", "abc"),
            Err(WardenError::Validation(_))
        ));
        assert_eq!(parse_optional_id("filter_admin", Some("")).unwrap(), None);
        assert_eq!(parse_optional_id("filter_admin", Some("7")).unwrap(), Some(7));
        assert_eq!(parse_optional_id("filter_admin", None).unwrap(), None);
    }

    #[test]
    fn test_fan_out_body_counts() {
        let outcome = FanOutOutcome {
            success_groups: vec![-1, -2],
            failed_groups: vec![crate::admin::GroupFailure {
                group_id: -3,
                error: "no rights".into(),
            }],
            notify_failures: Vec::new(),
        };
        let body = fan_out_body("done", &outcome);
        assert_eq!(body["total_groups"], 3);
        assert_eq!(body["success_count"], 2);
        assert_eq!(body["failed_count"], 1);
        assert_eq!(body["failed_groups"][0]["group_id"], -3);
    }

    #[test]
    fn test_file_url_is_proxied() {
        assert_eq!(file_url("AgAD/x"), "/USFAPI/file/AgAD%2Fx");
    }
}
