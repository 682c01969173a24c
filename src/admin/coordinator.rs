/// Moderation action coordinator
///
/// Each action commits its local record first, then fans out to every
/// registered group. Group calls run concurrently and each one's failure is
/// captured on its own; none of them can undo the committed record.
use crate::{
    admin::{
        duration::parse_duration,
        groups::GroupRegistry,
        moderation::{
            BanRecord, ModerationStore, MuteRecord, NewBan, NewWarning, WarningInsert,
            WarningRecord,
        },
        roles::AdminRecord,
    },
    error::{WardenError, WardenResult},
    platform::{escape_html, ChatPlatform, LinkButton},
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Total warnings at which a subject is banned automatically
pub const WARN_THRESHOLD: i64 = 3;

/// A group whose call failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupFailure {
    pub group_id: i64,
    pub error: String,
}

/// Per-group results of one fan-out
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanOutOutcome {
    pub success_groups: Vec<i64>,
    pub failed_groups: Vec<GroupFailure>,
    /// Groups where the action applied but the notice could not be posted
    pub notify_failures: Vec<GroupFailure>,
}

impl FanOutOutcome {
    pub fn total_groups(&self) -> usize {
        self.success_groups.len() + self.failed_groups.len()
    }

    pub fn success_count(&self) -> usize {
        self.success_groups.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_groups.len()
    }
}

#[derive(Debug, Clone)]
pub struct BanOutcome {
    pub ban: BanRecord,
    pub fan_out: FanOutOutcome,
}

#[derive(Debug, Clone)]
pub struct MuteOutcome {
    pub mute: MuteRecord,
    pub until: DateTime<Utc>,
    pub fan_out: FanOutOutcome,
}

#[derive(Debug, Clone)]
pub enum WarnOutcome {
    /// Warning recorded, threshold not reached
    Warned { total: i64, warning: WarningRecord },
    /// Threshold reached; the subject was banned instead
    Escalated { total: i64, ban: BanOutcome },
}

/// Outcome of one group's attempt
struct GroupAttempt {
    group_id: i64,
    action: WardenResult<()>,
    notify: Option<WardenResult<()>>,
}

#[derive(Clone)]
pub struct ModerationCoordinator {
    store: ModerationStore,
    groups: GroupRegistry,
    platform: Arc<dyn ChatPlatform>,
    ban_info_url: Option<String>,
}

impl ModerationCoordinator {
    pub fn new(
        store: ModerationStore,
        groups: GroupRegistry,
        platform: Arc<dyn ChatPlatform>,
        ban_info_url: Option<String>,
    ) -> Self {
        Self {
            store,
            groups,
            platform,
            ban_info_url,
        }
    }

    /// Record a ban, then ban and notify in every group
    pub async fn apply_ban(
        &self,
        subject: i64,
        admin: &AdminRecord,
        reason: &str,
        proofs: &str,
        images: &[String],
    ) -> WardenResult<BanOutcome> {
        let targets = self.groups.group_ids().await?;

        let ban = self
            .store
            .insert_ban(NewBan {
                user_id: subject,
                admin_id: admin.user_id,
                reason,
                proofs,
                images,
            })
            .await?;

        let platform = self.platform.as_ref();
        let text = format!(
            "🚫 <b>User banned</b>\n\n👤 ID: <code>{}</code>\n📝 Reason: {}",
            subject,
            escape_html(reason)
        );
        let button = self.ban_info_url.as_ref().map(|prefix| LinkButton {
            text: "Ban details".to_string(),
            url: format!("{}{}", prefix, subject),
        });
        let text = text.as_str();
        let button = button.as_ref();

        let fan_out = fan_out(&targets, |group_id| async move {
            let action = platform.ban_member(group_id, subject).await;
            let notify = match action {
                Ok(()) => Some(platform.send_message(group_id, text, button).await),
                Err(_) => None,
            };
            GroupAttempt {
                group_id,
                action,
                notify,
            }
        })
        .await;

        info!(
            admin_id = admin.user_id,
            user_id = subject,
            success = fan_out.success_count(),
            failed = fan_out.failed_count(),
            "User banned"
        );

        Ok(BanOutcome { ban, fan_out })
    }

    /// Delete the ban, then unban in every group
    pub async fn apply_unban(
        &self,
        subject: i64,
        admin: &AdminRecord,
        reason: &str,
    ) -> WardenResult<FanOutOutcome> {
        let targets = self.groups.group_ids().await?;
        self.store.remove_ban(subject, admin.user_id, reason).await?;

        let platform = self.platform.as_ref();
        let fan_out = fan_out(&targets, |group_id| async move {
            GroupAttempt {
                group_id,
                action: platform.unban_member(group_id, subject).await,
                notify: None,
            }
        })
        .await;

        info!(
            admin_id = admin.user_id,
            user_id = subject,
            success = fan_out.success_count(),
            failed = fan_out.failed_count(),
            "User unbanned"
        );

        Ok(fan_out)
    }

    /// Record a mute, then restrict the subject in every group
    pub async fn apply_mute(
        &self,
        subject: i64,
        admin: &AdminRecord,
        reason: &str,
        proofs: &str,
        duration: &str,
    ) -> WardenResult<MuteOutcome> {
        let parsed = parse_duration(duration)?;
        let mute_date = Utc::now();
        let until = parsed.until_from(mute_date)?;
        let targets = self.groups.group_ids().await?;

        let mute = self
            .store
            .insert_mute(subject, admin.user_id, reason, proofs, duration.trim(), mute_date)
            .await?;

        let platform = self.platform.as_ref();
        let fan_out = fan_out(&targets, |group_id| async move {
            GroupAttempt {
                group_id,
                action: platform.restrict_member(group_id, subject, until).await,
                notify: None,
            }
        })
        .await;

        info!(
            admin_id = admin.user_id,
            user_id = subject,
            until = %until,
            success = fan_out.success_count(),
            failed = fan_out.failed_count(),
            "User muted"
        );

        Ok(MuteOutcome {
            mute,
            until,
            fan_out,
        })
    }

    /// Record a warning, or ban the subject once the running total reaches
    /// the threshold. The triggering warning is not stored.
    pub async fn apply_warning(
        &self,
        subject: i64,
        admin: &AdminRecord,
        reason: &str,
        proofs: &str,
        count: i64,
    ) -> WardenResult<WarnOutcome> {
        if count < 1 {
            return Err(WardenError::Validation(
                "Warning count must be at least 1".to_string(),
            ));
        }

        let inserted = self
            .store
            .record_warning(
                NewWarning {
                    user_id: subject,
                    admin_id: admin.user_id,
                    reason,
                    proofs,
                    count,
                },
                WARN_THRESHOLD,
            )
            .await?;

        let (total, warning) = match inserted {
            WarningInsert::Recorded { total, warning } => (total, warning),
            WarningInsert::ThresholdReached { total } => {
                let ban_reason = format!(
                    "Automatic ban: warning limit reached ({}/{})\nLast reason: {}",
                    total, WARN_THRESHOLD, reason
                );
                let ban = self
                    .apply_ban(subject, admin, &ban_reason, proofs, &[])
                    .await?;
                info!(admin_id = admin.user_id, user_id = subject, total, "Warnings escalated to ban");
                return Ok(WarnOutcome::Escalated { total, ban });
            }
        };
        info!(admin_id = admin.user_id, user_id = subject, total, "User warned");

        Ok(WarnOutcome::Warned { total, warning })
    }
}

/// Run `attempt` for every group concurrently and sort the results
async fn fan_out<F, Fut>(targets: &[i64], attempt: F) -> FanOutOutcome
where
    F: Fn(i64) -> Fut,
    Fut: Future<Output = GroupAttempt>,
{
    let attempts = join_all(targets.iter().map(|&group_id| attempt(group_id))).await;

    let mut outcome = FanOutOutcome::default();
    for attempt in attempts {
        match attempt.action {
            Ok(()) => {
                outcome.success_groups.push(attempt.group_id);
                if let Some(Err(e)) = attempt.notify {
                    warn!(group_id = attempt.group_id, error = %e, "Group notification failed");
                    outcome.notify_failures.push(GroupFailure {
                        group_id: attempt.group_id,
                        error: platform_message(&e),
                    });
                }
            }
            Err(e) => {
                warn!(group_id = attempt.group_id, error = %e, "Group action failed");
                outcome.failed_groups.push(GroupFailure {
                    group_id: attempt.group_id,
                    error: platform_message(&e),
                });
            }
        }
    }
    outcome
}

/// Error text without the variant prefix
fn platform_message(error: &WardenError) -> String {
    match error {
        WardenError::Platform(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        admin::audit::{ActionType, AuditLog},
        db::{create_memory_pool, create_pool, run_migrations, DatabaseOptions},
        platform::{DryRunPlatform, PlatformCall},
    };
    use sqlx::SqlitePool;

    struct Fixture {
        coordinator: ModerationCoordinator,
        store: ModerationStore,
        audit: AuditLog,
        platform: Arc<DryRunPlatform>,
    }

    fn admin() -> AdminRecord {
        AdminRecord {
            user_id: 1,
            rank: None,
            points: 100,
        }
    }

    async fn fixture(groups: &[i64]) -> Fixture {
        fixture_on(create_memory_pool().await.unwrap(), groups).await
    }

    async fn fixture_on(db: SqlitePool, groups: &[i64]) -> Fixture {
        let registry = GroupRegistry::new(db.clone());
        for group_id in groups {
            registry.add(&admin(), *group_id, "Group", None).await.unwrap();
        }

        let store = ModerationStore::new(db.clone());
        let platform = Arc::new(DryRunPlatform::new());
        let coordinator = ModerationCoordinator::new(
            store.clone(),
            registry,
            platform.clone(),
            Some("https://t.me/wardenbot?startapp=user_".to_string()),
        );

        Fixture {
            coordinator,
            store,
            audit: AuditLog::new(db),
            platform,
        }
    }

    #[tokio::test]
    async fn test_ban_partial_failure_is_success() {
        let f = fixture(&[-1001, -1002, -1003]).await;
        f.platform.fail_group(-1002).await;

        let outcome = f
            .coordinator
            .apply_ban(500, &admin(), "spam", "link", &[])
            .await
            .unwrap();

        assert_eq!(outcome.fan_out.total_groups(), 3);
        assert_eq!(outcome.fan_out.success_count(), 2);
        assert_eq!(outcome.fan_out.failed_count(), 1);
        assert_eq!(outcome.fan_out.failed_groups[0].group_id, -1002);
        assert!(f.store.is_banned(500).await.unwrap());
        assert_eq!(f.audit.count_for_target(ActionType::Ban, 500).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ban_with_every_group_failing_still_commits() {
        let f = fixture(&[-1001, -1002]).await;
        f.platform.fail_group(-1001).await;
        f.platform.fail_group(-1002).await;

        let outcome = f
            .coordinator
            .apply_ban(501, &admin(), "spam", "link", &[])
            .await
            .unwrap();

        assert_eq!(outcome.fan_out.success_count(), 0);
        assert_eq!(outcome.fan_out.failed_count(), 2);
        assert!(f.store.is_banned(501).await.unwrap());
        assert_eq!(f.audit.count_for_target(ActionType::Ban, 501).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ban_notifies_with_escaped_reason() {
        let f = fixture(&[-1001]).await;
        f.coordinator
            .apply_ban(502, &admin(), "<script>", "link", &[])
            .await
            .unwrap();

        let calls = f.platform.calls().await;
        assert_eq!(calls[0], PlatformCall::Ban { chat_id: -1001, user_id: 502 });
        match &calls[1] {
            PlatformCall::SendMessage { text, button, .. } => {
                assert!(text.contains("&lt;script&gt;"));
                assert_eq!(
                    button.as_ref().unwrap().url,
                    "https://t.me/wardenbot?startapp=user_502"
                );
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notify_failure_keeps_group_successful() {
        let f = fixture(&[-1001, -1002]).await;
        f.platform.fail_notifications(-1001).await;

        let outcome = f
            .coordinator
            .apply_ban(503, &admin(), "spam", "link", &[])
            .await
            .unwrap();

        assert_eq!(outcome.fan_out.success_count(), 2);
        assert_eq!(outcome.fan_out.failed_count(), 0);
        assert_eq!(outcome.fan_out.notify_failures.len(), 1);
        assert_eq!(outcome.fan_out.notify_failures[0].group_id, -1001);
    }

    #[tokio::test]
    async fn test_double_ban_conflicts_without_fan_out() {
        let f = fixture(&[-1001]).await;
        f.coordinator
            .apply_ban(504, &admin(), "spam", "link", &[])
            .await
            .unwrap();
        let calls_after_first = f.platform.calls().await.len();

        assert!(matches!(
            f.coordinator.apply_ban(504, &admin(), "again", "link", &[]).await,
            Err(WardenError::Conflict(_))
        ));
        assert_eq!(f.platform.calls().await.len(), calls_after_first);
        assert_eq!(f.audit.count_for_target(ActionType::Ban, 504).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unban_and_missing_ban() {
        let f = fixture(&[-1001]).await;
        assert!(matches!(
            f.coordinator.apply_unban(505, &admin(), "appeal").await,
            Err(WardenError::NotFound(_))
        ));

        f.coordinator
            .apply_ban(505, &admin(), "spam", "link", &[])
            .await
            .unwrap();
        let outcome = f.coordinator.apply_unban(505, &admin(), "appeal").await.unwrap();
        assert_eq!(outcome.success_groups, vec![-1001]);
        assert!(!f.store.is_banned(505).await.unwrap());
    }

    #[tokio::test]
    async fn test_mute_parses_duration_first() {
        let f = fixture(&[-1001]).await;
        assert!(matches!(
            f.coordinator.apply_mute(506, &admin(), "flood", "-", "abc").await,
            Err(WardenError::InvalidDuration(_))
        ));
        assert!(f.store.mutes_for(506).await.unwrap().is_empty());

        let outcome = f
            .coordinator
            .apply_mute(506, &admin(), "flood", "-", "30м")
            .await
            .unwrap();
        assert_eq!((outcome.until - outcome.mute.mute_date).num_seconds(), 1800);
        assert!(matches!(
            f.platform.calls().await[0],
            PlatformCall::Restrict { chat_id: -1001, user_id: 506, .. }
        ));
        assert_eq!(f.audit.count_for_target(ActionType::Mute, 506).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_mute_stores_nothing() {
        let f = fixture(&[-1001]).await;

        for raw in ["999999г", "9999999999мес"] {
            assert!(matches!(
                f.coordinator.apply_mute(510, &admin(), "flood", "-", raw).await,
                Err(WardenError::InvalidDuration(_))
            ));
        }
        assert!(f.store.mutes_for(510).await.unwrap().is_empty());
        assert_eq!(f.audit.count_for_target(ActionType::Mute, 510).await.unwrap(), 0);
        assert!(f.platform.calls().await.is_empty());
    }

    async fn assert_concurrent_warnings_escalate(f: &Fixture, subject: i64) {
        f.coordinator
            .apply_warning(subject, &admin(), "rude", "-", 1)
            .await
            .unwrap();

        let (admin_a, admin_b) = (admin(), admin());
        let (a, b) = tokio::join!(
            f.coordinator.apply_warning(subject, &admin_a, "rude", "-", 1),
            f.coordinator.apply_warning(subject, &admin_b, "rude", "-", 1)
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        let escalated = outcomes
            .iter()
            .filter(|o| matches!(o, WarnOutcome::Escalated { total: 3, .. }))
            .count();
        let warned = outcomes
            .iter()
            .filter(|o| matches!(o, WarnOutcome::Warned { total: 2, .. }))
            .count();
        assert_eq!((escalated, warned), (1, 1));

        assert!(f.store.is_banned(subject).await.unwrap());
        assert_eq!(f.store.warning_records(subject).await.unwrap(), 2);
        assert_eq!(f.audit.count_for_target(ActionType::Ban, subject).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_warnings_cannot_skip_the_ban() {
        let f = fixture(&[-1001]).await;
        assert_concurrent_warnings_escalate(&f, 511).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_warnings_on_shared_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_pool(&dir.path().join("warden.sqlite"), DatabaseOptions::default())
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();

        let f = fixture_on(db, &[-1001]).await;
        assert_concurrent_warnings_escalate(&f, 512).await;
    }

    #[tokio::test]
    async fn test_third_warning_escalates() {
        let f = fixture(&[-1001]).await;

        for expected in 1..=2 {
            match f
                .coordinator
                .apply_warning(507, &admin(), "rude", "-", 1)
                .await
                .unwrap()
            {
                WarnOutcome::Warned { total, .. } => assert_eq!(total, expected),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(!f.store.is_banned(507).await.unwrap());
        assert_eq!(f.store.warning_records(507).await.unwrap(), 2);

        match f
            .coordinator
            .apply_warning(507, &admin(), "rude", "-", 1)
            .await
            .unwrap()
        {
            WarnOutcome::Escalated { total, ban } => {
                assert_eq!(total, 3);
                assert!(ban.ban.reason.contains("3/3"));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(f.store.is_banned(507).await.unwrap());
        assert_eq!(f.store.warning_records(507).await.unwrap(), 2);
        assert_eq!(f.audit.count_for_target(ActionType::Ban, 507).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_single_large_warning_escalates() {
        let f = fixture(&[]).await;
        let outcome = f
            .coordinator
            .apply_warning(508, &admin(), "raid", "-", 3)
            .await
            .unwrap();

        assert!(matches!(outcome, WarnOutcome::Escalated { total: 3, .. }));
        assert_eq!(f.store.warning_records(508).await.unwrap(), 0);
        assert_eq!(f.audit.count_for_target(ActionType::Warn, 508).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_warning_count_must_be_positive() {
        let f = fixture(&[]).await;
        assert!(matches!(
            f.coordinator.apply_warning(509, &admin(), "rude", "-", 0).await,
            Err(WardenError::Validation(_))
        ));
    }
}
