/// Ban, mute and warning records
///
/// Every mutation writes its audit entry in the same transaction as the
/// record itself, so a committed record always has exactly one log entry.
use crate::{
    admin::audit::{self, ActionType},
    db::{decode_timestamp, encode_timestamp},
    error::{is_unique_violation, WardenError, WardenResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Active ban
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanRecord {
    pub id: i64,
    pub user_id: i64,
    pub admin_id: i64,
    pub reason: String,
    pub proofs: String,
    /// Base64-encoded evidence images
    pub images: Vec<String>,
    pub ban_date: DateTime<Utc>,
}

/// Ban details shown to the public, with the banning admin's current points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicBan {
    pub ban: BanRecord,
    pub admin_points: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteRecord {
    pub id: i64,
    pub user_id: i64,
    pub admin_id: i64,
    pub reason: String,
    pub proofs: String,
    pub duration: String,
    pub mute_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningRecord {
    pub id: i64,
    pub user_id: i64,
    pub admin_id: i64,
    pub reason: String,
    pub proofs: String,
    pub count: i64,
    pub warning_date: DateTime<Utc>,
}

/// New ban to persist
#[derive(Debug, Clone)]
pub struct NewBan<'a> {
    pub user_id: i64,
    pub admin_id: i64,
    pub reason: &'a str,
    pub proofs: &'a str,
    pub images: &'a [String],
}

/// New warning to persist
#[derive(Debug, Clone, Copy)]
pub struct NewWarning<'a> {
    pub user_id: i64,
    pub admin_id: i64,
    pub reason: &'a str,
    pub proofs: &'a str,
    pub count: i64,
}

/// Result of a guarded warning insert
#[derive(Debug, Clone)]
pub enum WarningInsert {
    /// Stored; `total` includes this warning
    Recorded { warning: WarningRecord, total: i64 },
    /// Nothing stored; `total` is what the subject would have reached
    ThresholdReached { total: i64 },
}

/// Decode the stored image array; anything malformed reads as no images
fn decode_images(ban_id: i64, raw: Option<String>) -> Vec<String> {
    match raw.as_deref() {
        None | Some("") => Vec::new(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::error!(ban_id, error = %e, "Malformed ban images column");
            Vec::new()
        }),
    }
}

fn ban_from_row(row: &SqliteRow) -> WardenResult<BanRecord> {
    let id: i64 = row.get("id");
    let ban_date: String = row.get("ban_date");
    Ok(BanRecord {
        id,
        user_id: row.get("user_id"),
        admin_id: row.get("admin_id"),
        reason: row.get("reason"),
        proofs: row.get("proofs"),
        images: decode_images(id, row.get("images")),
        ban_date: decode_timestamp(&ban_date)?,
    })
}

/// Storage for bans, mutes and warnings
#[derive(Clone)]
pub struct ModerationStore {
    db: SqlitePool,
}

impl ModerationStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a ban and its audit entry.
    ///
    /// The UNIQUE constraint on `bans.user_id` decides races between two
    /// concurrent bans of the same subject; the loser gets `Conflict`.
    pub async fn insert_ban(&self, ban: NewBan<'_>) -> WardenResult<BanRecord> {
        let ban_date = Utc::now();
        let images = serde_json::to_string(ban.images)
            .map_err(|e| WardenError::Internal(format!("Failed to encode images: {}", e)))?;

        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO bans (user_id, admin_id, reason, proofs, images, ban_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ban.user_id)
        .bind(ban.admin_id)
        .bind(ban.reason)
        .bind(ban.proofs)
        .bind(&images)
        .bind(encode_timestamp(ban_date))
        .execute(&mut *tx)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(WardenError::Conflict(format!(
                    "User {} is already banned",
                    ban.user_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        audit::append(
            &mut tx,
            ban.admin_id,
            ActionType::Ban,
            Some(ban.user_id),
            &format!("Reason: {}", ban.reason),
        )
        .await?;
        tx.commit().await?;

        Ok(BanRecord {
            id,
            user_id: ban.user_id,
            admin_id: ban.admin_id,
            reason: ban.reason.to_string(),
            proofs: ban.proofs.to_string(),
            images: ban.images.to_vec(),
            ban_date,
        })
    }

    /// Delete the subject's ban and log the unban
    pub async fn remove_ban(&self, user_id: i64, admin_id: i64, reason: &str) -> WardenResult<()> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query("DELETE FROM bans WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WardenError::NotFound(format!("User {} is not banned", user_id)));
        }

        audit::append(
            &mut tx,
            admin_id,
            ActionType::Unban,
            Some(user_id),
            &format!("Reason: {}", reason),
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }

    pub async fn find_ban(&self, user_id: i64) -> WardenResult<Option<BanRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, admin_id, reason, proofs, images, ban_date FROM bans WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(ban_from_row).transpose()
    }

    pub async fn is_banned(&self, user_id: i64) -> WardenResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM bans WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Bans newest first, optionally filtered by a substring of the subject id
    pub async fn list_bans(&self, search_id: Option<&str>) -> WardenResult<Vec<BanRecord>> {
        let pattern = search_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, admin_id, reason, proofs, images, ban_date
            FROM bans
            WHERE (?1 IS NULL OR CAST(user_id AS TEXT) LIKE ?1)
            ORDER BY ban_date DESC, id DESC
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(ban_from_row).collect()
    }

    /// Ban joined with the banning admin's points, for the public ban page
    pub async fn public_ban(&self, user_id: i64) -> WardenResult<Option<PublicBan>> {
        let row = sqlx::query(
            r#"
            SELECT bans.id, bans.user_id, bans.admin_id, bans.reason, bans.proofs,
                   bans.images, bans.ban_date, admins.points AS admin_points
            FROM bans
            LEFT JOIN admins ON bans.admin_id = admins.user_id
            WHERE bans.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(PublicBan {
                ban: ban_from_row(&row)?,
                admin_points: row.get("admin_points"),
            })),
        }
    }

    /// Insert a mute and its audit entry. Mutes accumulate per subject.
    pub async fn insert_mute(
        &self,
        user_id: i64,
        admin_id: i64,
        reason: &str,
        proofs: &str,
        duration: &str,
        mute_date: DateTime<Utc>,
    ) -> WardenResult<MuteRecord> {
        let mut tx = self.db.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO mutes (user_id, admin_id, reason, proofs, duration, mute_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(admin_id)
        .bind(reason)
        .bind(proofs)
        .bind(duration)
        .bind(encode_timestamp(mute_date))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        audit::append(
            &mut tx,
            admin_id,
            ActionType::Mute,
            Some(user_id),
            &format!("Reason: {}, Duration: {}", reason, duration),
        )
        .await?;
        tx.commit().await?;

        Ok(MuteRecord {
            id,
            user_id,
            admin_id,
            reason: reason.to_string(),
            proofs: proofs.to_string(),
            duration: duration.to_string(),
            mute_date,
        })
    }

    pub async fn mutes_for(&self, user_id: i64) -> WardenResult<Vec<MuteRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, admin_id, reason, proofs, duration, mute_date
            FROM mutes WHERE user_id = ? ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let mute_date: String = row.get("mute_date");
                Ok(MuteRecord {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    admin_id: row.get("admin_id"),
                    reason: row.get("reason"),
                    proofs: row.get("proofs"),
                    duration: row.get("duration"),
                    mute_date: decode_timestamp(&mute_date)?,
                })
            })
            .collect()
    }

    /// Record a warning unless it would bring the subject's total to
    /// `threshold`.
    ///
    /// The sum check and the insert are one statement, and a writing
    /// statement takes SQLite's write lock before it reads, so concurrent
    /// warnings for one subject are serialized.
    pub async fn record_warning(
        &self,
        warning: NewWarning<'_>,
        threshold: i64,
    ) -> WardenResult<WarningInsert> {
        let warning_date = Utc::now();
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO warnings (user_id, admin_id, reason, proofs, count, warning_date)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6
            WHERE (SELECT COALESCE(SUM(count), 0) FROM warnings WHERE user_id = ?1) + ?5 < ?7
            "#,
        )
        .bind(warning.user_id)
        .bind(warning.admin_id)
        .bind(warning.reason)
        .bind(warning.proofs)
        .bind(warning.count)
        .bind(encode_timestamp(warning_date))
        .bind(threshold)
        .execute(&mut *tx)
        .await?;

        let stored: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(count), 0) FROM warnings WHERE user_id = ?")
                .bind(warning.user_id)
                .fetch_one(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(WarningInsert::ThresholdReached {
                total: stored.saturating_add(warning.count),
            });
        }

        audit::append(
            &mut tx,
            warning.admin_id,
            ActionType::Warn,
            Some(warning.user_id),
            &format!(
                "Reason: {}, Count: {}, Total: {}",
                warning.reason, warning.count, stored
            ),
        )
        .await?;
        tx.commit().await?;

        Ok(WarningInsert::Recorded {
            total: stored,
            warning: WarningRecord {
                id: result.last_insert_rowid(),
                user_id: warning.user_id,
                admin_id: warning.admin_id,
                reason: warning.reason.to_string(),
                proofs: warning.proofs.to_string(),
                count: warning.count,
                warning_date,
            },
        })
    }

    pub async fn warning_records(&self, user_id: i64) -> WardenResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM warnings WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{admin::audit::AuditLog, db::create_memory_pool};

    fn new_ban(user_id: i64) -> NewBan<'static> {
        NewBan {
            user_id,
            admin_id: 1,
            reason: "spam",
            proofs: "https://t.me/c/1/2",
            images: &[],
        }
    }

    #[tokio::test]
    async fn test_ban_lifecycle() {
        let db = create_memory_pool().await.unwrap();
        let store = ModerationStore::new(db.clone());
        let log = AuditLog::new(db);

        let images = vec!["aGVsbG8=".to_string()];
        let ban = store
            .insert_ban(NewBan {
                images: &images,
                ..new_ban(42)
            })
            .await
            .unwrap();
        assert_eq!(ban.images, images);
        assert!(store.is_banned(42).await.unwrap());

        assert!(matches!(
            store.insert_ban(new_ban(42)).await,
            Err(WardenError::Conflict(_))
        ));
        assert_eq!(log.count_for_target(ActionType::Ban, 42).await.unwrap(), 1);

        let found = store.find_ban(42).await.unwrap().unwrap();
        assert_eq!(found.images, images);

        store.remove_ban(42, 1, "appeal").await.unwrap();
        assert!(!store.is_banned(42).await.unwrap());
        assert!(matches!(
            store.remove_ban(42, 1, "again").await,
            Err(WardenError::NotFound(_))
        ));
        assert_eq!(log.count_for_target(ActionType::Unban, 42).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_bans_search_and_bad_images() {
        let db = create_memory_pool().await.unwrap();
        let store = ModerationStore::new(db.clone());

        store.insert_ban(new_ban(12345)).await.unwrap();
        store.insert_ban(new_ban(67890)).await.unwrap();
        sqlx::query("UPDATE bans SET images = 'not json' WHERE user_id = 67890")
            .execute(&db)
            .await
            .unwrap();

        let all = store.list_bans(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_id, 67890);
        assert!(all[0].images.is_empty());

        let found = store.list_bans(Some("234")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, 12345);

        assert_eq!(store.list_bans(Some("  ")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_public_ban_joins_admin_points() {
        let db = create_memory_pool().await.unwrap();
        sqlx::query("INSERT INTO admins (user_id, points) VALUES (1, 75)")
            .execute(&db)
            .await
            .unwrap();
        let store = ModerationStore::new(db);

        assert!(store.public_ban(5).await.unwrap().is_none());
        store.insert_ban(new_ban(5)).await.unwrap();

        let public = store.public_ban(5).await.unwrap().unwrap();
        assert_eq!(public.admin_points, Some(75));
        assert_eq!(public.ban.reason, "spam");
    }

    #[tokio::test]
    async fn test_mutes_accumulate() {
        let db = create_memory_pool().await.unwrap();
        let store = ModerationStore::new(db);

        store.insert_mute(9, 1, "flood", "-", "30м", Utc::now()).await.unwrap();
        store.insert_mute(9, 1, "flood", "-", "1ч", Utc::now()).await.unwrap();
        let mutes = store.mutes_for(9).await.unwrap();
        assert_eq!(mutes.len(), 2);
        assert_eq!(mutes[1].duration, "1ч");
    }

    #[tokio::test]
    async fn test_warnings_stop_at_threshold() {
        let db = create_memory_pool().await.unwrap();
        let store = ModerationStore::new(db.clone());
        let warning = |count| NewWarning {
            user_id: 3,
            admin_id: 1,
            reason: "rude",
            proofs: "-",
            count,
        };

        match store.record_warning(warning(1), 3).await.unwrap() {
            WarningInsert::Recorded { total, warning } => {
                assert_eq!(total, 1);
                assert_eq!(warning.count, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            store.record_warning(warning(1), 3).await.unwrap(),
            WarningInsert::Recorded { total: 2, .. }
        ));
        assert!(matches!(
            store.record_warning(warning(2), 3).await.unwrap(),
            WarningInsert::ThresholdReached { total: 4 }
        ));

        assert_eq!(store.warning_records(3).await.unwrap(), 2);
        let log = AuditLog::new(db);
        assert_eq!(log.count_for_target(ActionType::Warn, 3).await.unwrap(), 2);
    }
}
