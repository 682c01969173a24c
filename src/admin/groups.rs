/// Registry of chat groups that moderation actions fan out to
use crate::{
    admin::{
        audit::{self, ActionType},
        roles::{ensure_senior, AdminRecord},
    },
    db::{decode_timestamp, encode_timestamp},
    error::{is_unique_violation, WardenError, WardenResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Registered group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_id: i64,
    pub title: String,
    pub username: Option<String>,
    pub added_date: DateTime<Utc>,
}

/// Normalize a user-typed supergroup id to its `-100…` form
pub fn normalize_group_id(raw: &str) -> WardenResult<i64> {
    let raw = raw.trim();
    let invalid = || WardenError::Validation(format!("Invalid group id: {:?}", raw));

    let digits = if raw.starts_with("-100") {
        return raw.parse().map_err(|_| invalid());
    } else if let Some(rest) = raw.strip_prefix('-') {
        rest
    } else {
        raw
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    format!("-100{}", digits).parse().map_err(|_| invalid())
}

/// Group registry backed by the `groups` table
#[derive(Clone)]
pub struct GroupRegistry {
    db: SqlitePool,
}

impl GroupRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> WardenResult<Vec<GroupRecord>> {
        let rows = sqlx::query(
            "SELECT group_id, title, username, added_date FROM groups ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let added: String = row.get("added_date");
                Ok(GroupRecord {
                    group_id: row.get("group_id"),
                    title: row.get("title"),
                    username: row.get("username"),
                    added_date: decode_timestamp(&added)?,
                })
            })
            .collect()
    }

    /// Fan-out targets
    pub async fn group_ids(&self) -> WardenResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT group_id FROM groups ORDER BY id")
            .fetch_all(&self.db)
            .await?;
        Ok(ids)
    }

    /// Register a group on behalf of a senior admin
    pub async fn add(
        &self,
        actor: &AdminRecord,
        group_id: i64,
        title: &str,
        username: Option<&str>,
    ) -> WardenResult<GroupRecord> {
        ensure_senior(actor)?;
        let added_date = Utc::now();
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            "INSERT INTO groups (group_id, title, username, added_date) VALUES (?, ?, ?, ?)",
        )
        .bind(group_id)
        .bind(title)
        .bind(username)
        .bind(encode_timestamp(added_date))
        .execute(&mut *tx)
        .await;

        match result {
            Err(e) if is_unique_violation(&e) => {
                return Err(WardenError::Conflict(format!(
                    "Group {} is already registered",
                    group_id
                )));
            }
            other => {
                other?;
            }
        }

        audit::append(
            &mut tx,
            actor.user_id,
            ActionType::GroupAdd,
            Some(group_id),
            &format!("Group added: {}", title),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(admin_id = actor.user_id, group_id, "Group registered");

        Ok(GroupRecord {
            group_id,
            title: title.to_string(),
            username: username.map(str::to_string),
            added_date,
        })
    }

    /// Unregister a group, returning its stored title
    pub async fn remove(&self, actor: &AdminRecord, group_id: i64) -> WardenResult<String> {
        ensure_senior(actor)?;
        let mut tx = self.db.begin().await?;

        let title: Option<String> = sqlx::query_scalar("SELECT title FROM groups WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await?;
        let title =
            title.ok_or_else(|| WardenError::NotFound(format!("Group {} not found", group_id)))?;

        sqlx::query("DELETE FROM groups WHERE group_id = ?")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        audit::append(
            &mut tx,
            actor.user_id,
            ActionType::GroupRemove,
            Some(group_id),
            &format!("Group removed: {}", title),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(admin_id = actor.user_id, group_id, "Group removed");
        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn senior() -> AdminRecord {
        AdminRecord {
            user_id: 1,
            rank: None,
            points: 100,
        }
    }

    #[test]
    fn test_normalize_group_id() {
        assert_eq!(normalize_group_id("-1001234").unwrap(), -1001234);
        assert_eq!(normalize_group_id("-1234").unwrap(), -1001234);
        assert_eq!(normalize_group_id("1234").unwrap(), -1001234);
        assert_eq!(normalize_group_id(" 55 ").unwrap(), -10055);
        assert!(normalize_group_id("abc").is_err());
        assert!(normalize_group_id("-").is_err());
        assert!(normalize_group_id("-100abc").is_err());
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let db = create_memory_pool().await.unwrap();
        let registry = GroupRegistry::new(db);

        registry.add(&senior(), -1001, "First", Some("first")).await.unwrap();
        registry.add(&senior(), -1002, "Second", None).await.unwrap();

        assert!(matches!(
            registry.add(&senior(), -1001, "Again", None).await,
            Err(WardenError::Conflict(_))
        ));

        assert_eq!(registry.group_ids().await.unwrap(), vec![-1001, -1002]);
        let groups = registry.list().await.unwrap();
        assert_eq!(groups[0].username.as_deref(), Some("first"));

        assert_eq!(registry.remove(&senior(), -1001).await.unwrap(), "First");
        assert!(matches!(
            registry.remove(&senior(), -1001).await,
            Err(WardenError::NotFound(_))
        ));
        assert_eq!(registry.group_ids().await.unwrap(), vec![-1002]);
    }
}
