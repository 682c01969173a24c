/// Administrator records and the privilege gate
use crate::{
    admin::audit::{self, ActionType},
    auth::Identity,
    error::{WardenError, WardenResult},
};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Points needed to manage admins and groups
pub const SENIOR_POINTS: i64 = 90;
pub const MIN_POINTS: i64 = 1;
pub const MAX_POINTS: i64 = 100;

/// Authorization level derived from an admin record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    None,
    Admin,
    Senior,
}

impl Privilege {
    pub fn from_points(points: Option<i64>) -> Self {
        match points {
            None => Privilege::None,
            Some(p) if p >= SENIOR_POINTS => Privilege::Senior,
            Some(_) => Privilege::Admin,
        }
    }

    /// Check if this level can perform actions requiring another level
    pub fn can_act_as(&self, required: Privilege) -> bool {
        self >= &required
    }
}

/// Administrator record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRecord {
    pub user_id: i64,
    pub rank: Option<String>,
    pub points: i64,
}

impl AdminRecord {
    pub fn privilege(&self) -> Privilege {
        Privilege::from_points(Some(self.points))
    }
}

pub fn validate_points(points: i64) -> WardenResult<()> {
    if !(MIN_POINTS..=MAX_POINTS).contains(&points) {
        return Err(WardenError::Validation(format!(
            "Points must be between {} and {}",
            MIN_POINTS, MAX_POINTS
        )));
    }
    Ok(())
}

/// Admin record manager
#[derive(Clone)]
pub struct AdminManager {
    db: SqlitePool,
}

impl AdminManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Get the admin record for a user
    pub async fn get(&self, user_id: i64) -> WardenResult<Option<AdminRecord>> {
        let row = sqlx::query("SELECT user_id, rank, points FROM admins WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|row| AdminRecord {
            user_id: row.get("user_id"),
            rank: row.get("rank"),
            points: row.get("points"),
        }))
    }

    /// Fails with `Forbidden` unless the identity is an admin
    pub async fn require_admin(&self, identity: &Identity) -> WardenResult<AdminRecord> {
        self.get(identity.user_id).await?.ok_or_else(|| {
            tracing::warn!(user_id = identity.user_id, "Non-admin attempted a privileged call");
            WardenError::Forbidden("User is not an administrator".to_string())
        })
    }

    /// List all admins
    pub async fn list(&self) -> WardenResult<Vec<AdminRecord>> {
        let rows = sqlx::query("SELECT user_id, rank, points FROM admins ORDER BY points DESC, user_id")
            .fetch_all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| AdminRecord {
                user_id: row.get("user_id"),
                rank: row.get("rank"),
                points: row.get("points"),
            })
            .collect())
    }

    /// Create an admin on behalf of a senior admin
    pub async fn add(
        &self,
        actor: &AdminRecord,
        user_id: i64,
        points: i64,
        rank: Option<String>,
    ) -> WardenResult<AdminRecord> {
        ensure_senior(actor)?;
        validate_points(points)?;

        let mut tx = self.db.begin().await?;

        let result = sqlx::query("INSERT INTO admins (user_id, rank, points) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(&rank)
            .bind(points)
            .execute(&mut *tx)
            .await;

        if let Err(e) = result {
            if crate::error::is_unique_violation(&e) {
                return Err(WardenError::Conflict(format!(
                    "Administrator {} already exists",
                    user_id
                )));
            }
            return Err(e.into());
        }

        audit::append(
            &mut tx,
            actor.user_id,
            ActionType::AdminAdd,
            Some(user_id),
            &format!("Points: {}", points),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(admin_id = actor.user_id, user_id, points, "Administrator added");

        Ok(AdminRecord {
            user_id,
            rank,
            points,
        })
    }

    /// Remove an admin on behalf of a senior admin
    pub async fn remove(&self, actor: &AdminRecord, user_id: i64) -> WardenResult<()> {
        ensure_senior(actor)?;
        if actor.user_id == user_id {
            return Err(WardenError::Validation(
                "Administrators cannot remove themselves".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let result = sqlx::query("DELETE FROM admins WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WardenError::NotFound(format!(
                "Administrator {} not found",
                user_id
            )));
        }

        audit::append(
            &mut tx,
            actor.user_id,
            ActionType::AdminRemove,
            Some(user_id),
            "Administrator removed",
        )
        .await?;
        tx.commit().await?;

        tracing::info!(admin_id = actor.user_id, user_id, "Administrator removed");
        Ok(())
    }

    /// Change an admin's points on behalf of a senior admin.
    ///
    /// `details` is the human-readable audit text, typically naming both sides.
    pub async fn update_points(
        &self,
        actor: &AdminRecord,
        user_id: i64,
        points: i64,
        details: &str,
    ) -> WardenResult<()> {
        ensure_senior(actor)?;
        validate_points(points)?;

        let mut tx = self.db.begin().await?;

        let result = sqlx::query("UPDATE admins SET points = ? WHERE user_id = ?")
            .bind(points)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WardenError::NotFound(format!(
                "Administrator {} not found",
                user_id
            )));
        }

        audit::append(&mut tx, actor.user_id, ActionType::AdminUpdate, Some(user_id), details)
            .await?;
        tx.commit().await?;

        tracing::info!(admin_id = actor.user_id, user_id, points, "Administrator updated");
        Ok(())
    }

    /// Seed senior admins that are not yet present
    pub async fn seed_bootstrap(&self, user_ids: &[i64]) -> WardenResult<u64> {
        let mut seeded = 0;
        for user_id in user_ids {
            let result = sqlx::query(
                "INSERT INTO admins (user_id, rank, points) VALUES (?, 'owner', ?) ON CONFLICT(user_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(MAX_POINTS)
            .execute(&self.db)
            .await?;
            seeded += result.rows_affected();
        }

        if seeded > 0 {
            tracing::info!(seeded, "Seeded bootstrap administrators");
        }
        Ok(seeded)
    }
}

/// Fails with `Forbidden` unless the acting record has senior points
pub fn ensure_senior(actor: &AdminRecord) -> WardenResult<()> {
    if actor.privilege().can_act_as(Privilege::Senior) {
        Ok(())
    } else {
        Err(WardenError::Forbidden(format!(
            "Requires at least {} points",
            SENIOR_POINTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn identity(user_id: i64) -> Identity {
        Identity {
            user_id,
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    async fn manager_with(admins: &[(i64, i64)]) -> AdminManager {
        let db = create_memory_pool().await.unwrap();
        for (user_id, points) in admins {
            sqlx::query("INSERT INTO admins (user_id, points) VALUES (?, ?)")
                .bind(user_id)
                .bind(points)
                .execute(&db)
                .await
                .unwrap();
        }
        AdminManager::new(db)
    }

    #[test]
    fn test_privilege_levels() {
        assert_eq!(Privilege::from_points(None), Privilege::None);
        assert_eq!(Privilege::from_points(Some(1)), Privilege::Admin);
        assert_eq!(Privilege::from_points(Some(89)), Privilege::Admin);
        assert_eq!(Privilege::from_points(Some(90)), Privilege::Senior);

        assert!(Privilege::Senior.can_act_as(Privilege::Admin));
        assert!(!Privilege::Admin.can_act_as(Privilege::Senior));
        assert!(!Privilege::None.can_act_as(Privilege::Admin));
    }

    #[test]
    fn test_validate_points() {
        assert!(validate_points(1).is_ok());
        assert!(validate_points(100).is_ok());
        assert!(validate_points(0).is_err());
        assert!(validate_points(101).is_err());
    }

    #[tokio::test]
    async fn test_gate() {
        let manager = manager_with(&[(1, 95), (2, 50)]).await;

        assert!(manager.require_admin(&identity(1)).await.is_ok());
        assert!(manager.require_admin(&identity(2)).await.is_ok());
        assert!(matches!(
            manager.require_admin(&identity(3)).await,
            Err(WardenError::Forbidden(_))
        ));

        let senior = manager.require_admin(&identity(1)).await.unwrap();
        assert!(ensure_senior(&senior).is_ok());
        let junior = manager.require_admin(&identity(2)).await.unwrap();
        assert!(matches!(ensure_senior(&junior), Err(WardenError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_junior_cannot_add_admin() {
        let manager = manager_with(&[(1, 50)]).await;
        let actor = manager.get(1).await.unwrap().unwrap();

        assert!(matches!(
            manager.add(&actor, 5, 10, None).await,
            Err(WardenError::Forbidden(_))
        ));
        assert!(manager.get(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_senior_adds_updates_and_removes() {
        let manager = manager_with(&[(1, 90)]).await;
        let actor = manager.get(1).await.unwrap().unwrap();

        let added = manager.add(&actor, 5, 40, Some("helper".into())).await.unwrap();
        assert_eq!(added.points, 40);
        assert!(matches!(
            manager.add(&actor, 5, 40, None).await,
            Err(WardenError::Conflict(_))
        ));
        assert!(matches!(
            manager.add(&actor, 6, 0, None).await,
            Err(WardenError::Validation(_))
        ));

        manager.update_points(&actor, 5, 70, "1 -> 5").await.unwrap();
        assert_eq!(manager.get(5).await.unwrap().unwrap().points, 70);
        assert!(matches!(
            manager.update_points(&actor, 99, 70, "").await,
            Err(WardenError::NotFound(_))
        ));

        assert!(matches!(
            manager.remove(&actor, 1).await,
            Err(WardenError::Validation(_))
        ));
        manager.remove(&actor, 5).await.unwrap();
        assert!(matches!(
            manager.remove(&actor, 5).await,
            Err(WardenError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_seed_bootstrap_is_idempotent() {
        let manager = manager_with(&[]).await;
        assert_eq!(manager.seed_bootstrap(&[10, 11]).await.unwrap(), 2);
        assert_eq!(manager.seed_bootstrap(&[10, 11]).await.unwrap(), 0);
        let seeded = manager.get(10).await.unwrap().unwrap();
        assert_eq!(seeded.privilege(), Privilege::Senior);
    }
}
