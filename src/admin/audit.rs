/// Append-only admin action log and last-seen admin IPs
use crate::{
    db::{decode_timestamp, encode_timestamp},
    error::{WardenError, WardenResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Maximum entries returned by a log listing
pub const LOG_PAGE_SIZE: i64 = 100;

/// Kinds of audited actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Ban,
    Unban,
    Mute,
    Warn,
    AdminAdd,
    AdminRemove,
    AdminUpdate,
    GroupAdd,
    GroupRemove,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Ban => "ban",
            ActionType::Unban => "unban",
            ActionType::Mute => "mute",
            ActionType::Warn => "warn",
            ActionType::AdminAdd => "admin_add",
            ActionType::AdminRemove => "admin_remove",
            ActionType::AdminUpdate => "admin_update",
            ActionType::GroupAdd => "group_add",
            ActionType::GroupRemove => "group_remove",
        }
    }

    pub fn from_str(s: &str) -> WardenResult<Self> {
        match s.to_lowercase().as_str() {
            "ban" => Ok(ActionType::Ban),
            "unban" => Ok(ActionType::Unban),
            "mute" => Ok(ActionType::Mute),
            "warn" => Ok(ActionType::Warn),
            "admin_add" => Ok(ActionType::AdminAdd),
            "admin_remove" => Ok(ActionType::AdminRemove),
            "admin_update" => Ok(ActionType::AdminUpdate),
            "group_add" => Ok(ActionType::GroupAdd),
            "group_remove" => Ok(ActionType::GroupRemove),
            _ => Err(WardenError::Validation(format!("Invalid action type: {}", s))),
        }
    }
}

/// Admin action audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub admin_id: i64,
    pub action_type: ActionType,
    pub target_id: Option<i64>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Acting admin's current points, 0 if no longer an admin
    pub admin_points: i64,
    /// Last-seen IP of the acting admin
    pub admin_ip: Option<String>,
}

/// Append an entry inside the caller's transaction
pub async fn append(
    conn: &mut SqliteConnection,
    admin_id: i64,
    action: ActionType,
    target_id: Option<i64>,
    details: &str,
) -> WardenResult<()> {
    sqlx::query(
        r#"
        INSERT INTO admin_logs (admin_id, action_type, target_id, details, timestamp)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(admin_id)
    .bind(action.as_str())
    .bind(target_id)
    .bind(details)
    .bind(encode_timestamp(Utc::now()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Audit log reader and IP tracker
#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
}

impl AuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Newest entries first, optionally filtered by admin and action
    pub async fn list(
        &self,
        filter_admin: Option<i64>,
        action_type: Option<ActionType>,
    ) -> WardenResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT admin_logs.id, admin_logs.admin_id, admin_logs.action_type,
                   admin_logs.target_id, admin_logs.details, admin_logs.timestamp,
                   admins.points AS admin_points,
                   admin_ips.ip_address AS admin_ip
            FROM admin_logs
            LEFT JOIN admins ON admin_logs.admin_id = admins.user_id
            LEFT JOIN admin_ips ON admin_logs.admin_id = admin_ips.admin_id
            WHERE (?1 IS NULL OR admin_logs.admin_id = ?1)
              AND (?2 IS NULL OR admin_logs.action_type = ?2)
            ORDER BY admin_logs.timestamp DESC, admin_logs.id DESC
            LIMIT ?3
            "#,
        )
        .bind(filter_admin)
        .bind(action_type.map(|a| a.as_str()))
        .bind(LOG_PAGE_SIZE)
        .fetch_all(&self.db)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let action_str: String = row.get("action_type");
            let timestamp_str: String = row.get("timestamp");

            entries.push(AuditLogEntry {
                id: row.get("id"),
                admin_id: row.get("admin_id"),
                action_type: ActionType::from_str(&action_str)?,
                target_id: row.get("target_id"),
                details: row.get("details"),
                timestamp: decode_timestamp(&timestamp_str)?,
                admin_points: row.get::<Option<i64>, _>("admin_points").unwrap_or(0),
                admin_ip: row.get("admin_ip"),
            });
        }

        Ok(entries)
    }

    /// Count entries of one action against one target
    pub async fn count_for_target(&self, action: ActionType, target_id: i64) -> WardenResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM admin_logs WHERE action_type = ? AND target_id = ?",
        )
        .bind(action.as_str())
        .bind(target_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Overwrite the admin's last-seen IP snapshot
    pub async fn record_ip(&self, admin_id: i64, ip_address: &str) -> WardenResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_ips (admin_id, ip_address, last_seen)
            VALUES (?, ?, ?)
            ON CONFLICT(admin_id) DO UPDATE SET
                ip_address = excluded.ip_address,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(admin_id)
        .bind(ip_address)
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn last_ip(&self, admin_id: i64) -> WardenResult<Option<String>> {
        let ip = sqlx::query_scalar("SELECT ip_address FROM admin_ips WHERE admin_id = ?")
            .bind(admin_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(ip)
    }
}
