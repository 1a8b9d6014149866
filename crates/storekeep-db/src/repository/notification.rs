//! Staff notifications. Rows are written by other components inside their own
//! transactions; this repository only reads and marks them.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::{generate_id, Notification, NotificationKind};
use tracing::debug;

use crate::error::{DbError, DbResult};

const NOTIFICATION_COLUMNS: &str = "id, kind, title, message, related_id, is_read, created_at";

/// Inserts a notification on the caller's connection.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    kind: NotificationKind,
    title: &str,
    message: &str,
    related_id: Option<&str>,
) -> DbResult<Notification> {
    let sql = format!(
        r#"
        INSERT INTO notifications (id, kind, title, message, related_id, is_read, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
        RETURNING {}
        "#,
        NOTIFICATION_COLUMNS
    );
    let notification = sqlx::query_as::<_, Notification>(&sql)
        .bind(generate_id())
        .bind(kind)
        .bind(title)
        .bind(message)
        .bind(related_id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
    Ok(notification)
}

#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    /// Newest first.
    pub async fn list(&self, unread_only: bool) -> DbResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE (?1 = 0 OR is_read = 0) \
             ORDER BY created_at DESC, rowid DESC",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, Notification>(&sql)
            .bind(unread_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn count_unread(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE is_read = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn mark_read(&self, id: &str) -> DbResult<Notification> {
        debug!(id = %id, "Marking notification read");

        let sql = format!(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 RETURNING {}",
            NOTIFICATION_COLUMNS
        );
        sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Notification", id))
    }

    /// Returns how many rows changed.
    pub async fn mark_all_read(&self) -> DbResult<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE is_read = 0")
            .execute(&self.pool)
            .await?;
        debug!(count = result.rows_affected(), "Marked all notifications read");
        Ok(result.rows_affected())
    }
}
