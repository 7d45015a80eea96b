// ==========================================
// 药品库位管理系统 - 预警记录数据仓储
// ==========================================
// 红线: 只追加，不更新、不去重
// ==========================================

use crate::domain::alert::{Alert, NewAlert};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

fn map_alert_row(row: &Row) -> SqliteResult<Alert> {
    Ok(Alert {
        alert_id: row.get(0)?,
        batch_id: row.get(1)?,
        message: row.get(2)?,
        created_at: row.get::<_, NaiveDateTime>(3)?,
    })
}

/// 预警记录仓储
pub struct AlertRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AlertRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入预警
    ///
    /// # 返回
    /// - Ok(i64): 预警ID
    pub fn insert(&self, alert: &NewAlert) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO alerts (batch_id, message, created_at) VALUES (?1, ?2, ?3)",
            params![
                alert.batch_id,
                alert.message,
                alert.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 最近的预警（按时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<Alert>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT alert_id, batch_id, message, created_at
            FROM alerts
            ORDER BY created_at DESC, alert_id DESC
            LIMIT ?1
            "#,
        )?;

        let alerts = stmt
            .query_map(params![limit as i64], map_alert_row)?
            .collect::<SqliteResult<Vec<Alert>>>()?;
        Ok(alerts)
    }

    /// 某批次分量的全部预警（按时间正序）
    pub fn list_by_batch(&self, batch_id: i64) -> RepositoryResult<Vec<Alert>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT alert_id, batch_id, message, created_at
            FROM alerts
            WHERE batch_id = ?1
            ORDER BY created_at, alert_id
            "#,
        )?;

        let alerts = stmt
            .query_map(params![batch_id], map_alert_row)?
            .collect::<SqliteResult<Vec<Alert>>>()?;
        Ok(alerts)
    }

    /// 预警总数
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count)
    }
}
