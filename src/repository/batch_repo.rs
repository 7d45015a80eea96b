// ==========================================
// 药品库位管理系统 - 批次分量数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: slot_id 的写入（insert_tx / update_slot_tx / delete_tx）仅由 SlotAllocator 在事务内调用
// ==========================================

use crate::domain::batch::{BatchPortion, NewBatchPortion};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};

const BATCH_COLUMNS: &str =
    "batch_id, medicine_id, composition, quantity, mfg_date, exp_date, slot_id";

fn map_batch_row(row: &Row) -> SqliteResult<BatchPortion> {
    Ok(BatchPortion {
        batch_id: row.get(0)?,
        medicine_id: row.get(1)?,
        composition: row.get(2)?,
        quantity: row.get(3)?,
        mfg_date: row.get::<_, Option<NaiveDate>>(4)?,
        exp_date: row.get::<_, Option<NaiveDate>>(5)?,
        slot_id: row.get(6)?,
    })
}

// ==========================================
// BatchRepository - 批次分量仓储
// ==========================================

/// 批次分量仓储
/// 职责: 管理 batch 表的读写
pub struct BatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BatchRepository {
    /// 从共享连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn query_list(
        &self,
        where_and_order: &str,
        params: impl rusqlite::Params,
    ) -> RepositoryResult<Vec<BatchPortion>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM batch {}",
            BATCH_COLUMNS, where_and_order
        ))?;

        let portions = stmt
            .query_map(params, map_batch_row)?
            .collect::<SqliteResult<Vec<BatchPortion>>>()?;

        Ok(portions)
    }

    /// 按ID查询批次分量
    pub fn find_by_id(&self, batch_id: i64) -> RepositoryResult<Option<BatchPortion>> {
        let conn = self.get_conn()?;
        Ok(Self::find_by_id_in(&conn, batch_id)?)
    }

    /// 查询全部批次分量（有效期升序，无有效期排最后）
    pub fn list_all(&self) -> RepositoryResult<Vec<BatchPortion>> {
        self.query_list("ORDER BY exp_date IS NULL, exp_date, batch_id", [])
    }

    /// 查询某库位上的批次分量
    pub fn list_by_slot(&self, slot_id: i64) -> RepositoryResult<Vec<BatchPortion>> {
        self.query_list(
            "WHERE slot_id = ?1 ORDER BY batch_id",
            params![slot_id],
        )
    }

    /// 查询某药品的批次分量
    pub fn list_by_medicine(&self, medicine_id: i64) -> RepositoryResult<Vec<BatchPortion>> {
        self.query_list(
            "WHERE medicine_id = ?1 ORDER BY exp_date IS NULL, exp_date, batch_id",
            params![medicine_id],
        )
    }

    /// 查询有效期 <= cutoff 的批次分量（临期巡检）
    ///
    /// 条件: exp_date 非空、quantity > 0
    /// 排序: exp_date 升序, batch_id 升序
    pub fn find_expiring_until(&self, cutoff: NaiveDate) -> RepositoryResult<Vec<BatchPortion>> {
        self.query_list(
            r#"
            WHERE exp_date IS NOT NULL AND exp_date <= ?1 AND quantity > 0
            ORDER BY exp_date, batch_id
            "#,
            params![cutoff],
        )
    }

    /// 查询有效期落在 [from, to] 区间的批次分量
    pub fn find_expiring_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<BatchPortion>> {
        if from > to {
            return Ok(Vec::new());
        }
        self.query_list(
            r#"
            WHERE exp_date IS NOT NULL AND exp_date BETWEEN ?1 AND ?2 AND quantity > 0
            ORDER BY exp_date, batch_id
            "#,
            params![from, to],
        )
    }

    // ==========================================
    // 事务内操作（分配器专用）
    // ==========================================

    fn find_by_id_in(conn: &Connection, batch_id: i64) -> SqliteResult<Option<BatchPortion>> {
        conn.query_row(
            &format!("SELECT {} FROM batch WHERE batch_id = ?1", BATCH_COLUMNS),
            params![batch_id],
            map_batch_row,
        )
        .optional()
    }

    /// 事务内按ID查询批次分量
    pub fn find_by_id_tx(tx: &Transaction, batch_id: i64) -> RepositoryResult<Option<BatchPortion>> {
        Ok(Self::find_by_id_in(tx, batch_id)?)
    }

    /// 事务内写入批次分量
    ///
    /// # 返回
    /// - Ok(BatchPortion): 带新ID的分量记录
    pub fn insert_tx(tx: &Transaction, portion: &NewBatchPortion) -> RepositoryResult<BatchPortion> {
        tx.execute(
            r#"
            INSERT INTO batch (medicine_id, composition, quantity, mfg_date, exp_date, slot_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                portion.medicine_id,
                portion.composition,
                portion.quantity,
                portion.mfg_date,
                portion.exp_date,
                portion.slot_id,
            ],
        )?;

        Ok(BatchPortion {
            batch_id: tx.last_insert_rowid(),
            medicine_id: portion.medicine_id,
            composition: portion.composition.clone(),
            quantity: portion.quantity,
            mfg_date: portion.mfg_date,
            exp_date: portion.exp_date,
            slot_id: portion.slot_id,
        })
    }

    /// 事务内更新分量所在库位
    pub fn update_slot_tx(tx: &Transaction, batch_id: i64, slot_id: i64) -> RepositoryResult<()> {
        let affected = tx.execute(
            "UPDATE batch SET slot_id = ?1 WHERE batch_id = ?2",
            params![slot_id, batch_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::not_found("Batch", batch_id));
        }
        Ok(())
    }

    /// 事务内删除分量
    pub fn delete_tx(tx: &Transaction, batch_id: i64) -> RepositoryResult<()> {
        let affected = tx.execute("DELETE FROM batch WHERE batch_id = ?1", params![batch_id])?;

        if affected == 0 {
            return Err(RepositoryError::not_found("Batch", batch_id));
        }
        Ok(())
    }
}
