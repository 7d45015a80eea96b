// ==========================================
// 药品库位管理系统 - 库位数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: *_tx 方法只在调用方事务内执行，由 SlotAllocator 独占使用
// ==========================================

use crate::domain::slot::{NewSlot, Slot};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};

const SLOT_COLUMNS: &str =
    "slot_id, zone, shelf_number, composition_tag, capacity, current_quantity";

fn map_slot_row(row: &Row) -> SqliteResult<Slot> {
    Ok(Slot {
        slot_id: row.get(0)?,
        zone: row.get(1)?,
        shelf_number: row.get(2)?,
        composition_tag: row.get(3)?,
        capacity: row.get(4)?,
        current_quantity: row.get(5)?,
    })
}

// ==========================================
// SlotRepository - 库位仓储
// ==========================================

/// 库位仓储
/// 职责: 管理 slot 表的读写
pub struct SlotRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SlotRepository {
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

    /// 新建库位（空库位）
    ///
    /// # 返回
    /// - Ok(i64): 新库位ID
    /// - Err(ValidationError): 区域/货架为空或容量为负
    pub fn create(&self, slot: &NewSlot) -> RepositoryResult<i64> {
        let zone = slot.zone.trim();
        let shelf = slot.shelf_number.trim();
        if zone.is_empty() || shelf.is_empty() {
            return Err(RepositoryError::ValidationError(
                "库位区域和货架编号不能为空".to_string(),
            ));
        }
        if slot.capacity < 0 {
            return Err(RepositoryError::FieldValueError {
                field: "capacity".to_string(),
                message: format!("容量不能为负数: {}", slot.capacity),
            });
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO slot (zone, shelf_number, composition_tag, capacity, current_quantity)
            VALUES (?1, ?2, NULL, ?3, 0)
            "#,
            params![zone, shelf, slot.capacity],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// 按ID查询库位
    pub fn find_by_id(&self, slot_id: i64) -> RepositoryResult<Option<Slot>> {
        let conn = self.get_conn()?;
        Ok(Self::find_by_id_in(&conn, slot_id)?)
    }

    /// 查询全部库位（按区域、货架排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<Slot>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM slot ORDER BY zone, shelf_number, slot_id",
            SLOT_COLUMNS
        ))?;

        let slots = stmt
            .query_map([], map_slot_row)?
            .collect::<SqliteResult<Vec<Slot>>>()?;

        Ok(slots)
    }

    /// 按区域查询库位
    pub fn list_by_zone(&self, zone: &str) -> RepositoryResult<Vec<Slot>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM slot WHERE zone = ?1 ORDER BY shelf_number, slot_id",
            SLOT_COLUMNS
        ))?;

        let slots = stmt
            .query_map(params![zone.trim()], map_slot_row)?
            .collect::<SqliteResult<Vec<Slot>>>()?;

        Ok(slots)
    }

    /// 删除库位（外部 CRUD；批次分量的 slot_id 置空）
    ///
    /// # 返回
    /// - Ok(true): 已删除
    /// - Ok(false): 库位不存在
    pub fn delete(&self, slot_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM slot WHERE slot_id = ?1", params![slot_id])?;
        Ok(affected > 0)
    }

    // ==========================================
    // 事务内操作（分配器专用）
    // ==========================================

    fn find_by_id_in(conn: &Connection, slot_id: i64) -> SqliteResult<Option<Slot>> {
        conn.query_row(
            &format!("SELECT {} FROM slot WHERE slot_id = ?1", SLOT_COLUMNS),
            params![slot_id],
            map_slot_row,
        )
        .optional()
    }

    /// 事务内按ID查询库位
    pub fn find_by_id_tx(tx: &Transaction, slot_id: i64) -> RepositoryResult<Option<Slot>> {
        Ok(Self::find_by_id_in(tx, slot_id)?)
    }

    /// 查找已标记该成分且剩余空间 >= needed 的首个库位
    ///
    /// 排序: zone, shelf_number, slot_id（保证分配决策可复现）
    pub fn find_with_composition_and_space_tx(
        tx: &Transaction,
        composition: &str,
        needed: i64,
    ) -> RepositoryResult<Option<Slot>> {
        let slot = tx
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM slot
                    WHERE composition_tag = ?1 AND (capacity - current_quantity) >= ?2
                    ORDER BY zone, shelf_number, slot_id
                    LIMIT 1
                    "#,
                    SLOT_COLUMNS
                ),
                params![composition, needed],
                map_slot_row,
            )
            .optional()?;

        Ok(slot)
    }

    /// 查找容量 >= needed 的首个空库位（无成分标签）
    pub fn find_empty_tx(tx: &Transaction, needed: i64) -> RepositoryResult<Option<Slot>> {
        let slot = tx
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM slot
                    WHERE composition_tag IS NULL AND capacity >= ?1
                    ORDER BY zone, shelf_number, slot_id
                    LIMIT 1
                    "#,
                    SLOT_COLUMNS
                ),
                params![needed],
                map_slot_row,
            )
            .optional()?;

        Ok(slot)
    }

    /// 向库位追加数量并打上成分标签
    ///
    /// 超容量由 slot 表 CHECK 约束拦截（CheckConstraintViolation）
    pub fn assign_quantity_tx(
        tx: &Transaction,
        slot_id: i64,
        composition: &str,
        quantity: i64,
    ) -> RepositoryResult<()> {
        let affected = tx.execute(
            r#"
            UPDATE slot
            SET composition_tag = ?1, current_quantity = current_quantity + ?2
            WHERE slot_id = ?3
            "#,
            params![composition, quantity, slot_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::not_found("Slot", slot_id));
        }
        Ok(())
    }

    /// 从库位扣减数量
    ///
    /// 扣减后 <= 0 时回收库位: 占用钳制为 0，成分标签清空
    pub fn release_quantity_tx(
        tx: &Transaction,
        slot_id: i64,
        quantity: i64,
    ) -> RepositoryResult<()> {
        // UPDATE 右侧表达式读取的是更新前的值
        let affected = tx.execute(
            r#"
            UPDATE slot
            SET current_quantity = MAX(current_quantity - ?1, 0),
                composition_tag = CASE
                    WHEN current_quantity - ?1 <= 0 THEN NULL
                    ELSE composition_tag
                END
            WHERE slot_id = ?2
            "#,
            params![quantity, slot_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::not_found("Slot", slot_id));
        }
        Ok(())
    }
}
