// ==========================================
// 药品库位管理系统 - 药品目录数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 目录是外部协作方，核心仅通过 find_by_id 做名称解析
// ==========================================

use crate::domain::medicine::{Medicine, NewMedicine};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

fn map_medicine_row(row: &Row) -> SqliteResult<Medicine> {
    Ok(Medicine {
        medicine_id: row.get(0)?,
        name: row.get(1)?,
        manufacturer: row.get(2)?,
        supplier: row.get(3)?,
    })
}

/// 药品目录仓储
pub struct MedicineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MedicineRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增药品
    ///
    /// # 返回
    /// - Ok(i64): 新药品ID
    /// - Err(UniqueConstraintViolation): 名称重复
    pub fn insert(&self, medicine: &NewMedicine) -> RepositoryResult<i64> {
        let name = medicine.name.trim();
        if name.is_empty() {
            return Err(RepositoryError::ValidationError("药品名称不能为空".to_string()));
        }

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO medicine (name, manufacturer, supplier) VALUES (?1, ?2, ?3)",
            params![name, medicine.manufacturer, medicine.supplier],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按ID查询
    pub fn find_by_id(&self, medicine_id: i64) -> RepositoryResult<Option<Medicine>> {
        let conn = self.get_conn()?;
        let medicine = conn
            .query_row(
                "SELECT medicine_id, name, manufacturer, supplier FROM medicine WHERE medicine_id = ?1",
                params![medicine_id],
                map_medicine_row,
            )
            .optional()?;
        Ok(medicine)
    }

    /// 名称模糊查询（不区分大小写）
    pub fn find_by_name(&self, name_like: &str) -> RepositoryResult<Vec<Medicine>> {
        let conn = self.get_conn()?;
        let pattern = format!("%{}%", name_like.trim().to_lowercase());
        let mut stmt = conn.prepare(
            r#"
            SELECT medicine_id, name, manufacturer, supplier
            FROM medicine
            WHERE LOWER(name) LIKE ?1
            ORDER BY name
            "#,
        )?;

        let medicines = stmt
            .query_map(params![pattern], map_medicine_row)?
            .collect::<SqliteResult<Vec<Medicine>>>()?;
        Ok(medicines)
    }

    /// 名称是否已存在（精确匹配，忽略首尾空白）
    pub fn exists_by_name(&self, name: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM medicine WHERE name = ?1",
            params![name.trim()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 查询全部药品
    pub fn list_all(&self) -> RepositoryResult<Vec<Medicine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT medicine_id, name, manufacturer, supplier FROM medicine ORDER BY name",
        )?;

        let medicines = stmt
            .query_map([], map_medicine_row)?
            .collect::<SqliteResult<Vec<Medicine>>>()?;
        Ok(medicines)
    }

    /// 更新药品
    ///
    /// # 返回
    /// - Ok(true): 已更新
    /// - Ok(false): 药品不存在
    pub fn update(&self, medicine: &Medicine) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE medicine SET name = ?1, manufacturer = ?2, supplier = ?3 WHERE medicine_id = ?4",
            params![
                medicine.name.trim(),
                medicine.manufacturer,
                medicine.supplier,
                medicine.medicine_id
            ],
        )?;
        Ok(affected > 0)
    }

    /// 删除药品
    pub fn delete(&self, medicine_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM medicine WHERE medicine_id = ?1",
            params![medicine_id],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_repo() -> MedicineRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        MedicineRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn new_medicine(name: &str) -> NewMedicine {
        NewMedicine {
            name: name.to_string(),
            manufacturer: Some("Acme Pharma".to_string()),
            supplier: None,
        }
    }

    #[test]
    fn test_insert_find_update_delete() {
        let repo = setup_repo();

        let id = repo.insert(&new_medicine("Paracetamol")).unwrap();
        let mut medicine = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(medicine.name, "Paracetamol");
        assert_eq!(medicine.manufacturer.as_deref(), Some("Acme Pharma"));

        medicine.supplier = Some("MedSupply".to_string());
        assert!(repo.update(&medicine).unwrap());
        assert_eq!(
            repo.find_by_id(id).unwrap().unwrap().supplier.as_deref(),
            Some("MedSupply")
        );

        assert!(repo.delete(id).unwrap());
        assert!(repo.find_by_id(id).unwrap().is_none());
        assert!(!repo.delete(id).unwrap());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let repo = setup_repo();
        repo.insert(&new_medicine("Ibuprofen")).unwrap();

        assert!(repo.exists_by_name(" Ibuprofen ").unwrap());
        assert!(matches!(
            repo.insert(&new_medicine("Ibuprofen")),
            Err(RepositoryError::UniqueConstraintViolation(_))
        ));
    }

    #[test]
    fn test_find_by_name_is_case_insensitive() {
        let repo = setup_repo();
        repo.insert(&new_medicine("Paracetamol")).unwrap();
        repo.insert(&new_medicine("Ibuprofen")).unwrap();

        let found = repo.find_by_name("PARACET").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Paracetamol");
        assert_eq!(repo.list_all().unwrap().len(), 2);
    }
}
