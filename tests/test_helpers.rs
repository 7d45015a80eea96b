// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、组件装配、测试数据生成等功能
// ==========================================

#![allow(dead_code)]

use chrono::NaiveDate;
use med_tracker::db::{ensure_schema, open_sqlite_connection};
use med_tracker::domain::{NewMedicine, NewSlot, PlacementRequest};
use med_tracker::engine::SlotAllocator;
use med_tracker::repository::{
    AlertRepository, BatchRepository, MedicineRepository, SlotRepository,
};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    ensure_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(open_sqlite_connection(db_path).unwrap()))
}

/// 测试装配: 共享一个连接的仓储 + 分配器
pub struct TestStack {
    pub conn: Arc<Mutex<Connection>>,
    pub medicine_repo: Arc<MedicineRepository>,
    pub slot_repo: Arc<SlotRepository>,
    pub batch_repo: Arc<BatchRepository>,
    pub alert_repo: Arc<AlertRepository>,
    pub allocator: Arc<SlotAllocator>,
}

impl TestStack {
    pub fn open(db_path: &str) -> Self {
        let conn = open_shared(db_path);
        Self {
            medicine_repo: Arc::new(MedicineRepository::new(conn.clone())),
            slot_repo: Arc::new(SlotRepository::new(conn.clone())),
            batch_repo: Arc::new(BatchRepository::new(conn.clone())),
            alert_repo: Arc::new(AlertRepository::new(conn.clone())),
            allocator: Arc::new(SlotAllocator::new(conn.clone())),
            conn,
        }
    }

    /// 新增药品
    pub fn seed_medicine(&self, name: &str) -> i64 {
        self.medicine_repo
            .insert(&NewMedicine {
                name: name.to_string(),
                manufacturer: Some("Acme Pharma".to_string()),
                supplier: None,
            })
            .unwrap()
    }

    /// 新增空库位
    pub fn seed_slot(&self, zone: &str, shelf: &str, capacity: i64) -> i64 {
        self.slot_repo
            .create(&NewSlot::new(zone, shelf, capacity))
            .unwrap()
    }

    /// 库位占用之和
    pub fn total_occupancy(&self) -> i64 {
        self.slot_repo
            .list_all()
            .unwrap()
            .iter()
            .map(|s| s.current_quantity)
            .sum()
    }

    /// 批次分量数量之和
    pub fn total_portion_quantity(&self) -> i64 {
        self.batch_repo
            .list_all()
            .unwrap()
            .iter()
            .map(|p| p.quantity)
            .sum()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn request(medicine_id: i64, composition: &str, quantity: i64) -> PlacementRequest {
    PlacementRequest::new(
        medicine_id,
        composition,
        quantity,
        Some(date(2023, 6, 1)),
        Some(date(2025, 6, 1)),
    )
}
