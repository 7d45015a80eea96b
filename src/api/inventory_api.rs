// ==========================================
// 药品库位管理系统 - 库存管理 API
// ==========================================
// 职责: 药品目录、库位、批次入库/出库/移库、临期查询、报表导出、预警查询
// 红线: 库位占用与批次归属只经 SlotAllocator 修改
// ==========================================

use std::path::Path;
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::alert::Alert;
use crate::domain::batch::{BatchPortion, Placement, PlacementRequest};
use crate::domain::medicine::{Medicine, NewMedicine};
use crate::domain::slot::{NewSlot, Slot};
use crate::engine::SlotAllocator;
use crate::exporter::BatchReportExporter;
use crate::repository::{AlertRepository, BatchRepository, MedicineRepository, SlotRepository};

// ==========================================
// InventoryApi - 库存管理 API
// ==========================================

/// 库存管理API
///
/// 职责：
/// 1. 药品目录维护（新增、查询）
/// 2. 库位维护（新增、查询）
/// 3. 批次入库、出库、移库（委托 SlotAllocator）
/// 4. 临期批次查询与 CSV 导出
/// 5. 预警记录查询
pub struct InventoryApi {
    medicine_repo: Arc<MedicineRepository>,
    slot_repo: Arc<SlotRepository>,
    batch_repo: Arc<BatchRepository>,
    alert_repo: Arc<AlertRepository>,
    allocator: Arc<SlotAllocator>,
    exporter: Arc<BatchReportExporter>,
}

impl InventoryApi {
    /// 创建新的InventoryApi实例
    pub fn new(
        medicine_repo: Arc<MedicineRepository>,
        slot_repo: Arc<SlotRepository>,
        batch_repo: Arc<BatchRepository>,
        alert_repo: Arc<AlertRepository>,
        allocator: Arc<SlotAllocator>,
        exporter: Arc<BatchReportExporter>,
    ) -> Self {
        Self {
            medicine_repo,
            slot_repo,
            batch_repo,
            alert_repo,
            allocator,
            exporter,
        }
    }

    // ==========================================
    // 药品目录
    // ==========================================

    /// 新增药品
    ///
    /// # 返回
    /// - Ok(i64): 新药品ID
    /// - Err(BusinessRuleViolation): 名称已存在
    pub fn create_medicine(&self, medicine: &NewMedicine) -> ApiResult<i64> {
        let name = medicine.name.trim();
        if name.is_empty() {
            return Err(ApiError::InvalidInput("药品名称不能为空".to_string()));
        }
        if self.medicine_repo.exists_by_name(name)? {
            return Err(ApiError::BusinessRuleViolation(format!(
                "药品名称已存在: {}",
                name
            )));
        }

        let medicine_id = self.medicine_repo.insert(medicine)?;
        info!(medicine_id = medicine_id, name = name, "新增药品");
        Ok(medicine_id)
    }

    /// 药品名称模糊查询（不区分大小写）
    pub fn search_medicines(&self, fragment: &str) -> ApiResult<Vec<Medicine>> {
        Ok(self.medicine_repo.find_by_name(fragment)?)
    }

    // ==========================================
    // 库位
    // ==========================================

    /// 新增库位（空库位）
    pub fn create_slot(&self, slot: &NewSlot) -> ApiResult<i64> {
        let slot_id = self.slot_repo.create(slot)?;
        info!(
            slot_id = slot_id,
            zone = %slot.zone.trim(),
            shelf = %slot.shelf_number.trim(),
            capacity = slot.capacity,
            "新增库位"
        );
        Ok(slot_id)
    }

    /// 查询全部库位（zone, shelf_number 排序）
    pub fn list_slots(&self) -> ApiResult<Vec<Slot>> {
        Ok(self.slot_repo.list_all()?)
    }

    // ==========================================
    // 批次
    // ==========================================

    /// 查询全部批次分量（有效期升序，无有效期排最后）
    pub fn list_batches(&self) -> ApiResult<Vec<BatchPortion>> {
        Ok(self.batch_repo.list_all()?)
    }

    /// 批次入库
    ///
    /// # 返回
    /// - Ok(Placement): 放置结果（可能拆分到多个库位）
    /// - Err(NotFound): 药品不存在
    /// - Err(CapacityExhausted): 库位容量不足，未做任何变更
    pub fn add_batch(&self, request: &PlacementRequest) -> ApiResult<Placement> {
        if self.medicine_repo.find_by_id(request.medicine_id)?.is_none() {
            return Err(ApiError::NotFound(format!(
                "药品(id={})不存在",
                request.medicine_id
            )));
        }
        if let (Some(mfg), Some(exp)) = (request.mfg_date, request.exp_date) {
            if exp < mfg {
                return Err(ApiError::InvalidInput(format!(
                    "有效期 {} 早于生产日期 {}",
                    exp, mfg
                )));
            }
        }

        Ok(self.allocator.place(request)?)
    }

    /// 批次分量出库
    pub fn remove_batch(&self, batch_id: i64) -> ApiResult<BatchPortion> {
        Ok(self.allocator.remove(batch_id)?)
    }

    /// 批次分量移库（整体移动，不拆分）
    pub fn move_batch(&self, batch_id: i64, target_slot_id: i64) -> ApiResult<BatchPortion> {
        Ok(self.allocator.move_portion(batch_id, target_slot_id)?)
    }

    // ==========================================
    // 临期查询
    // ==========================================

    /// 今天起 days 天内到期（含已过期）的批次分量
    pub fn list_expiring(&self, days: i64) -> ApiResult<Vec<ExpiringBatchInfo>> {
        self.list_expiring_at(Local::now().date_naive(), days)
    }

    /// 以指定日期为基准的临期查询
    pub fn list_expiring_at(&self, today: NaiveDate, days: i64) -> ApiResult<Vec<ExpiringBatchInfo>> {
        let cutoff = expiry_cutoff(today, days)?;
        let portions = self.batch_repo.find_expiring_until(cutoff)?;
        Ok(portions
            .into_iter()
            .map(|p| ExpiringBatchInfo::from_portion(p, today))
            .collect())
    }

    /// 有效期落在 [from, to] 的批次分量
    pub fn list_expiring_between(&self, from: NaiveDate, to: NaiveDate) -> ApiResult<Vec<BatchPortion>> {
        if from > to {
            return Err(ApiError::InvalidInput(format!(
                "起始日期 {} 晚于结束日期 {}",
                from, to
            )));
        }
        Ok(self.batch_repo.find_expiring_between(from, to)?)
    }

    // ==========================================
    // 报表导出
    // ==========================================

    /// 导出全部批次分量
    ///
    /// # 返回
    /// - Ok(usize): 导出行数
    pub fn export_batches_csv(&self, path: &Path) -> ApiResult<usize> {
        let portions = self.batch_repo.list_all()?;
        Ok(self.exporter.export_to_file(&portions, path)?)
    }

    /// 导出 days 天内到期的批次分量
    pub fn export_expiring_csv(&self, days: i64, path: &Path) -> ApiResult<usize> {
        let cutoff = expiry_cutoff(Local::now().date_naive(), days)?;
        let portions = self.batch_repo.find_expiring_until(cutoff)?;
        Ok(self.exporter.export_to_file(&portions, path)?)
    }

    // ==========================================
    // 预警
    // ==========================================

    /// 最近的预警记录
    pub fn list_recent_alerts(&self, limit: usize) -> ApiResult<Vec<Alert>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        Ok(self.alert_repo.list_recent(limit)?)
    }
}

fn expiry_cutoff(today: NaiveDate, days: i64) -> ApiResult<NaiveDate> {
    if days < 0 {
        return Err(ApiError::InvalidInput(format!("临期天数不能为负: {}", days)));
    }
    today
        .checked_add_days(Days::new(days as u64))
        .ok_or_else(|| ApiError::InvalidInput(format!("临期天数超出范围: {}", days)))
}

// ==========================================
// DTO 类型定义
// ==========================================

/// 临期批次信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiringBatchInfo {
    pub batch_id: i64,
    pub medicine_id: i64,
    pub composition: String,
    pub quantity: i64,
    pub exp_date: Option<NaiveDate>,
    pub slot_id: Option<i64>,
    /// 剩余天数（已过期为负）
    pub days_left: Option<i64>,
}

impl ExpiringBatchInfo {
    fn from_portion(portion: BatchPortion, today: NaiveDate) -> Self {
        let days_left = portion.days_until_expiry(today);
        Self {
            batch_id: portion.batch_id,
            medicine_id: portion.medicine_id,
            composition: portion.composition,
            quantity: portion.quantity,
            exp_date: portion.exp_date,
            slot_id: portion.slot_id,
            days_left,
        }
    }
}
