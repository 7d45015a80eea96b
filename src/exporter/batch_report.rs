// ==========================================
// 药品库位管理系统 - 批次分量 CSV 报表
// ==========================================
// 列: batch_id,medicine_name,composition,qty,mfg_date,exp_date,slot_zone,slot_shelf,slot_id
// 转义: 含分隔符/引号/换行的值加引号，内部引号加倍（QuoteStyle::Necessary）
// 缺失值: 空字段（药品/库位解析失败同样输出空字段）
// ==========================================

use crate::domain::batch::BatchPortion;
use crate::domain::slot::Slot;
use crate::exporter::error::ExportResult;
use crate::repository::{MedicineRepository, SlotRepository};
use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 报表表头
pub const REPORT_HEADER: [&str; 9] = [
    "batch_id",
    "medicine_name",
    "composition",
    "qty",
    "mfg_date",
    "exp_date",
    "slot_zone",
    "slot_shelf",
    "slot_id",
];

/// 报表行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub batch_id: i64,
    pub medicine_name: String,
    pub composition: String,
    #[serde(rename = "qty")]
    pub quantity: i64,
    pub mfg_date: Option<String>,
    pub exp_date: Option<String>,
    pub slot_zone: Option<String>,
    pub slot_shelf: Option<String>,
    pub slot_id: Option<i64>,
}

// ==========================================
// BatchReportExporter - 批次报表导出
// ==========================================
pub struct BatchReportExporter {
    medicine_repo: Arc<MedicineRepository>,
    slot_repo: Arc<SlotRepository>,
}

impl BatchReportExporter {
    pub fn new(medicine_repo: Arc<MedicineRepository>, slot_repo: Arc<SlotRepository>) -> Self {
        Self {
            medicine_repo,
            slot_repo,
        }
    }

    /// 组装报表行（药品名称 / 库位位置尽力解析）
    pub fn build_rows(&self, portions: &[BatchPortion]) -> Vec<ReportRow> {
        let mut medicine_names: HashMap<i64, String> = HashMap::new();
        let mut slots: HashMap<i64, Option<Slot>> = HashMap::new();

        portions
            .iter()
            .map(|portion| {
                let medicine_name = medicine_names
                    .entry(portion.medicine_id)
                    .or_insert_with(|| self.medicine_name(portion.medicine_id))
                    .clone();

                let slot = portion.slot_id.and_then(|slot_id| {
                    slots
                        .entry(slot_id)
                        .or_insert_with(|| self.slot(slot_id))
                        .clone()
                });

                ReportRow {
                    batch_id: portion.batch_id,
                    medicine_name,
                    composition: portion.composition.clone(),
                    quantity: portion.quantity,
                    mfg_date: portion.mfg_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    exp_date: portion.exp_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    slot_zone: slot.as_ref().map(|s| s.zone.clone()),
                    slot_shelf: slot.as_ref().map(|s| s.shelf_number.clone()),
                    slot_id: portion.slot_id,
                }
            })
            .collect()
    }

    fn medicine_name(&self, medicine_id: i64) -> String {
        match self.medicine_repo.find_by_id(medicine_id) {
            Ok(Some(medicine)) => medicine.name,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(medicine_id = medicine_id, error = %e, "报表药品名称解析失败");
                String::new()
            }
        }
    }

    fn slot(&self, slot_id: i64) -> Option<Slot> {
        match self.slot_repo.find_by_id(slot_id) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(slot_id = slot_id, error = %e, "报表库位解析失败");
                None
            }
        }
    }

    /// 写出 CSV（始终包含表头）
    ///
    /// # 返回
    /// - Ok(usize): 写出的数据行数
    pub fn write_csv<W: Write>(&self, portions: &[BatchPortion], writer: W) -> ExportResult<usize> {
        let rows = self.build_rows(portions);

        let mut csv_writer = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Necessary)
            .from_writer(writer);

        csv_writer.write_record(REPORT_HEADER)?;
        for row in &rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;

        Ok(rows.len())
    }

    /// 导出到文件（父目录不存在时创建）
    pub fn export_to_file(&self, portions: &[BatchPortion], path: &Path) -> ExportResult<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let count = self.write_csv(portions, BufWriter::new(file))?;

        info!(path = %path.display(), rows = count, "批次报表已导出");
        Ok(count)
    }
}
