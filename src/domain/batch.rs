// ==========================================
// 药品库位管理系统 - 批次分量领域模型
// ==========================================
// 一次入库请求可能拆分为多个批次分量（每个库位一条）
// 每个分量可独立寻址、独立移除
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// BatchPortion - 批次分量
// ==========================================
// 对齐: batch 表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPortion {
    pub batch_id: i64,                // 分量ID
    pub medicine_id: i64,             // 药品ID（目录软引用）
    pub composition: String,          // 成分（已 trim）
    pub quantity: i64,                // 数量 (> 0)
    pub mfg_date: Option<NaiveDate>,  // 生产日期
    pub exp_date: Option<NaiveDate>,  // 有效期
    pub slot_id: Option<i64>,         // 所在库位 (None = 未分配)
}

impl BatchPortion {
    /// 距到期天数（无有效期返回 None，已过期为负数）
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.exp_date.map(|exp| (exp - today).num_days())
    }
}

// ==========================================
// NewBatchPortion - 待写入的批次分量
// ==========================================
#[derive(Debug, Clone)]
pub struct NewBatchPortion {
    pub medicine_id: i64,
    pub composition: String,
    pub quantity: i64,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
    pub slot_id: Option<i64>,
}

// ==========================================
// PlacementRequest - 入库请求
// ==========================================
// 用途: SlotAllocator::place 输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub medicine_id: i64,
    pub composition: String,
    pub quantity: i64,
    pub mfg_date: Option<NaiveDate>,
    pub exp_date: Option<NaiveDate>,
}

impl PlacementRequest {
    pub fn new(
        medicine_id: i64,
        composition: impl Into<String>,
        quantity: i64,
        mfg_date: Option<NaiveDate>,
        exp_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            medicine_id,
            composition: composition.into(),
            quantity,
            mfg_date,
            exp_date,
        }
    }

    /// 生成落在指定库位上的分量
    pub fn portion(&self, composition: &str, quantity: i64, slot_id: i64) -> NewBatchPortion {
        NewBatchPortion {
            medicine_id: self.medicine_id,
            composition: composition.to_string(),
            quantity,
            mfg_date: self.mfg_date,
            exp_date: self.exp_date,
            slot_id: Some(slot_id),
        }
    }
}

// ==========================================
// Placement - 入库结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub composition: String,
    pub portions: Vec<BatchPortion>, // 按分配顺序
}

impl Placement {
    /// 已放置总量
    pub fn total_quantity(&self) -> i64 {
        self.portions.iter().map(|p| p.quantity).sum()
    }

    /// 涉及的库位（按分配顺序）
    pub fn slot_ids(&self) -> Vec<i64> {
        self.portions.iter().filter_map(|p| p.slot_id).collect()
    }
}
