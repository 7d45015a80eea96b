// ==========================================
// 药品库位管理系统 - 库位领域模型
// ==========================================
// 不变量: current_quantity == 0 ⇔ composition_tag 为空
// 写入约束: current_quantity / composition_tag 仅由 SlotAllocator 修改
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Slot - 库位
// ==========================================
// 用途: 固定容量的物理存放位置（区域 + 货架）
// 对齐: slot 表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: i64,                    // 库位ID
    pub zone: String,                    // 区域
    pub shelf_number: String,            // 货架编号
    pub composition_tag: Option<String>, // 当前存放成分 (None = 空库位)
    pub capacity: i64,                   // 容量
    pub current_quantity: i64,           // 当前占用
}

// ==========================================
// NewSlot - 新建库位参数
// ==========================================
// 说明: 新库位一律以空库位创建（占用 0，无成分标签）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSlot {
    pub zone: String,
    pub shelf_number: String,
    pub capacity: i64,
}

impl NewSlot {
    pub fn new(zone: impl Into<String>, shelf_number: impl Into<String>, capacity: i64) -> Self {
        Self {
            zone: zone.into(),
            shelf_number: shelf_number.into(),
            capacity,
        }
    }
}

// ==========================================
// Trait: SlotCapacity
// ==========================================
// 用途: 分配器容量检查接口
pub trait SlotCapacity {
    /// 剩余可用空间
    fn free_space(&self) -> i64;

    /// 是否可整体容纳指定数量
    fn can_accept(&self, quantity: i64) -> bool;

    /// 是否为空库位（无成分标签）
    fn is_vacant(&self) -> bool;
}

impl SlotCapacity for Slot {
    /// 剩余可用空间（不会小于 0）
    fn free_space(&self) -> i64 {
        (self.capacity - self.current_quantity).max(0)
    }

    fn can_accept(&self, quantity: i64) -> bool {
        quantity > 0 && self.free_space() >= quantity
    }

    fn is_vacant(&self) -> bool {
        self.composition_tag.is_none()
    }
}

impl Slot {
    /// 库位描述（预警消息 / 日志使用）
    pub fn describe(&self) -> String {
        format!(
            "Zone={} Shelf={} (slot_id={}, current_qty={})",
            self.zone, self.shelf_number, self.slot_id, self.current_quantity
        )
    }
}
