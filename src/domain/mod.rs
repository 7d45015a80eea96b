// ==========================================
// 药品库位管理系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、容量约束接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod alert;
pub mod batch;
pub mod medicine;
pub mod slot;

// 重导出核心类型
pub use alert::{Alert, NewAlert};
pub use batch::{BatchPortion, NewBatchPortion, Placement, PlacementRequest};
pub use medicine::{Medicine, NewMedicine};
pub use slot::{NewSlot, Slot, SlotCapacity};
