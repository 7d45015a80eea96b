// ==========================================
// 药品库位管理系统 - 引擎层
// ==========================================
// 职责: 库位分配、临期巡检、预警输出
// 红线: Engine 不拼 SQL，数据访问只经 Repository
// ==========================================

pub mod alert_sink;
pub mod error;
pub mod expiry_monitor;
pub mod slot_allocator;

// 重导出核心引擎
pub use alert_sink::{AlertOutcome, AlertService, AlertSink};
pub use error::{AllocationError, AllocationResult};
pub use expiry_monitor::{
    format_alert, CheckReport, ExpiryChecker, ExpiryMonitor, ExpirySummary, LookupFailure, MonitorState,
};
pub use slot_allocator::SlotAllocator;
