// ==========================================
// 药品库位管理系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供命令行工具与后台服务调用
// ==========================================

pub mod error;
pub mod inventory_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use inventory_api::{ExpiringBatchInfo, InventoryApi};
