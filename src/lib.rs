// ==========================================
// 药品库位管理系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 药品批次库位分配 + 临期预警
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 库位分配 / 临期巡检
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 报表导出
pub mod exporter;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    Alert, BatchPortion, Medicine, NewMedicine, NewSlot, Placement, PlacementRequest, Slot,
    SlotCapacity,
};

// 引擎
pub use engine::{
    AlertService, AlertSink, AllocationError, ExpiryChecker, ExpiryMonitor, MonitorState,
    SlotAllocator,
};

// API
pub use api::{ApiError, ApiResult, InventoryApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "药品库位管理系统";
