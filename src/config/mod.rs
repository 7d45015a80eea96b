// ==========================================
// 药品库位管理系统 - 配置层
// ==========================================
// 职责: 系统配置管理,支持环境变量覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod monitor_config_trait;
pub mod monitor_schedule;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigError, ConfigManager, MonitorSettings};
pub use monitor_config_trait::MonitorConfigReader;
pub use monitor_schedule::{MonitorSchedule, ScheduleParseError};
