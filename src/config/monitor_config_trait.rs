// ==========================================
// 药品库位管理系统 - 巡检配置读取 Trait
// ==========================================
// 职责: 定义临期巡检所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::config_manager::ConfigError;
use crate::config::monitor_schedule::MonitorSchedule;
use async_trait::async_trait;

// ==========================================
// MonitorConfigReader Trait
// ==========================================
// 用途: 巡检/周报任务每轮读取，运行中修改配置下一轮生效
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait MonitorConfigReader: Send + Sync {
    /// 获取临期预警天数
    ///
    /// # 返回
    /// - i64: 今天起多少天内到期视为临期（>= 0）
    ///
    /// # 默认值
    /// - 30
    async fn get_expiry_warning_days(&self) -> Result<i64, ConfigError>;

    /// 获取巡检调度（每轮结束后据此计算下一轮触发时刻）
    ///
    /// # 默认值
    /// - interval:60
    async fn get_expiry_schedule(&self) -> Result<MonitorSchedule, ConfigError>;

    /// 获取临期周报调度
    ///
    /// # 默认值
    /// - weekly@MON 10:00
    async fn get_summary_schedule(&self) -> Result<MonitorSchedule, ConfigError>;

    /// 获取临期周报统计窗口（今天起的天数）
    ///
    /// # 默认值
    /// - 7
    async fn get_summary_days(&self) -> Result<i64, ConfigError>;
}
