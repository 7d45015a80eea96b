// ==========================================
// 药品库位管理系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value)
// 覆写: 环境变量 MED_TRACKER_<KEY 大写> 优先于表内值
// ==========================================

use crate::config::monitor_config_trait::MonitorConfigReader;
use crate::config::monitor_schedule::MonitorSchedule;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 配置层错误（跨 await 传递，需 Send + Sync）
pub type ConfigError = Box<dyn Error + Send + Sync>;

/// 环境变量覆写前缀
pub const ENV_PREFIX: &str = "MED_TRACKER_";

// ===== 默认值 =====
pub const DEFAULT_EXPIRY_WARNING_DAYS: i64 = 30;
pub const DEFAULT_EXPIRY_SCHEDULE: &str = "interval:60";
pub const DEFAULT_MONITOR_STOP_GRACE_SECS: u64 = 5;
pub const DEFAULT_ALERT_LOG_PATH: &str = "resources/logs/expiry_alerts.txt";
pub const DEFAULT_EXPIRY_SUMMARY_SCHEDULE: &str = "weekly@MON 10:00";
pub const DEFAULT_EXPIRY_SUMMARY_DAYS: i64 = 7;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 环境变量覆写值（空值视为未设置）
    fn env_override(key: &str) -> Option<String> {
        let name = format!("{}{}", ENV_PREFIX, key.to_uppercase());
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// 从 config_kv 表读取配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_stored_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取配置值（环境变量 > config_kv）
    pub fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        if let Some(value) = Self::env_override(key) {
            return Ok(Some(value));
        }
        self.get_stored_value(key)
    }

    /// 读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 写入配置值（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            return Err("配置键不能为空".into());
        }

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 获取 config_kv 全部配置的快照（JSON格式，按键排序）
    ///
    /// 不含环境变量覆写
    pub fn get_config_snapshot(&self) -> Result<String, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare("SELECT key, value FROM config_kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    // ===== 临期巡检配置 =====

    /// 临期预警天数（负值或格式错误回退默认 30）
    pub fn expiry_warning_days(&self) -> Result<i64, ConfigError> {
        let default = DEFAULT_EXPIRY_WARNING_DAYS.to_string();
        let value = self.get_config_or_default(config_keys::EXPIRY_WARNING_DAYS, &default)?;
        match value.trim().parse::<i64>() {
            Ok(days) if days >= 0 => Ok(days),
            _ => {
                tracing::warn!(
                    config_key = config_keys::EXPIRY_WARNING_DAYS,
                    raw_value = %value,
                    "临期预警天数配置非法，使用默认值"
                );
                Ok(DEFAULT_EXPIRY_WARNING_DAYS)
            }
        }
    }

    /// 巡检调度（格式错误回退默认间隔）
    pub fn expiry_schedule(&self) -> Result<MonitorSchedule, ConfigError> {
        self.schedule_or(
            config_keys::EXPIRY_SCHEDULE,
            DEFAULT_EXPIRY_SCHEDULE,
            MonitorSchedule::default(),
        )
    }

    /// 临期周报调度（默认每周一 10:00）
    pub fn expiry_summary_schedule(&self) -> Result<MonitorSchedule, ConfigError> {
        self.schedule_or(
            config_keys::EXPIRY_SUMMARY_SCHEDULE,
            DEFAULT_EXPIRY_SUMMARY_SCHEDULE,
            MonitorSchedule::weekly_summary(),
        )
    }

    /// 临期周报统计窗口天数（非法值回退 7）
    pub fn expiry_summary_days(&self) -> Result<i64, ConfigError> {
        let default = DEFAULT_EXPIRY_SUMMARY_DAYS.to_string();
        let value = self.get_config_or_default(config_keys::EXPIRY_SUMMARY_DAYS, &default)?;
        match value.trim().parse::<i64>() {
            Ok(days) if days >= 0 => Ok(days),
            _ => {
                tracing::warn!(
                    config_key = config_keys::EXPIRY_SUMMARY_DAYS,
                    raw_value = %value,
                    "临期周报天数配置非法，使用默认值"
                );
                Ok(DEFAULT_EXPIRY_SUMMARY_DAYS)
            }
        }
    }

    fn schedule_or(
        &self,
        key: &str,
        default_raw: &str,
        fallback: MonitorSchedule,
    ) -> Result<MonitorSchedule, ConfigError> {
        let value = self.get_config_or_default(key, default_raw)?;
        match value.parse::<MonitorSchedule>() {
            Ok(schedule) => Ok(schedule),
            Err(e) => {
                tracing::warn!(config_key = key, error = %e, "调度配置非法，使用默认值");
                Ok(fallback)
            }
        }
    }

    /// 停止巡检时等待在途任务的宽限期
    pub fn monitor_stop_grace(&self) -> Result<Duration, ConfigError> {
        let default = DEFAULT_MONITOR_STOP_GRACE_SECS.to_string();
        let value = self.get_config_or_default(config_keys::MONITOR_STOP_GRACE_SECS, &default)?;
        let secs = value
            .trim()
            .parse::<u64>()
            .unwrap_or(DEFAULT_MONITOR_STOP_GRACE_SECS);
        Ok(Duration::from_secs(secs))
    }

    /// 预警日志文件路径
    pub fn alert_log_path(&self) -> Result<PathBuf, ConfigError> {
        let value = self.get_config_or_default(config_keys::ALERT_LOG_PATH, DEFAULT_ALERT_LOG_PATH)?;
        Ok(PathBuf::from(value.trim()))
    }

    /// 一次性加载巡检启动所需配置
    pub fn load_monitor_settings(&self) -> Result<MonitorSettings, ConfigError> {
        Ok(MonitorSettings {
            warning_days: self.expiry_warning_days()?,
            schedule: self.expiry_schedule()?,
            stop_grace: self.monitor_stop_grace()?,
            alert_log_path: self.alert_log_path()?,
            summary_schedule: self.expiry_summary_schedule()?,
            summary_days: self.expiry_summary_days()?,
        })
    }
}

// ==========================================
// MonitorConfigReader Trait 实现
// ==========================================
#[async_trait]
impl MonitorConfigReader for ConfigManager {
    async fn get_expiry_warning_days(&self) -> Result<i64, ConfigError> {
        self.expiry_warning_days()
    }

    async fn get_expiry_schedule(&self) -> Result<MonitorSchedule, ConfigError> {
        self.expiry_schedule()
    }

    async fn get_summary_schedule(&self) -> Result<MonitorSchedule, ConfigError> {
        self.expiry_summary_schedule()
    }

    async fn get_summary_days(&self) -> Result<i64, ConfigError> {
        self.expiry_summary_days()
    }
}

// ==========================================
// MonitorSettings - 巡检启动配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSettings {
    pub warning_days: i64,
    #[serde(serialize_with = "serialize_display")]
    pub schedule: MonitorSchedule,
    #[serde(serialize_with = "serialize_secs")]
    pub stop_grace: Duration,
    pub alert_log_path: PathBuf,
    #[serde(serialize_with = "serialize_display")]
    pub summary_schedule: MonitorSchedule,
    pub summary_days: i64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            warning_days: DEFAULT_EXPIRY_WARNING_DAYS,
            schedule: MonitorSchedule::default(),
            stop_grace: Duration::from_secs(DEFAULT_MONITOR_STOP_GRACE_SECS),
            alert_log_path: PathBuf::from(DEFAULT_ALERT_LOG_PATH),
            summary_schedule: MonitorSchedule::weekly_summary(),
            summary_days: DEFAULT_EXPIRY_SUMMARY_DAYS,
        }
    }
}

fn serialize_display<S: serde::Serializer>(
    value: &MonitorSchedule,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 临期巡检
    pub const EXPIRY_WARNING_DAYS: &str = "expiry_warning_days";
    pub const EXPIRY_SCHEDULE: &str = "expiry_schedule";
    pub const MONITOR_STOP_GRACE_SECS: &str = "monitor_stop_grace_secs";

    // 临期周报
    pub const EXPIRY_SUMMARY_SCHEDULE: &str = "expiry_summary_schedule";
    pub const EXPIRY_SUMMARY_DAYS: &str = "expiry_summary_days";

    // 预警输出
    pub const ALERT_LOG_PATH: &str = "alert_log_path";
}
