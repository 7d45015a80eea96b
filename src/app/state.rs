// ==========================================
// 药品库位管理系统 - 应用状态
// ==========================================
// 职责: 打开数据库、建表，装配仓储/引擎/API/巡检
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::InventoryApi;
use crate::config::config_manager::ConfigManager;
use crate::config::{MonitorConfigReader, MonitorSettings};
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{AlertService, ExpiryChecker, ExpiryMonitor, SlotAllocator};
use crate::exporter::BatchReportExporter;
use crate::repository::{AlertRepository, BatchRepository, MedicineRepository, SlotRepository};

/// 应用状态
///
/// 包含所有API实例和共享资源（单个共享连接）
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时加载的巡检配置
    pub monitor_settings: MonitorSettings,

    /// 库存管理API
    pub inventory_api: Arc<InventoryApi>,

    /// 临期巡检
    pub expiry_monitor: Arc<ExpiryMonitor>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例（巡检未启动）
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let medicine_repo = Arc::new(MedicineRepository::new(conn.clone()));
        let slot_repo = Arc::new(SlotRepository::new(conn.clone()));
        let batch_repo = Arc::new(BatchRepository::new(conn.clone()));
        let alert_repo = Arc::new(AlertRepository::new(conn.clone()));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let monitor_settings = config_manager
            .load_monitor_settings()
            .map_err(|e| format!("巡检配置加载失败: {}", e))?;
        tracing::info!(
            warning_days = monitor_settings.warning_days,
            schedule = %monitor_settings.schedule,
            summary_schedule = %monitor_settings.summary_schedule,
            summary_days = monitor_settings.summary_days,
            alert_log = %monitor_settings.alert_log_path.display(),
            "巡检配置已加载"
        );

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let allocator = Arc::new(SlotAllocator::new(conn.clone()));
        let alert_service = Arc::new(AlertService::new(
            alert_repo.clone(),
            monitor_settings.alert_log_path.clone(),
        ));
        let checker = Arc::new(ExpiryChecker::new(
            batch_repo.clone(),
            slot_repo.clone(),
            medicine_repo.clone(),
            alert_service,
        ));
        let config_reader: Arc<dyn MonitorConfigReader> = config_manager.clone();
        let expiry_monitor = Arc::new(ExpiryMonitor::new(
            checker,
            config_reader,
            monitor_settings.schedule,
            monitor_settings.stop_grace,
        )
        .with_summary_schedule(monitor_settings.summary_schedule));

        // ==========================================
        // 初始化API层
        // ==========================================
        let exporter = Arc::new(BatchReportExporter::new(
            medicine_repo.clone(),
            slot_repo.clone(),
        ));
        let inventory_api = Arc::new(InventoryApi::new(
            medicine_repo,
            slot_repo,
            batch_repo,
            alert_repo,
            allocator,
            exporter,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            monitor_settings,
            inventory_api,
            expiry_monitor,
            config_manager,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 MED_TRACKER_DB_PATH（非空时）
/// - 用户数据目录/med-tracker/med_tracker.db
/// - 取不到数据目录时: ./med_tracker.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("MED_TRACKER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./med_tracker.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("med-tracker");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("med_tracker.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_wires_up_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.get_db_path(), db_path);
        assert_eq!(state.monitor_settings.warning_days, 30);
        assert_eq!(
            state.expiry_monitor.summary_schedule().to_string(),
            "weekly@Mon 10:00"
        );
        assert!(state.inventory_api.list_slots().unwrap().is_empty());
    }
}
