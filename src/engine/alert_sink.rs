// ==========================================
// 药品库位管理系统 - 预警输出
// ==========================================
// 输出: alerts 表一行 + 预警日志文件追加一行
// 两路写入互相独立，尽力而为；任何失败只记日志，不向调用方传播
// ==========================================

use crate::domain::alert::NewAlert;
use crate::repository::AlertRepository;
use chrono::{Local, NaiveDateTime};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// 单次预警的落地结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertOutcome {
    /// 已写入 alerts 表
    pub persisted: bool,
    /// 已追加到日志文件
    pub logged: bool,
}

// ==========================================
// Trait: AlertSink
// ==========================================
// 用途: 临期巡检的预警出口（测试可替换为内存实现）
pub trait AlertSink: Send + Sync {
    /// 发出一条预警
    ///
    /// # 参数
    /// - batch_id: 关联的批次分量（可为空）
    /// - message: 预警正文
    fn raise(&self, batch_id: Option<i64>, message: &str) -> AlertOutcome;
}

// ==========================================
// AlertService - 数据库 + 文件双写
// ==========================================
pub struct AlertService {
    alert_repo: Arc<AlertRepository>,
    log_path: PathBuf,
}

impl AlertService {
    /// 创建预警服务
    ///
    /// 日志目录不存在时尝试创建；创建失败不影响数据库写入
    pub fn new(alert_repo: Arc<AlertRepository>, log_path: impl Into<PathBuf>) -> Self {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!(path = %parent.display(), error = %e, "预警日志目录创建失败");
            }
        }
        Self {
            alert_repo,
            log_path,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn append_line(&self, now: NaiveDateTime, message: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "[{}] {}", now.format("%Y-%m-%d %H:%M:%S"), message)
    }
}

impl AlertSink for AlertService {
    fn raise(&self, batch_id: Option<i64>, message: &str) -> AlertOutcome {
        let now = Local::now().naive_local();

        let persisted = match self.alert_repo.insert(&NewAlert {
            batch_id,
            message: message.to_string(),
            created_at: now,
        }) {
            Ok(alert_id) => {
                debug!(alert_id = alert_id, batch_id = ?batch_id, "预警已入库");
                true
            }
            Err(e) => {
                error!(batch_id = ?batch_id, error = %e, "预警入库失败");
                false
            }
        };

        let logged = match self.append_line(now, message) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    batch_id = ?batch_id,
                    path = %self.log_path.display(),
                    error = %e,
                    "预警日志写入失败"
                );
                false
            }
        };

        AlertOutcome { persisted, logged }
    }
}
