// ==========================================
// 药品库位管理系统 - 后台服务主入口
// ==========================================
// 启动临期巡检，Ctrl-C 后按宽限期停止
//
// Usage:
//   med-tracker [db_path]
// ==========================================

use med_tracker::app::{get_default_db_path, AppState};
use med_tracker::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", med_tracker::APP_NAME);
    tracing::info!("系统版本: {}", med_tracker::VERSION);
    tracing::info!("==================================================");

    let db_path = std::env::args()
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let app_state = AppState::new(db_path)?;

    app_state.expiry_monitor.start();
    tracing::info!("服务运行中，按 Ctrl-C 退出");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "监听 Ctrl-C 失败，立即退出");
    }

    tracing::info!("收到退出信号，正在停止临期巡检...");
    app_state.expiry_monitor.stop().await;
    tracing::info!("已退出");
    Ok(())
}
