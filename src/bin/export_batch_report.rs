// Small utility: export the batch ledger (or only expiring batches) as CSV.
//
// Usage:
//   cargo run --bin export_batch_report -- [db_path] [out.csv] [days]
//
// Without `days` every batch portion is exported; with `days` only portions
// expiring within that many days from today (already expired included).

use anyhow::{Context, Result};
use med_tracker::app::{get_default_db_path, AppState};
use std::path::PathBuf;

fn main() -> Result<()> {
    med_tracker::logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);
    let out_path = PathBuf::from(
        args.next()
            .unwrap_or_else(|| "batch_report.csv".to_string()),
    );
    let days = match args.next() {
        Some(raw) => Some(
            raw.trim()
                .parse::<i64>()
                .with_context(|| format!("days 参数非法 '{}'", raw))?,
        ),
        None => None,
    };

    let state = AppState::new(db_path.clone())
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("打开数据库失败: {}", db_path))?;
    let rows = match days {
        Some(days) => state.inventory_api.export_expiring_csv(days, &out_path),
        None => state.inventory_api.export_batches_csv(&out_path),
    }
    .with_context(|| format!("导出报表失败: {}", out_path.display()))?;

    println!("rows={} path={}", rows, out_path.display());
    Ok(())
}
