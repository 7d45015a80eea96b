// ==========================================
// 药品库位管理系统 - 临期巡检
// ==========================================
// 职责: 按调度查找临期批次分量，每个分量发出一条预警
// 判定: exp_date 非空 且 exp_date <= today + 预警天数 且 quantity > 0
// 容错:
//   - 药品/库位解析失败 → 占位文本（降级，不中断本轮）
//   - 批次查询失败 → 本轮中止，记录日志，调度继续
//   - 本轮 panic → 在任务边界捕获并记录
// 语义: 不去重，每轮对每个临期分量都会再次预警
// 周报: 按独立调度统计未来 N 天内到期的分量数，仅记日志
// ==========================================

use crate::config::config_manager::{DEFAULT_EXPIRY_SUMMARY_DAYS, DEFAULT_EXPIRY_WARNING_DAYS};
use crate::config::{MonitorConfigReader, MonitorSchedule};
use crate::domain::batch::BatchPortion;
use crate::engine::alert_sink::AlertSink;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{BatchRepository, MedicineRepository, SlotRepository};
use chrono::{Days, Local, NaiveDate};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// LookupFailure - 尽力解析失败
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// 引用的记录不存在
    NotFound,
    /// 查询本身失败
    Unavailable(String),
}

/// 单轮巡检结果
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub run_id: Uuid,
    pub today: NaiveDate,
    pub cutoff: NaiveDate,
    pub horizon_days: i64,
    /// 命中的临期分量数
    pub matched: usize,
    /// 预警入库成功数
    pub persisted: usize,
    /// 预警写文件成功数
    pub logged: usize,
}

/// 临期周报统计
#[derive(Debug, Clone, Serialize)]
pub struct ExpirySummary {
    pub today: NaiveDate,
    /// 窗口末日（含）
    pub until: NaiveDate,
    pub window_days: i64,
    /// 窗口内到期的分量数
    pub expiring: usize,
    pub total_quantity: i64,
}

// ==========================================
// ExpiryChecker - 单轮巡检
// ==========================================
pub struct ExpiryChecker {
    batch_repo: Arc<BatchRepository>,
    slot_repo: Arc<SlotRepository>,
    medicine_repo: Arc<MedicineRepository>,
    alert_sink: Arc<dyn AlertSink>,
}

impl ExpiryChecker {
    pub fn new(
        batch_repo: Arc<BatchRepository>,
        slot_repo: Arc<SlotRepository>,
        medicine_repo: Arc<MedicineRepository>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            batch_repo,
            slot_repo,
            medicine_repo,
            alert_sink,
        }
    }

    /// 以指定"今天"执行一轮巡检
    ///
    /// # 参数
    /// - today: 判定基准日
    /// - horizon_days: 预警天数（负值按 0 处理）
    ///
    /// # 返回
    /// - Ok(CheckReport): 本轮统计
    /// - Err: 批次查询失败（本轮未发出任何预警）
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub fn run_check_at(&self, today: NaiveDate, horizon_days: i64) -> RepositoryResult<CheckReport> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));

        let horizon_days = horizon_days.max(0);
        let cutoff = today
            .checked_add_days(Days::new(horizon_days as u64))
            .unwrap_or(NaiveDate::MAX);

        let portions = self.batch_repo.find_expiring_until(cutoff)?;
        debug!(cutoff = %cutoff, matched = portions.len(), "临期分量查询完成");

        let mut report = CheckReport {
            run_id,
            today,
            cutoff,
            horizon_days,
            matched: portions.len(),
            persisted: 0,
            logged: 0,
        };

        for portion in &portions {
            let medicine = self.medicine_label(portion.medicine_id);
            let location = self.slot_location(portion.slot_id);
            let message = format_alert(portion, &medicine, &location, today);

            let outcome = self.alert_sink.raise(Some(portion.batch_id), &message);
            if outcome.persisted {
                report.persisted += 1;
            }
            if outcome.logged {
                report.logged += 1;
            }
        }

        info!(
            matched = report.matched,
            persisted = report.persisted,
            logged = report.logged,
            "临期巡检完成: 截止 {}",
            cutoff
        );
        Ok(report)
    }

    /// 统计 [today, today + window_days] 内到期的分量（只记日志，不发预警）
    #[instrument(skip(self))]
    pub fn summarize_at(&self, today: NaiveDate, window_days: i64) -> RepositoryResult<ExpirySummary> {
        let window_days = window_days.max(0);
        let until = today
            .checked_add_days(Days::new(window_days as u64))
            .unwrap_or(NaiveDate::MAX);

        let portions = self.batch_repo.find_expiring_between(today, until)?;
        let summary = ExpirySummary {
            today,
            until,
            window_days,
            expiring: portions.len(),
            total_quantity: portions.iter().map(|p| p.quantity).sum(),
        };

        info!(
            expiring = summary.expiring,
            total_quantity = summary.total_quantity,
            until = %until,
            "临期周报: 未来 {} 天内到期批次 {} 个",
            window_days,
            summary.expiring
        );
        Ok(summary)
    }

    fn lookup_medicine_name(&self, medicine_id: i64) -> Result<String, LookupFailure> {
        match self.medicine_repo.find_by_id(medicine_id) {
            Ok(Some(medicine)) => Ok(medicine.name),
            Ok(None) => Err(LookupFailure::NotFound),
            Err(e) => Err(LookupFailure::Unavailable(e.to_string())),
        }
    }

    /// 药品名称（解析失败返回占位文本）
    fn medicine_label(&self, medicine_id: i64) -> String {
        match self.lookup_medicine_name(medicine_id) {
            Ok(name) => name,
            Err(LookupFailure::NotFound) => {
                warn!(medicine_id = medicine_id, "预警引用的药品不存在");
                "(未知药品)".to_string()
            }
            Err(LookupFailure::Unavailable(reason)) => {
                warn!(medicine_id = medicine_id, error = %reason, "药品查询失败");
                "(药品查询失败)".to_string()
            }
        }
    }

    /// 库位描述（解析失败返回占位文本）
    fn slot_location(&self, slot_id: Option<i64>) -> String {
        let slot_id = match slot_id {
            Some(id) => id,
            None => return "未分配库位".to_string(),
        };

        match self.slot_repo.find_by_id(slot_id) {
            Ok(Some(slot)) => slot.describe(),
            Ok(None) => {
                warn!(slot_id = slot_id, "预警引用的库位不存在");
                format!("库位不存在 (slot_id={})", slot_id)
            }
            Err(e) => {
                warn!(slot_id = slot_id, error = %e, "库位查询失败");
                "库位查询失败".to_string()
            }
        }
    }
}

/// 预警正文
pub fn format_alert(portion: &BatchPortion, medicine: &str, location: &str, today: NaiveDate) -> String {
    let exp_date = portion
        .exp_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let days_left = portion
        .days_until_expiry(today)
        .map(|d| d.to_string())
        .unwrap_or_default();

    format!(
        "临期预警: batch_id={} medicine='{}' composition='{}' qty={} exp_date={} days_left={} -- {}",
        portion.batch_id, medicine, portion.composition, portion.quantity, exp_date, days_left, location
    )
}

// ==========================================
// ExpiryMonitor - 后台调度
// ==========================================

/// 巡检状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Stopped,
    Running,
}

struct MonitorWorker {
    cancel: CancellationToken,
    check: JoinHandle<()>,
    summary: JoinHandle<()>,
}

impl MonitorWorker {
    fn is_running(&self) -> bool {
        !self.check.is_finished() || !self.summary.is_finished()
    }
}

pub struct ExpiryMonitor {
    checker: Arc<ExpiryChecker>,
    config: Arc<dyn MonitorConfigReader>,
    schedule: MonitorSchedule,
    summary_schedule: MonitorSchedule,
    grace_period: Duration,
    worker: Mutex<Option<MonitorWorker>>,
}

impl ExpiryMonitor {
    /// 创建巡检器（未启动）
    ///
    /// # 参数
    /// - schedule: 启动时的巡检调度（首轮立即执行；之后每轮从配置重新读取，读取失败沿用此值）
    /// - grace_period: stop 时等待在途任务的最长时间
    pub fn new(
        checker: Arc<ExpiryChecker>,
        config: Arc<dyn MonitorConfigReader>,
        schedule: MonitorSchedule,
        grace_period: Duration,
    ) -> Self {
        Self {
            checker,
            config,
            schedule,
            summary_schedule: MonitorSchedule::weekly_summary(),
            grace_period,
            worker: Mutex::new(None),
        }
    }

    /// 设置临期周报的启动调度（配置读取失败时沿用）
    pub fn with_summary_schedule(mut self, schedule: MonitorSchedule) -> Self {
        self.summary_schedule = schedule;
        self
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<MonitorWorker>> {
        // 持锁期间不会 panic，中毒时沿用内部状态
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn schedule(&self) -> MonitorSchedule {
        self.schedule
    }

    pub fn summary_schedule(&self) -> MonitorSchedule {
        self.summary_schedule
    }

    pub fn state(&self) -> MonitorState {
        match self.worker_slot().as_ref() {
            Some(worker) if worker.is_running() => MonitorState::Running,
            _ => MonitorState::Stopped,
        }
    }

    /// 启动后台巡检与周报（需在 tokio 运行时内调用）
    ///
    /// # 返回
    /// - true: 本次启动
    /// - false: 已在运行（幂等）
    pub fn start(&self) -> bool {
        let mut slot = self.worker_slot();
        if let Some(worker) = slot.as_ref() {
            if worker.is_running() {
                debug!("临期巡检已在运行，忽略重复启动");
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let check = tokio::spawn(run_check_loop(
            self.checker.clone(),
            self.config.clone(),
            self.schedule,
            cancel.clone(),
        ));
        let summary = tokio::spawn(run_summary_loop(
            self.checker.clone(),
            self.config.clone(),
            self.summary_schedule,
            cancel.clone(),
        ));
        *slot = Some(MonitorWorker {
            cancel,
            check,
            summary,
        });

        info!(
            schedule = %self.schedule,
            summary_schedule = %self.summary_schedule,
            "临期巡检已启动"
        );
        true
    }

    /// 停止后台巡检
    ///
    /// 取消后续调度；在途任务最多等待宽限期，超时则中止
    pub async fn stop(&self) {
        let worker = self.worker_slot().take();
        let MonitorWorker {
            cancel,
            mut check,
            mut summary,
        } = match worker {
            Some(worker) => worker,
            None => {
                debug!("临期巡检未启动，忽略停止");
                return;
            }
        };

        cancel.cancel();
        let joined = tokio::time::timeout(self.grace_period, async {
            tokio::join!(&mut check, &mut summary)
        })
        .await;

        match joined {
            Ok((check_result, summary_result)) => {
                for result in [check_result, summary_result] {
                    if let Err(e) = result {
                        error!(error = %e, "临期巡检任务异常结束");
                    }
                }
                info!("临期巡检已停止");
            }
            Err(_) => {
                warn!(
                    grace_secs = self.grace_period.as_secs_f64(),
                    "在途任务超过宽限期，强制中止"
                );
                check.abort();
                summary.abort();
            }
        }
    }

    /// 立即执行一轮巡检（不影响后台调度）
    pub async fn run_once(&self) -> RepositoryResult<CheckReport> {
        let horizon = read_horizon(self.config.as_ref()).await;
        let today = Local::now().date_naive();
        let checker = self.checker.clone();

        tokio::task::spawn_blocking(move || checker.run_check_at(today, horizon))
            .await
            .map_err(|e| RepositoryError::InternalError(format!("巡检任务异常终止: {}", e)))?
    }

    /// 立即生成一次临期周报（不影响后台调度）
    pub async fn run_summary_once(&self) -> RepositoryResult<ExpirySummary> {
        let window_days = read_summary_days(self.config.as_ref()).await;
        let today = Local::now().date_naive();
        let checker = self.checker.clone();

        tokio::task::spawn_blocking(move || checker.summarize_at(today, window_days))
            .await
            .map_err(|e| RepositoryError::InternalError(format!("周报任务异常终止: {}", e)))?
    }
}

/// 本轮预警天数（读取失败回退默认值）
async fn read_horizon(config: &dyn MonitorConfigReader) -> i64 {
    match config.get_expiry_warning_days().await {
        Ok(days) => days,
        Err(e) => {
            warn!(error = %e, "读取临期预警天数失败，使用默认值");
            DEFAULT_EXPIRY_WARNING_DAYS
        }
    }
}

async fn read_schedule(config: &dyn MonitorConfigReader, fallback: MonitorSchedule) -> MonitorSchedule {
    match config.get_expiry_schedule().await {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!(error = %e, fallback = %fallback, "读取巡检调度失败，沿用启动时调度");
            fallback
        }
    }
}

async fn read_summary_schedule(
    config: &dyn MonitorConfigReader,
    fallback: MonitorSchedule,
) -> MonitorSchedule {
    match config.get_summary_schedule().await {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!(error = %e, fallback = %fallback, "读取周报调度失败，沿用启动时调度");
            fallback
        }
    }
}

async fn read_summary_days(config: &dyn MonitorConfigReader) -> i64 {
    match config.get_summary_days().await {
        Ok(days) => days,
        Err(e) => {
            warn!(error = %e, "读取周报天数失败，使用默认值");
            DEFAULT_EXPIRY_SUMMARY_DAYS
        }
    }
}

/// 等待下一轮；被取消返回 false
async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn run_check_loop(
    checker: Arc<ExpiryChecker>,
    config: Arc<dyn MonitorConfigReader>,
    fallback: MonitorSchedule,
    cancel: CancellationToken,
) {
    // 首轮立即执行；之后按计划时刻推进
    let mut fire_at = Local::now().naive_local();
    loop {
        let horizon = read_horizon(config.as_ref()).await;
        let today = Local::now().date_naive();
        let run_checker = checker.clone();

        match tokio::task::spawn_blocking(move || run_checker.run_check_at(today, horizon)).await {
            Ok(Ok(_report)) => {}
            Ok(Err(e)) => error!(error = %e, "本轮临期巡检失败，等待下一轮"),
            Err(e) if e.is_panic() => error!(error = %e, "本轮临期巡检 panic，等待下一轮"),
            Err(e) => error!(error = %e, "本轮临期巡检被取消"),
        }

        let schedule = read_schedule(config.as_ref(), fallback).await;
        let (next_fire, delay) = schedule.next_tick(fire_at, Local::now().naive_local());
        debug!(schedule = %schedule, delay_secs = delay.as_secs(), "等待下一轮临期巡检");

        if !wait_or_cancel(delay, &cancel).await {
            break;
        }
        fire_at = next_fire;
    }
    debug!("临期巡检循环退出");
}

async fn run_summary_loop(
    checker: Arc<ExpiryChecker>,
    config: Arc<dyn MonitorConfigReader>,
    fallback: MonitorSchedule,
    cancel: CancellationToken,
) {
    let mut last_fire = Local::now().naive_local();
    loop {
        let schedule = read_summary_schedule(config.as_ref(), fallback).await;
        let (fire_at, delay) = schedule.next_tick(last_fire, Local::now().naive_local());
        debug!(schedule = %schedule, delay_secs = delay.as_secs(), "等待下一次临期周报");

        if !wait_or_cancel(delay, &cancel).await {
            break;
        }
        last_fire = fire_at;

        let window_days = read_summary_days(config.as_ref()).await;
        let today = Local::now().date_naive();
        let run_checker = checker.clone();

        match tokio::task::spawn_blocking(move || run_checker.summarize_at(today, window_days)).await {
            Ok(Ok(_summary)) => {}
            Ok(Err(e)) => error!(error = %e, "临期周报生成失败，等待下一次"),
            Err(e) => error!(error = %e, "临期周报任务异常结束"),
        }
    }
    debug!("临期周报循环退出");
}
