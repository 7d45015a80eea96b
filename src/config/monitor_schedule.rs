// ==========================================
// 药品库位管理系统 - 临期巡检调度表达式
// ==========================================
// 支持格式（config_kv: expiry_schedule）:
// - "60" / "60s" / "interval:60"   固定间隔（秒，>= 1）
// - "daily@09:00"                  每日定时
// - "weekly@MON 10:00"             每周定时
// ==========================================

use chrono::{Datelike, Days, NaiveDateTime, NaiveTime, Weekday};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// 调度表达式解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("无效的巡检调度表达式 '{raw}': {reason}")]
pub struct ScheduleParseError {
    pub raw: String,
    pub reason: String,
}

impl ScheduleParseError {
    fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

// ==========================================
// MonitorSchedule - 巡检调度
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorSchedule {
    /// 固定间隔（轻量部署）
    Interval(Duration),
    /// 每日 at 时刻（服务器部署）
    Daily { at: NaiveTime },
    /// 每周 weekday 的 at 时刻
    Weekly { weekday: Weekday, at: NaiveTime },
}

impl Default for MonitorSchedule {
    fn default() -> Self {
        MonitorSchedule::Interval(Duration::from_secs(60))
    }
}

impl MonitorSchedule {
    /// 临期周报默认调度: 每周一 10:00
    pub fn weekly_summary() -> Self {
        MonitorSchedule::Weekly {
            weekday: Weekday::Mon,
            at: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }

    /// 下一次触发时刻（严格晚于 now）
    pub fn next_fire_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match *self {
            MonitorSchedule::Interval(interval) => {
                let step = chrono::Duration::from_std(interval)
                    .unwrap_or_else(|_| chrono::Duration::seconds(60));
                now + step
            }
            MonitorSchedule::Daily { at } => {
                let candidate = now.date().and_time(at);
                if candidate > now {
                    candidate
                } else {
                    candidate + Days::new(1)
                }
            }
            MonitorSchedule::Weekly { weekday, at } => {
                let today = now.weekday().num_days_from_monday();
                let target = weekday.num_days_from_monday();
                let days_ahead = (target + 7 - today) % 7;
                let candidate = now.date().and_time(at) + Days::new(days_ahead as u64);
                if candidate > now {
                    candidate
                } else {
                    candidate + Days::new(7)
                }
            }
        }
    }

    /// 距下一次触发的等待时长
    pub fn delay_until_next(&self, now: NaiveDateTime) -> Duration {
        (self.next_fire_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// 按上一次计划触发时刻推进（固定频率，不受单轮耗时影响）
    ///
    /// # 参数
    /// - last_fire: 上一轮的计划触发时刻
    /// - now: 当前时刻
    ///
    /// # 返回
    /// - (本轮计划触发时刻, 需等待时长)
    /// - 单轮耗时超过周期时立即触发，并以 now 作为新的基准（错过的轮次不补跑）
    pub fn next_tick(
        &self,
        last_fire: NaiveDateTime,
        now: NaiveDateTime,
    ) -> (NaiveDateTime, Duration) {
        let next = self.next_fire_after(last_fire);
        if next <= now {
            return (now, Duration::ZERO);
        }
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        (next, delay)
    }
}

impl FromStr for MonitorSchedule {
    type Err = ScheduleParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(ScheduleParseError::new(raw, "表达式为空"));
        }

        if let Some(rest) = value.strip_prefix("daily@") {
            let at = parse_time(raw, rest)?;
            return Ok(MonitorSchedule::Daily { at });
        }

        if let Some(rest) = value.strip_prefix("weekly@") {
            let mut parts = rest.split_whitespace();
            let (day, time) = match (parts.next(), parts.next(), parts.next()) {
                (Some(day), Some(time), None) => (day, time),
                _ => return Err(ScheduleParseError::new(raw, "期望格式 weekly@MON 10:00")),
            };
            let weekday = Weekday::from_str(day)
                .map_err(|_| ScheduleParseError::new(raw, format!("无法识别的星期: {}", day)))?;
            let at = parse_time(raw, time)?;
            return Ok(MonitorSchedule::Weekly { weekday, at });
        }

        let secs_str = value.strip_prefix("interval:").unwrap_or(value);
        let secs_str = secs_str.strip_suffix('s').unwrap_or(secs_str).trim();
        let secs: u64 = secs_str
            .parse()
            .map_err(|_| ScheduleParseError::new(raw, "间隔必须为正整数秒"))?;
        if secs == 0 {
            return Err(ScheduleParseError::new(raw, "间隔必须 >= 1 秒"));
        }
        Ok(MonitorSchedule::Interval(Duration::from_secs(secs)))
    }
}

fn parse_time(raw: &str, time: &str) -> Result<NaiveTime, ScheduleParseError> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| ScheduleParseError::new(raw, format!("时刻格式应为 HH:MM: {}", time)))
}

impl fmt::Display for MonitorSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorSchedule::Interval(d) => write!(f, "interval:{}", d.as_secs()),
            MonitorSchedule::Daily { at } => write!(f, "daily@{}", at.format("%H:%M")),
            MonitorSchedule::Weekly { weekday, at } => {
                write!(f, "weekly@{} {}", weekday, at.format("%H:%M"))
            }
        }
    }
}
