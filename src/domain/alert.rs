// ==========================================
// 药品库位管理系统 - 预警领域模型
// ==========================================
// 红线: 只追加，无状态字段（不做确认/关闭，也不去重）
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 预警记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: i64,
    pub batch_id: Option<i64>,
    pub message: String,
    pub created_at: NaiveDateTime,
}

/// 待写入的预警
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub batch_id: Option<i64>,
    pub message: String,
    pub created_at: NaiveDateTime,
}
