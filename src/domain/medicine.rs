// ==========================================
// 药品库位管理系统 - 药品目录领域模型
// ==========================================
// 目录为外部协作方: 核心只读（名称解析），不回写
// ==========================================

use serde::{Deserialize, Serialize};

/// 药品
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicine {
    pub medicine_id: i64,
    pub name: String,
    pub manufacturer: Option<String>,
    pub supplier: Option<String>,
}

/// 新建药品参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedicine {
    pub name: String,
    pub manufacturer: Option<String>,
    pub supplier: Option<String>,
}
