// ==========================================
// 药品库位管理系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约束: 分配器错误返回前，所在事务必须已回滚
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 库位分配错误
///
/// 均不自动重试，由调用方决定（例如提示补充库位后手动重试）
#[derive(Error, Debug)]
pub enum AllocationError {
    /// 输入非法（调用方错误）
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 引用的实体不存在
    #[error("{entity}不存在: id={id}")]
    NotFound { entity: &'static str, id: i64 },

    /// 入库无法全部放置（整体回滚）
    #[error("库位容量耗尽, 入库已整体回滚: composition={composition}, requested={requested}, unplaced={unplaced}")]
    CapacityExhausted {
        composition: String,
        requested: i64,
        unplaced: i64,
    },

    /// 移库目标空间不足（不拆分）
    #[error("目标库位剩余空间不足: slot_id={slot_id}, free_space={free_space}, required={required}")]
    CapacityInsufficient {
        slot_id: i64,
        free_space: i64,
        required: i64,
    },

    /// 存储不可用
    #[error("持久化失败: {0}")]
    Persistence(#[from] RepositoryError),
}

impl From<rusqlite::Error> for AllocationError {
    fn from(err: rusqlite::Error) -> Self {
        AllocationError::Persistence(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type AllocationResult<T> = Result<T, AllocationError>;
