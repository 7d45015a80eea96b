// ==========================================
// 药品库位管理系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将仓储/引擎/导出错误转换为用户可读的错误消息
// ==========================================

use crate::engine::error::AllocationError;
use crate::exporter::error::ExportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    /// 入库无法全部放置
    #[error("库位容量不足: {0}")]
    CapacityExhausted(String),

    /// 移库目标空间不足
    #[error("目标库位空间不足: {0}")]
    CapacityInsufficient(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 导出错误
    // ==========================================
    #[error("报表导出失败: {0}")]
    ExportError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("检查约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
        }
    }
}

// ==========================================
// 从 AllocationError 转换
// ==========================================
impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Validation(msg) => ApiError::InvalidInput(msg),
            AllocationError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            e @ AllocationError::CapacityExhausted { .. } => {
                ApiError::CapacityExhausted(e.to_string())
            }
            e @ AllocationError::CapacityInsufficient { .. } => {
                ApiError::CapacityInsufficient(e.to_string())
            }
            AllocationError::Persistence(e) => ApiError::from(e),
        }
    }
}

// ==========================================
// 从 ExportError 转换
// ==========================================
impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Repository(e) => ApiError::from(e),
            other => ApiError::ExportError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_errors_map_to_api_variants() {
        let err: ApiError = AllocationError::CapacityExhausted {
            composition: "Paracetamol 500mg".to_string(),
            requested: 50,
            unplaced: 10,
        }
        .into();
        assert!(matches!(err, ApiError::CapacityExhausted(ref msg) if msg.contains("unplaced=10")));

        let err: ApiError = AllocationError::NotFound {
            entity: "库位",
            id: 3,
        }
        .into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError =
            AllocationError::Persistence(RepositoryError::LockError("poisoned".to_string())).into();
        assert!(matches!(err, ApiError::DatabaseConnectionError(_)));

        let err: ApiError = AllocationError::Persistence(RepositoryError::DatabaseTransactionError(
            "database is locked".to_string(),
        ))
        .into();
        assert!(matches!(err, ApiError::DatabaseTransactionError(_)));
    }

    #[test]
    fn test_export_repository_error_is_unwrapped() {
        let err: ApiError =
            ExportError::Repository(RepositoryError::ValidationError("bad".to_string())).into();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err: ApiError = ExportError::FileWriteError("disk full".to_string()).into();
        assert!(matches!(err, ApiError::ExportError(_)));
    }
}
