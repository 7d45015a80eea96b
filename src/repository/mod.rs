// ==========================================
// 药品库位管理系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: slot 占用/标签与 batch.slot_id 只经 *_tx 方法由分配器写入
// ==========================================

pub mod alert_repo;
pub mod batch_repo;
pub mod error;
pub mod medicine_repo;
pub mod slot_repo;

// 重导出核心仓储
pub use alert_repo::AlertRepository;
pub use batch_repo::BatchRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use medicine_repo::MedicineRepository;
pub use slot_repo::SlotRepository;
