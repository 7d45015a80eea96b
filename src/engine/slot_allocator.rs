// ==========================================
// 药品库位管理系统 - 库位分配引擎
// ==========================================
// 策略: 贪心首次适配，成分亲和优先
//   1) 已标记同成分且有空余的库位
//   2) 空库位（无成分标签）
//   3) 均无 → 整体回滚
// 排序: zone, shelf_number, slot_id（相同快照 + 相同入参 → 相同库位序列）
// ==========================================
// 并发: place / remove / move_portion 共用一个临界区
//   - 持有共享连接的互斥锁直到事务结束（进程内单写者）
//   - BEGIN IMMEDIATE（跨连接串行化写入）
// 红线: Engine 不拼 SQL，数据访问只经 Repository 的 *_tx 方法
// ==========================================

use crate::domain::batch::{BatchPortion, Placement, PlacementRequest};
use crate::domain::slot::SlotCapacity;
use crate::engine::error::{AllocationError, AllocationResult};
use crate::repository::error::RepositoryError;
use crate::repository::{BatchRepository, SlotRepository};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

// ==========================================
// SlotAllocator - 库位分配引擎
// ==========================================
pub struct SlotAllocator {
    conn: Arc<Mutex<Connection>>,
}

impl SlotAllocator {
    /// 创建分配器
    ///
    /// # 参数
    /// - conn: 与各 Repository 共享的连接（分配器持锁期间其他读写等待）
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 进入分配临界区
    fn enter(&self) -> AllocationResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AllocationError::Persistence(RepositoryError::LockError(e.to_string())))
    }

    /// 在临界区 + IMMEDIATE 事务内执行操作
    ///
    /// 成功提交；任何错误先回滚再返回
    fn in_transaction<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&Transaction) -> AllocationResult<T>,
    ) -> AllocationResult<T> {
        let mut conn = self.enter()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| transaction_failure(operation, "开启", e))?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| transaction_failure(operation, "提交", e))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(
                        operation = operation,
                        error = %rollback_err,
                        "事务回滚失败（连接释放时将再次回滚）"
                    );
                }
                Err(e)
            }
        }
    }

    // ==========================================
    // 入库
    // ==========================================

    /// 入库: 将请求数量放置到一个或多个库位
    ///
    /// # 返回
    /// - Ok(Placement): 全部放置成功，分量数量之和 == 请求数量
    /// - Err(Validation): 成分为空 / 数量 <= 0
    /// - Err(CapacityExhausted): 剩余数量无处放置，本次所有变更已回滚
    /// - Err(Persistence): 存储错误，已回滚
    #[instrument(skip(self, request), fields(
        medicine_id = request.medicine_id,
        composition = %request.composition.trim(),
        quantity = request.quantity
    ))]
    pub fn place(&self, request: &PlacementRequest) -> AllocationResult<Placement> {
        let composition = Self::validate_request(request)?;

        let result = self.in_transaction("place", |tx| {
            Self::allocate_tx(tx, request, &composition)
        });

        match result {
            Ok(portions) => {
                info!(
                    portions = portions.len(),
                    "入库完成: {} x {} 分布于 {} 个库位",
                    composition,
                    request.quantity,
                    portions.len()
                );
                Ok(Placement {
                    composition,
                    portions,
                })
            }
            Err(e) => {
                warn!(error = %e, "入库失败，已回滚");
                Err(e)
            }
        }
    }

    /// 校验入库请求，返回 trim 后的成分
    fn validate_request(request: &PlacementRequest) -> AllocationResult<String> {
        let composition = request.composition.trim();
        if composition.is_empty() {
            return Err(AllocationError::Validation("批次成分不能为空".to_string()));
        }
        if request.quantity <= 0 {
            return Err(AllocationError::Validation(format!(
                "批次数量必须为正数: {}",
                request.quantity
            )));
        }
        Ok(composition.to_string())
    }

    /// 事务内逐库位分配
    ///
    /// 查询走同一事务，后续轮次可见前序轮次的占用
    fn allocate_tx(
        tx: &Transaction,
        request: &PlacementRequest,
        composition: &str,
    ) -> AllocationResult<Vec<BatchPortion>> {
        let mut remaining = request.quantity;
        let mut portions = Vec::new();

        while remaining > 0 {
            let slot = match SlotRepository::find_with_composition_and_space_tx(tx, composition, 1)? {
                Some(slot) => slot,
                None => match SlotRepository::find_empty_tx(tx, 1)? {
                    Some(slot) => slot,
                    None => {
                        return Err(AllocationError::CapacityExhausted {
                            composition: composition.to_string(),
                            requested: request.quantity,
                            unplaced: remaining,
                        });
                    }
                },
            };

            let take = slot.free_space().min(remaining);
            if take <= 0 {
                // 空库位却有占用: 台账不一致，继续循环会原地打转
                return Err(AllocationError::Persistence(RepositoryError::InternalError(
                    format!(
                        "库位台账不一致: slot_id={}, capacity={}, current_quantity={}",
                        slot.slot_id, slot.capacity, slot.current_quantity
                    ),
                )));
            }

            SlotRepository::assign_quantity_tx(tx, slot.slot_id, composition, take)?;
            let portion =
                BatchRepository::insert_tx(tx, &request.portion(composition, take, slot.slot_id))?;

            debug!(
                slot_id = slot.slot_id,
                zone = %slot.zone,
                shelf = %slot.shelf_number,
                take = take,
                batch_id = portion.batch_id,
                "分配库位"
            );

            remaining -= take;
            portions.push(portion);
        }

        Ok(portions)
    }

    // ==========================================
    // 出库
    // ==========================================

    /// 移除批次分量
    ///
    /// 所在库位扣减数量，扣减后 <= 0 则回收库位（占用 0、清空成分标签）
    ///
    /// # 返回
    /// - Ok(BatchPortion): 被移除的分量
    /// - Err(NotFound): 分量不存在（无任何变更）
    #[instrument(skip(self))]
    pub fn remove(&self, batch_id: i64) -> AllocationResult<BatchPortion> {
        let result = self.in_transaction("remove", |tx| {
            let portion = BatchRepository::find_by_id_tx(tx, batch_id)?.ok_or(
                AllocationError::NotFound {
                    entity: "批次分量",
                    id: batch_id,
                },
            )?;

            if let Some(slot_id) = portion.slot_id {
                SlotRepository::release_quantity_tx(tx, slot_id, portion.quantity)?;
            }
            BatchRepository::delete_tx(tx, batch_id)?;

            Ok(portion)
        });

        match &result {
            Ok(portion) => info!(
                slot_id = ?portion.slot_id,
                quantity = portion.quantity,
                "批次分量已移除"
            ),
            Err(AllocationError::NotFound { .. }) => debug!("批次分量不存在，忽略移除"),
            Err(e) => warn!(error = %e, "移除批次分量失败，已回滚"),
        }
        result
    }

    // ==========================================
    // 移库
    // ==========================================

    /// 将批次分量整体移到目标库位（不拆分）
    ///
    /// 源库位按出库规则扣减/回收，目标库位增加数量并标记分量成分
    ///
    /// # 返回
    /// - Ok(BatchPortion): 更新后的分量
    /// - Err(NotFound): 分量或目标库位不存在
    /// - Err(Validation): 目标库位存放其他成分
    /// - Err(CapacityInsufficient): 目标剩余空间 < 分量数量
    #[instrument(skip(self))]
    pub fn move_portion(&self, batch_id: i64, target_slot_id: i64) -> AllocationResult<BatchPortion> {
        let result = self.in_transaction("move", |tx| {
            let portion = BatchRepository::find_by_id_tx(tx, batch_id)?.ok_or(
                AllocationError::NotFound {
                    entity: "批次分量",
                    id: batch_id,
                },
            )?;
            let target = SlotRepository::find_by_id_tx(tx, target_slot_id)?.ok_or(
                AllocationError::NotFound {
                    entity: "库位",
                    id: target_slot_id,
                },
            )?;

            // 原地移库: 无变更
            if portion.slot_id == Some(target_slot_id) {
                return Ok(portion);
            }

            if !target.can_accept(portion.quantity) {
                return Err(AllocationError::CapacityInsufficient {
                    slot_id: target_slot_id,
                    free_space: target.free_space(),
                    required: portion.quantity,
                });
            }

            // 目标库位已存放其他成分时不可混放
            if !target.is_vacant()
                && target.composition_tag.as_deref() != Some(portion.composition.as_str())
            {
                return Err(AllocationError::Validation(format!(
                    "目标库位 {} 已存放其他成分，不能移入 '{}'",
                    target_slot_id, portion.composition
                )));
            }

            if let Some(source_slot_id) = portion.slot_id {
                SlotRepository::release_quantity_tx(tx, source_slot_id, portion.quantity)?;
            }
            SlotRepository::assign_quantity_tx(
                tx,
                target_slot_id,
                &portion.composition,
                portion.quantity,
            )?;
            BatchRepository::update_slot_tx(tx, batch_id, target_slot_id)?;

            Ok(BatchPortion {
                slot_id: Some(target_slot_id),
                ..portion
            })
        });

        match &result {
            Ok(portion) => info!(quantity = portion.quantity, "批次分量已移库"),
            Err(e) => warn!(error = %e, "移库失败，已回滚"),
        }
        result
    }
}

/// 事务开启/提交失败（如写锁等待超时）
fn transaction_failure(operation: &str, stage: &str, err: rusqlite::Error) -> AllocationError {
    AllocationError::Persistence(RepositoryError::DatabaseTransactionError(format!(
        "{} 事务{}失败: {}",
        operation, stage, err
    )))
}
