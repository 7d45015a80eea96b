// ==========================================
// 库位分配集成测试
// ==========================================
// 职责: 基于文件数据库验证分配守恒、无部分分配、回收、移库原子性、确定性、并发串行化
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod slot_allocation_test {
    use med_tracker::domain::SlotCapacity;
    use med_tracker::engine::AllocationError;
    use std::sync::Arc;
    use std::thread;

    use crate::test_helpers::{create_test_db, request, TestStack};

    #[test]
    fn test_placement_scenarios_end_to_end() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let stack = TestStack::open(&db_path);
        let s1 = stack.seed_slot("A", "A-1", 100);
        let med = stack.seed_medicine("Paracetamol");

        // 空库位入库
        let placement = stack
            .allocator
            .place(&request(med, "Paracetamol 500mg", 60))
            .unwrap();
        assert_eq!(placement.portions.len(), 1);
        assert_eq!(placement.slot_ids(), vec![s1]);
        let slot = stack.slot_repo.find_by_id(s1).unwrap().unwrap();
        assert_eq!(slot.current_quantity, 60);
        assert_eq!(slot.composition_tag.as_deref(), Some("Paracetamol 500mg"));

        // 容量不足整体回滚
        let err = stack
            .allocator
            .place(&request(med, "Paracetamol 500mg", 50))
            .unwrap_err();
        assert!(matches!(
            err,
            AllocationError::CapacityExhausted {
                requested: 50,
                unplaced: 10,
                ..
            }
        ));
        assert_eq!(
            stack.slot_repo.find_by_id(s1).unwrap().unwrap().current_quantity,
            60
        );
        assert_eq!(stack.batch_repo.list_all().unwrap().len(), 1);

        // 出库回收
        stack.allocator.remove(placement.portions[0].batch_id).unwrap();
        let slot = stack.slot_repo.find_by_id(s1).unwrap().unwrap();
        assert_eq!(slot.current_quantity, 0);
        assert!(slot.is_vacant());
        assert!(stack.batch_repo.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_conservation_over_mixed_operations() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let stack = TestStack::open(&db_path);
        for shelf in 1..=4 {
            stack.seed_slot("A", &format!("A-{}", shelf), 40);
        }
        stack.seed_slot("B", "B-1", 80);
        let med = stack.seed_medicine("Mixed");

        let mut placed_ids = Vec::new();
        for (composition, qty) in [("Amoxicillin 250mg", 55), ("Ibuprofen 200mg", 30), ("Amoxicillin 250mg", 25)] {
            let placement = stack.allocator.place(&request(med, composition, qty)).unwrap();
            assert_eq!(placement.total_quantity(), qty);
            placed_ids.extend(placement.portions.iter().map(|p| p.batch_id));
            assert_eq!(stack.total_occupancy(), stack.total_portion_quantity());
        }

        // 移库后守恒
        let b1 = stack
            .slot_repo
            .list_by_zone("B")
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        let movable = stack
            .batch_repo
            .list_all()
            .unwrap()
            .into_iter()
            .find(|p| p.slot_id != Some(b1.slot_id) && b1.can_accept(p.quantity) && b1.is_vacant())
            .unwrap();
        stack.allocator.move_portion(movable.batch_id, b1.slot_id).unwrap();
        assert_eq!(stack.total_occupancy(), stack.total_portion_quantity());

        // 全部出库后所有库位回收
        for batch_id in placed_ids {
            stack.allocator.remove(batch_id).unwrap();
        }
        assert_eq!(stack.total_occupancy(), 0);
        assert!(stack.slot_repo.list_all().unwrap().iter().all(|s| s.is_vacant()));
    }

    #[test]
    fn test_identical_snapshots_allocate_identically() {
        let run = || {
            let (tmp, db_path) = create_test_db().unwrap();
            let stack = TestStack::open(&db_path);
            // 插入顺序与 zone/shelf 顺序不一致
            stack.seed_slot("C", "C-1", 25);
            stack.seed_slot("A", "A-2", 25);
            stack.seed_slot("B", "B-1", 25);
            stack.seed_slot("A", "A-1", 25);
            let med = stack.seed_medicine("Cetirizine");

            let placement = stack
                .allocator
                .place(&request(med, "Cetirizine 10mg", 80))
                .unwrap();
            let sequence: Vec<(String, String, i64)> = placement
                .portions
                .iter()
                .map(|p| {
                    let slot = stack.slot_repo.find_by_id(p.slot_id.unwrap()).unwrap().unwrap();
                    (slot.zone, slot.shelf_number, p.quantity)
                })
                .collect();
            drop(tmp);
            sequence
        };

        let first = run();
        let second = run();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                ("A".to_string(), "A-1".to_string(), 25),
                ("A".to_string(), "A-2".to_string(), 25),
                ("B".to_string(), "B-1".to_string(), 25),
                ("C".to_string(), "C-1".to_string(), 5),
            ]
        );
    }

    #[test]
    fn test_concurrent_placements_share_one_allocator() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let stack = TestStack::open(&db_path);
        stack.seed_slot("A", "A-1", 50);
        stack.seed_slot("A", "A-2", 50);
        let med = stack.seed_medicine("Paracetamol");

        let allocator = stack.allocator.clone();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                thread::spawn(move || allocator.place(&request(med, "Paracetamol 500mg", 20)))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let exhausted = results
            .iter()
            .filter(|r| matches!(r, Err(AllocationError::CapacityExhausted { .. })))
            .count();

        assert_eq!(succeeded, 5);
        assert_eq!(exhausted, 3);
        assert_eq!(stack.total_occupancy(), 100);
        assert_eq!(stack.total_portion_quantity(), 100);
    }

    #[test]
    fn test_concurrent_placements_across_connections() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let seed = TestStack::open(&db_path);
        seed.seed_slot("A", "A-1", 60);
        let med = seed.seed_medicine("Ibuprofen");

        // 每个线程独立连接: 依赖 IMMEDIATE 事务跨连接串行化
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db_path = db_path.clone();
                thread::spawn(move || {
                    let stack = TestStack::open(&db_path);
                    stack.allocator.place(&request(med, "Ibuprofen 200mg", 20))
                })
            })
            .collect();

        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();

        assert_eq!(succeeded, 3);
        let slot = seed.slot_repo.list_all().unwrap().remove(0);
        assert_eq!(slot.current_quantity, 60);
        assert!(slot.current_quantity <= slot.capacity);
        assert_eq!(seed.total_portion_quantity(), 60);
    }

    #[test]
    fn test_move_failure_leaves_everything_unchanged() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let stack = TestStack::open(&db_path);
        let a1 = stack.seed_slot("A", "A-1", 100);
        let a2 = stack.seed_slot("A", "A-2", 10);
        let med = stack.seed_medicine("Amoxicillin");

        let portion = stack
            .allocator
            .place(&request(med, "Amoxicillin 250mg", 40))
            .unwrap()
            .portions
            .remove(0);
        assert_eq!(portion.slot_id, Some(a1));

        let err = stack.allocator.move_portion(portion.batch_id, a2).unwrap_err();
        assert!(matches!(err, AllocationError::CapacityInsufficient { .. }));

        let a1_after = stack.slot_repo.find_by_id(a1).unwrap().unwrap();
        let a2_after = stack.slot_repo.find_by_id(a2).unwrap().unwrap();
        assert_eq!(a1_after.current_quantity, 40);
        assert_eq!(a2_after.current_quantity, 0);
        assert!(a2_after.is_vacant());
        assert_eq!(
            stack.batch_repo.find_by_id(portion.batch_id).unwrap().unwrap().slot_id,
            Some(a1)
        );
    }

    #[test]
    fn test_deleting_slot_detaches_portions() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let stack = TestStack::open(&db_path);
        let a1 = stack.seed_slot("A", "A-1", 100);
        let med = stack.seed_medicine("Paracetamol");

        let portion = stack
            .allocator
            .place(&request(med, "Paracetamol 500mg", 10))
            .unwrap()
            .portions
            .remove(0);

        assert!(stack.slot_repo.delete(a1).unwrap());
        let detached = stack.batch_repo.find_by_id(portion.batch_id).unwrap().unwrap();
        assert_eq!(detached.slot_id, None);

        // 无库位的分量仍可出库
        let removed = stack.allocator.remove(portion.batch_id).unwrap();
        assert_eq!(removed.slot_id, None);
    }
}
