// ==========================================
// 临期巡检集成测试
// ==========================================
// 职责: 验证临期判定、预警双写（alerts 表 + 日志文件）、配置热更新、启停生命周期
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod expiry_monitor_test {
    use chrono::{Days, Local};
    use med_tracker::app::AppState;
    use med_tracker::config::{config_keys, ConfigManager, MonitorConfigReader, MonitorSchedule};
    use med_tracker::domain::{NewMedicine, NewSlot, PlacementRequest};
    use med_tracker::engine::{AlertService, ExpiryChecker, ExpiryMonitor, MonitorState};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::test_helpers::{create_test_db, date, TestStack};

    fn checker_with_log(stack: &TestStack, log_path: &std::path::Path) -> ExpiryChecker {
        let sink = Arc::new(AlertService::new(stack.alert_repo.clone(), log_path));
        ExpiryChecker::new(
            stack.batch_repo.clone(),
            stack.slot_repo.clone(),
            stack.medicine_repo.clone(),
            sink,
        )
    }

    #[test]
    fn test_horizon_selects_only_near_expiry() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let stack = TestStack::open(&db_path);
        stack.seed_slot("A", "A-1", 100);
        let med = stack.seed_medicine("Paracetamol");

        let near = stack
            .allocator
            .place(&PlacementRequest::new(
                med,
                "Paracetamol 500mg",
                20,
                None,
                Some(date(2024, 1, 15)),
            ))
            .unwrap()
            .portions[0]
            .batch_id;
        stack
            .allocator
            .place(&PlacementRequest::new(
                med,
                "Paracetamol 500mg",
                20,
                None,
                Some(date(2024, 3, 1)),
            ))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("expiry_alerts.txt");
        let checker = checker_with_log(&stack, &log_path);

        let report = checker.run_check_at(date(2024, 1, 1), 30).unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.logged, 1);

        let alerts = stack.alert_repo.list_by_batch(near).unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("Paracetamol 500mg"));
        assert_eq!(stack.alert_repo.count().unwrap(), 1);

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains(&format!("batch_id={}", near)));
        assert!(log.contains("Zone=A Shelf=A-1"));
    }

    #[test]
    fn test_batches_without_expiry_never_alert() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let stack = TestStack::open(&db_path);
        stack.seed_slot("A", "A-1", 100);
        let med = stack.seed_medicine("Saline");
        stack
            .allocator
            .place(&PlacementRequest::new(med, "NaCl 0.9%", 10, None, None))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let checker = checker_with_log(&stack, &dir.path().join("alerts.txt"));
        let report = checker.run_check_at(date(2024, 1, 1), 36500).unwrap();
        assert_eq!(report.matched, 0);
    }

    #[tokio::test]
    async fn test_horizon_change_applies_on_next_run() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let stack = TestStack::open(&db_path);
        stack.seed_slot("A", "A-1", 100);
        let med = stack.seed_medicine("Ibuprofen");
        let in_twenty_days = Local::now().date_naive() + Days::new(20);
        stack
            .allocator
            .place(&PlacementRequest::new(
                med,
                "Ibuprofen 200mg",
                10,
                None,
                Some(in_twenty_days),
            ))
            .unwrap();

        let config = Arc::new(ConfigManager::from_connection(stack.conn.clone()).unwrap());
        config
            .set_config_value(config_keys::EXPIRY_WARNING_DAYS, "10")
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let checker = Arc::new(checker_with_log(&stack, &dir.path().join("alerts.txt")));
        let reader: Arc<dyn MonitorConfigReader> = config.clone();
        let monitor = ExpiryMonitor::new(
            checker,
            reader,
            MonitorSchedule::Interval(Duration::from_secs(3600)),
            Duration::from_secs(5),
        );

        assert_eq!(monitor.run_once().await.unwrap().matched, 0);

        config
            .set_config_value(config_keys::EXPIRY_WARNING_DAYS, "30")
            .unwrap();
        assert_eq!(monitor.run_once().await.unwrap().matched, 1);
    }

    #[tokio::test]
    async fn test_app_state_monitor_lifecycle() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("expiry_alerts.txt");

        {
            let config = ConfigManager::new(&db_path).unwrap();
            config
                .set_config_value(config_keys::ALERT_LOG_PATH, &log_path.to_string_lossy())
                .unwrap();
            config
                .set_config_value(config_keys::EXPIRY_SCHEDULE, "interval:3600")
                .unwrap();
            config
                .set_config_value(config_keys::MONITOR_STOP_GRACE_SECS, "1")
                .unwrap();
        }

        let state = AppState::new(db_path).unwrap();
        assert_eq!(
            state.monitor_settings.schedule,
            MonitorSchedule::Interval(Duration::from_secs(3600))
        );

        let api = &state.inventory_api;
        api.create_slot(&NewSlot::new("A", "A-1", 100)).unwrap();
        let med = api
            .create_medicine(&NewMedicine {
                name: "Paracetamol".to_string(),
                manufacturer: None,
                supplier: None,
            })
            .unwrap();
        let today = Local::now().date_naive();
        api.add_batch(&PlacementRequest::new(
            med,
            "Paracetamol 500mg",
            10,
            None,
            Some(today + Days::new(3)),
        ))
        .unwrap();

        let monitor = state.expiry_monitor.clone();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(monitor.start());
        assert_eq!(monitor.state(), MonitorState::Running);

        // 首轮立即执行
        let mut alerts = Vec::new();
        for _ in 0..100 {
            alerts = api.list_recent_alerts(10).unwrap();
            if !alerts.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(alerts.len(), 1);

        monitor.stop().await;
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(std::fs::read_to_string(&log_path)
            .unwrap()
            .contains("Paracetamol 500mg"));
    }
}
