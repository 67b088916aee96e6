// ==========================================
// Repository 集成测试
// ==========================================
// 职责: 读取契约（显式失败）与排期提交的原子性
// ==========================================

mod helpers;

use chrono::NaiveTime;
use creator_send_aps::domain::schedule::{ScheduleDraft, ScheduleSlot};
use creator_send_aps::domain::send_type::SendTypeKey;
use creator_send_aps::domain::types::{CategoryCounts, Horizon, SendCategory, VolumeLevel};
use creator_send_aps::domain::volume::VolumeConfig;
use creator_send_aps::repository::{RepositoryError, ScheduleCommit};
use helpers::api_test_helper::ApiTestEnv;
use helpers::test_data_builder::{content_items, run_at, week_start, AccountBuilder};
use std::collections::BTreeMap;

fn volume_config(account_id: &str) -> VolumeConfig {
    VolumeConfig {
        account_id: account_id.to_string(),
        volume_level: VolumeLevel::High,
        weekly: CategoryCounts {
            revenue: 14,
            engagement: 14,
            retention: 7,
        },
        daily: CategoryCounts {
            revenue: 2,
            engagement: 2,
            retention: 1,
        },
        weekly_plan: CategoryCounts {
            revenue: [2; 7],
            engagement: [2; 7],
            retention: [1; 7],
        },
        dow_multipliers: [1.0 / 7.0; 7],
        content_type_weights: BTreeMap::new(),
        elasticity_capped: false,
        confidence: 0.8,
        fused_score: None,
        calculated_at: run_at(),
    }
}

fn slot(slot_id: u32, hour: u32, content_id: Option<&str>) -> ScheduleSlot {
    ScheduleSlot {
        slot_id,
        day_index: 0,
        date: week_start(),
        time: NaiveTime::from_hms_opt(hour, 0, 0),
        send_type: SendTypeKey::PpvUnlock,
        category: SendCategory::Revenue,
        content_type: Some("Outdoor".to_string()),
        content_id: content_id.map(|s| s.to_string()),
        price: Some(25.0),
        parent_slot_id: None,
    }
}

fn draft(slots: Vec<ScheduleSlot>) -> ScheduleDraft {
    let mut draft = ScheduleDraft::new("A1", week_start());
    draft.slots = slots;
    draft
}

// ==========================================
// 读取契约
// ==========================================

#[test]
fn test_snapshot_for_unknown_account_fails_explicitly() {
    let env = ApiTestEnv::new();
    let err = env.repos.performance_repo.load_snapshot("GHOST").unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[test]
fn test_snapshot_fills_missing_windows() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());

    let snapshot = env.repos.performance_repo.load_snapshot("A1").unwrap();
    assert_eq!(
        snapshot.windows.iter().map(|w| w.horizon).collect::<Vec<_>>(),
        Horizon::ALL.to_vec()
    );
    assert!(snapshot.windows.iter().all(|w| w.sends == 0));
    assert_eq!(snapshot.hourly, [0.0; 24]);
}

#[test]
fn test_content_pool_read_by_type() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());
    env.seed_content(&content_items("A1", "Outdoor", 3));
    env.seed_content(&content_items("A1", "Studio", 2));

    let outdoor = env.repos.content_repo.list_by_type("A1", "Outdoor").unwrap();
    assert_eq!(outdoor.len(), 3);
    assert!(outdoor.iter().all(|c| c.content_type == "Outdoor"));
    assert_eq!(env.repos.content_repo.list_by_account("A1").unwrap().len(), 5);
}

// ==========================================
// 提交原子性
// ==========================================

#[test]
fn test_commit_writes_template_slots_and_config_together() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());
    env.seed_content(&content_items("A1", "Outdoor", 2));

    let d = draft(vec![
        slot(1, 10, Some("A1-Outdoor-000")),
        slot(2, 14, Some("A1-Outdoor-001")),
    ]);
    let config = volume_config("A1");
    let template = env
        .repos
        .schedule_repo
        .commit(&ScheduleCommit {
            template_id: "T1".to_string(),
            draft: &d,
            volume_config: &config,
            tuning_snapshot_json: None,
            created_at: run_at(),
        })
        .unwrap();

    assert_eq!(template.slot_count, 2);
    assert_eq!(env.count_rows("schedule_item"), 2);
    assert_eq!(
        env.repos.account_repo.get("A1").unwrap().volume_level,
        Some(VolumeLevel::High)
    );
    let used = env
        .repos
        .content_repo
        .find_by_id("A1-Outdoor-001")
        .unwrap()
        .unwrap();
    assert_eq!(used.last_used_at, d.slots[1].timestamp());
}

#[test]
fn test_failed_commit_leaves_nothing_behind() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());
    env.seed_content(&content_items("A1", "Outdoor", 2));
    let config = volume_config("A1");

    // 未选内容的槽位: 写入前拒绝
    let incomplete = draft(vec![slot(1, 10, Some("A1-Outdoor-000")), slot(2, 14, None)]);
    let err = env
        .repos
        .schedule_repo
        .commit(&ScheduleCommit {
            template_id: "T1".to_string(),
            draft: &incomplete,
            volume_config: &config,
            tuning_snapshot_json: None,
            created_at: run_at(),
        })
        .unwrap_err();
    assert!(matches!(err, RepositoryError::FieldValueError { .. }));

    // 重复模板ID: 事务中途失败, 整体回滚
    let ok = draft(vec![slot(1, 10, Some("A1-Outdoor-000"))]);
    let commit = ScheduleCommit {
        template_id: "T2".to_string(),
        draft: &ok,
        volume_config: &config,
        tuning_snapshot_json: None,
        created_at: run_at(),
    };
    env.repos.schedule_repo.commit(&commit).unwrap();
    let dup = draft(vec![
        slot(1, 9, Some("A1-Outdoor-001")),
        slot(2, 15, Some("A1-Outdoor-000")),
    ]);
    let err = env
        .repos
        .schedule_repo
        .commit(&ScheduleCommit {
            template_id: "T2".to_string(),
            draft: &dup,
            volume_config: &config,
            tuning_snapshot_json: None,
            created_at: run_at(),
        })
        .unwrap_err();
    assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));

    assert_eq!(env.count_rows("schedule_template"), 1);
    assert_eq!(env.count_rows("schedule_item"), 1);
    let untouched = env
        .repos
        .content_repo
        .find_by_id("A1-Outdoor-001")
        .unwrap()
        .unwrap();
    assert_eq!(untouched.last_used_at, None);
}

#[test]
fn test_missing_template_reads_as_none() {
    let env = ApiTestEnv::new();
    assert!(env.repos.schedule_repo.find_template("nope").unwrap().is_none());
    assert!(env.repos.schedule_repo.load_draft("nope").unwrap().is_none());
}
