// ==========================================
// 排期流水线端到端测试
// ==========================================
// 职责: 从种子数据到已提交模板的完整链路
// 场景: 正常账号 / 无历史账号 / 免费页 / 内容池不足 / 输入错误
// ==========================================

mod helpers;

use std::collections::{HashMap, HashSet};

use chrono::Duration;
use creator_send_aps::api::ApiError;
use creator_send_aps::config::{TuningOverride, TuningOverrideParameters};
use creator_send_aps::domain::schedule::{PipelineWarning, ScheduleDraft};
use creator_send_aps::domain::send_type::SendTypeKey;
use creator_send_aps::domain::types::{SendCategory, VolumeLevel};
use creator_send_aps::engine::content_selector::ANY_CONTENT_TYPE;
use helpers::api_test_helper::ApiTestEnv;
use helpers::mock_config::MockConfig;
use helpers::test_data_builder::{
    ample_pool, content_items, run_at, week_start, AccountBuilder,
};

// ==========================================
// 测试辅助函数
// ==========================================

fn assert_spacing(draft: &ScheduleDraft, min_spacing: i64) {
    for day in 0..7u8 {
        let mut times: Vec<_> = draft
            .slots_on(day)
            .filter(|s| !s.is_followup())
            .map(|s| s.time.expect("非跟进槽位必须有时间"))
            .collect();
        times.sort();
        for pair in times.windows(2) {
            assert!(
                (pair[1] - pair[0]).num_minutes() >= min_spacing,
                "第 {} 天间隔不足: {} -> {}",
                day,
                pair[0],
                pair[1]
            );
        }
    }
}

fn assert_followups_linked(draft: &ScheduleDraft, max_per_day: usize, min_delay: i64) {
    let mut per_day: HashMap<u8, usize> = HashMap::new();
    for slot in draft.slots.iter().filter(|s| s.is_followup()) {
        *per_day.entry(slot.day_index).or_insert(0) += 1;
        let parent = draft
            .slot(slot.parent_slot_id.expect("跟进必须有父槽位"))
            .expect("父槽位必须存在");
        assert!(!parent.is_followup());
        assert_eq!(parent.date, slot.date);
        assert_ne!(parent.content_id, slot.content_id);
        let delay = (slot.timestamp().unwrap() - parent.timestamp().unwrap()).num_minutes();
        assert!(delay >= min_delay);
    }
    assert!(per_day.values().all(|n| *n <= max_per_day));
}

// ==========================================
// 正常链路
// ==========================================

#[tokio::test]
async fn test_generate_schedule_round_trip() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());
    env.seed_history("A1");
    env.seed_content(&ample_pool("A1", 60));

    let outcome = env
        .api
        .generate_schedule_at("A1", week_start(), run_at())
        .await
        .expect("排期生成失败");

    let draft = &outcome.draft;
    assert!(draft.validation.as_ref().map(|r| r.passed).unwrap_or(false));
    assert!(!draft.slots.is_empty());
    assert_eq!(outcome.template.slot_count, draft.slots.len());
    assert_eq!(outcome.template.account_id, "A1");
    assert!(!outcome
        .warnings()
        .iter()
        .any(|w| matches!(w, PipelineWarning::DataInsufficient { .. })));

    // 按时间顺序输出, 且每个槽位都有时间和内容
    let stamps: Vec<_> = draft.slots.iter().map(|s| s.timestamp().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert!(draft.slots.iter().all(|s| s.content_id.is_some()));

    // 读回与提交一致
    let detail = env
        .api
        .find_template(&outcome.template.template_id)
        .expect("模板读取失败");
    assert_eq!(detail.template, outcome.template);
    assert_eq!(detail.draft.slots, draft.slots);
    assert_eq!(detail.draft.warnings, draft.warnings);

    let templates = env.api.list_templates("A1").unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(
        env.count_rows("schedule_item") as usize,
        outcome.template.slot_count
    );
}

#[tokio::test]
async fn test_schedule_respects_caps_spacing_and_followup_rules() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").tier(1).build());
    env.seed_history("A1");
    env.seed_content(&ample_pool("A1", 80));

    let outcome = env
        .api
        .generate_schedule_at("A1", week_start(), run_at())
        .await
        .unwrap();
    let draft = &outcome.draft;
    let config = &outcome.volume.config;

    // 类别日配额（跟进不计入）
    for day in 0..7u8 {
        for category in SendCategory::ALL {
            let count = draft
                .slots_on(day)
                .filter(|s| !s.is_followup() && s.category == category)
                .count() as u32;
            assert!(count <= config.quota(category, day as usize));
        }
    }

    // 免费页专属类型不会出现在付费页
    assert!(!draft.slots.iter().any(|s| s.send_type == SendTypeKey::PpvWall));

    assert_spacing(draft, 60);
    assert_followups_linked(draft, 4, 20);

    // 内容充足时单次运行内不重复使用
    let ids: Vec<&str> = draft
        .slots
        .iter()
        .filter_map(|s| s.content_id.as_deref())
        .collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
}

#[tokio::test]
async fn test_commit_updates_volume_level_and_content_usage() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());
    env.seed_history("A1");
    env.seed_content(&ample_pool("A1", 60));

    let outcome = env
        .api
        .generate_schedule_at("A1", week_start(), run_at())
        .await
        .unwrap();

    let account = env.repos.account_repo.get("A1").unwrap();
    assert_eq!(account.volume_level, Some(outcome.volume.config.volume_level));

    let stored = env
        .repos
        .volume_config_repo
        .find_by_account("A1")
        .unwrap()
        .expect("发送量配置应已替换");
    assert_eq!(stored.weekly, outcome.volume.config.weekly);

    let first = &outcome.draft.slots[0];
    let item = env
        .repos
        .content_repo
        .find_by_id(first.content_id.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(item.last_used_at, first.timestamp());
}

// ==========================================
// 数据不足 / 约束不可满足
// ==========================================

#[tokio::test]
async fn test_account_without_history_uses_mid_defaults() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("NEW").tier(1).build());
    env.seed_content(&ample_pool("NEW", 60));

    let outcome = env
        .api
        .generate_schedule_at("NEW", week_start(), run_at())
        .await
        .expect("无历史账号也应生成排期");

    let config = &outcome.volume.config;
    assert_eq!(config.volume_level, VolumeLevel::Mid);
    assert_eq!(config.confidence, 0.0);
    assert!(!config.elasticity_capped);
    assert_eq!(
        config.weekly.revenue + config.weekly.engagement + config.weekly.retention,
        VolumeLevel::Mid.daily_total() * 7
    );
    assert!(outcome.warnings().iter().any(|w| matches!(
        w,
        PipelineWarning::DataInsufficient { account_id, .. } if account_id == "NEW"
    )));
}

#[tokio::test]
async fn test_narrow_window_failure_reports_dropped_slots() {
    // 20:00-20:30 + 60 分钟间隔: 每天只容纳 1 个槽位
    let config = MockConfig::new()
        .with_send_window(20 * 60, 20 * 60 + 30)
        .with_timing_retries(1);
    let env = ApiTestEnv::with_config(config);
    env.seed_account(&AccountBuilder::new("NEW").build());
    env.seed_content(&ample_pool("NEW", 60));

    let err = env
        .api
        .generate_schedule_at("NEW", week_start(), run_at())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "INFEASIBLE");
    assert!(!err.is_retryable());

    let report = err.to_report();
    assert_eq!(report.entity_ids, vec![week_start().to_string()]);
    let dropped: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| matches!(w, PipelineWarning::SlotDropped { .. }))
        .collect();
    assert_eq!(dropped.len(), 1);
    assert!(matches!(
        dropped[0],
        PipelineWarning::SlotDropped { date, .. } if *date == week_start()
    ));
    // 上游阶段的告警同样保留
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, PipelineWarning::DataInsufficient { .. })));

    assert_eq!(env.count_rows("schedule_template"), 0);
    assert_eq!(env.count_rows("schedule_item"), 0);
    assert_eq!(env.count_rows("volume_config"), 0);
}

#[tokio::test]
async fn test_free_page_drops_retention_with_warning() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("FREE").free_page().build());
    env.seed_history("FREE");
    env.seed_content(&ample_pool("FREE", 60));

    let outcome = env
        .api
        .generate_schedule_at("FREE", week_start(), run_at())
        .await
        .unwrap();

    assert!(!outcome
        .draft
        .slots
        .iter()
        .any(|s| s.category == SendCategory::Retention));
    let dropped: Vec<_> = outcome
        .warnings()
        .iter()
        .filter(|w| matches!(
            w,
            PipelineWarning::CategoryDropped { category: SendCategory::Retention, .. }
        ))
        .collect();
    assert!(!dropped.is_empty());
}

#[tokio::test]
async fn test_caption_pool_shortfall_allows_reuse() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());
    env.seed_history("A1");
    // 只有一个内容类型且仅 2 条素材
    env.seed_content(&content_items("A1", "Outdoor", 2));

    let outcome = env
        .api
        .generate_schedule_at("A1", week_start(), run_at())
        .await
        .expect("内容池不足不应导致失败");

    let warnings: Vec<_> = outcome
        .warnings()
        .iter()
        .filter_map(|w| match w {
            PipelineWarning::CaptionPool(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(warnings.len(), 1);
    let warning = warnings[0];
    assert!(warning.content_type == "Outdoor" || warning.content_type == ANY_CONTENT_TYPE);
    assert_eq!(warning.available, 2);
    assert_eq!(warning.shortfall, warning.required - warning.available);
    assert!(outcome.draft.slots.iter().all(|s| s.content_id.is_some()));
}

#[tokio::test]
async fn test_account_override_widens_spacing() {
    let override_ = TuningOverride {
        account_id: "A1".to_string(),
        description: Some("间隔放宽".to_string()),
        parameters: TuningOverrideParameters {
            min_spacing_minutes: Some(120),
            ..Default::default()
        },
    };
    let env = ApiTestEnv::with_config(MockConfig::new().with_override(override_));
    env.seed_account(&AccountBuilder::new("A1").build());
    env.seed_history("A1");
    env.seed_content(&ample_pool("A1", 60));

    let outcome = env
        .api
        .generate_schedule_at("A1", week_start(), run_at())
        .await
        .unwrap();
    assert_spacing(&outcome.draft, 120);
}

#[tokio::test]
async fn test_next_week_avoids_resting_content() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());
    env.seed_history("A1");
    env.seed_content(&ample_pool("A1", 60));

    let first = env
        .api
        .generate_schedule_at("A1", week_start(), run_at())
        .await
        .unwrap();
    let next_week = week_start() + Duration::days(7);
    let second = env
        .api
        .generate_schedule_at("A1", next_week, run_at() + Duration::days(7))
        .await
        .expect("第二周排期应通过校验");

    assert_ne!(first.template.template_id, second.template.template_id);
    assert_eq!(env.api.list_templates("A1").unwrap().len(), 2);
}

// ==========================================
// 输入错误
// ==========================================

#[tokio::test]
async fn test_unknown_account_is_not_found() {
    let env = ApiTestEnv::new();
    let err = env
        .api
        .generate_schedule_at("GHOST", week_start(), run_at())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::NotFound { .. }));
    assert_eq!(err.entity_ids(), vec!["GHOST".to_string()]);
    assert_eq!(env.count_rows("schedule_template"), 0);
}

#[tokio::test]
async fn test_inactive_account_rejected() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("OFF").inactive().build());
    env.seed_content(&ample_pool("OFF", 10));

    let err = env
        .api
        .generate_schedule_at("OFF", week_start(), run_at())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "INVALID_INPUT");
    assert_eq!(err.entity_ids(), vec!["OFF".to_string()]);
}

#[tokio::test]
async fn test_malformed_week_start_rejected_before_run() {
    let env = ApiTestEnv::new();
    env.seed_account(&AccountBuilder::new("A1").build());

    let err = env.api.generate_schedule("A1", "19-10-2026").await.unwrap_err();
    assert_eq!(err.kind(), "INVALID_INPUT");
    assert!(!err.is_retryable());
    assert_eq!(env.count_rows("volume_config"), 0);
}
