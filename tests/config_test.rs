// ==========================================
// ConfigManager 集成测试
// ==========================================
// 职责: config_kv 读写 / 缺省与格式错误回落 / 账号级覆写合并
// ==========================================

mod helpers;

use creator_send_aps::config::{
    config_keys, ConfigManager, PipelineConfigReader, TimingParams, TuningOverride,
    TuningOverrideParameters,
};
use helpers::api_test_helper::create_test_db;

#[tokio::test]
async fn test_missing_keys_use_defaults() {
    let (_temp, db_path) = create_test_db();
    let manager = ConfigManager::new(&db_path).unwrap();

    let timing = manager.get_timing_params().await.unwrap();
    let d = TimingParams::default();
    assert_eq!(timing.min_spacing_minutes, d.min_spacing_minutes);
    assert_eq!(timing.window_start_minute, d.window_start_minute);

    let run = manager.get_run_params().await.unwrap();
    assert_eq!(run.timeout_ms, 90_000);
    let followup = manager.get_followup_params().await.unwrap();
    assert_eq!(followup.max_per_day, 4);
    assert_eq!(followup.min_delay_minutes, 20);
}

#[tokio::test]
async fn test_set_value_is_read_back() {
    let (_temp, db_path) = create_test_db();
    let manager = ConfigManager::new(&db_path).unwrap();

    manager
        .set_config_value(config_keys::TIMING_MIN_SPACING_MINUTES, "90")
        .unwrap();
    manager
        .set_config_value(config_keys::TIMING_WINDOW_START, "09:30")
        .unwrap();
    manager
        .set_config_value(config_keys::FUSION_SATURATION_WEIGHTS, "0.6, 0.3, 0.1")
        .unwrap();

    let timing = manager.get_timing_params().await.unwrap();
    assert_eq!(timing.min_spacing_minutes, 90);
    assert_eq!(timing.window_start_minute, 9 * 60 + 30);
    let fusion = manager.get_fusion_params().await.unwrap();
    assert_eq!(fusion.saturation_weights, [0.6, 0.3, 0.1]);

    // UPSERT 覆盖
    manager
        .set_config_value(config_keys::TIMING_MIN_SPACING_MINUTES, "45")
        .unwrap();
    assert_eq!(manager.get_timing_params().await.unwrap().min_spacing_minutes, 45);
}

#[tokio::test]
async fn test_malformed_values_fall_back_to_defaults() {
    let (_temp, db_path) = create_test_db();
    let manager = ConfigManager::new(&db_path).unwrap();
    let d = TimingParams::default();

    manager
        .set_config_value(config_keys::TIMING_MIN_SPACING_MINUTES, "abc")
        .unwrap();
    manager
        .set_config_value(config_keys::TIMING_WINDOW_START, "25:99")
        .unwrap();
    manager
        .set_config_value(config_keys::FUSION_SATURATION_WEIGHTS, "0.5,0.5")
        .unwrap();

    let timing = manager.get_timing_params().await.unwrap();
    assert_eq!(timing.min_spacing_minutes, 60);
    assert_eq!(timing.window_start_minute, d.window_start_minute);
    let fusion = manager.get_fusion_params().await.unwrap();
    assert_eq!(fusion.saturation_weights, [0.5, 0.3, 0.2]);

    // 窗口起止颠倒时整体回落
    manager
        .set_config_value(config_keys::TIMING_WINDOW_START, "22:00")
        .unwrap();
    manager
        .set_config_value(config_keys::TIMING_WINDOW_END, "08:00")
        .unwrap();
    let timing = manager.get_timing_params().await.unwrap();
    assert_eq!(
        (timing.window_start_minute, timing.window_end_minute),
        (d.window_start_minute, d.window_end_minute)
    );
}

#[tokio::test]
async fn test_account_override_merged_by_load_tuning() {
    let (_temp, db_path) = create_test_db();
    let manager = ConfigManager::new(&db_path).unwrap();

    let override_ = TuningOverride {
        account_id: "A1".to_string(),
        description: None,
        parameters: TuningOverrideParameters {
            min_spacing_minutes: Some(120),
            max_followups_per_day: Some(2),
            ..Default::default()
        },
    };
    manager
        .set_config_value(
            &format!("{}A1", config_keys::TUNING_OVERRIDE_PREFIX),
            &serde_json::to_string(&override_).unwrap(),
        )
        .unwrap();

    let tuned = manager.load_tuning("A1").await.unwrap();
    assert_eq!(tuned.timing.min_spacing_minutes, 120);
    assert_eq!(tuned.followup.max_per_day, 2);

    // 其他账号不受影响
    let other = manager.load_tuning("A2").await.unwrap();
    assert_eq!(other.timing.min_spacing_minutes, 60);
    assert_eq!(other.followup.max_per_day, 4);
}

#[tokio::test]
async fn test_unparseable_override_is_ignored() {
    let (_temp, db_path) = create_test_db();
    let manager = ConfigManager::new(&db_path).unwrap();

    manager
        .set_config_value(&format!("{}A1", config_keys::TUNING_OVERRIDE_PREFIX), "{not json")
        .unwrap();

    assert!(manager.get_tuning_override("A1").await.unwrap().is_none());
    assert!(manager.get_tuning_override("  ").await.unwrap().is_none());
    let tuned = manager.load_tuning("A1").await.unwrap();
    assert_eq!(tuned.timing.min_spacing_minutes, 60);
}
