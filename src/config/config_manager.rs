// ==========================================
// 创作者发送排期系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 说明: 键缺失时使用文档默认值; 格式错误时告警并回落默认值
// ==========================================

use crate::config::pipeline_config_trait::{ConfigResult, PipelineConfigReader};
use crate::config::tuning::{
    FollowupParams, FreshnessParams, FusionParams, GuardParams, RunParams, TimingParams,
    VolumeParams,
};
use crate::config::tuning_override::TuningOverride;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use chrono::{NaiveTime, Timelike};
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置, 缺失或格式错误时返回默认值
    fn get_parsed<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 读取 3 元权重（逗号分隔, 如 "0.5,0.3,0.2"）
    fn get_weights3(&self, key: &str, default: [f64; 3]) -> ConfigResult<[f64; 3]> {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        let parsed: Vec<f64> = raw
            .split(',')
            .filter_map(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .collect();
        if parsed.len() != 3 || parsed.iter().sum::<f64>() <= 0.0 {
            tracing::warn!(config_key = key, raw_value = %raw, "权重配置格式错误，使用默认值");
            return Ok(default);
        }
        Ok([parsed[0], parsed[1], parsed[2]])
    }

    /// 读取 HH:MM 时间, 返回当日分钟数
    fn get_minute_of_day(&self, key: &str, default: u32) -> ConfigResult<u32> {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match NaiveTime::parse_from_str(raw.trim(), "%H:%M") {
            Ok(t) => Ok(t.hour() * 60 + t.minute()),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "时间配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }
}

// ==========================================
// PipelineConfigReader Trait 实现
// ==========================================
#[async_trait]
impl PipelineConfigReader for ConfigManager {
    async fn get_fusion_params(&self) -> ConfigResult<FusionParams> {
        let d = FusionParams::default();
        Ok(FusionParams {
            saturation_weights: self
                .get_weights3(config_keys::FUSION_SATURATION_WEIGHTS, d.saturation_weights)?,
            opportunity_weights: self
                .get_weights3(config_keys::FUSION_OPPORTUNITY_WEIGHTS, d.opportunity_weights)?,
            min_significant_sends: self
                .get_parsed(config_keys::FUSION_MIN_SIGNIFICANT_SENDS, d.min_significant_sends)?,
            divergence_tolerance: self
                .get_parsed(config_keys::FUSION_DIVERGENCE_TOLERANCE, d.divergence_tolerance)?,
            benchmark_open_rate: self
                .get_parsed(config_keys::FUSION_BENCHMARK_OPEN_RATE, d.benchmark_open_rate)?,
            benchmark_revenue_per_send: self.get_parsed(
                config_keys::FUSION_BENCHMARK_REVENUE_PER_SEND,
                d.benchmark_revenue_per_send,
            )?,
            saturation_sends_per_day: self.get_parsed(
                config_keys::FUSION_SATURATION_SENDS_PER_DAY,
                d.saturation_sends_per_day,
            )?,
        })
    }

    async fn get_volume_params(&self) -> ConfigResult<VolumeParams> {
        let d = VolumeParams::default();
        Ok(VolumeParams {
            elasticity_cap_pct: self
                .get_parsed(config_keys::ELASTICITY_CAP_PCT, d.elasticity_cap_pct)?
                .max(0.0),
            saturation_brake: self.get_parsed(config_keys::SATURATION_BRAKE, d.saturation_brake)?,
            saturation_hard_brake: self
                .get_parsed(config_keys::SATURATION_HARD_BRAKE, d.saturation_hard_brake)?,
            accelerate_threshold: self
                .get_parsed(config_keys::ACCELERATE_THRESHOLD, d.accelerate_threshold)?,
            double_step_threshold: self
                .get_parsed(config_keys::DOUBLE_STEP_THRESHOLD, d.double_step_threshold)?,
            max_weekly_per_category: self
                .get_parsed(config_keys::MAX_WEEKLY_PER_CATEGORY, d.max_weekly_per_category)?,
        })
    }

    async fn get_freshness_params(&self) -> ConfigResult<FreshnessParams> {
        let d = FreshnessParams::default();
        Ok(FreshnessParams {
            recency_weight: self.get_parsed(config_keys::FRESHNESS_RECENCY_WEIGHT, d.recency_weight)?,
            performance_weight: self
                .get_parsed(config_keys::FRESHNESS_PERFORMANCE_WEIGHT, d.performance_weight)?,
            freshness_horizon_days: self
                .get_parsed(config_keys::FRESHNESS_HORIZON_DAYS, d.freshness_horizon_days)?
                .max(1),
            min_rest_hours: self.get_parsed(config_keys::CONTENT_MIN_REST_HOURS, d.min_rest_hours)?,
        })
    }

    async fn get_timing_params(&self) -> ConfigResult<TimingParams> {
        let d = TimingParams::default();
        let start = self.get_minute_of_day(config_keys::TIMING_WINDOW_START, d.window_start_minute)?;
        let end = self.get_minute_of_day(config_keys::TIMING_WINDOW_END, d.window_end_minute)?;
        let (window_start_minute, window_end_minute) = if start < end {
            (start, end)
        } else {
            tracing::warn!(start, end, "发送窗口配置无效，使用默认值");
            (d.window_start_minute, d.window_end_minute)
        };

        Ok(TimingParams {
            min_spacing_minutes: self
                .get_parsed(config_keys::TIMING_MIN_SPACING_MINUTES, d.min_spacing_minutes)?
                .max(1),
            window_start_minute,
            window_end_minute,
            granularity_minutes: self
                .get_parsed(config_keys::TIMING_GRANULARITY_MINUTES, d.granularity_minutes)?
                .clamp(1, 60),
            max_retries: self.get_parsed(config_keys::TIMING_MAX_RETRIES, d.max_retries)?,
            generic_hour_weights: d.generic_hour_weights,
        })
    }

    async fn get_followup_params(&self) -> ConfigResult<FollowupParams> {
        let d = FollowupParams::default();
        Ok(FollowupParams {
            max_per_day: self.get_parsed(config_keys::FOLLOWUP_MAX_PER_DAY, d.max_per_day)?,
            min_delay_minutes: self
                .get_parsed(config_keys::FOLLOWUP_MIN_DELAY_MINUTES, d.min_delay_minutes)?
                .max(1),
        })
    }

    async fn get_guard_params(&self) -> ConfigResult<GuardParams> {
        let d = GuardParams::default();
        Ok(GuardParams {
            requests_per_minute: self
                .get_parsed(config_keys::GUARD_REQUESTS_PER_MINUTE, d.requests_per_minute)?
                .max(1),
            failure_threshold: self
                .get_parsed(config_keys::GUARD_FAILURE_THRESHOLD, d.failure_threshold)?
                .max(1),
            cooldown_ms: self.get_parsed(config_keys::GUARD_COOLDOWN_MS, d.cooldown_ms)?,
        })
    }

    async fn get_run_params(&self) -> ConfigResult<RunParams> {
        let d = RunParams::default();
        Ok(RunParams {
            timeout_ms: self.get_parsed(config_keys::RUN_TIMEOUT_MS, d.timeout_ms)?.max(1),
            worker_pool_size: self
                .get_parsed(config_keys::RUN_WORKER_POOL_SIZE, d.worker_pool_size)?
                .max(1),
            external_retry_attempts: self
                .get_parsed(config_keys::RUN_EXTERNAL_RETRY_ATTEMPTS, d.external_retry_attempts)?,
            retry_base_delay_ms: self
                .get_parsed(config_keys::RUN_RETRY_BASE_DELAY_MS, d.retry_base_delay_ms)?,
            retry_max_delay_ms: self
                .get_parsed(config_keys::RUN_RETRY_MAX_DELAY_MS, d.retry_max_delay_ms)?,
        })
    }

    async fn get_tuning_override(&self, account_id: &str) -> ConfigResult<Option<TuningOverride>> {
        let id = account_id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        let key = format!("{}{}", config_keys::TUNING_OVERRIDE_PREFIX, id);
        let raw = match self.get_config_value(&key)? {
            Some(v) => v,
            None => return Ok(None),
        };

        match serde_json::from_str::<TuningOverride>(&raw) {
            Ok(o) => Ok(Some(o)),
            Err(e) => {
                tracing::warn!(config_key = %key, error = %e, "账号覆写配置解析失败，忽略");
                Ok(None)
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 趋势融合
    pub const FUSION_SATURATION_WEIGHTS: &str = "fusion_saturation_weights";
    pub const FUSION_OPPORTUNITY_WEIGHTS: &str = "fusion_opportunity_weights";
    pub const FUSION_MIN_SIGNIFICANT_SENDS: &str = "fusion_min_significant_sends";
    pub const FUSION_DIVERGENCE_TOLERANCE: &str = "fusion_divergence_tolerance";
    pub const FUSION_BENCHMARK_OPEN_RATE: &str = "fusion_benchmark_open_rate";
    pub const FUSION_BENCHMARK_REVENUE_PER_SEND: &str = "fusion_benchmark_revenue_per_send";
    pub const FUSION_SATURATION_SENDS_PER_DAY: &str = "fusion_saturation_sends_per_day";

    // 发送量
    pub const ELASTICITY_CAP_PCT: &str = "elasticity_cap_pct";
    pub const SATURATION_BRAKE: &str = "saturation_brake";
    pub const SATURATION_HARD_BRAKE: &str = "saturation_hard_brake";
    pub const ACCELERATE_THRESHOLD: &str = "accelerate_threshold";
    pub const DOUBLE_STEP_THRESHOLD: &str = "double_step_threshold";
    pub const MAX_WEEKLY_PER_CATEGORY: &str = "max_weekly_per_category";

    // 内容新鲜度
    pub const FRESHNESS_RECENCY_WEIGHT: &str = "freshness_recency_weight";
    pub const FRESHNESS_PERFORMANCE_WEIGHT: &str = "freshness_performance_weight";
    pub const FRESHNESS_HORIZON_DAYS: &str = "freshness_horizon_days";
    pub const CONTENT_MIN_REST_HOURS: &str = "content_min_rest_hours";

    // 发送时间
    pub const TIMING_MIN_SPACING_MINUTES: &str = "timing_min_spacing_minutes";
    pub const TIMING_WINDOW_START: &str = "timing_window_start"; // HH:MM
    pub const TIMING_WINDOW_END: &str = "timing_window_end"; // HH:MM
    pub const TIMING_GRANULARITY_MINUTES: &str = "timing_granularity_minutes";
    pub const TIMING_MAX_RETRIES: &str = "timing_max_retries";

    // 跟进
    pub const FOLLOWUP_MAX_PER_DAY: &str = "followup_max_per_day";
    pub const FOLLOWUP_MIN_DELAY_MINUTES: &str = "followup_min_delay_minutes";

    // 限流/熔断
    pub const GUARD_REQUESTS_PER_MINUTE: &str = "guard_requests_per_minute";
    pub const GUARD_FAILURE_THRESHOLD: &str = "guard_failure_threshold";
    pub const GUARD_COOLDOWN_MS: &str = "guard_cooldown_ms";

    // 运行控制
    pub const RUN_TIMEOUT_MS: &str = "run_timeout_ms";
    pub const RUN_WORKER_POOL_SIZE: &str = "run_worker_pool_size";
    pub const RUN_EXTERNAL_RETRY_ATTEMPTS: &str = "run_external_retry_attempts";
    pub const RUN_RETRY_BASE_DELAY_MS: &str = "run_retry_base_delay_ms";
    pub const RUN_RETRY_MAX_DELAY_MS: &str = "run_retry_max_delay_ms";

    // 账号覆写 (JSON)
    pub const TUNING_OVERRIDE_PREFIX: &str = "tuning_override/";
}
