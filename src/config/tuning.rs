// ==========================================
// 创作者发送排期系统 - 流水线调参参数
// ==========================================
// 说明: 融合权重 / 弹性上限 / 星期归一化等均为产品调优常量,
//       这里作为可配置参数, Default 即文档默认值
// ==========================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ==========================================
// FusionParams - 趋势融合
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionParams {
    /// 饱和度窗口权重 7/14/30（偏向短窗口, 响应快）
    pub saturation_weights: [f64; 3],
    /// 机会度窗口权重 7/14/30（偏向长窗口, 稳定）
    pub opportunity_weights: [f64; 3],
    /// 最小显著发送量, 低于此值置信度线性下降
    pub min_significant_sends: u32,
    /// 窗口间饱和度分歧容差
    pub divergence_tolerance: f64,
    pub benchmark_open_rate: f64,
    pub benchmark_revenue_per_send: f64,
    /// 日发送量达到该值视为无余量
    pub saturation_sends_per_day: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            saturation_weights: [0.5, 0.3, 0.2],
            opportunity_weights: [0.2, 0.3, 0.5],
            min_significant_sends: 100,
            divergence_tolerance: 15.0,
            benchmark_open_rate: 0.30,
            benchmark_revenue_per_send: 20.0,
            saturation_sends_per_day: 10.0,
        }
    }
}

// ==========================================
// VolumeParams - 发送量优化
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeParams {
    /// 单次运行周总量最大增幅（相对上一周期）
    pub elasticity_cap_pct: f64,
    /// 饱和度达到该值降一档
    pub saturation_brake: f64,
    /// 饱和度达到该值降两档
    pub saturation_hard_brake: f64,
    /// 机会度-饱和度 差值达到该值升一档
    pub accelerate_threshold: f64,
    /// 差值达到该值升两档
    pub double_step_threshold: f64,
    /// 单类别周总量上限
    pub max_weekly_per_category: u32,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            elasticity_cap_pct: 0.25,
            saturation_brake: 70.0,
            saturation_hard_brake: 85.0,
            accelerate_threshold: 20.0,
            double_step_threshold: 50.0,
            max_weekly_per_category: 84,
        }
    }
}

// ==========================================
// FreshnessParams - 内容新鲜度
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessParams {
    pub recency_weight: f64,
    pub performance_weight: f64,
    /// 超过该天数未使用视为完全新鲜
    pub freshness_horizon_days: u32,
    /// 复用前最少间隔小时数
    pub min_rest_hours: u32,
}

impl Default for FreshnessParams {
    fn default() -> Self {
        Self {
            recency_weight: 0.6,
            performance_weight: 0.4,
            freshness_horizon_days: 30,
            min_rest_hours: 24,
        }
    }
}

// ==========================================
// TimingParams - 发送时间
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingParams {
    /// 同日非跟进槽位最小间隔（分钟）
    pub min_spacing_minutes: u32,
    /// 发送窗口（当日分钟数, 含两端）
    pub window_start_minute: u32,
    pub window_end_minute: u32,
    /// 候选时间粒度（分钟）
    pub granularity_minutes: u32,
    /// 间隔冲突时的最大丢槽重试次数
    pub max_retries: u32,
    /// 无小时历史时使用的通用时段权重
    pub generic_hour_weights: [f64; 24],
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            min_spacing_minutes: 60,
            window_start_minute: 8 * 60,
            window_end_minute: 23 * 60 + 45,
            granularity_minutes: 15,
            max_retries: 3,
            generic_hour_weights: [
                0.1, 0.05, 0.02, 0.01, 0.01, 0.02, 0.05, 0.1, // 00-07
                0.3, 0.35, 0.4, 0.45, 0.6, 0.5, 0.4, 0.4, // 08-15
                0.45, 0.55, 0.65, 0.85, 0.95, 1.0, 0.9, 0.6, // 16-23
            ],
        }
    }
}

// ==========================================
// FollowupParams - 跟进
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupParams {
    pub max_per_day: u32,
    pub min_delay_minutes: u32,
}

impl Default for FollowupParams {
    fn default() -> Self {
        Self {
            max_per_day: 4,
            min_delay_minutes: 20,
        }
    }
}

// ==========================================
// GuardParams - 限流/熔断
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardParams {
    pub requests_per_minute: u32,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for GuardParams {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

// ==========================================
// RunParams - 运行控制
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub timeout_ms: u64,
    pub worker_pool_size: usize,
    pub external_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            timeout_ms: 90_000,
            worker_pool_size: 4,
            external_retry_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 2_000,
        }
    }
}

impl RunParams {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ==========================================
// PipelineTuning - 全部调参汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineTuning {
    pub fusion: FusionParams,
    pub volume: VolumeParams,
    pub freshness: FreshnessParams,
    pub timing: TimingParams,
    pub followup: FollowupParams,
    pub guard: GuardParams,
    pub run: RunParams,
}
