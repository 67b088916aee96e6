use crate::config::tuning::PipelineTuning;
use serde::{Deserialize, Serialize};

/// 账号级调参覆写（持久化对象）
///
/// 存储位置：config_kv（scope_id='global'，key='tuning_override/{account_id}'）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningOverride {
    /// 账号 ID
    pub account_id: String,

    /// 说明（可选）
    #[serde(default)]
    pub description: Option<String>,

    /// 参数（只覆写出现的字段）
    #[serde(default)]
    pub parameters: TuningOverrideParameters,
}

/// 可覆写的参数（轻量版：只开放运营常调的维度）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TuningOverrideParameters {
    /// 周总量最大增幅（0~1）
    #[serde(default)]
    pub elasticity_cap_pct: Option<f64>,

    /// 饱和度降档阈值
    #[serde(default)]
    pub saturation_brake: Option<f64>,

    /// 同日非跟进槽位最小间隔（分钟）
    #[serde(default)]
    pub min_spacing_minutes: Option<u32>,

    /// 每日跟进上限
    #[serde(default)]
    pub max_followups_per_day: Option<u32>,

    /// 跟进最小延迟（分钟）
    #[serde(default)]
    pub followup_min_delay_minutes: Option<u32>,

    /// 内容复用前最少间隔小时数
    #[serde(default)]
    pub min_rest_hours: Option<u32>,
}

impl TuningOverride {
    /// 将覆写合并到全局参数上（越界值忽略）
    pub fn apply_to(&self, tuning: &mut PipelineTuning) {
        let p = &self.parameters;
        if let Some(v) = p.elasticity_cap_pct.filter(|v| v.is_finite() && *v >= 0.0) {
            tuning.volume.elasticity_cap_pct = v;
        }
        if let Some(v) = p.saturation_brake.filter(|v| (0.0..=100.0).contains(v)) {
            tuning.volume.saturation_brake = v;
        }
        if let Some(v) = p.min_spacing_minutes.filter(|v| *v > 0) {
            tuning.timing.min_spacing_minutes = v;
        }
        if let Some(v) = p.max_followups_per_day {
            tuning.followup.max_per_day = v;
        }
        if let Some(v) = p.followup_min_delay_minutes.filter(|v| *v > 0) {
            tuning.followup.min_delay_minutes = v;
        }
        if let Some(v) = p.min_rest_hours {
            tuning.freshness.min_rest_hours = v;
        }
    }
}
