// ==========================================
// 创作者发送排期系统 - 流水线配置读取 Trait
// ==========================================
// 职责: 定义流水线各阶段所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::tuning::{
    FollowupParams, FreshnessParams, FusionParams, GuardParams, PipelineTuning, RunParams,
    TimingParams, VolumeParams,
};
use crate::config::tuning_override::TuningOverride;
use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// PipelineConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）; 测试中使用 Mock
#[async_trait]
pub trait PipelineConfigReader: Send + Sync {
    /// 趋势融合参数
    async fn get_fusion_params(&self) -> ConfigResult<FusionParams>;

    /// 发送量优化参数（弹性上限默认 25%）
    async fn get_volume_params(&self) -> ConfigResult<VolumeParams>;

    /// 内容新鲜度参数
    async fn get_freshness_params(&self) -> ConfigResult<FreshnessParams>;

    /// 发送时间参数（最小间隔默认 60 分钟）
    async fn get_timing_params(&self) -> ConfigResult<TimingParams>;

    /// 跟进参数（默认每日最多 4 条, 延迟至少 20 分钟）
    async fn get_followup_params(&self) -> ConfigResult<FollowupParams>;

    /// 限流/熔断参数
    async fn get_guard_params(&self) -> ConfigResult<GuardParams>;

    /// 运行控制参数（超时默认 90 秒）
    async fn get_run_params(&self) -> ConfigResult<RunParams>;

    /// 账号级覆写（不存在返回 None）
    async fn get_tuning_override(&self, account_id: &str) -> ConfigResult<Option<TuningOverride>>;

    /// 汇总账号生效参数
    ///
    /// # 逻辑
    /// 1. 读取各组全局参数
    /// 2. 若存在账号级覆写, 合并到全局参数之上
    async fn load_tuning(&self, account_id: &str) -> ConfigResult<PipelineTuning> {
        let mut tuning = PipelineTuning {
            fusion: self.get_fusion_params().await?,
            volume: self.get_volume_params().await?,
            freshness: self.get_freshness_params().await?,
            timing: self.get_timing_params().await?,
            followup: self.get_followup_params().await?,
            guard: self.get_guard_params().await?,
            run: self.get_run_params().await?,
        };

        if let Some(o) = self.get_tuning_override(account_id).await? {
            o.apply_to(&mut tuning);
        }

        Ok(tuning)
    }
}
