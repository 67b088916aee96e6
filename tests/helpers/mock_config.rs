// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use async_trait::async_trait;
use creator_send_aps::config::{
    ConfigResult, FollowupParams, FreshnessParams, FusionParams, GuardParams, PipelineConfigReader,
    PipelineTuning, RunParams, TimingParams, TuningOverride, VolumeParams,
};

/// Mock 配置结构（直接持有一份完整调参）
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub tuning: PipelineTuning,
    pub overrides: Vec<TuningOverride>,
}

impl MockConfig {
    /// 测试默认: 外部依赖不重试, 避免真实 sleep
    pub fn new() -> Self {
        let mut tuning = PipelineTuning::default();
        tuning.run.external_retry_attempts = 0;
        Self {
            tuning,
            overrides: Vec::new(),
        }
    }

    /// 运行时限（毫秒）
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.tuning.run.timeout_ms = timeout_ms;
        self
    }

    /// 外部依赖重试（次数 + 固定退避）
    pub fn with_external_retries(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.tuning.run.external_retry_attempts = attempts;
        self.tuning.run.retry_base_delay_ms = delay_ms;
        self.tuning.run.retry_max_delay_ms = delay_ms;
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.tuning.run.worker_pool_size = size;
        self
    }

    /// 发送窗口（当日分钟数）
    pub fn with_send_window(mut self, start_minute: u32, end_minute: u32) -> Self {
        self.tuning.timing.window_start_minute = start_minute;
        self.tuning.timing.window_end_minute = end_minute;
        self
    }

    pub fn with_timing_retries(mut self, max_retries: u32) -> Self {
        self.tuning.timing.max_retries = max_retries;
        self
    }

    pub fn with_override(mut self, o: TuningOverride) -> Self {
        self.overrides.push(o);
        self
    }
}

#[async_trait]
impl PipelineConfigReader for MockConfig {
    async fn get_fusion_params(&self) -> ConfigResult<FusionParams> {
        Ok(self.tuning.fusion.clone())
    }

    async fn get_volume_params(&self) -> ConfigResult<VolumeParams> {
        Ok(self.tuning.volume.clone())
    }

    async fn get_freshness_params(&self) -> ConfigResult<FreshnessParams> {
        Ok(self.tuning.freshness.clone())
    }

    async fn get_timing_params(&self) -> ConfigResult<TimingParams> {
        Ok(self.tuning.timing.clone())
    }

    async fn get_followup_params(&self) -> ConfigResult<FollowupParams> {
        Ok(self.tuning.followup.clone())
    }

    async fn get_guard_params(&self) -> ConfigResult<GuardParams> {
        Ok(self.tuning.guard.clone())
    }

    async fn get_run_params(&self) -> ConfigResult<RunParams> {
        Ok(self.tuning.run.clone())
    }

    async fn get_tuning_override(&self, account_id: &str) -> ConfigResult<Option<TuningOverride>> {
        Ok(self
            .overrides
            .iter()
            .find(|o| o.account_id == account_id)
            .cloned())
    }
}
