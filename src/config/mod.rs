// ==========================================
// 创作者发送排期系统 - 配置层
// ==========================================
// 职责: 系统配置管理,支持账号级覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod pipeline_config_trait;
pub mod tuning;
pub mod tuning_override;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use pipeline_config_trait::{ConfigResult, PipelineConfigReader};
pub use tuning::{
    FollowupParams, FreshnessParams, FusionParams, GuardParams, PipelineTuning, RunParams,
    TimingParams, VolumeParams,
};
pub use tuning_override::{TuningOverride, TuningOverrideParameters};
