// ==========================================
// 创作者发送排期系统 - 引擎层
// ==========================================
// 职责: 实现排期流水线各阶段的业务规则, 不拼 SQL
// 红线: 每个阶段输入上一版草稿、输出新草稿; 非致命问题以告警形式输出
// ==========================================

pub mod content_selector;
pub mod error;
pub mod followup_linker;
pub mod guard;
pub mod key_resolver;
pub mod orchestrator;
pub mod quality_validator;
pub mod repositories;
pub mod retry;
pub mod send_type_allocator;
pub mod timing_optimizer;
pub mod trend_fuser;
pub mod volume_optimizer;

// 重导出核心引擎
pub use content_selector::ContentSelector;
pub use error::{EngineError, EngineResult};
pub use followup_linker::FollowupLinker;
pub use guard::{BreakerState, Clock, GuardError, GuardSnapshot, ManualClock, RateCircuitGuard, SystemClock};
pub use key_resolver::KeyResolver;
pub use orchestrator::{
    PipelineError, PipelineOrchestrator, PipelineResult, ScheduleOutcome, VolumeOutcome,
};
pub use quality_validator::{QualityValidator, ValidationContext};
pub use repositories::PipelineRepositories;
pub use retry::{BackoffStrategy, FailureKind, RetryPolicies, RetryPolicy};
pub use send_type_allocator::SendTypeAllocator;
pub use timing_optimizer::TimingOptimizer;
pub use trend_fuser::TrendFuser;
pub use volume_optimizer::{VolumeDecision, VolumeOptimizer};
