// ==========================================
// 创作者发送排期系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod account;
pub mod content;
pub mod performance;
pub mod schedule;
pub mod send_type;
pub mod types;
pub mod volume;

// 重导出核心类型
pub use account::Account;
pub use content::ContentItem;
pub use performance::{FusedScore, PerformanceSnapshot, PerformanceWindow};
pub use schedule::{
    CaptionPoolWarning, PipelineWarning, ScheduleDraft, ScheduleSlot, ScheduleTemplate,
    ValidationReport, Violation, ViolationKind,
};
pub use send_type::{DeprecatedAlias, SendTypeDefinition, SendTypeKey, SendTypeRecord};
pub use types::{CategoryCounts, Horizon, PageRestriction, PageType, SendCategory, VolumeLevel};
pub use volume::{LegacyVolumeView, VolumeConfig};
