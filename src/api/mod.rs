// ==========================================
// 创作者发送排期系统 - API 层
// ==========================================
// 职责: 对外调用入口, 统一转换为结构化失败原因
// ==========================================

pub mod error;
pub mod schedule_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, FailureReport};
pub use schedule_api::{parse_week_start, BatchEntry, BatchRequest, ScheduleApi, TemplateDetail};
