// ==========================================
// 创作者发送排期系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod account_repo;
pub mod content_repo;
pub mod error;
pub mod performance_repo;
pub mod row_utils;
pub mod schedule_repo;
pub mod send_type_repo;
pub mod volume_config_repo;

// 重导出核心仓储
pub use account_repo::AccountRepository;
pub use content_repo::ContentRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use performance_repo::PerformanceRepository;
pub use schedule_repo::{ScheduleCommit, ScheduleRepository};
pub use send_type_repo::SendTypeRepository;
pub use volume_config_repo::VolumeConfigRepository;
