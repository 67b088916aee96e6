// ==========================================
// 创作者发送排期系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 单账号单周的自适应发送量与排期流水线
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 流水线阶段与编排
pub mod engine;

// 配置层 - 调参读取与账号级覆写
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能埋点（阶段耗时 / SQL 计数）
pub mod perf;

// API 层 - 对外调用入口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{Horizon, PageType, SendCategory, VolumeLevel};

// 领域实体
pub use domain::{
    Account, ContentItem, LegacyVolumeView, PerformanceSnapshot, PerformanceWindow, PipelineWarning,
    ScheduleDraft, ScheduleSlot, ScheduleTemplate, SendTypeDefinition, SendTypeKey,
    ValidationReport, Violation, ViolationKind, VolumeConfig,
};

// 引擎
pub use engine::{
    PipelineError, PipelineOrchestrator, PipelineRepositories, RateCircuitGuard, ScheduleOutcome,
    VolumeOutcome,
};

// API
pub use api::{ApiError, ApiResult, FailureReport, ScheduleApi};

// ==========================================
// 系统常量
// ==========================================

/// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 系统名称
pub const APP_NAME: &str = "创作者发送排期系统";
