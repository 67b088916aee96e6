// ==========================================
// 创作者发送排期系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合排期流水线所需的所有 Repository
// 目标: 编排器只接收一个仓储参数
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    AccountRepository, ContentRepository, PerformanceRepository, ScheduleRepository,
    SendTypeRepository, VolumeConfigRepository,
};

/// 排期流水线仓储集合
///
/// # 包含的仓储
/// - `account_repo`: 账号
/// - `performance_repo`: 历史表现快照
/// - `content_repo`: 内容池
/// - `send_type_repo`: 发送类型目录与废弃别名
/// - `volume_config_repo`: 发送量配置
/// - `schedule_repo`: 排期模板（原子提交）
#[derive(Clone)]
pub struct PipelineRepositories {
    pub account_repo: Arc<AccountRepository>,
    pub performance_repo: Arc<PerformanceRepository>,
    pub content_repo: Arc<ContentRepository>,
    pub send_type_repo: Arc<SendTypeRepository>,
    pub volume_config_repo: Arc<VolumeConfigRepository>,
    pub schedule_repo: Arc<ScheduleRepository>,
}

impl PipelineRepositories {
    /// 基于同一连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            account_repo: Arc::new(AccountRepository::new(conn.clone())),
            performance_repo: Arc::new(PerformanceRepository::new(conn.clone())),
            content_repo: Arc::new(ContentRepository::new(conn.clone())),
            send_type_repo: Arc::new(SendTypeRepository::new(conn.clone())),
            volume_config_repo: Arc::new(VolumeConfigRepository::new(conn.clone())),
            schedule_repo: Arc::new(ScheduleRepository::new(conn)),
        }
    }
}
