// ==========================================
// 创作者发送排期系统 - 引擎层错误类型
// ==========================================
// 说明: 约束不可满足类错误由编排器做阶段内恢复
//       (丢配额/丢槽位 + 告警), 恢复失败才升级为致命错误
// ==========================================

use crate::domain::schedule::PipelineWarning;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 全部统计窗口均无发送记录
    #[error("历史数据不足: account_id={account_id}")]
    InsufficientData { account_id: String },

    /// 当日该类别不存在兼容发送类型
    #[error("无兼容发送类型: date={date}, category={category}, page_type={page_type}")]
    AllocationInfeasible {
        date: NaiveDate,
        category: String,
        page_type: String,
    },

    /// 最小间隔无法满足当日槽位数
    #[error("发送时间冲突: date={date}, 槽位数={slot_count}, 可用时间点={available}")]
    TimingConflict {
        date: NaiveDate,
        slot_count: usize,
        available: usize,
    },

    /// 废弃别名已过宽限期
    #[error("发送类型 {key} 已于 {removed_after} 之后移除, 请改用 {canonical}")]
    DeprecatedKeyRemoved {
        key: String,
        canonical: String,
        removed_after: NaiveDate,
    },

    #[error("未知发送类型: {0}")]
    UnknownSendTypeKey(String),

    /// 阶段间检查到运行已超时
    #[error("运行已取消: 阶段 {stage} 前超过截止时间")]
    Cancelled { stage: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// 阶段中止: 致命错误 + 中止前已累积的告警
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct StageAbort {
    pub error: EngineError,
    pub warnings: Vec<PipelineWarning>,
}

impl StageAbort {
    pub fn new(error: EngineError, warnings: Vec<PipelineWarning>) -> Self {
        Self { error, warnings }
    }
}

impl From<EngineError> for StageAbort {
    fn from(error: EngineError) -> Self {
        Self::new(error, Vec::new())
    }
}
