// ==========================================
// 创作者发送排期系统 - API层错误类型
// ==========================================
// 职责: 将仓储/引擎/流水线错误转换为调用方可理解的结构化失败
// 红线: 每个终止性失败都必须带 kind + 可读原因 + 相关实体ID
// ==========================================

use crate::domain::schedule::{PipelineWarning, Violation};
use crate::engine::error::EngineError;
use crate::engine::guard::GuardError;
use crate::engine::orchestrator::PipelineError;
use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误（立即拒绝, 不执行流水线）
    // ==========================================
    #[error("无效输入: {message}")]
    InvalidInput {
        message: String,
        entity_ids: Vec<String>,
    },

    #[error("资源未找到: {entity}(id={id})")]
    NotFound { entity: String, id: String },

    #[error("发送类型 {key} 已于 {removed_after} 之后移除, 请改用 {canonical}")]
    DeprecatedKeyRemoved {
        key: String,
        canonical: String,
        removed_after: NaiveDate,
    },

    #[error("未知发送类型: {0}")]
    UnknownSendTypeKey(String),

    // ==========================================
    // 外部依赖错误（可重试）
    // ==========================================
    #[error("外部依赖不可用: {message}")]
    DependencyUnavailable {
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("运行超时: 阶段 {stage}, 时限 {timeout_ms}ms")]
    Timeout {
        stage: String,
        timeout_ms: u64,
        warnings: Vec<PipelineWarning>,
    },

    // ==========================================
    // 约束/校验错误（终止）
    // ==========================================
    #[error("约束无法满足: {message}")]
    Infeasible {
        message: String,
        entity_ids: Vec<String>,
        warnings: Vec<PipelineWarning>,
    },

    #[error("质量校验未通过: {} 项违规", .violations.len())]
    ValidationFailed {
        violations: Vec<Violation>,
        warnings: Vec<PipelineWarning>,
    },

    // ==========================================
    // 数据访问 / 通用错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 失败类别（稳定字符串, 供调用方分支）
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput { .. } => "INVALID_INPUT",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::DeprecatedKeyRemoved { .. } => "DEPRECATED_KEY_REMOVED",
            ApiError::UnknownSendTypeKey(_) => "UNKNOWN_SEND_TYPE_KEY",
            ApiError::DependencyUnavailable { .. } => "DEPENDENCY_UNAVAILABLE",
            ApiError::Timeout { .. } => "TIMEOUT",
            ApiError::Infeasible { .. } => "INFEASIBLE",
            ApiError::ValidationFailed { .. } => "VALIDATION_FAILED",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ConfigError(_) => "CONFIG_ERROR",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// 相关实体ID
    pub fn entity_ids(&self) -> Vec<String> {
        match self {
            ApiError::InvalidInput { entity_ids, .. } | ApiError::Infeasible { entity_ids, .. } => {
                entity_ids.clone()
            }
            ApiError::NotFound { id, .. } => vec![id.clone()],
            ApiError::DeprecatedKeyRemoved { key, .. } => vec![key.clone()],
            ApiError::UnknownSendTypeKey(key) => vec![key.clone()],
            ApiError::ValidationFailed { violations, .. } => {
                let mut ids: Vec<String> = violations
                    .iter()
                    .flat_map(|v| v.entity_ids.iter().cloned())
                    .collect();
                ids.sort();
                ids.dedup();
                ids
            }
            _ => Vec::new(),
        }
    }

    /// 终止前已累积的流水线告警
    pub fn warnings(&self) -> &[PipelineWarning] {
        match self {
            ApiError::Timeout { warnings, .. }
            | ApiError::Infeasible { warnings, .. }
            | ApiError::ValidationFailed { warnings, .. } => warnings.as_slice(),
            _ => &[],
        }
    }

    /// 附加中止前的告警（仅运行期失败携带告警）
    fn with_warnings(mut self, carried: Vec<PipelineWarning>) -> Self {
        match &mut self {
            ApiError::Timeout { warnings, .. }
            | ApiError::Infeasible { warnings, .. }
            | ApiError::ValidationFailed { warnings, .. } => *warnings = carried,
            _ => {}
        }
        self
    }

    /// 调用方是否可以原样重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::DependencyUnavailable { .. } | ApiError::Timeout { .. }
        )
    }

    /// 转换为可序列化的失败报告
    pub fn to_report(&self) -> FailureReport {
        FailureReport {
            kind: self.kind().to_string(),
            detail: self.to_string(),
            entity_ids: self.entity_ids(),
            retryable: self.is_retryable(),
            violations: match self {
                ApiError::ValidationFailed { violations, .. } => violations.clone(),
                _ => Vec::new(),
            },
            warnings: self.warnings().to_vec(),
        }
    }
}

// ==========================================
// FailureReport - 结构化失败原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: String,
    pub detail: String,
    pub entity_ids: Vec<String>,
    pub retryable: bool,
    /// 仅校验失败时非空, 原样返回
    pub violations: Vec<Violation>,
    /// 中止前已产生的告警（如被丢弃的槽位）
    #[serde(default)]
    pub warnings: Vec<PipelineWarning>,
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        if err.is_transient() {
            return ApiError::DependencyUnavailable {
                message: err.to_string(),
                retry_after_ms: None,
            };
        }
        match err {
            RepositoryError::NotFound { entity, id } => ApiError::NotFound { entity, id },
            RepositoryError::FieldValueError { field, message } => ApiError::InvalidInput {
                message: format!("字段{}错误: {}", field, message),
                entity_ids: Vec::new(),
            },
            RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg) => ApiError::DatabaseError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::RateLimited { retry_after_ms } | GuardError::CircuitOpen { retry_after_ms } => {
                ApiError::DependencyUnavailable {
                    message: err.to_string(),
                    retry_after_ms: Some(retry_after_ms),
                }
            }
            GuardError::Store(e) => e.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::DeprecatedKeyRemoved {
                key,
                canonical,
                removed_after,
            } => ApiError::DeprecatedKeyRemoved {
                key,
                canonical,
                removed_after,
            },
            EngineError::UnknownSendTypeKey(key) => ApiError::UnknownSendTypeKey(key),
            EngineError::Cancelled { stage } => ApiError::Timeout {
                stage,
                timeout_ms: 0,
                warnings: Vec::new(),
            },
            EngineError::InsufficientData { ref account_id } => ApiError::Infeasible {
                entity_ids: vec![account_id.clone()],
                message: err.to_string(),
                warnings: Vec::new(),
            },
            EngineError::AllocationInfeasible { date, .. } | EngineError::TimingConflict { date, .. } => {
                ApiError::Infeasible {
                    message: err.to_string(),
                    entity_ids: vec![date.to_string()],
                    warnings: Vec::new(),
                }
            }
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidInput {
                message,
                entity_ids,
            } => ApiError::InvalidInput {
                message,
                entity_ids,
            },
            PipelineError::Dependency(e) => e.into(),
            PipelineError::Aborted { error, warnings } => ApiError::from(error).with_warnings(warnings),
            PipelineError::ValidationFailed { report, warnings } => ApiError::ValidationFailed {
                violations: report.violations,
                warnings,
            },
            PipelineError::Timeout {
                stage,
                timeout_ms,
                warnings,
            } => ApiError::Timeout {
                stage,
                timeout_ms,
                warnings,
            },
            PipelineError::Config(msg) => ApiError::ConfigError(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
