// ==========================================
// 创作者发送排期系统 - 流水线编排器
// ==========================================
// 用途: 按固定顺序协调七个阶段, 单账号单周运行
// 红线:
// - 外部数据在步骤1一次性读取, 后续阶段不得重读
// - 每个阶段输入上一版草稿并返回新草稿
// - 校验未通过的草稿不得持久化
// - 超时后不持久化任何内容
// ==========================================

use crate::config::{PipelineConfigReader, PipelineTuning};
use crate::domain::account::Account;
use crate::domain::content::ContentItem;
use crate::domain::performance::PerformanceSnapshot;
use crate::domain::schedule::{
    PipelineWarning, ScheduleDraft, ScheduleTemplate, ValidationReport,
};
use crate::domain::send_type::{DeprecatedAlias, SendTypeDefinition, SendTypeRecord};
use crate::domain::types::VolumeLevel;
use crate::domain::volume::VolumeConfig;
use crate::engine::content_selector::ContentSelector;
use crate::engine::error::{EngineError, StageAbort};
use crate::engine::followup_linker::FollowupLinker;
use crate::engine::guard::{GuardError, RateCircuitGuard};
use crate::engine::key_resolver::KeyResolver;
use crate::engine::quality_validator::{QualityValidator, ValidationContext};
use crate::engine::repositories::PipelineRepositories;
use crate::engine::retry::{retry_async, FailureKind, RetryPolicies};
use crate::engine::send_type_allocator::SendTypeAllocator;
use crate::engine::timing_optimizer::TimingOptimizer;
use crate::engine::trend_fuser::TrendFuser;
use crate::engine::volume_optimizer::{VolumeDecision, VolumeOptimizer};
use crate::perf::StageTimer;
use crate::repository::{RepositoryResult, ScheduleCommit};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

// ==========================================
// PipelineError - 运行级错误
// ==========================================
#[derive(Error, Debug)]
pub enum PipelineError {
    /// 输入错误（账号未启用等）, 不执行任何阶段
    #[error("输入错误: {message}")]
    InvalidInput {
        message: String,
        entity_ids: Vec<String>,
    },

    /// 外部依赖错误（存储/限流/熔断）
    #[error(transparent)]
    Dependency(#[from] GuardError),

    /// 阶段内无法恢复的约束错误, 附中止前已累积的告警
    #[error("{error}")]
    Aborted {
        error: EngineError,
        warnings: Vec<PipelineWarning>,
    },

    /// 质量校验未通过（终止, 违规原样返回）
    #[error("质量校验未通过: {} 项违规", .report.violations.len())]
    ValidationFailed {
        report: ValidationReport,
        warnings: Vec<PipelineWarning>,
    },

    /// 超过单次运行时限
    #[error("运行超时: 阶段 {stage}, 时限 {timeout_ms}ms")]
    Timeout {
        stage: String,
        timeout_ms: u64,
        warnings: Vec<PipelineWarning>,
    },

    #[error("配置读取失败: {0}")]
    Config(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<StageAbort> for PipelineError {
    fn from(abort: StageAbort) -> Self {
        PipelineError::Aborted {
            error: abort.error,
            warnings: abort.warnings,
        }
    }
}

impl From<EngineError> for PipelineError {
    fn from(error: EngineError) -> Self {
        StageAbort::from(error).into()
    }
}

// ==========================================
// 运行结果
// ==========================================

/// 发送量配置计算结果
#[derive(Debug, Clone, Serialize)]
pub struct VolumeOutcome {
    pub config: VolumeConfig,
    pub baseline_level: VolumeLevel,
    pub level_step: i32,
    pub warnings: Vec<PipelineWarning>,
}

/// 排期生成结果
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutcome {
    pub template: ScheduleTemplate,
    pub draft: ScheduleDraft,
    pub volume: VolumeOutcome,
}

impl ScheduleOutcome {
    pub fn warnings(&self) -> &[PipelineWarning] {
        &self.draft.warnings
    }
}

/// 步骤1读取的运行快照
struct RunInputs {
    account: Account,
    snapshot: PerformanceSnapshot,
    prior: Option<VolumeConfig>,
    pool: Vec<ContentItem>,
    records: Vec<SendTypeRecord>,
    aliases: Vec<DeprecatedAlias>,
}

/// 已校验、待提交的排期
struct PlannedSchedule {
    draft: ScheduleDraft,
    volume: VolumeOutcome,
}

// ==========================================
// PipelineOrchestrator - 流水线编排器
// ==========================================
pub struct PipelineOrchestrator<C>
where
    C: PipelineConfigReader,
{
    config: Arc<C>,
    repos: PipelineRepositories,
    guard: Arc<RateCircuitGuard>,
    fuser: TrendFuser,
    optimizer: VolumeOptimizer,
    allocator: SendTypeAllocator,
    selector: ContentSelector,
    timing: TimingOptimizer,
    linker: FollowupLinker,
    validator: QualityValidator,
}

impl<C> PipelineOrchestrator<C>
where
    C: PipelineConfigReader,
{
    /// 创建编排器
    ///
    /// # 参数
    /// - config: 配置读取器
    /// - repos: 仓储集合
    /// - guard: 进程级限流/熔断守卫（与其他运行共享）
    pub fn new(config: Arc<C>, repos: PipelineRepositories, guard: Arc<RateCircuitGuard>) -> Self {
        Self {
            config,
            repos,
            guard,
            fuser: TrendFuser::new(),
            optimizer: VolumeOptimizer::new(),
            allocator: SendTypeAllocator::new(),
            selector: ContentSelector::new(),
            timing: TimingOptimizer::new(),
            linker: FollowupLinker::new(),
            validator: QualityValidator::new(),
        }
    }

    pub fn config(&self) -> &Arc<C> {
        &self.config
    }

    pub fn guard(&self) -> &Arc<RateCircuitGuard> {
        &self.guard
    }

    pub fn repos(&self) -> &PipelineRepositories {
        &self.repos
    }

    /// 生成账号一周排期并持久化
    ///
    /// # 参数
    /// - account_id: 账号ID
    /// - week_start: 周起始日
    /// - now: 运行时刻（别名宽限期判定、created_at）
    ///
    /// # 返回
    /// - `Ok(ScheduleOutcome)`: 已提交的模板 + 最终草稿 + 告警
    /// - `Err(PipelineError)`: 首个致命错误; 未写入任何数据
    #[instrument(skip_all, fields(account_id = %account_id, week_start = %week_start))]
    pub async fn generate(
        &self,
        account_id: &str,
        week_start: NaiveDate,
        now: NaiveDateTime,
    ) -> PipelineResult<ScheduleOutcome> {
        let _timer = StageTimer::timing_only("generate_schedule");
        let tuning = self.load_tuning(account_id).await?;
        let policies = RetryPolicies::from_params(&tuning.timing, &tuning.run);
        let timeout = tuning.run.timeout();
        let deadline = Instant::now() + timeout;

        info!(timeout_ms = tuning.run.timeout_ms, "开始执行排期流水线");

        let timeout_ms = tuning.run.timeout_ms;
        let planned = match tokio::time::timeout(
            timeout,
            self.plan(account_id, week_start, now, &tuning, &policies, deadline),
        )
        .await
        {
            Ok(Ok(planned)) => planned,
            Ok(Err(PipelineError::Aborted {
                error: EngineError::Cancelled { stage },
                warnings,
            })) => {
                return Err(PipelineError::Timeout {
                    stage,
                    timeout_ms,
                    warnings,
                });
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(timeout_ms, "流水线超时, 丢弃草稿");
                return Err(PipelineError::Timeout {
                    stage: "plan".to_string(),
                    timeout_ms,
                    warnings: Vec::new(),
                });
            }
        };

        // ==========================================
        // 步骤9: 原子提交
        // ==========================================
        if let Err(abort) = check_deadline(deadline, "commit", &planned.draft.warnings) {
            return Err(PipelineError::Timeout {
                stage: "commit".to_string(),
                timeout_ms,
                warnings: abort.warnings,
            });
        }
        debug!("步骤9: 提交排期");

        let template_id = uuid::Uuid::new_v4().to_string();
        let tuning_snapshot_json = serde_json::to_string(&tuning).ok();
        let commit = ScheduleCommit {
            template_id,
            draft: &planned.draft,
            volume_config: &planned.volume.config,
            tuning_snapshot_json,
            created_at: now,
        };
        // 提交及其重试受剩余时限约束; 单次事务要么整体落库要么整体回滚
        let remaining = deadline.saturating_duration_since(Instant::now());
        let template = match tokio::time::timeout(
            remaining,
            self.guarded(&policies, || self.repos.schedule_repo.commit(&commit)),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_ms, "提交阶段超时, 未写入排期");
                return Err(PipelineError::Timeout {
                    stage: "commit".to_string(),
                    timeout_ms,
                    warnings: planned.draft.warnings.clone(),
                });
            }
        };

        info!(
            template_id = %template.template_id,
            slot_count = template.slot_count,
            warnings = planned.draft.warnings.len(),
            "排期流水线完成"
        );

        Ok(ScheduleOutcome {
            template,
            draft: planned.draft,
            volume: planned.volume,
        })
    }

    /// 只计算发送量配置（步骤0-3）并替换已存配置
    #[instrument(skip_all, fields(account_id = %account_id))]
    pub async fn compute_volume(&self, account_id: &str, now: NaiveDateTime) -> PipelineResult<VolumeOutcome> {
        let _timer = StageTimer::timing_only("compute_volume");
        let tuning = self.load_tuning(account_id).await?;
        let policies = RetryPolicies::from_params(&tuning.timing, &tuning.run);

        let account = self.load_account(account_id, &policies).await?;
        let snapshot = self
            .guarded(&policies, || self.repos.performance_repo.load_snapshot(account_id))
            .await?;
        let prior = self
            .guarded(&policies, || self.repos.volume_config_repo.find_by_account(account_id))
            .await?;

        let outcome = self.volume_stage(&account, &snapshot, prior.as_ref(), &tuning, now);

        self.guarded(&policies, || self.repos.volume_config_repo.replace(&outcome.config))
            .await?;

        info!(
            volume_level = %outcome.config.volume_level,
            elasticity_capped = outcome.config.elasticity_capped,
            confidence = outcome.config.confidence,
            "发送量配置已更新"
        );
        Ok(outcome)
    }

    // ==========================================
    // 规划（步骤0-8, 不写库）
    // ==========================================
    async fn plan(
        &self,
        account_id: &str,
        week_start: NaiveDate,
        now: NaiveDateTime,
        tuning: &PipelineTuning,
        policies: &RetryPolicies,
        deadline: Instant,
    ) -> PipelineResult<PlannedSchedule> {
        // ==========================================
        // 步骤0/1: 输入校验 + 快照读取
        // ==========================================
        debug!("步骤1: 读取运行快照");
        let inputs = {
            let _t = StageTimer::timing_only("load_inputs");
            self.load_inputs(account_id, policies).await?
        };
        debug!(
            pool_size = inputs.pool.len(),
            send_types = inputs.records.len(),
            has_prior = inputs.prior.is_some(),
            "运行快照读取完成"
        );

        // ==========================================
        // 步骤2/3: 趋势融合 + 发送量优化
        // ==========================================
        check_deadline(deadline, "volume_optimization", &[])?;
        debug!("步骤2-3: 趋势融合与发送量优化");
        let volume = {
            let _t = StageTimer::new("volume_optimization");
            self.volume_stage(&inputs.account, &inputs.snapshot, inputs.prior.as_ref(), tuning, now)
        };

        let mut draft = ScheduleDraft::new(account_id, week_start);
        draft.warnings.extend(volume.warnings.iter().cloned());

        // ==========================================
        // 步骤4: 发送类型分配
        // ==========================================
        check_deadline(deadline, "send_type_allocation", &draft.warnings)?;
        debug!("步骤4: 发送类型分配");
        let resolver = KeyResolver::new(inputs.aliases.clone());
        let definitions: Vec<SendTypeDefinition> = resolver.resolve_catalog(&inputs.records, now.date());
        let draft = {
            let _t = StageTimer::new("send_type_allocation");
            self.allocator
                .allocate(&draft, &volume.config, &definitions, inputs.account.page_type)
        };
        info!(slot_count = draft.slots.len(), "发送类型分配完成");

        // ==========================================
        // 步骤5: 内容选择
        // ==========================================
        check_deadline(deadline, "content_selection", &draft.warnings)?;
        debug!("步骤5: 内容新鲜度选择");
        let draft = {
            let _t = StageTimer::new("content_selection");
            self.selector.select(&draft, &inputs.pool, &tuning.freshness)
        };

        // ==========================================
        // 步骤6: 时间优化
        // ==========================================
        check_deadline(deadline, "timing_optimization", &draft.warnings)?;
        debug!("步骤6: 发送时间优化");
        let draft = {
            let _t = StageTimer::new("timing_optimization");
            self.timing.optimize(
                &draft,
                &inputs.snapshot,
                &tuning.timing,
                policies.for_kind(FailureKind::TimingConflict),
            )?
        };

        // ==========================================
        // 步骤7: 跟进生成
        // ==========================================
        check_deadline(deadline, "followup_linking", &draft.warnings)?;
        debug!("步骤7: 跟进槽位生成");
        let mut draft = {
            let _t = StageTimer::new("followup_linking");
            self.linker.link(
                &draft,
                &definitions,
                &inputs.pool,
                &tuning.followup,
                &tuning.timing,
                &tuning.freshness,
            )
        };

        // ==========================================
        // 步骤8: 质量校验
        // ==========================================
        check_deadline(deadline, "quality_validation", &draft.warnings)?;
        debug!("步骤8: 质量校验");
        let report = {
            let _t = StageTimer::new("quality_validation");
            let ctx = ValidationContext {
                config: &volume.config,
                definitions: &definitions,
                page_type: inputs.account.page_type,
                pool: &inputs.pool,
                timing: &tuning.timing,
                followup: &tuning.followup,
                freshness: &tuning.freshness,
            };
            self.validator.validate(&draft, &ctx)
        };
        if !report.passed {
            return Err(PipelineError::ValidationFailed {
                report,
                warnings: draft.warnings,
            });
        }

        draft.validation = Some(report);
        draft.sort_chronologically();
        Ok(PlannedSchedule { draft, volume })
    }

    /// 步骤2/3: 融合 → 优化; 数据不足时走默认配置并告警
    fn volume_stage(
        &self,
        account: &Account,
        snapshot: &PerformanceSnapshot,
        prior: Option<&VolumeConfig>,
        tuning: &PipelineTuning,
        now: NaiveDateTime,
    ) -> VolumeOutcome {
        let mut warnings = Vec::new();

        let fused = match self
            .fuser
            .fuse(&account.account_id, &snapshot.windows, &tuning.fusion)
        {
            Ok(score) => {
                if score.divergence {
                    warnings.push(PipelineWarning::HorizonDivergence {
                        account_id: account.account_id.clone(),
                    });
                }
                Some(score)
            }
            Err(e) => {
                warn!(error = %e, "历史数据不足, 使用默认发送量配置");
                warnings.push(PipelineWarning::DataInsufficient {
                    account_id: account.account_id.clone(),
                    detail: e.to_string(),
                });
                None
            }
        };

        let VolumeDecision {
            config,
            baseline_level,
            level_step,
            ..
        } = self.optimizer.optimize(
            account,
            fused.as_ref(),
            prior,
            snapshot,
            &tuning.volume,
            now,
        );

        VolumeOutcome {
            config,
            baseline_level,
            level_step,
            warnings,
        }
    }

    async fn load_tuning(&self, account_id: &str) -> PipelineResult<PipelineTuning> {
        self.config
            .load_tuning(account_id)
            .await
            .map_err(|e| PipelineError::Config(e.to_string()))
    }

    async fn load_account(&self, account_id: &str, policies: &RetryPolicies) -> PipelineResult<Account> {
        let account = self
            .guarded(policies, || self.repos.account_repo.get(account_id))
            .await?;
        if !account.is_active {
            return Err(PipelineError::InvalidInput {
                message: format!("账号 {} 未启用", account_id),
                entity_ids: vec![account_id.to_string()],
            });
        }
        Ok(account)
    }

    async fn load_inputs(&self, account_id: &str, policies: &RetryPolicies) -> PipelineResult<RunInputs> {
        let account = self.load_account(account_id, policies).await?;
        let snapshot = self
            .guarded(policies, || self.repos.performance_repo.load_snapshot(account_id))
            .await?;
        let prior = self
            .guarded(policies, || self.repos.volume_config_repo.find_by_account(account_id))
            .await?;
        let pool = self
            .guarded(policies, || self.repos.content_repo.list_by_account(account_id))
            .await?;
        let records = self
            .guarded(policies, || self.repos.send_type_repo.list_records())
            .await?;
        let aliases = self
            .guarded(policies, || self.repos.send_type_repo.list_aliases())
            .await?;

        Ok(RunInputs {
            account,
            snapshot,
            prior,
            pool,
            records,
            aliases,
        })
    }

    /// 在守卫 + 外部依赖重试策略下执行存储调用
    async fn guarded<T, F>(&self, policies: &RetryPolicies, op: F) -> Result<T, GuardError>
    where
        F: Fn() -> RepositoryResult<T>,
    {
        let guard = &self.guard;
        let op = &op;
        retry_async(
            policies.for_kind(FailureKind::ExternalDependency),
            GuardError::is_retryable,
            move || async move { guard.call(op) },
        )
        .await
    }
}

/// 阶段间截止检查; 超时时携带当前草稿告警
fn check_deadline(deadline: Instant, stage: &str, warnings: &[PipelineWarning]) -> Result<(), StageAbort> {
    if Instant::now() >= deadline {
        warn!(stage, "超过运行时限, 终止流水线");
        let error = EngineError::Cancelled {
            stage: stage.to_string(),
        };
        return Err(StageAbort::new(error, warnings.to_vec()));
    }
    Ok(())
}
