// ==========================================
// 创作者发送排期系统 - 排期 API
// ==========================================
// 职责: 对外可调用的入口
// - 生成账号一周排期 / 计算发送量配置
// - 批量生成（每账号一个任务, 受 worker_pool_size 约束并发）
// - 发送类型 key 解析、旧版发送量读取、模板查询
// 红线: 所有存储访问都经过同一个限流/熔断守卫
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate, NaiveDateTime};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult, FailureReport};
use crate::config::{ConfigManager, PipelineConfigReader};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::schedule::{ScheduleDraft, ScheduleTemplate};
use crate::domain::send_type::SendTypeKey;
use crate::domain::volume::LegacyVolumeView;
use crate::engine::guard::RateCircuitGuard;
use crate::engine::key_resolver::KeyResolver;
use crate::engine::orchestrator::{PipelineOrchestrator, ScheduleOutcome, VolumeOutcome};
use crate::engine::repositories::PipelineRepositories;
use crate::repository::RepositoryError;

// ==========================================
// 请求 / 响应结构
// ==========================================

/// 批量生成中的单个请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub account_id: String,
    pub week_start: NaiveDate,
}

/// 批量生成中的单个结果（各账号相互独立）
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub account_id: String,
    pub week_start: NaiveDate,
    pub result: Result<ScheduleOutcome, FailureReport>,
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// 已提交模板 + 还原后的草稿
#[derive(Debug, Clone, Serialize)]
pub struct TemplateDetail {
    pub template: ScheduleTemplate,
    pub draft: ScheduleDraft,
}

// ==========================================
// ScheduleApi
// ==========================================
pub struct ScheduleApi<C>
where
    C: PipelineConfigReader,
{
    orchestrator: Arc<PipelineOrchestrator<C>>,
}

impl ScheduleApi<ConfigManager> {
    /// 打开数据库并组装完整调用链
    ///
    /// # 逻辑
    /// 1. 打开连接, 建表（幂等）并安装 SQL trace
    /// 2. ConfigManager 与全部仓储共享同一连接
    /// 3. 按 GuardParams 创建进程级守卫
    pub async fn open(db_path: &str) -> ApiResult<Self> {
        let mut conn = open_sqlite_connection(db_path).map_err(RepositoryError::from)?;
        init_schema(&conn).map_err(RepositoryError::from)?;
        crate::perf::install_sqlite_tracing(&mut conn);
        let conn = Arc::new(Mutex::new(conn));

        let config = ConfigManager::from_connection(conn.clone())
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        let guard_params = config
            .get_guard_params()
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;

        info!(db_path, requests_per_minute = guard_params.requests_per_minute, "排期服务已初始化");

        let guard = Arc::new(RateCircuitGuard::with_system_clock(guard_params));
        let repos = PipelineRepositories::from_connection(conn);
        Ok(Self::new(Arc::new(PipelineOrchestrator::new(
            Arc::new(config),
            repos,
            guard,
        ))))
    }
}

impl<C> ScheduleApi<C>
where
    C: PipelineConfigReader,
{
    pub fn new(orchestrator: Arc<PipelineOrchestrator<C>>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator<C>> {
        &self.orchestrator
    }

    // ==========================================
    // 流水线入口
    // ==========================================

    /// 生成账号一周排期
    ///
    /// # 参数
    /// - account_id: 账号ID
    /// - week_start: 周起始日 (YYYY-MM-DD)
    ///
    /// # 返回
    /// - `Ok(ScheduleOutcome)`: 已提交的模板与告警
    /// - `Err(ApiError::InvalidInput)`: 参数格式错误, 流水线未执行
    pub async fn generate_schedule(&self, account_id: &str, week_start: &str) -> ApiResult<ScheduleOutcome> {
        let week_start = parse_week_start(week_start)?;
        self.generate_schedule_at(account_id, week_start, Local::now().naive_local())
            .await
    }

    /// 指定运行时刻生成排期
    #[instrument(skip_all, fields(account_id = %account_id, week_start = %week_start))]
    pub async fn generate_schedule_at(
        &self,
        account_id: &str,
        week_start: NaiveDate,
        now: NaiveDateTime,
    ) -> ApiResult<ScheduleOutcome> {
        run_generate(&self.orchestrator, account_id, week_start, now).await
    }

    /// 计算并替换账号发送量配置
    pub async fn compute_volume_config(&self, account_id: &str) -> ApiResult<VolumeOutcome> {
        self.compute_volume_config_at(account_id, Local::now().naive_local())
            .await
    }

    pub async fn compute_volume_config_at(
        &self,
        account_id: &str,
        now: NaiveDateTime,
    ) -> ApiResult<VolumeOutcome> {
        validate_account_id(account_id)?;
        Ok(self.orchestrator.compute_volume(account_id, now).await?)
    }

    // ==========================================
    // 查询入口
    // ==========================================

    /// 解析发送类型 key（规范 key 原样返回, 别名在宽限期内映射）
    pub fn resolve_send_type_key(&self, key: &str, today: NaiveDate) -> ApiResult<SendTypeKey> {
        let repos = self.orchestrator.repos();
        let aliases = self
            .orchestrator
            .guard()
            .call(|| repos.send_type_repo.list_aliases())?;
        Ok(KeyResolver::new(aliases).resolve(key, today)?)
    }

    /// 旧版发送量读取（由已存配置派生, 不重跑流水线）
    pub fn get_legacy_volume(&self, account_id: &str) -> ApiResult<LegacyVolumeView> {
        validate_account_id(account_id)?;
        let repos = self.orchestrator.repos();
        let config = self
            .orchestrator
            .guard()
            .call(|| repos.volume_config_repo.find_by_account(account_id))?
            .ok_or_else(|| ApiError::NotFound {
                entity: "VolumeConfig".to_string(),
                id: account_id.to_string(),
            })?;
        Ok(config.legacy_view())
    }

    /// 查询已提交模板及其明细
    pub fn find_template(&self, template_id: &str) -> ApiResult<TemplateDetail> {
        let repos = self.orchestrator.repos();
        let guard = self.orchestrator.guard();
        let not_found = || ApiError::NotFound {
            entity: "ScheduleTemplate".to_string(),
            id: template_id.to_string(),
        };

        let template = guard
            .call(|| repos.schedule_repo.find_template(template_id))?
            .ok_or_else(not_found)?;
        let draft = guard
            .call(|| repos.schedule_repo.load_draft(template_id))?
            .ok_or_else(not_found)?;
        Ok(TemplateDetail { template, draft })
    }

    /// 列出账号的全部模板
    pub fn list_templates(&self, account_id: &str) -> ApiResult<Vec<ScheduleTemplate>> {
        validate_account_id(account_id)?;
        let repos = self.orchestrator.repos();
        Ok(self
            .orchestrator
            .guard()
            .call(|| repos.schedule_repo.list_templates_by_account(account_id))?)
    }
}

// ==========================================
// 批量入口（任务需 'static 的配置读取器）
// ==========================================
impl<C> ScheduleApi<C>
where
    C: PipelineConfigReader + 'static,
{
    /// 批量生成排期
    ///
    /// 每个账号一个任务, 并发度 = RunParams.worker_pool_size; 单个账号失败不影响其他账号
    pub async fn generate_schedules_batch(&self, requests: &[BatchRequest]) -> ApiResult<Vec<BatchEntry>> {
        self.generate_schedules_batch_at(requests, Local::now().naive_local())
            .await
    }

    #[instrument(skip_all, fields(batch_size = requests.len()))]
    pub async fn generate_schedules_batch_at(
        &self,
        requests: &[BatchRequest],
        now: NaiveDateTime,
    ) -> ApiResult<Vec<BatchEntry>> {
        let run = self
            .orchestrator
            .config()
            .get_run_params()
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        let permits = Arc::new(Semaphore::new(run.worker_pool_size.max(1)));

        let handles: Vec<_> = requests
            .iter()
            .cloned()
            .map(|req| {
                let permits = permits.clone();
                let orchestrator = self.orchestrator.clone();
                tokio::spawn(async move {
                    let result = match permits.acquire_owned().await {
                        Ok(_permit) => {
                            run_generate(&orchestrator, &req.account_id, req.week_start, now).await
                        }
                        Err(e) => Err(ApiError::InternalError(format!("工作池已关闭: {}", e))),
                    };
                    BatchEntry {
                        account_id: req.account_id,
                        week_start: req.week_start,
                        result: result.map_err(|e| e.to_report()),
                    }
                })
            })
            .collect();

        let entries: Vec<BatchEntry> = join_all(handles)
            .await
            .into_iter()
            .zip(requests)
            .map(|(joined, req)| {
                joined.unwrap_or_else(|e| {
                    warn!(account_id = %req.account_id, error = %e, "批量任务异常终止");
                    BatchEntry {
                        account_id: req.account_id.clone(),
                        week_start: req.week_start,
                        result: Err(ApiError::InternalError(format!("批量任务异常终止: {}", e)).to_report()),
                    }
                })
            })
            .collect();

        let failed = entries.iter().filter(|e| !e.is_ok()).count();
        info!(
            total = entries.len(),
            failed,
            worker_pool_size = run.worker_pool_size,
            "批量排期完成"
        );
        Ok(entries)
    }
}

/// 单账号生成; 单次调用与批量任务共用
async fn run_generate<C>(
    orchestrator: &PipelineOrchestrator<C>,
    account_id: &str,
    week_start: NaiveDate,
    now: NaiveDateTime,
) -> ApiResult<ScheduleOutcome>
where
    C: PipelineConfigReader,
{
    validate_account_id(account_id)?;
    orchestrator
        .generate(account_id, week_start, now)
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            warn!(kind = err.kind(), error = %err, "排期生成失败");
            err
        })
}

// ==========================================
// 参数校验
// ==========================================

fn validate_account_id(account_id: &str) -> ApiResult<()> {
    if account_id.trim().is_empty() {
        return Err(ApiError::InvalidInput {
            message: "账号ID不能为空".to_string(),
            entity_ids: Vec::new(),
        });
    }
    Ok(())
}

/// 解析 YYYY-MM-DD
pub fn parse_week_start(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| ApiError::InvalidInput {
        message: format!("周起始日格式错误 ({}): {}", raw, e),
        entity_ids: vec![raw.to_string()],
    })
}
