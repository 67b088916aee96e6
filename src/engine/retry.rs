// ==========================================
// 创作者发送排期系统 - 重试策略
// ==========================================
// 职责: 按失败类型给出有界重试策略（次数 + 退避）
// 说明: 各阶段只报告失败, 是否重试由策略决定
// ==========================================

use crate::config::{RunParams, TimingParams};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 退避策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// 固定间隔
    Fixed,
    /// 指数退避: base * 2^(attempt-1)
    #[default]
    Exponential,
    /// 线性退避: base * attempt
    Linear,
}

/// 重试策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最大重试次数（0 = 不重试）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// 第 attempt 次重试前的等待时间（从 1 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let shift = (attempt - 1).min(32);
                base_ms.saturating_mul(1u64 << shift).min(max_ms)
            }
            BackoffStrategy::Linear => base_ms.saturating_mul(attempt as u64).min(max_ms),
        };

        Duration::from_millis(delay_ms)
    }

    /// 已重试 attempt 次后是否还允许重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

// ==========================================
// FailureKind - 可重试的失败类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 间隔约束冲突: 丢弃一个槽位后立即重排
    TimingConflict,
    /// 外部依赖（存储不可达/熔断/限流）: 退避后重试
    ExternalDependency,
}

/// 单次运行使用的策略集合
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    pub timing: RetryPolicy,
    pub external: RetryPolicy,
}

impl RetryPolicies {
    pub fn from_params(timing: &TimingParams, run: &RunParams) -> Self {
        Self {
            timing: RetryPolicy::fixed(timing.max_retries, Duration::ZERO),
            external: RetryPolicy::exponential(
                run.external_retry_attempts,
                Duration::from_millis(run.retry_base_delay_ms),
                Duration::from_millis(run.retry_max_delay_ms),
            ),
        }
    }

    pub fn for_kind(&self, kind: FailureKind) -> &RetryPolicy {
        match kind {
            FailureKind::TimingConflict => &self.timing,
            FailureKind::ExternalDependency => &self.external,
        }
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self::from_params(&TimingParams::default(), &RunParams::default())
    }
}

/// 按策略重试异步操作
///
/// # 参数
/// - policy: 重试策略
/// - is_retryable: 判断错误是否可重试
/// - op: 每次尝试调用一次
///
/// # 返回
/// 第一次成功的结果, 或最后一次失败（不可重试错误立即返回）
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && policy.should_retry(attempt) => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "外部依赖失败, 退避后重试"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(200), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1000));
    }

    #[test]
    fn test_policies_per_failure_kind() {
        let policies = RetryPolicies::default();
        let timing = policies.for_kind(FailureKind::TimingConflict);
        assert_eq!(timing.max_attempts, 3);
        assert_eq!(timing.delay_for_attempt(2), Duration::ZERO);
        let external = policies.for_kind(FailureKind::ExternalDependency);
        assert_eq!(external.strategy, BackoffStrategy::Exponential);
        assert!(external.should_retry(2));
        assert!(!external.should_retry(3));
    }

    #[tokio::test]
    async fn test_retry_async_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let result: Result<(), String> = retry_async(&policy, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("store down".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_millis(1));
        let result: Result<(), String> = retry_async(&policy, |e: &String| e != "bad input", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("bad input".to_string()) }
        })
        .await;
        assert_eq!(result, Err("bad input".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
