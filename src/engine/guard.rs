// ==========================================
// 创作者发送排期系统 - 限流/熔断守卫
// ==========================================
// 职责: 进程级外部存储调用计数
// - 固定窗口限流 (requests_per_minute)
// - 连续瞬时失败达到阈值后熔断, 冷却期内快速失败
// 红线:
// - 状态由调用方显式创建/重置, 不使用全局变量
// - 时钟可注入, 测试使用 ManualClock 不等待真实时间
// - 只有 is_transient() 的存储错误计入连续失败
// ==========================================

use crate::config::GuardParams;
use crate::repository::{RepositoryError, RepositoryResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

const RATE_WINDOW_MS: u64 = 60_000;
/// 半开试探进行中时建议的重试间隔
const HALF_OPEN_RETRY_AFTER_MS: u64 = 1_000;

// ==========================================
// Clock - 可注入时钟
// ==========================================
pub trait Clock: Send + Sync {
    /// 单调毫秒数
    fn now_ms(&self) -> u64;
}

/// 真实单调时钟
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// 手动推进的时钟
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// ==========================================
// GuardError
// ==========================================
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("请求过于频繁, {retry_after_ms}ms 后重试")]
    RateLimited { retry_after_ms: u64 },

    #[error("外部存储熔断中, {retry_after_ms}ms 后重试")]
    CircuitOpen { retry_after_ms: u64 },

    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl GuardError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GuardError::RateLimited { .. } | GuardError::CircuitOpen { .. } => true,
            GuardError::Store(e) => e.is_transient(),
        }
    }
}

// ==========================================
// 熔断状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open { until_ms: u64 },
    /// 冷却结束, 仅放行一次试探调用, 其结果决定闭合或重新打开
    HalfOpen,
}

/// 守卫状态快照（诊断用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardSnapshot {
    pub breaker: BreakerState,
    pub consecutive_failures: u32,
    pub window_count: u32,
}

#[derive(Debug)]
struct GuardState {
    window_start_ms: u64,
    window_count: u32,
    consecutive_failures: u32,
    breaker: BreakerState,
    /// 半开状态下已放行试探调用, 等待其结果
    trial_in_flight: bool,
}

impl GuardState {
    fn fresh(now_ms: u64) -> Self {
        Self {
            window_start_ms: now_ms,
            window_count: 0,
            consecutive_failures: 0,
            breaker: BreakerState::Closed,
            trial_in_flight: false,
        }
    }
}

// ==========================================
// RateCircuitGuard
// ==========================================
pub struct RateCircuitGuard {
    params: GuardParams,
    clock: Arc<dyn Clock>,
    state: Mutex<GuardState>,
}

impl RateCircuitGuard {
    pub fn new(params: GuardParams, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            params,
            clock,
            state: Mutex::new(GuardState::fresh(now)),
        }
    }

    pub fn with_system_clock(params: GuardParams) -> Self {
        Self::new(params, Arc::new(SystemClock::new()))
    }

    pub fn params(&self) -> &GuardParams {
        &self.params
    }

    // 计数器只含整数, 锁中毒时沿用内部状态
    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 申请一次调用许可
    ///
    /// # 返回
    /// - `Err(CircuitOpen)`: 熔断冷却中, 或半开试探尚未返回
    /// - `Err(RateLimited)`: 当前分钟窗口已满
    pub fn acquire(&self) -> Result<(), GuardError> {
        let now = self.clock.now_ms();
        let mut state = self.lock();

        if let BreakerState::Open { until_ms } = state.breaker {
            if now < until_ms {
                return Err(GuardError::CircuitOpen {
                    retry_after_ms: until_ms - now,
                });
            }
            info!("熔断冷却结束, 进入半开状态");
            state.breaker = BreakerState::HalfOpen;
            state.trial_in_flight = false;
        }

        if state.breaker == BreakerState::HalfOpen && state.trial_in_flight {
            return Err(GuardError::CircuitOpen {
                retry_after_ms: HALF_OPEN_RETRY_AFTER_MS,
            });
        }

        let elapsed = now.saturating_sub(state.window_start_ms);
        if elapsed >= RATE_WINDOW_MS {
            state.window_start_ms = now - elapsed % RATE_WINDOW_MS;
            state.window_count = 0;
        }

        if self.params.requests_per_minute > 0 && state.window_count >= self.params.requests_per_minute {
            let retry_after_ms = (state.window_start_ms + RATE_WINDOW_MS).saturating_sub(now);
            return Err(GuardError::RateLimited { retry_after_ms });
        }

        state.window_count += 1;
        if state.breaker == BreakerState::HalfOpen {
            state.trial_in_flight = true;
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.breaker == BreakerState::HalfOpen {
            info!("半开试探成功, 熔断闭合");
        }
        state.consecutive_failures = 0;
        state.breaker = BreakerState::Closed;
        state.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        state.consecutive_failures += 1;

        let trip = state.breaker == BreakerState::HalfOpen
            || (self.params.failure_threshold > 0
                && state.consecutive_failures >= self.params.failure_threshold);
        if trip {
            let until_ms = now + self.params.cooldown_ms;
            warn!(
                consecutive_failures = state.consecutive_failures,
                cooldown_ms = self.params.cooldown_ms,
                "外部存储连续失败, 熔断打开"
            );
            state.breaker = BreakerState::Open { until_ms };
            state.trial_in_flight = false;
        }
    }

    /// 在守卫下执行一次存储调用
    ///
    /// 瞬时错误计入连续失败; 数据类错误（NotFound 等）不影响熔断
    pub fn call<T>(&self, op: impl FnOnce() -> RepositoryResult<T>) -> Result<T, GuardError> {
        self.acquire()?;
        match op() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                if e.is_transient() {
                    self.record_failure();
                } else {
                    self.record_success();
                }
                Err(GuardError::Store(e))
            }
        }
    }

    /// 清空计数与熔断状态
    pub fn reset(&self) {
        let now = self.clock.now_ms();
        *self.lock() = GuardState::fresh(now);
        info!("限流/熔断状态已重置");
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let state = self.lock();
        GuardSnapshot {
            breaker: state.breaker,
            consecutive_failures: state.consecutive_failures,
            window_count: state.window_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(rpm: u32, threshold: u32, cooldown_ms: u64) -> (Arc<ManualClock>, RateCircuitGuard) {
        let clock = Arc::new(ManualClock::new());
        let params = GuardParams {
            requests_per_minute: rpm,
            failure_threshold: threshold,
            cooldown_ms,
        };
        (clock.clone(), RateCircuitGuard::new(params, clock))
    }

    fn busy() -> RepositoryError {
        RepositoryError::DatabaseBusy("locked".to_string())
    }

    #[test]
    fn test_rate_window_limits_and_resets() {
        let (clock, guard) = guard(2, 5, 1_000);
        assert!(guard.acquire().is_ok());
        clock.advance(Duration::from_secs(10));
        assert!(guard.acquire().is_ok());
        match guard.acquire() {
            Err(GuardError::RateLimited { retry_after_ms }) => assert_eq!(retry_after_ms, 50_000),
            other => panic!("unexpected: {:?}", other),
        }
        clock.advance(Duration::from_secs(50));
        assert!(guard.acquire().is_ok());
    }

    #[test]
    fn test_breaker_opens_after_consecutive_transient_failures() {
        let (clock, guard) = guard(100, 3, 5_000);
        for _ in 0..3 {
            let result: Result<(), _> = guard.call(|| Err(busy()));
            assert!(matches!(result, Err(GuardError::Store(_))));
        }
        let blocked: Result<(), _> = guard.call(|| Ok(()));
        match blocked {
            Err(GuardError::CircuitOpen { retry_after_ms }) => assert_eq!(retry_after_ms, 5_000),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(guard.snapshot().breaker, BreakerState::Open { .. }));

        clock.advance(Duration::from_millis(5_000));
        assert!(guard.call(|| Ok(())).is_ok());
        assert_eq!(guard.snapshot().breaker, BreakerState::Closed);
        assert_eq!(guard.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens_immediately() {
        let (clock, guard) = guard(100, 2, 1_000);
        for _ in 0..2 {
            let _: Result<(), _> = guard.call(|| Err(busy()));
        }
        clock.advance(Duration::from_millis(1_000));
        let _: Result<(), _> = guard.call(|| Err(busy()));
        assert!(matches!(
            guard.call(|| Ok(())),
            Err(GuardError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn test_half_open_admits_single_trial_call() {
        let (clock, guard) = guard(100, 2, 1_000);
        for _ in 0..2 {
            let _: Result<(), _> = guard.call(|| Err(busy()));
        }
        clock.advance(Duration::from_millis(1_000));

        // 第一个调用者获得试探许可, 其余调用者在结果返回前被拒绝
        assert!(guard.acquire().is_ok());
        assert_eq!(guard.snapshot().breaker, BreakerState::HalfOpen);
        let admitted = guard.snapshot().window_count;
        for _ in 0..3 {
            match guard.acquire() {
                Err(GuardError::CircuitOpen { retry_after_ms }) => {
                    assert_eq!(retry_after_ms, HALF_OPEN_RETRY_AFTER_MS)
                }
                other => panic!("unexpected: {:?}", other),
            }
        }
        assert_eq!(guard.snapshot().window_count, admitted);

        guard.record_success();
        assert_eq!(guard.snapshot().breaker, BreakerState::Closed);
        assert!(guard.acquire().is_ok());
        assert!(guard.acquire().is_ok());
    }

    #[test]
    fn test_failed_trial_reopens_and_next_cooldown_allows_new_trial() {
        let (clock, guard) = guard(100, 1, 1_000);
        let _: Result<(), _> = guard.call(|| Err(busy()));
        clock.advance(Duration::from_millis(1_000));

        assert!(guard.acquire().is_ok());
        guard.record_failure();
        assert!(matches!(
            guard.acquire(),
            Err(GuardError::CircuitOpen { retry_after_ms: 1_000 })
        ));

        clock.advance(Duration::from_millis(1_000));
        assert!(guard.call(|| Ok(())).is_ok());
        assert_eq!(guard.snapshot().breaker, BreakerState::Closed);
    }

    #[test]
    fn test_data_errors_do_not_trip_breaker() {
        let (_clock, guard) = guard(100, 1, 1_000);
        let result: Result<(), _> = guard.call(|| Err(RepositoryError::not_found("Account", "X")));
        let err = result.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(guard.snapshot().breaker, BreakerState::Closed);
    }

    #[test]
    fn test_reset_clears_state() {
        let (_clock, guard) = guard(1, 1, 60_000);
        let _: Result<(), _> = guard.call(|| Err(busy()));
        assert!(guard.acquire().is_err());
        guard.reset();
        assert!(guard.acquire().is_ok());
        assert_eq!(guard.snapshot().window_count, 1);
    }
}
