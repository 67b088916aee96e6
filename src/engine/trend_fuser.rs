// ==========================================
// 创作者发送排期系统 - 趋势融合引擎
// ==========================================
// 职责: 7/14/30 天窗口 → 单一饱和度/机会度评分
// 输入: PerformanceWindow x3
// 输出: FusedScore
// 红线: 全部窗口零发送 → InsufficientData, 由调用方走默认配置
// ==========================================

use crate::config::FusionParams;
use crate::domain::performance::{FusedScore, PerformanceWindow};
use crate::domain::types::Horizon;
use crate::engine::error::{EngineError, EngineResult};
use tracing::{debug, instrument};

/// 单窗口信号
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizonSignal {
    pub horizon: Horizon,
    pub sends: u32,
    pub saturation: f64,
    pub opportunity: f64,
}

// ==========================================
// TrendFuser - 趋势融合引擎
// ==========================================
pub struct TrendFuser {
    // 无状态引擎
}

impl TrendFuser {
    pub fn new() -> Self {
        Self {}
    }

    /// 计算单窗口信号
    ///
    /// - 饱和度 = 发送频率疲劳 0.5 + 打开率衰减 0.3 + 收入波动 0.2
    /// - 机会度 = 单次收入 0.5 + 打开率 0.3 + 频率余量 0.2
    pub fn horizon_signal(&self, window: &PerformanceWindow, params: &FusionParams) -> HorizonSignal {
        let fatigue = ratio(window.sends_per_day(), params.saturation_sends_per_day);
        let open_strength = ratio(window.open_rate(), params.benchmark_open_rate);
        let revenue_strength = ratio(window.revenue_per_send(), params.benchmark_revenue_per_send);
        let volatility = window.revenue_volatility();

        let saturation = 100.0 * (0.5 * fatigue + 0.3 * (1.0 - open_strength) + 0.2 * volatility);
        let opportunity =
            100.0 * (0.5 * revenue_strength + 0.3 * open_strength + 0.2 * (1.0 - fatigue));

        HorizonSignal {
            horizon: window.horizon,
            sends: window.sends,
            saturation: saturation.clamp(0.0, 100.0),
            opportunity: opportunity.clamp(0.0, 100.0),
        }
    }

    /// 融合多窗口
    ///
    /// # 逻辑
    /// 1. 逐窗口计算饱和度/机会度（零发送窗口不参与加权, 剩余权重归一化）
    /// 2. 饱和度偏向短窗口, 机会度偏向长窗口
    /// 3. 置信度 = 最大窗口发送量 / 最小显著发送量（截断到 1）
    /// 4. 任意两窗口饱和度差值超过容差 → divergence
    #[instrument(skip(self, windows, params), fields(account_id = %account_id))]
    pub fn fuse(
        &self,
        account_id: &str,
        windows: &[PerformanceWindow],
        params: &FusionParams,
    ) -> EngineResult<FusedScore> {
        let signals: Vec<HorizonSignal> = Horizon::ALL
            .iter()
            .filter_map(|h| windows.iter().find(|w| w.horizon == *h))
            .filter(|w| w.sends > 0)
            .map(|w| self.horizon_signal(w, params))
            .collect();

        if signals.is_empty() {
            return Err(EngineError::InsufficientData {
                account_id: account_id.to_string(),
            });
        }

        let saturation = weighted(&signals, &params.saturation_weights, |s| s.saturation);
        let opportunity = weighted(&signals, &params.opportunity_weights, |s| s.opportunity);

        // 窗口相互嵌套, 取最大窗口发送量, 避免重复计数
        let total_sends = signals.iter().map(|s| s.sends).max().unwrap_or(0);
        let confidence = if params.min_significant_sends == 0 {
            1.0
        } else {
            (total_sends as f64 / params.min_significant_sends as f64).clamp(0.0, 1.0)
        };

        let divergence = signals.iter().enumerate().any(|(i, a)| {
            signals[i + 1..]
                .iter()
                .any(|b| (a.saturation - b.saturation).abs() > params.divergence_tolerance)
        });

        debug!(
            saturation,
            opportunity,
            confidence,
            divergence,
            horizons = signals.len(),
            "趋势融合完成"
        );

        Ok(FusedScore {
            saturation,
            opportunity,
            divergence,
            confidence,
        })
    }
}

impl Default for TrendFuser {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(value: f64, benchmark: f64) -> f64 {
    if benchmark <= 0.0 {
        return 0.0;
    }
    (value / benchmark).clamp(0.0, 1.0)
}

fn horizon_weight(weights: &[f64; 3], horizon: Horizon) -> f64 {
    let w = match horizon {
        Horizon::D7 => weights[0],
        Horizon::D14 => weights[1],
        Horizon::D30 => weights[2],
    };
    w.max(0.0)
}

fn weighted(signals: &[HorizonSignal], weights: &[f64; 3], value: impl Fn(&HorizonSignal) -> f64) -> f64 {
    let weight_sum: f64 = signals.iter().map(|s| horizon_weight(weights, s.horizon)).sum();
    if weight_sum <= 0.0 {
        let n = signals.len() as f64;
        return signals.iter().map(&value).sum::<f64>() / n;
    }
    let total: f64 = signals
        .iter()
        .map(|s| horizon_weight(weights, s.horizon) * value(s))
        .sum();
    (total / weight_sum).clamp(0.0, 100.0)
}
