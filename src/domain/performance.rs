// ==========================================
// 创作者发送排期系统 - 历史表现领域模型
// ==========================================
// 红线: 只读快照, 每次运行读取一次, 不可修改
// ==========================================

use crate::domain::types::Horizon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// PerformanceWindow - 统计窗口聚合
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceWindow {
    pub account_id: String,
    pub horizon: Horizon,
    pub sends: u32,        // 发送次数
    pub opens: u32,        // 打开次数
    pub revenue: f64,      // 收入
    pub revenue_variance: f64, // 日收入方差
}

impl PerformanceWindow {
    /// 空窗口（用于缺失的统计窗口）
    pub fn empty(account_id: &str, horizon: Horizon) -> Self {
        Self {
            account_id: account_id.to_string(),
            horizon,
            sends: 0,
            opens: 0,
            revenue: 0.0,
            revenue_variance: 0.0,
        }
    }

    pub fn open_rate(&self) -> f64 {
        if self.sends == 0 {
            return 0.0;
        }
        (self.opens as f64 / self.sends as f64).clamp(0.0, 1.0)
    }

    pub fn revenue_per_send(&self) -> f64 {
        if self.sends == 0 {
            return 0.0;
        }
        (self.revenue / self.sends as f64).max(0.0)
    }

    pub fn sends_per_day(&self) -> f64 {
        self.sends as f64 / self.horizon.days() as f64
    }

    /// 日收入变异系数（标准差 / 日均收入），截断到 [0,1]
    pub fn revenue_volatility(&self) -> f64 {
        let daily_mean = self.revenue / self.horizon.days() as f64;
        if daily_mean <= 0.0 || self.revenue_variance <= 0.0 {
            return 0.0;
        }
        (self.revenue_variance.sqrt() / daily_mean).clamp(0.0, 1.0)
    }
}

// ==========================================
// FusedScore - 多窗口融合评分
// ==========================================
// 产出: Trend Fuser; 消费: Volume Optimizer (一次性)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedScore {
    pub saturation: f64,  // [0,100] 越高越应减量
    pub opportunity: f64, // [0,100] 越高越应加量
    pub divergence: bool, // 窗口间饱和度分歧超过容差
    pub confidence: f64,  // [0,1] 样本量驱动
}

// ==========================================
// PerformanceSnapshot - 单次运行的历史表现快照
// ==========================================
// 说明: 读取一次后在各阶段间共享, 任何阶段不得重读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub account_id: String,
    pub windows: Vec<PerformanceWindow>,
    /// 每小时表现 (0..24), 全零表示无历史
    pub hourly: [f64; 24],
    /// 星期表现乘数 (周一=0), 全零表示无历史
    pub day_of_week: [f64; 7],
    /// 内容类型 → 近期表现
    pub content_type_performance: BTreeMap<String, f64>,
}

impl PerformanceSnapshot {
    /// 取指定窗口（缺失时返回空窗口）
    pub fn window(&self, horizon: Horizon) -> PerformanceWindow {
        self.windows
            .iter()
            .find(|w| w.horizon == horizon)
            .cloned()
            .unwrap_or_else(|| PerformanceWindow::empty(&self.account_id, horizon))
    }

    pub fn has_hourly_history(&self) -> bool {
        self.hourly.iter().any(|v| *v > 0.0)
    }
}
