// ==========================================
// 创作者发送排期系统 - 发送量配置领域模型
// ==========================================
// 说明: VolumeConfig 每次运行整体替换账号的旧配置;
//       旧版聚合字段 (等级/PPV数/Bump数) 始终可由其推导
// ==========================================

use crate::domain::performance::FusedScore;
use crate::domain::types::{CategoryCounts, SendCategory, VolumeLevel};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// VolumeConfig - 动态发送量配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub account_id: String,
    pub volume_level: VolumeLevel,

    // ===== 类别配额 =====
    pub weekly: CategoryCounts<u32>,      // 周总量
    pub daily: CategoryCounts<u32>,       // 日均（四舍五入, 仅供展示/兼容）
    pub weekly_plan: CategoryCounts<[u32; 7]>, // 按星期分配 (周一=0)

    // ===== 分布与权重 =====
    pub dow_multipliers: [f64; 7],                    // 归一化星期乘数 (和为 1)
    pub content_type_weights: BTreeMap<String, f64>, // 内容类型权重 (和为 1)

    // ===== 质量标记 =====
    pub elasticity_capped: bool,
    pub confidence: f64,
    pub fused_score: Option<FusedScore>, // None = 数据不足走默认
    pub calculated_at: NaiveDateTime,
}

impl VolumeConfig {
    /// 指定星期的类别配额
    pub fn quota(&self, category: SendCategory, weekday: usize) -> u32 {
        self.weekly_plan.get(category)[weekday]
    }

    /// 旧版只读视图
    pub fn legacy_view(&self) -> LegacyVolumeView {
        LegacyVolumeView {
            account_id: self.account_id.clone(),
            volume_level: self.volume_level,
            ppv_per_day: self.daily.revenue,
            bump_per_day: self.daily.engagement,
        }
    }
}

// ==========================================
// LegacyVolumeView - 旧版发送量读取结构
// ==========================================
// 兼容: 下游仍在读取扁平字段的调用方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyVolumeView {
    pub account_id: String,
    pub volume_level: VolumeLevel,
    pub ppv_per_day: u32,
    pub bump_per_day: u32,
}
