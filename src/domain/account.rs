// ==========================================
// 创作者发送排期系统 - 账号领域模型
// ==========================================
// 红线: 身份字段不可变; tier/volume_level 只由发送量优化结果回写
// ==========================================

use crate::domain::types::{PageType, VolumeLevel};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Account - 创作者账号
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    // ===== 身份 (不可变) =====
    pub account_id: String,   // 账号ID
    pub display_name: String, // 显示名称
    pub page_type: PageType,  // 页面类型

    // ===== 可变属性 (仅由 Volume Optimizer 输出回写) =====
    pub tier: u8,                          // 账号等级 (1=头部)
    pub volume_level: Option<VolumeLevel>, // 当前发送量等级

    // ===== 生命周期 =====
    pub is_active: bool,              // 是否启用
    pub is_new: bool,                 // 新开账号 (上线未满一个周期)
    pub created_at: NaiveDateTime,    // 创建时间
    pub updated_at: NaiveDateTime,    // 更新时间
}

impl Account {
    /// 当前基线等级：已有等级优先，否则按 tier 取默认
    pub fn baseline_level(&self) -> VolumeLevel {
        self.volume_level
            .unwrap_or_else(|| VolumeLevel::baseline_for_tier(self.tier))
    }
}
