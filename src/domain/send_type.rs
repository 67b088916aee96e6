// ==========================================
// 创作者发送排期系统 - 发送类型领域模型
// ==========================================
// 红线: 发送类型是封闭枚举, 不接受任意字符串
// 说明: 存储层记录 (SendTypeRecord) 的 key 可能是已废弃别名,
//       只有经过别名解析后的 SendTypeDefinition 才能进入分配
// ==========================================

use crate::domain::types::{PageRestriction, SendCategory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// SendTypeKey - 规范发送类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendTypeKey {
    // ===== 变现 =====
    PpvUnlock,
    PpvWall,
    Bundle,
    FlashBundle,
    TipGoal,
    // ===== 互动 =====
    LinkDrop,
    BumpNormal,
    BumpDescriptive,
    BumpTextOnly,
    DmFarm,
    // ===== 留存 =====
    RenewOn,
    ExpiredWinback,
    VipProgram,
    // ===== 跟进 =====
    PpvFollowup,
}

impl SendTypeKey {
    pub const ALL: [SendTypeKey; 14] = [
        SendTypeKey::PpvUnlock,
        SendTypeKey::PpvWall,
        SendTypeKey::Bundle,
        SendTypeKey::FlashBundle,
        SendTypeKey::TipGoal,
        SendTypeKey::LinkDrop,
        SendTypeKey::BumpNormal,
        SendTypeKey::BumpDescriptive,
        SendTypeKey::BumpTextOnly,
        SendTypeKey::DmFarm,
        SendTypeKey::RenewOn,
        SendTypeKey::ExpiredWinback,
        SendTypeKey::VipProgram,
        SendTypeKey::PpvFollowup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SendTypeKey::PpvUnlock => "ppv_unlock",
            SendTypeKey::PpvWall => "ppv_wall",
            SendTypeKey::Bundle => "bundle",
            SendTypeKey::FlashBundle => "flash_bundle",
            SendTypeKey::TipGoal => "tip_goal",
            SendTypeKey::LinkDrop => "link_drop",
            SendTypeKey::BumpNormal => "bump_normal",
            SendTypeKey::BumpDescriptive => "bump_descriptive",
            SendTypeKey::BumpTextOnly => "bump_text_only",
            SendTypeKey::DmFarm => "dm_farm",
            SendTypeKey::RenewOn => "renew_on",
            SendTypeKey::ExpiredWinback => "expired_winback",
            SendTypeKey::VipProgram => "vip_program",
            SendTypeKey::PpvFollowup => "ppv_followup",
        }
    }

    /// 所属类别（跟进类型挂在变现类别下, 但不计入类别配额）
    pub fn category(&self) -> SendCategory {
        match self {
            SendTypeKey::PpvUnlock
            | SendTypeKey::PpvWall
            | SendTypeKey::Bundle
            | SendTypeKey::FlashBundle
            | SendTypeKey::TipGoal
            | SendTypeKey::PpvFollowup => SendCategory::Revenue,
            SendTypeKey::LinkDrop
            | SendTypeKey::BumpNormal
            | SendTypeKey::BumpDescriptive
            | SendTypeKey::BumpTextOnly
            | SendTypeKey::DmFarm => SendCategory::Engagement,
            SendTypeKey::RenewOn | SendTypeKey::ExpiredWinback | SendTypeKey::VipProgram => {
                SendCategory::Retention
            }
        }
    }

    pub fn is_followup(&self) -> bool {
        matches!(self, SendTypeKey::PpvFollowup)
    }
}

impl fmt::Display for SendTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SendTypeKey {
    type Err = String;

    /// 只识别规范 key; 废弃别名需经 KeyResolver 解析
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        SendTypeKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| format!("未知发送类型: {}", key))
    }
}

// ==========================================
// DeprecatedAlias - 废弃别名
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecatedAlias {
    pub deprecated_key: String,
    pub canonical: SendTypeKey,
    /// 宽限期最后一天; 之后解析将被拒绝
    pub removed_after: NaiveDate,
}

// ==========================================
// SendTypeRecord - 存储层发送类型记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendTypeRecord {
    pub key: String, // 原始 key（可能为废弃别名）
    pub category: SendCategory,
    pub max_per_day: u32,
    pub max_per_week: u32,
    pub page_restriction: PageRestriction,
    pub required_content_types: Vec<String>, // 为空表示任意内容类型
    pub performance_score: f64,              // 历史表现
    pub base_price: Option<f64>,             // 默认价格（仅变现类）
    pub followup_eligible: bool,             // 可挂跟进
}

// ==========================================
// SendTypeDefinition - 解析后的发送类型定义
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendTypeDefinition {
    pub key: SendTypeKey,
    pub category: SendCategory,
    pub max_per_day: u32,
    pub max_per_week: u32,
    pub page_restriction: PageRestriction,
    pub required_content_types: Vec<String>,
    pub performance_score: f64,
    pub base_price: Option<f64>,
    pub followup_eligible: bool,
}

impl SendTypeRecord {
    #[allow(clippy::too_many_arguments)]
    fn seed(
        key: SendTypeKey,
        max_per_day: u32,
        max_per_week: u32,
        page_restriction: PageRestriction,
        required_content_types: &[&str],
        performance_score: f64,
        base_price: Option<f64>,
        followup_eligible: bool,
    ) -> Self {
        Self {
            key: key.as_str().to_string(),
            category: key.category(),
            max_per_day,
            max_per_week,
            page_restriction,
            required_content_types: required_content_types.iter().map(|s| s.to_string()).collect(),
            performance_score,
            base_price,
            followup_eligible,
        }
    }

    /// 标准发送类型目录（初始化数据/测试基线）
    pub fn standard_catalog() -> Vec<SendTypeRecord> {
        use PageRestriction::*;
        use SendTypeKey::*;
        vec![
            Self::seed(PpvUnlock, 3, 14, Any, &[], 92.0, Some(25.0), true),
            Self::seed(PpvWall, 2, 7, FreeOnly, &[], 80.0, Some(15.0), true),
            Self::seed(Bundle, 1, 4, Any, &[], 85.0, Some(40.0), true),
            Self::seed(FlashBundle, 1, 2, PaidOnly, &[], 78.0, Some(30.0), false),
            Self::seed(TipGoal, 1, 3, Any, &[], 60.0, Some(10.0), false),
            Self::seed(LinkDrop, 2, 10, Any, &[], 70.0, None, false),
            Self::seed(BumpNormal, 3, 21, Any, &[], 65.0, None, false),
            Self::seed(BumpDescriptive, 2, 10, Any, &[], 62.0, None, false),
            Self::seed(BumpTextOnly, 2, 10, Any, &[], 50.0, None, false),
            Self::seed(DmFarm, 1, 5, Any, &[], 55.0, None, false),
            Self::seed(RenewOn, 1, 7, PaidOnly, &[], 75.0, None, false),
            Self::seed(ExpiredWinback, 1, 3, PaidOnly, &[], 68.0, None, false),
            Self::seed(VipProgram, 1, 2, PaidOnly, &[], 58.0, None, false),
            Self::seed(PpvFollowup, 4, 28, Any, &[], 0.0, None, false),
        ]
    }
}

impl DeprecatedAlias {
    /// 标准废弃别名表
    pub fn standard_aliases() -> Vec<DeprecatedAlias> {
        let grace = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MAX);
        vec![
            DeprecatedAlias {
                deprecated_key: "ppv_message".to_string(),
                canonical: SendTypeKey::PpvUnlock,
                removed_after: grace(2027, 6, 30),
            },
            DeprecatedAlias {
                deprecated_key: "bump".to_string(),
                canonical: SendTypeKey::BumpNormal,
                removed_after: grace(2027, 6, 30),
            },
            DeprecatedAlias {
                deprecated_key: "renew_on_mass".to_string(),
                canonical: SendTypeKey::RenewOn,
                removed_after: grace(2027, 3, 31),
            },
            DeprecatedAlias {
                deprecated_key: "ppv_follow_up".to_string(),
                canonical: SendTypeKey::PpvFollowup,
                removed_after: grace(2027, 3, 31),
            },
            DeprecatedAlias {
                deprecated_key: "wall_ppv".to_string(),
                canonical: SendTypeKey::PpvWall,
                removed_after: grace(2026, 12, 31),
            },
        ]
    }
}
