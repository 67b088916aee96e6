// ==========================================
// 创作者发送排期系统 - 领域类型定义
// ==========================================
// 职责: 页面类型 / 发送类别 / 发送量等级 / 统计窗口
// 红线: 等级制,不是评分制（发送量等级为有序枚举）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 页面类型 (Page Type)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageType {
    Paid, // 付费订阅页
    Free, // 免费页
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageType::Paid => write!(f, "PAID"),
            PageType::Free => write!(f, "FREE"),
        }
    }
}

impl FromStr for PageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PAID" => Ok(PageType::Paid),
            "FREE" => Ok(PageType::Free),
            other => Err(format!("未知页面类型: {}", other)),
        }
    }
}

// ==========================================
// 页面类型限制 (Page Restriction)
// ==========================================
// 用途: 发送类型对页面类型的兼容约束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageRestriction {
    Any,      // 不限
    PaidOnly, // 仅付费页
    FreeOnly, // 仅免费页
}

impl PageRestriction {
    /// 判断是否与页面类型兼容
    pub fn allows(&self, page_type: PageType) -> bool {
        match self {
            PageRestriction::Any => true,
            PageRestriction::PaidOnly => page_type == PageType::Paid,
            PageRestriction::FreeOnly => page_type == PageType::Free,
        }
    }
}

impl fmt::Display for PageRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRestriction::Any => write!(f, "ANY"),
            PageRestriction::PaidOnly => write!(f, "PAID_ONLY"),
            PageRestriction::FreeOnly => write!(f, "FREE_ONLY"),
        }
    }
}

impl FromStr for PageRestriction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ANY" => Ok(PageRestriction::Any),
            "PAID_ONLY" => Ok(PageRestriction::PaidOnly),
            "FREE_ONLY" => Ok(PageRestriction::FreeOnly),
            other => Err(format!("未知页面限制: {}", other)),
        }
    }
}

// ==========================================
// 发送类别 (Send Category)
// ==========================================
// 优先级: Revenue > Engagement > Retention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendCategory {
    Revenue,    // 变现
    Engagement, // 互动
    Retention,  // 留存
}

impl SendCategory {
    /// 固定处理顺序（同时也是优先级顺序）
    pub const ALL: [SendCategory; 3] = [
        SendCategory::Revenue,
        SendCategory::Engagement,
        SendCategory::Retention,
    ];

    /// 优先级序号（越小越优先）
    pub fn priority_rank(&self) -> u8 {
        match self {
            SendCategory::Revenue => 0,
            SendCategory::Engagement => 1,
            SendCategory::Retention => 2,
        }
    }

    pub fn index(&self) -> usize {
        self.priority_rank() as usize
    }
}

impl fmt::Display for SendCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendCategory::Revenue => write!(f, "REVENUE"),
            SendCategory::Engagement => write!(f, "ENGAGEMENT"),
            SendCategory::Retention => write!(f, "RETENTION"),
        }
    }
}

impl FromStr for SendCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "REVENUE" => Ok(SendCategory::Revenue),
            "ENGAGEMENT" => Ok(SendCategory::Engagement),
            "RETENTION" => Ok(SendCategory::Retention),
            other => Err(format!("未知发送类别: {}", other)),
        }
    }
}

// ==========================================
// 发送量等级 (Volume Level)
// ==========================================
// 有序刻度: Low < Mid < High < Ultra
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeLevel {
    Low,
    Mid,
    High,
    Ultra,
}

impl VolumeLevel {
    const SCALE: [VolumeLevel; 4] = [
        VolumeLevel::Low,
        VolumeLevel::Mid,
        VolumeLevel::High,
        VolumeLevel::Ultra,
    ];

    /// 每日发送总量（跨全部类别）
    pub fn daily_total(&self) -> u32 {
        match self {
            VolumeLevel::Low => 4,
            VolumeLevel::Mid => 6,
            VolumeLevel::High => 8,
            VolumeLevel::Ultra => 10,
        }
    }

    pub fn ordinal(&self) -> i32 {
        match self {
            VolumeLevel::Low => 0,
            VolumeLevel::Mid => 1,
            VolumeLevel::High => 2,
            VolumeLevel::Ultra => 3,
        }
    }

    /// 沿刻度移动 steps 档（越界时截断到两端）
    pub fn shifted(&self, steps: i32) -> VolumeLevel {
        let idx = (self.ordinal() + steps).clamp(0, Self::SCALE.len() as i32 - 1);
        Self::SCALE[idx as usize]
    }

    /// 档位基线（无历史配置时按账号等级取值）
    ///
    /// tier 1 为头部账号
    pub fn baseline_for_tier(tier: u8) -> VolumeLevel {
        match tier {
            0 | 1 => VolumeLevel::High,
            2 => VolumeLevel::Mid,
            _ => VolumeLevel::Low,
        }
    }

    /// 由日均总量反推等级（取最接近的一档, 等距时取低档）
    pub fn from_daily_total(total: f64) -> VolumeLevel {
        let mut level = VolumeLevel::Low;
        let mut best = f64::INFINITY;
        for candidate in Self::SCALE {
            let gap = (candidate.daily_total() as f64 - total).abs();
            if gap + 1e-9 < best {
                best = gap;
                level = candidate;
            }
        }
        level
    }
}

impl fmt::Display for VolumeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeLevel::Low => write!(f, "LOW"),
            VolumeLevel::Mid => write!(f, "MID"),
            VolumeLevel::High => write!(f, "HIGH"),
            VolumeLevel::Ultra => write!(f, "ULTRA"),
        }
    }
}

impl FromStr for VolumeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(VolumeLevel::Low),
            "MID" => Ok(VolumeLevel::Mid),
            "HIGH" => Ok(VolumeLevel::High),
            "ULTRA" => Ok(VolumeLevel::Ultra),
            other => Err(format!("未知发送量等级: {}", other)),
        }
    }
}

// ==========================================
// 统计窗口 (Horizon)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    D7,
    D14,
    D30,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::D7, Horizon::D14, Horizon::D30];

    pub fn days(&self) -> u32 {
        match self {
            Horizon::D7 => 7,
            Horizon::D14 => 14,
            Horizon::D30 => 30,
        }
    }

    pub fn from_days(days: u32) -> Option<Horizon> {
        match days {
            7 => Some(Horizon::D7),
            14 => Some(Horizon::D14),
            30 => Some(Horizon::D30),
            _ => None,
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days())
    }
}

// ==========================================
// 按类别聚合的计数容器
// ==========================================
// 用途: VolumeConfig 中的 weekly/daily/plan 三组数据共用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryCounts<T> {
    pub revenue: T,
    pub engagement: T,
    pub retention: T,
}

impl<T: Copy> CategoryCounts<T> {
    pub fn get(&self, category: SendCategory) -> T {
        match category {
            SendCategory::Revenue => self.revenue,
            SendCategory::Engagement => self.engagement,
            SendCategory::Retention => self.retention,
        }
    }

    pub fn set(&mut self, category: SendCategory, value: T) {
        match category {
            SendCategory::Revenue => self.revenue = value,
            SendCategory::Engagement => self.engagement = value,
            SendCategory::Retention => self.retention = value,
        }
    }

    pub fn from_fn(mut f: impl FnMut(SendCategory) -> T) -> Self {
        Self {
            revenue: f(SendCategory::Revenue),
            engagement: f(SendCategory::Engagement),
            retention: f(SendCategory::Retention),
        }
    }
}

impl CategoryCounts<u32> {
    pub fn total(&self) -> u32 {
        self.revenue + self.engagement + self.retention
    }
}
