// ==========================================
// 创作者发送排期系统 - 排期领域模型
// ==========================================
// 红线:
// - 跟进槽位的父槽位必须同日且早于自身至少最小延迟
// - 非跟进槽位不得共享时间戳
// - 持久化前每个槽位必须有内容
// ==========================================

use crate::domain::send_type::SendTypeKey;
use crate::domain::types::{SendCategory, VolumeLevel};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// ScheduleSlot - 排期槽位
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub slot_id: u32,                 // 草稿内稳定编号
    pub day_index: u8,                // 距周起始日的偏移 (0..7)
    pub date: NaiveDate,              // 发送日期
    pub time: Option<NaiveTime>,      // 发送时间 (Timing Optimizer 填充)
    pub send_type: SendTypeKey,       // 发送类型
    pub category: SendCategory,       // 类别
    pub content_type: Option<String>, // 内容类型要求 (None=任意)
    pub content_id: Option<String>,   // 选中内容 (Content Selector 填充)
    pub price: Option<f64>,           // 价格 (仅变现类)
    pub parent_slot_id: Option<u32>,  // 父槽位 (仅跟进)
}

impl ScheduleSlot {
    pub fn is_followup(&self) -> bool {
        self.parent_slot_id.is_some() || self.send_type.is_followup()
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.time.map(|t| self.date.and_time(t))
    }

    /// 排序用价格（无价格视为 0）
    pub fn price_or_zero(&self) -> f64 {
        self.price.unwrap_or(0.0)
    }
}

// ==========================================
// CaptionPoolWarning - 内容池不足告警
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionPoolWarning {
    pub content_type: String,
    pub required: usize,
    pub available: usize,
    pub shortfall: usize,
}

// ==========================================
// PipelineWarning - 非致命告警
// ==========================================
// 说明: 告警随成功结果返回, 不作为失败抛出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineWarning {
    /// 无历史数据, 使用默认配置
    DataInsufficient { account_id: String, detail: String },
    /// 统计窗口间饱和度分歧
    HorizonDivergence { account_id: String },
    /// 当日该类别无兼容发送类型, 配额被丢弃
    CategoryDropped {
        date: NaiveDate,
        category: SendCategory,
        dropped: u32,
        reason: String,
    },
    /// 兼容发送类型均已达上限, 配额未能填满
    QuotaShortfall {
        date: NaiveDate,
        category: SendCategory,
        requested: u32,
        allocated: u32,
    },
    /// 内容池不足, 已允许复用
    CaptionPool(CaptionPoolWarning),
    /// 间隔约束无法满足, 丢弃低优先级槽位
    SlotDropped {
        date: NaiveDate,
        slot_id: u32,
        send_type: SendTypeKey,
        reason: String,
    },
    /// 跟进未能生成
    FollowupSkipped {
        date: NaiveDate,
        parent_slot_id: u32,
        reason: String,
    },
}

impl PipelineWarning {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineWarning::DataInsufficient { .. } => "DATA_INSUFFICIENT",
            PipelineWarning::HorizonDivergence { .. } => "HORIZON_DIVERGENCE",
            PipelineWarning::CategoryDropped { .. } => "CATEGORY_DROPPED",
            PipelineWarning::QuotaShortfall { .. } => "QUOTA_SHORTFALL",
            PipelineWarning::CaptionPool(_) => "CAPTION_POOL",
            PipelineWarning::SlotDropped { .. } => "SLOT_DROPPED",
            PipelineWarning::FollowupSkipped { .. } => "FOLLOWUP_SKIPPED",
        }
    }
}

// ==========================================
// 校验结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    CategoryDailyTotal,
    CategoryWeeklyTotal,
    SendTypeCap,
    PageTypeIncompatible,
    MissingTime,
    MissingContent,
    StaleContent,
    DuplicateTimestamp,
    SlotSpacing,
    FollowupParent,
    FollowupSpacing,
    FollowupCount,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::CategoryDailyTotal => "CATEGORY_DAILY_TOTAL",
            ViolationKind::CategoryWeeklyTotal => "CATEGORY_WEEKLY_TOTAL",
            ViolationKind::SendTypeCap => "SEND_TYPE_CAP",
            ViolationKind::PageTypeIncompatible => "PAGE_TYPE_INCOMPATIBLE",
            ViolationKind::MissingTime => "MISSING_TIME",
            ViolationKind::MissingContent => "MISSING_CONTENT",
            ViolationKind::StaleContent => "STALE_CONTENT",
            ViolationKind::DuplicateTimestamp => "DUPLICATE_TIMESTAMP",
            ViolationKind::SlotSpacing => "SLOT_SPACING",
            ViolationKind::FollowupParent => "FOLLOWUP_PARENT",
            ViolationKind::FollowupSpacing => "FOLLOWUP_SPACING",
            ViolationKind::FollowupCount => "FOLLOWUP_COUNT",
        };
        write!(f, "{}", s)
    }
}

/// 单条违规
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub detail: String,
    pub entity_ids: Vec<String>,
}

/// 校验报告
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    pub fn count_of(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }
}

// ==========================================
// ScheduleDraft - 单次运行内的排期草稿
// ==========================================
// 说明: 每个阶段读取上一版草稿并返回新草稿, 失败时直接丢弃最新版本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDraft {
    pub account_id: String,
    pub week_start: NaiveDate,
    pub slots: Vec<ScheduleSlot>,
    pub warnings: Vec<PipelineWarning>,
    pub validation: Option<ValidationReport>,
}

impl ScheduleDraft {
    pub fn new(account_id: &str, week_start: NaiveDate) -> Self {
        Self {
            account_id: account_id.to_string(),
            week_start,
            slots: Vec::new(),
            warnings: Vec::new(),
            validation: None,
        }
    }

    /// 派生新草稿：替换槽位并追加告警
    pub fn derive(&self, slots: Vec<ScheduleSlot>, warnings: Vec<PipelineWarning>) -> Self {
        let mut next = self.clone();
        next.slots = slots;
        next.warnings.extend(warnings);
        next
    }

    pub fn next_slot_id(&self) -> u32 {
        self.slots.iter().map(|s| s.slot_id + 1).max().unwrap_or(1)
    }

    pub fn slot(&self, slot_id: u32) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|s| s.slot_id == slot_id)
    }

    pub fn slots_on(&self, day_index: u8) -> impl Iterator<Item = &ScheduleSlot> {
        self.slots.iter().filter(move |s| s.day_index == day_index)
    }

    /// 按 (日期, 时间, 跟进在后, slot_id) 排序, 用于持久化顺序
    pub fn sort_chronologically(&mut self) {
        self.slots.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.time.cmp(&b.time))
                .then(a.is_followup().cmp(&b.is_followup()))
                .then(a.slot_id.cmp(&b.slot_id))
        });
    }
}

// ==========================================
// ScheduleTemplate - 已持久化的周排期
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTemplate {
    pub template_id: String,
    pub account_id: String,
    pub week_start: NaiveDate,
    pub slot_count: usize,
    pub volume_level: VolumeLevel,
    pub confidence: f64,
    pub created_at: NaiveDateTime,
}
