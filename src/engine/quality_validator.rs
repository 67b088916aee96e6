// ==========================================
// 创作者发送排期系统 - 质量校验引擎
// ==========================================
// 职责: 对完整草稿重新校验全部约束, 输出逐项违规
// 红线:
// - 纯检查, 不做任何修复
// - 校验失败的草稿不得持久化, 违规原样返回调用方
// ==========================================

use crate::config::{FollowupParams, FreshnessParams, TimingParams};
use crate::domain::content::ContentItem;
use crate::domain::schedule::{
    PipelineWarning, ScheduleDraft, ScheduleSlot, ValidationReport, Violation, ViolationKind,
};
use crate::domain::send_type::{SendTypeDefinition, SendTypeKey};
use crate::domain::types::{PageType, SendCategory};
use crate::domain::volume::VolumeConfig;
use crate::engine::content_selector::ANY_CONTENT_TYPE;
use chrono::Datelike;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, instrument, warn};

/// 校验所需的只读上下文
pub struct ValidationContext<'a> {
    pub config: &'a VolumeConfig,
    pub definitions: &'a [SendTypeDefinition],
    pub page_type: PageType,
    pub pool: &'a [ContentItem],
    pub timing: &'a TimingParams,
    pub followup: &'a FollowupParams,
    pub freshness: &'a FreshnessParams,
}

// ==========================================
// QualityValidator - 质量校验引擎
// ==========================================
pub struct QualityValidator {
    // 无状态引擎
}

impl QualityValidator {
    pub fn new() -> Self {
        Self {}
    }

    /// 校验草稿
    ///
    /// # 返回
    /// ValidationReport（passed = 无违规）
    #[instrument(skip_all, fields(account_id = %draft.account_id, week_start = %draft.week_start))]
    pub fn validate(&self, draft: &ScheduleDraft, ctx: &ValidationContext<'_>) -> ValidationReport {
        let mut violations = Vec::new();

        self.check_category_totals(draft, ctx, &mut violations);
        self.check_send_types(draft, ctx, &mut violations);
        self.check_completeness(draft, ctx, &mut violations);
        self.check_timestamps(draft, ctx, &mut violations);
        self.check_followups(draft, ctx, &mut violations);

        let report = ValidationReport::from_violations(violations);
        if report.passed {
            info!(slot_count = draft.slots.len(), "质量校验通过");
        } else {
            warn!(violations = report.violations.len(), "质量校验未通过");
        }
        report
    }

    // ===== 类别配额 =====
    fn check_category_totals(
        &self,
        draft: &ScheduleDraft,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        let mut weekly: HashMap<SendCategory, Vec<u32>> = HashMap::new();

        for day_index in 0..7u8 {
            let date = draft.week_start + chrono::Duration::days(day_index as i64);
            let weekday = date.weekday().num_days_from_monday() as usize;

            for category in SendCategory::ALL {
                let ids: Vec<u32> = draft
                    .slots_on(day_index)
                    .filter(|s| !s.is_followup() && s.category == category)
                    .map(|s| s.slot_id)
                    .collect();
                let quota = ctx.config.quota(category, weekday);
                if ids.len() as u32 > quota {
                    out.push(Violation {
                        kind: ViolationKind::CategoryDailyTotal,
                        detail: format!(
                            "{} {} 槽位数 {} 超过日配额 {}",
                            date,
                            category,
                            ids.len(),
                            quota
                        ),
                        entity_ids: slot_ids(&ids),
                    });
                }
                weekly.entry(category).or_default().extend(ids);
            }
        }

        for category in SendCategory::ALL {
            let ids = weekly.remove(&category).unwrap_or_default();
            let limit = ctx.config.weekly.get(category);
            if ids.len() as u32 > limit {
                out.push(Violation {
                    kind: ViolationKind::CategoryWeeklyTotal,
                    detail: format!("{} 周槽位数 {} 超过周配额 {}", category, ids.len(), limit),
                    entity_ids: slot_ids(&ids),
                });
            }
        }
    }

    // ===== 发送类型上限 / 页面兼容 =====
    fn check_send_types(
        &self,
        draft: &ScheduleDraft,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        let by_key: HashMap<SendTypeKey, &SendTypeDefinition> =
            ctx.definitions.iter().map(|d| (d.key, d)).collect();

        let mut per_day: BTreeMap<(u8, SendTypeKey), Vec<u32>> = BTreeMap::new();
        let mut per_week: BTreeMap<SendTypeKey, Vec<u32>> = BTreeMap::new();

        for slot in &draft.slots {
            per_day.entry((slot.day_index, slot.send_type)).or_default().push(slot.slot_id);
            per_week.entry(slot.send_type).or_default().push(slot.slot_id);

            match by_key.get(&slot.send_type) {
                Some(def) if !def.page_restriction.allows(ctx.page_type) => {
                    out.push(Violation {
                        kind: ViolationKind::PageTypeIncompatible,
                        detail: format!(
                            "{} 限制为 {}, 页面类型 {}",
                            slot.send_type, def.page_restriction, ctx.page_type
                        ),
                        entity_ids: slot_ids(&[slot.slot_id]),
                    });
                }
                Some(_) => {}
                None => {
                    out.push(Violation {
                        kind: ViolationKind::SendTypeCap,
                        detail: format!("发送类型 {} 不在可用目录中", slot.send_type),
                        entity_ids: slot_ids(&[slot.slot_id]),
                    });
                }
            }
        }

        for ((day_index, key), ids) in per_day {
            if let Some(def) = by_key.get(&key) {
                if ids.len() as u32 > def.max_per_day {
                    out.push(Violation {
                        kind: ViolationKind::SendTypeCap,
                        detail: format!(
                            "第 {} 天 {} 数量 {} 超过日上限 {}",
                            day_index,
                            key,
                            ids.len(),
                            def.max_per_day
                        ),
                        entity_ids: slot_ids(&ids),
                    });
                }
            }
        }
        for (key, ids) in per_week {
            if let Some(def) = by_key.get(&key) {
                if ids.len() as u32 > def.max_per_week {
                    out.push(Violation {
                        kind: ViolationKind::SendTypeCap,
                        detail: format!("{} 周数量 {} 超过周上限 {}", key, ids.len(), def.max_per_week),
                        entity_ids: slot_ids(&ids),
                    });
                }
            }
        }
    }

    // ===== 时间/内容完整性 + 内容新鲜度 =====
    fn check_completeness(
        &self,
        draft: &ScheduleDraft,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        let items: HashMap<&str, &ContentItem> =
            ctx.pool.iter().map(|c| (c.content_id.as_str(), c)).collect();
        let shortfall_types: HashSet<&str> = draft
            .warnings
            .iter()
            .filter_map(|w| match w {
                PipelineWarning::CaptionPool(c) => Some(c.content_type.as_str()),
                _ => None,
            })
            .collect();

        for slot in &draft.slots {
            if slot.time.is_none() {
                out.push(Violation {
                    kind: ViolationKind::MissingTime,
                    detail: format!("槽位 {} ({}) 未分配时间", slot.slot_id, slot.date),
                    entity_ids: slot_ids(&[slot.slot_id]),
                });
            }

            let Some(content_id) = slot.content_id.as_deref() else {
                out.push(Violation {
                    kind: ViolationKind::MissingContent,
                    detail: format!("槽位 {} ({}) 未选择内容", slot.slot_id, slot.date),
                    entity_ids: slot_ids(&[slot.slot_id]),
                });
                continue;
            };

            let (Some(item), Some(at)) = (items.get(content_id), slot.timestamp()) else {
                continue;
            };
            let Some(hours) = item.hours_since_use(at) else {
                continue;
            };
            if hours >= ctx.freshness.min_rest_hours as i64 {
                continue;
            }
            let demand_type = slot.content_type.as_deref().unwrap_or(ANY_CONTENT_TYPE);
            if shortfall_types.contains(demand_type) {
                continue;
            }
            out.push(Violation {
                kind: ViolationKind::StaleContent,
                detail: format!(
                    "内容 {} 距上次使用 {} 小时, 少于最短间隔 {} 小时",
                    content_id, hours, ctx.freshness.min_rest_hours
                ),
                entity_ids: vec![slot.slot_id.to_string(), content_id.to_string()],
            });
        }
    }

    // ===== 非跟进槽位时间戳唯一 + 最小间隔 =====
    fn check_timestamps(
        &self,
        draft: &ScheduleDraft,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        let spacing = ctx.timing.min_spacing_minutes as i64;

        for day_index in 0..7u8 {
            let mut timed: Vec<&ScheduleSlot> = draft
                .slots_on(day_index)
                .filter(|s| !s.is_followup() && s.time.is_some())
                .collect();
            timed.sort_by_key(|s| (s.time, s.slot_id));

            for pair in timed.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let (Some(ta), Some(tb)) = (a.time, b.time) else {
                    continue;
                };
                let gap = (tb - ta).num_minutes();
                if gap == 0 {
                    out.push(Violation {
                        kind: ViolationKind::DuplicateTimestamp,
                        detail: format!("{} {} 存在重复发送时间", a.date, ta),
                        entity_ids: slot_ids(&[a.slot_id, b.slot_id]),
                    });
                } else if gap < spacing {
                    out.push(Violation {
                        kind: ViolationKind::SlotSpacing,
                        detail: format!(
                            "{} {} 与 {} 间隔 {} 分钟, 少于 {} 分钟",
                            a.date, ta, tb, gap, spacing
                        ),
                        entity_ids: slot_ids(&[a.slot_id, b.slot_id]),
                    });
                }
            }
        }
    }

    // ===== 跟进 =====
    fn check_followups(
        &self,
        draft: &ScheduleDraft,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        let min_delay = ctx.followup.min_delay_minutes as i64;
        let mut per_day: BTreeMap<u8, Vec<u32>> = BTreeMap::new();

        for slot in draft.slots.iter().filter(|s| s.is_followup()) {
            per_day.entry(slot.day_index).or_default().push(slot.slot_id);

            let parent = slot.parent_slot_id.and_then(|id| draft.slot(id));
            let Some(parent) = parent else {
                out.push(Violation {
                    kind: ViolationKind::FollowupParent,
                    detail: format!("跟进槽位 {} 缺少父槽位", slot.slot_id),
                    entity_ids: slot_ids(&[slot.slot_id]),
                });
                continue;
            };

            if parent.is_followup() || parent.date != slot.date {
                out.push(Violation {
                    kind: ViolationKind::FollowupParent,
                    detail: format!(
                        "跟进槽位 {} 的父槽位 {} 必须为同日非跟进槽位",
                        slot.slot_id, parent.slot_id
                    ),
                    entity_ids: slot_ids(&[slot.slot_id, parent.slot_id]),
                });
                continue;
            }

            if slot.content_id.is_some() && slot.content_id == parent.content_id {
                out.push(Violation {
                    kind: ViolationKind::FollowupParent,
                    detail: format!("跟进槽位 {} 与父槽位使用相同内容", slot.slot_id),
                    entity_ids: slot_ids(&[slot.slot_id, parent.slot_id]),
                });
            }

            if let (Some(t), Some(pt)) = (slot.timestamp(), parent.timestamp()) {
                let delay = (t - pt).num_minutes();
                if delay < min_delay {
                    out.push(Violation {
                        kind: ViolationKind::FollowupSpacing,
                        detail: format!(
                            "跟进槽位 {} 距父槽位 {} 分钟, 少于 {} 分钟",
                            slot.slot_id, delay, min_delay
                        ),
                        entity_ids: slot_ids(&[slot.slot_id, parent.slot_id]),
                    });
                }
            }
        }

        for (day_index, ids) in per_day {
            if ids.len() as u32 > ctx.followup.max_per_day {
                out.push(Violation {
                    kind: ViolationKind::FollowupCount,
                    detail: format!(
                        "第 {} 天跟进数 {} 超过上限 {}",
                        day_index,
                        ids.len(),
                        ctx.followup.max_per_day
                    ),
                    entity_ids: slot_ids(&ids),
                });
            }
        }
    }
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_ids(ids: &[u32]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::send_type::SendTypeRecord;
    use crate::domain::types::{CategoryCounts, VolumeLevel};
    use crate::engine::key_resolver::KeyResolver;
    use chrono::{NaiveDate, NaiveTime};

    fn week_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn config() -> VolumeConfig {
        VolumeConfig {
            account_id: "A1".to_string(),
            volume_level: VolumeLevel::Mid,
            weekly: CategoryCounts { revenue: 14, engagement: 14, retention: 7 },
            daily: CategoryCounts { revenue: 2, engagement: 2, retention: 1 },
            weekly_plan: CategoryCounts {
                revenue: [2; 7],
                engagement: [2; 7],
                retention: [1; 7],
            },
            dow_multipliers: [1.0 / 7.0; 7],
            content_type_weights: BTreeMap::new(),
            elasticity_capped: false,
            confidence: 1.0,
            fused_score: None,
            calculated_at: week_start().and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    fn slot(slot_id: u32, hour: u32, minute: u32, send_type: SendTypeKey, parent: Option<u32>) -> ScheduleSlot {
        ScheduleSlot {
            slot_id,
            day_index: 0,
            date: week_start(),
            time: NaiveTime::from_hms_opt(hour, minute, 0),
            send_type,
            category: send_type.category(),
            content_type: None,
            content_id: Some(format!("C{}", slot_id)),
            price: None,
            parent_slot_id: parent,
        }
    }

    fn validate(draft: &ScheduleDraft, page_type: PageType, pool: &[ContentItem]) -> ValidationReport {
        let defs = KeyResolver::standard().resolve_catalog(&SendTypeRecord::standard_catalog(), week_start());
        let config = config();
        let timing = TimingParams::default();
        let followup = FollowupParams::default();
        let freshness = FreshnessParams::default();
        let ctx = ValidationContext {
            config: &config,
            definitions: &defs,
            page_type,
            pool,
            timing: &timing,
            followup: &followup,
            freshness: &freshness,
        };
        QualityValidator::new().validate(draft, &ctx)
    }

    #[test]
    fn test_clean_draft_passes() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        draft.slots = vec![
            slot(1, 12, 0, SendTypeKey::PpvUnlock, None),
            slot(2, 12, 20, SendTypeKey::PpvFollowup, Some(1)),
            slot(3, 14, 0, SendTypeKey::BumpNormal, None),
            slot(4, 20, 0, SendTypeKey::RenewOn, None),
        ];
        let report = validate(&draft, PageType::Paid, &[]);
        assert!(report.passed, "{:?}", report.violations);
    }

    #[test]
    fn test_duplicate_timestamp_and_spacing() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        draft.slots = vec![
            slot(1, 12, 0, SendTypeKey::PpvUnlock, None),
            slot(2, 12, 0, SendTypeKey::BumpNormal, None),
            slot(3, 12, 30, SendTypeKey::LinkDrop, None),
        ];
        let report = validate(&draft, PageType::Paid, &[]);
        assert!(!report.passed);
        assert_eq!(report.count_of(ViolationKind::DuplicateTimestamp), 1);
        assert_eq!(report.count_of(ViolationKind::SlotSpacing), 1);
    }

    #[test]
    fn test_followup_rules() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        draft.slots = vec![
            slot(1, 12, 0, SendTypeKey::PpvUnlock, None),
            slot(2, 12, 10, SendTypeKey::PpvFollowup, Some(1)),
            slot(5, 15, 0, SendTypeKey::PpvFollowup, Some(99)),
        ];
        let report = validate(&draft, PageType::Paid, &[]);
        assert_eq!(report.count_of(ViolationKind::FollowupSpacing), 1);
        assert_eq!(report.count_of(ViolationKind::FollowupParent), 1);
    }

    #[test]
    fn test_page_type_and_category_totals() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        draft.slots = vec![
            slot(1, 9, 0, SendTypeKey::RenewOn, None),
            slot(2, 11, 0, SendTypeKey::ExpiredWinback, None),
        ];
        let report = validate(&draft, PageType::Free, &[]);
        assert_eq!(report.count_of(ViolationKind::PageTypeIncompatible), 2);
        assert_eq!(report.count_of(ViolationKind::CategoryDailyTotal), 1);
    }

    #[test]
    fn test_missing_content_and_stale_content() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        let mut missing = slot(1, 9, 0, SendTypeKey::BumpNormal, None);
        missing.content_id = None;
        let stale = slot(2, 12, 0, SendTypeKey::PpvUnlock, None);
        draft.slots = vec![missing, stale];
        let pool = vec![ContentItem {
            content_id: "C2".to_string(),
            account_id: "A1".to_string(),
            content_type: "Studio".to_string(),
            last_used_at: week_start().and_hms_opt(2, 0, 0),
            performance_score: 50.0,
        }];

        let report = validate(&draft, PageType::Paid, &pool);
        assert_eq!(report.count_of(ViolationKind::MissingContent), 1);
        assert_eq!(report.count_of(ViolationKind::StaleContent), 1);
    }
}
