// ==========================================
// 创作者发送排期系统 - 跟进槽位生成引擎
// ==========================================
// 职责: 为已定时的变现槽位追加跟进槽位
// 输入: 已定时草稿 + 发送类型定义 + 内容池
// 输出: 新草稿 (追加跟进槽位 + FollowupSkipped 告警)
// 红线:
// - 每日跟进数 <= max_per_day
// - 跟进时间 >= 父槽位时间 + min_delay, 且早于同类别下一槽位
// - 跟进内容与父槽位内容类型相同, 但 content_id 不同
// - 跟进不计入类别配额
// ==========================================

use crate::config::{FollowupParams, FreshnessParams, TimingParams};
use crate::domain::content::ContentItem;
use crate::domain::schedule::{PipelineWarning, ScheduleDraft, ScheduleSlot};
use crate::domain::send_type::{SendTypeDefinition, SendTypeKey};
use crate::domain::types::SendCategory;
use crate::engine::content_selector::ContentSelector;
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

pub struct FollowupLinker {
    // 无状态引擎
}

impl FollowupLinker {
    pub fn new() -> Self {
        Self {}
    }

    /// 生成跟进槽位
    ///
    /// # 逻辑
    /// 1. 每日父槽位候选: 已定时、可挂跟进的变现槽位, 价格降序
    /// 2. 时间 = 父时间 + min_delay; 必须在窗口内且早于同类别下一槽位
    /// 3. 内容: 父槽位同类型、不同 content_id、不在休息期, 优先本次未使用的
    /// 4. 任一条件不满足 → FollowupSkipped, 不影响其他父槽位
    #[instrument(skip_all, fields(account_id = %draft.account_id, week_start = %draft.week_start))]
    pub fn link(
        &self,
        draft: &ScheduleDraft,
        defs: &[SendTypeDefinition],
        pool: &[ContentItem],
        params: &FollowupParams,
        timing: &TimingParams,
        freshness: &FreshnessParams,
    ) -> ScheduleDraft {
        let eligible: HashSet<SendTypeKey> = defs
            .iter()
            .filter(|d| d.followup_eligible && !d.key.is_followup())
            .map(|d| d.key)
            .collect();
        let followup_def = defs.iter().find(|d| d.key.is_followup());
        let day_limit = followup_def
            .map(|d| d.max_per_day.min(params.max_per_day))
            .unwrap_or(params.max_per_day);
        let mut week_left = followup_def.map(|d| d.max_per_week).unwrap_or(u32::MAX);

        let content_type_of: HashMap<&str, &str> = pool
            .iter()
            .map(|c| (c.content_id.as_str(), c.content_type.as_str()))
            .collect();
        let mut used: HashSet<String> = draft.slots.iter().filter_map(|s| s.content_id.clone()).collect();

        let mut slots = draft.slots.clone();
        let mut warnings = Vec::new();
        let mut next_id = draft.next_slot_id();
        let delay = Duration::minutes(params.min_delay_minutes as i64);

        for day_index in 0..7u8 {
            let day_slots: Vec<&ScheduleSlot> = draft.slots_on(day_index).collect();
            let mut parents: Vec<&ScheduleSlot> = day_slots
                .iter()
                .copied()
                .filter(|s| !s.is_followup() && s.category == SendCategory::Revenue)
                .filter(|s| eligible.contains(&s.send_type) && s.time.is_some())
                .collect();
            parents.sort_by(|a, b| {
                b.price_or_zero()
                    .partial_cmp(&a.price_or_zero())
                    .unwrap_or(Ordering::Equal)
                    .then(a.time.cmp(&b.time))
                    .then(a.slot_id.cmp(&b.slot_id))
            });

            let mut created = 0u32;
            for parent in parents {
                if created >= day_limit || week_left == 0 {
                    break;
                }
                let Some(parent_at) = parent.timestamp() else {
                    continue;
                };

                let skip = |reason: String| PipelineWarning::FollowupSkipped {
                    date: parent.date,
                    parent_slot_id: parent.slot_id,
                    reason,
                };

                // ===== 时间 =====
                let at = parent_at + delay;
                let window_end = parent.date.and_time(minute_to_time(timing.window_end_minute));
                if at.date() != parent.date || at > window_end {
                    warnings.push(skip("跟进时间超出当日发送窗口".to_string()));
                    continue;
                }
                let next_same_category = day_slots
                    .iter()
                    .filter(|s| !s.is_followup() && s.category == parent.category)
                    .filter_map(|s| s.timestamp())
                    .filter(|t| *t > parent_at)
                    .min();
                if let Some(next) = next_same_category {
                    if at >= next {
                        warnings.push(skip(format!("跟进时间不早于下一变现槽位 {}", next.time())));
                        continue;
                    }
                }

                // ===== 内容 =====
                let content_type = parent.content_type.clone().or_else(|| {
                    parent
                        .content_id
                        .as_deref()
                        .and_then(|id| content_type_of.get(id))
                        .map(|t| t.to_string())
                });
                let Some(content_type) = content_type else {
                    warnings.push(skip("父槽位内容类型未知".to_string()));
                    continue;
                };
                let Some(item) =
                    pick_content(pool, &content_type, parent.content_id.as_deref(), &used, at, freshness)
                else {
                    warnings.push(skip(format!("内容类型 {} 无可用跟进素材", content_type)));
                    continue;
                };

                used.insert(item.content_id.clone());
                debug!(
                    parent_slot_id = parent.slot_id,
                    slot_id = next_id,
                    time = %at.time(),
                    content_id = %item.content_id,
                    "跟进槽位已生成"
                );
                slots.push(ScheduleSlot {
                    slot_id: next_id,
                    day_index,
                    date: parent.date,
                    time: Some(at.time()),
                    send_type: SendTypeKey::PpvFollowup,
                    category: SendCategory::Revenue,
                    content_type: Some(content_type),
                    content_id: Some(item.content_id.clone()),
                    price: parent.price,
                    parent_slot_id: Some(parent.slot_id),
                });
                next_id += 1;
                created += 1;
                week_left = week_left.saturating_sub(1);
            }
        }

        draft.derive(slots, warnings)
    }
}

impl Default for FollowupLinker {
    fn default() -> Self {
        Self::new()
    }
}

/// 跟进素材: 同类型, 不同于父内容, 不在休息期; 本次未使用者优先, 再按新鲜度
fn pick_content<'a>(
    pool: &'a [ContentItem],
    content_type: &str,
    parent_content_id: Option<&str>,
    used: &HashSet<String>,
    at: NaiveDateTime,
    freshness: &FreshnessParams,
) -> Option<&'a ContentItem> {
    pool.iter()
        .filter(|c| c.content_type == content_type)
        .filter(|c| Some(c.content_id.as_str()) != parent_content_id)
        .filter(|c| !ContentSelector::is_resting(c, at, freshness))
        .max_by(|a, b| {
            let fresh_a = !used.contains(&a.content_id);
            let fresh_b = !used.contains(&b.content_id);
            fresh_a
                .cmp(&fresh_b)
                .then(
                    ContentSelector::freshness_score(a, at, freshness)
                        .partial_cmp(&ContentSelector::freshness_score(b, at, freshness))
                        .unwrap_or(Ordering::Equal),
                )
                .then(b.content_id.cmp(&a.content_id))
        })
}

fn minute_to_time(minute_of_day: u32) -> NaiveTime {
    let minute = minute_of_day.min(24 * 60 - 1);
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap_or_default()
}

/// 当日分钟数
pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::send_type::SendTypeRecord;
    use crate::engine::key_resolver::KeyResolver;
    use chrono::NaiveDate;

    fn week_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn defs() -> Vec<SendTypeDefinition> {
        KeyResolver::standard().resolve_catalog(&SendTypeRecord::standard_catalog(), week_start())
    }

    fn revenue(slot_id: u32, hour: u32, price: f64, content_id: &str) -> ScheduleSlot {
        ScheduleSlot {
            slot_id,
            day_index: 0,
            date: week_start(),
            time: NaiveTime::from_hms_opt(hour, 0, 0),
            send_type: SendTypeKey::PpvUnlock,
            category: SendCategory::Revenue,
            content_type: Some("Studio".to_string()),
            content_id: Some(content_id.to_string()),
            price: Some(price),
            parent_slot_id: None,
        }
    }

    fn pool(n: usize) -> Vec<ContentItem> {
        (1..=n)
            .map(|i| ContentItem {
                content_id: format!("S{}", i),
                account_id: "A1".to_string(),
                content_type: "Studio".to_string(),
                last_used_at: None,
                performance_score: 50.0,
            })
            .collect()
    }

    fn link(draft: &ScheduleDraft, pool: &[ContentItem], params: &FollowupParams) -> ScheduleDraft {
        FollowupLinker::new().link(
            draft,
            &defs(),
            pool,
            params,
            &TimingParams::default(),
            &FreshnessParams::default(),
        )
    }

    #[test]
    fn test_followup_timed_after_parent_with_other_content() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        draft.slots = vec![revenue(1, 12, 25.0, "S1")];

        let out = link(&draft, &pool(3), &FollowupParams::default());
        let followups: Vec<_> = out.slots.iter().filter(|s| s.is_followup()).collect();
        assert_eq!(followups.len(), 1);
        let f = followups[0];
        assert_eq!(f.parent_slot_id, Some(1));
        assert_eq!(f.time, NaiveTime::from_hms_opt(12, 20, 0));
        assert_ne!(f.content_id.as_deref(), Some("S1"));
        assert_eq!(f.price, Some(25.0));
    }

    #[test]
    fn test_daily_followup_limit() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        draft.slots = (0..6)
            .map(|i| revenue(i + 1, 9 + 2 * i, 20.0 + i as f64, &format!("S{}", i + 1)))
            .collect();
        let params = FollowupParams {
            max_per_day: 2,
            ..FollowupParams::default()
        };

        let out = link(&draft, &pool(12), &params);
        let followups: Vec<_> = out.slots.iter().filter(|s| s.is_followup()).collect();
        assert_eq!(followups.len(), 2);
        // 高价父槽位优先
        let parents: HashSet<u32> = followups.iter().filter_map(|f| f.parent_slot_id).collect();
        assert_eq!(parents, HashSet::from([6, 5]));
    }

    #[test]
    fn test_followup_skipped_when_next_revenue_too_close() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        let mut second = revenue(2, 12, 10.0, "S2");
        second.time = NaiveTime::from_hms_opt(12, 15, 0);
        draft.slots = vec![revenue(1, 12, 25.0, "S1"), second];

        let out = link(&draft, &pool(5), &FollowupParams::default());
        let skipped = out
            .warnings
            .iter()
            .filter(|w| matches!(w, PipelineWarning::FollowupSkipped { parent_slot_id: 1, .. }))
            .count();
        assert_eq!(skipped, 1);
        assert!(out.slots.iter().all(|s| s.parent_slot_id != Some(1)));
    }

    #[test]
    fn test_followup_skipped_without_distinct_content() {
        let mut draft = ScheduleDraft::new("A1", week_start());
        draft.slots = vec![revenue(1, 12, 25.0, "S1")];

        let out = link(&draft, &pool(1), &FollowupParams::default());
        assert!(out.slots.iter().all(|s| !s.is_followup()));
        assert!(matches!(
            out.warnings.as_slice(),
            [PipelineWarning::FollowupSkipped { parent_slot_id: 1, .. }]
        ));
    }
}
