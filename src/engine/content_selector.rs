// ==========================================
// 创作者发送排期系统 - 内容新鲜度选择引擎
// ==========================================
// 职责: 为每个槽位选择内容素材
// 输入: 草稿 + 账号内容池快照
// 输出: 新草稿 (content_id 填充 + CaptionPoolWarning)
// 红线:
// - 单次运行内不重复使用同一素材（内容池不足时除外）
// - 内容池不足非致命: 允许复用, 每个内容类型只告警一次
// - 规划阶段不修改素材 last_used_at
// ==========================================

use crate::config::FreshnessParams;
use crate::domain::content::ContentItem;
use crate::domain::schedule::{CaptionPoolWarning, PipelineWarning, ScheduleDraft, ScheduleSlot};
use chrono::{NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument, warn};

/// 不限内容类型的槽位在告警中使用的类型名
pub const ANY_CONTENT_TYPE: &str = "ANY";

// ==========================================
// ContentSelector - 内容新鲜度选择引擎
// ==========================================
pub struct ContentSelector {
    // 无状态引擎
}

impl ContentSelector {
    pub fn new() -> Self {
        Self {}
    }

    /// 新鲜度评分 ∈ [0,1]
    ///
    /// - 时间项: 从未使用 = 1; 否则 距上次使用天数 / freshness_horizon_days, 截断到 1
    /// - 表现项: performance_score / 100
    pub fn freshness_score(item: &ContentItem, at: NaiveDateTime, params: &FreshnessParams) -> f64 {
        let recency = match item.hours_since_use(at) {
            None => 1.0,
            Some(hours) => {
                let horizon_hours = params.freshness_horizon_days.max(1) as f64 * 24.0;
                (hours.max(0) as f64 / horizon_hours).clamp(0.0, 1.0)
            }
        };
        let performance = (item.performance_score / 100.0).clamp(0.0, 1.0);

        let weight_sum = params.recency_weight + params.performance_weight;
        if weight_sum <= 0.0 {
            return recency;
        }
        (params.recency_weight * recency + params.performance_weight * performance) / weight_sum
    }

    /// 是否仍在休息期（距上次使用不足 min_rest_hours）
    pub fn is_resting(item: &ContentItem, at: NaiveDateTime, params: &FreshnessParams) -> bool {
        match item.hours_since_use(at) {
            None => false,
            Some(hours) => hours < params.min_rest_hours as i64,
        }
    }

    /// 为草稿中未选内容的槽位选择素材
    ///
    /// # 逻辑
    /// 1. 统计每个内容类型的需求量与可用量（周起始时不在休息期的素材）
    /// 2. 需求 > 可用 → 每类型一条 CaptionPoolWarning
    /// 3. 槽位按 变现优先 → 价格降序 → 日期 → slot_id 处理
    /// 4. 优先选未使用且不在休息期的最高分素材; 否则复用使用次数最少的素材
    #[instrument(skip_all, fields(account_id = %draft.account_id, pool_size = pool.len()))]
    pub fn select(
        &self,
        draft: &ScheduleDraft,
        pool: &[ContentItem],
        params: &FreshnessParams,
    ) -> ScheduleDraft {
        let week_start_at = draft.week_start.and_time(NaiveTime::default());

        // ===== 1/2. 需求与可用量 =====
        let mut demand: BTreeMap<String, usize> = BTreeMap::new();
        for slot in draft.slots.iter().filter(|s| s.content_id.is_none()) {
            *demand.entry(demand_key(slot)).or_insert(0) += 1;
        }

        let mut warnings = Vec::new();
        for (content_type, required) in &demand {
            let available = candidates_for(pool, content_type)
                .filter(|item| !Self::is_resting(item, week_start_at, params))
                .count();
            if *required > available {
                let warning = CaptionPoolWarning {
                    content_type: content_type.clone(),
                    required: *required,
                    available,
                    shortfall: required - available,
                };
                warn!(
                    content_type = %warning.content_type,
                    required = warning.required,
                    available = warning.available,
                    shortfall = warning.shortfall,
                    "内容池不足, 允许复用"
                );
                warnings.push(PipelineWarning::CaptionPool(warning));
            }
        }

        // ===== 3. 处理顺序 =====
        let mut order: Vec<usize> = (0..draft.slots.len())
            .filter(|i| draft.slots[*i].content_id.is_none())
            .collect();
        order.sort_by(|a, b| {
            let sa = &draft.slots[*a];
            let sb = &draft.slots[*b];
            sa.category
                .priority_rank()
                .cmp(&sb.category.priority_rank())
                .then(
                    sb.price_or_zero()
                        .partial_cmp(&sa.price_or_zero())
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(sa.date.cmp(&sb.date))
                .then(sa.slot_id.cmp(&sb.slot_id))
        });

        // ===== 4. 逐槽位选择 =====
        let mut slots = draft.slots.clone();
        let mut use_count: HashMap<String, u32> = draft
            .slots
            .iter()
            .filter_map(|s| s.content_id.clone())
            .fold(HashMap::new(), |mut acc, id| {
                *acc.entry(id).or_insert(0) += 1;
                acc
            });
        let mut used: HashSet<String> = use_count.keys().cloned().collect();

        for idx in order {
            let slot_at = slots[idx].date.and_time(NaiveTime::default());
            let key = demand_key(&slots[idx]);

            let fresh = candidates_for(pool, &key)
                .filter(|item| !used.contains(&item.content_id))
                .filter(|item| !Self::is_resting(item, slot_at, params))
                .max_by(|a, b| compare_score(a, b, slot_at, params));

            let chosen = match fresh {
                Some(item) => Some(item),
                None => candidates_for(pool, &key).min_by(|a, b| {
                    let ua = use_count.get(&a.content_id).copied().unwrap_or(0);
                    let ub = use_count.get(&b.content_id).copied().unwrap_or(0);
                    ua.cmp(&ub)
                        .then(
                            Self::is_resting(a, slot_at, params)
                                .cmp(&Self::is_resting(b, slot_at, params)),
                        )
                        .then(compare_score(b, a, slot_at, params))
                }),
            };

            if let Some(item) = chosen {
                used.insert(item.content_id.clone());
                *use_count.entry(item.content_id.clone()).or_insert(0) += 1;
                slots[idx].content_id = Some(item.content_id.clone());
            } else {
                debug!(slot_id = slots[idx].slot_id, content_type = %key, "无可用素材");
            }
        }

        draft.derive(slots, warnings)
    }
}

impl Default for ContentSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn demand_key(slot: &ScheduleSlot) -> String {
    slot.content_type
        .clone()
        .unwrap_or_else(|| ANY_CONTENT_TYPE.to_string())
}

fn candidates_for<'a>(pool: &'a [ContentItem], key: &'a str) -> impl Iterator<Item = &'a ContentItem> + 'a {
    pool.iter()
        .filter(move |item| key == ANY_CONTENT_TYPE || item.content_type == key)
}

/// 评分升序比较（同分按 content_id 倒序, 使 max_by 取字典序最小者）
fn compare_score(
    a: &ContentItem,
    b: &ContentItem,
    at: NaiveDateTime,
    params: &FreshnessParams,
) -> std::cmp::Ordering {
    ContentSelector::freshness_score(a, at, params)
        .partial_cmp(&ContentSelector::freshness_score(b, at, params))
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(b.content_id.cmp(&a.content_id))
}
