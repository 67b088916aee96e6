// ==========================================
// 创作者发送排期系统 - 发送类型分配引擎
// ==========================================
// 职责: VolumeConfig → (日期, 发送类型, 类别) 槽位
// 输入: 发送量配置 + 已解析发送类型定义 + 页面类型
// 输出: 新草稿 (含槽位与告警)
// 红线:
// - 每类型日上限 / 周上限 不得突破
// - 无兼容类型时丢弃当日该类别配额并告警, 不得凭空造槽
// - 跟进类型不参与类别配额分配
// ==========================================

use crate::domain::schedule::{PipelineWarning, ScheduleDraft, ScheduleSlot};
use crate::domain::send_type::{SendTypeDefinition, SendTypeKey};
use crate::domain::types::{PageType, SendCategory};
use crate::domain::volume::VolumeConfig;
use crate::engine::error::{EngineError, EngineResult};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

/// 单日单类别分配结果
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDayAllocation {
    pub requested: u32,
    pub picks: Vec<SendTypeKey>,
}

// ==========================================
// SendTypeAllocator - 发送类型分配引擎
// ==========================================
pub struct SendTypeAllocator {
    // 无状态引擎
}

impl SendTypeAllocator {
    pub fn new() -> Self {
        Self {}
    }

    /// 当日某类别的贪心分配
    ///
    /// # 参数
    /// - quota: 当日类别配额
    /// - definitions: 已解析发送类型定义
    /// - weekly_used: 本周各类型已用次数（跨天共享）
    ///
    /// # 返回
    /// - `Ok`: 分配结果（可能未填满）
    /// - `Err(AllocationInfeasible)`: 不存在兼容发送类型
    pub fn allocate_category_day(
        &self,
        date: NaiveDate,
        category: SendCategory,
        quota: u32,
        page_type: PageType,
        definitions: &[SendTypeDefinition],
        weekly_used: &HashMap<SendTypeKey, u32>,
    ) -> EngineResult<CategoryDayAllocation> {
        let mut compatible: Vec<&SendTypeDefinition> = definitions
            .iter()
            .filter(|d| d.category == category)
            .filter(|d| !d.key.is_followup())
            .filter(|d| d.page_restriction.allows(page_type))
            .collect();

        if compatible.is_empty() {
            return Err(EngineError::AllocationInfeasible {
                date,
                category: category.to_string(),
                page_type: page_type.to_string(),
            });
        }

        // 历史表现降序, 并列按 key 顺序
        compatible.sort_by(|a, b| {
            b.performance_score
                .partial_cmp(&a.performance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.key.cmp(&b.key))
        });

        let mut remaining = quota;
        let mut picks = Vec::with_capacity(quota as usize);
        for def in compatible {
            if remaining == 0 {
                break;
            }
            let used = weekly_used.get(&def.key).copied().unwrap_or(0);
            let weekly_left = def.max_per_week.saturating_sub(used);
            let take = remaining.min(def.max_per_day).min(weekly_left);
            for _ in 0..take {
                picks.push(def.key);
            }
            remaining -= take;
        }

        Ok(CategoryDayAllocation {
            requested: quota,
            picks,
        })
    }

    /// 整周分配
    ///
    /// # 逻辑
    /// 1. 按日顺序处理（周上限跨天共享）
    /// 2. 每日按 变现 → 互动 → 留存 顺序取配额
    /// 3. AllocationInfeasible → 丢弃当日该类别配额 + CategoryDropped 告警
    /// 4. 未填满 → QuotaShortfall 告警
    /// 5. 为槽位分配内容类型要求与默认价格
    #[instrument(skip_all, fields(account_id = %draft.account_id, week_start = %draft.week_start))]
    pub fn allocate(
        &self,
        draft: &ScheduleDraft,
        config: &VolumeConfig,
        definitions: &[SendTypeDefinition],
        page_type: PageType,
    ) -> ScheduleDraft {
        let by_key: HashMap<SendTypeKey, &SendTypeDefinition> =
            definitions.iter().map(|d| (d.key, d)).collect();

        let mut slots = draft.slots.clone();
        let mut warnings = Vec::new();
        let mut weekly_used: HashMap<SendTypeKey, u32> = HashMap::new();
        let mut content_balancer = ContentTypeBalancer::new(&config.content_type_weights);
        let mut next_id = draft.next_slot_id();

        for day_index in 0..7u8 {
            let date = draft.week_start + Duration::days(day_index as i64);
            let weekday = date.weekday().num_days_from_monday() as usize;

            for category in SendCategory::ALL {
                let quota = config.quota(category, weekday);
                if quota == 0 {
                    continue;
                }

                let allocation = match self.allocate_category_day(
                    date,
                    category,
                    quota,
                    page_type,
                    definitions,
                    &weekly_used,
                ) {
                    Ok(a) => a,
                    Err(e @ EngineError::AllocationInfeasible { .. }) => {
                        warn!(date = %date, category = %category, dropped = quota, "无兼容发送类型, 丢弃当日配额");
                        warnings.push(PipelineWarning::CategoryDropped {
                            date,
                            category,
                            dropped: quota,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                    Err(e) => {
                        warn!(date = %date, category = %category, error = %e, "分配异常, 跳过");
                        continue;
                    }
                };

                let allocated = allocation.picks.len() as u32;
                if allocated < allocation.requested {
                    warnings.push(PipelineWarning::QuotaShortfall {
                        date,
                        category,
                        requested: allocation.requested,
                        allocated,
                    });
                }

                for key in allocation.picks {
                    *weekly_used.entry(key).or_insert(0) += 1;
                    let def = by_key.get(&key);
                    let required: &[String] = def.map(|d| d.required_content_types.as_slice()).unwrap_or(&[]);
                    slots.push(ScheduleSlot {
                        slot_id: next_id,
                        day_index,
                        date,
                        time: None,
                        send_type: key,
                        category,
                        content_type: content_balancer.pick(required),
                        content_id: None,
                        price: if category == SendCategory::Revenue {
                            def.and_then(|d| d.base_price)
                        } else {
                            None
                        },
                        parent_slot_id: None,
                    });
                    next_id += 1;
                }
            }
        }

        debug!(slot_count = slots.len(), warnings = warnings.len(), "发送类型分配完成");
        draft.derive(slots, warnings)
    }
}

impl Default for SendTypeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// ContentTypeBalancer - 内容类型按权重摊派
// ==========================================
// 每次选取 (权重 × 已分配总数+1 − 该类型已分配数) 最大的类型
struct ContentTypeBalancer<'a> {
    weights: &'a BTreeMap<String, f64>,
    assigned: BTreeMap<String, u32>,
    total: u32,
}

impl<'a> ContentTypeBalancer<'a> {
    fn new(weights: &'a BTreeMap<String, f64>) -> Self {
        Self {
            weights,
            assigned: BTreeMap::new(),
            total: 0,
        }
    }

    fn pick(&mut self, required: &[String]) -> Option<String> {
        let weights = self.weights;
        let candidates: Vec<&String> = if required.is_empty() {
            weights.keys().collect()
        } else {
            required.iter().collect()
        };
        if candidates.is_empty() {
            return None;
        }

        let fallback = 1.0 / candidates.len() as f64;
        let mut best: Option<(&String, f64)> = None;
        for ct in candidates {
            let weight = weights.get(ct).copied().filter(|w| *w > 0.0).unwrap_or(
                if required.is_empty() { 0.0 } else { fallback },
            );
            let deficit =
                weight * (self.total + 1) as f64 - self.assigned.get(ct).copied().unwrap_or(0) as f64;
            match best {
                Some((_, d)) if d >= deficit => {}
                _ => best = Some((ct, deficit)),
            }
        }

        let chosen = best.map(|(ct, _)| ct.clone())?;
        *self.assigned.entry(chosen.clone()).or_insert(0) += 1;
        self.total += 1;
        Some(chosen)
    }
}
