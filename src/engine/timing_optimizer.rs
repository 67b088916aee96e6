// ==========================================
// 创作者发送排期系统 - 发送时间优化引擎
// ==========================================
// 职责: 为非跟进槽位分配当日发送时间
// 输入: 已选内容的草稿 + 每小时历史表现
// 输出: 新草稿 (time 填充)
// 红线:
// - 同日任意两个非跟进槽位间隔 >= min_spacing_minutes
// - 只有当日槽位数超过窗口容量时才报 TimingConflict
// - 冲突恢复: 丢弃当日最低优先级槽位后重排, 次数由重试策略限定
// ==========================================

use crate::config::TimingParams;
use crate::domain::performance::PerformanceSnapshot;
use crate::domain::schedule::{PipelineWarning, ScheduleDraft, ScheduleSlot};
use crate::engine::error::{EngineError, EngineResult, StageAbort};
use crate::engine::retry::RetryPolicy;
use chrono::{NaiveDate, NaiveTime};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// 单日时间分配结果
pub type DayTimes = Vec<(u32, NaiveTime)>;

// ==========================================
// TimingOptimizer - 发送时间优化引擎
// ==========================================
pub struct TimingOptimizer {
    // 无状态引擎
}

impl TimingOptimizer {
    pub fn new() -> Self {
        Self {}
    }

    /// 候选时间（当日分钟数）按表现降序, 同分取更早
    ///
    /// 无每小时历史时使用通用黄金时段权重
    pub fn ranked_candidates(hourly: &[f64; 24], params: &TimingParams) -> Vec<u32> {
        let has_history = hourly.iter().any(|v| *v > 0.0);
        let weights = if has_history {
            hourly
        } else {
            &params.generic_hour_weights
        };

        let mut candidates = grid(params);
        candidates.sort_by(|a, b| {
            let wa = weights[(*a / 60) as usize % 24];
            let wb = weights[(*b / 60) as usize % 24];
            wb.partial_cmp(&wa).unwrap_or(Ordering::Equal).then(a.cmp(b))
        });
        candidates
    }

    /// 当日可容纳的最大槽位数（从窗口末端按最小间隔贪心排布）
    pub fn day_capacity(params: &TimingParams) -> usize {
        packed_layout(params).len()
    }

    /// 单日时间分配
    ///
    /// # 逻辑
    /// 1. 槽位按 价格降序 → 类别优先级 稳定排序
    /// 2. 依次取排名最高、且与已分配时间间隔足够的候选时间
    /// 3. 贪心失败但槽位数未超容量时, 改用等间隔排布中表现最好的时间点
    ///
    /// # 返回
    /// - `Err(TimingConflict)`: 槽位数超过窗口容量
    pub fn assign_day(
        &self,
        date: NaiveDate,
        slots: &[ScheduleSlot],
        ranked: &[u32],
        params: &TimingParams,
    ) -> EngineResult<DayTimes> {
        let ordered = priority_order(slots);
        let spacing = params.min_spacing_minutes.max(1);

        let mut taken: Vec<u32> = Vec::with_capacity(ordered.len());
        for _ in &ordered {
            let next = ranked
                .iter()
                .copied()
                .find(|m| taken.iter().all(|t| t.abs_diff(*m) >= spacing));
            match next {
                Some(m) => taken.push(m),
                None => break,
            }
        }

        if taken.len() < ordered.len() {
            let layout = packed_layout(params);
            if ordered.len() > layout.len() {
                return Err(EngineError::TimingConflict {
                    date,
                    slot_count: ordered.len(),
                    available: layout.len(),
                });
            }
            debug!(date = %date, slot_count = ordered.len(), "贪心分配失败, 改用等间隔排布");
            let rank_of: HashMap<u32, usize> =
                ranked.iter().enumerate().map(|(i, m)| (*m, i)).collect();
            let mut spaced = layout;
            spaced.sort_by_key(|m| rank_of.get(m).copied().unwrap_or(usize::MAX));
            spaced.truncate(ordered.len());
            taken = spaced;
        }

        Ok(ordered
            .iter()
            .zip(taken)
            .map(|(slot, minute)| (slot.slot_id, to_time(minute)))
            .collect())
    }

    /// 为整个草稿分配时间
    ///
    /// # 参数
    /// - retry: 冲突时的重试策略（每次重试前丢弃当日最低优先级槽位）
    ///
    /// # 返回
    /// - `Err(StageAbort)`: 重试耗尽后仍冲突, 携带草稿原有告警与已丢弃槽位
    #[instrument(skip_all, fields(account_id = %draft.account_id, week_start = %draft.week_start))]
    pub fn optimize(
        &self,
        draft: &ScheduleDraft,
        snapshot: &PerformanceSnapshot,
        params: &TimingParams,
        retry: &RetryPolicy,
    ) -> Result<ScheduleDraft, StageAbort> {
        let ranked = Self::ranked_candidates(&snapshot.hourly, params);
        let mut slots = draft.slots.clone();
        let mut warnings = Vec::new();

        for day_index in 0..7u8 {
            let date = draft.week_start + chrono::Duration::days(day_index as i64);
            let mut attempt = 0;

            loop {
                let day_slots: Vec<ScheduleSlot> = slots
                    .iter()
                    .filter(|s| s.day_index == day_index && !s.is_followup())
                    .cloned()
                    .collect();
                if day_slots.is_empty() {
                    break;
                }

                match self.assign_day(date, &day_slots, &ranked, params) {
                    Ok(times) => {
                        let by_id: HashMap<u32, NaiveTime> = times.into_iter().collect();
                        for slot in slots.iter_mut() {
                            if let Some(t) = by_id.get(&slot.slot_id) {
                                slot.time = Some(*t);
                            }
                        }
                        break;
                    }
                    Err(e) => {
                        if !retry.should_retry(attempt) {
                            warn!(date = %date, attempt, error = %e, "时间冲突重试耗尽");
                            return Err(Self::abort(draft, e, warnings));
                        }
                        attempt += 1;

                        let ordered = priority_order(&day_slots);
                        let Some(lowest) = ordered.last() else {
                            return Err(Self::abort(draft, e, warnings));
                        };
                        let dropped_id = lowest.slot_id;
                        warn!(
                            date = %date,
                            slot_id = dropped_id,
                            send_type = %lowest.send_type,
                            attempt,
                            "间隔无法满足, 丢弃最低优先级槽位"
                        );
                        warnings.push(PipelineWarning::SlotDropped {
                            date,
                            slot_id: dropped_id,
                            send_type: lowest.send_type,
                            reason: e.to_string(),
                        });
                        slots.retain(|s| s.slot_id != dropped_id);
                    }
                }
            }
        }

        Ok(draft.derive(slots, warnings))
    }

    fn abort(draft: &ScheduleDraft, error: EngineError, local: Vec<PipelineWarning>) -> StageAbort {
        let mut warnings = draft.warnings.clone();
        warnings.extend(local);
        StageAbort::new(error, warnings)
    }
}

impl Default for TimingOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// 价格降序 → 类别优先级 → slot_id（稳定）
fn priority_order(slots: &[ScheduleSlot]) -> Vec<&ScheduleSlot> {
    let mut ordered: Vec<&ScheduleSlot> = slots.iter().collect();
    ordered.sort_by(|a, b| {
        b.price_or_zero()
            .partial_cmp(&a.price_or_zero())
            .unwrap_or(Ordering::Equal)
            .then(a.category.priority_rank().cmp(&b.category.priority_rank()))
            .then(a.slot_id.cmp(&b.slot_id))
    });
    ordered
}

fn grid(params: &TimingParams) -> Vec<u32> {
    let step = params.granularity_minutes.max(1);
    let end = params.window_end_minute.min(24 * 60 - 1);
    (params.window_start_minute..=end).step_by(step as usize).collect()
}

/// 从窗口末端起按最小间隔排布的时间点（区间上的最大排布）
fn packed_layout(params: &TimingParams) -> Vec<u32> {
    let spacing = params.min_spacing_minutes.max(1);
    let mut layout: Vec<u32> = Vec::new();
    for m in grid(params).into_iter().rev() {
        if layout.last().map_or(true, |last| last - m >= spacing) {
            layout.push(m);
        }
    }
    layout
}

fn to_time(minute_of_day: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(minute_of_day * 60, 0).unwrap_or_default()
}
