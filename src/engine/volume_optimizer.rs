// ==========================================
// 创作者发送排期系统 - 发送量优化引擎
// ==========================================
// 职责: 融合评分 → 分类别周配额 + 星期分布 + 内容类型权重
// 输入: FusedScore (可缺省) + 账号 + 上期配置 + 历史表现快照
// 输出: VolumeConfig
// 红线:
// - 置信度抑制: 相对基线的变化量 ≤ 目标变化量 × 置信度
// - 弹性上限: 周总量 ≤ 上期 × (1 + cap), 触发时 elasticity_capped = true
// - 星期分布之和严格等于周总量
// ==========================================

use crate::config::VolumeParams;
use crate::domain::account::Account;
use crate::domain::performance::{FusedScore, PerformanceSnapshot};
use crate::domain::types::{CategoryCounts, VolumeLevel};
use crate::domain::volume::VolumeConfig;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// 发送量决策（配置 + 中间量, 便于日志与测试核对）
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeDecision {
    pub config: VolumeConfig,
    pub baseline_level: VolumeLevel,
    pub level_step: i32,
    pub baseline_weekly: CategoryCounts<u32>,
    pub target_weekly: CategoryCounts<u32>,
    pub dampened_weekly: CategoryCounts<u32>,
}

// ==========================================
// VolumeOptimizer - 发送量优化引擎
// ==========================================
pub struct VolumeOptimizer {
    // 无状态引擎
}

impl VolumeOptimizer {
    pub fn new() -> Self {
        Self {}
    }

    /// 账号等级对应的类别目标比例 (变现/互动/留存)
    pub fn tier_ratios(tier: u8) -> [f64; 3] {
        match tier {
            0 | 1 => [0.50, 0.35, 0.15],
            2 => [0.45, 0.40, 0.15],
            _ => [0.40, 0.45, 0.15],
        }
    }

    /// 按比例拆分总量（最大余数法, 余数并列时优先高优先级类别）
    pub fn split_by_ratios(total: u32, ratios: [f64; 3]) -> CategoryCounts<u32> {
        let ratio_sum: f64 = ratios.iter().map(|r| r.max(0.0)).sum();
        if total == 0 || ratio_sum <= 0.0 {
            return CategoryCounts::default();
        }

        let exact: Vec<f64> = ratios
            .iter()
            .map(|r| total as f64 * r.max(0.0) / ratio_sum)
            .collect();
        let mut parts: Vec<u32> = exact.iter().map(|v| floor_eps(*v)).collect();
        let mut remainder = total.saturating_sub(parts.iter().sum());

        let mut order: Vec<usize> = (0..3).collect();
        order.sort_by(|a, b| {
            let fa = exact[*a] - floor_eps(exact[*a]) as f64;
            let fb = exact[*b] - floor_eps(exact[*b]) as f64;
            fb.partial_cmp(&fa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });
        for idx in order {
            if remainder == 0 {
                break;
            }
            parts[idx] += 1;
            remainder -= 1;
        }

        CategoryCounts {
            revenue: parts[0],
            engagement: parts[1],
            retention: parts[2],
        }
    }

    /// 饱和度刹车 / 机会度加速 → 档位步进
    pub fn level_step(fused: &FusedScore, params: &VolumeParams) -> i32 {
        if fused.saturation >= params.saturation_hard_brake {
            return -2;
        }
        if fused.saturation >= params.saturation_brake {
            return -1;
        }
        let net = fused.opportunity - fused.saturation;
        if net >= params.double_step_threshold {
            2
        } else if net >= params.accelerate_threshold {
            1
        } else if net <= -params.accelerate_threshold {
            -1
        } else {
            0
        }
    }

    /// 将周总量按星期乘数分配（周一=0）
    ///
    /// 向下取整后, 余数全部给历史最强的一天（并列取最早）
    pub fn distribute_week(total: u32, multipliers: &[f64; 7]) -> [u32; 7] {
        let mut plan = [0u32; 7];
        let sum: f64 = multipliers.iter().sum();
        if total == 0 || sum <= 0.0 {
            return plan;
        }

        for (i, m) in multipliers.iter().enumerate() {
            plan[i] = floor_eps(total as f64 * m / sum);
        }
        let assigned: u32 = plan.iter().sum();
        let strongest = strongest_day(multipliers);
        plan[strongest] += total.saturating_sub(assigned);
        plan
    }

    /// 归一化星期乘数（无历史时均匀分布）
    pub fn normalize_dow(day_of_week: &[f64; 7]) -> [f64; 7] {
        let clean: Vec<f64> = day_of_week
            .iter()
            .map(|v| if v.is_finite() && *v > 0.0 { *v } else { 0.0 })
            .collect();
        let sum: f64 = clean.iter().sum();
        let mut out = [1.0 / 7.0; 7];
        if sum > 0.0 {
            for (i, v) in clean.iter().enumerate() {
                out[i] = v / sum;
            }
        }
        out
    }

    /// 内容类型权重（近期表现归一化, 和为 1）
    pub fn content_type_weights(performance: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let positive: BTreeMap<String, f64> = performance
            .iter()
            .map(|(k, v)| (k.clone(), if v.is_finite() && *v > 0.0 { *v } else { 0.0 }))
            .collect();
        let sum: f64 = positive.values().sum();
        if positive.is_empty() {
            return BTreeMap::new();
        }
        if sum <= 0.0 {
            let uniform = 1.0 / positive.len() as f64;
            return positive.into_keys().map(|k| (k, uniform)).collect();
        }
        positive.into_iter().map(|(k, v)| (k, v / sum)).collect()
    }

    /// 计算发送量配置
    ///
    /// # 参数
    /// - account: 账号（tier / 页面类型 / 当前等级）
    /// - fused: 融合评分; None 表示历史数据不足, 走默认 Mid 配置
    /// - prior: 上期配置（作为基线与弹性上限参照）
    /// - snapshot: 历史表现快照（星期乘数 / 内容类型表现）
    /// - calculated_at: 计算时间
    ///
    /// # 逻辑
    /// 1. 基线等级 + 步进 → 目标等级
    /// 2. 档位差按 tier 比例拆分, 叠加到基线周量得到目标周量
    /// 3. 置信度抑制 (向基线截断)
    /// 4. 弹性上限 (向下取整到上限)
    /// 5. 星期分布
    /// 6. 内容类型权重
    ///
    /// 发布的 volume_level 由最终周量反推, 不是未抑制的目标等级
    #[instrument(skip_all, fields(account_id = %account.account_id, tier = account.tier))]
    pub fn optimize(
        &self,
        account: &Account,
        fused: Option<&FusedScore>,
        prior: Option<&VolumeConfig>,
        snapshot: &PerformanceSnapshot,
        params: &VolumeParams,
        calculated_at: NaiveDateTime,
    ) -> VolumeDecision {
        let ratios = Self::tier_ratios(account.tier);

        let fused = match fused {
            Some(f) => f,
            None => return self.default_decision(account, snapshot, calculated_at),
        };

        // ===== 1. 档位 =====
        let baseline_level = prior
            .map(|p| p.volume_level)
            .unwrap_or_else(|| account.baseline_level());
        let level_step = Self::level_step(fused, params);
        let target_level = baseline_level.shifted(level_step);

        // ===== 2. 类别拆分 =====
        // 目标 = 基线周量 + 档位差; 步进为 0 时目标即基线
        let baseline_split = Self::split_by_ratios(baseline_level.daily_total() * 7, ratios);
        let target_split = Self::split_by_ratios(target_level.daily_total() * 7, ratios);
        let baseline_weekly = prior.map(|p| p.weekly).unwrap_or(baseline_split);
        let target_weekly = CategoryCounts::from_fn(|cat| {
            let delta = target_split.get(cat) as i64 - baseline_split.get(cat) as i64;
            (baseline_weekly.get(cat) as i64 + delta).max(0) as u32
        });

        // ===== 3/4. 置信度抑制 + 弹性上限 =====
        let confidence = fused.confidence.clamp(0.0, 1.0);
        let mut elasticity_capped = false;
        let mut dampened_weekly = CategoryCounts::default();
        let weekly = CategoryCounts::from_fn(|cat| {
            let base = baseline_weekly.get(cat) as i64;
            let delta = target_weekly.get(cat) as i64 - base;
            // as i64 向零截断, 保证不超过抑制后的变化量
            let dampened = (base + (delta as f64 * confidence) as i64).max(0) as u32;
            dampened_weekly.set(cat, dampened);

            let cap = (base as f64 * (1.0 + params.elasticity_cap_pct)).floor() as u32;
            let mut value = dampened;
            if value > cap {
                value = cap;
                elasticity_capped = true;
            }
            value.min(params.max_weekly_per_category)
        });

        // ===== 发布等级 = 实际周量对应档位 =====
        let emitted_level = VolumeLevel::from_daily_total(weekly.total() as f64 / 7.0);

        let config = self.build_config(
            account,
            emitted_level,
            weekly,
            snapshot,
            elasticity_capped,
            confidence,
            Some(*fused),
            calculated_at,
        );

        info!(
            baseline_level = %baseline_level,
            target_level = %target_level,
            emitted_level = %emitted_level,
            level_step,
            confidence,
            elasticity_capped,
            weekly_revenue = weekly.revenue,
            weekly_engagement = weekly.engagement,
            weekly_retention = weekly.retention,
            "发送量配置已计算"
        );

        VolumeDecision {
            config,
            baseline_level,
            level_step,
            baseline_weekly,
            target_weekly,
            dampened_weekly,
        }
    }

    /// 历史数据不足时的默认配置: Mid 档, 置信度 0, 星期均匀
    fn default_decision(
        &self,
        account: &Account,
        snapshot: &PerformanceSnapshot,
        calculated_at: NaiveDateTime,
    ) -> VolumeDecision {
        let level = VolumeLevel::Mid;
        let weekly = Self::split_by_ratios(level.daily_total() * 7, Self::tier_ratios(account.tier));
        let mut config = self.build_config(
            account,
            level,
            weekly,
            snapshot,
            false,
            0.0,
            None,
            calculated_at,
        );
        config.dow_multipliers = [1.0 / 7.0; 7];
        config.weekly_plan = CategoryCounts::from_fn(|cat| {
            Self::distribute_week(weekly.get(cat), &config.dow_multipliers)
        });

        debug!(level = %level, "历史数据不足, 使用默认发送量配置");

        VolumeDecision {
            config,
            baseline_level: level,
            level_step: 0,
            baseline_weekly: weekly,
            target_weekly: weekly,
            dampened_weekly: weekly,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_config(
        &self,
        account: &Account,
        level: VolumeLevel,
        weekly: CategoryCounts<u32>,
        snapshot: &PerformanceSnapshot,
        elasticity_capped: bool,
        confidence: f64,
        fused_score: Option<FusedScore>,
        calculated_at: NaiveDateTime,
    ) -> VolumeConfig {
        let dow_multipliers = Self::normalize_dow(&snapshot.day_of_week);
        let weekly_plan =
            CategoryCounts::from_fn(|cat| Self::distribute_week(weekly.get(cat), &dow_multipliers));
        let daily = CategoryCounts::from_fn(|cat| (weekly.get(cat) as f64 / 7.0).round() as u32);

        VolumeConfig {
            account_id: account.account_id.clone(),
            volume_level: level,
            weekly,
            daily,
            weekly_plan,
            dow_multipliers,
            content_type_weights: Self::content_type_weights(&snapshot.content_type_performance),
            elasticity_capped,
            confidence,
            fused_score,
            calculated_at,
        }
    }
}

impl Default for VolumeOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// 向下取整, 吸收浮点误差 (1.9999999999 → 2)
fn floor_eps(v: f64) -> u32 {
    (v + 1e-9).floor().max(0.0) as u32
}

fn strongest_day(multipliers: &[f64; 7]) -> usize {
    let mut best = 0;
    for i in 1..7 {
        if multipliers[i] > multipliers[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{PageType, SendCategory};
    use chrono::NaiveDate;

    fn categories() -> impl Iterator<Item = SendCategory> {
        SendCategory::ALL.into_iter()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn account(tier: u8, level: Option<VolumeLevel>) -> Account {
        Account {
            account_id: "A1".to_string(),
            display_name: "A1".to_string(),
            page_type: PageType::Paid,
            tier,
            volume_level: level,
            is_active: true,
            is_new: false,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn snapshot() -> PerformanceSnapshot {
        PerformanceSnapshot {
            account_id: "A1".to_string(),
            windows: vec![],
            hourly: [0.0; 24],
            day_of_week: [0.0; 7],
            content_type_performance: BTreeMap::new(),
        }
    }

    fn fused(saturation: f64, opportunity: f64, confidence: f64) -> FusedScore {
        FusedScore {
            saturation,
            opportunity,
            divergence: false,
            confidence,
        }
    }

    #[test]
    fn test_tier1_moderate_opportunity_steps_up_one_level() {
        let optimizer = VolumeOptimizer::new();
        let decision = optimizer.optimize(
            &account(1, None),
            Some(&fused(42.0, 68.0, 0.85)),
            None,
            &snapshot(),
            &VolumeParams::default(),
            now(),
        );

        assert_eq!(decision.baseline_level, VolumeLevel::High);
        assert_eq!(decision.level_step, 1);
        assert_eq!(decision.config.volume_level, VolumeLevel::Ultra);
        assert!(!decision.config.elasticity_capped);
        assert_eq!(decision.baseline_weekly, CategoryCounts { revenue: 28, engagement: 20, retention: 8 });
        assert_eq!(decision.config.weekly, CategoryCounts { revenue: 33, engagement: 24, retention: 9 });
    }

    #[test]
    fn test_dampened_change_never_exceeds_confidence_share() {
        let optimizer = VolumeOptimizer::new();
        let params = VolumeParams::default();
        for confidence in [0.0, 0.1, 0.33, 0.5, 0.77, 0.99] {
            for (sat, opp) in [(10.0, 90.0), (90.0, 10.0), (72.0, 40.0), (30.0, 55.0)] {
                let d = optimizer.optimize(
                    &account(2, Some(VolumeLevel::Mid)),
                    Some(&fused(sat, opp, confidence)),
                    None,
                    &snapshot(),
                    &params,
                    now(),
                );
                for cat in categories() {
                    let base = d.baseline_weekly.get(cat) as f64;
                    let target = d.target_weekly.get(cat) as f64;
                    let got = d.config.weekly.get(cat) as f64;
                    assert!((got - base).abs() <= (target - base).abs() * confidence + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_low_confidence_keeps_published_level_at_baseline() {
        let optimizer = VolumeOptimizer::new();
        let d = optimizer.optimize(
            &account(2, Some(VolumeLevel::Mid)),
            Some(&fused(5.0, 95.0, 0.05)),
            None,
            &snapshot(),
            &VolumeParams::default(),
            now(),
        );

        assert_eq!(d.level_step, 2);
        assert_eq!(d.config.weekly, CategoryCounts { revenue: 19, engagement: 17, retention: 6 });
        assert_eq!(d.config.volume_level, VolumeLevel::Mid);
        let legacy = d.config.legacy_view();
        assert_eq!(legacy.volume_level, VolumeLevel::Mid);
        assert_eq!(legacy.ppv_per_day, 3);
        assert_eq!(legacy.bump_per_day, 2);
    }

    #[test]
    fn test_neutral_rerun_on_prior_config_does_not_drift() {
        let optimizer = VolumeOptimizer::new();
        let params = VolumeParams::default();
        let first = optimizer.optimize(
            &account(2, Some(VolumeLevel::Mid)),
            Some(&fused(5.0, 95.0, 0.05)),
            None,
            &snapshot(),
            &params,
            now(),
        );

        // 上期配置回灌, 信号中性且置信度满
        let prior = first.config.clone();
        let second = optimizer.optimize(
            &account(2, Some(prior.volume_level)),
            Some(&fused(50.0, 50.0, 1.0)),
            Some(&prior),
            &snapshot(),
            &params,
            now(),
        );

        assert_eq!(second.level_step, 0);
        assert_eq!(second.baseline_level, VolumeLevel::Mid);
        assert_eq!(second.config.weekly, prior.weekly);
        assert!(!second.config.elasticity_capped);
        assert_eq!(second.config.volume_level, prior.volume_level);
    }

    #[test]
    fn test_published_level_matches_delivered_volume() {
        let optimizer = VolumeOptimizer::new();
        let params = VolumeParams::default();
        for tier in [1, 2, 3] {
            for confidence in [0.0, 0.3, 0.85, 1.0] {
                for (sat, opp) in [(5.0, 95.0), (42.0, 68.0), (90.0, 10.0), (50.0, 50.0)] {
                    let d = optimizer.optimize(
                        &account(tier, None),
                        Some(&fused(sat, opp, confidence)),
                        None,
                        &snapshot(),
                        &params,
                        now(),
                    );
                    let per_day = d.config.weekly.total() as f64 / 7.0;
                    assert_eq!(d.config.volume_level, VolumeLevel::from_daily_total(per_day));
                }
            }
        }
    }

    #[test]
    fn test_elasticity_cap_binds_and_sets_flag() {
        let optimizer = VolumeOptimizer::new();
        let params = VolumeParams::default();
        // Low → Ultra 两档, 置信度 1
        let d = optimizer.optimize(
            &account(3, Some(VolumeLevel::Low)),
            Some(&fused(5.0, 95.0, 1.0)),
            None,
            &snapshot(),
            &params,
            now(),
        );
        assert!(d.config.elasticity_capped);
        for cat in categories() {
            let cap = (d.baseline_weekly.get(cat) as f64 * 1.25).floor() as u32;
            assert!(d.config.weekly.get(cat) <= cap);
        }
    }

    #[test]
    fn test_distribution_sums_exactly_and_remainder_goes_to_strongest_day() {
        let multipliers = VolumeOptimizer::normalize_dow(&[1.0, 3.0, 3.0, 1.0, 1.0, 2.0, 2.0]);
        for total in [0, 1, 6, 13, 33, 84] {
            let plan = VolumeOptimizer::distribute_week(total, &multipliers);
            assert_eq!(plan.iter().sum::<u32>(), total);
        }
        let plan = VolumeOptimizer::distribute_week(10, &multipliers);
        // 精确份额 0.77/2.31/2.31/0.77/0.77/1.54/1.54 → 下取整和 6, 余数 4 给周二
        assert_eq!(plan, [0, 6, 2, 0, 0, 1, 1]);
    }

    #[test]
    fn test_insufficient_data_defaults_to_mid_with_zero_confidence() {
        let optimizer = VolumeOptimizer::new();
        let d = optimizer.optimize(
            &account(1, Some(VolumeLevel::Ultra)),
            None,
            None,
            &snapshot(),
            &VolumeParams::default(),
            now(),
        );
        assert_eq!(d.config.volume_level, VolumeLevel::Mid);
        assert_eq!(d.config.confidence, 0.0);
        assert!(d.config.fused_score.is_none());
        assert_eq!(d.config.weekly.total(), 42);
        assert!(d.config.dow_multipliers.iter().all(|m| (m - 1.0 / 7.0).abs() < 1e-12));
    }

    #[test]
    fn test_content_type_weights_sum_to_one() {
        let mut perf = BTreeMap::new();
        perf.insert("Outdoor".to_string(), 60.0);
        perf.insert("Studio".to_string(), 20.0);
        perf.insert("Selfie".to_string(), 20.0);
        let weights = VolumeOptimizer::content_type_weights(&perf);
        assert!((weights.values().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((weights["Outdoor"] - 0.6).abs() < 1e-12);
    }
}
