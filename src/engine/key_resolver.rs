// ==========================================
// 创作者发送排期系统 - 发送类型 Key 解析
// ==========================================
// 职责: 废弃别名 → 规范 key 的有限映射 + 移除日期守卫
// 红线: 解析幂等; 规范 key 原样返回; 宽限期后拒绝
// ==========================================

use crate::domain::send_type::{DeprecatedAlias, SendTypeDefinition, SendTypeKey, SendTypeRecord};
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

pub struct KeyResolver {
    aliases: HashMap<String, DeprecatedAlias>,
}

impl KeyResolver {
    pub fn new(aliases: Vec<DeprecatedAlias>) -> Self {
        Self {
            aliases: aliases
                .into_iter()
                .map(|a| (a.deprecated_key.trim().to_lowercase(), a))
                .collect(),
        }
    }

    /// 使用内置别名表
    pub fn standard() -> Self {
        Self::new(DeprecatedAlias::standard_aliases())
    }

    /// 解析任意 key（规范或废弃）
    ///
    /// # 参数
    /// - key: 原始 key
    /// - today: 判定宽限期使用的日期
    ///
    /// # 返回
    /// - `Ok(SendTypeKey)`: 规范 key
    /// - `Err(DeprecatedKeyRemoved)`: 别名已过 removed_after
    /// - `Err(UnknownSendTypeKey)`: 既非规范 key 也非别名
    pub fn resolve(&self, key: &str, today: NaiveDate) -> EngineResult<SendTypeKey> {
        if let Ok(canonical) = key.parse::<SendTypeKey>() {
            return Ok(canonical);
        }

        let normalized = key.trim().to_lowercase();
        let alias = self
            .aliases
            .get(&normalized)
            .ok_or_else(|| EngineError::UnknownSendTypeKey(key.to_string()))?;

        if today > alias.removed_after {
            return Err(EngineError::DeprecatedKeyRemoved {
                key: normalized,
                canonical: alias.canonical.as_str().to_string(),
                removed_after: alias.removed_after,
            });
        }

        debug!(
            deprecated_key = %normalized,
            canonical = %alias.canonical,
            removed_after = %alias.removed_after,
            "废弃发送类型 key 已解析"
        );
        Ok(alias.canonical)
    }

    /// 将存储层记录解析为规范定义（分配前执行一次）
    ///
    /// 同一规范 key 出现多条记录（别名 + 规范并存）时合并为一条,
    /// 取规范记录优先, 否则取表现分最高者, 保证上限不重复计数。
    /// 已移除的别名记录跳过并告警, 不影响其他类型。
    pub fn resolve_catalog(
        &self,
        records: &[SendTypeRecord],
        today: NaiveDate,
    ) -> Vec<SendTypeDefinition> {
        let mut merged: BTreeMap<SendTypeKey, (bool, SendTypeDefinition)> = BTreeMap::new();

        for record in records {
            let key = match self.resolve(&record.key, today) {
                Ok(k) => k,
                Err(e) => {
                    warn!(key = %record.key, error = %e, "发送类型记录被跳过");
                    continue;
                }
            };
            let is_canonical = record.key.trim().to_lowercase() == key.as_str();
            let def = SendTypeDefinition {
                key,
                category: key.category(),
                max_per_day: record.max_per_day,
                max_per_week: record.max_per_week,
                page_restriction: record.page_restriction,
                required_content_types: record.required_content_types.clone(),
                performance_score: record.performance_score,
                base_price: record.base_price,
                followup_eligible: record.followup_eligible,
            };

            match merged.get(&key) {
                None => {
                    merged.insert(key, (is_canonical, def));
                }
                Some((existing_canonical, existing)) => {
                    let replace = match (is_canonical, *existing_canonical) {
                        (true, false) => true,
                        (false, true) => false,
                        _ => def.performance_score > existing.performance_score,
                    };
                    if replace {
                        merged.insert(key, (is_canonical, def));
                    }
                }
            }
        }

        merged.into_values().map(|(_, def)| def).collect()
    }
}
