// ==========================================
// 创作者发送排期系统 - 发送类型参考数据仓储
// ==========================================
// 说明: send_type 表中的 key 可能仍是废弃别名（历史数据）,
//       解析由引擎层 KeyResolver 负责, 这里原样返回
// ==========================================

use crate::domain::send_type::{DeprecatedAlias, SendTypeKey, SendTypeRecord};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_date, parse_date, parse_enum, parse_json};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct SendTypeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SendTypeRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取全部发送类型记录
    pub fn list_records(&self) -> RepositoryResult<Vec<SendTypeRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT send_type_key, category, max_per_day, max_per_week, page_restriction,
                      required_content_types, performance_score, base_price, followup_eligible
               FROM send_type
               ORDER BY send_type_key"#,
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(SendTypeRecord {
                    key: row.get(0)?,
                    category: parse_enum(1, &row.get::<_, String>(1)?)?,
                    max_per_day: row.get(2)?,
                    max_per_week: row.get(3)?,
                    page_restriction: parse_enum(4, &row.get::<_, String>(4)?)?,
                    required_content_types: parse_json(5, &row.get::<_, String>(5)?)?,
                    performance_score: row.get(6)?,
                    base_price: row.get(7)?,
                    followup_eligible: row.get::<_, i64>(8)? != 0,
                })
            })?
            .collect::<Result<Vec<SendTypeRecord>, _>>()?;

        Ok(records)
    }

    /// 读取废弃别名表
    pub fn list_aliases(&self) -> RepositoryResult<Vec<DeprecatedAlias>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT deprecated_key, canonical_key, removed_after FROM send_type_alias ORDER BY deprecated_key",
        )?;

        let aliases = stmt
            .query_map([], |row| {
                Ok(DeprecatedAlias {
                    deprecated_key: row.get(0)?,
                    canonical: parse_enum::<SendTypeKey>(1, &row.get::<_, String>(1)?)?,
                    removed_after: parse_date(2, &row.get::<_, String>(2)?)?,
                })
            })?
            .collect::<Result<Vec<DeprecatedAlias>, _>>()?;

        Ok(aliases)
    }

    /// 写入/覆盖发送类型记录
    pub fn upsert_record(&self, record: &SendTypeRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let content_types = serde_json::to_string(&record.required_content_types)
            .map_err(|e| RepositoryError::field("required_content_types", e.to_string()))?;

        conn.execute(
            r#"INSERT OR REPLACE INTO send_type (
                    send_type_key, category, max_per_day, max_per_week, page_restriction,
                    required_content_types, performance_score, base_price, followup_eligible
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &record.key,
                record.category.to_string(),
                record.max_per_day,
                record.max_per_week,
                record.page_restriction.to_string(),
                content_types,
                record.performance_score,
                record.base_price,
                if record.followup_eligible { 1 } else { 0 },
            ],
        )?;
        Ok(())
    }

    /// 写入/覆盖废弃别名
    pub fn upsert_alias(&self, alias: &DeprecatedAlias) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO send_type_alias (deprecated_key, canonical_key, removed_after) VALUES (?, ?, ?)",
            params![
                &alias.deprecated_key,
                alias.canonical.as_str(),
                format_date(&alias.removed_after),
            ],
        )?;
        Ok(())
    }

    /// 删除发送类型记录（返回是否存在）
    pub fn delete_record(&self, key: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM send_type WHERE send_type_key = ?", params![key])?;
        Ok(affected > 0)
    }
}
