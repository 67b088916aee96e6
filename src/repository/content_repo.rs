// ==========================================
// 创作者发送排期系统 - 内容素材仓储
// ==========================================
// 红线: last_used_at 只在排期提交事务中回写
// ==========================================

use crate::domain::content::ContentItem;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_datetime, parse_datetime};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Transaction};
use std::sync::{Arc, Mutex};

pub struct ContentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ContentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入素材（UPSERT）
    ///
    /// # 返回
    /// - `Ok(count)`: 写入的记录数
    pub fn batch_upsert(&self, items: &[ContentItem]) -> RepositoryResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT OR REPLACE INTO content_item (
                        content_id, account_id, content_type, last_used_at, performance_score
                    ) VALUES (?, ?, ?, ?, ?)"#,
            )?;
            for item in items {
                stmt.execute(params![
                    &item.content_id,
                    &item.account_id,
                    &item.content_type,
                    item.last_used_at.as_ref().map(format_datetime),
                    item.performance_score,
                ])?;
            }
        }
        tx.commit()?;
        Ok(items.len())
    }

    /// 账号 + 内容类型 的候选素材
    pub fn list_by_type(&self, account_id: &str, content_type: &str) -> RepositoryResult<Vec<ContentItem>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT content_id, account_id, content_type, last_used_at, performance_score
               FROM content_item
               WHERE account_id = ? AND content_type = ?
               ORDER BY content_id"#,
        )?;

        let items = stmt
            .query_map(params![account_id, content_type], map_row)?
            .collect::<Result<Vec<ContentItem>, _>>()?;

        Ok(items)
    }

    /// 账号的全部素材（一次性读取, 作为单次运行的内容池快照）
    pub fn list_by_account(&self, account_id: &str) -> RepositoryResult<Vec<ContentItem>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT content_id, account_id, content_type, last_used_at, performance_score
               FROM content_item
               WHERE account_id = ?
               ORDER BY content_type, content_id"#,
        )?;

        let items = stmt
            .query_map(params![account_id], map_row)?
            .collect::<Result<Vec<ContentItem>, _>>()?;

        Ok(items)
    }

    pub fn find_by_id(&self, content_id: &str) -> RepositoryResult<Option<ContentItem>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT content_id, account_id, content_type, last_used_at, performance_score
               FROM content_item WHERE content_id = ?"#,
            params![content_id],
            map_row,
        ) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 在提交事务中回写素材最近使用时间（只前进, 不回退）
    pub(crate) fn mark_used_in_tx(
        tx: &Transaction<'_>,
        usages: &[(String, NaiveDateTime)],
    ) -> RepositoryResult<usize> {
        let mut stmt = tx.prepare(
            r#"UPDATE content_item
               SET last_used_at = ?1
               WHERE content_id = ?2 AND (last_used_at IS NULL OR last_used_at < ?1)"#,
        )?;
        let mut updated = 0;
        for (content_id, used_at) in usages {
            updated += stmt.execute(params![format_datetime(used_at), content_id])?;
        }
        Ok(updated)
    }
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<ContentItem> {
    let last_used: Option<String> = row.get(3)?;
    Ok(ContentItem {
        content_id: row.get(0)?,
        account_id: row.get(1)?,
        content_type: row.get(2)?,
        last_used_at: last_used
            .as_deref()
            .map(|raw| parse_datetime(3, raw))
            .transpose()?,
        performance_score: row.get(4)?,
    })
}
