// ==========================================
// 创作者发送排期系统 - 账号仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: volume_level 只由发送量配置提交回写
// ==========================================

use crate::domain::account::Account;
use crate::domain::types::VolumeLevel;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_datetime, parse_datetime, parse_enum};
use rusqlite::{params, Connection, Transaction};
use std::sync::{Arc, Mutex};

const ACCOUNT_COLUMNS: &str = "account_id, display_name, page_type, tier, volume_level, \
                               is_active, is_new, created_at, updated_at";

// ==========================================
// AccountRepository - 账号仓储
// ==========================================
pub struct AccountRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AccountRepository {
    /// 创建新的AccountRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或覆盖账号
    pub fn upsert(&self, account: &Account) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO account (
                account_id, display_name, page_type, tier, volume_level,
                is_active, is_new, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                display_name = excluded.display_name,
                page_type = excluded.page_type,
                tier = excluded.tier,
                volume_level = excluded.volume_level,
                is_active = excluded.is_active,
                is_new = excluded.is_new,
                updated_at = excluded.updated_at"#,
            params![
                &account.account_id,
                &account.display_name,
                account.page_type.to_string(),
                account.tier,
                account.volume_level.map(|l| l.to_string()),
                if account.is_active { 1 } else { 0 },
                if account.is_new { 1 } else { 0 },
                format_datetime(&account.created_at),
                format_datetime(&account.updated_at),
            ],
        )?;

        Ok(())
    }

    /// 按account_id查询账号
    ///
    /// # 返回
    /// - `Ok(Some(Account))`: 找到账号
    /// - `Ok(None)`: 未找到账号
    /// - `Err`: 数据库错误
    pub fn find_by_id(&self, account_id: &str) -> RepositoryResult<Option<Account>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("SELECT {} FROM account WHERE account_id = ?", ACCOUNT_COLUMNS),
            params![account_id],
            map_row,
        ) {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按account_id查询账号, 不存在时返回 NotFound
    pub fn get(&self, account_id: &str) -> RepositoryResult<Account> {
        self.find_by_id(account_id)?
            .ok_or_else(|| RepositoryError::not_found("Account", account_id))
    }

    /// 查询所有启用账号（按 tier, account_id 排序）
    pub fn list_active(&self) -> RepositoryResult<Vec<Account>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM account WHERE is_active = 1 ORDER BY tier, account_id",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map([], map_row)?
            .collect::<Result<Vec<Account>, _>>()?;

        Ok(accounts)
    }

    /// 在已有事务中回写账号发送量等级
    pub(crate) fn update_volume_level_in_tx(
        tx: &Transaction<'_>,
        account_id: &str,
        level: VolumeLevel,
        updated_at: &str,
    ) -> RepositoryResult<()> {
        let affected = tx.execute(
            "UPDATE account SET volume_level = ?, updated_at = ? WHERE account_id = ?",
            params![level.to_string(), updated_at, account_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("Account", account_id));
        }
        Ok(())
    }
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    let volume_level: Option<String> = row.get(4)?;
    Ok(Account {
        account_id: row.get(0)?,
        display_name: row.get(1)?,
        page_type: parse_enum(2, &row.get::<_, String>(2)?)?,
        tier: row.get(3)?,
        volume_level: volume_level
            .as_deref()
            .map(|raw| parse_enum::<VolumeLevel>(4, raw))
            .transpose()?,
        is_active: row.get::<_, i64>(5)? != 0,
        is_new: row.get::<_, i64>(6)? != 0,
        created_at: parse_datetime(7, &row.get::<_, String>(7)?)?,
        updated_at: parse_datetime(8, &row.get::<_, String>(8)?)?,
    })
}
