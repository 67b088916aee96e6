// ==========================================
// 创作者发送排期系统 - 发送量配置仓储
// ==========================================
// 说明: 每个账号只保留一份配置, 每次运行整体替换;
//       完整结构以 JSON 存储, 常用字段冗余列便于查询
// ==========================================

use crate::domain::volume::VolumeConfig;
use crate::repository::account_repo::AccountRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_datetime, parse_json};
use rusqlite::{params, Connection, Transaction};
use std::sync::{Arc, Mutex};

pub struct VolumeConfigRepository {
    conn: Arc<Mutex<Connection>>,
}

impl VolumeConfigRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询账号当前配置
    pub fn find_by_account(&self, account_id: &str) -> RepositoryResult<Option<VolumeConfig>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            "SELECT config_json FROM volume_config WHERE account_id = ?",
            params![account_id],
            |row| parse_json::<VolumeConfig>(0, &row.get::<_, String>(0)?),
        ) {
            Ok(config) => Ok(Some(config)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 替换账号配置并回写账号等级（单事务）
    pub fn replace(&self, config: &VolumeConfig) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        Self::replace_in_tx(&tx, config)?;
        tx.commit()?;
        Ok(())
    }

    /// 在已有事务中替换配置
    pub(crate) fn replace_in_tx(tx: &Transaction<'_>, config: &VolumeConfig) -> RepositoryResult<()> {
        let json = serde_json::to_string(config)
            .map_err(|e| RepositoryError::field("config_json", e.to_string()))?;
        let calculated_at = format_datetime(&config.calculated_at);

        tx.execute(
            r#"INSERT INTO volume_config (
                    account_id, volume_level, elasticity_capped, confidence, config_json, calculated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(account_id) DO UPDATE SET
                    volume_level = excluded.volume_level,
                    elasticity_capped = excluded.elasticity_capped,
                    confidence = excluded.confidence,
                    config_json = excluded.config_json,
                    calculated_at = excluded.calculated_at"#,
            params![
                &config.account_id,
                config.volume_level.to_string(),
                if config.elasticity_capped { 1 } else { 0 },
                config.confidence,
                json,
                &calculated_at,
            ],
        )?;

        AccountRepository::update_volume_level_in_tx(
            tx,
            &config.account_id,
            config.volume_level,
            &calculated_at,
        )
    }
}
