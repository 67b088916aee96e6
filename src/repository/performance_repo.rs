// ==========================================
// 创作者发送排期系统 - 历史表现仓储
// ==========================================
// 职责: 按账号读取 7/14/30 天窗口 + 小时/星期表现 + 内容类型表现
// 红线: 未知账号必须显式报错, 不得静默返回空快照
// ==========================================

use crate::domain::performance::{PerformanceSnapshot, PerformanceWindow};
use crate::domain::types::Horizon;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub struct PerformanceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PerformanceRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取账号的历史表现快照（单连接内完成, 保证同一快照）
    ///
    /// # 返回
    /// - `Ok(PerformanceSnapshot)`: 缺失的窗口以空窗口补齐
    /// - `Err(NotFound)`: 账号不存在
    pub fn load_snapshot(&self, account_id: &str) -> RepositoryResult<PerformanceSnapshot> {
        let conn = self.get_conn()?;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM account WHERE account_id = ?",
            params![account_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepositoryError::not_found("Account", account_id));
        }

        // ===== 统计窗口 =====
        let mut windows = Vec::with_capacity(3);
        {
            let mut stmt = conn.prepare(
                r#"SELECT horizon_days, sends, opens, revenue, revenue_variance
                   FROM performance_window
                   WHERE account_id = ?
                   ORDER BY horizon_days"#,
            )?;
            let rows = stmt.query_map(params![account_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            })?;
            for row in rows {
                let (days, sends, opens, revenue, revenue_variance) = row?;
                let horizon = Horizon::from_days(days).ok_or_else(|| {
                    RepositoryError::field("horizon_days", format!("不支持的窗口长度: {}", days))
                })?;
                windows.push(PerformanceWindow {
                    account_id: account_id.to_string(),
                    horizon,
                    sends,
                    opens,
                    revenue,
                    revenue_variance,
                });
            }
        }
        for horizon in Horizon::ALL {
            if !windows.iter().any(|w| w.horizon == horizon) {
                windows.push(PerformanceWindow::empty(account_id, horizon));
            }
        }
        windows.sort_by_key(|w| w.horizon);

        // ===== 小时表现 =====
        let mut hourly = [0.0; 24];
        {
            let mut stmt =
                conn.prepare("SELECT hour, score FROM hourly_performance WHERE account_id = ?")?;
            let rows = stmt.query_map(params![account_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (hour, score) = row?;
                if (0..24).contains(&hour) {
                    hourly[hour as usize] = score.max(0.0);
                }
            }
        }

        // ===== 星期表现 =====
        let mut day_of_week = [0.0; 7];
        {
            let mut stmt =
                conn.prepare("SELECT weekday, score FROM dow_performance WHERE account_id = ?")?;
            let rows = stmt.query_map(params![account_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (weekday, score) = row?;
                if (0..7).contains(&weekday) {
                    day_of_week[weekday as usize] = score.max(0.0);
                }
            }
        }

        // ===== 内容类型表现 =====
        let mut content_type_performance = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                r#"SELECT content_type, AVG(performance_score)
                   FROM content_item
                   WHERE account_id = ?
                   GROUP BY content_type"#,
            )?;
            let rows = stmt.query_map(params![account_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (content_type, avg) = row?;
                content_type_performance.insert(content_type, avg);
            }
        }

        Ok(PerformanceSnapshot {
            account_id: account_id.to_string(),
            windows,
            hourly,
            day_of_week,
            content_type_performance,
        })
    }

    /// 写入/覆盖统计窗口
    pub fn upsert_window(&self, window: &PerformanceWindow) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO performance_window (
                account_id, horizon_days, sends, opens, revenue, revenue_variance
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &window.account_id,
                window.horizon.days(),
                window.sends,
                window.opens,
                window.revenue,
                window.revenue_variance,
            ],
        )?;
        Ok(())
    }

    /// 写入/覆盖小时表现 (24 项)
    pub fn replace_hourly(&self, account_id: &str, hourly: &[f64; 24]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM hourly_performance WHERE account_id = ?", params![account_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO hourly_performance (account_id, hour, score) VALUES (?, ?, ?)",
            )?;
            for (hour, score) in hourly.iter().enumerate() {
                stmt.execute(params![account_id, hour as i64, score])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// 写入/覆盖星期表现 (周一=0)
    pub fn replace_day_of_week(&self, account_id: &str, dow: &[f64; 7]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM dow_performance WHERE account_id = ?", params![account_id])?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO dow_performance (account_id, weekday, score) VALUES (?, ?, ?)")?;
            for (weekday, score) in dow.iter().enumerate() {
                stmt.execute(params![account_id, weekday as i64, score])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
