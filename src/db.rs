// ==========================================
// 创作者发送排期系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 提供建表入口 init_schema（CLI 首次运行 / 集成测试共用）
// ==========================================

use crate::domain::send_type::{DeprecatedAlias, SendTypeRecord};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 默认数据库路径
///
/// 优先级: 环境变量 `CREATOR_SEND_APS_DB_PATH` > 用户数据目录 > 当前目录
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var("CREATOR_SEND_APS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    match dirs::data_dir() {
        Some(data_dir) => {
            let dir = data_dir.join("creator-send-aps");
            // 目录创建失败时仍返回该路径, 由打开连接时报错
            std::fs::create_dir_all(&dir).ok();
            dir.join("creator_send_aps.db").to_string_lossy().to_string()
        }
        None => "./creator_send_aps.db".to_string(),
    }
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
///
/// 包含:
/// - 配置表 (config_scope / config_kv)
/// - 账号与历史表现 (account / performance_window / hourly_performance / dow_performance)
/// - 参考数据 (send_type / send_type_alias) 及内容池 (content_item)
/// - 产出 (volume_config / schedule_template / schedule_item)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS account (
            account_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            page_type TEXT NOT NULL CHECK (page_type IN ('PAID', 'FREE')),
            tier INTEGER NOT NULL DEFAULT 3,
            volume_level TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_new INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS performance_window (
            account_id TEXT NOT NULL REFERENCES account(account_id) ON DELETE CASCADE,
            horizon_days INTEGER NOT NULL CHECK (horizon_days IN (7, 14, 30)),
            sends INTEGER NOT NULL DEFAULT 0,
            opens INTEGER NOT NULL DEFAULT 0,
            revenue REAL NOT NULL DEFAULT 0,
            revenue_variance REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (account_id, horizon_days)
        );

        CREATE TABLE IF NOT EXISTS hourly_performance (
            account_id TEXT NOT NULL REFERENCES account(account_id) ON DELETE CASCADE,
            hour INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
            score REAL NOT NULL,
            PRIMARY KEY (account_id, hour)
        );

        CREATE TABLE IF NOT EXISTS dow_performance (
            account_id TEXT NOT NULL REFERENCES account(account_id) ON DELETE CASCADE,
            weekday INTEGER NOT NULL CHECK (weekday BETWEEN 0 AND 6),
            score REAL NOT NULL,
            PRIMARY KEY (account_id, weekday)
        );

        CREATE TABLE IF NOT EXISTS send_type (
            send_type_key TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            max_per_day INTEGER NOT NULL,
            max_per_week INTEGER NOT NULL,
            page_restriction TEXT NOT NULL DEFAULT 'ANY',
            required_content_types TEXT NOT NULL DEFAULT '[]',
            performance_score REAL NOT NULL DEFAULT 0,
            base_price REAL,
            followup_eligible INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS send_type_alias (
            deprecated_key TEXT PRIMARY KEY,
            canonical_key TEXT NOT NULL,
            removed_after TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS content_item (
            content_id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES account(account_id) ON DELETE CASCADE,
            content_type TEXT NOT NULL,
            last_used_at TEXT,
            performance_score REAL NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_content_item_account_type
            ON content_item(account_id, content_type);

        CREATE TABLE IF NOT EXISTS volume_config (
            account_id TEXT PRIMARY KEY REFERENCES account(account_id) ON DELETE CASCADE,
            volume_level TEXT NOT NULL,
            elasticity_capped INTEGER NOT NULL DEFAULT 0,
            confidence REAL NOT NULL DEFAULT 0,
            config_json TEXT NOT NULL,
            calculated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schedule_template (
            template_id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES account(account_id) ON DELETE CASCADE,
            week_start TEXT NOT NULL,
            slot_count INTEGER NOT NULL,
            volume_level TEXT NOT NULL,
            confidence REAL NOT NULL,
            warnings_json TEXT NOT NULL DEFAULT '[]',
            tuning_snapshot_json TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_schedule_template_account
            ON schedule_template(account_id, week_start);

        CREATE TABLE IF NOT EXISTS schedule_item (
            template_id TEXT NOT NULL REFERENCES schedule_template(template_id) ON DELETE CASCADE,
            seq_no INTEGER NOT NULL,
            slot_id INTEGER NOT NULL,
            day_index INTEGER NOT NULL,
            slot_date TEXT NOT NULL,
            slot_time TEXT,
            send_type_key TEXT NOT NULL,
            category TEXT NOT NULL,
            content_type TEXT,
            content_id TEXT,
            price REAL,
            parent_slot_id INTEGER,
            PRIMARY KEY (template_id, seq_no)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    seed_reference_data(conn)?;
    Ok(())
}

/// 写入标准发送类型目录与废弃别名表（已存在的记录保持不变）
pub fn seed_reference_data(conn: &Connection) -> rusqlite::Result<()> {
    {
        let mut stmt = conn.prepare(
            r#"INSERT OR IGNORE INTO send_type (
                    send_type_key, category, max_per_day, max_per_week, page_restriction,
                    required_content_types, performance_score, base_price, followup_eligible
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )?;
        for record in SendTypeRecord::standard_catalog() {
            let content_types = serde_json::to_string(&record.required_content_types)
                .unwrap_or_else(|_| "[]".to_string());
            stmt.execute(rusqlite::params![
                &record.key,
                record.category.to_string(),
                record.max_per_day,
                record.max_per_week,
                record.page_restriction.to_string(),
                content_types,
                record.performance_score,
                record.base_price,
                if record.followup_eligible { 1 } else { 0 },
            ])?;
        }
    }

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO send_type_alias (deprecated_key, canonical_key, removed_after) VALUES (?, ?, ?)",
    )?;
    for alias in DeprecatedAlias::standard_aliases() {
        stmt.execute(rusqlite::params![
            &alias.deprecated_key,
            alias.canonical.as_str(),
            alias.removed_after.format("%Y-%m-%d").to_string(),
        ])?;
    }

    Ok(())
}
