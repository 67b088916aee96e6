use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static STAGE_DEPTH: Cell<u32> = Cell::new(0);
    static SQL_COUNT: Cell<u64> = Cell::new(0);
    static SLOW_SQL_COUNT: Cell<u64> = Cell::new(0);
}

fn is_true(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn truncate_sql(sql: &str, max_len: usize) -> String {
    let s = sql.trim().replace('\n', " ");
    if s.len() <= max_len {
        return s;
    }
    let mut cut = max_len;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &s[..cut])
}

/// 安装 SQLite 语句 trace/profile（用于 SQL 计数 + 慢查询日志）
///
/// 开关：
/// - Debug 默认开启；Release 默认关闭（可通过环境变量开启）
/// - `CREATOR_SEND_APS_PERF_SQL=1` 强制开启
/// - `CREATOR_SEND_APS_SLOW_SQL_MS=50` 配置慢 SQL 阈值（毫秒）
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = match std::env::var("CREATOR_SEND_APS_PERF_SQL") {
        Ok(v) => is_true(&v),
        Err(_) => cfg!(debug_assertions),
    };

    PERF_SQL_ENABLED.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var("CREATOR_SEND_APS_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(sql_trace_callback));
    conn.profile(Some(sql_profile_callback));
}

fn sql_trace_callback(_sql: &str) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    if STAGE_DEPTH.with(|d| d.get() == 0) {
        return;
    }
    SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
}

fn sql_profile_callback(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold > 0 && ms >= threshold {
        tracing::warn!(
            target: "slow_sql",
            duration_ms = ms,
            sql = %truncate_sql(sql, 420),
            "slow sql"
        );
        if STAGE_DEPTH.with(|d| d.get() > 0) {
            SLOW_SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
        }
    }
}

/// 阶段计时 Guard：drop 时记录 elapsed_ms + SQL 语句数 + 慢 SQL 数
///
/// SQL 计数基于 thread_local, 只统计当前线程上执行的语句:
/// - `new`: 同步阶段使用, 生命周期内不得跨 `.await`
/// - `timing_only`: 跨 `.await` 的异步阶段使用, 只记录耗时
///
/// ```ignore
/// let _timer = creator_send_aps::perf::StageTimer::new("allocate");
/// ```
pub struct StageTimer {
    stage: &'static str,
    start: Instant,
    counting: bool,
    sql_start: u64,
    slow_sql_start: u64,
}

impl StageTimer {
    pub fn new(stage: &'static str) -> Self {
        STAGE_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            stage,
            start: Instant::now(),
            counting: true,
            sql_start: SQL_COUNT.with(|c| c.get()),
            slow_sql_start: SLOW_SQL_COUNT.with(|c| c.get()),
        }
    }

    /// 只计时, 不参与线程内 SQL 计数
    pub fn timing_only(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
            counting: false,
            sql_start: 0,
            slow_sql_start: 0,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        if !self.counting {
            tracing::info!(
                target: "perf",
                stage = self.stage,
                elapsed_ms = self.elapsed_ms(),
                "done"
            );
            return;
        }

        let sql_count = SQL_COUNT.with(|c| c.get()).saturating_sub(self.sql_start);
        let slow_sql_count = SLOW_SQL_COUNT
            .with(|c| c.get())
            .saturating_sub(self.slow_sql_start);

        tracing::info!(
            target: "perf",
            stage = self.stage,
            elapsed_ms = self.elapsed_ms(),
            sql_count,
            slow_sql_count,
            "done"
        );

        STAGE_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_sql_respects_char_boundary() {
        let sql = "SELECT '排期' FROM schedule_item";
        let out = truncate_sql(sql, 9);
        assert!(out.ends_with('…'));
        assert!(out.len() <= 9 + '…'.len_utf8());
    }

    #[test]
    fn test_sync_timer_counts_statements_on_its_thread() {
        PERF_SQL_ENABLED.store(true, Ordering::Relaxed);
        let mut conn = Connection::open_in_memory().unwrap();
        conn.trace(Some(sql_trace_callback));

        let before = SQL_COUNT.with(|c| c.get());
        {
            let _t = StageTimer::new("unit");
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
                .unwrap();
        }
        assert!(SQL_COUNT.with(|c| c.get()) >= before + 2);
        assert_eq!(STAGE_DEPTH.with(|d| d.get()), 0);

        // 计时型不改动线程内深度, 期间语句不计入
        let before = SQL_COUNT.with(|c| c.get());
        {
            let _t = StageTimer::timing_only("unit_async");
            assert_eq!(STAGE_DEPTH.with(|d| d.get()), 0);
            conn.execute("INSERT INTO t VALUES (2)", []).unwrap();
        }
        assert_eq!(SQL_COUNT.with(|c| c.get()), before);
    }
}
