// ==========================================
// API集成测试辅助工具
// ==========================================
// 职责: 临时数据库 + 共享连接 + 手动时钟守卫 + ScheduleApi
// ==========================================

use std::sync::{Arc, Mutex};

use creator_send_aps::api::ScheduleApi;
use creator_send_aps::config::GuardParams;
use creator_send_aps::db::{init_schema, open_sqlite_connection};
use creator_send_aps::domain::account::Account;
use creator_send_aps::domain::content::ContentItem;
use creator_send_aps::logging;
use creator_send_aps::engine::{ManualClock, PipelineOrchestrator, PipelineRepositories, RateCircuitGuard};
use rusqlite::Connection;
use tempfile::NamedTempFile;

use super::mock_config::MockConfig;
use super::test_data_builder::{evening_hourly, steady_windows};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> (NamedTempFile, String) {
    let temp_file = NamedTempFile::new().expect("创建临时文件失败");
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path).expect("打开数据库失败");
    init_schema(&conn).expect("初始化 schema 失败");

    (temp_file, db_path)
}

/// API测试环境
pub struct ApiTestEnv {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub repos: PipelineRepositories,
    pub clock: Arc<ManualClock>,
    pub guard: Arc<RateCircuitGuard>,
    pub api: ScheduleApi<MockConfig>,
}

impl ApiTestEnv {
    pub fn new() -> Self {
        Self::with_config(MockConfig::new())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self::with_config_and_guard(config, GuardParams::default())
    }

    pub fn with_config_and_guard(config: MockConfig, guard_params: GuardParams) -> Self {
        logging::init_test();
        let (temp_file, db_path) = create_test_db();
        let conn = Arc::new(Mutex::new(open_sqlite_connection(&db_path).expect("打开数据库失败")));
        let repos = PipelineRepositories::from_connection(conn.clone());

        let clock = Arc::new(ManualClock::new());
        let guard = Arc::new(RateCircuitGuard::new(guard_params, clock.clone()));
        let orchestrator = PipelineOrchestrator::new(Arc::new(config), repos.clone(), guard.clone());

        Self {
            _temp_file: temp_file,
            db_path,
            conn,
            repos,
            clock,
            guard,
            api: ScheduleApi::new(Arc::new(orchestrator)),
        }
    }

    pub fn seed_account(&self, account: &Account) {
        self.repos.account_repo.upsert(account).expect("写入账号失败");
    }

    /// 写入平稳历史 + 晚间小时表现
    pub fn seed_history(&self, account_id: &str) {
        for window in steady_windows(account_id) {
            self.repos
                .performance_repo
                .upsert_window(&window)
                .expect("写入统计窗口失败");
        }
        self.repos
            .performance_repo
            .replace_hourly(account_id, &evening_hourly())
            .expect("写入小时表现失败");
    }

    pub fn seed_content(&self, items: &[ContentItem]) {
        self.repos.content_repo.batch_upsert(items).expect("写入素材失败");
    }

    pub fn count_rows(&self, table: &str) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }
}
