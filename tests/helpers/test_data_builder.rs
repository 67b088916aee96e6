// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime};
use creator_send_aps::domain::account::Account;
use creator_send_aps::domain::content::ContentItem;
use creator_send_aps::domain::performance::PerformanceWindow;
use creator_send_aps::domain::types::{Horizon, PageType, VolumeLevel};

/// 测试基准周（周一）
pub fn week_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// 测试运行时刻（基准周前一天中午）
pub fn run_at() -> NaiveDateTime {
    (week_start() - Duration::days(1)).and_hms_opt(12, 0, 0).unwrap()
}

// ==========================================
// Account 构建器
// ==========================================

pub struct AccountBuilder {
    account_id: String,
    page_type: PageType,
    tier: u8,
    volume_level: Option<VolumeLevel>,
    is_active: bool,
}

impl AccountBuilder {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            page_type: PageType::Paid,
            tier: 2,
            volume_level: None,
            is_active: true,
        }
    }

    pub fn free_page(mut self) -> Self {
        self.page_type = PageType::Free;
        self
    }

    pub fn tier(mut self, tier: u8) -> Self {
        self.tier = tier;
        self
    }

    pub fn volume_level(mut self, level: VolumeLevel) -> Self {
        self.volume_level = Some(level);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn build(self) -> Account {
        let now = run_at();
        Account {
            display_name: format!("账号 {}", self.account_id),
            account_id: self.account_id,
            page_type: self.page_type,
            tier: self.tier,
            volume_level: self.volume_level,
            is_active: self.is_active,
            is_new: false,
            created_at: now - Duration::days(90),
            updated_at: now,
        }
    }
}

// ==========================================
// 历史表现
// ==========================================

/// 三个窗口的平稳历史（每日 6 次发送, 打开率 35%, 单次收入 24）
pub fn steady_windows(account_id: &str) -> Vec<PerformanceWindow> {
    Horizon::ALL
        .iter()
        .map(|horizon| {
            let sends = 6 * horizon.days();
            PerformanceWindow {
                account_id: account_id.to_string(),
                horizon: *horizon,
                sends,
                opens: (sends as f64 * 0.35) as u32,
                revenue: sends as f64 * 24.0,
                revenue_variance: 100.0,
            }
        })
        .collect()
}

/// 晚间高峰的小时表现
pub fn evening_hourly() -> [f64; 24] {
    let mut hourly = [0.0; 24];
    for (hour, score) in hourly.iter_mut().enumerate() {
        *score = match hour {
            8..=11 => 20.0,
            12..=17 => 40.0,
            18..=22 => 90.0,
            _ => 5.0,
        };
    }
    hourly
}

// ==========================================
// 内容池
// ==========================================

/// 生成某内容类型的 count 条从未使用素材
pub fn content_items(account_id: &str, content_type: &str, count: usize) -> Vec<ContentItem> {
    (0..count)
        .map(|i| ContentItem {
            content_id: format!("{}-{}-{:03}", account_id, content_type, i),
            account_id: account_id.to_string(),
            content_type: content_type.to_string(),
            last_used_at: None,
            performance_score: 50.0 + (i % 50) as f64,
        })
        .collect()
}

/// 充足内容池: 三个类型各 count 条
pub fn ample_pool(account_id: &str, count: usize) -> Vec<ContentItem> {
    ["Outdoor", "Studio", "Selfie"]
        .iter()
        .flat_map(|t| content_items(account_id, t, count))
        .collect()
}
