// ==========================================
// 创作者发送排期系统 - 内容素材领域模型
// ==========================================
// 红线: last_used_at 只在排期提交时回写, 规划阶段不得修改
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub content_id: String,
    pub account_id: String,
    pub content_type: String,
    pub last_used_at: Option<NaiveDateTime>, // None = 从未使用
    pub performance_score: f64,              // [0,100]
}

impl ContentItem {
    /// 距上次使用的小时数（从未使用返回 None）
    pub fn hours_since_use(&self, at: NaiveDateTime) -> Option<i64> {
        self.last_used_at.map(|t| (at - t).num_hours())
    }
}
