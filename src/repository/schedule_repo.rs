// ==========================================
// 创作者发送排期系统 - 排期模板仓储
// ==========================================
// 红线:
// - 模板 + 明细 + 发送量配置 + 账号等级 + 素材使用时间 必须单事务提交
// - 任一写入失败整体回滚, 不留半成品
// ==========================================

use crate::domain::schedule::{PipelineWarning, ScheduleDraft, ScheduleSlot, ScheduleTemplate};
use crate::domain::volume::VolumeConfig;
use crate::repository::content_repo::ContentRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{
    format_date, format_datetime, format_time, parse_date, parse_datetime, parse_enum, parse_json,
    parse_time,
};
use crate::repository::volume_config_repo::VolumeConfigRepository;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const TEMPLATE_COLUMNS: &str =
    "template_id, account_id, week_start, slot_count, volume_level, confidence, created_at";

// ==========================================
// ScheduleCommit - 一次提交的全部内容
// ==========================================
pub struct ScheduleCommit<'a> {
    pub template_id: String,
    pub draft: &'a ScheduleDraft,
    pub volume_config: &'a VolumeConfig,
    /// 本次运行生效参数快照 (JSON)
    pub tuning_snapshot_json: Option<String>,
    pub created_at: NaiveDateTime,
}

pub struct ScheduleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 提交排期（原子操作）
    ///
    /// # 逻辑
    /// 1. 写模板头
    /// 2. 按草稿顺序写明细 (seq_no 从 1 开始)
    /// 3. 替换发送量配置并回写账号等级
    /// 4. 回写选中素材的最近使用时间 (取槽位发送时刻)
    ///
    /// # 返回
    /// - `Ok(ScheduleTemplate)`: 提交成功
    /// - `Err`: 任一步失败, 全部回滚
    pub fn commit(&self, commit: &ScheduleCommit<'_>) -> RepositoryResult<ScheduleTemplate> {
        let draft = commit.draft;
        if let Some(slot) = draft.slots.iter().find(|s| s.content_id.is_none()) {
            return Err(RepositoryError::field(
                "content_id",
                format!("槽位 {} 未分配内容, 拒绝持久化", slot.slot_id),
            ));
        }

        let warnings_json = serde_json::to_string(&draft.warnings)
            .map_err(|e| RepositoryError::field("warnings_json", e.to_string()))?;

        let template = ScheduleTemplate {
            template_id: commit.template_id.clone(),
            account_id: draft.account_id.clone(),
            week_start: draft.week_start,
            slot_count: draft.slots.len(),
            volume_level: commit.volume_config.volume_level,
            confidence: commit.volume_config.confidence,
            created_at: commit.created_at,
        };

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO schedule_template (
                    template_id, account_id, week_start, slot_count, volume_level,
                    confidence, warnings_json, tuning_snapshot_json, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &template.template_id,
                &template.account_id,
                format_date(&template.week_start),
                template.slot_count as i64,
                template.volume_level.to_string(),
                template.confidence,
                warnings_json,
                &commit.tuning_snapshot_json,
                format_datetime(&template.created_at),
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO schedule_item (
                        template_id, seq_no, slot_id, day_index, slot_date, slot_time,
                        send_type_key, category, content_type, content_id, price, parent_slot_id
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )?;
            for (idx, slot) in draft.slots.iter().enumerate() {
                stmt.execute(params![
                    &template.template_id,
                    (idx + 1) as i64,
                    slot.slot_id,
                    slot.day_index,
                    format_date(&slot.date),
                    slot.time.as_ref().map(format_time),
                    slot.send_type.as_str(),
                    slot.category.to_string(),
                    &slot.content_type,
                    &slot.content_id,
                    slot.price,
                    slot.parent_slot_id,
                ])?;
            }
        }

        VolumeConfigRepository::replace_in_tx(&tx, commit.volume_config)?;

        let usages: Vec<(String, NaiveDateTime)> = draft
            .slots
            .iter()
            .filter_map(|s| {
                let id = s.content_id.clone()?;
                Some((id, s.timestamp().unwrap_or_else(|| s.date.and_time(chrono::NaiveTime::default()))))
            })
            .collect();
        ContentRepository::mark_used_in_tx(&tx, &usages)?;

        tx.commit()?;

        tracing::info!(
            template_id = %template.template_id,
            account_id = %template.account_id,
            slot_count = template.slot_count,
            "排期模板已提交"
        );

        Ok(template)
    }

    /// 按template_id查询模板头
    pub fn find_template(&self, template_id: &str) -> RepositoryResult<Option<ScheduleTemplate>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!(
                "SELECT {} FROM schedule_template WHERE template_id = ?",
                TEMPLATE_COLUMNS
            ),
            params![template_id],
            map_template_row,
        ) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询账号的全部模板（按周起始日、创建时间降序）
    pub fn list_templates_by_account(&self, account_id: &str) -> RepositoryResult<Vec<ScheduleTemplate>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM schedule_template WHERE account_id = ? ORDER BY week_start DESC, created_at DESC",
            TEMPLATE_COLUMNS
        ))?;

        let templates = stmt
            .query_map(params![account_id], map_template_row)?
            .collect::<Result<Vec<ScheduleTemplate>, _>>()?;

        Ok(templates)
    }

    /// 查询模板明细（按 seq_no 顺序）
    pub fn find_slots(&self, template_id: &str) -> RepositoryResult<Vec<ScheduleSlot>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT slot_id, day_index, slot_date, slot_time, send_type_key, category,
                      content_type, content_id, price, parent_slot_id
               FROM schedule_item
               WHERE template_id = ?
               ORDER BY seq_no"#,
        )?;

        let slots = stmt
            .query_map(params![template_id], |row| {
                let time: Option<String> = row.get(3)?;
                Ok(ScheduleSlot {
                    slot_id: row.get(0)?,
                    day_index: row.get(1)?,
                    date: parse_date(2, &row.get::<_, String>(2)?)?,
                    time: time.as_deref().map(|raw| parse_time(3, raw)).transpose()?,
                    send_type: parse_enum(4, &row.get::<_, String>(4)?)?,
                    category: parse_enum(5, &row.get::<_, String>(5)?)?,
                    content_type: row.get(6)?,
                    content_id: row.get(7)?,
                    price: row.get(8)?,
                    parent_slot_id: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<ScheduleSlot>, _>>()?;

        Ok(slots)
    }

    /// 还原已提交的草稿（模板头 + 明细 + 告警）
    pub fn load_draft(&self, template_id: &str) -> RepositoryResult<Option<ScheduleDraft>> {
        let header = {
            let conn = self.get_conn()?;
            match conn.query_row(
                "SELECT account_id, week_start, warnings_json FROM schedule_template WHERE template_id = ?",
                params![template_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        parse_date(1, &row.get::<_, String>(1)?)?,
                        parse_json::<Vec<PipelineWarning>>(2, &row.get::<_, String>(2)?)?,
                    ))
                },
            ) {
                Ok(h) => h,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };

        let (account_id, week_start, warnings) = header;
        let mut draft = ScheduleDraft::new(&account_id, week_start);
        draft.slots = self.find_slots(template_id)?;
        draft.warnings = warnings;
        Ok(Some(draft))
    }
}

fn map_template_row(row: &rusqlite::Row) -> rusqlite::Result<ScheduleTemplate> {
    Ok(ScheduleTemplate {
        template_id: row.get(0)?,
        account_id: row.get(1)?,
        week_start: parse_date(2, &row.get::<_, String>(2)?)?,
        slot_count: row.get::<_, i64>(3)? as usize,
        volume_level: parse_enum(4, &row.get::<_, String>(4)?)?,
        confidence: row.get(5)?,
        created_at: parse_datetime(6, &row.get::<_, String>(6)?)?,
    })
}
