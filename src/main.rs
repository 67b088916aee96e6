// ==========================================
// 创作者发送排期系统 - 命令行入口
// ==========================================
// 用法:
//   creator-send-aps [db] generate <account> <YYYY-MM-DD>
//   creator-send-aps [db] volume <account>
//   creator-send-aps [db] batch <YYYY-MM-DD> <account>...
//   creator-send-aps [db] legacy <account>
//   creator-send-aps [db] resolve <send_type_key>
//   creator-send-aps [db] templates <account>
// 省略 db 时使用 CREATOR_SEND_APS_DB_PATH 或用户数据目录
// 结果以 JSON 输出到 stdout; 失败输出 FailureReport 并以 1 退出
// ==========================================

use chrono::Local;
use creator_send_aps::api::{parse_week_start, ApiError, BatchRequest, ScheduleApi};
use creator_send_aps::db::default_db_path;
use creator_send_aps::logging;
use serde::Serialize;

const COMMANDS: &[&str] = &["generate", "volume", "batch", "legacy", "resolve", "templates"];

fn usage() -> ApiError {
    ApiError::InvalidInput {
        message: format!(
            "用法: creator-send-aps [db] <{}> <参数...>",
            COMMANDS.join("|")
        ),
        entity_ids: Vec::new(),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Vec<String>) -> Result<(), ApiError> {
    let (db_path, rest) = match args.first() {
        Some(first) if COMMANDS.contains(&first.as_str()) => (default_db_path(), &args[..]),
        Some(first) => (first.clone(), &args[1..]),
        None => return Err(usage()),
    };

    tracing::info!("{} v{}", creator_send_aps::APP_NAME, creator_send_aps::VERSION);
    tracing::info!(db_path = %db_path, "使用数据库");

    let api = ScheduleApi::open(&db_path).await?;

    match rest {
        [cmd, account, week_start] if cmd == "generate" => {
            let outcome = api.generate_schedule(account, week_start).await?;
            print_json(&outcome)?;
        }
        [cmd, account] if cmd == "volume" => {
            let outcome = api.compute_volume_config(account).await?;
            print_json(&outcome)?;
        }
        [cmd, week_start, accounts @ ..] if cmd == "batch" && !accounts.is_empty() => {
            let week_start = parse_week_start(week_start)?;
            let requests: Vec<BatchRequest> = accounts
                .iter()
                .map(|account_id| BatchRequest {
                    account_id: account_id.clone(),
                    week_start,
                })
                .collect();
            let entries = api.generate_schedules_batch(&requests).await?;
            print_json(&entries)?;
        }
        [cmd, account] if cmd == "legacy" => {
            print_json(&api.get_legacy_volume(account)?)?;
        }
        [cmd, key] if cmd == "resolve" => {
            let canonical = api.resolve_send_type_key(key, Local::now().date_naive())?;
            print_json(&canonical)?;
        }
        [cmd, account] if cmd == "templates" => {
            print_json(&api.list_templates(account)?)?;
        }
        _ => return Err(usage()),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(err) = run(args).await {
        let report = err.to_report();
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(_) => eprintln!("{}", err),
        }
        std::process::exit(1);
    }
}
