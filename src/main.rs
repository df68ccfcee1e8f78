// ==========================================
// 进口散货分配系统 - 命令行入口
// ==========================================
// 用法:
//   import-logistics-aps [optimize] [YYYY-MM-DD]   对待分配船货求解并输出方案 JSON
//   import-logistics-aps alerts [YYYY-MM-DD]       评估告警并输出打开的告警
//   import-logistics-aps plans [N]                 列出最近 N 个方案
// 数据库: IMPORT_LOGISTICS_APS_DB_PATH 或用户数据目录
// ==========================================

use std::error::Error;

use chrono::{Local, NaiveDate};
use import_logistics_aps::app::{get_default_db_path, AppState};
use import_logistics_aps::logging;

fn parse_date_arg(arg: Option<&String>) -> Result<NaiveDate, Box<dyn Error>> {
    match arg {
        Some(raw) => Ok(NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|e| format!("日期格式应为 YYYY-MM-DD: {} ({})", raw, e))?),
        None => Ok(Local::now().date_naive()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init_from_env();

    tracing::info!("==================================================");
    tracing::info!("{} - 决策支持系统", import_logistics_aps::APP_NAME);
    tracing::info!("系统版本: {}", import_logistics_aps::VERSION);
    tracing::info!("==================================================");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, rest) = match args.first().map(String::as_str) {
        Some("optimize") | Some("alerts") | Some("plans") => (args[0].as_str(), &args[1..]),
        _ => ("optimize", &args[..]),
    };

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);
    let state = AppState::new(db_path)?;
    let api = state.planning_api.clone();

    let output = match command {
        "alerts" => {
            let as_of = parse_date_arg(rest.first())?;
            serde_json::to_string_pretty(&api.evaluate_alerts(as_of).await?)?
        }
        "plans" => {
            let limit = rest
                .first()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(10);
            serde_json::to_string_pretty(&api.list_plans(None, limit)?)?
        }
        _ => {
            let as_of = parse_date_arg(rest.first())?;
            serde_json::to_string_pretty(&api.optimize_pending(as_of).await?)?
        }
    };

    println!("{}", output);
    Ok(())
}
