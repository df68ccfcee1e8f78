// ==========================================
// CSV 导入测试
// ==========================================
// 测试目标: 能力登记 / 库存事件文件导入，坏行带行号拒绝，好行照常写入
// ==========================================

mod test_helpers;

use std::fs;
use std::path::PathBuf;

use import_logistics_aps::api::ApiError;
use import_logistics_aps::app::AppState;
use import_logistics_aps::domain::{CapacityLocation, Material};
use import_logistics_aps::repository::{CapacityRepository, StockLedgerRepository};
use tempfile::TempDir;
use test_helpers::*;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_import_capacity_csv_reports_bad_rows() {
    let (_tmp, db_path) = create_test_db().unwrap();
    seed_database(&db_path, &[]).unwrap();
    let state = AppState::new(db_path.clone()).unwrap();
    let dir = TempDir::new().unwrap();

    let path = write_file(
        &dir,
        "capacity.csv",
        "entry_date,location_kind,port_code,plant_code,berths,stockyard_t,congestion_index,rakes\n\
         2026-03-25,PORT,VIZAG,,4,90000,0.35,\n\
         2026-13-40,PORT,VIZAG,,4,90000,0.35,\n\
         2026-03-25,ROUTE,VIZAG,BSP,,,,14\n\
         2026-03-25,PORT,KOLKATA,,2,10000,0.1,\n\
         2026-03-26,PORT,HALD,,2,-5,0.1,\n\
         \n\
         2026-03-26,ROUTE,HALD,RSP,,,,6\n",
    );

    let report = state.planning_api.import_capacity_csv(&path).unwrap();
    assert_eq!(report.total_rows, 6);
    assert_eq!(report.applied, 3);
    assert_eq!(report.rejected.len(), 3);

    let bad_date = report.rejected.iter().find(|e| e.field == "entry_date").unwrap();
    assert_eq!(bad_date.line, 3);
    assert!(report.rejected.iter().any(|e| e.field == "port_code"));
    assert!(report.rejected.iter().any(|e| e.field == "stockyard_t"));

    let repo = CapacityRepository::new(open_shared(&db_path));
    let vizag = repo
        .find(
            chrono::NaiveDate::from_ymd_opt(2026, 3, 25).unwrap(),
            &CapacityLocation::port("VIZAG"),
        )
        .unwrap()
        .unwrap();
    assert_eq!(vizag.stockyard_t(), 90_000.0);
    let route = repo
        .find(
            chrono::NaiveDate::from_ymd_opt(2026, 3, 26).unwrap(),
            &CapacityLocation::route("HALD", "RSP"),
        )
        .unwrap()
        .unwrap();
    assert_eq!(route.rakes(), 6);
}

#[test]
fn test_reimporting_capacity_replaces_rows() {
    let (_tmp, db_path) = create_test_db().unwrap();
    seed_database(&db_path, &[]).unwrap();
    let state = AppState::new(db_path.clone()).unwrap();
    let dir = TempDir::new().unwrap();
    let repo = CapacityRepository::new(open_shared(&db_path));
    let before = repo.count().unwrap();

    let header = "entry_date,location_kind,port_code,plant_code,berths,stockyard_t,congestion_index,rakes\n";
    let first = write_file(&dir, "a.csv", &format!("{}2026-03-28,PORT,HALD,,2,30000,0.5,\n", header));
    let second = write_file(&dir, "b.csv", &format!("{}2026-03-28,PORT,HALD,,2,25000,0.7,\n", header));

    state.planning_api.import_capacity_csv(&first).unwrap();
    state.planning_api.import_capacity_csv(&second).unwrap();
    assert_eq!(repo.count().unwrap(), before + 1);

    let entry = repo
        .find(
            chrono::NaiveDate::from_ymd_opt(2026, 3, 28).unwrap(),
            &CapacityLocation::port("HALD"),
        )
        .unwrap()
        .unwrap();
    assert_eq!(entry.stockyard_t(), 25_000.0);
    assert_eq!(entry.congestion_index(), 0.7);
}

#[test]
fn test_import_stock_events_appends_in_file_order() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path.clone()).unwrap();
    let dir = TempDir::new().unwrap();

    let path = write_file(
        &dir,
        "stock.csv",
        "location_code,material,quantity_t,event_ts\n\
         BSP,COKING_COAL,120000,2026-03-01 06:00:00\n\
         BSP,coking_coal,-3500,2026-03-02 06:00:00\n\
         BSP,IRON_ORE,1000,2026-03-02 07:00:00\n\
         BSP,LIMESTONE,0,2026-03-02 08:00:00\n\
         RSP,LIMESTONE,8000,not-a-time\n\
         BSP,LIMESTONE,9000,2026-03-02T09:00:00\n",
    );

    let report = state.planning_api.import_stock_csv(&path).unwrap();
    assert_eq!(report.total_rows, 6);
    assert_eq!(report.applied, 3);
    let fields: Vec<&str> = report.rejected.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["material", "quantity_t", "event_ts"]);

    let repo = StockLedgerRepository::new(open_shared(&db_path));
    let coal = repo.load_record("BSP", Material::CokingCoal).unwrap();
    assert!((coal.current_stock_t() - 116_500.0).abs() < 1e-6);
    let limestone = repo.load_record("BSP", Material::Limestone).unwrap();
    assert!((limestone.current_stock_t() - 9_000.0).abs() < 1e-6);
}

#[test]
fn test_missing_column_and_wrong_extension_fail_whole_file() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    let dir = TempDir::new().unwrap();

    let missing = write_file(&dir, "stock.csv", "location_code,material,event_ts\nBSP,COKING_COAL,2026-03-01 06:00:00\n");
    let err = state.planning_api.import_stock_csv(&missing).unwrap_err();
    assert!(matches!(err, ApiError::ImportError(_)));

    let wrong_ext = write_file(&dir, "stock.xlsx", "location_code,material,quantity_t,event_ts\n");
    let err = state.planning_api.import_stock_csv(&wrong_ext).unwrap_err();
    assert!(matches!(err, ApiError::ImportError(_)));

    let err = state
        .planning_api
        .import_capacity_csv(&dir.path().join("absent.csv"))
        .unwrap_err();
    assert!(matches!(err, ApiError::ImportError(_)));
}
