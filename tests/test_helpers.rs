// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、网络主数据、能力登记、库存与船货构造
// ==========================================

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use import_logistics_aps::db::{init_schema, open_sqlite_connection};
use import_logistics_aps::domain::money::Money;
use import_logistics_aps::domain::{
    CapacityEntry, CapacityLocation, CapacityValues, Material, NetworkModel, OceanFreightRate,
    Plant, Port, RailRoute, Shipment, ShipmentStatus, StockEvent, StockRecord, Vessel,
};
use import_logistics_aps::engine::{CapacitySnapshot, PlanningSnapshot, StockSnapshot};
use import_logistics_aps::repository::{
    CapacityRepository, NetworkRepository, NewStockEvent, ShipmentRepository, StockLedgerRepository,
};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const SUPPLIER: &str = "GLADSTONE";

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().ok_or("非 UTF-8 路径")?.to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（与仓储层相同的 Arc<Mutex<Connection>> 形态）
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(open_sqlite_connection(db_path).unwrap()))
}

// ==========================================
// 日期
// ==========================================

/// 2026-03-<day>
pub fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

pub fn ts(day: u32, hour: u32) -> NaiveDateTime {
    d(day).and_hms_opt(hour, 0, 0).unwrap()
}

// ==========================================
// 网络主数据
// ==========================================

pub fn port(code: &str, max_draft_m: f64, stockyard_capacity_t: f64) -> Port {
    Port {
        port_code: code.to_string(),
        port_name: code.to_string(),
        latitude: 0.0,
        longitude: 0.0,
        max_draft_m,
        stockyard_capacity_t,
        berths: 4,
        free_storage_days: 5.0,
        handling_rate: Money::inr(250.0),
        storage_rate_per_day: Money::inr(12.0),
        port_dues_rate: Money::inr(40.0),
    }
}

pub fn plant(code: &str, coal_rate: f64, min_days_cover: f64, target_days_cover: f64) -> Plant {
    let mut consumption_rates = BTreeMap::new();
    consumption_rates.insert(Material::CokingCoal, coal_rate);
    consumption_rates.insert(Material::Limestone, coal_rate / 4.0);
    Plant {
        plant_code: code.to_string(),
        plant_name: code.to_string(),
        latitude: 0.0,
        longitude: 0.0,
        consumption_rates,
        min_days_cover,
        target_days_cover,
    }
}

pub fn route(port_code: &str, plant_code: &str, distance_km: f64) -> RailRoute {
    RailRoute {
        port_code: port_code.to_string(),
        plant_code: plant_code.to_string(),
        distance_km,
        max_rakes_per_day: 60,
        freight_rate_per_t_km: Money::inr(1.5),
    }
}

pub fn vessel(code: &str, draft_m: f64, capacity_t: f64) -> Vessel {
    Vessel {
        vessel_code: code.to_string(),
        vessel_name: code.to_string(),
        draft_m,
        capacity_t,
    }
}

pub fn freight(discharge_port: &str, usd_per_t: f64) -> OceanFreightRate {
    OceanFreightRate {
        supplier_port: SUPPLIER.to_string(),
        discharge_port: discharge_port.to_string(),
        rate_per_t: Money::usd(usd_per_t),
    }
}

/// 演示网络:
/// - VIZAG 18.0m / 100,000t，HALD 12.0m / 100,000t
/// - 钢厂 BSP（日耗 3,500t，最低 15 天，目标 30 天）、RSP（日耗 2,000t）
/// - 船舶 CAPE（吃水 16.2m）、PMX（11.5m）
pub fn demo_network() -> NetworkModel {
    NetworkModel::new(
        vec![plant("BSP", 3_500.0, 15.0, 30.0), plant("RSP", 2_000.0, 15.0, 30.0)],
        vec![port("VIZAG", 18.0, 100_000.0), port("HALD", 12.0, 100_000.0)],
        vec![
            route("VIZAG", "BSP", 560.0),
            route("VIZAG", "RSP", 720.0),
            route("HALD", "BSP", 1_050.0),
            route("HALD", "RSP", 470.0),
        ],
        vec![vessel("CAPE", 16.2, 180_000.0), vessel("PMX", 11.5, 80_000.0)],
        vec![freight("VIZAG", 18.4), freight("HALD", 17.2)],
    )
}

// ==========================================
// 能力登记
// ==========================================

pub fn port_capacity(date: NaiveDate, port_code: &str, stockyard_t: f64, congestion_index: f64) -> CapacityEntry {
    CapacityEntry {
        entry_date: date,
        location: CapacityLocation::port(port_code),
        values: CapacityValues::Port {
            berths: 4,
            stockyard_t,
            congestion_index,
        },
        updated_at: ts(1, 0),
    }
}

pub fn route_capacity(date: NaiveDate, port_code: &str, plant_code: &str, rakes: u32) -> CapacityEntry {
    CapacityEntry {
        entry_date: date,
        location: CapacityLocation::route(port_code, plant_code),
        values: CapacityValues::Route { rakes },
        updated_at: ts(1, 0),
    }
}

/// 网络中每个港口、每条线路在 [start, start + days) 的能力登记
pub fn full_capacity(network: &NetworkModel, start: NaiveDate, days: i64, stockyard_t: f64, rakes: u32) -> Vec<CapacityEntry> {
    let mut entries = Vec::new();
    for offset in 0..days {
        let date = start + Duration::days(offset);
        for code in network.ports.keys() {
            entries.push(port_capacity(date, code, stockyard_t, 0.2));
        }
        for (port_code, plant_code) in network.routes.keys() {
            entries.push(route_capacity(date, port_code, plant_code, rakes));
        }
    }
    entries
}

// ==========================================
// 库存
// ==========================================

pub fn stock_record(location_code: &str, material: Material, quantity_t: f64) -> StockRecord {
    let mut record = StockRecord::empty(location_code, material);
    record.events.push(StockEvent {
        location_code: location_code.to_string(),
        material,
        seq_no: 1,
        quantity_t,
        event_ts: ts(1, 6),
        recorded_at: ts(1, 6),
    });
    record
}

/// 内存快照：演示网络 + 全量能力 + BSP/RSP 期初炼焦煤库存
pub fn demo_snapshot(stockyard_t: f64, rakes: u32) -> PlanningSnapshot {
    let network = demo_network();
    let capacity = CapacitySnapshot::from_entries(full_capacity(&network, d(1), 20, stockyard_t, rakes));
    let stock = StockSnapshot::from_records(vec![
        stock_record("BSP", Material::CokingCoal, 45_000.0),
        stock_record("RSP", Material::CokingCoal, 40_000.0),
    ]);
    PlanningSnapshot::new(network, capacity, stock)
}

// ==========================================
// 船货
// ==========================================

pub fn shipment(id: &str, quantity_t: f64, vessel_code: &str, required_by: NaiveDate, eta: NaiveDate) -> Shipment {
    Shipment {
        shipment_id: id.to_string(),
        material: Material::CokingCoal,
        quantity_t,
        vessel_code: vessel_code.to_string(),
        supplier_port: SUPPLIER.to_string(),
        required_by,
        eta: Some(eta),
        status: ShipmentStatus::Scheduled,
        splits: vec![],
    }
}

// ==========================================
// 数据库种子
// ==========================================

/// 把演示网络、能力登记、期初库存与给定船货写入数据库
pub fn seed_database(db_path: &str, shipments: &[Shipment]) -> Result<(), Box<dyn Error>> {
    let conn = open_shared(db_path);
    let network = demo_network();

    let network_repo = NetworkRepository::new(conn.clone());
    for p in network.plants.values() {
        network_repo.upsert_plant(p)?;
    }
    for p in network.ports.values() {
        network_repo.upsert_port(p)?;
    }
    for r in network.routes.values() {
        network_repo.upsert_route(r)?;
    }
    for v in network.vessels.values() {
        network_repo.upsert_vessel(v)?;
    }
    for f in network.freight_rates.values() {
        network_repo.upsert_freight_rate(f)?;
    }

    CapacityRepository::new(conn.clone()).upsert_batch(&full_capacity(&network, d(1), 20, 100_000.0, 30))?;

    StockLedgerRepository::new(conn.clone()).append_batch(&[
        NewStockEvent {
            location_code: "BSP".to_string(),
            material: Material::CokingCoal,
            quantity_t: 45_000.0,
            event_ts: ts(1, 6),
        },
        NewStockEvent {
            location_code: "RSP".to_string(),
            material: Material::CokingCoal,
            quantity_t: 40_000.0,
            event_ts: ts(1, 6),
        },
    ])?;

    let shipment_repo = ShipmentRepository::new(conn);
    for s in shipments {
        shipment_repo.upsert(s)?;
    }
    Ok(())
}
