// ==========================================
// 进口散货分配系统 - 演示库种子数据
// ==========================================
// 用法: seed_demo_db [DB_PATH] [HORIZON_DAYS]
// 内容: 5 个卸货港、5 个钢厂、全连通铁路线路、船舶、海运航线、
//       能力登记、期初库存与一批待分配船货
// ==========================================

use chrono::{Duration, Local, NaiveDate};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use import_logistics_aps::app::get_default_db_path;
use import_logistics_aps::db::{init_schema, open_sqlite_connection};
use import_logistics_aps::domain::money::Money;
use import_logistics_aps::domain::{
    CapacityEntry, CapacityLocation, CapacityValues, Material, OceanFreightRate, Plant, Port,
    RailRoute, Shipment, ShipmentStatus, Vessel,
};
use import_logistics_aps::repository::{
    capacity_repo::CapacityRepository, network_repo::NetworkRepository,
    shipment_repo::ShipmentRepository,
    stock_ledger_repo::{NewStockEvent, StockLedgerRepository},
};

const DEFAULT_HORIZON_DAYS: i64 = 21;

// (代码, 名称, 纬度, 经度, 吃水m, 堆场t, 泊位, 免堆存天数, 装卸费INR, 堆存费INR/天, 港务费INR)
const PORTS: [(&str, &str, f64, f64, f64, f64, u32, f64, f64, f64, f64); 5] = [
    ("VIZAG", "Visakhapatnam", 17.69, 83.29, 18.0, 180_000.0, 4, 5.0, 260.0, 14.0, 45.0),
    ("HALD", "Haldia", 22.03, 88.06, 12.0, 90_000.0, 3, 4.0, 210.0, 12.0, 38.0),
    ("PARADIP", "Paradip", 20.26, 86.67, 17.1, 160_000.0, 4, 5.0, 240.0, 13.0, 42.0),
    ("DHAMRA", "Dhamra", 20.79, 86.97, 18.0, 140_000.0, 3, 5.0, 250.0, 15.0, 40.0),
    ("GANGAVARAM", "Gangavaram", 17.62, 83.23, 18.5, 120_000.0, 3, 5.0, 270.0, 14.0, 44.0),
];

// (代码, 名称, 纬度, 经度, 炼焦煤日耗, 石灰石日耗, 最低天数, 目标天数)
const PLANTS: [(&str, &str, f64, f64, f64, f64, f64, f64); 5] = [
    ("BSP", "Bhilai Steel Plant", 21.21, 81.38, 14_000.0, 3_500.0, 15.0, 30.0),
    ("RSP", "Rourkela Steel Plant", 22.22, 84.86, 10_000.0, 2_600.0, 15.0, 30.0),
    ("BSL", "Bokaro Steel Plant", 23.67, 86.15, 12_000.0, 3_000.0, 15.0, 30.0),
    ("DSP", "Durgapur Steel Plant", 23.55, 87.29, 6_000.0, 1_500.0, 12.0, 25.0),
    ("ISP", "IISCO Steel Plant", 23.67, 86.93, 7_000.0, 1_800.0, 12.0, 25.0),
];

// 港口 → 钢厂铁路里程 (km)，列顺序与 PLANTS 一致
const RAIL_KM: [(&str, [f64; 5]); 5] = [
    ("VIZAG", [560.0, 720.0, 930.0, 960.0, 940.0]),
    ("HALD", [1_050.0, 470.0, 360.0, 230.0, 260.0]),
    ("PARADIP", [880.0, 420.0, 620.0, 560.0, 580.0]),
    ("DHAMRA", [920.0, 380.0, 540.0, 480.0, 500.0]),
    ("GANGAVARAM", [575.0, 735.0, 945.0, 975.0, 955.0]),
];

fn main() -> Result<(), Box<dyn Error>> {
    import_logistics_aps::logging::init();

    let db_path = std::env::args().nth(1).unwrap_or_else(get_default_db_path);
    let horizon_days = std::env::args()
        .nth(2)
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(DEFAULT_HORIZON_DAYS)
        .max(7);

    backup_and_reset_db(&db_path)?;

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let base_date = Local::now().date_naive();
    seed_network(&NetworkRepository::new(conn.clone()))?;
    let capacity_rows = seed_capacity(&CapacityRepository::new(conn.clone()), base_date, horizon_days)?;
    let stock_rows = seed_stock(&StockLedgerRepository::new(conn.clone()), base_date)?;
    let shipment_rows = seed_shipments(&ShipmentRepository::new(conn), base_date)?;

    eprintln!(
        "Seeded {}: ports={}, plants={}, capacity_entries={}, stock_events={}, shipments={}",
        db_path,
        PORTS.len(),
        PLANTS.len(),
        capacity_rows,
        stock_rows,
        shipment_rows
    );
    Ok(())
}

fn backup_and_reset_db(db_path: &str) -> Result<(), Box<dyn Error>> {
    let path = Path::new(db_path);
    if !path.exists() {
        return Ok(());
    }

    let ts = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let backup_path = format!("{}.bak.{}", db_path, ts);
    fs::copy(path, &backup_path)?;
    fs::remove_file(path)?;

    eprintln!("Backed up {} -> {}", db_path, backup_path);
    Ok(())
}

fn seed_network(repo: &NetworkRepository) -> Result<(), Box<dyn Error>> {
    for (code, name, lat, lon, draft, yard, berths, free_days, handling, storage, dues) in PORTS {
        repo.upsert_port(&Port {
            port_code: code.to_string(),
            port_name: name.to_string(),
            latitude: lat,
            longitude: lon,
            max_draft_m: draft,
            stockyard_capacity_t: yard,
            berths,
            free_storage_days: free_days,
            handling_rate: Money::inr(handling),
            storage_rate_per_day: Money::inr(storage),
            port_dues_rate: Money::inr(dues),
        })?;
    }

    for (code, name, lat, lon, coal, lime, min_days, target_days) in PLANTS {
        let mut consumption_rates = BTreeMap::new();
        consumption_rates.insert(Material::CokingCoal, coal);
        consumption_rates.insert(Material::Limestone, lime);
        repo.upsert_plant(&Plant {
            plant_code: code.to_string(),
            plant_name: name.to_string(),
            latitude: lat,
            longitude: lon,
            consumption_rates,
            min_days_cover: min_days,
            target_days_cover: target_days,
        })?;
    }

    for (port_code, distances) in RAIL_KM {
        for (plant, km) in PLANTS.iter().zip(distances) {
            repo.upsert_route(&RailRoute {
                port_code: port_code.to_string(),
                plant_code: plant.0.to_string(),
                distance_km: km,
                max_rakes_per_day: if km < 600.0 { 6 } else { 4 },
                freight_rate_per_t_km: Money::inr(1.45),
            })?;
        }
    }

    let vessels = [
        ("CAPE_ANNA", "Cape Anna", 17.6, 170_000.0),
        ("CAPE_BELLA", "Cape Bella", 16.2, 150_000.0),
        ("PMX_CORAL", "Panamax Coral", 14.1, 80_000.0),
        ("PMX_DELTA", "Panamax Delta", 13.9, 76_000.0),
        ("SMX_EMBER", "Supramax Ember", 11.8, 56_000.0),
    ];
    for (code, name, draft, capacity) in vessels {
        repo.upsert_vessel(&Vessel {
            vessel_code: code.to_string(),
            vessel_name: name.to_string(),
            draft_m: draft,
            capacity_t: capacity,
        })?;
    }

    // 澳洲炼焦煤与海湾石灰石的航线运价 (USD/t)
    let suppliers = [("GLADSTONE", 0.0), ("HAY_POINT", 0.6), ("MINA_SAQR", -6.5)];
    let base_rates = [
        ("VIZAG", 18.4),
        ("HALD", 19.8),
        ("PARADIP", 18.9),
        ("DHAMRA", 19.1),
        ("GANGAVARAM", 18.5),
    ];
    for (supplier, delta) in suppliers {
        for (port, rate) in base_rates {
            repo.upsert_freight_rate(&OceanFreightRate {
                supplier_port: supplier.to_string(),
                discharge_port: port.to_string(),
                rate_per_t: Money::usd(rate + delta),
            })?;
        }
    }
    Ok(())
}

fn seed_capacity(
    repo: &CapacityRepository,
    base_date: NaiveDate,
    horizon_days: i64,
) -> Result<usize, Box<dyn Error>> {
    let now = Local::now().naive_local();
    let mut entries = Vec::new();

    for offset in 0..horizon_days {
        let date = base_date + Duration::days(offset);
        // 周期性的拥堵波动，让演示数据出现不同的利用率区间
        let wave = ((offset % 7) as f64) / 10.0;

        for (code, _, _, _, _, yard, berths, ..) in PORTS {
            let congestion = if code == "HALD" { 0.55 + wave * 0.6 } else { 0.2 + wave * 0.5 };
            entries.push(CapacityEntry {
                entry_date: date,
                location: CapacityLocation::port(code),
                values: CapacityValues::Port {
                    berths,
                    stockyard_t: yard * (1.0 - wave * 0.3),
                    congestion_index: congestion,
                },
                updated_at: now,
            });
        }

        for (port_code, distances) in RAIL_KM {
            for (plant, km) in PLANTS.iter().zip(distances) {
                let rakes = if km < 600.0 { 6 } else { 4 };
                entries.push(CapacityEntry {
                    entry_date: date,
                    location: CapacityLocation::route(port_code, plant.0),
                    values: CapacityValues::Route {
                        rakes: if offset % 7 == 6 { rakes / 2 } else { rakes },
                    },
                    updated_at: now,
                });
            }
        }
    }

    Ok(repo.upsert_batch(&entries)?)
}

fn seed_stock(repo: &StockLedgerRepository, base_date: NaiveDate) -> Result<usize, Box<dyn Error>> {
    let opening_ts = (base_date - Duration::days(1))
        .and_hms_opt(6, 0, 0)
        .ok_or("invalid opening timestamp")?;
    // 期初库存天数：BSP 偏紧、DSP 低于最低线，演示告警与缺口优先
    let cover_days = [("BSP", 13.9), ("RSP", 22.0), ("BSL", 18.5), ("DSP", 9.0), ("ISP", 26.0)];

    let mut events = Vec::new();
    for ((code, _, _, _, coal, lime, ..), (_, days)) in PLANTS.iter().zip(cover_days) {
        events.push(NewStockEvent {
            location_code: code.to_string(),
            material: Material::CokingCoal,
            quantity_t: coal * days,
            event_ts: opening_ts,
        });
        events.push(NewStockEvent {
            location_code: code.to_string(),
            material: Material::Limestone,
            quantity_t: lime * (days + 4.0),
            event_ts: opening_ts,
        });
    }

    Ok(repo.append_batch(&events)?.len())
}

fn seed_shipments(repo: &ShipmentRepository, base_date: NaiveDate) -> Result<usize, Box<dyn Error>> {
    // (ID, 物料, 吨位, 船舶, 装货港, 要求到厂偏移, ETA 偏移)
    let shipments = [
        ("SHP-001", Material::CokingCoal, 150_000.0, "CAPE_ANNA", "GLADSTONE", 10, 2),
        ("SHP-002", Material::CokingCoal, 75_000.0, "CAPE_BELLA", "HAY_POINT", 8, 3),
        ("SHP-003", Material::CokingCoal, 72_000.0, "PMX_CORAL", "GLADSTONE", 6, 1),
        ("SHP-004", Material::CokingCoal, 70_000.0, "PMX_DELTA", "HAY_POINT", 12, 5),
        ("SHP-005", Material::Limestone, 52_000.0, "SMX_EMBER", "MINA_SAQR", 9, 4),
        ("SHP-006", Material::Limestone, 48_000.0, "PMX_CORAL", "MINA_SAQR", 14, 9),
        ("SHP-007", Material::CokingCoal, 140_000.0, "CAPE_ANNA", "GLADSTONE", 16, 11),
        ("SHP-008", Material::CokingCoal, 50_000.0, "SMX_EMBER", "HAY_POINT", 3, 2),
    ];

    for (id, material, quantity, vessel, supplier, required_in, eta_in) in shipments {
        repo.upsert(&Shipment {
            shipment_id: id.to_string(),
            material,
            quantity_t: quantity,
            vessel_code: vessel.to_string(),
            supplier_port: supplier.to_string(),
            required_by: base_date + Duration::days(required_in),
            eta: Some(base_date + Duration::days(eta_in)),
            status: ShipmentStatus::Scheduled,
            splits: vec![],
        })?;
    }
    Ok(shipments.len())
}
