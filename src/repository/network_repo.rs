// ==========================================
// 进口散货分配系统 - 网络主数据仓储
// ==========================================
// 职责: plant / port / rail_route / vessel / ocean_freight_rate 的读写
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::money::Money;
use crate::domain::network::{NetworkModel, OceanFreightRate, Plant, Port, RailRoute, Vessel};
use crate::domain::types::{Currency, Material};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::get_enum;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// NetworkRepository - 网络主数据仓储
// ==========================================
pub struct NetworkRepository {
    conn: Arc<Mutex<Connection>>,
}

impl NetworkRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 插入或更新钢厂（日耗整体替换）
    pub fn upsert_plant(&self, plant: &Plant) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO plant (
                plant_code, plant_name, latitude, longitude, min_days_cover, target_days_cover
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(plant_code) DO UPDATE SET
                plant_name = excluded.plant_name,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                min_days_cover = excluded.min_days_cover,
                target_days_cover = excluded.target_days_cover
            "#,
            params![
                plant.plant_code,
                plant.plant_name,
                plant.latitude,
                plant.longitude,
                plant.min_days_cover,
                plant.target_days_cover,
            ],
        )?;

        tx.execute(
            "DELETE FROM plant_consumption WHERE plant_code = ?1",
            params![plant.plant_code],
        )?;
        for (material, rate) in &plant.consumption_rates {
            tx.execute(
                "INSERT INTO plant_consumption (plant_code, material, daily_rate_t) VALUES (?1, ?2, ?3)",
                params![plant.plant_code, material.to_db_str(), rate],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn upsert_port(&self, port: &Port) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO port (
                port_code, port_name, latitude, longitude, max_draft_m,
                stockyard_capacity_t, berths, free_storage_days,
                handling_rate, handling_currency,
                storage_rate_per_day, storage_currency,
                port_dues_rate, port_dues_currency
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                port.port_code,
                port.port_name,
                port.latitude,
                port.longitude,
                port.max_draft_m,
                port.stockyard_capacity_t,
                port.berths,
                port.free_storage_days,
                port.handling_rate.amount,
                port.handling_rate.currency.to_db_str(),
                port.storage_rate_per_day.amount,
                port.storage_rate_per_day.currency.to_db_str(),
                port.port_dues_rate.amount,
                port.port_dues_rate.currency.to_db_str(),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_route(&self, route: &RailRoute) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO rail_route (
                port_code, plant_code, distance_km, max_rakes_per_day,
                freight_rate_per_t_km, freight_currency
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                route.port_code,
                route.plant_code,
                route.distance_km,
                route.max_rakes_per_day,
                route.freight_rate_per_t_km.amount,
                route.freight_rate_per_t_km.currency.to_db_str(),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_vessel(&self, vessel: &Vessel) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO vessel (vessel_code, vessel_name, draft_m, capacity_t) VALUES (?1, ?2, ?3, ?4)",
            params![vessel.vessel_code, vessel.vessel_name, vessel.draft_m, vessel.capacity_t],
        )?;
        Ok(())
    }

    pub fn upsert_freight_rate(&self, rate: &OceanFreightRate) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO ocean_freight_rate (
                supplier_port, discharge_port, rate_per_t, currency
            ) VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                rate.supplier_port,
                rate.discharge_port,
                rate.rate_per_t.amount,
                rate.rate_per_t.currency.to_db_str(),
            ],
        )?;
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn list_plants(&self) -> RepositoryResult<Vec<Plant>> {
        let conn = self.get_conn()?;

        let mut rates: BTreeMap<String, BTreeMap<Material, f64>> = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT plant_code, material, daily_rate_t FROM plant_consumption ORDER BY plant_code, material",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        get_enum(row, 1, Material::from_str)?,
                        row.get::<_, f64>(2)?,
                    ))
                })?
                .collect::<SqliteResult<Vec<_>>>()?;
            for (plant_code, material, rate) in rows {
                rates.entry(plant_code).or_default().insert(material, rate);
            }
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT plant_code, plant_name, latitude, longitude, min_days_cover, target_days_cover
            FROM plant
            ORDER BY plant_code
            "#,
        )?;
        let plants = stmt
            .query_map([], |row| {
                let plant_code: String = row.get(0)?;
                Ok(Plant {
                    consumption_rates: rates.get(&plant_code).cloned().unwrap_or_default(),
                    plant_code,
                    plant_name: row.get(1)?,
                    latitude: row.get(2)?,
                    longitude: row.get(3)?,
                    min_days_cover: row.get(4)?,
                    target_days_cover: row.get(5)?,
                })
            })?
            .collect::<SqliteResult<Vec<Plant>>>()?;

        Ok(plants)
    }

    pub fn list_ports(&self) -> RepositoryResult<Vec<Port>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                port_code, port_name, latitude, longitude, max_draft_m,
                stockyard_capacity_t, berths, free_storage_days,
                handling_rate, handling_currency,
                storage_rate_per_day, storage_currency,
                port_dues_rate, port_dues_currency
            FROM port
            ORDER BY port_code
            "#,
        )?;
        let ports = stmt
            .query_map([], |row| {
                Ok(Port {
                    port_code: row.get(0)?,
                    port_name: row.get(1)?,
                    latitude: row.get(2)?,
                    longitude: row.get(3)?,
                    max_draft_m: row.get(4)?,
                    stockyard_capacity_t: row.get(5)?,
                    berths: row.get(6)?,
                    free_storage_days: row.get(7)?,
                    handling_rate: Money::new(row.get(8)?, get_enum(row, 9, Currency::from_str)?),
                    storage_rate_per_day: Money::new(row.get(10)?, get_enum(row, 11, Currency::from_str)?),
                    port_dues_rate: Money::new(row.get(12)?, get_enum(row, 13, Currency::from_str)?),
                })
            })?
            .collect::<SqliteResult<Vec<Port>>>()?;
        Ok(ports)
    }

    pub fn list_routes(&self) -> RepositoryResult<Vec<RailRoute>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT port_code, plant_code, distance_km, max_rakes_per_day,
                   freight_rate_per_t_km, freight_currency
            FROM rail_route
            ORDER BY port_code, plant_code
            "#,
        )?;
        let routes = stmt
            .query_map([], |row| {
                Ok(RailRoute {
                    port_code: row.get(0)?,
                    plant_code: row.get(1)?,
                    distance_km: row.get(2)?,
                    max_rakes_per_day: row.get(3)?,
                    freight_rate_per_t_km: Money::new(row.get(4)?, get_enum(row, 5, Currency::from_str)?),
                })
            })?
            .collect::<SqliteResult<Vec<RailRoute>>>()?;
        Ok(routes)
    }

    pub fn list_vessels(&self) -> RepositoryResult<Vec<Vessel>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT vessel_code, vessel_name, draft_m, capacity_t FROM vessel ORDER BY vessel_code",
        )?;
        let vessels = stmt
            .query_map([], |row| {
                Ok(Vessel {
                    vessel_code: row.get(0)?,
                    vessel_name: row.get(1)?,
                    draft_m: row.get(2)?,
                    capacity_t: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<Vessel>>>()?;
        Ok(vessels)
    }

    pub fn list_freight_rates(&self) -> RepositoryResult<Vec<OceanFreightRate>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT supplier_port, discharge_port, rate_per_t, currency
            FROM ocean_freight_rate
            ORDER BY supplier_port, discharge_port
            "#,
        )?;
        let rates = stmt
            .query_map([], |row| {
                Ok(OceanFreightRate {
                    supplier_port: row.get(0)?,
                    discharge_port: row.get(1)?,
                    rate_per_t: Money::new(row.get(2)?, get_enum(row, 3, Currency::from_str)?),
                })
            })?
            .collect::<SqliteResult<Vec<OceanFreightRate>>>()?;
        Ok(rates)
    }

    /// 加载完整网络快照
    pub fn load_network(&self) -> RepositoryResult<NetworkModel> {
        Ok(NetworkModel::new(
            self.list_plants()?,
            self.list_ports()?,
            self.list_routes()?,
            self.list_vessels()?,
            self.list_freight_rates()?,
        ))
    }
}
