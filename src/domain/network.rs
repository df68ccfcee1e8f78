// ==========================================
// 进口散货分配系统 - 物流网络主数据
// ==========================================
// 红线: 优化期间只读
// ==========================================

use crate::domain::money::Money;
use crate::domain::types::Material;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// Plant - 钢厂
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plant {
    pub plant_code: String,  // 钢厂代码 (唯一)
    pub plant_name: String,  // 钢厂名称
    pub latitude: f64,
    pub longitude: f64,

    // ===== 消耗与库存阈值 =====
    pub consumption_rates: BTreeMap<Material, f64>, // 日耗 (吨/天)
    pub min_days_cover: f64,    // 最低可用天数
    pub target_days_cover: f64, // 目标可用天数
}

impl Plant {
    /// 日耗；未配置或为 0 时返回 None（可用天数无定义）
    pub fn daily_rate(&self, material: Material) -> Option<f64> {
        self.consumption_rates
            .get(&material)
            .copied()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
    }
}

// ==========================================
// Port - 卸货港
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub port_code: String,
    pub port_name: String,
    pub latitude: f64,
    pub longitude: f64,

    // ===== 物理约束 =====
    pub max_draft_m: f64,          // 最大吃水 (米)
    pub stockyard_capacity_t: f64, // 堆场设计能力 (吨)
    pub berths: u32,               // 泊位数
    pub free_storage_days: f64,    // 免堆存天数

    // ===== 费率 (每吨) =====
    pub handling_rate: Money,        // 装卸费
    pub storage_rate_per_day: Money, // 超期堆存费 (每吨每天)
    pub port_dues_rate: Money,       // 港务费
}

// ==========================================
// RailRoute - 铁路线路 (港口 → 钢厂)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailRoute {
    pub port_code: String,
    pub plant_code: String,
    pub distance_km: f64,
    pub max_rakes_per_day: u32,
    pub freight_rate_per_t_km: Money,
}

impl RailRoute {
    /// 每吨铁路运费
    pub fn freight_per_t(&self) -> Money {
        self.freight_rate_per_t_km.times(self.distance_km)
    }
}

// ==========================================
// Vessel - 船舶
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vessel {
    pub vessel_code: String,
    pub vessel_name: String,
    pub draft_m: f64,
    pub capacity_t: f64,
}

// ==========================================
// OceanFreightRate - 海运航线运价
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OceanFreightRate {
    pub supplier_port: String,
    pub discharge_port: String,
    pub rate_per_t: Money,
}

// ==========================================
// NetworkModel - 网络快照
// ==========================================
// BTreeMap 保证遍历顺序稳定（优化结果确定性依赖于此）
// 注: 元组键无法直接序列化为 JSON，故不派生 Serialize
#[derive(Debug, Clone, Default)]
pub struct NetworkModel {
    pub plants: BTreeMap<String, Plant>,
    pub ports: BTreeMap<String, Port>,
    pub routes: BTreeMap<(String, String), RailRoute>,
    pub vessels: BTreeMap<String, Vessel>,
    pub freight_rates: BTreeMap<(String, String), OceanFreightRate>,
}

impl NetworkModel {
    pub fn new(
        plants: Vec<Plant>,
        ports: Vec<Port>,
        routes: Vec<RailRoute>,
        vessels: Vec<Vessel>,
        freight_rates: Vec<OceanFreightRate>,
    ) -> Self {
        Self {
            plants: plants.into_iter().map(|p| (p.plant_code.clone(), p)).collect(),
            ports: ports.into_iter().map(|p| (p.port_code.clone(), p)).collect(),
            routes: routes
                .into_iter()
                .map(|r| ((r.port_code.clone(), r.plant_code.clone()), r))
                .collect(),
            vessels: vessels.into_iter().map(|v| (v.vessel_code.clone(), v)).collect(),
            freight_rates: freight_rates
                .into_iter()
                .map(|r| ((r.supplier_port.clone(), r.discharge_port.clone()), r))
                .collect(),
        }
    }

    pub fn plant(&self, plant_code: &str) -> Option<&Plant> {
        self.plants.get(plant_code)
    }

    pub fn port(&self, port_code: &str) -> Option<&Port> {
        self.ports.get(port_code)
    }

    pub fn vessel(&self, vessel_code: &str) -> Option<&Vessel> {
        self.vessels.get(vessel_code)
    }

    pub fn route(&self, port_code: &str, plant_code: &str) -> Option<&RailRoute> {
        self.routes
            .get(&(port_code.to_string(), plant_code.to_string()))
    }

    /// 从指定港口出发的全部线路（按钢厂代码排序）
    pub fn routes_from<'a>(&'a self, port_code: &'a str) -> impl Iterator<Item = &'a RailRoute> + 'a {
        self.routes
            .values()
            .filter(move |r| r.port_code == port_code)
    }

    pub fn ocean_freight(&self, supplier_port: &str, discharge_port: &str) -> Option<&OceanFreightRate> {
        self.freight_rates
            .get(&(supplier_port.to_string(), discharge_port.to_string()))
    }
}
