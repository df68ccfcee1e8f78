// ==========================================
// 进口散货分配系统 - 能力登记领域模型
// ==========================================
// 红线: 同一 (日期, 地点) 只有一条记录，整行替换
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// CapacityLocation - 能力所属地点
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityLocation {
    Port { port_code: String },
    Route { port_code: String, plant_code: String },
}

impl CapacityLocation {
    pub fn port(port_code: &str) -> Self {
        CapacityLocation::Port {
            port_code: port_code.to_string(),
        }
    }

    pub fn route(port_code: &str, plant_code: &str) -> Self {
        CapacityLocation::Route {
            port_code: port_code.to_string(),
            plant_code: plant_code.to_string(),
        }
    }

    /// 存储键: PORT:VIZAG / ROUTE:VIZAG:BSP
    pub fn key(&self) -> String {
        match self {
            CapacityLocation::Port { port_code } => format!("PORT:{}", port_code),
            CapacityLocation::Route {
                port_code,
                plant_code,
            } => format!("ROUTE:{}:{}", port_code, plant_code),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            CapacityLocation::Port { .. } => "PORT",
            CapacityLocation::Route { .. } => "ROUTE",
        }
    }

    /// 由存储字段还原
    pub fn from_parts(kind: &str, port_code: &str, plant_code: Option<&str>) -> Option<Self> {
        match (kind.trim().to_uppercase().as_str(), plant_code) {
            ("PORT", _) => Some(Self::port(port_code)),
            ("ROUTE", Some(plant)) if !plant.trim().is_empty() => Some(Self::route(port_code, plant)),
            _ => None,
        }
    }

    pub fn port_code(&self) -> &str {
        match self {
            CapacityLocation::Port { port_code } => port_code,
            CapacityLocation::Route { port_code, .. } => port_code,
        }
    }

    pub fn plant_code(&self) -> Option<&str> {
        match self {
            CapacityLocation::Port { .. } => None,
            CapacityLocation::Route { plant_code, .. } => Some(plant_code),
        }
    }
}

impl fmt::Display for CapacityLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

// ==========================================
// CapacityValues - 资源可用量
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityValues {
    Port {
        berths: u32,           // 可用泊位
        stockyard_t: f64,      // 可用堆场吨位
        congestion_index: f64, // 拥堵指数 (0 = 畅通, 1 = 严重拥堵)
    },
    Route {
        rakes: u32, // 可用车列数/天
    },
}

// ==========================================
// CapacityEntry - 能力登记
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityEntry {
    pub entry_date: NaiveDate,
    pub location: CapacityLocation,
    pub values: CapacityValues,
    pub updated_at: NaiveDateTime,
}

impl CapacityEntry {
    /// 地点与资源类型是否一致（港口记录不能携带车列数）
    pub fn is_consistent(&self) -> bool {
        matches!(
            (&self.location, &self.values),
            (CapacityLocation::Port { .. }, CapacityValues::Port { .. })
                | (CapacityLocation::Route { .. }, CapacityValues::Route { .. })
        )
    }

    pub fn stockyard_t(&self) -> f64 {
        match self.values {
            CapacityValues::Port { stockyard_t, .. } => stockyard_t.max(0.0),
            CapacityValues::Route { .. } => 0.0,
        }
    }

    pub fn berths(&self) -> u32 {
        match self.values {
            CapacityValues::Port { berths, .. } => berths,
            CapacityValues::Route { .. } => 0,
        }
    }

    pub fn congestion_index(&self) -> f64 {
        match self.values {
            CapacityValues::Port {
                congestion_index, ..
            } => congestion_index.max(0.0),
            CapacityValues::Route { .. } => 0.0,
        }
    }

    pub fn rakes(&self) -> u32 {
        match self.values {
            CapacityValues::Route { rakes } => rakes,
            CapacityValues::Port { .. } => 0,
        }
    }
}
