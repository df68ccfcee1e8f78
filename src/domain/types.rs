// ==========================================
// 进口散货分配系统 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 物料 (Material)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Material {
    CokingCoal, // 炼焦煤
    Limestone,  // 石灰石
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl Material {
    pub const ALL: [Material; 2] = [Material::CokingCoal, Material::Limestone];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "COKING_COAL" => Some(Material::CokingCoal),
            "LIMESTONE" => Some(Material::Limestone),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            Material::CokingCoal => "COKING_COAL",
            Material::Limestone => "LIMESTONE",
        }
    }
}

// ==========================================
// 船货状态 (Shipment Status)
// ==========================================
// 生命周期: Draft → Scheduled → PortSelected → InTransit → Delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Draft,        // 草稿
    Scheduled,    // 已排船
    PortSelected, // 已选港
    InTransit,    // 在途
    Delivered,    // 已交付
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ShipmentStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Some(ShipmentStatus::Draft),
            "SCHEDULED" => Some(ShipmentStatus::Scheduled),
            "PORT_SELECTED" => Some(ShipmentStatus::PortSelected),
            "IN_TRANSIT" => Some(ShipmentStatus::InTransit),
            "DELIVERED" => Some(ShipmentStatus::Delivered),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Draft => "DRAFT",
            ShipmentStatus::Scheduled => "SCHEDULED",
            ShipmentStatus::PortSelected => "PORT_SELECTED",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::Delivered => "DELIVERED",
        }
    }

    /// 只允许原地不动或前进一步
    pub fn can_transition_to(&self, next: ShipmentStatus) -> bool {
        let from = *self as u8;
        let to = next as u8;
        to == from || to == from + 1
    }

    /// 是否仍可参与分配（在途/已交付的船货卸港已确定）
    pub fn is_plannable(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Draft | ShipmentStatus::Scheduled | ShipmentStatus::PortSelected
        )
    }
}

// ==========================================
// 币种 (Currency)
// ==========================================
// 海运费按美元计价，港杂/铁路按卢比计价
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Usd,
    Inr,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl Currency {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "INR" => Some(Currency::Inr),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Inr => "INR",
        }
    }
}

// ==========================================
// 告警级别 (Alert Level)
// ==========================================
// 顺序: Normal < Warning < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl AlertLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NORMAL" => Some(AlertLevel::Normal),
            "WARNING" => Some(AlertLevel::Warning),
            "CRITICAL" => Some(AlertLevel::Critical),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "NORMAL",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

// ==========================================
// 告警类型 (Alert Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LowDaysCover,   // 库存可用天数不足
    HighCongestion, // 港口拥堵
    UrgentRequest,  // 紧急到货需求未分配
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl AlertType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOW_DAYS_COVER" => Some(AlertType::LowDaysCover),
            "HIGH_CONGESTION" => Some(AlertType::HighCongestion),
            "URGENT_REQUEST" => Some(AlertType::UrgentRequest),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            AlertType::LowDaysCover => "LOW_DAYS_COVER",
            AlertType::HighCongestion => "HIGH_CONGESTION",
            AlertType::UrgentRequest => "URGENT_REQUEST",
        }
    }
}

// ==========================================
// 方案类型 (Plan Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanKind {
    Baseline, // 基线方案
    Scenario, // 假设分析方案
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PlanKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BASELINE" => Some(PlanKind::Baseline),
            "SCENARIO" => Some(PlanKind::Scenario),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlanKind::Baseline => "BASELINE",
            PlanKind::Scenario => "SCENARIO",
        }
    }
}
