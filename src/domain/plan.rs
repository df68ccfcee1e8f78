// ==========================================
// 进口散货分配系统 - 分配方案领域模型
// ==========================================
// 红线: 方案一经生成即不可变，重算只产生新方案
// ==========================================

use crate::domain::money::PinnedExchangeRate;
use crate::domain::shipment::ShipmentSplit;
use crate::domain::types::{Currency, Material, PlanKind};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// LegCost - 单腿费用（报表币种）
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LegCost {
    pub ocean_freight: f64,
    pub port_handling: f64, // 装卸费 + 港务费
    pub storage: f64,
    pub demurrage: f64, // 待泊滞期 + 拥堵滞期风险
    pub rail_freight: f64,
}

impl LegCost {
    pub fn total(&self) -> f64 {
        self.ocean_freight + self.port_handling + self.storage + self.demurrage + self.rail_freight
    }

    pub fn add(&mut self, other: &LegCost) {
        self.ocean_freight += other.ocean_freight;
        self.port_handling += other.port_handling;
        self.storage += other.storage;
        self.demurrage += other.demurrage;
        self.rail_freight += other.rail_freight;
    }
}

// ==========================================
// CostBreakdown - 方案费用汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub reporting_currency: Currency,
    pub exchange_rate: PinnedExchangeRate,
    pub legs: LegCost,            // 按费用项汇总
    pub landed_total: f64,        // 到厂总成本
    pub coverage_penalty: f64,    // 未补足库存天数的惩罚
    pub objective_total: f64,     // landed_total + coverage_penalty
}

// ==========================================
// AllocationLeg - 分配腿
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLeg {
    pub shipment_id: String,
    pub material: Material,
    pub port_code: String,
    pub discharge_date: NaiveDate,
    pub plant_code: String,
    pub tonnage_t: f64,
    pub cost: LegCost,
}

// ==========================================
// BindingConstraint - 未分配原因
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindingConstraint {
    DraftLimit,          // 所有港口吃水不足
    NoFreightRate,       // 吃水满足的港口均无海运运价
    NoStockyardCapacity, // 窗口内无堆场能力登记/能力为 0
    NoRailCapacity,      // 窗口内无可用车列
    StockyardExhausted,  // 堆场能力被本批其他船货占满
    RailExhausted,       // 铁路能力被本批其他船货占满
}

impl fmt::Display for BindingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingConstraint::DraftLimit => "DRAFT_LIMIT",
            BindingConstraint::NoFreightRate => "NO_FREIGHT_RATE",
            BindingConstraint::NoStockyardCapacity => "NO_STOCKYARD_CAPACITY",
            BindingConstraint::NoRailCapacity => "NO_RAIL_CAPACITY",
            BindingConstraint::StockyardExhausted => "STOCKYARD_EXHAUSTED",
            BindingConstraint::RailExhausted => "RAIL_EXHAUSTED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnallocatedShipment {
    pub shipment_id: String,
    pub quantity_t: f64,
    pub binding_constraint: BindingConstraint,
    pub detail: String,
}

// ==========================================
// PlanWarning - 方案警告
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanWarning {
    /// 缺少能力登记，按 0 能力处理
    StaleCapacityData { date: NaiveDate, location: String },
}

// ==========================================
// PlantCoverage - 钢厂库存覆盖
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantCoverage {
    pub plant_code: String,
    pub material: Material,
    pub stock_t: f64,
    pub inbound_t: f64,
    pub days_cover_before: Option<f64>,
    pub days_cover_after: Option<f64>,
}

// ==========================================
// PlanScore - 可行性/最优性评分
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanScore {
    pub requested_t: f64,
    pub allocated_t: f64,
    pub allocated_ratio: f64,
    pub fully_allocated: usize,
    pub unallocated: usize,
    pub total_legs: usize,
    pub solver: String,
    pub optimality_gap: f64, // 精确求解为 0
}

// ==========================================
// AllocationPlan - 分配方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub plan_id: String, // 由输入派生（同输入同 ID）
    pub kind: PlanKind,
    pub as_of_date: NaiveDate,
    pub legs: Vec<AllocationLeg>,
    pub unallocated: Vec<UnallocatedShipment>,
    pub warnings: Vec<PlanWarning>,
    pub plant_coverage: Vec<PlantCoverage>,
    pub cost: CostBreakdown,
    pub score: PlanScore,
}

impl AllocationPlan {
    /// 某船货的分拆（按腿顺序）
    pub fn splits_for(&self, shipment_id: &str) -> Vec<ShipmentSplit> {
        self.legs
            .iter()
            .filter(|l| l.shipment_id == shipment_id)
            .map(|l| ShipmentSplit {
                port_code: l.port_code.clone(),
                discharge_date: l.discharge_date,
                plant_code: l.plant_code.clone(),
                tonnage_t: l.tonnage_t,
            })
            .collect()
    }

    pub fn allocated_t_for(&self, shipment_id: &str) -> f64 {
        self.legs
            .iter()
            .filter(|l| l.shipment_id == shipment_id)
            .map(|l| l.tonnage_t)
            .sum()
    }

    /// 某港某日卸货吨位
    pub fn discharged_t(&self, port_code: &str, date: NaiveDate) -> f64 {
        self.legs
            .iter()
            .filter(|l| l.port_code == port_code && l.discharge_date == date)
            .map(|l| l.tonnage_t)
            .sum()
    }

    /// 某线路某日发运吨位
    pub fn railed_t(&self, port_code: &str, plant_code: &str, date: NaiveDate) -> f64 {
        self.legs
            .iter()
            .filter(|l| l.port_code == port_code && l.plant_code == plant_code && l.discharge_date == date)
            .map(|l| l.tonnage_t)
            .sum()
    }

    pub fn is_fully_allocated(&self) -> bool {
        self.unallocated.is_empty()
    }
}

// ==========================================
// InfeasibleResult - 整批不可分配
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfeasibleResult {
    pub as_of_date: NaiveDate,
    pub unallocated: Vec<UnallocatedShipment>,
    pub warnings: Vec<PlanWarning>,
}

// ==========================================
// PlanRecord - 落库的方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub run_id: String, // 每次落库唯一
    pub stored_at: NaiveDateTime,
    pub plan: AllocationPlan,
}
