// ==========================================
// 进口散货分配系统 - 可行性过滤器
// ==========================================
// 职责: 计算船货在给定日期可合法卸货的港口集合
// 规则:
//   1) vessel.draft_m <= port.max_draft_m
//   2) 装货港 → 卸货港存在海运运价（无运价无法计费）
//   3) capacity_entry(date, port).stockyard_t > 0
//   4) 至少一条出港线路 available_rakes(date, route) > 0
// 红线: 可行集为空时必须报告不可行，不得静默丢弃
// ==========================================

use crate::domain::capacity::CapacityLocation;
use crate::domain::network::{NetworkModel, Port, Vessel};
use crate::domain::plan::{BindingConstraint, LegCost, PlanWarning};
use crate::domain::shipment::Shipment;
use crate::engine::cost_model::CostModel;
use crate::engine::error::EngineResult;
use crate::engine::snapshot::PlanningState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

// ==========================================
// PortRejection - 港口被排除的原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortRejection {
    DraftExceeded { vessel_draft_m: f64, max_draft_m: f64 },
    NoFreightRate,
    NoStockyardCapacity,
    NoRailCapacity,
}

impl PortRejection {
    fn stage(&self) -> u8 {
        match self {
            PortRejection::DraftExceeded { .. } => 0,
            PortRejection::NoFreightRate => 1,
            PortRejection::NoStockyardCapacity => 2,
            PortRejection::NoRailCapacity => 3,
        }
    }

    pub fn binding_constraint(&self) -> BindingConstraint {
        match self {
            PortRejection::DraftExceeded { .. } => BindingConstraint::DraftLimit,
            PortRejection::NoFreightRate => BindingConstraint::NoFreightRate,
            PortRejection::NoStockyardCapacity => BindingConstraint::NoStockyardCapacity,
            PortRejection::NoRailCapacity => BindingConstraint::NoRailCapacity,
        }
    }
}

// ==========================================
// PortDateOption - 某港某日的可用卸货选项
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDateOption {
    pub port_code: String,
    pub date: NaiveDate,
    pub stockyard_t: f64,
    pub berths: u32,
    pub congestion_index: f64,
    pub plants: Vec<(String, u32)>, // (钢厂, 可用车列)，按钢厂代码排序
}

// ==========================================
// FeasibilityReport - 单船货可行性报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub shipment_id: String,
    pub feasible_ports: Vec<String>, // 按港口代码排序
    pub options: Vec<PortDateOption>,
    pub rejected: BTreeMap<String, PortRejection>,
    pub warnings: Vec<PlanWarning>,
    /// 整船走单一组合时的到厂成本，按单吨成本升序；过滤本身不填
    #[serde(default)]
    pub cost_estimates: Vec<TripleCostEstimate>,
}

/// 单个 (港口, 卸货日, 钢厂) 组合的到厂成本估计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripleCostEstimate {
    pub port_code: String,
    pub discharge_date: NaiveDate,
    pub plant_code: String,
    pub tonnage_t: f64,
    pub cost: LegCost,
    pub cost_per_t: f64,
}

impl FeasibilityReport {
    /// 为每个可行选项下有车列的钢厂估计整船到厂成本
    ///
    /// 等待天数按 arrival 起算；港口当日仅此一船
    pub fn with_cost_estimates(
        mut self,
        network: &NetworkModel,
        shipment: &Shipment,
        cost_model: &CostModel,
        arrival: NaiveDate,
    ) -> EngineResult<Self> {
        let mut estimates = Vec::new();
        for option in &self.options {
            let wait_days = (option.date - arrival).num_days().max(0);
            for (plant_code, rakes) in &option.plants {
                if *rakes == 0 {
                    continue;
                }
                let estimate = cost_model.estimate_triple(
                    network,
                    shipment,
                    option,
                    wait_days,
                    plant_code,
                    shipment.quantity_t,
                )?;
                if let Some(cost) = estimate {
                    estimates.push(TripleCostEstimate {
                        port_code: option.port_code.clone(),
                        discharge_date: option.date,
                        plant_code: plant_code.clone(),
                        tonnage_t: shipment.quantity_t,
                        cost_per_t: if shipment.quantity_t > 0.0 {
                            cost.total() / shipment.quantity_t
                        } else {
                            0.0
                        },
                        cost,
                    });
                }
            }
        }
        estimates.sort_by(|a, b| {
            a.cost_per_t
                .total_cmp(&b.cost_per_t)
                .then_with(|| a.port_code.cmp(&b.port_code))
                .then_with(|| a.discharge_date.cmp(&b.discharge_date))
                .then_with(|| a.plant_code.cmp(&b.plant_code))
        });
        self.cost_estimates = estimates;
        Ok(self)
    }

    pub fn is_feasible(&self) -> bool {
        !self.options.is_empty()
    }

    /// 不可行时的约束诊断：取被排除港口中走得最远的一步
    pub fn binding_constraint(&self) -> Option<BindingConstraint> {
        if self.is_feasible() {
            return None;
        }
        self.rejected
            .values()
            .max_by_key(|r| r.stage())
            .map(|r| r.binding_constraint())
            .or(Some(BindingConstraint::NoStockyardCapacity))
    }

    pub fn describe(&self) -> String {
        if self.rejected.is_empty() {
            return "网络中无可用卸货港".to_string();
        }
        self.rejected
            .iter()
            .map(|(port, r)| match r {
                PortRejection::DraftExceeded {
                    vessel_draft_m,
                    max_draft_m,
                } => format!("{}: 吃水 {:.1}m > {:.1}m", port, vessel_draft_m, max_draft_m),
                PortRejection::NoFreightRate => format!("{}: 无海运运价", port),
                PortRejection::NoStockyardCapacity => format!("{}: 窗口内无堆场能力", port),
                PortRejection::NoRailCapacity => format!("{}: 窗口内无可用车列", port),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ==========================================
// FeasibilityFilter - 可行性过滤器
// ==========================================
pub struct FeasibilityFilter {
    // 无状态引擎
}

impl FeasibilityFilter {
    pub fn new() -> Self {
        Self {}
    }

    /// 单日可行港口
    pub fn feasible_ports<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        shipment: &Shipment,
        vessel: &Vessel,
        date: NaiveDate,
    ) -> FeasibilityReport {
        self.check_window(state, shipment, vessel, &[date])
    }

    /// 卸货窗口内的全部 (港口, 日期) 选项
    #[instrument(skip(self, state, shipment, vessel, dates), fields(
        shipment_id = %shipment.shipment_id,
        window_days = dates.len()
    ))]
    pub fn check_window<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        shipment: &Shipment,
        vessel: &Vessel,
        dates: &[NaiveDate],
    ) -> FeasibilityReport {
        let network = state.network();
        let mut warnings: BTreeSet<PlanWarning> = BTreeSet::new();
        let mut options = Vec::new();
        let mut feasible_ports = Vec::new();
        let mut rejected = BTreeMap::new();

        for port in network.ports.values() {
            match self.check_port(state, shipment, vessel, port, dates, &mut warnings) {
                Ok(port_options) => {
                    feasible_ports.push(port.port_code.clone());
                    options.extend(port_options);
                }
                Err(reason) => {
                    rejected.insert(port.port_code.clone(), reason);
                }
            }
        }

        tracing::debug!(
            feasible = feasible_ports.len(),
            rejected = rejected.len(),
            "可行性过滤完成"
        );

        FeasibilityReport {
            shipment_id: shipment.shipment_id.clone(),
            feasible_ports,
            options,
            rejected,
            warnings: warnings.into_iter().collect(),
            cost_estimates: Vec::new(),
        }
    }

    fn check_port<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        shipment: &Shipment,
        vessel: &Vessel,
        port: &Port,
        dates: &[NaiveDate],
        warnings: &mut BTreeSet<PlanWarning>,
    ) -> Result<Vec<PortDateOption>, PortRejection> {
        let network = state.network();

        if vessel.draft_m > port.max_draft_m {
            return Err(PortRejection::DraftExceeded {
                vessel_draft_m: vessel.draft_m,
                max_draft_m: port.max_draft_m,
            });
        }
        if network
            .ocean_freight(&shipment.supplier_port, &port.port_code)
            .is_none()
        {
            return Err(PortRejection::NoFreightRate);
        }

        let port_location = CapacityLocation::port(&port.port_code);
        let mut any_stockyard = false;
        let mut options = Vec::new();

        for &date in dates {
            let entry = match state.capacity_entry(date, &port_location) {
                Some(e) => e,
                None => {
                    warnings.insert(PlanWarning::StaleCapacityData {
                        date,
                        location: port_location.key(),
                    });
                    continue;
                }
            };
            if entry.stockyard_t() <= 0.0 {
                continue;
            }
            any_stockyard = true;

            let mut plants = Vec::new();
            for route in network.routes_from(&port.port_code) {
                if network.plant(&route.plant_code).is_none() {
                    continue;
                }
                let route_location = CapacityLocation::route(&route.port_code, &route.plant_code);
                match state.capacity_entry(date, &route_location) {
                    Some(route_entry) => {
                        let rakes = route_entry.rakes().min(route.max_rakes_per_day);
                        if rakes > 0 {
                            plants.push((route.plant_code.clone(), rakes));
                        }
                    }
                    None => {
                        warnings.insert(PlanWarning::StaleCapacityData {
                            date,
                            location: route_location.key(),
                        });
                    }
                }
            }
            if plants.is_empty() {
                continue;
            }

            options.push(PortDateOption {
                port_code: port.port_code.clone(),
                date,
                stockyard_t: entry.stockyard_t(),
                berths: entry.berths(),
                congestion_index: entry.congestion_index(),
                plants,
            });
        }

        if !options.is_empty() {
            Ok(options)
        } else if any_stockyard {
            Err(PortRejection::NoRailCapacity)
        } else {
            Err(PortRejection::NoStockyardCapacity)
        }
    }
}

impl Default for FeasibilityFilter {
    fn default() -> Self {
        Self::new()
    }
}
