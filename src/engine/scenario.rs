// ==========================================
// 进口散货分配系统 - 情景引擎 (What-if)
// ==========================================
// 职责: 在基线快照之上叠加假设值后求解，不触碰基线存储
// 实现: 读时叠加，查询先看叠加层，缺失再回落到基线
// 红线:
//   - 叠加层为每次运行私有，并发情景互不可见
//   - 情景转正（写回基线）是独立的显式操作，不在本引擎内完成
// ==========================================

use crate::config::PlanningConfig;
use crate::domain::capacity::{CapacityEntry, CapacityLocation};
use crate::domain::network::NetworkModel;
use crate::domain::plan::AllocationPlan;
use crate::domain::shipment::Shipment;
use crate::domain::types::{Material, PlanKind};
use crate::engine::cost_model::CurrencyConverter;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::optimizer::{AllocationOptimizer, Deadline, OptimizeOutcome, OptimizeRequest};
use crate::engine::snapshot::{PlanningSnapshot, PlanningState};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument};

// ==========================================
// ScenarioOverlay - 情景假设
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionOverride {
    pub plant_code: String,
    pub material: Material,
    pub daily_rate_t: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub location_code: String,
    pub material: Material,
    pub delta_t: f64, // 带符号
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOverlay {
    pub name: String,
    /// 按 (日期, 地点) 整行替换基线登记
    #[serde(default)]
    pub capacity: Vec<CapacityEntry>,
    /// 按 shipment_id 替换；基线中不存在的追加
    #[serde(default)]
    pub shipments: Vec<Shipment>,
    #[serde(default)]
    pub consumption_rates: Vec<ConsumptionOverride>,
    #[serde(default)]
    pub stock_adjustments: Vec<StockAdjustment>,
}

impl ScenarioOverlay {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_capacity(mut self, entry: CapacityEntry) -> Self {
        self.capacity.push(entry);
        self
    }

    pub fn with_shipment(mut self, shipment: Shipment) -> Self {
        self.shipments.push(shipment);
        self
    }

    pub fn with_consumption_rate(mut self, plant_code: &str, material: Material, daily_rate_t: f64) -> Self {
        self.consumption_rates.push(ConsumptionOverride {
            plant_code: plant_code.to_string(),
            material,
            daily_rate_t,
        });
        self
    }

    pub fn with_stock_adjustment(mut self, location_code: &str, material: Material, delta_t: f64) -> Self {
        self.stock_adjustments.push(StockAdjustment {
            location_code: location_code.to_string(),
            material,
            delta_t,
        });
        self
    }

    /// 叠加后的船货批次（按 shipment_id 排序）
    pub fn apply_shipments(&self, baseline: &[Shipment]) -> Vec<Shipment> {
        let mut merged: BTreeMap<String, Shipment> = baseline
            .iter()
            .map(|s| (s.shipment_id.clone(), s.clone()))
            .collect();
        for s in &self.shipments {
            merged.insert(s.shipment_id.clone(), s.clone());
        }
        merged.into_values().collect()
    }
}

// ==========================================
// OverlayView - 读时叠加视图
// ==========================================
pub struct OverlayView<'a, S: PlanningState + ?Sized> {
    base: &'a S,
    capacity: BTreeMap<(NaiveDate, CapacityLocation), CapacityEntry>,
    rates: BTreeMap<(String, Material), f64>,
    stock_delta: BTreeMap<(String, Material), f64>,
}

impl<'a, S: PlanningState + ?Sized> OverlayView<'a, S> {
    pub fn new(base: &'a S, overlay: &ScenarioOverlay) -> Self {
        let capacity = overlay
            .capacity
            .iter()
            .map(|e| ((e.entry_date, e.location.clone()), e.clone()))
            .collect();
        let rates = overlay
            .consumption_rates
            .iter()
            .map(|r| ((r.plant_code.clone(), r.material), r.daily_rate_t))
            .collect();
        let mut stock_delta: BTreeMap<(String, Material), f64> = BTreeMap::new();
        for adj in &overlay.stock_adjustments {
            *stock_delta
                .entry((adj.location_code.clone(), adj.material))
                .or_insert(0.0) += adj.delta_t;
        }
        Self {
            base,
            capacity,
            rates,
            stock_delta,
        }
    }
}

impl<'a, S: PlanningState + ?Sized> PlanningState for OverlayView<'a, S> {
    fn network(&self) -> &NetworkModel {
        self.base.network()
    }

    fn capacity_entry(&self, date: NaiveDate, location: &CapacityLocation) -> Option<&CapacityEntry> {
        self.capacity
            .get(&(date, location.clone()))
            .or_else(|| self.base.capacity_entry(date, location))
    }

    fn current_stock_t(&self, location_code: &str, material: Material) -> f64 {
        let delta = self
            .stock_delta
            .get(&(location_code.to_string(), material))
            .copied()
            .unwrap_or(0.0);
        self.base.current_stock_t(location_code, material) + delta
    }

    fn daily_rate(&self, plant_code: &str, material: Material) -> Option<f64> {
        match self.rates.get(&(plant_code.to_string(), material)) {
            Some(rate) if *rate > 0.0 => Some(*rate),
            Some(_) => None,
            None => self.base.daily_rate(plant_code, material),
        }
    }
}

// ==========================================
// PlanComparison - 情景 vs 基线
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanComparison {
    pub baseline_plan_id: String,
    pub scenario_plan_id: String,
    pub landed_cost_delta: f64,
    pub objective_delta: f64,
    pub allocated_delta_t: f64,
    pub newly_unallocated: Vec<String>,
    pub newly_allocated: Vec<String>,
}

// ==========================================
// ScenarioEngine - 情景引擎
// ==========================================
pub struct ScenarioEngine {
    optimizer: AllocationOptimizer,
}

impl ScenarioEngine {
    pub fn new() -> Self {
        Self {
            optimizer: AllocationOptimizer::new(),
        }
    }

    /// 单个情景求解
    #[instrument(skip(self, baseline, overlay, shipments, arrivals, config, deadline), fields(
        scenario = %overlay.name,
        as_of = %as_of_date
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn run_scenario<S: PlanningState + ?Sized>(
        &self,
        baseline: &S,
        overlay: &ScenarioOverlay,
        shipments: &[Shipment],
        as_of_date: NaiveDate,
        arrivals: &BTreeMap<String, NaiveDate>,
        config: &PlanningConfig,
        deadline: &Deadline,
    ) -> EngineResult<OptimizeOutcome> {
        let view = OverlayView::new(baseline, overlay);
        let batch = overlay.apply_shipments(shipments);
        let request = OptimizeRequest {
            shipments: &batch,
            as_of_date,
            arrivals,
            kind: PlanKind::Scenario,
        };
        self.optimizer.optimize(&view, &request, config, deadline)
    }

    /// 并发求解多个情景（各自独立的叠加层与时限）
    pub async fn run_batch(
        baseline: Arc<PlanningSnapshot>,
        overlays: Vec<ScenarioOverlay>,
        shipments: Arc<Vec<Shipment>>,
        as_of_date: NaiveDate,
        arrivals: Arc<BTreeMap<String, NaiveDate>>,
        config: PlanningConfig,
    ) -> Vec<EngineResult<OptimizeOutcome>> {
        info!(count = overlays.len(), %as_of_date, "开始批量情景求解");

        let tasks = overlays.into_iter().map(|overlay| {
            let baseline = Arc::clone(&baseline);
            let shipments = Arc::clone(&shipments);
            let arrivals = Arc::clone(&arrivals);
            let config = config.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    let deadline = Deadline::after_ms(config.solver_deadline_ms);
                    ScenarioEngine::new().run_scenario(
                        baseline.as_ref(),
                        &overlay,
                        &shipments,
                        as_of_date,
                        &arrivals,
                        &config,
                        &deadline,
                    )
                })
                .await
                .map_err(|e| EngineError::InvalidState(format!("情景任务执行失败: {}", e)))?
            }
        });

        let results = join_all(tasks).await;
        info!(
            total = results.len(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量情景求解完成"
        );
        results
    }

    /// 对比两个方案；币种或汇率口径不同则拒绝
    pub fn compare_plans(baseline: &AllocationPlan, scenario: &AllocationPlan) -> EngineResult<PlanComparison> {
        CurrencyConverter::ensure_same_basis(
            (baseline.cost.reporting_currency, &baseline.cost.exchange_rate),
            (scenario.cost.reporting_currency, &scenario.cost.exchange_rate),
        )?;

        let served = |plan: &AllocationPlan| -> BTreeSet<String> {
            plan.legs.iter().map(|l| l.shipment_id.clone()).collect()
        };
        // 基线中未分配、情景中有腿的船货
        let unserved = |plan: &AllocationPlan| -> BTreeSet<String> {
            plan.unallocated.iter().map(|u| u.shipment_id.clone()).collect()
        };
        let scen_served = served(scenario);
        let (base_unserved, scen_unserved) = (unserved(baseline), unserved(scenario));

        Ok(PlanComparison {
            baseline_plan_id: baseline.plan_id.clone(),
            scenario_plan_id: scenario.plan_id.clone(),
            landed_cost_delta: scenario.cost.landed_total - baseline.cost.landed_total,
            objective_delta: scenario.cost.objective_total - baseline.cost.objective_total,
            allocated_delta_t: scenario.score.allocated_t - baseline.score.allocated_t,
            newly_unallocated: scen_unserved.difference(&base_unserved).cloned().collect(),
            newly_allocated: scen_served
                .intersection(&base_unserved)
                .cloned()
                .collect(),
        })
    }
}

impl Default for ScenarioEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capacity::CapacityValues;
    use crate::domain::types::ShipmentStatus;
    use crate::engine::snapshot::CapacitySnapshot;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn port_entry(day: u32, stockyard_t: f64) -> CapacityEntry {
        CapacityEntry {
            entry_date: d(day),
            location: CapacityLocation::port("VIZAG"),
            values: CapacityValues::Port {
                berths: 3,
                stockyard_t,
                congestion_index: 0.4,
            },
            updated_at: d(1).and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    fn shipment(id: &str, quantity_t: f64) -> Shipment {
        Shipment {
            shipment_id: id.to_string(),
            material: Material::CokingCoal,
            quantity_t,
            vessel_code: "V1".to_string(),
            supplier_port: "GLADSTONE".to_string(),
            required_by: d(20),
            eta: Some(d(5)),
            status: ShipmentStatus::Scheduled,
            splits: vec![],
        }
    }

    #[test]
    fn test_overlay_reads_through_to_baseline() {
        let baseline = PlanningSnapshot {
            capacity: CapacitySnapshot::from_entries(vec![port_entry(5, 100_000.0), port_entry(6, 100_000.0)]),
            ..Default::default()
        };
        let overlay = ScenarioOverlay::named("vizag-outage")
            .with_capacity(port_entry(5, 0.0))
            .with_stock_adjustment("BSP", Material::CokingCoal, -5_000.0)
            .with_consumption_rate("BSP", Material::Limestone, 0.0);
        let view = OverlayView::new(&baseline, &overlay);

        let loc = CapacityLocation::port("VIZAG");
        assert_eq!(view.capacity_entry(d(5), &loc).map(|e| e.stockyard_t()), Some(0.0));
        assert_eq!(view.capacity_entry(d(6), &loc).map(|e| e.stockyard_t()), Some(100_000.0));
        assert_eq!(view.current_stock_t("BSP", Material::CokingCoal), -5_000.0);
        assert_eq!(view.daily_rate("BSP", Material::Limestone), None);

        // 基线不受影响
        assert_eq!(baseline.capacity_entry(d(5), &loc).map(|e| e.stockyard_t()), Some(100_000.0));
    }

    #[test]
    fn test_apply_shipments_replaces_by_id() {
        let overlay = ScenarioOverlay::named("bigger-cargo")
            .with_shipment(shipment("S2", 90_000.0))
            .with_shipment(shipment("S3", 10_000.0));
        let merged = overlay.apply_shipments(&[shipment("S1", 50_000.0), shipment("S2", 75_000.0)]);
        let got: Vec<(&str, f64)> = merged.iter().map(|s| (s.shipment_id.as_str(), s.quantity_t)).collect();
        assert_eq!(got, vec![("S1", 50_000.0), ("S2", 90_000.0), ("S3", 10_000.0)]);
    }
}
