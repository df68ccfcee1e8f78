// ==========================================
// 进口散货分配系统 - 分配优化引擎
// ==========================================
// 职责: 将一批船货的吨位拆分到 (港口, 卸货日, 钢厂)，总成本最小
// 硬约束:
//   - 每船货分拆之和 = 船货吨位
//   - 每港每日卸货 <= 堆场能力
//   - 每线路每日发运 <= 可用车列 × 每列吨位
// 软目标: 钢厂库存低于最低天数 / 目标天数的缺口（惩罚项）
// 平局规则: 同成本时优先 required_by 更早的船货，其次分拆腿数更少
// 红线:
//   - 相同输入必须得到逐位相同的方案（无随机性）
//   - 无法满载分配的船货显式列入未分配，附约束诊断
//   - 不得虚构卸货港
// ==========================================

mod decompose;
mod flow;
mod graph;

pub use flow::{FlowSummary, MinCostFlow};

use crate::config::PlanningConfig;
use crate::domain::plan::{
    AllocationPlan, BindingConstraint, InfeasibleResult, PlanWarning, UnallocatedShipment,
};
use crate::domain::shipment::Shipment;
use crate::domain::types::{Material, PlanKind};
use crate::engine::cost_model::CostModel;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::feasibility::{FeasibilityFilter, PortDateOption};
use crate::engine::snapshot::PlanningState;
use chrono::{Duration as DateDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use graph::{
    floor_kg, kg_to_t, to_kg, to_units, Candidate, MaterialSolution, NodeKey, PlantSink, PortDayNode,
    Residual, RouteArc, ShipmentArc,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// 费用单位: 1 分/吨 = TIE_SCALE；低于此分辨率的部分用于平局规则
pub const TIE_SCALE: i64 = 1_000_000;

pub const SOLVER_NAME: &str = "SSP_MIN_COST_FLOW";

// ==========================================
// Deadline - 调用方时限
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn none() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    pub fn after_ms(ms: u64) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(Duration::from_millis(ms)),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    /// # 错误
    /// - DeadlineExceeded: 已超出时限
    pub fn check(&self) -> EngineResult<()> {
        if let Some(limit) = self.limit {
            let elapsed = self.started.elapsed();
            if elapsed > limit {
                return Err(EngineError::DeadlineExceeded {
                    elapsed_ms: elapsed.as_millis(),
                    limit_ms: limit.as_millis(),
                });
            }
        }
        Ok(())
    }
}

// ==========================================
// OptimizeRequest / OptimizeOutcome
// ==========================================
#[derive(Debug, Clone)]
pub struct OptimizeRequest<'a> {
    pub shipments: &'a [Shipment],
    pub as_of_date: NaiveDate,
    /// 外部 ETA 估计（船货 ID → 抵港日）；缺失时用登记 ETA
    pub arrivals: &'a BTreeMap<String, NaiveDate>,
    pub kind: PlanKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizeOutcome {
    Planned(AllocationPlan),
    /// 没有任何船货可分配
    Infeasible(InfeasibleResult),
}

impl OptimizeOutcome {
    pub fn plan(&self) -> Option<&AllocationPlan> {
        match self {
            OptimizeOutcome::Planned(plan) => Some(plan),
            OptimizeOutcome::Infeasible(_) => None,
        }
    }

    pub fn unallocated(&self) -> &[UnallocatedShipment] {
        match self {
            OptimizeOutcome::Planned(plan) => &plan.unallocated,
            OptimizeOutcome::Infeasible(result) => &result.unallocated,
        }
    }

    pub fn warnings(&self) -> &[PlanWarning] {
        match self {
            OptimizeOutcome::Planned(plan) => &plan.warnings,
            OptimizeOutcome::Infeasible(result) => &result.warnings,
        }
    }
}

/// 单物料求解后的结果，交给方案拆解阶段
pub(crate) struct MaterialRun {
    pub material: Material,
    pub solution: MaterialSolution,
}

/// 求解前的批次准备结果
pub(crate) struct PreparedBatch {
    pub candidates: Vec<Candidate>,
    pub nodes: BTreeMap<NodeKey, PortDayNode>,
    pub unallocated: Vec<UnallocatedShipment>,
    pub warnings: BTreeSet<PlanWarning>,
}

// ==========================================
// AllocationOptimizer - 分配优化器
// ==========================================
pub struct AllocationOptimizer {
    feasibility: FeasibilityFilter,
}

impl AllocationOptimizer {
    pub fn new() -> Self {
        Self {
            feasibility: FeasibilityFilter::new(),
        }
    }

    /// 求解一批船货
    ///
    /// 输入快照只读；同输入同输出
    ///
    /// # 错误
    /// - CurrencyMismatch: 汇率无效或费用项币种无法换算
    /// - DeadlineExceeded: 精确求解超出时限
    #[instrument(skip(self, state, request, config, deadline), fields(
        as_of = %request.as_of_date,
        shipments = request.shipments.len()
    ))]
    pub fn optimize<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        request: &OptimizeRequest<'_>,
        config: &PlanningConfig,
        deadline: &Deadline,
    ) -> EngineResult<OptimizeOutcome> {
        let cost_model = CostModel::new(config)?;
        let mut batch = self.prepare_batch(state, request, &cost_model)?;

        // 按物料分组，缺口大的物料先占用共享能力
        let mut by_material: BTreeMap<Material, Vec<usize>> = BTreeMap::new();
        for (pos, c) in batch.candidates.iter().enumerate() {
            by_material
                .entry(request.shipments[c.index].material)
                .or_default()
                .push(pos);
        }
        let mut order: Vec<(Material, i64)> = by_material
            .keys()
            .map(|m| (*m, material_shortage_kg(state, *m)))
            .collect();
        order.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut residual = Residual::default();
        let mut runs = Vec::new();
        for (material, shortage_kg) in order {
            let positions = by_material.get(&material).cloned().unwrap_or_default();
            let total_kg: i64 = positions.iter().map(|p| batch.candidates[*p].quantity_kg).sum();
            let sinks = plant_sinks(state, material, &cost_model);

            debug!(%material, shortage_kg, total_kg, candidates = positions.len(), "物料求解开始");

            let (solution, excluded) = solve_with_exclusion(
                &batch.candidates,
                &positions,
                &batch.nodes,
                &sinks,
                &residual,
                deadline,
            )?;
            residual.commit(&solution);

            for pos in excluded {
                let c = &batch.candidates[pos];
                let quantity_t = request.shipments[c.index].quantity_t;
                batch
                    .unallocated
                    .push(diagnose_exhausted(c, quantity_t, &batch.nodes, &residual));
            }
            runs.push(MaterialRun { material, solution });
        }

        batch.unallocated.sort_by(|a, b| a.shipment_id.cmp(&b.shipment_id));

        let outcome = decompose::assemble(state, request, &cost_model, &batch, runs)?;
        match &outcome {
            OptimizeOutcome::Planned(plan) => info!(
                plan_id = %plan.plan_id,
                legs = plan.legs.len(),
                unallocated = plan.unallocated.len(),
                objective = plan.cost.objective_total,
                elapsed_ms = deadline.elapsed_ms() as u64,
                "分配方案已生成"
            ),
            OptimizeOutcome::Infeasible(result) => warn!(
                unallocated = result.unallocated.len(),
                "整批无可行分配"
            ),
        }
        Ok(outcome)
    }

    /// 可行性过滤 + 港口日节点 + 船货弧
    fn prepare_batch<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        request: &OptimizeRequest<'_>,
        cost_model: &CostModel,
    ) -> EngineResult<PreparedBatch> {
        let network = state.network();
        let config = cost_model.config();
        let n = request.shipments.len();

        let mut ranked: Vec<usize> = (0..n).collect();
        ranked.sort_by(|a, b| {
            let (sa, sb) = (&request.shipments[*a], &request.shipments[*b]);
            sa.required_by
                .cmp(&sb.required_by)
                .then_with(|| sa.shipment_id.cmp(&sb.shipment_id))
        });
        let mut rank = vec![0usize; n];
        for (r, idx) in ranked.iter().enumerate() {
            rank[*idx] = r;
        }

        let mut batch = PreparedBatch {
            candidates: Vec::new(),
            nodes: BTreeMap::new(),
            unallocated: Vec::new(),
            warnings: BTreeSet::new(),
        };

        for (index, shipment) in request.shipments.iter().enumerate() {
            let vessel = network.vessel(&shipment.vessel_code).ok_or_else(|| {
                EngineError::InvalidState(format!(
                    "船货 {} 引用未知船舶 {}",
                    shipment.shipment_id, shipment.vessel_code
                ))
            })?;

            let quantity_kg = to_kg(shipment.quantity_t);
            if quantity_kg <= 0 {
                return Err(EngineError::InvalidState(format!(
                    "船货 {} 吨位 {} 不足 1 千克",
                    shipment.shipment_id, shipment.quantity_t
                )));
            }

            let arrival = arrival_date(shipment, request);
            let dates: Vec<NaiveDate> = (0..=config.max_berth_wait_days.max(0))
                .map(|d| arrival + DateDuration::days(d))
                .collect();

            let report = self.feasibility.check_window(state, shipment, vessel, &dates);
            batch.warnings.extend(report.warnings.iter().cloned());

            if !report.is_feasible() {
                batch.unallocated.push(UnallocatedShipment {
                    shipment_id: shipment.shipment_id.clone(),
                    quantity_t: shipment.quantity_t,
                    binding_constraint: report
                        .binding_constraint()
                        .unwrap_or(BindingConstraint::NoStockyardCapacity),
                    detail: report.describe(),
                });
                continue;
            }

            let mut arcs = Vec::with_capacity(report.options.len());
            for option in &report.options {
                let key: NodeKey = (option.port_code.clone(), option.date);
                if !batch.nodes.contains_key(&key) {
                    let node = build_node(state, cost_model, option)?;
                    batch.nodes.insert(key.clone(), node);
                }
                let handling = batch.nodes.get(&key).map(|n| n.handling_per_t).unwrap_or(0.0);

                let ocean = cost_model
                    .ocean_freight_per_t(network, &shipment.supplier_port, &option.port_code)?
                    .ok_or_else(|| {
                        EngineError::InvalidState(format!(
                            "{} -> {} 缺少海运运价",
                            shipment.supplier_port, option.port_code
                        ))
                    })?;
                let wait_days = (option.date - arrival).num_days();
                let wait_demurrage = cost_model.waiting_demurrage_per_t(wait_days, shipment.quantity_t)?;

                // 次级项: 越早要求到厂的船货，每等一天代价越高
                let tie = (n - rank[index]) as i64 * wait_days;
                arcs.push(ShipmentArc {
                    node: key,
                    wait_days,
                    ocean_per_t: ocean,
                    wait_demurrage_per_t: wait_demurrage,
                    units: to_units(ocean + handling + wait_demurrage).saturating_add(tie),
                });
            }

            batch.candidates.push(Candidate {
                index,
                shipment_id: shipment.shipment_id.clone(),
                required_by: shipment.required_by,
                rank: rank[index],
                quantity_kg,
                arcs,
            });
        }

        debug!(
            candidates = batch.candidates.len(),
            nodes = batch.nodes.len(),
            prescreen_unallocated = batch.unallocated.len(),
            "批次准备完成"
        );
        Ok(batch)
    }
}

impl Default for AllocationOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 抵港日: 外部估计 > 登记 ETA > as_of，且不早于 as_of
fn arrival_date(shipment: &Shipment, request: &OptimizeRequest<'_>) -> NaiveDate {
    request
        .arrivals
        .get(&shipment.shipment_id)
        .copied()
        .or(shipment.eta)
        .unwrap_or(request.as_of_date)
        .max(request.as_of_date)
}

fn build_node<S: PlanningState + ?Sized>(
    state: &S,
    cost_model: &CostModel,
    option: &PortDateOption,
) -> EngineResult<PortDayNode> {
    let network = state.network();
    let config = cost_model.config();
    let port = network
        .port(&option.port_code)
        .ok_or_else(|| EngineError::InvalidState(format!("未知港口 {}", option.port_code)))?;

    let segments = cost_model.band_segments(port, option)?;

    // 分段容量按千克向下取整，最后一段补齐到总能力
    let total_kg = floor_kg(option.stockyard_t);
    let mut band_cap_kg = Vec::with_capacity(segments.len());
    let mut assigned = 0i64;
    for (i, seg) in segments.iter().enumerate() {
        let cap = if i + 1 == segments.len() {
            total_kg - assigned
        } else {
            floor_kg(seg.capacity_t).min(total_kg - assigned)
        };
        assigned += cap;
        band_cap_kg.push(cap.max(0));
    }
    let band_units = segments.iter().map(|s| to_units(s.cost_per_t())).collect();

    let mut routes = Vec::with_capacity(option.plants.len());
    for (plant_code, rakes) in &option.plants {
        let route = match network.route(&option.port_code, plant_code) {
            Some(r) => r,
            None => continue,
        };
        let rail_per_t = cost_model.rail_freight_per_t(route)?;
        routes.push(RouteArc {
            plant_code: plant_code.clone(),
            cap_kg: floor_kg(*rakes as f64 * config.per_rake_capacity_t),
            rail_per_t,
            units: to_units(rail_per_t),
        });
    }

    Ok(PortDayNode {
        key: (option.port_code.clone(), option.date),
        segments,
        band_cap_kg,
        band_units,
        handling_per_t: cost_model.port_handling_per_t(port)?,
        routes,
    })
}

/// (最低缺口, 目标缺口) 吨位
pub(crate) fn plant_gaps(stock_t: f64, rate: f64, min_days: f64, target_days: f64) -> (f64, f64) {
    let min_t = min_days.max(0.0) * rate;
    let target_t = target_days.max(min_days).max(0.0) * rate;
    let shortage = (min_t - stock_t).max(0.0);
    let gap = (target_t - stock_t.max(min_t)).max(0.0);
    (shortage, gap)
}

fn material_shortage_kg<S: PlanningState + ?Sized>(state: &S, material: Material) -> i64 {
    state
        .network()
        .plants
        .values()
        .filter_map(|plant| {
            let rate = state.daily_rate(&plant.plant_code, material)?;
            let stock = state.current_stock_t(&plant.plant_code, material);
            let (shortage, _) = plant_gaps(stock, rate, plant.min_days_cover, plant.target_days_cover);
            Some(to_kg(shortage))
        })
        .sum()
}

fn plant_sinks<S: PlanningState + ?Sized>(state: &S, material: Material, cost_model: &CostModel) -> Vec<PlantSink> {
    state
        .network()
        .plants
        .values()
        .map(|plant| {
            let code = plant.plant_code.clone();
            match state.daily_rate(&code, material) {
                Some(rate) if rate > 0.0 => {
                    let stock = state.current_stock_t(&code, material);
                    let (shortage, gap) =
                        plant_gaps(stock, rate, plant.min_days_cover, plant.target_days_cover);
                    PlantSink {
                        plant_code: code,
                        shortage_kg: to_kg(shortage),
                        shortage_units: -to_units(cost_model.shortage_value_per_t(rate)),
                        gap_kg: to_kg(gap),
                        gap_units: -to_units(cost_model.target_gap_value_per_t(rate)),
                    }
                }
                _ => PlantSink {
                    plant_code: code,
                    shortage_kg: 0,
                    shortage_units: 0,
                    gap_kg: 0,
                    gap_units: 0,
                },
            }
        })
        .collect()
}

/// 逐个剔除无法满载的船货，再按 required_by 顺序尝试重新纳入
///
/// 返回最终解与仍被剔除的候选位置
fn solve_with_exclusion(
    candidates: &[Candidate],
    positions: &[usize],
    nodes: &BTreeMap<NodeKey, PortDayNode>,
    sinks: &[PlantSink],
    residual: &Residual,
    deadline: &Deadline,
) -> EngineResult<(MaterialSolution, Vec<usize>)> {
    let by_rank = |list: &mut Vec<usize>| list.sort_by_key(|p| candidates[*p].rank);
    let solve = |list: &[usize]| {
        let refs: Vec<&Candidate> = list.iter().map(|p| &candidates[*p]).collect();
        graph::solve_material(&refs, nodes, sinks, residual, deadline)
    };
    let shortfall = |sol: &MaterialSolution, p: usize| candidates[p].quantity_kg - sol.served(candidates[p].index);

    let mut included: Vec<usize> = positions.to_vec();
    by_rank(&mut included);
    let mut excluded: Vec<usize> = Vec::new();

    let mut solution = loop {
        let sol = solve(&included)?;
        let victim = included
            .iter()
            .copied()
            .filter(|p| shortfall(&sol, *p) > 0)
            .max_by(|a, b| {
                let (ca, cb) = (&candidates[*a], &candidates[*b]);
                shortfall(&sol, *a)
                    .cmp(&shortfall(&sol, *b))
                    .then(ca.required_by.cmp(&cb.required_by))
                    .then_with(|| ca.shipment_id.cmp(&cb.shipment_id))
            });
        match victim {
            None => break sol,
            Some(p) => {
                debug!(
                    shipment_id = %candidates[p].shipment_id,
                    shortfall_kg = shortfall(&sol, p),
                    "剔除无法满载的船货"
                );
                included.retain(|x| *x != p);
                excluded.push(p);
            }
        }
    };

    by_rank(&mut excluded);
    let mut still_excluded = Vec::new();
    for p in excluded {
        let mut trial = included.clone();
        trial.push(p);
        by_rank(&mut trial);
        let sol = solve(&trial)?;
        if trial.iter().all(|q| shortfall(&sol, *q) == 0) {
            debug!(shipment_id = %candidates[p].shipment_id, "船货重新纳入");
            included = trial;
            solution = sol;
        } else {
            still_excluded.push(p);
        }
    }

    Ok((solution, still_excluded))
}

/// 被剔除船货的约束诊断（在记入本物料占用之后）
fn diagnose_exhausted(
    candidate: &Candidate,
    quantity_t: f64,
    nodes: &BTreeMap<NodeKey, PortDayNode>,
    residual: &Residual,
) -> UnallocatedShipment {
    let touched: Vec<&PortDayNode> = candidate
        .arcs
        .iter()
        .filter_map(|a| nodes.get(&a.node))
        .collect();
    let stockyard_kg: i64 = touched.iter().map(|n| residual.stockyard_remaining_kg(n)).sum();
    let rail_kg: i64 = touched.iter().map(|n| residual.rail_remaining_at(n)).sum();

    let (binding, detail) = if stockyard_kg < candidate.quantity_kg {
        (
            BindingConstraint::StockyardExhausted,
            format!(
                "窗口内剩余堆场 {:.3}t < 船货 {:.3}t",
                kg_to_t(stockyard_kg),
                quantity_t
            ),
        )
    } else {
        (
            BindingConstraint::RailExhausted,
            format!(
                "窗口内剩余铁路能力 {:.3}t 不足以疏运 {:.3}t",
                kg_to_t(rail_kg),
                quantity_t
            ),
        )
    };

    UnallocatedShipment {
        shipment_id: candidate.shipment_id.clone(),
        quantity_t,
        binding_constraint: binding,
        detail,
    }
}
