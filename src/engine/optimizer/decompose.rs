// ==========================================
// 进口散货分配系统 - 流量分解与方案组装
// ==========================================
// 步骤:
//   1) 合并分拆: 不增加目标值的前提下交换两船货的港口日流量，减少腿数
//   2) 西北角分解: 港口日内按 (船货次序, 钢厂代码) 配对，得到分配腿
//   3) 费用归集: 港口分段费用按吨位比例摊到各腿
//   4) 库存覆盖、评分、方案 ID（输入内容派生的 v5 UUID）
// ==========================================

use super::graph::{kg_to_t, Candidate, MaterialSolution, NodeKey};
use super::{MaterialRun, OptimizeOutcome, OptimizeRequest, PreparedBatch, SOLVER_NAME};
use crate::domain::plan::{
    AllocationLeg, AllocationPlan, CostBreakdown, InfeasibleResult, LegCost, PlanScore, PlantCoverage,
};
use crate::domain::shipment::TONNAGE_EPSILON_T;
use crate::domain::types::Material;
use crate::engine::cost_model::CostModel;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::snapshot::PlanningState;
use crate::engine::stock_ledger::StockLedger;
use std::collections::BTreeMap;
use uuid::Uuid;

/// 分解后的单腿（千克）
#[derive(Debug, Clone, PartialEq)]
struct LegDraft {
    index: usize,
    node: NodeKey,
    plant_code: String,
    kg: i64,
}

pub(crate) fn assemble<S: PlanningState + ?Sized>(
    state: &S,
    request: &OptimizeRequest<'_>,
    cost_model: &CostModel,
    batch: &PreparedBatch,
    runs: Vec<MaterialRun>,
) -> EngineResult<OptimizeOutcome> {
    let candidates: BTreeMap<usize, &Candidate> = batch.candidates.iter().map(|c| (c.index, c)).collect();

    let mut legs = Vec::new();
    for mut run in runs {
        consolidate(&mut run.solution, &candidates);
        let drafts = northwest_corner(&run.solution, &candidates)?;
        legs.extend(price_legs(request, batch, &candidates, &run, drafts)?);
    }
    legs.sort_by(|a, b| {
        a.shipment_id
            .cmp(&b.shipment_id)
            .then(a.discharge_date.cmp(&b.discharge_date))
            .then_with(|| a.port_code.cmp(&b.port_code))
            .then_with(|| a.plant_code.cmp(&b.plant_code))
    });

    let warnings: Vec<_> = batch.warnings.iter().cloned().collect();
    if legs.is_empty() && !batch.unallocated.is_empty() {
        return Ok(OptimizeOutcome::Infeasible(InfeasibleResult {
            as_of_date: request.as_of_date,
            unallocated: batch.unallocated.clone(),
            warnings,
        }));
    }

    let plant_coverage = plant_coverage(state, &legs);
    let coverage_penalty = coverage_penalty(state, cost_model, &plant_coverage);

    let mut leg_totals = LegCost::default();
    for leg in &legs {
        leg_totals.add(&leg.cost);
    }
    let landed_total = leg_totals.total();

    let requested_t: f64 = request.shipments.iter().map(|s| s.quantity_t).sum();
    let allocated_t: f64 = legs.iter().map(|l| l.tonnage_t).sum();
    let fully_allocated = request
        .shipments
        .iter()
        .filter(|s| legs.iter().any(|l| l.shipment_id == s.shipment_id))
        .count();

    let mut plan = AllocationPlan {
        plan_id: String::new(),
        kind: request.kind,
        as_of_date: request.as_of_date,
        score: PlanScore {
            requested_t,
            allocated_t,
            allocated_ratio: if requested_t > 0.0 { allocated_t / requested_t } else { 0.0 },
            fully_allocated,
            unallocated: batch.unallocated.len(),
            total_legs: legs.len(),
            solver: SOLVER_NAME.to_string(),
            optimality_gap: 0.0,
        },
        legs,
        unallocated: batch.unallocated.clone(),
        warnings,
        plant_coverage,
        cost: CostBreakdown {
            reporting_currency: cost_model.converter().reporting_currency(),
            exchange_rate: cost_model.converter().pinned(),
            legs: leg_totals,
            landed_total,
            coverage_penalty,
            objective_total: landed_total + coverage_penalty,
        },
    };
    plan.plan_id = derive_plan_id(&plan)?;

    Ok(OptimizeOutcome::Planned(plan))
}

/// 方案 ID = v5(方案内容)；同输入同 ID
fn derive_plan_id(plan: &AllocationPlan) -> EngineResult<String> {
    let bytes = serde_json::to_vec(plan)
        .map_err(|e| EngineError::InvalidState(format!("方案序列化失败: {}", e)))?;
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &bytes).to_string())
}

// ==========================================
// 合并分拆
// ==========================================

/// 交换两船货在两个港口日的流量（各港口日总量不变）
///
/// 仅接受不增加费用、且能减少 (船货, 港口日) 对数的交换；对数严格递减保证终止
fn consolidate(solution: &mut MaterialSolution, candidates: &BTreeMap<usize, &Candidate>) {
    let unit_cost = |index: usize, node: &NodeKey| -> Option<i128> {
        candidates
            .get(&index)
            .and_then(|c| c.arc_to(node))
            .map(|a| a.units as i128)
    };

    loop {
        let mut per_ship: BTreeMap<usize, Vec<(NodeKey, i64)>> = BTreeMap::new();
        let mut per_node: BTreeMap<NodeKey, Vec<usize>> = BTreeMap::new();
        for ((index, node), kg) in &solution.arc_flow {
            per_ship.entry(*index).or_default().push((node.clone(), *kg));
            per_node.entry(node.clone()).or_default().push(*index);
        }

        let mut multi: Vec<usize> = per_ship
            .iter()
            .filter(|(_, nodes)| nodes.len() > 1)
            .map(|(index, _)| *index)
            .collect();
        multi.sort_by_key(|i| candidates.get(i).map(|c| c.rank).unwrap_or(usize::MAX));

        let mut swap: Option<(usize, usize, NodeKey, NodeKey, i64)> = None;
        'search: for a in multi {
            let mut a_nodes = per_ship.get(&a).cloned().unwrap_or_default();
            a_nodes.sort_by(|x, y| x.1.cmp(&y.1).then_with(|| x.0.cmp(&y.0)));
            for (n2, xa2) in &a_nodes {
                for (n1, _) in &a_nodes {
                    if n1 == n2 {
                        continue;
                    }
                    for &b in per_node.get(n1).map(|v| v.as_slice()).unwrap_or(&[]) {
                        if b == a {
                            continue;
                        }
                        let (ca1, ca2, cb1, cb2) = match (
                            unit_cost(a, n1),
                            unit_cost(a, n2),
                            unit_cost(b, n1),
                            unit_cost(b, n2),
                        ) {
                            (Some(w), Some(x), Some(y), Some(z)) => (w, x, y, z),
                            _ => continue,
                        };
                        if ca1 - ca2 - cb1 + cb2 > 0 {
                            continue;
                        }
                        let xb1 = solution.arc_flow.get(&(b, n1.clone())).copied().unwrap_or(0);
                        let xb2 = solution.arc_flow.get(&(b, n2.clone())).copied().unwrap_or(0);
                        let delta = (*xa2).min(xb1);
                        if delta <= 0 {
                            continue;
                        }
                        let removed = (*xa2 == delta) as u8 + (xb1 == delta) as u8;
                        let added = (xb2 == 0) as u8;
                        if removed > added {
                            swap = Some((a, b, n1.clone(), n2.clone(), delta));
                            break 'search;
                        }
                    }
                }
            }
        }

        match swap {
            None => break,
            Some((a, b, n1, n2, delta)) => {
                shift(&mut solution.arc_flow, (a, n2.clone()), -delta);
                shift(&mut solution.arc_flow, (b, n1.clone()), -delta);
                shift(&mut solution.arc_flow, (a, n1), delta);
                shift(&mut solution.arc_flow, (b, n2), delta);
            }
        }
    }
}

fn shift(flows: &mut BTreeMap<(usize, NodeKey), i64>, key: (usize, NodeKey), delta: i64) {
    let value = flows.get(&key).copied().unwrap_or(0) + delta;
    if value > 0 {
        flows.insert(key, value);
    } else {
        flows.remove(&key);
    }
}

// ==========================================
// 西北角分解
// ==========================================
fn northwest_corner(
    solution: &MaterialSolution,
    candidates: &BTreeMap<usize, &Candidate>,
) -> EngineResult<Vec<LegDraft>> {
    let mut inflow: BTreeMap<&NodeKey, Vec<(usize, i64)>> = BTreeMap::new();
    for ((index, node), kg) in &solution.arc_flow {
        inflow.entry(node).or_default().push((*index, *kg));
    }
    let mut outflow: BTreeMap<&NodeKey, Vec<(&str, i64)>> = BTreeMap::new();
    for ((node, plant), kg) in &solution.route_flow {
        outflow.entry(node).or_default().push((plant.as_str(), *kg));
    }

    let mut drafts = Vec::new();
    for (node, mut ships) in inflow {
        ships.sort_by_key(|(i, _)| candidates.get(i).map(|c| c.rank).unwrap_or(usize::MAX));
        let plants = outflow.get(node).cloned().unwrap_or_default();

        let ship_total: i64 = ships.iter().map(|(_, kg)| kg).sum();
        let plant_total: i64 = plants.iter().map(|(_, kg)| kg).sum();
        if ship_total != plant_total {
            return Err(EngineError::InvalidState(format!(
                "港口日 {} {} 流量不守恒: 卸货 {}kg, 发运 {}kg",
                node.0, node.1, ship_total, plant_total
            )));
        }

        let (mut i, mut j) = (0, 0);
        let mut ship_left = ships.first().map(|s| s.1).unwrap_or(0);
        let mut plant_left = plants.first().map(|p| p.1).unwrap_or(0);
        while i < ships.len() && j < plants.len() {
            let take = ship_left.min(plant_left);
            if take > 0 {
                drafts.push(LegDraft {
                    index: ships[i].0,
                    node: node.clone(),
                    plant_code: plants[j].0.to_string(),
                    kg: take,
                });
            }
            ship_left -= take;
            plant_left -= take;
            if ship_left == 0 {
                i += 1;
                ship_left = ships.get(i).map(|s| s.1).unwrap_or(0);
            }
            if plant_left == 0 {
                j += 1;
                plant_left = plants.get(j).map(|p| p.1).unwrap_or(0);
            }
        }
    }
    Ok(drafts)
}

// ==========================================
// 费用归集
// ==========================================
fn price_legs(
    request: &OptimizeRequest<'_>,
    batch: &PreparedBatch,
    candidates: &BTreeMap<usize, &Candidate>,
    run: &MaterialRun,
    drafts: Vec<LegDraft>,
) -> EngineResult<Vec<AllocationLeg>> {
    // 港口日分段费用（本物料占用部分）
    let mut node_charges: BTreeMap<&NodeKey, (f64, f64, f64)> = BTreeMap::new();
    for (key, bands) in &run.solution.band_flow {
        let node = batch
            .nodes
            .get(key)
            .ok_or_else(|| EngineError::InvalidState(format!("未知港口日 {} {}", key.0, key.1)))?;
        let mut storage = 0.0;
        let mut demurrage = 0.0;
        let mut load_t = 0.0;
        for (b, kg) in bands.iter().enumerate() {
            let t = kg_to_t(*kg);
            if let Some(seg) = node.segments.get(b) {
                storage += t * seg.storage_per_t;
                demurrage += t * seg.demurrage_per_t;
            }
            load_t += t;
        }
        node_charges.insert(key, (storage, demurrage, load_t));
    }

    // 每船货的吨位: 末腿取余数，保证分拆之和等于船货吨位
    let mut by_ship: BTreeMap<usize, Vec<LegDraft>> = BTreeMap::new();
    for d in drafts {
        by_ship.entry(d.index).or_default().push(d);
    }

    let mut legs = Vec::new();
    for (index, ship_drafts) in by_ship {
        let shipment = &request.shipments[index];
        let candidate = candidates
            .get(&index)
            .ok_or_else(|| EngineError::InvalidState(format!("未知候选 {}", shipment.shipment_id)))?;

        let mut assigned_t = 0.0;
        let last = ship_drafts.len() - 1;
        for (k, draft) in ship_drafts.into_iter().enumerate() {
            let tonnage_t = if k == last {
                shipment.quantity_t - assigned_t
            } else {
                kg_to_t(draft.kg)
            };
            assigned_t += tonnage_t;

            let node = batch.nodes.get(&draft.node).ok_or_else(|| {
                EngineError::InvalidState(format!("未知港口日 {} {}", draft.node.0, draft.node.1))
            })?;
            let arc = candidate.arc_to(&draft.node).ok_or_else(|| {
                EngineError::InvalidState(format!(
                    "船货 {} 无到 {} 的卸货选项",
                    shipment.shipment_id, draft.node.0
                ))
            })?;
            let route = node
                .routes
                .iter()
                .find(|r| r.plant_code == draft.plant_code)
                .ok_or_else(|| {
                    EngineError::InvalidState(format!("无线路 {} -> {}", draft.node.0, draft.plant_code))
                })?;

            let (storage, congestion, load_t) = node_charges
                .get(&draft.node)
                .copied()
                .unwrap_or((0.0, 0.0, 0.0));
            let share = if load_t > TONNAGE_EPSILON_T { tonnage_t / load_t } else { 0.0 };

            legs.push(AllocationLeg {
                shipment_id: shipment.shipment_id.clone(),
                material: run.material,
                port_code: draft.node.0.clone(),
                discharge_date: draft.node.1,
                plant_code: draft.plant_code.clone(),
                tonnage_t,
                cost: LegCost {
                    ocean_freight: arc.ocean_per_t * tonnage_t,
                    port_handling: node.handling_per_t * tonnage_t,
                    storage: storage * share,
                    demurrage: arc.wait_demurrage_per_t * tonnage_t + congestion * share,
                    rail_freight: route.rail_per_t * tonnage_t,
                },
            });
        }
    }
    Ok(legs)
}

// ==========================================
// 库存覆盖
// ==========================================
fn plant_coverage<S: PlanningState + ?Sized>(state: &S, legs: &[AllocationLeg]) -> Vec<PlantCoverage> {
    let mut coverage = Vec::new();
    for plant in state.network().plants.values() {
        for material in Material::ALL {
            let rate = state.daily_rate(&plant.plant_code, material);
            let inbound_t: f64 = legs
                .iter()
                .filter(|l| l.plant_code == plant.plant_code && l.material == material)
                .map(|l| l.tonnage_t)
                .sum();
            if rate.is_none() && inbound_t <= 0.0 {
                continue;
            }
            let stock_t = state.current_stock_t(&plant.plant_code, material);
            coverage.push(PlantCoverage {
                plant_code: plant.plant_code.clone(),
                material,
                stock_t,
                inbound_t,
                days_cover_before: StockLedger::days_cover_from(stock_t, rate),
                days_cover_after: StockLedger::days_cover_from(stock_t + inbound_t, rate),
            });
        }
    }
    coverage
}

/// 未补足的最低/目标天数 × 每天惩罚
fn coverage_penalty<S: PlanningState + ?Sized>(
    state: &S,
    cost_model: &CostModel,
    coverage: &[PlantCoverage],
) -> f64 {
    let config = cost_model.config();
    coverage
        .iter()
        .filter_map(|c| {
            let plant = state.network().plant(&c.plant_code)?;
            let after = c.days_cover_after?;
            let min_days = plant.min_days_cover;
            let target_days = plant.target_days_cover.max(min_days);
            let shortage_days = (min_days - after).max(0.0);
            let gap_days = (target_days - after.max(min_days)).max(0.0);
            Some(shortage_days * config.shortage_penalty_per_day + gap_days * config.target_gap_reward_per_day)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::graph::ShipmentArc;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn candidate(index: usize, rank: usize, arcs: &[(&str, u32, i64)]) -> Candidate {
        Candidate {
            index,
            shipment_id: format!("S{}", index),
            required_by: d(20),
            rank,
            quantity_kg: 0,
            arcs: arcs
                .iter()
                .map(|(port, day, units)| ShipmentArc {
                    node: (port.to_string(), d(*day)),
                    wait_days: 0,
                    ocean_per_t: 0.0,
                    wait_demurrage_per_t: 0.0,
                    units: *units,
                })
                .collect(),
        }
    }

    #[test]
    fn test_consolidate_merges_equal_cost_splits() {
        // 两船货各在两个港口日各卸一半，费用相同 ⇒ 可交换为各占一个港口日
        let a = candidate(0, 0, &[("VIZAG", 1, 10), ("PARADIP", 1, 10)]);
        let b = candidate(1, 1, &[("VIZAG", 1, 10), ("PARADIP", 1, 10)]);
        let cands: BTreeMap<usize, &Candidate> = [(0, &a), (1, &b)].into_iter().collect();

        let vizag = ("VIZAG".to_string(), d(1));
        let paradip = ("PARADIP".to_string(), d(1));
        let mut solution = MaterialSolution::default();
        solution.arc_flow.insert((0, vizag.clone()), 500);
        solution.arc_flow.insert((0, paradip.clone()), 500);
        solution.arc_flow.insert((1, vizag.clone()), 500);
        solution.arc_flow.insert((1, paradip.clone()), 500);

        consolidate(&mut solution, &cands);

        assert_eq!(solution.arc_flow.len(), 2);
        let node_total = |n: &NodeKey| -> i64 {
            solution
                .arc_flow
                .iter()
                .filter(|((_, k), _)| k == n)
                .map(|(_, kg)| kg)
                .sum()
        };
        assert_eq!(node_total(&vizag), 1000);
        assert_eq!(node_total(&paradip), 1000);
    }

    #[test]
    fn test_consolidate_keeps_cheaper_assignment() {
        // 交换会增加费用 ⇒ 不合并
        let a = candidate(0, 0, &[("VIZAG", 1, 30), ("PARADIP", 1, 10)]);
        let b = candidate(1, 1, &[("VIZAG", 1, 10), ("PARADIP", 1, 10)]);
        let cands: BTreeMap<usize, &Candidate> = [(0, &a), (1, &b)].into_iter().collect();

        let mut solution = MaterialSolution::default();
        solution.arc_flow.insert((0, ("VIZAG".to_string(), d(1))), 500);
        solution.arc_flow.insert((0, ("PARADIP".to_string(), d(1))), 500);
        solution.arc_flow.insert((1, ("VIZAG".to_string(), d(1))), 500);
        let before = solution.arc_flow.clone();

        consolidate(&mut solution, &cands);
        assert_eq!(solution.arc_flow, before);
    }

    #[test]
    fn test_northwest_corner_pairs_in_rank_order() {
        let a = candidate(0, 1, &[("VIZAG", 1, 0)]);
        let b = candidate(1, 0, &[("VIZAG", 1, 0)]);
        let cands: BTreeMap<usize, &Candidate> = [(0, &a), (1, &b)].into_iter().collect();

        let node = ("VIZAG".to_string(), d(1));
        let mut solution = MaterialSolution::default();
        solution.arc_flow.insert((0, node.clone()), 300);
        solution.arc_flow.insert((1, node.clone()), 700);
        solution.route_flow.insert((node.clone(), "BSL".to_string()), 600);
        solution.route_flow.insert((node.clone(), "BSP".to_string()), 400);

        let drafts = northwest_corner(&solution, &cands).unwrap();
        let got: Vec<(usize, &str, i64)> = drafts.iter().map(|l| (l.index, l.plant_code.as_str(), l.kg)).collect();
        // rank 0 的船货 1 先配对
        assert_eq!(got, vec![(1, "BSL", 600), (1, "BSP", 100), (0, "BSP", 300)]);
    }

    #[test]
    fn test_northwest_corner_rejects_unbalanced_node() {
        let a = candidate(0, 0, &[("VIZAG", 1, 0)]);
        let cands: BTreeMap<usize, &Candidate> = [(0, &a)].into_iter().collect();
        let node = ("VIZAG".to_string(), d(1));
        let mut solution = MaterialSolution::default();
        solution.arc_flow.insert((0, node.clone()), 300);
        solution.route_flow.insert((node, "BSP".to_string()), 200);
        assert!(matches!(
            northwest_corner(&solution, &cands),
            Err(EngineError::InvalidState(_))
        ));
    }
}
