// ==========================================
// 进口散货分配系统 - 单物料流网络构建
// ==========================================
// 网络结构:
//   源点 → 船货(容量=吨位) → 港口日入口(海运+港杂+待泊滞期)
//        → 港口日出口(按负载分段，堆存+拥堵滞期递增)
//        → 钢厂(铁路: 车列 × 每列吨位) → 汇点(缺口收益分段 + 溢出)
// 约束: 流量单位为千克；费用单位为 (分/吨 × TIE_SCALE) + 次级打破平局项
// ==========================================

use super::flow::{FlowSummary, MinCostFlow};
use super::{Deadline, TIE_SCALE};
use crate::engine::cost_model::BandSegment;
use crate::engine::error::EngineResult;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// 港口日节点键 (港口代码, 卸货日期)
pub type NodeKey = (String, NaiveDate);

/// 每吨单价 → 整数费用单位
pub fn to_units(per_t: f64) -> i64 {
    ((per_t * 100.0).round() as i64).saturating_mul(TIE_SCALE)
}

/// 吨 → 千克（四舍五入）
pub fn to_kg(tonnes: f64) -> i64 {
    (tonnes * 1000.0).round() as i64
}

/// 吨 → 千克（向下取整，用于容量上限）
pub fn floor_kg(tonnes: f64) -> i64 {
    (tonnes * 1000.0 + 1e-6).floor().max(0.0) as i64
}

pub fn kg_to_t(kg: i64) -> f64 {
    kg as f64 / 1000.0
}

// ==========================================
// 静态输入
// ==========================================

#[derive(Debug, Clone)]
pub struct RouteArc {
    pub plant_code: String,
    pub cap_kg: i64,
    pub rail_per_t: f64,
    pub units: i64,
}

#[derive(Debug, Clone)]
pub struct PortDayNode {
    pub key: NodeKey,
    pub segments: Vec<BandSegment>,
    pub band_cap_kg: Vec<i64>,
    pub band_units: Vec<i64>,
    pub handling_per_t: f64,
    pub routes: Vec<RouteArc>, // 按钢厂代码排序
}

#[derive(Debug, Clone)]
pub struct ShipmentArc {
    pub node: NodeKey,
    pub wait_days: i64,
    pub ocean_per_t: f64,
    pub wait_demurrage_per_t: f64,
    pub units: i64, // 含打破平局项
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub index: usize, // 批次内序号
    pub shipment_id: String,
    pub required_by: NaiveDate,
    pub rank: usize, // 按 (required_by, shipment_id) 的次序
    pub quantity_kg: i64,
    pub arcs: Vec<ShipmentArc>,
}

impl Candidate {
    pub fn arc_to(&self, node: &NodeKey) -> Option<&ShipmentArc> {
        self.arcs.iter().find(|a| &a.node == node)
    }
}

#[derive(Debug, Clone)]
pub struct PlantSink {
    pub plant_code: String,
    pub shortage_kg: i64,
    pub shortage_units: i64, // 负值（收益）
    pub gap_kg: i64,
    pub gap_units: i64, // 负值（收益）
}

// ==========================================
// Residual - 跨物料的剩余能力
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Residual {
    band_used_kg: BTreeMap<NodeKey, Vec<i64>>,
    rail_used_kg: BTreeMap<(NodeKey, String), i64>,
}

impl Residual {
    pub fn band_remaining(&self, node: &PortDayNode) -> Vec<i64> {
        let used = self.band_used_kg.get(&node.key);
        node.band_cap_kg
            .iter()
            .enumerate()
            .map(|(b, cap)| (cap - used.and_then(|u| u.get(b)).copied().unwrap_or(0)).max(0))
            .collect()
    }

    pub fn stockyard_remaining_kg(&self, node: &PortDayNode) -> i64 {
        self.band_remaining(node).iter().sum()
    }

    pub fn rail_remaining(&self, node: &PortDayNode, route: &RouteArc) -> i64 {
        let used = self
            .rail_used_kg
            .get(&(node.key.clone(), route.plant_code.clone()))
            .copied()
            .unwrap_or(0);
        (route.cap_kg - used).max(0)
    }

    pub fn rail_remaining_at(&self, node: &PortDayNode) -> i64 {
        node.routes.iter().map(|r| self.rail_remaining(node, r)).sum()
    }

    /// 记入一个物料的求解结果
    pub fn commit(&mut self, solution: &MaterialSolution) {
        for (key, flows) in &solution.band_flow {
            let used = self
                .band_used_kg
                .entry(key.clone())
                .or_insert_with(|| vec![0; flows.len()]);
            for (b, f) in flows.iter().enumerate() {
                used[b] += f;
            }
        }
        for (key, f) in &solution.route_flow {
            *self.rail_used_kg.entry(key.clone()).or_insert(0) += f;
        }
    }
}

// ==========================================
// MaterialSolution - 单物料求解结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct MaterialSolution {
    pub served_kg: BTreeMap<usize, i64>,
    pub arc_flow: BTreeMap<(usize, NodeKey), i64>,
    pub band_flow: BTreeMap<NodeKey, Vec<i64>>,
    pub route_flow: BTreeMap<(NodeKey, String), i64>,
    pub summary: Option<FlowSummary>,
}

impl MaterialSolution {
    pub fn served(&self, index: usize) -> i64 {
        self.served_kg.get(&index).copied().unwrap_or(0)
    }

    pub fn node_inflow_kg(&self, key: &NodeKey) -> i64 {
        self.band_flow.get(key).map(|f| f.iter().sum()).unwrap_or(0)
    }
}

/// 构建并求解单物料网络
pub fn solve_material(
    candidates: &[&Candidate],
    nodes: &BTreeMap<NodeKey, PortDayNode>,
    sinks: &[PlantSink],
    residual: &Residual,
    deadline: &Deadline,
) -> EngineResult<MaterialSolution> {
    if candidates.is_empty() {
        return Ok(MaterialSolution::default());
    }

    let mut g = MinCostFlow::new();
    let source = g.add_node();
    let sink = g.add_node();

    // 钢厂节点
    let total_kg: i64 = candidates.iter().map(|c| c.quantity_kg).sum();
    let mut plant_ids: BTreeMap<&str, usize> = BTreeMap::new();
    for s in sinks {
        let id = g.add_node();
        plant_ids.insert(s.plant_code.as_str(), id);
        if s.shortage_kg > 0 {
            g.add_edge(id, sink, s.shortage_kg, s.shortage_units);
        }
        if s.gap_kg > 0 {
            g.add_edge(id, sink, s.gap_kg, s.gap_units);
        }
        g.add_edge(id, sink, total_kg, 0);
    }

    // 港口日节点（仅本批次候选涉及的）
    let used: BTreeSet<&NodeKey> = candidates
        .iter()
        .flat_map(|c| c.arcs.iter().map(|a| &a.node))
        .collect();

    let mut node_in: BTreeMap<&NodeKey, usize> = BTreeMap::new();
    let mut band_edges: Vec<(&NodeKey, usize, usize)> = Vec::new();
    let mut route_edges: Vec<(&NodeKey, &str, usize)> = Vec::new();

    for key in used {
        let node = match nodes.get(key) {
            Some(n) => n,
            None => continue,
        };
        let n_in = g.add_node();
        let n_out = g.add_node();
        node_in.insert(key, n_in);

        for (b, remaining) in residual.band_remaining(node).into_iter().enumerate() {
            if remaining > 0 {
                let e = g.add_edge(n_in, n_out, remaining, node.band_units[b]);
                band_edges.push((key, b, e));
            }
        }
        for route in &node.routes {
            let remaining = residual.rail_remaining(node, route);
            if remaining <= 0 {
                continue;
            }
            if let Some(&plant) = plant_ids.get(route.plant_code.as_str()) {
                let e = g.add_edge(n_out, plant, remaining, route.units);
                route_edges.push((key, route.plant_code.as_str(), e));
            }
        }
    }

    // 船货节点
    let mut source_edges: Vec<(usize, usize)> = Vec::new();
    let mut arc_edges: Vec<(usize, &NodeKey, usize)> = Vec::new();
    for c in candidates {
        let id = g.add_node();
        source_edges.push((c.index, g.add_edge(source, id, c.quantity_kg, 0)));
        for arc in &c.arcs {
            if let Some(&n_in) = node_in.get(&arc.node) {
                arc_edges.push((c.index, &arc.node, g.add_edge(id, n_in, c.quantity_kg, arc.units)));
            }
        }
    }

    let summary = g.solve(source, sink, deadline)?;

    // 提取流量
    let mut solution = MaterialSolution {
        summary: Some(summary),
        ..Default::default()
    };
    for (index, e) in source_edges {
        solution.served_kg.insert(index, g.flow_on(e));
    }
    for (index, key, e) in arc_edges {
        let f = g.flow_on(e);
        if f > 0 {
            solution.arc_flow.insert((index, key.clone()), f);
        }
    }
    for (key, b, e) in band_edges {
        let f = g.flow_on(e);
        if f > 0 {
            let bands = solution
                .band_flow
                .entry(key.clone())
                .or_insert_with(|| vec![0; nodes.get(key).map(|n| n.band_cap_kg.len()).unwrap_or(0)]);
            bands[b] += f;
        }
    }
    for (key, plant, e) in route_edges {
        let f = g.flow_on(e);
        if f > 0 {
            solution.route_flow.insert((key.clone(), plant.to_string()), f);
        }
    }

    Ok(solution)
}
