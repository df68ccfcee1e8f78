// ==========================================
// 分配优化器性质测试
// ==========================================
// 测试目标: 吃水、堆场、铁路约束在解中始终成立；同输入同输出
// ==========================================

mod test_helpers;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use import_logistics_aps::config::PlanningConfig;
use import_logistics_aps::domain::plan::{AllocationPlan, BindingConstraint, PlanWarning};
use import_logistics_aps::domain::{Material, PlanKind, Shipment, TONNAGE_EPSILON_T};
use import_logistics_aps::engine::{
    AllocationOptimizer, CapacitySnapshot, Deadline, OptimizeOutcome, OptimizeRequest,
    PlanningSnapshot, StockSnapshot,
};
use test_helpers::*;

fn run(snapshot: &PlanningSnapshot, shipments: &[Shipment], as_of: NaiveDate) -> OptimizeOutcome {
    let arrivals = BTreeMap::new();
    let request = OptimizeRequest {
        shipments,
        as_of_date: as_of,
        arrivals: &arrivals,
        kind: PlanKind::Baseline,
    };
    AllocationOptimizer::new()
        .optimize(snapshot, &request, &PlanningConfig::default(), &Deadline::none())
        .expect("求解不应出错")
}

fn planned(outcome: OptimizeOutcome) -> AllocationPlan {
    match outcome {
        OptimizeOutcome::Planned(plan) => plan,
        OptimizeOutcome::Infeasible(result) => panic!("期望得到方案，实际不可行: {:?}", result.unallocated),
    }
}

fn leg_dates(plan: &AllocationPlan) -> BTreeSet<(String, NaiveDate)> {
    plan.legs
        .iter()
        .map(|l| (l.port_code.clone(), l.discharge_date))
        .collect()
}

// ==========================================
// 吃水
// ==========================================

#[test]
fn test_deep_draft_vessel_never_discharges_at_shallow_port() {
    let snapshot = demo_snapshot(100_000.0, 30);
    let shipments = vec![shipment("SHP-1", 75_000.0, "CAPE", d(12), d(5))];

    let plan = planned(run(&snapshot, &shipments, d(3)));

    assert!(!plan.legs.is_empty());
    assert!(plan.legs.iter().all(|l| l.port_code == "VIZAG"));
    assert!((plan.allocated_t_for("SHP-1") - 75_000.0).abs() < TONNAGE_EPSILON_T);
}

#[test]
fn test_shallow_vessel_may_use_either_port() {
    let snapshot = demo_snapshot(100_000.0, 30);
    let shipments = vec![shipment("SHP-1", 60_000.0, "PMX", d(12), d(5))];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    assert!(plan.is_fully_allocated());
    assert!(plan
        .legs
        .iter()
        .all(|l| l.port_code == "VIZAG" || l.port_code == "HALD"));
}

// ==========================================
// 堆场与铁路
// ==========================================

#[test]
fn test_daily_discharge_within_stockyard_capacity() {
    // 两船共 140,000t 同日抵港，单港日堆场 100,000t，必须错开卸货日
    let snapshot = demo_snapshot(100_000.0, 30);
    let shipments = vec![
        shipment("SHP-A", 70_000.0, "CAPE", d(10), d(5)),
        shipment("SHP-B", 70_000.0, "CAPE", d(12), d(5)),
    ];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    assert!(plan.is_fully_allocated());
    assert!(plan.unallocated.is_empty());

    for (port_code, date) in leg_dates(&plan) {
        let discharged = plan.discharged_t(&port_code, date);
        assert!(
            discharged <= 100_000.0 + TONNAGE_EPSILON_T,
            "{} {} 卸货 {:.3}t 超出堆场能力",
            port_code,
            date,
            discharged
        );
    }
    let days_used: BTreeSet<NaiveDate> = plan.legs.iter().map(|l| l.discharge_date).collect();
    assert!(days_used.len() >= 2);
}

#[test]
fn test_railed_tonnage_within_rake_capacity() {
    // 每线路每日 5 列，3,800t/列
    let rakes = 5;
    let snapshot = demo_snapshot(100_000.0, rakes);
    let shipments = vec![shipment("SHP-1", 50_000.0, "CAPE", d(12), d(5))];

    let plan = planned(run(&snapshot, &shipments, d(3)));

    let mut keys = BTreeSet::new();
    for leg in &plan.legs {
        keys.insert((leg.port_code.clone(), leg.plant_code.clone(), leg.discharge_date));
    }
    for (port_code, plant_code, date) in keys {
        let railed = plan.railed_t(&port_code, &plant_code, date);
        let rakes_needed = (railed / 3_800.0 - 1e-9).ceil() as u32;
        assert!(
            rakes_needed <= rakes,
            "{}->{} {} 需要 {} 列，超出 {} 列",
            port_code,
            plant_code,
            date,
            rakes_needed,
            rakes
        );
    }
    assert!((plan.allocated_t_for("SHP-1") - 50_000.0).abs() < TONNAGE_EPSILON_T);
}

#[test]
fn test_rail_moves_on_discharge_day() {
    let snapshot = demo_snapshot(100_000.0, 30);
    let shipments = vec![shipment("SHP-1", 80_000.0, "PMX", d(12), d(6))];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    for (port_code, date) in leg_dates(&plan) {
        let railed: f64 = snapshot
            .network
            .routes_from(&port_code)
            .map(|r| plan.railed_t(&port_code, &r.plant_code, date))
            .sum();
        assert!((railed - plan.discharged_t(&port_code, date)).abs() < TONNAGE_EPSILON_T);
    }
}

// ==========================================
// 分拆
// ==========================================

#[test]
fn test_splits_sum_to_shipment_quantity() {
    let snapshot = demo_snapshot(60_000.0, 30);
    let shipments = vec![
        shipment("SHP-1", 75_000.0, "CAPE", d(9), d(5)),
        shipment("SHP-2", 42_500.5, "PMX", d(11), d(6)),
    ];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    for s in &shipments {
        let splits = plan.splits_for(&s.shipment_id);
        assert!(!splits.is_empty(), "{} 没有分拆", s.shipment_id);
        let total: f64 = splits.iter().map(|x| x.tonnage_t).sum();
        assert!(
            (total - s.quantity_t).abs() < TONNAGE_EPSILON_T,
            "{} 分拆合计 {:.3}t != {:.3}t",
            s.shipment_id,
            total,
            s.quantity_t
        );
        assert!(splits.iter().all(|x| x.tonnage_t > 0.0));
    }
}

#[test]
fn test_discharge_within_berth_wait_window() {
    let snapshot = demo_snapshot(30_000.0, 30);
    let shipments = vec![shipment("SHP-1", 90_000.0, "CAPE", d(12), d(5))];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    let wait = PlanningConfig::default().max_berth_wait_days;
    assert!(plan
        .legs
        .iter()
        .all(|l| l.discharge_date >= d(5) && (l.discharge_date - d(5)).num_days() <= wait));
}

// ==========================================
// 目标: 库存缺口与平局规则
// ==========================================

fn snapshot_with_coal_stock(bsp_t: f64, rsp_t: f64, stockyard_t: f64) -> PlanningSnapshot {
    let network = demo_network();
    let capacity = CapacitySnapshot::from_entries(full_capacity(&network, d(1), 20, stockyard_t, 30));
    let stock = StockSnapshot::from_records(vec![
        stock_record("BSP", Material::CokingCoal, bsp_t),
        stock_record("RSP", Material::CokingCoal, rsp_t),
    ]);
    PlanningSnapshot::new(network, capacity, stock)
}

fn tonnage_to(plan: &AllocationPlan, plant_code: &str) -> f64 {
    plan.legs
        .iter()
        .filter(|l| l.plant_code == plant_code)
        .map(|l| l.tonnage_t)
        .sum()
}

#[test]
fn test_plant_below_minimum_served_before_cheaper_rail() {
    // CAPE 只能卸 VIZAG；VIZAG→BSP 560km 比 VIZAG→RSP 720km 便宜
    let shipments = vec![shipment("SHP-1", 20_000.0, "CAPE", d(12), d(5))];

    // 两厂都在目标天数以上：全部走便宜的 BSP
    let comfortable = snapshot_with_coal_stock(200_000.0, 200_000.0, 100_000.0);
    let plan = planned(run(&comfortable, &shipments, d(3)));
    assert!((tonnage_to(&plan, "BSP") - 20_000.0).abs() < TONNAGE_EPSILON_T);

    // RSP 只剩 5 天（最低 15 天）：缺口优先，即使铁路更贵
    let rsp_short = snapshot_with_coal_stock(200_000.0, 10_000.0, 100_000.0);
    let plan = planned(run(&rsp_short, &shipments, d(3)));
    assert!((tonnage_to(&plan, "RSP") - 20_000.0).abs() < TONNAGE_EPSILON_T);
    assert_eq!(tonnage_to(&plan, "BSP"), 0.0);
}

#[test]
fn test_earlier_required_by_wins_contended_discharge_day() {
    // 两船同日抵 VIZAG，日堆场只够一船
    let snapshot = snapshot_with_coal_stock(45_000.0, 40_000.0, 60_000.0);
    let shipments = vec![
        shipment("SHP-LATE", 60_000.0, "CAPE", d(12), d(5)),
        shipment("SHP-EARLY", 60_000.0, "CAPE", d(8), d(5)),
    ];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    assert!(plan.is_fully_allocated());

    let dates = |id: &str| -> BTreeSet<NaiveDate> {
        plan.legs
            .iter()
            .filter(|l| l.shipment_id == id)
            .map(|l| l.discharge_date)
            .collect()
    };
    // 每船只占一个卸货日，不在两天之间来回拆分
    assert_eq!(dates("SHP-EARLY"), BTreeSet::from([d(5)]));
    assert_eq!(dates("SHP-LATE"), BTreeSet::from([d(6)]));
}

// ==========================================
// 确定性
// ==========================================

#[test]
fn test_identical_input_yields_identical_plan() {
    let snapshot = demo_snapshot(80_000.0, 12);
    let shipments = vec![
        shipment("SHP-A", 70_000.0, "CAPE", d(10), d(5)),
        shipment("SHP-B", 55_000.0, "PMX", d(9), d(5)),
        shipment("SHP-C", 30_000.0, "PMX", d(14), d(7)),
    ];

    let first = run(&snapshot, &shipments, d(3));
    let second = run(&snapshot, &shipments, d(3));
    assert_eq!(first, second);

    let plan = planned(first);
    assert!(!plan.plan_id.is_empty());
}

// ==========================================
// 不可行与诊断
// ==========================================

#[test]
fn test_no_stockyard_capacity_is_infeasible_with_diagnostic() {
    let snapshot = demo_snapshot(0.0, 30);
    let shipments = vec![shipment("SHP-1", 75_000.0, "CAPE", d(12), d(5))];

    match run(&snapshot, &shipments, d(3)) {
        OptimizeOutcome::Infeasible(result) => {
            assert_eq!(result.unallocated.len(), 1);
            assert_eq!(result.unallocated[0].shipment_id, "SHP-1");
            assert_eq!(
                result.unallocated[0].binding_constraint,
                BindingConstraint::NoStockyardCapacity
            );
        }
        OptimizeOutcome::Planned(plan) => panic!("不应生成方案: {:?}", plan.legs),
    }
}

#[test]
fn test_oversized_shipment_reported_while_rest_allocated() {
    // 窗口 4 天 × 20,000t 堆场，90,000t 的船装不下
    let snapshot = demo_snapshot(20_000.0, 30);
    let shipments = vec![
        shipment("SHP-BIG", 90_000.0, "CAPE", d(12), d(5)),
        shipment("SHP-SMALL", 20_000.0, "PMX", d(10), d(5)),
    ];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    assert!((plan.allocated_t_for("SHP-SMALL") - 20_000.0).abs() < TONNAGE_EPSILON_T);
    assert_eq!(plan.allocated_t_for("SHP-BIG"), 0.0);
    assert_eq!(plan.unallocated.len(), 1);
    assert_eq!(plan.unallocated[0].shipment_id, "SHP-BIG");
    assert!(!plan.unallocated[0].detail.is_empty());
}

#[test]
fn test_missing_capacity_rows_raise_stale_warning() {
    // 能力登记只覆盖 3 月 1-20 日，窗口延伸到 22 日
    let snapshot = demo_snapshot(100_000.0, 30);
    let shipments = vec![shipment("SHP-1", 40_000.0, "CAPE", d(25), d(19))];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    assert!(plan.is_fully_allocated());
    assert!(plan.warnings.iter().any(|w| matches!(
        w,
        PlanWarning::StaleCapacityData { date, .. } if *date == d(21) || *date == d(22)
    )));
    assert!(plan.legs.iter().all(|l| l.discharge_date <= d(20)));
}

#[test]
fn test_arrival_never_before_as_of_date() {
    // ETA 早于基准日时按基准日起算
    let snapshot = demo_snapshot(100_000.0, 30);
    let shipments = vec![shipment("SHP-1", 40_000.0, "PMX", d(12), d(2))];

    let plan = planned(run(&snapshot, &shipments, d(6)));
    assert!(plan.legs.iter().all(|l| l.discharge_date >= d(6)));
}

#[test]
fn test_cost_breakdown_consistent_with_legs() {
    let snapshot = demo_snapshot(100_000.0, 30);
    let shipments = vec![shipment("SHP-1", 60_000.0, "CAPE", d(12), d(5))];

    let plan = planned(run(&snapshot, &shipments, d(3)));
    let leg_sum: f64 = plan.legs.iter().map(|l| l.cost.total()).sum();
    assert!((plan.cost.landed_total - leg_sum).abs() < 1e-3 * leg_sum.max(1.0));
    assert!(
        (plan.cost.objective_total - (plan.cost.landed_total + plan.cost.coverage_penalty)).abs() < 1e-6
    );
    assert!(plan.cost.landed_total > 0.0);
}
