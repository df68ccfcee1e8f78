// ==========================================
// 进口散货分配系统 - 分配规划 API
// ==========================================
// 职责: 对外契约（优化、情景、库存事件、能力登记、告警）及方案落库/提交
// 红线:
//   - 输入不合法则整批拒绝，优化前完成校验
//   - 情景求解不改基线状态；情景能力只能通过 promote_scenario 写回
//   - 快照取完之后求解为纯 CPU 计算，放到阻塞线程池
// ==========================================

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::validator::PlanningInputValidator;
use crate::config::{PlanningConfig, PlanningConfigReader};
use crate::domain::alert::{Alert, AlertCondition};
use crate::domain::capacity::{CapacityEntry, CapacityLocation, CapacityValues};
use crate::domain::network::NetworkModel;
use crate::domain::plan::{AllocationPlan, PlanRecord};
use crate::domain::shipment::{Shipment, ShipmentSplit};
use crate::domain::stock::StockRecord;
use crate::domain::types::{AlertLevel, AlertType, Material, PlanKind, ShipmentStatus};
use crate::engine::alert_engine::AlertRuleEngine;
use crate::engine::cost_model::CostModel;
use crate::engine::eta::EtaEstimator;
use crate::engine::events::{AlertEvent, AlertEventType, AlertPublisher, OptionalAlertPublisher};
use crate::engine::feasibility::{FeasibilityFilter, FeasibilityReport};
use crate::engine::optimizer::{AllocationOptimizer, Deadline, OptimizeOutcome, OptimizeRequest};
use crate::engine::scenario::{PlanComparison, ScenarioEngine, ScenarioOverlay};
use crate::engine::snapshot::{CapacitySnapshot, PlanningSnapshot, StockSnapshot};
use crate::perf::PerfGuard;
use crate::importer::{CapacityCsvImporter, ImportReport, StockEventCsvImporter};
use crate::repository::alert_repo::{AlertRepository, AlertWrite};
use crate::repository::capacity_repo::CapacityRepository;
use crate::repository::network_repo::NetworkRepository;
use crate::repository::plan_repo::PlanRepository;
use crate::repository::shipment_repo::ShipmentRepository;
use crate::repository::stock_ledger_repo::{NewStockEvent, StockLedgerRepository};

/// 情景求解结果（可选落库）
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScenarioRun {
    pub scenario: String,
    pub outcome: OptimizeOutcome,
    /// 仅在调用方要求保存且有方案时存在
    pub run_id: Option<String>,
}

// ==========================================
// PlanningApi - 分配规划 API
// ==========================================

/// 分配规划API
///
/// 职责：
/// 1. optimize / what_if 批量求解（快照 + 校验 + ETA + 求解）
/// 2. 库存事件追加与能力登记写入
/// 3. 告警评估、去重、关闭与发布
/// 4. 方案落库、查询、提交与情景能力提升
pub struct PlanningApi {
    network_repo: Arc<NetworkRepository>,
    shipment_repo: Arc<ShipmentRepository>,
    stock_repo: Arc<StockLedgerRepository>,
    capacity_repo: Arc<CapacityRepository>,
    plan_repo: Arc<PlanRepository>,
    alert_repo: Arc<AlertRepository>,
    config_reader: Arc<dyn PlanningConfigReader>,
    eta_estimator: Arc<dyn EtaEstimator>,
    validator: PlanningInputValidator,
    alert_engine: AlertRuleEngine,
    // 告警发布器（依赖倒置：下游通知渠道由调用方注入）
    alert_publisher: OptionalAlertPublisher,
}

impl PlanningApi {
    /// 创建新的PlanningApi实例
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network_repo: Arc<NetworkRepository>,
        shipment_repo: Arc<ShipmentRepository>,
        stock_repo: Arc<StockLedgerRepository>,
        capacity_repo: Arc<CapacityRepository>,
        plan_repo: Arc<PlanRepository>,
        alert_repo: Arc<AlertRepository>,
        config_reader: Arc<dyn PlanningConfigReader>,
        eta_estimator: Arc<dyn EtaEstimator>,
        alert_publisher: Option<Arc<dyn AlertPublisher>>,
    ) -> Self {
        let alert_publisher = match alert_publisher {
            Some(p) => OptionalAlertPublisher::with_publisher(p),
            None => OptionalAlertPublisher::none(),
        };

        Self {
            network_repo,
            shipment_repo,
            stock_repo,
            capacity_repo,
            plan_repo,
            alert_repo,
            config_reader,
            eta_estimator,
            validator: PlanningInputValidator::new(),
            alert_engine: AlertRuleEngine::new(),
            alert_publisher,
        }
    }

    // ==========================================
    // 快照
    // ==========================================

    /// 读取 [start, end] 的能力登记与截至 start 日终的库存，组成只读快照
    fn load_snapshot(
        &self,
        network: NetworkModel,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ApiResult<PlanningSnapshot> {
        let capacity = CapacitySnapshot::from_entries(self.capacity_repo.list_range(start, end)?);
        let stock = StockSnapshot::from_records_as_of(self.stock_repo.load_all_records()?, start);
        Ok(PlanningSnapshot::new(network, capacity, stock))
    }

    /// 校验批次、估计抵港日，并取覆盖全部卸货窗口的快照
    async fn prepare_run(
        &self,
        shipments: &[Shipment],
        as_of_date: NaiveDate,
    ) -> ApiResult<(PlanningSnapshot, BTreeMap<String, NaiveDate>, PlanningConfig)> {
        let config = self.config_reader.load_planning_config().await?;
        let network = self.network_repo.load_network()?;
        self.validator.validate_shipments(shipments, &network)?;

        let arrivals = self
            .eta_estimator
            .estimate_arrivals(shipments, as_of_date)
            .await?;
        let last_arrival = arrivals.values().copied().max().unwrap_or(as_of_date).max(as_of_date);
        let horizon_end = last_arrival + Duration::days(config.max_berth_wait_days.max(0));

        let snapshot = self.load_snapshot(network, as_of_date, horizon_end)?;
        Ok((snapshot, arrivals, config))
    }

    // ==========================================
    // 优化
    // ==========================================

    /// 批量分配（基线）
    ///
    /// # 参数
    /// - shipments: 待分配船货
    /// - as_of_date: 计划基准日
    ///
    /// # 返回
    /// - Ok(OptimizeOutcome::Planned): 方案已生成并落库（未分配船货附诊断）
    /// - Ok(OptimizeOutcome::Infeasible): 无任何船货可分配
    /// - Err(ApiError): 校验失败 / 币种不一致 / 超时 / 数据库错误
    #[instrument(skip(self, shipments), fields(shipments = shipments.len(), as_of = %as_of_date))]
    pub async fn optimize(&self, shipments: Vec<Shipment>, as_of_date: NaiveDate) -> ApiResult<OptimizeOutcome> {
        let (snapshot, arrivals, config) = self.prepare_run(&shipments, as_of_date).await?;

        let outcome = tokio::task::spawn_blocking(move || {
            let deadline = Deadline::after_ms(config.solver_deadline_ms);
            let request = OptimizeRequest {
                shipments: &shipments,
                as_of_date,
                arrivals: &arrivals,
                kind: PlanKind::Baseline,
            };
            AllocationOptimizer::new().optimize(&snapshot, &request, &config, &deadline)
        })
        .await
        .map_err(|e| ApiError::InternalError(format!("求解任务执行失败: {}", e)))??;

        if let OptimizeOutcome::Planned(plan) = &outcome {
            let record = self.plan_repo.insert(plan)?;
            info!(run_id = %record.run_id, plan_id = %plan.plan_id, "基线方案已落库");
        }
        Ok(outcome)
    }

    /// 对全部仍可分配的船货求解
    pub async fn optimize_pending(&self, as_of_date: NaiveDate) -> ApiResult<OptimizeOutcome> {
        let shipments = self.shipment_repo.list_plannable()?;
        if shipments.is_empty() {
            return Err(ApiError::InvalidInput("没有待分配的船货".to_string()));
        }
        self.optimize(shipments, as_of_date).await
    }

    /// 单个情景求解（不修改基线）
    ///
    /// # 参数
    /// - overlay: 情景假设（能力 / 船货 / 日耗 / 库存调整）
    /// - shipments: 基线船货批次（叠加层按 ID 替换或追加）
    /// - store: 是否把情景方案落库
    #[instrument(skip(self, overlay, shipments), fields(scenario = %overlay.name, as_of = %as_of_date))]
    pub async fn what_if(
        &self,
        overlay: ScenarioOverlay,
        shipments: Vec<Shipment>,
        as_of_date: NaiveDate,
        store: bool,
    ) -> ApiResult<ScenarioRun> {
        let batch = overlay.apply_shipments(&shipments);
        let (snapshot, arrivals, config) = self.prepare_run(&batch, as_of_date).await?;

        let name = overlay.name.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let deadline = Deadline::after_ms(config.solver_deadline_ms);
            ScenarioEngine::new().run_scenario(
                &snapshot,
                &overlay,
                &shipments,
                as_of_date,
                &arrivals,
                &config,
                &deadline,
            )
        })
        .await
        .map_err(|e| ApiError::InternalError(format!("情景任务执行失败: {}", e)))??;

        let run_id = match (&outcome, store) {
            (OptimizeOutcome::Planned(plan), true) => Some(self.plan_repo.insert(plan)?.run_id),
            _ => None,
        };
        Ok(ScenarioRun {
            scenario: name,
            outcome,
            run_id,
        })
    }

    /// 多个情景并发求解（共享同一基线快照，各自不落库）
    pub async fn what_if_batch(
        &self,
        overlays: Vec<ScenarioOverlay>,
        shipments: Vec<Shipment>,
        as_of_date: NaiveDate,
    ) -> ApiResult<Vec<ApiResult<ScenarioRun>>> {
        // 叠加层追加的船货也要参与校验与 ETA 估计
        let mut union: BTreeMap<String, Shipment> = BTreeMap::new();
        for overlay in &overlays {
            for s in overlay.apply_shipments(&shipments) {
                union.entry(s.shipment_id.clone()).or_insert(s);
            }
        }
        for s in &shipments {
            union.insert(s.shipment_id.clone(), s.clone());
        }
        let all: Vec<Shipment> = union.into_values().collect();
        let (snapshot, arrivals, config) = self.prepare_run(&all, as_of_date).await?;

        let names: Vec<String> = overlays.iter().map(|o| o.name.clone()).collect();
        let results = ScenarioEngine::run_batch(
            Arc::new(snapshot),
            overlays,
            Arc::new(shipments),
            as_of_date,
            Arc::new(arrivals),
            config,
        )
        .await;

        Ok(names
            .into_iter()
            .zip(results)
            .map(|(scenario, result)| {
                result.map_err(ApiError::from).map(|outcome| ScenarioRun {
                    scenario,
                    outcome,
                    run_id: None,
                })
            })
            .collect())
    }

    /// 对比两个已落库方案（按 plan_id 取最新一次落库）
    pub fn compare_plans(&self, baseline_plan_id: &str, scenario_plan_id: &str) -> ApiResult<PlanComparison> {
        let baseline = self.require_plan(baseline_plan_id)?;
        let scenario = self.require_plan(scenario_plan_id)?;
        Ok(ScenarioEngine::compare_plans(&baseline.plan, &scenario.plan)?)
    }

    /// 单船货在某日的可行港口、各港被拒原因及各 (港口, 钢厂) 的到厂成本估计
    pub async fn feasible_ports(&self, shipment_id: &str, date: NaiveDate) -> ApiResult<FeasibilityReport> {
        let config = self.config_reader.load_planning_config().await?;
        let cost_model = CostModel::new(&config)?;
        let shipment = self
            .shipment_repo
            .find_by_id(shipment_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Shipment(id={})不存在", shipment_id)))?;
        let network = self.network_repo.load_network()?;
        let vessel = network
            .vessel(&shipment.vessel_code)
            .cloned()
            .ok_or_else(|| ApiError::ValidationError(format!("船舶 {} 未登记", shipment.vessel_code)))?;

        let snapshot = self.load_snapshot(network, date, date)?;
        let arrival = shipment.eta.unwrap_or(date);
        let report = FeasibilityFilter::new()
            .feasible_ports(&snapshot, &shipment, &vessel, date)
            .with_cost_estimates(&snapshot.network, &shipment, &cost_model, arrival)?;
        Ok(report)
    }

    // ==========================================
    // 库存与能力
    // ==========================================

    /// 追加一条库存事件并返回该 (地点, 物料) 的最新记录
    #[instrument(skip(self))]
    pub fn record_stock_event(
        &self,
        location_code: &str,
        material: Material,
        quantity_t: f64,
        event_ts: NaiveDateTime,
    ) -> ApiResult<StockRecord> {
        let _perf = PerfGuard::new("record_stock_event");
        let event = NewStockEvent {
            location_code: location_code.to_string(),
            material,
            quantity_t,
            event_ts,
        };
        let network = self.network_repo.load_network()?;
        self.validator.validate_stock_event(&event, &network)?;

        let stored = self.stock_repo.append(&event)?;
        tracing::debug!(seq_no = stored.seq_no, "库存事件已追加");
        Ok(self.stock_repo.load_record(location_code, material)?)
    }

    /// 整行写入一条能力登记；同值重复写入仍只有一条
    pub fn upsert_capacity(
        &self,
        entry_date: NaiveDate,
        location: CapacityLocation,
        values: CapacityValues,
    ) -> ApiResult<CapacityEntry> {
        let _perf = PerfGuard::new("upsert_capacity");
        let entry = CapacityEntry {
            entry_date,
            location,
            values,
            updated_at: Local::now().naive_local(),
        };
        let network = self.network_repo.load_network()?;
        self.validator.validate_capacity_entry(&entry, &network)?;
        self.capacity_repo.upsert(&entry)?;
        Ok(entry)
    }

    /// 把情景中的能力假设写回基线登记
    ///
    /// # 返回
    /// - Ok(usize): 写入条数
    pub fn promote_scenario(&self, overlay: &ScenarioOverlay) -> ApiResult<usize> {
        if overlay.capacity.is_empty() {
            return Ok(0);
        }
        let network = self.network_repo.load_network()?;
        for entry in &overlay.capacity {
            self.validator.validate_capacity_entry(entry, &network)?;
        }
        let now = Local::now().naive_local();
        let entries: Vec<CapacityEntry> = overlay
            .capacity
            .iter()
            .map(|e| CapacityEntry {
                updated_at: now,
                ..e.clone()
            })
            .collect();
        let written = self.capacity_repo.upsert_batch(&entries)?;
        info!(scenario = %overlay.name, written, "情景能力已写回基线");
        Ok(written)
    }

    pub fn import_capacity_csv(&self, path: &Path) -> ApiResult<ImportReport> {
        let network = self.network_repo.load_network()?;
        let importer = CapacityCsvImporter::new(Arc::clone(&self.capacity_repo));
        Ok(importer.import_file(path, Some(&network))?)
    }

    pub fn import_stock_csv(&self, path: &Path) -> ApiResult<ImportReport> {
        let importer = StockEventCsvImporter::new(Arc::clone(&self.stock_repo));
        Ok(importer.import_file(path)?)
    }

    // ==========================================
    // 告警
    // ==========================================

    /// 评估告警：打开/刷新/关闭，并推送变更
    ///
    /// # 返回
    /// - Ok(Vec<Alert>): 评估后仍处于打开状态的告警
    #[instrument(skip(self))]
    pub async fn evaluate_alerts(&self, as_of_date: NaiveDate) -> ApiResult<Vec<Alert>> {
        let config = self.config_reader.load_planning_config().await?;
        let network = self.network_repo.load_network()?;
        let snapshot = self.load_snapshot(network, as_of_date, as_of_date)?;
        let shipments = self.shipment_repo.list_plannable()?;

        let conditions = self
            .alert_engine
            .evaluate(&snapshot, as_of_date, &shipments, &config);
        let now = Local::now().naive_local();

        let mut evaluated: BTreeSet<(String, Option<Material>, AlertType)> = BTreeSet::new();
        for condition in &conditions {
            evaluated.insert((
                condition.location_code.clone(),
                condition.material,
                condition.alert_type,
            ));
            self.apply_condition(condition, now)?;
        }

        // 缺少当日登记的港口不能当作拥堵已解除
        for port_code in self
            .alert_engine
            .undetermined_congestion_ports(&snapshot, as_of_date)
        {
            evaluated.insert((port_code, None, AlertType::HighCongestion));
        }

        // 条件已不再产生的打开告警（如船货已离开可分配状态）一律关闭
        for alert in self.alert_repo.list_open()? {
            if !evaluated.contains(&alert.dedup_key()) {
                let resolved = self.alert_repo.resolve(&alert.alert_id, now)?;
                self.alert_publisher
                    .publish(&AlertEvent::new(AlertEventType::Resolved, resolved));
            }
        }

        let open = self.alert_repo.list_open()?;
        info!(open = open.len(), evaluated = conditions.len(), "告警评估完成");
        Ok(open)
    }

    fn apply_condition(&self, condition: &AlertCondition, now: NaiveDateTime) -> ApiResult<()> {
        if condition.level == AlertLevel::Normal {
            if let Some(open) = self.alert_repo.find_open(
                &condition.location_code,
                condition.material,
                condition.alert_type,
            )? {
                let resolved = self.alert_repo.resolve(&open.alert_id, now)?;
                self.alert_publisher
                    .publish(&AlertEvent::new(AlertEventType::Resolved, resolved));
            }
            return Ok(());
        }

        let event = match self.alert_repo.open_or_refresh(condition, now)? {
            AlertWrite::Opened(alert) => AlertEvent::new(AlertEventType::Opened, alert),
            AlertWrite::Refreshed(alert) => AlertEvent::new(AlertEventType::Refreshed, alert),
        };
        self.alert_publisher.publish(&event);
        Ok(())
    }

    // ==========================================
    // 方案
    // ==========================================

    /// 最近落库的方案（新在前）
    pub fn list_plans(&self, kind: Option<PlanKind>, limit: usize) -> ApiResult<Vec<PlanRecord>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        Ok(self.plan_repo.list_recent(kind, limit)?)
    }

    fn require_plan(&self, plan_id: &str) -> ApiResult<PlanRecord> {
        if plan_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("方案ID不能为空".to_string()));
        }
        self.plan_repo
            .find_latest_by_plan_id(plan_id)?
            .ok_or_else(|| ApiError::NotFound(format!("AllocationPlan(id={})不存在", plan_id)))
    }

    /// 把基线方案的分拆写回船货，船货进入 PortSelected
    ///
    /// # 返回
    /// - Ok(Vec<Shipment>): 已提交的船货
    pub fn commit_plan(&self, plan_id: &str) -> ApiResult<Vec<Shipment>> {
        let _perf = PerfGuard::new("commit_plan");
        let record = self.require_plan(plan_id)?;
        let plan: &AllocationPlan = &record.plan;
        if plan.kind != PlanKind::Baseline {
            return Err(ApiError::BusinessRuleViolation(format!(
                "情景方案 {} 不能直接提交，请先提升情景能力并重新优化",
                plan_id
            )));
        }

        // 船货在落库后被修改（吨位、状态）时整批拒绝，不留半提交状态
        let shipment_ids: BTreeSet<&str> = plan.legs.iter().map(|l| l.shipment_id.as_str()).collect();
        let assignments: Vec<(String, Vec<ShipmentSplit>)> = shipment_ids
            .into_iter()
            .map(|id| (id.to_string(), plan.splits_for(id)))
            .collect();
        let committed = self
            .shipment_repo
            .assign_splits_batch(&assignments, ShipmentStatus::PortSelected)?;

        if !plan.unallocated.is_empty() {
            warn!(
                plan_id,
                unallocated = plan.unallocated.len(),
                "方案存在未分配船货，这些船货保持原状态"
            );
        }
        info!(plan_id, committed = committed.len(), "方案已提交");
        Ok(committed)
    }
}
