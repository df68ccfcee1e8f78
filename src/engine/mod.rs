// ==========================================
// 进口散货分配系统 - 引擎层
// ==========================================
// 职责: 实现分配规则与求解，不拼 SQL
// 红线: 引擎只读快照（PlanningState），不直接访问仓储
// ==========================================

pub mod alert_engine;
pub mod cost_model;
pub mod error;
pub mod eta;
pub mod events;
pub mod feasibility;
pub mod optimizer;
pub mod scenario;
pub mod snapshot;
pub mod stock_ledger;

// 重导出核心引擎
pub use alert_engine::AlertRuleEngine;
pub use cost_model::{BandSegment, CostModel, CurrencyConverter, PORT_LOAD_BANDS};
pub use error::{EngineError, EngineResult};
pub use eta::{DelayTableEtaEstimator, EtaEstimator, ScheduledEtaEstimator};
pub use events::{AlertEvent, AlertEventType, AlertPublisher, NoOpAlertPublisher, OptionalAlertPublisher};
pub use feasibility::{
    FeasibilityFilter, FeasibilityReport, PortDateOption, PortRejection, TripleCostEstimate,
};
pub use optimizer::{AllocationOptimizer, Deadline, OptimizeOutcome, OptimizeRequest, SOLVER_NAME};
pub use scenario::{OverlayView, PlanComparison, ScenarioEngine, ScenarioOverlay};
pub use snapshot::{CapacitySnapshot, PlanningSnapshot, PlanningState, StockSnapshot};
pub use stock_ledger::StockLedger;
