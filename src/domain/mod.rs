// ==========================================
// 进口散货分配系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod alert;
pub mod capacity;
pub mod money;
pub mod network;
pub mod plan;
pub mod shipment;
pub mod stock;
pub mod types;

// 重导出核心类型
pub use alert::{Alert, AlertCondition};
pub use capacity::{CapacityEntry, CapacityLocation, CapacityValues};
pub use money::{Money, PinnedExchangeRate};
pub use network::{NetworkModel, OceanFreightRate, Plant, Port, RailRoute, Vessel};
pub use plan::{
    AllocationLeg, AllocationPlan, BindingConstraint, CostBreakdown, InfeasibleResult, LegCost,
    PlanRecord, PlanScore, PlanWarning, PlantCoverage, UnallocatedShipment,
};
pub use shipment::{
    EtaEstimate, Shipment, ShipmentSplit, MIN_SHIPMENT_QUANTITY_T, TONNAGE_EPSILON_T,
};
pub use stock::{StockEvent, StockRecord};
pub use types::{AlertLevel, AlertType, Currency, Material, PlanKind, ShipmentStatus};
