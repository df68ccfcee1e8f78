// ==========================================
// 进口散货分配系统 - 核心库
// ==========================================
// 职责: 把进口炼焦煤/石灰石船货拆分到卸货港、卸货日与铁路线路，
//       使到厂总成本最小并维持各钢厂库存天数
// 技术栈: Rust + SQLite
// 系统定位: 决策支持系统（方案由人工提交）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 分配规则与求解
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计
pub mod perf;

// API 层 - 规划接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AlertLevel, AlertType, Currency, Material, PlanKind, ShipmentStatus};

// 领域实体
pub use domain::{
    Alert, AllocationLeg, AllocationPlan, CapacityEntry, CapacityLocation, CapacityValues,
    InfeasibleResult, NetworkModel, Plant, Port, RailRoute, Shipment, ShipmentSplit, StockEvent,
    StockRecord, Vessel,
};

// 引擎
pub use engine::{
    AlertRuleEngine, AllocationOptimizer, CostModel, Deadline, FeasibilityFilter, OptimizeOutcome,
    ScenarioEngine, ScenarioOverlay, StockLedger,
};

// API
pub use api::{ApiError, ApiResult, PlanningApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "进口散货分配系统";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";
