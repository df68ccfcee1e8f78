// ==========================================
// 进口散货分配系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod alert_repo;
pub mod capacity_repo;
pub mod error;
pub mod network_repo;
pub mod plan_repo;
pub mod row_codec;
pub mod shipment_repo;
pub mod stock_ledger_repo;

// 重导出核心仓储
pub use alert_repo::{AlertRepository, AlertWrite};
pub use capacity_repo::CapacityRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use network_repo::NetworkRepository;
pub use plan_repo::PlanRepository;
pub use shipment_repo::ShipmentRepository;
pub use stock_ledger_repo::{NewStockEvent, StockLedgerRepository};
