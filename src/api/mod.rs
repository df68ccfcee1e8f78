// ==========================================
// 进口散货分配系统 - API 层
// ==========================================
// 职责: 提供对外的规划契约，供 CLI 与上层服务调用
// ==========================================

pub mod error;
pub mod planning_api;
pub mod validator;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ValidationViolation};
pub use planning_api::{PlanningApi, ScenarioRun};
pub use validator::PlanningInputValidator;
