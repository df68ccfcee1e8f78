// ==========================================
// 进口散货分配系统 - 应用层
// ==========================================
// 职责: 装配仓储/引擎/API，供 CLI 与种子工具使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
