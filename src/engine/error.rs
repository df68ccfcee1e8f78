// ==========================================
// 进口散货分配系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 费用项在不一致的汇率假设下计算（整批中止）
    #[error("币种/汇率不一致: {0}")]
    CurrencyMismatch(String),

    /// 精确求解超出调用方时限
    #[error("求解超时: 已用 {elapsed_ms}ms, 时限 {limit_ms}ms")]
    DeadlineExceeded { elapsed_ms: u128, limit_ms: u128 },

    #[error("引擎状态无效: {0}")]
    InvalidState(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
