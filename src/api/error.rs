// ==========================================
// 进口散货分配系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把仓储/引擎/导入错误转换为带原因的错误消息
// ==========================================

use crate::config::ConfigError;
use crate::engine::error::EngineError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入校验错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    /// 船货批次校验失败（带逐条原因）
    #[error("船货校验失败: {reason}")]
    ShipmentValidationError {
        reason: String,
        violations: Vec<ValidationViolation>,
    },

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 求解错误
    // ==========================================
    #[error("币种/汇率不一致: {0}")]
    CurrencyMismatch(String),

    #[error("求解超时: 已用 {elapsed_ms}ms, 时限 {limit_ms}ms")]
    Timeout { elapsed_ms: u128, limit_ms: u128 },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("配置读取失败: {0}")]
    ConfigError(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 业务规则错误
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),

            // 通用错误
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::CurrencyMismatch(msg) => ApiError::CurrencyMismatch(msg),
            EngineError::DeadlineExceeded { elapsed_ms, limit_ms } => {
                ApiError::Timeout { elapsed_ms, limit_ms }
            }
            EngineError::InvalidState(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(e) => ApiError::from(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

// ==========================================
// 校验违规详情
// ==========================================

/// 校验违规详情
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationViolation {
    /// 违规类型（QUANTITY / UNKNOWN_VESSEL / NO_FREIGHT_LANE / STATUS / DUPLICATE_ID）
    pub violation_type: String,
    /// 船货ID
    pub shipment_id: String,
    /// 违规原因
    pub reason: String,
    /// 额外信息（可选）
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "Shipment".to_string(),
            id: "S001".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Shipment"));
                assert!(msg.contains("S001"));
            }
            _ => panic!("Expected NotFound"),
        }

        let repo_err = RepositoryError::InvalidStateTransition {
            from: "DISCHARGED".to_string(),
            to: "SCHEDULED".to_string(),
        };
        match ApiError::from(repo_err) {
            ApiError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "DISCHARGED");
                assert_eq!(to, "SCHEDULED");
            }
            _ => panic!("Expected InvalidStateTransition"),
        }
    }

    #[test]
    fn test_engine_error_conversion() {
        let api_err: ApiError = EngineError::DeadlineExceeded {
            elapsed_ms: 12,
            limit_ms: 10,
        }
        .into();
        assert!(matches!(api_err, ApiError::Timeout { elapsed_ms: 12, limit_ms: 10 }));

        let api_err: ApiError = EngineError::CurrencyMismatch("USD/INR 83 vs 84".to_string()).into();
        assert!(matches!(api_err, ApiError::CurrencyMismatch(_)));
    }

    #[test]
    fn test_import_error_keeps_repository_cause() {
        let err = ImportError::Repository(RepositoryError::DatabaseQueryError("disk I/O".to_string()));
        assert!(matches!(ApiError::from(err), ApiError::DatabaseError(_)));

        let err = ImportError::MissingColumn("entry_date".to_string());
        match ApiError::from(err) {
            ApiError::ImportError(msg) => assert!(msg.contains("entry_date")),
            _ => panic!("Expected ImportError"),
        }
    }
}
