// ==========================================
// 进口散货分配系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::PlanningApi;
use crate::config::config_manager::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection, read_schema_version, CURRENT_SCHEMA_VERSION};
use crate::engine::eta::{EtaEstimator, ScheduledEtaEstimator};
use crate::engine::AlertPublisher;
use crate::repository::{
    alert_repo::AlertRepository, capacity_repo::CapacityRepository, network_repo::NetworkRepository,
    plan_repo::PlanRepository, shipment_repo::ShipmentRepository,
    stock_ledger_repo::StockLedgerRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 分配规划API
    pub planning_api: Arc<PlanningApi>,

    /// 配置管理器（参数读写）
    pub config_manager: Arc<ConfigManager>,

    /// 网络主数据仓储（种子数据与主数据维护）
    pub network_repo: Arc<NetworkRepository>,

    /// 船货仓储
    pub shipment_repo: Arc<ShipmentRepository>,

    /// 告警发布器（可选）
    pub alert_publisher: Option<Arc<dyn AlertPublisher>>,
}

impl AppState {
    /// 创建新的AppState实例（默认按登记船期估计 ETA，不推送告警）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_components(db_path, Arc::new(ScheduledEtaEstimator::new()), None)
    }

    /// 注入 ETA 估计器与告警发布器
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并建表（幂等）、校验 schema 版本
    /// 2. 初始化所有Repository
    /// 3. 创建API实例
    pub fn with_components(
        db_path: String,
        eta_estimator: Arc<dyn EtaEstimator>,
        alert_publisher: Option<Arc<dyn AlertPublisher>>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let mut conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::perf::install_sqlite_tracing(&mut conn);
        init_schema(&conn).map_err(|e| format!("建表失败: {}", e))?;
        match read_schema_version(&conn).map_err(|e| format!("读取schema版本失败: {}", e))? {
            Some(v) if v == CURRENT_SCHEMA_VERSION => {}
            other => {
                return Err(format!(
                    "schema 版本不匹配: 期望 {}，实际 {:?}",
                    CURRENT_SCHEMA_VERSION, other
                ))
            }
        }
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let network_repo = Arc::new(NetworkRepository::new(conn.clone()));
        let shipment_repo = Arc::new(ShipmentRepository::new(conn.clone()));
        let stock_repo = Arc::new(StockLedgerRepository::new(conn.clone()));
        let capacity_repo = Arc::new(CapacityRepository::new(conn.clone()));
        let plan_repo = Arc::new(PlanRepository::new(conn.clone()));
        let alert_repo = Arc::new(AlertRepository::new(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法初始化ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化API层
        // ==========================================
        let planning_api = Arc::new(PlanningApi::new(
            network_repo.clone(),
            shipment_repo.clone(),
            stock_repo,
            capacity_repo,
            plan_repo,
            alert_repo,
            config_manager.clone(),
            eta_estimator,
            alert_publisher.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            planning_api,
            config_manager,
            network_repo,
            shipment_repo,
            alert_publisher,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

/// 获取默认数据库路径
///
/// 优先级：
/// 1. 环境变量 IMPORT_LOGISTICS_APS_DB_PATH
/// 2. 用户数据目录下的 import-logistics-aps(-dev)/import_logistics_aps.db
/// 3. 当前目录 ./import_logistics_aps.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("IMPORT_LOGISTICS_APS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./import_logistics_aps.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        let dir = if cfg!(debug_assertions) {
            data_dir.join("import-logistics-aps-dev")
        } else {
            data_dir.join("import-logistics-aps")
        };

        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("import_logistics_aps.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_bootstraps_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.get_db_path(), db_path);
        assert!(state.alert_publisher.is_none());

        // 再次打开同一库不应失败（建表幂等）
        assert!(AppState::new(db_path).is_ok());
    }
}
