// ==========================================
// 进口散货分配系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 配置层统一错误类型
pub type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    pub(crate) fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取数值配置；格式错误时告警并回退默认值
    pub(crate) fn get_f64_or_default(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => {
                tracing::warn!(config_key = key, raw_value = %raw, default, "配置值格式错误，使用默认值");
                Ok(default)
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // ===== 币种与汇率 =====
    pub const FX_USD_INR: &str = "fx_usd_inr";
    pub const REPORTING_CURRENCY: &str = "reporting_currency";

    // ===== 铁路 =====
    pub const PER_RAKE_CAPACITY_T: &str = "per_rake_capacity_t";

    // ===== 港口等待与堆存 =====
    pub const MAX_BERTH_WAIT_DAYS: &str = "max_berth_wait_days";
    pub const DEMURRAGE_USD_PER_VESSEL_DAY: &str = "demurrage_usd_per_vessel_day";
    pub const CONGESTION_DEMURRAGE_USD_PER_T: &str = "congestion_demurrage_usd_per_t";
    pub const EXPECTED_DWELL_DAYS: &str = "expected_dwell_days";

    // ===== 钢厂库存目标 =====
    pub const SHORTAGE_PENALTY_PER_DAY: &str = "shortage_penalty_per_day";
    pub const TARGET_GAP_REWARD_PER_DAY: &str = "target_gap_reward_per_day";

    // ===== 告警阈值 =====
    pub const CRITICAL_COVER_RATIO: &str = "critical_cover_ratio";
    pub const CONGESTION_ALERT_THRESHOLD: &str = "congestion_alert_threshold";
    pub const URGENT_REQUEST_DAYS: &str = "urgent_request_days";

    // ===== 求解 =====
    pub const SOLVER_DEADLINE_MS: &str = "solver_deadline_ms";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_set_and_read_back() {
        let mgr = manager();
        assert_eq!(mgr.get_global_config_value(config_keys::FX_USD_INR).unwrap(), None);

        mgr.set_global_config_value(config_keys::FX_USD_INR, "84.5").unwrap();
        mgr.set_global_config_value(config_keys::FX_USD_INR, "85.0").unwrap();
        assert_eq!(
            mgr.get_global_config_value(config_keys::FX_USD_INR).unwrap().as_deref(),
            Some("85.0")
        );
    }

    #[test]
    fn test_bad_number_falls_back_to_default() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::CRITICAL_COVER_RATIO, "abc").unwrap();
        assert_eq!(mgr.get_f64_or_default(config_keys::CRITICAL_COVER_RATIO, 0.66).unwrap(), 0.66);
    }
}
