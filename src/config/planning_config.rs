// ==========================================
// 进口散货分配系统 - 规划参数读取
// ==========================================
// 职责: 定义引擎所需的参数集合与读取接口
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::config_manager::{config_keys, ConfigError, ConfigManager};
use crate::domain::types::Currency;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ==========================================
// PlanningConfig - 单次运行使用的参数快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningConfig {
    // ===== 币种 =====
    pub fx_usd_inr: f64,               // 1 USD = ? INR（一次运行固定）
    pub reporting_currency: Currency,

    // ===== 铁路 =====
    pub per_rake_capacity_t: f64,

    // ===== 港口 =====
    pub max_berth_wait_days: i64,           // 抵港后最多等待天数
    pub demurrage_usd_per_vessel_day: f64,  // 船舶待泊滞期费
    pub congestion_demurrage_usd_per_t: f64, // 拥堵滞期风险基准（每吨）
    pub expected_dwell_days: f64,           // 空闲堆场下的预计堆存天数

    // ===== 钢厂库存（报表币种） =====
    pub shortage_penalty_per_day: f64,  // 低于最低天数时每厂日惩罚
    pub target_gap_reward_per_day: f64, // 最低到目标之间每厂日收益

    // ===== 告警 =====
    pub critical_cover_ratio: f64,
    pub congestion_alert_threshold: f64,
    pub urgent_request_days: i64,

    // ===== 求解 =====
    pub solver_deadline_ms: u64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            fx_usd_inr: 83.0,
            reporting_currency: Currency::Inr,
            per_rake_capacity_t: 3_800.0,
            max_berth_wait_days: 3,
            demurrage_usd_per_vessel_day: 25_000.0,
            congestion_demurrage_usd_per_t: 0.6,
            expected_dwell_days: 4.0,
            shortage_penalty_per_day: 5_000_000.0,
            target_gap_reward_per_day: 400_000.0,
            critical_cover_ratio: 0.66,
            congestion_alert_threshold: 0.80,
            urgent_request_days: 3,
            solver_deadline_ms: 10_000,
        }
    }
}

// ==========================================
// PlanningConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait PlanningConfigReader: Send + Sync {
    /// 获取 USD→INR 汇率
    ///
    /// # 默认值
    /// - 83.0
    async fn get_fx_usd_inr(&self) -> Result<f64, ConfigError>;

    /// 获取报表币种
    ///
    /// # 默认值
    /// - INR
    async fn get_reporting_currency(&self) -> Result<Currency, ConfigError>;

    /// 获取告警严重级比例（Critical = min_days_cover × ratio）
    ///
    /// # 默认值
    /// - 0.66
    async fn get_critical_cover_ratio(&self) -> Result<f64, ConfigError>;

    /// 获取求解时限（毫秒）
    ///
    /// # 默认值
    /// - 10000
    async fn get_solver_deadline_ms(&self) -> Result<u64, ConfigError>;

    /// 读取完整参数快照
    async fn load_planning_config(&self) -> Result<PlanningConfig, ConfigError>;
}

#[async_trait]
impl PlanningConfigReader for ConfigManager {
    async fn get_fx_usd_inr(&self) -> Result<f64, ConfigError> {
        let rate = self.get_f64_or_default(config_keys::FX_USD_INR, 83.0)?;
        if rate <= 0.0 {
            return Err(format!("汇率必须为正: {}", rate).into());
        }
        Ok(rate)
    }

    async fn get_reporting_currency(&self) -> Result<Currency, ConfigError> {
        let value = self.get_config_or_default(config_keys::REPORTING_CURRENCY, "INR")?;
        Ok(Currency::from_str(&value).unwrap_or(Currency::Inr))
    }

    async fn get_critical_cover_ratio(&self) -> Result<f64, ConfigError> {
        let ratio = self.get_f64_or_default(config_keys::CRITICAL_COVER_RATIO, 0.66)?;
        Ok(ratio.clamp(0.0, 1.0))
    }

    async fn get_solver_deadline_ms(&self) -> Result<u64, ConfigError> {
        let value = self.get_config_or_default(config_keys::SOLVER_DEADLINE_MS, "10000")?;
        Ok(value.trim().parse::<u64>().unwrap_or(10_000))
    }

    async fn load_planning_config(&self) -> Result<PlanningConfig, ConfigError> {
        let d = PlanningConfig::default();
        Ok(PlanningConfig {
            fx_usd_inr: self.get_fx_usd_inr().await?,
            reporting_currency: self.get_reporting_currency().await?,
            per_rake_capacity_t: self
                .get_f64_or_default(config_keys::PER_RAKE_CAPACITY_T, d.per_rake_capacity_t)?
                .max(1.0),
            max_berth_wait_days: self
                .get_f64_or_default(config_keys::MAX_BERTH_WAIT_DAYS, d.max_berth_wait_days as f64)?
                .max(0.0) as i64,
            demurrage_usd_per_vessel_day: self
                .get_f64_or_default(config_keys::DEMURRAGE_USD_PER_VESSEL_DAY, d.demurrage_usd_per_vessel_day)?,
            congestion_demurrage_usd_per_t: self
                .get_f64_or_default(config_keys::CONGESTION_DEMURRAGE_USD_PER_T, d.congestion_demurrage_usd_per_t)?,
            expected_dwell_days: self.get_f64_or_default(config_keys::EXPECTED_DWELL_DAYS, d.expected_dwell_days)?,
            shortage_penalty_per_day: self
                .get_f64_or_default(config_keys::SHORTAGE_PENALTY_PER_DAY, d.shortage_penalty_per_day)?,
            target_gap_reward_per_day: self
                .get_f64_or_default(config_keys::TARGET_GAP_REWARD_PER_DAY, d.target_gap_reward_per_day)?,
            critical_cover_ratio: self.get_critical_cover_ratio().await?,
            congestion_alert_threshold: self
                .get_f64_or_default(config_keys::CONGESTION_ALERT_THRESHOLD, d.congestion_alert_threshold)?,
            urgent_request_days: self
                .get_f64_or_default(config_keys::URGENT_REQUEST_DAYS, d.urgent_request_days as f64)?
                .max(0.0) as i64,
            solver_deadline_ms: self.get_solver_deadline_ms().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_table_empty() {
        let mgr = manager();
        let cfg = mgr.load_planning_config().await.unwrap();
        assert_eq!(cfg, PlanningConfig::default());
    }

    #[tokio::test]
    async fn test_overrides() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::CRITICAL_COVER_RATIO, "0.5").unwrap();
        mgr.set_global_config_value(config_keys::PER_RAKE_CAPACITY_T, "4000").unwrap();
        mgr.set_global_config_value(config_keys::REPORTING_CURRENCY, "usd").unwrap();
        let cfg = mgr.load_planning_config().await.unwrap();
        assert_eq!(cfg.critical_cover_ratio, 0.5);
        assert_eq!(cfg.per_rake_capacity_t, 4_000.0);
        assert_eq!(cfg.reporting_currency, Currency::Usd);
    }

    #[tokio::test]
    async fn test_non_positive_fx_rejected() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::FX_USD_INR, "0").unwrap();
        assert!(mgr.get_fx_usd_inr().await.is_err());
    }
}
