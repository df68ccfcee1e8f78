// ==========================================
// 进口散货分配系统 - 库存台账引擎
// ==========================================
// 职责: 库存折叠与可用天数计算
// 输入: PlanningState（事件快照 + 钢厂日耗）
// 输出: 当前库存、可用天数、覆盖等级
// 红线: 日耗为 0 或未知时可用天数无定义，不得当作 0 处理
// ==========================================

use crate::domain::types::{AlertLevel, Material};
use crate::engine::snapshot::PlanningState;

// ==========================================
// StockLedger - 库存台账引擎
// ==========================================
pub struct StockLedger {
    // 无状态引擎
}

impl StockLedger {
    pub fn new() -> Self {
        Self {}
    }

    /// 当前库存（吨）
    pub fn current_stock<S: PlanningState + ?Sized>(&self, state: &S, location_code: &str, material: Material) -> f64 {
        state.current_stock_t(location_code, material)
    }

    /// 可用天数 = 当前库存 / 日耗
    ///
    /// # 返回
    /// - None: 地点不是钢厂，或日耗为 0/未知
    pub fn days_cover<S: PlanningState + ?Sized>(
        &self,
        state: &S,
        location_code: &str,
        material: Material,
    ) -> Option<f64> {
        let rate = state.daily_rate(location_code, material);
        Self::days_cover_from(self.current_stock(state, location_code, material), rate)
    }

    pub fn days_cover_from(stock_t: f64, daily_rate_t: Option<f64>) -> Option<f64> {
        match daily_rate_t {
            Some(rate) if rate.is_finite() && rate > 0.0 => Some(stock_t / rate),
            _ => None,
        }
    }

    /// 覆盖等级
    ///
    /// - days_cover < min × critical_ratio → Critical
    /// - days_cover < min → Warning
    /// - 其余 → Normal
    /// - 可用天数无定义 → None（不能告警）
    pub fn cover_level(days_cover: Option<f64>, min_days_cover: f64, critical_ratio: f64) -> Option<AlertLevel> {
        let cover = days_cover?;
        if cover < min_days_cover * critical_ratio {
            Some(AlertLevel::Critical)
        } else if cover < min_days_cover {
            Some(AlertLevel::Warning)
        } else {
            Some(AlertLevel::Normal)
        }
    }
}

impl Default for StockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_cover_undefined_for_zero_rate() {
        assert_eq!(StockLedger::days_cover_from(10_000.0, None), None);
        assert_eq!(StockLedger::days_cover_from(10_000.0, Some(0.0)), None);
        let cover = StockLedger::days_cover_from(195_000.0, Some(3_500.0)).unwrap();
        assert!((cover - 55.714).abs() < 1e-3);
    }

    #[test]
    fn test_cover_level_thresholds() {
        assert_eq!(StockLedger::cover_level(Some(55.7), 15.0, 0.66), Some(AlertLevel::Normal));
        assert_eq!(StockLedger::cover_level(Some(12.9), 15.0, 0.66), Some(AlertLevel::Warning));
        assert_eq!(StockLedger::cover_level(Some(9.8), 15.0, 0.66), Some(AlertLevel::Critical));
        assert_eq!(StockLedger::cover_level(Some(9.8), 15.0, 0.5), Some(AlertLevel::Warning));
        assert_eq!(StockLedger::cover_level(None, 15.0, 0.66), None);
    }
}
