// ==========================================
// 进口散货分配系统 - 金额与汇率
// ==========================================
// 红线: 每一项费用必须携带币种，禁止裸 f64 跨币种相加
// ==========================================

use crate::domain::types::Currency;
use serde::{Deserialize, Serialize};

/// 带币种的金额
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: f64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: f64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn usd(amount: f64) -> Self {
        Self::new(amount, Currency::Usd)
    }

    pub fn inr(amount: f64) -> Self {
        Self::new(amount, Currency::Inr)
    }

    /// 按吨位放大（单价 × 吨位），币种不变
    pub fn times(&self, factor: f64) -> Self {
        Self::new(self.amount * factor, self.currency)
    }
}

/// 单次优化运行固定的汇率
///
/// 一次运行只允许一个汇率；结果中记录该汇率以便审计
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinnedExchangeRate {
    pub base_currency: Currency,  // 报表币种
    pub quote_currency: Currency, // 外币
    pub rate: f64,                // 1 外币 = rate 报表币种
}

impl PinnedExchangeRate {
    pub fn usd_inr(rate: f64) -> Self {
        Self {
            base_currency: Currency::Inr,
            quote_currency: Currency::Usd,
            rate,
        }
    }
}
