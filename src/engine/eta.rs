// ==========================================
// 进口散货分配系统 - 抵港时间估计接口
// ==========================================
// 职责: 为优化器提供每条船货的预计抵港日
// 说明: 延误预测是外部输入，不属于分配引擎；此处只定义接口与按船期的默认实现
// ==========================================

use crate::domain::shipment::{EtaEstimate, Shipment};
use crate::engine::error::EngineResult;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

pub const SCHEDULE_SOURCE: &str = "SCHEDULE";

// ==========================================
// Trait: EtaEstimator
// ==========================================
#[async_trait]
pub trait EtaEstimator: Send + Sync {
    /// 单船货 ETA；结果不早于 as_of_date
    async fn estimate(&self, shipment: &Shipment, as_of_date: NaiveDate) -> EngineResult<EtaEstimate>;

    /// 批量估计，返回 船货 ID → 抵港日
    async fn estimate_arrivals(
        &self,
        shipments: &[Shipment],
        as_of_date: NaiveDate,
    ) -> EngineResult<BTreeMap<String, NaiveDate>> {
        let mut arrivals = BTreeMap::new();
        for shipment in shipments {
            let estimate = self.estimate(shipment, as_of_date).await?;
            arrivals.insert(estimate.shipment_id, estimate.eta);
        }
        Ok(arrivals)
    }
}

// ==========================================
// ScheduledEtaEstimator - 按登记船期
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScheduledEtaEstimator;

impl ScheduledEtaEstimator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EtaEstimator for ScheduledEtaEstimator {
    async fn estimate(&self, shipment: &Shipment, as_of_date: NaiveDate) -> EngineResult<EtaEstimate> {
        let registered = shipment.eta.unwrap_or(as_of_date);
        let eta = registered.max(as_of_date);
        Ok(EtaEstimate {
            shipment_id: shipment.shipment_id.clone(),
            eta,
            delay_days: (eta - registered).num_days(),
            source: SCHEDULE_SOURCE.to_string(),
        })
    }
}

// ==========================================
// DelayTableEtaEstimator - 登记船期 + 已知延误天数
// ==========================================
// 外部延误预测结果以表的形式注入（情景分析常用）
#[derive(Debug, Clone, Default)]
pub struct DelayTableEtaEstimator {
    source: String,
    delays: BTreeMap<String, i64>,
}

impl DelayTableEtaEstimator {
    pub fn new(source: &str, delays: BTreeMap<String, i64>) -> Self {
        Self {
            source: source.to_string(),
            delays,
        }
    }
}

#[async_trait]
impl EtaEstimator for DelayTableEtaEstimator {
    async fn estimate(&self, shipment: &Shipment, as_of_date: NaiveDate) -> EngineResult<EtaEstimate> {
        let base = ScheduledEtaEstimator.estimate(shipment, as_of_date).await?;
        let extra = self
            .delays
            .get(&shipment.shipment_id)
            .copied()
            .unwrap_or(0)
            .max(0);
        if extra == 0 {
            return Ok(base);
        }
        Ok(EtaEstimate {
            eta: base.eta + Duration::days(extra),
            delay_days: base.delay_days + extra,
            source: self.source.clone(),
            ..base
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Material, ShipmentStatus};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn shipment(id: &str, eta: Option<NaiveDate>) -> Shipment {
        Shipment {
            shipment_id: id.to_string(),
            material: Material::CokingCoal,
            quantity_t: 75_000.0,
            vessel_code: "V1".to_string(),
            supplier_port: "GLADSTONE".to_string(),
            required_by: d(25),
            eta,
            status: ShipmentStatus::Scheduled,
            splits: vec![],
        }
    }

    #[tokio::test]
    async fn test_scheduled_estimate_never_before_as_of() {
        let est = ScheduledEtaEstimator::new();
        let on_time = est.estimate(&shipment("S1", Some(d(12))), d(10)).await.unwrap();
        assert_eq!((on_time.eta, on_time.delay_days), (d(12), 0));

        let late = est.estimate(&shipment("S2", Some(d(8))), d(10)).await.unwrap();
        assert_eq!((late.eta, late.delay_days), (d(10), 2));

        let unknown = est.estimate(&shipment("S3", None), d(10)).await.unwrap();
        assert_eq!(unknown.eta, d(10));
        assert_eq!(unknown.source, SCHEDULE_SOURCE);
    }

    #[tokio::test]
    async fn test_delay_table_adds_known_delays() {
        let mut delays = BTreeMap::new();
        delays.insert("S1".to_string(), 3);
        let est = DelayTableEtaEstimator::new("WEATHER_MODEL", delays);

        let arrivals = est
            .estimate_arrivals(&[shipment("S1", Some(d(12))), shipment("S2", Some(d(12)))], d(10))
            .await
            .unwrap();
        assert_eq!(arrivals.get("S1"), Some(&d(15)));
        assert_eq!(arrivals.get("S2"), Some(&d(12)));
    }
}
